//! Frame publisher.
//!
//! Every period the [`PublisherWorker`] reads a snapshot of the store,
//! encodes it as a wire frame and hands it to a [`MessageTransport`].
//! A failed publish is logged and the frame dropped; there is no buffering or
//! retransmission, the next period simply sends fresher data.

use crate::periodic::{CycleOutcome, StopSignal, TimingStats, WorkerThread, run_periodic, should_log};
use crane_common::frame;
use crane_common::hal::config::PublisherConfig;
use crane_common::hal::driver::HalError;
use crane_common::telemetry::TelemetryStore;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};

/// Errors returned by a messaging transport.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PublishError {
    /// No connection to the broker.
    #[error("transport disconnected: {0}")]
    Disconnected(String),

    /// The transport refused the message (e.g. its queue is full).
    #[error("publish rejected: {0}")]
    Rejected(String),
}

/// Outbound message sink.
pub trait MessageTransport: Send + Sync {
    /// Publish `payload` on `topic` without waiting for delivery.
    fn publish(&self, topic: &str, payload: &[u8]) -> Result<(), PublishError>;

    /// Disconnect. Called once at shutdown.
    fn close(&self) {}
}

/// Transport that only logs what it would send (`--no-mqtt`).
#[derive(Debug, Default)]
pub struct LogPublisher {
    sent: Mutex<u64>,
}

impl LogPublisher {
    /// Create a logging transport.
    pub fn new() -> Self {
        Self::default()
    }

    /// Messages accepted so far.
    pub fn sent(&self) -> u64 {
        *self.sent.lock()
    }
}

impl MessageTransport for LogPublisher {
    fn publish(&self, topic: &str, payload: &[u8]) -> Result<(), PublishError> {
        let mut sent = self.sent.lock();
        *sent += 1;
        debug!("publish #{} to {}: {} bytes", *sent, topic, payload.len());
        Ok(())
    }

    fn close(&self) {
        info!("log publisher closed after {} messages", self.sent());
    }
}

/// Periodic snapshot → frame → transport.
pub struct PublisherWorker {
    config: PublisherConfig,
    store: Arc<TelemetryStore>,
    transport: Arc<dyn MessageTransport>,
    stop: StopSignal,
    stats: Arc<Mutex<TimingStats>>,
    thread: Option<WorkerThread>,
}

impl PublisherWorker {
    /// Create a publisher; nothing runs until [`start`](Self::start).
    pub fn new(
        config: PublisherConfig,
        store: Arc<TelemetryStore>,
        transport: Arc<dyn MessageTransport>,
    ) -> Self {
        Self {
            config,
            store,
            transport,
            stop: StopSignal::new(),
            stats: Arc::new(Mutex::new(TimingStats::default())),
            thread: None,
        }
    }

    /// Timing statistics of the last completed run.
    pub fn stats(&self) -> TimingStats {
        *self.stats.lock()
    }

    /// Start the publisher thread. A no-op while it is running.
    pub fn start(&mut self) -> Result<(), HalError> {
        if let Some(thread) = self.thread.as_mut() {
            if !thread.is_finished() {
                return Ok(());
            }
            thread.join(Duration::ZERO);
        }
        self.stop.clear();

        let config = self.config.clone();
        let store = Arc::clone(&self.store);
        let transport = Arc::clone(&self.transport);
        let stop = self.stop.clone();
        let stats = Arc::clone(&self.stats);

        let thread = WorkerThread::spawn("publisher", move || {
            info!(
                "publisher: sending to {} every {}ms",
                config.topic, config.period_ms
            );
            let mut failures = 0u64;
            let result = run_periodic("publisher", config.period(), &stop, || {
                let bytes = frame::encode(&store.snapshot());
                match transport.publish(&config.topic, &bytes) {
                    Ok(()) => CycleOutcome::Done,
                    Err(e) => {
                        failures += 1;
                        if should_log(failures) {
                            warn!("publisher: frame dropped (#{}): {}", failures, e);
                        }
                        CycleOutcome::Failed
                    }
                }
            });
            *stats.lock() = result;
            info!("publisher: stopped after {} frames", result.cycle_count);
        })
        .map_err(|e| HalError::Io(format!("failed to spawn publisher: {e}")))?;

        self.thread = Some(thread);
        Ok(())
    }

    /// Request the loop to exit. Returns immediately.
    pub fn stop(&self) {
        self.stop.request();
    }

    /// Wait up to `timeout` for the thread to finish. `true` if it did.
    pub fn join(&mut self, timeout: Duration) -> bool {
        self.thread.as_mut().is_none_or(|t| t.join(timeout))
    }
}
