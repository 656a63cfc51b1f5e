//! Inbound message worker.
//!
//! Applies messages received from the broker to the store:
//!
//! - inclination topic: `{"INCLINATION_X":[x, ..],"INCLINATION_Y":[y, ..]}`
//!   → `body_angle_x` / `body_angle_y` (first element; missing keys are 0)
//! - detection topic: `{"count": n, "objects": [..]}` → `detections`
//!
//! Malformed payloads are logged and skipped.

use crate::periodic::{StopSignal, WorkerThread};
use crane_common::consts::IDLE_TICK_MS;
use crane_common::hal::driver::HalError;
use crane_common::telemetry::{DetectionSummary, TelemetryStore};
use parking_lot::Mutex;
use serde::Deserialize;
use std::sync::Arc;
use std::sync::mpsc::{Receiver, RecvTimeoutError};
use std::time::Duration;
use tracing::{debug, info, warn};

/// One message received from the broker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundMessage {
    /// Topic the message arrived on.
    pub topic: String,
    /// Raw payload.
    pub payload: Vec<u8>,
}

/// Inclinometer message body.
#[derive(Debug, Default, Deserialize)]
struct Inclination {
    #[serde(rename = "INCLINATION_X", default)]
    x: Vec<f64>,
    #[serde(rename = "INCLINATION_Y", default)]
    y: Vec<f64>,
}

/// MQTT topic filter match with `+` (one level) and `#` (rest) wildcards.
pub fn topic_matches(filter: &str, topic: &str) -> bool {
    let mut levels = topic.split('/');
    for part in filter.split('/') {
        match (part, levels.next()) {
            ("#", _) => return true,
            ("+", Some(_)) => {}
            (expected, Some(actual)) if expected == actual => {}
            _ => return false,
        }
    }
    levels.next().is_none()
}

/// Topic routing for inbound messages.
#[derive(Debug, Clone)]
pub struct InboundTopics {
    /// Filter for inclinometer messages.
    pub inclination: String,
    /// Filter for detection summaries.
    pub detection: String,
}

/// Apply one message to the store.
///
/// Returns `false` when the message was ignored.
pub fn apply_message(store: &TelemetryStore, topics: &InboundTopics, msg: &InboundMessage) -> bool {
    if topic_matches(&topics.inclination, &msg.topic) {
        match serde_json::from_slice::<Inclination>(&msg.payload) {
            Ok(incl) => {
                store.set_body_angle_x(incl.x.first().copied().unwrap_or(0.0));
                store.set_body_angle_y(incl.y.first().copied().unwrap_or(0.0));
                true
            }
            Err(e) => {
                warn!("inbound: bad inclination payload on {}: {}", msg.topic, e);
                false
            }
        }
    } else if topic_matches(&topics.detection, &msg.topic) {
        match serde_json::from_slice::<DetectionSummary>(&msg.payload) {
            Ok(summary) => {
                store.set_detections(summary);
                true
            }
            Err(e) => {
                warn!("inbound: bad detection payload on {}: {}", msg.topic, e);
                false
            }
        }
    } else {
        debug!("inbound: no handler for {}", msg.topic);
        false
    }
}

/// Drains the inbound channel into the store.
pub struct InboundWorker {
    topics: InboundTopics,
    store: Arc<TelemetryStore>,
    rx: Arc<Mutex<Receiver<InboundMessage>>>,
    stop: StopSignal,
    thread: Option<WorkerThread>,
}

impl InboundWorker {
    /// Create a worker reading from `rx`.
    pub fn new(
        topics: InboundTopics,
        store: Arc<TelemetryStore>,
        rx: Receiver<InboundMessage>,
    ) -> Self {
        Self {
            topics,
            store,
            rx: Arc::new(Mutex::new(rx)),
            stop: StopSignal::new(),
            thread: None,
        }
    }

    /// Start the worker thread. A no-op while it is running.
    pub fn start(&mut self) -> Result<(), HalError> {
        if let Some(thread) = self.thread.as_mut() {
            if !thread.is_finished() {
                return Ok(());
            }
            thread.join(Duration::ZERO);
        }
        self.stop.clear();

        let topics = self.topics.clone();
        let store = Arc::clone(&self.store);
        let rx = Arc::clone(&self.rx);
        let stop = self.stop.clone();

        let thread = WorkerThread::spawn("inbound", move || {
            let rx = rx.lock();
            let tick = Duration::from_millis(IDLE_TICK_MS);
            let mut applied = 0u64;
            while !stop.is_requested() {
                match rx.recv_timeout(tick) {
                    Ok(msg) => {
                        if apply_message(&store, &topics, &msg) {
                            applied += 1;
                        }
                    }
                    Err(RecvTimeoutError::Timeout) => {}
                    Err(RecvTimeoutError::Disconnected) => {
                        info!("inbound: message source closed");
                        break;
                    }
                }
            }
            info!("inbound: stopped after {} messages", applied);
        })
        .map_err(|e| HalError::Io(format!("failed to spawn inbound worker: {e}")))?;

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
