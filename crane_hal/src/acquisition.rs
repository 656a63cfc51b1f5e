//! Acquisition workers.
//!
//! An [`AcquisitionWorker`] owns one transport driver and, every period,
//! fetches one raw sample, decodes it according to its profile and writes
//! the result into the shared [`TelemetryStore`].
//!
//! ```text
//!  Disconnected ──start()──► Connecting ──init ok──► Polling ──stop()──► Stopping ──► Stopped
//!                                 │
//!                                 └──init failed──► Stopped (+ WorkerFault)
//! ```
//!
//! Read timeouts and decode failures are logged and retried on the next
//! period. Only a connect failure stops the worker; it is reported on the
//! supervisor's fault channel.

use crate::periodic::{
    CycleOutcome, StopSignal, TimingStats, WorkerThread, run_periodic, should_log,
};
use crane_common::hal::config::{AcquisitionConfig, Profile};
use crane_common::hal::driver::{DriverFactory, HalDriver, HalError, RawSample};
use crane_common::registers::{WordOrder, decode_block, decode_load_cells, decode_safety};
use crane_common::risk::assess;
use crane_common::telemetry::TelemetryStore;
use parking_lot::Mutex;
use std::sync::Arc;
use std::sync::mpsc::{SyncSender, TrySendError};
use std::time::Duration;
use tracing::{debug, error, info, warn};

const EXITING_JOIN_TIMEOUT: Duration = Duration::from_secs(1);

/// Lifecycle state of an acquisition worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WorkerState {
    /// Created, never started.
    #[default]
    Disconnected,
    /// Opening the transport.
    Connecting,
    /// Reading every period.
    Polling,
    /// Stop observed, releasing the transport.
    Stopping,
    /// Thread finished.
    Stopped,
}

/// Report of a worker that stopped on its own.
#[derive(Debug, Clone, PartialEq)]
pub struct WorkerFault {
    /// Name of the failed worker.
    pub worker: String,
    /// Cause.
    pub error: HalError,
}

/// Turns a raw sample into store writes.
pub trait SampleSink: Send + Sync {
    /// Decode `sample` and write it into the store.
    ///
    /// Must not write anything when decoding fails.
    fn apply(&self, sample: RawSample) -> Result<(), HalError>;
}

/// Main-crane register block → 19 store fields.
pub struct MainCraneSink {
    store: Arc<TelemetryStore>,
    order: WordOrder,
}

impl SampleSink for MainCraneSink {
    fn apply(&self, sample: RawSample) -> Result<(), HalError> {
        let regs = expect_registers(sample)?;
        let block = decode_block(&regs, self.order)?;
        self.store.apply_main_block(&block);
        Ok(())
    }
}

/// Stability sensor block → stability, centre of gravity, outrigger loads and
/// danger level.
pub struct SafetySink {
    store: Arc<TelemetryStore>,
}

impl SampleSink for SafetySink {
    fn apply(&self, sample: RawSample) -> Result<(), HalError> {
        let regs = expect_registers(sample)?;
        let reading = decode_safety(&regs)?;
        let risk = assess(reading.stability);
        self.store.apply_safety(&reading, risk.level);
        Ok(())
    }
}

/// Load-cell datagram → load cells and rollover flag.
pub struct LoadCellSink {
    store: Arc<TelemetryStore>,
}

impl SampleSink for LoadCellSink {
    fn apply(&self, sample: RawSample) -> Result<(), HalError> {
        let RawSample::Datagram(payload) = sample else {
            return Err(HalError::TransientRead(
                "expected a datagram, got registers".to_string(),
            ));
        };
        let reading = decode_load_cells(&payload)?;
        self.store.apply_load_cells(&reading);
        Ok(())
    }
}

fn expect_registers(sample: RawSample) -> Result<Vec<u16>, HalError> {
    match sample {
        RawSample::Registers(regs) => Ok(regs),
        RawSample::Datagram(_) => Err(HalError::TransientRead(
            "expected registers, got a datagram".to_string(),
        )),
    }
}

/// Sink for a worker profile.
pub fn sink_for(
    profile: Profile,
    order: WordOrder,
    store: Arc<TelemetryStore>,
) -> Arc<dyn SampleSink> {
    match profile {
        Profile::MainCrane => Arc::new(MainCraneSink { store, order }),
        Profile::SafetySensor => Arc::new(SafetySink { store }),
        Profile::LoadCells => Arc::new(LoadCellSink { store }),
    }
}

/// One periodic field-bus reader.
pub struct AcquisitionWorker {
    config: AcquisitionConfig,
    factory: DriverFactory,
    sink: Arc<dyn SampleSink>,
    faults: SyncSender<WorkerFault>,
    stop: StopSignal,
    state: Arc<Mutex<WorkerState>>,
    stats: Arc<Mutex<TimingStats>>,
    thread: Option<WorkerThread>,
}

impl AcquisitionWorker {
    /// Create a worker; nothing runs until [`start`](Self::start).
    pub fn new(
        config: AcquisitionConfig,
        factory: DriverFactory,
        store: Arc<TelemetryStore>,
        faults: SyncSender<WorkerFault>,
    ) -> Self {
        let sink = sink_for(config.profile, config.word_order, store);
        Self::with_sink(config, factory, sink, faults)
    }

    /// Create a worker with an explicit sink.
    pub fn with_sink(
        config: AcquisitionConfig,
        factory: DriverFactory,
        sink: Arc<dyn SampleSink>,
        faults: SyncSender<WorkerFault>,
    ) -> Self {
        Self {
            config,
            factory,
            sink,
            faults,
            stop: StopSignal::new(),
            state: Arc::new(Mutex::new(WorkerState::Disconnected)),
            stats: Arc::new(Mutex::new(TimingStats::default())),
            thread: None,
        }
    }

    /// Worker name from its configuration.
    pub fn name(&self) -> &str {
        &self.config.name
    }

    /// Current lifecycle state.
    pub fn state(&self) -> WorkerState {
        *self.state.lock()
    }

    /// Timing statistics of the last completed run.
    pub fn stats(&self) -> TimingStats {
        *self.stats.lock()
    }

    /// Start the worker thread.
    ///
    /// A no-op while the thread is alive. After the thread has finished
    /// (stopped or faulted) a fresh driver is created and the worker runs
    /// again. A thread that already reached `Stopped` only has its fault
    /// report left to do, so it is joined (bounded) rather than skipped.
    pub fn start(&mut self) -> Result<(), HalError> {
        if let Some(thread) = self.thread.as_mut() {
            if !thread.is_finished() && *self.state.lock() != WorkerState::Stopped {
                debug!("{}: already running", self.config.name);
                return Ok(());
            }
            if !thread.join(EXITING_JOIN_TIMEOUT) {
                return Err(HalError::Io(format!(
                    "{}: previous run did not exit within {:?}",
                    self.config.name, EXITING_JOIN_TIMEOUT
                )));
            }
        }

        self.stop.clear();
        *self.state.lock() = WorkerState::Connecting;

        let run = WorkerRun {
            config: self.config.clone(),
            driver: (self.factory)(),
            sink: Arc::clone(&self.sink),
            faults: self.faults.clone(),
            stop: self.stop.clone(),
            state: Arc::clone(&self.state),
            stats: Arc::clone(&self.stats),
        };

        let thread = WorkerThread::spawn(&format!("acq-{}", self.config.name), move || run.run())
            .map_err(|e| {
                *self.state.lock() = WorkerState::Stopped;
                HalError::Io(format!("{}: failed to spawn worker: {e}", self.config.name))
            })?;
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

/// Everything the worker thread owns.
struct WorkerRun {
    config: AcquisitionConfig,
    driver: Box<dyn HalDriver>,
    sink: Arc<dyn SampleSink>,
    faults: SyncSender<WorkerFault>,
    stop: StopSignal,
    state: Arc<Mutex<WorkerState>>,
    stats: Arc<Mutex<TimingStats>>,
}

impl WorkerRun {
    fn set_state(&self, state: WorkerState) {
        *self.state.lock() = state;
    }

    fn report(&self, error: HalError) {
        let fault = WorkerFault {
            worker: self.config.name.clone(),
            error,
        };
        match self.faults.try_send(fault) {
            Ok(()) => {}
            Err(TrySendError::Full(fault)) => {
                warn!("{}: fault channel full, dropping {}", fault.worker, fault.error);
            }
            Err(TrySendError::Disconnected(_)) => {
                debug!("{}: supervisor gone, fault not reported", self.config.name);
            }
        }
    }

    fn run(mut self) {
        let name = self.config.name.clone();
        info!(
            "{}: connecting via {} v{} ({:?})",
            name,
            self.driver.name(),
            self.driver.version(),
            self.config.profile
        );

        if let Err(e) = self.driver.init(&self.config) {
            error!("{}: connect failed: {}", name, e);
            self.set_state(WorkerState::Stopped);
            self.report(e);
            return;
        }
        self.set_state(WorkerState::Polling);
        info!("{}: polling every {}ms", name, self.config.period_ms);

        let request = self.config.register_request();
        let timeout = self.config.read_timeout();
        let mut failures = 0u64;
        let mut fatal = None;

        let stats = {
            let driver = &mut self.driver;
            let sink = &self.sink;
            run_periodic(&name, self.config.period(), &self.stop, || {
                match driver.fetch(&request, timeout).and_then(|s| sink.apply(s)) {
                    Ok(()) => {
                        debug!("{}: sample applied", name);
                        CycleOutcome::Done
                    }
                    Err(e) if e.is_fatal() => {
                        error!("{}: transport lost: {}", name, e);
                        fatal = Some(e);
                        CycleOutcome::Exit
                    }
                    Err(e) => {
                        failures += 1;
                        if should_log(failures) {
                            warn!("{}: read failed (#{}): {}", name, failures, e);
                        }
                        CycleOutcome::Failed
                    }
                }
            })
        };
        *self.stats.lock() = stats;

        self.set_state(WorkerState::Stopping);
        if let Err(e) = self.driver.shutdown() {
            warn!("{}: driver shutdown failed: {}", name, e);
        }
        self.set_state(WorkerState::Stopped);

        if let Some(e) = fatal {
            self.report(e);
        }
        info!("{}: stopped after {} cycles", name, stats.cycle_count);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crane_common::hal::driver::RegisterRequest;
    use crane_common::registers::encode_pair;
    use crane_common::telemetry::TelemetrySnapshot;
    use std::sync::mpsc;
    use std::time::Instant;

    struct FixedDriver;

    impl HalDriver for FixedDriver {
        fn name(&self) -> &'static str {
            "fixed"
        }
        fn version(&self) -> &'static str {
            "0.0.0"
        }
        fn init(&mut self, _config: &AcquisitionConfig) -> Result<(), HalError> {
            Ok(())
        }
        fn fetch(
            &mut self,
            request: &RegisterRequest,
            _timeout: Duration,
        ) -> Result<RawSample, HalError> {
            let mut regs = vec![0u16; request.count as usize];
            regs[2..4].copy_from_slice(&encode_pair(12.34, WordOrder::HighFirst));
            regs[4..6].copy_from_slice(&encode_pair(-5.0, WordOrder::HighFirst));
            Ok(RawSample::Registers(regs))
        }
        fn shutdown(&mut self) -> Result<(), HalError> {
            Ok(())
        }
    }

    struct RefusingDriver;

    impl HalDriver for RefusingDriver {
        fn name(&self) -> &'static str {
            "refusing"
        }
        fn version(&self) -> &'static str {
            "0.0.0"
        }
        fn init(&mut self, config: &AcquisitionConfig) -> Result<(), HalError> {
            Err(HalError::ConnectFailed(format!("{}: no such port", config.name)))
        }
        fn fetch(&mut self, _: &RegisterRequest, _: Duration) -> Result<RawSample, HalError> {
            unreachable!("never connected")
        }
        fn shutdown(&mut self) -> Result<(), HalError> {
            Ok(())
        }
    }

    /// Never answers: every fetch blocks for the whole timeout.
    struct SilentDriver;

    impl HalDriver for SilentDriver {
        fn name(&self) -> &'static str {
            "silent"
        }
        fn version(&self) -> &'static str {
            "0.0.0"
        }
        fn init(&mut self, _config: &AcquisitionConfig) -> Result<(), HalError> {
            Ok(())
        }
        fn fetch(&mut self, _: &RegisterRequest, timeout: Duration) -> Result<RawSample, HalError> {
            std::thread::sleep(timeout);
            Err(HalError::Timeout("no response".to_string()))
        }
        fn shutdown(&mut self) -> Result<(), HalError> {
            Ok(())
        }
    }

    fn silent() -> Box<dyn HalDriver> {
        Box::new(SilentDriver)
    }

    fn fixed() -> Box<dyn HalDriver> {
        Box::new(FixedDriver)
    }

    fn refusing() -> Box<dyn HalDriver> {
        Box::new(RefusingDriver)
    }

    fn config(name: &str) -> AcquisitionConfig {
        AcquisitionConfig {
            name: name.to_string(),
            driver: "test".to_string(),
            period_ms: 5,
            ..Default::default()
        }
    }

    fn wait_for(mut cond: impl FnMut() -> bool) {
        let deadline = Instant::now() + Duration::from_secs(2);
        while !cond() {
            assert!(Instant::now() < deadline, "condition not reached");
            std::thread::sleep(Duration::from_millis(2));
        }
    }

    #[test]
    fn worker_writes_decoded_block_into_store() {
        let store = Arc::new(TelemetryStore::new());
        let (tx, _rx) = mpsc::sync_channel(4);
        let mut worker = AcquisitionWorker::new(config("main"), fixed, Arc::clone(&store), tx);

        assert_eq!(worker.state(), WorkerState::Disconnected);
        worker.start().unwrap();
        wait_for(|| store.boom_length() != 0.0);
        assert_eq!(worker.state(), WorkerState::Polling);
        assert_eq!(store.boom_length(), 12.34f32 as f64);
        assert_eq!(store.boom_angle(), -5.0);

        worker.stop();
        assert!(worker.join(Duration::from_secs(1)));
        assert_eq!(worker.state(), WorkerState::Stopped);
        assert!(worker.stats().cycle_count >= 1);
    }

    #[test]
    fn connect_failure_stops_and_reports() {
        let store = Arc::new(TelemetryStore::new());
        let (tx, rx) = mpsc::sync_channel(4);
        let mut worker = AcquisitionWorker::new(config("rtu"), refusing, Arc::clone(&store), tx);

        worker.start().unwrap();
        let fault = rx.recv_timeout(Duration::from_secs(1)).unwrap();
        assert_eq!(fault.worker, "rtu");
        assert!(fault.error.is_fatal());
        assert!(worker.join(Duration::from_secs(1)));
        assert_eq!(worker.state(), WorkerState::Stopped);
        assert_eq!(store.snapshot(), TelemetrySnapshot::default());
    }

    #[test]
    fn start_is_idempotent_and_restartable() {
        let store = Arc::new(TelemetryStore::new());
        let (tx, _rx) = mpsc::sync_channel(4);
        let mut worker = AcquisitionWorker::new(config("main"), fixed, store, tx);

        worker.start().unwrap();
        worker.start().unwrap();
        worker.stop();
        assert!(worker.join(Duration::from_secs(1)));

        worker.start().unwrap();
        wait_for(|| worker.state() == WorkerState::Polling);
        worker.stop();
        assert!(worker.join(Duration::from_secs(1)));
    }

    #[test]
    fn restart_right_after_fault_always_runs_again() {
        let store = Arc::new(TelemetryStore::new());
        let (tx, rx) = mpsc::sync_channel(4);
        let mut worker = AcquisitionWorker::new(config("rtu"), refusing, store, tx);

        worker.start().unwrap();
        for attempt in 1..=50 {
            let fault = rx.recv_timeout(Duration::from_secs(1)).unwrap();
            assert_eq!(fault.worker, "rtu", "attempt {attempt}");
            worker.start().unwrap();
        }
        // The 50th restart must have produced a fresh connect attempt.
        assert!(rx.recv_timeout(Duration::from_secs(1)).is_ok());
        assert!(worker.join(Duration::from_secs(1)));
    }

    #[test]
    fn stop_during_blocked_read_joins_within_timeout() {
        let store = Arc::new(TelemetryStore::new());
        let (tx, _rx) = mpsc::sync_channel(4);
        let mut cfg = config("slow");
        cfg.read_timeout_ms = 300;
        let mut worker = AcquisitionWorker::new(cfg, silent, store, tx);

        worker.start().unwrap();
        wait_for(|| worker.state() == WorkerState::Polling);
        std::thread::sleep(Duration::from_millis(50));

        let started = Instant::now();
        worker.stop();
        assert!(worker.join(Duration::from_millis(300 + 200)));
        assert!(started.elapsed() < Duration::from_millis(500));
        assert_eq!(worker.state(), WorkerState::Stopped);
    }

    #[test]
    fn safety_sink_sets_danger_level() {
        let store = Arc::new(TelemetryStore::new());
        let sink = sink_for(Profile::SafetySensor, WordOrder::HighFirst, Arc::clone(&store));
        sink.apply(RawSample::Registers(vec![1300, 5000, 5000, 0, 0, 0, 0]))
            .unwrap();
        assert_eq!(store.stability(), 30.0);
        assert_eq!(store.danger_level().as_i32(), 2);
    }

    #[test]
    fn short_block_writes_nothing() {
        let store = Arc::new(TelemetryStore::new());
        let sink = sink_for(Profile::MainCrane, WordOrder::HighFirst, Arc::clone(&store));
        let err = sink.apply(RawSample::Registers(vec![0x4141; 39])).unwrap_err();
        assert!(matches!(err, HalError::Decode(_)));
        assert_eq!(store.snapshot(), TelemetrySnapshot::default());
    }

    #[test]
    fn mismatched_sample_kind_is_transient() {
        let store = Arc::new(TelemetryStore::new());
        let sink = sink_for(Profile::LoadCells, WordOrder::HighFirst, store);
        let err = sink.apply(RawSample::Registers(vec![0; 40])).unwrap_err();
        assert!(!err.is_fatal());
    }
}
