//! HAL Core: worker supervision.
//!
//! The `HalCore` struct is the main entry point of the gateway. It owns the
//! single [`TelemetryStore`], every acquisition worker, the publisher and
//! the optional inbound worker, and passes them explicit handles; there is
//! no global state.
//!
//! ```text
//!  new()       validate config, resolve drivers, create store + workers
//!  start()     spawn every worker thread
//!  run()       drain the fault channel until the running flag clears;
//!              connect faults restart the worker (bounded, delayed)
//!  shutdown()  stop all ─► join each (bounded) ─► close messaging
//! ```

use crate::acquisition::{AcquisitionWorker, WorkerFault, WorkerState};
use crate::driver_registry::DriverRegistry;
use crate::identity::device_serial;
use crate::inbound::{InboundMessage, InboundTopics, InboundWorker};
use crate::publisher::{MessageTransport, PublisherWorker};
use crane_common::consts::{FAULT_CHANNEL_CAPACITY, IDLE_TICK_MS};
use crane_common::hal::config::{GatewayConfig, MqttConfig};
use crane_common::hal::driver::HalError;
use crane_common::telemetry::TelemetryStore;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

/// One supervised acquisition worker.
struct Supervised {
    worker: AcquisitionWorker,
    restarts: u32,
    restart_at: Option<Instant>,
}

/// HAL Core owns the store and supervises every worker.
pub struct HalCore {
    config: GatewayConfig,
    store: Arc<TelemetryStore>,
    workers: Vec<Supervised>,
    publisher: PublisherWorker,
    inbound: Option<InboundWorker>,
    transport: Arc<dyn MessageTransport>,
    faults: Receiver<WorkerFault>,
    running: Arc<AtomicBool>,
}

impl HalCore {
    /// Build the gateway from a configuration.
    ///
    /// # Arguments
    /// * `config` - Gateway configuration loaded from TOML
    /// * `registry` - Available transport drivers
    /// * `transport` - Outbound messaging (MQTT or log-only)
    /// * `inbound` - Inbound message source, if the transport has one
    ///
    /// # Errors
    /// Returns error if configuration validation fails or a worker names an
    /// unregistered driver.
    pub fn new(
        config: GatewayConfig,
        registry: &DriverRegistry,
        transport: Arc<dyn MessageTransport>,
        inbound: Option<Receiver<InboundMessage>>,
    ) -> Result<Self, HalError> {
        config.validate()?;

        let store = Arc::new(TelemetryStore::new());
        store.set_device_serial(device_serial(config.device.serial.as_deref()));

        let (fault_tx, faults) = mpsc::sync_channel(FAULT_CHANNEL_CAPACITY);

        let mut workers = Vec::with_capacity(config.acquisition.len());
        for acq in &config.acquisition {
            let factory = registry.get_factory(&acq.driver)?;
            info!(
                "  worker {}: driver={} profile={:?} period={}ms",
                acq.name, acq.driver, acq.profile, acq.period_ms
            );
            workers.push(Supervised {
                worker: AcquisitionWorker::new(
                    acq.clone(),
                    factory,
                    Arc::clone(&store),
                    fault_tx.clone(),
                ),
                restarts: 0,
                restart_at: None,
            });
        }

        let publisher = PublisherWorker::new(
            config.publisher.clone(),
            Arc::clone(&store),
            Arc::clone(&transport),
        );

        let inbound = inbound.map(|rx| {
            let mqtt = config.mqtt.clone().unwrap_or_else(MqttConfig::default);
            let topics = InboundTopics {
                inclination: mqtt.inclination_topic,
                detection: mqtt.detection_topic,
            };
            InboundWorker::new(topics, Arc::clone(&store), rx)
        });

        info!(
            "HalCore created with {} acquisition workers, device serial {}",
            workers.len(),
            store.device_serial()
        );

        Ok(Self {
            config,
            store,
            workers,
            publisher,
            inbound,
            transport,
            faults,
            running: Arc::new(AtomicBool::new(false)),
        })
    }

    /// Spawn every worker thread.
    pub fn start(&mut self) -> Result<(), HalError> {
        self.running.store(true, Ordering::SeqCst);
        for sup in &mut self.workers {
            sup.worker.start()?;
        }
        if let Some(inbound) = self.inbound.as_mut() {
            inbound.start()?;
        }
        self.publisher.start()?;
        info!("HalCore started");
        Ok(())
    }

    /// Supervise until the running flag clears.
    ///
    /// Blocks the calling thread. Stop latency is bounded by one idle tick.
    pub fn run(&mut self) -> Result<(), HalError> {
        let tick = Duration::from_millis(IDLE_TICK_MS);
        info!("Supervising {} workers...", self.workers.len());

        while self.running.load(Ordering::SeqCst) {
            match self.faults.recv_timeout(tick) {
                Ok(fault) => self.handle_fault(fault),
                Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => std::thread::sleep(tick),
            }
            self.restart_due()?;
        }

        info!("Supervisor loop stopped");
        Ok(())
    }

    fn handle_fault(&mut self, fault: WorkerFault) {
        let max_restarts = self.config.supervisor.max_restarts;
        let delay = self.config.supervisor.restart_delay();

        let Some(sup) = self
            .workers
            .iter_mut()
            .find(|s| s.worker.name() == fault.worker)
        else {
            warn!("fault from unknown worker {}: {}", fault.worker, fault.error);
            return;
        };

        if sup.restarts < max_restarts {
            sup.restarts += 1;
            sup.restart_at = Some(Instant::now() + delay);
            warn!(
                "{}: {}; restart {}/{} in {}ms",
                fault.worker,
                fault.error,
                sup.restarts,
                max_restarts,
                delay.as_millis()
            );
        } else {
            error!(
                "{}: {}; giving up after {} restarts",
                fault.worker, fault.error, sup.restarts
            );
        }
    }

    fn restart_due(&mut self) -> Result<(), HalError> {
        let now = Instant::now();
        for sup in &mut self.workers {
            if sup.restart_at.is_some_and(|at| at <= now) {
                sup.restart_at = None;
                info!("{}: restarting", sup.worker.name());
                sup.worker.start()?;
            }
        }
        Ok(())
    }

    /// Stop every worker and close messaging.
    ///
    /// Each join is bounded by `supervisor.join_timeout_ms`; a worker still
    /// running after that is reported and left behind.
    pub fn shutdown(&mut self) -> Result<(), HalError> {
        info!("Shutdown requested");
        self.running.store(false, Ordering::SeqCst);

        for sup in &self.workers {
            sup.worker.stop();
        }
        self.publisher.stop();
        if let Some(inbound) = self.inbound.as_ref() {
            inbound.stop();
        }

        let timeout = self.config.supervisor.join_timeout();
        let mut stragglers = 0;
        for sup in &mut self.workers {
            if !sup.worker.join(timeout) {
                warn!("{}: still running after {:?}", sup.worker.name(), timeout);
                stragglers += 1;
            } else {
                let stats = sup.worker.stats();
                debug!(
                    "{}: {} cycles, {} failed, {} late, max={}us",
                    sup.worker.name(),
                    stats.cycle_count,
                    stats.failed_cycles,
                    stats.late_cycles,
                    stats.max_cycle_time_us
                );
            }
        }
        if !self.publisher.join(timeout) {
            warn!("publisher: still running after {:?}", timeout);
            stragglers += 1;
        }
        if let Some(inbound) = self.inbound.as_mut() {
            if !inbound.join(timeout) {
                warn!("inbound: still running after {:?}", timeout);
                stragglers += 1;
            }
        }

        self.transport.close();

        if stragglers > 0 {
            warn!("Shutdown finished with {} workers still running", stragglers);
        } else {
            info!("All workers stopped");
        }
        Ok(())
    }

    /// Get the running flag for signal handlers.
    pub fn running_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.running)
    }

    /// The shared telemetry store.
    pub fn store(&self) -> Arc<TelemetryStore> {
        Arc::clone(&self.store)
    }

    /// Name and state of every acquisition worker.
    pub fn worker_states(&self) -> Vec<(String, WorkerState)> {
        self.workers
            .iter()
            .map(|s| (s.worker.name().to_string(), s.worker.state()))
            .collect()
    }

    /// Restarts performed so far for `worker`.
    pub fn restart_count(&self, worker: &str) -> Option<u32> {
        self.workers
            .iter()
            .find(|s| s.worker.name() == worker)
            .map(|s| s.restarts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::publisher::PublishError;
    use crane_common::frame;
    use crane_common::hal::config::{
        AcquisitionConfig, DeviceConfig, Profile, PublisherConfig, SupervisorConfig,
    };
    use crane_common::hal::driver::{HalDriver, RawSample, RegisterRequest};
    use parking_lot::Mutex;
    use std::sync::atomic::AtomicUsize;

    #[derive(Default)]
    struct CapturingTransport {
        frames: Mutex<Vec<Vec<u8>>>,
        closed: AtomicBool,
    }

    impl MessageTransport for CapturingTransport {
        fn publish(&self, _topic: &str, payload: &[u8]) -> Result<(), PublishError> {
            self.frames.lock().push(payload.to_vec());
            Ok(())
        }

        fn close(&self) {
            self.closed.store(true, Ordering::SeqCst);
        }
    }

    static REFUSED_CONNECTS: AtomicUsize = AtomicUsize::new(0);

    struct RefusingDriver;

    impl HalDriver for RefusingDriver {
        fn name(&self) -> &'static str {
            "refusing"
        }

        fn version(&self) -> &'static str {
            "0.0.0"
        }

        fn init(&mut self, _config: &AcquisitionConfig) -> Result<(), HalError> {
            REFUSED_CONNECTS.fetch_add(1, Ordering::SeqCst);
            Err(HalError::ConnectFailed("no such port".to_string()))
        }

        fn fetch(&mut self, _: &RegisterRequest, _: Duration) -> Result<RawSample, HalError> {
            Err(HalError::TransientRead("not open".to_string()))
        }

        fn shutdown(&mut self) -> Result<(), HalError> {
            Ok(())
        }
    }

    fn refusing() -> Box<dyn HalDriver> {
        Box::new(RefusingDriver)
    }

    fn gateway(driver: &str) -> GatewayConfig {
        GatewayConfig {
            device: DeviceConfig {
                serial: Some("TEST-0001".to_string()),
            },
            acquisition: vec![AcquisitionConfig {
                name: "main".to_string(),
                driver: driver.to_string(),
                profile: Profile::MainCrane,
                period_ms: 10,
                read_timeout_ms: 10,
                ..Default::default()
            }],
            publisher: PublisherConfig {
                period_ms: 10,
                topic: "Event/CraneTest/".to_string(),
            },
            supervisor: SupervisorConfig {
                join_timeout_ms: 1_000,
                max_restarts: 1,
                restart_delay_ms: 10,
            },
            ..Default::default()
        }
    }

    fn wait_for(mut cond: impl FnMut() -> bool) {
        let deadline = Instant::now() + Duration::from_secs(3);
        while !cond() {
            assert!(Instant::now() < deadline, "condition not reached");
            std::thread::sleep(Duration::from_millis(5));
        }
    }

    #[test]
    fn unknown_driver_is_rejected() {
        let transport = Arc::new(CapturingTransport::default());
        let result = HalCore::new(
            gateway("ethercat"),
            &DriverRegistry::with_builtin_drivers(),
            transport,
            None,
        );
        assert!(matches!(result, Err(HalError::DriverNotFound(_))));
    }

    #[test]
    fn simulated_gateway_publishes_frames() {
        let transport = Arc::new(CapturingTransport::default());
        let mut core = HalCore::new(
            gateway("simulation"),
            &DriverRegistry::with_builtin_drivers(),
            transport.clone(),
            None,
        )
        .unwrap();
        core.start().unwrap();

        let store = core.store();
        wait_for(|| store.boom_length() > 10.0);
        wait_for(|| {
            transport
                .frames
                .lock()
                .last()
                .and_then(|bytes| frame::decode(bytes).ok())
                .is_some_and(|record| record.boom_length > 10.0)
        });

        let started = Instant::now();
        core.shutdown().unwrap();
        assert!(started.elapsed() < Duration::from_secs(1));
        assert!(transport.closed.load(Ordering::SeqCst));
        assert_eq!(
            core.worker_states(),
            vec![("main".to_string(), WorkerState::Stopped)]
        );

        let record = frame::decode(transport.frames.lock().last().unwrap()).unwrap();
        assert_eq!(record.device_serial, "TEST-0001");
    }

    #[test]
    fn connect_fault_restarts_up_to_limit() {
        let mut registry = DriverRegistry::new();
        registry.register("refusing", refusing);
        let transport = Arc::new(CapturingTransport::default());
        let mut core = HalCore::new(gateway("refusing"), &registry, transport, None).unwrap();

        let running = core.running_flag();
        core.start().unwrap();
        let stopper = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(400));
            running.store(false, Ordering::SeqCst);
        });
        core.run().unwrap();
        stopper.join().unwrap();
        core.shutdown().unwrap();

        assert_eq!(core.restart_count("main"), Some(1));
        assert_eq!(REFUSED_CONNECTS.load(Ordering::SeqCst), 2);
        assert_eq!(
            core.worker_states(),
            vec![("main".to_string(), WorkerState::Stopped)]
        );
    }
}
