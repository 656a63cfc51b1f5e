//! Gateway integration tests: drivers, workers and supervisor together,
//! with no serial hardware and no broker.

use crane_common::frame::{self, WireRecord};
use crane_common::hal::config::{
    AcquisitionConfig, DeviceConfig, GatewayConfig, Profile, PublisherConfig, SupervisorConfig,
    TransportConfig,
};
use crane_common::hal::driver::{HalError, RegisterRequest};
use crane_common::registers::{
    LoadCellReading, WordOrder, decode_block, encode_load_cells, encode_pair,
};
use crane_hal::core::HalCore;
use crane_hal::driver_registry::DriverRegistry;
use crane_hal::drivers::modbus::client::transact;
use crane_hal::drivers::modbus::server::{RegisterBank, serve_buffered};
use crane_hal::inbound::InboundMessage;
use crane_hal::publisher::{MessageTransport, PublishError};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::io::{self, ErrorKind, Read, Write};
use std::net::UdpSocket;
use std::sync::Arc;
use std::sync::mpsc;
use std::time::{Duration, Instant};

#[derive(Default)]
struct CapturingTransport {
    frames: Mutex<Vec<Vec<u8>>>,
}

impl CapturingTransport {
    fn last_record(&self) -> Option<WireRecord> {
        self.frames
            .lock()
            .last()
            .map(|bytes| frame::decode(bytes).expect("published frame must decode"))
    }
}

impl MessageTransport for CapturingTransport {
    fn publish(&self, _topic: &str, payload: &[u8]) -> Result<(), PublishError> {
        self.frames.lock().push(payload.to_vec());
        Ok(())
    }
}

fn wait_for(mut cond: impl FnMut() -> bool) {
    let deadline = Instant::now() + Duration::from_secs(5);
    while !cond() {
        assert!(Instant::now() < deadline, "condition not reached");
        std::thread::sleep(Duration::from_millis(10));
    }
}

fn base_config(acquisition: Vec<AcquisitionConfig>) -> GatewayConfig {
    GatewayConfig {
        device: DeviceConfig {
            serial: Some("GW-TEST".to_string()),
        },
        acquisition,
        publisher: PublisherConfig {
            period_ms: 20,
            topic: "Event/CraneTest/".to_string(),
        },
        supervisor: SupervisorConfig {
            join_timeout_ms: 1_000,
            max_restarts: 0,
            restart_delay_ms: 10,
        },
        ..Default::default()
    }
}

// ─── Modbus master against the register-bank server ─────────────────

/// In-memory line: whatever the master writes is served by the bank, and
/// the reply is queued for the master to read.
struct Loopback {
    bank: RegisterBank,
    unit: u8,
    rx: Vec<u8>,
    reply: VecDeque<u8>,
}

impl Write for Loopback {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.rx.extend_from_slice(buf);
        let mut out = Vec::new();
        serve_buffered(&mut out, &mut self.rx, &self.bank, self.unit)
            .map_err(|e| io::Error::other(e.to_string()))?;
        self.reply.extend(out);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl Read for Loopback {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.reply.is_empty() {
            return Err(ErrorKind::TimedOut.into());
        }
        let n = buf.len().min(self.reply.len());
        for slot in buf.iter_mut().take(n) {
            *slot = self.reply.pop_front().unwrap_or_default();
        }
        Ok(n)
    }
}

#[test]
fn master_reads_block_pushed_into_server_bank() {
    let bank = RegisterBank::new();
    let mut regs = [0u16; 40];
    regs[2..4].copy_from_slice(&encode_pair(12.5, WordOrder::HighFirst));
    regs[12..14].copy_from_slice(&encode_pair(3.25, WordOrder::HighFirst));
    assert!(bank.write(0, &regs));

    let mut line = Loopback {
        bank,
        unit: 2,
        rx: Vec::new(),
        reply: VecDeque::new(),
    };
    let request = RegisterRequest {
        unit_id: 2,
        address: 0,
        count: 40,
    };
    let got = transact(&mut line, &request, Duration::from_millis(200)).unwrap();
    let block = decode_block(&got, WordOrder::HighFirst).unwrap();
    assert_eq!(block.boom_length, 12.5);
    assert_eq!(block.load_weight, 3.25);
}

#[test]
fn master_times_out_on_foreign_unit() {
    let mut line = Loopback {
        bank: RegisterBank::new(),
        unit: 2,
        rx: Vec::new(),
        reply: VecDeque::new(),
    };
    let request = RegisterRequest {
        unit_id: 9,
        address: 0,
        count: 7,
    };
    let err = transact(&mut line, &request, Duration::from_millis(30)).unwrap_err();
    assert!(matches!(err, HalError::Timeout(_)));
}

// ─── Full gateway ───────────────────────────────────────────────────

fn free_udp_addr() -> String {
    let probe = UdpSocket::bind("127.0.0.1:0").unwrap();
    probe.local_addr().unwrap().to_string()
}

#[test]
fn gateway_publishes_simulated_and_udp_data() {
    let bind = free_udp_addr();
    let config = base_config(vec![
        AcquisitionConfig {
            name: "main".to_string(),
            driver: "simulation".to_string(),
            profile: Profile::MainCrane,
            period_ms: 20,
            ..Default::default()
        },
        AcquisitionConfig {
            name: "safety".to_string(),
            driver: "simulation".to_string(),
            profile: Profile::SafetySensor,
            period_ms: 20,
            ..Default::default()
        },
        AcquisitionConfig {
            name: "cells".to_string(),
            driver: "udp".to_string(),
            profile: Profile::LoadCells,
            period_ms: 20,
            read_timeout_ms: 50,
            transport: TransportConfig {
                bind: Some(bind.clone()),
                ..Default::default()
            },
            ..Default::default()
        },
    ]);

    let transport = Arc::new(CapturingTransport::default());
    let mut core = HalCore::new(
        config,
        &DriverRegistry::with_builtin_drivers(),
        transport.clone(),
        None,
    )
    .unwrap();
    core.start().unwrap();

    let sender = UdpSocket::bind("127.0.0.1:0").unwrap();
    let datagram = encode_load_cells(&LoadCellReading {
        cells: [1.5, 1.5, 1.5, 2.5, 2.5, 2.5],
        roll_over_flag: 1,
    });
    let store = core.store();
    wait_for(|| {
        sender.send_to(&datagram, &bind).unwrap();
        store.roll_over_flag() == 1
    });
    wait_for(|| {
        transport
            .last_record()
            .is_some_and(|r| r.boom_length > 10.0 && r.danger_level == 0)
    });

    core.shutdown().unwrap();

    let record = transport.last_record().unwrap();
    assert_eq!(record.device_serial, "GW-TEST");
    assert_eq!(store.load_cells(), [1.5, 1.5, 1.5, 2.5, 2.5, 2.5]);
}

#[test]
fn inbound_messages_reach_the_frame() {
    let (tx, rx) = mpsc::sync_channel(8);
    let transport = Arc::new(CapturingTransport::default());
    let mut core = HalCore::new(
        base_config(Vec::new()),
        &DriverRegistry::with_builtin_drivers(),
        transport.clone(),
        Some(rx),
    )
    .unwrap();
    core.start().unwrap();

    tx.send(InboundMessage {
        topic: "Event/T-MDS/YJSensing/42/".to_string(),
        payload: br#"{"INCLINATION_X":[2.0],"INCLINATION_Y":[-1.0]}"#.to_vec(),
    })
    .unwrap();
    tx.send(InboundMessage {
        topic: "Event/CraneVision/".to_string(),
        payload: br#"{"count":2,"objects":[{"distance":4.5},{"distance":2.5}]}"#.to_vec(),
    })
    .unwrap();

    wait_for(|| {
        transport.last_record().is_some_and(|r| {
            r.body_angle_x == 2 && r.body_angle_y == -1 && r.obj_count == 2
        })
    });
    core.shutdown().unwrap();

    let record = transport.last_record().unwrap();
    assert_eq!(record.obj_distance, 2.5);
}

#[test]
fn shutdown_is_bounded_with_slow_periods() {
    let mut config = base_config(vec![AcquisitionConfig {
        name: "main".to_string(),
        driver: "simulation".to_string(),
        profile: Profile::MainCrane,
        period_ms: 60_000,
        ..Default::default()
    }]);
    config.publisher.period_ms = 60_000;

    let transport = Arc::new(CapturingTransport::default());
    let mut core = HalCore::new(
        config,
        &DriverRegistry::with_builtin_drivers(),
        transport,
        None,
    )
    .unwrap();
    core.start().unwrap();
    std::thread::sleep(Duration::from_millis(50));

    let started = Instant::now();
    core.shutdown().unwrap();
    assert!(started.elapsed() < Duration::from_millis(900));
}
