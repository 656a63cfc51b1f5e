//! Passive Modbus RTU register server (`modbus_rtu_server`).
//!
//! The crane controller is the bus master and pushes its values into our
//! holding registers. A listener thread owns the serial line, answers
//! requests addressed to the configured unit, and applies writes to a
//! [`RegisterBank`]. `fetch` copies a window out of the bank and never waits
//! on the line.

use super::frame::{
    EX_ILLEGAL_ADDRESS, EX_ILLEGAL_FUNCTION, EX_ILLEGAL_VALUE, FC_READ_HOLDING, FC_WRITE_MULTIPLE,
    FC_WRITE_SINGLE, MAX_READ_COUNT, MAX_WRITE_COUNT,
    Request, RequestFrame, RtuError, exception_response, parse_request, read_response,
    write_multiple_response, write_single_response,
};
use super::open_port;
use crate::periodic::{StopSignal, WorkerThread, idle, should_log};
use crane_common::consts::{IDLE_TICK_MS, REGISTER_BANK_SIZE};
use crane_common::hal::config::AcquisitionConfig;
use crane_common::hal::driver::{HalDriver, HalError, RawSample, RegisterRequest};
use parking_lot::RwLock;
use std::io::{ErrorKind, Read, Write};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Driver name.
pub const DRIVER_NAME: &str = "modbus_rtu_server";

/// Driver version.
pub const DRIVER_VERSION: &str = "0.1.0";

const LISTENER_JOIN_TIMEOUT: Duration = Duration::from_secs(1);

/// Holding registers exposed to the bus master.
#[derive(Debug)]
pub struct RegisterBank {
    regs: RwLock<[u16; REGISTER_BANK_SIZE]>,
}

impl Default for RegisterBank {
    fn default() -> Self {
        Self {
            regs: RwLock::new([0; REGISTER_BANK_SIZE]),
        }
    }
}

impl RegisterBank {
    /// Create a zeroed bank.
    pub fn new() -> Self {
        Self::default()
    }

    fn range(address: u16, count: usize) -> Option<std::ops::Range<usize>> {
        let start = address as usize;
        let end = start.checked_add(count)?;
        (end <= REGISTER_BANK_SIZE).then_some(start..end)
    }

    /// Copy `count` registers starting at `address`.
    pub fn read(&self, address: u16, count: u16) -> Option<Vec<u16>> {
        let range = Self::range(address, count as usize)?;
        Some(self.regs.read()[range].to_vec())
    }

    /// Overwrite registers starting at `address`.
    pub fn write(&self, address: u16, values: &[u16]) -> bool {
        match Self::range(address, values.len()) {
            Some(range) => {
                self.regs.write()[range].copy_from_slice(values);
                true
            }
            None => false,
        }
    }
}

/// Answer one request for `unit`. Requests for other units get no reply.
pub fn handle_request(bank: &RegisterBank, unit: u8, frame: &RequestFrame) -> Option<Vec<u8>> {
    if frame.unit != unit {
        return None;
    }

    let response = match &frame.request {
        Request::ReadHolding { address, count } => {
            if *count == 0 || *count > MAX_READ_COUNT {
                exception_response(unit, FC_READ_HOLDING, EX_ILLEGAL_VALUE)
            } else {
                match bank.read(*address, *count) {
                    Some(regs) => read_response(unit, &regs),
                    None => exception_response(
                        unit,
                        FC_READ_HOLDING,
                        EX_ILLEGAL_ADDRESS,
                    ),
                }
            }
        }
        Request::WriteSingle { address, value } => {
            if bank.write(*address, &[*value]) {
                write_single_response(unit, *address, *value)
            } else {
                exception_response(unit, FC_WRITE_SINGLE, EX_ILLEGAL_ADDRESS)
            }
        }
        Request::WriteMultiple { address, values } => {
            if values.is_empty() || values.len() > MAX_WRITE_COUNT as usize {
                exception_response(unit, FC_WRITE_MULTIPLE, EX_ILLEGAL_VALUE)
            } else if bank.write(*address, values) {
                write_multiple_response(unit, *address, values.len() as u16)
            } else {
                exception_response(unit, FC_WRITE_MULTIPLE, EX_ILLEGAL_ADDRESS)
            }
        }
        Request::Unsupported { function } => {
            exception_response(unit, *function, EX_ILLEGAL_FUNCTION)
        }
    };
    Some(response)
}

/// Consume every complete frame at the start of `buf`, answering on `io`.
///
/// Bytes that fail the CRC are dropped one at a time until a valid frame
/// lines up again. Returns the number of frames handled.
pub fn serve_buffered<W>(
    io: &mut W,
    buf: &mut Vec<u8>,
    bank: &RegisterBank,
    unit: u8,
) -> Result<usize, HalError>
where
    W: Write + ?Sized,
{
    let mut handled = 0;
    loop {
        match parse_request(buf) {
            Ok(Some(frame)) => {
                buf.drain(..frame.len);
                handled += 1;
                if let Some(reply) = handle_request(bank, unit, &frame) {
                    io.write_all(&reply)?;
                    io.flush()?;
                }
            }
            Ok(None) => return Ok(handled),
            Err(RtuError::BadCrc { .. } | RtuError::Malformed(_)) => {
                buf.remove(0);
            }
            Err(e) => return Err(e.into()),
        }
    }
}

fn listen<P>(mut port: Box<P>, bank: Arc<RegisterBank>, unit: u8, stop: StopSignal, name: String)
where
    P: Read + Write + ?Sized,
{
    let mut buf = Vec::with_capacity(256);
    let mut chunk = [0u8; 256];
    let mut frames = 0u64;
    let mut read_errors = 0u64;
    let tick = Duration::from_millis(IDLE_TICK_MS);

    while !stop.is_requested() {
        match port.read(&mut chunk) {
            Ok(0) => continue,
            Ok(n) => buf.extend_from_slice(&chunk[..n]),
            Err(e) if matches!(e.kind(), ErrorKind::TimedOut | ErrorKind::WouldBlock) => {
                // Inter-frame silence: whatever is left is an incomplete
                // fragment that will never complete.
                if !buf.is_empty() {
                    debug!("{}: discarding {} stray bytes", name, buf.len());
                    buf.clear();
                }
                continue;
            }
            Err(e) => {
                read_errors += 1;
                if should_log(read_errors) {
                    warn!("{}: serial read failed (#{}): {}", name, read_errors, e);
                }
                idle(tick, &stop);
                continue;
            }
        }

        match serve_buffered(port.as_mut(), &mut buf, &bank, unit) {
            Ok(n) => frames += n as u64,
            Err(e) => warn!("{}: reply failed: {}", name, e),
        }
    }
    info!("{}: listener stopped after {} frames", name, frames);
}

/// Passive register server driver.
#[derive(Default)]
pub struct ModbusRtuServerDriver {
    bank: Arc<RegisterBank>,
    stop: StopSignal,
    listener: Option<WorkerThread>,
}

impl ModbusRtuServerDriver {
    /// Create a driver with a zeroed bank.
    pub fn new() -> Self {
        Self::default()
    }

    /// Shared handle to the register bank.
    pub fn bank(&self) -> Arc<RegisterBank> {
        Arc::clone(&self.bank)
    }
}

/// Factory function for the driver registry.
pub fn create_driver() -> Box<dyn HalDriver> {
    Box::new(ModbusRtuServerDriver::new())
}

impl HalDriver for ModbusRtuServerDriver {
    fn name(&self) -> &'static str {
        DRIVER_NAME
    }

    fn version(&self) -> &'static str {
        DRIVER_VERSION
    }

    fn init(&mut self, config: &AcquisitionConfig) -> Result<(), HalError> {
        let port = open_port(&config.transport, Duration::from_millis(IDLE_TICK_MS))?;
        let unit = config.transport.unit_id;
        let name = config.name.clone();
        info!("{}: serving unit {} on {:?}", name, unit, config.transport.port);

        self.stop.clear();
        let bank = Arc::clone(&self.bank);
        let stop = self.stop.clone();
        let thread_name = format!("rtu-srv-{name}");
        let listener = WorkerThread::spawn(&thread_name, move || {
            listen(port, bank, unit, stop, name);
        })
        .map_err(|e| HalError::ConnectFailed(format!("listener thread: {e}")))?;
        self.listener = Some(listener);
        Ok(())
    }

    fn fetch(
        &mut self,
        request: &RegisterRequest,
        _timeout: Duration,
    ) -> Result<RawSample, HalError> {
        self.bank
            .read(request.address, request.count)
            .map(RawSample::Registers)
            .ok_or_else(|| {
                HalError::ConfigError(format!(
                    "window {}+{} outside the {REGISTER_BANK_SIZE}-register bank",
                    request.address, request.count
                ))
            })
    }

    fn shutdown(&mut self) -> Result<(), HalError> {
        self.stop.request();
        if let Some(mut listener) = self.listener.take() {
            if !listener.join(LISTENER_JOIN_TIMEOUT) {
                return Err(HalError::Io("listener did not stop".to_string()));
            }
        }
        Ok(())
    }
}
