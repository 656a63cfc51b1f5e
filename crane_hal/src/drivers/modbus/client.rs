//! Modbus RTU master (`modbus_rtu`).
//!
//! Sends one 0x03 request per fetch and waits for the response within the
//! read timeout. Exception responses, CRC errors and silence are all
//! transient: the worker retries on its next period.

use super::frame::{parse_read_response, read_holding_request, response_len};
use super::open_port;
use crane_common::hal::config::AcquisitionConfig;
use crane_common::hal::driver::{HalDriver, HalError, RawSample, RegisterRequest};
use serialport::{ClearBuffer, SerialPort};
use std::io::{ErrorKind, Read, Write};
use std::time::{Duration, Instant};
use tracing::{debug, info};

/// Driver name.
pub const DRIVER_NAME: &str = "modbus_rtu";

/// Driver version.
pub const DRIVER_VERSION: &str = "0.1.0";

/// Modbus RTU master driver.
#[derive(Default)]
pub struct ModbusRtuDriver {
    port: Option<Box<dyn SerialPort>>,
}

impl ModbusRtuDriver {
    /// Create an unconnected driver.
    pub fn new() -> Self {
        Self::default()
    }
}

/// Factory function for the driver registry.
pub fn create_driver() -> Box<dyn HalDriver> {
    Box::new(ModbusRtuDriver::new())
}

/// Send a read request on `io` and collect the response.
pub fn transact<P>(io: &mut P, request: &RegisterRequest, timeout: Duration) -> Result<Vec<u16>, HalError>
where
    P: Read + Write + ?Sized,
{
    let req = read_holding_request(request.unit_id, request.address, request.count);
    io.write_all(&req)?;
    io.flush()?;

    let deadline = Instant::now() + timeout;
    let mut buf = Vec::with_capacity(5 + request.count as usize * 2);
    let mut chunk = [0u8; 256];

    loop {
        if let Some(len) = response_len(&buf) {
            if buf.len() >= len {
                buf.truncate(len);
                break;
            }
        }
        if Instant::now() >= deadline {
            return Err(HalError::Timeout(format!(
                "unit {}: {} of {} bytes received",
                request.unit_id,
                buf.len(),
                response_len(&buf).unwrap_or(5 + request.count as usize * 2)
            )));
        }
        match io.read(&mut chunk) {
            Ok(0) => {}
            Ok(n) => buf.extend_from_slice(&chunk[..n]),
            Err(e) if matches!(e.kind(), ErrorKind::TimedOut | ErrorKind::WouldBlock) => {}
            Err(e) => return Err(e.into()),
        }
    }

    Ok(parse_read_response(request.unit_id, request.count, &buf)?)
}

impl HalDriver for ModbusRtuDriver {
    fn name(&self) -> &'static str {
        DRIVER_NAME
    }

    fn version(&self) -> &'static str {
        DRIVER_VERSION
    }

    fn init(&mut self, config: &AcquisitionConfig) -> Result<(), HalError> {
        let port = open_port(&config.transport, config.read_timeout())?;
        info!(
            "{}: opened {} at {} baud",
            config.name,
            port.name().unwrap_or_default(),
            config.transport.baud_rate
        );
        self.port = Some(port);
        Ok(())
    }

    fn fetch(
        &mut self,
        request: &RegisterRequest,
        timeout: Duration,
    ) -> Result<RawSample, HalError> {
        let port = self
            .port
            .as_mut()
            .ok_or_else(|| HalError::TransientRead("port not open".to_string()))?;

        // Stale bytes from a late earlier response would corrupt this one.
        if let Err(e) = port.clear(ClearBuffer::Input) {
            debug!("input flush failed: {}", e);
        }
        port.set_timeout(timeout.min(Duration::from_millis(100)))
            .map_err(|e| HalError::Io(e.to_string()))?;

        transact(port.as_mut(), request, timeout).map(RawSample::Registers)
    }

    fn shutdown(&mut self) -> Result<(), HalError> {
        self.port = None;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::drivers::modbus::frame::{exception_response, read_response, FC_READ_HOLDING};
    use std::collections::VecDeque;

    /// Serial line stand-in: records writes, replays a scripted response in
    /// small chunks.
    struct ScriptedLine {
        written: Vec<u8>,
        reply: VecDeque<u8>,
    }

    impl Read for ScriptedLine {
        fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
            if self.reply.is_empty() {
                std::thread::sleep(Duration::from_millis(1));
                return Err(ErrorKind::TimedOut.into());
            }
            let n = buf.len().min(3).min(self.reply.len());
            for slot in buf.iter_mut().take(n) {
                *slot = self.reply.pop_front().unwrap_or_default();
            }
            Ok(n)
        }
    }

    impl Write for ScriptedLine {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.written.extend_from_slice(buf);
            Ok(buf.len())
        }
        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    fn line(reply: Vec<u8>) -> ScriptedLine {
        ScriptedLine {
            written: Vec::new(),
            reply: reply.into(),
        }
    }

    const SAFETY: RegisterRequest = RegisterRequest {
        unit_id: 1,
        address: 0,
        count: 7,
    };

    #[test]
    fn reads_safety_block() {
        let regs = [1500, 5000, 5000, 100, 200, 300, 400];
        let mut io = line(read_response(1, &regs));
        let got = transact(&mut io, &SAFETY, Duration::from_secs(1)).unwrap();
        assert_eq!(got, regs);
        assert_eq!(io.written, read_holding_request(1, 0, 7));
    }

    #[test]
    fn exception_is_transient_error() {
        let mut io = line(exception_response(1, FC_READ_HOLDING, 0x02));
        let err = transact(&mut io, &SAFETY, Duration::from_secs(1)).unwrap_err();
        assert!(matches!(err, HalError::TransientRead(_)));
    }

    #[test]
    fn silence_times_out() {
        let mut io = line(Vec::new());
        let start = Instant::now();
        let err = transact(&mut io, &SAFETY, Duration::from_millis(30)).unwrap_err();
        assert!(matches!(err, HalError::Timeout(_)));
        assert!(start.elapsed() < Duration::from_millis(500));
    }

    #[test]
    fn truncated_response_times_out() {
        let full = read_response(1, &[0; 7]);
        let mut io = line(full[..full.len() - 2].to_vec());
        let err = transact(&mut io, &SAFETY, Duration::from_millis(30)).unwrap_err();
        assert!(matches!(err, HalError::Timeout(_)));
    }
}
