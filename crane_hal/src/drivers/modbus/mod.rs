//! Modbus RTU drivers over a serial line.
//!
//! - [`client`] - `modbus_rtu`, a master polling a slave device
//! - [`server`] - `modbus_rtu_server`, a passive register bank written by
//!   the crane controller
//! - [`frame`] - RTU framing shared by both

pub mod client;
pub mod frame;
pub mod server;

use crane_common::hal::config::{Parity, TransportConfig};
use crane_common::hal::driver::HalError;
use serialport::{DataBits, SerialPort, StopBits};
use std::time::Duration;

fn data_bits(bits: u8) -> Result<DataBits, HalError> {
    match bits {
        5 => Ok(DataBits::Five),
        6 => Ok(DataBits::Six),
        7 => Ok(DataBits::Seven),
        8 => Ok(DataBits::Eight),
        other => Err(HalError::ConfigError(format!("unsupported data_bits {other}"))),
    }
}

fn stop_bits(bits: u8) -> Result<StopBits, HalError> {
    match bits {
        1 => Ok(StopBits::One),
        2 => Ok(StopBits::Two),
        other => Err(HalError::ConfigError(format!("unsupported stop_bits {other}"))),
    }
}

fn parity(parity: Parity) -> serialport::Parity {
    match parity {
        Parity::None => serialport::Parity::None,
        Parity::Even => serialport::Parity::Even,
        Parity::Odd => serialport::Parity::Odd,
    }
}

/// Open the serial line described by `transport`.
///
/// Any failure to open is a connect failure.
pub fn open_port(
    transport: &TransportConfig,
    timeout: Duration,
) -> Result<Box<dyn SerialPort>, HalError> {
    let path = transport
        .port
        .as_deref()
        .ok_or_else(|| HalError::ConfigError("transport.port is not set".to_string()))?;

    serialport::new(path, transport.baud_rate)
        .data_bits(data_bits(transport.data_bits)?)
        .parity(parity(transport.parity))
        .stop_bits(stop_bits(transport.stop_bits)?)
        .timeout(timeout)
        .open()
        .map_err(|e| HalError::ConnectFailed(format!("{path}: {e}")))
}
