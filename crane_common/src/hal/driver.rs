//! Transport driver trait and error types.
//!
//! This module defines:
//! - `HalDriver` trait - Interface for pluggable field-bus transports
//! - `HalError` enum - Error types for HAL operations
//! - `DriverFactory` type alias - Factory function type
//! - `RegisterRequest` / `RawSample` - what a worker asks for and gets back

use crate::hal::config::AcquisitionConfig;
use crate::registers::DecodeError;
use std::time::Duration;
use thiserror::Error;

/// Error types for HAL operations.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum HalError {
    /// Opening the transport failed. Stops the worker.
    #[error("Connect failed: {0}")]
    ConnectFailed(String),

    /// No response within the read timeout.
    #[error("Read timed out: {0}")]
    Timeout(String),

    /// Read failed but the transport is still usable.
    #[error("Transient read error: {0}")]
    TransientRead(String),

    /// Data arrived but could not be decoded.
    #[error("Decode error: {0}")]
    Decode(#[from] DecodeError),

    /// Configuration error
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Driver not found
    #[error("Driver not found: {0}")]
    DriverNotFound(String),

    /// OS-level I/O error
    #[error("I/O error: {0}")]
    Io(String),
}

impl HalError {
    /// True when the worker cannot continue and must stop.
    ///
    /// Everything except a connect failure is recovered by retrying on the
    /// next period.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::ConnectFailed(_))
    }
}

impl From<std::io::Error> for HalError {
    fn from(err: std::io::Error) -> Self {
        match err.kind() {
            std::io::ErrorKind::TimedOut | std::io::ErrorKind::WouldBlock => {
                Self::Timeout(err.to_string())
            }
            _ => Self::Io(err.to_string()),
        }
    }
}

/// Factory function type for creating driver instances.
pub type DriverFactory = fn() -> Box<dyn HalDriver>;

/// Register window a worker reads every period.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegisterRequest {
    /// Modbus unit (slave) id.
    pub unit_id: u8,
    /// First holding register.
    pub address: u16,
    /// Number of registers.
    pub count: u16,
}

/// One raw read from a transport.
#[derive(Debug, Clone, PartialEq)]
pub enum RawSample {
    /// Holding registers, `count` long.
    Registers(Vec<u16>),
    /// One datagram payload.
    Datagram(Vec<u8>),
}

/// Trait defining the interface for transport drivers.
///
/// Each acquisition worker owns one driver instance, created from a
/// [`DriverFactory`] every time the worker starts.
///
/// # Lifecycle
///
/// 1. `init()` - open the port / socket (worker state `Connecting`)
/// 2. `fetch()` - once per period (worker state `Polling`)
/// 3. `shutdown()` - release the transport (worker state `Stopping`)
///
/// # Timing Contracts
///
/// | Operation | Max Duration |
/// |-----------|--------------|
/// | `init()` | bounded by the OS open call |
/// | `fetch()` | `timeout` |
/// | `shutdown()` | 1 second |
pub trait HalDriver: Send {
    /// Returns the driver's unique identifier (e.g., "modbus_rtu", "udp").
    fn name(&self) -> &'static str;

    /// Returns the driver's semantic version.
    fn version(&self) -> &'static str;

    /// Open the transport described by the worker configuration.
    ///
    /// # Errors
    /// `HalError::ConnectFailed` if the port or socket cannot be opened.
    fn init(&mut self, config: &AcquisitionConfig) -> Result<(), HalError>;

    /// Perform one bounded read.
    ///
    /// Must return within roughly `timeout`; a missing response is
    /// `HalError::Timeout`, never an indefinite block.
    fn fetch(&mut self, request: &RegisterRequest, timeout: Duration)
    -> Result<RawSample, HalError>;

    /// Release the transport.
    fn shutdown(&mut self) -> Result<(), HalError>;
}
