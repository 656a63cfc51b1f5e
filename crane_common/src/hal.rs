//! Hardware abstraction layer types shared by the gateway crates.
//!
//! - [`config`] - the gateway configuration file (`gateway.toml`)
//! - [`consts`] - driver names and HAL defaults
//! - [`driver`] - the transport driver trait and [`driver::HalError`]

pub mod config;
pub mod consts;
pub mod driver;
