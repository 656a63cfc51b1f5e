//! Crane Gateway Common Library
//!
//! Shared types for every gateway crate: configuration loading, register
//! decoding, risk classification, the telemetry store and the wire frame.
//!
//! # Module Structure
//!
//! - [`config`] - Configuration loading traits and types
//! - [`consts`] - Register layout, frame sizes, default timings
//! - [`hal`] - Gateway configuration file and the transport driver trait
//! - [`registers`] - Register / datagram decoding
//! - [`risk`] - Overturn-risk classification
//! - [`telemetry`] - Shared telemetry store and snapshots
//! - [`frame`] - Telemetry wire frame encoder / decoder
//! - [`prelude`] - Common re-exports for convenience
//!
//! # Usage
//!
//! ```rust
//! use crane_common::prelude::*;
//!
//! let store = TelemetryStore::new();
//! store.set_boom_length(10.5);
//! let frame = frame::encode(&store.snapshot());
//! assert_eq!(frame::decode(&frame).unwrap().boom_length, 10.5);
//! ```

pub mod config;
pub mod consts;
pub mod frame;
pub mod hal;
pub mod prelude;
pub mod registers;
pub mod risk;
pub mod telemetry;
