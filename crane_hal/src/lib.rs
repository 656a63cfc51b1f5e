//! # Crane HAL Library
//!
//! Field-bus acquisition and telemetry publishing for crane gateways.
//!
//! Transport drivers implement the `HalDriver` trait defined in
//! `crane_common::hal::driver`; workers decode what they read into one shared
//! `TelemetryStore`, and the publisher frames snapshots onto the message bus.
//!
//! # Module Structure
//!
//! - [`core`] - HalCore struct, worker supervision and shutdown
//! - [`driver_registry`] - Driver factory registration
//! - [`drivers`] - Modbus RTU, UDP and simulation drivers
//! - [`acquisition`] - Per-device periodic read workers
//! - [`publisher`] - Periodic frame publisher and the transport trait
//! - [`mqtt`] - MQTT transport
//! - [`inbound`] - Inclination and vision messages into the store
//! - [`identity`] - Device serial discovery
//! - [`periodic`] - Stop signal, periodic loop, bounded joins
//!
//! # Architecture
//!
//! ```text
//! ┌───────────────────────────────────────────────────────────────────┐
//! │                        crane_hal (single crate)                   │
//! │  ┌──────────────┐    ┌────────────────┐    ┌──────────────────┐   │
//! │  │ Acquisition  │───►│ TelemetryStore │◄───│  InboundWorker   │   │
//! │  │ workers (N)  │    │  (per-field    │    │  (MQTT topics)   │   │
//! │  └──────┬───────┘    │   locks)       │    └──────────────────┘   │
//! │         │            └───────┬────────┘                           │
//! │         ▼                    ▼                                    │
//! │  ┌──────────────┐    ┌────────────────┐    ┌──────────────────┐   │
//! │  │  HalDriver   │    │ PublisherWorker│───►│ MessageTransport │   │
//! │  │  (trait)     │    │ (CRC32 frames) │    │ (MQTT / log)     │   │
//! │  └──────────────┘    └────────────────┘    └──────────────────┘   │
//! │                 all supervised by HalCore                         │
//! └───────────────────────────────────────────────────────────────────┘
//! ```

#![warn(missing_docs)]

pub mod acquisition;
pub mod core;
pub mod driver_registry;
pub mod drivers;
pub mod identity;
pub mod inbound;
pub mod mqtt;
pub mod periodic;
pub mod publisher;

// Re-export key types for convenience
pub use crate::acquisition::{AcquisitionWorker, WorkerFault, WorkerState};
pub use crate::core::HalCore;
pub use crate::driver_registry::DriverRegistry;
pub use crate::mqtt::MqttTransport;
pub use crate::publisher::{LogPublisher, MessageTransport, PublishError, PublisherWorker};
