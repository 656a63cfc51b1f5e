//! Prelude module for common re-exports.
//!
//! ```rust
//! use crane_common::prelude::*;
//! ```

// ─── Logging ────────────────────────────────────────────────────────
pub use crate::config::LogLevel;

// ─── Configuration ──────────────────────────────────────────────────
pub use crate::config::{ConfigError, ConfigLoader, SharedConfig};
pub use crate::hal::config::{
    AcquisitionConfig, GatewayConfig, MqttConfig, Profile, PublisherConfig, SupervisorConfig,
    TransportConfig,
};

// ─── Drivers ────────────────────────────────────────────────────────
pub use crate::hal::driver::{DriverFactory, HalDriver, HalError, RawSample, RegisterRequest};

// ─── Decoding ───────────────────────────────────────────────────────
pub use crate::registers::{DecodeError, WordOrder};
pub use crate::risk::{RiskAssessment, RiskLevel, assess};

// ─── Telemetry ──────────────────────────────────────────────────────
pub use crate::frame::{self, FrameError, WireRecord};
pub use crate::telemetry::{DetectedObject, DetectionSummary, TelemetrySnapshot, TelemetryStore};
