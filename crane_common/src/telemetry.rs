//! Shared machine state.
//!
//! - [`store`] - `TelemetryStore`, per-field locked latest values
//! - [`snapshot`] - snapshot helpers and the externally supplied
//!   `DetectionSummary`

pub mod snapshot;
pub mod store;

pub use snapshot::{DetectedObject, DetectionSummary};
pub use store::{Field, TelemetrySnapshot, TelemetryStore};
