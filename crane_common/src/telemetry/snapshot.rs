//! Detection summary and snapshot helpers.
//!
//! The object-detection subsystem is external; it hands over a
//! [`DetectionSummary`] (in-process or as JSON over the message bus) which is
//! stored whole in one telemetry field.

use crate::telemetry::store::TelemetrySnapshot;
use serde::{Deserialize, Serialize};

/// One detected object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct DetectedObject {
    /// Distance to the object in metres, if the depth estimate succeeded.
    #[serde(default)]
    pub distance: Option<f64>,
    /// Horizontal centre, normalised 0.0 (left) to 1.0 (right).
    #[serde(default)]
    pub center: f64,
}

/// `{count, objects}` as produced by the detection subsystem.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct DetectionSummary {
    /// Number of detected objects.
    #[serde(default)]
    pub count: i32,
    /// Per-object details.
    #[serde(default)]
    pub objects: Vec<DetectedObject>,
}

impl DetectionSummary {
    /// Parse the JSON form `{"count": n, "objects": [{"distance": d, "center": c}]}`.
    pub fn from_json(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }

    /// Smallest known distance, or 0.0 when no object has one.
    pub fn nearest_distance(&self) -> f64 {
        self.objects
            .iter()
            .filter_map(|o| o.distance)
            .filter(|d| d.is_finite())
            .min_by(|a, b| a.total_cmp(b))
            .unwrap_or(0.0)
    }
}

impl TelemetrySnapshot {
    /// Nearest detected object distance, as carried in the wire frame.
    pub fn obj_distance(&self) -> f64 {
        self.detections.nearest_distance()
    }

    /// Detected object count, as carried in the wire frame.
    pub fn obj_count(&self) -> i32 {
        self.detections.count
    }
}
