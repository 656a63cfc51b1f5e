//! Overturn-risk classification.
//!
//! Maps a stability percentage onto an ordinal [`RiskLevel`]. Boundaries are
//! inclusive on the lower-severity side: 75.0 and 50.0 are both `Caution`.

use serde::Serialize;

/// Ordinal risk level, 0 (safe) through 3 (danger).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Default)]
#[repr(u8)]
pub enum RiskLevel {
    /// Stability above 75 %.
    #[default]
    Safe = 0,
    /// Stability in `[50, 75]`.
    Caution = 1,
    /// Stability in `[25, 50)`.
    Warning = 2,
    /// Everything else, including negative and NaN values.
    Danger = 3,
}

impl RiskLevel {
    /// Numeric level as carried on the wire.
    pub fn as_i32(self) -> i32 {
        self as i32
    }

    /// Short label.
    pub fn label(self) -> &'static str {
        match self {
            Self::Safe => "safe",
            Self::Caution => "caution",
            Self::Warning => "warning",
            Self::Danger => "danger",
        }
    }

    /// Indicator colour used by operator displays.
    pub fn color(self) -> &'static str {
        match self {
            Self::Safe => "green",
            Self::Caution => "yellow",
            Self::Warning => "orange",
            Self::Danger => "red",
        }
    }

    /// Operator message.
    pub fn message(self) -> &'static str {
        match self {
            Self::Safe => "Operating stably within the normal range.",
            Self::Caution => "Approaching the working limit. Proceed with caution.",
            Self::Warning => "Hazardous level. Re-check the working load and radius.",
            Self::Danger => "Overturn risk! Stop all operations immediately!",
        }
    }
}

/// Result of [`assess`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RiskAssessment {
    /// Classified level.
    pub level: RiskLevel,
    /// Short label, see [`RiskLevel::label`].
    pub label: &'static str,
    /// Indicator colour.
    pub color: &'static str,
    /// Operator message.
    pub message: &'static str,
}

/// Classify a stability percentage.
pub fn assess(stability_pct: f64) -> RiskAssessment {
    let level = if stability_pct > 75.0 {
        RiskLevel::Safe
    } else if (50.0..=75.0).contains(&stability_pct) {
        RiskLevel::Caution
    } else if (25.0..50.0).contains(&stability_pct) {
        RiskLevel::Warning
    } else {
        RiskLevel::Danger
    };

    RiskAssessment {
        level,
        label: level.label(),
        color: level.color(),
        message: level.message(),
    }
}
