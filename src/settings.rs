//! Optimizer Settings
//!
//! Tunables for one [`Optimizer`](crate::Optimizer). Every field has a
//! default, so a JSON document only needs the keys it changes:
//!
//! ```rust,ignore
//! let settings = OptimizerSettings::from_json_str(r#"{ "target_fps": 30.0 }"#)?;
//! ```
//!
//! Settings are read once at construction and never persisted.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::errors::{GovernorError, Result};
use crate::instancing::DEFAULT_INSTANCING_THRESHOLD;
use crate::metrics::DEFAULT_HISTORY_CAPACITY;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OptimizerSettings {
    /// Frame rate the controller steers towards.
    pub target_fps: f32,
    /// Number of frames kept in the metrics history.
    pub history_capacity: usize,
    /// A group must be strictly larger than this to be instanced.
    pub instancing_threshold: usize,
    /// Run the automatic instancing pass inside `optimize()`.
    pub auto_instancing: bool,
    /// Wall-clock interval between controller ticks.
    pub controller_interval_ms: u64,
    /// Degrade when average fps drops below `target_fps × degrade_ratio`.
    pub degrade_ratio: f32,
    /// Restore when average fps rises above `target_fps × restore_ratio`.
    pub restore_ratio: f32,
    /// Pixel ratio change per controller step.
    pub pixel_ratio_step: f32,
    /// Factor applied to the LOD distance multiplier per degrade step.
    pub lod_shrink_factor: f32,
}

impl Default for OptimizerSettings {
    fn default() -> Self {
        Self {
            target_fps: 60.0,
            history_capacity: DEFAULT_HISTORY_CAPACITY,
            instancing_threshold: DEFAULT_INSTANCING_THRESHOLD,
            auto_instancing: true,
            controller_interval_ms: 1000,
            degrade_ratio: 0.8,
            restore_ratio: 0.95,
            pixel_ratio_step: 0.25,
            lod_shrink_factor: 0.8,
        }
    }
}

impl OptimizerSettings {
    /// Parses and validates settings from JSON. Missing keys take defaults.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let settings: Self = serde_json::from_str(json)?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn to_json_string(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Checks value ranges.
    pub fn validate(&self) -> Result<()> {
        let invalid = |name, reason| Err(GovernorError::InvalidSetting { name, reason });

        if !(self.target_fps.is_finite() && self.target_fps > 0.0) {
            return invalid("target_fps", "must be a positive number");
        }
        if self.history_capacity == 0 {
            return invalid("history_capacity", "must be at least 1");
        }
        if self.controller_interval_ms == 0 {
            return invalid("controller_interval_ms", "must be at least 1");
        }
        if !(self.degrade_ratio > 0.0 && self.degrade_ratio < self.restore_ratio) {
            return invalid("degrade_ratio", "must be positive and below restore_ratio");
        }
        if !(self.pixel_ratio_step.is_finite() && self.pixel_ratio_step > 0.0) {
            return invalid("pixel_ratio_step", "must be a positive number");
        }
        if !(self.lod_shrink_factor > 0.0 && self.lod_shrink_factor < 1.0) {
            return invalid("lod_shrink_factor", "must be in (0, 1)");
        }
        Ok(())
    }

    #[must_use]
    pub fn controller_interval(&self) -> Duration {
        Duration::from_millis(self.controller_interval_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_json_keeps_defaults() {
        let settings = OptimizerSettings::from_json_str(r#"{ "target_fps": 30.0 }"#).unwrap();
        assert_eq!(settings.target_fps, 30.0);
        assert_eq!(settings.instancing_threshold, 10);
        assert_eq!(settings.controller_interval(), Duration::from_secs(1));
    }

    #[test]
    fn rejects_out_of_range_values() {
        let err = OptimizerSettings::from_json_str(r#"{ "lod_shrink_factor": 1.5 }"#).unwrap_err();
        assert!(matches!(
            err,
            GovernorError::InvalidSetting {
                name: "lod_shrink_factor",
                ..
            }
        ));
        assert!(OptimizerSettings::from_json_str("{ not json").is_err());
    }
}
