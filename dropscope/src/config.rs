//! Analysis parameters.
//!
//! One immutable [`AnalysisConfig`] is handed to every pipeline invocation;
//! nothing about an analysis lives in process-wide state. The heuristic
//! constants of the pipeline are named fields here so they can be tuned from
//! a JSON file without touching the algorithms.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::image_proc::detection::hough::HoughParams;
use crate::image_proc::detection::overlap::OverlapSettings;
use crate::image_proc::thresholding::ThresholdSettings;

/// Largest accepted search radius, in pixels.
pub const RADIUS_LIMIT: i32 = 1 << 16;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("invalid configuration: {0}")]
    Invalid(String),
    #[error("failed to read config {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Parameters for a droplet analysis run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    /// Smallest droplet radius searched for, in pixels
    pub min_radius: i32,
    /// Largest droplet radius searched for, in pixels
    pub max_radius: i32,
    /// Inverse accumulator resolution of the circle detector
    pub dp: f64,
    /// Upper edge threshold of the circle detector
    pub param1: f64,
    /// Accumulator threshold of the circle detector
    pub param2: f64,
    /// Keep (and write) every intermediate raster
    pub debug: bool,

    /// Mask mean above which the threshold is recomputed
    pub noise_ceiling: f64,
    /// Mask mean at or above which detections are discarded
    pub quality_gate: f64,
    /// Background fraction above which a circle is a false positive
    pub false_positive_fraction: f64,
    /// Overlap regions must exceed this multiple of `max_radius²`
    pub merge_area_factor: f64,
    /// Search window padding around an overlap region, per side
    pub merge_padding: f64,
    pub max_rethreshold_passes: usize,

    /// Wall-clock budget for one image's re-threshold loop
    pub deadline: Option<Duration>,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            min_radius: 5,
            max_radius: 30,
            dp: 1.0,
            param1: 15.0,
            param2: 15.0,
            debug: false,
            noise_ceiling: 40.0,
            quality_gate: 150.0,
            false_positive_fraction: 0.2,
            merge_area_factor: 0.5,
            merge_padding: 0.25,
            max_rethreshold_passes: 20,
            deadline: None,
        }
    }
}

impl AnalysisConfig {
    /// Reject parameter combinations the pipeline cannot work with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.min_radius < 0 {
            return Err(ConfigError::Invalid(format!(
                "min_radius must be non-negative, got {}",
                self.min_radius
            )));
        }
        if self.max_radius > RADIUS_LIMIT {
            return Err(ConfigError::Invalid(format!(
                "max_radius must not exceed {RADIUS_LIMIT}, got {}",
                self.max_radius
            )));
        }
        if self.max_radius < self.min_radius {
            return Err(ConfigError::Invalid(format!(
                "max_radius ({}) is smaller than min_radius ({})",
                self.max_radius, self.min_radius
            )));
        }
        if !(self.dp > 0.0) {
            return Err(ConfigError::Invalid(format!("dp must be positive, got {}", self.dp)));
        }
        if !(self.param1 > 0.0) || !(self.param2 > 0.0) {
            return Err(ConfigError::Invalid(format!(
                "param1 and param2 must be positive, got {} and {}",
                self.param1, self.param2
            )));
        }
        if !(0.0..=1.0).contains(&self.false_positive_fraction) {
            return Err(ConfigError::Invalid(format!(
                "false_positive_fraction must lie in [0, 1], got {}",
                self.false_positive_fraction
            )));
        }
        if !(self.merge_padding >= 0.0) || !(self.merge_area_factor >= 0.0) {
            return Err(ConfigError::Invalid(
                "merge_padding and merge_area_factor must be non-negative".to_string(),
            ));
        }
        if !(0.0..=255.0).contains(&self.noise_ceiling) || !(0.0..=255.0).contains(&self.quality_gate)
        {
            return Err(ConfigError::Invalid(
                "noise_ceiling and quality_gate are gray levels in [0, 255]".to_string(),
            ));
        }
        Ok(())
    }

    /// Load from a JSON file. Missing fields take their defaults.
    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let json = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        let config: AnalysisConfig = serde_json::from_str(&json)?;
        config.validate()?;
        Ok(config)
    }

    /// Save as pretty-printed JSON.
    pub fn save_to_file(&self, path: &Path) -> Result<(), ConfigError> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })
    }

    /// First-pass detector parameters.
    pub fn hough_params(&self) -> HoughParams {
        HoughParams::new(
            self.dp,
            self.param1,
            self.param2,
            self.min_radius,
            self.max_radius,
        )
    }

    pub fn threshold_settings(&self) -> ThresholdSettings {
        ThresholdSettings {
            noise_ceiling: self.noise_ceiling,
            max_passes: self.max_rethreshold_passes,
        }
    }

    pub fn overlap_settings(&self) -> OverlapSettings {
        OverlapSettings {
            detection: self.hough_params(),
            merge_area_factor: self.merge_area_factor,
            merge_padding: self.merge_padding,
            false_positive_fraction: self.false_positive_fraction,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_defaults_are_valid() {
        let config = AnalysisConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.hough_params().min_dist, 11.0);
    }

    #[test]
    fn test_validation_failures() {
        let bad_radius = AnalysisConfig {
            min_radius: 20,
            max_radius: 10,
            ..Default::default()
        };
        assert!(matches!(bad_radius.validate(), Err(ConfigError::Invalid(_))));

        let bad_dp = AnalysisConfig {
            dp: 0.0,
            ..Default::default()
        };
        assert!(bad_dp.validate().is_err());

        let bad_param = AnalysisConfig {
            param2: f64::NAN,
            ..Default::default()
        };
        assert!(bad_param.validate().is_err());

        let bad_fraction = AnalysisConfig {
            false_positive_fraction: 1.5,
            ..Default::default()
        };
        assert!(bad_fraction.validate().is_err());
    }

    #[test]
    fn test_nan_and_oversized_values_are_rejected() {
        let nan_padding = AnalysisConfig {
            merge_padding: f64::NAN,
            ..Default::default()
        };
        assert!(matches!(nan_padding.validate(), Err(ConfigError::Invalid(_))));

        let nan_area = AnalysisConfig {
            merge_area_factor: f64::NAN,
            ..Default::default()
        };
        assert!(nan_area.validate().is_err());

        let huge = AnalysisConfig {
            min_radius: i32::MAX / 2 + 1,
            max_radius: i32::MAX,
            ..Default::default()
        };
        assert!(huge.validate().is_err());

        let at_limit = AnalysisConfig {
            min_radius: RADIUS_LIMIT,
            max_radius: RADIUS_LIMIT,
            ..Default::default()
        };
        assert!(at_limit.validate().is_ok());
        assert_eq!(at_limit.hough_params().min_dist, (2 * RADIUS_LIMIT + 1) as f64);
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, r#"{ "max_radius": 45, "debug": true }"#).unwrap();

        let config = AnalysisConfig::load_from_file(&path).unwrap();
        assert_eq!(config.max_radius, 45);
        assert!(config.debug);
        assert_eq!(config.min_radius, 5);
        assert_eq!(config.noise_ceiling, 40.0);
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("saved.json");
        let config = AnalysisConfig {
            param1: 22.0,
            deadline: Some(Duration::from_millis(1500)),
            ..Default::default()
        };
        config.save_to_file(&path).unwrap();
        assert_eq!(AnalysisConfig::load_from_file(&path).unwrap(), config);
    }

    #[test]
    fn test_missing_and_malformed_files() {
        let dir = tempdir().unwrap();
        let missing = dir.path().join("nope.json");
        assert!(matches!(
            AnalysisConfig::load_from_file(&missing),
            Err(ConfigError::Io { .. })
        ));

        let malformed = dir.path().join("bad.json");
        std::fs::write(&malformed, "{ not json").unwrap();
        assert!(matches!(
            AnalysisConfig::load_from_file(&malformed),
            Err(ConfigError::Parse(_))
        ));
    }
}
