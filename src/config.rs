use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{RectifyError, Result};
use crate::transform::{Interpolation, OutputSize};

/// Tunables for the detection stages (normalizer, edge map, locator).
///
/// The defaults are the empirically chosen values; none of them has a
/// stronger justification than "works on typical card photos".
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectionConfig {
    /// Longest side of the working-resolution image.
    pub max_working_side: u32,
    /// Number of 3x3 blur passes before gradient thresholding.
    pub blur_passes: u32,
    /// Sobel magnitude above which a pixel counts as an edge.
    pub edge_threshold: f32,
    /// Inner margin, as a fraction of the smaller working dimension, that
    /// excludes frame artifacts from the candidate edge pixels.
    pub margin_ratio: f64,
    /// Minimum number of candidate edge pixels for detection to succeed.
    pub min_edge_pixels: usize,
    pub low_percentile: f64,
    pub high_percentile: f64,
    /// Maximum ring radius (working pixels) when refining box corners.
    pub refine_radius: u32,
    /// Horizontal inset of the fallback quadrilateral.
    pub fallback_inset_x: f64,
    /// Vertical inset of the fallback quadrilateral.
    pub fallback_inset_y: f64,
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            max_working_side: 600,
            blur_passes: 2,
            edge_threshold: 60.0,
            margin_ratio: 0.08,
            min_edge_pixels: 100,
            low_percentile: 0.10,
            high_percentile: 0.90,
            refine_radius: 60,
            fallback_inset_x: 0.12,
            fallback_inset_y: 0.15,
        }
    }
}

impl DetectionConfig {
    pub fn validate(&self) -> Result<()> {
        if self.max_working_side == 0 {
            return Err(RectifyError::Config(
                "max_working_side must be positive".to_string(),
            ));
        }
        if !self.edge_threshold.is_finite() || self.edge_threshold < 0.0 {
            return Err(RectifyError::Config(format!(
                "edge_threshold must be a non-negative number, got {}",
                self.edge_threshold
            )));
        }
        for (name, value) in [
            ("margin_ratio", self.margin_ratio),
            ("fallback_inset_x", self.fallback_inset_x),
            ("fallback_inset_y", self.fallback_inset_y),
        ] {
            if !(0.0..0.5).contains(&value) {
                return Err(RectifyError::Config(format!(
                    "{} must be in [0, 0.5), got {}",
                    name, value
                )));
            }
        }
        if !(0.0..=1.0).contains(&self.low_percentile)
            || !(0.0..=1.0).contains(&self.high_percentile)
            || self.low_percentile >= self.high_percentile
        {
            return Err(RectifyError::Config(format!(
                "percentiles must satisfy 0 <= low < high <= 1, got {} / {}",
                self.low_percentile, self.high_percentile
            )));
        }
        Ok(())
    }
}

/// Settings for the resampling stage.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RectifyConfig {
    pub interpolation: Interpolation,
    /// Explicit output size; when absent the size is classified from the
    /// quadrilateral's aspect ratio.
    pub output_size: Option<OutputSize>,
}

/// Complete configuration, loadable from a JSON file.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub detection: DetectionConfig,
    pub rectify: RectifyConfig,
}

impl Config {
    /// Load a configuration file. Missing fields keep their defaults.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path.as_ref())?;
        Self::from_json(&text)
    }

    pub fn from_json(text: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(text)
            .map_err(|err| RectifyError::Config(format!("failed to parse config: {}", err)))?;
        config.detection.validate()?;
        if let Some(size) = config.rectify.output_size {
            size.validate()?;
        }
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = DetectionConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.blur_passes, 2);
        assert_eq!(config.edge_threshold, 60.0);
    }

    #[test]
    fn test_partial_json_keeps_defaults() {
        let config =
            Config::from_json(r#"{ "detection": { "edge_threshold": 45.0 } }"#).unwrap();
        assert_eq!(config.detection.edge_threshold, 45.0);
        assert_eq!(config.detection.blur_passes, 2);
        assert_eq!(config.rectify.interpolation, Interpolation::Nearest);
        assert!(config.rectify.output_size.is_none());
    }

    #[test]
    fn test_interpolation_parses_lowercase() {
        let config = Config::from_json(
            r#"{ "rectify": { "interpolation": "bilinear", "output_size": { "width": 640, "height": 400 } } }"#,
        )
        .unwrap();
        assert_eq!(config.rectify.interpolation, Interpolation::Bilinear);
        assert_eq!(config.rectify.output_size, Some(OutputSize::new(640, 400)));
    }

    #[test]
    fn test_rejects_inverted_percentiles() {
        let result =
            Config::from_json(r#"{ "detection": { "low_percentile": 0.9, "high_percentile": 0.1 } }"#);
        assert!(matches!(result, Err(RectifyError::Config(_))));
    }

    #[test]
    fn test_rejects_zero_output_size() {
        let result =
            Config::from_json(r#"{ "rectify": { "output_size": { "width": 0, "height": 10 } } }"#);
        assert!(matches!(
            result,
            Err(RectifyError::InvalidOutputSize { width: 0, height: 10 })
        ));
    }

    #[test]
    fn test_rejects_malformed_json() {
        assert!(matches!(
            Config::from_json("{ not json"),
            Err(RectifyError::Config(_))
        ));
    }
}
