//! Configuration for the detector adapter.

use serde::{Deserialize, Serialize};

use sar_core::Detection;

/// Configuration for object detection.
///
/// Thresholds and the class allow-list are configuration, not hard-coded:
/// the same adapter serves person-only search flights and full-class surveys.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetectorConfig {
    /// Minimum confidence for a detection to be reported.
    pub confidence_threshold: f64,
    /// IoU threshold used for non-maximum suppression.
    pub iou_threshold: f64,
    /// Expected frame dimensions for this deployment.
    pub frame_width: u32,
    pub frame_height: u32,
    /// Classes to report. `None` reports every class the model knows.
    pub class_allow_list: Option<Vec<String>>,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            confidence_threshold: 0.25,
            iou_threshold: 0.45,
            frame_width: 960,
            frame_height: 720,
            class_allow_list: Some(vec!["person".to_string()]),
        }
    }
}

impl DetectorConfig {
    /// Person-only reporting (search-and-rescue default).
    pub fn person_only() -> Self {
        Self::default()
    }

    /// Report every class the model produces.
    pub fn all_classes() -> Self {
        Self {
            class_allow_list: None,
            ..Default::default()
        }
    }

    /// Load from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        let confidence_threshold = std::env::var("DETECTOR_CONF_THRESHOLD")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(0.25);

        let iou_threshold = std::env::var("DETECTOR_IOU_THRESHOLD")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(0.45);

        let class_allow_list = match std::env::var("DETECTOR_CLASSES").ok() {
            Some(raw) if raw.trim() == "*" => None,
            Some(raw) => Some(raw.split(',').map(|s| s.trim().to_string()).collect()),
            None => Some(vec!["person".to_string()]),
        };

        Self {
            confidence_threshold,
            iou_threshold,
            class_allow_list,
            ..Default::default()
        }
    }

    /// Whether a detection clears the confidence threshold and allow-list.
    pub fn passes(&self, detection: &Detection) -> bool {
        if detection.confidence < self.confidence_threshold {
            return false;
        }
        match &self.class_allow_list {
            Some(allowed) => allowed.iter().any(|label| label == &detection.label),
            None => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sar_core::PixelBox;

    fn detection(label: &str, confidence: f64) -> Detection {
        Detection::new(label, confidence, PixelBox::new(0, 0, 10, 10))
    }

    #[test]
    fn test_allow_list_filtering() {
        let config = DetectorConfig::person_only();

        assert!(config.passes(&detection("person", 0.9)));
        assert!(!config.passes(&detection("car", 0.9)));
        assert!(!config.passes(&detection("person", 0.1)));
    }

    #[test]
    fn test_all_classes_passes_everything_above_threshold() {
        let config = DetectorConfig::all_classes();

        assert!(config.passes(&detection("car", 0.5)));
        assert!(config.passes(&detection("fallen tree", 0.5)));
        assert!(!config.passes(&detection("car", 0.01)));
    }
}
