//! # SAR Detector
//!
//! Object-detection adapter for the search-and-rescue drone server.
//! Wraps a black-box detection model behind a narrow trait:
//! frame in, ordered list of labeled boxes out.
//!
//! Features:
//! - Configurable confidence/IoU thresholds and class allow-list
//! - YOLO-backed detector via OpenCV DNN (behind the `opencv` feature)
//! - Scripted detector for simulation and tests
//! - Frame annotation + base64 encoding for the telemetry tick

pub mod annotate;
pub mod config;
pub mod error;
#[cfg(feature = "opencv")]
pub mod yolo;

pub use annotate::FrameEncoder;
pub use config::DetectorConfig;
pub use error::{DetectorError, DetectorResult};
#[cfg(feature = "opencv")]
pub use yolo::YoloDetector;

use parking_lot::Mutex;
use sar_core::{Detection, Frame};
use tracing::debug;

/// Black-box object detector: image in, zero or more labeled boxes out.
///
/// Implementations are deterministic given identical weights and frame, and
/// carry no hidden state between calls other than model weights. Callers must
/// tolerate an empty result without special-casing.
pub trait ObjectDetector: Send + Sync {
    /// Run detection on one frame. Blocks for the duration of inference.
    fn detect(&self, frame: &Frame) -> DetectorResult<Vec<Detection>>;
}

/// Drop detections that violate the adapter contract (confidence outside
/// [0, 1] or an unordered box) and apply the configured filters.
pub fn sanitize(raw: Vec<Detection>, config: &DetectorConfig) -> Vec<Detection> {
    let before = raw.len();
    let kept: Vec<Detection> = raw
        .into_iter()
        .filter(|d| d.is_well_formed())
        .filter(|d| config.passes(d))
        .collect();

    if kept.len() != before {
        debug!("Filtered detections: {} -> {}", before, kept.len());
    }
    kept
}

// ============================================================================
// SCRIPTED DETECTOR (simulation & tests)
// ============================================================================

/// Detector that replays a scripted sequence of results, cycling when it
/// runs out. Used in simulation mode and in tests, in place of real model
/// weights.
pub struct ScriptedDetector {
    config: DetectorConfig,
    script: Mutex<ScriptState>,
}

struct ScriptState {
    results: Vec<Vec<Detection>>,
    cursor: usize,
}

impl ScriptedDetector {
    pub fn new(config: DetectorConfig, results: Vec<Vec<Detection>>) -> Self {
        Self {
            config,
            script: Mutex::new(ScriptState { results, cursor: 0 }),
        }
    }

    /// A detector that never finds anything.
    pub fn empty(config: DetectorConfig) -> Self {
        Self::new(config, Vec::new())
    }
}

impl ObjectDetector for ScriptedDetector {
    fn detect(&self, _frame: &Frame) -> DetectorResult<Vec<Detection>> {
        let mut state = self.script.lock();
        if state.results.is_empty() {
            return Ok(Vec::new());
        }

        let raw = state.results[state.cursor % state.results.len()].clone();
        state.cursor += 1;
        Ok(sanitize(raw, &self.config))
    }
}

// ============================================================================
// TESTS
// ============================================================================
