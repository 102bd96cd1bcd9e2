//! Pose capabilities.
//!
//! Estimation, tracking and rendering are consumed through single-operation
//! traits so that stub implementations can stand in for the real model.
//! `select_estimator` resolves a model reference to a concrete backend:
//! - `stub` / `stub://<n>`: `StubEstimator` with `n` poses per frame
//! - `*.onnx`: `TractPoseEstimator` (feature: backend-tract)

mod backends;
mod capability;
pub mod render;
pub mod tracker;
mod types;

use anyhow::Result;

pub use backends::StubEstimator;
#[cfg(feature = "backend-tract")]
pub use backends::TractPoseEstimator;
pub use capability::{PassthroughTracker, PoseEstimator, PoseRenderer, PoseTracker};
pub use render::SkeletonRenderer;
pub use tracker::{IouTracker, TrackerSettings};
pub use types::{BoundingBox, Keypoint, Pose, COCO_KEYPOINTS, COCO_SKELETON};

use crate::{pipeline_error, ErrorKind};

/// Thresholds for model-backed estimators.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct EstimatorSettings {
    pub confidence_threshold: f32,
    pub keypoint_threshold: f32,
    pub iou_threshold: f32,
    pub max_detections: usize,
    pub input_size: u32,
}

impl Default for EstimatorSettings {
    fn default() -> Self {
        Self {
            confidence_threshold: 0.25,
            keypoint_threshold: 0.5,
            iou_threshold: 0.45,
            max_detections: 100,
            input_size: 640,
        }
    }
}

/// Resolve a model reference to an estimator backend.
pub fn select_estimator(
    model: &str,
    settings: &EstimatorSettings,
) -> Result<Box<dyn PoseEstimator>> {
    if model == "stub" {
        return Ok(Box::new(StubEstimator::default()));
    }
    if let Some(count) = model.strip_prefix("stub://") {
        let count: usize = count.parse().map_err(|_| {
            pipeline_error(
                ErrorKind::Configuration,
                format!("invalid stub pose count in model reference '{}'", model),
            )
        })?;
        return Ok(Box::new(StubEstimator::new(count)));
    }
    if model.to_ascii_lowercase().ends_with(".onnx") {
        #[cfg(feature = "backend-tract")]
        {
            return Ok(Box::new(TractPoseEstimator::new(model, *settings)?));
        }
        #[cfg(not(feature = "backend-tract"))]
        {
            let _ = settings;
            return Err(pipeline_error(
                ErrorKind::Configuration,
                format!(
                    "model '{}' requires the backend-tract feature",
                    model
                ),
            ));
        }
    }
    Err(pipeline_error(
        ErrorKind::Configuration,
        format!(
            "unsupported model reference '{}' (expected 'stub', 'stub://<n>' or an .onnx file)",
            model
        ),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error_kind;

    #[test]
    fn stub_references_resolve() -> Result<()> {
        assert_eq!(select_estimator("stub", &EstimatorSettings::default())?.name(), "stub");
        assert_eq!(select_estimator("stub://3", &EstimatorSettings::default())?.name(), "stub");
        Ok(())
    }

    #[test]
    fn unknown_references_are_configuration_errors() {
        for model in ["stub://many", "weights.bin"] {
            let err = select_estimator(model, &EstimatorSettings::default())
                .err()
                .expect("must fail");
            assert_eq!(error_kind(&err), Some(ErrorKind::Configuration));
        }
    }
}
