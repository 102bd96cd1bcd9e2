use anyhow::Result;
use image::RgbImage;

use crate::frame::Frame;
use crate::pose::types::Pose;

/// Pose estimation capability.
///
/// Receives the original frame (never the canvas) and returns the detected
/// poses. Ordering of the returned poses carries no meaning downstream.
/// Failures are not recovered by the pipeline; they abort the run.
pub trait PoseEstimator: Send {
    /// Backend identifier.
    fn name(&self) -> &'static str;

    /// Run estimation on a frame.
    fn estimate(&mut self, frame: &Frame) -> Result<Vec<Pose>>;

    /// Optional warm-up hook, called once before the first frame.
    fn warm_up(&mut self) -> Result<()> {
        Ok(())
    }
}

/// Cross-frame tracking capability.
///
/// Takes the poses of the current frame and returns them enriched with
/// persistent identity and/or temporal smoothing. The cardinality of the
/// output is the tracker's policy.
pub trait PoseTracker: Send {
    fn track(&mut self, poses: Vec<Pose>) -> Result<Vec<Pose>>;
}

/// Rendering capability: draws one pose onto a canvas.
///
/// `annotate` selects the annotation style (identity colouring and box on/off).
pub trait PoseRenderer: Send {
    fn draw(&self, pose: &Pose, canvas: &mut RgbImage, annotate: bool);
}

/// Tracker that forwards poses unchanged.
#[derive(Clone, Copy, Debug, Default)]
pub struct PassthroughTracker;

impl PoseTracker for PassthroughTracker {
    fn track(&mut self, poses: Vec<Pose>) -> Result<Vec<Pose>> {
        Ok(poses)
    }
}
