//! Frame processor.
//!
//! Per kept frame: allocate a blank canvas, estimate poses on the original
//! frame, hand them to the tracker, and render every tracked pose onto the
//! same canvas. The source pixels are dropped once estimation returns.
//! Estimation and tracking failures propagate as `ErrorKind::Processing`.

use anyhow::Result;

use crate::frame::{blank_canvas, Frame, RenderedFrame};
use crate::pose::{PoseEstimator, PoseRenderer, PoseTracker};
use crate::{pipeline_error, ErrorKind};

pub struct FrameProcessor {
    estimator: Box<dyn PoseEstimator>,
    tracker: Box<dyn PoseTracker>,
    renderer: Box<dyn PoseRenderer>,
    background: [u8; 3],
    annotate: bool,
    processed: u64,
}

impl FrameProcessor {
    pub fn new(
        estimator: Box<dyn PoseEstimator>,
        tracker: Box<dyn PoseTracker>,
        renderer: Box<dyn PoseRenderer>,
    ) -> Self {
        Self {
            estimator,
            tracker,
            renderer,
            background: [255, 255, 255],
            annotate: true,
            processed: 0,
        }
    }

    pub fn with_background(mut self, background: [u8; 3]) -> Self {
        self.background = background;
        self
    }

    pub fn with_annotations(mut self, annotate: bool) -> Self {
        self.annotate = annotate;
        self
    }

    pub fn estimator_name(&self) -> &'static str {
        self.estimator.name()
    }

    /// Frames processed successfully so far.
    pub fn processed(&self) -> u64 {
        self.processed
    }

    /// Forward the estimator's warm-up hook.
    pub fn warm_up(&mut self) -> Result<()> {
        self.estimator.warm_up().map_err(|e| {
            pipeline_error(
                ErrorKind::Processing,
                format!("estimator '{}' warm-up failed: {:#}", self.estimator.name(), e),
            )
        })
    }

    pub fn process(&mut self, frame: Frame) -> Result<RenderedFrame> {
        let mut canvas = blank_canvas(&frame, self.background);
        let source_index = frame.index();

        let poses = self.estimator.estimate(&frame).map_err(|e| {
            pipeline_error(
                ErrorKind::Processing,
                format!("pose estimation failed on frame {}: {:#}", source_index, e),
            )
        })?;
        drop(frame);

        let poses = self.tracker.track(poses).map_err(|e| {
            pipeline_error(
                ErrorKind::Processing,
                format!("pose tracking failed on frame {}: {:#}", source_index, e),
            )
        })?;

        for pose in &poses {
            self.renderer.draw(pose, &mut canvas, self.annotate);
        }

        self.processed += 1;
        log::debug!(
            "FrameProcessor: frame {} rendered with {} poses",
            source_index,
            poses.len()
        );
        Ok(RenderedFrame {
            canvas,
            source_index,
            pose_count: poses.len(),
        })
    }
}
