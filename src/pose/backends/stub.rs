use anyhow::Result;

use crate::frame::Frame;
use crate::pose::capability::PoseEstimator;
use crate::pose::types::{BoundingBox, Keypoint, Pose, COCO_KEYPOINTS};

/// Relative (x, y) layout of a standing COCO figure inside its box.
const FIGURE: [(f32, f32); COCO_KEYPOINTS] = [
    (0.50, 0.08),
    (0.45, 0.06),
    (0.55, 0.06),
    (0.40, 0.08),
    (0.60, 0.08),
    (0.30, 0.25),
    (0.70, 0.25),
    (0.22, 0.42),
    (0.78, 0.42),
    (0.18, 0.58),
    (0.82, 0.58),
    (0.38, 0.58),
    (0.62, 0.58),
    (0.36, 0.78),
    (0.64, 0.78),
    (0.35, 0.97),
    (0.65, 0.97),
];

/// Stub estimator for testing and dry runs.
///
/// Produces `count` deterministic standing figures per frame, one per vertical
/// band of the frame, drifting slightly with the frame index.
pub struct StubEstimator {
    count: usize,
    calls: u64,
}

impl StubEstimator {
    pub fn new(count: usize) -> Self {
        Self { count, calls: 0 }
    }

    /// Number of frames estimated so far.
    pub fn calls(&self) -> u64 {
        self.calls
    }

    fn figure(&self, slot: usize, frame: &Frame) -> Pose {
        let band = frame.width() as f32 / self.count.max(1) as f32;
        let drift = (frame.index() % 8) as f32;
        let bbox = BoundingBox::new(
            slot as f32 * band + band * 0.1 + drift,
            frame.height() as f32 * 0.1,
            band * 0.8,
            frame.height() as f32 * 0.8,
        );
        let keypoints = FIGURE
            .iter()
            .map(|(rx, ry)| Keypoint::new(bbox.x + rx * bbox.width, bbox.y + ry * bbox.height, 0.9))
            .collect();
        Pose::new(keypoints, Some(bbox), 0.9)
    }
}

impl Default for StubEstimator {
    fn default() -> Self {
        Self::new(1)
    }
}

impl PoseEstimator for StubEstimator {
    fn name(&self) -> &'static str {
        "stub"
    }

    fn estimate(&mut self, frame: &Frame) -> Result<Vec<Pose>> {
        self.calls += 1;
        Ok((0..self.count).map(|slot| self.figure(slot, frame)).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::RgbImage;

    #[test]
    fn stub_estimator_returns_requested_poses_inside_frame() -> Result<()> {
        let mut estimator = StubEstimator::new(2);
        let frame = Frame::new(RgbImage::new(100, 100), 0);

        let poses = estimator.estimate(&frame)?;

        assert_eq!(poses.len(), 2);
        assert_eq!(estimator.calls(), 1);
        for pose in &poses {
            assert_eq!(pose.keypoints.len(), COCO_KEYPOINTS);
            assert!(pose.track_id.is_none());
            for k in &pose.keypoints {
                assert!(k.x >= 0.0 && k.x < 100.0 && k.y >= 0.0 && k.y < 100.0);
            }
        }
        Ok(())
    }

    #[test]
    fn zero_count_yields_no_poses() -> Result<()> {
        let mut estimator = StubEstimator::new(0);
        let frame = Frame::new(RgbImage::new(10, 10), 3);
        assert!(estimator.estimate(&frame)?.is_empty());
        Ok(())
    }
}
