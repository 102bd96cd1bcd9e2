use image::{Rgb, RgbImage};
use imageproc::drawing::{draw_filled_circle_mut, draw_hollow_rect_mut, draw_line_segment_mut};
use imageproc::rect::Rect;

use crate::pose::capability::PoseRenderer;
use crate::pose::types::{Pose, COCO_SKELETON};

/// Colour used when annotations are off or the pose has no identity.
const PLAIN_COLOR: Rgb<u8> = Rgb([0, 120, 255]);

/// Identity palette, cycled by track id.
const PALETTE: [Rgb<u8>; 8] = [
    Rgb([230, 25, 75]),
    Rgb([60, 180, 75]),
    Rgb([0, 130, 200]),
    Rgb([245, 130, 48]),
    Rgb([145, 30, 180]),
    Rgb([70, 160, 160]),
    Rgb([240, 50, 230]),
    Rgb([128, 128, 0]),
];

/// Draws the COCO-17 skeleton of a pose.
#[derive(Clone, Debug)]
pub struct SkeletonRenderer {
    /// Keypoints at or below this confidence are not drawn.
    pub keypoint_threshold: f32,
    pub joint_radius: i32,
}

impl Default for SkeletonRenderer {
    fn default() -> Self {
        Self {
            keypoint_threshold: 0.5,
            joint_radius: 3,
        }
    }
}

impl SkeletonRenderer {
    pub fn new(keypoint_threshold: f32) -> Self {
        Self {
            keypoint_threshold,
            ..Self::default()
        }
    }

    fn color_for(pose: &Pose, annotate: bool) -> Rgb<u8> {
        match (annotate, pose.track_id) {
            (true, Some(id)) => PALETTE[id as usize % PALETTE.len()],
            _ => PLAIN_COLOR,
        }
    }
}

impl PoseRenderer for SkeletonRenderer {
    fn draw(&self, pose: &Pose, canvas: &mut RgbImage, annotate: bool) {
        let color = Self::color_for(pose, annotate);
        let visible = |i: usize| {
            pose.keypoints
                .get(i)
                .filter(|k| k.confidence > self.keypoint_threshold)
        };

        for &(a, b) in COCO_SKELETON.iter() {
            if let (Some(ka), Some(kb)) = (visible(a), visible(b)) {
                draw_line_segment_mut(canvas, (ka.x, ka.y), (kb.x, kb.y), color);
            }
        }
        for k in pose
            .keypoints
            .iter()
            .filter(|k| k.confidence > self.keypoint_threshold)
        {
            draw_filled_circle_mut(
                canvas,
                (k.x.round() as i32, k.y.round() as i32),
                self.joint_radius,
                color,
            );
        }

        if annotate {
            if let Some(bbox) = pose.bbox {
                let width = bbox.width.round() as u32;
                let height = bbox.height.round() as u32;
                if width > 0 && height > 0 {
                    let rect = Rect::at(bbox.x.round() as i32, bbox.y.round() as i32)
                        .of_size(width, height);
                    draw_hollow_rect_mut(canvas, rect, color);
                }
            }
        }
    }
}
