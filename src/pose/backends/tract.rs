#![cfg(feature = "backend-tract")]

use std::path::Path;

use anyhow::{anyhow, Context, Result};
use image::{imageops, imageops::FilterType, Rgb, RgbImage};
use tract_onnx::prelude::*;

use crate::frame::Frame;
use crate::pose::capability::PoseEstimator;
use crate::pose::types::{BoundingBox, Keypoint, Pose, COCO_KEYPOINTS};
use crate::pose::EstimatorSettings;

/// Box (cx, cy, w, h) + person score.
const HEAD: usize = 5;
const KPT_STEP: usize = 3;
const LETTERBOX_FILL: u8 = 114;

/// Tract-based YOLOv8-pose estimator.
///
/// Loads a local ONNX model with a `[1, 3, S, S]` input and a
/// `[1, 56, N]` output. Frames are letterboxed to `S`, and keypoints are
/// mapped back into source-frame coordinates.
pub struct TractPoseEstimator {
    model: SimplePlan<TypedFact, Box<dyn TypedOp>>,
    settings: EstimatorSettings,
}

/// Scale and padding applied by the letterbox.
#[derive(Clone, Copy, Debug)]
struct Letterbox {
    ratio: f32,
    pad_x: f32,
    pad_y: f32,
}

impl TractPoseEstimator {
    /// Load an ONNX model from disk and prepare it for inference.
    pub fn new<P: AsRef<Path>>(model_path: P, settings: EstimatorSettings) -> Result<Self> {
        let model_path = model_path.as_ref();
        let size = settings.input_size as usize;
        let model = tract_onnx::onnx()
            .model_for_path(model_path)
            .with_context(|| format!("failed to load ONNX model from {}", model_path.display()))?
            .with_input_fact(
                0,
                InferenceFact::dt_shape(f32::datum_type(), tvec!(1, 3, size, size)),
            )
            .context("failed to set input fact")?
            .into_optimized()
            .context("failed to optimize ONNX model")?
            .into_runnable()
            .context("failed to build runnable ONNX model")?;

        log::info!(
            "TractPoseEstimator: loaded {} (input {}x{})",
            model_path.display(),
            size,
            size
        );
        Ok(Self { model, settings })
    }

    fn letterbox(&self, image: &RgbImage) -> (RgbImage, Letterbox) {
        let size = self.settings.input_size;
        let ratio = (size as f32 / image.width() as f32).min(size as f32 / image.height() as f32);
        let scaled_w = ((image.width() as f32 * ratio).round() as u32).clamp(1, size);
        let scaled_h = ((image.height() as f32 * ratio).round() as u32).clamp(1, size);
        let resized = imageops::resize(image, scaled_w, scaled_h, FilterType::Triangle);

        let pad_x = (size - scaled_w) / 2;
        let pad_y = (size - scaled_h) / 2;
        let mut boxed = RgbImage::from_pixel(size, size, Rgb([LETTERBOX_FILL; 3]));
        imageops::replace(&mut boxed, &resized, pad_x as i64, pad_y as i64);

        (
            boxed,
            Letterbox {
                ratio,
                pad_x: pad_x as f32,
                pad_y: pad_y as f32,
            },
        )
    }

    fn build_input(&self, image: &RgbImage) -> Tensor {
        let size = self.settings.input_size as usize;
        let input = tract_ndarray::Array4::from_shape_fn((1, 3, size, size), |(_, c, y, x)| {
            image.get_pixel(x as u32, y as u32)[c] as f32 / 255.0
        });
        input.into_tensor()
    }

    fn decode(&self, outputs: TVec<TValue>, frame: &Frame, lb: Letterbox) -> Result<Vec<Pose>> {
        let output = outputs
            .first()
            .ok_or_else(|| anyhow!("model produced no outputs"))?;
        let preds = output
            .to_array_view::<f32>()
            .context("model output tensor was not f32")?;
        let shape = preds.shape().to_vec();
        let expected_rows = HEAD + KPT_STEP * COCO_KEYPOINTS;
        if shape.len() != 3 || shape[1] != expected_rows {
            return Err(anyhow!(
                "unexpected pose output shape {:?}, expected [1, {}, N]",
                shape,
                expected_rows
            ));
        }

        let (frame_w, frame_h) = (frame.width() as f32, frame.height() as f32);
        let unmap_x = |v: f32| ((v - lb.pad_x) / lb.ratio).clamp(0.0, frame_w);
        let unmap_y = |v: f32| ((v - lb.pad_y) / lb.ratio).clamp(0.0, frame_h);

        let mut candidates = Vec::new();
        for i in 0..shape[2] {
            let score = preds[[0, 4, i]];
            if score < self.settings.confidence_threshold {
                continue;
            }
            let (cx, cy, w, h) = (
                preds[[0, 0, i]],
                preds[[0, 1, i]],
                preds[[0, 2, i]],
                preds[[0, 3, i]],
            );
            let x1 = unmap_x(cx - w / 2.0);
            let y1 = unmap_y(cy - h / 2.0);
            let x2 = unmap_x(cx + w / 2.0);
            let y2 = unmap_y(cy + h / 2.0);

            let keypoints = (0..COCO_KEYPOINTS)
                .map(|k| {
                    let row = HEAD + KPT_STEP * k;
                    let confidence = preds[[0, row + 2, i]];
                    if confidence < self.settings.keypoint_threshold {
                        Keypoint::default()
                    } else {
                        Keypoint::new(
                            unmap_x(preds[[0, row, i]]),
                            unmap_y(preds[[0, row + 1, i]]),
                            confidence,
                        )
                    }
                })
                .collect();

            candidates.push(Pose::new(
                keypoints,
                Some(BoundingBox::new(x1, y1, x2 - x1, y2 - y1)),
                score,
            ));
        }

        Ok(non_max_suppression(
            candidates,
            self.settings.iou_threshold,
            self.settings.max_detections,
        ))
    }
}

impl PoseEstimator for TractPoseEstimator {
    fn name(&self) -> &'static str {
        "tract"
    }

    fn estimate(&mut self, frame: &Frame) -> Result<Vec<Pose>> {
        let (boxed, lb) = self.letterbox(frame.image());
        let input = self.build_input(&boxed);
        let outputs = self
            .model
            .run(tvec!(input.into()))
            .context("ONNX inference failed")?;
        self.decode(outputs, frame, lb)
    }

    /// One inference on a blank letterbox, so a model with the wrong output
    /// layout fails before the first frame.
    fn warm_up(&mut self) -> Result<()> {
        let size = self.settings.input_size;
        let blank = RgbImage::from_pixel(size, size, Rgb([LETTERBOX_FILL; 3]));
        let outputs = self
            .model
            .run(tvec!(self.build_input(&blank).into()))
            .context("ONNX warm-up inference failed")?;
        let frame = Frame::new(blank, 0);
        let lb = Letterbox {
            ratio: 1.0,
            pad_x: 0.0,
            pad_y: 0.0,
        };
        self.decode(outputs, &frame, lb)?;
        log::info!("TractPoseEstimator: warm-up inference done");
        Ok(())
    }
}

/// Greedy NMS over pose boxes, highest score first.
fn non_max_suppression(
    mut poses: Vec<Pose>,
    iou_threshold: f32,
    max_detections: usize,
) -> Vec<Pose> {
    poses.sort_by(|a, b| b.score.total_cmp(&a.score));
    let mut kept: Vec<Pose> = Vec::new();
    for pose in poses {
        if kept.len() >= max_detections {
            break;
        }
        let overlaps = match pose.bbox {
            Some(bbox) => kept
                .iter()
                .filter_map(|k| k.bbox)
                .any(|k| k.iou(&bbox) > iou_threshold),
            None => false,
        };
        if !overlaps {
            kept.push(pose);
        }
    }
    kept
}
