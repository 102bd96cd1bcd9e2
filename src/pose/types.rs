/// One keypoint in source-frame pixel coordinates.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Keypoint {
    pub x: f32,
    pub y: f32,
    /// Visibility/confidence in 0..1. Zero means "not detected".
    pub confidence: f32,
}

impl Keypoint {
    pub fn new(x: f32, y: f32, confidence: f32) -> Self {
        Self { x, y, confidence }
    }
}

/// Axis-aligned box in source-frame pixel coordinates.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct BoundingBox {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl BoundingBox {
    pub fn new(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    pub fn area(&self) -> f32 {
        self.width.max(0.0) * self.height.max(0.0)
    }

    pub fn iou(&self, other: &BoundingBox) -> f32 {
        let x1 = self.x.max(other.x);
        let y1 = self.y.max(other.y);
        let x2 = (self.x + self.width).min(other.x + other.width);
        let y2 = (self.y + self.height).min(other.y + other.height);

        let intersection = (x2 - x1).max(0.0) * (y2 - y1).max(0.0);
        let union = self.area() + other.area() - intersection;
        if union > 0.0 {
            intersection / union
        } else {
            0.0
        }
    }

    /// Tight box around the keypoints with confidence above `threshold`.
    pub fn enclosing(keypoints: &[Keypoint], threshold: f32) -> Option<Self> {
        let mut visible = keypoints.iter().filter(|k| k.confidence > threshold);
        let first = visible.next()?;
        let (mut min_x, mut min_y, mut max_x, mut max_y) = (first.x, first.y, first.x, first.y);
        for k in visible {
            min_x = min_x.min(k.x);
            min_y = min_y.min(k.y);
            max_x = max_x.max(k.x);
            max_y = max_y.max(k.y);
        }
        Some(Self::new(min_x, min_y, max_x - min_x, max_y - min_y))
    }
}

/// One detected subject in one frame.
///
/// Produced by a `PoseEstimator`, annotated by a `PoseTracker`, drawn by a
/// `PoseRenderer`. The pipeline itself only moves poses between them.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Pose {
    pub keypoints: Vec<Keypoint>,
    pub bbox: Option<BoundingBox>,
    /// Detection confidence of the subject.
    pub score: f32,
    /// Persistent identity assigned by a tracker.
    pub track_id: Option<u32>,
}

impl Pose {
    pub fn new(keypoints: Vec<Keypoint>, bbox: Option<BoundingBox>, score: f32) -> Self {
        Self {
            keypoints,
            bbox,
            score,
            track_id: None,
        }
    }

    /// The explicit box, or one derived from visible keypoints.
    pub fn bounds(&self) -> Option<BoundingBox> {
        self.bbox
            .or_else(|| BoundingBox::enclosing(&self.keypoints, 0.0))
    }
}

/// COCO-17 skeleton edges (keypoint index pairs).
pub const COCO_SKELETON: [(usize, usize); 16] = [
    (0, 1),
    (0, 2),
    (1, 3),
    (2, 4),
    (5, 6),
    (5, 11),
    (6, 12),
    (11, 12),
    (5, 7),
    (6, 8),
    (7, 9),
    (8, 10),
    (11, 13),
    (12, 14),
    (13, 15),
    (14, 16),
];

/// Keypoints per COCO pose.
pub const COCO_KEYPOINTS: usize = 17;
