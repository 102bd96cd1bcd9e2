//! Greedy IoU pose tracker.
//!
//! Associates the poses of the current frame with live tracks by box overlap,
//! assigns fresh identities to unmatched poses and retires tracks that have
//! not been matched for more than `max_age` frames.

use anyhow::{anyhow, Result};

use crate::pose::capability::PoseTracker;
use crate::pose::types::{BoundingBox, Keypoint, Pose};

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TrackerSettings {
    /// Minimum IoU for a pose to continue a track.
    pub iou_threshold: f32,
    /// Frames a track survives without a match.
    pub max_age: u32,
    /// Weight of the previous keypoint position (0 = no smoothing, <1).
    pub smoothing: f32,
}

impl Default for TrackerSettings {
    fn default() -> Self {
        Self {
            iou_threshold: 0.3,
            max_age: 30,
            smoothing: 0.0,
        }
    }
}

impl TrackerSettings {
    pub fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.iou_threshold) {
            return Err(anyhow!("tracker iou_threshold must be within 0..=1"));
        }
        if !(0.0..1.0).contains(&self.smoothing) {
            return Err(anyhow!("tracker smoothing must be within 0..1"));
        }
        Ok(())
    }
}

#[derive(Clone, Debug)]
struct Track {
    id: u32,
    bbox: BoundingBox,
    keypoints: Vec<Keypoint>,
    frames_lost: u32,
}

pub struct IouTracker {
    settings: TrackerSettings,
    tracks: Vec<Track>,
    next_id: u32,
}

impl IouTracker {
    pub fn new(settings: TrackerSettings) -> Self {
        Self {
            settings,
            tracks: Vec::new(),
            next_id: 1,
        }
    }

    /// Number of live tracks.
    pub fn active_tracks(&self) -> usize {
        self.tracks.len()
    }

    fn smooth(&self, previous: &[Keypoint], current: &mut [Keypoint]) {
        let alpha = self.settings.smoothing;
        if alpha <= 0.0 || previous.len() != current.len() {
            return;
        }
        for (prev, cur) in previous.iter().zip(current.iter_mut()) {
            if prev.confidence > 0.0 && cur.confidence > 0.0 {
                cur.x = alpha * prev.x + (1.0 - alpha) * cur.x;
                cur.y = alpha * prev.y + (1.0 - alpha) * cur.y;
            }
        }
    }
}

impl Default for IouTracker {
    fn default() -> Self {
        Self::new(TrackerSettings::default())
    }
}

impl PoseTracker for IouTracker {
    fn track(&mut self, mut poses: Vec<Pose>) -> Result<Vec<Pose>> {
        // All (track, pose) pairs above threshold, best overlap first.
        let mut pairs = Vec::new();
        for (t, track) in self.tracks.iter().enumerate() {
            for (p, pose) in poses.iter().enumerate() {
                let Some(bounds) = pose.bounds() else {
                    continue;
                };
                let iou = track.bbox.iou(&bounds);
                if iou >= self.settings.iou_threshold && iou > 0.0 {
                    pairs.push((iou, t, p));
                }
            }
        }
        pairs.sort_by(|a, b| b.0.total_cmp(&a.0));

        let mut track_matched = vec![false; self.tracks.len()];
        let mut pose_track: Vec<Option<usize>> = vec![None; poses.len()];
        for (_, t, p) in pairs {
            if track_matched[t] || pose_track[p].is_some() {
                continue;
            }
            track_matched[t] = true;
            pose_track[p] = Some(t);
        }

        for (p, pose) in poses.iter_mut().enumerate() {
            let Some(bounds) = pose.bounds() else {
                continue;
            };
            match pose_track[p] {
                Some(t) => {
                    let previous = self.tracks[t].keypoints.clone();
                    self.smooth(&previous, &mut pose.keypoints);
                    let track = &mut self.tracks[t];
                    track.bbox = bounds;
                    track.keypoints = pose.keypoints.clone();
                    track.frames_lost = 0;
                    pose.track_id = Some(track.id);
                }
                None => {
                    let id = self.next_id;
                    self.next_id += 1;
                    self.tracks.push(Track {
                        id,
                        bbox: bounds,
                        keypoints: pose.keypoints.clone(),
                        frames_lost: 0,
                    });
                    track_matched.push(true);
                    pose.track_id = Some(id);
                }
            }
        }

        for (track, matched) in self.tracks.iter_mut().zip(&track_matched) {
            if !matched {
                track.frames_lost += 1;
            }
        }
        let max_age = self.settings.max_age;
        self.tracks.retain(|track| track.frames_lost <= max_age);

        Ok(poses)
    }
}
