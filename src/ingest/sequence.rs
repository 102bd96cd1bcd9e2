//! Image-sequence directory source.
//!
//! Reads back a directory of images (for example a previous run's persisted
//! frames) in lexicographic filename order. The directory has no intrinsic
//! rate, so the configured rate is reported as native.

use anyhow::{Context, Result};
use image::RgbImage;
use std::path::{Path, PathBuf};

use crate::{pipeline_error, ErrorKind};

pub(crate) struct SequenceSource {
    files: Vec<PathBuf>,
    position: usize,
    fps: f64,
}

impl SequenceSource {
    pub(crate) fn open(dir: &Path, fps: f64) -> Result<Self> {
        let entries = std::fs::read_dir(dir)
            .with_context(|| format!("failed to list {}", dir.display()))
            .map_err(|e| pipeline_error(ErrorKind::Source, format!("{:#}", e)))?;

        let mut files = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| {
                pipeline_error(
                    ErrorKind::Source,
                    format!("failed to list {}: {}", dir.display(), e),
                )
            })?;
            let path = entry.path();
            if path.is_file() {
                files.push(path);
            }
        }
        files.sort();

        log::info!(
            "FrameSource: {} holds {} files",
            dir.display(),
            files.len()
        );
        Ok(Self {
            files,
            position: 0,
            fps,
        })
    }

    pub(crate) fn fps(&self) -> f64 {
        self.fps
    }

    pub(crate) fn next_image(&mut self) -> Result<Option<RgbImage>> {
        let Some(path) = self.files.get(self.position) else {
            return Ok(None);
        };
        self.position += 1;
        let image = image::open(path).map_err(|e| {
            pipeline_error(
                ErrorKind::Read,
                format!("failed to decode {}: {}", path.display(), e),
            )
        })?;
        Ok(Some(image.to_rgb8()))
    }
}
