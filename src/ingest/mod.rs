//! Frame ingestion sources.
//!
//! This module provides one `FrameSource` over several origins:
//! - Synthetic devices (`stub://`, testing and dry runs)
//! - USB/V4L2 devices (feature: ingest-v4l2)
//! - Image-sequence directories, read back in lexicographic order
//! - A single still image
//! - Local video files (feature: ingest-file-ffmpeg)
//!
//! The locator names the origin explicitly; the pipeline mode only decides what
//! happens to the frames. Every backend hands out RGB8 frames in capture order.
//!
//! The source is responsible for:
//! - Reporting the native rate of continuous origins before the first read
//! - Assigning capture-order indices
//! - Releasing the device/file handle on every exit path (`release` and `Drop`)

#[cfg(feature = "ingest-file-ffmpeg")]
mod file_ffmpeg;
mod normalize;
mod sequence;
mod still;
mod synthetic;
#[cfg(feature = "ingest-v4l2")]
mod v4l2;

use anyhow::Result;
use image::RgbImage;
use std::path::{Path, PathBuf};

use crate::config::PipelineMode;
use crate::frame::Frame;
use crate::{pipeline_error, ErrorKind};

#[cfg(feature = "ingest-file-ffmpeg")]
use file_ffmpeg::FfmpegFileSource;
use sequence::SequenceSource;
use still::StillSource;
pub use synthetic::SyntheticConfig;
use synthetic::SyntheticSource;
#[cfg(feature = "ingest-v4l2")]
use v4l2::V4l2Source;

/// Where frames come from.
#[derive(Clone, Debug, PartialEq)]
pub enum SourceLocator {
    /// `stub://name?fps=..&frames=..&width=..&height=..&fail_at=..`
    Synthetic(SyntheticConfig),
    /// Capture device node, e.g. `/dev/video0`.
    Device(String),
    /// Directory of previously written images.
    Sequence(PathBuf),
    /// One image file.
    Still(PathBuf),
    /// Video container decoded frame by frame.
    VideoFile(PathBuf),
}

impl SourceLocator {
    /// Interpret an input locator for the given mode.
    pub fn parse(input: &str, mode: PipelineMode) -> Result<Self> {
        let input = input.trim();
        if input.is_empty() {
            return Err(pipeline_error(ErrorKind::Configuration, "input locator is empty"));
        }

        let locator = if input.starts_with("stub://") {
            SourceLocator::Synthetic(SyntheticConfig::from_locator(input)?)
        } else if input.contains("://") {
            return Err(pipeline_error(
                ErrorKind::Configuration,
                format!("unsupported input scheme in '{}' (local sources only)", input),
            ));
        } else if let Ok(index) = input.parse::<u32>() {
            SourceLocator::Device(format!("/dev/video{}", index))
        } else if input.starts_with("/dev/video") {
            SourceLocator::Device(input.to_string())
        } else if Path::new(input).is_dir() {
            SourceLocator::Sequence(PathBuf::from(input))
        } else if mode == PipelineMode::Still {
            SourceLocator::Still(PathBuf::from(input))
        } else {
            SourceLocator::VideoFile(PathBuf::from(input))
        };

        if mode == PipelineMode::Still && !matches!(locator, SourceLocator::Still(_)) {
            return Err(pipeline_error(
                ErrorKind::Configuration,
                format!("image mode requires an image file, got '{}'", input),
            ));
        }
        Ok(locator)
    }

    pub fn label(&self) -> String {
        match self {
            SourceLocator::Synthetic(cfg) => format!("stub://{}", cfg.name),
            SourceLocator::Device(device) => device.clone(),
            SourceLocator::Sequence(path)
            | SourceLocator::Still(path)
            | SourceLocator::VideoFile(path) => path.display().to_string(),
        }
    }
}

/// Options that do not belong to a single locator.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SourceSettings {
    /// Native rate reported by image-sequence directories.
    pub sequence_fps: f64,
}

impl Default for SourceSettings {
    fn default() -> Self {
        Self { sequence_fps: 30.0 }
    }
}

/// Statistics for a frame source.
#[derive(Clone, Debug)]
pub struct SourceStats {
    pub frames_read: u64,
    pub locator: String,
    pub released: bool,
}

/// Frame source over every supported origin.
pub struct FrameSource {
    backend: SourceBackend,
    label: String,
    frames_read: u64,
    released: bool,
}

enum SourceBackend {
    Synthetic(SyntheticSource),
    Sequence(SequenceSource),
    Still(StillSource),
    #[cfg(feature = "ingest-v4l2")]
    Device(V4l2Source),
    #[cfg(feature = "ingest-file-ffmpeg")]
    VideoFile(FfmpegFileSource),
}

impl FrameSource {
    /// Open the origin named by `locator`.
    ///
    /// Continuous origins must report a positive native rate here, before any
    /// frame is pulled; otherwise opening fails with `ErrorKind::Source`.
    pub fn open(locator: SourceLocator, settings: &SourceSettings) -> Result<Self> {
        let label = locator.label();
        let backend = match locator {
            SourceLocator::Synthetic(cfg) => SourceBackend::Synthetic(SyntheticSource::new(cfg)),
            SourceLocator::Sequence(dir) => {
                SourceBackend::Sequence(SequenceSource::open(&dir, settings.sequence_fps)?)
            }
            SourceLocator::Still(path) => SourceBackend::Still(StillSource::open(&path)?),
            SourceLocator::Device(device) => open_device(&device)?,
            SourceLocator::VideoFile(path) => open_video_file(&path)?,
        };

        let source = Self {
            backend,
            label,
            frames_read: 0,
            released: false,
        };
        if !source.is_still() {
            match source.native_fps() {
                Some(fps) if fps.is_finite() && fps > 0.0 => {}
                other => {
                    return Err(pipeline_error(
                        ErrorKind::Source,
                        format!(
                            "could not retrieve a usable frame rate from {} (got {:?})",
                            source.label, other
                        ),
                    ));
                }
            }
        }

        log::info!(
            "FrameSource: opened {} (native fps: {})",
            source.label,
            source
                .native_fps()
                .map(|fps| format!("{:.2}", fps))
                .unwrap_or_else(|| "n/a".to_string())
        );
        Ok(source)
    }

    /// Nominal rate of a continuous origin. `None` for a still image.
    pub fn native_fps(&self) -> Option<f64> {
        match &self.backend {
            SourceBackend::Synthetic(source) => Some(source.fps()),
            SourceBackend::Sequence(source) => Some(source.fps()),
            SourceBackend::Still(_) => None,
            #[cfg(feature = "ingest-v4l2")]
            SourceBackend::Device(source) => source.fps(),
            #[cfg(feature = "ingest-file-ffmpeg")]
            SourceBackend::VideoFile(source) => source.fps(),
        }
    }

    /// Read the next frame. `Ok(None)` is end of stream.
    ///
    /// Decode failures are reported as `ErrorKind::Read`.
    pub fn next_frame(&mut self) -> Result<Option<Frame>> {
        if self.released {
            return Err(pipeline_error(
                ErrorKind::Source,
                format!("{} was already released", self.label),
            ));
        }
        let image: Option<RgbImage> = match &mut self.backend {
            SourceBackend::Synthetic(source) => source.next_image()?,
            SourceBackend::Sequence(source) => source.next_image()?,
            SourceBackend::Still(source) => source.next_image(),
            #[cfg(feature = "ingest-v4l2")]
            SourceBackend::Device(source) => source.next_image()?,
            #[cfg(feature = "ingest-file-ffmpeg")]
            SourceBackend::VideoFile(source) => source.next_image()?,
        };
        Ok(image.map(|image| {
            let frame = Frame::new(image, self.frames_read);
            self.frames_read += 1;
            frame
        }))
    }

    /// Release the underlying handle. Idempotent.
    pub fn release(&mut self) {
        if self.released {
            return;
        }
        match &mut self.backend {
            SourceBackend::Synthetic(_) | SourceBackend::Sequence(_) | SourceBackend::Still(_) => {}
            #[cfg(feature = "ingest-v4l2")]
            SourceBackend::Device(source) => source.release(),
            #[cfg(feature = "ingest-file-ffmpeg")]
            SourceBackend::VideoFile(source) => source.release(),
        }
        self.released = true;
        log::info!(
            "FrameSource: released {} after {} frames",
            self.label,
            self.frames_read
        );
    }

    pub fn is_released(&self) -> bool {
        self.released
    }

    pub fn is_still(&self) -> bool {
        matches!(self.backend, SourceBackend::Still(_))
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn stats(&self) -> SourceStats {
        SourceStats {
            frames_read: self.frames_read,
            locator: self.label.clone(),
            released: self.released,
        }
    }
}

impl Drop for FrameSource {
    fn drop(&mut self) {
        self.release();
    }
}

#[cfg(feature = "ingest-v4l2")]
fn open_device(device: &str) -> Result<SourceBackend> {
    Ok(SourceBackend::Device(V4l2Source::open(device)?))
}

#[cfg(not(feature = "ingest-v4l2"))]
fn open_device(device: &str) -> Result<SourceBackend> {
    Err(pipeline_error(
        ErrorKind::Source,
        format!("capture device {} requires the ingest-v4l2 feature", device),
    ))
}

#[cfg(feature = "ingest-file-ffmpeg")]
fn open_video_file(path: &Path) -> Result<SourceBackend> {
    Ok(SourceBackend::VideoFile(FfmpegFileSource::open(path)?))
}

#[cfg(not(feature = "ingest-file-ffmpeg"))]
fn open_video_file(path: &Path) -> Result<SourceBackend> {
    Err(pipeline_error(
        ErrorKind::Source,
        format!(
            "video file {} requires the ingest-file-ffmpeg feature",
            path.display()
        ),
    ))
}
