use anyhow::Result;
use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::assemble::Codec;
use crate::ingest::{SourceLocator, SourceSettings};
use crate::persist::FrameFormat;
use crate::pose::{EstimatorSettings, TrackerSettings};
use crate::{pipeline_error, ErrorKind};

const DEFAULT_TARGET_FPS: f64 = 32.0;
const DEFAULT_OUTPUT_DIR: &str = "frames";
const DEFAULT_IMAGE_OUTPUT: &str = "processed_image.jpg";
const DEFAULT_PREVIEW_PATH: &str = "preview.jpg";
const DEFAULT_JPEG_QUALITY: u8 = 90;
const DEFAULT_BACKGROUND: [u8; 3] = [255, 255, 255];

/// What the pipeline does with the frames it reads.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PipelineMode {
    /// `video`: governed capture, persisted frames, assembled artifact.
    Stream,
    /// `image`: one still image to one rendered image.
    Still,
    /// `camera`: every frame to the display surface until stopped.
    Live,
}

impl PipelineMode {
    pub fn parse(value: &str) -> Result<Self> {
        match value {
            "video" => Ok(PipelineMode::Stream),
            "image" => Ok(PipelineMode::Still),
            "camera" => Ok(PipelineMode::Live),
            other => Err(pipeline_error(
                ErrorKind::Configuration,
                format!(
                    "invalid mode '{}' (expected one of: video, image, camera)",
                    other
                ),
            )),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PipelineMode::Stream => "video",
            PipelineMode::Still => "image",
            PipelineMode::Live => "camera",
        }
    }
}

#[derive(Debug, Deserialize, Default)]
struct PipelineConfigFile {
    target_fps: Option<f64>,
    output: Option<OutputConfigFile>,
    render: Option<RenderConfigFile>,
    source: Option<SourceConfigFile>,
    live: Option<LiveConfigFile>,
    tracker: Option<TrackerConfigFile>,
    estimator: Option<EstimatorConfigFile>,
}

#[derive(Debug, Deserialize, Default)]
struct OutputConfigFile {
    dir: Option<PathBuf>,
    artifact: Option<PathBuf>,
    codec: Option<String>,
    image: Option<PathBuf>,
    frame_format: Option<String>,
    jpeg_quality: Option<u8>,
}

#[derive(Debug, Deserialize, Default)]
struct RenderConfigFile {
    background: Option<[u8; 3]>,
    annotate: Option<bool>,
}

#[derive(Debug, Deserialize, Default)]
struct SourceConfigFile {
    sequence_fps: Option<f64>,
}

#[derive(Debug, Deserialize, Default)]
struct LiveConfigFile {
    preview_path: Option<PathBuf>,
}

#[derive(Debug, Deserialize, Default)]
struct TrackerConfigFile {
    iou_threshold: Option<f32>,
    max_age: Option<u32>,
    smoothing: Option<f32>,
}

#[derive(Debug, Deserialize, Default)]
struct EstimatorConfigFile {
    confidence_threshold: Option<f32>,
    keypoint_threshold: Option<f32>,
    iou_threshold: Option<f32>,
    max_detections: Option<usize>,
    input_size: Option<u32>,
}

/// Run configuration. Built once at startup, read-only afterwards.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub model: String,
    pub input: String,
    pub mode: PipelineMode,
    pub target_fps: f64,
    pub output: OutputSettings,
    pub render: RenderSettings,
    /// Native rate reported by image-sequence directories; `target_fps` if unset.
    pub sequence_fps: Option<f64>,
    pub preview_path: PathBuf,
    pub tracker: TrackerSettings,
    pub estimator: EstimatorSettings,
}

#[derive(Debug, Clone)]
pub struct OutputSettings {
    pub dir: PathBuf,
    /// Explicit artifact path; the codec's default name otherwise.
    pub artifact: Option<PathBuf>,
    pub codec: Codec,
    pub image: PathBuf,
    pub frame_format: FrameFormat,
    pub jpeg_quality: u8,
}

#[derive(Debug, Clone, Copy)]
pub struct RenderSettings {
    pub background: [u8; 3],
    pub annotate: bool,
}

impl PipelineConfig {
    /// Defaults only; no file or environment.
    pub fn new(model: impl Into<String>, input: impl Into<String>, mode: PipelineMode) -> Self {
        Self {
            model: model.into(),
            input: input.into(),
            mode,
            target_fps: DEFAULT_TARGET_FPS,
            output: OutputSettings {
                dir: PathBuf::from(DEFAULT_OUTPUT_DIR),
                artifact: None,
                codec: Codec::Gif,
                image: PathBuf::from(DEFAULT_IMAGE_OUTPUT),
                frame_format: FrameFormat::Jpg,
                jpeg_quality: DEFAULT_JPEG_QUALITY,
            },
            render: RenderSettings {
                background: DEFAULT_BACKGROUND,
                annotate: true,
            },
            sequence_fps: None,
            preview_path: PathBuf::from(DEFAULT_PREVIEW_PATH),
            tracker: TrackerSettings::default(),
            estimator: EstimatorSettings::default(),
        }
    }

    /// Defaults, then the file named by `POSE_CANVAS_CONFIG`, then environment
    /// overrides. Callers apply CLI overrides and then call `validate`.
    pub fn load(
        model: impl Into<String>,
        input: impl Into<String>,
        mode: PipelineMode,
    ) -> Result<Self> {
        let config_path = std::env::var("POSE_CANVAS_CONFIG").ok();
        let file_cfg = match config_path.as_deref() {
            Some(path) if !path.trim().is_empty() => Some(read_config_file(Path::new(path))?),
            _ => None,
        };
        let mut cfg = Self::new(model, input, mode);
        cfg.apply_file(file_cfg.unwrap_or_default())?;
        cfg.apply_env()?;
        Ok(cfg)
    }

    fn apply_file(&mut self, file: PipelineConfigFile) -> Result<()> {
        if let Some(fps) = file.target_fps {
            self.target_fps = fps;
        }
        if let Some(output) = file.output {
            if let Some(dir) = output.dir {
                self.output.dir = dir;
            }
            if output.artifact.is_some() {
                self.output.artifact = output.artifact;
            }
            if let Some(codec) = output.codec {
                self.output.codec = Codec::parse(&codec)?;
            }
            if let Some(image) = output.image {
                self.output.image = image;
            }
            if let Some(format) = output.frame_format {
                self.output.frame_format = FrameFormat::parse(&format)?;
            }
            if let Some(quality) = output.jpeg_quality {
                self.output.jpeg_quality = quality;
            }
        }
        if let Some(render) = file.render {
            if let Some(background) = render.background {
                self.render.background = background;
            }
            if let Some(annotate) = render.annotate {
                self.render.annotate = annotate;
            }
        }
        if let Some(source) = file.source {
            self.sequence_fps = source.sequence_fps.or(self.sequence_fps);
        }
        if let Some(preview) = file.live.and_then(|live| live.preview_path) {
            self.preview_path = preview;
        }
        if let Some(tracker) = file.tracker {
            let defaults = self.tracker;
            self.tracker = TrackerSettings {
                iou_threshold: tracker.iou_threshold.unwrap_or(defaults.iou_threshold),
                max_age: tracker.max_age.unwrap_or(defaults.max_age),
                smoothing: tracker.smoothing.unwrap_or(defaults.smoothing),
            };
        }
        if let Some(estimator) = file.estimator {
            let defaults = self.estimator;
            self.estimator = EstimatorSettings {
                confidence_threshold: estimator
                    .confidence_threshold
                    .unwrap_or(defaults.confidence_threshold),
                keypoint_threshold: estimator
                    .keypoint_threshold
                    .unwrap_or(defaults.keypoint_threshold),
                iou_threshold: estimator.iou_threshold.unwrap_or(defaults.iou_threshold),
                max_detections: estimator.max_detections.unwrap_or(defaults.max_detections),
                input_size: estimator.input_size.unwrap_or(defaults.input_size),
            };
        }
        Ok(())
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Ok(fps) = std::env::var("POSE_CANVAS_TARGET_FPS") {
            if !fps.trim().is_empty() {
                self.target_fps = fps.trim().parse().map_err(|_| {
                    pipeline_error(
                        ErrorKind::Configuration,
                        format!("POSE_CANVAS_TARGET_FPS must be a number, got '{}'", fps),
                    )
                })?;
            }
        }
        if let Ok(dir) = std::env::var("POSE_CANVAS_OUTPUT_DIR") {
            if !dir.trim().is_empty() {
                self.output.dir = PathBuf::from(dir);
            }
        }
        if let Ok(artifact) = std::env::var("POSE_CANVAS_ARTIFACT") {
            if !artifact.trim().is_empty() {
                self.output.artifact = Some(PathBuf::from(artifact));
            }
        }
        if let Ok(codec) = std::env::var("POSE_CANVAS_CODEC") {
            if !codec.trim().is_empty() {
                self.output.codec = Codec::parse(&codec)?;
            }
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        let invalid = |msg: String| Err(pipeline_error(ErrorKind::Configuration, msg));

        if self.model.trim().is_empty() {
            return invalid("model reference is empty".to_string());
        }
        if !self.target_fps.is_finite() || self.target_fps <= 0.0 {
            return invalid(format!(
                "target fps must be positive, got {}",
                self.target_fps
            ));
        }
        if let Some(fps) = self.sequence_fps {
            if !fps.is_finite() || fps <= 0.0 {
                return invalid(format!("sequence fps must be positive, got {}", fps));
            }
        }
        if !(1..=100).contains(&self.output.jpeg_quality) {
            return invalid(format!(
                "jpeg quality must be within 1..=100, got {}",
                self.output.jpeg_quality
            ));
        }
        if self.mode == PipelineMode::Stream && !self.output.codec.is_available() {
            return invalid(format!(
                "codec {} is not available in this build",
                self.output.codec.name()
            ));
        }
        self.tracker
            .validate()
            .map_err(|e| pipeline_error(ErrorKind::Configuration, e.to_string()))?;

        let estimator = &self.estimator;
        for (name, value) in [
            ("confidence_threshold", estimator.confidence_threshold),
            ("keypoint_threshold", estimator.keypoint_threshold),
            ("iou_threshold", estimator.iou_threshold),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return invalid(format!("estimator {} must be within 0..=1", name));
            }
        }
        if estimator.input_size == 0 || estimator.input_size % 32 != 0 {
            return invalid(format!(
                "estimator input_size must be a positive multiple of 32, got {}",
                estimator.input_size
            ));
        }

        self.locator()?;
        Ok(())
    }

    pub fn locator(&self) -> Result<SourceLocator> {
        SourceLocator::parse(&self.input, self.mode)
    }

    pub fn source_settings(&self) -> SourceSettings {
        SourceSettings {
            sequence_fps: self.sequence_fps.unwrap_or(self.target_fps),
        }
    }

    /// Path of the assembled artifact.
    pub fn artifact_path(&self) -> PathBuf {
        self.output
            .artifact
            .clone()
            .unwrap_or_else(|| PathBuf::from(self.output.codec.default_artifact()))
    }
}

fn read_config_file(path: &Path) -> Result<PipelineConfigFile> {
    let raw = std::fs::read_to_string(path).map_err(|e| {
        pipeline_error(
            ErrorKind::Configuration,
            format!("failed to read config file {}: {}", path.display(), e),
        )
    })?;
    let is_toml = path
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("toml"));
    let parsed = if is_toml {
        toml::from_str(&raw).map_err(|e| e.to_string())
    } else {
        serde_json::from_str(&raw).map_err(|e| e.to_string())
    };
    parsed.map_err(|e| {
        pipeline_error(
            ErrorKind::Configuration,
            format!("invalid config file {}: {}", path.display(), e),
        )
    })
}
