//! Pose Canvas
//!
//! This crate implements a capture-and-rendering pipeline for pose estimation.
//!
//! # Architecture
//!
//! Frames flow strictly in capture order through a single-threaded pipeline:
//!
//! 1. **Frame Source** (`ingest`): synthetic device, V4L2 device, image sequence,
//!    still image or video file, all behind one `next_frame` capability.
//! 2. **Rate Governor** (`governor`): decimates a continuous source towards a target rate.
//! 3. **Frame Processor** (`processor`): blank canvas, estimation, tracking, rendering.
//! 4. **Sequenced Persistence** (`persist`): `frame_NNNNNN.<ext>` with a contiguous index.
//! 5. **Assembly Stage** (`assemble`): a second pass that muxes persisted frames
//!    into one output container.
//!
//! Pose estimation, tracking and rendering are capabilities (`pose`) consumed
//! through traits; the pipeline never inspects a `Pose`.
//!
//! # Module Structure
//!
//! - `config`: `PipelineConfig`, file + environment layering
//! - `frame`: `Frame`, `RenderedFrame`, blank canvas allocation
//! - `pipeline`: mode orchestration (`video`, `image`, `camera`)
//! - `display`: live preview surface and stop signal

pub mod assemble;
pub mod config;
pub mod display;
pub mod frame;
pub mod governor;
pub mod ingest;
pub mod persist;
pub mod pipeline;
pub mod pose;
pub mod processor;
pub mod ui;

pub use assemble::{
    Assembler, AssemblyReport, Codec, GifWriter, OutputVideoParameters, VideoWriter,
};
pub use config::{PipelineConfig, PipelineMode};
pub use display::{DisplaySurface, PreviewFileSurface, StopSignal};
pub use frame::{blank_canvas, Frame, RenderedFrame};
pub use governor::{should_keep, skip_interval, RateGovernor};
pub use ingest::{FrameSource, SourceLocator};
pub use persist::{frame_file_name, list_persisted_frames, FrameFormat, FrameStore, SequenceCursor};
pub use pipeline::{EndReason, LiveSummary, Pipeline, RunOutcome, StreamSummary};
pub use pose::{
    BoundingBox, IouTracker, Keypoint, Pose, PoseEstimator, PoseRenderer, PoseTracker,
    SkeletonRenderer, StubEstimator,
};
pub use processor::FrameProcessor;

// -------------------- Errors --------------------

/// Failure classes of the pipeline.
///
/// `Read` and per-file assembly read failures are recoverable; every other kind
/// ends the run (or the assembly pass) after releasing acquired handles.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorKind {
    /// Bad mode string, non-positive target rate, invalid settings.
    Configuration,
    /// Sequence index would overflow the fixed-width filename padding.
    Capacity,
    /// Source cannot be opened or reports no usable native rate.
    Source,
    /// A frame could not be read or decoded mid-stream.
    Read,
    /// Estimation, tracking or frame-shape failure.
    Processing,
    /// A rendered frame could not be written.
    Persistence,
    /// No persisted frames to assemble.
    AssemblyEmptyInput,
    /// The output container could not be opened, written or finalized.
    Assembly,
}

impl ErrorKind {
    pub fn code(&self) -> &'static str {
        match self {
            ErrorKind::Configuration => "configuration",
            ErrorKind::Capacity => "capacity",
            ErrorKind::Source => "source",
            ErrorKind::Read => "read",
            ErrorKind::Processing => "processing",
            ErrorKind::Persistence => "persistence",
            ErrorKind::AssemblyEmptyInput => "assembly_empty_input",
            ErrorKind::Assembly => "assembly",
        }
    }
}

#[derive(Clone, Debug)]
pub struct PipelineError {
    pub kind: ErrorKind,
    pub message: String,
}

impl PipelineError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

impl std::fmt::Display for PipelineError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.kind.code(), self.message)
    }
}

impl std::error::Error for PipelineError {}

/// Build an `anyhow::Error` carrying a classified `PipelineError`.
pub fn pipeline_error(kind: ErrorKind, message: impl Into<String>) -> anyhow::Error {
    anyhow::Error::new(PipelineError::new(kind, message))
}

/// Classify an error produced anywhere in the pipeline.
///
/// Context layers added with `anyhow::Context` are looked through.
pub fn error_kind(err: &anyhow::Error) -> Option<ErrorKind> {
    err.chain()
        .find_map(|cause| cause.downcast_ref::<PipelineError>())
        .map(|e| e.kind)
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Context;

    #[test]
    fn error_kind_survives_context_layers() {
        let err = pipeline_error(ErrorKind::Persistence, "disk full");
        let err = Err::<(), _>(err)
            .context("persist frame 3")
            .unwrap_err();
        assert_eq!(error_kind(&err), Some(ErrorKind::Persistence));
        assert!(format!("{:#}", err).contains("persistence: disk full"));
    }

    #[test]
    fn unclassified_errors_have_no_kind() {
        let err = anyhow::anyhow!("plain failure");
        assert_eq!(error_kind(&err), None);
    }
}
