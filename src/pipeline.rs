//! Mode orchestration.
//!
//! - `video` (`run_stream`): source -> rate governor -> processor -> frame
//!   store, then the assembly pass over the stored frames.
//! - `image` (`run_still`): one frame -> processor -> one output image.
//! - `camera` (`run_live`): every frame -> processor -> display surface, until
//!   the source ends, a read fails or the stop signal is raised.
//!
//! Every mode runs single-threaded in capture order and releases the source on
//! every exit path. A mid-stream read failure ends the stream like end of
//! source; any other failure aborts the run.

use anyhow::Result;
use std::path::{Path, PathBuf};

use crate::assemble::{Assembler, AssemblyReport};
use crate::config::{PipelineConfig, PipelineMode};
use crate::display::{DisplaySurface, PreviewFileSurface, StopSignal};
use crate::frame::{Frame, RenderedFrame};
use crate::governor::RateGovernor;
use crate::ingest::FrameSource;
use crate::persist::{encode_canvas, write_atomic, FrameFormat, FrameStore};
use crate::pose::{select_estimator, IouTracker, SkeletonRenderer};
use crate::processor::FrameProcessor;
use crate::ui::Ui;
use crate::{error_kind, pipeline_error, ErrorKind};

/// Why a frame loop stopped without an error.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EndReason {
    EndOfSource,
    ReadFailure,
    Cancelled,
}

#[derive(Clone, Debug, PartialEq)]
pub struct StreamSummary {
    pub frames_read: u64,
    pub frames_kept: u64,
    pub frames_persisted: u64,
    pub skip: u64,
    pub source_fps: f64,
    pub ended_by: EndReason,
}

#[derive(Clone, Debug, PartialEq)]
pub struct LiveSummary {
    pub frames_rendered: u64,
    pub ended_by: EndReason,
}

#[derive(Clone, Debug, PartialEq)]
pub enum RunOutcome {
    Stream {
        summary: StreamSummary,
        assembly: AssemblyReport,
    },
    Still {
        output: PathBuf,
        pose_count: usize,
    },
    Live(LiveSummary),
}

type ProgressFn = Box<dyn FnMut(u64)>;

pub struct Pipeline {
    processor: FrameProcessor,
    target_fps: f64,
    progress: Option<ProgressFn>,
    warmed: bool,
}

impl Pipeline {
    pub fn new(processor: FrameProcessor, target_fps: f64) -> Self {
        Self {
            processor,
            target_fps,
            progress: None,
            warmed: false,
        }
    }

    /// Estimator from the model reference, IoU tracker and skeleton renderer.
    pub fn from_config(cfg: &PipelineConfig) -> Result<Self> {
        let estimator = select_estimator(&cfg.model, &cfg.estimator)?;
        let processor = FrameProcessor::new(
            estimator,
            Box::new(IouTracker::new(cfg.tracker)),
            Box::new(SkeletonRenderer::new(cfg.estimator.keypoint_threshold)),
        )
        .with_background(cfg.render.background)
        .with_annotations(cfg.render.annotate);
        Ok(Self::new(processor, cfg.target_fps))
    }

    /// Called with the running count after every persisted or displayed frame.
    pub fn with_progress(mut self, progress: impl FnMut(u64) + 'static) -> Self {
        self.progress = Some(Box::new(progress));
        self
    }

    pub fn processor(&self) -> &FrameProcessor {
        &self.processor
    }

    /// Governed capture into `store`. The source is released before returning.
    pub fn run_stream(
        &mut self,
        source: &mut FrameSource,
        store: &mut FrameStore,
    ) -> Result<StreamSummary> {
        let result = self.stream_loop(source, store);
        source.release();
        match &result {
            Ok(summary) => log::info!(
                "Pipeline: stream ended ({:?}): read {}, kept {}, persisted {} (skip {})",
                summary.ended_by,
                summary.frames_read,
                summary.frames_kept,
                summary.frames_persisted,
                summary.skip
            ),
            Err(err) => log::error!(
                "Pipeline: stream aborted after {} persisted frames: {:#}",
                store.persisted(),
                err
            ),
        }
        result
    }

    fn stream_loop(
        &mut self,
        source: &mut FrameSource,
        store: &mut FrameStore,
    ) -> Result<StreamSummary> {
        let source_fps = source.native_fps().ok_or_else(|| {
            pipeline_error(
                ErrorKind::Source,
                format!("{} has no native frame rate", source.label()),
            )
        })?;
        let mut governor = RateGovernor::new(source_fps, self.target_fps)?;
        self.warm_up()?;

        let ended_by = loop {
            let frame = match next_frame(source)? {
                Ok(frame) => frame,
                Err(reason) => break reason,
            };
            if !governor.observe() {
                continue;
            }
            let rendered = self.processor.process(frame)?;
            store.persist(&rendered)?;
            self.report_progress(store.persisted());
        };

        Ok(StreamSummary {
            frames_read: governor.seen(),
            frames_kept: governor.kept(),
            frames_persisted: store.persisted(),
            skip: governor.skip(),
            source_fps,
            ended_by,
        })
    }

    /// One frame to one image at `output`. The source is released before
    /// returning.
    pub fn run_still(
        &mut self,
        source: &mut FrameSource,
        output: &Path,
        jpeg_quality: u8,
    ) -> Result<RenderedFrame> {
        let result = self.still_once(source, output, jpeg_quality);
        source.release();
        result
    }

    fn still_once(
        &mut self,
        source: &mut FrameSource,
        output: &Path,
        jpeg_quality: u8,
    ) -> Result<RenderedFrame> {
        let format = FrameFormat::from_path(output)?;
        self.warm_up()?;
        let frame = source.next_frame()?.ok_or_else(|| {
            pipeline_error(
                ErrorKind::Source,
                format!("{} produced no image", source.label()),
            )
        })?;

        let rendered = self.processor.process(frame)?;
        if let Some(parent) = output.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| {
                pipeline_error(
                    ErrorKind::Persistence,
                    format!("failed to create {}: {}", parent.display(), e),
                )
            })?;
        }
        encode_canvas(&rendered.canvas, format, jpeg_quality)
            .and_then(|bytes| write_atomic(output, &bytes))
            .map_err(|e| {
                pipeline_error(
                    ErrorKind::Persistence,
                    format!("failed to write {}: {:#}", output.display(), e),
                )
            })?;
        self.report_progress(1);

        log::info!(
            "Pipeline: wrote {} ({}x{}, {} poses)",
            output.display(),
            rendered.width(),
            rendered.height(),
            rendered.pose_count
        );
        Ok(rendered)
    }

    /// Every frame to `surface` until end of source, a read failure or `stop`.
    /// The source is released and the surface closed before returning.
    pub fn run_live(
        &mut self,
        source: &mut FrameSource,
        surface: &mut dyn DisplaySurface,
        stop: &StopSignal,
    ) -> Result<LiveSummary> {
        let result = self.live_loop(source, surface, stop);
        source.release();
        let closed = surface.close();
        let summary = result?;
        closed?;
        log::info!(
            "Pipeline: live session ended ({:?}) after {} frames",
            summary.ended_by,
            summary.frames_rendered
        );
        Ok(summary)
    }

    fn live_loop(
        &mut self,
        source: &mut FrameSource,
        surface: &mut dyn DisplaySurface,
        stop: &StopSignal,
    ) -> Result<LiveSummary> {
        self.warm_up()?;
        let mut frames_rendered = 0u64;
        let ended_by = loop {
            if stop.is_raised() {
                break EndReason::Cancelled;
            }
            let frame = match next_frame(source)? {
                Ok(frame) => frame,
                Err(reason) => break reason,
            };
            let rendered = self.processor.process(frame)?;
            surface.present(&rendered).map_err(|e| {
                pipeline_error(
                    ErrorKind::Persistence,
                    format!("failed to present frame: {:#}", e),
                )
            })?;
            frames_rendered += 1;
            self.report_progress(frames_rendered);
        };
        Ok(LiveSummary {
            frames_rendered,
            ended_by,
        })
    }

    /// Estimator warm-up, once per pipeline, before its first frame.
    fn warm_up(&mut self) -> Result<()> {
        if !self.warmed {
            self.processor.warm_up()?;
            self.warmed = true;
        }
        Ok(())
    }

    fn report_progress(&mut self, count: u64) {
        if let Some(progress) = self.progress.as_mut() {
            progress(count);
        }
    }
}

/// Pull one frame. The inner `Err` is a clean end of stream: exhausted
/// source, or a read failure (logged).
fn next_frame(source: &mut FrameSource) -> Result<std::result::Result<Frame, EndReason>> {
    match source.next_frame() {
        Ok(Some(frame)) => Ok(Ok(frame)),
        Ok(None) => Ok(Err(EndReason::EndOfSource)),
        Err(err) if error_kind(&err) == Some(ErrorKind::Read) => {
            log::warn!(
                "Pipeline: read failure on {}, ending stream: {:#}",
                source.label(),
                err
            );
            Ok(Err(EndReason::ReadFailure))
        }
        Err(err) => Err(err),
    }
}

/// Open the source named by the configuration.
pub fn open_source(cfg: &PipelineConfig) -> Result<FrameSource> {
    FrameSource::open(cfg.locator()?, &cfg.source_settings())
}

pub fn frame_store(cfg: &PipelineConfig) -> FrameStore {
    FrameStore::new(
        &cfg.output.dir,
        cfg.output.frame_format,
        cfg.output.jpeg_quality,
    )
}

/// The assembly pass runs at the target rate.
pub fn assembler(cfg: &PipelineConfig) -> Result<Assembler> {
    Assembler::new(cfg.output.codec, cfg.target_fps, cfg.artifact_path())
}

/// Validate `cfg` and run its mode to completion, reporting each stage on `ui`.
pub fn run(cfg: &PipelineConfig, stop: &StopSignal, ui: &Ui) -> Result<RunOutcome> {
    cfg.validate()?;
    let mut pipeline = Pipeline::from_config(cfg)?;
    let mut source = {
        let stage = ui.stage("Open source");
        let source = open_source(cfg)?;
        stage.finish(source.label().to_string());
        source
    };

    match cfg.mode {
        PipelineMode::Stream => {
            let summary = {
                let stage = ui.stage("Capture and render");
                let counter = stage.counter("frames persisted");
                let mut pipeline = pipeline.with_progress(move |count| counter.update(count));
                let mut store = frame_store(cfg);
                store.prepare()?;
                let summary = pipeline.run_stream(&mut source, &mut store)?;
                stage.finish(format!(
                    "{} frames in {}",
                    summary.frames_persisted,
                    store.dir().display()
                ));
                summary
            };
            let assembly = {
                let stage = ui.stage("Assemble");
                let report = assembler(cfg)?.assemble(&cfg.output.dir)?;
                stage.finish(report.artifact.display().to_string());
                report
            };
            Ok(RunOutcome::Stream { summary, assembly })
        }
        PipelineMode::Still => {
            let stage = ui.stage("Render image");
            let rendered =
                pipeline.run_still(&mut source, &cfg.output.image, cfg.output.jpeg_quality)?;
            stage.finish(format!("{} poses", rendered.pose_count));
            Ok(RunOutcome::Still {
                output: cfg.output.image.clone(),
                pose_count: rendered.pose_count,
            })
        }
        PipelineMode::Live => {
            let stage = ui.stage("Live preview (Ctrl-C to stop)");
            let counter = stage.counter("frames");
            let mut surface = PreviewFileSurface::new(&cfg.preview_path)?;
            let mut pipeline = pipeline.with_progress(move |count| counter.update(count));
            let summary = pipeline.run_live(&mut source, &mut surface, stop)?;
            stage.finish(format!("{} frames", summary.frames_rendered));
            Ok(RunOutcome::Live(summary))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ingest::{SourceLocator, SourceSettings};
    use crate::pose::{PassthroughTracker, Pose, PoseEstimator, StubEstimator};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    struct WarmingEstimator {
        warm_ups: Arc<AtomicUsize>,
        fail_warm_up: bool,
    }

    impl PoseEstimator for WarmingEstimator {
        fn name(&self) -> &'static str {
            "warming"
        }

        fn estimate(&mut self, _frame: &Frame) -> Result<Vec<Pose>> {
            Ok(Vec::new())
        }

        fn warm_up(&mut self) -> Result<()> {
            self.warm_ups.fetch_add(1, Ordering::SeqCst);
            if self.fail_warm_up {
                return Err(anyhow::anyhow!("weights missing"));
            }
            Ok(())
        }
    }

    fn warming_pipeline(fail_warm_up: bool) -> (Pipeline, Arc<AtomicUsize>) {
        let warm_ups = Arc::new(AtomicUsize::new(0));
        let estimator = WarmingEstimator {
            warm_ups: Arc::clone(&warm_ups),
            fail_warm_up,
        };
        let processor = FrameProcessor::new(
            Box::new(estimator),
            Box::new(PassthroughTracker),
            Box::new(SkeletonRenderer::new(0.5)),
        );
        (Pipeline::new(processor, 30.0), warm_ups)
    }

    fn stub_pipeline(target_fps: f64) -> Pipeline {
        let processor = FrameProcessor::new(
            Box::new(StubEstimator::new(1)),
            Box::new(PassthroughTracker),
            Box::new(SkeletonRenderer::new(0.5)),
        );
        Pipeline::new(processor, target_fps)
    }

    fn open(locator: &str, mode: PipelineMode) -> Result<FrameSource> {
        FrameSource::open(SourceLocator::parse(locator, mode)?, &SourceSettings::default())
    }

    #[test]
    fn read_failure_ends_the_stream_cleanly() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let mut source = open("stub://cam?fps=30&frames=10&fail_at=4", PipelineMode::Stream)?;
        let mut store = FrameStore::new(dir.path(), FrameFormat::Png, 90);

        let summary = stub_pipeline(30.0).run_stream(&mut source, &mut store)?;
        assert_eq!(summary.ended_by, EndReason::ReadFailure);
        assert_eq!(summary.frames_persisted, 4);
        assert!(source.is_released());
        Ok(())
    }

    #[test]
    fn live_loop_stops_on_signal() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let mut source = open("stub://cam?fps=30", PipelineMode::Live)?;
        let mut surface = PreviewFileSurface::new(dir.path().join("preview.png"))?;
        let stop = StopSignal::new();
        let trigger = stop.clone();

        let mut pipeline = stub_pipeline(30.0).with_progress(move |count| {
            if count == 5 {
                trigger.raise();
            }
        });
        let summary = pipeline.run_live(&mut source, &mut surface, &stop)?;

        assert_eq!(summary.ended_by, EndReason::Cancelled);
        assert_eq!(summary.frames_rendered, 5);
        assert!(source.is_released());
        assert!(dir.path().join("preview.png").exists());
        Ok(())
    }

    #[test]
    fn live_mode_renders_every_frame() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let mut source = open("stub://cam?fps=120&frames=7", PipelineMode::Live)?;
        let mut surface = PreviewFileSurface::new(dir.path().join("preview.jpg"))?;

        let summary = stub_pipeline(30.0).run_live(&mut source, &mut surface, &StopSignal::new())?;
        assert_eq!(summary.ended_by, EndReason::EndOfSource);
        assert_eq!(summary.frames_rendered, 7);
        Ok(())
    }

    #[test]
    fn estimator_warms_up_once_before_the_first_frame() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let (mut pipeline, warm_ups) = warming_pipeline(false);

        let mut source = open("stub://cam?fps=30&frames=5", PipelineMode::Stream)?;
        let mut store = FrameStore::new(dir.path().join("a"), FrameFormat::Png, 90);
        pipeline.run_stream(&mut source, &mut store)?;
        assert_eq!(warm_ups.load(Ordering::SeqCst), 1);

        let mut source = open("stub://cam?fps=30&frames=2", PipelineMode::Stream)?;
        let mut store = FrameStore::new(dir.path().join("b"), FrameFormat::Png, 90);
        pipeline.run_stream(&mut source, &mut store)?;
        assert_eq!(warm_ups.load(Ordering::SeqCst), 1);
        Ok(())
    }

    #[test]
    fn failed_warm_up_aborts_before_any_frame() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let frames = dir.path().join("frames");
        let (mut pipeline, warm_ups) = warming_pipeline(true);
        let mut source = open("stub://cam?fps=30&frames=5", PipelineMode::Stream)?;
        let mut store = FrameStore::new(&frames, FrameFormat::Png, 90);

        let err = pipeline.run_stream(&mut source, &mut store).unwrap_err();
        assert_eq!(error_kind(&err), Some(ErrorKind::Processing));
        assert_eq!(warm_ups.load(Ordering::SeqCst), 1);
        assert_eq!(store.persisted(), 0);
        assert!(!frames.exists());
        assert!(source.is_released());
        Ok(())
    }
}
