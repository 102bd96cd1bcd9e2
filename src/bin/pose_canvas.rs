//! pose_canvas - render detected poses onto a blank canvas.
//!
//! Usage: `pose_canvas <model> <input> <video|image|camera>`
//!
//! - `video`: capture at the target rate, persist `frames/frame_NNNNNN.jpg`,
//!   then assemble the frames into one output artifact.
//! - `image`: render one still image to `processed_image.jpg`.
//! - `camera`: render every frame to a preview file until Ctrl-C.
//!
//! Settings come from `POSE_CANVAS_CONFIG` (TOML or JSON), `POSE_CANVAS_*`
//! environment variables and the flags below, in that order.

use anyhow::Result;
use clap::Parser;
use std::io::IsTerminal;
use std::path::PathBuf;

use pose_canvas::pipeline;
use pose_canvas::ui::Ui;
use pose_canvas::{Codec, PipelineConfig, PipelineMode, RunOutcome, StopSignal};

#[derive(Parser, Debug)]
#[command(
    name = "pose_canvas",
    about = "Render detected poses onto a blank canvas"
)]
struct Args {
    /// Model reference: `stub`, `stub://<n>` or a YOLOv8-pose `.onnx` file
    model: String,

    /// Input: device index, /dev/videoN, image file, frame directory, video file or stub://
    input: String,

    /// Mode: video, image or camera
    mode: String,

    /// Target rate for video mode (frames per second)
    #[arg(long, value_name = "FPS")]
    target_fps: Option<f64>,

    /// Directory for persisted frames
    #[arg(long, value_name = "DIR")]
    output_dir: Option<PathBuf>,

    /// Assembled artifact path
    #[arg(long, value_name = "PATH")]
    artifact: Option<PathBuf>,

    /// Output codec (gif|mpeg4)
    #[arg(long, value_name = "CODEC")]
    codec: Option<String>,

    /// Rendered image path for image mode
    #[arg(long, value_name = "PATH")]
    image_output: Option<PathBuf>,

    /// Preview file for camera mode
    #[arg(long, value_name = "PATH")]
    preview: Option<PathBuf>,

    /// UI mode for stderr progress (auto|plain|pretty)
    #[arg(long, default_value = "auto", value_name = "MODE")]
    ui: String,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    if let Err(err) = run_cli(&args) {
        log::error!("pose_canvas: {:#}", err);
        return Err(err);
    }
    Ok(())
}

fn run_cli(args: &Args) -> Result<()> {
    let ui = Ui::from_args(&args.ui, std::io::stderr().is_terminal());

    let mode = PipelineMode::parse(&args.mode)?;
    let mut cfg = PipelineConfig::load(args.model.as_str(), args.input.as_str(), mode)?;
    apply_args(&mut cfg, args)?;

    let stop = StopSignal::new();
    if mode == PipelineMode::Live {
        stop.install_ctrlc()?;
    }

    match pipeline::run(&cfg, &stop, &ui)? {
        RunOutcome::Stream { summary, assembly } => {
            println!(
                "pose_canvas: {} of {} frames kept (skip {}), wrote {} ({} frames, {} skipped)",
                summary.frames_kept,
                summary.frames_read,
                summary.skip,
                assembly.artifact.display(),
                assembly.frames_written,
                assembly.skipped.len()
            );
        }
        RunOutcome::Still { output, pose_count } => {
            println!("pose_canvas: wrote {} ({} poses)", output.display(), pose_count);
        }
        RunOutcome::Live(summary) => {
            println!(
                "pose_canvas: live session ended ({:?}) after {} frames",
                summary.ended_by, summary.frames_rendered
            );
        }
    }
    Ok(())
}

fn apply_args(cfg: &mut PipelineConfig, args: &Args) -> Result<()> {
    if let Some(fps) = args.target_fps {
        cfg.target_fps = fps;
    }
    if let Some(dir) = &args.output_dir {
        cfg.output.dir = dir.clone();
    }
    if let Some(artifact) = &args.artifact {
        cfg.output.artifact = Some(artifact.clone());
    }
    if let Some(codec) = &args.codec {
        cfg.output.codec = Codec::parse(codec)?;
    }
    if let Some(image) = &args.image_output {
        cfg.output.image = image.clone();
    }
    if let Some(preview) = &args.preview {
        cfg.preview_path = preview.clone();
    }
    Ok(())
}
