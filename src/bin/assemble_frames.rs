//! assemble_frames - mux a directory of persisted frames into one artifact.
//!
//! Re-runs the assembly pass over `frame_NNNNNN.<ext>` files, e.g. after an
//! interrupted capture. Unreadable frames are skipped and listed.

use anyhow::Result;
use clap::Parser;
use std::io::IsTerminal;
use std::path::PathBuf;

use pose_canvas::ui::Ui;
use pose_canvas::{Assembler, Codec};

#[derive(Parser, Debug)]
#[command(
    name = "assemble_frames",
    about = "Assemble persisted frames into one output artifact"
)]
struct Args {
    /// Directory holding frame_NNNNNN.<ext> files
    #[arg(default_value = "frames")]
    dir: PathBuf,

    /// Output rate (frames per second)
    #[arg(long, default_value_t = 32.0)]
    fps: f64,

    /// Output codec (gif|mpeg4)
    #[arg(long, default_value = "gif")]
    codec: String,

    /// Artifact path (default: poses_video.gif or poses_video.avi)
    #[arg(long, value_name = "PATH")]
    output: Option<PathBuf>,

    /// UI mode for stderr progress (auto|plain|pretty)
    #[arg(long, default_value = "auto", value_name = "MODE")]
    ui: String,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    if let Err(err) = run_cli(args) {
        log::error!("assemble_frames: {:#}", err);
        return Err(err);
    }
    Ok(())
}

fn run_cli(args: Args) -> Result<()> {
    let ui = Ui::from_args(&args.ui, std::io::stderr().is_terminal());

    let codec = Codec::parse(&args.codec)?;
    let output = args
        .output
        .unwrap_or_else(|| PathBuf::from(codec.default_artifact()));
    let assembler = Assembler::new(codec, args.fps, output)?;

    let report = {
        let stage = ui.stage("Assemble");
        let report = assembler.assemble(&args.dir)?;
        stage.finish(format!("{} frames", report.frames_written));
        report
    };

    println!(
        "assemble_frames: wrote {} ({} frames, {}x{} at {} fps)",
        report.artifact.display(),
        report.frames_written,
        report.params.width,
        report.params.height,
        report.params.fps
    );
    for path in &report.skipped {
        println!("  skipped unreadable {}", path.display());
    }
    Ok(())
}
