//! Assembly stage: persisted frames to one output container.
//!
//! A second pass, independent of capture. It lists the `frame_<index>.<ext>`
//! files of a directory in sequence order, fixes the output dimensions from the
//! first readable frame and appends every readable frame to a `VideoWriter` at
//! a fixed rate.
//!
//! Recovery rules:
//! - An unreadable frame is skipped with a warning and recorded in the report.
//! - No frames at all, or no readable frame, is `ErrorKind::AssemblyEmptyInput`
//!   and no artifact is created.
//! - A frame whose dimensions differ from the first is `ErrorKind::Processing`.
//!   Fatal errors abort the writer, so a failed pass publishes no artifact.

#[cfg(feature = "assemble-ffmpeg")]
mod ffmpeg;
mod gif;

use anyhow::Result;
use image::RgbImage;
use std::path::{Path, PathBuf};

use crate::persist::list_persisted_frames;
use crate::{pipeline_error, ErrorKind};

#[cfg(feature = "assemble-ffmpeg")]
pub use ffmpeg::FfmpegWriter;
pub use gif::GifWriter;

/// Output container encoding.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Codec {
    /// Animated GIF, always available. Frame delays are whole centiseconds, so
    /// rates that do not divide 100 play slightly fast (32 fps plays at ~33.3).
    Gif,
    /// MPEG-4 Part 2 in AVI (feature: assemble-ffmpeg).
    Mpeg4,
}

impl Codec {
    pub fn parse(value: &str) -> Result<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "gif" => Ok(Codec::Gif),
            "mpeg4" | "xvid" => Ok(Codec::Mpeg4),
            other => Err(pipeline_error(
                ErrorKind::Configuration,
                format!("unsupported codec '{}' (expected gif or mpeg4)", other),
            )),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Codec::Gif => "gif",
            Codec::Mpeg4 => "mpeg4",
        }
    }

    pub fn default_artifact(&self) -> &'static str {
        match self {
            Codec::Gif => "poses_video.gif",
            Codec::Mpeg4 => "poses_video.avi",
        }
    }

    /// Whether this build can write the codec.
    pub fn is_available(&self) -> bool {
        match self {
            Codec::Gif => true,
            Codec::Mpeg4 => cfg!(feature = "assemble-ffmpeg"),
        }
    }
}

/// Fixed for the duration of one assembly pass.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct OutputVideoParameters {
    pub codec: Codec,
    pub fps: f64,
    pub width: u32,
    pub height: u32,
}

/// Sink for assembled frames.
pub trait VideoWriter {
    /// Open the output container. Called once, before the first `write`.
    fn open(&mut self, path: &Path, params: &OutputVideoParameters) -> Result<()>;

    /// Append one frame; dimensions match the opened parameters.
    fn write(&mut self, frame: &RgbImage) -> Result<()>;

    /// Flush and finalize the container.
    fn close(&mut self) -> Result<()>;

    /// Discard a partly written container. Nothing is left under the final
    /// name.
    fn abort(&mut self) -> Result<()>;
}

/// Writer for `codec`, or a `Configuration` error if it is not compiled in.
pub fn writer_for(codec: Codec) -> Result<Box<dyn VideoWriter>> {
    match codec {
        Codec::Gif => Ok(Box::new(GifWriter::new())),
        #[cfg(feature = "assemble-ffmpeg")]
        Codec::Mpeg4 => Ok(Box::new(FfmpegWriter::new())),
        #[cfg(not(feature = "assemble-ffmpeg"))]
        Codec::Mpeg4 => Err(pipeline_error(
            ErrorKind::Configuration,
            "the mpeg4 codec requires the assemble-ffmpeg feature",
        )),
    }
}

/// Result of a completed assembly pass.
#[derive(Clone, Debug, PartialEq)]
pub struct AssemblyReport {
    pub artifact: PathBuf,
    pub params: OutputVideoParameters,
    pub frames_written: u64,
    /// Frames that could not be decoded, in sequence order.
    pub skipped: Vec<PathBuf>,
}

#[derive(Clone, Debug)]
pub struct Assembler {
    codec: Codec,
    fps: f64,
    output: PathBuf,
}

impl Assembler {
    pub fn new(codec: Codec, fps: f64, output: impl Into<PathBuf>) -> Result<Self> {
        if !fps.is_finite() || fps <= 0.0 {
            return Err(pipeline_error(
                ErrorKind::Configuration,
                format!("assembly rate must be positive, got {}", fps),
            ));
        }
        Ok(Self {
            codec,
            fps,
            output: output.into(),
        })
    }

    pub fn output(&self) -> &Path {
        &self.output
    }

    /// Assemble with the writer matching the configured codec.
    pub fn assemble(&self, dir: &Path) -> Result<AssemblyReport> {
        let mut writer = writer_for(self.codec)?;
        self.assemble_with(dir, writer.as_mut())
    }

    pub fn assemble_with(
        &self,
        dir: &Path,
        writer: &mut dyn VideoWriter,
    ) -> Result<AssemblyReport> {
        if !dir.is_dir() {
            return Err(pipeline_error(
                ErrorKind::AssemblyEmptyInput,
                format!("frame directory {} does not exist", dir.display()),
            ));
        }
        let frames = list_persisted_frames(dir)
            .map_err(|e| pipeline_error(ErrorKind::Assembly, format!("{:#}", e)))?;
        if frames.is_empty() {
            return Err(pipeline_error(
                ErrorKind::AssemblyEmptyInput,
                format!("no persisted frames in {}", dir.display()),
            ));
        }
        log::info!(
            "Assembler: {} frames in {} -> {} ({}, {} fps)",
            frames.len(),
            dir.display(),
            self.output.display(),
            self.codec.name(),
            self.fps
        );

        let mut params: Option<OutputVideoParameters> = None;
        let mut frames_written = 0u64;
        let mut skipped = Vec::new();

        for path in frames {
            let image = match image::open(&path) {
                Ok(image) => image.to_rgb8(),
                Err(err) => {
                    log::warn!("Assembler: skipping {}: {}", path.display(), err);
                    skipped.push(path);
                    continue;
                }
            };

            let fixed = match params {
                Some(fixed) => fixed,
                None => {
                    let fixed = OutputVideoParameters {
                        codec: self.codec,
                        fps: self.fps,
                        width: image.width(),
                        height: image.height(),
                    };
                    writer.open(&self.output, &fixed).map_err(|e| {
                        pipeline_error(
                            ErrorKind::Assembly,
                            format!("could not open {}: {:#}", self.output.display(), e),
                        )
                    })?;
                    params = Some(fixed);
                    fixed
                }
            };

            if image.dimensions() != (fixed.width, fixed.height) {
                abort_quietly(writer);
                return Err(pipeline_error(
                    ErrorKind::Processing,
                    format!(
                        "{} is {}x{}, expected {}x{}",
                        path.display(),
                        image.width(),
                        image.height(),
                        fixed.width,
                        fixed.height
                    ),
                ));
            }

            if let Err(err) = writer.write(&image) {
                abort_quietly(writer);
                return Err(pipeline_error(
                    ErrorKind::Assembly,
                    format!("failed to append {}: {:#}", path.display(), err),
                ));
            }
            frames_written += 1;
        }

        let Some(params) = params else {
            return Err(pipeline_error(
                ErrorKind::AssemblyEmptyInput,
                format!("none of the frames in {} could be read", dir.display()),
            ));
        };

        writer.close().map_err(|e| {
            abort_quietly(writer);
            pipeline_error(
                ErrorKind::Assembly,
                format!("could not finalize {}: {:#}", self.output.display(), e),
            )
        })?;

        log::info!(
            "Assembler: wrote {} frames ({}x{}) to {}, skipped {}",
            frames_written,
            params.width,
            params.height,
            self.output.display(),
            skipped.len()
        );
        Ok(AssemblyReport {
            artifact: self.output.clone(),
            params,
            frames_written,
            skipped,
        })
    }
}

fn abort_quietly(writer: &mut dyn VideoWriter) {
    if let Err(err) = writer.abort() {
        log::warn!("Assembler: failed to discard partial output: {:#}", err);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error_kind;
    use image::Rgb;

    #[derive(Default)]
    struct RecordingWriter {
        opened: Option<OutputVideoParameters>,
        shades: Vec<u8>,
        closed: bool,
        aborted: bool,
    }

    impl VideoWriter for RecordingWriter {
        fn open(&mut self, _path: &Path, params: &OutputVideoParameters) -> Result<()> {
            self.opened = Some(*params);
            Ok(())
        }

        fn write(&mut self, frame: &RgbImage) -> Result<()> {
            self.shades.push(frame.get_pixel(0, 0)[0]);
            Ok(())
        }

        fn close(&mut self) -> Result<()> {
            self.closed = true;
            Ok(())
        }

        fn abort(&mut self) -> Result<()> {
            self.aborted = true;
            Ok(())
        }
    }

    #[derive(Default)]
    struct FailingWriter {
        writes: usize,
        aborted: bool,
    }

    impl VideoWriter for FailingWriter {
        fn open(&mut self, _path: &Path, _params: &OutputVideoParameters) -> Result<()> {
            Ok(())
        }

        fn write(&mut self, _frame: &RgbImage) -> Result<()> {
            self.writes += 1;
            if self.writes == 2 {
                return Err(anyhow::anyhow!("disk full"));
            }
            Ok(())
        }

        fn close(&mut self) -> Result<()> {
            Ok(())
        }

        fn abort(&mut self) -> Result<()> {
            self.aborted = true;
            Ok(())
        }
    }

    fn write_frame(dir: &Path, index: u64, size: (u32, u32), shade: u8) -> Result<()> {
        let name = crate::persist::frame_file_name(index, "png")?;
        RgbImage::from_pixel(size.0, size.1, Rgb([shade; 3])).save(dir.join(name))?;
        Ok(())
    }

    #[test]
    fn codec_parsing_and_defaults() -> Result<()> {
        assert_eq!(Codec::parse("GIF")?, Codec::Gif);
        assert_eq!(Codec::parse("xvid")?, Codec::Mpeg4);
        assert_eq!(Codec::Mpeg4.default_artifact(), "poses_video.avi");
        let err = Codec::parse("h264").unwrap_err();
        assert_eq!(error_kind(&err), Some(ErrorKind::Configuration));
        Ok(())
    }

    #[test]
    fn leading_unreadable_frame_is_skipped() -> Result<()> {
        let dir = tempfile::tempdir()?;
        std::fs::write(dir.path().join("frame_000000.png"), b"corrupt")?;
        write_frame(dir.path(), 1, (6, 4), 10)?;
        write_frame(dir.path(), 2, (6, 4), 20)?;

        let assembler = Assembler::new(Codec::Gif, 10.0, dir.path().join("out.gif"))?;
        let mut writer = RecordingWriter::default();
        let report = assembler.assemble_with(dir.path(), &mut writer)?;

        assert_eq!(report.frames_written, 2);
        assert_eq!(report.skipped, vec![dir.path().join("frame_000000.png")]);
        assert_eq!(writer.shades, vec![10, 20]);
        let opened = writer.opened.expect("writer opened");
        assert_eq!((opened.width, opened.height), (6, 4));
        assert!(writer.closed);
        assert!(!writer.aborted);
        Ok(())
    }

    #[test]
    fn dimension_mismatch_is_a_processing_error() -> Result<()> {
        let dir = tempfile::tempdir()?;
        write_frame(dir.path(), 0, (6, 4), 10)?;
        write_frame(dir.path(), 1, (8, 4), 20)?;

        let assembler = Assembler::new(Codec::Gif, 10.0, dir.path().join("out.gif"))?;
        let mut writer = RecordingWriter::default();
        let err = assembler.assemble_with(dir.path(), &mut writer).unwrap_err();

        assert_eq!(error_kind(&err), Some(ErrorKind::Processing));
        assert_eq!(writer.shades, vec![10]);
        assert!(writer.aborted);
        assert!(!writer.closed);
        Ok(())
    }

    #[test]
    fn dimension_mismatch_leaves_no_gif() -> Result<()> {
        let root = tempfile::tempdir()?;
        let frames = root.path().join("frames");
        std::fs::create_dir_all(&frames)?;
        write_frame(&frames, 0, (16, 12), 10)?;
        write_frame(&frames, 1, (16, 12), 20)?;
        write_frame(&frames, 2, (20, 12), 30)?;
        let artifact = root.path().join("out.gif");

        let err = Assembler::new(Codec::Gif, 10.0, &artifact)?
            .assemble(&frames)
            .unwrap_err();

        assert_eq!(error_kind(&err), Some(ErrorKind::Processing));
        assert!(!artifact.exists());
        assert!(!root.path().join("out.gif.part").exists());
        Ok(())
    }

    #[test]
    fn write_failure_aborts_the_writer() -> Result<()> {
        let dir = tempfile::tempdir()?;
        for i in 0..3 {
            write_frame(dir.path(), i, (6, 4), 10)?;
        }

        let assembler = Assembler::new(Codec::Gif, 10.0, dir.path().join("out.gif"))?;
        let mut writer = FailingWriter::default();
        let err = assembler.assemble_with(dir.path(), &mut writer).unwrap_err();

        assert_eq!(error_kind(&err), Some(ErrorKind::Assembly));
        assert_eq!(writer.writes, 2);
        assert!(writer.aborted);
        Ok(())
    }

    #[test]
    fn all_frames_unreadable_is_empty_input() -> Result<()> {
        let dir = tempfile::tempdir()?;
        std::fs::write(dir.path().join("frame_000000.jpg"), b"corrupt")?;

        let assembler = Assembler::new(Codec::Gif, 10.0, dir.path().join("out.gif"))?;
        let mut writer = RecordingWriter::default();
        let err = assembler.assemble_with(dir.path(), &mut writer).unwrap_err();

        assert_eq!(error_kind(&err), Some(ErrorKind::AssemblyEmptyInput));
        assert!(writer.opened.is_none());
        Ok(())
    }

    #[test]
    fn non_positive_rate_is_rejected() {
        let err = Assembler::new(Codec::Gif, 0.0, "out.gif").unwrap_err();
        assert_eq!(error_kind(&err), Some(ErrorKind::Configuration));
    }
}
