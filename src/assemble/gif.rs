use anyhow::{anyhow, Context, Result};
use image::codecs::gif::{GifEncoder, Repeat};
use image::{Delay, DynamicImage, RgbImage};
use std::fs::{self, File};
use std::io::BufWriter;
use std::path::{Path, PathBuf};
use std::time::Duration;

use super::{OutputVideoParameters, VideoWriter};

/// Animated GIF writer.
///
/// Frames go to `<artifact>.part`; `close` renames it into place and `abort`
/// removes it, so a failed pass leaves no artifact under the final name.
#[derive(Default)]
pub struct GifWriter {
    state: Option<GifState>,
}

struct GifState {
    encoder: GifEncoder<BufWriter<File>>,
    delay: Delay,
    width: u32,
    height: u32,
    tmp_path: PathBuf,
    path: PathBuf,
}

impl GifWriter {
    pub fn new() -> Self {
        Self::default()
    }
}

impl VideoWriter for GifWriter {
    fn open(&mut self, path: &Path, params: &OutputVideoParameters) -> Result<()> {
        if self.state.is_some() {
            return Err(anyhow!("gif writer is already open"));
        }
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .with_context(|| format!("create {}", parent.display()))?;
        }
        let mut tmp_name = path
            .file_name()
            .map(|name| name.to_os_string())
            .context("artifact path has no file name")?;
        tmp_name.push(".part");
        let tmp_path = path.with_file_name(tmp_name);

        let played = played_fps(params.fps);
        if (played - params.fps).abs() > 0.01 {
            log::warn!(
                "GifWriter: {} fps truncates to centisecond delays, plays at {:.2} fps",
                params.fps,
                played
            );
        }

        let file = File::create(&tmp_path)
            .with_context(|| format!("create {}", tmp_path.display()))?;
        let mut encoder = GifEncoder::new_with_speed(BufWriter::new(file), 10);
        encoder
            .set_repeat(Repeat::Infinite)
            .context("set gif repeat")?;

        self.state = Some(GifState {
            encoder,
            delay: Delay::from_saturating_duration(Duration::from_secs_f64(1.0 / params.fps)),
            width: params.width,
            height: params.height,
            tmp_path,
            path: path.to_path_buf(),
        });
        Ok(())
    }

    fn write(&mut self, frame: &RgbImage) -> Result<()> {
        let state = self.state.as_mut().context("gif writer is not open")?;
        if frame.dimensions() != (state.width, state.height) {
            return Err(anyhow!(
                "frame is {}x{}, writer expects {}x{}",
                frame.width(),
                frame.height(),
                state.width,
                state.height
            ));
        }
        let rgba = DynamicImage::ImageRgb8(frame.clone()).into_rgba8();
        state
            .encoder
            .encode_frame(image::Frame::from_parts(rgba, 0, 0, state.delay))
            .context("encode gif frame")?;
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        let Some(state) = self.state.take() else {
            return Ok(());
        };
        // Dropping the encoder writes the trailer and flushes the buffer.
        drop(state.encoder);
        fs::rename(&state.tmp_path, &state.path).with_context(|| {
            format!(
                "rename {} to {}",
                state.tmp_path.display(),
                state.path.display()
            )
        })?;
        Ok(())
    }

    fn abort(&mut self) -> Result<()> {
        let Some(state) = self.state.take() else {
            return Ok(());
        };
        drop(state.encoder);
        match fs::remove_file(&state.tmp_path) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(err) => {
                Err(err).with_context(|| format!("remove {}", state.tmp_path.display()))
            }
        }
    }
}

/// Rate a GIF player shows for `fps`: the encoder stores delays as whole
/// centiseconds, truncated.
fn played_fps(fps: f64) -> f64 {
    let centis = ((1000.0 / fps).floor() / 10.0).floor().max(1.0);
    100.0 / centis
}
