//! MPEG-4 Part 2 in AVI, encoded with FFmpeg.

use anyhow::{anyhow, Context, Result};
use ffmpeg_next as ffmpeg;
use image::RgbImage;
use std::fs;
use std::path::{Path, PathBuf};

use super::{OutputVideoParameters, VideoWriter};

#[derive(Default)]
pub struct FfmpegWriter {
    state: Option<EncodeState>,
}

struct EncodeState {
    output: ffmpeg::format::context::Output,
    encoder: ffmpeg::codec::encoder::video::Encoder,
    scaler: ffmpeg::software::scaling::Context,
    stream_index: usize,
    encoder_time_base: ffmpeg::Rational,
    stream_time_base: ffmpeg::Rational,
    next_pts: i64,
    width: u32,
    height: u32,
    tmp_path: PathBuf,
    path: PathBuf,
}

impl FfmpegWriter {
    pub fn new() -> Self {
        Self::default()
    }
}

impl VideoWriter for FfmpegWriter {
    fn open(&mut self, path: &Path, params: &OutputVideoParameters) -> Result<()> {
        use ffmpeg::util::format::pixel::Pixel;

        if self.state.is_some() {
            return Err(anyhow!("ffmpeg writer is already open"));
        }
        ffmpeg::init().context("initialize ffmpeg")?;

        let mut tmp_name = path
            .file_name()
            .map(|name| name.to_os_string())
            .context("artifact path has no file name")?;
        tmp_name.push(".part");
        let tmp_path = path.with_file_name(tmp_name);

        let mut output = ffmpeg::format::output_as(&tmp_path, "avi")
            .with_context(|| format!("open {} for avi output", tmp_path.display()))?;
        let codec = ffmpeg::encoder::find(ffmpeg::codec::Id::MPEG4)
            .context("ffmpeg was built without an mpeg4 encoder")?;
        let global_header = output
            .format()
            .flags()
            .contains(ffmpeg::format::Flags::GLOBAL_HEADER);

        let rate = params.fps.round().max(1.0) as i32;
        let encoder_time_base = ffmpeg::Rational::new(1, rate);

        let mut stream = output.add_stream(codec).context("add video stream")?;
        let stream_index = stream.index();
        let mut encoder = ffmpeg::codec::context::Context::new_with_codec(codec)
            .encoder()
            .video()
            .context("create mpeg4 encoder")?;
        encoder.set_width(params.width);
        encoder.set_height(params.height);
        encoder.set_format(Pixel::YUV420P);
        encoder.set_time_base(encoder_time_base);
        encoder.set_frame_rate(Some(ffmpeg::Rational::new(rate, 1)));
        encoder.set_bit_rate(4_000_000);
        if global_header {
            encoder.set_flags(ffmpeg::codec::Flags::GLOBAL_HEADER);
        }
        let encoder = encoder.open_as(codec).context("open mpeg4 encoder")?;
        stream.set_parameters(&encoder);

        output.write_header().context("write avi header")?;
        let stream_time_base = output
            .stream(stream_index)
            .map(|stream| stream.time_base())
            .context("output stream disappeared")?;

        let scaler = ffmpeg::software::scaling::Context::get(
            Pixel::RGB24,
            params.width,
            params.height,
            Pixel::YUV420P,
            params.width,
            params.height,
            ffmpeg::software::scaling::flag::Flags::BILINEAR,
        )
        .context("create ffmpeg scaler")?;

        self.state = Some(EncodeState {
            output,
            encoder,
            scaler,
            stream_index,
            encoder_time_base,
            stream_time_base,
            next_pts: 0,
            width: params.width,
            height: params.height,
            tmp_path,
            path: path.to_path_buf(),
        });
        Ok(())
    }

    fn write(&mut self, frame: &RgbImage) -> Result<()> {
        let state = self.state.as_mut().context("ffmpeg writer is not open")?;
        if frame.dimensions() != (state.width, state.height) {
            return Err(anyhow!(
                "frame is {}x{}, writer expects {}x{}",
                frame.width(),
                frame.height(),
                state.width,
                state.height
            ));
        }

        let mut rgb = ffmpeg::frame::Video::new(
            ffmpeg::util::format::pixel::Pixel::RGB24,
            state.width,
            state.height,
        );
        let row_bytes = state.width as usize * 3;
        let stride = rgb.stride(0);
        let plane = rgb.data_mut(0);
        for (row, src) in frame.as_raw().chunks_exact(row_bytes).enumerate() {
            let start = row * stride;
            plane
                .get_mut(start..start + row_bytes)
                .context("ffmpeg frame row is out of bounds")?
                .copy_from_slice(src);
        }

        let mut yuv = ffmpeg::frame::Video::empty();
        state.scaler.run(&rgb, &mut yuv).context("scale frame to YUV")?;
        yuv.set_pts(Some(state.next_pts));
        state.next_pts += 1;

        state
            .encoder
            .send_frame(&yuv)
            .context("send frame to mpeg4 encoder")?;
        state.drain()
    }

    fn close(&mut self) -> Result<()> {
        let Some(mut state) = self.state.take() else {
            return Ok(());
        };
        if let Err(err) = state.finish() {
            let tmp_path = state.tmp_path.clone();
            drop(state);
            remove_partial(&tmp_path)?;
            return Err(err);
        }
        let EncodeState { tmp_path, path, .. } = state;
        fs::rename(&tmp_path, &path)
            .with_context(|| format!("rename {} to {}", tmp_path.display(), path.display()))?;
        Ok(())
    }

    fn abort(&mut self) -> Result<()> {
        let Some(state) = self.state.take() else {
            return Ok(());
        };
        let tmp_path = state.tmp_path.clone();
        // Dropping the contexts closes the output file.
        drop(state);
        remove_partial(&tmp_path)
    }
}

fn remove_partial(tmp_path: &Path) -> Result<()> {
    match fs::remove_file(tmp_path) {
        Ok(()) => Ok(()),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(err) => Err(err).with_context(|| format!("remove {}", tmp_path.display())),
    }
}

impl EncodeState {
    fn finish(&mut self) -> Result<()> {
        self.encoder.send_eof().context("flush mpeg4 encoder")?;
        self.drain()?;
        self.output.write_trailer().context("write avi trailer")?;
        Ok(())
    }

    fn drain(&mut self) -> Result<()> {
        let mut packet = ffmpeg::Packet::empty();
        while self.encoder.receive_packet(&mut packet).is_ok() {
            packet.set_stream(self.stream_index);
            packet.rescale_ts(self.encoder_time_base, self.stream_time_base);
            packet
                .write_interleaved(&mut self.output)
                .context("write avi packet")?;
        }
        Ok(())
    }
}
