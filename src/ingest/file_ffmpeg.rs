//! Local video file source using FFmpeg.
//!
//! Decodes the best video stream frame by frame and converts every frame to
//! RGB24. The native rate is the stream's average frame rate.

use anyhow::{Context, Result};
use ffmpeg_next as ffmpeg;
use image::RgbImage;
use std::path::Path;

use super::normalize::{normalize_to_rgb, PixelFormat};
use crate::{pipeline_error, ErrorKind};

pub(crate) struct FfmpegFileSource {
    state: Option<DecodeState>,
    fps: Option<f64>,
}

struct DecodeState {
    input: ffmpeg::format::context::Input,
    stream_index: usize,
    decoder: ffmpeg::codec::decoder::Video,
    scaler: ffmpeg::software::scaling::Context,
    eof_sent: bool,
}

impl FfmpegFileSource {
    pub(crate) fn open(path: &Path) -> Result<Self> {
        Self::connect(path).map_err(|err| {
            pipeline_error(
                ErrorKind::Source,
                format!("could not open video {}: {:#}", path.display(), err),
            )
        })
    }

    fn connect(path: &Path) -> Result<Self> {
        ffmpeg::init().context("initialize ffmpeg")?;
        let input = ffmpeg::format::input(&path)
            .with_context(|| format!("failed to open '{}' with ffmpeg", path.display()))?;
        let input_stream = input
            .streams()
            .best(ffmpeg::media::Type::Video)
            .ok_or_else(|| anyhow::anyhow!("file has no video track"))?;
        let stream_index = input_stream.index();
        let rate = input_stream.avg_frame_rate();
        let fps = (rate.denominator() != 0)
            .then(|| rate.numerator() as f64 / rate.denominator() as f64);
        let context = ffmpeg::codec::context::Context::from_parameters(input_stream.parameters())
            .context("load video decoder parameters")?;
        let decoder = context
            .decoder()
            .video()
            .context("open ffmpeg video decoder")?;

        let scaler = ffmpeg::software::scaling::context::Context::get(
            decoder.format(),
            decoder.width(),
            decoder.height(),
            ffmpeg::util::format::pixel::Pixel::RGB24,
            decoder.width(),
            decoder.height(),
            ffmpeg::software::scaling::flag::Flags::BILINEAR,
        )
        .context("create ffmpeg scaler")?;

        log::info!(
            "FrameSource: decoding {} ({}x{}, ffmpeg)",
            path.display(),
            decoder.width(),
            decoder.height()
        );
        Ok(Self {
            state: Some(DecodeState {
                input,
                stream_index,
                decoder,
                scaler,
                eof_sent: false,
            }),
            fps,
        })
    }

    pub(crate) fn fps(&self) -> Option<f64> {
        self.fps
    }

    pub(crate) fn next_image(&mut self) -> Result<Option<RgbImage>> {
        let Some(state) = self.state.as_mut() else {
            return Ok(None);
        };
        state
            .next_image()
            .map_err(|err| pipeline_error(ErrorKind::Read, format!("{:#}", err)))
    }

    pub(crate) fn release(&mut self) {
        self.state = None;
    }
}

impl DecodeState {
    fn next_image(&mut self) -> Result<Option<RgbImage>> {
        let mut decoded = ffmpeg::frame::Video::empty();
        loop {
            // Frames already buffered in the decoder come first.
            if self.decoder.receive_frame(&mut decoded).is_ok() {
                return self.convert(&decoded).map(Some);
            }
            if self.eof_sent {
                return Ok(None);
            }

            match self.input.packets().next() {
                Some((stream, packet)) => {
                    if stream.index() != self.stream_index {
                        continue;
                    }
                    self.decoder
                        .send_packet(&packet)
                        .context("send packet to ffmpeg decoder")?;
                }
                None => {
                    self.decoder.send_eof().context("flush ffmpeg decoder")?;
                    self.eof_sent = true;
                }
            }
        }
    }

    fn convert(&mut self, decoded: &ffmpeg::frame::Video) -> Result<RgbImage> {
        let mut rgb_frame = ffmpeg::frame::Video::empty();
        self.scaler
            .run(decoded, &mut rgb_frame)
            .context("scale frame to RGB")?;
        let (pixels, width, height) = frame_to_pixels(&rgb_frame)?;
        normalize_to_rgb(&pixels, width, height, PixelFormat::Rgb24)
    }
}

fn frame_to_pixels(frame: &ffmpeg::frame::Video) -> Result<(Vec<u8>, u32, u32)> {
    let width = frame.width();
    let height = frame.height();
    let row_bytes = (width as usize) * 3;
    let stride = frame.stride(0);
    let data = frame.data(0);

    if stride == row_bytes {
        let plane = data
            .get(..row_bytes * height as usize)
            .context("ffmpeg frame is shorter than its dimensions")?;
        return Ok((plane.to_vec(), width, height));
    }

    let mut pixels = Vec::with_capacity(row_bytes * height as usize);
    for row in 0..height as usize {
        let start = row * stride;
        let end = start + row_bytes;
        pixels.extend_from_slice(
            data.get(start..end)
                .context("ffmpeg frame row is out of bounds")?,
        );
    }

    Ok((pixels, width, height))
}
