//! V4L2 capture device source.
//!
//! Opens a local device node (e.g. /dev/video0), requests RGB3 and falls back
//! to whatever the driver negotiates (YUYV, NV12) through `normalize_to_rgb`.
//! The native rate is read from the device's frame interval at open time.

use anyhow::{Context, Result};
use image::RgbImage;
use ouroboros::self_referencing;

use super::normalize::{normalize_to_rgb, PixelFormat};
use crate::{pipeline_error, ErrorKind};

pub(crate) struct V4l2Source {
    device_path: String,
    state: Option<DeviceState>,
    pixel_format: PixelFormat,
    width: u32,
    height: u32,
    fps: Option<f64>,
}

#[self_referencing]
struct DeviceState {
    device: v4l::Device,
    #[borrows(mut device)]
    #[covariant]
    stream: v4l::prelude::MmapStream<'this, v4l::Device>,
}

impl V4l2Source {
    pub(crate) fn open(device_path: &str) -> Result<Self> {
        Self::connect(device_path).map_err(|err| {
            pipeline_error(
                ErrorKind::Source,
                format!("could not open capture device {}: {:#}", device_path, err),
            )
        })
    }

    fn connect(device_path: &str) -> Result<Self> {
        use v4l::buffer::Type;
        use v4l::video::Capture;

        let device = v4l::Device::with_path(device_path)
            .with_context(|| format!("open v4l2 device {}", device_path))?;
        let mut format = device.format().context("read v4l2 format")?;
        format.fourcc = v4l::FourCC::new(b"RGB3");

        let format = match device.set_format(&format) {
            Ok(format) => format,
            Err(err) => {
                log::warn!(
                    "FrameSource: failed to request RGB3 on {}: {}",
                    device_path,
                    err
                );
                device
                    .format()
                    .context("read v4l2 format after set failure")?
            }
        };

        let pixel_format = match &format.fourcc.repr {
            b"RGB3" => PixelFormat::Rgb24,
            b"YUYV" => PixelFormat::Yuyv,
            b"NV12" => PixelFormat::Nv12,
            other => anyhow::bail!(
                "unsupported pixel format {}",
                String::from_utf8_lossy(other)
            ),
        };

        let fps = device
            .params()
            .ok()
            .map(|params| params.interval)
            .filter(|interval| interval.numerator > 0)
            .map(|interval| interval.denominator as f64 / interval.numerator as f64);

        let state = DeviceStateBuilder {
            device,
            stream_builder: |device| {
                v4l::prelude::MmapStream::with_buffers(device, Type::VideoCapture, 4)
                    .map_err(|err| anyhow::Error::new(err).context("create v4l2 buffer stream"))
            },
        }
        .try_build()?;

        log::info!(
            "FrameSource: connected to {} ({}x{}, {:?})",
            device_path,
            format.width,
            format.height,
            pixel_format
        );
        Ok(Self {
            device_path: device_path.to_string(),
            state: Some(state),
            pixel_format,
            width: format.width,
            height: format.height,
            fps,
        })
    }

    pub(crate) fn fps(&self) -> Option<f64> {
        self.fps
    }

    pub(crate) fn next_image(&mut self) -> Result<Option<RgbImage>> {
        use v4l::io::traits::CaptureStream;

        let Some(state) = self.state.as_mut() else {
            return Ok(None);
        };
        let device_path = &self.device_path;
        let (pixels, used) = state
            .with_mut(|fields| {
                fields
                    .stream
                    .next()
                    .map(|(buf, meta)| (buf.to_vec(), meta.bytesused as usize))
            })
            .map_err(|err| {
                pipeline_error(
                    ErrorKind::Read,
                    format!("capture from {} failed: {}", device_path, err),
                )
            })?;

        let payload = if used > 0 && used <= pixels.len() {
            &pixels[..used]
        } else {
            &pixels[..]
        };
        let image = normalize_to_rgb(payload, self.width, self.height, self.pixel_format)
            .map_err(|err| pipeline_error(ErrorKind::Read, format!("{:#}", err)))?;
        Ok(Some(image))
    }

    /// Stop streaming and close the device node.
    pub(crate) fn release(&mut self) {
        self.state = None;
    }
}
