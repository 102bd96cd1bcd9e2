//! Synthetic capture device (`stub://`).
//!
//! Behaves like a live device with a fixed nominal rate. Query parameters
//! shape the stream:
//! - `fps` (default 30): reported native rate
//! - `frames` (default unbounded): frames before end of stream
//! - `width` / `height` (default 64x48)
//! - `fail_at`: read index that fails with `ErrorKind::Read`

use anyhow::Result;
use image::RgbImage;

use super::normalize::{normalize_to_rgb, PixelFormat};
use crate::{pipeline_error, ErrorKind};

const DEFAULT_FPS: f64 = 30.0;
const DEFAULT_WIDTH: u32 = 64;
const DEFAULT_HEIGHT: u32 = 48;

#[derive(Clone, Debug, PartialEq)]
pub struct SyntheticConfig {
    pub name: String,
    pub fps: f64,
    pub frames: Option<u64>,
    pub width: u32,
    pub height: u32,
    pub fail_at: Option<u64>,
}

impl Default for SyntheticConfig {
    fn default() -> Self {
        Self {
            name: "synthetic".to_string(),
            fps: DEFAULT_FPS,
            frames: None,
            width: DEFAULT_WIDTH,
            height: DEFAULT_HEIGHT,
            fail_at: None,
        }
    }
}

impl SyntheticConfig {
    /// Parse `stub://name?key=value&...`.
    pub fn from_locator(locator: &str) -> Result<Self> {
        let rest = locator.strip_prefix("stub://").ok_or_else(|| {
            pipeline_error(
                ErrorKind::Configuration,
                format!("'{}' is not a stub:// locator", locator),
            )
        })?;
        let (name, query) = rest.split_once('?').unwrap_or((rest, ""));

        let mut cfg = SyntheticConfig {
            name: if name.is_empty() {
                "synthetic".to_string()
            } else {
                name.to_string()
            },
            ..SyntheticConfig::default()
        };

        for pair in query.split('&').filter(|p| !p.is_empty()) {
            let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
            let bad = || {
                pipeline_error(
                    ErrorKind::Configuration,
                    format!("invalid value '{}' for '{}' in {}", value, key, locator),
                )
            };
            match key {
                "fps" => cfg.fps = value.parse().map_err(|_| bad())?,
                "frames" => cfg.frames = Some(value.parse().map_err(|_| bad())?),
                "width" => cfg.width = value.parse().map_err(|_| bad())?,
                "height" => cfg.height = value.parse().map_err(|_| bad())?,
                "fail_at" => cfg.fail_at = Some(value.parse().map_err(|_| bad())?),
                _ => {
                    return Err(pipeline_error(
                        ErrorKind::Configuration,
                        format!("unknown parameter '{}' in {}", key, locator),
                    ))
                }
            }
        }

        if cfg.width == 0 || cfg.height == 0 {
            return Err(pipeline_error(
                ErrorKind::Configuration,
                format!("synthetic frame size must be non-zero in {}", locator),
            ));
        }
        Ok(cfg)
    }
}

pub(crate) struct SyntheticSource {
    config: SyntheticConfig,
    frame_count: u64,
}

impl SyntheticSource {
    pub(crate) fn new(config: SyntheticConfig) -> Self {
        log::info!("FrameSource: connected to stub://{} (synthetic)", config.name);
        Self {
            config,
            frame_count: 0,
        }
    }

    pub(crate) fn fps(&self) -> f64 {
        self.config.fps
    }

    pub(crate) fn next_image(&mut self) -> Result<Option<RgbImage>> {
        if self
            .config
            .frames
            .is_some_and(|limit| self.frame_count >= limit)
        {
            return Ok(None);
        }
        if self.config.fail_at == Some(self.frame_count) {
            return Err(pipeline_error(
                ErrorKind::Read,
                format!(
                    "stub://{} failed to deliver frame {}",
                    self.config.name, self.frame_count
                ),
            ));
        }

        let pixels = self.generate_synthetic_pixels();
        let image = normalize_to_rgb(
            &pixels,
            self.config.width,
            self.config.height,
            PixelFormat::Rgb24,
        )?;
        self.frame_count += 1;
        Ok(Some(image))
    }

    /// Moving gradient, so consecutive frames differ.
    fn generate_synthetic_pixels(&self) -> Vec<u8> {
        let pixel_count = (self.config.width * self.config.height * 3) as usize;
        let mut pixels = vec![0u8; pixel_count];
        for (i, pixel) in pixels.iter_mut().enumerate() {
            *pixel = ((i as u64 + self.frame_count * 7) % 256) as u8;
        }
        pixels
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error_kind;

    #[test]
    fn parses_query_parameters() -> Result<()> {
        let cfg = SyntheticConfig::from_locator("stub://front?fps=64&frames=128&width=32&height=24")?;
        assert_eq!(cfg.name, "front");
        assert_eq!(cfg.fps, 64.0);
        assert_eq!(cfg.frames, Some(128));
        assert_eq!((cfg.width, cfg.height), (32, 24));
        assert_eq!(cfg.fail_at, None);
        Ok(())
    }

    #[test]
    fn rejects_unknown_parameters() {
        let err = SyntheticConfig::from_locator("stub://cam?zoom=2").unwrap_err();
        assert_eq!(error_kind(&err), Some(ErrorKind::Configuration));
    }

    #[test]
    fn stops_after_frame_limit_and_fails_on_request() -> Result<()> {
        let mut source = SyntheticSource::new(SyntheticConfig::from_locator(
            "stub://cam?frames=5&fail_at=2",
        )?);
        assert!(source.next_image()?.is_some());
        assert!(source.next_image()?.is_some());
        let err = source.next_image().unwrap_err();
        assert_eq!(error_kind(&err), Some(ErrorKind::Read));

        let mut bounded = SyntheticSource::new(SyntheticConfig::from_locator("stub://cam?frames=1")?);
        assert!(bounded.next_image()?.is_some());
        assert!(bounded.next_image()?.is_none());
        Ok(())
    }
}
