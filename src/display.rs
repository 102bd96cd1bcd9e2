//! Live display surface and cooperative stop signal.
//!
//! Live mode renders every frame to a `DisplaySurface` until the source ends,
//! a read fails, or the `StopSignal` is raised (Ctrl-C in the CLI).

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::frame::RenderedFrame;
use crate::persist::{encode_canvas, write_atomic, FrameFormat};
use crate::{pipeline_error, ErrorKind};

/// Where live frames are shown.
pub trait DisplaySurface {
    fn present(&mut self, frame: &RenderedFrame) -> Result<()>;

    fn close(&mut self) -> Result<()> {
        Ok(())
    }
}

/// Overwrites one image file with the latest canvas.
///
/// Any image viewer that reloads on change turns this into a live window.
pub struct PreviewFileSurface {
    path: PathBuf,
    format: FrameFormat,
    presented: u64,
}

impl PreviewFileSurface {
    pub fn new(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let format = FrameFormat::from_path(&path)?;
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| {
                pipeline_error(
                    ErrorKind::Configuration,
                    format!("failed to create {}: {}", parent.display(), e),
                )
            })?;
        }
        log::info!("Display: previewing to {}", path.display());
        Ok(Self {
            path,
            format,
            presented: 0,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn presented(&self) -> u64 {
        self.presented
    }
}

impl DisplaySurface for PreviewFileSurface {
    fn present(&mut self, frame: &RenderedFrame) -> Result<()> {
        let bytes = encode_canvas(&frame.canvas, self.format, 85)?;
        write_atomic(&self.path, &bytes)
            .with_context(|| format!("update preview {}", self.path.display()))?;
        self.presented += 1;
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        log::info!(
            "Display: closed {} after {} frames",
            self.path.display(),
            self.presented
        );
        Ok(())
    }
}

/// Shared cancellation flag, checked once per live-loop iteration.
#[derive(Clone, Debug, Default)]
pub struct StopSignal {
    raised: Arc<AtomicBool>,
}

impl StopSignal {
    pub fn new() -> Self {
        Self::default()
    }

    /// Raise the signal on Ctrl-C. Only one handler may be installed per process.
    pub fn install_ctrlc(&self) -> Result<()> {
        let raised = Arc::clone(&self.raised);
        ctrlc::set_handler(move || {
            raised.store(true, Ordering::SeqCst);
        })
        .context("install Ctrl-C handler")?;
        Ok(())
    }

    pub fn raise(&self) {
        self.raised.store(true, Ordering::SeqCst);
    }

    pub fn is_raised(&self) -> bool {
        self.raised.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};

    #[test]
    fn preview_holds_the_latest_frame() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let mut surface = PreviewFileSurface::new(dir.path().join("live").join("preview.png"))?;
        for shade in [10u8, 200] {
            surface.present(&RenderedFrame {
                canvas: RgbImage::from_pixel(4, 4, Rgb([shade; 3])),
                source_index: 0,
                pose_count: 0,
            })?;
        }
        surface.close()?;

        assert_eq!(surface.presented(), 2);
        let shown = image::open(surface.path())?.to_rgb8();
        assert_eq!(shown.get_pixel(0, 0).0, [200, 200, 200]);
        Ok(())
    }

    #[test]
    fn stop_signal_is_shared_between_clones() {
        let signal = StopSignal::new();
        let observer = signal.clone();
        assert!(!observer.is_raised());
        signal.raise();
        assert!(observer.is_raised());
    }
}
