use anyhow::Result;
use image::RgbImage;
use std::path::Path;

use crate::{pipeline_error, ErrorKind};

/// Single still image: yields exactly one frame, then end of stream.
pub(crate) struct StillSource {
    image: Option<RgbImage>,
}

impl StillSource {
    pub(crate) fn open(path: &Path) -> Result<Self> {
        let image = image::open(path).map_err(|e| {
            pipeline_error(
                ErrorKind::Source,
                format!("could not read image {}: {}", path.display(), e),
            )
        })?;
        Ok(Self {
            image: Some(image.to_rgb8()),
        })
    }

    pub(crate) fn next_image(&mut self) -> Option<RgbImage> {
        self.image.take()
    }
}
