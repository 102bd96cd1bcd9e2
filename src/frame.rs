//! Frames and rendered canvases.
//!
//! - `Frame`: a decoded RGB8 raster plus its capture-order position. Sources
//!   produce frames; the processor consumes them and never mutates the pixels.
//! - `RenderedFrame`: the blank canvas with all poses drawn on it. This is what
//!   gets persisted or displayed, never the source pixels.

use image::{Rgb, RgbImage};

/// Pixel layout of every frame handed out by an ingest backend.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PixelFormat {
    Rgb8,
}

/// A decoded frame in capture order.
///
/// Not `Clone`: a frame is owned by exactly one stage at a time.
#[derive(Debug)]
pub struct Frame {
    image: RgbImage,
    /// Zero-based position in the source's read order (before rate governing).
    index: u64,
}

impl Frame {
    pub fn new(image: RgbImage, index: u64) -> Self {
        Self { image, index }
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    pub fn index(&self) -> u64 {
        self.index
    }

    pub fn pixel_format(&self) -> PixelFormat {
        PixelFormat::Rgb8
    }

    pub fn image(&self) -> &RgbImage {
        &self.image
    }

    pub fn into_image(self) -> RgbImage {
        self.image
    }
}

/// Canvas with the rendered poses of one source frame.
#[derive(Debug)]
pub struct RenderedFrame {
    pub canvas: RgbImage,
    /// Index of the source frame this canvas was rendered from.
    pub source_index: u64,
    /// Number of poses drawn (after tracking).
    pub pose_count: usize,
}

impl RenderedFrame {
    pub fn width(&self) -> u32 {
        self.canvas.width()
    }

    pub fn height(&self) -> u32 {
        self.canvas.height()
    }
}

/// Allocate a canvas matching the frame's dimensions and pixel format, filled
/// with a uniform background.
pub fn blank_canvas(frame: &Frame, background: [u8; 3]) -> RgbImage {
    match frame.pixel_format() {
        PixelFormat::Rgb8 => RgbImage::from_pixel(frame.width(), frame.height(), Rgb(background)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_canvas_matches_frame_and_ignores_source_pixels() {
        let source = RgbImage::from_pixel(7, 5, Rgb([10, 20, 30]));
        let frame = Frame::new(source, 42);

        let canvas = blank_canvas(&frame, [255, 255, 255]);

        assert_eq!(canvas.dimensions(), (7, 5));
        assert!(canvas.pixels().all(|p| p.0 == [255, 255, 255]));
        // Source frame is untouched.
        assert_eq!(frame.image().get_pixel(3, 3).0, [10, 20, 30]);
        assert_eq!(frame.index(), 42);
    }
}
