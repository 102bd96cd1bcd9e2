//! Sequenced persistence of rendered frames.
//!
//! Every kept, successfully processed frame is written to
//! `<dir>/frame_<index>.<ext>` where `index` is zero-padded to six digits, so
//! lexicographic order of the filenames equals capture order. The cursor only
//! advances after a successful write; a failed write stops the run instead of
//! leaving a gap. A store refuses a directory that already holds a frame
//! sequence, so the directory only ever contains one run's frames.

use anyhow::{Context, Result};
use image::codecs::jpeg::JpegEncoder;
use image::{ImageFormat, RgbImage};
use std::fs::{self, File};
use std::io::{Cursor, Write};
use std::path::{Path, PathBuf};

use crate::frame::RenderedFrame;
use crate::{pipeline_error, ErrorKind};

pub const FRAME_PREFIX: &str = "frame";
pub const INDEX_WIDTH: usize = 6;
/// Largest index that fits the fixed-width padding.
pub const MAX_INDEX: u64 = 999_999;

/// Filename for a persisted frame, e.g. `frame_000042.jpg`.
///
/// Indices beyond `MAX_INDEX` are an `ErrorKind::Capacity` error rather than a
/// wider (and mis-sorting) name.
pub fn frame_file_name(index: u64, extension: &str) -> Result<String> {
    if index > MAX_INDEX {
        return Err(pipeline_error(
            ErrorKind::Capacity,
            format!(
                "frame index {} exceeds the {}-digit sequence capacity ({})",
                index, INDEX_WIDTH, MAX_INDEX
            ),
        ));
    }
    Ok(format!(
        "{}_{:0width$}.{}",
        FRAME_PREFIX,
        index,
        extension,
        width = INDEX_WIDTH
    ))
}

/// Parse the index out of a `frame_<digits>.<ext>` filename.
pub fn parse_frame_index(file_name: &str) -> Option<u64> {
    let rest = file_name.strip_prefix(FRAME_PREFIX)?.strip_prefix('_')?;
    let (digits, ext) = rest.split_once('.')?;
    if digits.is_empty()
        || !digits.bytes().all(|b| b.is_ascii_digit())
        || ext.is_empty()
        || !ext.bytes().all(|b| b.is_ascii_alphanumeric())
    {
        return None;
    }
    digits.parse().ok()
}

/// List persisted frames in sequence order.
///
/// Only `frame_<digits>.<ext>` files are returned; anything else in the
/// directory (temporary `.part` files, stray artifacts) is skipped with a
/// warning.
pub fn list_persisted_frames(dir: &Path) -> Result<Vec<PathBuf>> {
    let entries =
        fs::read_dir(dir).with_context(|| format!("failed to list {}", dir.display()))?;

    let mut frames: Vec<(u64, PathBuf)> = Vec::new();
    for entry in entries {
        let entry = entry.with_context(|| format!("failed to list {}", dir.display()))?;
        let path = entry.path();
        if !path.is_file() {
            continue;
        }
        let name = entry.file_name();
        match name.to_str().and_then(parse_frame_index) {
            Some(index) => frames.push((index, path)),
            None => log::warn!(
                "FrameStore: ignoring {} (not a persisted frame)",
                path.display()
            ),
        }
    }
    frames.sort();
    Ok(frames.into_iter().map(|(_, path)| path).collect())
}

/// Image encoding for persisted frames.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FrameFormat {
    Jpg,
    Png,
}

impl FrameFormat {
    pub fn parse(value: &str) -> Result<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "jpg" | "jpeg" => Ok(FrameFormat::Jpg),
            "png" => Ok(FrameFormat::Png),
            other => Err(pipeline_error(
                ErrorKind::Configuration,
                format!("unsupported frame format '{}' (expected jpg or png)", other),
            )),
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            FrameFormat::Jpg => "jpg",
            FrameFormat::Png => "png",
        }
    }

    /// Format implied by a file extension, e.g. for the still-image output.
    pub fn from_path(path: &Path) -> Result<Self> {
        let ext = path
            .extension()
            .and_then(|ext| ext.to_str())
            .unwrap_or_default();
        Self::parse(ext)
    }
}

/// Contiguous zero-based index of persisted frames.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SequenceCursor {
    next: u64,
}

impl SequenceCursor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Index the next persisted frame will get.
    pub fn value(&self) -> u64 {
        self.next
    }

    fn advance(&mut self) {
        self.next += 1;
    }
}

/// Writes rendered frames under a sequence cursor.
pub struct FrameStore {
    dir: PathBuf,
    format: FrameFormat,
    jpeg_quality: u8,
    cursor: SequenceCursor,
    dir_ready: bool,
}

impl FrameStore {
    /// The directory is created on first write, not here.
    pub fn new(dir: impl Into<PathBuf>, format: FrameFormat, jpeg_quality: u8) -> Self {
        Self {
            dir: dir.into(),
            format,
            jpeg_quality,
            cursor: SequenceCursor::new(),
            dir_ready: false,
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn format(&self) -> FrameFormat {
        self.format
    }

    pub fn cursor(&self) -> SequenceCursor {
        self.cursor
    }

    /// Number of frames written so far.
    pub fn persisted(&self) -> u64 {
        self.cursor.value()
    }

    pub fn persist(&mut self, frame: &RenderedFrame) -> Result<PathBuf> {
        let name = frame_file_name(self.cursor.value(), self.format.extension())?;
        self.prepare()?;

        let path = self.dir.join(&name);
        encode_canvas(&frame.canvas, self.format, self.jpeg_quality)
            .and_then(|bytes| write_atomic(&path, &bytes))
            .map_err(|err| {
                pipeline_error(
                    ErrorKind::Persistence,
                    format!("failed to write {}: {:#}", path.display(), err),
                )
            })?;

        log::debug!(
            "FrameStore: wrote {} (source frame {}, {} poses)",
            name,
            frame.source_index,
            frame.pose_count
        );
        self.cursor.advance();
        Ok(path)
    }

    /// Create the directory and check it holds no earlier sequence. Runs once,
    /// on the first `persist` at the latest.
    pub fn prepare(&mut self) -> Result<()> {
        if self.dir_ready {
            return Ok(());
        }
        fs::create_dir_all(&self.dir).map_err(|e| {
            pipeline_error(
                ErrorKind::Persistence,
                format!("failed to create {}: {}", self.dir.display(), e),
            )
        })?;
        let existing = list_persisted_frames(&self.dir).map_err(|e| {
            pipeline_error(ErrorKind::Persistence, format!("{:#}", e))
        })?;
        if let Some(first) = existing.first() {
            return Err(pipeline_error(
                ErrorKind::Persistence,
                format!(
                    "{} already holds {} persisted frames (first {}), refusing to mix runs",
                    self.dir.display(),
                    existing.len(),
                    first.display()
                ),
            ));
        }
        self.dir_ready = true;
        Ok(())
    }
}

/// Encode a canvas in memory.
pub(crate) fn encode_canvas(
    canvas: &RgbImage,
    format: FrameFormat,
    jpeg_quality: u8,
) -> Result<Vec<u8>> {
    let mut bytes = Vec::new();
    match format {
        FrameFormat::Jpg => {
            JpegEncoder::new_with_quality(&mut bytes, jpeg_quality)
                .encode_image(canvas)
                .context("encode jpeg")?;
        }
        FrameFormat::Png => {
            canvas
                .write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)
                .context("encode png")?;
        }
    }
    Ok(bytes)
}

/// Write via a sibling `.part` file and rename, so readers never see a
/// truncated file under the final name.
pub(crate) fn write_atomic(path: &Path, data: &[u8]) -> Result<()> {
    let mut tmp_name = path
        .file_name()
        .map(|name| name.to_os_string())
        .context("target path has no file name")?;
    tmp_name.push(".part");
    let tmp_path = path.with_file_name(tmp_name);
    {
        let mut file = File::create(&tmp_path)
            .with_context(|| format!("create {}", tmp_path.display()))?;
        file.write_all(data)?;
        file.sync_all()?;
    }
    fs::rename(&tmp_path, path)
        .with_context(|| format!("rename {} to {}", tmp_path.display(), path.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error_kind;
    use image::Rgb;

    fn rendered(index: u64) -> RenderedFrame {
        RenderedFrame {
            canvas: RgbImage::from_pixel(8, 6, Rgb([255, 255, 255])),
            source_index: index,
            pose_count: 0,
        }
    }

    #[test]
    fn file_names_sort_in_numeric_order() -> Result<()> {
        let indices: Vec<u64> = (0..1_200)
            .chain([9_999, 10_000, 99_999, 100_000, MAX_INDEX])
            .collect();
        let mut names = indices
            .iter()
            .map(|i| frame_file_name(*i, "jpg"))
            .collect::<Result<Vec<_>>>()?;
        names.sort();
        let parsed: Vec<u64> = names.iter().filter_map(|n| parse_frame_index(n)).collect();
        assert_eq!(parsed, indices);
        assert_eq!(frame_file_name(0, "jpg")?, "frame_000000.jpg");
        assert_eq!(frame_file_name(63, "jpg")?, "frame_000063.jpg");
        Ok(())
    }

    #[test]
    fn index_overflow_is_a_capacity_error() {
        let err = frame_file_name(MAX_INDEX + 1, "jpg").unwrap_err();
        assert_eq!(error_kind(&err), Some(ErrorKind::Capacity));
    }

    #[test]
    fn only_sequence_files_are_listed() -> Result<()> {
        let dir = tempfile::tempdir()?;
        for name in [
            "frame_000002.jpg",
            "frame_000000.jpg",
            "frame_000001.jpg",
            "frame_000003.jpg.part",
            "notes.txt",
            "frame_x.jpg",
        ] {
            fs::write(dir.path().join(name), b"x")?;
        }

        let listed: Vec<String> = list_persisted_frames(dir.path())?
            .iter()
            .filter_map(|p| p.file_name().and_then(|n| n.to_str()).map(String::from))
            .collect();
        assert_eq!(
            listed,
            vec!["frame_000000.jpg", "frame_000001.jpg", "frame_000002.jpg"]
        );
        Ok(())
    }

    #[test]
    fn store_creates_directory_and_writes_contiguously() -> Result<()> {
        let root = tempfile::tempdir()?;
        let dir = root.path().join("nested").join("frames");
        let mut store = FrameStore::new(&dir, FrameFormat::Png, 90);
        assert!(!dir.exists());

        for i in 0..3 {
            store.persist(&rendered(i * 2))?;
        }
        assert_eq!(store.persisted(), 3);

        let listed = list_persisted_frames(&dir)?;
        assert_eq!(listed.len(), 3);
        assert_eq!(listed[2], dir.join("frame_000002.png"));
        let decoded = image::open(&listed[0])?.to_rgb8();
        assert_eq!(decoded.dimensions(), (8, 6));
        assert!(!dir.join("frame_000000.png.part").exists());
        Ok(())
    }

    #[test]
    fn jpeg_frames_decode() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let mut store = FrameStore::new(dir.path(), FrameFormat::Jpg, 90);
        let path = store.persist(&rendered(0))?;
        assert_eq!(path, dir.path().join("frame_000000.jpg"));
        assert_eq!(image::open(&path)?.to_rgb8().dimensions(), (8, 6));
        Ok(())
    }

    #[test]
    fn failed_write_does_not_advance_the_cursor() -> Result<()> {
        let root = tempfile::tempdir()?;
        let blocker = root.path().join("frames");
        fs::write(&blocker, b"not a directory")?;

        let mut store = FrameStore::new(&blocker, FrameFormat::Jpg, 90);
        let err = store.persist(&rendered(0)).unwrap_err();
        assert_eq!(error_kind(&err), Some(ErrorKind::Persistence));
        assert_eq!(store.persisted(), 0);
        Ok(())
    }

    #[test]
    fn directory_with_an_earlier_sequence_is_refused() -> Result<()> {
        let dir = tempfile::tempdir()?;
        fs::write(dir.path().join("frame_000007.jpg"), b"old")?;
        fs::write(dir.path().join("notes.txt"), b"kept")?;

        let mut store = FrameStore::new(dir.path(), FrameFormat::Jpg, 90);
        let err = store.persist(&rendered(0)).unwrap_err();
        assert_eq!(error_kind(&err), Some(ErrorKind::Persistence));
        assert_eq!(store.persisted(), 0);
        assert!(!dir.path().join("frame_000000.jpg").exists());
        assert!(dir.path().join("frame_000007.jpg").exists());
        Ok(())
    }

    #[test]
    fn directory_with_unrelated_files_is_accepted() -> Result<()> {
        let dir = tempfile::tempdir()?;
        fs::write(dir.path().join("notes.txt"), b"kept")?;

        let mut store = FrameStore::new(dir.path(), FrameFormat::Png, 90);
        store.prepare()?;
        store.persist(&rendered(0))?;
        assert_eq!(list_persisted_frames(dir.path())?.len(), 1);
        Ok(())
    }

    #[test]
    fn frame_format_parsing() -> Result<()> {
        assert_eq!(FrameFormat::parse("JPEG")?, FrameFormat::Jpg);
        assert_eq!(FrameFormat::from_path(Path::new("out.png"))?, FrameFormat::Png);
        let err = FrameFormat::parse("tiff").unwrap_err();
        assert_eq!(error_kind(&err), Some(ErrorKind::Configuration));
        Ok(())
    }
}
