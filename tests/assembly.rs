use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use anyhow::Result;
use image::codecs::gif::GifDecoder;
use image::{AnimationDecoder, Rgb, RgbImage};

use pose_canvas::persist::{frame_file_name, FrameFormat, FrameStore};
use pose_canvas::{error_kind, Assembler, Codec, ErrorKind, RenderedFrame};

fn persist_frames(dir: &Path, shades: &[u8]) -> Result<()> {
    let mut store = FrameStore::new(dir, FrameFormat::Png, 90);
    for (i, shade) in shades.iter().enumerate() {
        store.persist(&RenderedFrame {
            canvas: RgbImage::from_pixel(16, 12, Rgb([*shade; 3])),
            source_index: i as u64,
            pose_count: 0,
        })?;
    }
    Ok(())
}

fn decoded_shades(path: &Path) -> Result<Vec<u8>> {
    let decoder = GifDecoder::new(BufReader::new(File::open(path)?))?;
    let frames = decoder.into_frames().collect_frames()?;
    Ok(frames
        .iter()
        .map(|frame| frame.buffer().get_pixel(8, 6)[0])
        .collect())
}

#[test]
fn empty_frame_set_fails_without_artifact() -> Result<()> {
    let root = tempfile::tempdir()?;
    let frames = root.path().join("frames");
    std::fs::create_dir_all(&frames)?;
    let artifact = root.path().join("poses_video.gif");

    let assembler = Assembler::new(Codec::Gif, 32.0, &artifact)?;
    let err = assembler.assemble(&frames).unwrap_err();

    assert_eq!(error_kind(&err), Some(ErrorKind::AssemblyEmptyInput));
    assert!(!artifact.exists());
    assert!(!root.path().join("poses_video.gif.part").exists());
    Ok(())
}

#[test]
fn corrupted_frame_is_skipped_and_order_is_kept() -> Result<()> {
    let root = tempfile::tempdir()?;
    let frames = root.path().join("frames");
    persist_frames(&frames, &[0, 50, 100, 150, 200])?;
    std::fs::write(frames.join(frame_file_name(2, "png")?), b"corrupted bytes")?;
    let artifact = root.path().join("poses_video.gif");

    let report = Assembler::new(Codec::Gif, 32.0, &artifact)?.assemble(&frames)?;

    assert_eq!(report.frames_written, 4);
    assert_eq!(report.skipped, vec![frames.join("frame_000002.png")]);
    assert_eq!((report.params.width, report.params.height), (16, 12));

    let shades = decoded_shades(&artifact)?;
    assert_eq!(shades.len(), 4);
    assert!(shades.windows(2).all(|w| w[0] < w[1]), "order changed: {:?}", shades);
    Ok(())
}

#[test]
fn missing_directory_is_empty_input() -> Result<()> {
    let root = tempfile::tempdir()?;
    let artifact = root.path().join("out.gif");
    let err = Assembler::new(Codec::Gif, 10.0, &artifact)?
        .assemble(&root.path().join("absent"))
        .unwrap_err();
    assert_eq!(error_kind(&err), Some(ErrorKind::AssemblyEmptyInput));
    assert!(!artifact.exists());
    Ok(())
}

#[cfg(not(feature = "assemble-ffmpeg"))]
#[test]
fn mpeg4_requires_ffmpeg_feature() -> Result<()> {
    let root = tempfile::tempdir()?;
    persist_frames(root.path(), &[10])?;
    let err = Assembler::new(Codec::Mpeg4, 10.0, root.path().join("out.avi"))?
        .assemble(root.path())
        .unwrap_err();
    assert_eq!(error_kind(&err), Some(ErrorKind::Configuration));
    Ok(())
}
