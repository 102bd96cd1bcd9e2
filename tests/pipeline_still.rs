use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use anyhow::Result;
use image::{Rgb, RgbImage};

use pose_canvas::ingest::{SourceLocator, SourceSettings};
use pose_canvas::pose::PassthroughTracker;
use pose_canvas::{
    error_kind, ErrorKind, FrameProcessor, FrameSource, Pipeline, PipelineMode, Pose,
    PoseRenderer, StubEstimator,
};

struct CountingRenderer {
    calls: Arc<AtomicUsize>,
}

impl PoseRenderer for CountingRenderer {
    fn draw(&self, _pose: &Pose, canvas: &mut RgbImage, _annotate: bool) {
        self.calls.fetch_add(1, Ordering::SeqCst);
        canvas.put_pixel(0, 0, Rgb([0, 0, 0]));
    }
}

fn counting_pipeline(poses: usize) -> (Pipeline, Arc<AtomicUsize>) {
    let calls = Arc::new(AtomicUsize::new(0));
    let processor = FrameProcessor::new(
        Box::new(StubEstimator::new(poses)),
        Box::new(PassthroughTracker),
        Box::new(CountingRenderer {
            calls: Arc::clone(&calls),
        }),
    );
    (Pipeline::new(processor, 32.0), calls)
}

#[test]
fn still_image_renders_two_poses_onto_matching_canvas() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let input = dir.path().join("person.png");
    RgbImage::from_pixel(100, 100, Rgb([30, 60, 90])).save(&input)?;
    let output = dir.path().join("processed_image.png");

    let locator = SourceLocator::parse(&input.display().to_string(), PipelineMode::Still)?;
    let mut source = FrameSource::open(locator, &SourceSettings::default())?;
    let (mut pipeline, calls) = counting_pipeline(2);

    let rendered = pipeline.run_still(&mut source, &output, 90)?;

    assert_eq!(calls.load(Ordering::SeqCst), 2);
    assert_eq!(rendered.pose_count, 2);
    assert_eq!((rendered.width(), rendered.height()), (100, 100));
    assert!(source.is_released());

    let written = image::open(&output)?.to_rgb8();
    assert_eq!(written.dimensions(), (100, 100));
    // Background is the blank canvas, not the source pixels.
    assert_eq!(written.get_pixel(50, 99).0, [255, 255, 255]);
    Ok(())
}

#[test]
fn undecodable_still_image_is_a_source_error() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let input = dir.path().join("broken.png");
    std::fs::write(&input, b"not a png")?;

    let locator = SourceLocator::parse(&input.display().to_string(), PipelineMode::Still)?;
    let err = FrameSource::open(locator, &SourceSettings::default())
        .err()
        .expect("open must fail");
    assert_eq!(error_kind(&err), Some(ErrorKind::Source));
    Ok(())
}
