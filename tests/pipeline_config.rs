use std::path::PathBuf;
use std::sync::Mutex;

use tempfile::NamedTempFile;

use pose_canvas::config::{PipelineConfig, PipelineMode};
use pose_canvas::persist::FrameFormat;
use pose_canvas::{error_kind, Codec, ErrorKind};

static ENV_LOCK: Mutex<()> = Mutex::new(());

fn clear_env() {
    for key in [
        "POSE_CANVAS_CONFIG",
        "POSE_CANVAS_TARGET_FPS",
        "POSE_CANVAS_OUTPUT_DIR",
        "POSE_CANVAS_ARTIFACT",
        "POSE_CANVAS_CODEC",
    ] {
        std::env::remove_var(key);
    }
}

#[test]
fn loads_json_config_with_env_overrides() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let mut file = NamedTempFile::new().expect("temp config");
    let json = r#"{
        "target_fps": 12.5,
        "output": {
            "dir": "run_frames",
            "frame_format": "png",
            "jpeg_quality": 70
        },
        "render": {
            "background": [0, 0, 0],
            "annotate": false
        },
        "tracker": {
            "iou_threshold": 0.5,
            "max_age": 10
        },
        "estimator": {
            "confidence_threshold": 0.4
        }
    }"#;
    std::io::Write::write_all(&mut file, json.as_bytes()).expect("write config");

    std::env::set_var("POSE_CANVAS_CONFIG", file.path());
    std::env::set_var("POSE_CANVAS_OUTPUT_DIR", "override_frames");
    std::env::set_var("POSE_CANVAS_ARTIFACT", "out/run.gif");

    let cfg =
        PipelineConfig::load("stub", "stub://cam", PipelineMode::Stream).expect("load config");
    cfg.validate().expect("valid config");

    assert_eq!(cfg.target_fps, 12.5);
    assert_eq!(cfg.output.dir, PathBuf::from("override_frames"));
    assert_eq!(cfg.artifact_path(), PathBuf::from("out/run.gif"));
    assert_eq!(cfg.output.frame_format, FrameFormat::Png);
    assert_eq!(cfg.output.jpeg_quality, 70);
    assert_eq!(cfg.render.background, [0, 0, 0]);
    assert!(!cfg.render.annotate);
    assert_eq!(cfg.tracker.iou_threshold, 0.5);
    assert_eq!(cfg.tracker.max_age, 10);
    assert_eq!(cfg.tracker.smoothing, 0.0);
    assert_eq!(cfg.estimator.confidence_threshold, 0.4);
    assert_eq!(cfg.estimator.input_size, 640);

    clear_env();
}

#[test]
fn loads_toml_config() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let dir = tempfile::tempdir().expect("temp dir");
    let path = dir.path().join("pose_canvas.toml");
    std::fs::write(
        &path,
        r#"
target_fps = 8.0

[output]
codec = "gif"
image = "renders/person.png"

[source]
sequence_fps = 24.0

[live]
preview_path = "live/preview.png"
"#,
    )
    .expect("write config");
    std::env::set_var("POSE_CANVAS_CONFIG", &path);

    let cfg = PipelineConfig::load("stub://2", "person.png", PipelineMode::Still).expect("load");
    cfg.validate().expect("valid config");

    assert_eq!(cfg.target_fps, 8.0);
    assert_eq!(cfg.output.codec, Codec::Gif);
    assert_eq!(cfg.output.image, PathBuf::from("renders/person.png"));
    assert_eq!(cfg.source_settings().sequence_fps, 24.0);
    assert_eq!(cfg.preview_path, PathBuf::from("live/preview.png"));

    clear_env();
}

#[test]
fn invalid_env_values_are_configuration_errors() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    std::env::set_var("POSE_CANVAS_TARGET_FPS", "fast");
    let err = PipelineConfig::load("stub", "stub://cam", PipelineMode::Stream).unwrap_err();
    assert_eq!(error_kind(&err), Some(ErrorKind::Configuration));

    std::env::set_var("POSE_CANVAS_TARGET_FPS", "0");
    let cfg = PipelineConfig::load("stub", "stub://cam", PipelineMode::Stream).expect("load");
    let err = cfg.validate().unwrap_err();
    assert_eq!(error_kind(&err), Some(ErrorKind::Configuration));

    clear_env();
    std::env::set_var("POSE_CANVAS_CODEC", "h264");
    let err = PipelineConfig::load("stub", "stub://cam", PipelineMode::Stream).unwrap_err();
    assert_eq!(error_kind(&err), Some(ErrorKind::Configuration));

    clear_env();
}

#[test]
fn empty_env_values_are_ignored() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    for key in [
        "POSE_CANVAS_TARGET_FPS",
        "POSE_CANVAS_OUTPUT_DIR",
        "POSE_CANVAS_ARTIFACT",
        "POSE_CANVAS_CODEC",
    ] {
        std::env::set_var(key, " ");
    }
    let cfg = PipelineConfig::load("stub", "stub://cam", PipelineMode::Stream).expect("load");
    cfg.validate().expect("valid config");

    assert_eq!(cfg.target_fps, 32.0);
    assert_eq!(cfg.output.dir, PathBuf::from("frames"));
    assert_eq!(cfg.artifact_path(), PathBuf::from("poses_video.gif"));
    assert_eq!(cfg.output.codec, Codec::Gif);

    clear_env();
}

#[test]
fn malformed_config_file_is_rejected() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let mut file = NamedTempFile::new().expect("temp config");
    std::io::Write::write_all(&mut file, b"{ target_fps: ").expect("write config");
    std::env::set_var("POSE_CANVAS_CONFIG", file.path());

    let err = PipelineConfig::load("stub", "stub://cam", PipelineMode::Stream).unwrap_err();
    assert_eq!(error_kind(&err), Some(ErrorKind::Configuration));

    clear_env();
}
