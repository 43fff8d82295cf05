use std::path::PathBuf;
use std::sync::Mutex;
use std::time::Duration;

use tempfile::Builder;

use road_analytics::config::{DetectorKind, RecorderConfig};
use road_analytics::Dimensions;

static ENV_LOCK: Mutex<()> = Mutex::new(());

fn clear_env() {
    for key in [
        "ROAD_CONFIG",
        "ROAD_DATA_DIR",
        "ROAD_GALLERY_DIR",
        "ROAD_ALBUM",
        "ROAD_IMAGE_PREFIX",
        "ROAD_MIN_SAVE_INTERVAL_MS",
        "ROAD_MAX_FIX_ACCURACY_M",
        "ROAD_MAX_FIX_AGE_MS",
        "ROAD_DETECTOR",
        "ROAD_REPLAY_PATH",
    ] {
        std::env::remove_var(key);
    }
}

#[test]
fn loads_json_config_with_env_overrides() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let mut file = Builder::new().suffix(".json").tempfile().expect("temp config");
    let json = r#"{
        "data_dir": "/var/lib/road",
        "log_file": "hazards.csv",
        "gallery": { "root": "/media/gallery", "album": "Hazards", "prefix": "hz" },
        "session": { "min_save_interval_ms": 5000, "max_fix_accuracy_m": 12.5 },
        "source": { "url": "stub://dashcam", "target_fps": 15, "width": 1280, "height": 720 },
        "overlay": { "width": 300, "height": 300 },
        "detector": { "kind": "synthetic", "seed": 42, "hit_rate": 0.5 }
    }"#;
    std::io::Write::write_all(&mut file, json.as_bytes()).expect("write config");

    std::env::set_var("ROAD_CONFIG", file.path());
    std::env::set_var("ROAD_ALBUM", "RoadDamage");
    std::env::set_var("ROAD_MAX_FIX_AGE_MS", "9000");

    let cfg = RecorderConfig::load().expect("load config");

    assert_eq!(cfg.log_path(), PathBuf::from("/var/lib/road/hazards.csv"));
    assert_eq!(cfg.gallery.root, PathBuf::from("/media/gallery"));
    assert_eq!(cfg.gallery.album, "RoadDamage");
    assert_eq!(cfg.gallery.prefix, "hz");
    assert_eq!(cfg.session.min_save_interval, Duration::from_millis(5000));
    assert_eq!(cfg.session.max_fix_accuracy_m, 12.5);
    assert_eq!(cfg.session.max_fix_age, Duration::from_millis(9000));
    assert_eq!(cfg.source.url, "stub://dashcam");
    assert_eq!(cfg.source.target_fps, 15);
    assert_eq!(cfg.overlay, Dimensions::new(300, 300));
    assert_eq!(cfg.detector.kind, DetectorKind::Synthetic);
    assert_eq!(cfg.detector.seed, Some(42));

    clear_env();
}

#[test]
fn loads_toml_config() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let mut file = Builder::new().suffix(".toml").tempfile().expect("temp config");
    let toml = r#"
data_dir = "out"

[gallery]
album = "PotholeDetections"
settle_delay_ms = 0

[detector]
kind = "replay"
replay_path = "recorded.jsonl"
"#;
    std::io::Write::write_all(&mut file, toml.as_bytes()).expect("write config");
    std::env::set_var("ROAD_CONFIG", file.path());

    let cfg = RecorderConfig::load().expect("load config");
    assert_eq!(cfg.data_dir, PathBuf::from("out"));
    assert_eq!(cfg.gallery.settle_delay, Duration::ZERO);
    assert_eq!(cfg.detector.kind, DetectorKind::Replay);
    assert_eq!(cfg.detector.replay_path, Some(PathBuf::from("recorded.jsonl")));

    clear_env();
}

#[test]
fn defaults_apply_without_a_config_file() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let cfg = RecorderConfig::load().expect("load config");
    assert_eq!(cfg.log_path(), PathBuf::from("detections/detections.csv"));
    assert_eq!(cfg.gallery.album, "PotholeDetections");
    assert_eq!(cfg.gallery.prefix, "pothole");
    assert_eq!(cfg.session.min_save_interval, Duration::from_millis(2000));
    assert_eq!(cfg.session.max_fix_accuracy_m, 30.0);
    assert_eq!(cfg.session.max_fix_age, Duration::from_millis(15000));
    assert_eq!(cfg.gallery.settle_delay, Duration::from_millis(10));
    assert_eq!(cfg.source.url, "stub://road");

    clear_env();
}

#[test]
fn rejects_invalid_env_values() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    std::env::set_var("ROAD_MIN_SAVE_INTERVAL_MS", "soon");
    assert!(RecorderConfig::load().is_err());
    clear_env();

    std::env::set_var("ROAD_MIN_SAVE_INTERVAL_MS", "0");
    assert!(RecorderConfig::load().is_err());
    clear_env();

    std::env::set_var("ROAD_IMAGE_PREFIX", "bad/prefix");
    assert!(RecorderConfig::load().is_err());
    clear_env();

    std::env::set_var("ROAD_DETECTOR", "replay");
    assert!(RecorderConfig::load().is_err());
    std::env::set_var("ROAD_REPLAY_PATH", "frames.jsonl");
    assert!(RecorderConfig::load().is_ok());

    clear_env();
}
