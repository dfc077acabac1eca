use std::path::PathBuf;
use std::sync::Mutex;

use tempfile::NamedTempFile;

use detection_bridge::config::{resolve_path, BackendKind, ServerConfig};

static ENV_LOCK: Mutex<()> = Mutex::new(());

fn clear_env() {
    for key in [
        "BRIDGE_CONFIG",
        "BRIDGE_BACKEND",
        "BRIDGE_WEIGHTS",
        "BRIDGE_LABELS",
        "BRIDGE_TRACKER_CONFIG",
        "BRIDGE_CONF",
        "BRIDGE_IMGSZ",
        "BRIDGE_MAX_FRAME_BYTES",
    ] {
        std::env::remove_var(key);
    }
}

#[test]
fn defaults_without_file_or_env() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let cfg = ServerConfig::load().expect("load config");
    assert_eq!(cfg.backend, BackendKind::Tract);
    assert_eq!(cfg.model.weights, PathBuf::from("weights/best.onnx"));
    assert_eq!(cfg.model.labels, None);
    assert_eq!(cfg.model.confidence, 0.25);
    assert_eq!(cfg.model.imgsz, 640);
    assert_eq!(cfg.model.iou, 0.7);
    assert_eq!(cfg.tracker_config, PathBuf::from("trackers/bytetrack.toml"));
    assert_eq!(cfg.max_frame_bytes, 64 * 1024 * 1024);
}

#[test]
fn loads_config_from_file_and_env_overrides() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let mut file = NamedTempFile::new().expect("temp config");
    let json = r#"{
        "backend": "stub",
        "model": {
            "weights": "models/ppe.onnx",
            "labels": "models/ppe.names",
            "confidence": 0.4,
            "imgsz": 512,
            "iou": 0.5
        },
        "tracker": { "config": "cfg/tracker.toml" },
        "max_frame_bytes": 1048576
    }"#;
    std::io::Write::write_all(&mut file, json.as_bytes()).expect("write config");

    std::env::set_var("BRIDGE_CONFIG", file.path());
    std::env::set_var("BRIDGE_CONF", "0.6");
    std::env::set_var("BRIDGE_TRACKER_CONFIG", "other/bytetrack.toml");

    let cfg = ServerConfig::load().expect("load config");
    assert_eq!(cfg.backend, BackendKind::Stub);
    assert_eq!(cfg.model.weights, PathBuf::from("models/ppe.onnx"));
    assert_eq!(cfg.model.labels, Some(PathBuf::from("models/ppe.names")));
    assert_eq!(cfg.model.confidence, 0.6);
    assert_eq!(cfg.model.imgsz, 512);
    assert_eq!(cfg.model.iou, 0.5);
    assert_eq!(cfg.tracker_config, PathBuf::from("other/bytetrack.toml"));
    assert_eq!(cfg.max_frame_bytes, 1_048_576);

    clear_env();
}

#[test]
fn rejects_out_of_range_values() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    std::env::set_var("BRIDGE_CONF", "1.5");
    assert!(ServerConfig::load().is_err());

    clear_env();
    std::env::set_var("BRIDGE_IMGSZ", "0");
    assert!(ServerConfig::load().is_err());

    clear_env();
    std::env::set_var("BRIDGE_MAX_FRAME_BYTES", "lots");
    let err = ServerConfig::load().unwrap_err();
    assert!(err.to_string().contains("BRIDGE_MAX_FRAME_BYTES"));

    clear_env();
    std::env::set_var("BRIDGE_BACKEND", "cuda");
    assert!(ServerConfig::load().is_err());

    clear_env();
}

#[test]
fn missing_config_file_is_an_error() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    std::env::set_var("BRIDGE_CONFIG", "/nonexistent/bridge.json");
    assert!(ServerConfig::load().is_err());

    clear_env();
}

#[test]
fn relative_paths_resolve_against_working_directory() {
    let cwd = std::env::current_dir().unwrap();
    assert_eq!(
        resolve_path(std::path::Path::new("trackers/bytetrack.toml")),
        cwd.join("trackers/bytetrack.toml")
    );
    let absolute = cwd.join("elsewhere.toml");
    assert_eq!(resolve_path(&absolute), absolute);
}
