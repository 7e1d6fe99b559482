use std::sync::Mutex;
use std::time::Duration;

use tempfile::NamedTempFile;

use litterwatch::config::{DetectorKind, NotifierConfig};

static ENV_LOCK: Mutex<()> = Mutex::new(());

const KEYS: &[&str] = &[
    "LITTERWATCH_CONFIG",
    "MQTT_BROKER",
    "MQTT_PORT",
    "MQTT_USER",
    "MQTT_PASS",
    "MQTT_CLIENT_ID",
    "MQTT_USE_TLS",
    "MQTT_TLS_INSECURE",
    "MQTT_TLS_CA_PATH",
    "MQTT_TLS_CLIENT_CERT_PATH",
    "MQTT_TLS_CLIENT_KEY_PATH",
    "TOPIC_MOTION",
    "TOPIC_CAT",
    "IMAGE_URL",
    "FETCH_TIMEOUT_SECS",
    "FRAME_FETCH_TIMEOUT_SECS",
    "ANIMATION_CROP",
    "SNAPSHOT_CROP",
    "CAT_NAMES",
    "DETECTION_CONFIDENCE",
    "DETECTOR_BACKEND",
    "YOLO_MODEL_PATH",
    "YOLO_LABELS_PATH",
    "YOLO_INPUT_SIZE",
    "MOTION_COOLDOWN_SECS",
    "SETTLE_DELAY_MS",
    "FRAME_INTERVAL_MS",
    "CAPTURE_DURATION_MS",
    "RESET_SUBJECTS_ON_NEW_WINDOW",
    "SAVE_FOLDER",
    "TEMP_DIR",
    "OUTPUT_GIF",
    "TELEGRAM_BOT_TOKEN",
    "TELEGRAM_CHAT_ID",
    "TELEGRAM_API_BASE",
    "NOTIFY_TIMEOUT_SECS",
];

fn clear_env() {
    for key in KEYS {
        std::env::remove_var(key);
    }
}

fn set_daemon_env() {
    std::env::set_var("MQTT_BROKER", "broker.lan");
    std::env::set_var("TOPIC_MOTION", "tray/motion");
    std::env::set_var("TOPIC_CAT", "tray/cat");
    std::env::set_var("IMAGE_URL", "http://camera.lan/snap.jpg");
    std::env::set_var("CAT_NAMES", "Tom, Jerry");
    std::env::set_var("YOLO_MODEL_PATH", "/models/cats.onnx");
    std::env::set_var("TELEGRAM_BOT_TOKEN", "123:abc");
    std::env::set_var("TELEGRAM_CHAT_ID", "42");
}

#[test]
fn defaults_apply_when_only_required_values_are_set() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();
    set_daemon_env();

    let cfg = NotifierConfig::load().expect("load config");
    cfg.validate_for_daemon().expect("daemon config");

    assert_eq!(cfg.mqtt.port, 8883);
    assert_eq!(cfg.mqtt.client_id, "litterwatch");
    assert!(cfg.mqtt.use_tls);
    assert!(!cfg.mqtt.tls_insecure);
    assert_eq!(cfg.detection.subjects, vec!["Tom", "Jerry"]);
    assert!((cfg.detection.confidence - 0.7).abs() < f32::EPSILON);
    assert_eq!(cfg.detection.backend, DetectorKind::Tract);
    assert_eq!(cfg.detection.input_size, 640);
    assert_eq!(cfg.timing.cooldown, Duration::from_secs(180));
    assert_eq!(cfg.timing.settle_delay, Duration::from_millis(3500));
    assert_eq!(cfg.timing.frame_count(), 10);
    assert!(cfg.timing.reset_subjects_on_new_window);
    assert_eq!(cfg.storage.save_dir.to_str(), Some("/tmp/cattrays"));
    assert_eq!(cfg.storage.scratch_dir.to_str(), Some("/tmp/cattray_gif"));
    assert_eq!(cfg.storage.animation_path.to_str(), Some("/tmp/catgif.gif"));
    assert_eq!(cfg.telegram.api_base, "https://api.telegram.org");
    assert_eq!(cfg.telegram.timeout, Duration::from_secs(30));
    assert!(cfg.camera.animation_crop.is_none());
    assert_eq!(cfg.camera.fetch_timeout, Duration::from_secs(10));
    assert_eq!(cfg.camera.frame_fetch_timeout, Duration::from_secs(5));

    clear_env();
}

#[test]
fn missing_subjects_is_fatal() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();
    set_daemon_env();
    std::env::remove_var("CAT_NAMES");

    let err = NotifierConfig::load().unwrap_err();
    assert!(err.to_string().contains("CAT_NAMES"));

    std::env::set_var("CAT_NAMES", " , ");
    assert!(NotifierConfig::load().is_err());

    clear_env();
}

#[test]
fn loads_toml_file_and_env_overrides() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let mut file = tempfile::Builder::new()
        .suffix(".toml")
        .tempfile()
        .expect("temp config");
    let toml = r#"
        [mqtt]
        broker = "mqtts://broker.lan:8884"
        username = "tray"

        [topics]
        motion = "zigbee/motion"
        activity = "zigbee/cat"

        [camera]
        image_url = "http://camera.lan/snap.jpg"
        animation_crop = "100,80,800,600"
        frame_fetch_timeout_secs = 3

        [detection]
        subjects = ["Tom", "Jerry"]
        confidence = 0.6
        backend = "stub"

        [timing]
        cooldown_secs = 300
        reset_subjects_on_new_window = false

        [telegram]
        bot_token = "123:abc"
        chat_id = "42"
        api_base = "http://localhost:8081/"
    "#;
    std::io::Write::write_all(&mut file, toml.as_bytes()).expect("write config");

    std::env::set_var("LITTERWATCH_CONFIG", file.path());
    std::env::set_var("MOTION_COOLDOWN_SECS", "120");
    std::env::set_var("CAT_NAMES", "Spike");
    std::env::set_var("FRAME_FETCH_TIMEOUT_SECS", "2");

    let cfg = NotifierConfig::load().expect("load config");
    cfg.validate_for_daemon().expect("daemon config");

    assert_eq!(cfg.mqtt.broker, "mqtts://broker.lan:8884");
    assert_eq!(cfg.mqtt.username.as_deref(), Some("tray"));
    assert_eq!(cfg.topics.motion, "zigbee/motion");
    assert_eq!(cfg.topics.activity, "zigbee/cat");
    let crop = cfg.camera.animation_crop.expect("crop");
    assert_eq!((crop.x, crop.y, crop.width, crop.height), (100, 80, 800, 600));
    assert_eq!(cfg.camera.frame_fetch_timeout, Duration::from_secs(2));
    assert_eq!(cfg.detection.subjects, vec!["Spike"]);
    assert!((cfg.detection.confidence - 0.6).abs() < f32::EPSILON);
    assert_eq!(cfg.detection.backend, DetectorKind::Stub);
    assert_eq!(cfg.timing.cooldown, Duration::from_secs(120));
    assert!(!cfg.timing.reset_subjects_on_new_window);
    assert_eq!(cfg.telegram.api_base, "http://localhost:8081");

    clear_env();
}

#[test]
fn loads_json_file() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let mut file = NamedTempFile::new().expect("temp config");
    let json = r#"{
        "detection": { "subjects": ["Tom"], "backend": "stub" },
        "storage": { "save_dir": "/var/lib/litterwatch" }
    }"#;
    std::io::Write::write_all(&mut file, json.as_bytes()).expect("write config");

    let cfg = NotifierConfig::load_from(Some(file.path())).expect("load config");
    assert_eq!(cfg.detection.subjects, vec!["Tom"]);
    assert_eq!(cfg.storage.save_dir.to_str(), Some("/var/lib/litterwatch"));

    clear_env();
}

#[test]
fn rejects_invalid_values() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();
    set_daemon_env();

    for (key, value) in [
        ("MQTT_PORT", "not-a-port"),
        ("DETECTION_CONFIDENCE", "1.5"),
        ("DETECTOR_BACKEND", "opencv"),
        ("IMAGE_URL", "rtsp://camera.lan/stream"),
        ("MQTT_USE_TLS", "maybe"),
        ("ANIMATION_CROP", "1,2,3"),
        ("YOLO_INPUT_SIZE", "100"),
        ("FRAME_INTERVAL_MS", "0"),
        ("FRAME_FETCH_TIMEOUT_SECS", "0"),
    ] {
        std::env::set_var(key, value);
        assert!(
            NotifierConfig::load().is_err(),
            "{}={} should be rejected",
            key,
            value
        );
        std::env::remove_var(key);
    }
    assert!(NotifierConfig::load().is_ok());

    clear_env();
}

#[test]
fn daemon_validation_lists_missing_settings() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();
    std::env::set_var("CAT_NAMES", "Tom");

    let cfg = NotifierConfig::load().expect("load config");
    let err = cfg.validate_for_daemon().unwrap_err().to_string();
    for key in [
        "MQTT_BROKER",
        "TOPIC_MOTION",
        "TOPIC_CAT",
        "IMAGE_URL",
        "TELEGRAM_BOT_TOKEN",
        "TELEGRAM_CHAT_ID",
        "YOLO_MODEL_PATH",
    ] {
        assert!(err.contains(key), "{} missing from '{}'", key, err);
    }

    clear_env();
}

#[test]
fn insecure_tls_cannot_be_combined_with_ca() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();
    set_daemon_env();
    std::env::set_var("MQTT_TLS_INSECURE", "true");
    std::env::set_var("MQTT_TLS_CA_PATH", "/etc/ssl/ca.pem");

    assert!(NotifierConfig::load().is_err());

    clear_env();
}
