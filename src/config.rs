use anyhow::{anyhow, Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use crate::ingest::CropRect;

const DEFAULT_MQTT_PORT: u16 = 8883;
const DEFAULT_MQTT_CLIENT_ID: &str = "litterwatch";
const DEFAULT_CONFIDENCE: f32 = 0.7;
const DEFAULT_INPUT_SIZE: u32 = 640;
const DEFAULT_FETCH_TIMEOUT_SECS: u64 = 10;
const DEFAULT_FRAME_FETCH_TIMEOUT_SECS: u64 = 5;
const DEFAULT_COOLDOWN_SECS: u64 = 180;
const DEFAULT_SETTLE_DELAY_MS: u64 = 3_500;
const DEFAULT_FRAME_INTERVAL_MS: u64 = 500;
const DEFAULT_CAPTURE_DURATION_MS: u64 = 5_000;
const DEFAULT_SAVE_FOLDER: &str = "/tmp/cattrays";
const DEFAULT_TEMP_DIR: &str = "/tmp/cattray_gif";
const DEFAULT_OUTPUT_GIF: &str = "/tmp/catgif.gif";
const DEFAULT_TELEGRAM_API_BASE: &str = "https://api.telegram.org";
const DEFAULT_NOTIFY_TIMEOUT_SECS: u64 = 30;

/// Environment variable naming an optional JSON or TOML config file.
pub const CONFIG_PATH_ENV: &str = "LITTERWATCH_CONFIG";

#[derive(Debug, Deserialize, Default)]
struct NotifierConfigFile {
    mqtt: Option<MqttConfigFile>,
    topics: Option<TopicsConfigFile>,
    camera: Option<CameraConfigFile>,
    detection: Option<DetectionConfigFile>,
    timing: Option<TimingConfigFile>,
    storage: Option<StorageConfigFile>,
    telegram: Option<TelegramConfigFile>,
}

#[derive(Debug, Deserialize, Default)]
struct MqttConfigFile {
    broker: Option<String>,
    port: Option<u16>,
    username: Option<String>,
    password: Option<String>,
    client_id: Option<String>,
    use_tls: Option<bool>,
    tls_insecure: Option<bool>,
    ca_path: Option<PathBuf>,
    client_cert_path: Option<PathBuf>,
    client_key_path: Option<PathBuf>,
}

#[derive(Debug, Deserialize, Default)]
struct TopicsConfigFile {
    motion: Option<String>,
    activity: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
struct CameraConfigFile {
    image_url: Option<String>,
    fetch_timeout_secs: Option<u64>,
    frame_fetch_timeout_secs: Option<u64>,
    animation_crop: Option<String>,
    snapshot_crop: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
struct DetectionConfigFile {
    subjects: Option<Vec<String>>,
    confidence: Option<f32>,
    backend: Option<String>,
    model_path: Option<PathBuf>,
    labels_path: Option<PathBuf>,
    input_size: Option<u32>,
}

#[derive(Debug, Deserialize, Default)]
struct TimingConfigFile {
    cooldown_secs: Option<u64>,
    settle_delay_ms: Option<u64>,
    frame_interval_ms: Option<u64>,
    capture_duration_ms: Option<u64>,
    reset_subjects_on_new_window: Option<bool>,
}

#[derive(Debug, Deserialize, Default)]
struct StorageConfigFile {
    save_dir: Option<PathBuf>,
    scratch_dir: Option<PathBuf>,
    animation_path: Option<PathBuf>,
}

#[derive(Debug, Deserialize, Default)]
struct TelegramConfigFile {
    bot_token: Option<String>,
    chat_id: Option<String>,
    api_base: Option<String>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Clone)]
pub struct NotifierConfig {
    pub mqtt: MqttSettings,
    pub topics: TopicSettings,
    pub camera: CameraSettings,
    pub detection: DetectionSettings,
    pub timing: TimingSettings,
    pub storage: StorageSettings,
    pub telegram: TelegramSettings,
}

#[derive(Debug, Clone)]
pub struct MqttSettings {
    /// Host, `host:port`, or `mqtt://` / `mqtts://` URL.
    pub broker: String,
    /// Port used when `broker` does not carry one.
    pub port: u16,
    pub username: Option<String>,
    pub password: Option<String>,
    pub client_id: String,
    pub use_tls: bool,
    /// Skip broker certificate validation. Explicit opt-in only.
    pub tls_insecure: bool,
    pub ca_path: Option<PathBuf>,
    pub client_cert_path: Option<PathBuf>,
    pub client_key_path: Option<PathBuf>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TopicSettings {
    pub motion: String,
    pub activity: String,
}

#[derive(Debug, Clone)]
pub struct CameraSettings {
    pub image_url: String,
    pub fetch_timeout: Duration,
    /// Per-request budget for animation frames.
    pub frame_fetch_timeout: Duration,
    pub animation_crop: Option<CropRect>,
    pub snapshot_crop: Option<CropRect>,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum DetectorKind {
    #[default]
    Tract,
    Stub,
}

impl FromStr for DetectorKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "tract" | "onnx" | "yolo" => Ok(Self::Tract),
            "stub" | "none" => Ok(Self::Stub),
            other => Err(anyhow!(
                "unknown detector backend '{}': expected 'tract' or 'stub'",
                other
            )),
        }
    }
}

#[derive(Debug, Clone)]
pub struct DetectionSettings {
    /// Allow-listed subject labels.
    pub subjects: Vec<String>,
    /// Detections must be strictly above this confidence.
    pub confidence: f32,
    pub backend: DetectorKind,
    pub model_path: Option<PathBuf>,
    pub labels_path: Option<PathBuf>,
    pub input_size: u32,
}

#[derive(Debug, Clone)]
pub struct TimingSettings {
    pub cooldown: Duration,
    pub settle_delay: Duration,
    pub frame_interval: Duration,
    pub capture_duration: Duration,
    pub reset_subjects_on_new_window: bool,
}

impl TimingSettings {
    /// Number of frames sampled for the animation.
    pub fn frame_count(&self) -> usize {
        let interval = self.frame_interval.as_millis().max(1);
        ((self.capture_duration.as_millis() / interval) as usize).max(1)
    }
}

#[derive(Debug, Clone)]
pub struct StorageSettings {
    pub save_dir: PathBuf,
    pub scratch_dir: PathBuf,
    pub animation_path: PathBuf,
}

#[derive(Debug, Clone)]
pub struct TelegramSettings {
    pub bot_token: Option<String>,
    pub chat_id: Option<String>,
    pub api_base: String,
    pub timeout: Duration,
}

impl NotifierConfig {
    /// Load from the file named by `LITTERWATCH_CONFIG` (if any), then apply
    /// environment overrides and validate.
    pub fn load() -> Result<Self> {
        let config_path = std::env::var(CONFIG_PATH_ENV)
            .ok()
            .filter(|p| !p.trim().is_empty())
            .map(PathBuf::from);
        Self::load_from(config_path.as_deref())
    }

    /// Like [`NotifierConfig::load`] with an explicit config file path.
    pub fn load_from(path: Option<&Path>) -> Result<Self> {
        let file_cfg = match path {
            Some(path) => Some(read_config_file(path)?),
            None => None,
        };
        let mut cfg = Self::from_file(file_cfg.unwrap_or_default())?;
        cfg.apply_env()?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn from_file(file: NotifierConfigFile) -> Result<Self> {
        let mqtt = file.mqtt.unwrap_or_default();
        let topics = file.topics.unwrap_or_default();
        let camera = file.camera.unwrap_or_default();
        let detection = file.detection.unwrap_or_default();
        let timing = file.timing.unwrap_or_default();
        let storage = file.storage.unwrap_or_default();
        let telegram = file.telegram.unwrap_or_default();

        let backend = match detection.backend.as_deref() {
            Some(name) => name.parse()?,
            None => DetectorKind::default(),
        };

        Ok(Self {
            mqtt: MqttSettings {
                broker: mqtt.broker.unwrap_or_default(),
                port: mqtt.port.unwrap_or(DEFAULT_MQTT_PORT),
                username: mqtt.username,
                password: mqtt.password,
                client_id: mqtt
                    .client_id
                    .unwrap_or_else(|| DEFAULT_MQTT_CLIENT_ID.to_string()),
                use_tls: mqtt.use_tls.unwrap_or(true),
                tls_insecure: mqtt.tls_insecure.unwrap_or(false),
                ca_path: mqtt.ca_path,
                client_cert_path: mqtt.client_cert_path,
                client_key_path: mqtt.client_key_path,
            },
            topics: TopicSettings {
                motion: topics.motion.unwrap_or_default(),
                activity: topics.activity.unwrap_or_default(),
            },
            camera: CameraSettings {
                image_url: camera.image_url.unwrap_or_default(),
                fetch_timeout: Duration::from_secs(
                    camera
                        .fetch_timeout_secs
                        .unwrap_or(DEFAULT_FETCH_TIMEOUT_SECS),
                ),
                frame_fetch_timeout: Duration::from_secs(
                    camera
                        .frame_fetch_timeout_secs
                        .unwrap_or(DEFAULT_FRAME_FETCH_TIMEOUT_SECS),
                ),
                animation_crop: camera
                    .animation_crop
                    .as_deref()
                    .map(str::parse)
                    .transpose()?,
                snapshot_crop: camera
                    .snapshot_crop
                    .as_deref()
                    .map(str::parse)
                    .transpose()?,
            },
            detection: DetectionSettings {
                subjects: detection
                    .subjects
                    .unwrap_or_default()
                    .into_iter()
                    .map(|s| s.trim().to_string())
                    .filter(|s| !s.is_empty())
                    .collect(),
                confidence: detection.confidence.unwrap_or(DEFAULT_CONFIDENCE),
                backend,
                model_path: detection.model_path,
                labels_path: detection.labels_path,
                input_size: detection.input_size.unwrap_or(DEFAULT_INPUT_SIZE),
            },
            timing: TimingSettings {
                cooldown: Duration::from_secs(timing.cooldown_secs.unwrap_or(DEFAULT_COOLDOWN_SECS)),
                settle_delay: Duration::from_millis(
                    timing.settle_delay_ms.unwrap_or(DEFAULT_SETTLE_DELAY_MS),
                ),
                frame_interval: Duration::from_millis(
                    timing.frame_interval_ms.unwrap_or(DEFAULT_FRAME_INTERVAL_MS),
                ),
                capture_duration: Duration::from_millis(
                    timing
                        .capture_duration_ms
                        .unwrap_or(DEFAULT_CAPTURE_DURATION_MS),
                ),
                reset_subjects_on_new_window: timing.reset_subjects_on_new_window.unwrap_or(true),
            },
            storage: StorageSettings {
                save_dir: storage
                    .save_dir
                    .unwrap_or_else(|| PathBuf::from(DEFAULT_SAVE_FOLDER)),
                scratch_dir: storage
                    .scratch_dir
                    .unwrap_or_else(|| PathBuf::from(DEFAULT_TEMP_DIR)),
                animation_path: storage
                    .animation_path
                    .unwrap_or_else(|| PathBuf::from(DEFAULT_OUTPUT_GIF)),
            },
            telegram: TelegramSettings {
                bot_token: telegram.bot_token,
                chat_id: telegram.chat_id,
                api_base: telegram
                    .api_base
                    .unwrap_or_else(|| DEFAULT_TELEGRAM_API_BASE.to_string()),
                timeout: Duration::from_secs(
                    telegram.timeout_secs.unwrap_or(DEFAULT_NOTIFY_TIMEOUT_SECS),
                ),
            },
        })
    }

    fn apply_env(&mut self) -> Result<()> {
        // MQTT
        if let Some(broker) = env_string("MQTT_BROKER") {
            self.mqtt.broker = broker;
        }
        if let Some(port) = env_parse::<u16>("MQTT_PORT")? {
            self.mqtt.port = port;
        }
        if let Some(user) = env_string("MQTT_USER") {
            self.mqtt.username = Some(user);
        }
        if let Some(pass) = env_string("MQTT_PASS") {
            self.mqtt.password = Some(pass);
        }
        if let Some(client_id) = env_string("MQTT_CLIENT_ID") {
            self.mqtt.client_id = client_id;
        }
        if let Some(use_tls) = env_bool("MQTT_USE_TLS")? {
            self.mqtt.use_tls = use_tls;
        }
        if let Some(insecure) = env_bool("MQTT_TLS_INSECURE")? {
            self.mqtt.tls_insecure = insecure;
        }
        if let Some(path) = env_string("MQTT_TLS_CA_PATH") {
            self.mqtt.ca_path = Some(PathBuf::from(path));
        }
        if let Some(path) = env_string("MQTT_TLS_CLIENT_CERT_PATH") {
            self.mqtt.client_cert_path = Some(PathBuf::from(path));
        }
        if let Some(path) = env_string("MQTT_TLS_CLIENT_KEY_PATH") {
            self.mqtt.client_key_path = Some(PathBuf::from(path));
        }

        // Topics
        if let Some(topic) = env_string("TOPIC_MOTION") {
            self.topics.motion = topic;
        }
        if let Some(topic) = env_string("TOPIC_CAT") {
            self.topics.activity = topic;
        }

        // Camera
        if let Some(url) = env_string("IMAGE_URL") {
            self.camera.image_url = url;
        }
        if let Some(secs) = env_parse::<u64>("FETCH_TIMEOUT_SECS")? {
            self.camera.fetch_timeout = Duration::from_secs(secs);
        }
        if let Some(secs) = env_parse::<u64>("FRAME_FETCH_TIMEOUT_SECS")? {
            self.camera.frame_fetch_timeout = Duration::from_secs(secs);
        }
        if let Some(crop) = env_parse::<CropRect>("ANIMATION_CROP")? {
            self.camera.animation_crop = Some(crop);
        }
        if let Some(crop) = env_parse::<CropRect>("SNAPSHOT_CROP")? {
            self.camera.snapshot_crop = Some(crop);
        }

        // Detection
        if let Some(names) = env_string("CAT_NAMES") {
            self.detection.subjects = split_csv(&names);
        }
        if let Some(confidence) = env_parse::<f32>("DETECTION_CONFIDENCE")? {
            self.detection.confidence = confidence;
        }
        if let Some(backend) = env_parse::<DetectorKind>("DETECTOR_BACKEND")? {
            self.detection.backend = backend;
        }
        if let Some(path) = env_string("YOLO_MODEL_PATH") {
            self.detection.model_path = Some(PathBuf::from(path));
        }
        if let Some(path) = env_string("YOLO_LABELS_PATH") {
            self.detection.labels_path = Some(PathBuf::from(path));
        }
        if let Some(size) = env_parse::<u32>("YOLO_INPUT_SIZE")? {
            self.detection.input_size = size;
        }

        // Timing
        if let Some(secs) = env_parse::<u64>("MOTION_COOLDOWN_SECS")? {
            self.timing.cooldown = Duration::from_secs(secs);
        }
        if let Some(ms) = env_parse::<u64>("SETTLE_DELAY_MS")? {
            self.timing.settle_delay = Duration::from_millis(ms);
        }
        if let Some(ms) = env_parse::<u64>("FRAME_INTERVAL_MS")? {
            self.timing.frame_interval = Duration::from_millis(ms);
        }
        if let Some(ms) = env_parse::<u64>("CAPTURE_DURATION_MS")? {
            self.timing.capture_duration = Duration::from_millis(ms);
        }
        if let Some(reset) = env_bool("RESET_SUBJECTS_ON_NEW_WINDOW")? {
            self.timing.reset_subjects_on_new_window = reset;
        }

        // Storage
        if let Some(dir) = env_string("SAVE_FOLDER") {
            self.storage.save_dir = PathBuf::from(dir);
        }
        if let Some(dir) = env_string("TEMP_DIR") {
            self.storage.scratch_dir = PathBuf::from(dir);
        }
        if let Some(path) = env_string("OUTPUT_GIF") {
            self.storage.animation_path = PathBuf::from(path);
        }

        // Telegram
        if let Some(token) = env_string("TELEGRAM_BOT_TOKEN") {
            self.telegram.bot_token = Some(token);
        }
        if let Some(chat_id) = env_string("TELEGRAM_CHAT_ID") {
            self.telegram.chat_id = Some(chat_id);
        }
        if let Some(base) = env_string("TELEGRAM_API_BASE") {
            self.telegram.api_base = base;
        }
        if let Some(secs) = env_parse::<u64>("NOTIFY_TIMEOUT_SECS")? {
            self.telegram.timeout = Duration::from_secs(secs);
        }
        Ok(())
    }

    fn validate(&mut self) -> Result<()> {
        if self.detection.subjects.is_empty() {
            return Err(anyhow!(
                "Environment variable CAT_NAMES is required but not set."
            ));
        }
        if !(0.0..=1.0).contains(&self.detection.confidence) {
            return Err(anyhow!(
                "DETECTION_CONFIDENCE must be between 0 and 1 (got {})",
                self.detection.confidence
            ));
        }
        if self.detection.input_size == 0 || self.detection.input_size % 32 != 0 {
            return Err(anyhow!(
                "YOLO_INPUT_SIZE must be a positive multiple of 32 (got {})",
                self.detection.input_size
            ));
        }
        if self.timing.frame_interval.is_zero() {
            return Err(anyhow!("FRAME_INTERVAL_MS must be greater than zero"));
        }
        if self.timing.capture_duration < self.timing.frame_interval {
            return Err(anyhow!(
                "CAPTURE_DURATION_MS must be at least FRAME_INTERVAL_MS"
            ));
        }
        if self.camera.fetch_timeout.is_zero() || self.camera.frame_fetch_timeout.is_zero() {
            return Err(anyhow!(
                "FETCH_TIMEOUT_SECS and FRAME_FETCH_TIMEOUT_SECS must be greater than zero"
            ));
        }
        if self.timing.cooldown.as_secs() == 0 {
            return Err(anyhow!("MOTION_COOLDOWN_SECS must be greater than zero"));
        }
        if !self.camera.image_url.is_empty() {
            validate_http_url(&self.camera.image_url)
                .context("IMAGE_URL must be an http(s) URL")?;
        }
        if self.mqtt.tls_insecure && self.mqtt.ca_path.is_some() {
            return Err(anyhow!(
                "MQTT_TLS_INSECURE cannot be combined with MQTT_TLS_CA_PATH"
            ));
        }
        self.telegram.api_base = self.telegram.api_base.trim_end_matches('/').to_string();
        Ok(())
    }

    /// Additional requirements for running the notifier daemon.
    pub fn validate_for_daemon(&self) -> Result<()> {
        let mut missing = Vec::new();
        if self.mqtt.broker.trim().is_empty() {
            missing.push("MQTT_BROKER");
        }
        if self.topics.motion.is_empty() {
            missing.push("TOPIC_MOTION");
        }
        if self.topics.activity.is_empty() {
            missing.push("TOPIC_CAT");
        }
        if self.camera.image_url.is_empty() {
            missing.push("IMAGE_URL");
        }
        if self.telegram.bot_token.is_none() {
            missing.push("TELEGRAM_BOT_TOKEN");
        }
        if self.telegram.chat_id.is_none() {
            missing.push("TELEGRAM_CHAT_ID");
        }
        if self.detection.backend == DetectorKind::Tract && self.detection.model_path.is_none() {
            missing.push("YOLO_MODEL_PATH");
        }
        if !missing.is_empty() {
            return Err(anyhow!(
                "missing required configuration: {}",
                missing.join(", ")
            ));
        }
        Ok(())
    }
}

fn read_config_file(path: &Path) -> Result<NotifierConfigFile> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| anyhow!("failed to read config file {}: {}", path.display(), e))?;
    let is_toml = path
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("toml"));
    let cfg: NotifierConfigFile = if is_toml {
        toml::from_str(&raw).map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?
    } else {
        serde_json::from_str(&raw)
            .map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?
    };
    Ok(cfg)
}

fn validate_http_url(value: &str) -> Result<()> {
    let url = url::Url::parse(value).with_context(|| format!("invalid URL '{}'", value))?;
    match url.scheme() {
        "http" | "https" => Ok(()),
        other => Err(anyhow!("unsupported scheme '{}'", other)),
    }
}

fn env_string(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn env_parse<T>(key: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match env_string(key) {
        Some(raw) => raw
            .parse()
            .map(Some)
            .map_err(|e| anyhow!("{} has an invalid value '{}': {}", key, raw, e)),
        None => Ok(None),
    }
}

fn env_bool(key: &str) -> Result<Option<bool>> {
    match env_string(key) {
        Some(raw) => match raw.to_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => Ok(Some(true)),
            "0" | "false" | "no" | "off" => Ok(Some(false)),
            _ => Err(anyhow!("{} must be a boolean (got '{}')", key, raw)),
        },
        None => Ok(None),
    }
}

fn split_csv(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(|entry| entry.trim())
        .filter(|entry| !entry.is_empty())
        .map(|entry| entry.to_string())
        .collect()
}
