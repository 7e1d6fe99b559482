//! litterwatchd - MQTT driven litter tray detector.
//!
//! 1. Subscribes to the motion and tray activity topics
//! 2. On motion, samples the camera into a GIF and runs detection
//! 3. Sends the GIF to Telegram when a configured subject is found
//! 4. During the cooldown window, re-checks on tray activity and sends a
//!    photo for subjects not yet reported

use anyhow::{anyhow, Result};
use clap::Parser;
use std::collections::BTreeSet;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use litterwatch::config::NotifierConfig;
use litterwatch::detect::{build_backend, SubjectFilter};
use litterwatch::dispatch::{Dispatcher, DEFAULT_QUEUE_CAPACITY};
use litterwatch::transport::{run_subscriber, BusSettings};
use litterwatch::{
    logging, CaptureStore, CooldownTracker, HttpStillSource, SystemClock, TelegramNotifier,
    Trigger, Watcher, WatcherSettings,
};

#[derive(Parser, Debug)]
#[command(author, version, about = "Litter tray detector with Telegram notifications")]
struct Args {
    /// Optional JSON or TOML config file. Environment variables override it.
    #[arg(long, env = "LITTERWATCH_CONFIG")]
    config: Option<PathBuf>,

    /// Log file, rotated daily with a week of history. `-` logs to stderr.
    #[arg(long, env = "LOG_FILE", default_value = logging::DEFAULT_LOG_FILE)]
    log_file: PathBuf,

    /// Load and validate the configuration, print a summary, and exit.
    #[arg(long)]
    check_config: bool,
}

fn main() -> Result<()> {
    let args = Args::parse();
    let log_file = (args.log_file.as_os_str() != "-").then_some(args.log_file.as_path());
    logging::init(log_file)?;

    let cfg = NotifierConfig::load_from(args.config.as_deref())?;
    cfg.validate_for_daemon()?;
    if args.check_config {
        print_summary(&cfg);
        return Ok(());
    }

    let store = CaptureStore::new(&cfg.storage);
    store.ensure_dirs()?;

    let mut detector = build_backend(&cfg.detection)?;
    if let Err(e) = detector.warm_up() {
        log::warn!("Detector warm-up failed: {:#}", e);
    }

    let source = HttpStillSource::new(&cfg.camera.image_url, cfg.camera.fetch_timeout)?
        .with_frame_timeout(cfg.camera.frame_fetch_timeout);
    let notifier = TelegramNotifier::new(&cfg.telegram)?;
    let filter = SubjectFilter::new(cfg.detection.subjects.clone(), cfg.detection.confidence);
    let tracker = CooldownTracker::new(
        cfg.timing.cooldown,
        cfg.timing.reset_subjects_on_new_window,
    );
    log::info!(
        "Watching for {} above {:.2}, cooldown {}s, stills from {}, captures in {}",
        join(filter.subjects()),
        filter.threshold(),
        tracker.cooldown().as_secs(),
        source.url(),
        store.save_dir().display()
    );
    let watcher = Watcher::new(
        source,
        detector,
        filter,
        notifier,
        store,
        SystemClock,
        tracker,
        WatcherSettings::from_config(&cfg),
    );
    let dispatcher = Dispatcher::spawn(watcher, DEFAULT_QUEUE_CAPACITY)?;

    let shutdown = Arc::new(AtomicBool::new(false));
    let shutdown_signal = shutdown.clone();
    ctrlc::set_handler(move || {
        shutdown_signal.store(true, Ordering::SeqCst);
    })
    .map_err(|e| anyhow!("error setting Ctrl-C handler: {}", e))?;

    let bus = BusSettings::from_config(
        &cfg.mqtt,
        vec![cfg.topics.motion.clone(), cfg.topics.activity.clone()],
    )?;
    log::info!("Listening for motion events via MQTT...");

    let result = run_subscriber(&bus, &shutdown, |message| {
        match Trigger::classify(&cfg.topics, &message.topic, &message.payload) {
            Some(trigger) => {
                if !dispatcher.submit(trigger) {
                    log::debug!("{:?} trigger on {} not queued", trigger, message.topic);
                }
            }
            None => log::debug!(
                "Ignoring message on {}: {}",
                message.topic,
                message.payload_str()
            ),
        }
    });

    log::info!("Shutting down, waiting for in-flight work...");
    dispatcher.shutdown()?;
    result
}

fn print_summary(cfg: &NotifierConfig) {
    let redact = |value: &Option<String>| match value {
        Some(_) => "<set>",
        None => "<unset>",
    };
    println!("mqtt.broker          = {}:{}", cfg.mqtt.broker, cfg.mqtt.port);
    println!("mqtt.username        = {}", redact(&cfg.mqtt.username));
    println!("mqtt.password        = {}", redact(&cfg.mqtt.password));
    println!("mqtt.use_tls         = {}", cfg.mqtt.use_tls);
    println!("mqtt.tls_insecure    = {}", cfg.mqtt.tls_insecure);
    println!("topics.motion        = {}", cfg.topics.motion);
    println!("topics.activity      = {}", cfg.topics.activity);
    println!("camera.image_url     = {}", cfg.camera.image_url);
    println!(
        "camera.timeouts      = still {}s, frame {}s",
        cfg.camera.fetch_timeout.as_secs(),
        cfg.camera.frame_fetch_timeout.as_secs()
    );
    println!("detection.subjects   = {}", cfg.detection.subjects.join(", "));
    println!("detection.confidence = {}", cfg.detection.confidence);
    println!("detection.backend    = {:?}", cfg.detection.backend);
    println!("timing.cooldown      = {}s", cfg.timing.cooldown.as_secs());
    println!("timing.frames        = {}", cfg.timing.frame_count());
    println!("storage.save_dir     = {}", cfg.storage.save_dir.display());
    println!("storage.animation    = {}", cfg.storage.animation_path.display());
    println!("telegram.bot_token   = {}", redact(&cfg.telegram.bot_token));
    println!("telegram.chat_id     = {}", redact(&cfg.telegram.chat_id));
}

fn join(subjects: &BTreeSet<String>) -> String {
    subjects
        .iter()
        .map(String::as_str)
        .collect::<Vec<_>>()
        .join(", ")
}
