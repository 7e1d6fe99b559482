//! litterwatch
//!
//! Watches a litter tray. Motion events arrive over MQTT; an accepted event
//! samples stills from an HTTP camera into a looping GIF, runs object
//! detection on a fresh still and, when a configured subject is found,
//! sends the animation to a Telegram chat.
//!
//! A cooldown window follows every notification. Motion inside the window is
//! ignored, while tray activity triggers a cheap re-check that only notifies
//! about subjects not yet reported in that window.
//!
//! # Module Structure
//!
//! - `config`: file + environment configuration
//! - `transport`: MQTT connection, TLS, subscribe loop
//! - `ingest`: HTTP still source and cropping
//! - `detect`: detector backends and subject filtering
//! - `media`: GIF assembly, annotated captures, capture store
//! - `notify`: Telegram notifier
//! - `cooldown`: window state machine
//! - `watcher`: trigger handling and cycles
//! - `dispatch`: worker thread and bounded trigger queue

use std::time::{SystemTime, UNIX_EPOCH};

pub mod config;
pub mod cooldown;
pub mod detect;
pub mod dispatch;
pub mod ingest;
pub mod logging;
pub mod media;
pub mod notify;
pub mod transport;
pub mod watcher;

pub use config::NotifierConfig;
pub use cooldown::{ActivityDecision, CooldownTracker, MotionDecision};
pub use detect::{Detection, DetectorBackend, StubBackend, SubjectFilter};
pub use dispatch::Dispatcher;
pub use ingest::{HttpStillSource, StillSource};
pub use media::CaptureStore;
pub use notify::{Notifier, TelegramNotifier};
pub use watcher::{Clock, Outcome, SystemClock, Trigger, TriggerHandler, Watcher, WatcherSettings};

/// Seconds since the Unix epoch. A clock set before 1970 reads as zero.
pub fn now_epoch_s() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}
