//! Trigger handling: cooldown decisions plus the fetch, detect and notify
//! cycles they lead to.

use anyhow::{anyhow, Result};
use image::RgbImage;
use std::collections::BTreeSet;
use std::path::PathBuf;
use std::time::Duration;

use crate::config::{NotifierConfig, TopicSettings};
use crate::cooldown::{ActivityDecision, CooldownTracker, MotionDecision};
use crate::detect::{DetectorBackend, SubjectFilter};
use crate::ingest::{CropRect, StillSource};
use crate::media::{annotate, capture_timestamp, encode_jpeg, CaptureKind, CaptureStore};
use crate::notify::{detection_caption, Notifier};

/// Time source for cooldown decisions and in-cycle waits.
pub trait Clock: Send {
    fn now_epoch_s(&self) -> u64;
    fn sleep(&self, duration: Duration);
}

#[derive(Clone, Copy, Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_epoch_s(&self) -> u64 {
        crate::now_epoch_s()
    }

    fn sleep(&self, duration: Duration) {
        std::thread::sleep(duration);
    }
}

/// A bus message the watcher reacts to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Trigger {
    /// Motion sensor reported `ON`.
    Motion,
    /// Tray activity sensor reported `1`.
    Activity,
}

impl Trigger {
    /// Map a bus message to a trigger. Anything else is ignored.
    pub fn classify(topics: &TopicSettings, topic: &str, payload: &[u8]) -> Option<Self> {
        let payload = match std::str::from_utf8(payload) {
            Ok(payload) => payload.trim(),
            Err(_) => {
                log::debug!("Ignoring non UTF-8 payload on {}", topic);
                return None;
            }
        };
        if topic == topics.motion && payload.eq_ignore_ascii_case("ON") {
            Some(Self::Motion)
        } else if topic == topics.activity && payload == "1" {
            Some(Self::Activity)
        } else {
            None
        }
    }
}

/// Result of handling one trigger.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Outcome {
    /// Motion suppressed by an open window.
    CooldownActive { remaining_s: u64 },
    /// Full cycle sent the animation.
    Notified { subjects: BTreeSet<String> },
    /// Full cycle found no subject above threshold.
    NothingDetected,
    /// Activity outside any window.
    NoWindow,
    /// Re-check found only subjects already notified in this window.
    AlreadyNotified,
    /// Re-check sent a photo for subjects new to this window.
    Upgraded { subjects: BTreeSet<String> },
    /// A cycle step failed. State was left untouched.
    Failed { reason: String },
}

#[derive(Clone, Debug)]
pub struct WatcherSettings {
    pub settle_delay: Duration,
    pub frame_interval: Duration,
    pub frame_count: usize,
    pub animation_crop: Option<CropRect>,
    pub snapshot_crop: Option<CropRect>,
}

impl WatcherSettings {
    pub fn from_config(cfg: &NotifierConfig) -> Self {
        Self {
            settle_delay: cfg.timing.settle_delay,
            frame_interval: cfg.timing.frame_interval,
            frame_count: cfg.timing.frame_count(),
            animation_crop: cfg.camera.animation_crop,
            snapshot_crop: cfg.camera.snapshot_crop,
        }
    }
}

/// Something that consumes triggers one at a time.
pub trait TriggerHandler: Send + 'static {
    fn handle(&mut self, trigger: Trigger) -> Outcome;
}

/// Owns the cooldown state and every collaborator a cycle needs.
pub struct Watcher<S, D, N, C> {
    source: S,
    detector: D,
    filter: SubjectFilter,
    notifier: N,
    store: CaptureStore,
    clock: C,
    tracker: CooldownTracker,
    settings: WatcherSettings,
}

impl<S, D, N, C> Watcher<S, D, N, C>
where
    S: StillSource,
    D: DetectorBackend,
    N: Notifier,
    C: Clock,
{
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        source: S,
        detector: D,
        filter: SubjectFilter,
        notifier: N,
        store: CaptureStore,
        clock: C,
        tracker: CooldownTracker,
        settings: WatcherSettings,
    ) -> Self {
        Self {
            source,
            detector,
            filter,
            notifier,
            store,
            clock,
            tracker,
            settings,
        }
    }

    pub fn tracker(&self) -> &CooldownTracker {
        &self.tracker
    }

    pub fn detector(&self) -> &D {
        &self.detector
    }

    pub fn notifier(&self) -> &N {
        &self.notifier
    }

    pub fn notifier_mut(&mut self) -> &mut N {
        &mut self.notifier
    }

    fn dispatch(&mut self, trigger: Trigger) -> Result<Outcome> {
        let now = self.clock.now_epoch_s();
        match trigger {
            Trigger::Motion => self.on_motion(now),
            Trigger::Activity => self.on_activity(now),
        }
    }

    fn on_motion(&mut self, now: u64) -> Result<Outcome> {
        if let MotionDecision::Cooldown { remaining_s } = self.tracker.on_motion(now) {
            log::info!("Motion ignored due to cooldown ({}s remaining).", remaining_s);
            return Ok(Outcome::CooldownActive { remaining_s });
        }
        log::info!("Motion detected. Processing image.");
        self.clock.sleep(self.settings.settle_delay);
        self.full_cycle(now)
    }

    fn full_cycle(&mut self, now: u64) -> Result<Outcome> {
        let animation = self.capture_animation()?;

        let still = self.source.fetch_still()?;
        let timestamp = capture_timestamp();
        if let Err(e) = self.store.save_capture(CaptureKind::Motion, &still, &timestamp) {
            log::warn!("Failed to save motion capture: {:#}", e);
        }

        log::info!("Running detection ({})...", self.detector.name());
        let detections = self.detector.detect(&still)?;
        let subjects = self.filter.select(&detections);

        let annotated = annotate(&still, &detections, &self.filter);
        if let Err(e) = self
            .store
            .save_capture(CaptureKind::MotionAnnotated, &annotated, &timestamp)
        {
            log::warn!("Failed to save annotated capture: {:#}", e);
        }

        if subjects.is_empty() {
            log::info!("No subject detected. Skipping notification.");
            return Ok(Outcome::NothingDetected);
        }

        let caption = detection_caption(&subjects);
        log::info!("{}", caption);
        self.notifier.send_animation(&caption, &animation)?;
        self.tracker.record_full_cycle(&subjects, now);
        Ok(Outcome::Notified { subjects })
    }

    /// Sample `frame_count` stills at the frame interval and encode them.
    fn capture_animation(&mut self) -> Result<PathBuf> {
        let scratch = self.store.scratch()?;
        let mut frames: Vec<RgbImage> = Vec::with_capacity(self.settings.frame_count);
        for index in 0..self.settings.frame_count {
            match self.source.fetch_frame() {
                Ok(still) => {
                    let frame = match self.settings.animation_crop {
                        Some(crop) => crop.apply(&still),
                        None => still,
                    };
                    if let Err(e) = scratch.write_frame(index, &frame) {
                        log::warn!("Failed to write frame {}: {:#}", index, e);
                    }
                    frames.push(frame);
                }
                Err(e) => log::warn!("Error fetching frame {}: {:#}", index, e),
            }
            self.clock.sleep(self.settings.frame_interval);
        }
        if frames.is_empty() {
            return Err(anyhow!(
                "no frames captured out of {}",
                self.settings.frame_count
            ));
        }
        self.store
            .assemble_animation(&frames, self.settings.frame_interval)
    }

    fn on_activity(&mut self, now: u64) -> Result<Outcome> {
        match self.tracker.on_activity(now) {
            ActivityDecision::Recheck => {}
            ActivityDecision::NoWindow | ActivityDecision::WindowExpired => {
                log::debug!("Activity outside a cooldown window. Ignoring.");
                return Ok(Outcome::NoWindow);
            }
        }
        log::info!("Additional activity detected during cooldown.");

        let still = self.source.fetch_still()?;
        let detections = self.detector.detect(&still)?;
        let found = self.filter.select(&detections);
        let new_subjects = self.tracker.new_subjects(&found);
        if new_subjects.is_empty() {
            log::info!("Subject(s) already notified in this cooldown. Ignoring.");
            return Ok(Outcome::AlreadyNotified);
        }

        let caption = detection_caption(&new_subjects);
        log::info!(
            "New subject(s) detected during cooldown: {}",
            join(&new_subjects)
        );
        if let Err(e) = self
            .store
            .save_capture(CaptureKind::Activity, &still, &capture_timestamp())
        {
            log::warn!("Failed to save activity capture: {:#}", e);
        }
        let photo = match self.settings.snapshot_crop {
            Some(crop) => crop.apply(&still),
            None => still,
        };
        self.notifier.send_photo(&caption, encode_jpeg(&photo)?)?;
        self.tracker.record_recheck(&new_subjects, now);
        log::info!(
            "Notified subjects now: {}",
            join(self.tracker.notified_subjects())
        );
        Ok(Outcome::Upgraded {
            subjects: new_subjects,
        })
    }
}

impl<S, D, N, C> TriggerHandler for Watcher<S, D, N, C>
where
    S: StillSource + 'static,
    D: DetectorBackend + 'static,
    N: Notifier + 'static,
    C: Clock + 'static,
{
    /// Run one trigger to completion. Errors are logged and reported as
    /// [`Outcome::Failed`]; they never escape.
    fn handle(&mut self, trigger: Trigger) -> Outcome {
        match self.dispatch(trigger) {
            Ok(outcome) => outcome,
            Err(e) => {
                log::error!("Error handling {:?} trigger: {:#}", trigger, e);
                Outcome::Failed {
                    reason: format!("{:#}", e),
                }
            }
        }
    }
}

fn join(subjects: &BTreeSet<String>) -> String {
    subjects
        .iter()
        .map(String::as_str)
        .collect::<Vec<_>>()
        .join(", ")
}
