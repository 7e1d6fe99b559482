//! Cooldown window tracking.
//!
//! An accepted motion trigger that leads to a notification opens a cooldown
//! window. While the window is open, further motion triggers are suppressed
//! and activity triggers run a lightweight re-check that only notifies about
//! subjects not yet reported in this window.
//!
//! All times are seconds since the Unix epoch. A `last_event_time` of zero
//! means no window has ever been opened.

use std::collections::BTreeSet;
use std::time::Duration;

/// Default cooldown after a notification (3 minutes).
pub const DEFAULT_COOLDOWN: Duration = Duration::from_secs(180);

/// Decision for an incoming motion trigger.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MotionDecision {
    /// No window is open: run a full cycle.
    Accept,
    /// A window is open; the trigger is suppressed.
    Cooldown { remaining_s: u64 },
}

/// Decision for an incoming activity trigger.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ActivityDecision {
    /// Inside an open window: fetch, detect and notify about new subjects.
    Recheck,
    /// No full cycle has notified yet.
    NoWindow,
    /// The last window has already closed.
    WindowExpired,
}

#[derive(Clone, Debug)]
pub struct CooldownTracker {
    cooldown_s: u64,
    reset_on_new_window: bool,
    last_event_time: u64,
    notified: BTreeSet<String>,
}

impl CooldownTracker {
    /// Create a tracker.
    ///
    /// With `reset_on_new_window` the notified set is replaced whenever a full
    /// cycle opens a new window; without it subjects accumulate for the
    /// lifetime of the process.
    pub fn new(cooldown: Duration, reset_on_new_window: bool) -> Self {
        Self {
            cooldown_s: cooldown.as_secs(),
            reset_on_new_window,
            last_event_time: 0,
            notified: BTreeSet::new(),
        }
    }

    pub fn cooldown(&self) -> Duration {
        Duration::from_secs(self.cooldown_s)
    }

    /// Start of the current (or last) window, if one was ever opened.
    pub fn last_event_time(&self) -> Option<u64> {
        (self.last_event_time != 0).then_some(self.last_event_time)
    }

    pub fn notified_subjects(&self) -> &BTreeSet<String> {
        &self.notified
    }

    pub fn on_motion(&self, now: u64) -> MotionDecision {
        let elapsed = now.saturating_sub(self.last_event_time);
        if elapsed >= self.cooldown_s {
            MotionDecision::Accept
        } else {
            MotionDecision::Cooldown {
                remaining_s: self.cooldown_s - elapsed,
            }
        }
    }

    pub fn on_activity(&self, now: u64) -> ActivityDecision {
        if self.last_event_time == 0 {
            return ActivityDecision::NoWindow;
        }
        if now.saturating_sub(self.last_event_time) < self.cooldown_s {
            ActivityDecision::Recheck
        } else {
            ActivityDecision::WindowExpired
        }
    }

    /// Subjects in `detected` that have not been notified in this window.
    pub fn new_subjects(&self, detected: &BTreeSet<String>) -> BTreeSet<String> {
        detected.difference(&self.notified).cloned().collect()
    }

    /// Record a full cycle that notified about `subjects` at `now`.
    ///
    /// An empty set leaves the state untouched.
    pub fn record_full_cycle(&mut self, subjects: &BTreeSet<String>, now: u64) {
        if subjects.is_empty() {
            return;
        }
        if self.reset_on_new_window {
            self.notified.clear();
        }
        self.notified.extend(subjects.iter().cloned());
        self.last_event_time = now;
    }

    /// Record a re-check that notified about `new_subjects` at `now`,
    /// extending the current window.
    pub fn record_recheck(&mut self, new_subjects: &BTreeSet<String>, now: u64) {
        if new_subjects.is_empty() {
            return;
        }
        self.notified.extend(new_subjects.iter().cloned());
        self.last_event_time = now;
    }
}

impl Default for CooldownTracker {
    fn default() -> Self {
        Self::new(DEFAULT_COOLDOWN, true)
    }
}
