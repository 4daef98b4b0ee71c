//! Controls-visibility state machine
//!
//! Chrome auto-hides after an inactivity window while playing and shows
//! immediately on any activity. Time is a monotonic offset supplied by the
//! host, so the machine itself never reads a clock.

use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::trace;

/// Visibility of the on-screen chrome
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Visibility {
    Visible,
    Hidden,
}

#[derive(Debug, Clone)]
pub struct ControlsVisibility {
    visibility: Visibility,
    last_activity_at: Duration,
    hide_after: Duration,
    /// Armed only while playing
    hide_deadline: Option<Duration>,
}

impl ControlsVisibility {
    pub fn new(hide_after: Duration) -> Self {
        Self {
            visibility: Visibility::Visible,
            last_activity_at: Duration::ZERO,
            hide_after,
            hide_deadline: None,
        }
    }

    pub fn visibility(&self) -> Visibility {
        self.visibility
    }

    pub fn is_visible(&self) -> bool {
        self.visibility == Visibility::Visible
    }

    pub fn last_activity_at(&self) -> Duration {
        self.last_activity_at
    }

    /// When the host should next deliver a tick, if at all
    pub fn next_deadline(&self) -> Option<Duration> {
        self.hide_deadline
    }

    /// Pointer move/enter, click or key press
    pub fn activity(&mut self, now: Duration, is_playing: bool) -> bool {
        self.last_activity_at = now;
        self.hide_deadline = is_playing.then(|| now + self.hide_after);
        self.show()
    }

    /// Playing flag changed. Pausing always shows the chrome; starting
    /// playback arms the hide timer.
    pub fn playing_changed(&mut self, now: Duration, is_playing: bool) -> bool {
        if is_playing {
            let earliest = self.last_activity_at + self.hide_after;
            self.hide_deadline = Some(earliest.max(now + self.hide_after));
            false
        } else {
            self.hide_deadline = None;
            self.show()
        }
    }

    /// Pointer left the player; hides at once while playing
    pub fn pointer_left(&mut self, is_playing: bool) -> bool {
        if !is_playing {
            return false;
        }
        self.hide_deadline = None;
        self.set(Visibility::Hidden)
    }

    /// Deliver the clock; hides when the window has elapsed
    pub fn tick(&mut self, now: Duration, is_playing: bool) -> bool {
        let Some(deadline) = self.hide_deadline else {
            return false;
        };
        if !is_playing || now < deadline {
            return false;
        }
        if now.saturating_sub(self.last_activity_at) < self.hide_after {
            return false;
        }
        self.hide_deadline = None;
        self.set(Visibility::Hidden)
    }

    /// Clear the pending timer and show (session teardown)
    pub fn reset(&mut self) {
        self.hide_deadline = None;
        self.visibility = Visibility::Visible;
    }

    fn show(&mut self) -> bool {
        self.set(Visibility::Visible)
    }

    fn set(&mut self, visibility: Visibility) -> bool {
        if self.visibility == visibility {
            return false;
        }
        trace!(?visibility, "Controls visibility changed");
        self.visibility = visibility;
        true
    }
}
