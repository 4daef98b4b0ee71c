//! Scrub reconciliation: a seek-bar drag overrides the displayed position
//! until release, when the last dragged position is committed as one seek.

use serde::{Deserialize, Serialize};

/// Seek-bar drag in progress
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScrubState {
    is_dragging: bool,
    pending_time: Option<f64>,
}

impl ScrubState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_dragging(&self) -> bool {
        self.is_dragging
    }

    pub fn pending_time(&self) -> Option<f64> {
        self.pending_time
    }

    /// Pointer went down on the seek bar
    pub fn begin(&mut self, time: f64) {
        self.is_dragging = true;
        self.pending_time = Some(time);
    }

    /// Pointer moved while dragging; ignored when no drag is active
    pub fn update(&mut self, time: f64) -> bool {
        if !self.is_dragging {
            return false;
        }
        self.pending_time = Some(time);
        true
    }

    /// Pointer released; returns the position to commit
    pub fn release(&mut self) -> Option<f64> {
        if !self.is_dragging {
            return None;
        }
        self.is_dragging = false;
        self.pending_time.take()
    }

    /// Drop the drag without committing (session teardown)
    pub fn cancel(&mut self) {
        self.is_dragging = false;
        self.pending_time = None;
    }

    /// Position to display given the element's reported position
    pub fn display_time(&self, native_time: f64) -> f64 {
        match (self.is_dragging, self.pending_time) {
            (true, Some(pending)) => pending,
            _ => native_time,
        }
    }
}
