//! Playback state machine
//!
//! Mirrors native media events into [`PlaybackState`] and issues commands to
//! the element. The machine never polls: every state change comes from an
//! event or from a command it issued.

use crate::{
    element::{MediaElement, MediaErrorCode},
    Error, PlaybackState, PlayerPhase, Result, StreamFault,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

/// A reported position this close to a pending seek target counts as the
/// seek having landed
const SEEK_TOLERANCE: f64 = 1.0;

/// Native media element events
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum MediaEvent {
    /// `loadedmetadata`; `duration` is absent for live or unknown lengths
    LoadedMetadata { duration: Option<f64> },
    DurationChange { duration: Option<f64> },
    Play,
    Pause,
    Playing,
    Waiting,
    #[serde(rename_all = "camelCase")]
    TimeUpdate { current_time: f64 },
    /// End of the buffered range around the playhead
    #[serde(rename_all = "camelCase")]
    Progress { buffered_end: f64 },
    Seeking,
    Seeked,
    Ended,
    VolumeChange { volume: f64, muted: bool },
    RateChange { rate: f64 },
    Error { code: MediaErrorCode, message: String },
}

/// What a media event means for the rest of the controller
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Reaction {
    /// `is_playing` flipped to this value
    pub playing_changed: Option<bool>,
    /// First metadata of the session arrived
    pub metadata_loaded: bool,
    /// Playback actually resumed (`playing`)
    pub resumed: bool,
    /// A seek landed while playback should continue but the element is paused
    pub resume_after_seek: bool,
    pub ended: bool,
    pub fault: Option<StreamFault>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct PendingSeek {
    target: f64,
    resume: bool,
}

/// Playback state machine for one element
#[derive(Debug, Clone)]
pub struct PlaybackMachine {
    phase: PlayerPhase,
    state: PlaybackState,
    pending_seek: Option<PendingSeek>,
    fault: Option<StreamFault>,
}

impl Default for PlaybackMachine {
    fn default() -> Self {
        Self::new()
    }
}

/// Duration as reported by the element: NaN before metadata, infinite for
/// live streams
pub fn normalize_duration(duration: Option<f64>) -> Option<f64> {
    duration.filter(|d| d.is_finite() && *d > 0.0)
}

impl PlaybackMachine {
    pub fn new() -> Self {
        Self {
            phase: PlayerPhase::Idle,
            state: PlaybackState::default(),
            pending_seek: None,
            fault: None,
        }
    }

    pub fn phase(&self) -> PlayerPhase {
        self.phase
    }

    pub fn state(&self) -> &PlaybackState {
        &self.state
    }

    pub fn fault(&self) -> Option<&StreamFault> {
        self.fault.as_ref()
    }

    pub fn is_seeking(&self) -> bool {
        self.pending_seek.is_some()
    }

    /// Transition to new phase
    fn set_phase(&mut self, to: PlayerPhase) -> Result<()> {
        if self.phase == to {
            return Ok(());
        }
        if !self.phase.can_transition_to(to) {
            return Err(Error::InvalidStateTransition {
                from: self.phase.to_string(),
                to: to.to_string(),
            });
        }
        info!(from = %self.phase, to = %to, "State transition");
        self.phase = to;
        Ok(())
    }

    fn transition(&mut self, to: PlayerPhase) {
        if let Err(e) = self.set_phase(to) {
            debug!(error = %e, "Ignoring media event");
        }
    }

    /// Start a new session. Volume, mute and rate belong to the element and
    /// carry over.
    pub fn begin_loading(&mut self) {
        let previous = std::mem::take(&mut self.state);
        self.state.volume = previous.volume;
        self.state.is_muted = previous.is_muted;
        self.state.playback_rate = previous.playback_rate;
        self.pending_seek = None;
        self.fault = None;
        self.phase = PlayerPhase::Idle;
        self.transition(PlayerPhase::Loading);
    }

    /// Session torn down
    pub fn reset(&mut self) {
        self.state.is_playing = false;
        self.state.is_buffering = false;
        self.pending_seek = None;
        if self.phase != PlayerPhase::Idle {
            self.transition(PlayerPhase::Idle);
        }
    }

    /// Terminal fault for this session
    pub fn fail(&mut self, fault: StreamFault) {
        warn!(fault = %fault, code = fault.code(), "Playback failed");
        self.state.is_playing = false;
        self.state.is_buffering = false;
        self.pending_seek = None;
        self.fault = Some(fault);
        self.transition(PlayerPhase::Error);
    }

    fn accepts_commands(&self) -> bool {
        !matches!(self.phase, PlayerPhase::Idle | PlayerPhase::Error)
    }

    /// Request playback. Rejections are logged; the phase follows the
    /// element's own events.
    pub fn play<M: MediaElement>(&mut self, element: &mut M) {
        if !self.accepts_commands() {
            debug!(phase = %self.phase, "Play ignored");
            return;
        }
        if let Err(e) = element.play() {
            warn!(error = %e, "Play request rejected");
        }
    }

    /// Pause and cancel any resume owed to an in-flight seek
    pub fn pause<M: MediaElement>(&mut self, element: &mut M) {
        if !self.accepts_commands() {
            return;
        }
        if let Some(pending) = self.pending_seek.as_mut() {
            pending.resume = false;
        }
        element.pause();
    }

    /// Seek to a clamped position. When the session is playing, playback is
    /// resumed once the seek lands.
    pub fn seek<M: MediaElement>(&mut self, element: &mut M, time: f64) -> Option<f64> {
        if !self.accepts_commands() {
            return None;
        }
        let target = self.state.clamp_time(time);
        let resume = self.state.is_playing
            || self.pending_seek.map(|p| p.resume).unwrap_or(false);
        info!(from = self.state.current_time, to = target, "Seeking");
        element.set_current_time(target);
        self.state.current_time = target;
        self.pending_seek = Some(PendingSeek { target, resume });
        Some(target)
    }

    pub fn set_volume<M: MediaElement>(&mut self, element: &mut M, volume: f64) {
        let volume = if volume.is_finite() { volume.clamp(0.0, 1.0) } else { return };
        element.set_volume(volume);
        self.state.volume = volume;
    }

    pub fn toggle_mute<M: MediaElement>(&mut self, element: &mut M) -> bool {
        let muted = !self.state.is_muted;
        element.set_muted(muted);
        self.state.is_muted = muted;
        muted
    }

    pub fn set_playback_rate<M: MediaElement>(&mut self, element: &mut M, rate: f64) {
        if !(rate.is_finite() && rate > 0.0) {
            warn!(rate, "Ignoring invalid playback rate");
            return;
        }
        element.set_playback_rate(rate);
        self.state.playback_rate = rate;
    }

    /// Mirror one native event
    pub fn apply(&mut self, event: &MediaEvent) -> Reaction {
        let mut reaction = Reaction::default();
        if matches!(self.phase, PlayerPhase::Idle | PlayerPhase::Error) {
            debug!(phase = %self.phase, ?event, "Media event outside a live session");
            return reaction;
        }

        match event {
            MediaEvent::LoadedMetadata { duration } => {
                self.state.duration = normalize_duration(*duration);
                if self.phase == PlayerPhase::Loading {
                    self.transition(PlayerPhase::Ready);
                    reaction.metadata_loaded = true;
                }
            }
            MediaEvent::DurationChange { duration } => {
                self.state.duration = normalize_duration(*duration);
                self.state.current_time = self.state.clamp_time(self.state.current_time);
            }
            MediaEvent::Play => {
                reaction.playing_changed = self.set_playing(true);
                self.transition(PlayerPhase::Playing);
            }
            MediaEvent::Playing => {
                self.state.is_buffering = false;
                reaction.playing_changed = self.set_playing(true);
                reaction.resumed = true;
                self.transition(PlayerPhase::Playing);
            }
            MediaEvent::Pause => {
                reaction.playing_changed = self.set_playing(false);
                if self.phase != PlayerPhase::Ended {
                    self.transition(PlayerPhase::Paused);
                }
            }
            MediaEvent::Waiting => {
                self.state.is_buffering = true;
            }
            MediaEvent::TimeUpdate { current_time } => {
                let trusted = match self.pending_seek {
                    Some(p) => (current_time - p.target).abs() <= SEEK_TOLERANCE,
                    None => true,
                };
                if trusted {
                    self.state.current_time = self.state.clamp_time(*current_time);
                }
            }
            MediaEvent::Progress { buffered_end } => {
                if buffered_end.is_finite() {
                    self.state.buffered_end = buffered_end.max(0.0);
                }
            }
            MediaEvent::Seeking => {}
            MediaEvent::Seeked => {
                if let Some(pending) = self.pending_seek.take() {
                    reaction.resume_after_seek = pending.resume && !self.state.is_playing;
                }
            }
            MediaEvent::Ended => {
                reaction.playing_changed = self.set_playing(false);
                if let Some(duration) = self.state.duration {
                    self.state.current_time = duration;
                }
                self.transition(PlayerPhase::Ended);
                reaction.ended = true;
            }
            MediaEvent::VolumeChange { volume, muted } => {
                self.state.volume = volume.clamp(0.0, 1.0);
                self.state.is_muted = *muted;
            }
            MediaEvent::RateChange { rate } => {
                if rate.is_finite() && *rate > 0.0 {
                    self.state.playback_rate = *rate;
                }
            }
            MediaEvent::Error { code, message } => {
                reaction.fault = Some(code.into_fault(message.clone()));
            }
        }
        reaction
    }

    fn set_playing(&mut self, playing: bool) -> Option<bool> {
        if self.state.is_playing == playing {
            return None;
        }
        self.state.is_playing = playing;
        Some(playing)
    }
}
