//! Headless host
//!
//! Recording implementations of the host surfaces. Every request the
//! controller makes lands in a shared [`HostLog`], which makes the
//! controller scriptable from the CLI and observable from tests.

use crate::{
    config::PlayerConfig,
    controller::PlayerController,
    element::{FullscreenTarget, MediaElement},
    engine::{AdaptiveEngine, EngineFactory, EngineId, EngineProfile},
    Error, Result,
};
use serde::Serialize;
use std::sync::{Arc, Mutex};

/// One request made against the host
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "call", rename_all = "camelCase")]
pub enum HostCall {
    SetSource { url: String },
    ClearSource,
    Play,
    Pause,
    SetCurrentTime { time: f64 },
    SetVolume { volume: f64 },
    SetMuted { muted: bool },
    SetPlaybackRate { rate: f64 },
    SetSubtitlesVisible { visible: bool },
    RequestFullscreen,
    ExitFullscreen,
    EngineCreated { low_latency: bool },
    EngineLoadSource { url: String },
    EngineAttachMedia,
    EngineStartLoad,
    EngineRecoverMedia,
    EngineDestroy,
}

/// Shared, append-only call log
#[derive(Debug, Clone, Default)]
pub struct HostLog {
    calls: Arc<Mutex<Vec<HostCall>>>,
}

impl HostLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, call: HostCall) {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(call);
        }
    }

    pub fn calls(&self) -> Vec<HostCall> {
        self.calls
            .lock()
            .map(|calls| calls.clone())
            .unwrap_or_default()
    }

    /// Drain everything recorded so far
    pub fn take(&self) -> Vec<HostCall> {
        self.calls
            .lock()
            .map(|mut calls| std::mem::take(&mut *calls))
            .unwrap_or_default()
    }

    pub fn count(&self, call: &HostCall) -> usize {
        self.calls
            .lock()
            .map(|calls| calls.iter().filter(|c| *c == call).count())
            .unwrap_or(0)
    }
}

/// Media element that records requests instead of decoding
#[derive(Debug, Clone)]
pub struct RecordingElement {
    log: HostLog,
    /// Report native HLS support from `can_play_type`
    pub native_hls: bool,
    /// Reject every play request (autoplay policy)
    pub reject_play: bool,
    pub source: Option<String>,
    pub plays: u32,
    pub subtitles_visible: Option<bool>,
}

impl RecordingElement {
    pub fn new(log: HostLog) -> Self {
        Self {
            log,
            native_hls: false,
            reject_play: false,
            source: None,
            plays: 0,
            subtitles_visible: None,
        }
    }
}

impl MediaElement for RecordingElement {
    fn set_source(&mut self, url: &str) {
        self.source = Some(url.to_string());
        self.log.record(HostCall::SetSource { url: url.to_string() });
    }

    fn clear_source(&mut self) {
        self.source = None;
        self.log.record(HostCall::ClearSource);
    }

    fn can_play_type(&self, mime: &str) -> bool {
        self.native_hls && mime == crate::manifest::HLS_MIME_TYPE
    }

    fn play(&mut self) -> Result<()> {
        self.plays += 1;
        self.log.record(HostCall::Play);
        if self.reject_play {
            return Err(Error::Engine("play() request was rejected".to_string()));
        }
        Ok(())
    }

    fn pause(&mut self) {
        self.log.record(HostCall::Pause);
    }

    fn set_current_time(&mut self, time: f64) {
        self.log.record(HostCall::SetCurrentTime { time });
    }

    fn set_volume(&mut self, volume: f64) {
        self.log.record(HostCall::SetVolume { volume });
    }

    fn set_muted(&mut self, muted: bool) {
        self.log.record(HostCall::SetMuted { muted });
    }

    fn set_playback_rate(&mut self, rate: f64) {
        self.log.record(HostCall::SetPlaybackRate { rate });
    }

    fn set_subtitles_visible(&mut self, visible: bool) {
        self.subtitles_visible = Some(visible);
        self.log.record(HostCall::SetSubtitlesVisible { visible });
    }
}

/// Fullscreen container that records requests
#[derive(Debug, Clone)]
pub struct RecordingContainer {
    log: HostLog,
    pub requests: u32,
    pub exits: u32,
    /// Deny fullscreen requests
    pub deny: bool,
}

impl RecordingContainer {
    pub fn new(log: HostLog) -> Self {
        Self {
            log,
            requests: 0,
            exits: 0,
            deny: false,
        }
    }
}

impl FullscreenTarget for RecordingContainer {
    fn request_fullscreen(&mut self) -> Result<()> {
        self.requests += 1;
        self.log.record(HostCall::RequestFullscreen);
        if self.deny {
            return Err(Error::Fullscreen("permission denied".to_string()));
        }
        Ok(())
    }

    fn exit_fullscreen(&mut self) -> Result<()> {
        self.exits += 1;
        self.log.record(HostCall::ExitFullscreen);
        Ok(())
    }
}

/// Engine instance that only records
#[derive(Debug)]
pub struct RecordingEngine {
    log: HostLog,
}

impl AdaptiveEngine for RecordingEngine {
    fn load_source(&mut self, url: &str) -> Result<()> {
        self.log.record(HostCall::EngineLoadSource { url: url.to_string() });
        Ok(())
    }

    fn attach_media(&mut self) -> Result<()> {
        self.log.record(HostCall::EngineAttachMedia);
        Ok(())
    }

    fn start_load(&mut self) {
        self.log.record(HostCall::EngineStartLoad);
    }

    fn recover_media_error(&mut self) {
        self.log.record(HostCall::EngineRecoverMedia);
    }

    fn destroy(&mut self) {
        self.log.record(HostCall::EngineDestroy);
    }
}

#[derive(Debug, Clone)]
pub struct RecordingEngineFactory {
    log: HostLog,
    /// Whether the adaptive engine is available
    pub supported: bool,
    pub created: u32,
}

impl RecordingEngineFactory {
    pub fn new(log: HostLog) -> Self {
        Self {
            log,
            supported: true,
            created: 0,
        }
    }
}

impl EngineFactory for RecordingEngineFactory {
    type Engine = RecordingEngine;

    fn is_supported(&self) -> bool {
        self.supported
    }

    fn create(&mut self, _id: EngineId, profile: &EngineProfile) -> Result<RecordingEngine> {
        self.created += 1;
        self.log.record(HostCall::EngineCreated {
            low_latency: profile.low_latency_mode,
        });
        Ok(RecordingEngine {
            log: self.log.clone(),
        })
    }
}

pub type HeadlessController =
    PlayerController<RecordingElement, RecordingContainer, RecordingEngineFactory>;

/// Controller wired to recording surfaces that share one log
pub fn headless_controller(config: PlayerConfig) -> (HeadlessController, HostLog) {
    let log = HostLog::new();
    let controller = PlayerController::new(
        RecordingElement::new(log.clone()),
        RecordingContainer::new(log.clone()),
        RecordingEngineFactory::new(log.clone()),
        config,
    );
    (controller, log)
}
