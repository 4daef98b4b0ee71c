//! Player Controller - single-threaded reducer for one player instance
//!
//! Native media callbacks, engine signals and user input are posted as
//! [`PlayerEvent`]s into [`PlayerController::dispatch`]. Each event is
//! handled to completion before the next, so no locking is needed. Every
//! dispatch publishes a fresh [`PlayerSnapshot`] when anything changed.
//!
//! The controller owns at most one [`PlaybackSession`]. Loading a new URL
//! tears the previous session down first (engine destroyed, source cleared,
//! hide timer cleared); unmounting does the same and turns every later
//! dispatch into a no-op.

use crate::{
    adapter::{controls_for, Affordances, ContentControls},
    config::PlayerConfig,
    controls::ControlsVisibility,
    element::{FullscreenTarget, MediaElement},
    engine::{EngineBinding, EngineEvent, EngineFactory, EngineId, RecoveryAction},
    keyboard::{Key, KeyBindings},
    playback::{MediaEvent, PlaybackMachine},
    scrub::ScrubState,
    EpisodeDirection, Error, PlaybackRequest, PlaybackSession, PlaybackState, PlayerIntent,
    PlayerPhase, PlayerSnapshot, Result, SessionId, SourceMode, StreamFault,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, instrument, trace, warn};

/// Imperative command surface
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum Command {
    TogglePlay,
    Play,
    Pause,
    /// Absolute position in seconds
    Seek { time: f64 },
    /// Relative to the displayed position
    SeekBy { delta: f64 },
    SetVolume { volume: f64 },
    AdjustVolume { delta: f64 },
    ToggleMute,
    SetPlaybackRate { rate: f64 },
    ToggleFullscreen,
    ExitFullscreen,
    ToggleSubtitles,
    PreviousEpisode,
    NextEpisode,
    /// Leave the player
    Back,
    /// Re-attach from scratch after a terminal fault
    Retry,
}

/// Pointer, keyboard and seek-bar input
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum InputEvent {
    PointerMove,
    PointerEnter,
    PointerLeave,
    Click,
    Key { key: Key },
    ScrubStart { time: f64 },
    ScrubMove { time: f64 },
    ScrubEnd,
}

/// Everything that can happen to a player
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum PlayerEvent {
    Media(MediaEvent),
    /// Signal from the engine instance `engine`; dropped unless that is the
    /// live engine
    Engine { engine: EngineId, event: EngineEvent },
    Input(InputEvent),
    Command(Command),
    /// Platform fullscreen state changed
    FullscreenChanged { active: bool },
    /// Clock delivery for pending deadlines
    Tick,
}

/// Adaptive stream playback controller bound to one element
pub struct PlayerController<M, C, F>
where
    M: MediaElement,
    C: FullscreenTarget,
    F: EngineFactory,
{
    config: PlayerConfig,
    keys: KeyBindings,
    element: M,
    container: C,
    binding: EngineBinding<F>,
    playback: PlaybackMachine,
    scrub: ScrubState,
    controls: ControlsVisibility,
    content: Option<Box<dyn ContentControls>>,
    session: Option<PlaybackSession>,
    /// Last request, kept for manual retry
    request: Option<PlaybackRequest>,
    fullscreen: bool,
    subtitles_enabled: bool,
    mounted: bool,
    now: Duration,
    state_tx: watch::Sender<PlayerSnapshot>,
    intent_tx: mpsc::UnboundedSender<PlayerIntent>,
    intent_rx: Option<mpsc::UnboundedReceiver<PlayerIntent>>,
}

impl<M, C, F> PlayerController<M, C, F>
where
    M: MediaElement,
    C: FullscreenTarget,
    F: EngineFactory,
{
    /// Create a mounted controller with no session
    pub fn new(element: M, container: C, factory: F, config: PlayerConfig) -> Self {
        let (state_tx, _) = watch::channel(PlayerSnapshot::default());
        let (intent_tx, intent_rx) = mpsc::unbounded_channel();

        let binding = EngineBinding::new(
            factory,
            config.max_recoveries_per_kind,
            config.live_profile.clone(),
            config.on_demand_profile.clone(),
        );

        Self {
            keys: config.key_bindings(),
            controls: ControlsVisibility::new(config.hide_controls_after()),
            config,
            element,
            container,
            binding,
            playback: PlaybackMachine::new(),
            scrub: ScrubState::new(),
            content: None,
            session: None,
            request: None,
            fullscreen: false,
            subtitles_enabled: false,
            mounted: true,
            now: Duration::ZERO,
            state_tx,
            intent_tx,
            intent_rx: Some(intent_rx),
        }
    }

    // ------------------------------------------------------------------
    // Accessors
    // ------------------------------------------------------------------

    pub fn config(&self) -> &PlayerConfig {
        &self.config
    }

    pub fn element(&self) -> &M {
        &self.element
    }

    pub fn element_mut(&mut self) -> &mut M {
        &mut self.element
    }

    pub fn container(&self) -> &C {
        &self.container
    }

    pub fn engine_factory(&self) -> &F {
        self.binding.factory()
    }

    pub fn has_engine(&self) -> bool {
        self.binding.has_engine()
    }

    /// Identity of the live engine instance
    pub fn engine_id(&self) -> Option<EngineId> {
        self.binding.engine_id()
    }

    pub fn is_mounted(&self) -> bool {
        self.mounted
    }

    pub fn session(&self) -> Option<&PlaybackSession> {
        self.session.as_ref()
    }

    pub fn phase(&self) -> PlayerPhase {
        self.playback.phase()
    }

    pub fn playback_state(&self) -> &PlaybackState {
        self.playback.state()
    }

    pub fn fault(&self) -> Option<&StreamFault> {
        self.playback.fault()
    }

    pub fn scrub(&self) -> &ScrubState {
        &self.scrub
    }

    /// Position the seek bar shows
    pub fn display_time(&self) -> f64 {
        self.scrub.display_time(self.playback.state().current_time)
    }

    pub fn controls_visible(&self) -> bool {
        self.controls.is_visible()
    }

    pub fn is_fullscreen(&self) -> bool {
        self.fullscreen
    }

    pub fn subtitles_enabled(&self) -> bool {
        self.subtitles_enabled
    }

    pub fn affordances(&self) -> Affordances {
        self.content
            .as_ref()
            .map(|c| c.affordances())
            .unwrap_or_default()
    }

    /// When the host should deliver the next [`PlayerEvent::Tick`]
    pub fn next_deadline(&self) -> Option<Duration> {
        if !self.mounted {
            return None;
        }
        self.controls.next_deadline()
    }

    pub fn snapshot(&self) -> PlayerSnapshot {
        PlayerSnapshot {
            session_id: self.session.as_ref().map(|s| s.id),
            phase: self.playback.phase(),
            playback: self.playback.state().clone(),
            display_time: self.display_time(),
            scrubbing: self.scrub.is_dragging(),
            controls_visible: self.controls.is_visible(),
            fullscreen: self.fullscreen,
            subtitles_enabled: self.subtitles_enabled,
            fault: self.playback.fault().cloned(),
            affordances: self.affordances(),
        }
    }

    /// Subscribe to snapshot changes
    pub fn subscribe(&self) -> watch::Receiver<PlayerSnapshot> {
        self.state_tx.subscribe()
    }

    /// Receiver for intents handed back to the page. Available once.
    pub fn take_intents(&mut self) -> Option<mpsc::UnboundedReceiver<PlayerIntent>> {
        self.intent_rx.take()
    }

    // ------------------------------------------------------------------
    // Session lifecycle
    // ------------------------------------------------------------------

    /// Start a session for `request`, replacing any current one
    #[instrument(skip_all, fields(url = %request.stream_url, kind = %request.stream_type))]
    pub fn load(&mut self, request: PlaybackRequest, now: Duration) -> Result<()> {
        if !self.mounted {
            return Err(Error::NotMounted);
        }
        request.validate()?;
        self.now = now;

        self.teardown_session();
        self.request = Some(request.clone());
        self.content = Some(controls_for(
            request.stream_type,
            request.episode_data.as_ref(),
        ));
        self.subtitles_enabled = false;
        self.playback.begin_loading();
        self.controls.activity(now, false);

        let result = self.binding.attach(
            &request.stream_url,
            request.stream_type,
            &mut self.element,
        );
        let outcome = match result {
            Ok(source_mode) => {
                let session = PlaybackSession {
                    id: SessionId::new(),
                    stream_url: request.stream_url.clone(),
                    content_kind: request.stream_type,
                    source_mode,
                    started_at: Utc::now(),
                };
                info!(session_id = %session.id, mode = ?source_mode, "Session started");
                self.session = Some(session);
                Ok(())
            }
            Err(e) => {
                let fault = match &e {
                    Error::Fault(fault) => fault.clone(),
                    other => StreamFault::Unknown(other.to_string()),
                };
                self.fail_session(fault);
                Err(e)
            }
        };
        self.publish();
        outcome
    }

    /// Re-attach the last request from scratch
    pub fn retry(&mut self, now: Duration) -> Result<()> {
        let request = self
            .request
            .clone()
            .ok_or_else(|| Error::InvalidStreamUrl("nothing to retry".to_string()))?;
        info!(url = %request.stream_url, "Retrying playback");
        self.load(request, now)
    }

    /// Tear down and stop accepting events
    pub fn unmount(&mut self) {
        if !self.mounted {
            return;
        }
        self.teardown_session();
        self.content = None;
        self.request = None;
        self.mounted = false;
        self.publish();
        info!("Player unmounted");
    }

    fn teardown_session(&mut self) {
        if let Some(session) = self.session.take() {
            debug!(session_id = %session.id, "Tearing down session");
        }
        self.binding.detach(&mut self.element);
        self.scrub.cancel();
        self.controls.reset();
        self.playback.reset();
    }

    fn fail_session(&mut self, fault: StreamFault) {
        self.binding.detach(&mut self.element);
        self.scrub.cancel();
        self.playback.fail(fault);
        self.controls.playing_changed(self.now, false);
    }

    // ------------------------------------------------------------------
    // Event dispatch
    // ------------------------------------------------------------------

    /// Handle one event to completion
    pub fn dispatch(&mut self, event: PlayerEvent, now: Duration) {
        if !self.mounted {
            trace!(?event, "Event after unmount dropped");
            return;
        }
        self.now = now;
        match event {
            PlayerEvent::Media(event) => self.on_media(event),
            PlayerEvent::Engine { engine, event } => self.on_engine(engine, event),
            PlayerEvent::Input(input) => self.on_input(input),
            PlayerEvent::Command(command) => self.execute(command),
            PlayerEvent::FullscreenChanged { active } => {
                debug!(active, "Fullscreen changed");
                self.fullscreen = active;
            }
            PlayerEvent::Tick => {
                let playing = self.playback.state().is_playing;
                self.controls.tick(now, playing);
            }
        }
        self.publish();
    }

    fn on_media(&mut self, event: MediaEvent) {
        let Some(mode) = self.session.as_ref().map(|s| s.source_mode) else {
            return;
        };
        let reaction = self.playback.apply(&event);

        if let Some(playing) = reaction.playing_changed {
            self.controls.playing_changed(self.now, playing);
        }
        if reaction.resumed {
            self.binding.playback_resumed();
        }
        if reaction.metadata_loaded && mode == SourceMode::Native && self.config.autoplay {
            self.playback.play(&mut self.element);
        }
        if reaction.resume_after_seek {
            self.playback.play(&mut self.element);
        }
        if reaction.ended {
            let intent = self
                .content
                .as_ref()
                .and_then(|c| c.on_ended(self.config.auto_advance));
            if let Some(intent) = intent {
                self.emit(intent);
            }
        }
        if let Some(fault) = reaction.fault {
            self.fail_session(fault);
        }
    }

    fn on_engine(&mut self, engine: EngineId, event: EngineEvent) {
        let adaptive = self
            .session
            .as_ref()
            .map(|s| s.source_mode == SourceMode::Adaptive)
            .unwrap_or(false);
        if !adaptive || self.binding.engine_id() != Some(engine) {
            debug!(%engine, ?event, "Engine event from a detached engine");
            return;
        }
        match event {
            EngineEvent::ManifestParsed => {
                debug!("Manifest parsed");
                if self.config.autoplay {
                    self.playback.play(&mut self.element);
                }
            }
            EngineEvent::Error(error) => {
                if let RecoveryAction::Terminal(fault) = self.binding.handle_error(&error) {
                    self.fail_session(fault);
                }
            }
        }
    }

    fn on_input(&mut self, input: InputEvent) {
        let playing = self.playback.state().is_playing;
        match input {
            InputEvent::PointerMove | InputEvent::PointerEnter | InputEvent::Click => {
                self.controls.activity(self.now, playing);
            }
            InputEvent::PointerLeave => {
                self.controls.pointer_left(playing);
            }
            InputEvent::Key { key } => {
                self.controls.activity(self.now, playing);
                if let Some(command) = self.keys.command_for(key, self.fullscreen) {
                    self.execute(command);
                }
            }
            InputEvent::ScrubStart { time } => {
                self.controls.activity(self.now, playing);
                if self.session.is_some() && !self.phase().is_terminal() {
                    let time = self.playback.state().clamp_time(time);
                    self.scrub.begin(time);
                    self.preview(time);
                }
            }
            InputEvent::ScrubMove { time } => {
                let time = self.playback.state().clamp_time(time);
                if self.scrub.update(time) {
                    self.preview(time);
                }
            }
            InputEvent::ScrubEnd => {
                if let Some(time) = self.scrub.release() {
                    self.playback.seek(&mut self.element, time);
                }
            }
        }
    }

    fn preview(&mut self, time: f64) {
        if self.config.scrub_preview {
            self.element.set_current_time(time);
        }
    }

    /// Run one command
    pub fn execute(&mut self, command: Command) {
        if !self.mounted {
            return;
        }
        match command {
            Command::TogglePlay => {
                if self.playback.state().is_playing {
                    self.playback.pause(&mut self.element);
                } else {
                    self.playback.play(&mut self.element);
                }
            }
            Command::Play => self.playback.play(&mut self.element),
            Command::Pause => self.playback.pause(&mut self.element),
            Command::Seek { time } => {
                self.playback.seek(&mut self.element, time);
            }
            Command::SeekBy { delta } => {
                let target = self.display_time() + delta;
                self.playback.seek(&mut self.element, target);
            }
            Command::SetVolume { volume } => self.playback.set_volume(&mut self.element, volume),
            Command::AdjustVolume { delta } => {
                let volume = self.playback.state().volume + delta;
                self.playback.set_volume(&mut self.element, volume);
            }
            Command::ToggleMute => {
                self.playback.toggle_mute(&mut self.element);
            }
            Command::SetPlaybackRate { rate } => {
                self.playback.set_playback_rate(&mut self.element, rate)
            }
            Command::ToggleFullscreen => self.toggle_fullscreen(),
            Command::ExitFullscreen => {
                if self.fullscreen {
                    if let Err(e) = self.container.exit_fullscreen() {
                        warn!(error = %e, "Exit fullscreen failed");
                    }
                }
            }
            Command::ToggleSubtitles => {
                if self.affordances().subtitle_toggle {
                    self.subtitles_enabled = !self.subtitles_enabled;
                    self.element.set_subtitles_visible(self.subtitles_enabled);
                }
            }
            Command::PreviousEpisode => self.navigate(EpisodeDirection::Previous),
            Command::NextEpisode => self.navigate(EpisodeDirection::Next),
            Command::Back => self.emit(PlayerIntent::Back),
            Command::Retry => {
                if let Err(e) = self.retry(self.now) {
                    warn!(error = %e, "Retry failed");
                }
            }
        }
    }

    fn toggle_fullscreen(&mut self) {
        // state follows the platform's change notification, not this call
        let result = if self.fullscreen {
            self.container.exit_fullscreen()
        } else {
            self.container.request_fullscreen()
        };
        if let Err(e) = result {
            warn!(error = %e, "Fullscreen toggle failed");
        }
    }

    fn navigate(&mut self, direction: EpisodeDirection) {
        let intent = self.content.as_ref().and_then(|c| c.navigate(direction));
        if let Some(intent) = intent {
            self.emit(intent);
        }
    }

    fn emit(&mut self, intent: PlayerIntent) {
        info!(?intent, "Player intent");
        if self.intent_tx.send(intent).is_err() {
            debug!("Intent receiver dropped");
        }
    }

    fn publish(&self) {
        let snapshot = self.snapshot();
        self.state_tx.send_if_modified(|current| {
            if *current == snapshot {
                false
            } else {
                *current = snapshot;
                true
            }
        });
    }

    // ------------------------------------------------------------------
    // Convenience command wrappers
    // ------------------------------------------------------------------

    pub fn play(&mut self) {
        self.dispatch(PlayerEvent::Command(Command::Play), self.now);
    }

    pub fn pause(&mut self) {
        self.dispatch(PlayerEvent::Command(Command::Pause), self.now);
    }

    pub fn seek(&mut self, time: f64) {
        self.dispatch(PlayerEvent::Command(Command::Seek { time }), self.now);
    }

    pub fn set_volume(&mut self, volume: f64) {
        self.dispatch(PlayerEvent::Command(Command::SetVolume { volume }), self.now);
    }

    pub fn toggle_mute(&mut self) {
        self.dispatch(PlayerEvent::Command(Command::ToggleMute), self.now);
    }

    pub fn set_playback_rate(&mut self, rate: f64) {
        self.dispatch(PlayerEvent::Command(Command::SetPlaybackRate { rate }), self.now);
    }
}

impl<M, C, F> Drop for PlayerController<M, C, F>
where
    M: MediaElement,
    C: FullscreenTarget,
    F: EngineFactory,
{
    fn drop(&mut self) {
        if self.mounted {
            self.teardown_session();
            self.mounted = false;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{EngineError, EngineErrorKind};
    use crate::headless::{
        headless_controller, HeadlessController, HostCall, HostLog, RecordingContainer,
        RecordingElement, RecordingEngineFactory,
    };
    use crate::{element::MediaErrorCode, ContentKind, EpisodeContext};

    fn ms(millis: u64) -> Duration {
        Duration::from_millis(millis)
    }

    fn controller() -> HeadlessController {
        headless_controller(PlayerConfig::default()).0
    }

    fn media(c: &mut HeadlessController, event: MediaEvent, at: u64) {
        c.dispatch(PlayerEvent::Media(event), ms(at));
    }

    /// Event from the live engine, or from the first one once none is left
    fn engine(c: &HeadlessController, event: EngineEvent) -> PlayerEvent {
        PlayerEvent::Engine {
            engine: c.engine_id().unwrap_or(EngineId(1)),
            event,
        }
    }

    fn fatal(c: &HeadlessController, kind: EngineErrorKind) -> PlayerEvent {
        engine(c, EngineEvent::Error(EngineError::fatal(kind, "fragLoadError")))
    }

    /// Movie loaded and playing at t=0
    fn playing_movie(duration: f64) -> (HeadlessController, HostLog) {
        let (mut c, log) = headless_controller(PlayerConfig::default());
        c.load(PlaybackRequest::new("http://p/movie/1.mp4", ContentKind::Movie), ms(0))
            .unwrap();
        media(&mut c, MediaEvent::LoadedMetadata { duration: Some(duration) }, 0);
        media(&mut c, MediaEvent::Play, 0);
        media(&mut c, MediaEvent::Playing, 0);
        log.take();
        (c, log)
    }

    fn position(calls: &[HostCall], call: &HostCall) -> usize {
        calls.iter().position(|c| c == call).unwrap()
    }

    #[test]
    fn test_new_controller_is_idle() {
        let c = controller();
        assert_eq!(c.phase(), PlayerPhase::Idle);
        assert!(c.controls_visible());
        assert!(c.session().is_none());
        assert_eq!(c.next_deadline(), None);
    }

    #[test]
    fn test_load_rejects_empty_url() {
        let mut c = controller();
        let err = c.load(PlaybackRequest::new("", ContentKind::Movie), ms(0)).unwrap_err();
        assert!(matches!(err, Error::InvalidStreamUrl(_)));
        assert_eq!(c.phase(), PlayerPhase::Idle);
    }

    #[test]
    fn test_live_manifest_uses_low_latency_and_plays_on_parse() {
        let (mut c, log) = headless_controller(PlayerConfig::default());
        c.load(PlaybackRequest::new("http://p/live/7.m3u8", ContentKind::Live), ms(0))
            .unwrap();

        assert_eq!(c.session().unwrap().source_mode, SourceMode::Adaptive);
        assert_eq!(log.count(&HostCall::EngineCreated { low_latency: true }), 1);
        assert_eq!(log.count(&HostCall::Play), 0);

        c.dispatch(engine(&c, EngineEvent::ManifestParsed), ms(50));
        assert_eq!(log.count(&HostCall::Play), 1);
        assert!(c.affordances().live_badge);
    }

    #[test]
    fn test_unsupported_manifest_fails_session() {
        let log = HostLog::new();
        let mut factory = RecordingEngineFactory::new(log.clone());
        factory.supported = false;
        let mut c = PlayerController::new(
            RecordingElement::new(log.clone()),
            RecordingContainer::new(log),
            factory,
            PlayerConfig::default(),
        );

        let err = c
            .load(PlaybackRequest::new("http://p/movie/1.m3u8", ContentKind::Movie), ms(0))
            .unwrap_err();
        assert!(matches!(err, Error::Fault(StreamFault::Unsupported(_))));
        assert_eq!(c.phase(), PlayerPhase::Error);
        assert!(matches!(c.fault(), Some(StreamFault::Unsupported(_))));
    }

    #[test]
    fn test_native_hls_fallback() {
        let log = HostLog::new();
        let mut factory = RecordingEngineFactory::new(log.clone());
        factory.supported = false;
        let mut element = RecordingElement::new(log.clone());
        element.native_hls = true;
        let mut c = PlayerController::new(
            element,
            RecordingContainer::new(log.clone()),
            factory,
            PlayerConfig::default(),
        );

        c.load(PlaybackRequest::new("http://p/live/1.m3u8", ContentKind::Live), ms(0))
            .unwrap();
        assert_eq!(c.session().unwrap().source_mode, SourceMode::Native);
        assert_eq!(c.element().source.as_deref(), Some("http://p/live/1.m3u8"));
        assert_eq!(c.engine_factory().created, 0);
    }

    #[test]
    fn test_progressive_autoplays_on_metadata() {
        let mut c = controller();
        c.load(PlaybackRequest::new("http://p/movie/1.mp4", ContentKind::Movie), ms(0))
            .unwrap();
        assert_eq!(c.element().plays, 0);
        media(&mut c, MediaEvent::LoadedMetadata { duration: Some(90.0) }, 10);
        assert_eq!(c.element().plays, 1);
        assert_eq!(c.phase(), PlayerPhase::Ready);
    }

    #[test]
    fn test_rejected_autoplay_is_not_an_error() {
        let mut c = controller();
        c.element_mut().reject_play = true;
        c.load(PlaybackRequest::new("http://p/movie/1.mp4", ContentKind::Movie), ms(0))
            .unwrap();
        media(&mut c, MediaEvent::LoadedMetadata { duration: Some(90.0) }, 10);
        assert_eq!(c.phase(), PlayerPhase::Ready);
        assert!(c.fault().is_none());
        assert!(!c.playback_state().is_playing);
    }

    #[test]
    fn test_seek_while_playing_keeps_playing() {
        let (mut c, log) = playing_movie(100.0);
        c.seek(42.0);
        assert_eq!(log.calls(), vec![HostCall::SetCurrentTime { time: 42.0 }]);

        media(&mut c, MediaEvent::Seeking, 10);
        media(&mut c, MediaEvent::TimeUpdate { current_time: 42.0 }, 20);
        media(&mut c, MediaEvent::Seeked, 30);

        assert_eq!(c.playback_state().current_time, 42.0);
        assert!(c.playback_state().is_playing);
    }

    #[test]
    fn test_pause_during_seek_is_not_undone() {
        let (mut c, log) = playing_movie(100.0);
        c.seek(50.0);
        c.dispatch(PlayerEvent::Command(Command::Pause), ms(10));
        media(&mut c, MediaEvent::Pause, 20);
        media(&mut c, MediaEvent::Seeked, 30);

        assert_eq!(
            log.calls(),
            vec![HostCall::SetCurrentTime { time: 50.0 }, HostCall::Pause]
        );
        assert_eq!(c.phase(), PlayerPhase::Paused);
        assert!(!c.playback_state().is_playing);
    }

    #[test]
    fn test_seek_clamps_to_duration() {
        let (mut c, log) = playing_movie(100.0);
        c.seek(250.0);
        c.seek(-3.0);
        assert_eq!(
            log.calls(),
            vec![
                HostCall::SetCurrentTime { time: 100.0 },
                HostCall::SetCurrentTime { time: 0.0 }
            ]
        );
    }

    #[test]
    fn test_scrub_commits_one_seek() {
        let (mut c, log) = playing_movie(600.0);
        media(&mut c, MediaEvent::TimeUpdate { current_time: 12.0 }, 0);

        c.dispatch(PlayerEvent::Input(InputEvent::ScrubStart { time: 100.0 }), ms(10));
        c.dispatch(PlayerEvent::Input(InputEvent::ScrubMove { time: 200.0 }), ms(20));
        media(&mut c, MediaEvent::TimeUpdate { current_time: 13.0 }, 25);
        assert_eq!(c.display_time(), 200.0);
        assert!(c.snapshot().scrubbing);

        c.dispatch(PlayerEvent::Input(InputEvent::ScrubMove { time: 310.0 }), ms(30));
        c.dispatch(PlayerEvent::Input(InputEvent::ScrubEnd), ms(40));

        let seeks: Vec<_> = log
            .calls()
            .into_iter()
            .filter(|c| matches!(c, HostCall::SetCurrentTime { .. }))
            .collect();
        assert_eq!(seeks, vec![HostCall::SetCurrentTime { time: 310.0 }]);
        assert!(!c.scrub().is_dragging());
        assert_eq!(c.display_time(), 310.0);
    }

    #[test]
    fn test_scrub_preview_moves_playhead() {
        let config = PlayerConfig {
            scrub_preview: true,
            ..Default::default()
        };
        let (mut c, log) = headless_controller(config);
        c.load(PlaybackRequest::new("http://p/movie/1.mp4", ContentKind::Movie), ms(0))
            .unwrap();
        media(&mut c, MediaEvent::LoadedMetadata { duration: Some(60.0) }, 0);
        log.take();

        c.dispatch(PlayerEvent::Input(InputEvent::ScrubStart { time: 10.0 }), ms(10));
        c.dispatch(PlayerEvent::Input(InputEvent::ScrubMove { time: 20.0 }), ms(20));
        assert_eq!(
            log.calls(),
            vec![
                HostCall::SetCurrentTime { time: 10.0 },
                HostCall::SetCurrentTime { time: 20.0 }
            ]
        );
    }

    #[test]
    fn test_toggle_mute_twice_restores() {
        let (mut c, _log) = playing_movie(100.0);
        let before = c.playback_state().is_muted;
        c.toggle_mute();
        assert_ne!(c.playback_state().is_muted, before);
        c.toggle_mute();
        assert_eq!(c.playback_state().is_muted, before);
    }

    #[test]
    fn test_controls_hide_only_while_playing() {
        let mut c = controller();
        c.load(PlaybackRequest::new("http://p/movie/1.mp4", ContentKind::Movie), ms(0))
            .unwrap();
        media(&mut c, MediaEvent::LoadedMetadata { duration: Some(100.0) }, 0);
        media(&mut c, MediaEvent::Play, 1000);
        assert_eq!(c.next_deadline(), Some(ms(4000)));

        c.dispatch(PlayerEvent::Tick, ms(3500));
        assert!(c.controls_visible());
        c.dispatch(PlayerEvent::Tick, ms(4000));
        assert!(!c.controls_visible());

        c.dispatch(PlayerEvent::Input(InputEvent::PointerMove), ms(5000));
        assert!(c.controls_visible());
        media(&mut c, MediaEvent::Pause, 5500);
        c.dispatch(PlayerEvent::Tick, ms(20_000));
        assert!(c.controls_visible());
        assert_eq!(c.next_deadline(), None);
    }

    #[test]
    fn test_pointer_leave_hides_immediately() {
        let (mut c, _log) = playing_movie(100.0);
        c.dispatch(PlayerEvent::Input(InputEvent::PointerLeave), ms(100));
        assert!(!c.controls_visible());
    }

    #[test]
    fn test_network_fault_recovers_once_then_fails() {
        let (mut c, log) = headless_controller(PlayerConfig::default());
        c.load(PlaybackRequest::new("http://p/movie/3.m3u8", ContentKind::Movie), ms(0))
            .unwrap();

        c.dispatch(fatal(&c, EngineErrorKind::Network), ms(100));
        assert_eq!(log.count(&HostCall::EngineStartLoad), 1);
        assert_eq!(c.phase(), PlayerPhase::Loading);
        assert!(c.has_engine());

        c.dispatch(fatal(&c, EngineErrorKind::Network), ms(200));
        assert_eq!(log.count(&HostCall::EngineStartLoad), 1);
        assert_eq!(c.phase(), PlayerPhase::Error);
        assert!(!c.has_engine());
        assert_eq!(log.count(&HostCall::EngineDestroy), 1);
        assert!(matches!(c.fault(), Some(StreamFault::Unknown(_))));
    }

    #[test]
    fn test_recovery_budget_restored_after_playing() {
        let (mut c, log) = headless_controller(PlayerConfig::default());
        c.load(PlaybackRequest::new("http://p/movie/3.m3u8", ContentKind::Movie), ms(0))
            .unwrap();
        c.dispatch(engine(&c, EngineEvent::ManifestParsed), ms(10));
        media(&mut c, MediaEvent::LoadedMetadata { duration: Some(10.0) }, 20);

        c.dispatch(fatal(&c, EngineErrorKind::Media), ms(100));
        media(&mut c, MediaEvent::Playing, 150);
        c.dispatch(fatal(&c, EngineErrorKind::Media), ms(200));

        assert_eq!(log.count(&HostCall::EngineRecoverMedia), 2);
        assert_eq!(c.phase(), PlayerPhase::Playing);
    }

    #[test]
    fn test_non_fatal_engine_error_is_ignored() {
        let (mut c, log) = headless_controller(PlayerConfig::default());
        c.load(PlaybackRequest::new("http://p/movie/3.m3u8", ContentKind::Movie), ms(0))
            .unwrap();
        let stalled = EngineError::non_fatal(EngineErrorKind::Network, "bufferStalledError");
        c.dispatch(engine(&c, EngineEvent::Error(stalled)), ms(10));
        assert_eq!(log.count(&HostCall::EngineStartLoad), 0);
        assert_eq!(c.phase(), PlayerPhase::Loading);
    }

    #[test]
    fn test_native_error_is_terminal() {
        let (mut c, _log) = playing_movie(100.0);
        media(
            &mut c,
            MediaEvent::Error {
                code: MediaErrorCode::Decode,
                message: "PIPELINE_ERROR_DECODE".into(),
            },
            10,
        );
        assert_eq!(c.phase(), PlayerPhase::Error);
        assert!(matches!(c.fault(), Some(StreamFault::Media(_))));
        assert!(c.controls_visible());
    }

    #[test]
    fn test_retry_reattaches_from_scratch() {
        let (mut c, log) = headless_controller(PlayerConfig::default());
        c.load(PlaybackRequest::new("http://p/movie/3.m3u8", ContentKind::Movie), ms(0))
            .unwrap();
        c.dispatch(fatal(&c, EngineErrorKind::Other("otherError".into())), ms(10));
        assert_eq!(c.phase(), PlayerPhase::Error);

        c.dispatch(PlayerEvent::Command(Command::Retry), ms(20));
        assert_eq!(c.phase(), PlayerPhase::Loading);
        assert!(c.fault().is_none());
        assert!(c.has_engine());
        assert_eq!(log.count(&HostCall::EngineCreated { low_latency: false }), 2);
    }

    #[test]
    fn test_new_url_tears_down_previous_session() {
        let (mut c, log) = headless_controller(PlayerConfig::default());
        c.load(PlaybackRequest::new("http://p/live/1.m3u8", ContentKind::Live), ms(0))
            .unwrap();
        let first = c.session().unwrap().id;
        log.take();

        c.load(PlaybackRequest::new("http://p/live/2.m3u8", ContentKind::Live), ms(10))
            .unwrap();
        let calls = log.calls();
        assert!(
            position(&calls, &HostCall::EngineDestroy)
                < position(&calls, &HostCall::EngineCreated { low_latency: true })
        );
        assert_eq!(log.count(&HostCall::EngineDestroy), 1);
        assert_ne!(c.session().unwrap().id, first);
    }

    #[test]
    fn test_superseded_engine_events_are_dropped() {
        let (mut c, log) = headless_controller(PlayerConfig::default());
        c.load(PlaybackRequest::new("http://p/live/1.m3u8", ContentKind::Live), ms(0))
            .unwrap();
        let first = c.engine_id().unwrap();
        c.load(PlaybackRequest::new("http://p/live/2.m3u8", ContentKind::Live), ms(10))
            .unwrap();
        assert_ne!(c.engine_id(), Some(first));
        log.take();

        let stale = EngineError::fatal(
            EngineErrorKind::Other("otherError".into()),
            "internalException",
        );
        c.dispatch(
            PlayerEvent::Engine { engine: first, event: EngineEvent::Error(stale) },
            ms(20),
        );
        c.dispatch(
            PlayerEvent::Engine { engine: first, event: EngineEvent::ManifestParsed },
            ms(30),
        );

        assert_eq!(c.phase(), PlayerPhase::Loading);
        assert!(c.fault().is_none());
        assert!(log.calls().is_empty());

        // the live engine is still heard
        c.dispatch(engine(&c, EngineEvent::ManifestParsed), ms(40));
        assert_eq!(log.count(&HostCall::Play), 1);
    }

    #[test]
    fn test_unmount_while_playing() {
        let (mut c, log) = headless_controller(PlayerConfig::default());
        c.load(PlaybackRequest::new("http://p/live/1.m3u8", ContentKind::Live), ms(0))
            .unwrap();
        c.dispatch(engine(&c, EngineEvent::ManifestParsed), ms(10));
        media(&mut c, MediaEvent::Play, 20);
        media(&mut c, MediaEvent::Playing, 30);

        c.unmount();
        assert!(!c.has_engine());
        assert_eq!(log.count(&HostCall::EngineDestroy), 1);
        let calls = log.calls().len();

        media(&mut c, MediaEvent::TimeUpdate { current_time: 5.0 }, 40);
        c.dispatch(fatal(&c, EngineErrorKind::Network), ms(50));
        c.execute(Command::TogglePlay);
        assert_eq!(log.calls().len(), calls);
        assert_eq!(c.phase(), PlayerPhase::Idle);
        assert_eq!(c.next_deadline(), None);
        assert!(matches!(
            c.load(PlaybackRequest::new("http://p/live/2.m3u8", ContentKind::Live), ms(60)),
            Err(Error::NotMounted)
        ));
    }

    #[test]
    fn test_drop_destroys_engine() {
        let (mut c, log) = headless_controller(PlayerConfig::default());
        c.load(PlaybackRequest::new("http://p/live/1.m3u8", ContentKind::Live), ms(0))
            .unwrap();
        drop(c);
        assert_eq!(log.count(&HostCall::EngineDestroy), 1);
    }

    #[test]
    fn test_episode_without_next_does_not_advance() {
        let mut c = controller();
        let mut intents = c.take_intents().unwrap();
        let episode = EpisodeContext {
            season_number: Some(1),
            episode_number: Some(10),
            total_episodes: Some(10),
            ..Default::default()
        };
        c.load(
            PlaybackRequest::new("http://p/series/99.mkv", ContentKind::Episode)
                .with_episode(episode),
            ms(0),
        )
        .unwrap();
        media(&mut c, MediaEvent::LoadedMetadata { duration: Some(1.0) }, 0);
        media(&mut c, MediaEvent::Play, 0);
        media(&mut c, MediaEvent::Ended, 1000);

        assert_eq!(c.phase(), PlayerPhase::Ended);
        assert!(intents.try_recv().is_err());
    }

    #[test]
    fn test_episode_with_next_advances() {
        let mut c = controller();
        let mut intents = c.take_intents().unwrap();
        let episode = EpisodeContext {
            next_episode_id: Some("13".into()),
            ..Default::default()
        };
        c.load(
            PlaybackRequest::new("http://p/series/12.mkv", ContentKind::Episode)
                .with_episode(episode),
            ms(0),
        )
        .unwrap();
        media(&mut c, MediaEvent::LoadedMetadata { duration: Some(1.0) }, 0);
        media(&mut c, MediaEvent::Play, 0);
        media(&mut c, MediaEvent::Ended, 1000);

        assert_eq!(
            intents.try_recv().unwrap(),
            PlayerIntent::AdvanceTo { episode_id: "13".into() }
        );
    }

    #[test]
    fn test_keyboard_drives_commands() {
        let (mut c, log) = playing_movie(100.0);
        media(&mut c, MediaEvent::TimeUpdate { current_time: 30.0 }, 0);

        c.dispatch(PlayerEvent::Input(InputEvent::Key { key: Key::ArrowRight }), ms(10));
        c.dispatch(PlayerEvent::Input(InputEvent::Key { key: Key::ArrowDown }), ms(20));
        c.dispatch(PlayerEvent::Input(InputEvent::Key { key: Key::Space }), ms(30));

        assert_eq!(
            log.calls(),
            vec![
                HostCall::SetCurrentTime { time: 40.0 },
                HostCall::SetVolume { volume: 0.9 },
                HostCall::Pause
            ]
        );
    }

    #[test]
    fn test_subtitles_only_for_movies() {
        let mut c = controller();
        c.load(PlaybackRequest::new("http://p/live/1.ts", ContentKind::Live), ms(0))
            .unwrap();
        c.execute(Command::ToggleSubtitles);
        assert!(!c.subtitles_enabled());

        c.load(PlaybackRequest::new("http://p/movie/1.mp4", ContentKind::Movie), ms(0))
            .unwrap();
        c.execute(Command::ToggleSubtitles);
        assert!(c.subtitles_enabled());
        assert_eq!(c.element().subtitles_visible, Some(true));
    }

    #[test]
    fn test_fullscreen_mirrors_platform() {
        let mut c = controller();
        c.execute(Command::ToggleFullscreen);
        assert_eq!(c.container().requests, 1);
        assert!(!c.is_fullscreen());

        c.dispatch(PlayerEvent::FullscreenChanged { active: true }, ms(5));
        assert!(c.is_fullscreen());

        c.dispatch(PlayerEvent::Input(InputEvent::Key { key: Key::Escape }), ms(6));
        assert_eq!(c.container().exits, 1);
    }

    #[test]
    fn test_navigation_intents() {
        let mut c = controller();
        let mut intents = c.take_intents().unwrap();
        let episode = EpisodeContext {
            prev_episode_id: Some("11".into()),
            ..Default::default()
        };
        c.load(
            PlaybackRequest::new("http://p/series/12.mkv", ContentKind::Episode)
                .with_episode(episode),
            ms(0),
        )
        .unwrap();

        c.execute(Command::NextEpisode);
        c.execute(Command::PreviousEpisode);
        c.execute(Command::Back);

        assert_eq!(
            intents.try_recv().unwrap(),
            PlayerIntent::NavigateEpisode {
                episode_id: "11".into(),
                direction: EpisodeDirection::Previous
            }
        );
        assert_eq!(intents.try_recv().unwrap(), PlayerIntent::Back);
        assert!(intents.try_recv().is_err());
    }

    #[test]
    fn test_snapshot_published_on_change() {
        let mut c = controller();
        let mut rx = c.subscribe();
        c.load(PlaybackRequest::new("http://p/movie/1.mp4", ContentKind::Movie), ms(0))
            .unwrap();
        assert!(rx.has_changed().unwrap());
        let snap = rx.borrow_and_update().clone();
        assert_eq!(snap.phase, PlayerPhase::Loading);
        assert!(snap.affordances.subtitle_toggle);

        c.dispatch(PlayerEvent::Tick, ms(1));
        assert!(!rx.has_changed().unwrap());
    }

    #[test]
    fn test_event_json_shape() {
        let event: PlayerEvent =
            serde_json::from_str(r#"{"media":{"type":"timeUpdate","currentTime":3.5}}"#).unwrap();
        assert_eq!(event, PlayerEvent::Media(MediaEvent::TimeUpdate { current_time: 3.5 }));

        let event: PlayerEvent = serde_json::from_str(r#""tick""#).unwrap();
        assert_eq!(event, PlayerEvent::Tick);

        let event: PlayerEvent =
            serde_json::from_str(r#"{"input":{"type":"key","key":"arrowLeft"}}"#).unwrap();
        assert_eq!(event, PlayerEvent::Input(InputEvent::Key { key: Key::ArrowLeft }));

        let event: PlayerEvent =
            serde_json::from_str(r#"{"engine":{"engine":2,"event":{"type":"manifestParsed"}}}"#)
                .unwrap();
        assert_eq!(
            event,
            PlayerEvent::Engine { engine: EngineId(2), event: EngineEvent::ManifestParsed }
        );
    }
}
