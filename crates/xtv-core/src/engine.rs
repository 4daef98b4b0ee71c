//! Adaptive Engine Binding
//!
//! Attaches one adaptive streaming engine instance to one media element for
//! the lifetime of one stream URL, and classifies engine errors into the
//! recovery ladder:
//!
//! 1. non-fatal error: logged, playback continues
//! 2. fatal network error: `start_load` once
//! 3. fatal media error: `recover_media_error` once
//! 4. anything else, or a repeat beyond the retry cap: terminal fault

use crate::{
    element::MediaElement,
    manifest::{detect_stream_format, StreamFormat, HLS_MIME_TYPE},
    ContentKind, Result, SourceMode, StreamFault,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

/// Engine tuning applied at creation. Field names follow the engine's own
/// configuration keys so hosts can pass the profile through unchanged.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EngineProfile {
    /// Low-latency live mode
    pub low_latency_mode: bool,
    /// Seconds of already-played media kept behind the playhead
    pub back_buffer_length: f64,
    /// Seconds buffered ahead of the playhead
    pub max_buffer_length: f64,
    /// Target distance from the live edge, in segments
    #[serde(skip_serializing_if = "Option::is_none")]
    pub live_sync_duration_count: Option<u32>,
    /// Demux in a web worker
    pub enable_worker: bool,
}

impl EngineProfile {
    /// Profile for live channels: stay close to the live edge, keep little
    /// history
    pub fn live() -> Self {
        Self {
            low_latency_mode: true,
            back_buffer_length: 30.0,
            max_buffer_length: 10.0,
            live_sync_duration_count: Some(3),
            enable_worker: true,
        }
    }

    /// Profile for movies and episodes: deeper buffers for scrubbing
    pub fn on_demand() -> Self {
        Self {
            low_latency_mode: false,
            back_buffer_length: 90.0,
            max_buffer_length: 60.0,
            live_sync_duration_count: None,
            enable_worker: true,
        }
    }
}

/// Error type reported by the engine
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum EngineErrorKind {
    Network,
    Media,
    /// Any other engine error type, kept verbatim
    Other(String),
}

impl EngineErrorKind {
    /// Map the engine's error type string (`networkError`, `mediaError`, ...)
    pub fn from_type(kind: &str) -> Self {
        match kind {
            "networkError" => EngineErrorKind::Network,
            "mediaError" => EngineErrorKind::Media,
            other => EngineErrorKind::Other(other.to_string()),
        }
    }
}

/// Error event raised by the engine
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EngineError {
    pub kind: EngineErrorKind,
    pub fatal: bool,
    pub details: String,
}

impl EngineError {
    pub fn fatal(kind: EngineErrorKind, details: impl Into<String>) -> Self {
        Self { kind, fatal: true, details: details.into() }
    }

    pub fn non_fatal(kind: EngineErrorKind, details: impl Into<String>) -> Self {
        Self { kind, fatal: false, details: details.into() }
    }

    /// Classify into a stream fault
    pub fn to_fault(&self) -> StreamFault {
        match &self.kind {
            EngineErrorKind::Network => StreamFault::Network(self.details.clone()),
            EngineErrorKind::Media => StreamFault::Media(self.details.clone()),
            EngineErrorKind::Other(kind) => {
                StreamFault::Unknown(format!("{}: {}", kind, self.details))
            }
        }
    }
}

/// Signals the engine raises towards the controller
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum EngineEvent {
    /// Manifest loaded and parsed, playback can start
    ManifestParsed,
    Error(EngineError),
}

/// Identity of one engine instance within a controller. Hosts stamp every
/// engine signal with it so signals from a destroyed engine can be told
/// apart from the live one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EngineId(pub u64);

impl std::fmt::Display for EngineId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "engine#{}", self.0)
    }
}

/// One adaptive engine instance
pub trait AdaptiveEngine {
    /// Begin loading the manifest
    fn load_source(&mut self, url: &str) -> Result<()>;

    /// Bind the engine to the media element it was created for
    fn attach_media(&mut self) -> Result<()>;

    /// Restart loading from the current position (network recovery)
    fn start_load(&mut self);

    /// Reset the decoding pipeline (media recovery)
    fn recover_media_error(&mut self);

    /// Stop all network activity and release internal buffers
    fn destroy(&mut self);
}

/// Creates engine instances for the binding
pub trait EngineFactory {
    type Engine: AdaptiveEngine;

    /// Whether the platform can run the adaptive engine at all
    fn is_supported(&self) -> bool;

    /// New engine instance; `id` is what its signals must carry
    fn create(&mut self, id: EngineId, profile: &EngineProfile) -> Result<Self::Engine>;
}

/// Owns an engine instance; destroying it is tied to dropping the guard so
/// every exit path releases the engine.
struct EngineGuard<E: AdaptiveEngine> {
    id: EngineId,
    engine: E,
}

impl<E: AdaptiveEngine> std::ops::Deref for EngineGuard<E> {
    type Target = E;

    fn deref(&self) -> &E {
        &self.engine
    }
}

impl<E: AdaptiveEngine> std::ops::DerefMut for EngineGuard<E> {
    fn deref_mut(&mut self) -> &mut E {
        &mut self.engine
    }
}

impl<E: AdaptiveEngine> Drop for EngineGuard<E> {
    fn drop(&mut self) {
        self.engine.destroy();
    }
}

/// How a URL will be played
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttachPlan {
    pub format: StreamFormat,
    pub mode: SourceMode,
    /// Engine profile, for adaptive playback only
    pub profile: Option<EngineProfile>,
}

/// Decide how to play `url`.
///
/// Manifests go to the adaptive engine when the platform supports it, and
/// to the element directly when it plays HLS natively. Anything else is a
/// progressive source.
pub fn plan_attach(
    url: &str,
    kind: ContentKind,
    engine_supported: bool,
    native_hls: bool,
    live_profile: &EngineProfile,
    on_demand_profile: &EngineProfile,
) -> Result<AttachPlan> {
    let format = detect_stream_format(url);
    match format {
        StreamFormat::Hls if engine_supported => Ok(AttachPlan {
            format,
            mode: SourceMode::Adaptive,
            profile: Some(if kind.is_live() {
                live_profile.clone()
            } else {
                on_demand_profile.clone()
            }),
        }),
        StreamFormat::Hls if native_hls => Ok(AttachPlan {
            format,
            mode: SourceMode::Native,
            profile: None,
        }),
        StreamFormat::Hls => Err(StreamFault::Unsupported(
            "HLS is not supported by this platform".to_string(),
        )
        .into()),
        StreamFormat::Progressive => Ok(AttachPlan {
            format,
            mode: SourceMode::Native,
            profile: None,
        }),
    }
}

/// Outcome of feeding an engine error through the ladder
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecoveryAction {
    /// Non-fatal, playback continues
    Ignore,
    /// Network recovery issued
    RestartLoad,
    /// Media recovery issued
    RecoverMedia,
    /// Session cannot continue
    Terminal(StreamFault),
}

/// Bounded recovery attempts per fault kind.
///
/// Attempts count consecutive failures: they reset once playback resumes.
#[derive(Debug, Clone)]
pub struct RecoveryLadder {
    max_per_kind: u32,
    network_attempts: u32,
    media_attempts: u32,
}

impl RecoveryLadder {
    pub fn new(max_per_kind: u32) -> Self {
        Self {
            max_per_kind,
            network_attempts: 0,
            media_attempts: 0,
        }
    }

    /// Decide the next rung for an engine error
    pub fn classify(&mut self, error: &EngineError) -> RecoveryAction {
        if !error.fatal {
            return RecoveryAction::Ignore;
        }
        match error.kind {
            EngineErrorKind::Network if self.network_attempts < self.max_per_kind => {
                self.network_attempts += 1;
                RecoveryAction::RestartLoad
            }
            EngineErrorKind::Media if self.media_attempts < self.max_per_kind => {
                self.media_attempts += 1;
                RecoveryAction::RecoverMedia
            }
            EngineErrorKind::Network | EngineErrorKind::Media => {
                RecoveryAction::Terminal(StreamFault::Unknown(format!(
                    "{} persisted after recovery",
                    error.to_fault()
                )))
            }
            EngineErrorKind::Other(_) => RecoveryAction::Terminal(error.to_fault()),
        }
    }

    /// Playback resumed; earlier recoveries succeeded
    pub fn playback_resumed(&mut self) {
        self.network_attempts = 0;
        self.media_attempts = 0;
    }

    pub fn attempts(&self) -> (u32, u32) {
        (self.network_attempts, self.media_attempts)
    }

    pub fn reset(&mut self) {
        self.playback_resumed();
    }
}

/// Binding of one engine factory to the controller's media element
pub struct EngineBinding<F: EngineFactory> {
    factory: F,
    engine: Option<EngineGuard<F::Engine>>,
    last_id: u64,
    ladder: RecoveryLadder,
    live_profile: EngineProfile,
    on_demand_profile: EngineProfile,
}

impl<F: EngineFactory> EngineBinding<F> {
    pub fn new(
        factory: F,
        max_recoveries_per_kind: u32,
        live_profile: EngineProfile,
        on_demand_profile: EngineProfile,
    ) -> Self {
        Self {
            factory,
            engine: None,
            last_id: 0,
            ladder: RecoveryLadder::new(max_recoveries_per_kind),
            live_profile,
            on_demand_profile,
        }
    }

    pub fn factory(&self) -> &F {
        &self.factory
    }

    pub fn factory_mut(&mut self) -> &mut F {
        &mut self.factory
    }

    /// True while an engine instance is alive
    pub fn has_engine(&self) -> bool {
        self.engine.is_some()
    }

    /// Identity of the live engine, if any
    pub fn engine_id(&self) -> Option<EngineId> {
        self.engine.as_ref().map(|guard| guard.id)
    }

    pub fn ladder(&self) -> &RecoveryLadder {
        &self.ladder
    }

    /// Attach `url` to `element`, detaching anything attached before
    pub fn attach<M: MediaElement>(
        &mut self,
        url: &str,
        kind: ContentKind,
        element: &mut M,
    ) -> Result<SourceMode> {
        self.detach(element);
        self.ladder.reset();

        let plan = plan_attach(
            url,
            kind,
            self.factory.is_supported(),
            element.can_play_type(HLS_MIME_TYPE),
            &self.live_profile,
            &self.on_demand_profile,
        )?;

        match plan.profile {
            Some(profile) => {
                self.last_id += 1;
                let id = EngineId(self.last_id);
                let engine = self.factory.create(id, &profile)?;
                let mut guard = EngineGuard { id, engine };
                guard.load_source(url)?;
                guard.attach_media()?;
                info!(
                    engine = %id,
                    url = %url,
                    kind = %kind,
                    low_latency = profile.low_latency_mode,
                    back_buffer = profile.back_buffer_length,
                    "Adaptive engine attached"
                );
                self.engine = Some(guard);
            }
            None => {
                element.set_source(url);
                info!(url = %url, kind = %kind, format = ?plan.format, "Native source attached");
            }
        }

        Ok(plan.mode)
    }

    /// Destroy the engine and clear the element's source. Idempotent.
    pub fn detach<M: MediaElement>(&mut self, element: &mut M) {
        if let Some(guard) = self.engine.take() {
            debug!(engine = %guard.id, "Adaptive engine destroyed");
        }
        element.clear_source();
    }

    /// Run an engine error through the recovery ladder, issuing the
    /// recovery primitive when one applies
    pub fn handle_error(&mut self, error: &EngineError) -> RecoveryAction {
        let action = self.ladder.classify(error);
        match &action {
            RecoveryAction::Ignore => {
                debug!(kind = ?error.kind, details = %error.details, "Non-fatal engine error");
            }
            RecoveryAction::RestartLoad => {
                warn!(details = %error.details, "Fatal network error, restarting load");
                if let Some(engine) = self.engine.as_mut() {
                    engine.start_load();
                }
            }
            RecoveryAction::RecoverMedia => {
                warn!(details = %error.details, "Fatal media error, recovering");
                if let Some(engine) = self.engine.as_mut() {
                    engine.recover_media_error();
                }
            }
            RecoveryAction::Terminal(fault) => {
                warn!(fault = %fault, "Unrecoverable engine error");
            }
        }
        action
    }

    /// Playback resumed after any earlier recovery
    pub fn playback_resumed(&mut self) {
        self.ladder.playback_resumed();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Error;
    use std::cell::RefCell;
    use std::rc::Rc;

    #[derive(Default)]
    struct Log(Rc<RefCell<Vec<String>>>);

    struct FakeEngine {
        log: Rc<RefCell<Vec<String>>>,
        fail_load: bool,
    }

    impl AdaptiveEngine for FakeEngine {
        fn load_source(&mut self, url: &str) -> Result<()> {
            self.log.borrow_mut().push(format!("load {url}"));
            if self.fail_load {
                return Err(Error::Engine("bad manifest".into()));
            }
            Ok(())
        }
        fn attach_media(&mut self) -> Result<()> {
            self.log.borrow_mut().push("attach".into());
            Ok(())
        }
        fn start_load(&mut self) {
            self.log.borrow_mut().push("start_load".into());
        }
        fn recover_media_error(&mut self) {
            self.log.borrow_mut().push("recover_media".into());
        }
        fn destroy(&mut self) {
            self.log.borrow_mut().push("destroy".into());
        }
    }

    struct FakeFactory {
        supported: bool,
        fail_load: bool,
        log: Rc<RefCell<Vec<String>>>,
        profiles: Vec<EngineProfile>,
    }

    impl EngineFactory for FakeFactory {
        type Engine = FakeEngine;

        fn is_supported(&self) -> bool {
            self.supported
        }

        fn create(&mut self, _id: EngineId, profile: &EngineProfile) -> Result<FakeEngine> {
            self.profiles.push(profile.clone());
            Ok(FakeEngine {
                log: self.log.clone(),
                fail_load: self.fail_load,
            })
        }
    }

    #[derive(Default)]
    struct FakeElement {
        source: Option<String>,
        native_hls: bool,
        clears: u32,
    }

    impl MediaElement for FakeElement {
        fn set_source(&mut self, url: &str) {
            self.source = Some(url.to_string());
        }
        fn clear_source(&mut self) {
            self.source = None;
            self.clears += 1;
        }
        fn can_play_type(&self, mime: &str) -> bool {
            self.native_hls && mime == HLS_MIME_TYPE
        }
        fn play(&mut self) -> Result<()> {
            Ok(())
        }
        fn pause(&mut self) {}
        fn set_current_time(&mut self, _time: f64) {}
        fn set_volume(&mut self, _volume: f64) {}
        fn set_muted(&mut self, _muted: bool) {}
        fn set_playback_rate(&mut self, _rate: f64) {}
        fn set_subtitles_visible(&mut self, _visible: bool) {}
    }

    fn binding(supported: bool) -> (EngineBinding<FakeFactory>, Log) {
        let log = Log::default();
        let factory = FakeFactory {
            supported,
            fail_load: false,
            log: log.0.clone(),
            profiles: Vec::new(),
        };
        (
            EngineBinding::new(factory, 1, EngineProfile::live(), EngineProfile::on_demand()),
            log,
        )
    }

    #[test]
    fn test_live_manifest_uses_low_latency_profile() {
        let (mut binding, log) = binding(true);
        let mut element = FakeElement::default();

        let mode = binding
            .attach("http://p/live/u/p/5.m3u8", ContentKind::Live, &mut element)
            .unwrap();

        assert_eq!(mode, SourceMode::Adaptive);
        let profile = &binding.factory().profiles[0];
        assert!(profile.low_latency_mode);
        assert_eq!(profile.back_buffer_length, 30.0);
        assert_eq!(
            *log.0.borrow(),
            vec!["load http://p/live/u/p/5.m3u8".to_string(), "attach".to_string()]
        );
        assert!(element.source.is_none());
    }

    #[test]
    fn test_movie_manifest_uses_on_demand_profile() {
        let (mut binding, _log) = binding(true);
        let mut element = FakeElement::default();
        binding
            .attach("http://p/movie/u/p/5.m3u8", ContentKind::Movie, &mut element)
            .unwrap();
        let profile = &binding.factory().profiles[0];
        assert!(!profile.low_latency_mode);
        assert!(profile.back_buffer_length > EngineProfile::live().back_buffer_length);
    }

    #[test]
    fn test_progressive_source_bypasses_engine() {
        let (mut binding, log) = binding(true);
        let mut element = FakeElement::default();
        let mode = binding
            .attach("http://p/movie/u/p/5.mkv", ContentKind::Movie, &mut element)
            .unwrap();
        assert_eq!(mode, SourceMode::Native);
        assert_eq!(element.source.as_deref(), Some("http://p/movie/u/p/5.mkv"));
        assert!(!binding.has_engine());
        assert!(log.0.borrow().is_empty());
    }

    #[test]
    fn test_native_hls_fallback_and_unsupported() {
        let (mut binding, _log) = binding(false);
        let mut element = FakeElement { native_hls: true, ..Default::default() };
        let mode = binding
            .attach("http://p/live/u/p/5.m3u8", ContentKind::Live, &mut element)
            .unwrap();
        assert_eq!(mode, SourceMode::Native);

        let mut plain = FakeElement::default();
        let err = binding
            .attach("http://p/live/u/p/5.m3u8", ContentKind::Live, &mut plain)
            .unwrap_err();
        assert!(matches!(err, Error::Fault(StreamFault::Unsupported(_))));
    }

    #[test]
    fn test_detach_is_idempotent_and_destroys_once() {
        let (mut binding, log) = binding(true);
        let mut element = FakeElement::default();
        binding
            .attach("http://p/x.m3u8", ContentKind::Movie, &mut element)
            .unwrap();

        binding.detach(&mut element);
        binding.detach(&mut element);

        let destroys = log.0.borrow().iter().filter(|l| *l == "destroy").count();
        assert_eq!(destroys, 1);
        assert!(!binding.has_engine());
        assert_eq!(element.clears, 3); // attach clears first, then two detaches
    }

    #[test]
    fn test_each_engine_gets_a_fresh_id() {
        let (mut binding, _log) = binding(true);
        let mut element = FakeElement::default();
        assert_eq!(binding.engine_id(), None);

        binding
            .attach("http://p/live/1.m3u8", ContentKind::Live, &mut element)
            .unwrap();
        let first = binding.engine_id().unwrap();
        binding
            .attach("http://p/live/2.m3u8", ContentKind::Live, &mut element)
            .unwrap();
        let second = binding.engine_id().unwrap();
        assert_ne!(first, second);

        binding.detach(&mut element);
        assert_eq!(binding.engine_id(), None);
    }

    #[test]
    fn test_failed_setup_still_destroys_engine() {
        let (mut binding, log) = binding(true);
        binding.factory_mut().fail_load = true;
        let mut element = FakeElement::default();

        assert!(binding
            .attach("http://p/x.m3u8", ContentKind::Movie, &mut element)
            .is_err());
        assert!(!binding.has_engine());
        assert_eq!(log.0.borrow().last().map(String::as_str), Some("destroy"));
    }

    #[test]
    fn test_recovery_ladder_network_once() {
        let (mut binding, log) = binding(true);
        let mut element = FakeElement::default();
        binding
            .attach("http://p/x.m3u8", ContentKind::Live, &mut element)
            .unwrap();

        let err = EngineError::fatal(EngineErrorKind::Network, "fragLoadError");
        assert_eq!(binding.handle_error(&err), RecoveryAction::RestartLoad);
        assert!(matches!(
            binding.handle_error(&err),
            RecoveryAction::Terminal(StreamFault::Unknown(_))
        ));
        let restarts = log.0.borrow().iter().filter(|l| *l == "start_load").count();
        assert_eq!(restarts, 1);
    }

    #[test]
    fn test_recovery_resets_after_playback_resumes() {
        let mut ladder = RecoveryLadder::new(1);
        let err = EngineError::fatal(EngineErrorKind::Media, "bufferStalledError");
        assert_eq!(ladder.classify(&err), RecoveryAction::RecoverMedia);
        ladder.playback_resumed();
        assert_eq!(ladder.classify(&err), RecoveryAction::RecoverMedia);
    }

    #[test]
    fn test_non_fatal_and_unknown_errors() {
        let mut ladder = RecoveryLadder::new(1);
        let transient = EngineError::non_fatal(EngineErrorKind::Network, "levelLoadTimeOut");
        assert_eq!(ladder.classify(&transient), RecoveryAction::Ignore);
        assert_eq!(ladder.attempts(), (0, 0));

        let mux = EngineError::fatal(EngineErrorKind::from_type("muxError"), "fragParsingError");
        assert_eq!(
            ladder.classify(&mux),
            RecoveryAction::Terminal(StreamFault::Unknown("muxError: fragParsingError".into()))
        );
    }
}
