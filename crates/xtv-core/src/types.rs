//! Core types for xtv

use crate::{adapter::Affordances, Error, Result, StreamFault};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

/// Unique identifier for a playback session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionId(pub Uuid);

impl SessionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Kind of content being played; decides engine profile and controls
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentKind {
    /// Live channel
    Live,
    /// On-demand movie
    Movie,
    /// Series episode
    Episode,
}

impl ContentKind {
    pub fn is_live(&self) -> bool {
        matches!(self, ContentKind::Live)
    }
}

impl std::fmt::Display for ContentKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ContentKind::Live => write!(f, "live"),
            ContentKind::Movie => write!(f, "movie"),
            ContentKind::Episode => write!(f, "episode"),
        }
    }
}

impl std::str::FromStr for ContentKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "live" => Ok(ContentKind::Live),
            "movie" | "vod" => Ok(ContentKind::Movie),
            "episode" | "series" => Ok(ContentKind::Episode),
            other => Err(Error::InvalidConfig(format!("unknown content kind: {other}"))),
        }
    }
}

/// How the current source is fed to the element
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceMode {
    /// Adaptive engine feeds the element from a segmented manifest
    Adaptive,
    /// URL assigned directly as the element's source
    Native,
}

/// One playback of one stream URL, owned by the controller
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlaybackSession {
    pub id: SessionId,
    pub stream_url: String,
    pub content_kind: ContentKind,
    pub source_mode: SourceMode,
    pub started_at: DateTime<Utc>,
}

/// Player state machine states
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlayerPhase {
    /// No session attached
    Idle,
    /// Source assigned, metadata not yet known
    Loading,
    /// Metadata known, playback not started
    Ready,
    /// Content is playing
    Playing,
    /// Playback paused
    Paused,
    /// End of stream reached
    Ended,
    /// Terminal fault for this session
    Error,
}

impl PlayerPhase {
    /// Check if transition to target state is valid
    pub fn can_transition_to(&self, target: PlayerPhase) -> bool {
        use PlayerPhase::*;
        matches!(
            (self, target),
            // From Idle
            (Idle, Loading) |
            // From Loading
            (Loading, Ready) | (Loading, Playing) | (Loading, Paused) | (Loading, Error) |
            // From Ready
            (Ready, Playing) | (Ready, Paused) | (Ready, Error) |
            // From Playing
            (Playing, Paused) | (Playing, Ended) | (Playing, Error) |
            // From Paused
            (Paused, Playing) | (Paused, Ended) | (Paused, Error) |
            // From Ended
            (Ended, Playing) | (Ended, Paused) | (Ended, Error) |
            // From Error
            (Error, Loading)
        ) || (target == Idle && *self != Idle)
    }

    /// True once the session has a terminal fault
    pub fn is_terminal(&self) -> bool {
        matches!(self, PlayerPhase::Error)
    }
}

impl std::fmt::Display for PlayerPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PlayerPhase::Idle => write!(f, "idle"),
            PlayerPhase::Loading => write!(f, "loading"),
            PlayerPhase::Ready => write!(f, "ready"),
            PlayerPhase::Playing => write!(f, "playing"),
            PlayerPhase::Paused => write!(f, "paused"),
            PlayerPhase::Ended => write!(f, "ended"),
            PlayerPhase::Error => write!(f, "error"),
        }
    }
}

/// Mirror of the element's playback properties
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlaybackState {
    pub is_playing: bool,
    /// Position in seconds
    pub current_time: f64,
    /// Duration in seconds, `None` until known or for live streams
    pub duration: Option<f64>,
    /// End of the buffered range containing the playhead, in seconds
    pub buffered_end: f64,
    /// Volume in [0, 1]
    pub volume: f64,
    pub is_muted: bool,
    pub playback_rate: f64,
    /// Orthogonal to playing/paused
    pub is_buffering: bool,
}

impl Default for PlaybackState {
    fn default() -> Self {
        Self {
            is_playing: false,
            current_time: 0.0,
            duration: None,
            buffered_end: 0.0,
            volume: 1.0,
            is_muted: false,
            playback_rate: 1.0,
            is_buffering: false,
        }
    }
}

impl PlaybackState {
    /// Clamp a position to the known duration
    pub fn clamp_time(&self, time: f64) -> f64 {
        let time = if time.is_finite() { time.max(0.0) } else { 0.0 };
        match self.duration {
            Some(duration) => time.min(duration),
            None => time,
        }
    }

    /// Buffered fraction of the known duration, for the seek bar
    pub fn buffered_fraction(&self) -> f64 {
        match self.duration {
            Some(d) if d > 0.0 => (self.buffered_end / d).clamp(0.0, 1.0),
            _ => 0.0,
        }
    }
}

/// Series context for an episode; read-only for the controller
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EpisodeContext {
    pub season_number: Option<u32>,
    pub episode_number: Option<u32>,
    pub next_episode_id: Option<String>,
    pub prev_episode_id: Option<String>,
    pub total_episodes: Option<u32>,
}

impl EpisodeContext {
    /// "S01E04" style label, if season and episode numbers are known
    pub fn label(&self) -> Option<String> {
        match (self.season_number, self.episode_number) {
            (Some(s), Some(e)) => Some(format!("S{s:02}E{e:02}")),
            (None, Some(e)) => Some(format!("E{e:02}")),
            _ => None,
        }
    }
}

/// Descriptive metadata returned by the stream resolver.
///
/// Panels are inconsistent about number vs. string fields, so everything
/// scalar is kept as a string.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StreamInfo {
    #[serde(default, deserialize_with = "lenient_string")]
    pub title: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub description: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub genre: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub duration: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub year: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub director: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub cast: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub channel: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub rating: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub season_number: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub episode_number: Option<String>,
    #[serde(flatten)]
    pub extra: HashMap<String, serde_json::Value>,
}

fn lenient_string<'de, D>(deserializer: D) -> std::result::Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(serde_json::Value::String(s)) if !s.trim().is_empty() => Some(s),
        Some(serde_json::Value::Number(n)) => Some(n.to_string()),
        Some(serde_json::Value::Bool(b)) => Some(b.to_string()),
        _ => None,
    })
}

/// What a hosting page hands the player
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlaybackRequest {
    pub stream_url: String,
    pub stream_type: ContentKind,
    #[serde(default)]
    pub stream_info: Option<StreamInfo>,
    #[serde(default)]
    pub episode_data: Option<EpisodeContext>,
}

impl PlaybackRequest {
    pub fn new(stream_url: impl Into<String>, stream_type: ContentKind) -> Self {
        Self {
            stream_url: stream_url.into(),
            stream_type,
            stream_info: None,
            episode_data: None,
        }
    }

    pub fn with_info(mut self, info: StreamInfo) -> Self {
        self.stream_info = Some(info);
        self
    }

    pub fn with_episode(mut self, episode: EpisodeContext) -> Self {
        self.episode_data = Some(episode);
        self
    }

    /// The player requires a non-empty stream URL
    pub fn validate(&self) -> Result<()> {
        if self.stream_url.trim().is_empty() {
            return Err(Error::InvalidStreamUrl(self.stream_url.clone()));
        }
        Ok(())
    }
}

/// Direction of episode navigation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EpisodeDirection {
    Previous,
    Next,
}

/// Signals handed back to the hosting page
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum PlayerIntent {
    /// User asked to leave the player
    Back,
    /// Episode ended and the next one should be resolved and played
    #[serde(rename_all = "camelCase")]
    AdvanceTo { episode_id: String },
    /// User picked the previous/next episode
    #[serde(rename_all = "camelCase")]
    NavigateEpisode {
        episode_id: String,
        direction: EpisodeDirection,
    },
}

/// Everything a view needs to render the player, published on every change
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerSnapshot {
    pub session_id: Option<SessionId>,
    pub phase: PlayerPhase,
    pub playback: PlaybackState,
    /// Position the seek bar and clock show; follows the drag while scrubbing
    pub display_time: f64,
    pub scrubbing: bool,
    pub controls_visible: bool,
    pub fullscreen: bool,
    pub subtitles_enabled: bool,
    pub fault: Option<StreamFault>,
    pub affordances: Affordances,
}

impl Default for PlayerSnapshot {
    fn default() -> Self {
        Self {
            session_id: None,
            phase: PlayerPhase::Idle,
            playback: PlaybackState::default(),
            display_time: 0.0,
            scrubbing: false,
            controls_visible: true,
            fullscreen: false,
            subtitles_enabled: false,
            fault: None,
            affordances: Affordances::default(),
        }
    }
}
