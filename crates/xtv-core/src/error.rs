//! Error types for xtv Core

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type alias for player operations
pub type Result<T> = std::result::Result<T, Error>;

/// Classified stream fault, produced by the engine binding and consumed by
/// the recovery ladder
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "detail", rename_all = "lowercase")]
pub enum StreamFault {
    /// Segment or manifest transfer failed
    #[error("Network error: {0}")]
    Network(String),

    /// Decoder or demuxer failed
    #[error("Media error: {0}")]
    Media(String),

    /// Neither the adaptive engine nor the element can play this source
    #[error("Unsupported stream: {0}")]
    Unsupported(String),

    /// Unclassified fatal error
    #[error("Playback error: {0}")]
    Unknown(String),
}

impl StreamFault {
    /// Human-readable detail carried by the fault
    pub fn detail(&self) -> &str {
        match self {
            StreamFault::Network(d)
            | StreamFault::Media(d)
            | StreamFault::Unsupported(d)
            | StreamFault::Unknown(d) => d,
        }
    }

    /// Returns true if the engine has a recovery primitive for this fault
    pub fn is_recoverable(&self) -> bool {
        matches!(self, StreamFault::Network(_) | StreamFault::Media(_))
    }

    /// Returns the fault code for logs and the UI
    pub fn code(&self) -> &'static str {
        match self {
            StreamFault::Network(_) => "NETWORK",
            StreamFault::Media(_) => "MEDIA",
            StreamFault::Unsupported(_) => "UNSUPPORTED",
            StreamFault::Unknown(_) => "UNKNOWN",
        }
    }
}

/// Player error types
#[derive(Error, Debug)]
pub enum Error {
    // Playback errors
    #[error(transparent)]
    Fault(#[from] StreamFault),

    #[error("Invalid stream URL: {0:?}")]
    InvalidStreamUrl(String),

    #[error("Invalid playback state transition: {from} -> {to}")]
    InvalidStateTransition { from: String, to: String },

    #[error("Player is not mounted")]
    NotMounted,

    #[error("Fullscreen request failed: {0}")]
    Fullscreen(String),

    // Engine errors
    #[error("Adaptive engine failed to start: {0}")]
    Engine(String),

    // Resolver errors
    #[error("Stream could not be resolved: {0}")]
    Resolver(String),

    #[cfg(feature = "resolver")]
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Invalid URL: {0}")]
    Url(#[from] url::ParseError),

    // Configuration errors
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Returns true if this error is recoverable
    pub fn is_recoverable(&self) -> bool {
        match self {
            Error::Fault(fault) => fault.is_recoverable(),
            #[cfg(feature = "resolver")]
            Error::Network(_) => true,
            _ => false,
        }
    }

    /// Returns the error code for logs and the UI
    pub fn error_code(&self) -> &'static str {
        match self {
            Error::Fault(fault) => fault.code(),
            Error::InvalidStreamUrl(_) => "INVALID_STREAM_URL",
            Error::InvalidStateTransition { .. } => "INVALID_STATE",
            Error::NotMounted => "NOT_MOUNTED",
            Error::Fullscreen(_) => "FULLSCREEN",
            Error::Engine(_) => "ENGINE",
            Error::Resolver(_) => "RESOLVER",
            #[cfg(feature = "resolver")]
            Error::Network(_) => "HTTP",
            Error::Url(_) => "URL",
            Error::InvalidConfig(_) => "INVALID_CONFIG",
            Error::Json(_) => "JSON",
            Error::Io(_) => "IO",
        }
    }
}
