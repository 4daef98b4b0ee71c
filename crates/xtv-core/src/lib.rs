//! xtv Core - Adaptive Stream Playback Controller
//!
//! This crate provides the playback core of the xtv IPTV client:
//! - Adaptive engine binding with a bounded recovery ladder
//! - Playback state machine mirrored from native media events
//! - Seek-bar scrub reconciliation
//! - Auto-hiding controls
//! - Per-content-kind controls (live, movie, episode)
//! - Keyboard shortcuts and fullscreen coordination
//! - Stream Source Resolver client (optional)
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                           xtv Core                              │
//! ├─────────────────────────────────────────────────────────────────┤
//! │                                                                 │
//! │   media events      engine events       input / commands        │
//! │        │                  │                     │               │
//! │        └──────────────────┼─────────────────────┘               │
//! │                           │                                     │
//! │                    ┌──────┴──────┐                              │
//! │                    │   Player    │──── snapshots (watch)        │
//! │                    │ Controller  │──── intents (mpsc)           │
//! │                    └──────┬──────┘                              │
//! │                           │                                     │
//! │  ┌──────────────┐  ┌──────┴───────┐  ┌──────────────┐           │
//! │  │   Engine     │  │  Playback    │  │  Controls /  │           │
//! │  │   Binding    │  │  Machine     │  │  Scrub       │           │
//! │  └──────────────┘  └──────────────┘  └──────────────┘           │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The `<video>` element, its fullscreen container and the adaptive engine
//! are traits; `xtv-wasm` implements them for the browser and
//! [`headless`] implements them for tools and tests.

pub mod adapter;
pub mod config;
pub mod controller;
pub mod controls;
pub mod element;
pub mod engine;
pub mod error;
pub mod headless;
pub mod keyboard;
pub mod manifest;
pub mod playback;
#[cfg(feature = "resolver")]
pub mod resolver;
#[cfg(feature = "runtime")]
pub mod runtime;
pub mod scrub;
pub mod types;

pub use adapter::{controls_for, Affordances, ContentControls};
pub use config::PlayerConfig;
pub use controller::{Command, InputEvent, PlayerController, PlayerEvent};
pub use controls::{ControlsVisibility, Visibility};
pub use element::{FullscreenTarget, MediaElement, MediaErrorCode};
pub use engine::{
    plan_attach, AdaptiveEngine, AttachPlan, EngineBinding, EngineError, EngineErrorKind,
    EngineEvent, EngineFactory, EngineId, EngineProfile, RecoveryAction, RecoveryLadder,
};
pub use error::{Error, Result, StreamFault};
pub use keyboard::{Key, KeyBindings};
pub use manifest::{detect_stream_format, StreamFormat};
pub use playback::{MediaEvent, PlaybackMachine};
#[cfg(feature = "resolver")]
pub use resolver::{HttpStreamResolver, ResolvedStream, StreamRequest, StreamResolver};
#[cfg(feature = "runtime")]
pub use runtime::{spawn_player, PlayerHandle};
pub use scrub::ScrubState;
pub use types::*;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Initialize the player library
pub fn init() {
    tracing::info!(version = VERSION, "xtv core initialized");
}
