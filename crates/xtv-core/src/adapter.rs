//! Content-type control adapter
//!
//! Each content kind decides which affordances the chrome shows and what
//! happens at end of stream, so the controller never branches on kind.

use crate::{ContentKind, EpisodeContext, EpisodeDirection, PlayerIntent};
use serde::{Deserialize, Serialize};

/// Type-specific controls the view renders
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Affordances {
    /// Non-interactive "LIVE" indicator
    pub live_badge: bool,
    /// Seek bar and time display
    pub seekable: bool,
    pub subtitle_toggle: bool,
    /// Target of the previous-episode button, when it is enabled
    pub previous_episode: Option<String>,
    /// Target of the next-episode button, when it is enabled
    pub next_episode: Option<String>,
    /// Season/episode label such as "S01E04"
    pub episode_label: Option<String>,
}

pub trait ContentControls: Send {
    fn kind(&self) -> ContentKind;

    fn affordances(&self) -> Affordances;

    /// Intent to emit when the stream ends
    fn on_ended(&self, _auto_advance: bool) -> Option<PlayerIntent> {
        None
    }

    /// Intent for a previous/next button press
    fn navigate(&self, _direction: EpisodeDirection) -> Option<PlayerIntent> {
        None
    }
}

struct LiveControls;

impl ContentControls for LiveControls {
    fn kind(&self) -> ContentKind {
        ContentKind::Live
    }

    fn affordances(&self) -> Affordances {
        Affordances {
            live_badge: true,
            ..Default::default()
        }
    }
}

struct MovieControls;

impl ContentControls for MovieControls {
    fn kind(&self) -> ContentKind {
        ContentKind::Movie
    }

    fn affordances(&self) -> Affordances {
        Affordances {
            seekable: true,
            subtitle_toggle: true,
            ..Default::default()
        }
    }
}

struct EpisodeControls {
    context: EpisodeContext,
}

impl ContentControls for EpisodeControls {
    fn kind(&self) -> ContentKind {
        ContentKind::Episode
    }

    fn affordances(&self) -> Affordances {
        Affordances {
            seekable: true,
            previous_episode: self.context.prev_episode_id.clone(),
            next_episode: self.context.next_episode_id.clone(),
            episode_label: self.context.label(),
            ..Default::default()
        }
    }

    fn on_ended(&self, auto_advance: bool) -> Option<PlayerIntent> {
        if !auto_advance {
            return None;
        }
        let episode_id = self.context.next_episode_id.clone()?;
        Some(PlayerIntent::AdvanceTo { episode_id })
    }

    fn navigate(&self, direction: EpisodeDirection) -> Option<PlayerIntent> {
        let target = match direction {
            EpisodeDirection::Previous => &self.context.prev_episode_id,
            EpisodeDirection::Next => &self.context.next_episode_id,
        };
        target.clone().map(|episode_id| PlayerIntent::NavigateEpisode {
            episode_id,
            direction,
        })
    }
}

/// Controls for a content kind. Episodes without context get an empty one,
/// which disables navigation.
pub fn controls_for(
    kind: ContentKind,
    episode: Option<&EpisodeContext>,
) -> Box<dyn ContentControls> {
    match kind {
        ContentKind::Live => Box::new(LiveControls),
        ContentKind::Movie => Box::new(MovieControls),
        ContentKind::Episode => Box::new(EpisodeControls {
            context: episode.cloned().unwrap_or_default(),
        }),
    }
}
