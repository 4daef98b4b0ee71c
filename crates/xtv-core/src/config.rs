//! Player configuration

use crate::{engine::EngineProfile, keyboard::KeyBindings, Error, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Player configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct PlayerConfig {
    /// Inactivity before the chrome hides while playing (milliseconds)
    pub hide_controls_after_ms: u64,
    /// Seconds per seek shortcut
    pub seek_step: f64,
    /// Volume change per volume shortcut
    pub volume_step: f64,
    /// Automated recoveries per fault kind before a fault is terminal
    pub max_recoveries_per_kind: u32,
    /// Start playback as soon as the source is ready
    pub autoplay: bool,
    /// Signal the next episode when an episode ends
    pub auto_advance: bool,
    /// Move the element's playhead while dragging the seek bar
    pub scrub_preview: bool,
    /// Engine profile for live channels
    pub live_profile: EngineProfile,
    /// Engine profile for movies and episodes
    pub on_demand_profile: EngineProfile,
}

impl Default for PlayerConfig {
    fn default() -> Self {
        Self {
            hide_controls_after_ms: 3000,
            seek_step: 10.0,
            volume_step: 0.1,
            max_recoveries_per_kind: 1,
            autoplay: true,
            auto_advance: true,
            scrub_preview: false,
            live_profile: EngineProfile::live(),
            on_demand_profile: EngineProfile::on_demand(),
        }
    }
}

impl PlayerConfig {
    /// Parse from JSON; missing fields take their defaults
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_json_str(&content)
    }

    pub fn validate(&self) -> Result<()> {
        if self.hide_controls_after_ms == 0 {
            return Err(Error::InvalidConfig(
                "hideControlsAfterMs must be positive".to_string(),
            ));
        }
        if !(self.seek_step.is_finite() && self.seek_step > 0.0) {
            return Err(Error::InvalidConfig("seekStep must be positive".to_string()));
        }
        if !(self.volume_step > 0.0 && self.volume_step <= 1.0) {
            return Err(Error::InvalidConfig(
                "volumeStep must be within (0, 1]".to_string(),
            ));
        }
        Ok(())
    }

    pub fn hide_controls_after(&self) -> Duration {
        Duration::from_millis(self.hide_controls_after_ms)
    }

    pub fn key_bindings(&self) -> KeyBindings {
        KeyBindings::new(self.seek_step, self.volume_step)
    }
}
