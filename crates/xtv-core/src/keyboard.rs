//! Keyboard shortcuts

use crate::controller::Command;
use serde::{Deserialize, Serialize};

/// Keys the player reacts to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Key {
    Space,
    K,
    M,
    F,
    ArrowLeft,
    ArrowRight,
    ArrowUp,
    ArrowDown,
    Escape,
}

impl Key {
    /// Parse a DOM `KeyboardEvent.key` value
    pub fn from_dom(key: &str) -> Option<Key> {
        match key {
            " " | "Spacebar" => Some(Key::Space),
            "k" | "K" => Some(Key::K),
            "m" | "M" => Some(Key::M),
            "f" | "F" => Some(Key::F),
            "ArrowLeft" | "Left" => Some(Key::ArrowLeft),
            "ArrowRight" | "Right" => Some(Key::ArrowRight),
            "ArrowUp" | "Up" => Some(Key::ArrowUp),
            "ArrowDown" | "Down" => Some(Key::ArrowDown),
            "Escape" | "Esc" => Some(Key::Escape),
            _ => None,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Key::Space => "Space",
            Key::K => "K",
            Key::M => "M",
            Key::F => "F",
            Key::ArrowLeft => "Left",
            Key::ArrowRight => "Right",
            Key::ArrowUp => "Up",
            Key::ArrowDown => "Down",
            Key::Escape => "Esc",
        }
    }

    pub const ALL: [Key; 9] = [
        Key::Space,
        Key::K,
        Key::M,
        Key::F,
        Key::ArrowLeft,
        Key::ArrowRight,
        Key::ArrowUp,
        Key::ArrowDown,
        Key::Escape,
    ];
}

/// Maps keys to player commands
#[derive(Debug, Clone, PartialEq)]
pub struct KeyBindings {
    /// Seconds per arrow press
    pub seek_step: f64,
    /// Volume change per arrow press
    pub volume_step: f64,
}

impl Default for KeyBindings {
    fn default() -> Self {
        Self {
            seek_step: 10.0,
            volume_step: 0.1,
        }
    }
}

impl KeyBindings {
    pub fn new(seek_step: f64, volume_step: f64) -> Self {
        Self { seek_step, volume_step }
    }

    /// Command for a key press. Escape only maps while fullscreen so the
    /// host can leave it to the page otherwise.
    pub fn command_for(&self, key: Key, fullscreen: bool) -> Option<Command> {
        match key {
            Key::Space | Key::K => Some(Command::TogglePlay),
            Key::M => Some(Command::ToggleMute),
            Key::F => Some(Command::ToggleFullscreen),
            Key::ArrowLeft => Some(Command::SeekBy { delta: -self.seek_step }),
            Key::ArrowRight => Some(Command::SeekBy { delta: self.seek_step }),
            Key::ArrowUp => Some(Command::AdjustVolume { delta: self.volume_step }),
            Key::ArrowDown => Some(Command::AdjustVolume { delta: -self.volume_step }),
            Key::Escape if fullscreen => Some(Command::ExitFullscreen),
            Key::Escape => None,
        }
    }

    /// Human-readable description of what a key does
    pub fn describe(&self, key: Key) -> String {
        match key {
            Key::Space | Key::K => "Play / pause".to_string(),
            Key::M => "Mute / unmute".to_string(),
            Key::F => "Toggle fullscreen".to_string(),
            Key::ArrowLeft => format!("Seek back {}s", self.seek_step),
            Key::ArrowRight => format!("Seek forward {}s", self.seek_step),
            Key::ArrowUp => format!("Volume +{}", self.volume_step),
            Key::ArrowDown => format!("Volume -{}", self.volume_step),
            Key::Escape => "Exit fullscreen".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dom_keys() {
        assert_eq!(Key::from_dom(" "), Some(Key::Space));
        assert_eq!(Key::from_dom("K"), Some(Key::K));
        assert_eq!(Key::from_dom("ArrowLeft"), Some(Key::ArrowLeft));
        assert_eq!(Key::from_dom("Enter"), None);
    }

    #[test]
    fn test_bindings() {
        let bindings = KeyBindings::default();
        assert_eq!(bindings.command_for(Key::K, false), Some(Command::TogglePlay));
        assert_eq!(
            bindings.command_for(Key::ArrowLeft, false),
            Some(Command::SeekBy { delta: -10.0 })
        );
        assert_eq!(
            bindings.command_for(Key::ArrowDown, false),
            Some(Command::AdjustVolume { delta: -0.1 })
        );
    }

    #[test]
    fn test_escape_only_in_fullscreen() {
        let bindings = KeyBindings::default();
        assert_eq!(bindings.command_for(Key::Escape, false), None);
        assert_eq!(
            bindings.command_for(Key::Escape, true),
            Some(Command::ExitFullscreen)
        );
    }
}
