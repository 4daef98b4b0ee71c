//! Host surfaces the controller drives: the media element and the player
//! container that goes fullscreen.

use crate::{Result, StreamFault};
use serde::{Deserialize, Serialize};

/// Imperative surface of a `<video>` element (or a native equivalent).
///
/// Every method is a request; the resulting state comes back as media
/// events. Implementations must not call back into the controller.
pub trait MediaElement {
    /// Assign a URL as the element's native source and begin loading
    fn set_source(&mut self, url: &str);

    /// Remove the source and release the element's decoder resources
    fn clear_source(&mut self);

    /// Whether the element can natively play the given MIME type
    fn can_play_type(&self, mime: &str) -> bool;

    /// Request playback. An `Err` means the platform rejected the request
    /// outright (autoplay policy); asynchronous rejections are the host's
    /// to log.
    fn play(&mut self) -> Result<()>;

    fn pause(&mut self);

    /// Move the playhead, in seconds
    fn set_current_time(&mut self, time: f64);

    fn set_volume(&mut self, volume: f64);

    fn set_muted(&mut self, muted: bool);

    fn set_playback_rate(&mut self, rate: f64);

    /// Show or hide the active subtitle track
    fn set_subtitles_visible(&mut self, visible: bool);
}

/// Element that hosts the custom chrome and is put into fullscreen
pub trait FullscreenTarget {
    /// Ask the platform for fullscreen; completion is reported through a
    /// fullscreen-change event
    fn request_fullscreen(&mut self) -> Result<()>;

    fn exit_fullscreen(&mut self) -> Result<()>;
}

/// `MediaError.code` values of an HTML media element
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum MediaErrorCode {
    Aborted,
    Network,
    Decode,
    SrcNotSupported,
    Unknown,
}

impl MediaErrorCode {
    /// Map the numeric DOM code
    pub fn from_code(code: u16) -> Self {
        match code {
            1 => MediaErrorCode::Aborted,
            2 => MediaErrorCode::Network,
            3 => MediaErrorCode::Decode,
            4 => MediaErrorCode::SrcNotSupported,
            _ => MediaErrorCode::Unknown,
        }
    }

    /// Classify a native element error
    pub fn into_fault(self, message: impl Into<String>) -> StreamFault {
        let message = message.into();
        match self {
            MediaErrorCode::Network => StreamFault::Network(message),
            MediaErrorCode::Decode => StreamFault::Media(message),
            MediaErrorCode::SrcNotSupported => StreamFault::Unsupported(message),
            MediaErrorCode::Aborted | MediaErrorCode::Unknown => StreamFault::Unknown(message),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_media_error_classification() {
        assert_eq!(
            MediaErrorCode::from_code(2).into_fault("net"),
            StreamFault::Network("net".into())
        );
        assert_eq!(
            MediaErrorCode::from_code(3).into_fault("dec"),
            StreamFault::Media("dec".into())
        );
        assert_eq!(
            MediaErrorCode::from_code(4).into_fault("src"),
            StreamFault::Unsupported("src".into())
        );
        assert_eq!(
            MediaErrorCode::from_code(9).into_fault("?"),
            StreamFault::Unknown("?".into())
        );
    }
}
