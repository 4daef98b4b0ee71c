//! `<video>` and fullscreen container adapters

use wasm_bindgen_futures::JsFuture;
use web_sys::{HtmlElement, HtmlVideoElement, TextTrackMode};
use xtv_core::{Error, FullscreenTarget, MediaElement, MediaErrorCode, MediaEvent, Result};

use crate::dom;

/// Media element events forwarded to the controller
pub const MEDIA_EVENTS: &[&str] = &[
    "loadedmetadata",
    "durationchange",
    "play",
    "pause",
    "playing",
    "waiting",
    "timeupdate",
    "progress",
    "seeking",
    "seeked",
    "ended",
    "volumechange",
    "ratechange",
    "error",
];

/// The page's `<video>` element
pub struct WebMediaElement {
    video: HtmlVideoElement,
}

impl WebMediaElement {
    pub fn new(video: HtmlVideoElement) -> Self {
        Self { video }
    }

    pub fn video(&self) -> &HtmlVideoElement {
        &self.video
    }
}

impl MediaElement for WebMediaElement {
    fn set_source(&mut self, url: &str) {
        self.video.set_src(url);
    }

    fn clear_source(&mut self) {
        let _ = self.video.remove_attribute("src");
        self.video.load();
    }

    fn can_play_type(&self, mime: &str) -> bool {
        !self.video.can_play_type(mime).is_empty()
    }

    fn play(&mut self) -> Result<()> {
        let promise = self
            .video
            .play()
            .map_err(|e| Error::Engine(format!("play() threw: {e:?}")))?;
        // Autoplay policy rejections arrive here; the element stays paused
        // and the pause state is already what the view shows.
        wasm_bindgen_futures::spawn_local(async move {
            if let Err(e) = JsFuture::from(promise).await {
                dom::warn(&format!("play() rejected: {e:?}"));
            }
        });
        Ok(())
    }

    fn pause(&mut self) {
        if let Err(e) = self.video.pause() {
            dom::warn(&format!("pause() threw: {e:?}"));
        }
    }

    fn set_current_time(&mut self, time: f64) {
        self.video.set_current_time(time);
    }

    fn set_volume(&mut self, volume: f64) {
        self.video.set_volume(volume);
    }

    fn set_muted(&mut self, muted: bool) {
        self.video.set_muted(muted);
    }

    fn set_playback_rate(&mut self, rate: f64) {
        self.video.set_playback_rate(rate);
    }

    fn set_subtitles_visible(&mut self, visible: bool) {
        let Some(tracks) = self.video.text_tracks() else {
            return;
        };
        let mode = if visible {
            TextTrackMode::Showing
        } else {
            TextTrackMode::Hidden
        };
        for index in 0..tracks.length() {
            if let Some(track) = tracks.get(index) {
                track.set_mode(mode);
            }
        }
    }
}

/// Finite, positive duration; live and unknown lengths read as NaN or +inf
fn finite_duration(value: f64) -> Option<f64> {
    (value.is_finite() && value > 0.0).then_some(value)
}

/// End of the buffered range holding the playhead, or of the last range
fn buffered_end(video: &HtmlVideoElement) -> f64 {
    let ranges = video.buffered();
    let position = video.current_time();
    let mut last = 0.0;
    for index in 0..ranges.length() {
        let (Ok(start), Ok(end)) = (ranges.start(index), ranges.end(index)) else {
            continue;
        };
        if start <= position && position <= end {
            return end;
        }
        last = end;
    }
    last
}

/// Read a DOM media event off the element
pub fn media_event(kind: &str, video: &HtmlVideoElement) -> Option<MediaEvent> {
    let event = match kind {
        "loadedmetadata" => MediaEvent::LoadedMetadata {
            duration: finite_duration(video.duration()),
        },
        "durationchange" => MediaEvent::DurationChange {
            duration: finite_duration(video.duration()),
        },
        "play" => MediaEvent::Play,
        "pause" => MediaEvent::Pause,
        "playing" => MediaEvent::Playing,
        "waiting" => MediaEvent::Waiting,
        "timeupdate" => MediaEvent::TimeUpdate {
            current_time: video.current_time(),
        },
        "progress" => MediaEvent::Progress {
            buffered_end: buffered_end(video),
        },
        "seeking" => MediaEvent::Seeking,
        "seeked" => MediaEvent::Seeked,
        "ended" => MediaEvent::Ended,
        "volumechange" => MediaEvent::VolumeChange {
            volume: video.volume(),
            muted: video.muted(),
        },
        "ratechange" => MediaEvent::RateChange {
            rate: video.playback_rate(),
        },
        "error" => {
            let (code, message) = video
                .error()
                .map(|e| (e.code(), e.message()))
                .unwrap_or((0, String::new()));
            MediaEvent::Error {
                code: MediaErrorCode::from_code(code),
                message,
            }
        }
        _ => return None,
    };
    Some(event)
}

/// Element that goes fullscreen with the player chrome
pub struct WebContainer {
    element: HtmlElement,
}

impl WebContainer {
    pub fn new(element: HtmlElement) -> Self {
        Self { element }
    }

    /// Whether the document's fullscreen element is this container
    pub fn is_fullscreen(&self) -> bool {
        web_sys::window()
            .and_then(|w| w.document())
            .and_then(|d| d.fullscreen_element())
            .is_some_and(|e| AsRef::<web_sys::Element>::as_ref(&self.element) == &e)
    }
}

impl FullscreenTarget for WebContainer {
    fn request_fullscreen(&mut self) -> Result<()> {
        self.element
            .request_fullscreen()
            .map_err(|e| Error::Fullscreen(format!("{e:?}")))
    }

    fn exit_fullscreen(&mut self) -> Result<()> {
        let document = web_sys::window()
            .and_then(|w| w.document())
            .ok_or_else(|| Error::Fullscreen("no document".to_string()))?;
        document.exit_fullscreen();
        Ok(())
    }
}
