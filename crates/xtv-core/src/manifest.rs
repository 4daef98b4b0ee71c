//! Stream format detection

use serde::{Deserialize, Serialize};

/// MIME type an element reports for native HLS support
pub const HLS_MIME_TYPE: &str = "application/vnd.apple.mpegurl";

/// Stream formats the player distinguishes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StreamFormat {
    /// Segmented HLS manifest, needs the adaptive engine or native HLS
    Hls,
    /// Single progressive file (mp4, mkv, ts, ...)
    Progressive,
}

impl StreamFormat {
    pub fn is_adaptive(&self) -> bool {
        matches!(self, StreamFormat::Hls)
    }
}

/// Path component of a URL, without query string or fragment.
///
/// Works on relative URLs too, which the browser host may hand us.
fn url_path(url: &str) -> &str {
    let end = url.find(['?', '#']).unwrap_or(url.len());
    &url[..end]
}

/// Lowercased file extension of the URL's last path segment
pub fn extension(url: &str) -> Option<String> {
    let path = url_path(url);
    let file = path.rsplit('/').next().unwrap_or(path);
    let (_, ext) = file.rsplit_once('.')?;
    if ext.is_empty() {
        return None;
    }
    Some(ext.to_ascii_lowercase())
}

/// Detect stream format from URL extension
pub fn detect_stream_format(url: &str) -> StreamFormat {
    match extension(url).as_deref() {
        Some("m3u8") => StreamFormat::Hls,
        _ => StreamFormat::Progressive,
    }
}
