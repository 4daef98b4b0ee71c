//! xtv WASM - browser host for the xtv playback core
//!
//! Binds a page's `<video>` element, its player container and hls.js to
//! the core [`PlayerController`](xtv_core::PlayerController):
//! - DOM media events, pointer and keyboard input become controller events
//! - The controller's next deadline is armed as a single `setTimeout`
//! - Snapshots and navigation intents are handed back through callbacks
//!
//! ## Integration
//!
//! ```javascript
//! import Hls from 'hls.js';
//! import init, { XtvPlayer } from '@xtv/wasm';
//!
//! window.Hls = Hls;
//! await init();
//! const player = new XtvPlayer(video, container, null);
//! player.onState(render);
//! player.load({ streamUrl, streamType: 'movie' });
//! ```

use wasm_bindgen::prelude::*;

mod dom;
mod element;
mod hls;
mod player;

pub use player::XtvPlayer;

/// Initialize the WASM module
#[wasm_bindgen(start)]
pub fn init() {
    console_error_panic_hook::set_once();
    web_sys::console::log_1(&format!("[xtv WASM] Initialized v{}", xtv_core::VERSION).into());
}

/// Library version
#[wasm_bindgen]
pub fn version() -> String {
    env!("CARGO_PKG_VERSION").to_string()
}

/// Whether hls.js is loaded and the browser has Media Source Extensions
#[wasm_bindgen(js_name = adaptiveSupported)]
pub fn adaptive_supported() -> bool {
    hls::supported()
}
