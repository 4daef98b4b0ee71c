//! hls.js as the adaptive engine
//!
//! Engine callbacks only queue events; the dispatcher drains them once the
//! callback has returned, so a callback never observes its own engine being
//! destroyed. Every event carries the instance's [`EngineId`], and the
//! controller drops those from an instance it has since replaced.

use std::rc::Weak;

use serde::Serialize;
use wasm_bindgen::prelude::*;
use wasm_bindgen::JsCast;
use web_sys::HtmlVideoElement;
use xtv_core::{
    AdaptiveEngine, EngineError, EngineErrorKind, EngineEvent, EngineFactory, EngineId,
    EngineProfile, Error, PlayerEvent, Result,
};

use crate::player::Dispatcher;

#[wasm_bindgen(module = "/web/hls-bridge.js")]
extern "C" {
    #[wasm_bindgen(js_name = "hlsSupported")]
    fn js_hls_supported() -> bool;

    #[wasm_bindgen(catch, js_name = "createHls")]
    fn js_create_hls(
        config: &JsValue,
        on_manifest_parsed: &js_sys::Function,
        on_error: &js_sys::Function,
    ) -> std::result::Result<JsValue, JsValue>;

    #[wasm_bindgen(catch, js_name = "hlsLoadSource")]
    fn js_load_source(hls: &JsValue, url: &str) -> std::result::Result<(), JsValue>;

    #[wasm_bindgen(catch, js_name = "hlsAttachMedia")]
    fn js_attach_media(hls: &JsValue, video: &HtmlVideoElement) -> std::result::Result<(), JsValue>;

    #[wasm_bindgen(js_name = "hlsStartLoad")]
    fn js_start_load(hls: &JsValue);

    #[wasm_bindgen(js_name = "hlsRecoverMediaError")]
    fn js_recover_media_error(hls: &JsValue);

    #[wasm_bindgen(js_name = "hlsDestroy")]
    fn js_destroy(hls: &JsValue);
}

/// hls.js present and usable in this browser
pub fn supported() -> bool {
    js_hls_supported()
}

fn engine_error(context: &str, e: JsValue) -> Error {
    Error::Engine(format!("{context}: {e:?}"))
}

type ErrorCallback = Closure<dyn FnMut(String, bool, String)>;

/// One hls.js instance bound to the player's video element
pub struct HlsJsEngine {
    hls: JsValue,
    video: HtmlVideoElement,
    callbacks: Option<(Closure<dyn FnMut()>, ErrorCallback)>,
}

impl AdaptiveEngine for HlsJsEngine {
    fn load_source(&mut self, url: &str) -> Result<()> {
        js_load_source(&self.hls, url).map_err(|e| engine_error("loadSource", e))
    }

    fn attach_media(&mut self) -> Result<()> {
        js_attach_media(&self.hls, &self.video).map_err(|e| engine_error("attachMedia", e))
    }

    fn start_load(&mut self) {
        js_start_load(&self.hls);
    }

    fn recover_media_error(&mut self) {
        js_recover_media_error(&self.hls);
    }

    fn destroy(&mut self) {
        js_destroy(&self.hls);
        // the destroy may run inside one of these callbacks
        if let Some(callbacks) = self.callbacks.take() {
            wasm_bindgen_futures::spawn_local(async move {
                drop(callbacks);
            });
        }
    }
}

/// Creates hls.js instances wired back into the dispatcher
pub struct HlsJsFactory {
    video: HtmlVideoElement,
    sink: Weak<Dispatcher>,
}

impl HlsJsFactory {
    pub fn new(video: HtmlVideoElement, sink: Weak<Dispatcher>) -> Self {
        Self { video, sink }
    }
}

impl EngineFactory for HlsJsFactory {
    type Engine = HlsJsEngine;

    fn is_supported(&self) -> bool {
        supported()
    }

    fn create(&mut self, id: EngineId, profile: &EngineProfile) -> Result<HlsJsEngine> {
        let config = profile
            .serialize(&serde_wasm_bindgen::Serializer::json_compatible())
            .map_err(|e| Error::Engine(format!("engine profile: {e}")))?;

        let sink = self.sink.clone();
        let on_manifest = Closure::<dyn FnMut()>::new(move || {
            if let Some(dispatcher) = sink.upgrade() {
                dispatcher.post_deferred(PlayerEvent::Engine {
                    engine: id,
                    event: EngineEvent::ManifestParsed,
                });
            }
        });

        let sink = self.sink.clone();
        let on_error = Closure::<dyn FnMut(String, bool, String)>::new(
            move |kind: String, fatal: bool, details: String| {
                let kind = EngineErrorKind::from_type(&kind);
                let error = if fatal {
                    EngineError::fatal(kind, details)
                } else {
                    EngineError::non_fatal(kind, details)
                };
                if let Some(dispatcher) = sink.upgrade() {
                    dispatcher.post_deferred(PlayerEvent::Engine {
                        engine: id,
                        event: EngineEvent::Error(error),
                    });
                }
            },
        );

        let hls = js_create_hls(
            &config,
            on_manifest.as_ref().unchecked_ref(),
            on_error.as_ref().unchecked_ref(),
        )
        .map_err(|e| engine_error("new Hls", e))?;

        Ok(HlsJsEngine {
            hls,
            video: self.video.clone(),
            callbacks: Some((on_manifest, on_error)),
        })
    }
}
