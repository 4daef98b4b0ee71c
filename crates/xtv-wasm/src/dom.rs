//! Scoped DOM registrations
//!
//! Listeners and timers are owned guards: dropping one unregisters it.

use std::time::Duration;

use wasm_bindgen::prelude::*;
use wasm_bindgen::JsCast;
use web_sys::{Event, EventTarget};

/// An event listener that is removed when dropped
pub struct Listener {
    target: EventTarget,
    kind: &'static str,
    callback: Closure<dyn FnMut(Event)>,
}

impl Listener {
    pub fn new(
        target: &EventTarget,
        kind: &'static str,
        handler: impl FnMut(Event) + 'static,
    ) -> Result<Self, JsValue> {
        let callback = Closure::<dyn FnMut(Event)>::new(handler);
        target.add_event_listener_with_callback(kind, callback.as_ref().unchecked_ref())?;
        Ok(Self {
            target: target.clone(),
            kind,
            callback,
        })
    }
}

impl Drop for Listener {
    fn drop(&mut self) {
        let _ = self
            .target
            .remove_event_listener_with_callback(self.kind, self.callback.as_ref().unchecked_ref());
    }
}

/// A pending `setTimeout`, cleared when dropped
pub struct Timeout {
    id: i32,
    pub deadline: Duration,
}

impl Timeout {
    pub fn arm(
        callback: &Closure<dyn FnMut()>,
        deadline: Duration,
        now: Duration,
    ) -> Result<Self, JsValue> {
        let window = web_sys::window().ok_or_else(|| JsValue::from_str("no window"))?;
        let delay = deadline.saturating_sub(now).as_millis().min(i32::MAX as u128) as i32;
        let id = window.set_timeout_with_callback_and_timeout_and_arguments_0(
            callback.as_ref().unchecked_ref(),
            delay,
        )?;
        Ok(Self { id, deadline })
    }
}

impl Drop for Timeout {
    fn drop(&mut self) {
        if let Some(window) = web_sys::window() {
            window.clear_timeout_with_handle(self.id);
        }
    }
}

/// Monotonic host clock (`performance.now()`)
pub fn now() -> Duration {
    let millis = web_sys::window()
        .and_then(|w| w.performance())
        .map(|p| p.now())
        .unwrap_or(0.0);
    Duration::from_micros((millis.max(0.0) * 1000.0) as u64)
}

pub fn warn(message: &str) {
    web_sys::console::warn_1(&JsValue::from_str(&format!("[xtv] {message}")));
}
