//! Browser player: wires DOM events, hls.js and timers into one controller
//!
//! All input funnels through [`Dispatcher`], which queues events and drains
//! them into the controller one at a time. Re-entrant posts (a JS callback
//! calling back into the player while an event is being handled) only
//! enqueue; the outer drain picks them up.

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::rc::{Rc, Weak};
use std::time::Duration;

use serde::Serialize;
use tokio::sync::{mpsc, watch};
use wasm_bindgen::prelude::*;
use wasm_bindgen::JsCast;
use web_sys::{EventTarget, HtmlElement, HtmlVideoElement, KeyboardEvent};
use xtv_core::{
    Command, InputEvent, Key, PlaybackRequest, PlayerConfig, PlayerController, PlayerEvent,
    PlayerIntent, PlayerSnapshot,
};

use crate::dom::{self, Listener, Timeout};
use crate::element::{self, WebContainer, WebMediaElement, MEDIA_EVENTS};
use crate::hls::HlsJsFactory;

pub type WebController = PlayerController<WebMediaElement, WebContainer, HlsJsFactory>;

fn to_js<T: Serialize>(value: &T) -> Result<JsValue, JsValue> {
    value
        .serialize(&serde_wasm_bindgen::Serializer::json_compatible())
        .map_err(JsValue::from)
}

fn js_error(e: impl std::fmt::Display) -> JsValue {
    js_sys::Error::new(&e.to_string()).into()
}

/// Event queue in front of the controller
pub struct Dispatcher {
    this: Weak<Dispatcher>,
    controller: RefCell<WebController>,
    pending: RefCell<VecDeque<PlayerEvent>>,
    drain_scheduled: Cell<bool>,
    state_rx: RefCell<watch::Receiver<PlayerSnapshot>>,
    intents: RefCell<Option<mpsc::UnboundedReceiver<PlayerIntent>>>,
    on_state: RefCell<Option<js_sys::Function>>,
    on_intent: RefCell<Option<js_sys::Function>>,
    timer: RefCell<Option<Timeout>>,
    tick: Closure<dyn FnMut()>,
}

impl Dispatcher {
    fn new(video: HtmlVideoElement, container: HtmlElement, config: PlayerConfig) -> Rc<Self> {
        Rc::new_cyclic(|this: &Weak<Dispatcher>| {
            let factory = HlsJsFactory::new(video.clone(), this.clone());
            let mut controller = PlayerController::new(
                WebMediaElement::new(video),
                WebContainer::new(container),
                factory,
                config,
            );
            let state_rx = controller.subscribe();
            let intents = controller.take_intents();

            let sink = this.clone();
            let tick = Closure::<dyn FnMut()>::new(move || {
                if let Some(dispatcher) = sink.upgrade() {
                    dispatcher.timer.borrow_mut().take();
                    dispatcher.post(PlayerEvent::Tick);
                }
            });

            Self {
                this: this.clone(),
                controller: RefCell::new(controller),
                pending: RefCell::new(VecDeque::new()),
                drain_scheduled: Cell::new(false),
                state_rx: RefCell::new(state_rx),
                intents: RefCell::new(intents),
                on_state: RefCell::new(None),
                on_intent: RefCell::new(None),
                timer: RefCell::new(None),
                tick,
            }
        })
    }

    /// Queue an event and handle it now unless already inside a dispatch
    pub fn post(&self, event: PlayerEvent) {
        self.pending.borrow_mut().push_back(event);
        self.drain();
    }

    /// Queue an event and handle it on the next microtask
    pub fn post_deferred(&self, event: PlayerEvent) {
        self.pending.borrow_mut().push_back(event);
        if self.drain_scheduled.replace(true) {
            return;
        }
        let this = self.this.clone();
        wasm_bindgen_futures::spawn_local(async move {
            if let Some(dispatcher) = this.upgrade() {
                dispatcher.drain_scheduled.set(false);
                dispatcher.drain();
            }
        });
    }

    /// Run a direct call on the controller, then flush side effects
    fn with_controller<R>(&self, f: impl FnOnce(&mut WebController, Duration) -> R) -> Result<R, JsValue> {
        let result = {
            let mut controller = self
                .controller
                .try_borrow_mut()
                .map_err(|_| js_error("player is busy"))?;
            f(&mut controller, dom::now())
        };
        self.drain();
        Ok(result)
    }

    fn snapshot(&self) -> Option<PlayerSnapshot> {
        self.controller.try_borrow().ok().map(|c| c.snapshot())
    }

    fn drain(&self) {
        {
            let Ok(mut controller) = self.controller.try_borrow_mut() else {
                return;
            };
            loop {
                let next = self.pending.borrow_mut().pop_front();
                let Some(event) = next else { break };
                controller.dispatch(event, dom::now());
            }
            self.rearm(controller.next_deadline());
        }
        self.notify();
    }

    fn rearm(&self, deadline: Option<Duration>) {
        let mut timer = self.timer.borrow_mut();
        if timer.as_ref().map(|t| t.deadline) == deadline {
            return;
        }
        *timer = match deadline {
            Some(deadline) => match Timeout::arm(&self.tick, deadline, dom::now()) {
                Ok(timeout) => Some(timeout),
                Err(e) => {
                    dom::warn(&format!("setTimeout failed: {e:?}"));
                    None
                }
            },
            None => None,
        };
    }

    fn emit_state(&self, snapshot: &PlayerSnapshot) {
        let callback = self.on_state.borrow().clone();
        let Some(callback) = callback else { return };
        match to_js(snapshot) {
            Ok(value) => {
                if let Err(e) = callback.call1(&JsValue::NULL, &value) {
                    dom::warn(&format!("onState callback threw: {e:?}"));
                }
            }
            Err(e) => dom::warn(&format!("snapshot serialization failed: {e:?}")),
        }
    }

    /// Hand new state and intents to the page. Runs with no borrows held so
    /// callbacks may call straight back into the player.
    fn notify(&self) {
        let snapshot = {
            let mut rx = self.state_rx.borrow_mut();
            match rx.has_changed() {
                Ok(true) => Some(rx.borrow_and_update().clone()),
                _ => None,
            }
        };
        if let Some(snapshot) = snapshot {
            self.emit_state(&snapshot);
        }

        // intents stay queued until the page registers a handler
        let callback = self.on_intent.borrow().clone();
        let Some(callback) = callback else { return };
        loop {
            let intent = {
                let mut intents = self.intents.borrow_mut();
                match intents.as_mut().map(|rx| rx.try_recv()) {
                    Some(Ok(intent)) => intent,
                    _ => break,
                }
            };
            match to_js(&intent) {
                Ok(value) => {
                    if let Err(e) = callback.call1(&JsValue::NULL, &value) {
                        dom::warn(&format!("onIntent callback threw: {e:?}"));
                    }
                }
                Err(e) => dom::warn(&format!("intent serialization failed: {e:?}")),
            }
        }
    }
}

/// Elements that act on key presses themselves. A focused button turns
/// Space into a click, so the player must not also toggle on it.
fn keeps_keys(tag: &str) -> bool {
    matches!(tag, "INPUT" | "TEXTAREA" | "SELECT" | "BUTTON")
}

fn is_editable(target: Option<EventTarget>) -> bool {
    target
        .and_then(|t| t.dyn_into::<web_sys::Element>().ok())
        .is_some_and(|e| keeps_keys(&e.tag_name()) || e.get_attribute("contenteditable").is_some())
}

/// Run `f` on the cell's value unless it is already borrowed; `f` comes back
/// when the cell is busy
fn run_unless_busy<T, F: FnOnce(&mut T)>(cell: &RefCell<T>, f: F) -> Result<(), F> {
    match cell.try_borrow_mut() {
        Ok(mut value) => {
            f(&mut value);
            Ok(())
        }
        Err(_) => Err(f),
    }
}

/// IPTV player bound to a `<video>` element and its container
///
/// ```javascript
/// import init, { XtvPlayer } from '@xtv/wasm';
///
/// await init();
/// const player = new XtvPlayer(video, container, { autoAdvance: true });
/// player.onState((state) => render(state));
/// player.onIntent((intent) => router.handle(intent));
/// player.load({ streamUrl: url, streamType: 'live' });
/// ```
#[wasm_bindgen]
pub struct XtvPlayer {
    dispatcher: Rc<Dispatcher>,
    listeners: Vec<Listener>,
}

#[wasm_bindgen]
impl XtvPlayer {
    #[wasm_bindgen(constructor)]
    pub fn new(
        video: HtmlVideoElement,
        container: HtmlElement,
        config: JsValue,
    ) -> Result<XtvPlayer, JsValue> {
        let config: PlayerConfig = if config.is_null() || config.is_undefined() {
            PlayerConfig::default()
        } else {
            serde_wasm_bindgen::from_value(config)?
        };
        config.validate().map_err(js_error)?;

        let dispatcher = Dispatcher::new(video.clone(), container.clone(), config);
        let listeners = Self::listen(&dispatcher, &video, &container)?;
        Ok(Self {
            dispatcher,
            listeners,
        })
    }

    fn listen(
        dispatcher: &Rc<Dispatcher>,
        video: &HtmlVideoElement,
        container: &HtmlElement,
    ) -> Result<Vec<Listener>, JsValue> {
        let mut listeners = Vec::new();

        for &kind in MEDIA_EVENTS {
            let sink = Rc::downgrade(dispatcher);
            let source = video.clone();
            listeners.push(Listener::new(video, kind, move |_| {
                if let (Some(dispatcher), Some(event)) =
                    (sink.upgrade(), element::media_event(kind, &source))
                {
                    dispatcher.post(PlayerEvent::Media(event));
                }
            })?);
        }

        let pointer = [
            ("pointermove", InputEvent::PointerMove),
            ("pointerenter", InputEvent::PointerEnter),
            ("pointerleave", InputEvent::PointerLeave),
            ("click", InputEvent::Click),
        ];
        for (kind, input) in pointer {
            let sink = Rc::downgrade(dispatcher);
            listeners.push(Listener::new(container, kind, move |_| {
                if let Some(dispatcher) = sink.upgrade() {
                    dispatcher.post(PlayerEvent::Input(input.clone()));
                }
            })?);
        }

        let sink = Rc::downgrade(dispatcher);
        listeners.push(Listener::new(video, "click", move |_| {
            if let Some(dispatcher) = sink.upgrade() {
                dispatcher.post(PlayerEvent::Command(Command::TogglePlay));
            }
        })?);

        let document: EventTarget = web_sys::window()
            .and_then(|w| w.document())
            .ok_or_else(|| js_error("no document"))?
            .into();

        let sink = Rc::downgrade(dispatcher);
        listeners.push(Listener::new(&document, "keydown", move |event| {
            let Some(dispatcher) = sink.upgrade() else { return };
            let Some(event) = event.dyn_ref::<KeyboardEvent>() else { return };
            if event.ctrl_key() || event.meta_key() || event.alt_key() || is_editable(event.target()) {
                return;
            }
            let Some(key) = Key::from_dom(&event.key()) else { return };
            let handled = dispatcher
                .controller
                .try_borrow()
                .map(|c| {
                    c.config()
                        .key_bindings()
                        .command_for(key, c.is_fullscreen())
                        .is_some()
                })
                .unwrap_or(false);
            if handled {
                event.prevent_default();
            }
            dispatcher.post(PlayerEvent::Input(InputEvent::Key { key }));
        })?);

        let sink = Rc::downgrade(dispatcher);
        listeners.push(Listener::new(&document, "fullscreenchange", move |_| {
            let Some(dispatcher) = sink.upgrade() else { return };
            let active = match dispatcher.controller.try_borrow() {
                Ok(controller) => controller.container().is_fullscreen(),
                Err(_) => return,
            };
            dispatcher.post(PlayerEvent::FullscreenChanged { active });
        })?);

        Ok(listeners)
    }

    /// Start a session. `request` is `{ streamUrl, streamType, streamInfo?, episodeData? }`.
    pub fn load(&self, request: JsValue) -> Result<(), JsValue> {
        let request: PlaybackRequest = serde_wasm_bindgen::from_value(request)?;
        self.dispatcher
            .with_controller(|c, now| c.load(request, now))?
            .map_err(js_error)
    }

    /// Re-attach the last request after a fault
    pub fn retry(&self) -> Result<(), JsValue> {
        self.dispatcher
            .with_controller(|c, now| c.retry(now))?
            .map_err(js_error)
    }

    fn command(&self, command: Command) {
        self.dispatcher.post(PlayerEvent::Command(command));
    }

    pub fn play(&self) {
        self.command(Command::Play);
    }

    pub fn pause(&self) {
        self.command(Command::Pause);
    }

    #[wasm_bindgen(js_name = togglePlay)]
    pub fn toggle_play(&self) {
        self.command(Command::TogglePlay);
    }

    pub fn seek(&self, time: f64) {
        self.command(Command::Seek { time });
    }

    #[wasm_bindgen(js_name = setVolume)]
    pub fn set_volume(&self, volume: f64) {
        self.command(Command::SetVolume { volume });
    }

    #[wasm_bindgen(js_name = toggleMute)]
    pub fn toggle_mute(&self) {
        self.command(Command::ToggleMute);
    }

    #[wasm_bindgen(js_name = setPlaybackRate)]
    pub fn set_playback_rate(&self, rate: f64) {
        self.command(Command::SetPlaybackRate { rate });
    }

    #[wasm_bindgen(js_name = toggleFullscreen)]
    pub fn toggle_fullscreen(&self) {
        self.command(Command::ToggleFullscreen);
    }

    #[wasm_bindgen(js_name = toggleSubtitles)]
    pub fn toggle_subtitles(&self) {
        self.command(Command::ToggleSubtitles);
    }

    #[wasm_bindgen(js_name = previousEpisode)]
    pub fn previous_episode(&self) {
        self.command(Command::PreviousEpisode);
    }

    #[wasm_bindgen(js_name = nextEpisode)]
    pub fn next_episode(&self) {
        self.command(Command::NextEpisode);
    }

    pub fn back(&self) {
        self.command(Command::Back);
    }

    /// Seek bar drag started at `time`
    #[wasm_bindgen(js_name = scrubStart)]
    pub fn scrub_start(&self, time: f64) {
        self.dispatcher
            .post(PlayerEvent::Input(InputEvent::ScrubStart { time }));
    }

    #[wasm_bindgen(js_name = scrubMove)]
    pub fn scrub_move(&self, time: f64) {
        self.dispatcher
            .post(PlayerEvent::Input(InputEvent::ScrubMove { time }));
    }

    /// Release the drag; seeks once to the last position
    #[wasm_bindgen(js_name = scrubEnd)]
    pub fn scrub_end(&self) {
        self.dispatcher.post(PlayerEvent::Input(InputEvent::ScrubEnd));
    }

    /// Current snapshot as a plain object
    pub fn state(&self) -> Result<JsValue, JsValue> {
        let snapshot = self
            .dispatcher
            .snapshot()
            .ok_or_else(|| js_error("player is busy"))?;
        to_js(&snapshot)
    }

    /// Current snapshot as JSON
    #[wasm_bindgen(js_name = stateJson)]
    pub fn state_json(&self) -> String {
        self.dispatcher
            .snapshot()
            .and_then(|s| serde_json::to_string(&s).ok())
            .unwrap_or_default()
    }

    /// Called with every new snapshot
    #[wasm_bindgen(js_name = onState)]
    pub fn on_state(&self, callback: js_sys::Function) {
        *self.dispatcher.on_state.borrow_mut() = Some(callback);
        // replay the current state to the new subscriber
        let current = self.dispatcher.state_rx.borrow_mut().borrow_and_update().clone();
        self.dispatcher.emit_state(&current);
        self.dispatcher.notify();
    }

    /// Called with navigation intents (`back`, `advanceTo`, `navigateEpisode`)
    #[wasm_bindgen(js_name = onIntent)]
    pub fn on_intent(&self, callback: js_sys::Function) {
        *self.dispatcher.on_intent.borrow_mut() = Some(callback);
        self.dispatcher.notify();
    }

    /// Tear down the session and detach every listener
    pub fn destroy(&mut self) {
        let unmount = |c: &mut WebController| c.unmount();
        match run_unless_busy(&self.dispatcher.controller, unmount) {
            Ok(()) => self.dispatcher.drain(),
            Err(unmount) => {
                // called from a callback inside a dispatch
                dom::warn("destroy() while an event is in flight; unmounting after it");
                let sink = Rc::downgrade(&self.dispatcher);
                wasm_bindgen_futures::spawn_local(async move {
                    let Some(dispatcher) = sink.upgrade() else { return };
                    if run_unless_busy(&dispatcher.controller, unmount).is_err() {
                        dom::warn("unmount skipped: player still busy");
                    }
                    dispatcher.drain();
                });
            }
        }
        self.dispatcher.timer.borrow_mut().take();
        // destroy may be called from inside one of these listeners
        let listeners = std::mem::take(&mut self.listeners);
        wasm_bindgen_futures::spawn_local(async move {
            drop(listeners);
        });
    }
}

impl Drop for XtvPlayer {
    fn drop(&mut self) {
        if !self.listeners.is_empty() {
            self.destroy();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_focused_controls_keep_their_keys() {
        assert!(keeps_keys("BUTTON"));
        assert!(keeps_keys("INPUT"));
        assert!(keeps_keys("TEXTAREA"));
        assert!(!keeps_keys("VIDEO"));
        assert!(!keeps_keys("DIV"));
    }

    #[test]
    fn test_busy_cell_hands_work_back() {
        let cell = RefCell::new(Vec::new());

        let pending = {
            let _held = cell.borrow_mut();
            run_unless_busy(&cell, |v: &mut Vec<u32>| v.push(1))
        };
        assert!(cell.borrow().is_empty());

        let Err(unmount) = pending else {
            panic!("work ran while the cell was borrowed");
        };
        assert!(run_unless_busy(&cell, unmount).is_ok());
        assert_eq!(*cell.borrow(), vec![1]);
    }
}
