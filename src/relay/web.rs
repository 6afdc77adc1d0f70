//! Browser bindings for the relay, built on `web-sys`.
//!
//! The wasm target is single threaded, so the handles below are marked
//! `Send`/`Sync` to satisfy the trait bounds shared with native builds.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use serde_json::Value as JsonValue;
use wasm_bindgen::closure::Closure;
use wasm_bindgen::prelude::*;
use wasm_bindgen::JsCast;
use web_sys::{EventTarget, MessageEvent, Window};

use crate::relay::callback::{CallbackEmitter, CallbackPage, CallbackStatus};
use crate::relay::channel::{InboundMessage, ListenerId, MessageBus, MessageListener, OpenerPort};
use crate::relay::config::{CallbackConfig, PopupFeatures, RelayConfig};
use crate::relay::error::{configuration_error, RelayResult};
use crate::relay::fetcher::AuthorizationUrlFetcher;
use crate::relay::listener::{ListenerHandlers, OAuthListener};
use crate::relay::logger::LOGGER;
use crate::relay::oauth_relay::OAuthRelay;
use crate::relay::popup::{PopupOpener, PopupWindow};

const MESSAGE_EVENT: &str = "message";

fn window() -> RelayResult<Window> {
    web_sys::window()
        .ok_or_else(|| configuration_error("window object is not available in this environment"))
}

fn window_origin(window: &Window) -> RelayResult<String> {
    window.location().origin().map_err(map_js_error)
}

fn map_js_error(err: JsValue) -> crate::relay::error::RelayError {
    configuration_error(format!("Browser error: {}", stringify_js_error(err)))
}

fn stringify_js_error(err: JsValue) -> String {
    if let Some(string) = err.as_string() {
        return string;
    }

    if let Ok(stringified) = js_sys::JSON::stringify(&err) {
        if let Some(text) = stringified.as_string() {
            return text;
        }
    }

    format!("{err:?}")
}

fn js_to_json(value: &JsValue) -> Option<JsonValue> {
    if value.is_null() || value.is_undefined() {
        return None;
    }
    let text = js_sys::JSON::stringify(value).ok()?.as_string()?;
    serde_json::from_str(&text).ok()
}

fn json_to_js(value: &JsonValue) -> RelayResult<JsValue> {
    let text = serde_json::to_string(value)
        .map_err(|err| configuration_error(format!("Failed to serialize message: {err}")))?;
    js_sys::JSON::parse(&text).map_err(map_js_error)
}

struct WindowListenerHandle {
    target: EventTarget,
    callback: Closure<dyn FnMut(MessageEvent)>,
}

impl WindowListenerHandle {
    fn attach(target: EventTarget, callback: Closure<dyn FnMut(MessageEvent)>) -> RelayResult<Self> {
        target
            .add_event_listener_with_callback(MESSAGE_EVENT, callback.as_ref().unchecked_ref())
            .map_err(map_js_error)?;
        Ok(Self { target, callback })
    }
}

impl Drop for WindowListenerHandle {
    fn drop(&mut self) {
        if let Err(err) = self
            .target
            .remove_event_listener_with_callback(MESSAGE_EVENT, self.callback.as_ref().unchecked_ref())
        {
            LOGGER.warn(format!(
                "removeEventListener failed: {}",
                stringify_js_error(err)
            ));
        }
    }
}

/// [`MessageBus`] over the current window's `message` events.
pub struct WindowMessageBus {
    window: Window,
    next_id: AtomicU64,
    handles: Mutex<BTreeMap<ListenerId, WindowListenerHandle>>,
}

impl WindowMessageBus {
    pub fn new() -> RelayResult<Self> {
        Ok(Self::with_window(window()?))
    }

    pub fn with_window(window: Window) -> Self {
        Self {
            window,
            next_id: AtomicU64::new(1),
            handles: Mutex::new(BTreeMap::new()),
        }
    }

    pub fn origin(&self) -> RelayResult<String> {
        window_origin(&self.window)
    }

    pub fn listener_count(&self) -> usize {
        self.handles.lock().unwrap().len()
    }
}

impl MessageBus for WindowMessageBus {
    fn add_listener(&self, listener: MessageListener) -> RelayResult<ListenerId> {
        let callback = Closure::wrap(Box::new(move |event: MessageEvent| {
            let Some(data) = js_to_json(&event.data()) else {
                return;
            };
            listener(&InboundMessage::new(event.origin(), data));
        }) as Box<dyn FnMut(MessageEvent)>);

        let handle = WindowListenerHandle::attach(self.window.clone().into(), callback)?;
        let id = ListenerId::next(&self.next_id);
        self.handles.lock().unwrap().insert(id, handle);
        Ok(id)
    }

    fn remove_listener(&self, id: ListenerId) {
        let handle = self.handles.lock().unwrap().remove(&id);
        drop(handle);
    }

    fn post(&self, message: &JsonValue, target_origin: &str) -> RelayResult<()> {
        self.window
            .post_message(&json_to_js(message)?, target_origin)
            .map_err(map_js_error)
    }
}

unsafe impl Send for WindowMessageBus {}
unsafe impl Sync for WindowMessageBus {}

/// A popup opened through `window.open`.
pub struct BrowserPopup {
    window: Window,
}

impl PopupWindow for BrowserPopup {
    fn is_closed(&self) -> bool {
        self.window.closed().unwrap_or(true)
    }

    fn focus(&self) {
        let _ = self.window.focus();
    }

    fn close(&self) {
        if let Err(err) = self.window.close() {
            LOGGER.debug(format!("popup close failed: {}", stringify_js_error(err)));
        }
    }
}

unsafe impl Send for BrowserPopup {}
unsafe impl Sync for BrowserPopup {}

pub struct BrowserPopupOpener {
    window: Window,
}

impl BrowserPopupOpener {
    pub fn new() -> RelayResult<Self> {
        Ok(Self { window: window()? })
    }

    fn placed(&self, features: &PopupFeatures) -> PopupFeatures {
        if features.left.is_some() || features.top.is_some() {
            return *features;
        }
        let screen = match self.window.screen() {
            Ok(screen) => screen,
            Err(_) => return *features,
        };
        match (screen.width(), screen.height()) {
            (Ok(width), Ok(height)) => features.centered_on(width, height),
            _ => *features,
        }
    }
}

impl PopupOpener for BrowserPopupOpener {
    fn open(
        &self,
        url: &str,
        target: &str,
        features: &PopupFeatures,
    ) -> Option<Box<dyn PopupWindow>> {
        let features = self.placed(features).to_feature_string();
        match self
            .window
            .open_with_url_and_target_and_features(url, target, &features)
        {
            Ok(Some(window)) => Some(Box::new(BrowserPopup { window })),
            Ok(None) => None,
            Err(err) => {
                LOGGER.debug(format!("window.open failed: {}", stringify_js_error(err)));
                None
            }
        }
    }
}

unsafe impl Send for BrowserPopupOpener {}
unsafe impl Sync for BrowserPopupOpener {}

/// Posts to `window.opener`, restricted to this document's origin.
pub struct WindowOpenerPort {
    window: Window,
}

impl WindowOpenerPort {
    pub fn new() -> RelayResult<Self> {
        Ok(Self { window: window()? })
    }
}

impl OpenerPort for WindowOpenerPort {
    fn post_to_opener(&self, message: &JsonValue) -> RelayResult<()> {
        let opener = self.window.opener().map_err(map_js_error)?;
        if opener.is_null() || opener.is_undefined() {
            return Err(configuration_error("window.opener is not available"));
        }
        let origin = window_origin(&self.window)?;
        opener
            .unchecked_into::<Window>()
            .post_message(&json_to_js(message)?, &origin)
            .map_err(map_js_error)
    }
}

unsafe impl Send for WindowOpenerPort {}
unsafe impl Sync for WindowOpenerPort {}

/// Renders the callback status into the document body.
pub struct DocumentCallbackPage {
    window: Window,
}

impl DocumentCallbackPage {
    pub fn new() -> RelayResult<Self> {
        Ok(Self { window: window()? })
    }
}

impl CallbackPage for DocumentCallbackPage {
    fn show_status(&self, status: &CallbackStatus) {
        if let Some(body) = self.window.document().and_then(|document| document.body()) {
            body.set_text_content(Some(&status.to_string()));
        }
    }

    fn close_window(&self) {
        let _ = self.window.close();
    }
}

unsafe impl Send for DocumentCallbackPage {}
unsafe impl Sync for DocumentCallbackPage {}

/// Builds a relay wired to the current window.
pub fn browser_relay(
    fetcher: Arc<dyn AuthorizationUrlFetcher>,
    config: RelayConfig,
) -> RelayResult<OAuthRelay> {
    let bus = WindowMessageBus::new()?;
    let origin = bus.origin()?;
    OAuthRelay::builder()
        .with_fetcher(fetcher)
        .with_popup_opener(Arc::new(BrowserPopupOpener::new()?))
        .with_message_bus(Arc::new(bus))
        .with_origin(origin)
        .with_config(config)
        .build()
}

/// Subscribes `handlers` to outcomes posted to the current window.
pub fn browser_listener(handlers: ListenerHandlers) -> RelayResult<OAuthListener> {
    let bus = WindowMessageBus::new()?;
    let origin = bus.origin()?;
    OAuthListener::subscribe(Arc::new(bus), &origin, handlers)
}

/// Starts the callback-side emitter for the document currently loaded in the popup.
pub fn start_callback_page(config: CallbackConfig) -> RelayResult<()> {
    let href = window()?.location().href().map_err(map_js_error)?;
    let emitter = CallbackEmitter::new(
        Arc::new(WindowOpenerPort::new()?),
        Arc::new(DocumentCallbackPage::new()?),
    )
    .with_config(config);
    Arc::new(emitter).spawn(href);
    Ok(())
}

/// Entry point for the page served at the OAuth redirect URI.
#[wasm_bindgen(js_name = runOAuthCallback)]
pub fn run_oauth_callback() -> Result<(), JsValue> {
    start_callback_page(CallbackConfig::default()).map_err(|err| JsValue::from_str(&err.to_string()))
}
