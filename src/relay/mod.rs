#![doc = include_str!("README.md")]
mod callback;
mod channel;
mod config;
mod error;
mod fetcher;
mod listener;
pub(crate) mod logger;
mod oauth_relay;
mod popup;
mod types;

#[cfg(all(feature = "wasm-web", target_arch = "wasm32"))]
mod web;

#[doc(inline)]
pub use callback::{
    interpret_callback, CallbackDecision, CallbackEmitter, CallbackPage, CallbackParams,
    CallbackStatus,
};

#[doc(inline)]
pub use channel::{
    accept_message, normalize_origin, InMemoryMessageBus, InMemoryOpenerPort, InboundMessage,
    ListenerId, MessageBus, MessageListener, MessageSubscription, OpenerPort,
};

#[doc(inline)]
pub use config::{
    CallbackConfig, PopupFeatures, RelayConfig, DEFAULT_AUTO_CLOSE_DELAY, DEFAULT_POLL_INTERVAL,
    DEFAULT_POPUP_HEIGHT, DEFAULT_POPUP_WIDTH, DEFAULT_RELAY_TIMEOUT, DEFAULT_SETTLE_DELAY,
};

#[doc(inline)]
pub use error::{RelayError, RelayResult, DEFAULT_DENIAL_REASON, NO_CODE_RECEIVED_REASON};

#[doc(inline)]
pub use fetcher::{AuthorizationUrlFetcher, RestAuthorizationUrlFetcher, API_TOKEN_ENV, API_URL_ENV};

#[doc(inline)]
pub use listener::{ErrorCallback, ListenerHandlers, OAuthListener, SuccessCallback};

#[doc(inline)]
pub use oauth_relay::{OAuthRelay, RelayBuilder, SettlementPath};

#[doc(inline)]
pub use popup::{PopupHandle, PopupOpener, PopupWindow};

#[doc(inline)]
pub use types::{
    timestamp_now, AuthorizationRequest, OutcomeMessage, Platform, RelaySuccess, UNKNOWN_PLATFORM,
};

#[cfg(all(feature = "wasm-web", target_arch = "wasm32"))]
#[doc(inline)]
pub use web::{
    browser_listener, browser_relay, run_oauth_callback, start_callback_page, BrowserPopup,
    BrowserPopupOpener, DocumentCallbackPage, WindowMessageBus, WindowOpenerPort,
};
