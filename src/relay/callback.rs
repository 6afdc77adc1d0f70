use std::fmt;
use std::sync::Arc;

use serde_json::{Map, Value as JsonValue};
use url::Url;

use crate::platform::runtime::{sleep, spawn_detached};
use crate::relay::channel::OpenerPort;
use crate::relay::config::CallbackConfig;
use crate::relay::error::NO_CODE_RECEIVED_REASON;
use crate::relay::logger::LOGGER;
use crate::relay::types::{timestamp_now, OutcomeMessage, UNKNOWN_PLATFORM};

/// Query parameters the provider appends when redirecting back to the popup.
///
/// Empty values are treated as absent.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CallbackParams {
    pub code: Option<String>,
    pub error: Option<String>,
    pub state: Option<String>,
    pub platform: Option<String>,
}

impl CallbackParams {
    pub fn from_url(url: &str) -> Result<Self, url::ParseError> {
        let parsed = Url::parse(url)?;
        Ok(Self::from_query(parsed.query().unwrap_or_default()))
    }

    pub fn from_query(query: &str) -> Self {
        let mut params = Self::default();
        for (key, value) in url::form_urlencoded::parse(query.trim_start_matches('?').as_bytes()) {
            if value.is_empty() {
                continue;
            }
            let slot = match &*key {
                "code" => &mut params.code,
                "error" => &mut params.error,
                "state" => &mut params.state,
                "platform" => &mut params.platform,
                _ => continue,
            };
            if slot.is_none() {
                *slot = Some(value.into_owned());
            }
        }
        params
    }

    /// Platform label: explicit `platform`, else the `state` prefix before the
    /// first `-`, else `"unknown"`.
    pub fn derived_platform(&self) -> String {
        if let Some(platform) = &self.platform {
            return platform.clone();
        }
        self.state
            .as_deref()
            .and_then(|state| state.split('-').next())
            .filter(|prefix| !prefix.is_empty())
            .unwrap_or(UNKNOWN_PLATFORM)
            .to_string()
    }
}

/// Inline status shown by the callback page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallbackStatus {
    Loading,
    Success { platform: String },
    Error { message: String },
}

impl fmt::Display for CallbackStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CallbackStatus::Loading => f.write_str("Completing authorization..."),
            CallbackStatus::Success { platform } => {
                write!(f, "Connected {platform}. This window will close automatically.")
            }
            CallbackStatus::Error { message } => write!(f, "Authorization failed: {message}"),
        }
    }
}

/// What the callback page should post, display, and whether it closes itself.
#[derive(Debug, Clone, PartialEq)]
pub struct CallbackDecision {
    pub message: OutcomeMessage,
    pub status: CallbackStatus,
    pub auto_close: bool,
}

impl CallbackDecision {
    fn failure(reason: impl Into<String>, provider: Option<String>) -> Self {
        let reason = reason.into();
        Self {
            message: OutcomeMessage::error(reason.clone(), provider),
            status: CallbackStatus::Error { message: reason },
            auto_close: false,
        }
    }
}

/// Decides the outcome of a provider redirect without touching any window.
pub fn interpret_callback(params: &CallbackParams) -> CallbackDecision {
    if let Some(error) = &params.error {
        return CallbackDecision::failure(error.clone(), params.platform.clone());
    }

    let Some(code) = &params.code else {
        return CallbackDecision::failure(NO_CODE_RECEIVED_REASON, params.platform.clone());
    };

    let platform = params.derived_platform();
    let mut data = Map::new();
    data.insert("code".into(), JsonValue::String(code.clone()));
    if let Some(state) = &params.state {
        data.insert("state".into(), JsonValue::String(state.clone()));
    }
    data.insert("platform".into(), JsonValue::String(platform.clone()));
    data.insert("timestamp".into(), JsonValue::String(timestamp_now()));

    CallbackDecision {
        message: OutcomeMessage::success(JsonValue::Object(data), Some(platform.clone())),
        status: CallbackStatus::Success { platform },
        auto_close: true,
    }
}

/// The document loaded inside the popup.
pub trait CallbackPage: Send + Sync {
    fn show_status(&self, status: &CallbackStatus);
    fn close_window(&self);
}

/// Runs inside the popup after the provider redirect and reports the outcome
/// to the opener.
pub struct CallbackEmitter {
    opener: Arc<dyn OpenerPort>,
    page: Arc<dyn CallbackPage>,
    config: CallbackConfig,
}

impl CallbackEmitter {
    pub fn new(opener: Arc<dyn OpenerPort>, page: Arc<dyn CallbackPage>) -> Self {
        Self {
            opener,
            page,
            config: CallbackConfig::default(),
        }
    }

    pub fn with_config(mut self, config: CallbackConfig) -> Self {
        self.config = config;
        self
    }

    /// Processes `callback_url` and returns the final status shown on the page.
    ///
    /// Every failure, including an unparseable URL, ends up as an
    /// `OAUTH_ERROR` message so the opener is never left waiting.
    pub async fn run(&self, callback_url: &str) -> CallbackStatus {
        self.page.show_status(&CallbackStatus::Loading);
        sleep(self.config.settle_delay).await;

        let decision = match CallbackParams::from_url(callback_url) {
            Ok(params) => interpret_callback(&params),
            Err(err) => CallbackDecision::failure(format!("Invalid callback URL: {err}"), None),
        };

        if let Err(err) = self.opener.post_to_opener(&decision.message.to_json()) {
            LOGGER.warn(format!("could not notify the opening window: {err}"));
            let status = CallbackStatus::Error {
                message: "Unable to reach the window that started the authorization".into(),
            };
            self.page.show_status(&status);
            return status;
        }

        self.page.show_status(&decision.status);
        if decision.auto_close {
            sleep(self.config.auto_close_delay).await;
            self.page.close_window();
        }
        decision.status
    }

    /// Runs [`CallbackEmitter::run`] in the background.
    pub fn spawn(self: Arc<Self>, callback_url: String) {
        spawn_detached(async move {
            self.run(&callback_url).await;
        });
    }
}
