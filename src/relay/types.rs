use std::fmt;

use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use crate::relay::error::{fetch_failed, RelayResult};

/// Platform label used when a callback carries neither `platform` nor a
/// usable `state` prefix.
pub const UNKNOWN_PLATFORM: &str = "unknown";

/// Identifier of the third-party service being authorized (e.g. `twitter`).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Platform(String);

impl Platform {
    /// Wraps a platform identifier, rejecting empty values before any network call.
    pub fn new(value: impl Into<String>) -> RelayResult<Self> {
        let value = value.into();
        let trimmed = value.trim();
        if trimmed.is_empty() {
            return Err(fetch_failed("platform identifier must not be empty"));
        }
        Ok(Self(trimmed.to_owned()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for Platform {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Input of a single relay invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthorizationRequest {
    platform: Platform,
}

impl AuthorizationRequest {
    pub fn new(platform: Platform) -> Self {
        Self { platform }
    }

    pub fn for_platform(platform: impl Into<String>) -> RelayResult<Self> {
        Platform::new(platform).map(Self::new)
    }

    pub fn platform(&self) -> &Platform {
        &self.platform
    }
}

/// Structured outcome posted from the popup document back to its opener.
///
/// Serialises to the `{ "type": "OAUTH_SUCCESS" | "OAUTH_ERROR", ... }`
/// payloads exchanged through `postMessage`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum OutcomeMessage {
    #[serde(rename = "OAUTH_SUCCESS")]
    Success {
        #[serde(default, skip_serializing_if = "JsonValue::is_null")]
        data: JsonValue,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        provider: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        timestamp: Option<String>,
    },
    #[serde(rename = "OAUTH_ERROR")]
    Error {
        #[serde(rename = "error", default, skip_serializing_if = "Option::is_none")]
        reason: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        provider: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        timestamp: Option<String>,
    },
}

impl OutcomeMessage {
    pub fn success(data: JsonValue, provider: Option<String>) -> Self {
        OutcomeMessage::Success {
            data,
            provider,
            timestamp: Some(timestamp_now()),
        }
    }

    pub fn error(reason: impl Into<String>, provider: Option<String>) -> Self {
        OutcomeMessage::Error {
            reason: Some(reason.into()),
            provider,
            timestamp: Some(timestamp_now()),
        }
    }

    /// Reads an outcome from a posted payload.
    ///
    /// Only the `type` tag decides whether the payload is an outcome. Side
    /// fields of an unexpected JSON type are treated as absent, so a numeric
    /// `timestamp` or provider never drops an otherwise valid outcome.
    pub fn from_json(value: &JsonValue) -> Option<Self> {
        let object = value.as_object()?;
        let text = |key: &str| object.get(key).and_then(JsonValue::as_str).map(str::to_owned);

        match object.get("type")?.as_str()? {
            "OAUTH_SUCCESS" => Some(OutcomeMessage::Success {
                data: object.get("data").cloned().unwrap_or(JsonValue::Null),
                provider: text("provider"),
                timestamp: text("timestamp"),
            }),
            "OAUTH_ERROR" => Some(OutcomeMessage::Error {
                reason: text("error"),
                provider: text("provider"),
                timestamp: text("timestamp"),
            }),
            _ => None,
        }
    }

    pub fn provider(&self) -> Option<&str> {
        match self {
            OutcomeMessage::Success { provider, .. } | OutcomeMessage::Error { provider, .. } => {
                provider.as_deref()
            }
        }
    }

    /// Platform the outcome reports for: `provider`, else `data.platform` on
    /// success.
    pub fn reported_platform(&self) -> Option<&str> {
        match self {
            OutcomeMessage::Success { data, provider, .. } => provider
                .as_deref()
                .or_else(|| data.get("platform").and_then(JsonValue::as_str)),
            OutcomeMessage::Error { provider, .. } => provider.as_deref(),
        }
    }

    /// Whether this outcome may settle an invocation started for `platform`.
    ///
    /// Outcomes without a platform, or reporting [`UNKNOWN_PLATFORM`], match
    /// every invocation.
    pub fn concerns(&self, platform: &Platform) -> bool {
        match self.reported_platform() {
            Some(reported) if reported != UNKNOWN_PLATFORM => reported == platform.as_str(),
            _ => true,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, OutcomeMessage::Success { .. })
    }

    pub fn to_json(&self) -> JsonValue {
        serde_json::to_value(self).unwrap_or(JsonValue::Null)
    }
}

/// Resolved value of a successful relay invocation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RelaySuccess {
    pub success: bool,
    pub data: JsonValue,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub provider: Option<String>,
}

impl RelaySuccess {
    pub(crate) fn new(data: JsonValue, provider: Option<String>) -> Self {
        Self {
            success: true,
            data,
            provider,
        }
    }

    /// Returns the authorization code when the data bag carries one.
    pub fn code(&self) -> Option<&str> {
        self.data.get("code").and_then(JsonValue::as_str)
    }
}

/// ISO-8601 UTC timestamp with millisecond precision, e.g. `2024-05-01T10:00:00.000Z`.
pub fn timestamp_now() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}
