use std::fmt;
use std::time::Duration;

/// Reason posted by the callback page when the redirect carried neither a
/// code nor an error.
pub const NO_CODE_RECEIVED_REASON: &str = "No authorization code received";

/// Reason used when an `OAUTH_ERROR` message carries no usable `error`.
pub const DEFAULT_DENIAL_REASON: &str = "Authorization failed";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RelayError {
    /// The backend did not hand out an authorization URL.
    FetchFailed { message: String },
    /// The browser refused to open the popup window.
    PopupBlocked,
    /// The provider or the callback page reported an explicit error.
    AuthorizationDenied {
        reason: String,
        provider: Option<String>,
    },
    /// The callback page was reached without a code or an error.
    NoCodeReceived,
    /// The user closed the popup before any outcome arrived.
    ClosedBeforeCompletion,
    /// No outcome arrived before the deadline.
    TimedOut { after: Duration },
    /// The relay was assembled without a required collaborator.
    Configuration { message: String },
}

pub type RelayResult<T> = Result<T, RelayError>;

impl RelayError {
    pub fn code(&self) -> &'static str {
        match self {
            RelayError::FetchFailed { .. } => "relay/fetch-failed",
            RelayError::PopupBlocked => "relay/popup-blocked",
            RelayError::AuthorizationDenied { .. } => "relay/authorization-denied",
            RelayError::NoCodeReceived => "relay/no-code-received",
            RelayError::ClosedBeforeCompletion => "relay/closed-before-completion",
            RelayError::TimedOut { .. } => "relay/timed-out",
            RelayError::Configuration { .. } => "relay/configuration",
        }
    }

    /// Maps an error reason posted by the callback page to the matching variant.
    ///
    /// A missing or empty reason becomes [`DEFAULT_DENIAL_REASON`].
    pub(crate) fn from_callback_reason(reason: Option<String>, provider: Option<String>) -> Self {
        let reason = reason
            .filter(|reason| !reason.is_empty())
            .unwrap_or_else(|| DEFAULT_DENIAL_REASON.to_string());
        if reason == NO_CODE_RECEIVED_REASON {
            RelayError::NoCodeReceived
        } else {
            RelayError::AuthorizationDenied { reason, provider }
        }
    }
}

impl fmt::Display for RelayError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RelayError::FetchFailed { message } => {
                write!(f, "No authorization URL received: {message}")
            }
            RelayError::PopupBlocked => {
                write!(f, "Popup blocked. Please allow popups for this site")
            }
            RelayError::AuthorizationDenied { reason, provider } => match provider {
                Some(provider) => write!(f, "Authorization failed for {provider}: {reason}"),
                None => write!(f, "Authorization failed: {reason}"),
            },
            RelayError::NoCodeReceived => f.write_str(NO_CODE_RECEIVED_REASON),
            RelayError::ClosedBeforeCompletion => {
                write!(f, "Authorization window was closed before completion")
            }
            RelayError::TimedOut { after } => {
                write!(f, "Authorization timed out after {}s", after.as_secs())
            }
            RelayError::Configuration { message } => {
                write!(f, "Invalid relay configuration: {message}")
            }
        }
    }
}

impl std::error::Error for RelayError {}

pub fn fetch_failed(message: impl Into<String>) -> RelayError {
    RelayError::FetchFailed {
        message: message.into(),
    }
}

pub fn configuration_error(message: impl Into<String>) -> RelayError {
    RelayError::Configuration {
        message: message.into(),
    }
}
