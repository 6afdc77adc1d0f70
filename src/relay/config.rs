use std::time::Duration;

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);
pub const DEFAULT_RELAY_TIMEOUT: Duration = Duration::from_secs(5 * 60);
pub const DEFAULT_SETTLE_DELAY: Duration = Duration::from_millis(500);
pub const DEFAULT_AUTO_CLOSE_DELAY: Duration = Duration::from_millis(1500);

pub const DEFAULT_POPUP_WIDTH: u32 = 600;
pub const DEFAULT_POPUP_HEIGHT: u32 = 700;

/// Window geometry and chrome used when opening the authorization popup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PopupFeatures {
    pub width: u32,
    pub height: u32,
    pub left: Option<i32>,
    pub top: Option<i32>,
}

impl Default for PopupFeatures {
    fn default() -> Self {
        Self {
            width: DEFAULT_POPUP_WIDTH,
            height: DEFAULT_POPUP_HEIGHT,
            left: None,
            top: None,
        }
    }
}

impl PopupFeatures {
    pub fn with_size(mut self, width: u32, height: u32) -> Self {
        self.width = width;
        self.height = height;
        self
    }

    /// Positions the window in the middle of a screen of the given size.
    pub fn centered_on(mut self, screen_width: i32, screen_height: i32) -> Self {
        self.left = Some(((screen_width - self.width as i32) / 2).max(0));
        self.top = Some(((screen_height - self.height as i32) / 2).max(0));
        self
    }

    /// Serialises the features into the string accepted by `window.open`.
    pub fn to_feature_string(&self) -> String {
        let mut parts = vec![format!("width={}", self.width), format!("height={}", self.height)];
        if let Some(left) = self.left {
            parts.push(format!("left={left}"));
        }
        if let Some(top) = self.top {
            parts.push(format!("top={top}"));
        }
        parts.extend(
            [
                "toolbar=no",
                "menubar=no",
                "location=no",
                "status=no",
                "scrollbars=yes",
                "resizable=yes",
            ]
            .map(String::from),
        );
        parts.join(",")
    }
}

/// Timing and window settings for the opener side of the relay.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelayConfig {
    pub poll_interval: Duration,
    pub timeout: Duration,
    pub popup_features: PopupFeatures,
    pub popup_target: String,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            poll_interval: DEFAULT_POLL_INTERVAL,
            timeout: DEFAULT_RELAY_TIMEOUT,
            popup_features: PopupFeatures::default(),
            popup_target: "oauth-popup".to_string(),
        }
    }
}

impl RelayConfig {
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_popup_features(mut self, features: PopupFeatures) -> Self {
        self.popup_features = features;
        self
    }

    pub fn with_popup_target(mut self, target: impl Into<String>) -> Self {
        self.popup_target = target.into();
        self
    }
}

/// Timing settings for the page loaded inside the popup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CallbackConfig {
    pub settle_delay: Duration,
    pub auto_close_delay: Duration,
}

impl Default for CallbackConfig {
    fn default() -> Self {
        Self {
            settle_delay: DEFAULT_SETTLE_DELAY,
            auto_close_delay: DEFAULT_AUTO_CLOSE_DELAY,
        }
    }
}

impl CallbackConfig {
    pub fn with_settle_delay(mut self, delay: Duration) -> Self {
        self.settle_delay = delay;
        self
    }

    pub fn with_auto_close_delay(mut self, delay: Duration) -> Self {
        self.auto_close_delay = delay;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_features_have_minimal_chrome() {
        let features = PopupFeatures::default().to_feature_string();
        assert!(features.starts_with("width=600,height=700,"));
        assert!(features.contains("toolbar=no"));
        assert!(!features.contains("left="));
    }

    #[test]
    fn centering_never_goes_negative() {
        let features = PopupFeatures::default().centered_on(400, 1000);
        assert_eq!(features.left, Some(0));
        assert_eq!(features.top, Some(150));
    }

    #[test]
    fn defaults_match_documented_timings() {
        let relay = RelayConfig::default();
        assert_eq!(relay.poll_interval, Duration::from_secs(1));
        assert_eq!(relay.timeout, Duration::from_secs(300));

        let callback = CallbackConfig::default();
        assert_eq!(callback.settle_delay, Duration::from_millis(500));
        assert_eq!(callback.auto_close_delay, Duration::from_millis(1500));
    }
}
