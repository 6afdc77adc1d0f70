use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use crate::relay::{
    AuthorizationUrlFetcher, Platform, PopupFeatures, PopupOpener, PopupWindow, RelayError,
    RelayResult,
};

/// Popup whose lifecycle is driven by the test.
#[derive(Default)]
pub struct FakePopup {
    closed: AtomicBool,
    focus_calls: AtomicUsize,
    close_calls: AtomicUsize,
}

impl FakePopup {
    /// Simulates the user closing the window; no message is sent.
    pub fn close_by_user(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }

    pub fn is_closed_now(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    pub fn focus_calls(&self) -> usize {
        self.focus_calls.load(Ordering::SeqCst)
    }

    /// Number of times the relay (not the user) closed the window.
    pub fn close_calls(&self) -> usize {
        self.close_calls.load(Ordering::SeqCst)
    }
}

impl PopupWindow for FakePopup {
    fn is_closed(&self) -> bool {
        self.is_closed_now()
    }

    fn focus(&self) {
        self.focus_calls.fetch_add(1, Ordering::SeqCst);
    }

    fn close(&self) {
        self.close_calls.fetch_add(1, Ordering::SeqCst);
        self.closed.store(true, Ordering::SeqCst);
    }
}

#[derive(Default)]
pub struct FakePopupOpener {
    blocked: bool,
    open_calls: AtomicUsize,
    urls: Mutex<Vec<String>>,
    popups: Mutex<Vec<Arc<FakePopup>>>,
}

impl FakePopupOpener {
    pub fn new() -> Self {
        Self::default()
    }

    /// An opener that behaves like a browser with popups blocked.
    pub fn blocking() -> Self {
        Self {
            blocked: true,
            ..Self::default()
        }
    }

    pub fn open_calls(&self) -> usize {
        self.open_calls.load(Ordering::SeqCst)
    }

    pub fn last_url(&self) -> Option<String> {
        self.urls.lock().unwrap().last().cloned()
    }

    pub fn popups(&self) -> Vec<Arc<FakePopup>> {
        self.popups.lock().unwrap().clone()
    }

    pub fn last_popup(&self) -> Option<Arc<FakePopup>> {
        self.popups.lock().unwrap().last().cloned()
    }
}

impl PopupOpener for FakePopupOpener {
    fn open(
        &self,
        url: &str,
        _target: &str,
        _features: &PopupFeatures,
    ) -> Option<Box<dyn PopupWindow>> {
        self.open_calls.fetch_add(1, Ordering::SeqCst);
        self.urls.lock().unwrap().push(url.to_string());
        if self.blocked {
            return None;
        }
        let popup = Arc::new(FakePopup::default());
        self.popups.lock().unwrap().push(popup.clone());
        Some(Box::new(popup))
    }
}

/// Fetcher that hands out a fixed URL, or fails like a backend without one.
pub struct StaticUrlFetcher {
    url: Option<String>,
    requested: Mutex<Vec<String>>,
}

impl StaticUrlFetcher {
    pub fn returning(url: impl Into<String>) -> Self {
        Self {
            url: Some(url.into()),
            requested: Mutex::new(Vec::new()),
        }
    }

    pub fn without_url() -> Self {
        Self {
            url: None,
            requested: Mutex::new(Vec::new()),
        }
    }

    pub fn requested_platforms(&self) -> Vec<String> {
        self.requested.lock().unwrap().clone()
    }
}

#[cfg_attr(target_arch = "wasm32", async_trait::async_trait(?Send))]
#[cfg_attr(not(target_arch = "wasm32"), async_trait::async_trait)]
impl AuthorizationUrlFetcher for StaticUrlFetcher {
    async fn authorization_url(&self, platform: &Platform) -> RelayResult<String> {
        self.requested
            .lock()
            .unwrap()
            .push(platform.as_str().to_string());
        self.url.clone().ok_or_else(|| RelayError::FetchFailed {
            message: "No authorization URL received".into(),
        })
    }
}
