use std::sync::atomic::{AtomicBool, Ordering};

use crate::relay::config::PopupFeatures;
use crate::relay::error::{RelayError, RelayResult};
use crate::relay::logger::LOGGER;

/// A secondary window opened for the provider's authorization step.
///
/// Closing the window does not emit any message, so [`PopupWindow::is_closed`]
/// is the only way to observe a manual close.
pub trait PopupWindow: Send + Sync {
    fn is_closed(&self) -> bool;
    fn focus(&self);
    fn close(&self);
}

impl<T: PopupWindow + ?Sized> PopupWindow for std::sync::Arc<T> {
    fn is_closed(&self) -> bool {
        (**self).is_closed()
    }

    fn focus(&self) {
        (**self).focus()
    }

    fn close(&self) {
        (**self).close()
    }
}

/// Opens popup windows. Returns `None` when the browser blocked the popup.
pub trait PopupOpener: Send + Sync {
    fn open(
        &self,
        url: &str,
        target: &str,
        features: &PopupFeatures,
    ) -> Option<Box<dyn PopupWindow>>;
}

/// Exclusive ownership of one open popup for the lifetime of a relay invocation.
pub struct PopupHandle {
    window: Box<dyn PopupWindow>,
    close_requested: AtomicBool,
}

impl PopupHandle {
    /// Opens `url` and brings the new window to the foreground.
    ///
    /// A blocked popup is terminal: the browser only allows it again after a
    /// user gesture or a settings change.
    pub fn open(
        opener: &dyn PopupOpener,
        url: &str,
        target: &str,
        features: &PopupFeatures,
    ) -> RelayResult<Self> {
        let window = opener
            .open(url, target, features)
            .ok_or(RelayError::PopupBlocked)?;
        window.focus();
        Ok(Self {
            window,
            close_requested: AtomicBool::new(false),
        })
    }

    pub fn is_closed(&self) -> bool {
        self.close_requested.load(Ordering::SeqCst) || self.window.is_closed()
    }

    /// Closes the window if it is still open. Calling this again is a no-op.
    pub fn close(&self) {
        if self.close_requested.swap(true, Ordering::SeqCst) {
            return;
        }
        if self.window.is_closed() {
            return;
        }
        LOGGER.debug("closing authorization popup");
        self.window.close();
    }
}

impl std::fmt::Debug for PopupHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PopupHandle")
            .field("closed", &self.is_closed())
            .finish()
    }
}
