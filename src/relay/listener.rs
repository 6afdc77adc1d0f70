use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use crate::relay::channel::{
    accept_message, normalize_origin, InboundMessage, MessageBus, MessageListener,
    MessageSubscription,
};
use crate::relay::error::{RelayError, RelayResult};
use crate::relay::types::{OutcomeMessage, RelaySuccess};

pub type SuccessCallback = Arc<dyn Fn(&RelaySuccess) + Send + Sync + 'static>;
pub type ErrorCallback = Arc<dyn Fn(&RelayError) + Send + Sync + 'static>;

/// Callbacks invoked for every accepted outcome message.
#[derive(Clone, Default)]
pub struct ListenerHandlers {
    pub on_success: Option<SuccessCallback>,
    pub on_error: Option<ErrorCallback>,
}

impl ListenerHandlers {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_success<F>(mut self, callback: F) -> Self
    where
        F: Fn(&RelaySuccess) + Send + Sync + 'static,
    {
        self.on_success = Some(Arc::new(callback));
        self
    }

    pub fn with_error<F>(mut self, callback: F) -> Self
    where
        F: Fn(&RelayError) + Send + Sync + 'static,
    {
        self.on_error = Some(Arc::new(callback));
        self
    }

    fn dispatch(&self, outcome: OutcomeMessage) {
        match outcome {
            OutcomeMessage::Success { data, provider, .. } => {
                if let Some(callback) = &self.on_success {
                    callback(&RelaySuccess::new(data, provider));
                }
            }
            OutcomeMessage::Error {
                reason, provider, ..
            } => {
                if let Some(callback) = &self.on_error {
                    callback(&RelayError::from_callback_reason(reason, provider));
                }
            }
        }
    }
}

/// Persistent subscription to authorization outcomes for components that do
/// not start the popup themselves.
///
/// The subscription can be paused with [`OAuthListener::set_enabled`] and is
/// removed from the bus on [`OAuthListener::unsubscribe`] or drop.
pub struct OAuthListener {
    enabled: Arc<AtomicBool>,
    subscription: Mutex<Option<MessageSubscription>>,
}

impl OAuthListener {
    pub fn subscribe(
        bus: Arc<dyn MessageBus>,
        origin: &str,
        handlers: ListenerHandlers,
    ) -> RelayResult<Self> {
        let origin = normalize_origin(origin)?;
        let enabled = Arc::new(AtomicBool::new(true));
        let gate = enabled.clone();
        let listener: MessageListener = Arc::new(move |message: &InboundMessage| {
            if !gate.load(Ordering::SeqCst) {
                return;
            }
            if let Some(outcome) = accept_message(&origin, message) {
                handlers.dispatch(outcome);
            }
        });
        let subscription = MessageSubscription::attach(bus, listener)?;

        Ok(Self {
            enabled,
            subscription: Mutex::new(Some(subscription)),
        })
    }

    pub fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::SeqCst);
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::SeqCst)
    }

    pub fn is_subscribed(&self) -> bool {
        self.subscription.lock().unwrap().is_some()
    }

    /// Removes the listener from the bus. Later calls are no-ops.
    pub fn unsubscribe(&self) {
        if let Some(subscription) = self.subscription.lock().unwrap().take() {
            subscription.unsubscribe();
        }
    }
}
