//! Same-origin message channel between the popup document and its opener.
//!
//! The opener side listens on a [`MessageBus`]; the popup side posts through
//! an [`OpenerPort`]. Inbound events are passed through [`accept_message`],
//! which drops anything from a foreign origin or with an unexpected shape
//! without reporting it.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use serde_json::Value as JsonValue;
use url::Url;

use crate::relay::error::{configuration_error, RelayResult};
use crate::relay::types::OutcomeMessage;

/// A `message` event as seen by a listener: the sender origin plus the
/// structured-cloned payload converted to JSON.
#[derive(Debug, Clone, PartialEq)]
pub struct InboundMessage {
    pub origin: String,
    pub data: JsonValue,
}

impl InboundMessage {
    pub fn new(origin: impl Into<String>, data: JsonValue) -> Self {
        Self {
            origin: origin.into(),
            data,
        }
    }
}

pub type MessageListener = Arc<dyn Fn(&InboundMessage) + Send + Sync + 'static>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ListenerId(u64);

impl ListenerId {
    pub(crate) fn next(counter: &AtomicU64) -> Self {
        ListenerId(counter.fetch_add(1, Ordering::SeqCst))
    }
}

/// The window-level message event stream of one document.
pub trait MessageBus: Send + Sync {
    fn add_listener(&self, listener: MessageListener) -> RelayResult<ListenerId>;

    /// Removing an unknown or already removed id is a no-op.
    fn remove_listener(&self, id: ListenerId);

    /// Posts `message` to this document, like `window.postMessage(message, target_origin)`.
    fn post(&self, message: &JsonValue, target_origin: &str) -> RelayResult<()>;
}

/// The popup's link back to the document that opened it.
pub trait OpenerPort: Send + Sync {
    /// Posts `message` to the opener, restricted to the popup's own origin.
    fn post_to_opener(&self, message: &JsonValue) -> RelayResult<()>;
}

/// Keeps a listener registered until dropped or explicitly unsubscribed.
pub struct MessageSubscription {
    bus: Arc<dyn MessageBus>,
    id: Option<ListenerId>,
}

impl MessageSubscription {
    pub fn attach(bus: Arc<dyn MessageBus>, listener: MessageListener) -> RelayResult<Self> {
        let id = bus.add_listener(listener)?;
        Ok(Self { bus, id: Some(id) })
    }

    pub fn id(&self) -> Option<ListenerId> {
        self.id
    }

    pub fn unsubscribe(mut self) {
        self.detach();
    }

    fn detach(&mut self) {
        if let Some(id) = self.id.take() {
            self.bus.remove_listener(id);
        }
    }
}

impl Drop for MessageSubscription {
    fn drop(&mut self) {
        self.detach();
    }
}

/// Returns the outcome carried by `message` when it comes from
/// `expected_origin` and is tagged as one of the two outcome types.
pub fn accept_message(expected_origin: &str, message: &InboundMessage) -> Option<OutcomeMessage> {
    if message.origin != expected_origin {
        return None;
    }
    OutcomeMessage::from_json(&message.data)
}

/// Reduces a URL (or a bare origin) to its `scheme://host[:port]` serialisation.
pub fn normalize_origin(value: &str) -> RelayResult<String> {
    let url = Url::parse(value)
        .map_err(|err| configuration_error(format!("Invalid origin '{value}': {err}")))?;
    let origin = url.origin();
    if !origin.is_tuple() {
        return Err(configuration_error(format!(
            "Origin of '{value}' is opaque and cannot authenticate messages"
        )));
    }
    Ok(origin.ascii_serialization())
}

/// Message bus that lives entirely in process.
///
/// Useful for tests and for native hosts (webviews) that forward their own
/// window events into the relay.
pub struct InMemoryMessageBus {
    origin: String,
    next_id: AtomicU64,
    listeners: Mutex<BTreeMap<ListenerId, MessageListener>>,
}

impl InMemoryMessageBus {
    pub fn new(origin: impl Into<String>) -> Self {
        Self {
            origin: origin.into(),
            next_id: AtomicU64::new(1),
            listeners: Mutex::new(BTreeMap::new()),
        }
    }

    pub fn shared(origin: impl Into<String>) -> Arc<Self> {
        Arc::new(Self::new(origin))
    }

    pub fn origin(&self) -> &str {
        &self.origin
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.lock().unwrap().len()
    }

    /// Number of listeners ever registered, including removed ones.
    pub fn registrations(&self) -> u64 {
        self.next_id.load(Ordering::SeqCst) - 1
    }

    /// Delivers an event to every listener registered at the time of the call.
    pub fn deliver(&self, message: InboundMessage) {
        let snapshot: Vec<MessageListener> =
            self.listeners.lock().unwrap().values().cloned().collect();
        for listener in snapshot {
            listener(&message);
        }
    }
}

impl MessageBus for InMemoryMessageBus {
    fn add_listener(&self, listener: MessageListener) -> RelayResult<ListenerId> {
        let id = ListenerId::next(&self.next_id);
        self.listeners.lock().unwrap().insert(id, listener);
        Ok(id)
    }

    fn remove_listener(&self, id: ListenerId) {
        self.listeners.lock().unwrap().remove(&id);
    }

    fn post(&self, message: &JsonValue, target_origin: &str) -> RelayResult<()> {
        if target_origin != "*" && target_origin != self.origin {
            return Ok(());
        }
        self.deliver(InboundMessage::new(self.origin.clone(), message.clone()));
        Ok(())
    }
}

/// [`OpenerPort`] that delivers into an [`InMemoryMessageBus`] standing in for the opener.
pub struct InMemoryOpenerPort {
    opener: Arc<InMemoryMessageBus>,
    sender_origin: String,
}

impl InMemoryOpenerPort {
    pub fn new(opener: Arc<InMemoryMessageBus>, sender_origin: impl Into<String>) -> Self {
        Self {
            opener,
            sender_origin: sender_origin.into(),
        }
    }
}

impl OpenerPort for InMemoryOpenerPort {
    fn post_to_opener(&self, message: &JsonValue) -> RelayResult<()> {
        // The target origin is the sender's own origin; other openers never see it.
        if self.opener.origin() != self.sender_origin {
            return Ok(());
        }
        self.opener.deliver(InboundMessage::new(
            self.sender_origin.clone(),
            message.clone(),
        ));
        Ok(())
    }
}
