//! Popup-based OAuth authorization relay.
//!
//! Opens a provider's authorization page in a popup, waits for the popup to
//! report success or failure through same-origin window messages (or for the
//! user to close it, or for the deadline to pass) and hands a single result
//! back to the caller. See [`relay`] for the full flow.

pub mod logger;
pub mod platform;
pub mod relay;

#[cfg(test)]
pub mod test_support;
