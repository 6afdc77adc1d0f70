//! Test utilities shared across crate-level unit tests.

#[cfg(not(target_arch = "wasm32"))]
pub mod http;
pub mod relay;

#[cfg(not(target_arch = "wasm32"))]
pub use http::try_start_mock_server;
pub use relay::{FakePopup, FakePopupOpener, StaticUrlFetcher};
