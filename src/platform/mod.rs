//! Runtime glue shared by the native (Tokio) and browser (wasm) builds.

pub mod runtime;
