//! HTTP server for the guardian service

pub mod http;

pub use http::{run, serve, AppState};
