//! Contract Guardian - context composition and capability relay for
//! confidential contract families
//!
//! ## Components
//!
//! - **Context**: hierarchical TOML contexts with `${}` value and `@{}`
//!   context placeholders, templates and persistence
//! - **Contract**: contract families, operation tables, dependency-ordered
//!   creation and export bundles
//! - **Capability**: key store, secret envelopes and replay protection
//! - **Guardian**: the HTTP service token objects send capabilities to

pub mod capability;
pub mod client;
pub mod config;
pub mod context;
pub mod contract;
pub mod handlers;
pub mod routes;
pub mod server;
pub mod services;
pub mod types;

pub use config::Args;
pub use server::{run, AppState};
pub use types::{GuardianError, Result};
