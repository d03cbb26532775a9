//! Services behind the HTTP routes

pub mod guardian;

pub use guardian::{capability_request, GuardianService, GuardianSettings};
