//! Shared types: the crate error and the wire messages

mod error;
pub mod messages;

pub use error::{GuardianError, Result};
pub use messages::*;
