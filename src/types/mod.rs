//! Shared types for the relay

pub mod error;

pub use error::{RelayError, Result};
