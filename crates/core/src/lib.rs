//! # Braid Core
//!
//! Shared types for the Braid crates: the error type, the execution
//! [`State`] map threaded through graph runs and actors, and helpers for
//! loading configuration files.

#![forbid(unsafe_code)]
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]

pub mod config;
pub mod duration;
pub mod error;
pub mod state;

pub use error::{Error, Result};
pub use state::State;
