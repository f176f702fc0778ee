//! Core logic for the anonymous student ↔ curator relay bot.
//!
//! Telegram lives behind [`messaging::port::MessagingPort`], implemented in the
//! adapter crate. Everything here is testable without a network.

pub mod commands;
pub mod config;
pub mod domain;
pub mod errors;
pub mod logging;
pub mod messaging;
pub mod policy;
pub mod relay;
pub mod sessions;
pub mod store;

#[cfg(test)]
mod test_support;

pub use errors::{Error, Result};
