//! tokenrelay
//!
//! Relays tokens from a requester chat to an analyzer chat on Telegram and
//! routes the analyzer's replies back to the conversation that asked.

pub mod cli;
pub mod config;
pub mod logging;
pub mod relay;
#[cfg(feature = "telegram")]
pub mod telegram;
pub mod utils;

#[cfg(test)]
mod tests;

/// Crate version, reported by the CLI.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
