//! Telegram Integration
//!
//! Runs the relay on top of a teloxide bot: authorizes at startup, probes
//! both peer chats, then dispatches incoming messages to the
//! [`TokenRelay`](crate::relay::TokenRelay) until Ctrl-C.

mod agent;
mod handler;
mod transport;

pub use agent::{CheckReport, PeerProbe, TelegramRelayAgent};
pub use handler::{BotIdentity, RelayState, Route};
pub use transport::TelegramTransport;
