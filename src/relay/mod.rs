//! Token Relay
//!
//! Pairs each token forwarded to the analyzer with the conversation that sent
//! it, so the analyzer's reply can be routed back to the right requester.
//! Transport-agnostic: the Telegram glue lives in [`crate::telegram`].

pub mod error;
pub mod pending;
pub mod service;
pub mod token;
pub mod transport;

pub use error::{RelayError, TransportError};
pub use pending::PendingRequests;
pub use service::{ReplyOutcome, ReplyPolicy, RelaySettings, RequestOutcome, TokenRelay};
pub use token::{Token, TokenExtractor};
pub use transport::{ChatTransport, ConversationId, InboundMessage, PeerRef, Sender};
