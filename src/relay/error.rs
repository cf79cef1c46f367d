use std::time::Duration;

use thiserror::Error;

use super::token::Token;
use super::transport::PeerRef;

/// Errors raised by a [`ChatTransport`](super::ChatTransport) implementation.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("failed to send to {target}: {reason}")]
    Send { target: String, reason: String },

    #[error("transport unavailable: {0}")]
    Unavailable(String),
}

impl TransportError {
    pub fn send(target: &PeerRef, reason: impl ToString) -> Self {
        TransportError::Send {
            target: target.to_string(),
            reason: reason.to_string(),
        }
    }
}

/// Errors surfaced by the relay operations.
///
/// None of these are fatal to the running process. The caller logs them and
/// moves on to the next event.
#[derive(Debug, Error)]
pub enum RelayError {
    #[error("forwarding token {token} timed out after {timeout:?}")]
    ForwardTimedOut { token: Token, timeout: Duration },

    #[error(transparent)]
    Transport(#[from] TransportError),
}

pub type Result<T> = std::result::Result<T, RelayError>;
