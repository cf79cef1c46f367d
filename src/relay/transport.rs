//! Messaging boundary.
//!
//! The relay never talks to a network client directly. Outbound sends go
//! through [`ChatTransport`], and inbound events arrive already flattened into
//! [`InboundMessage`], so the correlation logic can be driven by any client
//! (the teloxide adapter in production, in-memory fakes in tests).

use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::error::TransportError;

/// Identifier of a chat on the messaging platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConversationId(pub i64);

impl fmt::Display for ConversationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// How a configured peer is addressed: numeric chat id or public `@username`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum PeerRef {
    Id(ConversationId),
    /// Stored without the leading `@`.
    Username(String),
}

impl PeerRef {
    /// Parse a peer from config. Accepts `-100123`, `42`, `@name` or `name`.
    pub fn parse(raw: &str) -> Option<Self> {
        let raw = raw.trim();
        if raw.is_empty() {
            return None;
        }
        if let Ok(id) = raw.parse::<i64>() {
            return Some(PeerRef::Id(ConversationId(id)));
        }
        let name = raw.strip_prefix('@').unwrap_or(raw);
        if name.is_empty() || !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
            return None;
        }
        Some(PeerRef::Username(name.to_string()))
    }

    /// Whether a chat with this id (and optional username) is this peer.
    pub fn matches(&self, chat: ConversationId, username: Option<&str>) -> bool {
        match self {
            PeerRef::Id(id) => *id == chat,
            PeerRef::Username(name) => username
                .map(|u| u.trim_start_matches('@').eq_ignore_ascii_case(name))
                .unwrap_or(false),
        }
    }

    /// Whether two configured peers address the same chat.
    pub fn same_as(&self, other: &PeerRef) -> bool {
        match (self, other) {
            (PeerRef::Id(a), PeerRef::Id(b)) => a == b,
            (PeerRef::Username(a), PeerRef::Username(b)) => a.eq_ignore_ascii_case(b),
            _ => false,
        }
    }
}

impl From<ConversationId> for PeerRef {
    fn from(id: ConversationId) -> Self {
        PeerRef::Id(id)
    }
}

impl fmt::Display for PeerRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PeerRef::Id(id) => write!(f, "{}", id),
            PeerRef::Username(name) => write!(f, "@{}", name),
        }
    }
}

/// Account that wrote an inbound message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sender {
    pub id: i64,
    pub username: Option<String>,
}

impl Sender {
    /// Whether `peer` names this account, by user id or `@username`.
    pub fn is(&self, peer: &PeerRef) -> bool {
        peer.matches(ConversationId(self.id), self.username.as_deref())
    }
}

/// A new-message event as seen by the relay.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundMessage {
    pub conversation: ConversationId,
    pub chat_username: Option<String>,
    pub text: String,
    /// `None` for anonymous admins and channel posts.
    pub sender: Option<Sender>,
    /// Forum topic the message was posted in.
    pub thread_id: Option<i32>,
    /// The message mentions this relay's account.
    pub mentions_me: bool,
    /// The message replies to an earlier message.
    pub is_reply: bool,
}

impl InboundMessage {
    pub fn new(conversation: ConversationId, text: impl Into<String>) -> Self {
        Self {
            conversation,
            chat_username: None,
            text: text.into(),
            sender: None,
            thread_id: None,
            mentions_me: false,
            is_reply: false,
        }
    }

    pub fn with_username(mut self, username: impl Into<String>) -> Self {
        self.chat_username = Some(username.into());
        self
    }

    pub fn sent_by(mut self, id: i64, username: Option<&str>) -> Self {
        self.sender = Some(Sender {
            id,
            username: username.map(str::to_string),
        });
        self
    }

    pub fn in_thread(mut self, thread_id: i32) -> Self {
        self.thread_id = Some(thread_id);
        self
    }

    pub fn mentioning(mut self) -> Self {
        self.mentions_me = true;
        self
    }

    pub fn replying(mut self) -> Self {
        self.is_reply = true;
        self
    }
}

/// Outbound half of the messaging client.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ChatTransport: Send + Sync {
    /// Send `text` to `target`. Resolves once the platform accepted the message.
    async fn send_message(&self, target: &PeerRef, text: &str) -> Result<(), TransportError>;

    /// Send into forum topic `thread` of `target`. Clients without topics post
    /// to the chat itself.
    async fn send_to_thread(
        &self,
        target: &PeerRef,
        _thread: i32,
        text: &str,
    ) -> Result<(), TransportError> {
        self.send_message(target, text).await
    }
}
