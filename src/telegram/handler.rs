//! Incoming message handler.
//!
//! Flattens a teloxide [`Message`] into an [`InboundMessage`] and routes it to
//! the relay operation for the peer it came from. Relay errors end here as
//! log lines; the dispatcher never sees them.

use std::sync::Arc;

use teloxide::prelude::*;
use teloxide::types::{MessageEntityKind, MessageKind, User, UserId};

use super::transport::TelegramTransport;
use crate::relay::{ConversationId, InboundMessage, PeerRef, Sender, TokenRelay};

/// Who the relay is logged in as. Needed to recognise mentions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BotIdentity {
    pub user_id: UserId,
    pub username: Option<String>,
}

impl BotIdentity {
    /// Whether a `@mention` entity's text names this account.
    pub fn is_named_by(&self, mention: &str) -> bool {
        match &self.username {
            Some(name) => mention
                .strip_prefix('@')
                .is_some_and(|m| m.eq_ignore_ascii_case(name)),
            None => false,
        }
    }
}

/// Which relay operation a chat feeds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    Requester,
    Analyzer,
    Ignore,
}

/// Shared dispatcher state.
pub struct RelayState {
    pub relay: TokenRelay<TelegramTransport>,
    pub requester: PeerRef,
    pub analyzer: PeerRef,
    pub identity: BotIdentity,
}

impl RelayState {
    pub fn route(&self, chat: ConversationId, username: Option<&str>) -> Route {
        route_for(&self.requester, &self.analyzer, chat, username)
    }
}

pub(crate) fn route_for(
    requester: &PeerRef,
    analyzer: &PeerRef,
    chat: ConversationId,
    username: Option<&str>,
) -> Route {
    if requester.matches(chat, username) {
        Route::Requester
    } else if analyzer.matches(chat, username) {
        Route::Analyzer
    } else {
        Route::Ignore
    }
}

/// Convert a teloxide message. `None` for messages without text or caption.
fn to_inbound(msg: &Message, identity: &BotIdentity) -> Option<InboundMessage> {
    let text = msg.text().or_else(|| msg.caption())?;

    let mentions_me = msg
        .parse_entities()
        .or_else(|| msg.parse_caption_entities())
        .map(|entities| {
            entities.iter().any(|e| match e.kind() {
                MessageEntityKind::Mention => identity.is_named_by(e.text()),
                MessageEntityKind::TextMention { user } => user.id == identity.user_id,
                _ => false,
            })
        })
        .unwrap_or(false);

    let thread_id = msg.thread_id.map(|t| t.0.0);
    // Topic messages implicitly reply to the topic's opening service message
    let is_reply = msg
        .reply_to_message()
        .is_some_and(|r| !matches!(r.kind, MessageKind::ForumTopicCreated(_)));

    Some(InboundMessage {
        conversation: ConversationId(msg.chat.id.0),
        chat_username: msg.chat.username().map(str::to_string),
        text: text.to_string(),
        sender: msg.from.as_ref().map(sender),
        thread_id,
        mentions_me,
        is_reply,
    })
}

fn sender(user: &User) -> Sender {
    Sender {
        id: user.id.0 as i64,
        username: user.username.clone(),
    }
}

/// Dispatcher endpoint for every incoming message.
pub async fn handle_message(msg: Message, state: Arc<RelayState>) -> ResponseResult<()> {
    let route = state.route(ConversationId(msg.chat.id.0), msg.chat.username());
    if route == Route::Ignore {
        tracing::trace!("Ignoring message from unrelated chat {}", msg.chat.id);
        return Ok(());
    }

    let Some(inbound) = to_inbound(&msg, &state.identity) else {
        tracing::debug!("Skipping non-text message in chat {}", msg.chat.id);
        return Ok(());
    };

    match route {
        Route::Requester => {
            if let Err(e) = state.relay.on_requester_message(&inbound).await {
                tracing::error!("Requester message from {} not forwarded: {}", inbound.conversation, e);
            }
        }
        Route::Analyzer => match state.relay.on_analyzer_message(&inbound).await {
            Ok(outcome) => tracing::debug!("Analyzer message handled: {:?}", outcome),
            Err(e) => tracing::error!("Analyzer reply not relayed: {}", e),
        },
        Route::Ignore => {}
    }

    Ok(())
}
