//! Outbound sends over the Bot API.

use async_trait::async_trait;
use teloxide::prelude::*;
use teloxide::types::{MessageId, Recipient, ThreadId};

use crate::relay::{ChatTransport, PeerRef, TransportError};

/// [`ChatTransport`] backed by a teloxide [`Bot`].
#[derive(Clone)]
pub struct TelegramTransport {
    bot: Bot,
}

impl TelegramTransport {
    pub fn new(bot: Bot) -> Self {
        Self { bot }
    }
}

/// Bot API address for a configured peer.
pub(crate) fn recipient(peer: &PeerRef) -> Recipient {
    match peer {
        PeerRef::Id(id) => Recipient::Id(ChatId(id.0)),
        PeerRef::Username(name) => Recipient::ChannelUsername(format!("@{}", name)),
    }
}

#[async_trait]
impl ChatTransport for TelegramTransport {
    async fn send_message(&self, target: &PeerRef, text: &str) -> Result<(), TransportError> {
        self.bot
            .send_message(recipient(target), text)
            .await
            .map(|_| ())
            .map_err(|e| TransportError::send(target, e))
    }

    async fn send_to_thread(
        &self,
        target: &PeerRef,
        thread: i32,
        text: &str,
    ) -> Result<(), TransportError> {
        self.bot
            .send_message(recipient(target), text)
            .message_thread_id(ThreadId(MessageId(thread)))
            .await
            .map(|_| ())
            .map_err(|e| TransportError::send(target, e))
    }
}
