//! Token Relay
//!
//! Owns the pending-request store and implements the two inbound operations:
//! requester messages are turned into analyzer commands, analyzer messages are
//! routed back to the requester conversation that asked.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use super::error::{RelayError, Result};
use super::pending::PendingRequests;
use super::token::{render_command, Token, TokenExtractor};
use super::transport::{ChatTransport, ConversationId, InboundMessage, PeerRef};
use crate::utils::truncate_str;

/// Default bound on the forward to the analyzer.
pub const DEFAULT_FORWARD_TIMEOUT: Duration = Duration::from_secs(10);

/// Default analyzer command.
pub const DEFAULT_COMMAND_TEMPLATE: &str = "/analyze {token}";

const LOG_PREVIEW_BYTES: usize = 80;

/// How analyzer messages are matched to pending requests.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReplyPolicy {
    /// Reply must carry a pending token; the entry is removed after relaying.
    #[default]
    Strict,
    /// Any mention or reply goes to the most recent pending requester; nothing
    /// is removed.
    Loose,
}

/// Relay settings, resolved from config.
#[derive(Debug, Clone)]
pub struct RelaySettings {
    pub analyzer: PeerRef,
    pub command_template: String,
    pub forward_timeout: Duration,
    pub reply_policy: ReplyPolicy,
    pub rollback_on_timeout: bool,
    /// Only messages written by this account count as analyzer replies.
    pub analyzer_sender: Option<PeerRef>,
    /// Forum topic commands are posted to and replies are read from.
    pub analyzer_thread: Option<i32>,
}

impl RelaySettings {
    pub fn new(analyzer: PeerRef) -> Self {
        Self {
            analyzer,
            command_template: DEFAULT_COMMAND_TEMPLATE.to_string(),
            forward_timeout: DEFAULT_FORWARD_TIMEOUT,
            reply_policy: ReplyPolicy::default(),
            rollback_on_timeout: false,
            analyzer_sender: None,
            analyzer_thread: None,
        }
    }
}

/// Result of handling a requester message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RequestOutcome {
    NoToken,
    Forwarded { token: Token, command: String },
}

/// Result of handling an analyzer message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReplyOutcome {
    /// Forwarded back. `token` is `None` under the loose policy.
    Relayed {
        token: Option<Token>,
        conversation: ConversationId,
    },
    NoToken,
    UnknownToken(Token),
    NotAddressed,
    NoPending,
    /// Written by someone other than the configured analyzer account.
    ForeignSender,
    /// Posted outside the configured analyzer topic.
    OtherThread,
}

/// Correlates requests and replies between the two peers.
pub struct TokenRelay<T: ChatTransport> {
    transport: Arc<T>,
    extractor: TokenExtractor,
    settings: RelaySettings,
    pending: Mutex<PendingRequests>,
}

impl<T: ChatTransport> TokenRelay<T> {
    pub fn new(
        transport: Arc<T>,
        extractor: TokenExtractor,
        settings: RelaySettings,
        pending: PendingRequests,
    ) -> Self {
        Self {
            transport,
            extractor,
            settings,
            pending: Mutex::new(pending),
        }
    }

    /// Handle a message from the requester peer.
    ///
    /// The mapping is recorded before the forward. A timed-out or failed
    /// forward leaves it in place unless `rollback_on_timeout` is set.
    pub async fn on_requester_message(&self, message: &InboundMessage) -> Result<RequestOutcome> {
        let Some(token) = self.extractor.extract(&message.text) else {
            tracing::debug!(
                "No token in requester message from {}: {}",
                message.conversation,
                truncate_str(&message.text, LOG_PREVIEW_BYTES)
            );
            return Ok(RequestOutcome::NoToken);
        };

        let seq = {
            let mut pending = self.pending.lock().await;
            let seq = pending.insert(token.clone(), message.conversation);
            tracing::debug!("Pending requests: {}", pending.len());
            seq
        };

        let command = render_command(&self.settings.command_template, &token);
        let analyzer = &self.settings.analyzer;
        let send = async {
            match self.settings.analyzer_thread {
                Some(thread) => {
                    self.transport
                        .send_to_thread(analyzer, thread, &command)
                        .await
                }
                None => self.transport.send_message(analyzer, &command).await,
            }
        };

        let err = match tokio::time::timeout(self.settings.forward_timeout, send).await {
            Ok(Ok(())) => {
                tracing::info!(
                    "Sent token {} to {} for {}",
                    token,
                    self.settings.analyzer,
                    message.conversation
                );
                return Ok(RequestOutcome::Forwarded { token, command });
            }
            Ok(Err(e)) => RelayError::Transport(e),
            Err(_) => RelayError::ForwardTimedOut {
                token: token.clone(),
                timeout: self.settings.forward_timeout,
            },
        };

        if self.settings.rollback_on_timeout {
            let removed = self.pending.lock().await.remove_if_seq(&token, seq);
            if removed.is_some() {
                tracing::debug!("Rolled back pending token {}", token);
            }
        }
        tracing::warn!("Forward of token {} failed: {}", token, err);
        Err(err)
    }

    /// Handle a message from the analyzer peer according to the reply policy.
    pub async fn on_analyzer_message(&self, message: &InboundMessage) -> Result<ReplyOutcome> {
        if let Some(expected) = &self.settings.analyzer_sender {
            if !message.sender.as_ref().is_some_and(|s| s.is(expected)) {
                tracing::debug!(
                    "Ignoring analyzer chat message not written by {} (sender {:?})",
                    expected,
                    message.sender
                );
                return Ok(ReplyOutcome::ForeignSender);
            }
        }
        if let Some(thread) = self.settings.analyzer_thread {
            if message.thread_id != Some(thread) {
                tracing::debug!(
                    "Ignoring analyzer message outside topic {} (got {:?})",
                    thread,
                    message.thread_id
                );
                return Ok(ReplyOutcome::OtherThread);
            }
        }

        match self.settings.reply_policy {
            ReplyPolicy::Strict => self.relay_strict(message).await,
            ReplyPolicy::Loose => self.relay_loose(message).await,
        }
    }

    async fn relay_strict(&self, message: &InboundMessage) -> Result<ReplyOutcome> {
        let Some(token) = self.extractor.extract(&message.text) else {
            tracing::debug!(
                "No token in analyzer message: {}",
                truncate_str(&message.text, LOG_PREVIEW_BYTES)
            );
            return Ok(ReplyOutcome::NoToken);
        };

        let found = {
            let pending = self.pending.lock().await;
            pending
                .get(&token)
                .map(|e| (e.conversation, e.seq(), e.requested_at))
        };
        let Some((conversation, seq, requested_at)) = found else {
            tracing::info!("Analyzer replied with unknown token {}", token);
            return Ok(ReplyOutcome::UnknownToken(token));
        };

        self.transport
            .send_message(&PeerRef::Id(conversation), &message.text)
            .await?;

        self.pending.lock().await.remove_if_seq(&token, seq);
        tracing::info!(
            "Sent response for token {} back to {} (requested {})",
            token,
            conversation,
            requested_at.to_rfc3339()
        );
        Ok(ReplyOutcome::Relayed {
            token: Some(token),
            conversation,
        })
    }

    async fn relay_loose(&self, message: &InboundMessage) -> Result<ReplyOutcome> {
        if !message.mentions_me && !message.is_reply {
            tracing::debug!("Analyzer message neither mentions nor replies, skipping");
            return Ok(ReplyOutcome::NotAddressed);
        }

        let latest = {
            let pending = self.pending.lock().await;
            pending.latest().map(|(t, e)| (t.clone(), e.conversation))
        };
        let Some((token, conversation)) = latest else {
            tracing::info!("Analyzer message arrived with no pending requests");
            return Ok(ReplyOutcome::NoPending);
        };

        self.transport
            .send_message(&PeerRef::Id(conversation), &message.text)
            .await?;

        tracing::info!(
            "Sent analyzer message back to {} (latest pending token {})",
            conversation,
            token
        );
        Ok(ReplyOutcome::Relayed {
            token: None,
            conversation,
        })
    }

    pub async fn pending_len(&self) -> usize {
        self.pending.lock().await.snapshot().len()
    }

    /// Live pending entries, oldest first.
    pub async fn snapshot(&self) -> Vec<(Token, ConversationId)> {
        self.pending.lock().await.snapshot()
    }
}
