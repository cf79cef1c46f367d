//! Telegram relay agent
//!
//! Startup sequence: authorize (fatal on failure), probe both peers (warn
//! only), then run the dispatcher until Ctrl-C.

use std::sync::Arc;

use anyhow::Context;
use serde::Serialize;
use teloxide::prelude::*;

use super::handler::{self, BotIdentity, RelayState};
use super::transport::{recipient, TelegramTransport};
use crate::config::{AccountInfo, Config, ConfigError};
use crate::relay::{PeerRef, TokenRelay};

/// Result of resolving one configured peer at startup.
#[derive(Debug, Clone, Serialize)]
pub struct PeerProbe {
    pub role: &'static str,
    pub peer: String,
    pub reachable: bool,
    /// Chat id the peer resolved to
    #[serde(skip_serializing_if = "Option::is_none")]
    pub chat_id: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Problems with the resolved peers that do not stop the relay.
pub fn probe_warnings(probes: &[PeerProbe]) -> Vec<String> {
    let mut warnings = Vec::new();
    if let [first, second] = probes {
        if let (Some(a), Some(b)) = (first.chat_id, second.chat_id) {
            if a == b {
                warnings.push(format!(
                    "{} {} and {} {} are the same chat ({}); every message will be treated as a {} message",
                    first.role, first.peer, second.role, second.peer, a, first.role
                ));
            }
        }
    }
    warnings
}

/// Output of `tokenrelay check`.
#[derive(Debug, Clone, Serialize)]
pub struct CheckReport {
    pub bot_username: Option<String>,
    pub bot_id: u64,
    pub reply_policy: String,
    pub account: AccountInfo,
    pub peers: Vec<PeerProbe>,
    pub warnings: Vec<String>,
}

pub struct TelegramRelayAgent {
    bot: Bot,
    config: Config,
}

impl TelegramRelayAgent {
    pub fn new(config: Config) -> Result<Self, ConfigError> {
        config.validate()?;
        let bot = Bot::new(config.telegram.bot_token()?.expose());
        Ok(Self { bot, config })
    }

    /// Confirm the credentials work and learn who we are.
    pub async fn authorize(&self) -> anyhow::Result<BotIdentity> {
        tracing::info!("Checking Telegram authorization...");
        let me = self
            .bot
            .get_me()
            .await
            .context("Telegram authorization failed")?;
        let identity = BotIdentity {
            user_id: me.user.id,
            username: me.user.username.clone(),
        };
        tracing::info!(
            "Identified as @{} ({})",
            identity.username.as_deref().unwrap_or("<no username>"),
            identity.user_id.0
        );
        Ok(identity)
    }

    /// Resolve both peers. Failures are logged, not returned.
    pub async fn probe_peers(&self) -> anyhow::Result<Vec<PeerProbe>> {
        let peers = [
            ("requester", self.config.relay.requester_peer()?),
            ("analyzer", self.config.relay.analyzer_peer()?),
        ];

        let mut probes = Vec::with_capacity(peers.len());
        for (role, peer) in peers {
            probes.push(self.probe(role, &peer).await);
        }
        for warning in probe_warnings(&probes) {
            tracing::warn!("{}", warning);
        }
        Ok(probes)
    }

    async fn probe(&self, role: &'static str, peer: &PeerRef) -> PeerProbe {
        match self.bot.get_chat(recipient(peer)).await {
            Ok(chat) => {
                tracing::info!("Resolved {} chat {} to {}", role, peer, chat.id);
                PeerProbe {
                    role,
                    peer: peer.to_string(),
                    reachable: true,
                    chat_id: Some(chat.id.0),
                    error: None,
                }
            }
            Err(e) => {
                tracing::warn!("Could not access {} chat {}: {}", role, peer, e);
                PeerProbe {
                    role,
                    peer: peer.to_string(),
                    reachable: false,
                    chat_id: None,
                    error: Some(e.to_string()),
                }
            }
        }
    }

    /// Authorize and probe without starting the dispatcher.
    pub async fn check(&self) -> anyhow::Result<CheckReport> {
        let identity = self.authorize().await?;
        let peers = self.probe_peers().await?;
        Ok(CheckReport {
            bot_username: identity.username,
            bot_id: identity.user_id.0,
            reply_policy: format!("{:?}", self.config.relay.reply_policy).to_lowercase(),
            account: self.config.telegram.account(),
            warnings: probe_warnings(&peers),
            peers,
        })
    }

    /// Run the relay until the process is interrupted.
    pub async fn start(self) -> anyhow::Result<()> {
        let account = self.config.telegram.account();
        if account.api_id.is_some() || account.phone_number.is_some() {
            tracing::info!(
                "Account metadata: api_id={} phone={}",
                account.api_id.as_deref().unwrap_or("-"),
                account.phone_number.as_deref().unwrap_or("-")
            );
        }
        let identity = self.authorize().await?;
        self.probe_peers().await?;

        let relay_cfg = &self.config.relay;
        let relay = TokenRelay::new(
            Arc::new(TelegramTransport::new(self.bot.clone())),
            relay_cfg.extractor()?,
            relay_cfg.settings()?,
            relay_cfg.pending_store(),
        );
        let state = Arc::new(RelayState {
            relay,
            requester: relay_cfg.requester_peer()?,
            analyzer: relay_cfg.analyzer_peer()?,
            identity,
        });

        tracing::info!(
            "Relay is running: {} -> {} ({:?} replies)",
            state.requester,
            state.analyzer,
            relay_cfg.reply_policy
        );

        let handler = Update::filter_message().endpoint(handler::handle_message);
        Dispatcher::builder(self.bot.clone(), handler)
            .dependencies(dptree::deps![state])
            .default_handler(|_update| async {})
            .enable_ctrlc_handler()
            .build()
            .dispatch()
            .await;

        tracing::info!("Relay stopped");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn probe(role: &'static str, peer: &str, chat_id: Option<i64>) -> PeerProbe {
        PeerProbe {
            role,
            peer: peer.to_string(),
            reachable: chat_id.is_some(),
            chat_id,
            error: None,
        }
    }

    #[test]
    fn test_same_chat_under_two_names_is_reported() {
        let probes = [
            probe("requester", "@scan_room", Some(-1001234567890)),
            probe("analyzer", "-1001234567890", Some(-1001234567890)),
        ];
        let warnings = probe_warnings(&probes);
        assert_eq!(warnings.len(), 1);
        assert!(warnings[0].contains("same chat (-1001234567890)"));
    }

    #[test]
    fn test_distinct_or_unresolved_peers_are_fine() {
        let distinct = [
            probe("requester", "@requests", Some(-100)),
            probe("analyzer", "@scanner", Some(-200)),
        ];
        assert!(probe_warnings(&distinct).is_empty());

        let unresolved = [
            probe("requester", "@requests", None),
            probe("analyzer", "@scanner", None),
        ];
        assert!(probe_warnings(&unresolved).is_empty());
    }

    #[test]
    fn test_check_report_serializes_account_without_secrets() {
        let report = CheckReport {
            bot_username: Some("tokenrelaybot".to_string()),
            bot_id: 42,
            reply_policy: "strict".to_string(),
            account: AccountInfo {
                api_id: Some("24344346".to_string()),
                api_hash_set: true,
                phone_number: Some("+*******4567".to_string()),
            },
            peers: vec![probe("analyzer", "@scanner", Some(-200))],
            warnings: Vec::new(),
        };
        let json = serde_json::to_value(&report).expect("json");
        assert_eq!(json["account"]["api_hash_set"], true);
        assert_eq!(json["account"]["phone_number"], "+*******4567");
        assert_eq!(json["peers"][0]["chat_id"], -200);
        assert!(json["peers"][0].get("error").is_none());
    }
}
