//! Configuration types

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use zeroize::{Zeroize, ZeroizeOnDrop};

use super::ConfigError;
use crate::relay::pending::{DEFAULT_MAX_PENDING, DEFAULT_TTL};
use crate::relay::service::{DEFAULT_COMMAND_TEMPLATE, DEFAULT_FORWARD_TIMEOUT};
use crate::relay::token::{DEFAULT_TOKEN_PATTERN, TOKEN_PLACEHOLDER};
use crate::relay::{PeerRef, PendingRequests, RelaySettings, ReplyPolicy, TokenExtractor};

/// A credential that is wiped from memory on drop and never printed.
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize, Zeroize, ZeroizeOnDrop)]
#[serde(transparent)]
pub struct Secret(String);

impl Secret {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.trim().is_empty()
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Secret(***)")
    }
}

/// Top-level configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub telegram: TelegramConfig,

    #[serde(default)]
    pub relay: RelayConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Telegram account and bot credentials
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TelegramConfig {
    /// Application id of the account the relay was registered under
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_hash: Option<Secret>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone_number: Option<String>,

    /// Bot API token used by the transport
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bot_token: Option<Secret>,
}

impl TelegramConfig {
    pub fn bot_token(&self) -> Result<&Secret, ConfigError> {
        self.bot_token
            .as_ref()
            .filter(|t| !t.is_empty())
            .ok_or_else(|| ConfigError::Invalid("telegram.bot_token is not set".to_string()))
    }

    /// Check the account fields that are present. All three are optional
    /// since the Bot API transport only needs `bot_token`.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if let Some(id) = self.api_id.as_deref() {
            if !matches!(id.trim().parse::<i32>(), Ok(n) if n > 0) {
                return Err(ConfigError::Invalid(format!(
                    "telegram.api_id must be a positive integer, got {id:?}"
                )));
            }
        }
        if let Some(phone) = self.phone_number.as_deref() {
            let digits = phone.trim().strip_prefix('+').unwrap_or_default();
            if !(7..=15).contains(&digits.len()) || !digits.chars().all(|c| c.is_ascii_digit()) {
                return Err(ConfigError::Invalid(
                    "telegram.phone_number must be in international format, e.g. +15551234567"
                        .to_string(),
                ));
            }
        }
        if self.api_id.is_some() != self.api_hash.as_ref().is_some_and(|h| !h.is_empty()) {
            return Err(ConfigError::Invalid(
                "telegram.api_id and telegram.api_hash must be set together".to_string(),
            ));
        }
        Ok(())
    }

    /// What `check` prints about the account. The phone is masked.
    pub fn account(&self) -> AccountInfo {
        AccountInfo {
            api_id: self.api_id.as_ref().map(|id| id.trim().to_string()),
            api_hash_set: self.api_hash.as_ref().is_some_and(|h| !h.is_empty()),
            phone_number: self.phone_number.as_deref().map(mask_phone),
        }
    }
}

/// Account metadata as reported by `tokenrelay check`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AccountInfo {
    pub api_id: Option<String>,
    pub api_hash_set: bool,
    pub phone_number: Option<String>,
}

fn mask_phone(phone: &str) -> String {
    let phone = phone.trim();
    let keep = phone.len().saturating_sub(4);
    phone
        .char_indices()
        .map(|(i, c)| if i < keep && c.is_ascii_digit() { '*' } else { c })
        .collect()
}

/// Relay behaviour
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RelayConfig {
    /// Peer whose messages carry tokens (`@name` or chat id)
    pub requester: String,

    /// Peer that receives commands and answers them
    pub analyzer: String,

    pub token_pattern: String,

    /// Command sent to the analyzer; `{token}` is replaced with the token
    pub command_template: String,

    pub forward_timeout_secs: u64,

    pub reply_policy: ReplyPolicy,

    /// 0 disables expiry
    pub pending_ttl_secs: u64,

    /// 0 disables the size bound
    pub max_pending: usize,

    /// Drop the pending entry when the forward times out or fails
    pub rollback_on_timeout: bool,

    /// Account allowed to answer in the analyzer chat (`@name` or user id).
    /// Empty accepts any member.
    pub analyzer_sender: String,

    /// Forum topic in the analyzer chat to post to and read from
    #[serde(skip_serializing_if = "Option::is_none")]
    pub analyzer_thread_id: Option<i32>,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            requester: String::new(),
            analyzer: String::new(),
            token_pattern: DEFAULT_TOKEN_PATTERN.to_string(),
            command_template: DEFAULT_COMMAND_TEMPLATE.to_string(),
            forward_timeout_secs: DEFAULT_FORWARD_TIMEOUT.as_secs(),
            reply_policy: ReplyPolicy::default(),
            pending_ttl_secs: DEFAULT_TTL.as_secs(),
            max_pending: DEFAULT_MAX_PENDING,
            rollback_on_timeout: false,
            analyzer_sender: String::new(),
            analyzer_thread_id: None,
        }
    }
}

impl RelayConfig {
    pub fn requester_peer(&self) -> Result<PeerRef, ConfigError> {
        parse_peer("relay.requester", &self.requester)
    }

    pub fn analyzer_peer(&self) -> Result<PeerRef, ConfigError> {
        parse_peer("relay.analyzer", &self.analyzer)
    }

    pub fn analyzer_sender_peer(&self) -> Result<Option<PeerRef>, ConfigError> {
        if self.analyzer_sender.trim().is_empty() {
            return Ok(None);
        }
        parse_peer("relay.analyzer_sender", &self.analyzer_sender).map(Some)
    }

    pub fn extractor(&self) -> Result<TokenExtractor, ConfigError> {
        TokenExtractor::new(&self.token_pattern).map_err(|e| {
            ConfigError::Invalid(format!("relay.token_pattern is not a valid regex: {e}"))
        })
    }

    pub fn settings(&self) -> Result<RelaySettings, ConfigError> {
        Ok(RelaySettings {
            analyzer: self.analyzer_peer()?,
            command_template: self.command_template.clone(),
            forward_timeout: Duration::from_secs(self.forward_timeout_secs),
            reply_policy: self.reply_policy,
            rollback_on_timeout: self.rollback_on_timeout,
            analyzer_sender: self.analyzer_sender_peer()?,
            analyzer_thread: self.analyzer_thread_id,
        })
    }

    /// Empty store with the configured limits
    pub fn pending_store(&self) -> PendingRequests {
        let ttl = (self.pending_ttl_secs > 0).then(|| Duration::from_secs(self.pending_ttl_secs));
        let max = (self.max_pending > 0).then_some(self.max_pending);
        PendingRequests::with_limits(ttl, max)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let requester = self.requester_peer()?;
        let analyzer = self.analyzer_peer()?;
        if requester.same_as(&analyzer) {
            return Err(ConfigError::Invalid(format!(
                "relay.requester and relay.analyzer must be different chats (both are {requester})"
            )));
        }
        self.analyzer_sender_peer()?;
        if self.extractor()?.matches_empty() {
            return Err(ConfigError::Invalid(format!(
                "relay.token_pattern {:?} matches an empty string",
                self.token_pattern
            )));
        }
        if self.analyzer_thread_id.is_some_and(|t| t <= 0) {
            return Err(ConfigError::Invalid(
                "relay.analyzer_thread_id must be a positive message id".to_string(),
            ));
        }
        if !self.command_template.contains(TOKEN_PLACEHOLDER) {
            return Err(ConfigError::Invalid(format!(
                "relay.command_template must contain {TOKEN_PLACEHOLDER}"
            )));
        }
        if self.forward_timeout_secs == 0 {
            return Err(ConfigError::Invalid(
                "relay.forward_timeout_secs must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }
}

fn parse_peer(field: &str, raw: &str) -> Result<PeerRef, ConfigError> {
    if raw.trim().is_empty() {
        return Err(ConfigError::Invalid(format!("{field} is not set")));
    }
    PeerRef::parse(raw).ok_or_else(|| {
        ConfigError::Invalid(format!(
            "{field} must be a chat id or @username, got {raw:?}"
        ))
    })
}

/// Logging output
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default filter directive; `RUST_LOG` takes precedence
    pub level: String,

    pub json: bool,

    /// Also write a daily rolling log file
    pub file: bool,

    /// Directory for log files (defaults to `~/.tokenrelay/logs`)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub directory: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
            file: false,
            directory: None,
        }
    }
}

impl LoggingConfig {
    pub fn log_dir(&self) -> PathBuf {
        self.directory
            .clone()
            .unwrap_or_else(|| super::tokenrelay_home().join("logs"))
    }
}
