//! Token extraction.
//!
//! A token is the first contiguous run of 32 or more ASCII alphanumerics in a
//! message. Only the first match is used; any further tokens in the same
//! message are ignored.

use std::fmt;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

/// Pattern used when the config does not override it.
pub const DEFAULT_TOKEN_PATTERN: &str = r"[A-Za-z0-9]{32,}";

/// Placeholder substituted by [`render_command`].
pub const TOKEN_PLACEHOLDER: &str = "{token}";

static DEFAULT_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(DEFAULT_TOKEN_PATTERN).expect("default token pattern is valid"));

/// An extracted token. Opaque; no validation beyond the pattern match.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Token(String);

impl Token {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for Token {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Finds tokens in message text.
#[derive(Debug, Clone)]
pub struct TokenExtractor {
    pattern: Regex,
}

impl TokenExtractor {
    /// Compile a custom pattern.
    pub fn new(pattern: &str) -> Result<Self, regex::Error> {
        if pattern == DEFAULT_TOKEN_PATTERN {
            return Ok(Self::default());
        }
        Ok(Self {
            pattern: Regex::new(pattern)?,
        })
    }

    /// First non-empty match in `text`, if any.
    pub fn extract(&self, text: &str) -> Option<Token> {
        self.pattern
            .find_iter(text)
            .find(|m| !m.is_empty())
            .map(|m| Token::new(m.as_str()))
    }

    /// True when the pattern accepts an empty string, which would turn
    /// every message into a request.
    pub fn matches_empty(&self) -> bool {
        self.pattern.is_match("")
    }

    pub fn pattern(&self) -> &str {
        self.pattern.as_str()
    }
}

impl Default for TokenExtractor {
    fn default() -> Self {
        Self {
            pattern: DEFAULT_REGEX.clone(),
        }
    }
}

/// Build the command sent to the analyzer by replacing every `{token}`.
pub fn render_command(template: &str, token: &Token) -> String {
    template.replace(TOKEN_PLACEHOLDER, token.as_str())
}
