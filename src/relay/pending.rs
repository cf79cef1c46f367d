//! Pending request store
//!
//! Maps token → originating conversation for every forwarded request that is
//! still waiting for a reply. Entries carry an insertion sequence number so the
//! store can answer "most recently inserted" and evict oldest-first.

use std::collections::{BTreeMap, HashMap};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};

use super::token::Token;
use super::transport::ConversationId;

/// Default TTL for pending entries (24 hours)
pub const DEFAULT_TTL: Duration = Duration::from_secs(86_400);

/// Default maximum number of pending entries
pub const DEFAULT_MAX_PENDING: usize = 10_000;

/// A pending request entry
#[derive(Debug, Clone)]
pub struct PendingEntry {
    pub conversation: ConversationId,
    pub requested_at: DateTime<Utc>,
    seq: u64,
    created_at: Instant,
}

impl PendingEntry {
    /// Insertion ticket. Used to make removals conditional on the entry not
    /// having been overwritten in the meantime.
    pub fn seq(&self) -> u64 {
        self.seq
    }
}

/// Token → conversation map with optional TTL and capacity bound.
///
/// `None` for either limit disables it.
#[derive(Debug)]
pub struct PendingRequests {
    entries: HashMap<Token, PendingEntry>,
    order: BTreeMap<u64, Token>,
    next_seq: u64,
    ttl: Option<Duration>,
    max_size: Option<usize>,
}

impl PendingRequests {
    /// Create a store with the default TTL and size limit
    pub fn new() -> Self {
        Self::with_limits(Some(DEFAULT_TTL), Some(DEFAULT_MAX_PENDING))
    }

    /// Create a store without any eviction
    pub fn unbounded() -> Self {
        Self::with_limits(None, None)
    }

    pub fn with_limits(ttl: Option<Duration>, max_size: Option<usize>) -> Self {
        Self {
            entries: HashMap::new(),
            order: BTreeMap::new(),
            next_seq: 0,
            ttl,
            max_size: max_size.filter(|n| *n > 0),
        }
    }

    /// Record `token → conversation`, replacing any existing entry for the
    /// token. Returns the insertion ticket.
    pub fn insert(&mut self, token: Token, conversation: ConversationId) -> u64 {
        self.detach(&token);
        self.evict_expired();

        if let Some(max) = self.max_size {
            while self.entries.len() >= max {
                if !self.evict_oldest() {
                    break;
                }
            }
        }

        let seq = self.next_seq;
        self.next_seq += 1;
        self.order.insert(seq, token.clone());
        self.entries.insert(
            token,
            PendingEntry {
                conversation,
                requested_at: Utc::now(),
                seq,
                created_at: Instant::now(),
            },
        );
        seq
    }

    /// Live entry for `token`, if present and not expired
    pub fn get(&self, token: &Token) -> Option<&PendingEntry> {
        self.entries.get(token).filter(|e| self.is_live(e))
    }

    #[cfg(test)]
    pub fn contains(&self, token: &Token) -> bool {
        self.get(token).is_some()
    }

    /// Most recently inserted live entry
    pub fn latest(&self) -> Option<(&Token, &PendingEntry)> {
        self.order.values().rev().find_map(|token| {
            self.entries
                .get(token)
                .filter(|e| self.is_live(e))
                .map(|e| (token, e))
        })
    }

    /// Remove `token` unconditionally
    pub fn remove(&mut self, token: &Token) -> Option<ConversationId> {
        self.detach(token).map(|e| e.conversation)
    }

    /// Remove `token` only if its current entry carries ticket `seq`
    pub fn remove_if_seq(&mut self, token: &Token, seq: u64) -> Option<ConversationId> {
        match self.entries.get(token) {
            Some(entry) if entry.seq == seq => self.remove(token),
            _ => None,
        }
    }

    /// Number of stored entries, expired ones included until purged
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Live entries, oldest first
    pub fn snapshot(&self) -> Vec<(Token, ConversationId)> {
        self.order
            .values()
            .filter_map(|token| {
                self.entries
                    .get(token)
                    .filter(|e| self.is_live(e))
                    .map(|e| (token.clone(), e.conversation))
            })
            .collect()
    }

    /// Remove all expired entries. Returns how many were dropped.
    ///
    /// `order` is sorted by insertion time, so expired entries always form
    /// its prefix and the sweep stops at the first live one.
    pub fn evict_expired(&mut self) -> usize {
        let Some(ttl) = self.ttl else {
            return 0;
        };
        let mut dropped = 0;
        loop {
            let expired = self
                .order
                .first_key_value()
                .and_then(|(_, token)| self.entries.get(token))
                .is_some_and(|e| e.created_at.elapsed() >= ttl);
            if !expired {
                break;
            }
            if let Some((_, token)) = self.order.pop_first() {
                self.entries.remove(&token);
                dropped += 1;
            }
        }
        if dropped > 0 {
            tracing::debug!("Dropped {} expired pending tokens", dropped);
        }
        dropped
    }

    fn evict_oldest(&mut self) -> bool {
        let Some((_, token)) = self.order.pop_first() else {
            return false;
        };
        self.entries.remove(&token);
        tracing::debug!("Evicted oldest pending token {}", token);
        true
    }

    fn detach(&mut self, token: &Token) -> Option<PendingEntry> {
        let entry = self.entries.remove(token)?;
        self.order.remove(&entry.seq);
        Some(entry)
    }

    fn is_live(&self, entry: &PendingEntry) -> bool {
        self.ttl
            .map(|ttl| entry.created_at.elapsed() < ttl)
            .unwrap_or(true)
    }
}

impl Default for PendingRequests {
    fn default() -> Self {
        Self::new()
    }
}
