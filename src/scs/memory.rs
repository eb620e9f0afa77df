//! In-memory [`SharedStore`] backed by `DashMap`.
//!
//! Suitable for single-process tests and the bundled demo deployment.
//! Concurrent access to distinct keys never blocks; concurrent access to
//! the same key serializes on that shard's internal lock, matching the
//! `DashMap`-backed `HashMapStorage` pattern used for record storage
//! elsewhere in this codebase.

use std::collections::{HashSet, VecDeque};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use dashmap::DashMap;
use uuid::Uuid;

use super::{LockToken, SharedStore};
use crate::error::Result;

struct StringEntry {
    value: String,
    expires_at: Option<Instant>,
}

impl StringEntry {
    fn is_live(&self) -> bool {
        self.expires_at.map_or(true, |at| Instant::now() < at)
    }
}

struct LockEntry {
    token: LockToken,
    expires_at: Instant,
}

impl LockEntry {
    fn is_live(&self) -> bool {
        Instant::now() < self.expires_at
    }
}

/// In-memory `SharedStore`. Strings, sets, lists, and locks each live in
/// their own `DashMap` keyed by the caller-supplied key namespace — the
/// real store would multiplex these onto one keyspace, but a single
/// process never needs that distinction.
pub struct InMemoryStore {
    strings: DashMap<String, StringEntry>,
    sets: DashMap<String, HashSet<String>>,
    lists: DashMap<String, VecDeque<String>>,
    locks: DashMap<String, LockEntry>,
}

impl InMemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self {
            strings: DashMap::new(),
            sets: DashMap::new(),
            lists: DashMap::new(),
            locks: DashMap::new(),
        }
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SharedStore for InMemoryStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.strings.get(key).and_then(|e| {
            if e.is_live() {
                Some(e.value.clone())
            } else {
                None
            }
        }))
    }

    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<()> {
        self.strings.insert(
            key.to_string(),
            StringEntry {
                value: value.to_string(),
                expires_at: ttl.map(|d| Instant::now() + d),
            },
        );
        Ok(())
    }

    async fn set_nx(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<bool> {
        let mut acquired = false;
        self.strings
            .entry(key.to_string())
            .and_modify(|e| {
                if !e.is_live() {
                    e.value = value.to_string();
                    e.expires_at = ttl.map(|d| Instant::now() + d);
                    acquired = true;
                }
            })
            .or_insert_with(|| {
                acquired = true;
                StringEntry {
                    value: value.to_string(),
                    expires_at: ttl.map(|d| Instant::now() + d),
                }
            });
        Ok(acquired)
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.strings.remove(key);
        Ok(())
    }

    async fn set_add(&self, set_key: &str, member: &str) -> Result<()> {
        self.sets
            .entry(set_key.to_string())
            .or_default()
            .insert(member.to_string());
        Ok(())
    }

    async fn set_remove(&self, set_key: &str, member: &str) -> Result<()> {
        if let Some(mut set) = self.sets.get_mut(set_key) {
            set.remove(member);
        }
        Ok(())
    }

    async fn set_members(&self, set_key: &str) -> Result<Vec<String>> {
        Ok(self
            .sets
            .get(set_key)
            .map(|s| s.iter().cloned().collect())
            .unwrap_or_default())
    }

    async fn list_append(&self, list_key: &str, value: &str) -> Result<()> {
        self.lists
            .entry(list_key.to_string())
            .or_default()
            .push_back(value.to_string());
        Ok(())
    }

    async fn list_pop_front(&self, list_key: &str) -> Result<Option<String>> {
        Ok(self
            .lists
            .get_mut(list_key)
            .and_then(|mut l| l.pop_front()))
    }

    async fn list_len(&self, list_key: &str) -> Result<usize> {
        Ok(self.lists.get(list_key).map_or(0, |l| l.len()))
    }

    async fn list_snapshot(&self, list_key: &str) -> Result<Vec<String>> {
        Ok(self
            .lists
            .get(list_key)
            .map(|l| l.iter().cloned().collect())
            .unwrap_or_default())
    }

    async fn try_lock(&self, lock_key: &str, ttl: Duration) -> Result<Option<LockToken>> {
        let token = Uuid::new_v4().to_string();
        let mut acquired = None;
        self.locks
            .entry(lock_key.to_string())
            .and_modify(|e| {
                if !e.is_live() {
                    e.token = token.clone();
                    e.expires_at = Instant::now() + ttl;
                    acquired = Some(token.clone());
                }
            })
            .or_insert_with(|| {
                acquired = Some(token.clone());
                LockEntry {
                    token: token.clone(),
                    expires_at: Instant::now() + ttl,
                }
            });
        Ok(acquired)
    }

    async fn unlock(&self, lock_key: &str, token: &LockToken) -> Result<()> {
        if let Some(entry) = self.locks.get(lock_key) {
            if &entry.token != token {
                return Ok(());
            }
        } else {
            return Ok(());
        }
        self.locks.remove_if(lock_key, |_, e| &e.token == token);
        Ok(())
    }
}
