//! Shared Coordination Store (SCS) abstraction.
//!
//! The SCS is the external, low-latency networked store the whole cluster
//! relies on for coordination state and message payloads. This module
//! defines the trait surface the rest of the crate programs against;
//! [`memory::InMemoryStore`] is the bundled implementation — a narrow,
//! fully-async trait with one concurrent in-memory backing.
//!
//! No implementation in this crate talks to a real external process: the
//! trait is the seam where a vendor-specific client (Redis, etcd, ...) would
//! be plugged in. Callers never retry; a `SharedStore` error is surfaced
//! immediately to the caller.

pub mod memory;

use std::time::Duration;

use async_trait::async_trait;

use crate::error::Result;

/// Opaque token identifying a held advisory lock. Only the holder that
/// presented the matching token at acquire time can release it.
pub type LockToken = String;

/// Shared Coordination Store: string get/set with TTL, atomic
/// set-if-not-exists, delete, membership sets, advisory locks, and
/// append-only lists.
#[async_trait]
pub trait SharedStore: Send + Sync + 'static {
    /// Reads a string key. Returns `None` if absent or expired.
    async fn get(&self, key: &str) -> Result<Option<String>>;

    /// Unconditionally sets a string key, optionally with a TTL.
    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<()>;

    /// Atomically sets a key only if it does not currently exist (or has
    /// expired). Returns `true` if the set happened.
    async fn set_nx(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<bool>;

    /// Deletes a key. No-op (not an error) if the key is already absent.
    async fn delete(&self, key: &str) -> Result<()>;

    /// Adds a member to a named set.
    async fn set_add(&self, set_key: &str, member: &str) -> Result<()>;

    /// Removes a member from a named set. No-op if absent.
    async fn set_remove(&self, set_key: &str, member: &str) -> Result<()>;

    /// Returns all current members of a named set (empty if the set has
    /// never been created — a missing set is an empty set, not an error).
    async fn set_members(&self, set_key: &str) -> Result<Vec<String>>;

    /// Appends a value to the tail of a named list, creating it if absent.
    async fn list_append(&self, list_key: &str, value: &str) -> Result<()>;

    /// Pops and returns the head of a named list. `None` if the list is
    /// empty or was never created.
    async fn list_pop_front(&self, list_key: &str) -> Result<Option<String>>;

    /// Returns the current length of a named list (0 if never created).
    async fn list_len(&self, list_key: &str) -> Result<usize>;

    /// Returns a snapshot of every entry currently in a named list, without
    /// mutating it. Used for `peek_all`-style reads.
    async fn list_snapshot(&self, list_key: &str) -> Result<Vec<String>>;

    /// Attempts to acquire a non-blocking advisory lock with the given TTL.
    /// Returns `Some(token)` on success, `None` if another holder currently
    /// owns the lock.
    async fn try_lock(&self, lock_key: &str, ttl: Duration) -> Result<Option<LockToken>>;

    /// Releases a lock previously acquired with `try_lock`, only if `token`
    /// still matches the current holder. A stale token is a silent no-op.
    async fn unlock(&self, lock_key: &str, token: &LockToken) -> Result<()>;
}
