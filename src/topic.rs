//! Topic Registry (TR) — topic catalog and partition message queues backed
//! by the Shared Coordination Store.
//!
//! Partition routing uses a fixed-seed xxHash64 rather than a default
//! hasher: a stable, process-independent hash is required so the same
//! message always lands on the same partition across restarts.

use std::collections::HashMap;
use std::hash::Hasher;
use std::sync::Arc;

use dashmap::DashMap;
use twox_hash::XxHash64;

use crate::error::Result;
use crate::scs::SharedStore;

/// Seed for the partition-routing hash. Fixed so the same message always
/// lands on the same partition across restarts of the same process set.
const HASH_SEED: u64 = 0x6d6f6d5f73656564; // "mom_seed" in ASCII, as bytes

pub const DEFAULT_PARTITION_COUNT: u32 = 3;

fn partition_exists_key(topic: &str, partition_id: u32) -> String {
    format!("{topic}:partition_exists:{partition_id}")
}

fn partition_list_key(topic: &str, partition_id: u32) -> String {
    format!("{topic}:partition{partition_id}")
}

/// Deterministic, non-cryptographic hash used for partition routing.
#[must_use]
pub fn hash_partition(message: &[u8], partition_count: u32) -> u32 {
    let mut hasher = XxHash64::with_seed(HASH_SEED);
    hasher.write(message);
    (hasher.finish() % u64::from(partition_count.max(1))) as u32
}

/// Topic catalog and partition queues, layered over a [`SharedStore`].
///
/// Holds a local cache of partition counts to avoid re-probing marker keys
/// on every call; the cache is populated lazily and is never the source of
/// truth — every cache miss falls back to probing the SCS directly.
pub struct TopicRegistry<S: SharedStore> {
    store: Arc<S>,
    default_partition_count: u32,
    partition_counts: DashMap<String, u32>,
}

impl<S: SharedStore> TopicRegistry<S> {
    #[must_use]
    pub fn new(store: Arc<S>, default_partition_count: u32) -> Self {
        Self {
            store,
            default_partition_count,
            partition_counts: DashMap::new(),
        }
    }

    /// Probes marker keys starting at 0 to discover the partition count of
    /// a topic the cache does not know about. Returns 0 if the topic has
    /// no `partition_exists` markers at all (i.e. it does not exist).
    async fn discover_partition_count(&self, name: &str) -> Result<u32> {
        let mut count = 0u32;
        loop {
            let key = partition_exists_key(name, count);
            if self.store.get(&key).await?.is_some() {
                count += 1;
            } else {
                break;
            }
        }
        Ok(count)
    }

    /// Returns the partition count for `name`, or 0 if it is not a known
    /// topic. Populates the cache on a successful discovery.
    pub async fn partition_count(&self, name: &str) -> Result<u32> {
        if let Some(count) = self.partition_counts.get(name) {
            return Ok(*count);
        }
        let count = self.discover_partition_count(name).await?;
        if count > 0 {
            self.partition_counts.insert(name.to_string(), count);
        }
        Ok(count)
    }

    /// Creates a topic with `partition_count` partitions. Idempotent: a
    /// second call for an already-existing topic is a no-op.
    pub async fn create_topic(&self, name: &str, partition_count: u32) -> Result<()> {
        if self.partition_count(name).await? > 0 {
            return Ok(());
        }

        self.store.set_add("topics", name).await?;
        for p in 0..partition_count {
            self.store.set(&partition_exists_key(name, p), "1", None).await?;
        }
        self.partition_counts
            .insert(name.to_string(), partition_count);
        Ok(())
    }

    /// Deletes a topic and all its partitions' markers and message lists.
    /// Fails silently (not an error) if the topic is absent.
    pub async fn delete_topic(&self, name: &str) -> Result<()> {
        let count = self.partition_count(name).await?;
        if count == 0 {
            return Ok(());
        }

        self.store.set_remove("topics", name).await?;
        for p in 0..count {
            self.store.delete(&partition_exists_key(name, p)).await?;
            self.store.delete(&partition_list_key(name, p)).await?;
        }
        self.partition_counts.remove(name);
        Ok(())
    }

    /// Lists all known topic names.
    pub async fn list_topics(&self) -> Result<Vec<String>> {
        self.store.set_members("topics").await
    }

    /// Appends `message` to a topic, auto-creating it with the default
    /// partition count if it does not yet exist (the first writer's default
    /// partition count wins). Returns the partition id the message was
    /// routed to.
    pub async fn enqueue(&self, name: &str, message: &str) -> Result<u32> {
        self.create_topic(name, self.default_partition_count).await?;
        let count = self.partition_count(name).await?;
        let pid = hash_partition(message.as_bytes(), count);
        self.store
            .list_append(&partition_list_key(name, pid), message)
            .await?;
        metrics::counter!("fluxmq_messages_enqueued_total").increment(1);
        Ok(pid)
    }

    /// Pops the head message from a partition. Returns `None` if the
    /// partition is empty or the topic/partition is unknown — never an
    /// error.
    pub async fn dequeue(&self, name: &str, partition_id: u32) -> Result<Option<String>> {
        let popped = self
            .store
            .list_pop_front(&partition_list_key(name, partition_id))
            .await?;
        if popped.is_some() {
            metrics::counter!("fluxmq_messages_dequeued_total").increment(1);
        }
        Ok(popped)
    }

    /// Returns every message across all partitions, in partition-id order
    /// and FIFO within each partition, without mutating any queue.
    pub async fn peek_all(&self, name: &str) -> Result<Vec<String>> {
        let count = self.partition_count(name).await?;
        let mut all = Vec::new();
        for p in 0..count {
            let mut entries = self.store.list_snapshot(&partition_list_key(name, p)).await?;
            all.append(&mut entries);
        }
        Ok(all)
    }

    /// Returns the message count per partition for a topic.
    pub async fn partition_stats(&self, name: &str) -> Result<HashMap<u32, usize>> {
        let count = self.partition_count(name).await?;
        let mut stats = HashMap::with_capacity(count as usize);
        for p in 0..count {
            let len = self.store.list_len(&partition_list_key(name, p)).await?;
            stats.insert(p, len);
        }
        Ok(stats)
    }
}


/// Property-based tests for partition routing determinism and the
/// enqueue/dequeue round trip.
#[cfg(test)]
mod proptests {
    use proptest::prelude::*;

    use super::*;
    use crate::scs::memory::InMemoryStore;

    proptest! {
        #[test]
        fn hash_partition_is_deterministic_and_in_range(
            message in prop::collection::vec(any::<u8>(), 0..256),
            partition_count in 1_u32..64,
        ) {
            let p1 = hash_partition(&message, partition_count);
            let p2 = hash_partition(&message, partition_count);
            prop_assert_eq!(p1, p2);
            prop_assert!(p1 < partition_count);
        }

        #[test]
        fn enqueue_dequeue_round_trip_preserves_all_messages(
            messages in prop::collection::vec("[a-zA-Z0-9]{1,12}", 1..30),
            partition_count in 1_u32..8,
        ) {
            tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
                .unwrap()
                .block_on(async {
                    let reg = TopicRegistry::new(Arc::new(InMemoryStore::new()), partition_count);
                    reg.create_topic("t", partition_count).await.unwrap();
                    for m in &messages {
                        reg.enqueue("t", m).await.unwrap();
                    }

                    let mut received = Vec::new();
                    for p in 0..partition_count {
                        while let Some(m) = reg.dequeue("t", p).await.unwrap() {
                            received.push(m);
                        }
                    }

                    let mut expected = messages.clone();
                    expected.sort();
                    received.sort();
                    prop_assert_eq!(received, expected);
                    Ok(())
                })?;
        }
    }
}
