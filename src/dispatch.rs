//! Dispatcher (D) — master-only round-robin fan-out to worker instances.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use tracing::warn;

use crate::context::ClusterContext;
use crate::error::{BrokerError, Result};
use crate::membership::ClusterMembership;
use crate::rpc::client::RpcClient;
use crate::rpc::wire::Status;
use crate::scs::SharedStore;

/// Round-robin dispatcher. The cursor advances on every attempt, not only
/// on success, so a failing peer doesn't get probed again before its
/// neighbors on the next send.
pub struct Dispatcher<S: SharedStore> {
    ctx: Arc<ClusterContext<S>>,
    membership: Arc<ClusterMembership<S>>,
    client: RpcClient,
    cursor: AtomicUsize,
}

impl<S: SharedStore> Dispatcher<S> {
    #[must_use]
    pub fn new(ctx: Arc<ClusterContext<S>>, membership: Arc<ClusterMembership<S>>) -> Self {
        Self {
            ctx,
            membership,
            client: RpcClient::new(),
            cursor: AtomicUsize::new(0),
        }
    }

    /// Returns the instance the cursor currently points at and advances it.
    /// Used both by `send_to_topic`'s attempt loop and by the standalone
    /// `GetNextInstance` RPC.
    pub fn next_instance(&self) -> Result<(String, String)> {
        let entries = self.membership.ordered_entries();
        if entries.is_empty() {
            return Err(BrokerError::NoInstances);
        }
        let idx = self.cursor.fetch_add(1, Ordering::SeqCst) % entries.len();
        Ok(entries[idx].clone())
    }

    /// Sends `message` to `topic` via round-robin instance selection,
    /// cascading to the next instance on failure.
    pub async fn send_to_topic(&self, topic: &str, message: &str) -> Result<String> {
        let entries = self.membership.ordered_entries();
        if entries.is_empty() {
            return Err(BrokerError::NoInstances);
        }

        let attempts = entries.len();
        let mut suspects = Vec::new();

        for _ in 0..attempts {
            let idx = self.cursor.fetch_add(1, Ordering::SeqCst) % entries.len();
            let (name, address) = &entries[idx];

            metrics::counter!("fluxmq_dispatch_attempts_total").increment(1);
            match self
                .client
                .send_message(address, topic, message, self.ctx.config.timings.dispatch_timeout)
                .await
            {
                Ok(resp) if matches!(resp.status, Status::Success) => return Ok(resp.message),
                Ok(resp) => {
                    metrics::counter!("fluxmq_dispatch_failures_total").increment(1);
                    warn!(instance = %name, message = %resp.message, "send_to_topic rejected");
                    suspects.push(name.clone());
                }
                Err(e) => {
                    metrics::counter!("fluxmq_dispatch_failures_total").increment(1);
                    warn!(instance = %name, error = %e, "send_to_topic attempt failed");
                    suspects.push(name.clone());
                }
            }
        }

        Err(BrokerError::AllUnreachable {
            suspects: suspects.len(),
        })
    }

    /// Iterates local partitions `0..partition_count` and returns the first
    /// non-empty dequeue.
    pub async fn receive_message(&self, topic: &str) -> Result<Option<String>> {
        let count = self.ctx.topics.partition_count(topic).await?;
        for p in 0..count {
            if let Some(msg) = self.ctx.topics.dequeue(topic, p).await? {
                return Ok(Some(msg));
            }
        }
        Ok(None)
    }
}
