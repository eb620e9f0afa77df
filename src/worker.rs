//! Worker Node (WN) — registration against the master and topic-state
//! reconciliation on join. The RPC server, heartbeat, and watchdog tasks
//! are spawned by the bootstrap binary; this module covers the parts of
//! the startup sequence that are pure application logic rather than task
//! lifecycle.

use std::sync::Arc;

use crate::context::ClusterContext;
use crate::error::{BrokerError, Result};
use crate::membership::ClusterMembership;
use crate::net::avoid_hairpin;
use crate::rpc::client::RpcClient;
use crate::rpc::wire::Status;
use crate::scs::SharedStore;

const MASTER_NODE_PUBLIC: &str = "master_node_public";
const MASTER_NODE: &str = "master_node";

pub struct WorkerNode<S: SharedStore> {
    ctx: Arc<ClusterContext<S>>,
    membership: Arc<ClusterMembership<S>>,
    client: RpcClient,
}

impl<S: SharedStore> WorkerNode<S> {
    #[must_use]
    pub fn new(ctx: Arc<ClusterContext<S>>, membership: Arc<ClusterMembership<S>>) -> Self {
        Self {
            ctx,
            membership,
            client: RpcClient::new(),
        }
    }

    /// Resolves the master's RPC address: an explicit `master_url` override
    /// takes precedence, then `master_node_public`, then `master_node`.
    pub async fn resolve_master_address(&self) -> Result<Option<String>> {
        if let Some(url) = &self.ctx.config.master_url {
            return Ok(Some(url.clone()));
        }
        if let Some(addr) = self.ctx.store.get(MASTER_NODE_PUBLIC).await? {
            return Ok(Some(addr));
        }
        self.ctx.store.get(MASTER_NODE).await
    }

    /// Registers this instance so the Dispatcher can select it, or
    /// self-registers directly when this instance already holds
    /// `Role::Master` — the master serves locally as well as forwarding,
    /// so it is its own first registrant.
    pub async fn register(&self, bound_port: u16) -> Result<()> {
        if self.ctx.is_master_fast() {
            let host = local_host(&self.ctx.instance.local_address);
            self.membership
                .register(&self.ctx.instance.name, host, bound_port)
                .await?;
            return Ok(());
        }

        let Some(master_addr) = self.resolve_master_address().await? else {
            return Err(BrokerError::Unreachable(
                "no master address known to register against".to_string(),
            ));
        };

        let public_host = local_host(&self.ctx.instance.public_address);
        let local = local_host(&self.ctx.instance.local_address);
        let dial_addr = avoid_hairpin(&master_addr, public_host, local);

        let response = self
            .client
            .register_mom_instance(
                &dial_addr,
                &self.ctx.instance.name,
                local,
                bound_port,
                self.ctx.config.timings.register_timeout,
            )
            .await?;

        if !matches!(response.status, Status::Success) {
            return Err(BrokerError::Unreachable(response.message));
        }
        Ok(())
    }

    /// Reconciles topic metadata from the state file into the local topic
    /// registry: every persisted topic's partition markers and empty lists
    /// become locally observable via the SCS.
    pub async fn reconcile_topics_from_state_file(&self) -> Result<()> {
        let doc = self.ctx.state_file.load().await?;
        for (name, entry) in doc.topics {
            self.ctx.topics.create_topic(&name, entry.partitions).await?;
        }
        Ok(())
    }
}

fn local_host(address: &str) -> &str {
    address.rsplit_once(':').map_or(address, |(host, _)| host)
}
