//! Election & Heartbeat Engine (EHE) — single-leader election over the
//! shared coordination store, heartbeat-based liveness, and the worker-side
//! watchdog that triggers failover.
//!
//! One `ElectionEngine` runs per instance regardless of current role: the
//! heartbeat task is a no-op while `Role::Worker`, and the watchdog task is
//! a no-op while `Role::Master`. Each instance keeps its long-lived
//! background tasks running for its whole lifetime rather than spawning and
//! cancelling them on every role transition.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use rand::Rng;
use tracing::{info, warn};

use crate::context::{ClusterContext, Role};
use crate::error::{BrokerError, Result};
use crate::membership::ClusterMembership;
use crate::net::probe_tcp;
use crate::scs::SharedStore;

const MASTER_NODE: &str = "master_node";
const MASTER_NODE_PUBLIC: &str = "master_node_public";
const MASTER_NODE_PORT: &str = "master_node_port";
const MASTER_NODE_HEARTBEAT: &str = "master_node_heartbeat";
const MASTER_NODE_ELECTION: &str = "master_node_election";

fn priority_key(instance: &str) -> String {
    format!("election:priority:{instance}")
}

fn is_master_flag_key(instance: &str) -> String {
    format!("node:{instance}:is_master")
}

/// Result of a single worker-side liveness evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Liveness {
    /// `master_node` is absent -- skip the failure counter entirely.
    ImmediateFailover,
    /// Heartbeat absent and the direct probe failed too.
    ConfirmedFailure,
    Alive,
}

pub struct ElectionEngine<S: SharedStore> {
    ctx: Arc<ClusterContext<S>>,
    membership: Arc<ClusterMembership<S>>,
    failure_count: AtomicU32,
}

impl<S: SharedStore> ElectionEngine<S> {
    #[must_use]
    pub fn new(ctx: Arc<ClusterContext<S>>, membership: Arc<ClusterMembership<S>>) -> Self {
        Self {
            ctx,
            membership,
            failure_count: AtomicU32::new(0),
        }
    }

    /// Master-side heartbeat refresher. Runs for the lifetime of the
    /// process; only writes the heartbeat key while this instance holds
    /// `Role::Master`.
    pub async fn run_heartbeat_task(&self) {
        loop {
            if self.ctx.role().await == Role::Master {
                if let Err(e) = self
                    .ctx
                    .store
                    .set(
                        MASTER_NODE_HEARTBEAT,
                        "alive",
                        Some(self.ctx.config.timings.heartbeat_ttl),
                    )
                    .await
                {
                    warn!(error = %e, "failed to refresh master heartbeat");
                }
                tokio::time::sleep(self.ctx.config.timings.heartbeat_interval).await;
            } else {
                tokio::time::sleep(self.ctx.config.timings.watchdog_interval).await;
            }
        }
    }

    /// Worker-side watchdog. Waits out the startup grace period, then
    /// evaluates master liveness on every tick, escalating to an election
    /// attempt once the failure threshold is reached.
    pub async fn run_watchdog_task(&self) {
        tokio::time::sleep(self.ctx.config.timings.watchdog_grace).await;
        loop {
            if self.ctx.role().await != Role::Master {
                self.watchdog_tick().await;
            }
            tokio::time::sleep(self.ctx.config.timings.watchdog_interval).await;
        }
    }

    async fn watchdog_tick(&self) {
        match self.check_master_liveness().await {
            Liveness::Alive => {
                self.failure_count.store(0, Ordering::SeqCst);
            }
            Liveness::ImmediateFailover => {
                self.failure_count.store(0, Ordering::SeqCst);
                self.attempt_election_and_log().await;
            }
            Liveness::ConfirmedFailure => {
                let failures = self.failure_count.fetch_add(1, Ordering::SeqCst) + 1;
                if failures >= self.ctx.config.timings.failure_threshold {
                    self.failure_count.store(0, Ordering::SeqCst);
                    self.attempt_election_and_log().await;
                }
            }
        }
    }

    async fn attempt_election_and_log(&self) {
        match self.run_election().await {
            Ok(true) => info!("election won, promoted to master"),
            Ok(false) => {}
            Err(e) => warn!(error = %e, "election attempt aborted"),
        }
    }

    async fn check_master_liveness(&self) -> Liveness {
        let master_addr = match self.ctx.store.get(MASTER_NODE).await {
            Ok(Some(addr)) => addr,
            Ok(None) => return Liveness::ImmediateFailover,
            Err(e) => {
                warn!(error = %e, "failed to read master_node during liveness check");
                return Liveness::ConfirmedFailure;
            }
        };

        match self.ctx.store.get(MASTER_NODE_HEARTBEAT).await {
            Ok(Some(_)) => Liveness::Alive,
            Ok(None) => {
                if probe_tcp(&master_addr, self.ctx.config.timings.liveness_probe_timeout).await {
                    Liveness::Alive
                } else {
                    Liveness::ConfirmedFailure
                }
            }
            Err(e) => {
                warn!(error = %e, "failed to read master_node_heartbeat during liveness check");
                Liveness::ConfirmedFailure
            }
        }
    }

    /// Runs one election attempt to completion. Returns `Ok(true)` if this
    /// instance became master, `Ok(false)` if master returned before the
    /// lock was attempted
    /// (a benign abort, not an error), and `Err(ElectionAborted)` if the
    /// lock was denied or re-verification failed after acquiring it.
    pub async fn run_election(&self) -> Result<bool> {
        metrics::counter!("fluxmq_election_attempts_total").increment(1);
        let name = &self.ctx.instance.name;

        self.ctx
            .store
            .set(
                &priority_key(name),
                &self.ctx.instance.election_priority.to_string(),
                Some(self.ctx.config.timings.election_priority_ttl),
            )
            .await?;

        self.sleep_with_jitter().await;

        if self.check_master_liveness().await == Liveness::Alive {
            return Ok(false);
        }

        let Some(token) = self
            .ctx
            .store
            .try_lock(MASTER_NODE_ELECTION, self.ctx.config.timings.election_lock_ttl)
            .await?
        else {
            return Err(BrokerError::ElectionAborted(
                "master_node_election lock held by another candidate".to_string(),
            ));
        };

        let result = self.promote_under_lock().await;
        self.ctx.store.unlock(MASTER_NODE_ELECTION, &token).await?;
        result
    }

    async fn sleep_with_jitter(&self) {
        let (pre_lo, pre_hi) = self.ctx.config.timings.election_pre_delay;
        let (jit_lo, jit_hi) = self.ctx.config.timings.election_post_jitter;
        let (pre, jitter) = {
            let mut rng = rand::rng();
            let pre = rng.random_range(pre_lo.as_millis() as u64..=pre_hi.as_millis() as u64);
            let jitter = rng.random_range(jit_lo.as_millis() as u64..=jit_hi.as_millis() as u64);
            (pre, jitter)
        };
        tokio::time::sleep(std::time::Duration::from_millis(pre + jitter)).await;
    }

    async fn promote_under_lock(&self) -> Result<bool> {
        if self.check_master_liveness().await == Liveness::Alive {
            return Err(BrokerError::ElectionAborted(
                "master returned while election lock was held".to_string(),
            ));
        }

        self.ctx.store.delete(MASTER_NODE).await?;
        self.ctx.store.delete(MASTER_NODE_PUBLIC).await?;
        self.ctx.store.delete(MASTER_NODE_PORT).await?;
        self.ctx.store.delete(MASTER_NODE_HEARTBEAT).await?;

        let name = &self.ctx.instance.name;
        let local = &self.ctx.instance.local_address;
        let public = &self.ctx.instance.public_address;
        let port = public.rsplit_once(':').map_or("", |(_, p)| p);

        self.ctx.store.set(MASTER_NODE, local, None).await?;
        self.ctx.store.set(MASTER_NODE_PUBLIC, public, None).await?;
        self.ctx.store.set(MASTER_NODE_PORT, port, None).await?;
        self.ctx.store.set(&is_master_flag_key(name), "1", None).await?;

        self.ctx.set_role(Role::Master).await;

        self.membership.seed_from_state_file().await?;

        Ok(true)
    }

    /// Deletes the coordinator keys this instance owns as master. Called on
    /// graceful shutdown; failure is tolerated, TTLs and a future election
    /// will clean up any key left behind.
    pub async fn release_master_keys_on_shutdown(&self) {
        for key in [MASTER_NODE, MASTER_NODE_PUBLIC, MASTER_NODE_PORT, MASTER_NODE_HEARTBEAT] {
            if let Err(e) = self.ctx.store.delete(key).await {
                warn!(key, error = %e, "failed to delete master key on shutdown");
            }
        }
    }
}
