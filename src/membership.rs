//! Cluster Membership (CM) — master-only worker registry.
//!
//! Authoritative only on the instance currently in `Role::Master`; every
//! mutation is mirrored to the state file synchronously, so the state file
//! never lags the live registry.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{info, warn};

use crate::context::ClusterContext;
use crate::error::{BrokerError, Result};
use crate::net::probe_tcp;
use crate::scs::SharedStore;

/// Worker registry plus the order workers were registered in, so
/// round-robin dispatch can cycle in registration order rather than any
/// order a `HashMap` happens to iterate in.
#[derive(Default, Clone)]
struct Registry {
    order: Vec<String>,
    addresses: HashMap<String, String>,
}

/// In-memory worker registry, mirrored to the state file on every change.
pub struct ClusterMembership<S: SharedStore> {
    ctx: Arc<ClusterContext<S>>,
    registry: Mutex<Registry>,
}

impl<S: SharedStore> ClusterMembership<S> {
    #[must_use]
    pub fn new(ctx: Arc<ClusterContext<S>>) -> Self {
        Self {
            ctx,
            registry: Mutex::new(Registry::default()),
        }
    }

    /// Registers `name` at `host:port`. If the address is already
    /// registered, returns `AlreadyExists`. If `name` is taken by a
    /// different address, a numeric suffix is appended until a free name is
    /// found, and the synthesized name is returned.
    pub async fn register(&self, name: &str, host: &str, port: u16) -> Result<String> {
        let address = format!("{host}:{port}");
        let snapshot = {
            let mut registry = self.registry.lock();
            if registry.addresses.values().any(|a| a == &address) {
                return Err(BrokerError::AlreadyExists(address));
            }

            let mut candidate = name.to_string();
            let mut suffix = 1u32;
            while registry.addresses.contains_key(&candidate) {
                suffix += 1;
                candidate = format!("{name}-{suffix}");
            }

            registry.addresses.insert(candidate.clone(), address.clone());
            registry.order.push(candidate.clone());
            info!(name = %candidate, address = %address, "worker registered");
            let snapshot = registry.addresses.clone();
            (candidate, snapshot)
        };

        let (accepted_name, instances) = snapshot;
        self.ctx.state_file.put_instances(&instances).await?;
        Ok(accepted_name)
    }

    /// Removes `name` from the registry. No-op (not an error) if absent.
    pub async fn unregister(&self, name: &str) -> Result<()> {
        let instances = {
            let mut registry = self.registry.lock();
            if registry.addresses.remove(name).is_none() {
                return Ok(());
            }
            registry.order.retain(|n| n != name);
            registry.addresses.clone()
        };
        self.ctx.state_file.put_instances(&instances).await
    }

    /// Returns a snapshot of the current registry.
    #[must_use]
    pub fn list(&self) -> HashMap<String, String> {
        self.registry.lock().addresses.clone()
    }

    /// Returns `(name, address)` pairs in registration order -- the order
    /// the round-robin dispatcher cycles through.
    #[must_use]
    pub fn ordered_entries(&self) -> Vec<(String, String)> {
        let registry = self.registry.lock();
        registry
            .order
            .iter()
            .filter_map(|name| registry.addresses.get(name).map(|addr| (name.clone(), addr.clone())))
            .collect()
    }

    /// Probes every registered address with a connection-readiness future
    /// bounded by `health_check_timeout`. When `auto_remove` is set, offline
    /// entries are unregistered; otherwise they are only logged. Returns the
    /// names classified offline.
    pub async fn health_check(&self, auto_remove: bool) -> Result<Vec<String>> {
        let timeout = self.ctx.config.timings.health_check_timeout;
        let snapshot = self.list();

        let mut offline = Vec::new();
        for (name, address) in &snapshot {
            if !probe_tcp(address, timeout).await {
                offline.push(name.clone());
            }
        }

        if offline.is_empty() {
            return Ok(offline);
        }

        if auto_remove {
            for name in &offline {
                warn!(name = %name, "health check failed, removing from registry");
                self.unregister(name).await?;
            }
        } else {
            for name in &offline {
                warn!(name = %name, "health check failed, operator action required");
            }
        }

        Ok(offline)
    }

    /// Master-only periodic sweep: probes every registered worker every
    /// `health_check_interval` and auto-removes unreachable ones. No-op
    /// while this instance is not master; runs for the lifetime of the
    /// process like the election engine's heartbeat and watchdog tasks.
    pub async fn run_health_check_task(&self) {
        loop {
            tokio::time::sleep(self.ctx.config.timings.health_check_interval).await;
            if self.ctx.is_master_fast() {
                if let Err(e) = self.health_check(true).await {
                    warn!(error = %e, "periodic health check failed");
                }
            }
        }
    }

    /// Seeds the in-memory registry from the state file, used when a newly
    /// elected master takes over. Does not re-persist -- the data already
    /// came from the state file. The state file is an unordered JSON map,
    /// so the seeded order is names sorted lexicographically rather than
    /// any prior registration order, which the restart didn't preserve.
    pub async fn seed_from_state_file(&self) -> Result<()> {
        let doc = self.ctx.state_file.load().await?;
        let mut order: Vec<String> = doc.mom_instances.keys().cloned().collect();
        order.sort();
        *self.registry.lock() = Registry {
            order,
            addresses: doc.mom_instances,
        };
        Ok(())
    }

    /// Rewrites `address` to the IPv4 loopback when its host equals this
    /// instance's own advertised host, so same-machine callers (tests, local
    /// dev clusters) don't dial through an external interface.
    #[must_use]
    pub fn rewrite_loopback(&self, address: &str) -> String {
        let own_host = self
            .ctx
            .instance
            .public_address
            .rsplit_once(':')
            .map(|(h, _)| h);
        match (address.rsplit_once(':'), own_host) {
            (Some((host, port)), Some(own)) if host == own => format!("127.0.0.1:{port}"),
            _ => address.to_string(),
        }
    }
}
