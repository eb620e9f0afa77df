//! Instance identity and the shared `ClusterContext` threaded through every
//! component.
//!
//! Every subsystem in this crate (election, membership, dispatch, worker)
//! takes an `Arc<ClusterContext<S>>` rather than reaching for a process-wide
//! singleton — the same dependency-injection shape as passing
//! `Arc<ServerConfig>` / `Arc<ClusterState>` into each service.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::RwLock;

use crate::config::BrokerConfig;
use crate::scs::SharedStore;
use crate::state_file::StateFile;
use crate::topic::TopicRegistry;

/// Current role of this process in the cluster FSM.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Worker,
    Candidate,
    Master,
}

/// This instance's identity.
#[derive(Debug, Clone)]
pub struct Instance {
    pub name: String,
    pub local_address: String,
    pub public_address: String,
    /// Random real in `[0, 1)`, chosen once at boot, advertised during
    /// election but never used as a gate — the lock is the sole decider of
    /// who wins.
    pub election_priority: f64,
}

/// Shared, explicit state passed to every component instead of relying on
/// globals: the SCS client, the state-file handle, this instance's
/// identity, and the current role (observable/settable by the election
/// engine, read by everyone else).
pub struct ClusterContext<S: SharedStore> {
    pub store: Arc<S>,
    pub state_file: Arc<StateFile>,
    pub topics: Arc<TopicRegistry<S>>,
    pub instance: Instance,
    pub config: BrokerConfig,
    role: RwLock<Role>,
    is_master: AtomicBool,
}

impl<S: SharedStore> ClusterContext<S> {
    #[must_use]
    pub fn new(
        store: Arc<S>,
        state_file: Arc<StateFile>,
        topics: Arc<TopicRegistry<S>>,
        instance: Instance,
        config: BrokerConfig,
    ) -> Self {
        Self {
            store,
            state_file,
            topics,
            instance,
            config,
            role: RwLock::new(Role::Worker),
            is_master: AtomicBool::new(false),
        }
    }

    pub async fn role(&self) -> Role {
        *self.role.read().await
    }

    pub async fn set_role(&self, role: Role) {
        self.is_master.store(role == Role::Master, Ordering::SeqCst);
        *self.role.write().await = role;
    }

    /// Fast, lock-free check used by hot paths (e.g. RPC handlers deciding
    /// whether to serve a master-only request locally).
    pub fn is_master_fast(&self) -> bool {
        self.is_master.load(Ordering::SeqCst)
    }
}
