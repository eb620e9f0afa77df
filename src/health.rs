//! Health, liveness, and readiness endpoints, plus metric descriptions.
//! Ambient operational surface for orchestrators and load balancers —
//! reports process role, node id, and uptime, separate from any
//! user-facing admin API.

use std::sync::Arc;
use std::time::Instant;

use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use serde_json::json;

use crate::context::{ClusterContext, Role};
use crate::scs::SharedStore;

#[derive(Clone)]
pub struct HealthState<S: SharedStore> {
    pub ctx: Arc<ClusterContext<S>>,
    pub start_time: Instant,
}

fn role_str(role: Role) -> &'static str {
    match role {
        Role::Worker => "WORKER",
        Role::Candidate => "CANDIDATE",
        Role::Master => "MASTER",
    }
}

/// `GET /health` -- detailed JSON status. Always 200; callers inspect the
/// `role` field rather than relying on the HTTP status for health.
pub async fn health_handler<S: SharedStore>(
    State(state): State<HealthState<S>>,
) -> Json<serde_json::Value> {
    let role = state.ctx.role().await;
    Json(json!({
        "role": role_str(role),
        "node": state.ctx.instance.name,
        "uptime_secs": state.start_time.elapsed().as_secs(),
    }))
}

/// `GET /health/live` -- Kubernetes liveness probe. Only checks the process
/// is running and responsive, never downstream dependencies.
pub async fn liveness_handler() -> StatusCode {
    StatusCode::OK
}

/// `GET /health/ready` -- readiness probe. This instance is always ready to
/// receive RPCs once its server is listening; role transitions happen
/// independently and don't gate readiness.
pub async fn readiness_handler<S: SharedStore>(
    State(_state): State<HealthState<S>>,
) -> StatusCode {
    StatusCode::OK
}

/// Registers metric descriptions once at process startup so the Prometheus
/// exporter emits `# HELP`/`# TYPE` lines even before the first observation.
pub fn describe_metrics() {
    metrics::describe_counter!("fluxmq_messages_enqueued_total", "Messages enqueued, per topic");
    metrics::describe_counter!("fluxmq_messages_dequeued_total", "Messages dequeued, per topic");
    metrics::describe_counter!("fluxmq_dispatch_attempts_total", "Dispatcher send attempts");
    metrics::describe_counter!("fluxmq_dispatch_failures_total", "Dispatcher send failures");
    metrics::describe_counter!("fluxmq_election_attempts_total", "Election attempts by this instance");
    metrics::describe_gauge!("fluxmq_role", "Current role: 0=worker, 1=candidate, 2=master");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BrokerConfig;
    use crate::context::Instance;
    use crate::scs::memory::InMemoryStore;
    use crate::state_file::StateFile;
    use crate::topic::TopicRegistry;
    use std::sync::Arc;

    fn test_state() -> HealthState<InMemoryStore> {
        let store = Arc::new(InMemoryStore::new());
        let topics = Arc::new(TopicRegistry::new(store.clone(), 3));
        let dir = tempfile::tempdir().unwrap();
        let state_file = Arc::new(StateFile::new(dir.path().join("state.json")));
        let instance = Instance {
            name: "node-1".to_string(),
            local_address: "127.0.0.1:9000".to_string(),
            public_address: "127.0.0.1:9000".to_string(),
            election_priority: 0.4,
        };
        let ctx = Arc::new(ClusterContext::new(
            store,
            state_file,
            topics,
            instance,
            BrokerConfig::default(),
        ));
        HealthState { ctx, start_time: Instant::now() }
    }

    #[tokio::test]
    async fn health_handler_reports_worker_role_by_default() {
        let state = test_state();
        let Json(body) = health_handler(State(state)).await;
        assert_eq!(body["role"], "WORKER");
        assert_eq!(body["node"], "node-1");
    }

    #[tokio::test]
    async fn health_handler_reports_master_after_promotion() {
        let state = test_state();
        state.ctx.set_role(Role::Master).await;
        let Json(body) = health_handler(State(state)).await;
        assert_eq!(body["role"], "MASTER");
    }

    #[tokio::test]
    async fn liveness_handler_always_ok() {
        assert_eq!(liveness_handler().await, StatusCode::OK);
    }
}
