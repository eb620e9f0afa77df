//! RPC server — axum router exposing `MasterService` and `MessageService`
//! over MessagePack-encoded POST bodies.
//!
//! Follows a deferred-startup lifecycle: `new()` allocates shared state,
//! `start()` binds the listener (returning the actual bound port),
//! `serve()` accepts connections until the shutdown future resolves.

use std::sync::Arc;
use std::time::Instant;

use axum::extract::{DefaultBodyLimit, FromRef, State};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::Router;
use bytes::Bytes;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::info;

use super::wire::{
    error_response, CreateTopicRequest, CreateTopicResponse, GetNextInstanceResponse,
    ReceiveMessageRequest, ReceiveMessageResponse, RegisterMomInstanceResponse, SendMessageRequest,
    SendMessageResponse, Status,
};
use crate::context::ClusterContext;
use crate::dispatch::Dispatcher;
use crate::error::BrokerError;
use crate::health::{health_handler, liveness_handler, readiness_handler, HealthState};
use crate::membership::ClusterMembership;
use crate::scs::SharedStore;

const MAX_BODY_BYTES: usize = 10 * 1024 * 1024;

#[derive(Clone)]
pub struct AppState<S: SharedStore> {
    pub ctx: Arc<ClusterContext<S>>,
    pub membership: Arc<ClusterMembership<S>>,
    pub dispatcher: Arc<Dispatcher<S>>,
    pub start_time: Instant,
}

impl<S: SharedStore> FromRef<AppState<S>> for HealthState<S> {
    fn from_ref(input: &AppState<S>) -> Self {
        HealthState {
            ctx: input.ctx.clone(),
            start_time: input.start_time,
        }
    }
}

/// Manages the RPC server lifecycle: `new()` then `start()` (learns the
/// bound port before the caller builds its `Instance`) then `serve()` (takes
/// the state once it is fully assembled).
pub struct RpcServer {
    host: String,
    port: u16,
    listener: Option<TcpListener>,
}

impl RpcServer {
    #[must_use]
    pub fn new(host: String, port: u16) -> Self {
        Self {
            host,
            port,
            listener: None,
        }
    }

    fn router<S: SharedStore>(state: AppState<S>) -> Router {
        Router::new()
            .route("/health", get(health_handler::<S>))
            .route("/health/live", get(liveness_handler))
            .route("/health/ready", get(readiness_handler::<S>))
            .route("/rpc/get-next-instance", post(get_next_instance::<S>))
            .route("/rpc/register", post(register_mom_instance::<S>))
            .route("/rpc/send", post(send_message::<S>))
            .route("/rpc/receive", post(receive_message::<S>))
            .route("/rpc/create-topic", post(create_topic::<S>))
            .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
            .layer(TraceLayer::new_for_http())
            .with_state(state)
    }

    /// Binds the TCP listener. Returns the actual bound port (may differ
    /// from the configured one when `0` requests an OS-assigned port).
    ///
    /// # Errors
    /// Returns an error if the address cannot be bound.
    pub async fn start(&mut self) -> anyhow::Result<u16> {
        let addr = format!("{}:{}", self.host, self.port);
        let listener = TcpListener::bind(&addr).await?;
        let bound_port = listener.local_addr()?.port();
        info!(addr = %addr, bound_port, "rpc server bound");
        self.listener = Some(listener);
        Ok(bound_port)
    }

    /// Serves requests until `shutdown` resolves.
    ///
    /// # Panics
    /// Panics if `start()` was not called first.
    pub async fn serve<S: SharedStore>(
        self,
        state: AppState<S>,
        shutdown: impl std::future::Future<Output = ()> + Send + 'static,
    ) -> anyhow::Result<()> {
        let listener = self.listener.expect("start() must be called before serve()");
        let router = Self::router(state);
        axum::serve(listener, router)
            .with_graceful_shutdown(shutdown)
            .await?;
        Ok(())
    }
}

async fn read_msgpack<T: serde::de::DeserializeOwned>(body: Bytes) -> Result<T, BrokerError> {
    rmp_serde::from_slice(&body).map_err(BrokerError::from)
}

fn write_msgpack<T: serde::Serialize>(value: &T) -> impl IntoResponse {
    let bytes = rmp_serde::to_vec(value).unwrap_or_default();
    ([("content-type", "application/msgpack")], bytes)
}

async fn get_next_instance<S: SharedStore>(
    State(state): State<AppState<S>>,
) -> impl IntoResponse {
    match state.dispatcher.next_instance() {
        Ok((name, address)) => write_msgpack(&GetNextInstanceResponse { name, address }),
        Err(e) => write_msgpack(&GetNextInstanceResponse {
            name: String::new(),
            address: error_response(&e).1,
        }),
    }
}

async fn register_mom_instance<S: SharedStore>(
    State(state): State<AppState<S>>,
    body: Bytes,
) -> impl IntoResponse {
    let req: super::wire::RegisterMomInstanceRequest = match read_msgpack(body).await {
        Ok(r) => r,
        Err(e) => {
            let (status, message) = error_response(&e);
            return write_msgpack(&RegisterMomInstanceResponse { status, message });
        }
    };

    if !state.ctx.is_master_fast() {
        return write_msgpack(&RegisterMomInstanceResponse {
            status: Status::Error,
            message: "this instance is not the master".to_string(),
        });
    }

    match state
        .membership
        .register(&req.node_name, &req.hostname, req.port)
        .await
    {
        Ok(accepted_name) => write_msgpack(&RegisterMomInstanceResponse {
            status: Status::Success,
            message: accepted_name,
        }),
        Err(e) => {
            let (status, message) = error_response(&e);
            write_msgpack(&RegisterMomInstanceResponse { status, message })
        }
    }
}

async fn send_message<S: SharedStore>(
    State(state): State<AppState<S>>,
    body: Bytes,
) -> impl IntoResponse {
    let req: SendMessageRequest = match read_msgpack(body).await {
        Ok(r) => r,
        Err(e) => {
            let (status, message) = error_response(&e);
            return write_msgpack(&SendMessageResponse { status, message });
        }
    };

    match state.ctx.topics.enqueue(&req.topic, &req.message).await {
        Ok(_) => {
            persist_topic(&state, &req.topic).await;
            write_msgpack(&SendMessageResponse {
                status: Status::Success,
                message: "Success".to_string(),
            })
        }
        Err(e) => {
            let (status, message) = error_response(&e);
            write_msgpack(&SendMessageResponse { status, message })
        }
    }
}

/// Mirrors a topic's current partition count into the local state file so a
/// restart reconciles it without replaying every message and the state
/// file never lags the live topic catalog.
async fn persist_topic<S: SharedStore>(state: &AppState<S>, topic: &str) {
    if let Ok(count) = state.ctx.topics.partition_count(topic).await {
        if let Err(e) = state.ctx.state_file.put_topic(topic, count).await {
            tracing::warn!(topic, error = %e, "failed to persist topic to state file");
        }
    }
}

async fn receive_message<S: SharedStore>(
    State(state): State<AppState<S>>,
    body: Bytes,
) -> impl IntoResponse {
    let req: ReceiveMessageRequest = match read_msgpack(body).await {
        Ok(r) => r,
        Err(e) => {
            let (status, message) = error_response(&e);
            return write_msgpack(&ReceiveMessageResponse { status, message });
        }
    };

    match state.dispatcher.receive_message(&req.topic).await {
        Ok(Some(message)) => write_msgpack(&ReceiveMessageResponse {
            status: Status::Success,
            message,
        }),
        Ok(None) => write_msgpack(&ReceiveMessageResponse {
            status: Status::Empty,
            message: String::new(),
        }),
        Err(e) => {
            let (status, message) = error_response(&e);
            write_msgpack(&ReceiveMessageResponse { status, message })
        }
    }
}

async fn create_topic<S: SharedStore>(
    State(state): State<AppState<S>>,
    body: Bytes,
) -> impl IntoResponse {
    let req: CreateTopicRequest = match read_msgpack(body).await {
        Ok(r) => r,
        Err(e) => {
            let (status, message) = error_response(&e);
            return write_msgpack(&CreateTopicResponse { status, message });
        }
    };

    match state.ctx.topics.create_topic(&req.topic_name, req.partitions).await {
        Ok(()) => {
            persist_topic(&state, &req.topic_name).await;
            write_msgpack(&CreateTopicResponse {
                status: Status::Success,
                message: "Success".to_string(),
            })
        }
        Err(e) => {
            let (status, message) = error_response(&e);
            write_msgpack(&CreateTopicResponse { status, message })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BrokerConfig;
    use crate::context::Instance;
    use crate::scs::memory::InMemoryStore;
    use crate::state_file::StateFile;
    use crate::topic::TopicRegistry;

    fn test_state() -> AppState<InMemoryStore> {
        let store = Arc::new(InMemoryStore::new());
        let topics = Arc::new(TopicRegistry::new(store.clone(), 3));
        let dir = tempfile::tempdir().unwrap();
        let state_file = Arc::new(StateFile::new(dir.path().join("state.json")));
        let instance = Instance {
            name: "node-1".to_string(),
            local_address: "127.0.0.1:9000".to_string(),
            public_address: "127.0.0.1:9000".to_string(),
            election_priority: 0.2,
        };
        let ctx = Arc::new(ClusterContext::new(
            store,
            state_file,
            topics,
            instance,
            BrokerConfig::default(),
        ));
        let membership = Arc::new(ClusterMembership::new(ctx.clone()));
        let dispatcher = Arc::new(Dispatcher::new(ctx.clone(), membership.clone()));
        AppState {
            ctx,
            membership,
            dispatcher,
            start_time: Instant::now(),
        }
    }

    #[tokio::test]
    async fn send_message_enqueues_and_reports_success() {
        let state = test_state();
        let body = rmp_serde::to_vec(&SendMessageRequest {
            topic: "t".to_string(),
            message: "hello".to_string(),
        })
        .unwrap();
        let resp = send_message(State(state.clone()), Bytes::from(body)).await;
        let _ = resp;
        assert_eq!(
            state.ctx.topics.peek_all("t").await.unwrap(),
            vec!["hello".to_string()]
        );
    }

    #[tokio::test]
    async fn register_rejects_when_not_master() {
        let state = test_state();
        let body = rmp_serde::to_vec(&super::super::wire::RegisterMomInstanceRequest {
            node_name: "w1".to_string(),
            hostname: "127.0.0.1".to_string(),
            port: 9100,
        })
        .unwrap();
        let _ = register_mom_instance(State(state.clone()), Bytes::from(body)).await;
        assert!(state.membership.list().is_empty());
    }
}
