//! Process bootstrap: parses [`BrokerConfig`], binds the RPC listener,
//! assembles the [`ClusterContext`] and its dependent components, spawns the
//! long-lived election tasks, and serves until interrupted.
//!
//! This single binary plays both the worker and master role; which one a
//! given process ends up as is decided by the election engine at runtime,
//! not by a command-line mode switch.

use std::net::SocketAddr;
use std::sync::Arc;

use clap::Parser;
use fluxmq::config::{BrokerConfig, TimingConfig};
use fluxmq::context::{ClusterContext, Instance};
use fluxmq::dispatch::Dispatcher;
use fluxmq::election::ElectionEngine;
use fluxmq::health::describe_metrics;
use fluxmq::membership::ClusterMembership;
use fluxmq::net::local_ip;
use fluxmq::rpc::server::{AppState, RpcServer};
use fluxmq::scs::memory::InMemoryStore;
use fluxmq::state_file::StateFile;
use fluxmq::topic::TopicRegistry;
use fluxmq::worker::WorkerNode;
use metrics_exporter_prometheus::PrometheusBuilder;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let mut config = BrokerConfig::parse();
    // `TimingConfig`'s fields are `#[arg(skip)]` and clap resolves those via
    // each field's own `Default`, not `TimingConfig`'s hand-written `impl
    // Default` -- every Duration would otherwise come back zeroed.
    config.timings = TimingConfig::default();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    describe_metrics();
    if let Some(port) = config.metrics_port {
        let addr: SocketAddr = format!("0.0.0.0:{port}").parse()?;
        PrometheusBuilder::new().with_http_listener(addr).install()?;
        info!(%addr, "metrics exporter listening");
    }

    let mut rpc_server = RpcServer::new(config.host.clone(), config.port);
    let bound_port = rpc_server.start().await?;

    let instance_name = config
        .instance_name
        .clone()
        .unwrap_or_else(|| format!("fluxmq-{}", uuid::Uuid::new_v4()));
    let local_host = local_ip().await;
    let local_address = format!("{local_host}:{bound_port}");
    let public_address = config
        .public_address
        .clone()
        .unwrap_or_else(|| local_address.clone());
    let election_priority = {
        use rand::Rng;
        rand::rng().random_range(0.0..1.0)
    };

    let instance = Instance {
        name: instance_name.clone(),
        local_address,
        public_address,
        election_priority,
    };
    info!(name = %instance.name, local = %instance.local_address, public = %instance.public_address, "instance identity resolved");

    let store = Arc::new(InMemoryStore::new());
    let state_file = Arc::new(StateFile::new(config.state_file_path.clone()));
    let topics = Arc::new(TopicRegistry::new(store.clone(), config.default_partition_count));
    let ctx = Arc::new(ClusterContext::new(
        store,
        state_file,
        topics,
        instance,
        config.clone(),
    ));

    let membership = Arc::new(ClusterMembership::new(ctx.clone()));
    let dispatcher = Arc::new(Dispatcher::new(ctx.clone(), membership.clone()));
    let election = Arc::new(ElectionEngine::new(ctx.clone(), membership.clone()));
    let worker = WorkerNode::new(ctx.clone(), membership.clone());

    // First participant: try a single immediate election before falling
    // back to `master_url`/watchdog-driven discovery, so a freshly started
    // single-node cluster doesn't wait out the full grace period.
    if config.master_url.is_none() {
        if let Err(e) = election.run_election().await {
            warn!(error = %e, "initial election attempt did not win");
        }
    }

    worker.register(bound_port).await?;
    worker.reconcile_topics_from_state_file().await?;

    let heartbeat_task = tokio::spawn({
        let election = election.clone();
        async move { election.run_heartbeat_task().await }
    });
    let watchdog_task = tokio::spawn({
        let election = election.clone();
        async move { election.run_watchdog_task().await }
    });
    let health_check_task = tokio::spawn({
        let membership = membership.clone();
        async move { membership.run_health_check_task().await }
    });

    let state = AppState {
        ctx: ctx.clone(),
        membership: membership.clone(),
        dispatcher,
        start_time: std::time::Instant::now(),
    };

    let shutdown_election = election.clone();
    let shutdown_ctx = ctx.clone();
    let shutdown = async move {
        let _ = tokio::signal::ctrl_c().await;
        info!("shutdown signal received");
        if shutdown_ctx.is_master_fast() {
            shutdown_election.release_master_keys_on_shutdown().await;
        }
    };

    rpc_server.serve(state, shutdown).await?;

    heartbeat_task.abort();
    watchdog_task.abort();
    health_check_task.abort();
    Ok(())
}
