//! Relay fabric node binary.
//!
//! Every tier runs this same binary: it loads an [`Identity`] and a
//! [`NodeConfig`] from a TOML file, then starts whichever of {outbox
//! dispatcher, stream bootstrapper, relay engine} apply to its tier, and
//! serves `/healthz` / `/readyz` for operational visibility. Grounded on
//! `sr-governor`'s wiring: a shared state struct, an `AtomicBool` running
//! flag, a health router spawned as its own task, and a `shutdown_signal`
//! combining ctrl_c and SIGTERM.

mod config;

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use axum::{routing::get, Json, Router};
use config::NodeConfig;
use relay_adapters::{
    BootstrapError, NatsConfig, NatsSubstrate, OutboxDispatcher, OutboxDispatcherConfig,
    PgOutboxStore, RelayConfig, RelayEngine, StreamBootstrapper, StreamBootstrapperConfig,
};
use relay_domain::Tier;
use serde_json::json;
use sqlx::postgres::PgPoolOptions;
use tokio::signal;
use tokio::sync::watch;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

struct NodeState {
    identity_tier: Tier,
    running: Arc<AtomicBool>,
    bootstrap_ready: watch::Receiver<bool>,
}

impl NodeState {
    fn is_ready(&self) -> bool {
        self.running.load(Ordering::Relaxed) && *self.bootstrap_ready.borrow()
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let config_path = std::env::var("RELAY_NODE_CONFIG")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("relay-node.toml"));
    let config = NodeConfig::load(&config_path)?;

    info!(
        tier = %config.identity.tier,
        zone = %config.identity.zone,
        subzone = %config.identity.subzone,
        node = %config.identity.node,
        "starting relay node"
    );

    let running = Arc::new(AtomicBool::new(true));
    let (bootstrap_tx, bootstrap_rx) = watch::channel(false);

    let substrate = Arc::new(
        NatsSubstrate::connect(NatsConfig {
            url: config.broker.url.clone(),
            duplicate_window_secs: 120,
            token: config.broker.token.clone(),
            user: config.broker.user.clone(),
            password: config.broker.password.clone(),
            creds_file: config.broker.creds_file.clone(),
        })
        .await
        .map_err(|e| anyhow::anyhow!("failed to connect to NATS: {e}"))?,
    );

    let bootstrapper = StreamBootstrapper::new(
        substrate.clone(),
        StreamBootstrapperConfig {
            stream_keys: config.bootstrap.stream_keys.clone(),
            fail_on_mismatch: config.bootstrap.fail_on_mismatch,
            overrides: config.stream_overrides.clone(),
        },
    );
    let bootstrap_task = {
        let bootstrap_tx = bootstrap_tx.clone();
        tokio::spawn(async move {
            if let Err(e) = bootstrapper.run(&bootstrap_tx).await {
                report_bootstrap_failure(e);
            }
        })
    };

    let mut outbox_task = None;
    if config.outbox.enabled {
        let pool = PgPoolOptions::new()
            .max_connections(5)
            .connect(&config.outbox.database_url)
            .await?;
        let store = Arc::new(PgOutboxStore::new(pool));
        store
            .ensure_schema()
            .await
            .map_err(|e| anyhow::anyhow!("failed to ensure outbox schema: {e}"))?;
        let dispatcher = OutboxDispatcher::new(
            store,
            substrate.clone(),
            OutboxDispatcherConfig {
                batch_size: config.outbox.batch_size,
                poll_interval_ms: config.outbox.poll_interval_ms,
                max_retries: config.outbox.max_retries,
            },
        );
        let running = running.clone();
        outbox_task = Some(tokio::spawn(async move {
            dispatcher.run(running).await;
        }));
    }

    let mut relay_task = None;
    if config.relay.enabled
        && matches!(config.identity.tier, Tier::Zone | Tier::Subzone)
    {
        let engine = RelayEngine::new(
            substrate.clone(),
            config.identity.clone(),
            RelayConfig {
                zone_has_subzones: config.relay.zone_has_subzones,
                batch_size: config.relay.batch_size,
                poll_interval_ms: config.relay.poll_interval_ms,
                subscribe_retry_ms: config.relay.subscribe_retry_ms,
            },
        );
        let running = running.clone();
        let bootstrap_rx = bootstrap_rx.clone();
        relay_task = Some(tokio::spawn(async move {
            engine.run(running, bootstrap_rx).await;
        }));
    }

    let state = Arc::new(NodeState {
        identity_tier: config.identity.tier,
        running: running.clone(),
        bootstrap_ready: bootstrap_rx,
    });
    let health_addr: SocketAddr = config
        .health
        .bind
        .parse()
        .map_err(|e| anyhow::anyhow!("invalid [health] bind address '{}': {e}", config.health.bind))?;
    let health_app = build_health_router(state.clone());
    let health_server = tokio::spawn(async move {
        info!(addr = %health_addr, "health server listening");
        match tokio::net::TcpListener::bind(health_addr).await {
            Ok(listener) => {
                if let Err(e) = axum::serve(listener, health_app).await {
                    error!(error = %e, "health server error");
                }
            }
            Err(e) => error!(error = %e, "failed to bind health server"),
        }
    });

    shutdown_signal().await;
    info!("shutdown signal received, stopping node");
    running.store(false, Ordering::Relaxed);

    let shutdown_timeout = std::time::Duration::from_secs(10);
    if let Some(task) = outbox_task {
        let _ = tokio::time::timeout(shutdown_timeout, task).await;
    }
    if let Some(task) = relay_task {
        let _ = tokio::time::timeout(shutdown_timeout, task).await;
    }
    bootstrap_task.abort();
    health_server.abort();

    info!("relay node shutdown complete");
    Ok(())
}

fn report_bootstrap_failure(e: BootstrapError) {
    warn!(error = %e, "node continuing without verified stream set; dependent components will stall");
}

/// Builds the `/healthz`/`/readyz` router bound to a node's shared state.
/// Split out from `main` so it can be exercised directly in tests via
/// `tower::ServiceExt::oneshot` without binding a real socket.
fn build_health_router(state: Arc<NodeState>) -> Router {
    Router::new()
        .route("/healthz", get(|| async { Json(json!({"status": "ok"})) }))
        .route("/readyz", get(move || readyz_handler(state.clone())))
        .layer(TraceLayer::new_for_http())
}

async fn readyz_handler(state: Arc<NodeState>) -> Json<serde_json::Value> {
    Json(json!({
        "status": if state.is_ready() { "ready" } else { "not_ready" },
        "tier": state.identity_tier.as_str(),
    }))
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install ctrl-c handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
