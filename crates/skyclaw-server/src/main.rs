//! `skyclawd` — the coordinator binary. Loads configuration, opens the
//! durable store, wires the replication/quorum layer, spawns the
//! background sweepers, and serves the HTTP router.

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use skyclaw_core::{CoordinatorState, PeerSet};
use skyclaw_replication::QuorumWriter;
use skyclaw_server::app_state::AppState;
use skyclaw_server::config::Config;
use skyclaw_store_sqlite::SqliteStore;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Cluster coordinator for the skyclaw compute-orchestration layer.
#[derive(Parser, Debug)]
#[command(name = "skyclawd")]
struct Cli {
    /// Path to a dotenv file to load instead of the default `.env`.
    #[arg(long)]
    env: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,skyclaw_server=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();
    if let Some(path) = &cli.env {
        dotenvy::from_path(path).with_context(|| format!("failed to load env file {path}"))?;
    }

    let config = Config::from_env().context("failed to load configuration")?;
    tracing::info!(node_id = %config.node_id, port = config.port, "starting skyclawd");

    let store: Arc<dyn skyclaw_core::StateStore> =
        Arc::new(SqliteStore::open(&config.db_path).context("failed to open durable store")?);

    let coordinator = Arc::new(
        CoordinatorState::new(config.node_id.clone(), store.clone(), config.lease_ms)
            .context("failed to initialize coordinator state")?,
    );

    let peers = Arc::new(PeerSet::new(config.public_url.clone()));
    peers.seed(config.peer_urls.iter().cloned());

    let writer = QuorumWriter::new(
        coordinator.clone(),
        peers.clone(),
        config.min_replicas,
        config.auth_token.clone(),
    );

    let state = Arc::new(AppState {
        config: config.clone(),
        coordinator,
        writer,
        peers,
        store,
    });

    let _sweepers = skyclaw_server::spawn_sweepers(state.clone());

    let app = skyclaw_server::build_router(state);

    let addr = format!("{}:{}", config.host, config.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    tracing::info!(%addr, "skyclawd listening");

    axum::serve(listener, app)
        .await
        .context("server error")?;

    Ok(())
}
