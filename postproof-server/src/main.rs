//! PostProof Server - REST API for post timestamping
//!
//! Exposes postproof-core over HTTP:
//! - POST /api/v1/timestamps - Timestamp a post
//! - GET  /api/v1/timestamps/{id} - Record status
//! - POST /api/v1/verify - Drift check against the live post
//! - POST /internal/maturation-sweep - Upgrade pending proofs (cron)

use std::{net::SocketAddr, sync::Arc, time::Duration};

use anyhow::Context;
use postproof_core::{AdapterRegistry, ContentFetcher, MemoryRecordStore, RecordStore};
use postproof_server::{
    create_router_with_config, AppState, Config, HttpContentFetcher, PgRecordStore,
    UnconfiguredFetcher,
};
use tokio::sync::watch;
use tracing_subscriber::EnvFilter;

const FETCH_TIMEOUT: Duration = Duration::from_secs(15);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("postproof_server=info,postproof_core=info,tower_http=info")),
        )
        .init();

    let config = Config::from_env();

    let registry = AdapterRegistry::from_config(config.registry_config())
        .context("failed to configure timestamp backends")?;
    if registry.backends().is_empty() {
        tracing::warn!("No timestamp backends configured; submissions will be rejected");
    }

    let database = match &config.database_url {
        Some(url) => Some(
            PgRecordStore::connect(
                url,
                config.database_max_connections,
                config.database_min_connections,
            )
            .await
            .context("failed to connect to DATABASE_URL")?,
        ),
        None => {
            tracing::warn!("DATABASE_URL not set; records are kept in memory only");
            None
        }
    };
    let store: Arc<dyn RecordStore> = match &database {
        Some(db) => Arc::new(db.clone()),
        None => Arc::new(MemoryRecordStore::new()),
    };

    let fetcher: Arc<dyn ContentFetcher> = match &config.post_fetch_url {
        Some(url) => Arc::new(
            HttpContentFetcher::new(url, FETCH_TIMEOUT).context("invalid POST_FETCH_URL")?,
        ),
        None => {
            tracing::warn!("POST_FETCH_URL not set; verification and snapshot-less submissions will fail");
            Arc::new(UnconfiguredFetcher)
        }
    };

    let mut state = AppState::new(&config, registry, store, fetcher);
    if let Some(db) = database {
        state = state.with_database(db);
    }
    if state.cron_secret.is_none() {
        tracing::warn!("CRON_SECRET not set; the maturation trigger endpoint is disabled");
    }

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let sweeper = config.sweep_interval_secs.map(|secs| {
        let scheduler = state.scheduler.clone();
        let mut rx = shutdown_rx.clone();
        tracing::info!(interval_secs = secs, "In-process maturation sweep enabled");
        tokio::spawn(async move {
            scheduler
                .run_every(Duration::from_secs(secs), async move {
                    let _ = rx.wait_for(|stop| *stop).await;
                })
                .await;
        })
    });

    let app = create_router_with_config(&config, state);
    let addr = config.socket_addr();
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    tracing::info!(%addr, "PostProof server listening");

    tokio::spawn(async move {
        shutdown_signal().await;
        tracing::info!("Shutdown signal received");
        let _ = shutdown_tx.send(true);
    });

    let mut server_rx = shutdown_rx;
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(async move {
        let _ = server_rx.wait_for(|stop| *stop).await;
    })
    .await
    .context("server error")?;

    if let Some(handle) = sweeper {
        let _ = handle.await;
    }
    tracing::info!("PostProof server stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
