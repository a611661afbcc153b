//! # earnguard
//!
//! HTTP host for the earnings integrity engine.
//!
//! ## Environment
//!
//! | Variable | Default | Meaning |
//! |----------|---------|---------|
//! | `EARNGUARD_ENV_FILE` | `.env` | dotenv file read before anything else |
//! | `EARNGUARD_CONFIG` | unset | TOML config file; defaults otherwise |
//! | `EARNGUARD_MODE` | `BETA` | Startup mode override |
//! | `EARNGUARD_STORE_TIMEOUT_MS` | `500` | Store call timeout override |
//! | `EARNGUARD_SNAPSHOT` | unset | JSON snapshot loaded at start, flushed periodically |
//! | `EARNGUARD_BIND` | `127.0.0.1:8080` | Listen address |
//! | `RUST_LOG` | `info` | Log filter |

mod jobs;
mod routes;

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::sync::watch;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use earnguard_common::{config::load_from_file, EngineConfig};
use earnguard_engine::{EngineMetrics, IntegrityEngineBuilder};
use earnguard_store::MemoryStore;

const DEFAULT_BIND: &str = "127.0.0.1:8080";

/// Loads `EARNGUARD_ENV_FILE` (default `.env`). A missing file is fine;
/// tracing is not up yet, so problems go to stderr.
fn load_env_file() {
    let env_file = std::env::var("EARNGUARD_ENV_FILE").unwrap_or_else(|_| ".env".to_string());
    if let Err(e) = dotenvy::from_filename(&env_file) {
        if !matches!(e, dotenvy::Error::Io(_)) {
            eprintln!("warning: failed to load {}: {}", env_file, e);
        }
    }
}

fn load_config() -> Result<EngineConfig> {
    let mut config = match std::env::var("EARNGUARD_CONFIG") {
        Ok(path) => load_from_file(&path).with_context(|| format!("loading config {}", path))?,
        Err(_) => EngineConfig::default(),
    };
    config.apply_env_overrides()?;
    config.validate()?;
    Ok(config)
}

#[tokio::main]
async fn main() -> Result<()> {
    load_env_file();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = load_config()?;
    info!(
        mode = %config.mode,
        store_timeout_ms = config.store_timeout_ms,
        "earnguard starting"
    );

    let snapshot_path = std::env::var("EARNGUARD_SNAPSHOT").ok().map(PathBuf::from);
    let store = Arc::new(match &snapshot_path {
        Some(path) => MemoryStore::load_snapshot(path)
            .with_context(|| format!("loading snapshot {}", path.display()))?,
        None => MemoryStore::new(),
    });

    let modes = Arc::new(config.mode_provider());
    let metrics = Arc::new(EngineMetrics::new());
    let engine = Arc::new(
        IntegrityEngineBuilder::new(store.clone())
            .with_config(&config)
            .with_mode_provider(modes.clone())
            .with_metrics(metrics)
            .build()?,
    );

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let handles = jobs::spawn_jobs(
        Arc::clone(&engine),
        Arc::clone(&store),
        snapshot_path.clone(),
        &config.jobs,
        shutdown_rx,
    );

    let app = routes::router(routes::AppState::new(engine, modes));

    let bind = std::env::var("EARNGUARD_BIND").unwrap_or_else(|_| DEFAULT_BIND.to_string());
    let addr: SocketAddr = bind
        .parse()
        .with_context(|| format!("invalid EARNGUARD_BIND {:?}", bind))?;
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("binding {}", addr))?;
    info!(listen_addr = %addr, "earnguard listening");

    let server = axum::serve(listener, app);
    tokio::select! {
        result = server => {
            if let Err(e) = result {
                error!(error = %e, "server error");
            }
        }
        _ = tokio::signal::ctrl_c() => {
            info!("shutdown signal received");
        }
    }

    if shutdown_tx.send(true).is_err() {
        warn!("background jobs already stopped");
    }
    for handle in handles {
        if let Err(e) = handle.await {
            warn!(error = %e, "background job panicked");
        }
    }
    if let Some(path) = &snapshot_path {
        jobs::flush(&store, path);
    }

    info!("earnguard shutdown complete");
    Ok(())
}
