use std::fs;

use anyhow::{Context, Result};
use pcdb_server::controller::{router::make_router, shutdown_signal, AppState};
use pcdb_store::Store;
use tokio::net::TcpListener;
use tracing::{debug, error, info};

pub mod config;
pub mod logger;

use crate::config::Config;

/// Opens the store described by `config`. The tables exist once this returns.
pub fn open_store(config: &Config) -> Result<Store> {
    if let Some(dir) = config.storage_path.parent() {
        if !dir.as_os_str().is_empty() {
            fs::create_dir_all(dir)
                .with_context(|| format!("failed to create {}", dir.display()))?;
        }
    }
    Store::open(&config.storage_path, config.delete_policy)
}

pub async fn serve(config: &Config, store: Store) -> Result<()> {
    let router = make_router(AppState::new(store), config.http_server.timeout());

    let listener = TcpListener::bind(&config.http_server.address)
        .await
        .with_context(|| format!("failed to bind {}", config.http_server.address))?;

    info!("listening on {}", listener.local_addr()?);

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("server stopped");
    Ok(())
}

pub async fn run() -> Result<()> {
    let config = Config::load(None)?;

    logger::setup_logger(config.env)?;

    info!(env = %config.env, "starting...");
    debug!("debug messages are enabled");

    let store = open_store(&config).inspect_err(|err| {
        error!(error = ?err, "failed to init storage");
    })?;
    info!(delete_policy = ?store.delete_policy(), "storage is ready");

    serve(&config, store).await
}

#[test]
fn test_open_store_creates_directory() {
    let dir = tempfile::tempdir().unwrap();
    let config: Config = toml::from_str(&format!(
        "storage_path = {:?}",
        dir.path().join("nested/storage.db").display().to_string()
    ))
    .unwrap();
    let store = open_store(&config).unwrap();
    assert!(store.get_cpu(1).unwrap_err().is_not_found());
    assert!(dir.path().join("nested/storage.db").exists());
}
