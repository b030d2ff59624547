use anyhow::{Context, Result};
use pcdb_server::controller::{mock_router, shutdown_signal};
use tracing::{info, warn, Level};

const DEFAULT_ADDRESS: &str = "localhost:8082";

/// Serves every route over the in-memory backend. Takes an optional bind address.
#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt().with_max_level(Level::DEBUG).init();

    let address = std::env::args()
        .nth(1)
        .unwrap_or_else(|| DEFAULT_ADDRESS.to_string());
    let listener = tokio::net::TcpListener::bind(&address)
        .await
        .with_context(|| format!("failed to bind {address}"))?;

    warn!("records are kept in memory and dropped on exit");
    info!("mock listening on {}", listener.local_addr()?);

    axum::serve(listener, mock_router::make_router())
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}
