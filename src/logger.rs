use anyhow::{anyhow, Result};
use tracing::Level;

use crate::config::Env;

/// Text at debug level when running locally, JSON otherwise; only prod drops debug.
pub fn setup_logger(env: Env) -> Result<()> {
    let builder = tracing_subscriber::fmt();
    match env {
        Env::Local => builder.with_max_level(Level::DEBUG).try_init(),
        Env::Dev => builder.json().with_max_level(Level::DEBUG).try_init(),
        Env::Prod => builder.json().with_max_level(Level::INFO).try_init(),
    }
    .map_err(|err| anyhow!("failed to install logger: {err}"))
}
