//! Process configuration, read once at start-up from a TOML file.

use std::{
    env, fmt, fs,
    path::{Path, PathBuf},
    time::Duration,
};

use pcdb_store::DeletePolicy;
use serde::Deserialize;
use thiserror::Error;

/// Environment variable naming the config file.
pub const CONFIG_ENV_VAR: &str = "CONFIG_PATH";
const DEFAULT_CONFIG_PATH: &str = "config/local.toml";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Env {
    #[default]
    Local,
    Dev,
    Prod,
}

impl fmt::Display for Env {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Env::Local => "local",
            Env::Dev => "dev",
            Env::Prod => "prod",
        })
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub env: Env,
    pub storage_path: PathBuf,
    #[serde(default)]
    pub delete_policy: DeletePolicy,
    #[serde(default)]
    pub http_server: HttpServer,
}

#[derive(Debug, Clone, Deserialize)]
pub struct HttpServer {
    #[serde(default = "default_address")]
    pub address: String,
    /// Budget for a single request, in milliseconds.
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
}

fn default_address() -> String {
    "localhost:8082".to_string()
}

fn default_timeout_ms() -> u64 {
    4_000
}

impl Default for HttpServer {
    fn default() -> Self {
        Self {
            address: default_address(),
            timeout_ms: default_timeout_ms(),
        }
    }
}

impl HttpServer {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read config file {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("cannot parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[error("invalid config: {0}")]
    Invalid(&'static str),
}

/// `explicit` if given, else `$CONFIG_PATH`, else `config/local.toml`.
pub fn resolve_path(explicit: Option<&Path>) -> PathBuf {
    match explicit {
        Some(path) => path.to_path_buf(),
        None => env::var_os(CONFIG_ENV_VAR)
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH)),
    }
}

impl Config {
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let path = resolve_path(path);
        let content = fs::read_to_string(&path).map_err(|source| ConfigError::Io {
            path: path.clone(),
            source,
        })?;
        let config: Self =
            toml::from_str(&content).map_err(|source| ConfigError::Parse { path, source })?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.storage_path.as_os_str().is_empty() {
            return Err(ConfigError::Invalid("storage_path must not be empty"));
        }
        if self.http_server.address.trim().is_empty() {
            return Err(ConfigError::Invalid("http_server.address must not be empty"));
        }
        if self.http_server.timeout_ms == 0 {
            return Err(ConfigError::Invalid("http_server.timeout_ms must be positive"));
        }
        Ok(())
    }
}

#[cfg(test)]
fn write_config(content: &str) -> (tempfile::TempDir, PathBuf) {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.toml");
    fs::write(&path, content).unwrap();
    (dir, path)
}

#[test]
fn test_load_full_config() {
    let (_dir, path) = write_config(
        r#"
env = "prod"
storage_path = "/var/lib/pcdb/storage.db"
delete_policy = "cascade"

[http_server]
address = "0.0.0.0:8080"
timeout_ms = 1500
"#,
    );
    let config = Config::load(Some(&path)).unwrap();
    assert_eq!(config.env, Env::Prod);
    assert_eq!(config.storage_path, PathBuf::from("/var/lib/pcdb/storage.db"));
    assert_eq!(config.delete_policy, DeletePolicy::Cascade);
    assert_eq!(config.http_server.address, "0.0.0.0:8080");
    assert_eq!(config.http_server.timeout(), Duration::from_millis(1500));
}

#[test]
fn test_defaults() {
    let (_dir, path) = write_config(r#"storage_path = "./storage.db""#);
    let config = Config::load(Some(&path)).unwrap();
    assert_eq!(config.env, Env::Local);
    assert_eq!(config.delete_policy, DeletePolicy::Restrict);
    assert_eq!(config.http_server.address, "localhost:8082");
    assert_eq!(config.http_server.timeout_ms, 4_000);
}

#[test]
fn test_rejects_bad_config() {
    let (_dir, path) = write_config(r#"env = "staging""#);
    assert!(matches!(
        Config::load(Some(&path)),
        Err(ConfigError::Parse { .. })
    ));

    let (_dir, path) = write_config(
        r#"
storage_path = "./storage.db"
[http_server]
timeout_ms = 0
"#,
    );
    assert!(matches!(
        Config::load(Some(&path)),
        Err(ConfigError::Invalid(_))
    ));

    let missing = PathBuf::from("/nonexistent/pcdb.toml");
    assert!(matches!(
        Config::load(Some(&missing)),
        Err(ConfigError::Io { .. })
    ));
}
