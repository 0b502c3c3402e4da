//! Configuration loading and logging initialisation.
//!
//! ```no_run
//! use barter_negotiation::config::Config;
//!
//! fn main() -> anyhow::Result<()> {
//!     let config = Config::load("negotiation.toml")?;
//!     config.logging.init()?;
//!     Ok(())
//! }
//! ```
use anyhow::Context;
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use tracing_subscriber::{EnvFilter, fmt};

#[derive(Debug, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub negotiation: NegotiationConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub path: PathBuf,
    /// Flush sled to disk after every write instead of on its own schedule.
    pub flush_every_write: bool,
}

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(default)]
pub struct NegotiationConfig {
    /// Re-read the calling user from storage before checking any guard.
    ///
    /// When disabled the caller's session copy must carry the stored
    /// version; a stale copy fails with a version conflict before anything
    /// is checked or written.
    pub reload_caller: bool,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    /// `pretty`, `json`, or anything else for the single-line formatter.
    pub format: String,
}

impl Config {
    pub fn load(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {}", path.display()))?;
        Self::parse_toml(&contents)
    }

    pub fn parse_toml(contents: &str) -> anyhow::Result<Self> {
        let config: Config = toml::from_str(contents).context("invalid configuration")?;
        Ok(config)
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("barter.db"),
            flush_every_write: false,
        }
    }
}

impl Default for NegotiationConfig {
    fn default() -> Self {
        Self {
            reload_caller: true,
        }
    }
}

impl LoggingConfig {
    /// Install the global tracing subscriber. `RUST_LOG` overrides `level`.
    pub fn init(&self) -> anyhow::Result<()> {
        let filter =
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&self.level));

        let installed = match self.format.as_str() {
            "json" => fmt().json().with_env_filter(filter).try_init(),
            "pretty" => fmt().pretty().with_env_filter(filter).try_init(),
            _ => fmt().with_env_filter(filter).try_init(),
        };
        installed.map_err(|err| anyhow::anyhow!("failed to install tracing subscriber: {err}"))
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".into(),
            format: "pretty".into(),
        }
    }
}
