//! Layered configuration for the relay.
//!
//! Configuration is loaded in layers with increasing priority:
//! 1. Compiled-in defaults
//! 2. TOML configuration file (if provided)
//! 3. Environment variable overrides (prefix `ORDER_RELAY__`, nested with `__`;
//!    `ORDER_RELAY__EXCHANGES` takes a comma separated list)

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use config::{Config, Environment, File};
use persistence::JournalConfig;
use serde::Deserialize;
use types::Address;

use crate::book::OrderBook;
use crate::proxy::ExchangeProxy;

const ENV_PREFIX: &str = "ORDER_RELAY";

fn default_store_dir() -> PathBuf {
    PathBuf::from("data/orders")
}

/// Default purge period: 60 s.
fn default_purge_interval_secs() -> u64 {
    60
}

/// Default bound on each exchange capability call: 5 000 ms.
fn default_validation_timeout_ms() -> u64 {
    5_000
}

#[derive(Debug, Clone, Deserialize)]
pub struct RelayConfig {
    /// Directory holding the order journal.
    #[serde(default = "default_store_dir")]
    pub store_dir: PathBuf,
    #[serde(default = "default_purge_interval_secs")]
    pub purge_interval_secs: u64,
    #[serde(default = "default_validation_timeout_ms")]
    pub validation_timeout_ms: u64,
    /// Trusted exchange contracts.
    #[serde(default)]
    pub exchanges: Vec<Address>,
    /// Emit JSON logs instead of the compact format.
    #[serde(default)]
    pub log_json: bool,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            store_dir: default_store_dir(),
            purge_interval_secs: default_purge_interval_secs(),
            validation_timeout_ms: default_validation_timeout_ms(),
            exchanges: Vec::new(),
            log_json: false,
        }
    }
}

impl RelayConfig {
    pub fn load(config_path: Option<&Path>) -> Result<Self> {
        let mut builder = Config::builder()
            .set_default("store_dir", "data/orders")?
            .set_default("purge_interval_secs", 60i64)?
            .set_default("validation_timeout_ms", 5_000i64)?
            .set_default("exchanges", Vec::<String>::new())?
            .set_default("log_json", false)?;

        if let Some(path) = config_path {
            let path_str = path.to_str().context("config path is not valid UTF-8")?;
            builder = builder.add_source(File::with_name(path_str).required(true));
        }

        builder = builder.add_source(
            Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("__")
                .separator("__")
                .list_separator(",")
                .with_list_parse_key("exchanges")
                .try_parsing(true),
        );

        let cfg: RelayConfig = builder
            .build()
            .context("failed to build configuration")?
            .try_deserialize()
            .context("failed to deserialize configuration")?;

        cfg.validate()?;
        Ok(cfg)
    }

    fn validate(&self) -> Result<()> {
        if self.purge_interval_secs == 0 {
            bail!("purge_interval_secs must be positive");
        }
        if self.validation_timeout_ms == 0 {
            bail!("validation_timeout_ms must be positive");
        }
        Ok(())
    }

    pub fn purge_interval(&self) -> Duration {
        Duration::from_secs(self.purge_interval_secs)
    }

    pub fn validation_timeout(&self) -> Duration {
        Duration::from_millis(self.validation_timeout_ms)
    }

    pub fn journal(&self) -> JournalConfig {
        JournalConfig::new(&self.store_dir)
    }

    /// Open the configured store as a book bounded by the configured
    /// validation timeout.
    pub fn open_book(&self) -> Result<OrderBook> {
        let book = OrderBook::open(self.journal())
            .with_context(|| format!("failed to open store at {}", self.store_dir.display()))?;
        Ok(book.with_validation_timeout(self.validation_timeout()))
    }

    /// Trust every configured exchange, each answered by `proxy`.
    pub fn register_exchanges(&self, book: &OrderBook, proxy: Arc<dyn ExchangeProxy>) {
        for exchange in &self.exchanges {
            book.register_exchange(*exchange, proxy.clone());
        }
    }
}
