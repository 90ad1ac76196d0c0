//! Command handler modules for the rbx CLI.
//!
//! Shared utilities used by multiple command paths live here.

pub mod next_due;
pub mod reconcile;
pub mod reminders;

use anyhow::Result;
use rbx_db::PgPool;
use tracing_subscriber::EnvFilter;

use rbx_config::{LoadedConfig, Settings, UnusedKeyPolicy};

/// Effective configuration for this invocation.
pub struct CliConfig {
    /// `None` when no `--config` was given.
    pub loaded: Option<LoadedConfig>,
    pub settings: Settings,
}

impl CliConfig {
    pub fn config_hash(&self) -> Option<&str> {
        self.loaded.as_ref().map(|l| l.config_hash.as_str())
    }
}

pub fn load_config(paths: &[String]) -> Result<CliConfig> {
    if paths.is_empty() {
        return Ok(CliConfig {
            loaded: None,
            settings: Settings::default(),
        });
    }
    let loaded = rbx_config::load_layered_yaml(paths)?;
    let report = rbx_config::report_unused_keys(&loaded.config_json, UnusedKeyPolicy::Warn)?;
    for p in &report.unused_leaf_pointers {
        eprintln!("WARN unused_config_key={p}");
    }
    let settings = loaded.settings()?;
    Ok(CliConfig {
        loaded: Some(loaded),
        settings,
    })
}

/// Logs go to stderr; stdout carries the `key=value` results.
pub fn init_tracing(default_filter: &str) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_filter))
        .unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

pub async fn connect(settings: &Settings) -> Result<PgPool> {
    rbx_db::connect_from_env_var(&settings.database.url_env, settings.database.max_connections).await
}
