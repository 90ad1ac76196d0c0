//! Typed settings over the merged config document.

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub database: DatabaseSettings,
    pub reconcile: ReconcileSettings,
    pub daemon: DaemonSettings,
    pub logging: LoggingSettings,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseSettings {
    /// NAME of the env var holding the connection URL.
    pub url_env: String,
    pub max_connections: u32,
}

impl Default for DatabaseSettings {
    fn default() -> Self {
        Self {
            url_env: "RBX_DATABASE_URL".to_string(),
            max_connections: 5,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconcileSettings {
    /// Max guests actually reconciled per batch. `None` = unbounded.
    pub limit: Option<usize>,
    /// Guests of one owner processed in parallel.
    pub concurrency: usize,
    /// Cooperative wall-clock budget for one batch.
    pub deadline_secs: Option<u64>,
}

impl Default for ReconcileSettings {
    fn default() -> Self {
        Self {
            limit: None,
            concurrency: 4,
            deadline_secs: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DaemonSettings {
    pub addr: String,
    /// Interval between scheduled batches. `None` disables the scheduler.
    pub schedule_secs: Option<u64>,
}

impl Default for DaemonSettings {
    fn default() -> Self {
        Self {
            addr: "127.0.0.1:8899".to_string(),
            schedule_secs: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSettings {
    /// `EnvFilter` directive used when `RUST_LOG` is unset.
    pub filter: String,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            filter: "info".to_string(),
        }
    }
}

impl Settings {
    pub fn from_json(v: &Value) -> Result<Self> {
        let s: Settings = serde_json::from_value(v.clone()).context("config does not match settings shape")?;
        s.validate()?;
        Ok(s)
    }

    fn validate(&self) -> Result<()> {
        if self.database.url_env.trim().is_empty() {
            bail!("CONFIG_INVALID database.url_env must name an env var");
        }
        if self.database.max_connections == 0 {
            bail!("CONFIG_INVALID database.max_connections must be >= 1");
        }
        if self.reconcile.concurrency == 0 {
            bail!("CONFIG_INVALID reconcile.concurrency must be >= 1");
        }
        if self.daemon.schedule_secs == Some(0) {
            bail!("CONFIG_INVALID daemon.schedule_secs must be >= 1 when set");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn empty_document_yields_defaults() {
        let s = Settings::from_json(&json!({})).unwrap();
        assert_eq!(s, Settings::default());
        assert_eq!(s.database.url_env, "RBX_DATABASE_URL");
        assert_eq!(s.reconcile.concurrency, 4);
        assert_eq!(s.daemon.schedule_secs, None);
    }

    #[test]
    fn partial_sections_keep_other_defaults() {
        let s = Settings::from_json(&json!({"reconcile": {"limit": 25}})).unwrap();
        assert_eq!(s.reconcile.limit, Some(25));
        assert_eq!(s.reconcile.concurrency, 4);
        assert_eq!(s.logging.filter, "info");
    }

    #[test]
    fn zero_concurrency_is_rejected() {
        let err = Settings::from_json(&json!({"reconcile": {"concurrency": 0}})).unwrap_err();
        assert!(err.to_string().contains("reconcile.concurrency"));
    }

    #[test]
    fn wrong_type_is_rejected() {
        assert!(Settings::from_json(&json!({"reconcile": {"limit": "lots"}})).is_err());
    }
}
