use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Result};

use rbx_reconcile::GuestKey;
use rbx_runtime::{BatchDriver, BatchOptions, PgGuestStore, SystemClock};

use super::CliConfig;

async fn driver(cfg: &CliConfig) -> Result<BatchDriver> {
    let pool = super::connect(&cfg.settings).await?;
    let mut store = PgGuestStore::new(pool);
    if let Some(h) = cfg.config_hash() {
        store = store.with_config_hash(h);
    }
    Ok(BatchDriver::new(Arc::new(store), Arc::new(SystemClock)))
}

pub async fn run_all(
    cfg: &CliConfig,
    limit: Option<usize>,
    concurrency: Option<usize>,
    deadline_secs: Option<u64>,
) -> Result<()> {
    let mut opts = BatchOptions::from_settings(&cfg.settings.reconcile);
    if limit.is_some() {
        opts.limit = limit;
    }
    if let Some(c) = concurrency {
        opts.concurrency = c;
    }
    if let Some(s) = deadline_secs {
        opts.deadline = Some(Duration::from_secs(s));
    }

    let report = driver(cfg).await?.run_batch(&opts).await;

    println!("run_id={}", report.run_id);
    println!("success={}", report.success);
    println!("reconciled_count={}", report.reconciled_count);
    println!("error_count={}", report.error_count);
    println!("cycles_processed={}", report.cycles_processed);
    println!("guests_scanned={}", report.guests_scanned);
    println!("owners_scanned={}", report.owners_scanned);
    println!("stop_reason={}", report.stop_reason.as_str());

    if !report.success {
        bail!(
            "RECONCILE_FAILED run_id={} errors={} stop_reason={}",
            report.run_id,
            report.error_count,
            report.stop_reason.as_str()
        );
    }
    Ok(())
}

pub async fn run_guest(cfg: &CliConfig, owner: &str, guest: &str) -> Result<()> {
    let key = GuestKey::new(owner, guest);
    let cycles = driver(cfg).await?.reconcile_guest(&key).await?;
    println!("guest={key}");
    println!("cycles_processed={cycles}");
    Ok(())
}
