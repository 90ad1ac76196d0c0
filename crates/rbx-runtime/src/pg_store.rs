use anyhow::{Context, Result};
use sqlx::{PgPool, Postgres, Transaction};

use rbx_db::ReconcileRunRecord;
use rbx_reconcile::{GuestBillingState, GuestKey};

use crate::{BatchReport, GuestStore, GuestTx};

/// [`GuestStore`] over the rbx-db schema.
#[derive(Clone)]
pub struct PgGuestStore {
    pool: PgPool,
    config_hash: Option<String>,
}

impl PgGuestStore {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool,
            config_hash: None,
        }
    }

    /// Stamp recorded runs with the hash of the config they ran under.
    pub fn with_config_hash(mut self, hash: impl Into<String>) -> Self {
        self.config_hash = Some(hash.into());
        self
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait::async_trait]
impl GuestStore for PgGuestStore {
    async fn list_owners(&self) -> Result<Vec<String>> {
        rbx_db::list_owner_ids(&self.pool).await
    }

    async fn list_active_guests(&self, owner_id: &str) -> Result<Vec<String>> {
        rbx_db::list_active_guest_ids(&self.pool, owner_id).await
    }

    async fn begin(&self, key: &GuestKey) -> Result<Box<dyn GuestTx>> {
        let tx = self
            .pool
            .begin()
            .await
            .context("begin guest transaction failed")?;
        Ok(Box::new(PgGuestTx {
            tx,
            key: key.clone(),
        }))
    }

    async fn record_run(&self, report: &BatchReport) -> Result<()> {
        let record = ReconcileRunRecord {
            run_id: report.run_id,
            started_at_utc: report.started_at,
            finished_at_utc: report.finished_at,
            success: report.success,
            reconciled_count: report.reconciled_count as i64,
            error_count: report.error_count as i64,
            cycles_processed: i64::try_from(report.cycles_processed).unwrap_or(i64::MAX),
            guests_scanned: report.guests_scanned as i64,
            owners_scanned: report.owners_scanned as i64,
            stop_reason: report.stop_reason.as_str().to_string(),
            config_hash: self.config_hash.clone(),
        };
        rbx_db::insert_reconcile_run(&self.pool, &record).await
    }
}

struct PgGuestTx {
    tx: Transaction<'static, Postgres>,
    key: GuestKey,
}

#[async_trait::async_trait]
impl GuestTx for PgGuestTx {
    async fn snapshot(&mut self) -> Result<Option<GuestBillingState>> {
        match rbx_db::lock_guest(&mut self.tx, &self.key).await? {
            None => Ok(None),
            Some(row) => Ok(Some(GuestBillingState::try_from(row)?)),
        }
    }

    async fn write(&mut self, state: &GuestBillingState) -> Result<()> {
        rbx_db::write_guest_billing(&mut self.tx, &self.key, state).await
    }

    async fn commit(self: Box<Self>) -> Result<()> {
        let PgGuestTx { tx, key } = *self;
        tx.commit()
            .await
            .with_context(|| format!("commit guest {key} failed"))
    }
}
