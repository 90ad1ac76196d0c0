//! Storage seam for the batch driver.

use anyhow::Result;

use rbx_reconcile::{GuestBillingState, GuestKey};

use crate::BatchReport;

#[async_trait::async_trait]
pub trait GuestStore: Send + Sync {
    /// Every owner whose guests are reconciled.
    async fn list_owners(&self) -> Result<Vec<String>>;

    /// The owner's guests that have not vacated.
    async fn list_active_guests(&self, owner_id: &str) -> Result<Vec<String>>;

    /// Open a transaction scoped to one guest.
    async fn begin(&self, key: &GuestKey) -> Result<Box<dyn GuestTx>>;

    /// Persist a finished batch. Stores without a run ledger ignore it.
    async fn record_run(&self, _report: &BatchReport) -> Result<()> {
        Ok(())
    }
}

/// One guest's read-modify-write unit.
///
/// Dropping without [`GuestTx::commit`] discards any write.
#[async_trait::async_trait]
pub trait GuestTx: Send {
    /// Current state, read under the transaction's lock. `None` if absent.
    async fn snapshot(&mut self) -> Result<Option<GuestBillingState>>;

    async fn write(&mut self, state: &GuestBillingState) -> Result<()>;

    async fn commit(self: Box<Self>) -> Result<()>;
}
