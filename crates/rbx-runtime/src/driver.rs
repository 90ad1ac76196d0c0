//! Batch reconciliation across every owner's active guests.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use chrono::{DateTime, Utc};
use futures_util::future::join_all;
use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use tracing::{error, info, warn};
use uuid::Uuid;

use rbx_config::ReconcileSettings;
use rbx_reconcile::{reconcile, GuestKey};

use crate::{Clock, GuestStore};

// ---------------------------------------------------------------------------
// Options / report
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchOptions {
    /// Max guests actually advanced. Guests with nothing to do don't count.
    pub limit: Option<usize>,
    /// Guests of one owner reconciled in parallel. Zero behaves as one.
    pub concurrency: usize,
    /// Wall-clock budget, checked between chunks.
    pub deadline: Option<Duration>,
}

impl Default for BatchOptions {
    fn default() -> Self {
        Self {
            limit: None,
            concurrency: 4,
            deadline: None,
        }
    }
}

impl BatchOptions {
    pub fn from_settings(s: &ReconcileSettings) -> Self {
        Self {
            limit: s.limit,
            concurrency: s.concurrency,
            deadline: s.deadline_secs.map(Duration::from_secs),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    Completed,
    LimitReached,
    DeadlineExceeded,
    OwnerEnumerationFailed,
}

impl StopReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            StopReason::Completed => "completed",
            StopReason::LimitReached => "limit_reached",
            StopReason::DeadlineExceeded => "deadline_exceeded",
            StopReason::OwnerEnumerationFailed => "owner_enumeration_failed",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchReport {
    pub run_id: Uuid,
    /// `true` only when no guest or owner failed.
    pub success: bool,
    /// Guests advanced by at least one cycle.
    pub reconciled_count: usize,
    pub error_count: usize,
    /// Sum of cycles applied across reconciled guests.
    pub cycles_processed: u64,
    pub guests_scanned: usize,
    pub owners_scanned: usize,
    pub stop_reason: StopReason,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl BatchReport {
    fn start(started_at: DateTime<Utc>) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            success: true,
            reconciled_count: 0,
            error_count: 0,
            cycles_processed: 0,
            guests_scanned: 0,
            owners_scanned: 0,
            stop_reason: StopReason::Completed,
            started_at,
            finished_at: started_at,
        }
    }
}

/// Returned (inside `anyhow::Error`) when the guest to reconcile does not exist.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GuestNotFound {
    pub key: GuestKey,
}

impl std::fmt::Display for GuestNotFound {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "guest not found: {}", self.key)
    }
}

impl std::error::Error for GuestNotFound {}

// ---------------------------------------------------------------------------
// Driver
// ---------------------------------------------------------------------------

#[derive(Clone)]
pub struct BatchDriver {
    store: Arc<dyn GuestStore>,
    clock: Arc<dyn Clock>,
}

impl BatchDriver {
    pub fn new(store: Arc<dyn GuestStore>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    /// Reconcile one guest in its own transaction. Returns cycles applied.
    pub async fn reconcile_guest(&self, key: &GuestKey) -> Result<u32> {
        let mut tx = self.store.begin(key).await?;
        let Some(current) = tx.snapshot().await? else {
            return Err(GuestNotFound { key: key.clone() }.into());
        };

        let now = self.clock.now();
        let outcome = reconcile(&current, now);

        if outcome.is_noop() {
            if let Some(reason) = outcome.skip.filter(|r| r.is_data_quality()) {
                warn!(guest = %key, reason = reason.as_str(), "guest skipped: malformed billing data");
            }
            // tx dropped: nothing to persist.
            return Ok(0);
        }

        tx.write(&outcome.guest).await?;
        tx.commit().await?;

        info!(
            guest = %key,
            cycles = outcome.cycles_processed,
            due_date = %outcome.guest.due_date,
            balance = outcome.guest.balance_brought_forward,
            "guest reconciled"
        );
        Ok(outcome.cycles_processed)
    }

    /// Reconcile every active guest of every owner.
    ///
    /// Never fails as a whole: per-guest and per-owner failures are counted in
    /// the report and `success` turns false.
    pub async fn run_batch(&self, opts: &BatchOptions) -> BatchReport {
        let mut report = BatchReport::start(self.clock.now());
        let deadline = opts.deadline.map(|d| Instant::now() + d);
        let concurrency = opts.concurrency.max(1);

        info!(
            run_id = %report.run_id,
            limit = ?opts.limit,
            concurrency,
            deadline = ?opts.deadline,
            "reconcile batch start"
        );

        let owners = match self.store.list_owners().await {
            Ok(o) => o,
            Err(e) => {
                error!(run_id = %report.run_id, error = %format!("{e:#}"), "owner enumeration failed");
                report.success = false;
                report.stop_reason = StopReason::OwnerEnumerationFailed;
                return self.finish(report).await;
            }
        };

        'owners: for owner_id in owners {
            if let Some(stop) = self.should_stop(&report, opts.limit, deadline) {
                report.stop_reason = stop;
                break;
            }
            report.owners_scanned += 1;

            let guests = match self.store.list_active_guests(&owner_id).await {
                Ok(g) => g,
                Err(e) => {
                    warn!(owner = %owner_id, error = %format!("{e:#}"), "guest enumeration failed");
                    report.error_count += 1;
                    continue;
                }
            };

            let mut rest = guests.as_slice();
            while !rest.is_empty() {
                if let Some(stop) = self.should_stop(&report, opts.limit, deadline) {
                    report.stop_reason = stop;
                    break 'owners;
                }

                // Never start more guests than the remaining limit allows.
                let budget = opts
                    .limit
                    .map(|l| l - report.reconciled_count)
                    .unwrap_or(usize::MAX);
                let n = concurrency.min(budget).min(rest.len());
                let (chunk, tail) = rest.split_at(n);
                rest = tail;

                let results = join_all(chunk.iter().map(|guest_id| {
                    let key = GuestKey::new(owner_id.as_str(), guest_id.as_str());
                    async move {
                        let res = self.reconcile_guest(&key).await;
                        (key, res)
                    }
                }))
                .await;

                for (key, res) in results {
                    report.guests_scanned += 1;
                    match res {
                        Ok(0) => {}
                        Ok(cycles) => {
                            report.reconciled_count += 1;
                            report.cycles_processed += u64::from(cycles);
                        }
                        Err(e) => {
                            warn!(guest = %key, error = %format!("{e:#}"), "guest reconcile failed");
                            report.error_count += 1;
                        }
                    }
                }
            }
        }

        report.success = report.error_count == 0;
        self.finish(report).await
    }

    fn should_stop(
        &self,
        report: &BatchReport,
        limit: Option<usize>,
        deadline: Option<Instant>,
    ) -> Option<StopReason> {
        if limit.is_some_and(|l| report.reconciled_count >= l) {
            return Some(StopReason::LimitReached);
        }
        if deadline.is_some_and(|d| Instant::now() >= d) {
            return Some(StopReason::DeadlineExceeded);
        }
        None
    }

    async fn finish(&self, mut report: BatchReport) -> BatchReport {
        report.finished_at = self.clock.now();

        info!(
            run_id = %report.run_id,
            success = report.success,
            reconciled = report.reconciled_count,
            errors = report.error_count,
            cycles = report.cycles_processed,
            guests_scanned = report.guests_scanned,
            owners_scanned = report.owners_scanned,
            stop_reason = report.stop_reason.as_str(),
            "reconcile batch done"
        );

        if let Err(e) = self.store.record_run(&report).await {
            warn!(run_id = %report.run_id, error = %format!("{e:#}"), "failed to record reconcile run");
        }
        report
    }
}
