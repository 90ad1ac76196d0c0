//! In-memory [`GuestStore`] with per-guest locking and failure injection.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use anyhow::{bail, Result};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

use rbx_reconcile::{GuestBillingState, GuestKey};
use rbx_runtime::{BatchReport, GuestStore, GuestTx};

type GuestCell = Arc<AsyncMutex<GuestBillingState>>;

#[derive(Default)]
struct Faults {
    list_owners: bool,
    list_guests: BTreeSet<String>,
    begin: BTreeSet<GuestKey>,
    write: BTreeSet<GuestKey>,
    commit: BTreeSet<GuestKey>,
    tx_delay: Option<Duration>,
}

#[derive(Default)]
struct Inner {
    /// owner_id -> role
    owners: Mutex<BTreeMap<String, String>>,
    guests: Mutex<BTreeMap<GuestKey, GuestCell>>,
    faults: Mutex<Faults>,
    runs: Mutex<Vec<BatchReport>>,
    commits: AtomicUsize,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|p| p.into_inner())
}

/// Cheap to clone; clones share state.
///
/// A guest transaction holds that guest's async mutex from `begin` until it
/// is committed or dropped, the same serialization `select .. for update`
/// gives in Postgres.
#[derive(Clone, Default)]
pub struct InMemoryGuestStore {
    inner: Arc<Inner>,
}

impl InMemoryGuestStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_owner(&self, owner_id: &str, role: &str) {
        lock(&self.inner.owners).insert(owner_id.to_string(), role.to_string());
    }

    /// Insert or replace a guest. Creates the owner (role "owner") if unknown.
    pub fn put_guest(&self, key: &GuestKey, state: GuestBillingState) {
        lock(&self.inner.owners)
            .entry(key.owner_id.clone())
            .or_insert_with(|| "owner".to_string());
        lock(&self.inner.guests).insert(key.clone(), Arc::new(AsyncMutex::new(state)));
    }

    pub async fn guest(&self, key: &GuestKey) -> Option<GuestBillingState> {
        let cell = lock(&self.inner.guests).get(key).cloned()?;
        let g = cell.lock().await;
        Some(g.clone())
    }

    // --- failure injection -------------------------------------------------

    pub fn fail_list_owners(&self) {
        lock(&self.inner.faults).list_owners = true;
    }

    pub fn fail_list_guests(&self, owner_id: &str) {
        lock(&self.inner.faults).list_guests.insert(owner_id.to_string());
    }

    pub fn fail_begin(&self, key: &GuestKey) {
        lock(&self.inner.faults).begin.insert(key.clone());
    }

    pub fn fail_write(&self, key: &GuestKey) {
        lock(&self.inner.faults).write.insert(key.clone());
    }

    pub fn fail_commit(&self, key: &GuestKey) {
        lock(&self.inner.faults).commit.insert(key.clone());
    }

    /// Sleep this long inside every transaction before reading.
    pub fn set_tx_delay(&self, d: Duration) {
        lock(&self.inner.faults).tx_delay = Some(d);
    }

    // --- observation -------------------------------------------------------

    /// Transactions that committed a write.
    pub fn commits(&self) -> usize {
        self.inner.commits.load(Ordering::SeqCst)
    }

    /// Highest number of guest transactions open at once.
    pub fn max_in_flight(&self) -> usize {
        self.inner.max_in_flight.load(Ordering::SeqCst)
    }

    pub fn recorded_runs(&self) -> Vec<BatchReport> {
        lock(&self.inner.runs).clone()
    }
}

#[async_trait::async_trait]
impl GuestStore for InMemoryGuestStore {
    async fn list_owners(&self) -> Result<Vec<String>> {
        if lock(&self.inner.faults).list_owners {
            bail!("injected: list_owners failed");
        }
        Ok(lock(&self.inner.owners)
            .iter()
            .filter(|(_, role)| role.as_str() == "owner")
            .map(|(id, _)| id.clone())
            .collect())
    }

    async fn list_active_guests(&self, owner_id: &str) -> Result<Vec<String>> {
        if lock(&self.inner.faults).list_guests.contains(owner_id) {
            bail!("injected: list_active_guests failed for {owner_id}");
        }
        let cells: Vec<(String, GuestCell)> = lock(&self.inner.guests)
            .iter()
            .filter(|(k, _)| k.owner_id == owner_id)
            .map(|(k, c)| (k.guest_id.clone(), c.clone()))
            .collect();

        let mut out = Vec::new();
        for (guest_id, cell) in cells {
            if !cell.lock().await.is_vacated {
                out.push(guest_id);
            }
        }
        Ok(out)
    }

    async fn begin(&self, key: &GuestKey) -> Result<Box<dyn GuestTx>> {
        let (fail_begin, fail_write, fail_commit, delay) = {
            let f = lock(&self.inner.faults);
            (
                f.begin.contains(key),
                f.write.contains(key),
                f.commit.contains(key),
                f.tx_delay,
            )
        };
        if fail_begin {
            bail!("injected: begin failed for {key}");
        }

        let cell = lock(&self.inner.guests).get(key).cloned();
        let guard = match cell {
            Some(c) => Some(c.lock_owned().await),
            None => None,
        };

        let open = self.inner.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.inner.max_in_flight.fetch_max(open, Ordering::SeqCst);

        Ok(Box::new(MemTx {
            inner: self.inner.clone(),
            guard,
            pending: None,
            fail_write,
            fail_commit,
            delay,
        }))
    }

    async fn record_run(&self, report: &BatchReport) -> Result<()> {
        lock(&self.inner.runs).push(report.clone());
        Ok(())
    }
}

struct MemTx {
    inner: Arc<Inner>,
    guard: Option<OwnedMutexGuard<GuestBillingState>>,
    pending: Option<GuestBillingState>,
    fail_write: bool,
    fail_commit: bool,
    delay: Option<Duration>,
}

impl Drop for MemTx {
    fn drop(&mut self) {
        self.inner.in_flight.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait::async_trait]
impl GuestTx for MemTx {
    async fn snapshot(&mut self) -> Result<Option<GuestBillingState>> {
        if let Some(d) = self.delay {
            tokio::time::sleep(d).await;
        }
        Ok(self.guard.as_deref().cloned())
    }

    async fn write(&mut self, state: &GuestBillingState) -> Result<()> {
        if self.fail_write {
            bail!("injected: write failed");
        }
        if self.guard.is_none() {
            bail!("write to missing guest");
        }
        self.pending = Some(state.clone());
        Ok(())
    }

    async fn commit(mut self: Box<Self>) -> Result<()> {
        if self.fail_commit {
            bail!("injected: commit failed");
        }
        let pending = self.pending.take();
        if let (Some(guard), Some(state)) = (self.guard.as_mut(), pending) {
            **guard = state;
            self.inner.commits.fetch_add(1, Ordering::SeqCst);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::monthly_guest;

    #[tokio::test]
    async fn uncommitted_write_is_discarded() {
        let store = InMemoryGuestStore::new();
        let key = GuestKey::new("o", "g");
        let original = monthly_guest("2024-03-01T00:00:00Z", 5000);
        store.put_guest(&key, original.clone());

        {
            let mut tx = store.begin(&key).await.unwrap();
            let mut changed = original.clone();
            changed.balance_brought_forward = 99;
            tx.write(&changed).await.unwrap();
        }
        assert_eq!(store.guest(&key).await, Some(original));
        assert_eq!(store.commits(), 0);
    }

    #[tokio::test]
    async fn vacated_guests_are_not_listed_and_tenants_are_not_owners() {
        let store = InMemoryGuestStore::new();
        let mut gone = monthly_guest("2024-03-01T00:00:00Z", 5000);
        gone.is_vacated = true;
        store.put_guest(&GuestKey::new("o", "a"), monthly_guest("2024-03-01T00:00:00Z", 1));
        store.put_guest(&GuestKey::new("o", "b"), gone);
        store.add_owner("t", "tenant");

        assert_eq!(store.list_owners().await.unwrap(), vec!["o".to_string()]);
        assert_eq!(store.list_active_guests("o").await.unwrap(), vec!["a".to_string()]);
    }
}
