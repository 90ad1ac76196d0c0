//! rbx-testkit
//!
//! In-memory doubles for the runtime seams plus guest fixtures. Used by the
//! runtime, CLI and daemon test suites; never linked into release binaries.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::fs;

use rbx_reconcile::{CycleUnit, GuestBillingState, GuestKey};

mod clock;
mod memory_store;

pub use clock::FixedClock;
pub use memory_store::InMemoryGuestStore;

/// Parse an RFC 3339 timestamp. Panics on bad input; fixtures only.
pub fn at(s: &str) -> DateTime<Utc> {
    s.parse().unwrap_or_else(|e| panic!("bad fixture timestamp {s:?}: {e}"))
}

/// Unpaid monthly guest with no balance.
pub fn monthly_guest(due: &str, rent: i64) -> GuestBillingState {
    GuestBillingState::new(at(due), rent, CycleUnit::Months, 1)
}

#[derive(Debug, Clone, Deserialize)]
pub struct SeededGuest {
    pub owner_id: String,
    pub guest_id: String,
    #[serde(flatten)]
    pub state: GuestBillingState,
}

impl SeededGuest {
    pub fn key(&self) -> GuestKey {
        GuestKey::new(&self.owner_id, &self.guest_id)
    }
}

/// Load a JSON array of guests (owner_id, guest_id + billing fields).
pub fn load_guests_json(path: &str) -> Result<Vec<SeededGuest>> {
    let s = fs::read_to_string(path).with_context(|| format!("read guests fixture: {path}"))?;
    let guests: Vec<SeededGuest> = serde_json::from_str(&s).context("parse guests fixture json")?;
    Ok(guests)
}

/// Path of a file under this crate's `fixtures/` directory.
pub fn fixture_path(name: &str) -> String {
    format!("{}/fixtures/{}", env!("CARGO_MANIFEST_DIR"), name)
}
