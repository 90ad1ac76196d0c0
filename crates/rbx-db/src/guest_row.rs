//! Raw guest rows and their validated conversion into billing state.

use chrono::{DateTime, Utc};
use serde_json::Value;

use rbx_reconcile::calendar::{ANCHOR_MAX, ANCHOR_MIN};
use rbx_reconcile::{AdditionalCharge, CycleUnit, GuestBillingState, GuestKey, RentStatus};

/// A `guests` row exactly as stored. Nothing here is trusted yet.
#[derive(Debug, Clone, PartialEq)]
pub struct GuestRow {
    pub owner_id: String,
    pub guest_id: String,
    pub due_date: DateTime<Utc>,
    pub rent_amount: i64,
    pub rent_cycle_unit: String,
    pub rent_cycle_value: i32,
    pub billing_anchor_day: Option<i32>,
    pub balance_brought_forward: i64,
    pub rent_paid_amount: i64,
    pub rent_status: String,
    pub additional_charges: Value,
    pub is_vacated: bool,
    pub exit_date: Option<DateTime<Utc>>,
}

impl GuestRow {
    pub fn key(&self) -> GuestKey {
        GuestKey::new(&self.owner_id, &self.guest_id)
    }
}

/// A stored guest row that cannot be reconciled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvalidGuestRecord {
    pub key: GuestKey,
    pub field: &'static str,
    pub detail: String,
}

impl InvalidGuestRecord {
    fn new(key: GuestKey, field: &'static str, detail: impl Into<String>) -> Self {
        Self {
            key,
            field,
            detail: detail.into(),
        }
    }
}

impl std::fmt::Display for InvalidGuestRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "invalid guest record {}: {} {}",
            self.key, self.field, self.detail
        )
    }
}

impl std::error::Error for InvalidGuestRecord {}

impl TryFrom<GuestRow> for GuestBillingState {
    type Error = InvalidGuestRecord;

    fn try_from(row: GuestRow) -> Result<Self, Self::Error> {
        let key = row.key();
        let bad = |field: &'static str, detail: String| InvalidGuestRecord::new(key.clone(), field, detail);

        let rent_cycle_unit = CycleUnit::parse(&row.rent_cycle_unit)
            .ok_or_else(|| bad("rent_cycle_unit", format!("unknown unit {:?}", row.rent_cycle_unit)))?;

        let rent_cycle_value = u32::try_from(row.rent_cycle_value)
            .ok()
            .filter(|v| *v > 0)
            .ok_or_else(|| bad("rent_cycle_value", format!("must be positive, got {}", row.rent_cycle_value)))?;

        if row.rent_amount < 0 {
            return Err(bad("rent_amount", format!("must not be negative, got {}", row.rent_amount)));
        }

        let billing_anchor_day = match row.billing_anchor_day {
            None => None,
            Some(d) => Some(
                u32::try_from(d)
                    .ok()
                    .filter(|d| (ANCHOR_MIN..=ANCHOR_MAX).contains(d))
                    .ok_or_else(|| bad("billing_anchor_day", format!("out of range: {d}")))?,
            ),
        };

        let rent_status = RentStatus::parse(&row.rent_status)
            .ok_or_else(|| bad("rent_status", format!("unknown status {:?}", row.rent_status)))?;

        let additional_charges: Vec<AdditionalCharge> = match row.additional_charges {
            Value::Null => Vec::new(),
            v => serde_json::from_value(v).map_err(|e| bad("additional_charges", e.to_string()))?,
        };

        Ok(GuestBillingState {
            due_date: row.due_date,
            rent_amount: row.rent_amount,
            rent_cycle_unit,
            rent_cycle_value,
            billing_anchor_day,
            balance_brought_forward: row.balance_brought_forward,
            rent_paid_amount: row.rent_paid_amount,
            rent_status,
            additional_charges,
            is_vacated: row.is_vacated,
            exit_date: row.exit_date,
        })
    }
}
