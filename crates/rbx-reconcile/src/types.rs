use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Monetary amounts are integer minor currency units (paise, cents).
pub type Amount = i64;

/// Granularity of a recurring rent period.
///
/// `Minutes` and `Hours` exist for demo/test cadences; real tenancies use
/// `Days`, `Weeks` or `Months`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CycleUnit {
    Minutes,
    Hours,
    Days,
    Weeks,
    Months,
}

impl CycleUnit {
    pub fn as_str(&self) -> &'static str {
        match self {
            CycleUnit::Minutes => "minutes",
            CycleUnit::Hours => "hours",
            CycleUnit::Days => "days",
            CycleUnit::Weeks => "weeks",
            CycleUnit::Months => "months",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "minutes" => Some(CycleUnit::Minutes),
            "hours" => Some(CycleUnit::Hours),
            "days" => Some(CycleUnit::Days),
            "weeks" => Some(CycleUnit::Weeks),
            "months" => Some(CycleUnit::Months),
            _ => None,
        }
    }

    /// `true` for units with a fixed elapsed-time length (everything except months).
    pub fn is_fixed_length(&self) -> bool {
        !matches!(self, CycleUnit::Months)
    }
}

impl fmt::Display for CycleUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Payment status of the current cycle.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RentStatus {
    Paid,
    Partial,
    Unpaid,
}

impl RentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RentStatus::Paid => "paid",
            RentStatus::Partial => "partial",
            RentStatus::Unpaid => "unpaid",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "paid" => Some(RentStatus::Paid),
            "partial" => Some(RentStatus::Partial),
            "unpaid" => Some(RentStatus::Unpaid),
            _ => None,
        }
    }
}

/// One-off charge billed in the current cycle (electricity share, laundry...).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdditionalCharge {
    pub description: String,
    pub amount: Amount,
}

impl AdditionalCharge {
    pub fn new(description: impl Into<String>, amount: Amount) -> Self {
        Self {
            description: description.into(),
            amount,
        }
    }
}

/// The subset of a guest record that rent reconciliation reads and writes.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct GuestBillingState {
    /// Next instant rent is owed. Only ever moves forward, in whole cycles.
    pub due_date: DateTime<Utc>,
    /// Rent charged per cycle. Never negative.
    pub rent_amount: Amount,
    pub rent_cycle_unit: CycleUnit,
    /// Units per cycle. Zero is a malformed record; the engine refuses to advance it.
    pub rent_cycle_value: u32,
    /// Day-of-month monthly due dates snap to.
    #[serde(default)]
    pub billing_anchor_day: Option<u32>,
    /// Unpaid amount carried from earlier cycles. Negative means credit.
    #[serde(default)]
    pub balance_brought_forward: Amount,
    /// Paid so far in the current cycle.
    #[serde(default)]
    pub rent_paid_amount: Amount,
    pub rent_status: RentStatus,
    #[serde(default)]
    pub additional_charges: Vec<AdditionalCharge>,
    #[serde(default)]
    pub is_vacated: bool,
    /// Set once the guest has given notice.
    #[serde(default)]
    pub exit_date: Option<DateTime<Utc>>,
}

impl GuestBillingState {
    /// Fresh tenancy: unpaid, no balance, no charges.
    pub fn new(due_date: DateTime<Utc>, rent_amount: Amount, unit: CycleUnit, value: u32) -> Self {
        Self {
            due_date,
            rent_amount,
            rent_cycle_unit: unit,
            rent_cycle_value: value,
            billing_anchor_day: None,
            balance_brought_forward: 0,
            rent_paid_amount: 0,
            rent_status: RentStatus::Unpaid,
            additional_charges: Vec::new(),
            is_vacated: false,
            exit_date: None,
        }
    }

    /// Sum of one-off charges. `None` if it does not fit in an [`Amount`].
    pub fn charges_total(&self) -> Option<Amount> {
        self.additional_charges
            .iter()
            .try_fold(0 as Amount, |acc, c| acc.checked_add(c.amount))
    }

    /// Everything the guest owes right now: carried balance, one-off charges
    /// and this cycle's rent, less what was already paid this cycle.
    ///
    /// `None` on overflow.
    pub fn total_due(&self) -> Option<Amount> {
        self.balance_brought_forward
            .checked_add(self.charges_total()?)?
            .checked_add(self.rent_amount)?
            .checked_sub(self.rent_paid_amount)
    }
}

/// Address of a persisted guest: every guest belongs to exactly one owner.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct GuestKey {
    pub owner_id: String,
    pub guest_id: String,
}

impl GuestKey {
    pub fn new(owner_id: impl Into<String>, guest_id: impl Into<String>) -> Self {
        Self {
            owner_id: owner_id.into(),
            guest_id: guest_id.into(),
        }
    }
}

impl fmt::Display for GuestKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.owner_id, self.guest_id)
    }
}

/// Why a reconcile call left the guest untouched.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    Vacated,
    OnNotice,
    Paid,
    NotDue,
    /// Past due, but less than one whole cycle has elapsed.
    NoFullCycle,
    /// Cycle value is zero or the date arithmetic cannot progress.
    InvalidCycle,
    /// `rent_amount * cycles` or the new balance does not fit in an [`Amount`].
    AmountOverflow,
}

impl SkipReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            SkipReason::Vacated => "vacated",
            SkipReason::OnNotice => "on_notice",
            SkipReason::Paid => "paid",
            SkipReason::NotDue => "not_due",
            SkipReason::NoFullCycle => "no_full_cycle",
            SkipReason::InvalidCycle => "invalid_cycle",
            SkipReason::AmountOverflow => "amount_overflow",
        }
    }

    /// Malformed-data skips that callers should surface as data-quality warnings.
    pub fn is_data_quality(&self) -> bool {
        matches!(self, SkipReason::InvalidCycle | SkipReason::AmountOverflow)
    }
}

/// Outcome of [`crate::reconcile`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Reconciliation {
    pub guest: GuestBillingState,
    pub cycles_processed: u32,
    /// `Some` exactly when `cycles_processed == 0`.
    pub skip: Option<SkipReason>,
}

impl Reconciliation {
    pub(crate) fn unchanged(guest: &GuestBillingState, reason: SkipReason) -> Self {
        Self {
            guest: guest.clone(),
            cycles_processed: 0,
            skip: Some(reason),
        }
    }

    pub fn is_noop(&self) -> bool {
        self.cycles_processed == 0
    }
}
