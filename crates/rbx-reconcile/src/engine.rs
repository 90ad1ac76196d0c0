use chrono::{DateTime, Utc};

use crate::calendar::{advance_cycles, elapsed_units, next_due_date};
use crate::{GuestBillingState, Reconciliation, RentStatus, SkipReason};

fn exemption(guest: &GuestBillingState) -> Option<SkipReason> {
    if guest.is_vacated {
        Some(SkipReason::Vacated)
    } else if guest.exit_date.is_some() {
        Some(SkipReason::OnNotice)
    } else if guest.rent_status == RentStatus::Paid {
        Some(SkipReason::Paid)
    } else {
        None
    }
}

/// Count whole cycles that have lapsed at `now` and the due date they lead to.
///
/// A cycle counts once its closing boundary is at or before `now`. Fixed
/// units divide the elapsed duration; months walk the anchored calculator so
/// the count always agrees with where the due date actually lands.
///
/// `None` means the cadence cannot make progress (zero value, overflow).
fn lapsed_cycles(guest: &GuestBillingState, now: DateTime<Utc>) -> Option<(u32, DateTime<Utc>)> {
    let unit = guest.rent_cycle_unit;
    let value = guest.rent_cycle_value;
    let anchor = guest.billing_anchor_day;

    if value == 0 {
        return None;
    }

    if unit.is_fixed_length() {
        let elapsed = elapsed_units(guest.due_date, now, unit);
        if elapsed <= 0 {
            return Some((0, guest.due_date));
        }
        let cycles = u32::try_from(elapsed / i64::from(value)).ok()?;
        let due = advance_cycles(guest.due_date, unit, value, anchor, cycles)?;
        return Some((cycles, due));
    }

    let mut cycles: u32 = 0;
    let mut due = guest.due_date;
    loop {
        let next = next_due_date(due, unit, value, anchor)?;
        if next <= due {
            // Zero-progress step: refuse rather than spin.
            return None;
        }
        if next > now {
            break;
        }
        due = next;
        cycles = cycles.checked_add(1)?;
    }
    Some((cycles, due))
}

/// Bring a guest's due date and balance up to date at `now`.
///
/// Pure and total: no IO, no clock, no panics. Exempt guests (vacated, on
/// notice, paid) and guests not yet strictly past due come back unchanged
/// with `cycles_processed == 0`, as do malformed cadences.
///
/// When `n > 0` cycles have lapsed:
/// - `due_date` advances exactly `n` cycles;
/// - `balance_brought_forward` grows by `rent_amount * n`;
/// - `rent_paid_amount` resets to 0, `rent_status` becomes unpaid and
///   `additional_charges` is cleared.
///
/// Applying the result again at the same `now` is a no-op.
pub fn reconcile(guest: &GuestBillingState, now: DateTime<Utc>) -> Reconciliation {
    if let Some(reason) = exemption(guest) {
        return Reconciliation::unchanged(guest, reason);
    }

    if now <= guest.due_date {
        return Reconciliation::unchanged(guest, SkipReason::NotDue);
    }

    let Some((cycles, new_due)) = lapsed_cycles(guest, now) else {
        return Reconciliation::unchanged(guest, SkipReason::InvalidCycle);
    };

    if cycles == 0 {
        return Reconciliation::unchanged(guest, SkipReason::NoFullCycle);
    }

    let new_balance = guest
        .rent_amount
        .checked_mul(i64::from(cycles))
        .and_then(|missed| guest.balance_brought_forward.checked_add(missed));
    let Some(new_balance) = new_balance else {
        return Reconciliation::unchanged(guest, SkipReason::AmountOverflow);
    };

    let mut updated = guest.clone();
    updated.due_date = new_due;
    updated.balance_brought_forward = new_balance;
    updated.rent_paid_amount = 0;
    updated.rent_status = RentStatus::Unpaid;
    updated.additional_charges.clear();

    Reconciliation {
        guest: updated,
        cycles_processed: cycles,
        skip: None,
    }
}

/// `true` when [`reconcile`] would advance at least one cycle at `now`.
pub fn is_due_for_rollover(guest: &GuestBillingState, now: DateTime<Utc>) -> bool {
    !reconcile(guest, now).is_noop()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{AdditionalCharge, CycleUnit};

    fn at(s: &str) -> DateTime<Utc> {
        s.parse().expect("valid rfc3339 timestamp")
    }

    fn monthly(due: &str, rent: i64) -> GuestBillingState {
        GuestBillingState::new(at(due), rent, CycleUnit::Months, 1)
    }

    #[test]
    fn rollover_resets_cycle_fields() {
        let mut g = monthly("2024-07-15T00:00:00Z", 5000);
        g.rent_status = RentStatus::Partial;
        g.rent_paid_amount = 2000;
        g.balance_brought_forward = 1000;
        g.additional_charges
            .push(AdditionalCharge::new("electricity", 350));

        let r = reconcile(&g, at("2024-08-15T00:00:00Z"));
        assert_eq!(r.cycles_processed, 1);
        assert_eq!(r.skip, None);
        assert_eq!(r.guest.due_date, at("2024-08-15T00:00:00Z"));
        assert_eq!(r.guest.balance_brought_forward, 6000);
        assert_eq!(r.guest.rent_paid_amount, 0);
        assert_eq!(r.guest.rent_status, RentStatus::Unpaid);
        assert!(r.guest.additional_charges.is_empty());
    }

    #[test]
    fn partial_payment_is_not_credited_to_balance() {
        let mut g = GuestBillingState::new(at("2024-08-01T10:00:00Z"), 10, CycleUnit::Minutes, 3);
        g.rent_status = RentStatus::Partial;
        g.rent_paid_amount = 5;

        let r = reconcile(&g, at("2024-08-01T10:05:00Z"));
        assert_eq!(r.cycles_processed, 1);
        assert_eq!(r.guest.balance_brought_forward, 10);
        assert_eq!(r.guest.rent_paid_amount, 0);
        assert_eq!(r.guest.due_date, at("2024-08-01T10:03:00Z"));
    }

    #[test]
    fn zero_cycle_value_is_skipped_as_invalid() {
        let mut g = monthly("2024-01-01T00:00:00Z", 5000);
        g.rent_cycle_value = 0;
        let r = reconcile(&g, at("2025-01-01T00:00:00Z"));
        assert_eq!(r.cycles_processed, 0);
        assert_eq!(r.skip, Some(SkipReason::InvalidCycle));
        assert_eq!(r.guest, g);
    }

    #[test]
    fn balance_overflow_is_skipped() {
        let mut g = monthly("2024-01-01T00:00:00Z", i64::MAX / 2);
        g.balance_brought_forward = i64::MAX / 2;
        let r = reconcile(&g, at("2024-03-01T00:00:00Z"));
        assert_eq!(r.cycles_processed, 0);
        assert_eq!(r.skip, Some(SkipReason::AmountOverflow));
        assert!(r.skip.unwrap().is_data_quality());
    }

    #[test]
    fn past_due_by_less_than_a_cycle_reports_no_full_cycle() {
        let g = monthly("2024-03-01T00:00:00Z", 5000);
        let r = reconcile(&g, at("2024-03-20T00:00:00Z"));
        assert_eq!(r.skip, Some(SkipReason::NoFullCycle));
        assert!(!is_due_for_rollover(&g, at("2024-03-20T00:00:00Z")));
        assert!(is_due_for_rollover(&g, at("2024-04-01T00:00:00Z")));
    }

    #[test]
    fn exemption_order_prefers_vacated() {
        let mut g = monthly("2024-01-01T00:00:00Z", 5000);
        g.is_vacated = true;
        g.exit_date = Some(at("2024-01-15T00:00:00Z"));
        g.rent_status = RentStatus::Paid;
        assert_eq!(
            reconcile(&g, at("2024-06-01T00:00:00Z")).skip,
            Some(SkipReason::Vacated)
        );
    }
}
