//! Laws that hold for every guest and every instant.
//!
//! GREEN when, over a grid of cadences, due dates and clock readings:
//! - Reconciling twice at the same instant is the same as reconciling once.
//! - Due dates never move backwards and rollovers never land past `now`.
//! - Balance grows by exactly `rent_amount * cycles_processed`.
//! - Exempt guests are returned unchanged.
//! - A guest with a future due date is never touched.

use chrono::{DateTime, Duration, Utc};
use rbx_reconcile::*;

fn at(s: &str) -> DateTime<Utc> {
    s.parse().expect("valid rfc3339 timestamp")
}

fn cadences() -> Vec<(CycleUnit, u32, Option<u32>)> {
    vec![
        (CycleUnit::Minutes, 1, None),
        (CycleUnit::Minutes, 45, None),
        (CycleUnit::Hours, 5, None),
        (CycleUnit::Days, 1, None),
        (CycleUnit::Days, 10, None),
        (CycleUnit::Weeks, 1, None),
        (CycleUnit::Weeks, 3, None),
        (CycleUnit::Months, 1, None),
        (CycleUnit::Months, 1, Some(31)),
        (CycleUnit::Months, 1, Some(29)),
        (CycleUnit::Months, 3, Some(30)),
        (CycleUnit::Months, 12, Some(29)),
    ]
}

fn due_dates() -> Vec<DateTime<Utc>> {
    vec![
        at("2023-12-31T00:00:00Z"),
        at("2024-01-31T09:00:00Z"),
        at("2024-02-29T00:00:00Z"),
        at("2024-03-15T18:45:00Z"),
        at("2024-11-30T00:00:00Z"),
    ]
}

fn offsets() -> Vec<Duration> {
    vec![
        Duration::zero(),
        Duration::seconds(1),
        Duration::minutes(59),
        Duration::hours(30),
        Duration::days(29),
        Duration::days(31),
        Duration::days(95),
        Duration::days(400),
        Duration::days(800),
    ]
}

fn grid() -> Vec<(GuestBillingState, DateTime<Utc>)> {
    let mut out = Vec::new();
    for (unit, value, anchor) in cadences() {
        for due in due_dates() {
            for off in offsets() {
                let mut g = GuestBillingState::new(due, 1250, unit, value);
                g.billing_anchor_day = anchor;
                g.balance_brought_forward = -300;
                g.rent_status = RentStatus::Partial;
                g.rent_paid_amount = 400;
                g.additional_charges.push(AdditionalCharge::new("water", 90));
                out.push((g, due + off));
            }
        }
    }
    out
}

#[test]
fn reconcile_is_idempotent_at_a_fixed_instant() {
    for (g, now) in grid() {
        let once = reconcile(&g, now);
        let twice = reconcile(&once.guest, now);
        assert_eq!(twice.cycles_processed, 0, "guest={g:?} now={now}");
        assert_eq!(twice.guest, once.guest, "guest={g:?} now={now}");
    }
}

#[test]
fn due_date_moves_forward_but_never_past_now() {
    for (g, now) in grid() {
        let r = reconcile(&g, now);
        assert!(r.guest.due_date >= g.due_date, "guest={g:?} now={now}");
        if r.cycles_processed > 0 {
            assert!(r.guest.due_date > g.due_date);
            assert!(r.guest.due_date <= now, "guest={g:?} now={now}");
        } else {
            assert_eq!(r.guest, g);
        }
    }
}

#[test]
fn balance_grows_by_rent_times_cycles() {
    for (g, now) in grid() {
        let r = reconcile(&g, now);
        assert_eq!(
            r.guest.balance_brought_forward - g.balance_brought_forward,
            g.rent_amount * i64::from(r.cycles_processed),
            "guest={g:?} now={now}"
        );
    }
}

#[test]
fn processed_cycles_match_calculator_steps() {
    for (g, now) in grid() {
        let r = reconcile(&g, now);
        let expected = advance_cycles(
            g.due_date,
            g.rent_cycle_unit,
            g.rent_cycle_value,
            g.billing_anchor_day,
            r.cycles_processed,
        );
        assert_eq!(expected, Some(r.guest.due_date), "guest={g:?} now={now}");
    }
}

#[test]
fn later_clock_never_processes_fewer_cycles() {
    for (g, now) in grid() {
        let a = reconcile(&g, now).cycles_processed;
        let b = reconcile(&g, now + Duration::days(17)).cycles_processed;
        assert!(b >= a, "guest={g:?} now={now}");
    }
}

#[test]
fn exempt_guests_are_returned_unchanged() {
    for (mut g, now) in grid() {
        let now = now + Duration::days(365);

        g.is_vacated = true;
        let r = reconcile(&g, now);
        assert_eq!((r.cycles_processed, &r.guest), (0, &g));
        assert_eq!(r.skip, Some(SkipReason::Vacated));

        g.is_vacated = false;
        g.exit_date = Some(g.due_date);
        let r = reconcile(&g, now);
        assert_eq!((r.cycles_processed, &r.guest), (0, &g));
        assert_eq!(r.skip, Some(SkipReason::OnNotice));

        g.exit_date = None;
        g.rent_status = RentStatus::Paid;
        let r = reconcile(&g, now);
        assert_eq!((r.cycles_processed, &r.guest), (0, &g));
        assert_eq!(r.skip, Some(SkipReason::Paid));
    }
}

#[test]
fn future_due_dates_are_never_touched() {
    for (g, now) in grid() {
        let before_due = g.due_date - Duration::seconds(1);
        let r = reconcile(&g, before_due.min(now - Duration::seconds(1)));
        assert_eq!(r.cycles_processed, 0);
        assert_eq!(r.skip, Some(SkipReason::NotDue));
        assert_eq!(r.guest, g);
    }
}
