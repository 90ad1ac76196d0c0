//! Rent cycle calendar arithmetic.
//!
//! Deterministic, pure logic. No IO, no wall-clock.
//!
//! # Design
//!
//! Fixed-length units (minutes, hours, days, weeks) are literal elapsed-time
//! arithmetic on UTC instants. A week is always seven 24-hour days; the
//! billing anchor does not apply to them because adding whole weeks already
//! keeps the weekday stable.
//!
//! Months are calendar arithmetic: the month index moves by `value` and the
//! day-of-month is either kept (no anchor) or replaced by the anchor, in both
//! cases clamped to the last day of the target month. Time-of-day is carried
//! over unchanged. Clamping is what keeps an anchor of 31 from spilling a
//! February due date into March.

use chrono::{DateTime, Datelike, Duration, NaiveDate, Utc};

use crate::CycleUnit;

/// Valid range for a billing anchor day. Out-of-range anchors are clamped.
pub const ANCHOR_MIN: u32 = 1;
pub const ANCHOR_MAX: u32 = 31;

// ---------------------------------------------------------------------------
// Next due date
// ---------------------------------------------------------------------------

/// Compute the single next cycle boundary after `current`.
///
/// Returns `None` when `value == 0` (a cycle of zero units never advances)
/// or when the result is not representable.
pub fn next_due_date(
    current: DateTime<Utc>,
    unit: CycleUnit,
    value: u32,
    anchor_day: Option<u32>,
) -> Option<DateTime<Utc>> {
    if value == 0 {
        return None;
    }
    match unit {
        CycleUnit::Months => shift_months(current, i64::from(value), anchor_day),
        _ => current.checked_add_signed(fixed_step(unit, i64::from(value))?),
    }
}

/// Advance `current` by `cycles` whole cycles.
///
/// Months chain [`next_due_date`] once per cycle so anchor snapping is
/// re-applied at every boundary. Fixed-length units take one checked jump of
/// `cycles * value` units, which is the same instant the chain would reach.
pub fn advance_cycles(
    current: DateTime<Utc>,
    unit: CycleUnit,
    value: u32,
    anchor_day: Option<u32>,
    cycles: u32,
) -> Option<DateTime<Utc>> {
    if value == 0 {
        return None;
    }
    if unit.is_fixed_length() {
        let units = i64::from(value).checked_mul(i64::from(cycles))?;
        return current.checked_add_signed(fixed_step(unit, units)?);
    }

    let mut due = current;
    for _ in 0..cycles {
        due = next_due_date(due, unit, value, anchor_day)?;
    }
    Some(due)
}

/// First due date for a guest moving in at `move_in`: one cycle later,
/// anchored to the move-in day-of-month.
pub fn first_due_date(
    move_in: DateTime<Utc>,
    unit: CycleUnit,
    value: u32,
) -> Option<DateTime<Utc>> {
    next_due_date(move_in, unit, value, anchor_for(move_in, unit))
}

/// Anchor to persist for a tenancy starting at `move_in`.
///
/// Only monthly cadences carry an anchor.
pub fn anchor_for(move_in: DateTime<Utc>, unit: CycleUnit) -> Option<u32> {
    match unit {
        CycleUnit::Months => Some(move_in.day()),
        _ => None,
    }
}

// ---------------------------------------------------------------------------
// Elapsed units
// ---------------------------------------------------------------------------

/// Whole units of `unit` between `from` and `to`, truncated toward zero.
///
/// Negative when `to` is before `from`. Months count calendar months with the
/// same day clamping as [`next_due_date`]: Jan 31 -> Feb 29 is one month.
pub fn elapsed_units(from: DateTime<Utc>, to: DateTime<Utc>, unit: CycleUnit) -> i64 {
    let delta = to.signed_duration_since(from);
    match unit {
        CycleUnit::Minutes => delta.num_minutes(),
        CycleUnit::Hours => delta.num_hours(),
        CycleUnit::Days => delta.num_days(),
        CycleUnit::Weeks => delta.num_weeks(),
        CycleUnit::Months => whole_months_between(from, to),
    }
}

fn whole_months_between(from: DateTime<Utc>, to: DateTime<Utc>) -> i64 {
    if to < from {
        return -whole_months_between(to, from);
    }

    // Calendar estimate overshoots by at most one when `to` sits earlier in
    // its month than `from` does in its own.
    let mut n = (i64::from(to.year()) - i64::from(from.year())) * 12
        + (i64::from(to.month()) - i64::from(from.month()));
    while n > 0 {
        match shift_months(from, n, None) {
            Some(t) if t <= to => break,
            _ => n -= 1,
        }
    }
    n
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn fixed_step(unit: CycleUnit, n: i64) -> Option<Duration> {
    match unit {
        CycleUnit::Minutes => Duration::try_minutes(n),
        CycleUnit::Hours => Duration::try_hours(n),
        CycleUnit::Days => Duration::try_days(n),
        CycleUnit::Weeks => Duration::try_weeks(n),
        CycleUnit::Months => None,
    }
}

fn shift_months(
    current: DateTime<Utc>,
    months: i64,
    anchor_day: Option<u32>,
) -> Option<DateTime<Utc>> {
    let date = current.date_naive();
    let index = i64::from(date.year())
        .checked_mul(12)?
        .checked_add(i64::from(date.month0()))?
        .checked_add(months)?;
    let year = i32::try_from(index.div_euclid(12)).ok()?;
    let month = u32::try_from(index.rem_euclid(12)).ok()? + 1;

    let wanted = anchor_day
        .map(|a| a.clamp(ANCHOR_MIN, ANCHOR_MAX))
        .unwrap_or_else(|| date.day());
    let day = wanted.min(days_in_month(year, month)?);

    let target = NaiveDate::from_ymd_opt(year, month, day)?;
    Some(target.and_time(current.time()).and_utc())
}

/// Number of days in `month` (1-based) of `year`.
pub fn days_in_month(year: i32, month: u32) -> Option<u32> {
    let (next_year, next_month) = if month == 12 {
        (year.checked_add(1)?, 1)
    } else {
        (year, month + 1)
    };
    let first_of_next = NaiveDate::from_ymd_opt(next_year, next_month, 1)?;
    Some(first_of_next.pred_opt()?.day())
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn at(s: &str) -> DateTime<Utc> {
        s.parse().expect("valid rfc3339 timestamp")
    }

    #[test]
    fn anchor_31_clamps_into_leap_february_then_recovers() {
        let feb = next_due_date(at("2024-01-31T00:00:00Z"), CycleUnit::Months, 1, Some(31)).unwrap();
        assert_eq!(feb, at("2024-02-29T00:00:00Z"));

        let mar = next_due_date(feb, CycleUnit::Months, 1, Some(31)).unwrap();
        assert_eq!(mar, at("2024-03-31T00:00:00Z"));
    }

    #[test]
    fn anchor_31_clamps_into_common_year_february() {
        let feb = next_due_date(at("2023-01-31T00:00:00Z"), CycleUnit::Months, 1, Some(31)).unwrap();
        assert_eq!(feb, at("2023-02-28T00:00:00Z"));
    }

    #[test]
    fn months_without_anchor_drift_after_short_month() {
        let feb = next_due_date(at("2024-01-31T00:00:00Z"), CycleUnit::Months, 1, None).unwrap();
        let mar = next_due_date(feb, CycleUnit::Months, 1, None).unwrap();
        assert_eq!(mar, at("2024-03-29T00:00:00Z"));
    }

    #[test]
    fn month_addition_crosses_year_and_keeps_time_of_day() {
        let next = next_due_date(at("2024-11-15T09:30:00Z"), CycleUnit::Months, 3, Some(15)).unwrap();
        assert_eq!(next, at("2025-02-15T09:30:00Z"));
    }

    #[test]
    fn out_of_range_anchor_is_clamped() {
        let hi = next_due_date(at("2024-03-10T00:00:00Z"), CycleUnit::Months, 1, Some(40)).unwrap();
        assert_eq!(hi, at("2024-04-30T00:00:00Z"));

        let lo = next_due_date(at("2024-03-10T00:00:00Z"), CycleUnit::Months, 1, Some(0)).unwrap();
        assert_eq!(lo, at("2024-04-01T00:00:00Z"));
    }

    #[test]
    fn fixed_units_ignore_anchor() {
        let start = at("2024-08-01T10:00:00Z");
        assert_eq!(
            next_due_date(start, CycleUnit::Minutes, 3, Some(15)).unwrap(),
            at("2024-08-01T10:03:00Z")
        );
        assert_eq!(
            next_due_date(start, CycleUnit::Hours, 5, None).unwrap(),
            at("2024-08-01T15:00:00Z")
        );
        assert_eq!(
            next_due_date(start, CycleUnit::Days, 2, None).unwrap(),
            at("2024-08-03T10:00:00Z")
        );
        assert_eq!(
            next_due_date(start, CycleUnit::Weeks, 2, Some(1)).unwrap(),
            at("2024-08-15T10:00:00Z")
        );
    }

    #[test]
    fn zero_value_is_rejected() {
        let start = at("2024-08-01T10:00:00Z");
        for unit in [
            CycleUnit::Minutes,
            CycleUnit::Hours,
            CycleUnit::Days,
            CycleUnit::Weeks,
            CycleUnit::Months,
        ] {
            assert_eq!(next_due_date(start, unit, 0, None), None, "{unit}");
            assert_eq!(advance_cycles(start, unit, 0, None, 3), None, "{unit}");
        }
    }

    #[test]
    fn advance_fixed_units_matches_chained_steps() {
        let start = at("2024-08-01T10:00:00Z");
        let mut chained = start;
        for _ in 0..7 {
            chained = next_due_date(chained, CycleUnit::Hours, 5, None).unwrap();
        }
        assert_eq!(
            advance_cycles(start, CycleUnit::Hours, 5, None, 7).unwrap(),
            chained
        );
    }

    #[test]
    fn advance_months_reapplies_anchor_each_step() {
        let due = advance_cycles(at("2024-01-31T00:00:00Z"), CycleUnit::Months, 1, Some(31), 3).unwrap();
        assert_eq!(due, at("2024-04-30T00:00:00Z"));
    }

    #[test]
    fn elapsed_months_is_calendar_aware() {
        let due = at("2024-01-31T00:00:00Z");
        assert_eq!(elapsed_units(due, at("2024-02-28T00:00:00Z"), CycleUnit::Months), 0);
        assert_eq!(elapsed_units(due, at("2024-02-29T00:00:00Z"), CycleUnit::Months), 1);
        assert_eq!(elapsed_units(at("2024-03-01T00:00:00Z"), at("2024-06-15T00:00:00Z"), CycleUnit::Months), 3);
        assert_eq!(elapsed_units(at("2024-03-15T12:00:00Z"), at("2024-04-15T11:59:00Z"), CycleUnit::Months), 0);
        assert_eq!(elapsed_units(at("2024-06-15T00:00:00Z"), at("2024-03-01T00:00:00Z"), CycleUnit::Months), -3);
    }

    #[test]
    fn elapsed_weeks_are_seven_day_durations() {
        let due = at("2024-01-01T00:00:00Z");
        assert_eq!(elapsed_units(due, at("2024-01-20T00:00:00Z"), CycleUnit::Weeks), 2);
        assert_eq!(elapsed_units(due, at("2024-01-07T23:59:59Z"), CycleUnit::Weeks), 0);
    }

    #[test]
    fn first_due_date_is_one_cycle_after_move_in() {
        let move_in = at("2024-01-31T08:00:00Z");
        assert_eq!(anchor_for(move_in, CycleUnit::Months), Some(31));
        assert_eq!(
            first_due_date(move_in, CycleUnit::Months, 1).unwrap(),
            at("2024-02-29T08:00:00Z")
        );
        assert_eq!(anchor_for(move_in, CycleUnit::Weeks), None);
        assert_eq!(
            first_due_date(move_in, CycleUnit::Weeks, 1).unwrap(),
            at("2024-02-07T08:00:00Z")
        );
    }

    #[test]
    fn days_in_month_handles_leap_years_and_december() {
        assert_eq!(days_in_month(2024, 2), Some(29));
        assert_eq!(days_in_month(2023, 2), Some(28));
        assert_eq!(days_in_month(2100, 2), Some(28));
        assert_eq!(days_in_month(2024, 12), Some(31));
        assert_eq!(days_in_month(2024, 9), Some(30));
    }
}
