//! Rent reminder classification.
//!
//! Decides whether a guest should be reminded and how to phrase the timing.
//! Delivery (push, WhatsApp, email) happens elsewhere; this module only
//! classifies.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::calendar::elapsed_units;
use crate::{Amount, CycleUnit, GuestBillingState, RentStatus};

/// Upcoming-reminder window for minute and hour cadences.
pub const SHORT_CADENCE_WINDOW_DAYS: i64 = 1;
/// Upcoming-reminder window for day, week and month cadences.
pub const STANDARD_WINDOW_DAYS: i64 = 5;

/// Unit a reminder counts in. Week and month cadences count days.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReminderUnit {
    Minutes,
    Hours,
    Days,
}

impl ReminderUnit {
    fn for_cadence(unit: CycleUnit) -> Self {
        match unit {
            CycleUnit::Minutes => ReminderUnit::Minutes,
            CycleUnit::Hours => ReminderUnit::Hours,
            CycleUnit::Days | CycleUnit::Weeks | CycleUnit::Months => ReminderUnit::Days,
        }
    }

    fn as_cycle_unit(self) -> CycleUnit {
        match self {
            ReminderUnit::Minutes => CycleUnit::Minutes,
            ReminderUnit::Hours => CycleUnit::Hours,
            ReminderUnit::Days => CycleUnit::Days,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ReminderUnit::Minutes => "minute(s)",
            ReminderUnit::Hours => "hour(s)",
            ReminderUnit::Days => "day(s)",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Reminder {
    None,
    /// Due date has passed by `elapsed` whole units.
    Overdue {
        elapsed: i64,
        unit: ReminderUnit,
        total_due: Amount,
    },
    /// Due in `remaining` whole units; zero means due today.
    Upcoming {
        remaining: i64,
        unit: ReminderUnit,
        total_due: Amount,
    },
}

impl Reminder {
    pub fn should_send(&self) -> bool {
        !matches!(self, Reminder::None)
    }
}

/// Classify the reminder a guest should receive at `now`.
///
/// Vacated and paid guests get none, and so do guests whose amount owed
/// overflows. Overdue reminders need at least one whole unit past due;
/// upcoming reminders fire inside the cadence's window.
pub fn reminder_for(guest: &GuestBillingState, now: DateTime<Utc>) -> Reminder {
    if guest.is_vacated || guest.rent_status == RentStatus::Paid {
        return Reminder::None;
    }
    let Some(total_due) = guest.total_due() else {
        return Reminder::None;
    };

    let unit = ReminderUnit::for_cadence(guest.rent_cycle_unit);

    if guest.due_date < now {
        let elapsed = elapsed_units(guest.due_date, now, unit.as_cycle_unit());
        if elapsed <= 0 {
            return Reminder::None;
        }
        return Reminder::Overdue {
            elapsed,
            unit,
            total_due,
        };
    }

    let window_days = match unit {
        ReminderUnit::Minutes | ReminderUnit::Hours => SHORT_CADENCE_WINDOW_DAYS,
        ReminderUnit::Days => STANDARD_WINDOW_DAYS,
    };
    let remaining = elapsed_units(now, guest.due_date, unit.as_cycle_unit());
    let days_out = elapsed_units(now, guest.due_date, CycleUnit::Days);
    if remaining >= 0 && days_out <= window_days {
        return Reminder::Upcoming {
            remaining,
            unit,
            total_due,
        };
    }

    Reminder::None
}
