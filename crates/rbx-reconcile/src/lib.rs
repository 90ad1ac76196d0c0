//! rbx-reconcile
//!
//! Rent cycle reconciliation core.
//!
//! Architectural decisions:
//! - Due dates only move forward, in whole cycles
//! - Vacated, on-notice and paid guests are never touched
//! - Nothing happens until "now" is strictly past the due date
//! - Missed cycles add rent to the carried balance and reset the cycle
//! - Re-applying at the same instant is a no-op
//!
//! Deterministic, pure logic. No IO. No clock reads; callers pass "now".

pub mod calendar;
mod engine;
pub mod reminder;
mod types;

pub use calendar::{advance_cycles, elapsed_units, first_due_date, next_due_date};
pub use engine::{is_due_for_rollover, reconcile};
pub use reminder::{reminder_for, Reminder, ReminderUnit};
pub use types::*;
