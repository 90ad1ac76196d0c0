//! rbx-runtime
//!
//! Drives reconciliation over persisted guests.
//!
//! Architectural decisions:
//! - Storage and time are seams (`GuestStore`, `Clock`); the driver never
//!   touches Postgres or the wall clock directly
//! - Each guest is one transaction: lock, compute, write, commit
//! - A failing guest is logged and counted; the batch carries on
//! - Limit and deadline are checked between chunks, never mid-guest

mod clock;
mod driver;
mod pg_store;
mod store;

pub use clock::{Clock, SystemClock};
pub use driver::{BatchDriver, BatchOptions, BatchReport, GuestNotFound, StopReason};
pub use pg_store::PgGuestStore;
pub use store::{GuestStore, GuestTx};
