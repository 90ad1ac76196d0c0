//! Chunked parallelism and the cooperative deadline.
//!
//! GREEN when:
//! - No more than `concurrency` guest transactions are open at once.
//! - A spent deadline stops the batch between chunks.

use std::sync::Arc;
use std::time::Duration;

use rbx_reconcile::GuestKey;
use rbx_runtime::{BatchDriver, BatchOptions, StopReason};
use rbx_testkit::{at, monthly_guest, FixedClock, InMemoryGuestStore};

fn store_with(n: usize) -> InMemoryGuestStore {
    let store = InMemoryGuestStore::new();
    for i in 0..n {
        store.put_guest(
            &GuestKey::new("own-1", format!("g-{i:02}")),
            monthly_guest("2024-03-01T00:00:00Z", 1000),
        );
    }
    store
}

fn driver(store: &InMemoryGuestStore) -> BatchDriver {
    BatchDriver::new(
        Arc::new(store.clone()),
        Arc::new(FixedClock::new(at("2024-06-15T00:00:00Z"))),
    )
}

#[tokio::test]
async fn open_transactions_bounded_by_concurrency() {
    let store = store_with(8);
    store.set_tx_delay(Duration::from_millis(20));

    let opts = BatchOptions {
        concurrency: 3,
        ..BatchOptions::default()
    };
    let report = driver(&store).run_batch(&opts).await;

    assert_eq!(report.reconciled_count, 8);
    assert_eq!(store.max_in_flight(), 3);
}

#[tokio::test]
async fn zero_concurrency_runs_one_at_a_time() {
    let store = store_with(3);
    let opts = BatchOptions {
        concurrency: 0,
        ..BatchOptions::default()
    };
    let report = driver(&store).run_batch(&opts).await;
    assert_eq!(report.reconciled_count, 3);
    assert_eq!(store.max_in_flight(), 1);
}

#[tokio::test]
async fn spent_deadline_stops_before_any_work() {
    let store = store_with(3);
    let opts = BatchOptions {
        deadline: Some(Duration::ZERO),
        ..BatchOptions::default()
    };
    let report = driver(&store).run_batch(&opts).await;
    assert_eq!(report.stop_reason, StopReason::DeadlineExceeded);
    assert_eq!(report.reconciled_count, 0);
    assert!(report.success, "stopping early is not a failure");
}

#[tokio::test]
async fn deadline_stops_between_chunks() {
    let store = store_with(10);
    store.set_tx_delay(Duration::from_millis(50));

    let opts = BatchOptions {
        concurrency: 1,
        deadline: Some(Duration::from_millis(120)),
        limit: None,
    };
    let report = driver(&store).run_batch(&opts).await;

    assert_eq!(report.stop_reason, StopReason::DeadlineExceeded);
    assert!(report.reconciled_count >= 1);
    assert!(report.reconciled_count < 10);
    assert_eq!(store.commits(), report.reconciled_count);
}
