//! Shared runtime state for rbx-daemon.
//!
//! Handlers receive `State<Arc<AppState>>` from Axum. Batches are serialized
//! through `batch_gate`: at most one batch runs at a time, whether started by
//! the scheduler or over HTTP.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, Mutex, RwLock};
use tracing::{error, info, warn};

use rbx_runtime::{BatchDriver, BatchOptions, BatchReport};

// ---------------------------------------------------------------------------
// BusMsg: SSE event bus payload
// ---------------------------------------------------------------------------

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BusMsg {
    Heartbeat { ts_millis: i64 },
    BatchFinished(BatchReport),
    GuestReconciled {
        owner_id: String,
        guest_id: String,
        cycles: u32,
    },
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct BuildInfo {
    pub service: &'static str,
    pub version: &'static str,
}

// ---------------------------------------------------------------------------
// AppState
// ---------------------------------------------------------------------------

#[derive(Clone)]
pub struct AppState {
    pub bus: broadcast::Sender<BusMsg>,
    pub build: BuildInfo,
    pub driver: BatchDriver,
    /// Defaults for batches; HTTP callers may override the limit.
    pub options: BatchOptions,
    pub schedule: Option<Duration>,
    pub last_report: Arc<RwLock<Option<BatchReport>>>,
    batch_gate: Arc<Mutex<()>>,
}

/// Why a batch request produced no report.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BatchRunError {
    /// Another batch holds the gate.
    InProgress,
    /// The detached batch task panicked.
    TaskFailed(String),
}

impl std::fmt::Display for BatchRunError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BatchRunError::InProgress => f.write_str("BATCH_IN_PROGRESS: a reconcile batch is already running"),
            BatchRunError::TaskFailed(e) => write!(f, "BATCH_TASK_FAILED: {e}"),
        }
    }
}

impl std::error::Error for BatchRunError {}

impl AppState {
    pub fn new(driver: BatchDriver, options: BatchOptions) -> Self {
        let (bus, _rx) = broadcast::channel::<BusMsg>(1024);
        Self {
            bus,
            build: BuildInfo {
                service: "rbx-daemon",
                version: env!("CARGO_PKG_VERSION"),
            },
            driver,
            options,
            schedule: None,
            last_report: Arc::new(RwLock::new(None)),
            batch_gate: Arc::new(Mutex::new(())),
        }
    }

    pub fn with_schedule(mut self, every: Option<Duration>) -> Self {
        self.schedule = every;
        self
    }

    /// Run one batch unless another is already running.
    ///
    /// The batch runs on its own task holding the gate, so dropping the
    /// returned future (a disconnected HTTP caller) does not cancel it: the
    /// run still finishes, is recorded and is broadcast.
    pub async fn try_run_batch(&self, opts: &BatchOptions) -> Result<BatchReport, BatchRunError> {
        let gate = Arc::clone(&self.batch_gate)
            .try_lock_owned()
            .map_err(|_| BatchRunError::InProgress)?;

        let st = self.clone();
        let opts = opts.clone();
        let task = tokio::spawn(async move {
            let _gate = gate;
            let report = st.driver.run_batch(&opts).await;
            *st.last_report.write().await = Some(report.clone());
            let _ = st.bus.send(BusMsg::BatchFinished(report.clone()));
            report
        });

        task.await.map_err(|e| BatchRunError::TaskFailed(e.to_string()))
    }
}

// ---------------------------------------------------------------------------
// Background tasks
// ---------------------------------------------------------------------------

/// Spawn a background task that emits a heartbeat SSE every `interval`.
pub fn spawn_heartbeat(bus: broadcast::Sender<BusMsg>, interval: Duration) {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        loop {
            ticker.tick().await;
            let ts = chrono::Utc::now().timestamp_millis();
            let _ = bus.send(BusMsg::Heartbeat { ts_millis: ts });
        }
    });
}

/// Spawn the scheduled batch loop. A tick that finds a batch already running
/// is skipped, not queued.
pub fn spawn_scheduler(state: Arc<AppState>, interval: Duration) {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            let opts = state.options.clone();
            match state.try_run_batch(&opts).await {
                Ok(r) => info!(run_id = %r.run_id, success = r.success, "scheduled batch finished"),
                Err(BatchRunError::InProgress) => {
                    warn!("scheduled batch skipped: previous batch still running")
                }
                Err(e) => error!(error = %e, "scheduled batch failed"),
            }
        }
    });
}
