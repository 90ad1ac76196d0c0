//! Request and response types for the rbx-daemon HTTP endpoints.
//!
//! No business logic lives here.

use serde::{Deserialize, Serialize};

use rbx_runtime::BatchReport;

// ---------------------------------------------------------------------------
// /v1/health
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub ok: bool,
    pub service: String,
    pub version: String,
    /// Seconds between scheduled batches; `None` when scheduling is off.
    pub schedule_secs: Option<u64>,
}

// ---------------------------------------------------------------------------
// /v1/reconcile/*
// ---------------------------------------------------------------------------

/// Optional body of `POST /v1/reconcile/run`. Absent fields use daemon config.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RunRequest {
    pub limit: Option<usize>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GuestReconcileResponse {
    pub owner_id: String,
    pub guest_id: String,
    pub cycles_processed: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LastRunResponse {
    /// `None` until the first batch finishes.
    pub report: Option<BatchReport>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}
