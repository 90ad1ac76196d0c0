//! rbx-db
//!
//! Postgres persistence for owners, guests and reconcile runs.
//!
//! Every guest read that leads to a write happens inside a transaction with
//! the row locked (`select .. for update`), so two reconcilers racing on the
//! same guest serialize instead of double-charging.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use sqlx::{postgres::PgPoolOptions, Postgres, Row, Transaction};
use uuid::Uuid;

use rbx_reconcile::{GuestBillingState, GuestKey};

mod guest_row;

pub use guest_row::{GuestRow, InvalidGuestRecord};
pub use sqlx::PgPool;

pub const ENV_DB_URL: &str = "RBX_DATABASE_URL";

/// Owner role whose guests are reconciled.
pub const OWNER_ROLE: &str = "owner";

/// Connect to Postgres using RBX_DATABASE_URL.
pub async fn connect_from_env() -> Result<PgPool> {
    connect_from_env_var(ENV_DB_URL, 10).await
}

/// Connect using the URL held in `env_name`.
pub async fn connect_from_env_var(env_name: &str, max_connections: u32) -> Result<PgPool> {
    let url = std::env::var(env_name).with_context(|| format!("missing env var {env_name}"))?;
    connect(&url, max_connections).await
}

pub async fn connect(url: &str, max_connections: u32) -> Result<PgPool> {
    PgPoolOptions::new()
        .max_connections(max_connections)
        .connect(url)
        .await
        .context("failed to connect to Postgres")
}

/// Run embedded SQLx migrations.
pub async fn migrate(pool: &PgPool) -> Result<()> {
    sqlx::migrate!("./migrations")
        .run(pool)
        .await
        .context("db migrate failed")?;
    Ok(())
}

#[derive(Debug, Clone)]
pub struct DbStatus {
    pub ok: bool,
    pub has_guests_table: bool,
}

/// Connectivity + schema presence.
pub async fn status(pool: &PgPool) -> Result<DbStatus> {
    let (one,): (i32,) = sqlx::query_as::<_, (i32,)>("select 1")
        .fetch_one(pool)
        .await
        .context("status connectivity query failed")?;

    let (exists,): (bool,) = sqlx::query_as::<_, (bool,)>(
        r#"
        select exists (
            select 1
            from information_schema.tables
            where table_schema='public' and table_name='guests'
        )
        "#,
    )
    .fetch_one(pool)
    .await
    .context("status table-exists query failed")?;

    Ok(DbStatus {
        ok: one == 1,
        has_guests_table: exists,
    })
}

// ---------------------------------------------------------------------------
// Enumeration
// ---------------------------------------------------------------------------

/// Ids of every account with the owner role, in stable order.
pub async fn list_owner_ids(pool: &PgPool) -> Result<Vec<String>> {
    let rows: Vec<(String,)> = sqlx::query_as(
        r#"
        select owner_id
        from owners
        where role = $1
        order by owner_id
        "#,
    )
    .bind(OWNER_ROLE)
    .fetch_all(pool)
    .await
    .context("list_owner_ids failed")?;

    Ok(rows.into_iter().map(|(id,)| id).collect())
}

/// Ids of the owner's guests that have not vacated, in stable order.
pub async fn list_active_guest_ids(pool: &PgPool, owner_id: &str) -> Result<Vec<String>> {
    let rows: Vec<(String,)> = sqlx::query_as(
        r#"
        select guest_id
        from guests
        where owner_id = $1
          and is_vacated = false
        order by guest_id
        "#,
    )
    .bind(owner_id)
    .fetch_all(pool)
    .await
    .context("list_active_guest_ids failed")?;

    Ok(rows.into_iter().map(|(id,)| id).collect())
}

// ---------------------------------------------------------------------------
// Per-guest transactional access
// ---------------------------------------------------------------------------

const GUEST_COLUMNS: &str = r#"
    owner_id,
    guest_id,
    due_date,
    rent_amount,
    rent_cycle_unit,
    rent_cycle_value,
    billing_anchor_day,
    balance_brought_forward,
    rent_paid_amount,
    rent_status,
    additional_charges,
    is_vacated,
    exit_date
"#;

fn guest_row_from(row: &sqlx::postgres::PgRow) -> Result<GuestRow> {
    Ok(GuestRow {
        owner_id: row.try_get("owner_id")?,
        guest_id: row.try_get("guest_id")?,
        due_date: row.try_get("due_date")?,
        rent_amount: row.try_get("rent_amount")?,
        rent_cycle_unit: row.try_get("rent_cycle_unit")?,
        rent_cycle_value: row.try_get("rent_cycle_value")?,
        billing_anchor_day: row.try_get("billing_anchor_day")?,
        balance_brought_forward: row.try_get("balance_brought_forward")?,
        rent_paid_amount: row.try_get("rent_paid_amount")?,
        rent_status: row.try_get("rent_status")?,
        additional_charges: row.try_get("additional_charges")?,
        is_vacated: row.try_get("is_vacated")?,
        exit_date: row.try_get("exit_date")?,
    })
}

/// Read and row-lock one guest. `None` when the guest does not exist.
///
/// The lock is held until `tx` commits or rolls back.
pub async fn lock_guest(tx: &mut Transaction<'_, Postgres>, key: &GuestKey) -> Result<Option<GuestRow>> {
    let sql = format!(
        "select {GUEST_COLUMNS} from guests where owner_id = $1 and guest_id = $2 for update"
    );
    let row = sqlx::query(&sql)
        .bind(&key.owner_id)
        .bind(&key.guest_id)
        .fetch_optional(&mut **tx)
        .await
        .context("lock_guest failed")?;

    row.as_ref().map(guest_row_from).transpose()
}

/// Read one guest without locking.
pub async fn fetch_guest(pool: &PgPool, key: &GuestKey) -> Result<Option<GuestRow>> {
    let sql = format!("select {GUEST_COLUMNS} from guests where owner_id = $1 and guest_id = $2");
    let row = sqlx::query(&sql)
        .bind(&key.owner_id)
        .bind(&key.guest_id)
        .fetch_optional(pool)
        .await
        .context("fetch_guest failed")?;

    row.as_ref().map(guest_row_from).transpose()
}

/// Persist the fields reconciliation changes. Errors if the guest vanished.
pub async fn write_guest_billing(
    tx: &mut Transaction<'_, Postgres>,
    key: &GuestKey,
    state: &GuestBillingState,
) -> Result<()> {
    let charges =
        serde_json::to_value(&state.additional_charges).context("encode additional_charges failed")?;

    let res = sqlx::query(
        r#"
        update guests
        set due_date = $3,
            balance_brought_forward = $4,
            rent_paid_amount = $5,
            rent_status = $6,
            additional_charges = $7,
            updated_at_utc = now()
        where owner_id = $1 and guest_id = $2
        "#,
    )
    .bind(&key.owner_id)
    .bind(&key.guest_id)
    .bind(state.due_date)
    .bind(state.balance_brought_forward)
    .bind(state.rent_paid_amount)
    .bind(state.rent_status.as_str())
    .bind(charges)
    .execute(&mut **tx)
    .await
    .context("write_guest_billing failed")?;

    if res.rows_affected() != 1 {
        anyhow::bail!("write_guest_billing: guest {key} not found");
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Seeding
// ---------------------------------------------------------------------------

pub async fn upsert_owner(pool: &PgPool, owner_id: &str, role: &str) -> Result<()> {
    sqlx::query(
        r#"
        insert into owners (owner_id, role) values ($1, $2)
        on conflict (owner_id) do update set role = excluded.role
        "#,
    )
    .bind(owner_id)
    .bind(role)
    .execute(pool)
    .await
    .context("upsert_owner failed")?;
    Ok(())
}

/// Insert or fully replace a guest row.
pub async fn upsert_guest(pool: &PgPool, key: &GuestKey, state: &GuestBillingState) -> Result<()> {
    let charges =
        serde_json::to_value(&state.additional_charges).context("encode additional_charges failed")?;

    sqlx::query(
        r#"
        insert into guests (
          owner_id, guest_id, due_date, rent_amount, rent_cycle_unit, rent_cycle_value,
          billing_anchor_day, balance_brought_forward, rent_paid_amount, rent_status,
          additional_charges, is_vacated, exit_date
        ) values (
          $1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13
        )
        on conflict (owner_id, guest_id) do update set
          due_date = excluded.due_date,
          rent_amount = excluded.rent_amount,
          rent_cycle_unit = excluded.rent_cycle_unit,
          rent_cycle_value = excluded.rent_cycle_value,
          billing_anchor_day = excluded.billing_anchor_day,
          balance_brought_forward = excluded.balance_brought_forward,
          rent_paid_amount = excluded.rent_paid_amount,
          rent_status = excluded.rent_status,
          additional_charges = excluded.additional_charges,
          is_vacated = excluded.is_vacated,
          exit_date = excluded.exit_date,
          updated_at_utc = now()
        "#,
    )
    .bind(&key.owner_id)
    .bind(&key.guest_id)
    .bind(state.due_date)
    .bind(state.rent_amount)
    .bind(state.rent_cycle_unit.as_str())
    .bind(i32::try_from(state.rent_cycle_value).context("rent_cycle_value out of range")?)
    .bind(state.billing_anchor_day.map(|d| d as i32))
    .bind(state.balance_brought_forward)
    .bind(state.rent_paid_amount)
    .bind(state.rent_status.as_str())
    .bind(charges)
    .bind(state.is_vacated)
    .bind(state.exit_date)
    .execute(pool)
    .await
    .context("upsert_guest failed")?;
    Ok(())
}

// ---------------------------------------------------------------------------
// Run ledger
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct ReconcileRunRecord {
    pub run_id: Uuid,
    pub started_at_utc: DateTime<Utc>,
    pub finished_at_utc: DateTime<Utc>,
    pub success: bool,
    pub reconciled_count: i64,
    pub error_count: i64,
    pub cycles_processed: i64,
    pub guests_scanned: i64,
    pub owners_scanned: i64,
    pub stop_reason: String,
    pub config_hash: Option<String>,
}

pub async fn insert_reconcile_run(pool: &PgPool, run: &ReconcileRunRecord) -> Result<()> {
    sqlx::query(
        r#"
        insert into reconcile_runs (
          run_id, started_at_utc, finished_at_utc, success, reconciled_count, error_count,
          cycles_processed, guests_scanned, owners_scanned, stop_reason, config_hash
        ) values (
          $1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11
        )
        "#,
    )
    .bind(run.run_id)
    .bind(run.started_at_utc)
    .bind(run.finished_at_utc)
    .bind(run.success)
    .bind(run.reconciled_count)
    .bind(run.error_count)
    .bind(run.cycles_processed)
    .bind(run.guests_scanned)
    .bind(run.owners_scanned)
    .bind(&run.stop_reason)
    .bind(&run.config_hash)
    .execute(pool)
    .await
    .context("insert_reconcile_run failed")?;
    Ok(())
}

/// Most recent run by start time, if any.
pub async fn fetch_latest_reconcile_run(pool: &PgPool) -> Result<Option<ReconcileRunRecord>> {
    let row = sqlx::query(
        r#"
        select run_id, started_at_utc, finished_at_utc, success, reconciled_count, error_count,
               cycles_processed, guests_scanned, owners_scanned, stop_reason, config_hash
        from reconcile_runs
        order by started_at_utc desc
        limit 1
        "#,
    )
    .fetch_optional(pool)
    .await
    .context("fetch_latest_reconcile_run failed")?;

    let Some(row) = row else {
        return Ok(None);
    };
    Ok(Some(ReconcileRunRecord {
        run_id: row.try_get("run_id")?,
        started_at_utc: row.try_get("started_at_utc")?,
        finished_at_utc: row.try_get("finished_at_utc")?,
        success: row.try_get("success")?,
        reconciled_count: row.try_get("reconciled_count")?,
        error_count: row.try_get("error_count")?,
        cycles_processed: row.try_get("cycles_processed")?,
        guests_scanned: row.try_get("guests_scanned")?,
        owners_scanned: row.try_get("owners_scanned")?,
        stop_reason: row.try_get("stop_reason")?,
        config_hash: row.try_get("config_hash")?,
    }))
}
