//! Malformed stored rows surface as InvalidGuestRecord, not panics.
//!
//! DB-backed test, skipped if RBX_DATABASE_URL is not set.

use rbx_reconcile::{GuestBillingState, GuestKey};
use uuid::Uuid;

#[tokio::test]
async fn unknown_unit_in_storage_is_rejected_at_conversion() -> anyhow::Result<()> {
    let url = match std::env::var(rbx_db::ENV_DB_URL) {
        Ok(v) => v,
        Err(_) => {
            eprintln!("SKIP: RBX_DATABASE_URL not set");
            return Ok(());
        }
    };
    let pool = rbx_db::connect(&url, 2).await?;
    rbx_db::migrate(&pool).await?;

    let owner = format!("own-{}", Uuid::new_v4());
    rbx_db::upsert_owner(&pool, &owner, rbx_db::OWNER_ROLE).await?;
    sqlx::query(
        r#"
        insert into guests (owner_id, guest_id, due_date, rent_amount, rent_cycle_unit, rent_cycle_value)
        values ($1, 'g-bad', now(), 5000, 'fortnights', 1)
        "#,
    )
    .bind(&owner)
    .execute(&pool)
    .await?;

    let row = rbx_db::fetch_guest(&pool, &GuestKey::new(&owner, "g-bad"))
        .await?
        .expect("row exists");
    let err = GuestBillingState::try_from(row).unwrap_err();
    assert_eq!(err.field, "rent_cycle_unit");
    Ok(())
}
