//! Migrating twice must be idempotent.
//!
//! DB-backed test, skipped if RBX_DATABASE_URL is not set.

#[tokio::test]
async fn migrate_idempotent_on_clean_db() -> anyhow::Result<()> {
    let url = match std::env::var(rbx_db::ENV_DB_URL) {
        Ok(v) => v,
        Err(_) => {
            eprintln!("SKIP: RBX_DATABASE_URL not set");
            return Ok(());
        }
    };

    let pool = rbx_db::connect(&url, 2).await?;
    rbx_db::migrate(&pool).await?;
    rbx_db::migrate(&pool).await?;

    let st = rbx_db::status(&pool).await?;
    assert!(st.ok);
    assert!(st.has_guests_table);
    Ok(())
}
