use anyhow::Result;
use sqlx::SqlitePool;

/// Create the checkpoint schema. Idempotent.
pub async fn run_migrations(pool: &SqlitePool) -> Result<()> {
    // One row per run key, holding the whole serialized run
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS run_checkpoints (
            run_key TEXT PRIMARY KEY,
            run_id TEXT NOT NULL,
            phase TEXT NOT NULL,
            next_offset INTEGER NOT NULL,
            payload TEXT NOT NULL,
            updated_at INTEGER NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_run_checkpoints_updated ON run_checkpoints(updated_at)",
    )
    .execute(pool)
    .await?;

    Ok(())
}
