use anyhow::Result;
use sqlx::SqlitePool;

/// Create the `executions` table and its indexes. Idempotent.
///
/// Timestamps are stored as microseconds since the Unix epoch; vectors as
/// little-endian f32 BLOBs. The `golden` table is not created here: the
/// reference collection only exists once something is registered (see
/// [`create_golden_table`]).
pub async fn run_migrations(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS executions (
            id TEXT PRIMARY KEY,
            function_name TEXT NOT NULL,
            status TEXT NOT NULL,
            duration_ms REAL NOT NULL DEFAULT 0,
            timestamp INTEGER NOT NULL,
            span_id TEXT NOT NULL DEFAULT '',
            trace_id TEXT NOT NULL DEFAULT '',
            error_code TEXT,
            error_message TEXT,
            input_preview TEXT,
            output_preview TEXT,
            extra_json TEXT NOT NULL DEFAULT '{}',
            vector BLOB
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_executions_function ON executions(function_name, timestamp DESC)",
    )
    .execute(pool)
    .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_executions_status ON executions(status)")
        .execute(pool)
        .await?;

    tracing::info!("schema migrations applied");
    Ok(())
}

/// Create the reference (`golden`) table. Idempotent.
pub async fn create_golden_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS golden (
            id TEXT PRIMARY KEY,
            source_execution_id TEXT NOT NULL,
            function_name TEXT NOT NULL,
            status TEXT NOT NULL,
            duration_ms REAL NOT NULL DEFAULT 0,
            timestamp INTEGER NOT NULL,
            span_id TEXT NOT NULL DEFAULT '',
            error_code TEXT,
            input_preview TEXT,
            output_preview TEXT,
            note TEXT NOT NULL DEFAULT '',
            tags_json TEXT NOT NULL DEFAULT '[]',
            registered_at INTEGER NOT NULL,
            vector BLOB
        )
        "#,
    )
    .execute(pool)
    .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_golden_function ON golden(function_name)")
        .execute(pool)
        .await?;
    Ok(())
}
