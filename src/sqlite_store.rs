//! SQLite-backed [`VectorStore`] implementation.
//!
//! Maps each [`VectorStore`] operation onto the `executions` and `golden`
//! tables created by [`crate::migrate`]. Records without an explicit sort
//! come back in insertion (rowid) order.

use std::path::Path;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::{Map, Value};
use sqlx::sqlite::SqliteRow;
use sqlx::{QueryBuilder, Row, Sqlite, SqlitePool};

use vector_surfer_core::embedding::{blob_to_vec, vec_to_blob};
use vector_surfer_core::models::{ExecutionRecord, ExecutionStatus, ReferenceRecord};
use vector_surfer_core::store::{
    ExecutionQuery, ReferenceQuery, SortField, VectorStore,
};

use crate::db;
use crate::migrate;

const EXECUTION_COLUMNS: &str = "id, function_name, status, duration_ms, timestamp, span_id, \
     trace_id, error_code, error_message, input_preview, output_preview, extra_json";

const REFERENCE_COLUMNS: &str = "id, source_execution_id, function_name, status, duration_ms, \
     timestamp, span_id, error_code, input_preview, output_preview, note, tags_json, registered_at";

/// SQLite implementation of the [`VectorStore`] trait.
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Connect to the database at `path` (created if missing).
    pub async fn open(path: &Path) -> Result<Self> {
        Ok(Self::new(db::connect(path).await?))
    }

    /// Connect and apply the executions schema.
    pub async fn open_initialized(path: &Path) -> Result<Self> {
        let store = Self::open(path).await?;
        migrate::run_migrations(&store.pool).await?;
        Ok(store)
    }

    pub fn is_closed(&self) -> bool {
        self.pool.is_closed()
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}

fn micros_to_datetime(micros: i64) -> Result<DateTime<Utc>> {
    DateTime::from_timestamp_micros(micros)
        .ok_or_else(|| anyhow::anyhow!("timestamp out of range: {}", micros))
}

fn row_vector(row: &SqliteRow) -> Result<Option<Vec<f32>>> {
    let blob: Option<Vec<u8>> = row.try_get("vector")?;
    Ok(blob.map(|b| blob_to_vec(&b)))
}

fn row_to_execution(row: &SqliteRow) -> Result<ExecutionRecord> {
    let status: String = row.try_get("status")?;
    let extra_json: String = row.try_get("extra_json")?;
    let extra: Map<String, Value> = serde_json::from_str(&extra_json)
        .with_context(|| "malformed extra_json in executions row")?;
    Ok(ExecutionRecord {
        id: row.try_get("id")?,
        function_name: row.try_get("function_name")?,
        status: status.parse::<ExecutionStatus>()?,
        duration_ms: row.try_get("duration_ms")?,
        timestamp: micros_to_datetime(row.try_get("timestamp")?)?,
        span_id: row.try_get("span_id")?,
        trace_id: row.try_get("trace_id")?,
        error_code: row.try_get("error_code")?,
        error_message: row.try_get("error_message")?,
        input_preview: row.try_get("input_preview")?,
        output_preview: row.try_get("output_preview")?,
        vector: row_vector(row)?,
        extra,
    })
}

fn row_to_reference(row: &SqliteRow) -> Result<ReferenceRecord> {
    let status: String = row.try_get("status")?;
    let tags_json: String = row.try_get("tags_json")?;
    Ok(ReferenceRecord {
        id: row.try_get("id")?,
        source_execution_id: row.try_get("source_execution_id")?,
        function_name: row.try_get("function_name")?,
        status: status.parse::<ExecutionStatus>()?,
        duration_ms: row.try_get("duration_ms")?,
        timestamp: micros_to_datetime(row.try_get("timestamp")?)?,
        span_id: row.try_get("span_id")?,
        error_code: row.try_get("error_code")?,
        input_preview: row.try_get("input_preview")?,
        output_preview: row.try_get("output_preview")?,
        note: row.try_get("note")?,
        tags: serde_json::from_str(&tags_json).with_context(|| "malformed tags_json")?,
        registered_at: micros_to_datetime(row.try_get("registered_at")?)?,
        vector: row_vector(row)?,
    })
}

#[async_trait]
impl VectorStore for SqliteStore {
    async fn fetch_executions(&self, query: &ExecutionQuery) -> Result<Vec<ExecutionRecord>> {
        let mut qb: QueryBuilder<Sqlite> = QueryBuilder::new("SELECT ");
        qb.push(EXECUTION_COLUMNS);
        qb.push(if query.include_vector {
            ", vector"
        } else {
            ", NULL AS vector"
        });
        qb.push(" FROM executions WHERE 1 = 1");

        if let Some(function_name) = &query.function_name {
            qb.push(" AND function_name = ").push_bind(function_name.clone());
        }
        if let Some(status) = query.status {
            qb.push(" AND status = ").push_bind(status.as_str());
        }
        if let Some(since) = query.since {
            qb.push(" AND timestamp >= ").push_bind(since.timestamp_micros());
        }
        if let Some(until) = query.until {
            qb.push(" AND timestamp <= ").push_bind(until.timestamp_micros());
        }

        match query.sort {
            Some(sort) => {
                let column = match sort.field {
                    SortField::Timestamp => "timestamp",
                    SortField::Duration => "duration_ms",
                };
                let direction = if sort.ascending { "ASC" } else { "DESC" };
                qb.push(format!(" ORDER BY {} {}, rowid ASC", column, direction));
            }
            None => {
                qb.push(" ORDER BY rowid ASC");
            }
        }
        qb.push(" LIMIT ").push_bind(query.limit as i64);

        let rows = qb.build().fetch_all(&self.pool).await?;
        rows.iter().map(row_to_execution).collect()
    }

    async fn get_execution(&self, id: &str) -> Result<Option<ExecutionRecord>> {
        let sql = format!(
            "SELECT {}, vector FROM executions WHERE id = ?",
            EXECUTION_COLUMNS
        );
        let row = sqlx::query(&sql).bind(id).fetch_optional(&self.pool).await?;
        row.as_ref().map(row_to_execution).transpose()
    }

    async fn function_names(&self) -> Result<Vec<String>> {
        let names: Vec<String> =
            sqlx::query_scalar("SELECT DISTINCT function_name FROM executions ORDER BY function_name")
                .fetch_all(&self.pool)
                .await?;
        Ok(names)
    }

    async fn insert_execution(&self, record: &ExecutionRecord) -> Result<()> {
        let extra_json = serde_json::to_string(&record.extra)?;
        let blob = record.vector.as_deref().map(vec_to_blob);
        sqlx::query(
            r#"
            INSERT INTO executions (id, function_name, status, duration_ms, timestamp,
                                    span_id, trace_id, error_code, error_message,
                                    input_preview, output_preview, extra_json, vector)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                function_name = excluded.function_name,
                status = excluded.status,
                duration_ms = excluded.duration_ms,
                timestamp = excluded.timestamp,
                span_id = excluded.span_id,
                trace_id = excluded.trace_id,
                error_code = excluded.error_code,
                error_message = excluded.error_message,
                input_preview = excluded.input_preview,
                output_preview = excluded.output_preview,
                extra_json = excluded.extra_json,
                vector = excluded.vector
            "#,
        )
        .bind(&record.id)
        .bind(&record.function_name)
        .bind(record.status.as_str())
        .bind(record.duration_ms)
        .bind(record.timestamp.timestamp_micros())
        .bind(&record.span_id)
        .bind(&record.trace_id)
        .bind(&record.error_code)
        .bind(&record.error_message)
        .bind(&record.input_preview)
        .bind(&record.output_preview)
        .bind(&extra_json)
        .bind(&blob)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn has_references(&self) -> Result<bool> {
        let exists: bool = sqlx::query_scalar(
            "SELECT COUNT(*) > 0 FROM sqlite_master WHERE type='table' AND name='golden'",
        )
        .fetch_one(&self.pool)
        .await?;
        Ok(exists)
    }

    async fn fetch_references(&self, query: &ReferenceQuery) -> Result<Vec<ReferenceRecord>> {
        if !self.has_references().await? {
            return Ok(Vec::new());
        }
        let mut qb: QueryBuilder<Sqlite> = QueryBuilder::new("SELECT ");
        qb.push(REFERENCE_COLUMNS);
        qb.push(if query.include_vector {
            ", vector"
        } else {
            ", NULL AS vector"
        });
        qb.push(" FROM golden");
        if let Some(function_name) = &query.function_name {
            qb.push(" WHERE function_name = ").push_bind(function_name.clone());
        }
        qb.push(" ORDER BY rowid ASC LIMIT ").push_bind(query.limit as i64);

        let rows = qb.build().fetch_all(&self.pool).await?;
        rows.iter().map(row_to_reference).collect()
    }

    async fn insert_reference(&self, record: &ReferenceRecord) -> Result<()> {
        migrate::create_golden_table(&self.pool).await?;
        let tags_json = serde_json::to_string(&record.tags)?;
        let blob = record.vector.as_deref().map(vec_to_blob);
        sqlx::query(
            r#"
            INSERT OR REPLACE INTO golden (id, source_execution_id, function_name, status,
                                           duration_ms, timestamp, span_id, error_code,
                                           input_preview, output_preview, note, tags_json,
                                           registered_at, vector)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&record.id)
        .bind(&record.source_execution_id)
        .bind(&record.function_name)
        .bind(record.status.as_str())
        .bind(record.duration_ms)
        .bind(record.timestamp.timestamp_micros())
        .bind(&record.span_id)
        .bind(&record.error_code)
        .bind(&record.input_preview)
        .bind(&record.output_preview)
        .bind(&record.note)
        .bind(&tags_json)
        .bind(record.registered_at.timestamp_micros())
        .bind(&blob)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn delete_reference(&self, id: &str) -> Result<bool> {
        if !self.has_references().await? {
            return Ok(false);
        }
        let result = sqlx::query("DELETE FROM golden WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn reference_counts(&self) -> Result<Vec<(String, usize)>> {
        if !self.has_references().await? {
            return Ok(Vec::new());
        }
        let rows: Vec<(String, i64)> =
            sqlx::query_as("SELECT function_name, COUNT(*) FROM golden GROUP BY function_name")
                .fetch_all(&self.pool)
                .await?;
        Ok(rows
            .into_iter()
            .map(|(name, count)| (name, count.max(0) as usize))
            .collect())
    }
}
