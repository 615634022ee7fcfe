//! JSONL ingestion of execution records.
//!
//! One JSON object per line, embedding under `vector`. Keys the record
//! type does not know are kept in `extra`. Blank lines are skipped; the
//! first malformed line aborts the whole load before anything is written.

use std::path::Path;

use anyhow::{Context, Result};

use vector_surfer_core::models::ExecutionRecord;
use vector_surfer_core::store::VectorStore;

use crate::config::Config;
use crate::sqlite_store::SqliteStore;

/// Parse a JSONL document into execution records.
pub fn parse_jsonl(content: &str) -> Result<Vec<ExecutionRecord>> {
    let mut records = Vec::new();
    for (idx, line) in content.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let record: ExecutionRecord = serde_json::from_str(line)
            .with_context(|| format!("malformed execution record on line {}", idx + 1))?;
        records.push(record);
    }
    Ok(records)
}

/// Load `file` into the selected store and report the count on stdout.
pub async fn run_ingest(config: &Config, store_name: Option<&str>, file: &Path) -> Result<()> {
    let content = std::fs::read_to_string(file)
        .with_context(|| format!("Failed to read {}", file.display()))?;
    let records = parse_jsonl(&content)?;

    let store = SqliteStore::open_initialized(config.store_path(store_name)?).await?;

    let mut without_vector = 0usize;
    for record in &records {
        if record.vector.is_none() {
            without_vector += 1;
        }
        store.insert_execution(record).await?;
    }

    tracing::info!(
        file = %file.display(),
        count = records.len(),
        without_vector,
        "ingested execution records"
    );
    println!("Ingested {} executions from {}", records.len(), file.display());
    Ok(())
}
