//! Curation of the reference ("golden") set.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::analysis::ItemList;
use crate::error::AnalysisError;
use crate::models::ReferenceRecord;
use crate::store::{ReferenceQuery, VectorStore};

#[derive(Debug, Clone, Deserialize)]
pub struct RegisterRequest {
    pub execution_id: String,
    #[serde(default)]
    pub note: String,
    #[serde(default)]
    pub tags: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReferenceStat {
    pub function_name: String,
    pub count: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DeleteOutcome {
    pub id: String,
    pub deleted: bool,
}

/// Copy an execution, vector included, into the reference set.
pub async fn register(
    store: &dyn VectorStore,
    req: &RegisterRequest,
) -> Result<ReferenceRecord, AnalysisError> {
    let exec = store
        .get_execution(&req.execution_id)
        .await?
        .ok_or_else(|| AnalysisError::NotFound(format!("execution {}", req.execution_id)))?;

    let record = ReferenceRecord::from_execution(
        Uuid::new_v4().to_string(),
        &exec,
        &req.note,
        req.tags.clone(),
        Utc::now(),
    );
    store.insert_reference(&record).await?;
    tracing::info!(
        id = %record.id,
        source = %exec.id,
        function = %exec.function_name,
        "registered reference record"
    );
    Ok(record)
}

/// Reference records (without vectors), optionally for one function.
pub async fn list(
    store: &dyn VectorStore,
    function_name: Option<&str>,
    limit: usize,
) -> Result<ItemList<ReferenceRecord>, AnalysisError> {
    let query = ReferenceQuery::new(limit).function(function_name);
    Ok(ItemList::new(store.fetch_references(&query).await?))
}

pub async fn delete(store: &dyn VectorStore, id: &str) -> Result<DeleteOutcome, AnalysisError> {
    if !store.delete_reference(id).await? {
        return Err(AnalysisError::NotFound(format!("reference {}", id)));
    }
    tracing::info!(id, "deleted reference record");
    Ok(DeleteOutcome {
        id: id.to_string(),
        deleted: true,
    })
}

/// Reference counts per function, most-curated first.
pub async fn stats(store: &dyn VectorStore) -> Result<ItemList<ReferenceStat>, AnalysisError> {
    let mut stats: Vec<ReferenceStat> = store
        .reference_counts()
        .await?
        .into_iter()
        .map(|(function_name, count)| ReferenceStat {
            function_name,
            count,
        })
        .collect();
    stats.sort_by(|a, b| {
        b.count
            .cmp(&a.count)
            .then_with(|| a.function_name.cmp(&b.function_name))
    });
    Ok(ItemList::new(stats))
}
