//! 2D scatter of execution inputs.

use serde::Serialize;

use crate::error::AnalysisError;
use crate::models::{ExecutionRecord, ExecutionStatus, ReferenceRecord};
use crate::projection::project_2d;
use crate::store::{ExecutionQuery, VectorStore};

use super::{check_dimensions, round4, vectors_of, with_usable_vectors, ItemList};

#[derive(Debug, Clone)]
pub struct ScatterRequest {
    pub function_name: Option<String>,
    pub limit: usize,
}

impl Default for ScatterRequest {
    fn default() -> Self {
        Self {
            function_name: None,
            limit: 200,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScatterPoint {
    pub x: f64,
    pub y: f64,
    pub id: String,
    pub span_id: String,
    pub function_name: String,
    pub status: ExecutionStatus,
    pub duration_ms: f64,
}

impl ScatterPoint {
    pub(crate) fn from_execution(xy: [f64; 2], rec: &ExecutionRecord) -> Self {
        Self {
            x: round4(xy[0]),
            y: round4(xy[1]),
            id: rec.id.clone(),
            span_id: rec.span_id.clone(),
            function_name: rec.function_name.clone(),
            status: rec.status,
            duration_ms: rec.duration_ms,
        }
    }

    pub(crate) fn from_reference(xy: [f64; 2], rec: &ReferenceRecord) -> Self {
        Self {
            x: round4(xy[0]),
            y: round4(xy[1]),
            id: rec.id.clone(),
            span_id: rec.span_id.clone(),
            function_name: rec.function_name.clone(),
            status: rec.status,
            duration_ms: rec.duration_ms,
        }
    }
}

/// Project the inputs of recent executions (optionally one function) to 2D.
///
/// Fewer than two usable vectors yields an empty list.
pub async fn input_scatter(
    store: &dyn VectorStore,
    req: &ScatterRequest,
) -> Result<ItemList<ScatterPoint>, AnalysisError> {
    let query = ExecutionQuery::new(req.limit)
        .function(req.function_name.as_deref())
        .with_vectors();
    let records = with_usable_vectors(store.fetch_executions(&query).await?);
    tracing::debug!(records = records.len(), "scatter working set");

    let vectors = vectors_of(&records);
    check_dimensions(&vectors)?;
    let coords = project_2d(&vectors);

    let points = coords
        .into_iter()
        .zip(records.iter())
        .map(|(xy, rec)| ScatterPoint::from_execution(xy, rec))
        .collect();
    Ok(ItemList::new(points))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::testutil::exec;
    use crate::store::memory::InMemoryStore;

    #[tokio::test]
    async fn test_scatter_keeps_fetch_order_and_drops_missing_vectors() {
        let mut no_vec = exec("skip", "f", 1, vec![]);
        no_vec.vector = None;
        let store = InMemoryStore::with_executions(vec![
            exec("a", "f", 0, vec![1.0, 0.0, 0.0]),
            no_vec,
            exec("b", "f", 2, vec![0.0, 1.0, 0.0]),
            exec("c", "f", 3, vec![0.0, 0.0, 1.0]),
            exec("d", "g", 4, vec![1.0, 1.0, 0.0]),
        ]);

        let req = ScatterRequest {
            function_name: Some("f".into()),
            limit: 200,
        };
        let out = input_scatter(&store, &req).await.unwrap();
        let ids: Vec<&str> = out.items.iter().map(|p| p.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b", "c"]);
        assert_eq!(out.total, 3);
        assert_eq!(out.items[1].span_id, "span-b");
    }

    #[tokio::test]
    async fn test_single_vector_is_empty() {
        let store = InMemoryStore::with_executions(vec![exec("a", "f", 0, vec![1.0, 0.0])]);
        let out = input_scatter(&store, &ScatterRequest::default()).await.unwrap();
        assert!(out.items.is_empty());
    }

    #[tokio::test]
    async fn test_mixed_dimensions_are_rejected() {
        let store = InMemoryStore::with_executions(vec![
            exec("a", "f", 0, vec![1.0, 0.0]),
            exec("b", "f", 1, vec![1.0, 0.0, 0.0]),
        ]);
        let err = input_scatter(&store, &ScatterRequest::default())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "dimension_mismatch");
    }
}
