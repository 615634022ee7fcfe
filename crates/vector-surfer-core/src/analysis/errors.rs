//! Groups ERROR executions by input similarity.

use std::collections::BTreeSet;

use serde::Serialize;

use crate::clustering::KMeans;
use crate::error::AnalysisError;
use crate::models::{ExecutionRecord, ExecutionStatus};
use crate::store::{ExecutionQuery, VectorStore};

use super::{check_dimensions, truncate_chars, vectors_of, with_usable_vectors, ItemList};

const REPRESENTATIVE_CHARS: usize = 300;

#[derive(Debug, Clone)]
pub struct ErrorClusterRequest {
    pub n_clusters: usize,
    pub limit: usize,
}

impl Default for ErrorClusterRequest {
    fn default() -> Self {
        Self {
            n_clusters: 5,
            limit: 200,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ErrorCluster {
    pub cluster_id: usize,
    pub count: usize,
    pub representative_error: String,
    pub error_codes: Vec<String>,
    pub functions: Vec<String>,
}

pub async fn error_clusters(
    store: &dyn VectorStore,
    req: &ErrorClusterRequest,
) -> Result<ItemList<ErrorCluster>, AnalysisError> {
    let query = ExecutionQuery::new(req.limit)
        .status(ExecutionStatus::Error)
        .with_vectors();
    let records = with_usable_vectors(store.fetch_executions(&query).await?);
    let vectors = vectors_of(&records);
    check_dimensions(&vectors)?;
    if records.is_empty() {
        return Ok(ItemList::default());
    }

    let clustering = KMeans::new(req.n_clusters).fit(&vectors);
    tracing::debug!(
        records = records.len(),
        clusters = clustering.n_clusters,
        "error clustering"
    );

    let mut clusters: Vec<ErrorCluster> = clustering
        .members()
        .into_iter()
        .enumerate()
        .filter(|(_, m)| !m.is_empty())
        .map(|(cluster_id, members)| summarize_cluster(cluster_id, &members, &records))
        .collect();
    // Stable: equal counts keep cluster-id order.
    clusters.sort_by(|a, b| b.count.cmp(&a.count));
    Ok(ItemList::new(clusters))
}

fn summarize_cluster(cluster_id: usize, members: &[usize], records: &[ExecutionRecord]) -> ErrorCluster {
    let mut codes = BTreeSet::new();
    let mut functions = BTreeSet::new();
    for &i in members {
        let rec = &records[i];
        if let Some(code) = rec.error_code.as_deref().filter(|c| !c.is_empty()) {
            codes.insert(code.to_string());
        }
        if !rec.function_name.is_empty() {
            functions.insert(rec.function_name.clone());
        }
    }
    // The first member speaks for the cluster.
    let representative = records[members[0]]
        .error_message
        .as_deref()
        .map(|m| truncate_chars(m, REPRESENTATIVE_CHARS))
        .unwrap_or_else(|| "Unknown error".to_string());
    ErrorCluster {
        cluster_id,
        count: members.len(),
        representative_error: representative,
        error_codes: codes.into_iter().collect(),
        functions: functions.into_iter().collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::testutil::exec;
    use crate::store::memory::InMemoryStore;

    fn failure(id: &str, func: &str, vector: Vec<f32>, code: &str, msg: Option<&str>) -> ExecutionRecord {
        let mut r = exec(id, func, 0, vector);
        r.status = ExecutionStatus::Error;
        r.error_code = Some(code.into());
        r.error_message = msg.map(str::to_string);
        r
    }

    #[tokio::test]
    async fn test_groups_similar_failures() {
        let long = "x".repeat(500);
        let store = InMemoryStore::with_executions(vec![
            failure("a", "parse", vec![1.0, 0.0], "E_PARSE", Some("bad token")),
            failure("b", "load", vec![0.99, 0.05], "E_IO", Some("disk full")),
            failure("c", "parse", vec![0.98, 0.02], "E_PARSE", None),
            failure("d", "fetch", vec![0.0, 1.0], "E_TIMEOUT", Some(&long)),
            exec("ok", "parse", 0, vec![1.0, 0.0]),
        ]);
        let req = ErrorClusterRequest {
            n_clusters: 2,
            limit: 200,
        };
        let out = error_clusters(&store, &req).await.unwrap();
        assert_eq!(out.total, 2);

        let big = &out.items[0];
        assert_eq!(big.count, 3);
        assert_eq!(big.error_codes, vec!["E_IO", "E_PARSE"]);
        assert_eq!(big.functions, vec!["load", "parse"]);
        assert_eq!(big.representative_error, "bad token");

        let small = &out.items[1];
        assert_eq!(small.count, 1);
        assert_eq!(small.representative_error.chars().count(), 300);
    }

    #[tokio::test]
    async fn test_singletons_when_fewer_errors_than_k() {
        let store = InMemoryStore::with_executions(vec![
            failure("a", "f", vec![1.0, 0.0], "E1", None),
            failure("b", "f", vec![0.0, 1.0], "E2", None),
        ]);
        let out = error_clusters(&store, &ErrorClusterRequest::default())
            .await
            .unwrap();
        assert_eq!(out.total, 2);
        assert!(out.items.iter().all(|c| c.count == 1));
        assert!(out.items.iter().all(|c| c.representative_error == "Unknown error"));
    }
}
