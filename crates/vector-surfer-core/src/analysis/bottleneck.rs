//! Latency bottlenecks: cluster inputs, then compare each cluster's mean
//! duration against the batch mean.

use serde::Serialize;

use crate::clustering::KMeans;
use crate::error::AnalysisError;
use crate::models::ExecutionRecord;
use crate::store::{ExecutionQuery, VectorStore};

use super::{check_dimensions, round_to, vectors_of, with_usable_vectors, AnalysisSettings, ItemList};

#[derive(Debug, Clone)]
pub struct BottleneckRequest {
    pub function_name: Option<String>,
    pub n_clusters: usize,
    pub limit: usize,
}

impl Default for BottleneckRequest {
    fn default() -> Self {
        Self {
            function_name: None,
            n_clusters: 5,
            limit: 300,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BottleneckCluster {
    pub cluster_id: usize,
    pub avg_duration_ms: f64,
    pub count: usize,
    pub representative: String,
    pub is_bottleneck: bool,
}

pub async fn bottleneck_clusters(
    store: &dyn VectorStore,
    req: &BottleneckRequest,
    settings: &AnalysisSettings,
) -> Result<ItemList<BottleneckCluster>, AnalysisError> {
    let query = ExecutionQuery::new(req.limit)
        .function(req.function_name.as_deref())
        .with_vectors();
    let records = with_usable_vectors(store.fetch_executions(&query).await?);
    let vectors = vectors_of(&records);
    check_dimensions(&vectors)?;
    Ok(ItemList::new(summarize(
        &records,
        &vectors,
        req.n_clusters,
        settings.bottleneck_factor,
    )))
}

fn summarize(
    records: &[ExecutionRecord],
    vectors: &[&[f32]],
    n_clusters: usize,
    factor: f64,
) -> Vec<BottleneckCluster> {
    if records.is_empty() {
        return Vec::new();
    }
    let clustering = KMeans::new(n_clusters).fit(vectors);
    let global_mean =
        records.iter().map(|r| r.duration_ms).sum::<f64>() / records.len() as f64;
    tracing::debug!(
        records = records.len(),
        clusters = clustering.n_clusters,
        global_mean,
        "bottleneck clustering"
    );

    let mut clusters: Vec<BottleneckCluster> = clustering
        .members()
        .into_iter()
        .enumerate()
        .filter(|(_, members)| !members.is_empty())
        .map(|(cluster_id, members)| {
            let avg = members.iter().map(|&i| records[i].duration_ms).sum::<f64>()
                / members.len() as f64;
            let first = &records[members[0]];
            let representative = if first.function_name.is_empty() {
                first.span_id.clone()
            } else {
                first.function_name.clone()
            };
            BottleneckCluster {
                cluster_id,
                avg_duration_ms: round_to(avg, 2),
                count: members.len(),
                representative,
                is_bottleneck: avg > global_mean * factor,
            }
        })
        .collect();

    clusters.sort_by(|a, b| {
        b.avg_duration_ms
            .partial_cmp(&a.avg_duration_ms)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    clusters
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::testutil::exec;
    use crate::store::memory::InMemoryStore;

    fn timed(id: &str, vector: Vec<f32>, duration: f64) -> ExecutionRecord {
        let mut r = exec(id, "f", 0, vector);
        r.duration_ms = duration;
        r
    }

    /// Fast calls near one direction, slow calls near another.
    fn split_population() -> InMemoryStore {
        InMemoryStore::with_executions(vec![
            timed("a", vec![1.0, 0.0], 10.0),
            timed("b", vec![0.99, 0.05], 12.0),
            timed("c", vec![0.98, 0.02], 11.0),
            timed("d", vec![0.0, 1.0], 500.0),
            timed("e", vec![0.05, 0.99], 480.0),
            timed("f", vec![0.02, 0.98], 510.0),
        ])
    }

    fn request(k: usize) -> BottleneckRequest {
        BottleneckRequest {
            function_name: None,
            n_clusters: k,
            limit: 300,
        }
    }

    #[tokio::test]
    async fn test_clusters_split_by_latency_and_sort_descending() {
        let store = split_population();
        let out = bottleneck_clusters(&store, &request(2), &AnalysisSettings::default())
            .await
            .unwrap();
        assert_eq!(out.total, 2);
        assert_eq!(out.items[0].count, 3);
        assert!((out.items[0].avg_duration_ms - 496.67).abs() < 1e-9);
        assert!((out.items[1].avg_duration_ms - 11.0).abs() < 1e-9);
        assert_eq!(out.items[0].representative, "f");
        // 496.67 does not exceed 2 × 253.83.
        assert!(out.items.iter().all(|c| !c.is_bottleneck));
    }

    #[tokio::test]
    async fn test_lower_factor_flags_only_the_slow_cluster() {
        let store = split_population();
        let settings = AnalysisSettings {
            bottleneck_factor: 1.5,
            ..Default::default()
        };
        let out = bottleneck_clusters(&store, &request(2), &settings)
            .await
            .unwrap();
        assert!(out.items[0].is_bottleneck);
        assert!(!out.items[1].is_bottleneck);
    }

    #[tokio::test]
    async fn test_counts_sum_to_population_when_k_exceeds_n() {
        let store = split_population();
        let out = bottleneck_clusters(&store, &request(20), &AnalysisSettings::default())
            .await
            .unwrap();
        assert_eq!(out.total, 6);
        assert_eq!(out.items.iter().map(|c| c.count).sum::<usize>(), 6);
    }

    #[tokio::test]
    async fn test_empty_store_yields_no_clusters() {
        let store = InMemoryStore::new();
        let out = bottleneck_clusters(&store, &request(5), &AnalysisSettings::default())
            .await
            .unwrap();
        assert!(out.items.is_empty());
    }
}
