//! Successful executions whose inputs sit far from their peers.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::error::AnalysisError;
use crate::models::ExecutionStatus;
use crate::neighbors::mean_neighbor_distances;
use crate::store::{ExecutionQuery, VectorStore};

use super::{
    check_dimensions, round4, truncate_chars, vectors_of, with_usable_vectors, AnalysisSettings,
    ItemList,
};

const PREVIEW_CHARS: usize = 200;
/// Candidates are drawn from this many times `limit` records.
const FETCH_MULTIPLIER: usize = 5;

#[derive(Debug, Clone)]
pub struct HallucinationRequest {
    pub function_name: Option<String>,
    pub threshold: f64,
    pub limit: usize,
}

impl Default for HallucinationRequest {
    fn default() -> Self {
        Self {
            function_name: None,
            threshold: 0.3,
            limit: 20,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HallucinationCandidate {
    pub id: String,
    pub span_id: String,
    pub function_name: String,
    /// Mean cosine distance to the nearest other executions.
    pub distance: f64,
    pub duration_ms: f64,
    pub timestamp: DateTime<Utc>,
    pub input_preview: String,
    pub output_preview: String,
}

pub async fn hallucination_candidates(
    store: &dyn VectorStore,
    req: &HallucinationRequest,
    settings: &AnalysisSettings,
) -> Result<ItemList<HallucinationCandidate>, AnalysisError> {
    let query = ExecutionQuery::new(req.limit.saturating_mul(FETCH_MULTIPLIER))
        .function(req.function_name.as_deref())
        .status(ExecutionStatus::Success)
        .with_vectors();
    let records = with_usable_vectors(store.fetch_executions(&query).await?);
    if records.len() < settings.hallucination_min_population.max(2) {
        tracing::debug!(records = records.len(), "population too small for outlier scan");
        return Ok(ItemList::default());
    }

    let vectors = vectors_of(&records);
    check_dimensions(&vectors)?;
    let means = mean_neighbor_distances(&vectors, settings.hallucination_neighbors);

    let mut candidates: Vec<HallucinationCandidate> = records
        .iter()
        .zip(means)
        .filter(|(_, d)| *d > req.threshold)
        .map(|(rec, d)| HallucinationCandidate {
            id: rec.id.clone(),
            span_id: rec.span_id.clone(),
            function_name: rec.function_name.clone(),
            distance: round4(d),
            duration_ms: rec.duration_ms,
            timestamp: rec.timestamp,
            input_preview: truncate_chars(rec.input_preview.as_deref().unwrap_or(""), PREVIEW_CHARS),
            output_preview: truncate_chars(&rec.output_text(), PREVIEW_CHARS),
        })
        .collect();

    candidates.sort_by(|a, b| {
        b.distance
            .partial_cmp(&a.distance)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    candidates.truncate(req.limit);
    Ok(ItemList::new(candidates))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::testutil::{at_distance, exec};
    use crate::store::memory::InMemoryStore;

    fn population() -> InMemoryStore {
        let mut records: Vec<_> = (0..6)
            .map(|i| exec(&format!("n{}", i), "f", i, at_distance(0.001 * i as f32)))
            .collect();
        let mut odd = exec("odd", "f", 10, vec![0.0, 1.0]);
        odd.output_preview = None;
        odd.extra
            .insert("return_value".into(), serde_json::Value::String("y".repeat(300)));
        records.push(odd);
        let mut failed = exec("err", "f", 11, vec![-1.0, 0.0]);
        failed.status = ExecutionStatus::Error;
        records.push(failed);
        InMemoryStore::with_executions(records)
    }

    #[tokio::test]
    async fn test_flags_the_outlier_only() {
        let store = population();
        let out = hallucination_candidates(
            &store,
            &HallucinationRequest::default(),
            &AnalysisSettings::default(),
        )
        .await
        .unwrap();
        assert_eq!(out.total, 1);
        let c = &out.items[0];
        assert_eq!(c.id, "odd");
        assert!(c.distance > 0.9);
        assert_eq!(c.output_preview.chars().count(), 200);
    }

    #[tokio::test]
    async fn test_threshold_above_every_distance_is_empty() {
        let store = population();
        let req = HallucinationRequest {
            threshold: 1.0,
            ..Default::default()
        };
        let out = hallucination_candidates(&store, &req, &AnalysisSettings::default())
            .await
            .unwrap();
        assert!(out.items.is_empty());
    }

    #[tokio::test]
    async fn test_small_population_yields_nothing() {
        let store = InMemoryStore::with_executions(vec![
            exec("a", "f", 0, vec![1.0, 0.0]),
            exec("b", "f", 1, vec![0.0, 1.0]),
            exec("c", "f", 2, vec![-1.0, 0.0]),
            exec("d", "f", 3, vec![0.0, -1.0]),
        ]);
        let req = HallucinationRequest {
            threshold: 0.0,
            ..Default::default()
        };
        let out = hallucination_candidates(&store, &req, &AnalysisSettings::default())
            .await
            .unwrap();
        assert!(out.items.is_empty());
    }

    #[tokio::test]
    async fn test_results_sorted_and_truncated() {
        let store = population();
        let req = HallucinationRequest {
            threshold: 0.0,
            limit: 2,
            ..Default::default()
        };
        let out = hallucination_candidates(&store, &req, &AnalysisSettings::default())
            .await
            .unwrap();
        assert_eq!(out.total, 2);
        assert!(out.items[0].distance >= out.items[1].distance);
        assert_eq!(out.items[0].id, "odd");
    }
}
