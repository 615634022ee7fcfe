//! Coverage of executions by the reference ("golden") set.

use serde::Serialize;

use crate::error::AnalysisError;
use crate::neighbors;
use crate::projection::project_2d;
use crate::store::{ExecutionQuery, ReferenceQuery, VectorStore};

use super::scatter::ScatterPoint;
use super::{check_dimensions, round4, vectors_of, with_usable_vectors, AnalysisSettings};

#[derive(Debug, Clone)]
pub struct CoverageRequest {
    pub function_name: Option<String>,
    pub limit: usize,
}

impl Default for CoverageRequest {
    fn default() -> Self {
        Self {
            function_name: None,
            limit: 500,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CoveragePoint {
    #[serde(flatten)]
    pub point: ScatterPoint,
    pub is_golden: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CoverageReport {
    pub coverage_score: f64,
    pub total_executions: usize,
    pub golden_count: usize,
    pub scatter: Vec<CoveragePoint>,
}

/// Fraction of executions whose nearest reference lies within the coverage
/// threshold, plus a joint projection of executions and references.
///
/// Executions and references are projected together, executions first, so
/// both sets share one coordinate frame.
pub async fn golden_coverage(
    store: &dyn VectorStore,
    req: &CoverageRequest,
    settings: &AnalysisSettings,
) -> Result<CoverageReport, AnalysisError> {
    let exec_query = ExecutionQuery::new(req.limit)
        .function(req.function_name.as_deref())
        .with_vectors();
    let executions = with_usable_vectors(store.fetch_executions(&exec_query).await?);

    let references = if store.has_references().await? {
        let ref_query = ReferenceQuery::new(req.limit)
            .function(req.function_name.as_deref())
            .with_vectors();
        with_usable_vectors(store.fetch_references(&ref_query).await?)
    } else {
        Vec::new()
    };

    if executions.is_empty() {
        return Ok(CoverageReport {
            golden_count: references.len(),
            ..Default::default()
        });
    }

    let exec_vectors = vectors_of(&executions);
    let ref_vectors = vectors_of(&references);
    let mut all_vectors = exec_vectors.clone();
    all_vectors.extend(ref_vectors.iter().copied());
    check_dimensions(&all_vectors)?;

    let cov = neighbors::coverage(&ref_vectors, &exec_vectors, settings.coverage_threshold);
    tracing::debug!(
        executions = executions.len(),
        references = references.len(),
        covered = cov.covered,
        "coverage computed"
    );

    let coords = project_2d(&all_vectors);
    let mut scatter = Vec::with_capacity(coords.len());
    let (exec_coords, ref_coords) = coords.split_at(coords.len().min(executions.len()));
    for (xy, rec) in exec_coords.iter().zip(executions.iter()) {
        scatter.push(CoveragePoint {
            point: ScatterPoint::from_execution(*xy, rec),
            is_golden: false,
        });
    }
    for (xy, rec) in ref_coords.iter().zip(references.iter()) {
        let mut point = ScatterPoint::from_reference(*xy, rec);
        if point.span_id.is_empty() {
            point.span_id = rec.source_execution_id.clone();
        }
        scatter.push(CoveragePoint {
            point,
            is_golden: true,
        });
    }

    Ok(CoverageReport {
        coverage_score: round4(cov.score),
        total_executions: executions.len(),
        golden_count: references.len(),
        scatter,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::testutil::exec;
    use crate::models::ReferenceRecord;
    use crate::store::memory::InMemoryStore;

    async fn register(store: &InMemoryStore, id: &str, vector: Vec<f32>) {
        let source = exec(&format!("src-{}", id), "f", 0, vector);
        let r = ReferenceRecord::from_execution(id.into(), &source, "", vec![], source.timestamp);
        store.insert_reference(&r).await.unwrap();
    }

    #[tokio::test]
    async fn test_half_of_executions_covered() {
        let store = InMemoryStore::with_executions(vec![
            exec("a", "f", 0, vec![1.0, 0.05, 0.0]),
            exec("b", "f", 1, vec![0.05, 1.0, 0.0]),
            exec("c", "f", 2, vec![0.1, 0.1, 0.98995]),
            exec("d", "f", 3, vec![0.1, 0.1, 0.98995]),
        ]);
        register(&store, "g1", vec![1.0, 0.0, 0.0]).await;
        register(&store, "g2", vec![0.0, 1.0, 0.0]).await;

        let out = golden_coverage(&store, &CoverageRequest::default(), &AnalysisSettings::default())
            .await
            .unwrap();
        assert_eq!(out.coverage_score, 0.5);
        assert_eq!(out.total_executions, 4);
        assert_eq!(out.golden_count, 2);
        assert_eq!(out.scatter.len(), 6);
        let golden: Vec<bool> = out.scatter.iter().map(|p| p.is_golden).collect();
        assert_eq!(golden, vec![false, false, false, false, true, true]);
    }

    #[tokio::test]
    async fn test_without_reference_collection_score_is_zero() {
        let store = InMemoryStore::with_executions(vec![
            exec("a", "f", 0, vec![1.0, 0.0]),
            exec("b", "f", 1, vec![0.0, 1.0]),
        ]);
        let out = golden_coverage(&store, &CoverageRequest::default(), &AnalysisSettings::default())
            .await
            .unwrap();
        assert_eq!(out.coverage_score, 0.0);
        assert_eq!(out.golden_count, 0);
        assert_eq!(out.scatter.len(), 2);
    }

    #[tokio::test]
    async fn test_no_executions_reports_golden_count_only() {
        let store = InMemoryStore::new();
        register(&store, "g1", vec![1.0, 0.0]).await;
        let out = golden_coverage(&store, &CoverageRequest::default(), &AnalysisSettings::default())
            .await
            .unwrap();
        assert_eq!(out.total_executions, 0);
        assert_eq!(out.golden_count, 1);
        assert!(out.scatter.is_empty());
    }

    #[test]
    fn test_point_serializes_flat() {
        let p = CoveragePoint {
            point: ScatterPoint {
                x: 1.0,
                y: 0.0,
                id: "a".into(),
                span_id: "s".into(),
                function_name: "f".into(),
                status: crate::models::ExecutionStatus::Success,
                duration_ms: 3.0,
            },
            is_golden: true,
        };
        let v = serde_json::to_value(&p).unwrap();
        assert_eq!(v["x"], 1.0);
        assert_eq!(v["status"], "SUCCESS");
        assert_eq!(v["is_golden"], true);
    }
}
