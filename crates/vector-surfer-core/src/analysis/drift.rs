//! Semantic drift: does a function's newest input (or a hypothetical
//! input given as text) sit far from its recent neighbours?
//!
//! # Window mode
//!
//! For each function, fetch the newest `drift_window` executions. The
//! newest one is compared: its mean cosine distance to the
//! `drift_neighbors` nearest other window members decides the verdict.
//!
//! # Simulate mode
//!
//! Embed caller-supplied text with the configured provider and compare it
//! against up to `simulate_population` stored vectors of the function. A
//! missing provider is a configuration error, never a "no drift" verdict.

use serde::{Deserialize, Serialize};

use crate::embedding::EmbeddingProvider;
use crate::error::AnalysisError;
use crate::models::{is_usable_vector, Embedded};
use crate::neighbors::NeighborIndex;
use crate::store::{ExecutionQuery, Sort, VectorStore};

use super::{check_dimensions, round4, vectors_of, with_usable_vectors, AnalysisSettings};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DriftStatus {
    /// Fewer than two executions in the window.
    InsufficientData,
    /// The newest execution carries no usable vector.
    NoVector,
    Normal,
    Anomaly,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DriftVerdict {
    pub function_name: String,
    pub status: DriftStatus,
    pub avg_distance: f64,
    pub sample_count: usize,
    pub threshold: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DriftFailure {
    pub function_name: String,
    pub error: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DriftSummary {
    pub items: Vec<DriftVerdict>,
    pub total: usize,
    pub failures: Vec<DriftFailure>,
}

/// Restrict the summary to these functions; `None` means every function
/// the store knows about.
#[derive(Debug, Clone, Default)]
pub struct DriftSummaryRequest {
    pub functions: Option<Vec<String>>,
}

/// Verdict for one function's newest execution.
pub async fn function_drift(
    store: &dyn VectorStore,
    function_name: &str,
    settings: &AnalysisSettings,
) -> Result<DriftVerdict, AnalysisError> {
    let query = ExecutionQuery::new(settings.drift_window)
        .function(Some(function_name))
        .with_vectors()
        .sorted(Sort::newest_first());
    let window = store.fetch_executions(&query).await?;

    let verdict = |status, avg_distance| DriftVerdict {
        function_name: function_name.to_string(),
        status,
        avg_distance,
        sample_count: window.len(),
        threshold: settings.drift_threshold,
    };

    if window.len() < 2 {
        return Ok(verdict(DriftStatus::InsufficientData, 0.0));
    }
    let Some(newest) = window[0].usable_vector() else {
        return Ok(verdict(DriftStatus::NoVector, 0.0));
    };

    let others: Vec<&[f32]> = window[1..]
        .iter()
        .filter_map(|r| r.usable_vector())
        .collect();
    let mut all = vec![newest];
    all.extend(others.iter().copied());
    check_dimensions(&all)?;

    let neighbors = NeighborIndex::new(others).k_nearest(newest, settings.drift_neighbors);
    let avg = if neighbors.is_empty() {
        0.0
    } else {
        neighbors.iter().map(|n| n.distance).sum::<f64>() / neighbors.len() as f64
    };
    let status = if avg > settings.drift_threshold {
        DriftStatus::Anomaly
    } else {
        DriftStatus::Normal
    };
    Ok(verdict(status, round4(avg)))
}

/// Window-mode verdicts for every (or the requested) function.
///
/// Per-function failures are isolated into `failures`; only a failure to
/// list function names fails the whole summary.
pub async fn drift_summary(
    store: &dyn VectorStore,
    req: &DriftSummaryRequest,
    settings: &AnalysisSettings,
) -> Result<DriftSummary, AnalysisError> {
    let names: Vec<String> = store
        .function_names()
        .await?
        .into_iter()
        .filter(|name| !name.is_empty())
        .filter(|name| {
            req.functions
                .as_ref()
                .map_or(true, |wanted| wanted.is_empty() || wanted.contains(name))
        })
        .collect();

    let mut summary = DriftSummary::default();
    for name in names {
        match function_drift(store, &name, settings).await {
            Ok(verdict) => summary.items.push(verdict),
            Err(e) => {
                tracing::warn!(function = %name, kind = e.kind(), "drift check failed: {}", e);
                summary.failures.push(DriftFailure {
                    function_name: name,
                    error: e.to_string(),
                });
            }
        }
    }
    summary.total = summary.items.len();
    Ok(summary)
}

#[derive(Debug, Clone, Deserialize)]
pub struct SimulateRequest {
    pub function_name: String,
    pub text: String,
    pub threshold: Option<f64>,
    pub k: Option<usize>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DriftSimulation {
    pub is_drift: bool,
    pub avg_distance: f64,
    pub nearest_id: Option<String>,
    pub k: usize,
    pub threshold: f64,
    pub input_text: String,
    pub function_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// Embed `req.text` and compare it against the function's stored vectors.
pub async fn simulate_drift(
    store: &dyn VectorStore,
    embedder: Option<&dyn EmbeddingProvider>,
    req: &SimulateRequest,
    settings: &AnalysisSettings,
) -> Result<DriftSimulation, AnalysisError> {
    let embedder = embedder.ok_or_else(|| {
        AnalysisError::Configuration("no embedding provider configured".to_string())
    })?;
    let threshold = req.threshold.unwrap_or(settings.drift_threshold);
    let k = req.k.unwrap_or(settings.drift_neighbors);

    let embedded = embedder.embed(&req.text).await?;
    if !is_usable_vector(&embedded) {
        return Err(AnalysisError::Embedding(anyhow::anyhow!(
            "provider {} returned an unusable vector",
            embedder.model_name()
        )));
    }

    let query = ExecutionQuery::new(settings.simulate_population)
        .function(Some(&req.function_name))
        .with_vectors();
    let population = with_usable_vectors(store.fetch_executions(&query).await?);

    let mut result = DriftSimulation {
        k,
        threshold,
        input_text: req.text.clone(),
        function_name: req.function_name.clone(),
        ..Default::default()
    };
    if population.is_empty() {
        result.message = Some("No existing data to compare".to_string());
        return Ok(result);
    }

    let vectors = vectors_of(&population);
    let mut all = vec![embedded.as_slice()];
    all.extend(vectors.iter().copied());
    check_dimensions(&all)?;

    let neighbors = NeighborIndex::new(vectors).k_nearest(&embedded, k.max(1));
    let avg = neighbors.iter().map(|n| n.distance).sum::<f64>() / neighbors.len().max(1) as f64;
    tracing::debug!(
        function = %req.function_name,
        population = population.len(),
        avg_distance = avg,
        "drift simulation"
    );

    result.is_drift = avg > threshold;
    result.avg_distance = round4(avg);
    result.nearest_id = neighbors.first().map(|n| population[n.index].id.clone());
    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::testutil::{at_distance, exec};
    use crate::embedding::EmbedError;
    use crate::models::ExecutionRecord;
    use crate::store::memory::InMemoryStore;
    use crate::store::ReferenceQuery;
    use async_trait::async_trait;

    /// Window where `seq` grows with recency, so the last record is newest.
    fn window(func: &str, distances: &[f32]) -> Vec<ExecutionRecord> {
        distances
            .iter()
            .enumerate()
            .map(|(i, &d)| exec(&format!("{}-{}", func, i), func, i as i64, at_distance(d)))
            .collect()
    }

    #[tokio::test]
    async fn test_single_execution_is_insufficient() {
        let store = InMemoryStore::with_executions(window("f", &[0.0]));
        let v = function_drift(&store, "f", &AnalysisSettings::default())
            .await
            .unwrap();
        assert_eq!(v.status, DriftStatus::InsufficientData);
        assert_eq!(v.sample_count, 1);
        assert_eq!(v.avg_distance, 0.0);
    }

    #[tokio::test]
    async fn test_newest_without_vector() {
        let mut records = window("f", &[0.0, 0.1]);
        records[1].vector = None;
        let store = InMemoryStore::with_executions(records);
        let v = function_drift(&store, "f", &AnalysisSettings::default())
            .await
            .unwrap();
        assert_eq!(v.status, DriftStatus::NoVector);
        assert_eq!(v.sample_count, 2);
    }

    #[tokio::test]
    async fn test_tight_window_is_normal() {
        let store = InMemoryStore::with_executions(window("f", &[0.01, 0.02, 0.0, 0.01, 0.02]));
        let v = function_drift(&store, "f", &AnalysisSettings::default())
            .await
            .unwrap();
        assert_eq!(v.status, DriftStatus::Normal);
        assert!(v.avg_distance < 0.05);
        assert_eq!(v.threshold, 0.3);
    }

    #[tokio::test]
    async fn test_far_newest_is_anomaly() {
        let mut records = window("f", &[0.0, 0.0, 0.0, 0.0]);
        records.push(exec("f-new", "f", 100, vec![0.0, 1.0]));
        let store = InMemoryStore::with_executions(records);
        let v = function_drift(&store, "f", &AnalysisSettings::default())
            .await
            .unwrap();
        assert_eq!(v.status, DriftStatus::Anomaly);
        assert!((v.avg_distance - 1.0).abs() < 1e-4);
        assert_eq!(v.sample_count, 5);
    }

    #[tokio::test]
    async fn test_average_on_threshold_is_normal() {
        // Neighbours at distances 0 and 1 average to exactly 0.5.
        let store = InMemoryStore::with_executions(vec![
            exec("f-0", "f", 0, vec![1.0, 0.0]),
            exec("f-1", "f", 1, vec![0.0, 1.0]),
            exec("f-new", "f", 2, vec![1.0, 0.0]),
        ]);
        let on_threshold = AnalysisSettings {
            drift_threshold: 0.5,
            drift_neighbors: 2,
            ..AnalysisSettings::default()
        };
        let v = function_drift(&store, "f", &on_threshold).await.unwrap();
        assert_eq!(v.avg_distance, 0.5);
        assert_eq!(v.status, DriftStatus::Normal);

        let just_below = AnalysisSettings {
            drift_threshold: 0.4999,
            ..on_threshold
        };
        let v = function_drift(&store, "f", &just_below).await.unwrap();
        assert_eq!(v.status, DriftStatus::Anomaly);
    }

    /// Fails fetches for one function only.
    struct FlakyStore {
        inner: InMemoryStore,
        broken: &'static str,
    }

    #[async_trait]
    impl VectorStore for FlakyStore {
        async fn fetch_executions(
            &self,
            query: &ExecutionQuery,
        ) -> anyhow::Result<Vec<ExecutionRecord>> {
            if query.function_name.as_deref() == Some(self.broken) {
                anyhow::bail!("connection reset");
            }
            self.inner.fetch_executions(query).await
        }
        async fn get_execution(&self, id: &str) -> anyhow::Result<Option<ExecutionRecord>> {
            self.inner.get_execution(id).await
        }
        async fn function_names(&self) -> anyhow::Result<Vec<String>> {
            self.inner.function_names().await
        }
        async fn insert_execution(&self, record: &ExecutionRecord) -> anyhow::Result<()> {
            self.inner.insert_execution(record).await
        }
        async fn has_references(&self) -> anyhow::Result<bool> {
            self.inner.has_references().await
        }
        async fn fetch_references(
            &self,
            query: &ReferenceQuery,
        ) -> anyhow::Result<Vec<crate::models::ReferenceRecord>> {
            self.inner.fetch_references(query).await
        }
        async fn insert_reference(
            &self,
            record: &crate::models::ReferenceRecord,
        ) -> anyhow::Result<()> {
            self.inner.insert_reference(record).await
        }
        async fn delete_reference(&self, id: &str) -> anyhow::Result<bool> {
            self.inner.delete_reference(id).await
        }
        async fn reference_counts(&self) -> anyhow::Result<Vec<(String, usize)>> {
            self.inner.reference_counts().await
        }
    }

    #[tokio::test]
    async fn test_summary_isolates_failing_function() {
        let mut records = window("a", &[0.0, 0.0, 0.0]);
        records.extend(window("b", &[0.0, 0.0]));
        records.extend(window("c", &[0.0]));
        let store = FlakyStore {
            inner: InMemoryStore::with_executions(records),
            broken: "b",
        };
        let out = drift_summary(&store, &DriftSummaryRequest::default(), &AnalysisSettings::default())
            .await
            .unwrap();
        let names: Vec<&str> = out.items.iter().map(|v| v.function_name.as_str()).collect();
        assert_eq!(names, vec!["a", "c"]);
        assert_eq!(out.total, 2);
        assert_eq!(out.failures.len(), 1);
        assert_eq!(out.failures[0].function_name, "b");
        assert!(out.failures[0].error.contains("connection reset"));
    }

    #[tokio::test]
    async fn test_summary_respects_function_filter() {
        let mut records = window("a", &[0.0, 0.0]);
        records.extend(window("b", &[0.0, 0.0]));
        let store = InMemoryStore::with_executions(records);
        let req = DriftSummaryRequest {
            functions: Some(vec!["b".into()]),
        };
        let out = drift_summary(&store, &req, &AnalysisSettings::default())
            .await
            .unwrap();
        assert_eq!(out.total, 1);
        assert_eq!(out.items[0].function_name, "b");
    }

    struct FixedEmbedder(Vec<f32>);

    #[async_trait]
    impl EmbeddingProvider for FixedEmbedder {
        fn model_name(&self) -> &str {
            "fixed"
        }
        fn dims(&self) -> usize {
            self.0.len()
        }
        async fn embed(&self, _text: &str) -> Result<Vec<f32>, EmbedError> {
            Ok(self.0.clone())
        }
    }

    struct KeylessEmbedder;

    #[async_trait]
    impl EmbeddingProvider for KeylessEmbedder {
        fn model_name(&self) -> &str {
            "keyless"
        }
        fn dims(&self) -> usize {
            2
        }
        async fn embed(&self, _text: &str) -> Result<Vec<f32>, EmbedError> {
            Err(EmbedError::NotConfigured("OPENAI_API_KEY not set".into()))
        }
    }

    fn simulate_request(func: &str) -> SimulateRequest {
        SimulateRequest {
            function_name: func.into(),
            text: "what is the weather".into(),
            threshold: Some(0.3),
            k: Some(3),
        }
    }

    #[tokio::test]
    async fn test_simulate_without_provider_is_configuration_error() {
        let store = InMemoryStore::with_executions(window("f", &[0.0, 0.1]));
        let err = simulate_drift(&store, None, &simulate_request("f"), &AnalysisSettings::default())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "configuration_error");

        let err = simulate_drift(
            &store,
            Some(&KeylessEmbedder),
            &simulate_request("f"),
            &AnalysisSettings::default(),
        )
        .await
        .unwrap_err();
        assert_eq!(err.kind(), "configuration_error");
    }

    #[tokio::test]
    async fn test_simulate_flags_far_text() {
        let store = InMemoryStore::with_executions(window("f", &[0.0, 0.01, 0.02, 0.03]));
        let embedder = FixedEmbedder(vec![0.0, 1.0]);
        let out = simulate_drift(
            &store,
            Some(&embedder),
            &simulate_request("f"),
            &AnalysisSettings::default(),
        )
        .await
        .unwrap();
        assert!(out.is_drift);
        assert!(out.avg_distance > 0.7);
        assert_eq!(out.k, 3);
        assert_eq!(out.input_text, "what is the weather");
        // The record closest to [0, 1] is the one farthest from [1, 0].
        assert_eq!(out.nearest_id.as_deref(), Some("f-3"));
    }

    #[tokio::test]
    async fn test_simulate_close_text_is_not_drift() {
        let store = InMemoryStore::with_executions(window("f", &[0.0, 0.01, 0.02]));
        let embedder = FixedEmbedder(vec![1.0, 0.0]);
        let out = simulate_drift(
            &store,
            Some(&embedder),
            &simulate_request("f"),
            &AnalysisSettings::default(),
        )
        .await
        .unwrap();
        assert!(!out.is_drift);
        assert_eq!(out.nearest_id.as_deref(), Some("f-0"));
    }

    #[tokio::test]
    async fn test_simulate_empty_population() {
        let store = InMemoryStore::new();
        let embedder = FixedEmbedder(vec![1.0, 0.0]);
        let out = simulate_drift(
            &store,
            Some(&embedder),
            &simulate_request("f"),
            &AnalysisSettings::default(),
        )
        .await
        .unwrap();
        assert!(!out.is_drift);
        assert_eq!(out.avg_distance, 0.0);
        assert_eq!(out.message.as_deref(), Some("No existing data to compare"));
    }

    #[tokio::test]
    async fn test_simulate_dimension_mismatch() {
        let store = InMemoryStore::with_executions(window("f", &[0.0, 0.1]));
        let embedder = FixedEmbedder(vec![1.0, 0.0, 0.0]);
        let err = simulate_drift(
            &store,
            Some(&embedder),
            &simulate_request("f"),
            &AnalysisSettings::default(),
        )
        .await
        .unwrap_err();
        assert_eq!(err.kind(), "dimension_mismatch");
    }
}
