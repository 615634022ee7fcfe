//! Analyses over fetched execution vectors.
//!
//! Every analysis follows the same shape: one fetch from the
//! [`VectorStore`](crate::store::VectorStore), drop records without a usable
//! vector, run one or more numeric routines over the survivors, and shape
//! the output. Nothing is cached between calls.
//!
//! | Module | Routine |
//! |--------|---------|
//! | [`scatter`] | projection |
//! | [`bottleneck`] | clustering + durations |
//! | [`errors`] | clustering of ERROR executions |
//! | [`coverage`] | nearest reference + projection |
//! | [`hallucination`] | self-excluded k-NN mean |
//! | [`recommend`] | nearest reference, discovery/steady blend |
//! | [`drift`] | window k-NN and simulate-from-text |
//!
//! Results are returned as `Result<_, AnalysisError>`; the CLI and HTTP
//! layers wrap them in a [`Report`] envelope.

pub mod bottleneck;
pub mod coverage;
pub mod drift;
pub mod errors;
pub mod hallucination;
pub mod recommend;
pub mod scatter;

use serde::{Deserialize, Serialize};

use crate::error::{AnalysisError, ErrorPayload};
use crate::models::Embedded;

/// Response envelope: the body's fields plus an optional `error` object.
///
/// A failed analysis still carries a (default, empty) body so consumers
/// can render it without special-casing.
#[derive(Debug, Clone, Serialize)]
pub struct Report<T> {
    #[serde(flatten)]
    pub body: T,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorPayload>,
}

impl<T> Report<T> {
    pub fn ok(body: T) -> Self {
        Self { body, error: None }
    }

    pub fn is_ok(&self) -> bool {
        self.error.is_none()
    }
}

impl<T: Default> Report<T> {
    pub fn failed(err: &AnalysisError) -> Self {
        Self {
            body: T::default(),
            error: Some(err.payload()),
        }
    }

    /// Wrap an analysis result, logging failures at the boundary.
    pub fn from_result(analysis: &str, result: Result<T, AnalysisError>) -> Self {
        match result {
            Ok(body) => Self::ok(body),
            Err(e) => {
                tracing::error!(analysis, kind = e.kind(), "analysis failed: {}", e);
                Self::failed(&e)
            }
        }
    }
}

/// List body: `{ "items": [...], "total": n }`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ItemList<T> {
    pub items: Vec<T>,
    pub total: usize,
}

impl<T> ItemList<T> {
    pub fn new(items: Vec<T>) -> Self {
        let total = items.len();
        Self { items, total }
    }
}

impl<T> Default for ItemList<T> {
    fn default() -> Self {
        Self {
            items: Vec::new(),
            total: 0,
        }
    }
}

/// Tunable thresholds shared by the analyses. Deserialized straight from
/// the `[analysis]` table of the app config.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct AnalysisSettings {
    pub drift_threshold: f64,
    pub drift_window: usize,
    pub drift_neighbors: usize,
    pub coverage_threshold: f64,
    pub hallucination_neighbors: usize,
    pub hallucination_min_population: usize,
    pub bottleneck_factor: f64,
    pub simulate_population: usize,
    pub reference_limit: usize,
}

impl Default for AnalysisSettings {
    fn default() -> Self {
        Self {
            drift_threshold: 0.3,
            drift_window: 10,
            drift_neighbors: 5,
            coverage_threshold: 0.5,
            hallucination_neighbors: 5,
            hallucination_min_population: 5,
            bottleneck_factor: 2.0,
            simulate_population: 1000,
            reference_limit: 500,
        }
    }
}

/// Keep the records that carry a usable vector, in their original order.
pub(crate) fn with_usable_vectors<R: Embedded>(records: Vec<R>) -> Vec<R> {
    let before = records.len();
    let kept: Vec<R> = records
        .into_iter()
        .filter(|r| r.usable_vector().is_some())
        .collect();
    if kept.len() < before {
        tracing::debug!(
            dropped = before - kept.len(),
            "dropped records without a usable vector"
        );
    }
    kept
}

/// Borrow the vectors of records already filtered by [`with_usable_vectors`].
pub(crate) fn vectors_of<R: Embedded>(records: &[R]) -> Vec<&[f32]> {
    records.iter().filter_map(|r| r.usable_vector()).collect()
}

/// Fail unless every vector has the same dimensionality.
pub(crate) fn check_dimensions(vectors: &[&[f32]]) -> Result<(), AnalysisError> {
    if let Some(first) = vectors.first() {
        let expected = first.len();
        if let Some(bad) = vectors.iter().find(|v| v.len() != expected) {
            return Err(AnalysisError::DimensionMismatch {
                expected,
                actual: bad.len(),
            });
        }
    }
    Ok(())
}

pub(crate) fn round_to(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (value * factor).round() / factor
}

pub(crate) fn round4(value: f64) -> f64 {
    round_to(value, 4)
}

/// Truncate to at most `max` characters (not bytes).
pub(crate) fn truncate_chars(s: &str, max: usize) -> String {
    s.chars().take(max).collect()
}
