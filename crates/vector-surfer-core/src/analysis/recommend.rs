//! Diversity-aware candidates for the reference set.
//!
//! Candidates far from every reference are "discovery" picks (new
//! territory); candidates close to a reference are "steady" picks
//! (reinforce known-good behaviour). Half the slots (rounded down) go to
//! discovery, the rest to steady.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::error::AnalysisError;
use crate::models::{ExecutionRecord, ExecutionStatus};
use crate::neighbors::nearest_distances;
use crate::store::{ExecutionQuery, ReferenceQuery, VectorStore};

use super::{check_dimensions, round4, vectors_of, with_usable_vectors, AnalysisSettings, ItemList};

const FETCH_MULTIPLIER: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CandidateType {
    Discovery,
    Steady,
}

#[derive(Debug, Clone)]
pub struct RecommendRequest {
    pub function_name: String,
    pub limit: usize,
}

impl RecommendRequest {
    pub fn new(function_name: impl Into<String>) -> Self {
        Self {
            function_name: function_name.into(),
            limit: 10,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Candidate {
    pub id: String,
    pub span_id: String,
    pub function_name: String,
    pub status: ExecutionStatus,
    pub duration_ms: f64,
    pub timestamp: DateTime<Utc>,
    pub distance_to_nearest_reference: f64,
    pub candidate_type: CandidateType,
    pub score: f64,
}

impl Candidate {
    fn new(rec: &ExecutionRecord, distance: f64, kind: CandidateType, score: f64) -> Self {
        Self {
            id: rec.id.clone(),
            span_id: rec.span_id.clone(),
            function_name: rec.function_name.clone(),
            status: rec.status,
            duration_ms: rec.duration_ms,
            timestamp: rec.timestamp,
            distance_to_nearest_reference: distance,
            candidate_type: kind,
            score,
        }
    }
}

pub async fn recommend_with_diversity(
    store: &dyn VectorStore,
    req: &RecommendRequest,
    settings: &AnalysisSettings,
) -> Result<ItemList<Candidate>, AnalysisError> {
    let query = ExecutionQuery::new(req.limit.saturating_mul(FETCH_MULTIPLIER))
        .function(Some(&req.function_name))
        .status(ExecutionStatus::Success)
        .with_vectors();
    let records = with_usable_vectors(store.fetch_executions(&query).await?);
    if records.is_empty() {
        return Ok(ItemList::default());
    }

    let references = if store.has_references().await? {
        let ref_query = ReferenceQuery::new(settings.reference_limit)
            .function(Some(&req.function_name))
            .with_vectors();
        with_usable_vectors(store.fetch_references(&ref_query).await?)
    } else {
        Vec::new()
    };

    let exec_vectors = vectors_of(&records);
    let ref_vectors = vectors_of(&references);
    let mut all = exec_vectors.clone();
    all.extend(ref_vectors.iter().copied());
    check_dimensions(&all)?;

    if ref_vectors.is_empty() {
        tracing::debug!(
            function = %req.function_name,
            "no references, every candidate is discovery"
        );
        let items = records
            .iter()
            .take(req.limit)
            .map(|r| Candidate::new(r, 1.0, CandidateType::Discovery, 1.0))
            .collect();
        return Ok(ItemList::new(items));
    }

    let distances: Vec<f64> = nearest_distances(&ref_vectors, &exec_vectors)
        .into_iter()
        .map(|d| round4(d.unwrap_or(1.0)))
        .collect();
    Ok(ItemList::new(blend(&records, &distances, req.limit)))
}

/// Split `limit` slots between the farthest and nearest candidates.
fn blend(records: &[ExecutionRecord], distances: &[f64], limit: usize) -> Vec<Candidate> {
    let mut order: Vec<usize> = (0..records.len()).collect();
    // Stable sorts: equal distances keep fetch order.
    order.sort_by(|&a, &b| {
        distances[b]
            .partial_cmp(&distances[a])
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    let discovery_count = limit / 2;
    let discovery: Vec<usize> = order.iter().copied().take(discovery_count).collect();

    let mut ascending: Vec<usize> = (0..records.len()).collect();
    ascending.sort_by(|&a, &b| {
        distances[a]
            .partial_cmp(&distances[b])
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    let steady: Vec<usize> = ascending.into_iter().take(limit - discovery_count).collect();

    let max = distances.iter().copied().fold(0.0f64, f64::max);
    let max = if max == 0.0 { 1.0 } else { max };

    let mut seen = HashSet::new();
    let mut merged = Vec::with_capacity(limit);
    for (i, kind) in discovery
        .into_iter()
        .map(|i| (i, CandidateType::Discovery))
        .chain(steady.into_iter().map(|i| (i, CandidateType::Steady)))
    {
        let rec = &records[i];
        if !seen.insert(rec.id.as_str()) {
            continue;
        }
        let normalized = distances[i] / max;
        let score = match kind {
            CandidateType::Discovery => normalized,
            CandidateType::Steady => 1.0 - normalized,
        };
        merged.push(Candidate::new(rec, distances[i], kind, round4(score)));
    }
    merged.truncate(limit);
    merged
}
