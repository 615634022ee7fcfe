//! Error taxonomy for the analytics engine.
//!
//! Too-few-vectors situations are not errors: they surface as structured
//! status values (`INSUFFICIENT_DATA`, empty lists). Everything here is a
//! genuine failure that the analysis boundary reports next to an empty
//! result body (see [`Report`](crate::analysis::Report)).

use serde::Serialize;
use thiserror::Error;

/// Failure of a single analysis request.
#[derive(Debug, Error)]
pub enum AnalysisError {
    /// The text-embedding provider is unavailable (not configured, missing
    /// credential). Never to be confused with a "no drift" verdict.
    #[error("embedding provider not configured: {0}")]
    Configuration(String),

    /// The vector store could not be reached or returned malformed data.
    #[error("vector store fetch failed: {0:#}")]
    Fetch(#[source] anyhow::Error),

    /// The embedding provider is configured but the request failed.
    #[error("embedding request failed: {0:#}")]
    Embedding(#[source] anyhow::Error),

    /// Vectors combined in one call do not share a dimensionality.
    #[error("vector dimensionality mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    /// A curation target (execution or reference record) does not exist.
    #[error("{0} not found")]
    NotFound(String),
}

impl AnalysisError {
    /// Machine-readable error kind used in response envelopes.
    pub fn kind(&self) -> &'static str {
        match self {
            AnalysisError::Configuration(_) => "configuration_error",
            AnalysisError::Fetch(_) => "fetch_error",
            AnalysisError::Embedding(_) => "embedding_error",
            AnalysisError::DimensionMismatch { .. } => "dimension_mismatch",
            AnalysisError::NotFound(_) => "not_found",
        }
    }

    /// Serializable form of this error.
    pub fn payload(&self) -> ErrorPayload {
        ErrorPayload {
            kind: self.kind().to_string(),
            message: self.to_string(),
        }
    }
}

/// Wraps store failures so `?` converts them into [`AnalysisError::Fetch`].
impl From<anyhow::Error> for AnalysisError {
    fn from(err: anyhow::Error) -> Self {
        AnalysisError::Fetch(err)
    }
}

/// The `error` object attached to a failed response envelope.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ErrorPayload {
    pub kind: String,
    pub message: String,
}
