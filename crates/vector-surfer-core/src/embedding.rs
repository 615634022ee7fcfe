//! Embedding provider trait and vector utilities.
//!
//! Defines the [`EmbeddingProvider`] trait that text-embedding backends
//! implement, plus the BLOB codec used to persist vectors.
//!
//! Concrete provider implementations (OpenAI, Ollama, disabled) live in
//! the `vector-surfer` app crate.

use async_trait::async_trait;
use thiserror::Error;

use crate::error::AnalysisError;

/// Failure reported by an [`EmbeddingProvider`].
#[derive(Debug, Error)]
pub enum EmbedError {
    /// The provider cannot run at all: disabled, or missing a credential.
    #[error("{0}")]
    NotConfigured(String),
    /// The provider ran but the request failed.
    #[error(transparent)]
    Request(#[from] anyhow::Error),
}

impl From<EmbedError> for AnalysisError {
    fn from(err: EmbedError) -> Self {
        match err {
            EmbedError::NotConfigured(msg) => AnalysisError::Configuration(msg),
            EmbedError::Request(e) => AnalysisError::Embedding(e),
        }
    }
}

/// Trait for text-embedding providers.
///
/// Implementations must produce vectors with the same dimensionality as
/// the embeddings already stored for executions.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Returns the model identifier (e.g. `"text-embedding-3-small"`).
    fn model_name(&self) -> &str;
    /// Returns the embedding vector dimensionality (e.g. `1536`).
    fn dims(&self) -> usize;
    /// Embed a single text.
    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbedError>;
}

/// Encode a float vector as a BLOB (little-endian f32 bytes).
///
/// # Example
///
/// ```rust
/// use vector_surfer_core::embedding::{vec_to_blob, blob_to_vec};
///
/// let v = vec![1.0f32, -2.5, 3.125];
/// let blob = vec_to_blob(&v);
/// assert_eq!(blob.len(), 12); // 3 × 4 bytes
/// assert_eq!(blob_to_vec(&blob), v);
/// ```
pub fn vec_to_blob(vec: &[f32]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(vec.len() * 4);
    for &v in vec {
        bytes.extend_from_slice(&v.to_le_bytes());
    }
    bytes
}

/// Decode a BLOB back into a float vector.
pub fn blob_to_vec(blob: &[u8]) -> Vec<f32> {
    blob.chunks_exact(4)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect()
}
