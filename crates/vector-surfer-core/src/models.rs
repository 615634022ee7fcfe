//! Core data models: execution records and curated reference records.
//!
//! Both record kinds carry a fixed set of typed fields plus an `extra`
//! map holding any attribute the instrumented system emits that this
//! crate does not know about (e.g. `return_value`, `team`).

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Outcome of one instrumented function execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ExecutionStatus {
    Success,
    Error,
    CacheHit,
}

impl ExecutionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExecutionStatus::Success => "SUCCESS",
            ExecutionStatus::Error => "ERROR",
            ExecutionStatus::CacheHit => "CACHE_HIT",
        }
    }
}

impl fmt::Display for ExecutionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ExecutionStatus {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "SUCCESS" => Ok(ExecutionStatus::Success),
            "ERROR" => Ok(ExecutionStatus::Error),
            "CACHE_HIT" => Ok(ExecutionStatus::CacheHit),
            other => anyhow::bail!("unknown execution status: {}", other),
        }
    }
}

/// A vector is usable when it is non-empty and every component is finite.
pub fn is_usable_vector(v: &[f32]) -> bool {
    !v.is_empty() && v.iter().all(|x| x.is_finite())
}

/// Records that may carry an embedding vector.
pub trait Embedded {
    fn vector(&self) -> Option<&[f32]>;

    /// The vector, if present and usable by the numeric routines.
    fn usable_vector(&self) -> Option<&[f32]> {
        self.vector().filter(|v| is_usable_vector(v))
    }
}

/// One recorded execution of an instrumented function.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionRecord {
    #[serde(alias = "uuid")]
    pub id: String,
    pub function_name: String,
    pub status: ExecutionStatus,
    #[serde(default)]
    pub duration_ms: f64,
    #[serde(alias = "timestamp_utc")]
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub span_id: String,
    #[serde(default)]
    pub trace_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_code: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input_preview: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_preview: Option<String>,
    /// Input embedding; only populated when the fetch asked for vectors.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vector: Option<Vec<f32>>,
    /// Unrecognized attributes, preserved as-is.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ExecutionRecord {
    /// Output preview, falling back to the `return_value` extra attribute.
    pub fn output_text(&self) -> String {
        if let Some(out) = &self.output_preview {
            return out.clone();
        }
        match self.extra.get("return_value") {
            Some(Value::String(s)) => s.clone(),
            Some(Value::Null) | None => String::new(),
            Some(other) => other.to_string(),
        }
    }
}

impl Embedded for ExecutionRecord {
    fn vector(&self) -> Option<&[f32]> {
        self.vector.as_deref()
    }
}

/// A curated ("golden") copy of an execution used as ground truth for
/// coverage and recommendation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReferenceRecord {
    pub id: String,
    /// Id of the execution this record was copied from.
    pub source_execution_id: String,
    pub function_name: String,
    pub status: ExecutionStatus,
    #[serde(default)]
    pub duration_ms: f64,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub span_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_code: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input_preview: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_preview: Option<String>,
    #[serde(default)]
    pub note: String,
    #[serde(default)]
    pub tags: Vec<String>,
    pub registered_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vector: Option<Vec<f32>>,
}

impl ReferenceRecord {
    /// Copy an execution (vector included) into a new reference record.
    pub fn from_execution(
        id: String,
        exec: &ExecutionRecord,
        note: &str,
        tags: Vec<String>,
        registered_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            source_execution_id: exec.id.clone(),
            function_name: exec.function_name.clone(),
            status: exec.status,
            duration_ms: exec.duration_ms,
            timestamp: exec.timestamp,
            span_id: exec.span_id.clone(),
            error_code: exec.error_code.clone(),
            input_preview: exec.input_preview.clone(),
            output_preview: exec.output_preview.clone(),
            note: note.to_string(),
            tags,
            registered_at,
            vector: exec.vector.clone(),
        }
    }
}

impl Embedded for ReferenceRecord {
    fn vector(&self) -> Option<&[f32]> {
        self.vector.as_deref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_parse_and_display() {
        assert_eq!(
            "cache_hit".parse::<ExecutionStatus>().unwrap(),
            ExecutionStatus::CacheHit
        );
        assert_eq!(ExecutionStatus::Error.to_string(), "ERROR");
        assert!("RUNNING".parse::<ExecutionStatus>().is_err());
    }

    #[test]
    fn test_record_keeps_unknown_attributes() {
        let line = r#"{"uuid":"e1","function_name":"f","status":"SUCCESS","duration_ms":3.5,
            "timestamp_utc":"2026-01-02T03:04:05Z","team":"core","return_value":"42","vector":[1.0,0.0]}"#;
        let rec: ExecutionRecord = serde_json::from_str(line).unwrap();
        assert_eq!(rec.id, "e1");
        assert_eq!(rec.extra.get("team"), Some(&Value::String("core".into())));
        assert_eq!(rec.output_text(), "42");
        assert_eq!(rec.usable_vector(), Some(&[1.0f32, 0.0][..]));
    }

    #[test]
    fn test_unusable_vectors() {
        assert!(!is_usable_vector(&[]));
        assert!(!is_usable_vector(&[1.0, f32::NAN]));
        assert!(is_usable_vector(&[0.0, 0.0]));
    }
}
