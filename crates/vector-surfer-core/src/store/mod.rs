//! Vector store abstraction.
//!
//! The [`VectorStore`] trait is everything the analyses need from the
//! record backend: filtered fetches with optional embeddings, execution
//! lookup, and the optional reference ("golden") collection. The SQLite
//! adapter lives in the app crate; [`memory::InMemoryStore`] backs tests.
//!
//! Implementations must be `Send + Sync` to work with async runtimes.

pub mod memory;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::models::{ExecutionRecord, ExecutionStatus, ReferenceRecord};

/// Field an execution fetch is ordered by.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortField {
    Timestamp,
    Duration,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Sort {
    pub field: SortField,
    pub ascending: bool,
}

impl Sort {
    pub fn newest_first() -> Self {
        Self {
            field: SortField::Timestamp,
            ascending: false,
        }
    }
}

/// Filter for [`VectorStore::fetch_executions`].
///
/// Without an explicit sort, records come back in insertion order.
#[derive(Debug, Clone, Default)]
pub struct ExecutionQuery {
    pub function_name: Option<String>,
    pub status: Option<ExecutionStatus>,
    pub since: Option<DateTime<Utc>>,
    pub until: Option<DateTime<Utc>>,
    pub include_vector: bool,
    pub sort: Option<Sort>,
    pub limit: usize,
}

impl ExecutionQuery {
    pub fn new(limit: usize) -> Self {
        Self {
            limit,
            ..Default::default()
        }
    }

    pub fn function(mut self, name: Option<&str>) -> Self {
        self.function_name = name.map(str::to_string);
        self
    }

    pub fn status(mut self, status: ExecutionStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn between(mut self, since: Option<DateTime<Utc>>, until: Option<DateTime<Utc>>) -> Self {
        self.since = since;
        self.until = until;
        self
    }

    pub fn with_vectors(mut self) -> Self {
        self.include_vector = true;
        self
    }

    pub fn sorted(mut self, sort: Sort) -> Self {
        self.sort = Some(sort);
        self
    }

    /// Whether `rec` passes every filter of this query.
    pub fn matches(&self, rec: &ExecutionRecord) -> bool {
        if let Some(f) = &self.function_name {
            if &rec.function_name != f {
                return false;
            }
        }
        if let Some(s) = self.status {
            if rec.status != s {
                return false;
            }
        }
        if let Some(since) = self.since {
            if rec.timestamp < since {
                return false;
            }
        }
        if let Some(until) = self.until {
            if rec.timestamp > until {
                return false;
            }
        }
        true
    }
}

/// Filter for [`VectorStore::fetch_references`].
#[derive(Debug, Clone, Default)]
pub struct ReferenceQuery {
    pub function_name: Option<String>,
    pub include_vector: bool,
    pub limit: usize,
}

impl ReferenceQuery {
    pub fn new(limit: usize) -> Self {
        Self {
            limit,
            ..Default::default()
        }
    }

    pub fn function(mut self, name: Option<&str>) -> Self {
        self.function_name = name.map(str::to_string);
        self
    }

    pub fn with_vectors(mut self) -> Self {
        self.include_vector = true;
        self
    }
}

/// Abstract record backend.
///
/// # Operations
///
/// | Method | Purpose |
/// |--------|---------|
/// | [`fetch_executions`](VectorStore::fetch_executions) | Filtered, sorted, limited fetch |
/// | [`get_execution`](VectorStore::get_execution) | Lookup by id, vector included |
/// | [`function_names`](VectorStore::function_names) | Distinct instrumented functions |
/// | [`insert_execution`](VectorStore::insert_execution) | Load a record (ingestion) |
/// | [`has_references`](VectorStore::has_references) | Does the reference collection exist |
/// | [`fetch_references`](VectorStore::fetch_references) | List reference records |
/// | [`insert_reference`](VectorStore::insert_reference) | Register a reference record |
/// | [`delete_reference`](VectorStore::delete_reference) | Remove a reference record |
/// | [`reference_counts`](VectorStore::reference_counts) | References per function |
#[async_trait]
pub trait VectorStore: Send + Sync {
    async fn fetch_executions(&self, query: &ExecutionQuery) -> Result<Vec<ExecutionRecord>>;

    async fn get_execution(&self, id: &str) -> Result<Option<ExecutionRecord>>;

    /// Distinct function names, sorted.
    async fn function_names(&self) -> Result<Vec<String>>;

    async fn insert_execution(&self, record: &ExecutionRecord) -> Result<()>;

    /// The reference collection is optional; analyses that use it treat a
    /// missing collection as empty.
    async fn has_references(&self) -> Result<bool>;

    async fn fetch_references(&self, query: &ReferenceQuery) -> Result<Vec<ReferenceRecord>>;

    async fn insert_reference(&self, record: &ReferenceRecord) -> Result<()>;

    /// Returns `false` if no reference had that id.
    async fn delete_reference(&self, id: &str) -> Result<bool>;

    /// `(function_name, count)` pairs, in no particular order.
    async fn reference_counts(&self) -> Result<Vec<(String, usize)>>;
}
