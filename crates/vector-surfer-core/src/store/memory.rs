//! In-memory [`VectorStore`] implementation for tests.
//!
//! Records live in `Vec`s behind `std::sync::RwLock`. Fetches are linear
//! scans; sorting is stable so ties keep insertion order.

use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use anyhow::{anyhow, Result};
use async_trait::async_trait;

use crate::models::{ExecutionRecord, ReferenceRecord};

use super::{ExecutionQuery, ReferenceQuery, SortField, VectorStore};

/// In-memory store. The reference collection does not exist until the
/// first reference is inserted, mirroring an optional backend collection.
pub struct InMemoryStore {
    executions: RwLock<Vec<ExecutionRecord>>,
    references: RwLock<Option<Vec<ReferenceRecord>>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self {
            executions: RwLock::new(Vec::new()),
            references: RwLock::new(None),
        }
    }

    /// Build a store pre-loaded with executions.
    pub fn with_executions(records: Vec<ExecutionRecord>) -> Self {
        Self {
            executions: RwLock::new(records),
            references: RwLock::new(None),
        }
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

fn read<T>(lock: &RwLock<T>) -> Result<RwLockReadGuard<'_, T>> {
    lock.read().map_err(|_| anyhow!("in-memory store lock poisoned"))
}

fn write<T>(lock: &RwLock<T>) -> Result<RwLockWriteGuard<'_, T>> {
    lock.write().map_err(|_| anyhow!("in-memory store lock poisoned"))
}

#[async_trait]
impl VectorStore for InMemoryStore {
    async fn fetch_executions(&self, query: &ExecutionQuery) -> Result<Vec<ExecutionRecord>> {
        let execs = read(&self.executions)?;
        let mut out: Vec<ExecutionRecord> =
            execs.iter().filter(|r| query.matches(r)).cloned().collect();

        if let Some(sort) = query.sort {
            out.sort_by(|a, b| {
                let ord = match sort.field {
                    SortField::Timestamp => a.timestamp.cmp(&b.timestamp),
                    SortField::Duration => a
                        .duration_ms
                        .partial_cmp(&b.duration_ms)
                        .unwrap_or(Ordering::Equal),
                };
                if sort.ascending {
                    ord
                } else {
                    ord.reverse()
                }
            });
        }
        out.truncate(query.limit);
        if !query.include_vector {
            for r in out.iter_mut() {
                r.vector = None;
            }
        }
        Ok(out)
    }

    async fn get_execution(&self, id: &str) -> Result<Option<ExecutionRecord>> {
        let execs = read(&self.executions)?;
        Ok(execs.iter().find(|r| r.id == id).cloned())
    }

    async fn function_names(&self) -> Result<Vec<String>> {
        let execs = read(&self.executions)?;
        let mut names: Vec<String> = execs.iter().map(|r| r.function_name.clone()).collect();
        names.sort();
        names.dedup();
        Ok(names)
    }

    async fn insert_execution(&self, record: &ExecutionRecord) -> Result<()> {
        let mut execs = write(&self.executions)?;
        execs.retain(|r| r.id != record.id);
        execs.push(record.clone());
        Ok(())
    }

    async fn has_references(&self) -> Result<bool> {
        Ok(read(&self.references)?.is_some())
    }

    async fn fetch_references(&self, query: &ReferenceQuery) -> Result<Vec<ReferenceRecord>> {
        let refs = read(&self.references)?;
        let Some(refs) = refs.as_ref() else {
            return Ok(Vec::new());
        };
        Ok(refs
            .iter()
            .filter(|r| {
                query
                    .function_name
                    .as_ref()
                    .map_or(true, |f| &r.function_name == f)
            })
            .take(query.limit)
            .map(|r| {
                let mut r = r.clone();
                if !query.include_vector {
                    r.vector = None;
                }
                r
            })
            .collect())
    }

    async fn insert_reference(&self, record: &ReferenceRecord) -> Result<()> {
        let mut refs = write(&self.references)?;
        let refs = refs.get_or_insert_with(Vec::new);
        refs.retain(|r| r.id != record.id);
        refs.push(record.clone());
        Ok(())
    }

    async fn delete_reference(&self, id: &str) -> Result<bool> {
        let mut refs = write(&self.references)?;
        let Some(refs) = refs.as_mut() else {
            return Ok(false);
        };
        let before = refs.len();
        refs.retain(|r| r.id != id);
        Ok(refs.len() != before)
    }

    async fn reference_counts(&self) -> Result<Vec<(String, usize)>> {
        let refs = read(&self.references)?;
        let mut counts: BTreeMap<String, usize> = BTreeMap::new();
        for r in refs.iter().flatten() {
            *counts.entry(r.function_name.clone()).or_insert(0) += 1;
        }
        Ok(counts.into_iter().collect())
    }
}
