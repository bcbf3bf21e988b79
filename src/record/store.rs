//! Record store gateway
//!
//! `RecordStore` is the typed seam between this crate and the durable
//! store. Every operation is async and may fail with `Error::Store` when
//! the backend is unavailable. `MemoryRecordStore` is the in-process
//! implementation used as the default backend and by tests; the
//! file-backed variant lives in [`super::file_store`].

use super::types::{MemoryRecord, MetadataPatch};
use crate::error::{Error, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Query ordering over `created_at`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryOrder {
    CreatedAsc,
    CreatedDesc,
}

/// Typed query predicate over records
#[derive(Debug, Clone, Default)]
pub struct RecordFilter {
    pub owner: Option<String>,
    pub category: Option<String>,
    pub created_before: Option<DateTime<Utc>>,
    /// Content length strictly greater than this many characters
    pub min_content_chars: Option<usize>,
    pub summarized: Option<bool>,
    pub open_conflict: Option<bool>,
}

impl RecordFilter {
    pub fn owner(mut self, agent_id: impl Into<String>) -> Self {
        self.owner = Some(agent_id.into());
        self
    }

    pub fn category(mut self, category: impl Into<String>) -> Self {
        self.category = Some(category.into());
        self
    }

    pub fn created_before(mut self, cutoff: DateTime<Utc>) -> Self {
        self.created_before = Some(cutoff);
        self
    }

    pub fn min_content_chars(mut self, min: usize) -> Self {
        self.min_content_chars = Some(min);
        self
    }

    pub fn summarized(mut self, summarized: bool) -> Self {
        self.summarized = Some(summarized);
        self
    }

    pub fn open_conflict(mut self, open: bool) -> Self {
        self.open_conflict = Some(open);
        self
    }

    /// Whether a record passes every set field of this filter.
    pub fn matches(&self, record: &MemoryRecord) -> bool {
        if let Some(owner) = &self.owner {
            if &record.owner_agent_id != owner {
                return false;
            }
        }
        if let Some(category) = &self.category {
            if &record.category != category {
                return false;
            }
        }
        if let Some(cutoff) = self.created_before {
            if record.created_at >= cutoff {
                return false;
            }
        }
        if let Some(min) = self.min_content_chars {
            if record.content.chars().count() <= min {
                return false;
            }
        }
        if let Some(summarized) = self.summarized {
            if record.summarization.summarized != summarized {
                return false;
            }
        }
        if let Some(open) = self.open_conflict {
            if record.conflict.is_open() != open {
                return false;
            }
        }
        true
    }
}

/// Typed read/write operations against the durable record store.
///
/// Metadata merges are field-group granular: a patch replaces only the
/// sub-structures it names, never the whole row. When a patch carries
/// `expected_version`, the merge fails with `Error::Conflict` if the
/// stored version has moved.
#[async_trait]
pub trait RecordStore: Send + Sync {
    async fn get(&self, id: &str) -> Result<Option<MemoryRecord>>;

    async fn query(
        &self,
        filter: RecordFilter,
        order: QueryOrder,
        limit: usize,
    ) -> Result<Vec<MemoryRecord>>;

    async fn insert(&self, record: MemoryRecord) -> Result<MemoryRecord>;

    async fn merge_metadata(&self, id: &str, patch: MetadataPatch) -> Result<MemoryRecord>;

    /// Atomically replace `content` and merge `patch` in one update; no
    /// partial state is visible to concurrent readers.
    async fn replace_content(
        &self,
        id: &str,
        new_content: String,
        patch: MetadataPatch,
    ) -> Result<MemoryRecord>;

    /// Returns true when the record existed.
    async fn delete(&self, id: &str) -> Result<bool>;
}

/// In-memory record store
pub struct MemoryRecordStore {
    records: Arc<RwLock<HashMap<String, MemoryRecord>>>,
}

impl MemoryRecordStore {
    pub fn new() -> Self {
        Self {
            records: Arc::new(RwLock::new(HashMap::new())),
        }
    }
}

impl Default for MemoryRecordStore {
    fn default() -> Self {
        Self::new()
    }
}

/// Shared query logic over a snapshot of records.
pub(crate) fn filter_and_order(
    records: impl Iterator<Item = MemoryRecord>,
    filter: &RecordFilter,
    order: QueryOrder,
    limit: usize,
) -> Vec<MemoryRecord> {
    let mut matched: Vec<MemoryRecord> = records.filter(|r| filter.matches(r)).collect();
    match order {
        QueryOrder::CreatedAsc => matched.sort_by(|a, b| a.created_at.cmp(&b.created_at)),
        QueryOrder::CreatedDesc => matched.sort_by(|a, b| b.created_at.cmp(&a.created_at)),
    }
    matched.truncate(limit);
    matched
}

/// Shared merge logic: version check, patch application, touch.
pub(crate) fn merge_into(record: &mut MemoryRecord, patch: &MetadataPatch) -> Result<()> {
    if let Some(expected) = patch.expected_version {
        if record.version != expected {
            return Err(Error::Conflict(format!(
                "Memory {} is at version {}, expected {}",
                record.id, record.version, expected
            )));
        }
    }
    patch.apply(record);
    record.touch();
    Ok(())
}

#[async_trait]
impl RecordStore for MemoryRecordStore {
    async fn get(&self, id: &str) -> Result<Option<MemoryRecord>> {
        Ok(self.records.read().await.get(id).cloned())
    }

    async fn query(
        &self,
        filter: RecordFilter,
        order: QueryOrder,
        limit: usize,
    ) -> Result<Vec<MemoryRecord>> {
        let records = self.records.read().await;
        Ok(filter_and_order(
            records.values().cloned(),
            &filter,
            order,
            limit,
        ))
    }

    async fn insert(&self, record: MemoryRecord) -> Result<MemoryRecord> {
        let mut records = self.records.write().await;
        if records.contains_key(&record.id) {
            return Err(Error::Validation(format!(
                "Memory {} already exists",
                record.id
            )));
        }
        records.insert(record.id.clone(), record.clone());
        Ok(record)
    }

    async fn merge_metadata(&self, id: &str, patch: MetadataPatch) -> Result<MemoryRecord> {
        let mut records = self.records.write().await;
        let record = records
            .get_mut(id)
            .ok_or_else(|| Error::NotFound(format!("Memory {} not found", id)))?;
        merge_into(record, &patch)?;
        Ok(record.clone())
    }

    async fn replace_content(
        &self,
        id: &str,
        new_content: String,
        patch: MetadataPatch,
    ) -> Result<MemoryRecord> {
        let mut records = self.records.write().await;
        let record = records
            .get_mut(id)
            .ok_or_else(|| Error::NotFound(format!("Memory {} not found", id)))?;
        // Validate the version before touching anything so a conflict
        // leaves the record exactly as it was.
        merge_into(record, &patch)?;
        record.content = new_content;
        Ok(record.clone())
    }

    async fn delete(&self, id: &str) -> Result<bool> {
        Ok(self.records.write().await.remove(id).is_some())
    }
}
