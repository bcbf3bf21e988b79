//! Record store with file-based JSON persistence
//!
//! Directory layout:
//! ```text
//! ~/.memshare/records/
//! ├── mem-<uuid>.json
//! └── ...
//! ```
//!
//! Reads are served from memory; writes update memory synchronously and
//! persist to disk write-behind, so a crash can lose the tail of recent
//! writes but never corrupts served state. Corrupt files on disk are
//! skipped with a warning at load time.

use super::store::{filter_and_order, merge_into, QueryOrder, RecordFilter, RecordStore};
use super::types::{MemoryRecord, MetadataPatch};
use crate::error::{Error, Result};
use async_trait::async_trait;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::RwLock;

/// In-memory record store backed by JSON files
pub struct FileRecordStore {
    records_dir: PathBuf,
    records: Arc<RwLock<HashMap<String, MemoryRecord>>>,
}

impl FileRecordStore {
    /// Create a store at the given base directory, loading any records
    /// already on disk.
    pub async fn new(base_dir: PathBuf) -> std::io::Result<Self> {
        let records_dir = base_dir.join("records");
        tokio::fs::create_dir_all(&records_dir).await?;

        let store = Self {
            records_dir,
            records: Arc::new(RwLock::new(HashMap::new())),
        };
        store.load_from_disk().await;
        Ok(store)
    }

    /// Default base directory (~/.memshare/)
    pub fn default_dir() -> PathBuf {
        dirs_next::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".memshare")
    }

    async fn load_from_disk(&self) {
        let loaded = Self::load_json_files(&self.records_dir);
        let mut records = self.records.write().await;
        for record in loaded {
            records.insert(record.id.clone(), record);
        }
    }

    /// Load all parseable JSON files from a directory.
    fn load_json_files(dir: &Path) -> Vec<MemoryRecord> {
        let mut items = Vec::new();
        let entries = match std::fs::read_dir(dir) {
            Ok(entries) => entries,
            Err(e) => {
                if e.kind() != std::io::ErrorKind::NotFound {
                    tracing::warn!("Failed to read directory {}: {}", dir.display(), e);
                }
                return items;
            }
        };

        for entry in entries.flatten() {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            match std::fs::read_to_string(&path) {
                Ok(data) => match serde_json::from_str(&data) {
                    Ok(item) => items.push(item),
                    Err(e) => {
                        tracing::warn!("Failed to parse {}: {}", path.display(), e);
                    }
                },
                Err(e) => {
                    tracing::warn!("Failed to read {}: {}", path.display(), e);
                }
            }
        }

        items
    }

    /// Persist a single record to disk (fire-and-forget)
    fn persist_record(&self, record: &MemoryRecord) {
        let dir = self.records_dir.clone();
        let record = record.clone();
        tokio::spawn(async move {
            let path = dir.join(format!("{}.json", record.id));
            match serde_json::to_string_pretty(&record) {
                Ok(json) => {
                    if let Err(e) = tokio::fs::write(&path, json).await {
                        tracing::warn!("Failed to persist record {}: {}", record.id, e);
                    }
                }
                Err(e) => {
                    tracing::warn!("Failed to serialize record {}: {}", record.id, e);
                }
            }
        });
    }

    /// Remove a record's file from disk (fire-and-forget)
    fn remove_file(&self, id: &str) {
        let path = self.records_dir.join(format!("{}.json", id));
        let id = id.to_string();
        tokio::spawn(async move {
            if let Err(e) = tokio::fs::remove_file(&path).await {
                if e.kind() != std::io::ErrorKind::NotFound {
                    tracing::warn!("Failed to remove record file {}: {}", id, e);
                }
            }
        });
    }
}

#[async_trait]
impl RecordStore for FileRecordStore {
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
        {
            let mut records = self.records.write().await;
            if records.contains_key(&record.id) {
                return Err(Error::Validation(format!(
                    "Memory {} already exists",
                    record.id
                )));
            }
            records.insert(record.id.clone(), record.clone());
        }
        self.persist_record(&record);
        Ok(record)
    }

    async fn merge_metadata(&self, id: &str, patch: MetadataPatch) -> Result<MemoryRecord> {
        let merged = {
            let mut records = self.records.write().await;
            let record = records
                .get_mut(id)
                .ok_or_else(|| Error::NotFound(format!("Memory {} not found", id)))?;
            merge_into(record, &patch)?;
            record.clone()
        };
        self.persist_record(&merged);
        Ok(merged)
    }

    async fn replace_content(
        &self,
        id: &str,
        new_content: String,
        patch: MetadataPatch,
    ) -> Result<MemoryRecord> {
        let replaced = {
            let mut records = self.records.write().await;
            let record = records
                .get_mut(id)
                .ok_or_else(|| Error::NotFound(format!("Memory {} not found", id)))?;
            merge_into(record, &patch)?;
            record.content = new_content;
            record.clone()
        };
        self.persist_record(&replaced);
        Ok(replaced)
    }

    async fn delete(&self, id: &str) -> Result<bool> {
        let existed = self.records.write().await.remove(id).is_some();
        if existed {
            self.remove_file(id);
        }
        Ok(existed)
    }
}
