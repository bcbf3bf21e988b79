//! Conflict resolver
//!
//! Reconciles divergent concurrent writes detected at the write layer or
//! signaled over the bus. The store already enforces last-writer-wins at
//! field-group granularity, so resolution here is pure annotation: the
//! resolver stamps `conflict` metadata and never touches `content`.
//! Actual content merging under the MERGE strategy is a policy that
//! lives outside this crate.

use crate::record::types::{ConflictState, MemoryRecord, ResolutionStrategy};
use crate::record::{MetadataPatch, RecordStore};
use crate::{Error, Result};
use std::sync::Arc;

/// Annotates records with resolution metadata
pub struct ConflictResolver {
    store: Arc<dyn RecordStore>,
}

impl ConflictResolver {
    pub fn new(store: Arc<dyn RecordStore>) -> Self {
        Self { store }
    }

    /// Mark the record's conflict as resolved under `strategy`.
    ///
    /// An unparseable strategy is rejected before any store access, so
    /// the record is left untouched. `conflict_data` carries the
    /// divergence details for diagnostics only.
    pub async fn resolve_conflict(
        &self,
        memory_id: &str,
        conflict_data: serde_json::Value,
        strategy: &str,
    ) -> Result<MemoryRecord> {
        let strategy: ResolutionStrategy = strategy.parse().map_err(Error::Validation)?;

        tracing::debug!(
            memory_id = %memory_id,
            strategy = %strategy,
            conflict_data = %conflict_data,
            "Resolving conflict"
        );

        let resolved = self
            .store
            .merge_metadata(
                memory_id,
                MetadataPatch::conflict(ConflictState {
                    resolved: true,
                    strategy: Some(strategy),
                    resolved_at: Some(chrono::Utc::now()),
                }),
            )
            .await?;

        tracing::info!(
            memory_id = %memory_id,
            strategy = %strategy,
            "Conflict resolved"
        );
        Ok(resolved)
    }
}
