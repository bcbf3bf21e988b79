//! Sharing policy administrator
//!
//! Thin mutation API over the record store: owner-gated sharing updates,
//! aggregate sharing statistics, and shared-space creation. A shared
//! space is an ordinary coordination record whose category is the space
//! name and whose CUSTOM whitelist is the member set, so membership is
//! evaluable with the normal policy machinery.

use crate::record::types::{MemoryRecord, SharingMeta, SharingPolicy};
use crate::record::{MetadataPatch, QueryOrder, RecordFilter, RecordStore};
use crate::{Error, Result};
use serde::Serialize;
use std::sync::Arc;

/// Aggregate sharing statistics across the store
#[derive(Debug, Clone, Default, Serialize)]
pub struct SharingStats {
    pub total_records: u64,
    pub private: u64,
    pub shared: u64,
    pub category_shared: u64,
    pub custom: u64,
    pub unknown: u64,
    /// Total whitelist entries across CUSTOM records
    pub custom_whitelist_entries: u64,
}

/// Owner-gated mutations of a record's sharing metadata
pub struct SharingAdmin {
    store: Arc<dyn RecordStore>,
}

impl SharingAdmin {
    pub fn new(store: Arc<dyn RecordStore>) -> Self {
        Self { store }
    }

    /// Set a record's sharing policy. Only the owner may do this; the
    /// policy string must parse, and the update is a sharing-only merge.
    pub async fn set_sharing(
        &self,
        memory_id: &str,
        requesting_agent: &str,
        policy: &str,
        allowed_agents: Vec<String>,
    ) -> Result<MemoryRecord> {
        let policy: SharingPolicy = policy
            .parse()
            .map_err(Error::Validation)?;

        let record = self
            .store
            .get(memory_id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("Memory {} not found", memory_id)))?;

        if !record.is_owned_by(requesting_agent) {
            return Err(Error::Validation(format!(
                "Only the owner of {} may change its sharing",
                memory_id
            )));
        }

        let sharing = SharingMeta {
            policy,
            allowed_agents: allowed_agents.into_iter().collect(),
        };
        self.store
            .merge_metadata(memory_id, MetadataPatch::sharing(sharing))
            .await
    }

    /// Record counts per policy plus whitelist totals.
    pub async fn get_sharing_stats(&self) -> Result<SharingStats> {
        let all = self
            .store
            .query(RecordFilter::default(), QueryOrder::CreatedDesc, usize::MAX)
            .await?;

        let mut stats = SharingStats::default();
        for record in &all {
            match record.sharing.policy {
                SharingPolicy::Private => stats.private += 1,
                SharingPolicy::Shared => stats.shared += 1,
                SharingPolicy::CategoryShared => stats.category_shared += 1,
                SharingPolicy::Custom => {
                    stats.custom += 1;
                    stats.custom_whitelist_entries +=
                        record.sharing.allowed_agents.len() as u64;
                }
                SharingPolicy::Unknown => stats.unknown += 1,
            }
            stats.total_records += 1;
        }
        Ok(stats)
    }

    /// Create a coordination record for a named shared space, CUSTOM-shared
    /// with the member agents.
    pub async fn create_shared_space(
        &self,
        owner_agent_id: &str,
        name: &str,
        member_agents: Vec<String>,
        description: Option<String>,
    ) -> Result<MemoryRecord> {
        if name.is_empty() {
            return Err(Error::Validation(
                "Shared space name must not be empty".to_string(),
            ));
        }

        let content = description
            .unwrap_or_else(|| format!("Shared space '{}' coordination record", name));
        let record = MemoryRecord::new(
            owner_agent_id,
            format!("Shared space: {}", name),
            content,
            name,
        )
        .with_sharing(SharingMeta::custom(member_agents));

        self.store.insert(record).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::MemoryRecordStore;
    use crate::record::types::{ConflictState, SummarizationState};

    async fn setup() -> (Arc<MemoryRecordStore>, SharingAdmin) {
        let store = Arc::new(MemoryRecordStore::new());
        let admin = SharingAdmin::new(store.clone());
        (store, admin)
    }

    #[tokio::test]
    async fn test_set_sharing_owner_only() {
        let (store, admin) = setup().await;
        let r = store
            .insert(MemoryRecord::new("agentA", "t", "c", "trading"))
            .await
            .unwrap();

        let denied = admin
            .set_sharing(&r.id, "agentB", "shared", Vec::new())
            .await;
        assert!(matches!(denied, Err(Error::Validation(_))));

        let updated = admin
            .set_sharing(&r.id, "agentA", "shared", Vec::new())
            .await
            .unwrap();
        assert_eq!(updated.sharing.policy, SharingPolicy::Shared);
    }

    #[tokio::test]
    async fn test_set_sharing_rejects_malformed_policy() {
        let (store, admin) = setup().await;
        let r = store
            .insert(MemoryRecord::new("agentA", "t", "c", "trading"))
            .await
            .unwrap();

        let result = admin
            .set_sharing(&r.id, "agentA", "friends_only", Vec::new())
            .await;
        assert!(matches!(result, Err(Error::Validation(_))));

        // The record was not touched
        let current = store.get(&r.id).await.unwrap().unwrap();
        assert_eq!(current.sharing.policy, SharingPolicy::Private);
        assert_eq!(current.version, 0);
    }

    #[tokio::test]
    async fn test_set_sharing_not_found() {
        let (_store, admin) = setup().await;
        let result = admin
            .set_sharing("mem-missing", "agentA", "shared", Vec::new())
            .await;
        assert!(matches!(result, Err(Error::NotFound(_))));
    }

    #[tokio::test]
    async fn test_set_sharing_is_a_metadata_merge() {
        let (store, admin) = setup().await;
        let r = store
            .insert(MemoryRecord::new("agentA", "t", "c", "trading"))
            .await
            .unwrap();

        // Stamp unrelated metadata first
        store
            .merge_metadata(
                &r.id,
                MetadataPatch::summarization(SummarizationState {
                    summarized: true,
                    original_length: Some(999),
                    summary_date: None,
                }),
            )
            .await
            .unwrap();
        store
            .merge_metadata(&r.id, MetadataPatch::conflict(ConflictState::open()))
            .await
            .unwrap();

        let updated = admin
            .set_sharing(&r.id, "agentA", "custom", vec!["agentB".to_string()])
            .await
            .unwrap();

        assert_eq!(updated.sharing.policy, SharingPolicy::Custom);
        assert!(updated.sharing.allowed_agents.contains("agentB"));
        // Unrelated groups survived
        assert!(updated.summarization.summarized);
        assert_eq!(updated.summarization.original_length, Some(999));
        assert!(updated.conflict.is_open());
    }

    #[tokio::test]
    async fn test_sharing_stats() {
        let (store, admin) = setup().await;
        store
            .insert(MemoryRecord::new("agentA", "a", "c", "x"))
            .await
            .unwrap();
        store
            .insert(MemoryRecord::new("agentA", "b", "c", "x").with_sharing(SharingMeta::shared()))
            .await
            .unwrap();
        store
            .insert(
                MemoryRecord::new("agentA", "c", "c", "x")
                    .with_sharing(SharingMeta::custom(["b".to_string(), "c".to_string()])),
            )
            .await
            .unwrap();

        let stats = admin.get_sharing_stats().await.unwrap();
        assert_eq!(stats.total_records, 3);
        assert_eq!(stats.private, 1);
        assert_eq!(stats.shared, 1);
        assert_eq!(stats.custom, 1);
        assert_eq!(stats.custom_whitelist_entries, 2);
        assert_eq!(stats.category_shared, 0);
    }

    #[tokio::test]
    async fn test_create_shared_space() {
        let (store, admin) = setup().await;
        let space = admin
            .create_shared_space(
                "agentA",
                "trading-desk",
                vec!["agentB".to_string(), "agentC".to_string()],
                None,
            )
            .await
            .unwrap();

        assert_eq!(space.category, "trading-desk");
        assert_eq!(space.sharing.policy, SharingPolicy::Custom);
        assert!(space.sharing.allowed_agents.contains("agentB"));
        assert!(space.sharing.allowed_agents.contains("agentC"));

        // Members can reach it through the normal policy machinery
        let evaluator = crate::access::AccessEvaluator::new(store.clone());
        assert!(evaluator.can_access(&space.id, "agentB").await.unwrap().allowed);
        assert!(!evaluator.can_access(&space.id, "agentZ").await.unwrap().allowed);
    }

    #[tokio::test]
    async fn test_create_shared_space_empty_name() {
        let (_store, admin) = setup().await;
        let result = admin
            .create_shared_space("agentA", "", Vec::new(), None)
            .await;
        assert!(matches!(result, Err(Error::Validation(_))));
    }
}
