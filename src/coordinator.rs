//! Memory coordinator
//!
//! Composes the record store, access evaluator, sharing administrator,
//! event bus, conflict resolver, and summarization lifecycle into the
//! operation surface exposed to agents. Every caller-facing method
//! returns the uniform [`Outcome`] envelope; the write path publishes a
//! change event after each successful mutation and marks conflict
//! metadata when an optimistic write loses a race.

use crate::access::{AccessDecision, AccessEvaluator, SharingAdmin, SharingStats};
use crate::bus::{EventBusClient, EventChannel, SyncEvent, SyncEventType, SyncReport};
use crate::config::MemShareConfig;
use crate::lifecycle::{
    ConflictResolver, SummarizationManager, SummarizeReport, Summarizer, SummaryStats,
};
use crate::outcome::Outcome;
use crate::record::types::{ConflictState, MemoryRecord, SharingMeta};
use crate::record::{MemoryRecordStore, MetadataPatch, RecordStore};
use crate::Error;
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

/// Composition root for the shared memory pool
pub struct MemoryCoordinator {
    store: Arc<dyn RecordStore>,
    evaluator: AccessEvaluator,
    admin: SharingAdmin,
    bus: Arc<EventBusClient>,
    resolver: Arc<ConflictResolver>,
    lifecycle: Arc<SummarizationManager>,
    config: MemShareConfig,
    periodic: Mutex<Option<JoinHandle<()>>>,
}

impl MemoryCoordinator {
    pub fn new(
        store: Arc<dyn RecordStore>,
        channel: Arc<dyn EventChannel>,
        summarizer: Arc<dyn Summarizer>,
        config: MemShareConfig,
    ) -> Self {
        let bus = Arc::new(
            EventBusClient::new(channel, store.clone(), config.bus.topic.clone())
                .with_max_sync_records(config.sync.max_records),
        );
        Self {
            evaluator: AccessEvaluator::new(store.clone()),
            admin: SharingAdmin::new(store.clone()),
            resolver: Arc::new(ConflictResolver::new(store.clone())),
            lifecycle: Arc::new(SummarizationManager::new(
                store.clone(),
                summarizer,
                config.summarization.clone(),
            )),
            bus,
            store,
            config,
            periodic: Mutex::new(None),
        }
    }

    /// Fully in-process coordinator: in-memory store, in-process channel,
    /// extractive summarizer.
    pub fn in_memory(config: MemShareConfig) -> Self {
        Self::new(
            Arc::new(MemoryRecordStore::new()),
            Arc::new(crate::bus::MemoryChannel::new(config.bus.channel_capacity)),
            Arc::new(crate::lifecycle::ExtractiveSummarizer::new()),
            config,
        )
    }

    /// Coordinator over the JSON-file-backed store at the configured
    /// storage directory, in-process channel and extractive summarizer.
    pub async fn with_file_store(config: MemShareConfig) -> crate::Result<Self> {
        let store = crate::record::FileRecordStore::new(config.storage_dir()).await?;
        Ok(Self::new(
            Arc::new(store),
            Arc::new(crate::bus::MemoryChannel::new(config.bus.channel_capacity)),
            Arc::new(crate::lifecycle::ExtractiveSummarizer::new()),
            config,
        ))
    }

    /// The bus client, for subscriber registration and direct publishing.
    pub fn bus(&self) -> &Arc<EventBusClient> {
        &self.bus
    }

    /// Start the bus listen loop and the periodic lifecycle scan.
    pub async fn start(self: &Arc<Self>) -> crate::Result<()> {
        self.bus.start_listening().await?;
        let mut periodic = self.periodic.lock().await;
        if periodic.is_none() {
            let interval =
                std::time::Duration::from_secs(self.config.summarization.scan_interval_secs);
            *periodic = Some(
                self.lifecycle
                    .clone()
                    .spawn_periodic(self.resolver.clone(), interval),
            );
        }
        Ok(())
    }

    /// Stop background work: the listen loop, the periodic scan, and any
    /// in-flight bulk operation.
    pub async fn shutdown(&self) {
        self.bus.shutdown().await;
        self.lifecycle.shutdown();
        if let Some(handle) = self.periodic.lock().await.take() {
            let _ = handle.await;
        }
    }

    // =========================================================================
    // Write path
    // =========================================================================

    /// Create a record (PRIVATE unless sharing is stamped at creation)
    /// and announce it to other agents.
    pub async fn add_memory(
        &self,
        owner_agent_id: &str,
        title: &str,
        content: &str,
        category: &str,
        sharing: Option<SharingMeta>,
    ) -> Outcome<MemoryRecord> {
        let mut record = MemoryRecord::new(owner_agent_id, title, content, category);
        if let Some(sharing) = sharing {
            record = record.with_sharing(sharing);
        }

        let inserted = match self.store.insert(record).await {
            Ok(inserted) => inserted,
            Err(e) => return Outcome::from_result(Err(e)),
        };
        self.announce(&inserted.id, SyncEventType::MemoryAdded, owner_agent_id)
            .await;
        Outcome::success(inserted)
    }

    /// Replace a record's content. Requires an allowed access decision;
    /// with `expected_version` set, a lost race fails with a conflict
    /// outcome and flags the record for the resolver.
    pub async fn update_memory(
        &self,
        memory_id: &str,
        agent_id: &str,
        new_content: &str,
        expected_version: Option<u64>,
    ) -> Outcome<MemoryRecord> {
        match self.evaluator.can_access(memory_id, agent_id).await {
            Ok(decision) if !decision.allowed => {
                return Outcome::error(format!("access_denied: {}", decision.reason));
            }
            Ok(_) => {}
            Err(e) => return Outcome::from_result(Err(e)),
        }

        let mut patch = MetadataPatch::default();
        if let Some(version) = expected_version {
            patch = patch.with_expected_version(version);
        }

        match self
            .store
            .replace_content(memory_id, new_content.to_string(), patch)
            .await
        {
            Ok(updated) => {
                self.announce(memory_id, SyncEventType::MemoryUpdated, agent_id)
                    .await;
                Outcome::success(updated)
            }
            Err(Error::Conflict(msg)) => {
                // Last-writer-wins already happened at the store; flag the
                // divergence so the lifecycle scan hands it to the resolver.
                if let Err(e) = self
                    .store
                    .merge_metadata(memory_id, MetadataPatch::conflict(ConflictState::open()))
                    .await
                {
                    tracing::warn!(memory_id = %memory_id, "Failed to flag conflict: {}", e);
                }
                Outcome::error(msg)
            }
            Err(e) => Outcome::from_result(Err(e)),
        }
    }

    /// Delete a record (owner only) and announce the deletion.
    pub async fn delete_memory(&self, memory_id: &str, agent_id: &str) -> Outcome<bool> {
        let record = match self.store.get(memory_id).await {
            Ok(Some(record)) => record,
            Ok(None) => return Outcome::not_found(format!("Memory {} not found", memory_id)),
            Err(e) => return Outcome::from_result(Err(e)),
        };
        if !record.is_owned_by(agent_id) {
            return Outcome::error(format!(
                "access_denied: only the owner may delete {}",
                memory_id
            ));
        }

        match self.store.delete(memory_id).await {
            Ok(existed) => {
                // The record is gone, so publish directly rather than
                // snapshot-broadcasting.
                if let Err(e) = self
                    .bus
                    .publish(
                        SyncEventType::MemoryDeleted,
                        memory_id,
                        agent_id,
                        serde_json::json!({ "memory_id": memory_id }),
                    )
                    .await
                {
                    tracing::warn!(memory_id = %memory_id, "Delete event not published: {}", e);
                }
                Outcome::success(existed)
            }
            Err(e) => Outcome::from_result(Err(e)),
        }
    }

    /// Snapshot-broadcast a change event; a record deleted in between is
    /// a tolerated race, logged and dropped.
    async fn announce(&self, memory_id: &str, update_type: SyncEventType, agent_id: &str) {
        if let Err(e) = self
            .bus
            .broadcast_memory_update(memory_id, update_type, agent_id, None)
            .await
        {
            tracing::warn!(
                memory_id = %memory_id,
                event = %update_type,
                "Change event not published: {}",
                e
            );
        }
    }

    // =========================================================================
    // Access control and sharing
    // =========================================================================

    /// Access decision for one (record, agent) pair. A store failure is a
    /// distinct `access_check_failed` outcome, never an implicit allow.
    pub async fn can_access(&self, memory_id: &str, agent_id: &str) -> Outcome<AccessDecision> {
        match self.evaluator.can_access(memory_id, agent_id).await {
            Ok(decision) => Outcome::success(decision),
            Err(Error::NotFound(msg)) => Outcome::not_found(msg),
            Err(e) => Outcome::error(format!("access_check_failed: {}", e)),
        }
    }

    /// Memories visible to an agent, newest first, capped at `limit`.
    pub async fn get_shared(&self, agent_id: &str, limit: usize) -> Outcome<Vec<MemoryRecord>> {
        Outcome::from_result(self.evaluator.get_shared(agent_id, limit).await)
    }

    /// Owner-gated sharing update, announced to other agents.
    pub async fn set_sharing(
        &self,
        memory_id: &str,
        requesting_agent: &str,
        policy: &str,
        allowed_agents: Vec<String>,
    ) -> Outcome<MemoryRecord> {
        match self
            .admin
            .set_sharing(memory_id, requesting_agent, policy, allowed_agents)
            .await
        {
            Ok(updated) => {
                self.announce(memory_id, SyncEventType::MemoryUpdated, requesting_agent)
                    .await;
                Outcome::success(updated)
            }
            Err(e) => Outcome::from_result(Err(e)),
        }
    }

    pub async fn get_sharing_stats(&self) -> Outcome<SharingStats> {
        Outcome::from_result(self.admin.get_sharing_stats().await)
    }

    /// Create a shared-space coordination record and announce it.
    pub async fn create_shared_space(
        &self,
        owner_agent_id: &str,
        name: &str,
        member_agents: Vec<String>,
        description: Option<String>,
    ) -> Outcome<MemoryRecord> {
        match self
            .admin
            .create_shared_space(owner_agent_id, name, member_agents, description)
            .await
        {
            Ok(space) => {
                self.announce(&space.id, SyncEventType::MemoryAdded, owner_agent_id)
                    .await;
                Outcome::success(space)
            }
            Err(e) => Outcome::from_result(Err(e)),
        }
    }

    // =========================================================================
    // Bus operations
    // =========================================================================

    /// Fire-and-forget event publish; transport failure surfaces here.
    pub async fn publish(
        &self,
        event_type: SyncEventType,
        memory_id: &str,
        agent_id: &str,
        payload: serde_json::Value,
    ) -> Outcome<()> {
        Outcome::from_result(
            self.bus
                .publish(event_type, memory_id, agent_id, payload)
                .await,
        )
    }

    /// Snapshot broadcast, optionally targeted. `not_found` is the
    /// legitimate update/delete race, not an error.
    pub async fn broadcast_memory_update(
        &self,
        memory_id: &str,
        update_type: SyncEventType,
        agent_id: &str,
        target_agents: Option<Vec<String>>,
    ) -> Outcome<SyncEvent> {
        match self
            .bus
            .broadcast_memory_update(memory_id, update_type, agent_id, target_agents)
            .await
        {
            Ok(Some(event)) => Outcome::success(event),
            Ok(None) => Outcome::not_found(format!(
                "Memory {} not found at broadcast time",
                memory_id
            )),
            Err(e) => Outcome::from_result(Err(e)),
        }
    }

    /// Point-in-time bulk copy of one agent's records to another.
    pub async fn sync_agent_state(
        &self,
        source_agent_id: &str,
        target_agent_id: &str,
        category: Option<&str>,
    ) -> Outcome<SyncReport> {
        Outcome::from_result(
            self.bus
                .sync_agent_state(source_agent_id, target_agent_id, category)
                .await,
        )
    }

    // =========================================================================
    // Lifecycle operations
    // =========================================================================

    pub async fn resolve_conflict(
        &self,
        memory_id: &str,
        conflict_data: serde_json::Value,
        strategy: &str,
    ) -> Outcome<MemoryRecord> {
        Outcome::from_result(
            self.resolver
                .resolve_conflict(memory_id, conflict_data, strategy)
                .await,
        )
    }

    pub async fn summarize_old(
        &self,
        age_days: i64,
        min_length: usize,
        dry_run: bool,
    ) -> Outcome<SummarizeReport> {
        Outcome::from_result(
            self.lifecycle
                .summarize_old(chrono::Duration::days(age_days), min_length, dry_run)
                .await,
        )
    }

    pub async fn summarize_by_category(&self, category: &str) -> Outcome<SummarizeReport> {
        Outcome::from_result(self.lifecycle.summarize_by_category(category).await)
    }

    pub async fn summary_stats(&self) -> Outcome<SummaryStats> {
        Outcome::from_result(self.lifecycle.summary_stats().await)
    }
}
