//! Event bus client
//!
//! Maintains the process-local subscriber registry and dispatches sync
//! events to it. Per process the client moves `Idle -> Listening -> Idle`:
//! while listening, one background task blocks on the channel subscription
//! and feeds every received event through [`EventBusClient::handle_event`].
//!
//! Fan-out is best-effort and at-least-once per currently-registered
//! subscriber: the originator is never notified, a failing callback is
//! logged and skipped, and no ordering is guaranteed across subscribers.

use super::channel::EventChannel;
use super::types::{SyncEvent, SyncEventType};
use crate::record::{MemoryRecord, QueryOrder, RecordFilter, RecordStore};
use crate::Result;
use futures::StreamExt;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Callback registered by a subscribing agent. An `Err` return is logged
/// and never interrupts delivery to the remaining subscribers.
pub type SubscriberCallback = Arc<dyn Fn(&SyncEvent) -> Result<()> + Send + Sync>;

/// Listening state of the bus client
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BusState {
    Idle,
    Listening,
}

/// Result of a bulk agent-state sync: per-record failures are collected,
/// not fatal.
#[derive(Debug, Clone, Default, Serialize)]
pub struct SyncReport {
    pub copied: u64,
    pub errors: Vec<String>,
}

struct ListenSession {
    task: JoinHandle<()>,
    cancel: CancellationToken,
}

/// Publish/subscribe wrapper over the event channel with in-process
/// dispatch to registered subscribers.
pub struct EventBusClient {
    channel: Arc<dyn EventChannel>,
    store: Arc<dyn RecordStore>,
    topic: String,
    max_sync_records: usize,
    subscribers: Arc<RwLock<HashMap<String, SubscriberCallback>>>,
    state: Arc<RwLock<BusState>>,
    session: Mutex<Option<ListenSession>>,
    /// Root token: shutdown cancels every in-flight scan and listen loop
    cancel: CancellationToken,
}

impl EventBusClient {
    pub fn new(
        channel: Arc<dyn EventChannel>,
        store: Arc<dyn RecordStore>,
        topic: impl Into<String>,
    ) -> Self {
        Self {
            channel,
            store,
            topic: topic.into(),
            max_sync_records: 100,
            subscribers: Arc::new(RwLock::new(HashMap::new())),
            state: Arc::new(RwLock::new(BusState::Idle)),
            session: Mutex::new(None),
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_max_sync_records(mut self, max: usize) -> Self {
        self.max_sync_records = max;
        self
    }

    pub async fn state(&self) -> BusState {
        *self.state.read().await
    }

    // =========================================================================
    // Subscriber registry
    // =========================================================================

    /// Register a callback for `agent_id`. Re-registration for the same
    /// agent replaces the prior callback.
    pub async fn subscribe<F>(&self, agent_id: impl Into<String>, callback: F)
    where
        F: Fn(&SyncEvent) -> Result<()> + Send + Sync + 'static,
    {
        let agent_id = agent_id.into();
        let replaced = self
            .subscribers
            .write()
            .await
            .insert(agent_id.clone(), Arc::new(callback))
            .is_some();
        tracing::debug!(agent_id = %agent_id, replaced, "Subscriber registered");
    }

    /// Remove a subscriber registration.
    pub async fn unsubscribe(&self, agent_id: &str) -> bool {
        self.subscribers.write().await.remove(agent_id).is_some()
    }

    pub async fn subscriber_count(&self) -> usize {
        self.subscribers.read().await.len()
    }

    // =========================================================================
    // Publish / dispatch
    // =========================================================================

    /// Serialize an event and write it to the shared channel. Does not
    /// wait for, or learn about, delivery to subscribers.
    pub async fn publish(
        &self,
        event_type: SyncEventType,
        memory_id: &str,
        agent_id: &str,
        payload: serde_json::Value,
    ) -> Result<()> {
        let event = SyncEvent::new(event_type, memory_id, agent_id, payload);
        self.publish_event(&event).await
    }

    async fn publish_event(&self, event: &SyncEvent) -> Result<()> {
        let bytes = event.to_bytes()?;
        self.channel.publish(&self.topic, bytes).await
    }

    /// Dispatch one event to every registered subscriber except the
    /// originator (and, when the event is targeted, everyone outside the
    /// target set). One failing callback never blocks the rest.
    pub async fn handle_event(&self, event: &SyncEvent) {
        let subscribers: Vec<(String, SubscriberCallback)> = self
            .subscribers
            .read()
            .await
            .iter()
            .map(|(id, cb)| (id.clone(), cb.clone()))
            .collect();

        for (agent_id, callback) in subscribers {
            if agent_id == event.agent_id {
                continue;
            }
            if let Some(targets) = &event.target_agents {
                if !targets.iter().any(|t| t == &agent_id) {
                    continue;
                }
            }
            if let Err(e) = callback(event) {
                tracing::warn!(
                    agent_id = %agent_id,
                    memory_id = %event.memory_id,
                    "Subscriber callback failed: {}",
                    e
                );
            }
        }
    }

    // =========================================================================
    // Listen loop
    // =========================================================================

    /// Enter `Listening`: spawn the background loop that drains the
    /// channel subscription into `handle_event`. Idempotent while a
    /// session is already running.
    pub async fn start_listening(self: &Arc<Self>) -> Result<()> {
        let mut session = self.session.lock().await;
        if session.is_some() {
            return Ok(());
        }

        let mut stream = self.channel.subscribe(&self.topic).await?;
        let cancel = self.cancel.child_token();
        *self.state.write().await = BusState::Listening;
        tracing::info!(topic = %self.topic, "Event bus listening");

        let client = self.clone();
        let loop_cancel = cancel.clone();
        let task = tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = loop_cancel.cancelled() => break,
                    next = stream.next() => match next {
                        Some(bytes) => match SyncEvent::from_bytes(&bytes) {
                            Ok(event) => client.handle_event(&event).await,
                            Err(e) => {
                                tracing::warn!("Discarding undecodable event: {}", e);
                            }
                        },
                        None => {
                            tracing::warn!("Event channel subscription closed");
                            break;
                        }
                    },
                }
            }
            *client.state.write().await = BusState::Idle;
        });

        *session = Some(ListenSession { task, cancel });
        Ok(())
    }

    /// Leave `Listening` and cancel any in-flight bulk scan.
    pub async fn shutdown(&self) {
        self.cancel.cancel();
        if let Some(session) = self.session.lock().await.take() {
            session.cancel.cancel();
            let _ = session.task.await;
        }
        *self.state.write().await = BusState::Idle;
        tracing::info!("Event bus shut down");
    }

    // =========================================================================
    // Record-aware operations
    // =========================================================================

    /// Read the current record and publish an event carrying its full
    /// snapshot, optionally restricted to `target_agents`. Returns
    /// `Ok(None)` when the record no longer exists — a legitimate race
    /// when update and delete interleave, not an error.
    pub async fn broadcast_memory_update(
        &self,
        memory_id: &str,
        update_type: SyncEventType,
        agent_id: &str,
        target_agents: Option<Vec<String>>,
    ) -> Result<Option<SyncEvent>> {
        let record = match self.store.get(memory_id).await? {
            Some(record) => record,
            None => {
                tracing::debug!(memory_id = %memory_id, "Broadcast raced a delete");
                return Ok(None);
            }
        };

        let mut event = SyncEvent::new(
            update_type,
            memory_id,
            agent_id,
            serde_json::to_value(&record)?,
        );
        if let Some(targets) = target_agents {
            event = event.with_targets(targets);
        }
        self.publish_event(&event).await?;
        Ok(Some(event))
    }

    /// Point-in-time copy of the most recent records owned by
    /// `source_agent_id` (optionally category-filtered) into new records
    /// owned by `target_agent_id`, each stamped with provenance. Not a
    /// live link; re-invoke to refresh. Per-record failures land in the
    /// report, not abort the rest.
    pub async fn sync_agent_state(
        &self,
        source_agent_id: &str,
        target_agent_id: &str,
        category: Option<&str>,
    ) -> Result<SyncReport> {
        let mut filter = RecordFilter::default().owner(source_agent_id);
        if let Some(category) = category {
            filter = filter.category(category);
        }

        let sources = self
            .store
            .query(filter, QueryOrder::CreatedDesc, self.max_sync_records)
            .await?;

        let cancel = self.cancel.child_token();
        let mut report = SyncReport::default();
        for source in sources {
            // Cancellation lands between records so each copy is
            // all-or-nothing.
            if cancel.is_cancelled() {
                tracing::info!(
                    copied = report.copied,
                    "Agent state sync cancelled mid-scan"
                );
                break;
            }

            let mut copy = MemoryRecord::new(
                target_agent_id,
                source.title.clone(),
                source.content.clone(),
                source.category.clone(),
            );
            copy.synced_from = Some(source_agent_id.to_string());
            copy.synced_at = Some(chrono::Utc::now());

            match self.store.insert(copy).await {
                Ok(_) => report.copied += 1,
                Err(e) => {
                    tracing::warn!(source_id = %source.id, "Sync copy failed: {}", e);
                    report.errors.push(format!("{}: {}", source.id, e));
                }
            }
        }

        tracing::info!(
            source = %source_agent_id,
            target = %target_agent_id,
            copied = report.copied,
            failed = report.errors.len(),
            "Agent state sync finished"
        );
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::channel::{MemoryChannel, UnavailableChannel};
    use crate::record::types::MetadataPatch;
    use crate::record::MemoryRecordStore;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn make_client() -> Arc<EventBusClient> {
        Arc::new(EventBusClient::new(
            Arc::new(MemoryChannel::default()),
            Arc::new(MemoryRecordStore::new()),
            "memory.sync",
        ))
    }

    fn make_client_with_store(store: Arc<dyn RecordStore>) -> Arc<EventBusClient> {
        Arc::new(EventBusClient::new(
            Arc::new(MemoryChannel::default()),
            store,
            "memory.sync",
        ))
    }

    fn counting_callback(counter: Arc<AtomicUsize>) -> impl Fn(&SyncEvent) -> Result<()> {
        move |_event| {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_handle_event_skips_originator() {
        let client = make_client();
        let a_count = Arc::new(AtomicUsize::new(0));
        let b_count = Arc::new(AtomicUsize::new(0));

        client
            .subscribe("agentA", counting_callback(a_count.clone()))
            .await;
        client
            .subscribe("agentB", counting_callback(b_count.clone()))
            .await;

        let event = SyncEvent::new(
            SyncEventType::MemoryAdded,
            "mem-1",
            "agentA",
            serde_json::Value::Null,
        );
        client.handle_event(&event).await;

        assert_eq!(a_count.load(Ordering::SeqCst), 0);
        assert_eq!(b_count.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_failing_subscriber_does_not_block_the_rest() {
        let client = make_client();
        let delivered = Arc::new(AtomicUsize::new(0));

        client
            .subscribe("agentB", counting_callback(delivered.clone()))
            .await;
        client
            .subscribe("agentC", |_event: &SyncEvent| {
                Err(crate::Error::Internal("subscriber exploded".to_string()))
            })
            .await;
        client
            .subscribe("agentD", counting_callback(delivered.clone()))
            .await;

        let event = SyncEvent::new(
            SyncEventType::MemoryUpdated,
            "mem-1",
            "agentA",
            serde_json::Value::Null,
        );
        client.handle_event(&event).await;

        // Both healthy subscribers heard the event despite agentC failing
        assert_eq!(delivered.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_resubscribe_replaces_callback() {
        let client = make_client();
        let old = Arc::new(AtomicUsize::new(0));
        let new = Arc::new(AtomicUsize::new(0));

        client.subscribe("agentB", counting_callback(old.clone())).await;
        client.subscribe("agentB", counting_callback(new.clone())).await;
        assert_eq!(client.subscriber_count().await, 1);

        let event = SyncEvent::new(
            SyncEventType::MemoryAdded,
            "mem-1",
            "agentA",
            serde_json::Value::Null,
        );
        client.handle_event(&event).await;

        assert_eq!(old.load(Ordering::SeqCst), 0);
        assert_eq!(new.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_unsubscribe() {
        let client = make_client();
        let count = Arc::new(AtomicUsize::new(0));
        client.subscribe("agentB", counting_callback(count.clone())).await;

        assert!(client.unsubscribe("agentB").await);
        assert!(!client.unsubscribe("agentB").await);

        let event = SyncEvent::new(
            SyncEventType::MemoryAdded,
            "mem-1",
            "agentA",
            serde_json::Value::Null,
        );
        client.handle_event(&event).await;
        assert_eq!(count.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_targeted_event_restricts_fanout() {
        let client = make_client();
        let b_count = Arc::new(AtomicUsize::new(0));
        let c_count = Arc::new(AtomicUsize::new(0));
        client.subscribe("agentB", counting_callback(b_count.clone())).await;
        client.subscribe("agentC", counting_callback(c_count.clone())).await;

        let event = SyncEvent::new(
            SyncEventType::MemoryUpdated,
            "mem-1",
            "agentA",
            serde_json::Value::Null,
        )
        .with_targets(vec!["agentB".to_string()]);
        client.handle_event(&event).await;

        assert_eq!(b_count.load(Ordering::SeqCst), 1);
        assert_eq!(c_count.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_listen_loop_end_to_end() {
        let client = make_client();
        let received = Arc::new(AtomicUsize::new(0));
        let origin_received = Arc::new(AtomicUsize::new(0));

        client
            .subscribe("agentB", counting_callback(received.clone()))
            .await;
        client
            .subscribe("agentA", counting_callback(origin_received.clone()))
            .await;

        client.start_listening().await.unwrap();
        assert_eq!(client.state().await, BusState::Listening);

        client
            .publish(
                SyncEventType::MemoryAdded,
                "mem-1",
                "agentA",
                serde_json::json!({"title": "t"}),
            )
            .await
            .unwrap();

        // Give the background loop a beat to dispatch
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;

        assert_eq!(received.load(Ordering::SeqCst), 1);
        assert_eq!(origin_received.load(Ordering::SeqCst), 0);

        client.shutdown().await;
        assert_eq!(client.state().await, BusState::Idle);
    }

    #[tokio::test]
    async fn test_start_listening_is_idempotent() {
        let client = make_client();
        client.start_listening().await.unwrap();
        client.start_listening().await.unwrap();
        assert_eq!(client.state().await, BusState::Listening);
        client.shutdown().await;
    }

    #[tokio::test]
    async fn test_publish_failure_surfaces_to_caller() {
        let client = Arc::new(EventBusClient::new(
            Arc::new(UnavailableChannel),
            Arc::new(MemoryRecordStore::new()),
            "memory.sync",
        ));

        let result = client
            .publish(
                SyncEventType::MemoryAdded,
                "mem-1",
                "agentA",
                serde_json::Value::Null,
            )
            .await;
        assert!(matches!(result, Err(crate::Error::Channel(_))));
    }

    #[tokio::test]
    async fn test_broadcast_carries_full_snapshot() {
        let store = Arc::new(MemoryRecordStore::new());
        let record = store
            .insert(MemoryRecord::new("agentA", "notes", "body", "trading"))
            .await
            .unwrap();
        let client = make_client_with_store(store);

        let event = client
            .broadcast_memory_update(&record.id, SyncEventType::MemoryUpdated, "agentA", None)
            .await
            .unwrap()
            .expect("record exists");

        assert_eq!(event.payload["id"], record.id.as_str());
        assert_eq!(event.payload["title"], "notes");
        assert_eq!(event.payload["owner_agent_id"], "agentA");
    }

    #[tokio::test]
    async fn test_broadcast_missing_record_is_non_error() {
        let client = make_client();
        let result = client
            .broadcast_memory_update("mem-gone", SyncEventType::MemoryDeleted, "agentA", None)
            .await
            .unwrap();
        assert!(result.is_none());
    }

    #[tokio::test]
    async fn test_broadcast_targets_flow_into_event() {
        let store = Arc::new(MemoryRecordStore::new());
        let record = store
            .insert(MemoryRecord::new("agentA", "t", "c", "cat"))
            .await
            .unwrap();
        let client = make_client_with_store(store);

        let event = client
            .broadcast_memory_update(
                &record.id,
                SyncEventType::MemoryUpdated,
                "agentA",
                Some(vec!["agentB".to_string()]),
            )
            .await
            .unwrap()
            .unwrap();
        assert_eq!(event.target_agents, Some(vec!["agentB".to_string()]));
    }

    #[tokio::test]
    async fn test_sync_agent_state_copies_with_provenance() {
        let store = Arc::new(MemoryRecordStore::new());
        for i in 0..3 {
            store
                .insert(MemoryRecord::new(
                    "agentA",
                    format!("note {}", i),
                    "body",
                    "trading",
                ))
                .await
                .unwrap();
        }
        store
            .insert(MemoryRecord::new("agentA", "other", "body", "research"))
            .await
            .unwrap();

        let client = make_client_with_store(store.clone());
        let report = client
            .sync_agent_state("agentA", "agentB", Some("trading"))
            .await
            .unwrap();

        assert_eq!(report.copied, 3);
        assert!(report.errors.is_empty());

        let copies = store
            .query(
                RecordFilter::default().owner("agentB"),
                QueryOrder::CreatedDesc,
                10,
            )
            .await
            .unwrap();
        assert_eq!(copies.len(), 3);
        for copy in &copies {
            assert_eq!(copy.synced_from.as_deref(), Some("agentA"));
            assert!(copy.synced_at.is_some());
            assert_eq!(copy.category, "trading");
            // Copies are born private, not linked to the source's policy
            assert_eq!(
                copy.sharing.policy,
                crate::record::SharingPolicy::Private
            );
        }
    }

    #[tokio::test]
    async fn test_sync_agent_state_is_point_in_time() {
        let store = Arc::new(MemoryRecordStore::new());
        let source = store
            .insert(MemoryRecord::new("agentA", "note", "original", "trading"))
            .await
            .unwrap();

        let client = make_client_with_store(store.clone());
        client.sync_agent_state("agentA", "agentB", None).await.unwrap();

        // Mutating the source afterwards does not touch the copy
        store
            .replace_content(&source.id, "changed".to_string(), MetadataPatch::default())
            .await
            .unwrap();

        let copies = store
            .query(
                RecordFilter::default().owner("agentB"),
                QueryOrder::CreatedDesc,
                10,
            )
            .await
            .unwrap();
        assert_eq!(copies[0].content, "original");
    }

    #[tokio::test]
    async fn test_sync_agent_state_partial_failure() {
        use async_trait::async_trait;

        /// Fails every second insert, delegating the rest.
        struct FlakyStore {
            inner: MemoryRecordStore,
            inserts: AtomicUsize,
        }

        #[async_trait]
        impl RecordStore for FlakyStore {
            async fn get(&self, id: &str) -> Result<Option<MemoryRecord>> {
                self.inner.get(id).await
            }
            async fn query(
                &self,
                filter: RecordFilter,
                order: QueryOrder,
                limit: usize,
            ) -> Result<Vec<MemoryRecord>> {
                self.inner.query(filter, order, limit).await
            }
            async fn insert(&self, record: MemoryRecord) -> Result<MemoryRecord> {
                if self.inserts.fetch_add(1, Ordering::SeqCst) % 2 == 1 {
                    return Err(crate::Error::Store("write timeout".to_string()));
                }
                self.inner.insert(record).await
            }
            async fn merge_metadata(
                &self,
                id: &str,
                patch: MetadataPatch,
            ) -> Result<MemoryRecord> {
                self.inner.merge_metadata(id, patch).await
            }
            async fn replace_content(
                &self,
                id: &str,
                new_content: String,
                patch: MetadataPatch,
            ) -> Result<MemoryRecord> {
                self.inner.replace_content(id, new_content, patch).await
            }
            async fn delete(&self, id: &str) -> Result<bool> {
                self.inner.delete(id).await
            }
        }

        let flaky = Arc::new(FlakyStore {
            inner: MemoryRecordStore::new(),
            inserts: AtomicUsize::new(0),
        });
        for i in 0..4 {
            flaky
                .inner
                .insert(MemoryRecord::new("agentA", format!("n{}", i), "b", "cat"))
                .await
                .unwrap();
        }

        let client = make_client_with_store(flaky);
        let report = client.sync_agent_state("agentA", "agentB", None).await.unwrap();

        // Every failure is reported, every success still lands
        assert_eq!(report.copied, 2);
        assert_eq!(report.errors.len(), 2);
    }

    #[tokio::test]
    async fn test_sync_respects_record_cap() {
        let store = Arc::new(MemoryRecordStore::new());
        for i in 0..5 {
            store
                .insert(MemoryRecord::new("agentA", format!("n{}", i), "b", "cat"))
                .await
                .unwrap();
        }

        let client = Arc::new(
            EventBusClient::new(
                Arc::new(MemoryChannel::default()),
                store.clone(),
                "memory.sync",
            )
            .with_max_sync_records(2),
        );

        let report = client.sync_agent_state("agentA", "agentB", None).await.unwrap();
        assert_eq!(report.copied, 2);
    }
}
