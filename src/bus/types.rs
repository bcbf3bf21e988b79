//! Sync event wire types
//!
//! Events are ephemeral: created at publish time, consumed by zero or
//! more local subscriber callbacks, then discarded. The bus offers no
//! persistence beyond delivery to currently-registered subscribers.

use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Kind of change a sync event announces
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncEventType {
    MemoryAdded,
    MemoryUpdated,
    MemoryDeleted,
}

impl std::fmt::Display for SyncEventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MemoryAdded => write!(f, "memory_added"),
            Self::MemoryUpdated => write!(f, "memory_updated"),
            Self::MemoryDeleted => write!(f, "memory_deleted"),
        }
    }
}

impl std::str::FromStr for SyncEventType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "memory_added" => Ok(Self::MemoryAdded),
            "memory_updated" => Ok(Self::MemoryUpdated),
            "memory_deleted" => Ok(Self::MemoryDeleted),
            other => Err(format!("unknown sync event type: {}", other)),
        }
    }
}

/// One create/update/delete notification
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncEvent {
    pub event_type: SyncEventType,
    pub memory_id: String,
    /// Originating agent; never notified of its own event
    pub agent_id: String,
    pub timestamp: DateTime<Utc>,
    /// Event-specific data (a record snapshot for broadcasts)
    #[serde(default)]
    pub payload: serde_json::Value,
    /// When set, fan-out is restricted to these subscribers
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_agents: Option<Vec<String>>,
}

impl SyncEvent {
    pub fn new(
        event_type: SyncEventType,
        memory_id: impl Into<String>,
        agent_id: impl Into<String>,
        payload: serde_json::Value,
    ) -> Self {
        Self {
            event_type,
            memory_id: memory_id.into(),
            agent_id: agent_id.into(),
            timestamp: Utc::now(),
            payload,
            target_agents: None,
        }
    }

    pub fn with_targets(mut self, targets: Vec<String>) -> Self {
        self.target_agents = Some(targets);
        self
    }

    /// Serialize for the wire.
    pub fn to_bytes(&self) -> crate::Result<Bytes> {
        Ok(Bytes::from(serde_json::to_vec(self)?))
    }

    /// Deserialize off the wire.
    pub fn from_bytes(bytes: &[u8]) -> crate::Result<Self> {
        Ok(serde_json::from_slice(bytes)?)
    }
}
