//! Wire types for the memory API
//!
//! Request bodies use camelCase JSON. Responses are the uniform
//! `Outcome` envelope serialized as-is.

use serde::Deserialize;

/// Sharing stamp supplied at creation or via the sharing endpoint
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SharingSpec {
    pub policy: String,
    #[serde(default)]
    pub allowed_agents: Vec<String>,
}

/// Request body for creating a memory
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateMemoryRequest {
    pub owner_agent_id: String,
    pub title: String,
    pub content: String,
    pub category: String,
    #[serde(default)]
    pub sharing: Option<SharingSpec>,
}

/// Request body for replacing a memory's content
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateMemoryRequest {
    pub agent_id: String,
    pub content: String,
    #[serde(default)]
    pub expected_version: Option<u64>,
}

/// Request body for changing a memory's sharing policy
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SetSharingRequest {
    pub agent_id: String,
    pub policy: String,
    #[serde(default)]
    pub allowed_agents: Vec<String>,
}

/// Request body for creating a shared space
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateSpaceRequest {
    pub owner_agent_id: String,
    pub name: String,
    #[serde(default)]
    pub member_agents: Vec<String>,
    #[serde(default)]
    pub description: Option<String>,
}

/// Request body for resolving a conflict
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolveConflictRequest {
    #[serde(default)]
    pub conflict_data: serde_json::Value,
    pub strategy: String,
}

/// Request body for an aged-record summarization scan
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SummarizeRequest {
    pub age_days: i64,
    pub min_length: usize,
    #[serde(default)]
    pub dry_run: bool,
}

/// Request body for a per-category summarization scan
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SummarizeCategoryRequest {
    pub category: String,
}

/// Request body for a bulk agent-state sync
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncRequest {
    pub source_agent_id: String,
    pub target_agent_id: String,
    #[serde(default)]
    pub category: Option<String>,
}

/// Request body for a targeted snapshot broadcast
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BroadcastRequest {
    pub agent_id: String,
    pub update_type: String,
    #[serde(default)]
    pub target_agents: Option<Vec<String>>,
}

/// Query parameters naming the requesting agent
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentQuery {
    pub agent_id: String,
}

/// Query parameters for the shared-memory listing
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SharedQuery {
    pub agent_id: String,
    #[serde(default)]
    pub limit: Option<usize>,
}
