//! Memory record schema shared by every subsystem
//!
//! A record carries three independent metadata sub-structures — sharing,
//! summarization state, and conflict state — and every mutation goes
//! through a typed `MetadataPatch` that only touches the sub-structures
//! it names. Unrelated metadata surviving a merge is therefore a property
//! of the types, not a runtime convention.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Access rule attached to a record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SharingPolicy {
    Private,
    Shared,
    CategoryShared,
    Custom,
    /// Policy value this build does not recognize. Deserializing stored
    /// data never fails on it; the evaluator treats it as PRIVATE.
    #[serde(other)]
    Unknown,
}

impl std::fmt::Display for SharingPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Private => write!(f, "private"),
            Self::Shared => write!(f, "shared"),
            Self::CategoryShared => write!(f, "category_shared"),
            Self::Custom => write!(f, "custom"),
            Self::Unknown => write!(f, "unknown"),
        }
    }
}

impl std::str::FromStr for SharingPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "private" => Ok(Self::Private),
            "shared" => Ok(Self::Shared),
            "category_shared" => Ok(Self::CategoryShared),
            "custom" => Ok(Self::Custom),
            other => Err(format!("unknown sharing policy: {}", other)),
        }
    }
}

/// Sharing metadata: the policy plus the CUSTOM whitelist.
///
/// `allowed_agents` may be empty under CUSTOM, meaning "no one but the
/// owner". Non-CUSTOM policies ignore it entirely.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SharingMeta {
    pub policy: SharingPolicy,
    #[serde(default)]
    pub allowed_agents: HashSet<String>,
}

impl Default for SharingMeta {
    fn default() -> Self {
        Self {
            policy: SharingPolicy::Private,
            allowed_agents: HashSet::new(),
        }
    }
}

impl SharingMeta {
    pub fn private() -> Self {
        Self::default()
    }

    pub fn shared() -> Self {
        Self {
            policy: SharingPolicy::Shared,
            allowed_agents: HashSet::new(),
        }
    }

    pub fn category_shared() -> Self {
        Self {
            policy: SharingPolicy::CategoryShared,
            allowed_agents: HashSet::new(),
        }
    }

    pub fn custom(allowed_agents: impl IntoIterator<Item = String>) -> Self {
        Self {
            policy: SharingPolicy::Custom,
            allowed_agents: allowed_agents.into_iter().collect(),
        }
    }
}

/// Summarization state, set only by the lifecycle manager.
/// Monotonic: once `summarized` is true it is never un-set here
/// (explicit restore is out of scope).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SummarizationState {
    pub summarized: bool,
    pub original_length: Option<u64>,
    pub summary_date: Option<DateTime<Utc>>,
}

/// How a detected divergence was reconciled
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolutionStrategy {
    KeepNewest,
    Merge,
    Manual,
}

impl std::fmt::Display for ResolutionStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::KeepNewest => write!(f, "keep_newest"),
            Self::Merge => write!(f, "merge"),
            Self::Manual => write!(f, "manual"),
        }
    }
}

impl std::str::FromStr for ResolutionStrategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "keep_newest" => Ok(Self::KeepNewest),
            "merge" => Ok(Self::Merge),
            "manual" => Ok(Self::Manual),
            other => Err(format!("Unknown resolution strategy: {}", other)),
        }
    }
}

/// Conflict state, set only by the conflict resolver (the write path may
/// flip `resolved` to false when it detects a version race).
///
/// `resolved = true` with no strategy means nothing is outstanding.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConflictState {
    pub resolved: bool,
    pub strategy: Option<ResolutionStrategy>,
    pub resolved_at: Option<DateTime<Utc>>,
}

impl Default for ConflictState {
    fn default() -> Self {
        Self {
            resolved: true,
            strategy: None,
            resolved_at: None,
        }
    }
}

impl ConflictState {
    /// An unreconciled divergence the lifecycle scan should hand to the
    /// resolver.
    pub fn is_open(&self) -> bool {
        !self.resolved
    }

    pub fn open() -> Self {
        Self {
            resolved: false,
            strategy: None,
            resolved_at: None,
        }
    }
}

/// The central entity: one shared memory record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryRecord {
    /// Globally unique, immutable after creation
    pub id: String,
    pub title: String,
    /// The field subject to summarization/compaction
    pub content: String,
    /// The agent that created the record; ownership never transfers
    pub owner_agent_id: String,
    /// Label used for category-scoped sharing and sync filtering
    pub category: String,
    #[serde(default)]
    pub sharing: SharingMeta,
    #[serde(default)]
    pub summarization: SummarizationState,
    #[serde(default)]
    pub conflict: ConflictState,
    /// Provenance for records produced by bulk sync
    #[serde(default)]
    pub synced_from: Option<String>,
    #[serde(default)]
    pub synced_at: Option<DateTime<Utc>>,
    /// Optimistic-concurrency counter; bumped on every successful mutation
    #[serde(default)]
    pub version: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl MemoryRecord {
    /// Create a new record owned by `owner_agent_id` with PRIVATE sharing.
    pub fn new(
        owner_agent_id: impl Into<String>,
        title: impl Into<String>,
        content: impl Into<String>,
        category: impl Into<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: format!("mem-{}", uuid::Uuid::new_v4()),
            title: title.into(),
            content: content.into(),
            owner_agent_id: owner_agent_id.into(),
            category: category.into(),
            sharing: SharingMeta::default(),
            summarization: SummarizationState::default(),
            conflict: ConflictState::default(),
            synced_from: None,
            synced_at: None,
            version: 0,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn with_sharing(mut self, sharing: SharingMeta) -> Self {
        self.sharing = sharing;
        self
    }

    pub fn is_owned_by(&self, agent_id: &str) -> bool {
        self.owner_agent_id == agent_id
    }

    /// Bump `updated_at` (never backwards) and the version counter.
    pub fn touch(&mut self) {
        let now = Utc::now();
        if now > self.updated_at {
            self.updated_at = now;
        }
        self.version += 1;
    }
}

/// Typed metadata merge: only the sub-structures present on the patch are
/// replaced, so a sharing update can never clobber summarization state and
/// vice versa.
#[derive(Debug, Clone, Default)]
pub struct MetadataPatch {
    pub sharing: Option<SharingMeta>,
    pub summarization: Option<SummarizationState>,
    pub conflict: Option<ConflictState>,
    /// When set, the merge fails with `Error::Conflict` unless the stored
    /// record is still at this version.
    pub expected_version: Option<u64>,
}

impl MetadataPatch {
    pub fn sharing(meta: SharingMeta) -> Self {
        Self {
            sharing: Some(meta),
            ..Default::default()
        }
    }

    pub fn summarization(state: SummarizationState) -> Self {
        Self {
            summarization: Some(state),
            ..Default::default()
        }
    }

    pub fn conflict(state: ConflictState) -> Self {
        Self {
            conflict: Some(state),
            ..Default::default()
        }
    }

    pub fn with_expected_version(mut self, version: u64) -> Self {
        self.expected_version = Some(version);
        self
    }

    /// Apply to a record in place. Does not touch timestamps or version;
    /// the store does that on successful merge.
    pub fn apply(&self, record: &mut MemoryRecord) {
        if let Some(sharing) = &self.sharing {
            record.sharing = sharing.clone();
        }
        if let Some(summarization) = &self.summarization {
            record.summarization = summarization.clone();
        }
        if let Some(conflict) = &self.conflict {
            record.conflict = conflict.clone();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_record_defaults() {
        let record = MemoryRecord::new("agentA", "title", "content", "trading");
        assert!(record.id.starts_with("mem-"));
        assert_eq!(record.owner_agent_id, "agentA");
        assert_eq!(record.sharing.policy, SharingPolicy::Private);
        assert!(!record.summarization.summarized);
        assert!(record.conflict.resolved);
        assert!(!record.conflict.is_open());
        assert_eq!(record.version, 0);
        assert_eq!(record.created_at, record.updated_at);
    }

    #[test]
    fn test_touch_bumps_version_and_updated_at() {
        let mut record = MemoryRecord::new("agentA", "t", "c", "cat");
        let created = record.created_at;
        record.touch();
        assert_eq!(record.version, 1);
        assert!(record.updated_at >= created);
    }

    #[test]
    fn test_policy_round_trip() {
        for policy in ["private", "shared", "category_shared", "custom"] {
            let parsed: SharingPolicy = policy.parse().unwrap();
            assert_eq!(parsed.to_string(), policy);
        }
        assert!("friends_only".parse::<SharingPolicy>().is_err());
    }

    #[test]
    fn test_unknown_policy_deserializes_closed() {
        // Stored data written by a newer build must not fail to load
        let json = r#"{"policy": "quantum_shared", "allowed_agents": []}"#;
        let meta: SharingMeta = serde_json::from_str(json).unwrap();
        assert_eq!(meta.policy, SharingPolicy::Unknown);
    }

    #[test]
    fn test_strategy_parse() {
        assert_eq!(
            "keep_newest".parse::<ResolutionStrategy>().unwrap(),
            ResolutionStrategy::KeepNewest
        );
        let err = "bogus_strategy".parse::<ResolutionStrategy>().unwrap_err();
        assert_eq!(err, "Unknown resolution strategy: bogus_strategy");
    }

    #[test]
    fn test_patch_touches_only_named_substructures() {
        let mut record = MemoryRecord::new("agentA", "t", "c", "cat");
        record.summarization = SummarizationState {
            summarized: true,
            original_length: Some(4096),
            summary_date: Some(Utc::now()),
        };

        let patch = MetadataPatch::sharing(SharingMeta::shared());
        patch.apply(&mut record);

        assert_eq!(record.sharing.policy, SharingPolicy::Shared);
        // Unrelated metadata survives the merge
        assert!(record.summarization.summarized);
        assert_eq!(record.summarization.original_length, Some(4096));
        assert!(record.conflict.resolved);
    }

    #[test]
    fn test_record_serde_round_trip() {
        let record = MemoryRecord::new("agentA", "notes", "the content", "trading")
            .with_sharing(SharingMeta::custom(["agentB".to_string()]));
        let json = serde_json::to_string(&record).unwrap();
        let parsed: MemoryRecord = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, record);
        assert!(parsed.sharing.allowed_agents.contains("agentB"));
    }
}
