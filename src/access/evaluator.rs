//! Access control evaluator
//!
//! Pure decision function over a record's sharing metadata and a
//! requesting agent identity. The only I/O is read-only: the
//! CATEGORY_SHARED branch needs one extra store lookup to learn whether
//! the requester owns a record in the target's category. Store failures
//! propagate as errors — an unreachable store is never treated as
//! "allowed".
//!
//! Category co-ownership and the CUSTOM whitelist are deliberately two
//! distinct membership tests; no unified rule exists between them.

use crate::record::{QueryOrder, RecordFilter, RecordStore, SharingPolicy};
use crate::record::types::MemoryRecord;
use crate::Result;
use serde::{Serialize, Serializer};
use std::collections::HashSet;
use std::sync::Arc;

/// Why an access decision came out the way it did
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AccessReason {
    Owner,
    PrivateMemory,
    PublicMemory,
    CategoryShared(String),
    CategoryNotShared,
    CustomWhitelist,
    NotInCustomList,
    UnknownPolicy,
}

impl std::fmt::Display for AccessReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Owner => write!(f, "owner"),
            Self::PrivateMemory => write!(f, "private_memory"),
            Self::PublicMemory => write!(f, "public_memory"),
            Self::CategoryShared(category) => write!(f, "category_shared:{}", category),
            Self::CategoryNotShared => write!(f, "category_not_shared"),
            Self::CustomWhitelist => write!(f, "custom_whitelist"),
            Self::NotInCustomList => write!(f, "not_in_custom_list"),
            Self::UnknownPolicy => write!(f, "unknown_policy"),
        }
    }
}

impl Serialize for AccessReason {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// Outcome of an access check
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AccessDecision {
    pub allowed: bool,
    pub reason: AccessReason,
}

impl AccessDecision {
    fn allowed(reason: AccessReason) -> Self {
        Self {
            allowed: true,
            reason,
        }
    }

    fn denied(reason: AccessReason) -> Self {
        Self {
            allowed: false,
            reason,
        }
    }
}

/// Per-record access-control policy engine
pub struct AccessEvaluator {
    store: Arc<dyn RecordStore>,
}

impl AccessEvaluator {
    pub fn new(store: Arc<dyn RecordStore>) -> Self {
        Self { store }
    }

    /// Decide whether `agent_id` may access the record `memory_id`.
    ///
    /// Fails with `Error::NotFound` when the record is absent and with
    /// the underlying store error when the lookup itself fails.
    pub async fn can_access(&self, memory_id: &str, agent_id: &str) -> Result<AccessDecision> {
        let record = self
            .store
            .get(memory_id)
            .await?
            .ok_or_else(|| crate::Error::NotFound(format!("Memory {} not found", memory_id)))?;

        if record.is_owned_by(agent_id) {
            return Ok(AccessDecision::allowed(AccessReason::Owner));
        }

        match record.sharing.policy {
            SharingPolicy::Private => Ok(AccessDecision::denied(AccessReason::PrivateMemory)),
            SharingPolicy::Shared => Ok(AccessDecision::allowed(AccessReason::PublicMemory)),
            SharingPolicy::CategoryShared => {
                if self.owns_in_category(agent_id, &record.category).await? {
                    Ok(AccessDecision::allowed(AccessReason::CategoryShared(
                        record.category.clone(),
                    )))
                } else {
                    Ok(AccessDecision::denied(AccessReason::CategoryNotShared))
                }
            }
            SharingPolicy::Custom => {
                if record.sharing.allowed_agents.contains(agent_id) {
                    Ok(AccessDecision::allowed(AccessReason::CustomWhitelist))
                } else {
                    Ok(AccessDecision::denied(AccessReason::NotInCustomList))
                }
            }
            // Fail closed on policy values this build does not know
            SharingPolicy::Unknown => Ok(AccessDecision::denied(AccessReason::UnknownPolicy)),
        }
    }

    /// List memories visible to `agent_id`: the same four-way policy logic
    /// applied as a single filter predicate, ordered by `created_at`
    /// descending, capped at `limit`.
    pub async fn get_shared(&self, agent_id: &str, limit: usize) -> Result<Vec<MemoryRecord>> {
        // One lookup for the requester's owned categories, then the
        // predicate is pure.
        let owned_categories = self.owned_categories(agent_id).await?;

        let all = self
            .store
            .query(RecordFilter::default(), QueryOrder::CreatedDesc, usize::MAX)
            .await?;

        let mut visible: Vec<MemoryRecord> = all
            .into_iter()
            .filter(|record| Self::visible_to(record, agent_id, &owned_categories))
            .collect();
        visible.truncate(limit);
        Ok(visible)
    }

    fn visible_to(
        record: &MemoryRecord,
        agent_id: &str,
        owned_categories: &HashSet<String>,
    ) -> bool {
        if record.is_owned_by(agent_id) {
            return true;
        }
        match record.sharing.policy {
            SharingPolicy::Private | SharingPolicy::Unknown => false,
            SharingPolicy::Shared => true,
            SharingPolicy::CategoryShared => owned_categories.contains(&record.category),
            SharingPolicy::Custom => record.sharing.allowed_agents.contains(agent_id),
        }
    }

    async fn owns_in_category(&self, agent_id: &str, category: &str) -> Result<bool> {
        let owned = self
            .store
            .query(
                RecordFilter::default().owner(agent_id).category(category),
                QueryOrder::CreatedDesc,
                1,
            )
            .await?;
        Ok(!owned.is_empty())
    }

    async fn owned_categories(&self, agent_id: &str) -> Result<HashSet<String>> {
        let owned = self
            .store
            .query(
                RecordFilter::default().owner(agent_id),
                QueryOrder::CreatedDesc,
                usize::MAX,
            )
            .await?;
        Ok(owned.into_iter().map(|r| r.category).collect())
    }
}
