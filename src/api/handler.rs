//! HTTP handlers for the memory API
//!
//! REST surface over the coordinator:
//! - POST   /api/v1/memories                — create memory
//! - PUT    /api/v1/memories/:id            — replace content
//! - DELETE /api/v1/memories/:id            — delete (agentId query)
//! - GET    /api/v1/memories/:id/access     — access decision
//! - PUT    /api/v1/memories/:id/sharing    — set sharing policy
//! - POST   /api/v1/memories/:id/conflict   — resolve conflict
//! - POST   /api/v1/memories/:id/broadcast  — snapshot broadcast
//! - GET    /api/v1/memories/shared         — memories visible to agent
//! - GET    /api/v1/memories/sharing/stats  — sharing statistics
//! - POST   /api/v1/spaces                  — create shared space
//! - POST   /api/v1/sync                    — bulk agent-state sync
//! - POST   /api/v1/summarize               — aged-record scan
//! - POST   /api/v1/summarize/category      — per-category scan
//! - GET    /api/v1/summarize/stats         — summarization statistics
//!
//! Every response body is the uniform envelope; status codes follow the
//! envelope (`success` 200/201, `not_found` 404, `error` 400).

use super::types::*;
use crate::coordinator::MemoryCoordinator;
use crate::outcome::Outcome;
use crate::record::SharingMeta;
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post, put},
    Json, Router,
};
use serde::Serialize;
use std::sync::Arc;
use tower_http::trace::TraceLayer;

/// Shared state for memory API handlers
#[derive(Clone)]
pub struct MemoryApiState {
    pub coordinator: Arc<MemoryCoordinator>,
}

/// Create the memory router with all REST endpoints
pub fn memory_router(state: MemoryApiState) -> Router {
    Router::new()
        .route("/api/v1/memories", post(create_memory))
        .route("/api/v1/memories/shared", get(get_shared))
        .route("/api/v1/memories/sharing/stats", get(sharing_stats))
        .route(
            "/api/v1/memories/:id",
            put(update_memory).delete(delete_memory),
        )
        .route("/api/v1/memories/:id/access", get(can_access))
        .route("/api/v1/memories/:id/sharing", put(set_sharing))
        .route("/api/v1/memories/:id/conflict", post(resolve_conflict))
        .route("/api/v1/memories/:id/broadcast", post(broadcast_update))
        .route("/api/v1/spaces", post(create_space))
        .route("/api/v1/sync", post(sync_agent_state))
        .route("/api/v1/summarize", post(summarize_old))
        .route("/api/v1/summarize/category", post(summarize_category))
        .route("/api/v1/summarize/stats", get(summarize_stats))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Envelope → status code mapping
fn respond<T: Serialize>(outcome: Outcome<T>, success: StatusCode) -> impl IntoResponse {
    let status = match &outcome {
        Outcome::Success { .. } => success,
        Outcome::NotFound { .. } => StatusCode::NOT_FOUND,
        Outcome::Error { .. } => StatusCode::BAD_REQUEST,
    };
    (status, Json(serde_json::to_value(outcome).unwrap_or_default()))
}

// =============================================================================
// Handlers
// =============================================================================

/// POST /api/v1/memories
async fn create_memory(
    State(state): State<MemoryApiState>,
    Json(request): Json<CreateMemoryRequest>,
) -> impl IntoResponse {
    let sharing = match request.sharing {
        Some(spec) => match spec.policy.parse() {
            Ok(policy) => Some(SharingMeta {
                policy,
                allowed_agents: spec.allowed_agents.into_iter().collect(),
            }),
            Err(e) => {
                return respond(Outcome::<()>::error(e), StatusCode::CREATED).into_response()
            }
        },
        None => None,
    };

    respond(
        state
            .coordinator
            .add_memory(
                &request.owner_agent_id,
                &request.title,
                &request.content,
                &request.category,
                sharing,
            )
            .await,
        StatusCode::CREATED,
    )
    .into_response()
}

/// PUT /api/v1/memories/:id
async fn update_memory(
    State(state): State<MemoryApiState>,
    Path(id): Path<String>,
    Json(request): Json<UpdateMemoryRequest>,
) -> impl IntoResponse {
    respond(
        state
            .coordinator
            .update_memory(
                &id,
                &request.agent_id,
                &request.content,
                request.expected_version,
            )
            .await,
        StatusCode::OK,
    )
}

/// DELETE /api/v1/memories/:id
async fn delete_memory(
    State(state): State<MemoryApiState>,
    Path(id): Path<String>,
    Query(query): Query<AgentQuery>,
) -> impl IntoResponse {
    respond(
        state.coordinator.delete_memory(&id, &query.agent_id).await,
        StatusCode::OK,
    )
}

/// GET /api/v1/memories/:id/access
async fn can_access(
    State(state): State<MemoryApiState>,
    Path(id): Path<String>,
    Query(query): Query<AgentQuery>,
) -> impl IntoResponse {
    respond(
        state.coordinator.can_access(&id, &query.agent_id).await,
        StatusCode::OK,
    )
}

/// PUT /api/v1/memories/:id/sharing
async fn set_sharing(
    State(state): State<MemoryApiState>,
    Path(id): Path<String>,
    Json(request): Json<SetSharingRequest>,
) -> impl IntoResponse {
    respond(
        state
            .coordinator
            .set_sharing(
                &id,
                &request.agent_id,
                &request.policy,
                request.allowed_agents,
            )
            .await,
        StatusCode::OK,
    )
}

/// POST /api/v1/memories/:id/conflict
async fn resolve_conflict(
    State(state): State<MemoryApiState>,
    Path(id): Path<String>,
    Json(request): Json<ResolveConflictRequest>,
) -> impl IntoResponse {
    respond(
        state
            .coordinator
            .resolve_conflict(&id, request.conflict_data, &request.strategy)
            .await,
        StatusCode::OK,
    )
}

/// POST /api/v1/memories/:id/broadcast
async fn broadcast_update(
    State(state): State<MemoryApiState>,
    Path(id): Path<String>,
    Json(request): Json<BroadcastRequest>,
) -> impl IntoResponse {
    let update_type = match request.update_type.parse() {
        Ok(update_type) => update_type,
        Err(e) => return respond(Outcome::<()>::error(e), StatusCode::OK).into_response(),
    };
    respond(
        state
            .coordinator
            .broadcast_memory_update(&id, update_type, &request.agent_id, request.target_agents)
            .await,
        StatusCode::OK,
    )
    .into_response()
}

/// GET /api/v1/memories/shared
async fn get_shared(
    State(state): State<MemoryApiState>,
    Query(query): Query<SharedQuery>,
) -> impl IntoResponse {
    let limit = query.limit.unwrap_or(50).clamp(1, 500);
    respond(
        state.coordinator.get_shared(&query.agent_id, limit).await,
        StatusCode::OK,
    )
}

/// GET /api/v1/memories/sharing/stats
async fn sharing_stats(State(state): State<MemoryApiState>) -> impl IntoResponse {
    respond(state.coordinator.get_sharing_stats().await, StatusCode::OK)
}

/// POST /api/v1/spaces
async fn create_space(
    State(state): State<MemoryApiState>,
    Json(request): Json<CreateSpaceRequest>,
) -> impl IntoResponse {
    respond(
        state
            .coordinator
            .create_shared_space(
                &request.owner_agent_id,
                &request.name,
                request.member_agents,
                request.description,
            )
            .await,
        StatusCode::CREATED,
    )
}

/// POST /api/v1/sync
async fn sync_agent_state(
    State(state): State<MemoryApiState>,
    Json(request): Json<SyncRequest>,
) -> impl IntoResponse {
    respond(
        state
            .coordinator
            .sync_agent_state(
                &request.source_agent_id,
                &request.target_agent_id,
                request.category.as_deref(),
            )
            .await,
        StatusCode::OK,
    )
}

/// POST /api/v1/summarize
async fn summarize_old(
    State(state): State<MemoryApiState>,
    Json(request): Json<SummarizeRequest>,
) -> impl IntoResponse {
    respond(
        state
            .coordinator
            .summarize_old(request.age_days, request.min_length, request.dry_run)
            .await,
        StatusCode::OK,
    )
}

/// POST /api/v1/summarize/category
async fn summarize_category(
    State(state): State<MemoryApiState>,
    Json(request): Json<SummarizeCategoryRequest>,
) -> impl IntoResponse {
    respond(
        state
            .coordinator
            .summarize_by_category(&request.category)
            .await,
        StatusCode::OK,
    )
}

/// GET /api/v1/summarize/stats
async fn summarize_stats(State(state): State<MemoryApiState>) -> impl IntoResponse {
    respond(state.coordinator.summary_stats().await, StatusCode::OK)
}
