// SPDX-FileCopyrightText: 2026 Repflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! HTTP request handlers for the gateway REST API.
//!
//! Conversation and message CRUD, run requests, cancellation, and
//! resolution review. Core errors map onto HTTP statuses in
//! [`error_response`]; bodies carry the stable error kind tags.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use repflow_core::types::{
    ApprovalAction, ApprovalRecord, Channel, Conversation, ConversationStatus, MessageRole,
};
use repflow_core::RepflowError;
use repflow_workflow::engine::RunRequest;
use serde::{Deserialize, Serialize};

use crate::server::GatewayState;

/// Request body for POST /v1/conversations.
#[derive(Debug, Deserialize)]
pub struct ConversationCreateRequest {
    /// Representative starting the conversation.
    pub rep_id: String,
    /// Optional customer identifier.
    #[serde(default)]
    pub customer_id: Option<String>,
    /// Communication channel; defaults to chat.
    #[serde(default = "default_channel")]
    pub channel: Channel,
}

fn default_channel() -> Channel {
    Channel::Chat
}

/// Request body for PATCH /v1/conversations/{id}/status.
#[derive(Debug, Deserialize)]
pub struct StatusUpdateRequest {
    pub status: ConversationStatus,
}

/// Request body for POST /v1/conversations/{id}/messages.
#[derive(Debug, Deserialize)]
pub struct MessageCreateRequest {
    pub role: MessageRole,
    pub content: String,
}

/// Query parameters for GET /v1/conversations/{id}/messages.
#[derive(Debug, Deserialize)]
pub struct MessagesQuery {
    #[serde(default)]
    pub limit: Option<i64>,
}

/// Request body for POST /v1/conversations/{id}/runs.
#[derive(Debug, Deserialize)]
pub struct TriggerRunRequest {
    pub rep_id: String,
    #[serde(default)]
    pub force: bool,
}

/// Request body for POST /v1/resolutions/{id}/approval.
#[derive(Debug, Deserialize)]
pub struct ApprovalRequest {
    pub action: ApprovalAction,
    pub rep_id: String,
    #[serde(default)]
    pub feedback: Option<String>,
    #[serde(default)]
    pub edited_text: Option<String>,
}

/// Response body for cancellation requests.
#[derive(Debug, Serialize)]
pub struct CancelResponse {
    /// Whether an in-flight run was signalled.
    pub cancelled: bool,
}

/// Error response body.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    /// Human-readable error description.
    pub error: String,
    /// Stable error kind tag, when one applies.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
}

/// Response body for GET /health.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub uptime_secs: u64,
}

/// Maps a core error onto an HTTP response.
pub fn error_response(err: RepflowError) -> Response {
    let status = match &err {
        RepflowError::ConversationNotFound { .. } | RepflowError::ResolutionNotFound { .. } => {
            StatusCode::NOT_FOUND
        }
        RepflowError::RunInProgress { .. } | RepflowError::InvalidState { .. } => {
            StatusCode::CONFLICT
        }
        RepflowError::Config(_) => StatusCode::UNPROCESSABLE_ENTITY,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    let body = ErrorResponse {
        error: err.to_string(),
        kind: err.failure_kind().map(|k| k.to_string()),
    };
    (status, Json(body)).into_response()
}

/// POST /v1/conversations
pub async fn post_conversations(
    State(state): State<GatewayState>,
    Json(body): Json<ConversationCreateRequest>,
) -> Response {
    let now = chrono::Utc::now().to_rfc3339();
    let conversation = Conversation {
        id: uuid::Uuid::new_v4().to_string(),
        rep_id: body.rep_id,
        customer_id: body.customer_id,
        channel: body.channel,
        status: ConversationStatus::Active,
        created_at: now.clone(),
        updated_at: now,
    };
    match state.storage.create_conversation(&conversation).await {
        Ok(()) => (StatusCode::CREATED, Json(conversation)).into_response(),
        Err(e) => error_response(e),
    }
}

/// GET /v1/conversations/{id}
pub async fn get_conversation(
    State(state): State<GatewayState>,
    Path(id): Path<String>,
) -> Response {
    match state.storage.get_conversation(&id).await {
        Ok(Some(conversation)) => Json(conversation).into_response(),
        Ok(None) => error_response(RepflowError::ConversationNotFound { id }),
        Err(e) => error_response(e),
    }
}

/// PATCH /v1/conversations/{id}/status
pub async fn patch_conversation_status(
    State(state): State<GatewayState>,
    Path(id): Path<String>,
    Json(body): Json<StatusUpdateRequest>,
) -> Response {
    match state.storage.get_conversation(&id).await {
        Ok(Some(_)) => {}
        Ok(None) => return error_response(RepflowError::ConversationNotFound { id }),
        Err(e) => return error_response(e),
    }
    match state
        .storage
        .update_conversation_status(&id, body.status)
        .await
    {
        Ok(()) => Json(serde_json::json!({
            "conversation_id": id,
            "status": body.status,
        }))
        .into_response(),
        Err(e) => error_response(e),
    }
}

/// POST /v1/conversations/{id}/messages
pub async fn post_messages(
    State(state): State<GatewayState>,
    Path(id): Path<String>,
    Json(body): Json<MessageCreateRequest>,
) -> Response {
    if body.content.trim().is_empty() {
        return error_response(RepflowError::Config(
            "message content must not be empty".into(),
        ));
    }
    match state.storage.get_conversation(&id).await {
        Ok(Some(_)) => {}
        Ok(None) => return error_response(RepflowError::ConversationNotFound { id }),
        Err(e) => return error_response(e),
    }
    match state
        .storage
        .append_message(&id, body.role, &body.content)
        .await
    {
        Ok(message) => (StatusCode::CREATED, Json(message)).into_response(),
        Err(e) => error_response(e),
    }
}

/// GET /v1/conversations/{id}/messages
pub async fn get_messages(
    State(state): State<GatewayState>,
    Path(id): Path<String>,
    Query(query): Query<MessagesQuery>,
) -> Response {
    match state.storage.get_messages(&id, query.limit).await {
        Ok(messages) => Json(messages).into_response(),
        Err(e) => error_response(e),
    }
}

/// POST /v1/conversations/{id}/runs
///
/// Returns 202 with `{run_id, status: "started" | "not_triggered"}`.
pub async fn post_runs(
    State(state): State<GatewayState>,
    Path(id): Path<String>,
    Json(body): Json<TriggerRunRequest>,
) -> Response {
    let request = RunRequest {
        conversation_id: id,
        rep_id: body.rep_id,
        force: body.force,
    };
    match state.engine.clone().start_run(request).await {
        Ok(receipt) => (StatusCode::ACCEPTED, Json(receipt)).into_response(),
        Err(e) => error_response(e),
    }
}

/// POST /v1/conversations/{id}/runs/cancel
pub async fn post_cancel_run(
    State(state): State<GatewayState>,
    Path(id): Path<String>,
) -> Response {
    let cancelled = state.engine.cancel_run(&id);
    Json(CancelResponse { cancelled }).into_response()
}

/// GET /v1/resolutions/{id}
pub async fn get_resolution(
    State(state): State<GatewayState>,
    Path(id): Path<String>,
) -> Response {
    match state.storage.get_resolution(&id).await {
        Ok(Some(resolution)) => Json(resolution).into_response(),
        Ok(None) => error_response(RepflowError::ResolutionNotFound { id }),
        Err(e) => error_response(e),
    }
}

/// GET /v1/conversations/{id}/resolutions
pub async fn list_resolutions(
    State(state): State<GatewayState>,
    Path(id): Path<String>,
) -> Response {
    match state.storage.list_resolutions(&id).await {
        Ok(resolutions) => Json(resolutions).into_response(),
        Err(e) => error_response(e),
    }
}

/// POST /v1/resolutions/{id}/approval
///
/// Records the representative's decision. Terminal: a second decision on
/// the same resolution returns 409.
pub async fn post_approval(
    State(state): State<GatewayState>,
    Path(id): Path<String>,
    Json(body): Json<ApprovalRequest>,
) -> Response {
    if body.action == ApprovalAction::Edit && body.edited_text.is_none() {
        return error_response(RepflowError::Config(
            "edit approvals require edited_text".into(),
        ));
    }
    let approval = ApprovalRecord {
        action: body.action,
        rep_id: body.rep_id,
        feedback: body.feedback,
        edited_text: body.edited_text,
        recorded_at: chrono::Utc::now().to_rfc3339(),
    };
    if let Err(e) = state.storage.record_approval(&id, &approval).await {
        return error_response(e);
    }
    match state.storage.get_resolution(&id).await {
        Ok(Some(resolution)) => Json(resolution).into_response(),
        Ok(None) => error_response(RepflowError::ResolutionNotFound { id }),
        Err(e) => error_response(e),
    }
}

/// GET /health (unauthenticated)
pub async fn get_public_health(State(state): State<GatewayState>) -> Response {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_secs: state.health.start_time.elapsed().as_secs(),
    })
    .into_response()
}

/// GET /metrics (unauthenticated, Prometheus text format)
pub async fn get_public_metrics(State(state): State<GatewayState>) -> Response {
    match &state.health.prometheus_render {
        Some(render) => render().into_response(),
        None => (StatusCode::NOT_FOUND, "metrics not enabled").into_response(),
    }
}
