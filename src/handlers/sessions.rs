use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use garde::Validate;
use serde::{Deserialize, Serialize};
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::{
    error::{AppError, Result},
    models::session::{SessionStatus, SessionSummary},
    services::sessions as session_service,
    state::AppState,
};

/// The header carrying the creator token on creator-only requests.
pub const CREATOR_HEADER: &str = "x-creator-id";

/// Serializes `body` with sonic-rs into a JSON response.
pub(crate) fn json_response<T: Serialize>(status: StatusCode, body: &T) -> Result<Response> {
    let body = sonic_rs::to_string(body)
        .map_err(|e| AppError::Internal(format!("Response serialization failed: {}", e)))?;

    Ok((
        status,
        [(http::header::CONTENT_TYPE, "application/json")],
        body,
    )
        .into_response())
}

/// Reads the creator token from the request headers.
pub(crate) fn creator_id_from(headers: &HeaderMap) -> Result<String> {
    headers
        .get(CREATOR_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .ok_or_else(|| AppError::PermissionDenied("Missing creator token".to_string()))
}

/// The request payload for creating a session.
#[derive(Deserialize, Debug, Validate)]
pub struct CreateSessionRequest {
    #[garde(range(min = 2, max = 20))]
    pub max_participants: i32,
    #[garde(skip)]
    pub origin_country: Option<String>,
    #[garde(skip)]
    pub creator_name: Option<String>,
}

/// The response payload for listing sessions.
#[derive(Serialize)]
pub struct SessionListResponse {
    pub count: usize,
    pub sessions: Vec<SessionSummary>,
}

/// The response payload for a reveal.
#[derive(Serialize)]
pub struct RevealResponse {
    pub session_id: Uuid,
    pub status: SessionStatus,
    pub completed_at: Option<DateTime<Utc>>,
    pub message: &'static str,
}

/// The query parameters for listing sessions.
#[derive(Deserialize)]
pub struct ListSessionsQuery {
    /// Comma-separated session IDs.
    #[serde(default)]
    pub ids: Option<String>,
}

fn parse_ids(raw: &str) -> Result<Vec<Uuid>> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| {
            Uuid::parse_str(s)
                .map_err(|_| AppError::Validation(format!("Invalid session id: {}", s)))
        })
        .collect()
}

/// Creates a new session.
#[axum::debug_handler]
pub async fn create_session(
    State(state): State<AppState>,
    Json(req): Json<CreateSessionRequest>,
) -> Result<Response> {
    req.validate()?;

    let created = session_service::create_session(
        &state,
        req.max_participants,
        req.origin_country,
        req.creator_name,
    )
    .await?;

    json_response(StatusCode::CREATED, &created)
}

/// Lists summaries of the requested sessions.
#[axum::debug_handler]
pub async fn list_sessions(
    State(state): State<AppState>,
    Query(query): Query<ListSessionsQuery>,
) -> Result<Response> {
    let ids = match query.ids.as_deref() {
        Some(raw) => parse_ids(raw)?,
        None => Vec::new(),
    };

    let sessions = session_service::list_sessions(&state, &ids).await?;

    json_response(StatusCode::OK, &SessionListResponse {
        count: sessions.len(),
        sessions,
    })
}

/// Gets a session with its participants and ballots.
#[axum::debug_handler]
pub async fn get_session(
    State(state): State<AppState>,
    Path(session_id): Path<Uuid>,
) -> Result<Response> {
    let view = session_service::get_session(&state, session_id)
        .await?
        .ok_or_else(|| AppError::NotFound("Session not found".to_string()))?;

    json_response(StatusCode::OK, &view)
}

/// Gets the current ranking of a session.
#[axum::debug_handler]
pub async fn get_results(
    State(state): State<AppState>,
    Path(session_id): Path<Uuid>,
) -> Result<Response> {
    let results = session_service::get_results(&state, session_id)
        .await?
        .ok_or_else(|| AppError::NotFound("Session not found".to_string()))?;

    json_response(StatusCode::OK, &results)
}

/// Reveals the results of a session. Creator only.
#[axum::debug_handler]
pub async fn reveal_results(
    State(state): State<AppState>,
    Path(session_id): Path<Uuid>,
    headers: HeaderMap,
) -> Result<Response> {
    let creator_id = creator_id_from(&headers)?;

    let session = session_service::reveal_results(&state, session_id, &creator_id).await?;

    json_response(StatusCode::OK, &RevealResponse {
        session_id: session.id,
        status: session.status,
        completed_at: session.completed_at,
        message: "Results revealed",
    })
}
