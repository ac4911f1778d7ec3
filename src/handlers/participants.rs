use axum::{
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    response::Response,
    Json,
};
use garde::Validate;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    error::{AppError, Result},
    handlers::sessions::{creator_id_from, json_response},
    services::{participants as participant_service, votes as vote_service},
    state::AppState,
};

/// The request payload for joining a session.
#[derive(Deserialize, Debug, Validate)]
pub struct JoinSessionRequest {
    #[garde(length(chars, min = 2, max = 20))]
    pub username: String,
}

/// The request payload for submitting a ballot.
#[derive(Deserialize, Debug, Validate)]
pub struct SubmitVoteRequest {
    #[garde(length(min = 1, max = 5))]
    pub countries: Vec<String>,
}

/// A participant's ballot.
#[derive(Serialize)]
pub struct BallotResponse {
    pub participant_id: Uuid,
    pub countries: Vec<String>,
}

/// Joins a session.
#[axum::debug_handler]
pub async fn join_session(
    State(state): State<AppState>,
    Path(session_id): Path<Uuid>,
    Json(req): Json<JoinSessionRequest>,
) -> Result<Response> {
    req.validate()?;

    let participant = participant_service::join(&state, session_id, &req.username).await?;

    json_response(StatusCode::CREATED, &sonic_rs::json!({
        "participant_id": participant.id.to_string(),
        "session_id": participant.session_id.to_string(),
        "username": participant.username,
    }))
}

/// Removes a participant. Creator only.
#[axum::debug_handler]
pub async fn remove_participant(
    State(state): State<AppState>,
    Path((session_id, participant_id)): Path<(Uuid, Uuid)>,
    headers: HeaderMap,
) -> Result<Response> {
    let creator_id = creator_id_from(&headers)?;

    participant_service::remove(&state, session_id, participant_id, &creator_id).await?;

    json_response(StatusCode::OK, &sonic_rs::json!({
        "message": "Participant removed"
    }))
}

/// Resets a participant's ballot. Creator only.
#[axum::debug_handler]
pub async fn reset_vote(
    State(state): State<AppState>,
    Path((session_id, participant_id)): Path<(Uuid, Uuid)>,
    headers: HeaderMap,
) -> Result<Response> {
    let creator_id = creator_id_from(&headers)?;

    participant_service::reset_vote(&state, session_id, participant_id, &creator_id).await?;

    json_response(StatusCode::OK, &sonic_rs::json!({
        "message": "Vote reset"
    }))
}

/// Submits or replaces a participant's ballot.
#[axum::debug_handler]
pub async fn submit_vote(
    State(state): State<AppState>,
    Path((session_id, participant_id)): Path<(Uuid, Uuid)>,
    Json(req): Json<SubmitVoteRequest>,
) -> Result<Response> {
    req.validate()?;

    let vote = vote_service::submit(&state, session_id, participant_id, &req.countries).await?;

    json_response(StatusCode::OK, &BallotResponse {
        participant_id: vote.participant_id,
        countries: vote.countries,
    })
}

/// Gets a participant's voting status.
#[axum::debug_handler]
pub async fn get_participant_status(
    State(state): State<AppState>,
    Path(participant_id): Path<Uuid>,
) -> Result<Response> {
    let status = participant_service::get_status(&state, participant_id)
        .await?
        .ok_or_else(|| AppError::NotFound("Participant not found".to_string()))?;

    json_response(StatusCode::OK, &status)
}

/// Gets a participant's current ballot.
#[axum::debug_handler]
pub async fn get_vote(
    State(state): State<AppState>,
    Path(participant_id): Path<Uuid>,
) -> Result<Response> {
    let countries = vote_service::get_by_participant(&state, participant_id)
        .await?
        .ok_or_else(|| AppError::NotFound("No vote on record".to_string()))?;

    json_response(StatusCode::OK, &BallotResponse {
        participant_id,
        countries,
    })
}
