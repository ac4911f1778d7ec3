use chrono::Utc;
use uuid::Uuid;

use crate::{
    error::{AppError, Result},
    events::SessionEventKind,
    models::{
        participant::{Participant, ParticipantStatus},
        session::SessionStatus,
    },
    services::sessions::require_creator,
    state::AppState,
    store::StoreTx,
    validation::session::validate_username,
};

/// Loads a participant and checks that it belongs to `session_id`.
async fn participant_in_session(
    tx: &mut dyn StoreTx,
    session_id: Uuid,
    participant_id: Uuid,
) -> Result<Participant> {
    tx.get_participant(participant_id)
        .await?
        .filter(|p| p.session_id == session_id)
        .ok_or_else(|| AppError::NotFound("Participant not found".to_string()))
}

/// Adds a participant to a session.
///
/// The capacity check and the insert run under the session lock, so
/// concurrent joins can never overrun the cap. The join that fills the
/// session moves it from `waiting` to `voting`.
///
/// # Arguments
///
/// * `state` - The application state.
/// * `session_id` - The ID of the session to join.
/// * `username` - The display name; unique case-insensitively in the session.
///
/// # Returns
///
/// A `Result` containing the new `Participant`.
pub async fn join(state: &AppState, session_id: Uuid, username: &str) -> Result<Participant> {
    let username = validate_username(username)?;

    let mut tx = state.store.begin().await?;

    let session = tx
        .lock_session(session_id)
        .await?
        .ok_or_else(|| AppError::NotFound("Session not found".to_string()))?;

    let existing = tx.participants_by_session(session_id).await?;

    if existing.iter().any(|p| p.has_username(&username)) {
        return Err(AppError::Conflict("Username already taken".to_string()));
    }

    if session.is_completed() {
        return Err(AppError::PreconditionFailed(
            "Session already completed".to_string(),
        ));
    }

    if existing.len() >= session.max_participants as usize {
        return Err(AppError::PreconditionFailed("Session is full".to_string()));
    }

    let participant = Participant {
        id: Uuid::new_v4(),
        session_id,
        username,
        has_voted: false,
        joined_at: Utc::now(),
    };
    tx.insert_participant(&participant).await?;

    let filled = existing.len() + 1 >= session.max_participants as usize;
    let flip_to_voting = filled && session.status.can_advance_to(SessionStatus::Voting);
    if flip_to_voting {
        tx.update_session_status(session_id, SessionStatus::Voting, None)
            .await?;
    }

    tx.commit().await?;

    tracing::info!(
        "👋 {} joined session {} ({}/{})",
        participant.username,
        session_id,
        existing.len() + 1,
        session.max_participants
    );
    state.events.publish(session_id, SessionEventKind::ParticipantJoined);

    if flip_to_voting {
        tracing::info!("🗳️ Session {} is full, voting open", session_id);
        state.events.publish(session_id, SessionEventKind::StatusChanged);
    }

    Ok(participant)
}

/// Removes a participant and their ballot. Creator only.
///
/// # Arguments
///
/// * `state` - The application state.
/// * `session_id` - The ID of the session.
/// * `participant_id` - The participant to remove.
/// * `creator_id` - The caller's creator token.
pub async fn remove(
    state: &AppState,
    session_id: Uuid,
    participant_id: Uuid,
    creator_id: &str,
) -> Result<()> {
    let mut tx = state.store.begin().await?;

    let session = tx
        .lock_session(session_id)
        .await?
        .ok_or_else(|| AppError::NotFound("Session not found".to_string()))?;

    require_creator(&session, creator_id, "remove participants")?;

    let participant = participant_in_session(tx.as_mut(), session_id, participant_id).await?;

    let vote = tx.vote_by_participant(participant.id).await?;
    if let Some(vote) = vote {
        tx.delete_vote(vote.id).await?;
    }
    tx.delete_participant(participant.id).await?;
    tx.commit().await?;

    tracing::info!(
        "🗑️ {} removed from session {}",
        participant.username,
        session_id
    );
    state.events.publish(session_id, SessionEventKind::ParticipantRemoved);

    Ok(())
}

/// Clears a participant's ballot so they can vote again. Creator only, and
/// only before the results are revealed.
///
/// The vote row is deleted together with the `has_voted` flag so the
/// ranking never counts a reset ballot.
pub async fn reset_vote(
    state: &AppState,
    session_id: Uuid,
    participant_id: Uuid,
    creator_id: &str,
) -> Result<()> {
    let mut tx = state.store.begin().await?;

    let session = tx
        .lock_session(session_id)
        .await?
        .ok_or_else(|| AppError::NotFound("Session not found".to_string()))?;

    require_creator(&session, creator_id, "reset votes")?;

    if session.is_completed() {
        return Err(AppError::PreconditionFailed(
            "Cannot reset votes after results are revealed".to_string(),
        ));
    }

    let participant = participant_in_session(tx.as_mut(), session_id, participant_id).await?;

    let vote = tx.vote_by_participant(participant.id).await?;
    if let Some(vote) = vote {
        tx.delete_vote(vote.id).await?;
    }
    tx.set_has_voted(participant.id, false).await?;
    tx.commit().await?;

    tracing::info!(
        "↩️ Vote of {} reset in session {}",
        participant.username,
        session_id
    );
    state.events.publish(session_id, SessionEventKind::VoteReset);

    Ok(())
}

/// Gets a participant's voting status.
///
/// # Returns
///
/// `Ok(None)` when the participant does not exist (never joined or removed).
pub async fn get_status(state: &AppState, participant_id: Uuid) -> Result<Option<ParticipantStatus>> {
    let mut tx = state.store.begin().await?;
    let participant = tx.get_participant(participant_id).await?;
    Ok(participant.as_ref().map(ParticipantStatus::from))
}
