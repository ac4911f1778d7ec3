use std::collections::HashSet;

use chrono::Utc;
use uuid::Uuid;

use crate::{
    crypto::token,
    error::{AppError, Result},
    events::SessionEventKind,
    models::{
        participant::Participant,
        results::ResultsView,
        session::{CreatedSession, Session, SessionStatus, SessionSummary, SessionView},
    },
    services::scoring,
    state::AppState,
    validation::session::{normalize_country_code, validate_max_participants, validate_username},
};

/// Most sessions one history lookup may ask for.
pub const MAX_LIST_IDS: usize = 50;

/// Fails with `PermissionDenied` unless `creator_id` is the session's creator token.
pub(crate) fn require_creator(session: &Session, creator_id: &str, action: &str) -> Result<()> {
    if !token::creator_token_matches(creator_id, &session.creator_id) {
        tracing::warn!("🚫 Rejected {} on session {}: creator mismatch", action, session.id);
        return Err(AppError::PermissionDenied(format!(
            "Only the creator can {}",
            action
        )));
    }
    Ok(())
}

/// Creates a new session in the `waiting` state.
///
/// When `creator_name` is given the creator also joins as the first
/// participant under that name.
///
/// # Arguments
///
/// * `state` - The application state.
/// * `max_participants` - The participant cap, 2 to 20.
/// * `origin_country` - Optional ISO code of the country the group leaves from.
/// * `creator_name` - Optional display name for the creator.
///
/// # Returns
///
/// A `Result` containing the new session ID and the creator's private token.
pub async fn create_session(
    state: &AppState,
    max_participants: i32,
    origin_country: Option<String>,
    creator_name: Option<String>,
) -> Result<CreatedSession> {
    validate_max_participants(max_participants)?;

    let origin_country = origin_country
        .filter(|c| !c.trim().is_empty())
        .map(|c| normalize_country_code(&c))
        .transpose()?;
    let creator_name = creator_name
        .filter(|n| !n.trim().is_empty())
        .map(|n| validate_username(&n))
        .transpose()?;

    let now = Utc::now();
    let session = Session {
        id: Uuid::new_v4(),
        creator_id: token::generate_creator_token(),
        creator_name: creator_name.clone(),
        max_participants,
        status: SessionStatus::Waiting,
        created_at: now,
        completed_at: None,
        origin_country,
    };

    let creator_participant = creator_name.map(|username| Participant {
        id: Uuid::new_v4(),
        session_id: session.id,
        username,
        has_voted: false,
        joined_at: now,
    });

    let mut tx = state.store.begin().await?;
    tx.insert_session(&session).await?;
    if let Some(participant) = &creator_participant {
        tx.insert_participant(participant).await?;
    }
    tx.commit().await?;

    tracing::info!(
        "✅ Session {} created (max {} participants)",
        session.id,
        session.max_participants
    );
    state.events.publish(session.id, SessionEventKind::Created);
    if creator_participant.is_some() {
        state.events.publish(session.id, SessionEventKind::ParticipantJoined);
    }

    Ok(CreatedSession {
        session_id: session.id,
        creator_id: session.creator_id,
        participant_id: creator_participant.map(|p| p.id),
    })
}

/// Gets a session with its participants and ballots.
///
/// # Returns
///
/// `Ok(None)` when the session does not exist.
pub async fn get_session(state: &AppState, session_id: Uuid) -> Result<Option<SessionView>> {
    let mut tx = state.store.begin().await?;

    let Some(session) = tx.get_session(session_id).await? else {
        tracing::debug!("Session {} not found", session_id);
        return Ok(None);
    };
    let participants = tx.participants_by_session(session_id).await?;
    let votes = tx.votes_by_session(session_id).await?;

    Ok(Some(SessionView {
        session,
        participants,
        votes,
    }))
}

/// Summaries of the given sessions, in request order.
///
/// Unknown and repeated IDs are skipped.
pub async fn list_sessions(state: &AppState, session_ids: &[Uuid]) -> Result<Vec<SessionSummary>> {
    if session_ids.len() > MAX_LIST_IDS {
        return Err(AppError::Validation(format!(
            "At most {} sessions can be listed at once",
            MAX_LIST_IDS
        )));
    }

    let mut seen = HashSet::new();
    let ids: Vec<Uuid> = session_ids
        .iter()
        .copied()
        .filter(|id| seen.insert(*id))
        .collect();

    let mut tx = state.store.begin().await?;
    let sessions = tx.get_sessions(&ids).await?;

    let mut summaries = Vec::with_capacity(sessions.len());
    for id in &ids {
        let Some(session) = sessions.iter().find(|s| s.id == *id) else {
            continue;
        };
        let participants = tx.participants_by_session(session.id).await?;

        summaries.push(SessionSummary {
            id: session.id,
            status: session.status,
            max_participants: session.max_participants,
            participant_count: participants.len(),
            voted_count: participants.iter().filter(|p| p.has_voted).count(),
            created_at: session.created_at,
            completed_at: session.completed_at,
            origin_country: session.origin_country.clone(),
        });
    }

    Ok(summaries)
}

/// Gets the session, its participants, and the current ranking.
///
/// The ranking is computed from the stored ballots on every call.
pub async fn get_results(state: &AppState, session_id: Uuid) -> Result<Option<ResultsView>> {
    let Some(view) = get_session(state, session_id).await? else {
        return Ok(None);
    };

    let results = scoring::tally(&view.votes, &view.participants);

    Ok(Some(ResultsView {
        session: view.session,
        participants: view.participants,
        results,
    }))
}

/// Moves a session to `completed`, exposing the final ranking.
///
/// Only the creator may reveal, and only once somebody has voted. Revealing
/// an already completed session changes nothing.
///
/// # Arguments
///
/// * `state` - The application state.
/// * `session_id` - The ID of the session.
/// * `creator_id` - The caller's creator token.
///
/// # Returns
///
/// A `Result` containing the completed `Session`.
pub async fn reveal_results(state: &AppState, session_id: Uuid, creator_id: &str) -> Result<Session> {
    let mut tx = state.store.begin().await?;

    let mut session = tx
        .lock_session(session_id)
        .await?
        .ok_or_else(|| AppError::NotFound("Session not found".to_string()))?;

    require_creator(&session, creator_id, "reveal results")?;

    if session.is_completed() {
        tracing::debug!("Session {} already completed", session_id);
        return Ok(session);
    }

    let participants = tx.participants_by_session(session_id).await?;
    if !participants.iter().any(|p| p.has_voted) {
        return Err(AppError::PreconditionFailed(
            "At least one vote required".to_string(),
        ));
    }

    let completed_at = Utc::now();
    tx.update_session_status(session_id, SessionStatus::Completed, Some(completed_at))
        .await?;
    tx.commit().await?;

    session.status = SessionStatus::Completed;
    session.completed_at = Some(completed_at);

    tracing::info!("🏁 Results revealed for session {}", session_id);
    state.events.publish(session_id, SessionEventKind::StatusChanged);

    Ok(session)
}
