use chrono::Utc;
use uuid::Uuid;

use crate::{
    error::{AppError, Result},
    events::SessionEventKind,
    models::vote::Vote,
    state::AppState,
    validation::session::normalize_ballot,
};

/// Submits or replaces a participant's ranked ballot.
///
/// A participant has at most one ballot: a second submission overwrites the
/// first in place. The ballot write and the `has_voted` flag are committed
/// together.
///
/// # Arguments
///
/// * `state` - The application state.
/// * `session_id` - The ID of the session.
/// * `participant_id` - The voter.
/// * `countries` - Ranked country codes, most preferred first.
///
/// # Returns
///
/// A `Result` containing the stored `Vote`.
pub async fn submit(
    state: &AppState,
    session_id: Uuid,
    participant_id: Uuid,
    countries: &[String],
) -> Result<Vote> {
    let ballot = normalize_ballot(countries, None)?;

    let mut tx = state.store.begin().await?;

    let session = tx
        .lock_session(session_id)
        .await?
        .ok_or_else(|| AppError::NotFound("Session not found".to_string()))?;

    let participant = tx
        .get_participant(participant_id)
        .await?
        .filter(|p| p.session_id == session_id)
        .ok_or_else(|| AppError::NotFound("Participant not found".to_string()))?;

    if session.is_completed() {
        return Err(AppError::PreconditionFailed(
            "Voting is closed, results were revealed".to_string(),
        ));
    }

    if let Some(origin) = session.origin_country.as_deref() {
        normalize_ballot(&ballot, Some(origin))?;
    }

    let now = Utc::now();
    let existing = tx.vote_by_participant(participant.id).await?;
    let vote = match existing {
        Some(mut existing) => {
            tx.update_vote_countries(existing.id, &ballot, now).await?;
            existing.countries = ballot;
            existing.updated_at = now;
            existing
        }
        None => {
            let vote = Vote {
                id: Uuid::new_v4(),
                session_id,
                participant_id: participant.id,
                countries: ballot,
                created_at: now,
                updated_at: now,
            };
            tx.insert_vote(&vote).await?;
            vote
        }
    };

    tx.set_has_voted(participant.id, true).await?;
    tx.commit().await?;

    tracing::info!(
        "🗳️ {} voted in session {}: {}",
        participant.username,
        session_id,
        vote.countries.join(",")
    );
    state.events.publish(session_id, SessionEventKind::VoteSubmitted);

    Ok(vote)
}

/// Gets a participant's current ballot.
///
/// # Returns
///
/// `Ok(None)` when the participant has no ballot on record.
pub async fn get_by_participant(state: &AppState, participant_id: Uuid) -> Result<Option<Vec<String>>> {
    let mut tx = state.store.begin().await?;
    let vote = tx.vote_by_participant(participant_id).await?;
    Ok(vote.map(|v| v.countries))
}
