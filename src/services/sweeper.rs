//! Daily deletion of finished and abandoned sessions.

use std::time::Duration as StdDuration;

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::{
    error::Result,
    events::SessionEventKind,
    models::session::Session,
    state::AppState,
};

/// How long sessions are kept.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetentionPolicy {
    /// Days a completed session is kept after its reveal.
    pub completed_days: i64,
    /// Days a never-completed session is kept after its creation.
    pub abandoned_days: i64,
}

impl Default for RetentionPolicy {
    fn default() -> Self {
        Self {
            completed_days: 7,
            abandoned_days: 14,
        }
    }
}

impl RetentionPolicy {
    fn completed_cutoff(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        now - Duration::days(self.completed_days)
    }

    fn abandoned_cutoff(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        now - Duration::days(self.abandoned_days)
    }

    /// Whether `session` is past its retention period at `now`.
    pub fn is_expired(&self, session: &Session, now: DateTime<Utc>) -> bool {
        match session.completed_at {
            Some(completed_at) => completed_at < self.completed_cutoff(now),
            None => !session.is_completed() && session.created_at < self.abandoned_cutoff(now),
        }
    }
}

/// Counts from one sweep.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    /// Sessions actually deleted.
    pub deleted_count: usize,
    /// Completed sessions found past retention.
    pub completed_count: usize,
    /// Never-completed sessions found past retention.
    pub abandoned_count: usize,
    /// Sessions whose deletion failed; they are retried on the next sweep.
    pub failed_count: usize,
}

/// Deletes one session with its votes and participants, in one transaction.
///
/// The session is re-checked under its lock, so one that was revealed after
/// it was selected survives. Returns whether anything was deleted.
async fn delete_session_cascade(
    state: &AppState,
    session_id: Uuid,
    now: DateTime<Utc>,
) -> Result<bool> {
    let mut tx = state.store.begin().await?;

    let Some(session) = tx.lock_session(session_id).await? else {
        return Ok(false);
    };
    if !state.config.retention.is_expired(&session, now) {
        return Ok(false);
    }

    let votes = tx.votes_by_session(session_id).await?;
    for vote in votes {
        tx.delete_vote(vote.id).await?;
    }
    let participants = tx.participants_by_session(session_id).await?;
    for participant in participants {
        tx.delete_participant(participant.id).await?;
    }
    tx.delete_session(session_id).await?;
    tx.commit().await?;

    Ok(true)
}

/// Deletes every session past its retention period at `now`.
///
/// Each session is deleted in its own transaction; a failure is logged and
/// the sweep moves on. Running it again with nothing to delete is a no-op.
///
/// # Returns
///
/// A `Result` containing the `SweepReport`.
pub async fn sweep_expired_sessions(state: &AppState, now: DateTime<Utc>) -> Result<SweepReport> {
    let policy = state.config.retention;

    let (completed, abandoned) = {
        let mut tx = state.store.begin().await?;

        let completed: Vec<Session> = tx
            .sessions_completed_before(policy.completed_cutoff(now))
            .await?;
        let abandoned: Vec<Session> = tx
            .sessions_created_before(policy.abandoned_cutoff(now))
            .await?
            .into_iter()
            .filter(|s| !s.is_completed() && s.completed_at.is_none())
            .collect();

        (completed, abandoned)
    };

    let mut report = SweepReport {
        completed_count: completed.len(),
        abandoned_count: abandoned.len(),
        ..Default::default()
    };

    for session in completed.iter().chain(abandoned.iter()) {
        match delete_session_cascade(state, session.id, now).await {
            Ok(true) => {
                report.deleted_count += 1;
                state.events.publish(session.id, SessionEventKind::Deleted);
            }
            Ok(false) => {
                tracing::debug!("Session {} no longer eligible for deletion", session.id);
            }
            Err(e) => {
                report.failed_count += 1;
                tracing::error!("❌ Failed to delete session {}: {}", session.id, e);
            }
        }
    }

    tracing::info!(
        "🧹 Deleted {} completed sessions (>{} days old) and {} abandoned sessions (>{} days old), {} deleted in total, {} failed",
        report.completed_count,
        policy.completed_days,
        report.abandoned_count,
        policy.abandoned_days,
        report.deleted_count,
        report.failed_count
    );

    Ok(report)
}

/// The first `hour:minute` UTC strictly after `now`.
pub fn next_sweep_after(now: DateTime<Utc>, hour: u32, minute: u32) -> DateTime<Utc> {
    let Some(today) = now.date_naive().and_hms_opt(hour, minute, 0) else {
        return now + Duration::days(1);
    };

    let candidate = today.and_utc();
    if candidate > now {
        candidate
    } else {
        candidate + Duration::days(1)
    }
}

/// Runs [`sweep_expired_sessions`] once a day at the configured time.
///
/// Aborting the task between or during sweeps is safe: every session is
/// removed in a single transaction.
pub fn spawn_retention_sweeper(state: AppState) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            let now = Utc::now();
            let next = next_sweep_after(
                now,
                state.config.sweep_hour_utc,
                state.config.sweep_minute_utc,
            );
            let wait = (next - now).to_std().unwrap_or(StdDuration::from_secs(60));
            tracing::debug!("Next retention sweep at {}", next);

            tokio::time::sleep(wait).await;

            tracing::info!("🧹 Running scheduled retention sweep...");
            match sweep_expired_sessions(&state, Utc::now()).await {
                Ok(report) => {
                    tracing::info!("✅ Retention sweep completed: {:?}", report);
                }
                Err(e) => {
                    tracing::error!("❌ Retention sweep failed: {}", e);
                }
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    use crate::models::session::SessionStatus;

    fn session_at(created_at: DateTime<Utc>, completed_at: Option<DateTime<Utc>>) -> Session {
        Session {
            id: Uuid::new_v4(),
            creator_id: "creator".to_string(),
            creator_name: None,
            max_participants: 2,
            status: if completed_at.is_some() {
                SessionStatus::Completed
            } else {
                SessionStatus::Voting
            },
            created_at,
            completed_at,
            origin_country: None,
        }
    }

    #[test]
    fn next_sweep_is_later_today_or_tomorrow() {
        let before = Utc.with_ymd_and_hms(2026, 3, 10, 1, 30, 0).unwrap();
        assert_eq!(
            next_sweep_after(before, 3, 0),
            Utc.with_ymd_and_hms(2026, 3, 10, 3, 0, 0).unwrap()
        );

        let exactly = Utc.with_ymd_and_hms(2026, 3, 10, 3, 0, 0).unwrap();
        assert_eq!(
            next_sweep_after(exactly, 3, 0),
            Utc.with_ymd_and_hms(2026, 3, 11, 3, 0, 0).unwrap()
        );

        let after = Utc.with_ymd_and_hms(2026, 12, 31, 23, 0, 0).unwrap();
        assert_eq!(
            next_sweep_after(after, 3, 0),
            Utc.with_ymd_and_hms(2027, 1, 1, 3, 0, 0).unwrap()
        );
    }

    #[test]
    fn expiry_follows_the_two_thresholds() {
        let policy = RetentionPolicy::default();
        let now = Utc::now();
        let days = |n: i64| now - Duration::days(n);

        assert!(policy.is_expired(&session_at(days(30), Some(days(8))), now));
        assert!(!policy.is_expired(&session_at(days(30), Some(days(6))), now));
        assert!(policy.is_expired(&session_at(days(15), None), now));
        assert!(!policy.is_expired(&session_at(days(13), None), now));
    }
}
