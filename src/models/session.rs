use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Lifecycle status of a session.
///
/// Transitions only move forward: `Waiting` -> `Voting` -> `Completed`.
/// `Waiting` may also jump straight to `Completed` when the creator reveals
/// results before the session fills up.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    Waiting,
    Voting,
    Completed,
}

impl SessionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionStatus::Waiting => "waiting",
            SessionStatus::Voting => "voting",
            SessionStatus::Completed => "completed",
        }
    }

    fn rank(&self) -> u8 {
        match self {
            SessionStatus::Waiting => 0,
            SessionStatus::Voting => 1,
            SessionStatus::Completed => 2,
        }
    }

    /// Whether moving from `self` to `next` is a forward transition.
    pub fn can_advance_to(&self, next: SessionStatus) -> bool {
        next.rank() > self.rank()
    }
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SessionStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "waiting" => Ok(SessionStatus::Waiting),
            "voting" => Ok(SessionStatus::Voting),
            "completed" => Ok(SessionStatus::Completed),
            other => Err(format!("unknown session status: {}", other)),
        }
    }
}

/// A group vote on a travel destination.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    /// The unique identifier for the session.
    pub id: Uuid,
    /// The creator's private token. Never serialized.
    #[serde(skip_serializing, default)]
    pub creator_id: String,
    /// The display name the creator joined with, if any.
    pub creator_name: Option<String>,
    /// Participant cap, fixed at creation.
    pub max_participants: i32,
    /// The lifecycle status.
    pub status: SessionStatus,
    /// The timestamp when the session was created.
    pub created_at: DateTime<Utc>,
    /// Set exactly once, when the results are revealed.
    pub completed_at: Option<DateTime<Utc>>,
    /// ISO code of the country the group travels from.
    pub origin_country: Option<String>,
}

impl Session {
    pub fn is_completed(&self) -> bool {
        self.status == SessionStatus::Completed
    }
}

/// A session together with its participants and ballots.
#[derive(Debug, Clone, Serialize)]
pub struct SessionView {
    pub session: Session,
    pub participants: Vec<super::participant::Participant>,
    pub votes: Vec<super::vote::Vote>,
}

/// The identifiers handed back to the creator.
#[derive(Debug, Clone, Serialize)]
pub struct CreatedSession {
    pub session_id: Uuid,
    pub creator_id: String,
    /// Present when the creator joined under `creator_name`.
    pub participant_id: Option<Uuid>,
}

/// A session with participant counts, as shown in a voting history.
#[derive(Debug, Clone, Serialize)]
pub struct SessionSummary {
    pub id: Uuid,
    pub status: SessionStatus,
    pub max_participants: i32,
    pub participant_count: usize,
    pub voted_count: usize,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub origin_country: Option<String>,
}
