use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A named member of a session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Participant {
    /// The unique identifier for the participant.
    pub id: Uuid,
    /// The session the participant belongs to.
    pub session_id: Uuid,
    /// Display name, unique case-insensitively within the session.
    pub username: String,
    /// Whether a ballot is currently on record.
    pub has_voted: bool,
    /// The timestamp when the participant joined.
    pub joined_at: DateTime<Utc>,
}

impl Participant {
    /// Case-insensitive username comparison.
    pub fn has_username(&self, username: &str) -> bool {
        self.username.to_lowercase() == username.to_lowercase()
    }
}

/// What a client needs to re-derive its "already voted" hint.
#[derive(Debug, Clone, Serialize)]
pub struct ParticipantStatus {
    pub id: Uuid,
    pub session_id: Uuid,
    pub username: String,
    pub has_voted: bool,
}

impl From<&Participant> for ParticipantStatus {
    fn from(p: &Participant) -> Self {
        Self {
            id: p.id,
            session_id: p.session_id,
            username: p.username.clone(),
            has_voted: p.has_voted,
        }
    }
}
