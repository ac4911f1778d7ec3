use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Maximum number of ranked countries on one ballot.
pub const MAX_BALLOT_LEN: usize = 5;

/// A participant's ranked ballot. Index 0 is the top choice.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Vote {
    pub id: Uuid,
    pub session_id: Uuid,
    pub participant_id: Uuid,
    pub countries: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
