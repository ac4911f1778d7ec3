use serde::Serialize;
use uuid::Uuid;

use super::{participant::Participant, session::Session};

/// One participant's contribution to a country's score.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VoteAttribution {
    pub participant_id: Uuid,
    pub username: String,
    /// 1-based position on the ballot.
    pub rank: u32,
    pub points: u32,
}

/// A country's aggregate score.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CountryResult {
    pub country: String,
    pub score: u32,
    pub votes: Vec<VoteAttribution>,
}

/// Everything a results page renders.
#[derive(Debug, Clone, Serialize)]
pub struct ResultsView {
    pub session: Session,
    pub participants: Vec<Participant>,
    pub results: Vec<CountryResult>,
}
