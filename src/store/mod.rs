//! Transactional keyed storage for sessions, participants and votes.
//!
//! Every write path in the services opens one transaction, locks the
//! session it touches with [`StoreTx::lock_session`], reads what it needs,
//! writes, and commits. Dropping a transaction without committing discards
//! its writes.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::{
    error::Result,
    models::{
        participant::Participant,
        session::{Session, SessionStatus},
        vote::Vote,
    },
};

pub mod memory;
pub mod postgres;

pub use memory::MemoryStore;
pub use postgres::PgStore;

/// A source of transactions.
#[async_trait]
pub trait Store: Send + Sync {
    async fn begin(&self) -> Result<Box<dyn StoreTx>>;
}

/// One atomic unit of work against the store.
#[async_trait]
pub trait StoreTx: Send {
    async fn get_session(&mut self, id: Uuid) -> Result<Option<Session>>;

    /// Reads a session and holds it exclusively until the transaction ends.
    async fn lock_session(&mut self, id: Uuid) -> Result<Option<Session>>;

    /// Sessions among `ids` that exist, in no particular order.
    async fn get_sessions(&mut self, ids: &[Uuid]) -> Result<Vec<Session>>;

    async fn insert_session(&mut self, session: &Session) -> Result<()>;

    async fn update_session_status(
        &mut self,
        id: Uuid,
        status: SessionStatus,
        completed_at: Option<DateTime<Utc>>,
    ) -> Result<()>;

    async fn delete_session(&mut self, id: Uuid) -> Result<()>;

    /// Sessions with a `completed_at` strictly before `cutoff`.
    async fn sessions_completed_before(&mut self, cutoff: DateTime<Utc>) -> Result<Vec<Session>>;

    /// Sessions with a `created_at` strictly before `cutoff`, any status.
    async fn sessions_created_before(&mut self, cutoff: DateTime<Utc>) -> Result<Vec<Session>>;

    /// Participants of a session, in join order.
    async fn participants_by_session(&mut self, session_id: Uuid) -> Result<Vec<Participant>>;

    async fn get_participant(&mut self, id: Uuid) -> Result<Option<Participant>>;

    async fn insert_participant(&mut self, participant: &Participant) -> Result<()>;

    async fn set_has_voted(&mut self, id: Uuid, has_voted: bool) -> Result<()>;

    async fn delete_participant(&mut self, id: Uuid) -> Result<()>;

    /// Ballots of a session, in submission order.
    async fn votes_by_session(&mut self, session_id: Uuid) -> Result<Vec<Vote>>;

    async fn vote_by_participant(&mut self, participant_id: Uuid) -> Result<Option<Vote>>;

    async fn insert_vote(&mut self, vote: &Vote) -> Result<()>;

    async fn update_vote_countries(
        &mut self,
        id: Uuid,
        countries: &[String],
        updated_at: DateTime<Utc>,
    ) -> Result<()>;

    async fn delete_vote(&mut self, id: Uuid) -> Result<()>;

    async fn commit(&mut self) -> Result<()>;
}
