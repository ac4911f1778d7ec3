use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::{Mutex, OwnedMutexGuard};
use uuid::Uuid;

use super::{Store, StoreTx};
use crate::{
    error::{AppError, Result},
    models::{
        participant::Participant,
        session::{Session, SessionStatus},
        vote::Vote,
    },
};

#[derive(Debug, Default)]
struct Tables {
    sessions: HashMap<Uuid, Session>,
    participants: HashMap<Uuid, Participant>,
    votes: HashMap<Uuid, Vote>,
}

/// Rows written by an open transaction. `None` marks a deleted row.
#[derive(Debug, Default)]
struct Staged {
    sessions: HashMap<Uuid, Option<Session>>,
    participants: HashMap<Uuid, Option<Participant>>,
    votes: HashMap<Uuid, Option<Vote>>,
}

fn lookup<'a, T>(
    base: &'a HashMap<Uuid, T>,
    staged: &'a HashMap<Uuid, Option<T>>,
    id: &Uuid,
) -> Option<&'a T> {
    match staged.get(id) {
        Some(row) => row.as_ref(),
        None => base.get(id),
    }
}

/// Every live row as seen from inside the transaction.
fn rows<'a, T>(
    base: &'a HashMap<Uuid, T>,
    staged: &'a HashMap<Uuid, Option<T>>,
) -> impl Iterator<Item = &'a T> {
    base.iter()
        .filter(move |(id, _)| !staged.contains_key(*id))
        .map(|(_, row)| row)
        .chain(staged.values().filter_map(Option::as_ref))
}

fn apply<T>(base: &mut HashMap<Uuid, T>, staged: HashMap<Uuid, Option<T>>) {
    for (id, row) in staged {
        match row {
            Some(row) => base.insert(id, row),
            None => base.remove(&id),
        };
    }
}

/// An in-process store for development and tests.
///
/// A transaction owns the single table lock for its whole lifetime, so
/// transactions are serialized. Writes are staged per row and applied on
/// commit; a write costs only the rows it touches. Listing queries scan the
/// whole table.
#[derive(Clone, Default)]
pub struct MemoryStore {
    tables: Arc<Mutex<Tables>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn begin(&self) -> Result<Box<dyn StoreTx>> {
        let guard = self.tables.clone().lock_owned().await;
        Ok(Box::new(MemoryTx {
            guard,
            staged: Staged::default(),
        }))
    }
}

struct MemoryTx {
    guard: OwnedMutexGuard<Tables>,
    staged: Staged,
}

impl MemoryTx {
    fn session(&self, id: &Uuid) -> Option<&Session> {
        lookup(&self.guard.sessions, &self.staged.sessions, id)
    }

    fn participant(&self, id: &Uuid) -> Option<&Participant> {
        lookup(&self.guard.participants, &self.staged.participants, id)
    }

    fn vote(&self, id: &Uuid) -> Option<&Vote> {
        lookup(&self.guard.votes, &self.staged.votes, id)
    }

    fn sessions(&self) -> impl Iterator<Item = &Session> {
        rows(&self.guard.sessions, &self.staged.sessions)
    }

    fn participants(&self) -> impl Iterator<Item = &Participant> {
        rows(&self.guard.participants, &self.staged.participants)
    }

    fn votes(&self) -> impl Iterator<Item = &Vote> {
        rows(&self.guard.votes, &self.staged.votes)
    }
}

#[async_trait]
impl StoreTx for MemoryTx {
    async fn get_session(&mut self, id: Uuid) -> Result<Option<Session>> {
        Ok(self.session(&id).cloned())
    }

    async fn lock_session(&mut self, id: Uuid) -> Result<Option<Session>> {
        self.get_session(id).await
    }

    async fn get_sessions(&mut self, ids: &[Uuid]) -> Result<Vec<Session>> {
        Ok(ids
            .iter()
            .filter_map(|id| self.session(id).cloned())
            .collect())
    }

    async fn insert_session(&mut self, session: &Session) -> Result<()> {
        if self.session(&session.id).is_some() {
            return Err(AppError::Internal(format!("duplicate session id {}", session.id)));
        }
        self.staged.sessions.insert(session.id, Some(session.clone()));
        Ok(())
    }

    async fn update_session_status(
        &mut self,
        id: Uuid,
        status: SessionStatus,
        completed_at: Option<DateTime<Utc>>,
    ) -> Result<()> {
        let mut session = self
            .session(&id)
            .cloned()
            .ok_or_else(|| AppError::NotFound("session not found".to_string()))?;
        session.status = status;
        session.completed_at = completed_at;
        self.staged.sessions.insert(id, Some(session));
        Ok(())
    }

    async fn delete_session(&mut self, id: Uuid) -> Result<()> {
        self.staged.sessions.insert(id, None);
        Ok(())
    }

    async fn sessions_completed_before(&mut self, cutoff: DateTime<Utc>) -> Result<Vec<Session>> {
        let mut sessions: Vec<Session> = self
            .sessions()
            .filter(|s| s.completed_at.is_some_and(|at| at < cutoff))
            .cloned()
            .collect();
        sessions.sort_by_key(|s| s.completed_at);
        Ok(sessions)
    }

    async fn sessions_created_before(&mut self, cutoff: DateTime<Utc>) -> Result<Vec<Session>> {
        let mut sessions: Vec<Session> = self
            .sessions()
            .filter(|s| s.created_at < cutoff)
            .cloned()
            .collect();
        sessions.sort_by_key(|s| s.created_at);
        Ok(sessions)
    }

    async fn participants_by_session(&mut self, session_id: Uuid) -> Result<Vec<Participant>> {
        let mut participants: Vec<Participant> = self
            .participants()
            .filter(|p| p.session_id == session_id)
            .cloned()
            .collect();
        participants.sort_by(|a, b| a.joined_at.cmp(&b.joined_at).then(a.id.cmp(&b.id)));
        Ok(participants)
    }

    async fn get_participant(&mut self, id: Uuid) -> Result<Option<Participant>> {
        Ok(self.participant(&id).cloned())
    }

    async fn insert_participant(&mut self, participant: &Participant) -> Result<()> {
        if self.session(&participant.session_id).is_none() {
            return Err(AppError::NotFound("session not found".to_string()));
        }
        self.staged
            .participants
            .insert(participant.id, Some(participant.clone()));
        Ok(())
    }

    async fn set_has_voted(&mut self, id: Uuid, has_voted: bool) -> Result<()> {
        let mut participant = self
            .participant(&id)
            .cloned()
            .ok_or_else(|| AppError::NotFound("participant not found".to_string()))?;
        participant.has_voted = has_voted;
        self.staged.participants.insert(id, Some(participant));
        Ok(())
    }

    async fn delete_participant(&mut self, id: Uuid) -> Result<()> {
        self.staged.participants.insert(id, None);
        Ok(())
    }

    async fn votes_by_session(&mut self, session_id: Uuid) -> Result<Vec<Vote>> {
        let mut votes: Vec<Vote> = self
            .votes()
            .filter(|v| v.session_id == session_id)
            .cloned()
            .collect();
        votes.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        Ok(votes)
    }

    async fn vote_by_participant(&mut self, participant_id: Uuid) -> Result<Option<Vote>> {
        Ok(self
            .votes()
            .find(|v| v.participant_id == participant_id)
            .cloned())
    }

    async fn insert_vote(&mut self, vote: &Vote) -> Result<()> {
        if self.votes().any(|v| v.participant_id == vote.participant_id) {
            return Err(AppError::Internal(format!(
                "participant {} already has a ballot",
                vote.participant_id
            )));
        }
        self.staged.votes.insert(vote.id, Some(vote.clone()));
        Ok(())
    }

    async fn update_vote_countries(
        &mut self,
        id: Uuid,
        countries: &[String],
        updated_at: DateTime<Utc>,
    ) -> Result<()> {
        let mut vote = self
            .vote(&id)
            .cloned()
            .ok_or_else(|| AppError::NotFound("vote not found".to_string()))?;
        vote.countries = countries.to_vec();
        vote.updated_at = updated_at;
        self.staged.votes.insert(id, Some(vote));
        Ok(())
    }

    async fn delete_vote(&mut self, id: Uuid) -> Result<()> {
        self.staged.votes.insert(id, None);
        Ok(())
    }

    async fn commit(&mut self) -> Result<()> {
        let staged = std::mem::take(&mut self.staged);
        let tables = &mut *self.guard;
        apply(&mut tables.sessions, staged.sessions);
        apply(&mut tables.participants, staged.participants);
        apply(&mut tables.votes, staged.votes);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn session(created_at: DateTime<Utc>) -> Session {
        Session {
            id: Uuid::new_v4(),
            creator_id: "creator".to_string(),
            creator_name: None,
            max_participants: 3,
            status: SessionStatus::Waiting,
            created_at,
            completed_at: None,
            origin_country: None,
        }
    }

    #[tokio::test]
    async fn committed_writes_are_visible() {
        let store = MemoryStore::new();
        let s = session(Utc::now());

        let mut tx = store.begin().await.unwrap();
        tx.insert_session(&s).await.unwrap();
        tx.commit().await.unwrap();
        drop(tx);

        let mut tx = store.begin().await.unwrap();
        assert!(tx.get_session(s.id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn dropped_transaction_discards_writes() {
        let store = MemoryStore::new();
        let s = session(Utc::now());

        {
            let mut tx = store.begin().await.unwrap();
            tx.insert_session(&s).await.unwrap();
            assert!(tx.get_session(s.id).await.unwrap().is_some());
        }

        let mut tx = store.begin().await.unwrap();
        assert!(tx.get_session(s.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn participants_come_back_in_join_order() {
        let store = MemoryStore::new();
        let s = session(Utc::now());
        let now = Utc::now();

        let mut tx = store.begin().await.unwrap();
        tx.insert_session(&s).await.unwrap();
        for (i, name) in ["carol", "alice", "bob"].iter().enumerate() {
            tx.insert_participant(&Participant {
                id: Uuid::new_v4(),
                session_id: s.id,
                username: name.to_string(),
                has_voted: false,
                joined_at: now + Duration::seconds(i as i64),
            })
            .await
            .unwrap();
        }
        tx.commit().await.unwrap();

        let names: Vec<String> = tx
            .participants_by_session(s.id)
            .await
            .unwrap()
            .into_iter()
            .map(|p| p.username)
            .collect();
        assert_eq!(names, vec!["carol", "alice", "bob"]);
    }

    #[tokio::test]
    async fn age_queries_use_strict_cutoffs() {
        let store = MemoryStore::new();
        let now = Utc::now();
        let old = session(now - Duration::days(20));
        let fresh = session(now);

        let mut tx = store.begin().await.unwrap();
        tx.insert_session(&old).await.unwrap();
        tx.insert_session(&fresh).await.unwrap();
        tx.update_session_status(fresh.id, SessionStatus::Completed, Some(now))
            .await
            .unwrap();

        let created = tx.sessions_created_before(now - Duration::days(14)).await.unwrap();
        assert_eq!(created.len(), 1);
        assert_eq!(created[0].id, old.id);

        assert!(tx.sessions_completed_before(now).await.unwrap().is_empty());
        assert_eq!(
            tx.sessions_completed_before(now + Duration::seconds(1))
                .await
                .unwrap()
                .len(),
            1
        );
    }

    #[tokio::test]
    async fn one_ballot_per_participant() {
        let store = MemoryStore::new();
        let s = session(Utc::now());
        let participant_id = Uuid::new_v4();
        let now = Utc::now();
        let vote = |id| Vote {
            id,
            session_id: s.id,
            participant_id,
            countries: vec!["FR".to_string()],
            created_at: now,
            updated_at: now,
        };

        let mut tx = store.begin().await.unwrap();
        tx.insert_vote(&vote(Uuid::new_v4())).await.unwrap();
        assert!(tx.insert_vote(&vote(Uuid::new_v4())).await.is_err());
    }

    #[tokio::test]
    async fn staged_rows_shadow_committed_rows() {
        let store = MemoryStore::new();
        let kept = session(Utc::now());
        let dropped = session(Utc::now());

        let mut tx = store.begin().await.unwrap();
        tx.insert_session(&kept).await.unwrap();
        tx.insert_session(&dropped).await.unwrap();
        tx.commit().await.unwrap();
        drop(tx);

        let mut tx = store.begin().await.unwrap();
        tx.delete_session(dropped.id).await.unwrap();
        tx.update_session_status(kept.id, SessionStatus::Voting, None)
            .await
            .unwrap();

        assert!(tx.get_session(dropped.id).await.unwrap().is_none());
        assert_eq!(
            tx.get_sessions(&[kept.id, dropped.id]).await.unwrap().len(),
            1
        );
        assert_eq!(
            tx.sessions_created_before(Utc::now() + Duration::seconds(1))
                .await
                .unwrap()
                .len(),
            1
        );
        assert_eq!(
            tx.get_session(kept.id).await.unwrap().unwrap().status,
            SessionStatus::Voting
        );
        drop(tx);

        let mut tx = store.begin().await.unwrap();
        assert!(tx.get_session(dropped.id).await.unwrap().is_some());
        assert_eq!(
            tx.get_session(kept.id).await.unwrap().unwrap().status,
            SessionStatus::Waiting
        );

        tx.delete_session(dropped.id).await.unwrap();
        tx.commit().await.unwrap();
        drop(tx);

        let mut tx = store.begin().await.unwrap();
        assert!(tx.get_session(dropped.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn deleted_ballot_frees_the_participant_slot() {
        let store = MemoryStore::new();
        let now = Utc::now();
        let participant_id = Uuid::new_v4();
        let first = Vote {
            id: Uuid::new_v4(),
            session_id: Uuid::new_v4(),
            participant_id,
            countries: vec!["FR".to_string()],
            created_at: now,
            updated_at: now,
        };

        let mut tx = store.begin().await.unwrap();
        tx.insert_vote(&first).await.unwrap();
        tx.commit().await.unwrap();

        tx.delete_vote(first.id).await.unwrap();
        let second = Vote {
            id: Uuid::new_v4(),
            countries: vec!["JP".to_string()],
            ..first.clone()
        };
        tx.insert_vote(&second).await.unwrap();

        let ballot = tx.vote_by_participant(participant_id).await.unwrap().unwrap();
        assert_eq!(ballot.id, second.id);
    }
}
