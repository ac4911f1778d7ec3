use async_trait::async_trait;
use chrono::{DateTime, Utc};
use deadpool_postgres::{Object, Pool};
use tokio_postgres::Row;
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

const SESSION_COLUMNS: &str = "id, creator_id, creator_name, max_participants, status, created_at, completed_at, origin_country";
const PARTICIPANT_COLUMNS: &str = "id, session_id, username, has_voted, joined_at";
const VOTE_COLUMNS: &str = "id, session_id, participant_id, countries, created_at, updated_at";

fn row_to_session(row: &Row) -> Result<Session> {
    let status: String = row.try_get("status")?;
    Ok(Session {
        id: row.try_get("id")?,
        creator_id: row.try_get("creator_id")?,
        creator_name: row.try_get("creator_name")?,
        max_participants: row.try_get("max_participants")?,
        status: status.parse().map_err(AppError::Internal)?,
        created_at: row.try_get("created_at")?,
        completed_at: row.try_get("completed_at")?,
        origin_country: row.try_get("origin_country")?,
    })
}

fn row_to_participant(row: &Row) -> Result<Participant> {
    Ok(Participant {
        id: row.try_get("id")?,
        session_id: row.try_get("session_id")?,
        username: row.try_get("username")?,
        has_voted: row.try_get("has_voted")?,
        joined_at: row.try_get("joined_at")?,
    })
}

fn row_to_vote(row: &Row) -> Result<Vote> {
    Ok(Vote {
        id: row.try_get("id")?,
        session_id: row.try_get("session_id")?,
        participant_id: row.try_get("participant_id")?,
        countries: row.try_get("countries")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

/// A PostgreSQL-backed store.
#[derive(Clone)]
pub struct PgStore {
    pool: Pool,
}

impl PgStore {
    pub fn new(pool: Pool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl Store for PgStore {
    async fn begin(&self) -> Result<Box<dyn StoreTx>> {
        let client = self.pool.get().await?;
        client.batch_execute("BEGIN").await?;
        Ok(Box::new(PgTx {
            client: Some(client),
        }))
    }
}

/// A transaction on one pooled connection.
///
/// `BEGIN` is issued on creation; a transaction dropped before `commit` is
/// rolled back on a spawned task so the connection goes back to the pool
/// clean.
struct PgTx {
    client: Option<Object>,
}

impl PgTx {
    fn client(&self) -> Result<&Object> {
        self.client
            .as_ref()
            .ok_or_else(|| AppError::Internal("transaction already finished".to_string()))
    }

    async fn expect_one(&self, sql: &str, params: &[&(dyn tokio_postgres::types::ToSql + Sync)], what: &str) -> Result<()> {
        let affected = self.client()?.execute(sql, params).await?;
        if affected == 0 {
            return Err(AppError::NotFound(format!("{} not found", what)));
        }
        Ok(())
    }
}

impl Drop for PgTx {
    fn drop(&mut self) {
        let Some(client) = self.client.take() else {
            return;
        };
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move {
                    if let Err(e) = client.batch_execute("ROLLBACK").await {
                        tracing::error!("❌ Rollback failed: {}", e);
                    }
                });
            }
            Err(_) => tracing::error!("❌ Transaction dropped outside of a runtime, connection discarded"),
        }
    }
}

#[async_trait]
impl StoreTx for PgTx {
    async fn get_session(&mut self, id: Uuid) -> Result<Option<Session>> {
        let sql = format!("SELECT {} FROM sessions WHERE id = $1", SESSION_COLUMNS);
        let row = self.client()?.query_opt(&sql, &[&id]).await?;
        row.map(|r| row_to_session(&r)).transpose()
    }

    async fn lock_session(&mut self, id: Uuid) -> Result<Option<Session>> {
        let sql = format!("SELECT {} FROM sessions WHERE id = $1 FOR UPDATE", SESSION_COLUMNS);
        let row = self.client()?.query_opt(&sql, &[&id]).await?;
        row.map(|r| row_to_session(&r)).transpose()
    }

    async fn get_sessions(&mut self, ids: &[Uuid]) -> Result<Vec<Session>> {
        let sql = format!("SELECT {} FROM sessions WHERE id = ANY($1)", SESSION_COLUMNS);
        let rows = self.client()?.query(&sql, &[&ids]).await?;
        rows.iter().map(row_to_session).collect()
    }

    async fn insert_session(&mut self, session: &Session) -> Result<()> {
        self.client()?
            .execute(
                r#"
                INSERT INTO sessions
                    (id, creator_id, creator_name, max_participants, status, created_at, completed_at, origin_country)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
                "#,
                &[
                    &session.id,
                    &session.creator_id,
                    &session.creator_name,
                    &session.max_participants,
                    &session.status.as_str(),
                    &session.created_at,
                    &session.completed_at,
                    &session.origin_country,
                ],
            )
            .await?;
        Ok(())
    }

    async fn update_session_status(
        &mut self,
        id: Uuid,
        status: SessionStatus,
        completed_at: Option<DateTime<Utc>>,
    ) -> Result<()> {
        self.expect_one(
            "UPDATE sessions SET status = $1, completed_at = $2 WHERE id = $3",
            &[&status.as_str(), &completed_at, &id],
            "session",
        )
        .await
    }

    async fn delete_session(&mut self, id: Uuid) -> Result<()> {
        self.client()?
            .execute("DELETE FROM sessions WHERE id = $1", &[&id])
            .await?;
        Ok(())
    }

    async fn sessions_completed_before(&mut self, cutoff: DateTime<Utc>) -> Result<Vec<Session>> {
        let sql = format!(
            "SELECT {} FROM sessions WHERE completed_at IS NOT NULL AND completed_at < $1 ORDER BY completed_at",
            SESSION_COLUMNS
        );
        let rows = self.client()?.query(&sql, &[&cutoff]).await?;
        rows.iter().map(row_to_session).collect()
    }

    async fn sessions_created_before(&mut self, cutoff: DateTime<Utc>) -> Result<Vec<Session>> {
        let sql = format!(
            "SELECT {} FROM sessions WHERE created_at < $1 ORDER BY created_at",
            SESSION_COLUMNS
        );
        let rows = self.client()?.query(&sql, &[&cutoff]).await?;
        rows.iter().map(row_to_session).collect()
    }

    async fn participants_by_session(&mut self, session_id: Uuid) -> Result<Vec<Participant>> {
        let sql = format!(
            "SELECT {} FROM participants WHERE session_id = $1 ORDER BY joined_at, id",
            PARTICIPANT_COLUMNS
        );
        let rows = self.client()?.query(&sql, &[&session_id]).await?;
        rows.iter().map(row_to_participant).collect()
    }

    async fn get_participant(&mut self, id: Uuid) -> Result<Option<Participant>> {
        let sql = format!("SELECT {} FROM participants WHERE id = $1", PARTICIPANT_COLUMNS);
        let row = self.client()?.query_opt(&sql, &[&id]).await?;
        row.map(|r| row_to_participant(&r)).transpose()
    }

    async fn insert_participant(&mut self, participant: &Participant) -> Result<()> {
        self.client()?
            .execute(
                r#"
                INSERT INTO participants (id, session_id, username, has_voted, joined_at)
                VALUES ($1, $2, $3, $4, $5)
                "#,
                &[
                    &participant.id,
                    &participant.session_id,
                    &participant.username,
                    &participant.has_voted,
                    &participant.joined_at,
                ],
            )
            .await?;
        Ok(())
    }

    async fn set_has_voted(&mut self, id: Uuid, has_voted: bool) -> Result<()> {
        self.expect_one(
            "UPDATE participants SET has_voted = $1 WHERE id = $2",
            &[&has_voted, &id],
            "participant",
        )
        .await
    }

    async fn delete_participant(&mut self, id: Uuid) -> Result<()> {
        self.client()?
            .execute("DELETE FROM participants WHERE id = $1", &[&id])
            .await?;
        Ok(())
    }

    async fn votes_by_session(&mut self, session_id: Uuid) -> Result<Vec<Vote>> {
        let sql = format!(
            "SELECT {} FROM votes WHERE session_id = $1 ORDER BY created_at, id",
            VOTE_COLUMNS
        );
        let rows = self.client()?.query(&sql, &[&session_id]).await?;
        rows.iter().map(row_to_vote).collect()
    }

    async fn vote_by_participant(&mut self, participant_id: Uuid) -> Result<Option<Vote>> {
        let sql = format!("SELECT {} FROM votes WHERE participant_id = $1", VOTE_COLUMNS);
        let row = self.client()?.query_opt(&sql, &[&participant_id]).await?;
        row.map(|r| row_to_vote(&r)).transpose()
    }

    async fn insert_vote(&mut self, vote: &Vote) -> Result<()> {
        self.client()?
            .execute(
                r#"
                INSERT INTO votes (id, session_id, participant_id, countries, created_at, updated_at)
                VALUES ($1, $2, $3, $4, $5, $6)
                "#,
                &[
                    &vote.id,
                    &vote.session_id,
                    &vote.participant_id,
                    &vote.countries,
                    &vote.created_at,
                    &vote.updated_at,
                ],
            )
            .await?;
        Ok(())
    }

    async fn update_vote_countries(
        &mut self,
        id: Uuid,
        countries: &[String],
        updated_at: DateTime<Utc>,
    ) -> Result<()> {
        self.expect_one(
            "UPDATE votes SET countries = $1, updated_at = $2 WHERE id = $3",
            &[&countries, &updated_at, &id],
            "vote",
        )
        .await
    }

    async fn delete_vote(&mut self, id: Uuid) -> Result<()> {
        self.client()?
            .execute("DELETE FROM votes WHERE id = $1", &[&id])
            .await?;
        Ok(())
    }

    async fn commit(&mut self) -> Result<()> {
        let client = self
            .client
            .take()
            .ok_or_else(|| AppError::Internal("transaction already finished".to_string()))?;
        client.batch_execute("COMMIT").await?;
        Ok(())
    }
}
