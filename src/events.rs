//! Change notifications for sessions.
//!
//! Services publish one [`SessionEvent`] after each committed write. The
//! bus only tells subscribers that something changed; subscribers re-fetch
//! the session to see what.

use chrono::{DateTime, Utc};
use redis::{AsyncCommands, aio::ConnectionManager};
use serde::Serialize;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use uuid::Uuid;

const EVENT_BUFFER: usize = 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionEventKind {
    Created,
    ParticipantJoined,
    ParticipantRemoved,
    StatusChanged,
    VoteSubmitted,
    VoteReset,
    Deleted,
}

impl SessionEventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionEventKind::Created => "created",
            SessionEventKind::ParticipantJoined => "participant_joined",
            SessionEventKind::ParticipantRemoved => "participant_removed",
            SessionEventKind::StatusChanged => "status_changed",
            SessionEventKind::VoteSubmitted => "vote_submitted",
            SessionEventKind::VoteReset => "vote_reset",
            SessionEventKind::Deleted => "deleted",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SessionEvent {
    pub session_id: Uuid,
    pub kind: SessionEventKind,
    pub at: DateTime<Utc>,
}

impl SessionEvent {
    pub fn new(session_id: Uuid, kind: SessionEventKind) -> Self {
        Self {
            session_id,
            kind,
            at: Utc::now(),
        }
    }
}

/// In-process fan-out of session events.
#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<SessionEvent>,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl EventBus {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(EVENT_BUFFER);
        Self { sender }
    }

    /// Publishes an event. Having no subscribers is not an error.
    pub fn publish(&self, session_id: Uuid, kind: SessionEventKind) {
        let event = SessionEvent::new(session_id, kind);
        tracing::trace!("📣 {:?} for session {}", kind, session_id);
        let _ = self.sender.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.sender.subscribe()
    }
}

/// The Redis pub/sub channel for one session.
pub fn redis_channel(session_id: Uuid) -> String {
    format!("tripvote:session:{}", session_id)
}

/// Forwards every bus event to Redis so other server instances and
/// external push gateways can observe changes.
pub fn spawn_redis_forwarder(bus: &EventBus, mut redis: ConnectionManager) -> JoinHandle<()> {
    let mut receiver = bus.subscribe();

    tokio::spawn(async move {
        loop {
            match receiver.recv().await {
                Ok(event) => {
                    let payload = match sonic_rs::to_string(&event) {
                        Ok(payload) => payload,
                        Err(e) => {
                            tracing::error!("❌ Failed to encode session event: {}", e);
                            continue;
                        }
                    };

                    let published: redis::RedisResult<()> = redis
                        .publish(redis_channel(event.session_id), payload)
                        .await;
                    if let Err(e) = published {
                        tracing::warn!("⚠️ Failed to publish session event to Redis: {}", e);
                    }
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!("⚠️ Redis forwarder lagged, {} events skipped", skipped);
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    })
}
