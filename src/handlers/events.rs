use std::convert::Infallible;

use axum::{
    extract::{Path, State},
    response::sse::{Event, KeepAlive, Sse},
};
use futures::Stream;
use tokio::sync::broadcast;
use tokio_stream::{
    StreamExt,
    wrappers::{BroadcastStream, errors::BroadcastStreamRecvError},
};
use uuid::Uuid;

use crate::{
    error::{AppError, Result},
    events::{SessionEvent, SessionEventKind},
    state::AppState,
};

/// The SSE event name telling a client it missed notifications.
pub const RESYNC_EVENT: &str = "resync";

/// One item of a session's notification stream.
#[derive(Debug, Clone)]
pub enum SessionUpdate {
    /// The session changed.
    Changed(SessionEvent),
    /// The subscriber fell behind and this many notifications were lost.
    /// The client must re-fetch the session.
    Resync(u64),
}

impl SessionUpdate {
    fn into_sse(self) -> Event {
        match self {
            SessionUpdate::Changed(event) => Event::default()
                .event(event.kind.as_str())
                .data(sonic_rs::to_string(&event).unwrap_or_default()),
            SessionUpdate::Resync(skipped) => Event::default()
                .event(RESYNC_EVENT)
                .data(skipped.to_string()),
        }
    }
}

/// Notifications for one session out of the shared bus.
///
/// Lost notifications surface as [`SessionUpdate::Resync`]. The stream ends
/// after the session's `Deleted` event or when the bus closes.
pub fn session_updates(
    receiver: broadcast::Receiver<SessionEvent>,
    session_id: Uuid,
) -> impl Stream<Item = SessionUpdate> + Send + 'static {
    let stream = BroadcastStream::new(receiver);

    futures::stream::unfold(Some(stream), move |stream| async move {
        let mut stream = stream?;
        loop {
            match stream.next().await? {
                Ok(event) if event.session_id != session_id => continue,
                Ok(event) => {
                    let next = (event.kind != SessionEventKind::Deleted).then_some(stream);
                    return Some((SessionUpdate::Changed(event), next));
                }
                Err(BroadcastStreamRecvError::Lagged(skipped)) => {
                    tracing::warn!(
                        "⚠️ Event stream for session {} lagged, {} events skipped",
                        session_id,
                        skipped
                    );
                    return Some((SessionUpdate::Resync(skipped), Some(stream)));
                }
            }
        }
    })
}

/// Streams change notifications for one session as Server-Sent Events.
///
/// Each event only signals that the session changed; clients re-fetch the
/// session or its results to see the new state. A `resync` event means
/// notifications were lost and the client must re-fetch as well.
pub async fn session_events(
    State(state): State<AppState>,
    Path(session_id): Path<Uuid>,
) -> Result<Sse<impl Stream<Item = std::result::Result<Event, Infallible>>>> {
    let receiver = state.events.subscribe();

    let mut tx = state.store.begin().await?;
    if tx.get_session(session_id).await?.is_none() {
        return Err(AppError::NotFound("Session not found".to_string()));
    }
    drop(tx);

    tracing::debug!("📡 Event stream opened for session {}", session_id);

    let stream = session_updates(receiver, session_id)
        .map(|update| Ok::<_, Infallible>(update.into_sse()));

    Ok(Sse::new(stream).keep_alive(KeepAlive::default()))
}
