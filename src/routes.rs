use axum::{
    Router,
    routing::{delete, get, post, put},
};

use crate::{handlers, state::AppState};

/// Routes that admit new sessions and participants. `main` rate limits them.
pub fn admission_routes(state: AppState) -> Router {
    Router::new()
        .route("/api/sessions", post(handlers::sessions::create_session))
        .route(
            "/api/sessions/{session_id}/participants",
            post(handlers::participants::join_session),
        )
        .with_state(state)
}

/// Every other route.
pub fn session_routes(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/sessions", get(handlers::sessions::list_sessions))
        .route("/api/sessions/{session_id}", get(handlers::sessions::get_session))
        .route(
            "/api/sessions/{session_id}/results",
            get(handlers::sessions::get_results),
        )
        .route(
            "/api/sessions/{session_id}/reveal",
            post(handlers::sessions::reveal_results),
        )
        .route(
            "/api/sessions/{session_id}/events",
            get(handlers::events::session_events),
        )
        .route(
            "/api/sessions/{session_id}/participants/{participant_id}",
            delete(handlers::participants::remove_participant),
        )
        .route(
            "/api/sessions/{session_id}/participants/{participant_id}/reset",
            post(handlers::participants::reset_vote),
        )
        .route(
            "/api/sessions/{session_id}/participants/{participant_id}/vote",
            put(handlers::participants::submit_vote),
        )
        .route(
            "/api/participants/{participant_id}",
            get(handlers::participants::get_participant_status),
        )
        .route(
            "/api/participants/{participant_id}/vote",
            get(handlers::participants::get_vote),
        )
        .with_state(state)
}

/// All routes without rate limiting or transport layers.
pub fn router(state: AppState) -> Router {
    Router::new()
        .merge(admission_routes(state.clone()))
        .merge(session_routes(state))
}

async fn health() -> &'static str {
    "ok"
}
