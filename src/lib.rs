//! Group travel-destination voting: sessions, ranked ballots and their
//! points-based aggregation, served over HTTP.

pub mod config;
pub mod db;
pub mod error;
pub mod events;
pub mod routes;
pub mod state;
pub mod store;

pub mod crypto {
    pub mod token;
}

pub mod models {
    pub mod participant;
    pub mod results;
    pub mod session;
    pub mod vote;
}

pub mod services {
    pub mod participants;
    pub mod scoring;
    pub mod sessions;
    pub mod sweeper;
    pub mod votes;
}

pub mod handlers {
    pub mod events;
    pub mod participants;
    pub mod sessions;
}

pub mod validation {
    pub mod session;
}

pub use config::Config;
pub use error::{AppError, Result};
pub use state::AppState;
