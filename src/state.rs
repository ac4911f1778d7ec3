use std::sync::Arc;
use redis::aio::ConnectionManager;
use crate::config::Config;
use crate::error::Result;
use crate::events::{self, EventBus};
use crate::store::{MemoryStore, PgStore, Store};

/// The application's state.
#[derive(Clone)]
pub struct AppState {
    /// The session/participant/vote store.
    pub store: Arc<dyn Store>,
    /// Change notifications.
    pub events: EventBus,
    /// The application's configuration.
    pub config: Config,
}

impl AppState {
    /// Creates a new `AppState`.
    ///
    /// Connects to PostgreSQL when `DATABASE_URL` is configured and falls
    /// back to the in-memory store otherwise. When Redis is configured,
    /// session events are forwarded to it.
    ///
    /// # Arguments
    ///
    /// * `config` - The application's configuration.
    ///
    /// # Returns
    ///
    /// A `Result` containing the `AppState`.
    pub async fn new(config: &Config) -> Result<Self> {
        let store: Arc<dyn Store> = match &config.database_url {
            Some(url) => {
                let pool = crate::db::create_pool(url)?;
                crate::db::run_migrations(&pool).await?;
                tracing::info!("✅ PostgreSQL store initialized");
                Arc::new(PgStore::new(pool))
            }
            None => {
                tracing::warn!("⚠️ DATABASE_URL not set, using the in-memory store");
                Arc::new(MemoryStore::new())
            }
        };

        let state = Self::with_store(store, config.clone());

        if let Some(url) = &config.redis_url {
            let redis_client = redis::Client::open(url.as_str())?;
            let redis = ConnectionManager::new(redis_client).await?;
            events::spawn_redis_forwarder(&state.events, redis);
            tracing::info!("✅ Redis event forwarding enabled");
        }

        Ok(state)
    }

    /// Creates an `AppState` over an existing store.
    pub fn with_store(store: Arc<dyn Store>, config: Config) -> Self {
        Self {
            store,
            events: EventBus::new(),
            config,
        }
    }

    /// An `AppState` over a fresh in-memory store with default configuration.
    pub fn in_memory() -> Self {
        Self::with_store(Arc::new(MemoryStore::new()), Config::default())
    }
}
