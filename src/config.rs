use std::env;
use std::fmt::Display;
use std::net::SocketAddr;
use std::str::FromStr;
use anyhow::{Context, Result};

use crate::services::sweeper::RetentionPolicy;

/// The application's configuration.
#[derive(Clone, Debug)]
pub struct Config {
    /// The URL of the PostgreSQL database. The in-memory store is used when unset.
    pub database_url: Option<String>,
    /// The URL of the Redis server. Events stay in-process when unset.
    pub redis_url: Option<String>,
    /// The address the HTTP server binds to.
    pub bind_addr: SocketAddr,
    /// Origins allowed by CORS.
    pub cors_origins: Vec<String>,
    /// How long finished and abandoned sessions are kept.
    pub retention: RetentionPolicy,
    /// Hour of day (UTC) of the retention sweep.
    pub sweep_hour_utc: u32,
    /// Minute of the hour of the retention sweep.
    pub sweep_minute_utc: u32,
    /// Sustained request rate per client IP on create/join routes.
    pub rate_limit_per_second: u64,
    /// Burst size per client IP on create/join routes.
    pub rate_limit_burst: u32,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database_url: None,
            redis_url: None,
            bind_addr: SocketAddr::from(([127, 0, 0, 1], 3000)),
            cors_origins: vec!["http://localhost:3000".to_string()],
            retention: RetentionPolicy::default(),
            sweep_hour_utc: 3,
            sweep_minute_utc: 0,
            rate_limit_per_second: 5,
            rate_limit_burst: 20,
        }
    }
}

fn non_empty_var(name: &str) -> Option<String> {
    env::var(name).ok().filter(|v| !v.trim().is_empty())
}

fn parse_var<T>(name: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: Display,
{
    match non_empty_var(name) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|e| anyhow::anyhow!("{}", e))
            .with_context(|| format!("Invalid {}", name)),
        None => Ok(default),
    }
}

impl Config {
    /// Creates a new `Config` from environment variables.
    ///
    /// # Returns
    ///
    /// A `Result` containing the `Config`.
    pub fn from_env() -> Result<Self> {
        let defaults = Self::default();

        let sweep_hour_utc: u32 = parse_var("SWEEP_HOUR_UTC", defaults.sweep_hour_utc)?;
        if sweep_hour_utc > 23 {
            anyhow::bail!("SWEEP_HOUR_UTC must be between 0 and 23");
        }

        let sweep_minute_utc: u32 = parse_var("SWEEP_MINUTE_UTC", defaults.sweep_minute_utc)?;
        if sweep_minute_utc > 59 {
            anyhow::bail!("SWEEP_MINUTE_UTC must be between 0 and 59");
        }

        let retention = RetentionPolicy {
            completed_days: parse_var("COMPLETED_RETENTION_DAYS", defaults.retention.completed_days)?,
            abandoned_days: parse_var("ABANDONED_RETENTION_DAYS", defaults.retention.abandoned_days)?,
        };
        if retention.completed_days < 1 || retention.abandoned_days < 1 {
            anyhow::bail!("Retention periods must be at least one day");
        }

        let rate_limit_per_second: u64 = parse_var("RATE_LIMIT_PER_SECOND", defaults.rate_limit_per_second)?;
        let rate_limit_burst: u32 = parse_var("RATE_LIMIT_BURST", defaults.rate_limit_burst)?;
        if rate_limit_per_second == 0 || rate_limit_burst == 0 {
            anyhow::bail!("RATE_LIMIT_PER_SECOND and RATE_LIMIT_BURST must be positive");
        }

        let cors_origins = match non_empty_var("CORS_ORIGINS") {
            Some(raw) => raw
                .split(',')
                .map(|origin| origin.trim().to_string())
                .filter(|origin| !origin.is_empty())
                .collect(),
            None => defaults.cors_origins,
        };

        Ok(Self {
            database_url: non_empty_var("DATABASE_URL"),
            redis_url: non_empty_var("REDIS_URL"),
            bind_addr: parse_var("BIND_ADDR", defaults.bind_addr)?,
            cors_origins,
            retention,
            sweep_hour_utc,
            sweep_minute_utc,
            rate_limit_per_second,
            rate_limit_burst,
        })
    }
}
