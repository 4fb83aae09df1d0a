//! Application configuration

use std::net::SocketAddr;
use std::time::Duration;

use config::builder::DefaultState;
use config::{Config, ConfigBuilder, ConfigError, Environment, File};
use serde::Deserialize;
use serde_with::serde_as;

use crate::error::ConfigurationError;

#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    pub feed: FeedConfig,
    pub database: DatabaseConfig,
    pub scheduler: SchedulerConfig,
    pub health: HealthConfig,
    pub retention: RetentionConfig,
}

#[serde_as]
#[derive(Debug, Deserialize, Clone)]
pub struct FeedConfig {
    pub url: String,
    /// Whole-request timeout for one fetch
    #[serde_as(as = "serde_with::DurationSeconds<u64>")]
    pub timeout: Duration,
    #[serde(default)]
    pub auth: Option<FeedAuth>,
}

/// How the feed's API key is sent.
#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FeedAuth {
    Header { name: String, key: String },
    /// `Authorization: Bearer <key>`
    Bearer { key: String },
    Query { name: String, key: String },
}

#[serde_as]
#[derive(Debug, Deserialize, Clone)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    #[serde_as(as = "serde_with::DurationSeconds<u64>")]
    pub acquire_timeout: Duration,
}

#[serde_as]
#[derive(Debug, Deserialize, Clone)]
pub struct SchedulerConfig {
    #[serde_as(as = "serde_with::DurationSeconds<u64>")]
    pub interval: Duration,
}

#[derive(Debug, Deserialize, Clone)]
pub struct HealthConfig {
    pub addr: SocketAddr,
}

#[serde_as]
#[derive(Debug, Deserialize, Clone)]
pub struct RetentionConfig {
    pub enabled: bool,
    /// Inactive rows last seen longer ago than this are deleted
    #[serde_as(as = "serde_with::DurationSeconds<u64>")]
    pub max_age: Duration,
    #[serde_as(as = "serde_with::DurationSeconds<u64>")]
    pub interval: Duration,
}

impl AppConfig {
    /// Defaults, then `config/default.*`, then `TRACKER__*` environment variables.
    pub fn load() -> Result<Self, ConfigError> {
        Self::defaults()?
            .add_source(File::with_name("config/default").required(false))
            .add_source(
                Environment::with_prefix("TRACKER")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()
    }

    pub(crate) fn defaults() -> Result<ConfigBuilder<DefaultState>, ConfigError> {
        let port = std::env::var("PORT").unwrap_or_else(|_| "4000".to_string());

        Config::builder()
            .set_default("feed.url", std::env::var("API_URL").unwrap_or_default())?
            .set_default("feed.timeout", 10)?
            .set_default(
                "database.url",
                std::env::var("DATABASE_URL").unwrap_or_default(),
            )?
            .set_default("database.max_connections", 5)?
            .set_default("database.acquire_timeout", 5)?
            .set_default("scheduler.interval", 30)?
            .set_default("health.addr", format!("0.0.0.0:{port}"))?
            .set_default("retention.enabled", true)?
            .set_default("retention.max_age", 7 * 24 * 60 * 60)?
            .set_default("retention.interval", 24 * 60 * 60)
    }

    /// Validate configuration parameters
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        if self.feed.url.is_empty() {
            return Err(ConfigurationError::new("Feed url cannot be empty"));
        }
        if self.database.url.is_empty() {
            return Err(ConfigurationError::new("Database url cannot be empty"));
        }
        if self.database.max_connections == 0 {
            return Err(ConfigurationError::new(
                "Database max_connections must be greater than zero",
            ));
        }
        if self.feed.timeout.is_zero() || self.scheduler.interval.is_zero() {
            return Err(ConfigurationError::new(
                "Feed timeout and scheduler interval must be greater than zero",
            ));
        }
        // Pulls must never overlap: a fetch has to time out before the next tick.
        if self.scheduler.interval <= self.feed.timeout {
            return Err(ConfigurationError::new(format!(
                "Scheduler interval ({:?}) must exceed the feed timeout ({:?})",
                self.scheduler.interval, self.feed.timeout
            )));
        }
        if self.retention.enabled
            && (self.retention.max_age.is_zero() || self.retention.interval.is_zero())
        {
            return Err(ConfigurationError::new(
                "Retention max_age and interval must be greater than zero",
            ));
        }
        Ok(())
    }
}
