//! Configuration management

use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, Result};

use crate::services::bulk_job_worker::WorkerConfig;

/// Application configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// NATS server URL
    pub nats_url: String,

    /// Optional NATS credentials (both must be set)
    pub nats_user: Option<String>,
    pub nats_password: Option<String>,

    /// PostgreSQL connection string
    pub database_url: String,

    pub db_max_connections: u32,

    /// Upper bound for one blocking dequeue
    pub queue_poll_interval: Duration,

    /// Persist job progress every N items
    pub progress_batch_size: usize,
}

/// Parse an optional variable value, falling back to `default` when unset or blank
fn parse_or<T>(name: &str, value: Option<String>, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match value {
        Some(raw) if !raw.trim().is_empty() => raw
            .trim()
            .parse()
            .with_context(|| format!("{} has an invalid value: {:?}", name, raw)),
        _ => Ok(default),
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.is_empty())
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        // Load .env file if present
        dotenvy::dotenv().ok();

        let var = |name: &str| std::env::var(name).ok();

        let nats_url = var("NATS_URL").unwrap_or_else(|| "nats://localhost:4222".to_string());

        let database_url = std::env::var("DATABASE_URL").context("DATABASE_URL must be set")?;

        let poll_ms: u64 = parse_or("QUEUE_POLL_INTERVAL_MS", var("QUEUE_POLL_INTERVAL_MS"), 1000)?;

        Ok(Self {
            nats_url,
            nats_user: non_empty(var("NATS_USER")),
            nats_password: non_empty(var("NATS_PASSWORD")),
            database_url,
            db_max_connections: parse_or("DB_MAX_CONNECTIONS", var("DB_MAX_CONNECTIONS"), 10)?,
            queue_poll_interval: Duration::from_millis(poll_ms.max(1)),
            progress_batch_size: parse_or("PROGRESS_BATCH_SIZE", var("PROGRESS_BATCH_SIZE"), 100)?,
        })
    }

    pub fn worker_config(&self) -> WorkerConfig {
        WorkerConfig {
            poll_interval: self.queue_poll_interval,
            progress_batch_size: self.progress_batch_size.max(1),
        }
    }

    /// Credentials, if both user and password are configured
    pub fn nats_credentials(&self) -> Option<(String, String)> {
        match (&self.nats_user, &self.nats_password) {
            (Some(user), Some(password)) => Some((user.clone(), password.clone())),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> Config {
        Config {
            nats_url: "nats://localhost:4222".to_string(),
            nats_user: None,
            nats_password: None,
            database_url: "postgres://test".to_string(),
            db_max_connections: 10,
            queue_poll_interval: Duration::from_millis(1000),
            progress_batch_size: 100,
        }
    }

    #[test]
    fn test_parse_or_uses_default_when_unset_or_blank() {
        assert_eq!(parse_or::<u32>("X", None, 7).unwrap(), 7);
        assert_eq!(parse_or::<u32>("X", Some("  ".to_string()), 7).unwrap(), 7);
    }

    #[test]
    fn test_parse_or_parses_value() {
        assert_eq!(parse_or::<u64>("X", Some(" 250 ".to_string()), 1000).unwrap(), 250);
    }

    #[test]
    fn test_parse_or_rejects_garbage_with_variable_name() {
        let err = parse_or::<usize>("PROGRESS_BATCH_SIZE", Some("lots".to_string()), 100).unwrap_err();
        assert!(err.to_string().contains("PROGRESS_BATCH_SIZE"));
    }

    #[test]
    fn test_worker_config_never_uses_zero_batch() {
        let mut config = config();
        config.progress_batch_size = 0;
        assert_eq!(config.worker_config().progress_batch_size, 1);
        assert_eq!(config.worker_config().poll_interval, Duration::from_secs(1));
    }

    #[test]
    fn test_credentials_need_user_and_password() {
        let mut config = config();
        config.nats_user = Some("agro".to_string());
        assert!(config.nats_credentials().is_none());

        config.nats_password = Some("secret".to_string());
        assert_eq!(
            config.nats_credentials(),
            Some(("agro".to_string(), "secret".to_string()))
        );
    }

    #[test]
    fn test_non_empty_drops_blank() {
        assert_eq!(non_empty(Some(String::new())), None);
        assert_eq!(non_empty(Some("a".to_string())), Some("a".to_string()));
    }
}
