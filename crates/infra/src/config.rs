use std::env;
use std::time::Duration;

use anyhow::{Context, Result};
use dotenvy::dotenv;

use crate::coordinator::CoordinatorConfig;

pub const DEFAULT_REDIS_URL: &str = "redis://127.0.0.1:6379";
pub const DEFAULT_JOB_TIMEOUT: Duration = Duration::from_millis(20_000);
pub const DEFAULT_HOME_REDIRECT: &str = "https://github.com/the6p4c/cohost-embed#readme";

/// Process configuration loaded from environment variables.
///
/// Shared by the HTTP producer and the worker; each reads what it needs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub redis_url: String,
    /// How long a producer waits for a job to complete.
    pub job_timeout: Duration,
    /// Lifetime of job records; `None` keeps them forever.
    pub record_ttl: Option<Duration>,
    /// Issue `CONFIG SET notify-keyspace-events` on connect.
    pub configure_keyspace_events: bool,
    pub base_url: String,
    pub port: u16,
    pub home_redirect: String,
    pub log_level: String,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        // Load .env file if present (development)
        let _ = dotenv();

        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Load configuration from an arbitrary variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let job_timeout = match lookup("JOB_TIMEOUT_MS") {
            Some(raw) => Duration::from_millis(
                raw.trim()
                    .parse()
                    .context("JOB_TIMEOUT_MS must be a number of milliseconds")?,
            ),
            None => DEFAULT_JOB_TIMEOUT,
        };

        let record_ttl = match lookup("JOB_RECORD_TTL_SECS") {
            Some(raw) if !raw.trim().is_empty() => {
                let secs: u64 = raw
                    .trim()
                    .parse()
                    .context("JOB_RECORD_TTL_SECS must be a number of seconds")?;
                (secs > 0).then(|| Duration::from_secs(secs))
            }
            _ => None,
        };

        let configure_keyspace_events = match lookup("CONFIGURE_KEYSPACE_EVENTS") {
            Some(raw) => parse_flag(&raw).context("CONFIGURE_KEYSPACE_EVENTS must be true or false")?,
            None => false,
        };

        let port = lookup("PORT")
            .unwrap_or_else(|| "8080".to_string())
            .trim()
            .parse()
            .context("PORT must be a valid number")?;

        let base_url = lookup("BASE_URL").unwrap_or_else(|| format!("http://localhost:{port}"));

        Ok(Self {
            redis_url: lookup("REDIS_URL").unwrap_or_else(|| DEFAULT_REDIS_URL.to_string()),
            job_timeout,
            record_ttl,
            configure_keyspace_events,
            base_url: base_url.trim_end_matches('/').to_string(),
            port,
            home_redirect: lookup("HOME_REDIRECT").unwrap_or_else(|| DEFAULT_HOME_REDIRECT.to_string()),
            log_level: lookup("LOG_LEVEL").unwrap_or_else(|| "info".to_string()),
        })
    }

    pub fn coordinator_config(&self) -> CoordinatorConfig {
        CoordinatorConfig {
            record_ttl: self.record_ttl,
        }
    }

    /// Redis-backed coordinator for `binding`, not yet connected.
    #[cfg(feature = "redis")]
    pub fn redis_coordinator<B>(&self, binding: B) -> Result<crate::RedisCoordinator<B>>
    where
        B: linkpeek_core::JobBinding,
    {
        let store = crate::RedisRecordStore::new(&self.redis_url)
            .context("REDIS_URL is not a valid redis url")?
            .with_keyspace_events(self.configure_keyspace_events);
        let notifier = crate::RedisKeyspaceNotifier::new(&self.redis_url)
            .context("REDIS_URL is not a valid redis url")?;

        Ok(crate::JobCoordinator::new(binding, store, notifier).with_config(self.coordinator_config()))
    }
}

fn parse_flag(raw: &str) -> Result<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" | "" => Ok(false),
        other => anyhow::bail!("unrecognized flag value `{other}`"),
    }
}
