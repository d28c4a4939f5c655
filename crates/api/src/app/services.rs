use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};

use linkpeek_embed::{EmbedBinding, EmbedData, EmbedJobId};
use linkpeek_infra::config::Config;
use linkpeek_infra::{CoordinatorError, InMemoryCoordinator, RedisCoordinator};

/// Coordinator backing the embed routes.
#[derive(Debug, Clone)]
pub enum EmbedService {
    InMemory(InMemoryCoordinator<EmbedBinding>),
    Redis(RedisCoordinator<EmbedBinding>),
}

impl EmbedService {
    /// Request the preview for `id`, waiting up to `timeout`.
    ///
    /// `Ok(None)` when the job did not complete in time.
    pub async fn lookup(&self, id: &EmbedJobId, timeout: Duration) -> Result<Option<EmbedData>, CoordinatorError> {
        let record = match self {
            EmbedService::InMemory(c) => c.enqueue_job(id, timeout).await,
            EmbedService::Redis(c) => c.enqueue_job(id, timeout).await,
        };

        match record {
            Ok(record) => Ok(record.into_payload()),
            Err(err) => {
                if err.is_connection() {
                    // The failed call tore the coordinator down; bring it back for
                    // the next request.
                    self.reconnect().await;
                }
                Err(err)
            }
        }
    }

    async fn reconnect(&self) {
        let result = match self {
            EmbedService::InMemory(c) => c.connect().await,
            EmbedService::Redis(c) => c.connect().await,
        };
        match result {
            Ok(()) => info!("coordinator reconnected"),
            Err(err) => warn!(error = %err, "coordinator reconnect failed"),
        }
    }

    pub async fn disconnect(&self) {
        let result = match self {
            EmbedService::InMemory(c) => c.disconnect().await,
            EmbedService::Redis(c) => c.disconnect().await,
        };
        if let Err(err) = result {
            warn!(error = %err, "coordinator disconnect failed");
        }
    }
}

/// Request-independent settings of the HTTP producer.
#[derive(Debug, Clone)]
pub struct Settings {
    /// Public origin, without trailing slash.
    pub base_url: String,
    pub job_timeout: Duration,
    pub home_redirect: String,
}

impl Settings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            base_url: config.base_url.clone(),
            job_timeout: config.job_timeout,
            home_redirect: config.home_redirect.clone(),
        }
    }
}

/// Shared state handed to every handler.
#[derive(Debug, Clone)]
pub struct AppServices {
    pub embeds: Arc<EmbedService>,
    pub settings: Arc<Settings>,
}

impl AppServices {
    pub fn new(embeds: EmbedService, settings: Settings) -> Self {
        Self {
            embeds: Arc::new(embeds),
            settings: Arc::new(settings),
        }
    }
}
