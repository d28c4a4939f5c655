//! Single-flight job coordination.
//!
//! This module implements the **single-flight pattern** over a shared record
//! store: many producers ask for the result of job K, exactly one consumer
//! computes it, and every producer (early, concurrent, or late) sees the same
//! result. Producers and consumers never talk to each other; the record store
//! and its change notifications mediate everything.
//!
//! ## Job Lifecycle
//!
//! ```text
//! (absent) ──enqueue_job──▶ waiting ──claim (listener)──▶ claimed ──complete_job──▶ complete
//! ```
//!
//! - **enqueue_job**: subscribe to K's field-set events, atomically create-and-read
//!   the record, then wait for `complete` or the timeout, whichever is first
//! - **listen_for_jobs**: on every key-created event, race to set `claimed`;
//!   only the winner's handler runs
//! - **complete_job**: write `payload` unless one is already there, which
//!   wakes every waiting producer
//!
//! ## Guarantees
//!
//! - At most one claim and at most one handler invocation per record, across
//!   any number of listening processes (store-side conditional create)
//! - A completed record is returned without waiting
//! - `enqueue_job` never waits longer than its timeout; timing out is a
//!   normal outcome (a non-`complete` record), not an error
//!
//! ## Connection Failures
//!
//! The store and notifier are a lifecycle pair. A connection-class error from
//! either one disconnects both before the error is returned as
//! [`CoordinatorError::Connection`]. A subscription that ends while it is
//! still needed counts as such an error, for producers and listeners alike.
//!
//! This module contains no IO itself; it composes the store and notifier traits.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use thiserror::Error;
use tracing::{debug, error, info, warn};

use linkpeek_core::record::fields;
use linkpeek_core::{CodecError, JobBinding, JobKey, JobRecord, RecordFields};
use linkpeek_events::{InMemoryNotifier, Notifier, NotifierError, Topic};

use crate::record_store::{InMemoryRecordStore, RecordStore, StoreError};
use crate::workers::JobListener;

/// Coordinator failure.
#[derive(Debug, Error)]
pub enum CoordinatorError {
    /// Store or notifier unreachable; both have been torn down. Means "cannot
    /// coordinate", not "job failed".
    #[error("coordination unavailable: {0}")]
    Connection(String),

    /// The store rejected an operation.
    #[error(transparent)]
    Store(StoreError),

    /// An identifier or payload could not be converted (local to one job).
    #[error(transparent)]
    Codec(#[from] CodecError),

    /// The notifier refused a subscription.
    #[error("subscription failed: {0}")]
    Subscribe(String),

    /// The listener task ended abnormally.
    #[error("job listener failed: {0}")]
    Listener(String),
}

impl CoordinatorError {
    pub fn is_connection(&self) -> bool {
        matches!(self, CoordinatorError::Connection(_))
    }
}

/// Coordinator tuning.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CoordinatorConfig {
    /// Lifetime of a job record, applied once when the record is created.
    ///
    /// Bounds how long a job can stay `claimed` after its processor died, and
    /// how long a completed result is served before it is recomputed. `None`
    /// keeps records forever.
    pub record_ttl: Option<Duration>,
}

impl CoordinatorConfig {
    pub fn with_record_ttl(mut self, ttl: Duration) -> Self {
        self.record_ttl = Some(ttl);
        self
    }
}

/// Coordinator over the in-memory store/notifier pair (tests/dev).
pub type InMemoryCoordinator<B> = JobCoordinator<B, InMemoryRecordStore, InMemoryNotifier>;

#[cfg(feature = "redis")]
pub type RedisCoordinator<B> =
    JobCoordinator<B, crate::record_store::RedisRecordStore, crate::event_bus::RedisKeyspaceNotifier>;

/// Single-flight coordinator for one job domain.
///
/// ## Generic Parameters
///
/// - `B`: job binding (identifier/payload conversions and key namespace)
/// - `S`: record store
/// - `N`: notifier paired with `S`
///
/// Cloning is cheap and shares the same store/notifier pair.
pub struct JobCoordinator<B, S, N> {
    binding: Arc<B>,
    store: Arc<S>,
    notifier: Arc<N>,
    config: CoordinatorConfig,
}

impl<B, S, N> Clone for JobCoordinator<B, S, N> {
    fn clone(&self) -> Self {
        Self {
            binding: Arc::clone(&self.binding),
            store: Arc::clone(&self.store),
            notifier: Arc::clone(&self.notifier),
            config: self.config.clone(),
        }
    }
}

impl<B, S, N> core::fmt::Debug for JobCoordinator<B, S, N> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("JobCoordinator")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl<B, S, N> JobCoordinator<B, S, N> {
    pub fn new(binding: B, store: S, notifier: N) -> Self {
        Self::from_shared(Arc::new(binding), Arc::new(store), Arc::new(notifier))
    }

    /// Build from handles that may also be held elsewhere.
    pub fn from_shared(binding: Arc<B>, store: Arc<S>, notifier: Arc<N>) -> Self {
        Self {
            binding,
            store,
            notifier,
            config: CoordinatorConfig::default(),
        }
    }

    pub fn with_config(mut self, config: CoordinatorConfig) -> Self {
        self.config = config;
        self
    }

    pub fn binding(&self) -> &B {
        &self.binding
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    pub fn notifier(&self) -> &Arc<N> {
        &self.notifier
    }

    pub fn config(&self) -> &CoordinatorConfig {
        &self.config
    }
}

impl<B: JobBinding> InMemoryCoordinator<B> {
    /// Coordinator over a fresh in-memory store/notifier pair.
    pub fn in_memory(binding: B) -> Self {
        let notifier = Arc::new(InMemoryNotifier::new());
        let store = Arc::new(InMemoryRecordStore::new(Arc::clone(&notifier)));
        Self::from_shared(Arc::new(binding), store, notifier)
    }
}

impl<B, S, N> JobCoordinator<B, S, N>
where
    B: JobBinding,
    S: RecordStore + 'static,
    N: Notifier + 'static,
{
    /// Open the store and notifier connections (in that order).
    ///
    /// If the notifier fails, the already-open store is closed again.
    pub async fn connect(&self) -> Result<(), CoordinatorError> {
        self.store
            .connect()
            .await
            .map_err(|e| CoordinatorError::Connection(e.to_string()))?;

        if let Err(err) = self.notifier.connect().await {
            if let Err(close_err) = self.store.disconnect().await {
                warn!(error = %close_err, "store disconnect failed after notifier connect failure");
            }
            return Err(CoordinatorError::Connection(err.to_string()));
        }

        info!(namespace = self.binding.namespace(), "coordinator connected");
        Ok(())
    }

    /// Close both connections. Both are attempted; the first failure is returned.
    pub async fn disconnect(&self) -> Result<(), CoordinatorError> {
        let store = self.store.disconnect().await;
        let notifier = self.notifier.disconnect().await;

        info!(namespace = self.binding.namespace(), "coordinator disconnected");

        store.map_err(|e| CoordinatorError::Connection(e.to_string()))?;
        notifier.map_err(|e| CoordinatorError::Connection(e.to_string()))?;
        Ok(())
    }

    /// Connect, run `f`, and disconnect again whatever `f` returned.
    pub async fn run_connected<F, Fut, T>(&self, f: F) -> Result<T, CoordinatorError>
    where
        F: FnOnce(Self) -> Fut,
        Fut: Future<Output = Result<T, CoordinatorError>>,
    {
        self.connect().await?;
        let result = f(self.clone()).await;
        let closed = self.disconnect().await;

        let value = result?;
        closed?;
        Ok(value)
    }

    /// Request the result for `id`, waiting up to `timeout` for it to complete.
    ///
    /// Creates the record (as `waiting`) if this is the first request. Returns
    /// immediately when the record is already `complete`; otherwise returns
    /// the first of:
    ///
    /// - the `complete` record, as soon as a field-set notification reveals it
    /// - the last record read, once `timeout` elapses (`waiting` or `claimed`)
    pub async fn enqueue_job(
        &self,
        id: &B::Id,
        timeout: Duration,
    ) -> Result<JobRecord<B::Payload>, CoordinatorError> {
        let key = self.key_for(id)?;

        // Subscribe before touching the store: a completion landing between
        // the read-back and the subscription would otherwise go unnoticed.
        let mut changes = match self.notifier.subscribe(Topic::field_set(key.as_str())).await {
            Ok(sub) => sub,
            Err(err) => return Err(self.notifier_failure(err).await),
        };

        let enqueued_at = Utc::now().to_rfc3339();
        let raw = match self
            .store
            .create_and_read(key.as_str(), fields::ENQUEUED_AT, &enqueued_at, self.config.record_ttl)
            .await
        {
            Ok(raw) => raw,
            Err(err) => return Err(self.store_failure(err).await),
        };

        let mut record = self.decode(&raw)?;
        if record.is_complete() {
            debug!(%key, "job already complete");
            return Ok(record);
        }

        debug!(%key, state = %record.state(), timeout_ms = timeout.as_millis() as u64, "waiting for job");

        let deadline = tokio::time::sleep(timeout);
        tokio::pin!(deadline);

        loop {
            tokio::select! {
                _ = &mut deadline => {
                    debug!(%key, state = %record.state(), "job wait timed out");
                    return Ok(record);
                }
                event = changes.recv() => match event {
                    Some(_) => {
                        let raw = match self.store.read_fields(key.as_str()).await {
                            Ok(raw) => raw,
                            Err(err) => return Err(self.store_failure(err).await),
                        };
                        record = self.decode(&raw)?;
                        if record.is_complete() {
                            debug!(%key, "job completed while waiting");
                            return Ok(record);
                        }
                    }
                    None => {
                        let reason = format!("change notifications for `{key}` closed");
                        self.teardown(&reason).await;
                        return Err(CoordinatorError::Connection(reason));
                    }
                },
            }
        }
    }

    /// Start claiming and dispatching jobs of this domain.
    ///
    /// For every key-created event in the namespace, race to set the
    /// `claimed` field; when this listener wins, `handler(id)` runs on its own
    /// task. Losing the race (or hearing about a job that is already claimed or
    /// complete) is a silent no-op.
    ///
    /// The handler owns its failure policy: the coordinator does not retry,
    /// and a job whose handler never calls [`complete_job`](Self::complete_job)
    /// stays `claimed` (until `record_ttl` expires it, if configured).
    pub async fn listen_for_jobs<H, Fut>(&self, handler: H) -> Result<JobListener, CoordinatorError>
    where
        H: Fn(B::Id) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let prefix = JobKey::prefix(self.binding.namespace());
        let subscription = match self.notifier.subscribe(Topic::key_created(prefix.clone())).await {
            Ok(sub) => sub,
            Err(err) => return Err(self.notifier_failure(err).await),
        };

        info!(%prefix, "listening for jobs");
        Ok(JobListener::spawn(self.clone(), subscription, handler))
    }

    /// Publish the result for `id`, completing the job and waking waiting producers.
    ///
    /// The first completion wins: once a record carries a payload, later
    /// calls leave it untouched (they are logged and return `Ok`). A
    /// completion that recreates an expired record gets `record_ttl` too.
    pub async fn complete_job(&self, id: &B::Id, payload: &B::Payload) -> Result<(), CoordinatorError> {
        let key = self.key_for(id)?;
        let raw = self.binding.serialize_payload(payload)?;
        let completed_at = Utc::now().to_rfc3339();

        let written = match self
            .store
            .write_fields_if_absent(
                key.as_str(),
                fields::PAYLOAD,
                &[
                    (fields::PAYLOAD, raw.as_str()),
                    (fields::COMPLETED_AT, completed_at.as_str()),
                ],
                self.config.record_ttl,
            )
            .await
        {
            Ok(written) => written,
            Err(err) => return Err(self.store_failure(err).await),
        };

        if written {
            info!(%key, "job completed");
        } else {
            warn!(%key, "job already complete; keeping the first result");
        }
        Ok(())
    }

    /// Read the current record for `id` without creating it.
    ///
    /// `None` when no record exists (never enqueued, or expired).
    pub async fn inspect(&self, id: &B::Id) -> Result<Option<JobRecord<B::Payload>>, CoordinatorError> {
        let key = self.key_for(id)?;
        let raw = match self.store.read_fields(key.as_str()).await {
            Ok(raw) => raw,
            Err(err) => return Err(self.store_failure(err).await),
        };

        if raw.is_empty() {
            return Ok(None);
        }
        self.decode(&raw).map(Some)
    }

    /// Try to claim the job behind a notified key.
    ///
    /// Returns the identifier when this caller won the claim and the job
    /// still needs work. Malformed and vanished keys are skipped.
    pub(crate) async fn try_claim(&self, raw_key: &str) -> Result<Option<B::Id>, CoordinatorError> {
        let namespace = self.binding.namespace();
        let parsed = JobKey::parse(namespace, raw_key)
            .and_then(|key| self.binding.deserialize_id(key.token()).map(|id| (key, id)));

        let (key, id) = match parsed {
            Ok(parsed) => parsed,
            Err(err) => {
                warn!(key = raw_key, error = %err, "ignoring malformed job key");
                return Ok(None);
            }
        };

        // The key may have expired since it was announced; claiming must not
        // bring it back as a record without an expiry.
        let claimed_at = Utc::now().to_rfc3339();
        match self
            .store
            .set_existing_field_if_absent(key.as_str(), fields::CLAIMED, &claimed_at)
            .await
        {
            Ok(true) => {}
            Ok(false) => {
                debug!(%key, "claim lost");
                return Ok(None);
            }
            Err(err) => return Err(self.store_failure(err).await),
        }

        // A record recreated by a late completion (after expiry) already has
        // its payload; there is nothing left to do for it.
        let raw = match self.store.read_fields(key.as_str()).await {
            Ok(raw) => raw,
            Err(err) => return Err(self.store_failure(err).await),
        };
        if raw.contains_key(fields::PAYLOAD) {
            debug!(%key, "claimed record is already complete");
            return Ok(None);
        }

        info!(%key, "job claimed");
        Ok(Some(id))
    }

    /// Disconnect both halves after a fatal failure.
    pub(crate) async fn teardown(&self, reason: &str) {
        error!(namespace = self.binding.namespace(), reason, "connection lost; tearing down");
        if let Err(err) = self.disconnect().await {
            warn!(error = %err, "teardown did not complete cleanly");
        }
    }

    fn key_for(&self, id: &B::Id) -> Result<JobKey, CoordinatorError> {
        let token = self.binding.serialize_id(id)?;
        Ok(JobKey::new(self.binding.namespace(), &token)?)
    }

    fn decode(&self, raw: &RecordFields) -> Result<JobRecord<B::Payload>, CoordinatorError> {
        Ok(JobRecord::from_fields(raw, |payload| {
            self.binding.deserialize_payload(payload)
        })?)
    }

    async fn store_failure(&self, err: StoreError) -> CoordinatorError {
        if err.is_connection() {
            self.teardown(&err.to_string()).await;
            CoordinatorError::Connection(err.to_string())
        } else {
            CoordinatorError::Store(err)
        }
    }

    async fn notifier_failure(&self, err: NotifierError) -> CoordinatorError {
        if err.is_connection() {
            self.teardown(&err.to_string()).await;
            CoordinatorError::Connection(err.to_string())
        } else {
            CoordinatorError::Subscribe(err.to_string())
        }
    }
}
