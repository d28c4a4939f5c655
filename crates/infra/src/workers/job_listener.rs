use std::future::Future;
use std::sync::Arc;

use tokio::sync::oneshot;
use tokio::task::{JoinHandle, JoinSet};
use tracing::{debug, error, info, warn};

use linkpeek_core::JobBinding;
use linkpeek_events::{Notifier, Subscription};

use crate::coordinator::{CoordinatorError, JobCoordinator};
use crate::record_store::RecordStore;

/// Handle to control and join a running job listener.
///
/// Dropping the handle stops the listener; handlers already dispatched keep
/// running on their own tasks.
#[derive(Debug)]
pub struct JobListener {
    shutdown: Option<oneshot::Sender<()>>,
    join: JoinHandle<Result<(), CoordinatorError>>,
}

impl JobListener {
    /// Spawn the claim loop for `coordinator`'s namespace.
    ///
    /// - `subscription`: key-created events for the namespace
    /// - `handler`: invoked once per job this listener wins
    pub(crate) fn spawn<B, S, N, H, Fut>(
        coordinator: JobCoordinator<B, S, N>,
        subscription: Subscription,
        handler: H,
    ) -> Self
    where
        B: JobBinding,
        S: RecordStore + 'static,
        N: Notifier + 'static,
        H: Fn(B::Id) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let join = tokio::spawn(listen_loop(coordinator, subscription, shutdown_rx, Arc::new(handler)));

        Self {
            shutdown: Some(shutdown_tx),
            join,
        }
    }

    /// Request graceful shutdown and wait for in-flight handlers to finish.
    pub async fn shutdown(mut self) -> Result<(), CoordinatorError> {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        Self::await_join(self.join).await
    }

    /// Wait until the listener stops on its own (connection loss).
    pub async fn join(self) -> Result<(), CoordinatorError> {
        let JobListener { shutdown, join } = self;
        let result = Self::await_join(join).await;
        drop(shutdown);
        result
    }

    /// Run until `signal` resolves (then shut down gracefully) or the listener
    /// stops on its own, whichever happens first.
    pub async fn run_until<F>(mut self, signal: F) -> Result<(), CoordinatorError>
    where
        F: Future<Output = ()>,
    {
        let stopped = tokio::select! {
            _ = signal => None,
            joined = &mut self.join => Some(joined),
        };

        match stopped {
            None => self.shutdown().await,
            Some(Ok(result)) => result,
            Some(Err(err)) => Err(CoordinatorError::Listener(err.to_string())),
        }
    }

    pub fn is_finished(&self) -> bool {
        self.join.is_finished()
    }

    async fn await_join(join: JoinHandle<Result<(), CoordinatorError>>) -> Result<(), CoordinatorError> {
        match join.await {
            Ok(result) => result,
            Err(err) => Err(CoordinatorError::Listener(err.to_string())),
        }
    }
}

async fn listen_loop<B, S, N, H, Fut>(
    coordinator: JobCoordinator<B, S, N>,
    mut subscription: Subscription,
    mut shutdown_rx: oneshot::Receiver<()>,
    handler: Arc<H>,
) -> Result<(), CoordinatorError>
where
    B: JobBinding,
    S: RecordStore + 'static,
    N: Notifier + 'static,
    H: Fn(B::Id) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    let namespace = coordinator.binding().namespace().to_string();
    let mut in_flight = JoinSet::new();

    loop {
        tokio::select! {
            _ = &mut shutdown_rx => {
                info!(%namespace, in_flight = in_flight.len(), "job listener stopping");
                break;
            }
            event = subscription.recv() => {
                let Some(event) = event else {
                    coordinator.teardown("job notifications closed").await;
                    return Err(CoordinatorError::Connection(format!(
                        "notification stream for `{namespace}` closed"
                    )));
                };

                match coordinator.try_claim(event.key()).await {
                    Ok(Some(id)) => {
                        debug!(%namespace, id = ?id, "dispatching job");
                        let handler = Arc::clone(&handler);
                        in_flight.spawn(async move { handler(id).await });
                    }
                    Ok(None) => {}
                    Err(err) if err.is_connection() => return Err(err),
                    Err(err) => warn!(%namespace, key = event.key(), error = %err, "claim failed; skipping job"),
                }
            }
            Some(done) = in_flight.join_next(), if !in_flight.is_empty() => {
                if let Err(err) = done {
                    error!(%namespace, error = %err, "job handler panicked");
                }
            }
        }
    }

    drop(subscription);
    while let Some(done) = in_flight.join_next().await {
        if let Err(err) = done {
            warn!(%namespace, error = %err, "job handler panicked during shutdown");
        }
    }
    Ok(())
}
