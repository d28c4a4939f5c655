//! Integration tests for job coordination.
//!
//! Tests: enqueue_job → store → notifier → listener → handler → complete_job
//!
//! Verifies:
//! - Exactly one handler invocation per job across listeners
//! - Producers wake on completion and are bounded by their timeout
//! - The first completion is final
//! - Connection loss tears down the store/notifier pair

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use tokio::time::Instant;

    use linkpeek_core::{JobRecord, JobState, TextBinding};
    use linkpeek_events::Notifier;

    use crate::coordinator::{CoordinatorConfig, CoordinatorError, InMemoryCoordinator};
    use crate::record_store::RecordStore;

    const SHORT: Duration = Duration::from_secs(1);
    const LONG: Duration = Duration::from_secs(60);

    fn setup() -> InMemoryCoordinator<TextBinding> {
        let _ = tracing_subscriber::fmt().with_test_writer().try_init();
        InMemoryCoordinator::in_memory(TextBinding::new("test"))
    }

    /// Listener whose handler completes every job with `"done:{id}"` after `delay`.
    async fn completing_listener(
        coordinator: &InMemoryCoordinator<TextBinding>,
        delay: Duration,
        calls: Arc<AtomicUsize>,
    ) -> crate::JobListener {
        let completer = coordinator.clone();
        coordinator
            .listen_for_jobs(move |id: String| {
                let completer = completer.clone();
                let calls = Arc::clone(&calls);
                async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    tokio::time::sleep(delay).await;
                    completer
                        .complete_job(&id, &format!("done:{id}"))
                        .await
                        .unwrap();
                }
            })
            .await
            .unwrap()
    }

    #[tokio::test(start_paused = true)]
    async fn enqueue_without_listener_times_out_waiting() {
        let coordinator = setup();
        coordinator.connect().await.unwrap();

        let started = Instant::now();
        let record = coordinator.enqueue_job(&"a".to_string(), SHORT).await.unwrap();

        assert_eq!(record, JobRecord::Waiting);
        assert!(started.elapsed() >= SHORT);
        assert_eq!(coordinator.store().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn completion_wakes_waiting_producer_early() {
        let coordinator = setup();
        let calls = Arc::new(AtomicUsize::new(0));
        let _listener = completing_listener(&coordinator, Duration::from_secs(5), calls.clone()).await;

        let started = Instant::now();
        let record = coordinator.enqueue_job(&"a".to_string(), LONG).await.unwrap();

        assert_eq!(record, JobRecord::Complete("done:a".to_string()));
        assert!(started.elapsed() < LONG);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn competing_listeners_dispatch_exactly_once() {
        let coordinator = setup();
        let calls = Arc::new(AtomicUsize::new(0));

        let other = coordinator.clone();
        let _first = completing_listener(&coordinator, Duration::from_millis(100), calls.clone()).await;
        let _second = completing_listener(&other, Duration::from_millis(100), calls.clone()).await;

        for id in ["a", "b", "c"] {
            let record = coordinator.enqueue_job(&id.to_string(), LONG).await.unwrap();
            assert_eq!(record.state(), JobState::Complete);
        }

        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn concurrent_producers_share_one_record() {
        let coordinator = setup();
        let calls = Arc::new(AtomicUsize::new(0));
        let _listener = completing_listener(&coordinator, Duration::from_secs(2), calls.clone()).await;

        let id = "shared".to_string();
        let (a, b, c) = tokio::join!(
            coordinator.enqueue_job(&id, LONG),
            coordinator.enqueue_job(&id, LONG),
            coordinator.enqueue_job(&id, LONG),
        );

        for record in [a.unwrap(), b.unwrap(), c.unwrap()] {
            assert_eq!(record, JobRecord::Complete("done:shared".to_string()));
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(coordinator.store().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn late_producer_reads_completed_result_immediately() {
        let coordinator = setup();
        let id = "a".to_string();

        coordinator.enqueue_job(&id, SHORT).await.unwrap();
        coordinator.complete_job(&id, &"result".to_string()).await.unwrap();

        let started = Instant::now();
        let record = coordinator.enqueue_job(&id, LONG).await.unwrap();

        assert_eq!(record, JobRecord::Complete("result".to_string()));
        assert_eq!(started.elapsed(), Duration::ZERO);

        // Re-enqueueing a completed job never dispatches it again.
        let calls = Arc::new(AtomicUsize::new(0));
        let _listener = completing_listener(&coordinator, Duration::ZERO, calls.clone()).await;
        coordinator.enqueue_job(&id, SHORT).await.unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn second_completion_keeps_the_first_payload() {
        let coordinator = setup();
        let id = "a".to_string();

        coordinator.enqueue_job(&id, SHORT).await.unwrap();
        coordinator.complete_job(&id, &"first".to_string()).await.unwrap();
        coordinator.complete_job(&id, &"second".to_string()).await.unwrap();

        let record = coordinator.enqueue_job(&id, SHORT).await.unwrap();
        assert_eq!(record, JobRecord::Complete("first".to_string()));
    }

    #[tokio::test(start_paused = true)]
    async fn concurrent_producers_without_listener_share_one_waiting_record() {
        let coordinator = setup();
        let id = "shared".to_string();

        let (a, b) = tokio::join!(coordinator.enqueue_job(&id, SHORT), coordinator.enqueue_job(&id, SHORT));

        assert_eq!(a.unwrap(), JobRecord::Waiting);
        assert_eq!(b.unwrap(), JobRecord::Waiting);
        assert_eq!(coordinator.store().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn invalid_identifier_fails_only_its_own_call() {
        let coordinator = setup();

        let err = coordinator.enqueue_job(&"a b".to_string(), SHORT).await.unwrap_err();
        assert!(matches!(err, CoordinatorError::Codec(_)));
        assert!(coordinator.store().is_empty());
        assert_eq!(coordinator.notifier().subscriber_count(), 0);

        // Nothing was torn down; other jobs still work.
        let record = coordinator.enqueue_job(&"ab".to_string(), SHORT).await.unwrap();
        assert_eq!(record, JobRecord::Waiting);
    }

    #[tokio::test(start_paused = true)]
    async fn handler_that_never_completes_leaves_job_claimed() {
        let coordinator = setup();
        let _listener = coordinator.listen_for_jobs(|_id: String| async {}).await.unwrap();

        let record = coordinator.enqueue_job(&"a".to_string(), SHORT).await.unwrap();
        assert_eq!(record, JobRecord::Claimed);

        let stored = coordinator.inspect(&"a".to_string()).await.unwrap();
        assert_eq!(stored, Some(JobRecord::Claimed));
        assert_eq!(coordinator.inspect(&"missing".to_string()).await.unwrap(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn expired_records_are_recreated_and_dispatched_again() {
        let coordinator = setup().with_config(CoordinatorConfig::default().with_record_ttl(Duration::from_secs(10)));
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let _listener = coordinator
            .listen_for_jobs(move |_id: String| {
                let counter = Arc::clone(&counter);
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                }
            })
            .await
            .unwrap();

        let id = "stuck".to_string();
        assert_eq!(coordinator.enqueue_job(&id, SHORT).await.unwrap(), JobRecord::Claimed);
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        tokio::time::sleep(Duration::from_secs(11)).await;

        assert_eq!(coordinator.enqueue_job(&id, SHORT).await.unwrap(), JobRecord::Claimed);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn expired_keys_are_not_revived_by_a_claim() {
        let coordinator = setup().with_config(CoordinatorConfig::default().with_record_ttl(Duration::from_secs(10)));
        let id = "gone".to_string();

        coordinator.enqueue_job(&id, SHORT).await.unwrap();
        tokio::time::sleep(Duration::from_secs(11)).await;

        // A key-created event for the expired key arrives late.
        assert_eq!(coordinator.try_claim("test:gone").await.unwrap(), None);
        assert!(coordinator.store().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn late_completion_after_expiry_still_expires() {
        let ttl = Duration::from_secs(10);
        let coordinator = setup().with_config(CoordinatorConfig::default().with_record_ttl(ttl));
        let id = "slow".to_string();

        coordinator.enqueue_job(&id, SHORT).await.unwrap();
        tokio::time::sleep(ttl + SHORT).await;

        coordinator.complete_job(&id, &"late".to_string()).await.unwrap();
        assert_eq!(
            coordinator.inspect(&id).await.unwrap(),
            Some(JobRecord::Complete("late".to_string()))
        );

        tokio::time::sleep(ttl + SHORT).await;
        assert_eq!(coordinator.inspect(&id).await.unwrap(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn enqueue_releases_its_subscription() {
        let coordinator = setup();

        coordinator.enqueue_job(&"a".to_string(), SHORT).await.unwrap();
        coordinator.complete_job(&"a".to_string(), &"x".to_string()).await.unwrap();
        coordinator.enqueue_job(&"a".to_string(), SHORT).await.unwrap();

        assert_eq!(coordinator.notifier().subscriber_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn malformed_keys_do_not_stop_the_listener() {
        let coordinator = setup();
        let calls = Arc::new(AtomicUsize::new(0));
        let listener = completing_listener(&coordinator, Duration::ZERO, calls.clone()).await;

        coordinator
            .store()
            .write_fields("test:bad key", &[("enqueued_at", "now")])
            .await
            .unwrap();

        let record = coordinator.enqueue_job(&"good".to_string(), LONG).await.unwrap();
        assert_eq!(record.state(), JobState::Complete);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(!listener.is_finished());
    }

    #[tokio::test(start_paused = true)]
    async fn store_connection_loss_tears_down_both_halves() {
        let coordinator = setup();
        coordinator.connect().await.unwrap();
        coordinator.store().sever();

        let err = coordinator.enqueue_job(&"a".to_string(), SHORT).await.unwrap_err();

        assert!(matches!(err, CoordinatorError::Connection(_)));
        assert!(!coordinator.notifier().is_connected());
        assert!(coordinator.listen_for_jobs(|_id: String| async {}).await.is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn listener_ends_with_connection_error_when_notifications_stop() {
        let coordinator = setup();
        let listener = coordinator.listen_for_jobs(|_id: String| async {}).await.unwrap();

        coordinator.notifier().disconnect().await.unwrap();

        let err = listener.join().await.unwrap_err();
        assert!(err.is_connection());
        assert!(coordinator.store().read_fields("test:a").await.is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn waiting_producer_fails_when_change_notifications_stop() {
        let coordinator = setup();
        let waiting = coordinator.clone();
        let producer = tokio::spawn(async move { waiting.enqueue_job(&"a".to_string(), LONG).await });

        tokio::time::sleep(SHORT).await;
        coordinator.notifier().disconnect().await.unwrap();

        let err = producer.await.unwrap().unwrap_err();
        assert!(err.is_connection());
        assert!(coordinator.store().read_fields("test:a").await.is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_waits_for_in_flight_handlers() {
        let coordinator = setup();
        let calls = Arc::new(AtomicUsize::new(0));
        let listener = completing_listener(&coordinator, Duration::from_secs(5), calls.clone()).await;

        let record = coordinator.enqueue_job(&"a".to_string(), SHORT).await.unwrap();
        assert_eq!(record, JobRecord::Claimed);

        listener.shutdown().await.unwrap();

        let stored = coordinator.inspect(&"a".to_string()).await.unwrap();
        assert_eq!(stored, Some(JobRecord::Complete("done:a".to_string())));
    }

    #[tokio::test(start_paused = true)]
    async fn run_until_stops_on_signal_or_connection_loss() {
        let coordinator = setup();

        let listener = coordinator.listen_for_jobs(|_id: String| async {}).await.unwrap();
        listener
            .run_until(tokio::time::sleep(SHORT))
            .await
            .unwrap();

        let listener = coordinator.listen_for_jobs(|_id: String| async {}).await.unwrap();
        coordinator.notifier().disconnect().await.unwrap();
        let err = listener.run_until(std::future::pending()).await.unwrap_err();
        assert!(err.is_connection());
    }

    #[tokio::test(start_paused = true)]
    async fn run_connected_disconnects_afterwards() {
        let coordinator = setup();

        let record = coordinator
            .run_connected(|c| async move { c.enqueue_job(&"a".to_string(), SHORT).await })
            .await
            .unwrap();

        assert_eq!(record, JobRecord::Waiting);
        assert!(!coordinator.notifier().is_connected());
    }

    #[cfg(feature = "redis")]
    mod redis_backed {
        use super::*;

        use crate::config::Config;

        /// Requires a reachable Redis at `REDIS_URL`.
        #[tokio::test]
        #[ignore = "requires redis"]
        async fn redis_round_trip() {
            let mut config = Config::from_env().unwrap();
            config.configure_keyspace_events = true;
            config.record_ttl = Some(Duration::from_secs(30));

            let namespace = format!("it{}", std::process::id());
            let coordinator = config.redis_coordinator(TextBinding::new(namespace)).unwrap();
            coordinator.connect().await.unwrap();

            let completer = coordinator.clone();
            let listener = coordinator
                .listen_for_jobs(move |id: String| {
                    let completer = completer.clone();
                    async move {
                        completer.complete_job(&id, &format!("done:{id}")).await.unwrap();
                    }
                })
                .await
                .unwrap();

            let record = coordinator
                .enqueue_job(&"a".to_string(), Duration::from_secs(10))
                .await
                .unwrap();
            assert_eq!(record, JobRecord::Complete("done:a".to_string()));

            listener.shutdown().await.unwrap();
            coordinator.disconnect().await.unwrap();
        }
    }
}
