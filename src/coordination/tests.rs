//! Coordination Module Tests
//!
//! Drives the roles against an in-process `MemoryStore`.
//!
//! ## Test Scopes
//! - **Types**: message format and routing.
//! - **Locks**: exclusivity of the token-owned guard.
//! - **Election**: the claim decision for every holder situation.
//! - **Generator**: resume point, supersession, completion and failed pushes.
//! - **Acceptor**: routing of faulty, malformed and unparseable entries.
//! - **Scenarios**: a single-process run, three racing workers, and a failover while
//!   the successor is already running.

#[cfg(test)]
mod tests {
    use crate::config::ClusterConfig;
    use crate::coordination::acceptor::Acceptor;
    use crate::coordination::cadence::now_secs;
    use crate::coordination::election::{ElectionCoordinator, ElectionOutcome};
    use crate::coordination::generator::{Generator, GeneratorOutcome};
    use crate::coordination::lock::LockGuard;
    use crate::coordination::maintenance;
    use crate::coordination::types::{Disposition, Message, ProcessName, keys, read_start};
    use crate::coordination::worker::Worker;
    use crate::store::SharedStore;
    use crate::store::memory::MemoryStore;
    use anyhow::Result;
    use async_trait::async_trait;
    use std::collections::HashSet;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::time::{Duration, Instant};
    use tokio::sync::watch;

    fn fast_config(count: u64) -> ClusterConfig {
        ClusterConfig {
            interval: Duration::from_millis(100),
            max_interval: Duration::from_millis(300),
            message_count: count,
            poll_timeout: Duration::from_millis(50),
            lock_wait: Duration::from_millis(100),
            lock_ttl: Duration::from_secs(1),
            ..ClusterConfig::default()
        }
    }

    fn stores() -> (Arc<MemoryStore>, Arc<dyn SharedStore>) {
        let memory = Arc::new(MemoryStore::new());
        let store: Arc<dyn SharedStore> = memory.clone();
        (memory, store)
    }

    fn name(raw: &str) -> ProcessName {
        ProcessName(raw.to_string())
    }

    fn indices(entries: &[String]) -> Vec<u64> {
        entries
            .iter()
            .map(|raw| raw.parse::<Message>().unwrap().index)
            .collect()
    }

    // ============================================================
    // TYPES
    // ============================================================

    #[test]
    fn test_message_parse_and_display() {
        let message: Message = "12:message-7".parse().unwrap();

        assert_eq!(message.index, 12);
        assert_eq!(message.body, "message-7");
        assert_eq!(message.suffix(), Some(7));
        assert_eq!(message.to_string(), "12:message-7");
    }

    #[test]
    fn test_unparseable_entries_are_rejected() {
        assert!("no-separator".parse::<Message>().is_err());
        assert!("x:message-1".parse::<Message>().is_err());
        assert!("-1:message-1".parse::<Message>().is_err());
    }

    #[test]
    fn test_disposition_threshold() {
        assert_eq!(Message::with_suffix(1, 1).disposition(), Disposition::Faulty);
        assert_eq!(Message::with_suffix(1, 5).disposition(), Disposition::Faulty);
        assert_eq!(Message::with_suffix(1, 6).disposition(), Disposition::Regular);
        assert_eq!(Message::with_suffix(1, 100).disposition(), Disposition::Regular);

        let odd: Message = "4:hello".parse().unwrap();
        assert_eq!(odd.disposition(), Disposition::Malformed);
    }

    #[test]
    fn test_generated_suffix_is_in_range() {
        for index in 1..=200 {
            let message = Message::generate(index);

            assert_eq!(message.index, index);
            let suffix = message.suffix().unwrap();
            assert!((1..=100).contains(&suffix), "suffix {} out of range", suffix);
        }
    }

    #[test]
    fn test_process_name_format() {
        assert_eq!(ProcessName::from_parts("node", 42).as_str(), "node-42");
        assert!(!ProcessName::current().as_str().is_empty());
    }

    // ============================================================
    // LOCKS
    // ============================================================

    #[tokio::test]
    async fn test_lock_guard_is_exclusive() {
        let (memory, store) = stores();
        let ttl = Duration::from_secs(1);
        let wait = Duration::from_millis(30);

        let first = LockGuard::acquire(&store, keys::GEN_LOCK, ttl, wait)
            .await
            .unwrap()
            .expect("free lock must be acquired");
        let second = LockGuard::acquire(&store, keys::GEN_LOCK, ttl, wait)
            .await
            .unwrap();
        assert!(second.is_none());
        assert_eq!(first.name(), keys::GEN_LOCK);

        assert!(first.release().await.unwrap());
        assert_eq!(memory.lock_holder(keys::GEN_LOCK), None);

        let third = LockGuard::acquire(&store, keys::GEN_LOCK, ttl, wait)
            .await
            .unwrap();
        assert!(third.is_some());
    }

    // ============================================================
    // ELECTION
    // ============================================================

    #[tokio::test]
    async fn test_claim_without_holder_elects_self() {
        let (_memory, store) = stores();
        let (_tx, rx) = watch::channel(false);
        let election = ElectionCoordinator::new(store.clone(), name("host-a"), fast_config(5), rx);

        let outcome = election.claim().await.unwrap();

        assert_eq!(outcome, ElectionOutcome::Elected { previous: None });
        assert_eq!(
            store.get(keys::GENERATOR).await.unwrap(),
            Some("host-a".to_string())
        );
    }

    #[tokio::test]
    async fn test_claim_by_holder_is_incumbent() {
        let (_memory, store) = stores();
        store.set(keys::GENERATOR, "host-a").await.unwrap();
        let (_tx, rx) = watch::channel(false);
        let election = ElectionCoordinator::new(store.clone(), name("host-a"), fast_config(5), rx);

        let outcome = election.claim().await.unwrap();

        assert_eq!(outcome, ElectionOutcome::Incumbent);
    }

    #[tokio::test]
    async fn test_claim_replaces_other_holder() {
        let (_memory, store) = stores();
        store.set(keys::GENERATOR, "host-a").await.unwrap();
        let (_tx, rx) = watch::channel(false);
        let election = ElectionCoordinator::new(store.clone(), name("host-b"), fast_config(5), rx);

        let outcome = election.claim().await.unwrap();

        assert_eq!(
            outcome,
            ElectionOutcome::Elected {
                previous: Some("host-a".to_string())
            }
        );
        assert_eq!(
            store.get(keys::GENERATOR).await.unwrap(),
            Some("host-b".to_string())
        );
    }

    #[tokio::test]
    async fn test_claim_gives_up_while_lock_held_elsewhere() {
        // ARRANGE: another process sits on gen_lock
        let (_memory, store) = stores();
        store
            .try_lock(keys::GEN_LOCK, "someone-else", Duration::from_secs(5))
            .await
            .unwrap();
        let (_tx, rx) = watch::channel(false);
        let election = ElectionCoordinator::new(store.clone(), name("host-b"), fast_config(5), rx);

        // ACT
        let outcome = election.ensure_generator().await.unwrap();

        // ASSERT: nothing written, nothing started
        assert_eq!(outcome, ElectionOutcome::LockUnavailable);
        assert_eq!(store.get(keys::GENERATOR).await.unwrap(), None);
        assert!(!election.generator_running().await);
    }

    // ============================================================
    // GENERATOR
    // ============================================================

    fn generator(store: &Arc<dyn SharedStore>, owner: &str, count: u64) -> Generator {
        let (_tx, rx) = watch::channel(false);
        let config = ClusterConfig {
            interval: Duration::from_millis(10),
            max_interval: Duration::from_millis(30),
            ..fast_config(count)
        };
        Generator::new(store.clone(), name(owner), config, rx)
    }

    #[tokio::test]
    async fn test_generator_resumes_after_last_index() {
        // ARRANGE: a predecessor already emitted 1..=3
        let (memory, store) = stores();
        store.set(keys::GENERATOR, "host-b").await.unwrap();
        store.set(keys::START, "1700000000.000000").await.unwrap();
        store.set(keys::LAST_INDEX, "3").await.unwrap();

        // ACT
        let outcome = generator(&store, "host-b", 5).run().await;

        // ASSERT
        assert_eq!(outcome, GeneratorOutcome::Complete { emitted: 2 });
        assert_eq!(indices(&memory.peek_list(keys::QUEUE)), vec![4, 5]);
        assert_eq!(
            store.get(keys::LAST_INDEX).await.unwrap(),
            Some("6".to_string())
        );
        // The anchor of the run is never moved.
        assert_eq!(
            store.get(keys::START).await.unwrap(),
            Some("1700000000.000000".to_string())
        );
    }

    #[tokio::test]
    async fn test_superseded_generator_emits_nothing() {
        let (memory, store) = stores();
        store.set(keys::GENERATOR, "host-b").await.unwrap();
        store.set(keys::LAST_INDEX, "2").await.unwrap();

        let outcome = generator(&store, "host-a", 5).run().await;

        assert_eq!(outcome, GeneratorOutcome::Superseded { emitted: 0 });
        assert!(memory.peek_list(keys::QUEUE).is_empty());
        assert_eq!(
            store.get(keys::LAST_INDEX).await.unwrap(),
            Some("2".to_string())
        );
    }

    #[tokio::test]
    async fn test_completed_sequence_is_never_extended() {
        let (memory, store) = stores();
        store.set(keys::GENERATOR, "host-a").await.unwrap();
        store.set(keys::LAST_INDEX, "6").await.unwrap();

        let outcome = generator(&store, "host-a", 5).run().await;

        assert_eq!(outcome, GeneratorOutcome::Complete { emitted: 0 });
        assert!(memory.peek_list(keys::QUEUE).is_empty());
        assert_eq!(
            store.get(keys::LAST_INDEX).await.unwrap(),
            Some("6".to_string())
        );
    }

    #[tokio::test]
    async fn test_missing_sentinel_is_written_on_resume() {
        // A predecessor emitted N but stopped before the sentinel.
        let (memory, store) = stores();
        store.set(keys::GENERATOR, "host-a").await.unwrap();
        store.set(keys::LAST_INDEX, "5").await.unwrap();

        let outcome = generator(&store, "host-a", 5).run().await;

        assert_eq!(outcome, GeneratorOutcome::Complete { emitted: 0 });
        assert!(memory.peek_list(keys::QUEUE).is_empty());
        assert_eq!(
            store.get(keys::LAST_INDEX).await.unwrap(),
            Some("6".to_string())
        );
    }

    #[tokio::test]
    async fn test_generator_stops_on_shutdown() {
        let (_memory, store) = stores();
        store.set(keys::GENERATOR, "host-a").await.unwrap();
        let (tx, rx) = watch::channel(false);
        tx.send(true).unwrap();

        let outcome = Generator::new(store.clone(), name("host-a"), fast_config(5), rx)
            .run()
            .await;

        assert_eq!(outcome, GeneratorOutcome::Stopped { emitted: 0 });
        assert_eq!(store.get(keys::LAST_INDEX).await.unwrap(), None);
    }

    /// Delegates to a `MemoryStore` but refuses the first push of one entry, like a
    /// dropped connection to a remote store.
    struct RefusesOnePush {
        inner: Arc<MemoryStore>,
        prefix: &'static str,
        refused: AtomicBool,
    }

    #[async_trait]
    impl SharedStore for RefusesOnePush {
        async fn get(&self, key: &str) -> Result<Option<String>> {
            self.inner.get(key).await
        }

        async fn set(&self, key: &str, value: &str) -> Result<()> {
            self.inner.set(key, value).await
        }

        async fn delete(&self, keys: &[&str]) -> Result<usize> {
            self.inner.delete(keys).await
        }

        async fn push(&self, list: &str, value: &str) -> Result<usize> {
            if value.starts_with(self.prefix) && !self.refused.swap(true, Ordering::SeqCst) {
                anyhow::bail!("connection refused");
            }
            self.inner.push(list, value).await
        }

        async fn pop(&self, list: &str, timeout: Duration) -> Result<Option<String>> {
            self.inner.pop(list, timeout).await
        }

        async fn len(&self, list: &str) -> Result<usize> {
            self.inner.len(list).await
        }

        async fn drain(&self, list: &str) -> Result<Vec<String>> {
            self.inner.drain(list).await
        }

        async fn try_lock(&self, name: &str, token: &str, ttl: Duration) -> Result<bool> {
            self.inner.try_lock(name, token, ttl).await
        }

        async fn unlock(&self, name: &str, token: &str) -> Result<bool> {
            self.inner.unlock(name, token).await
        }
    }

    #[tokio::test]
    async fn test_failed_push_is_emitted_again() {
        // ARRANGE: the first attempt to enqueue index 2 fails
        let memory = Arc::new(MemoryStore::new());
        let flaky = Arc::new(RefusesOnePush {
            inner: memory.clone(),
            prefix: "2:",
            refused: AtomicBool::new(false),
        });
        let store: Arc<dyn SharedStore> = flaky.clone();
        store.set(keys::GENERATOR, "host-a").await.unwrap();

        // ACT
        let outcome = generator(&store, "host-a", 4).run().await;

        // ASSERT: no index skipped, none duplicated
        assert!(flaky.refused.load(Ordering::SeqCst));
        assert_eq!(outcome, GeneratorOutcome::Complete { emitted: 4 });
        assert_eq!(indices(&memory.peek_list(keys::QUEUE)), vec![1, 2, 3, 4]);
        assert_eq!(
            store.get(keys::LAST_INDEX).await.unwrap(),
            Some("5".to_string())
        );
    }

    #[tokio::test]
    async fn test_non_finite_start_is_rejected() {
        let (_memory, store) = stores();

        store.set(keys::START, "inf").await.unwrap();
        assert!(read_start(store.as_ref()).await.is_err());

        store.set(keys::START, "NaN").await.unwrap();
        assert!(read_start(store.as_ref()).await.is_err());

        store.set(keys::START, "1700000000.250000").await.unwrap();
        assert_eq!(read_start(store.as_ref()).await.unwrap(), Some(1_700_000_000.25));
    }

    // ============================================================
    // ACCEPTOR
    // ============================================================

    #[tokio::test]
    async fn test_acceptor_routes_errors_and_drains_completed_queue() {
        // ARRANGE: a finished run with leftovers in the queue
        let (memory, store) = stores();
        store.set(keys::START, "1700000000.000000").await.unwrap();
        store.set(keys::LAST_INDEX, "4").await.unwrap();
        for entry in ["1:message-3", "2:message-50", "3:garbage", "not-a-message"] {
            store.push(keys::QUEUE, entry).await.unwrap();
        }

        let config = ClusterConfig {
            interval: Duration::from_millis(10),
            max_interval: Duration::from_millis(30),
            ..fast_config(3)
        };
        let (_tx, rx) = watch::channel(false);
        let election =
            ElectionCoordinator::new(store.clone(), name("host-a"), config.clone(), rx.clone());

        // ACT
        let report = Acceptor::new(store.clone(), config, election, rx).run().await;

        // ASSERT
        assert_eq!(report.consumed, vec![1, 2, 3]);
        assert_eq!(report.faulty, 3);
        assert_eq!(report.elections, 0);
        assert_eq!(
            memory.peek_list(keys::ERRORS),
            vec!["1:message-3", "3:garbage", "not-a-message"]
        );
        assert_eq!(store.len(keys::QUEUE).await.unwrap(), 0);
    }

    // ============================================================
    // MAINTENANCE
    // ============================================================

    #[tokio::test]
    async fn test_status_clean_and_errors() {
        let (_memory, store) = stores();
        store.set(keys::GENERATOR, "host-a").await.unwrap();
        store.set(keys::START, "1700000000.500000").await.unwrap();
        store.set(keys::LAST_INDEX, "2").await.unwrap();
        store.push(keys::QUEUE, "2:message-9").await.unwrap();
        store.push(keys::ERRORS, "1:message-4").await.unwrap();

        let status = maintenance::status(store.as_ref()).await.unwrap();
        assert_eq!(status.generator.as_deref(), Some("host-a"));
        assert_eq!(status.start, Some(1_700_000_000.5));
        assert_eq!(status.last_index, Some(2));
        assert_eq!(status.queue_len, 1);
        assert_eq!(status.errors_len, 1);

        let errors = maintenance::drain_errors(store.as_ref()).await.unwrap();
        assert_eq!(errors, vec!["1:message-4"]);

        let removed = maintenance::clean(store.as_ref()).await.unwrap();
        assert_eq!(removed, 4);
        let status = maintenance::status(store.as_ref()).await.unwrap();
        assert_eq!(status.generator, None);
        assert_eq!(status.last_index, None);
        assert_eq!(status.queue_len, 0);
    }

    // ============================================================
    // SCENARIOS
    // ============================================================

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_single_process_run() {
        // ARRANGE
        let (memory, store) = stores();
        let (_tx, rx) = watch::channel(false);
        let started = Instant::now();

        // ACT
        let report = Worker::new(store.clone(), name("host-a"), fast_config(5), rx)
            .run()
            .await
            .unwrap();

        // ASSERT: every index once, in order, then the sentinel
        assert_eq!(report.consumed, vec![1, 2, 3, 4, 5]);
        assert_eq!(
            store.get(keys::LAST_INDEX).await.unwrap(),
            Some("6".to_string())
        );
        assert_eq!(
            store.get(keys::GENERATOR).await.unwrap(),
            Some("host-a".to_string())
        );
        assert!(started.elapsed() >= Duration::from_millis(400));

        let errors = memory.peek_list(keys::ERRORS);
        assert_eq!(errors.len(), report.faulty);
        for entry in &errors {
            let message: Message = entry.parse().unwrap();
            assert_eq!(message.disposition(), Disposition::Faulty);
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_workers_share_one_sequence() {
        // ARRANGE: three workers race for the bootstrap election
        let (memory, store) = stores();
        let count = 10;
        let mut shutdowns = Vec::new();
        let mut workers = Vec::new();
        for host in ["host-a", "host-b", "host-c"] {
            let (tx, rx) = watch::channel(false);
            shutdowns.push(tx);
            workers.push(tokio::spawn(
                Worker::new(store.clone(), name(host), fast_config(count), rx).run(),
            ));
        }

        // ACT
        let mut consumed = Vec::new();
        for worker in workers {
            let report = tokio::time::timeout(Duration::from_secs(15), worker)
                .await
                .expect("every worker must finish the run")
                .unwrap()
                .unwrap();
            consumed.extend(report.consumed);
        }

        // ASSERT: every index consumed exactly once across the pool
        let unique: HashSet<u64> = consumed.iter().copied().collect();
        assert_eq!(unique.len(), consumed.len(), "duplicate index consumed");
        consumed.sort_unstable();
        assert_eq!(consumed, (1..=count).collect::<Vec<_>>());
        assert_eq!(
            store.get(keys::LAST_INDEX).await.unwrap(),
            Some((count + 1).to_string())
        );
        assert!(memory.peek_list(keys::QUEUE).is_empty());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_failover_while_peer_is_running() {
        // ARRANGE: A generates; B joins as a plain consumer
        let (memory, store) = stores();
        let count = 8;
        let config = fast_config(count);
        let (tx_a, rx_a) = watch::channel(false);
        let worker_a = tokio::spawn(
            Worker::new(store.clone(), name("host-a"), config.clone(), rx_a).run(),
        );

        let deadline = Instant::now() + Duration::from_secs(5);
        loop {
            let status = maintenance::status(store.as_ref()).await.unwrap();
            if status.last_index.is_some_and(|last| last >= 1) {
                break;
            }
            assert!(Instant::now() < deadline, "A never started generating");
            tokio::time::sleep(Duration::from_millis(5)).await;
        }

        let (_tx_b, rx_b) = watch::channel(false);
        let worker_b = tokio::spawn(
            Worker::new(store.clone(), name("host-b"), config.clone(), rx_b).run(),
        );

        loop {
            let status = maintenance::status(store.as_ref()).await.unwrap();
            if status.last_index.is_some_and(|last| last >= 3) {
                break;
            }
            assert!(Instant::now() < deadline, "A never reached index 3");
            tokio::time::sleep(Duration::from_millis(5)).await;
        }

        // ACT: stop A between index 3 and 4, its name stays under `generator`
        tx_a.send(true).unwrap();
        let report_a = worker_a.await.unwrap().unwrap();
        assert_eq!(
            store.get(keys::GENERATOR).await.unwrap(),
            Some("host-a".to_string())
        );
        assert_eq!(
            store.get(keys::LAST_INDEX).await.unwrap(),
            Some("3".to_string())
        );

        let start = read_start(store.as_ref()).await.unwrap().unwrap();
        let expected_fourth = start + 3.0 * config.interval.as_secs_f64();
        let takeover_deadline = Instant::now() + Duration::from_secs(5);
        let emitted_at = loop {
            let status = maintenance::status(store.as_ref()).await.unwrap();
            if status.last_index.is_some_and(|last| last >= 4) {
                break now_secs();
            }
            assert!(Instant::now() < takeover_deadline, "nobody took over");
            tokio::time::sleep(Duration::from_millis(5)).await;
        };

        // ASSERT: B resumed at 4 within the staleness threshold plus one acceptor pass
        // (a bounded pop and the processing of one message)
        assert_eq!(
            store.get(keys::GENERATOR).await.unwrap(),
            Some("host-b".to_string())
        );
        let lateness = emitted_at - expected_fourth;
        let allowed = config.max_interval + config.poll_timeout + config.interval;
        assert!(
            lateness <= allowed.as_secs_f64() + 0.1,
            "index 4 emitted {:.3}s after its expected time",
            lateness
        );

        let report_b = tokio::time::timeout(Duration::from_secs(10), worker_b)
            .await
            .expect("B must finish the run")
            .unwrap()
            .unwrap();
        assert!(report_b.elections >= 1);
        assert_eq!(
            store.get(keys::LAST_INDEX).await.unwrap(),
            Some((count + 1).to_string())
        );

        let mut consumed: Vec<u64> = report_a
            .consumed
            .iter()
            .chain(report_b.consumed.iter())
            .copied()
            .collect();
        let unique: HashSet<u64> = consumed.iter().copied().collect();
        assert_eq!(unique.len(), consumed.len(), "duplicate index consumed");
        consumed.sort_unstable();
        assert_eq!(consumed, (1..=count).collect::<Vec<_>>());
        assert!(memory.peek_list(keys::QUEUE).is_empty());
    }
}
