use async_trait::async_trait;
use fieldreg_store::{
    Document, LocalStore, MemoryLocalStore, MemoryRemoteStore, RemoteStore, SqliteLocalStore,
    StoreError, StoreResult, Subscription,
};
use fieldreg_sync::{
    ChangeEvent, EventBus, FixedOperator, LocalCache, QueueConfig, RegistrationQueue, Signals,
    SyncError, collections,
};
use fieldreg_types::{CenterMap, OperatorId, QueueItemStatus, RegistrationDraft, Sex};
use pretty_assertions::assert_eq;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

struct Fixture {
    remote: Arc<MemoryRemoteStore>,
    local: Arc<MemoryLocalStore>,
    cache: Arc<LocalCache>,
    events: EventBus,
    signals: Signals,
    queue: Arc<RegistrationQueue>,
}

fn make_config() -> QueueConfig {
    QueueConfig {
        batch_size: 5,
        max_retries: 3,
        drain_interval: Duration::from_secs(30),
        batch_pause: Duration::from_millis(10),
        remote_timeout: Duration::from_secs(1),
    }
}

fn make_fixture(online: bool) -> Fixture {
    make_fixture_with(online, Arc::new(MemoryLocalStore::new()), make_config())
}

fn make_fixture_with(
    online: bool,
    local: Arc<MemoryLocalStore>,
    config: QueueConfig,
) -> Fixture {
    init_tracing();
    let remote = Arc::new(MemoryRemoteStore::new());
    let cache = Arc::new(LocalCache::new(Duration::from_secs(300), 8));
    let events = EventBus::new(64);
    let signals = Signals::new(online);
    let queue = Arc::new(
        RegistrationQueue::new(
            remote.clone(),
            local.clone(),
            cache.clone(),
            events.clone(),
            signals.clone(),
            Arc::new(FixedOperator::new(OperatorId::new())),
            config,
        )
        .unwrap(),
    );
    Fixture {
        remote,
        local,
        cache,
        events,
        signals,
        queue,
    }
}

fn draft(national_id: &str) -> RegistrationDraft {
    RegistrationDraft {
        national_id: national_id.to_string(),
        name: "Ana Pérez".to_string(),
        phone: "04121234567".to_string(),
        sex: Sex::Female,
        age: 30,
        voting_center: "C1".to_string(),
        community: "K1".to_string(),
    }
}

// ── Enqueue ──────────────────────────────────────────────────────

#[tokio::test]
async fn enqueue_offline_keeps_item_pending() {
    let f = make_fixture(false);
    f.queue.enqueue(draft("12345678")).await.unwrap();

    let stats = f.queue.stats();
    assert_eq!(stats.total, 1);
    assert_eq!(stats.pending, 1);
    assert!(!stats.is_online);
    assert_eq!(f.remote.doc_count(collections::VOTERS), 0);
}

#[tokio::test]
async fn duplicate_in_queue_rejected() {
    let f = make_fixture(false);
    f.queue.enqueue(draft("12345678")).await.unwrap();
    let err = f.queue.enqueue(draft("12345678")).await.unwrap_err();

    assert!(matches!(err, SyncError::Duplicate { ref national_id } if national_id == "12345678"));
    assert_eq!(f.queue.stats().total, 1);
}

#[tokio::test]
async fn duplicate_in_remote_rejected() {
    let f = make_fixture(true);
    f.remote
        .add(collections::VOTERS, json!({"national_id": "12345678"}))
        .await
        .unwrap();

    let err = f.queue.enqueue(draft("12345678")).await.unwrap_err();
    assert!(matches!(err, SyncError::Duplicate { .. }));
    assert_eq!(f.queue.stats().total, 0);
}

#[tokio::test]
async fn unreachable_duplicate_check_admits_draft() {
    let f = make_fixture(true);
    f.remote.fail_next(1);

    // The remote check fails but the registration is still admitted.
    f.queue.enqueue(draft("12345678")).await.unwrap();
    assert_eq!(f.queue.stats().total, 1);
}

#[tokio::test]
async fn invalid_draft_never_queued() {
    let f = make_fixture(false);
    let mut bad = draft("12345678");
    bad.phone = "0412123".to_string();

    let err = f.queue.enqueue(bad).await.unwrap_err();
    assert!(matches!(err, SyncError::Validation(_)));
    assert_eq!(f.queue.stats().total, 0);
}

#[tokio::test]
async fn referential_check_uses_cached_config() {
    let f = make_fixture(false);
    let mut map = CenterMap::new();
    map.add_community("C1", "K1");
    f.cache.insert(
        collections::CENTER_CONFIG,
        serde_json::to_value(&map).unwrap(),
    );

    f.queue.enqueue(draft("11111111")).await.unwrap();

    let mut wrong = draft("22222222");
    wrong.community = "K9".to_string();
    let err = f.queue.enqueue(wrong).await.unwrap_err();
    assert!(matches!(err, SyncError::Validation(_)));
}

// ── Draining ─────────────────────────────────────────────────────

#[tokio::test]
async fn drain_commits_and_empties_queue() {
    let f = make_fixture(true);
    let mut events = f.events.subscribe();
    f.queue.enqueue(draft("12345678")).await.unwrap();
    f.queue.enqueue(draft("87654321")).await.unwrap();

    let report = f.queue.process_queue().await.unwrap();
    assert_eq!(report.committed, 2);
    assert_eq!(report.processed, 2);
    assert!(report.failed.is_empty());
    assert_eq!(f.queue.stats().total, 0);
    assert_eq!(f.remote.doc_count(collections::VOTERS), 2);

    let committed = f
        .remote
        .query(collections::VOTERS, "national_id", &json!("12345678"))
        .await
        .unwrap();
    assert_eq!(committed.len(), 1);

    let mut saw_committed = 0;
    while let Ok(event) = events.try_recv() {
        if matches!(event, ChangeEvent::RegistrationCommitted { .. }) {
            saw_committed += 1;
        }
    }
    assert_eq!(saw_committed, 2);
}

#[tokio::test]
async fn drain_is_noop_offline_or_empty() {
    let f = make_fixture(false);
    f.queue.enqueue(draft("12345678")).await.unwrap();

    let report = f.queue.process_queue().await.unwrap();
    assert_eq!(report.processed, 0);
    assert_eq!(f.queue.stats().total, 1);

    let online = make_fixture(true);
    let report = online.queue.process_queue().await.unwrap();
    assert_eq!(report.processed, 0);
}

#[tokio::test]
async fn zero_batch_size_drains_one_at_a_time() {
    let mut config = make_config();
    config.batch_size = 0;
    let f = make_fixture_with(true, Arc::new(MemoryLocalStore::new()), config);
    f.queue.enqueue(draft("12345678")).await.unwrap();
    f.queue.enqueue(draft("87654321")).await.unwrap();

    let report = f.queue.process_queue().await.unwrap();
    assert_eq!(report.committed, 2);
    assert_eq!(f.queue.stats().total, 0);
}

#[tokio::test]
async fn concurrent_drains_commit_exactly_once() {
    let f = make_fixture(true);
    f.queue.enqueue(draft("12345678")).await.unwrap();

    let (r1, r2) = tokio::join!(f.queue.process_queue(), f.queue.process_queue());
    let total = r1.unwrap().committed + r2.unwrap().committed;
    assert_eq!(total, 1);
    assert_eq!(f.remote.doc_count(collections::VOTERS), 1);
}

#[tokio::test]
async fn failed_write_retries_then_drops_at_ceiling() {
    let f = make_fixture(false);
    f.queue.enqueue(draft("12345678")).await.unwrap();
    f.signals.online.set(true);

    // Each drain pass consumes two remote calls per item: the duplicate
    // re-check and the write itself.
    f.remote.fail_next(2);
    let report = f.queue.process_queue().await.unwrap();
    assert_eq!(report.retried, 1);
    assert_eq!(f.queue.stats().retry, 1);

    f.remote.fail_next(2);
    let report = f.queue.process_queue().await.unwrap();
    assert_eq!(report.retried, 1);
    // Two failures is one short of the ceiling: still eligible.
    assert_eq!(f.queue.stats().retry, 1);

    f.remote.fail_next(2);
    let report = f.queue.process_queue().await.unwrap();
    assert_eq!(report.retried, 0);
    assert_eq!(report.failed.len(), 1);
    assert_eq!(report.failed[0].attempts, 3);
    assert_eq!(report.failed[0].status, QueueItemStatus::Failed);

    // Dropped items are excluded from future passes.
    assert_eq!(f.queue.stats().total, 0);
    let report = f.queue.process_queue().await.unwrap();
    assert_eq!(report.processed, 0);
}

/// Remote store whose writes are rejected as permanently invalid, while
/// reads keep working.
struct RejectingWrites(MemoryRemoteStore);

#[async_trait]
impl RemoteStore for RejectingWrites {
    async fn get_all(&self, collection: &str) -> StoreResult<Vec<Document>> {
        self.0.get_all(collection).await
    }

    async fn query(
        &self,
        collection: &str,
        field: &str,
        value: &serde_json::Value,
    ) -> StoreResult<Vec<Document>> {
        self.0.query(collection, field, value).await
    }

    async fn add(&self, _collection: &str, _data: serde_json::Value) -> StoreResult<Document> {
        Err(StoreError::InvalidData("schema rejected".into()))
    }

    async fn update(
        &self,
        collection: &str,
        id: &str,
        patch: serde_json::Value,
    ) -> StoreResult<()> {
        self.0.update(collection, id, patch).await
    }

    async fn delete(&self, collection: &str, id: &str) -> StoreResult<()> {
        self.0.delete(collection, id).await
    }

    async fn subscribe(&self, collection: &str) -> StoreResult<Subscription> {
        self.0.subscribe(collection).await
    }
}

#[tokio::test]
async fn permanent_write_error_fails_without_retrying() {
    let remote = Arc::new(RejectingWrites(MemoryRemoteStore::new()));
    let queue = Arc::new(
        RegistrationQueue::new(
            remote,
            Arc::new(MemoryLocalStore::new()),
            Arc::new(LocalCache::new(Duration::from_secs(300), 8)),
            EventBus::new(16),
            Signals::new(true),
            Arc::new(FixedOperator::new(OperatorId::new())),
            make_config(),
        )
        .unwrap(),
    );
    queue.enqueue(draft("12345678")).await.unwrap();

    let report = queue.process_queue().await.unwrap();
    assert_eq!(report.retried, 0);
    assert_eq!(report.failed.len(), 1);
    // A single attempt, not the full retry ceiling.
    assert_eq!(report.failed[0].attempts, 1);
    assert_eq!(report.failed[0].status, QueueItemStatus::Failed);
    assert_eq!(queue.stats().total, 0);
}

#[tokio::test]
async fn recovered_item_commits_after_retry() {
    let f = make_fixture(false);
    f.queue.enqueue(draft("12345678")).await.unwrap();
    f.signals.online.set(true);

    f.remote.fail_next(2);
    f.queue.process_queue().await.unwrap();
    assert_eq!(f.queue.stats().retry, 1);

    let report = f.queue.process_queue().await.unwrap();
    assert_eq!(report.committed, 1);
    assert_eq!(f.remote.doc_count(collections::VOTERS), 1);
}

#[tokio::test]
async fn drain_drops_item_already_committed_by_another_operator() {
    let f = make_fixture(false);
    f.queue.enqueue(draft("12345678")).await.unwrap();

    // Another operator committed the same national id while we were
    // offline; the pre-write re-check must catch it.
    f.remote
        .add(collections::VOTERS, json!({"national_id": "12345678"}))
        .await
        .unwrap();
    f.signals.online.set(true);

    let report = f.queue.process_queue().await.unwrap();
    assert_eq!(report.duplicates, 1);
    assert_eq!(report.committed, 0);
    assert_eq!(f.queue.stats().total, 0);
    assert_eq!(f.remote.doc_count(collections::VOTERS), 1);
}

// ── Durability ───────────────────────────────────────────────────

#[tokio::test]
async fn queue_survives_restart() {
    let local = Arc::new(MemoryLocalStore::new());
    {
        let f = make_fixture_with(false, local.clone(), make_config());
        f.queue.enqueue(draft("12345678")).await.unwrap();
        f.queue.enqueue(draft("87654321")).await.unwrap();
    }

    let f = make_fixture_with(true, local, make_config());
    assert_eq!(f.queue.stats().total, 2);

    let report = f.queue.process_queue().await.unwrap();
    assert_eq!(report.committed, 2);
    assert_eq!(f.remote.doc_count(collections::VOTERS), 2);
}

#[tokio::test]
async fn restart_does_not_duplicate_in_flight_write() {
    let local = Arc::new(MemoryLocalStore::new());
    let f1 = make_fixture_with(true, local.clone(), make_config());
    f1.queue.enqueue(draft("12345678")).await.unwrap();
    f1.queue.process_queue().await.unwrap();
    assert_eq!(f1.remote.doc_count(collections::VOTERS), 1);

    // Restart with the same durable store. The committed item was
    // persisted away, so nothing is left to re-send.
    let f2 = make_fixture_with(true, local, make_config());
    assert_eq!(f2.queue.stats().total, 0);
}

#[tokio::test]
async fn queue_survives_restart_on_sqlite() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("fieldreg.db");
    let remote = Arc::new(MemoryRemoteStore::new());

    let make_queue = |local: Arc<SqliteLocalStore>, online: bool| {
        Arc::new(
            RegistrationQueue::new(
                remote.clone(),
                local,
                Arc::new(LocalCache::new(Duration::from_secs(300), 8)),
                EventBus::new(16),
                Signals::new(online),
                Arc::new(FixedOperator::new(OperatorId::new())),
                make_config(),
            )
            .unwrap(),
        )
    };

    {
        let local = Arc::new(SqliteLocalStore::open(&path).unwrap());
        let queue = make_queue(local, false);
        queue.enqueue(draft("12345678")).await.unwrap();
    }

    let local = Arc::new(SqliteLocalStore::open(&path).unwrap());
    let queue = make_queue(local, true);
    assert_eq!(queue.stats().total, 1);

    let report = queue.process_queue().await.unwrap();
    assert_eq!(report.committed, 1);
    assert_eq!(remote.doc_count(collections::VOTERS), 1);
}

#[tokio::test]
async fn persisted_blob_tracks_every_mutation() {
    let f = make_fixture(false);
    assert!(
        f.local
            .load(fieldreg_sync::QUEUE_STORAGE_KEY)
            .unwrap()
            .is_none()
    );

    f.queue.enqueue(draft("12345678")).await.unwrap();
    let blob = f
        .local
        .load(fieldreg_sync::QUEUE_STORAGE_KEY)
        .unwrap()
        .unwrap();
    let items: Vec<serde_json::Value> = serde_json::from_slice(&blob).unwrap();
    assert_eq!(items.len(), 1);
}

// ── Drain loop ───────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn going_online_drains_within_bounded_delay() {
    let f = make_fixture(false);
    f.queue.enqueue(draft("12345678")).await.unwrap();
    assert_eq!(f.queue.stats().pending, 1);

    let handle = f.queue.clone().start();
    f.signals.online.set(true);
    tokio::time::sleep(Duration::from_secs(1)).await;

    assert_eq!(f.queue.stats().total, 0);
    assert_eq!(f.remote.doc_count(collections::VOTERS), 1);

    f.queue.stop();
    handle.await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn enqueue_while_running_drains_immediately() {
    let f = make_fixture(true);
    let handle = f.queue.clone().start();
    tokio::time::sleep(Duration::from_millis(50)).await;

    f.queue.enqueue(draft("12345678")).await.unwrap();
    tokio::time::sleep(Duration::from_secs(1)).await;

    assert_eq!(f.queue.stats().total, 0);
    assert_eq!(f.remote.doc_count(collections::VOTERS), 1);

    f.queue.stop();
    handle.await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn interval_drain_picks_up_retry_items() {
    let f = make_fixture(false);
    f.queue.enqueue(draft("12345678")).await.unwrap();
    f.signals.online.set(true);

    // First pass fails the duplicate re-check and the write.
    f.remote.fail_next(2);
    f.queue.process_queue().await.unwrap();
    assert_eq!(f.queue.stats().retry, 1);

    // The periodic tick, not a new enqueue, must pick it back up.
    let handle = f.queue.clone().start();
    tokio::time::sleep(Duration::from_secs(31)).await;

    assert_eq!(f.queue.stats().total, 0);
    assert_eq!(f.remote.doc_count(collections::VOTERS), 1);

    f.queue.stop();
    handle.await.unwrap();
}
