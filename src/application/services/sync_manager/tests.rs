use super::*;
use crate::domain::entities::{NewVerification, ServerReferenceCode};
use crate::domain::value_objects::{Email, SyncQueueStatus};
use crate::infrastructure::offline::SqliteLocalStore;
use async_trait::async_trait;
use mockall::mock;
use serde_json::json;
use std::collections::VecDeque;
use std::sync::atomic::AtomicUsize;
use tokio::sync::Notify;

mock! {
    pub Remote {}

    #[async_trait]
    impl RemoteApi for Remote {
        async fn submit_verification(&self, submission: &NewVerification) -> RemoteOutcome;
        async fn submit_code_usage(&self, code: &str) -> RemoteOutcome;
        async fn fetch_reference_codes(&self) -> Result<Vec<ServerReferenceCode>, AppError>;
        async fn probe(&self) -> bool;
    }
}

/// Replays canned outcomes in order, then accepts everything.
#[derive(Default)]
struct ScriptedRemote {
    script: std::sync::Mutex<VecDeque<RemoteOutcome>>,
    calls: AtomicUsize,
}

impl ScriptedRemote {
    fn with(outcomes: Vec<RemoteOutcome>) -> Arc<Self> {
        Arc::new(Self {
            script: std::sync::Mutex::new(outcomes.into()),
            calls: AtomicUsize::new(0),
        })
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn next(&self) -> RemoteOutcome {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(RemoteOutcome::accepted)
    }
}

#[async_trait]
impl RemoteApi for ScriptedRemote {
    async fn submit_verification(&self, _submission: &NewVerification) -> RemoteOutcome {
        self.next()
    }

    async fn submit_code_usage(&self, _code: &str) -> RemoteOutcome {
        self.next()
    }

    async fn fetch_reference_codes(&self) -> Result<Vec<ServerReferenceCode>, AppError> {
        Ok(Vec::new())
    }

    async fn probe(&self) -> bool {
        true
    }
}

/// Fails the task that calls it.
struct PanickingRemote;

#[async_trait]
impl RemoteApi for PanickingRemote {
    async fn submit_verification(&self, _submission: &NewVerification) -> RemoteOutcome {
        panic!("remote client bug");
    }

    async fn submit_code_usage(&self, _code: &str) -> RemoteOutcome {
        RemoteOutcome::accepted()
    }

    async fn fetch_reference_codes(&self) -> Result<Vec<ServerReferenceCode>, AppError> {
        Ok(Vec::new())
    }

    async fn probe(&self) -> bool {
        true
    }
}

/// Holds every submission until released.
#[derive(Default)]
struct GatedRemote {
    entered: Notify,
    release: Notify,
    calls: AtomicUsize,
}

#[async_trait]
impl RemoteApi for GatedRemote {
    async fn submit_verification(&self, _submission: &NewVerification) -> RemoteOutcome {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.entered.notify_one();
        self.release.notified().await;
        RemoteOutcome::accepted()
    }

    async fn submit_code_usage(&self, _code: &str) -> RemoteOutcome {
        RemoteOutcome::accepted()
    }

    async fn fetch_reference_codes(&self) -> Result<Vec<ServerReferenceCode>, AppError> {
        Ok(Vec::new())
    }

    async fn probe(&self) -> bool {
        true
    }
}

async fn setup_store() -> Arc<SqliteLocalStore> {
    let store = Arc::new(SqliteLocalStore::in_memory());
    store.init().await.unwrap();
    store
}

fn build_manager(
    store: &Arc<SqliteLocalStore>,
    remote: Arc<dyn RemoteApi>,
    retry: RetryPolicy,
) -> (Arc<SyncManager>, ConnectivityMonitor) {
    let connectivity = ConnectivityMonitor::new(true);
    let manager = SyncManager::new(
        store.clone(),
        remote,
        connectivity.clone(),
        SyncManagerConfig {
            sync_interval: Duration::from_secs(3600),
            retry,
        },
    );
    (Arc::new(manager), connectivity)
}

fn ann() -> NewVerification {
    NewVerification::new("Ann Lee", "ann@x.edu", "CS001", "CPS-ABC12345")
}

fn bob() -> NewVerification {
    NewVerification::new("Bob Osei", "bob@x.edu", "CS002", "CPS-DEF67890")
}

fn email(value: &str) -> Email {
    Email::parse(value).unwrap()
}

async fn wait_for_queue_size(store: &SqliteLocalStore, expected: u64) {
    tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            if store.get_stats().await.unwrap().sync_queue_size == expected {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("queue did not reach expected size");
}

#[tokio::test]
async fn test_sync_all_offline_does_nothing() {
    let store = setup_store().await;
    store.add_verification(ann()).await.unwrap();

    // no expectations: any remote call panics
    let (manager, connectivity) =
        build_manager(&store, Arc::new(MockRemote::new()), RetryPolicy::default());
    connectivity.set_online(false);

    assert_eq!(manager.sync_all().await.unwrap(), None);
    assert_eq!(manager.force_sync_now().await.unwrap(), None);

    let queue = store.get_sync_queue().await.unwrap();
    assert_eq!(queue.len(), 1);
    assert_eq!(queue[0].retry_count, 0);
}

#[tokio::test]
async fn test_accepted_verification_is_removed_and_marked_synced() {
    let store = setup_store().await;
    store.add_verification(ann()).await.unwrap();

    let mut remote = MockRemote::new();
    remote
        .expect_submit_verification()
        .withf(|submission| submission.email == "ann@x.edu" && submission.full_name == "Ann Lee")
        .times(1)
        .returning(|_| RemoteOutcome::accepted());
    let (manager, _) = build_manager(&store, Arc::new(remote), RetryPolicy::default());

    let report = manager.sync_all().await.unwrap().unwrap();
    assert_eq!(report.processed, 1);
    assert_eq!(report.synced, 1);

    assert!(store.get_sync_queue().await.unwrap().is_empty());
    let stored = store.get_verification(&email("ann@x.edu")).await.unwrap().unwrap();
    assert!(stored.synced);
    assert!(store.get_unsynced_verifications().await.unwrap().is_empty());
    assert_eq!(manager.metrics().total_accepted, 1);
}

#[tokio::test]
async fn test_transient_failures_retry_until_accepted() {
    let store = setup_store().await;
    store.add_verification(ann()).await.unwrap();

    let remote = ScriptedRemote::with(vec![
        RemoteOutcome::TransientFailure("503: Service Unavailable".to_string()),
        RemoteOutcome::TransientFailure("503: Service Unavailable".to_string()),
    ]);
    let (manager, _) = build_manager(&store, remote.clone(), RetryPolicy::without_backoff(5));

    for expected_retries in 1..=2u32 {
        let report = manager.sync_all().await.unwrap().unwrap();
        assert_eq!(report.retried, 1);

        let queue = store.get_sync_queue().await.unwrap();
        assert_eq!(queue.len(), 1);
        assert_eq!(queue[0].retry_count, expected_retries);
        assert_eq!(
            queue[0].error_message.as_deref(),
            Some("503: Service Unavailable")
        );
    }

    let report = manager.sync_all().await.unwrap().unwrap();
    assert_eq!(report.synced, 1);
    assert!(store.get_sync_queue().await.unwrap().is_empty());
    assert!(store
        .get_verification(&email("ann@x.edu"))
        .await
        .unwrap()
        .unwrap()
        .synced);
    assert_eq!(remote.calls(), 3);
}

#[tokio::test]
async fn test_retry_ceiling_marks_entry_failed_and_stops_calling_remote() {
    let store = setup_store().await;
    store.add_verification(ann()).await.unwrap();

    let mut remote = MockRemote::new();
    remote
        .expect_submit_verification()
        .times(5)
        .returning(|_| RemoteOutcome::TransientFailure("connection refused".to_string()));
    let (manager, _) = build_manager(&store, Arc::new(remote), RetryPolicy::without_backoff(5));

    for _ in 0..4 {
        let report = manager.sync_all().await.unwrap().unwrap();
        assert_eq!(report.retried, 1);
    }

    let report = manager.sync_all().await.unwrap().unwrap();
    assert_eq!(report.failed, 1);
    assert_eq!(report.retried, 0);

    for _ in 0..2 {
        let report = manager.sync_all().await.unwrap().unwrap();
        assert_eq!(report.skipped, 1);
        assert_eq!(report.processed, 0);
    }

    let failed = store.list_failed_sync_items().await.unwrap();
    assert_eq!(failed.len(), 1);
    assert_eq!(failed[0].status, SyncQueueStatus::Failed);
    assert_eq!(failed[0].retry_count, 5);

    let stats = store.get_stats().await.unwrap();
    assert_eq!(stats.failed_queue_size, 1);
    assert_eq!(stats.unsynced_count, 1);
    assert_eq!(manager.metrics().total_exhausted, 1);
}

#[tokio::test]
async fn test_backoff_defers_entry_until_due() {
    let store = setup_store().await;
    store.add_verification(ann()).await.unwrap();

    let mut remote = MockRemote::new();
    remote
        .expect_submit_verification()
        .times(1)
        .returning(|_| RemoteOutcome::TransientFailure("timeout".to_string()));
    let retry = RetryPolicy {
        max_retries: 5,
        base_delay: Duration::from_secs(60),
        max_delay: Duration::from_secs(60),
        jitter: false,
    };
    let (manager, _) = build_manager(&store, Arc::new(remote), retry);

    let report = manager.sync_all().await.unwrap().unwrap();
    assert_eq!(report.retried, 1);

    let queue = store.get_sync_queue().await.unwrap();
    let next_attempt_at = queue[0].next_attempt_at.expect("backoff recorded");
    assert!(next_attempt_at > Utc::now() + chrono::Duration::seconds(50));

    let report = manager.sync_all().await.unwrap().unwrap();
    assert_eq!(report.deferred, 1);
    assert_eq!(report.processed, 0);
    assert_eq!(store.get_sync_queue().await.unwrap()[0].retry_count, 1);
}

#[tokio::test]
async fn test_permanent_rejection_drops_entry_and_reports_reason() {
    let store = setup_store().await;
    store.add_verification(ann()).await.unwrap();

    let mut remote = MockRemote::new();
    remote
        .expect_submit_verification()
        .times(1)
        .returning(|_| {
            RemoteOutcome::PermanentRejection(
                "This reference code has already been used".to_string(),
            )
        });
    let (manager, _) = build_manager(&store, Arc::new(remote), RetryPolicy::default());

    let report = manager.sync_all().await.unwrap().unwrap();
    assert_eq!(report.synced, 0);
    assert_eq!(report.rejected.len(), 1);
    assert_eq!(report.rejected[0].action_type, SyncActionType::Verification);
    assert_eq!(
        report.rejected[0].reason,
        "This reference code has already been used"
    );

    assert!(store.get_sync_queue().await.unwrap().is_empty());
    let stored = store.get_verification(&email("ann@x.edu")).await.unwrap().unwrap();
    assert!(!stored.synced);

    let metrics = manager.metrics();
    assert_eq!(metrics.total_rejected, 1);
    assert_eq!(
        metrics.last_rejection.as_deref(),
        Some("This reference code has already been used")
    );
}

#[tokio::test]
async fn test_one_failing_entry_does_not_block_the_rest() {
    let store = setup_store().await;
    store.add_verification(ann()).await.unwrap();
    store.add_verification(bob()).await.unwrap();

    let remote = ScriptedRemote::with(vec![RemoteOutcome::TransientFailure(
        "502: Bad Gateway".to_string(),
    )]);
    let (manager, _) = build_manager(&store, remote.clone(), RetryPolicy::without_backoff(5));

    let report = manager.sync_all().await.unwrap().unwrap();
    assert_eq!(report.processed, 2);
    assert_eq!(report.retried, 1);
    assert_eq!(report.synced, 1);

    let queue = store.get_sync_queue().await.unwrap();
    assert_eq!(queue.len(), 1);
    let remaining: VerificationRecord = queue[0].decode_payload().unwrap();
    assert_eq!(remaining.email, email("ann@x.edu"));
    assert!(store
        .get_verification(&email("bob@x.edu"))
        .await
        .unwrap()
        .unwrap()
        .synced);
}

#[tokio::test]
async fn test_code_usage_synced_and_non_remote_entries_discarded() {
    let store = setup_store().await;
    store.add_code("CPS-ABC12345", "CS001").await.unwrap();
    store.mark_code_used("CPS-ABC12345").await.unwrap();
    store
        .enqueue_sync(SyncActionType::CodeGeneration, json!({ "code": "CPS-XYZ" }))
        .await
        .unwrap();
    store
        .enqueue_sync(SyncActionType::from("mystery"), json!({}))
        .await
        .unwrap();

    let mut remote = MockRemote::new();
    remote
        .expect_submit_code_usage()
        .withf(|code| code == "CPS-ABC12345")
        .times(1)
        .returning(|_| RemoteOutcome::accepted());
    let (manager, _) = build_manager(&store, Arc::new(remote), RetryPolicy::default());

    let report = manager.sync_all().await.unwrap().unwrap();
    assert_eq!(report.synced, 1);
    assert_eq!(report.discarded, 2);
    assert!(store.get_sync_queue().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_malformed_payload_is_marked_failed() {
    let store = setup_store().await;
    store
        .enqueue_sync(SyncActionType::Verification, json!({ "bogus": true }))
        .await
        .unwrap();

    let (manager, _) =
        build_manager(&store, Arc::new(MockRemote::new()), RetryPolicy::default());

    let report = manager.sync_all().await.unwrap().unwrap();
    assert_eq!(report.failed, 1);

    let failed = store.list_failed_sync_items().await.unwrap();
    assert_eq!(failed.len(), 1);
    assert!(failed[0]
        .error_message
        .as_deref()
        .unwrap_or_default()
        .contains("Malformed"));
}

#[tokio::test]
async fn test_unparseable_payload_is_failed_and_later_entries_still_sync() {
    let store = setup_store().await;
    sqlx::query(
        r#"
        INSERT INTO sync_queue (action_type, payload, status, retry_count, created_at, updated_at)
        VALUES ('verification', '{"fullName": "Ann', 'pending', 0, 0, 0)
        "#,
    )
    .execute(store.pool().await.unwrap())
    .await
    .unwrap();
    store.add_verification(bob()).await.unwrap();

    let remote = ScriptedRemote::with(vec![]);
    let (manager, _) = build_manager(&store, remote.clone(), RetryPolicy::default());

    let report = manager.sync_all().await.unwrap().unwrap();
    assert_eq!(report.failed, 1);
    assert_eq!(report.synced, 1);
    assert_eq!(remote.calls(), 1);

    let failed = store.list_failed_sync_items().await.unwrap();
    assert_eq!(failed.len(), 1);
    assert_eq!(failed[0].action_type, SyncActionType::Verification);

    let second = manager.sync_all().await.unwrap().unwrap();
    assert_eq!(second.skipped, 1);
}

#[tokio::test]
async fn test_accepted_stale_entry_does_not_mark_newer_record_synced() {
    let store = setup_store().await;
    let current = store.add_verification(ann()).await.unwrap();
    for item in store.get_sync_queue().await.unwrap() {
        store.remove_sync_queue_item(item.id).await.unwrap();
    }

    let mut stale = current.clone();
    stale.id = "superseded-record".to_string();
    store
        .enqueue_sync(
            SyncActionType::Verification,
            serde_json::to_value(&stale).unwrap(),
        )
        .await
        .unwrap();

    let (manager, _) = build_manager(&store, ScriptedRemote::with(vec![]), RetryPolicy::default());

    let report = manager.sync_all().await.unwrap().unwrap();
    assert_eq!(report.synced, 1);

    let stored = store.get_verification(&email("ann@x.edu")).await.unwrap().unwrap();
    assert_eq!(stored.id, current.id);
    assert!(!stored.synced);
}

#[tokio::test]
async fn test_concurrent_force_sync_runs_single_pass() {
    let store = setup_store().await;
    store.add_verification(ann()).await.unwrap();

    let remote = Arc::new(GatedRemote::default());
    let (manager, _) = build_manager(&store, remote.clone(), RetryPolicy::default());

    let first = tokio::spawn({
        let manager = manager.clone();
        async move { manager.force_sync_now().await }
    });

    remote.entered.notified().await;
    assert!(manager.is_syncing());
    assert_eq!(manager.force_sync_now().await.unwrap(), None);
    assert_eq!(manager.sync_all().await.unwrap(), None);

    remote.release.notify_one();
    let report = first.await.unwrap().unwrap().expect("first pass ran");
    assert_eq!(report.synced, 1);
    assert_eq!(remote.calls.load(Ordering::SeqCst), 1);
    assert!(!manager.is_syncing());
}

#[tokio::test]
async fn test_storage_failure_aborts_pass_and_releases_flag() {
    let store = setup_store().await;
    store.add_verification(ann()).await.unwrap();
    let (manager, _) =
        build_manager(&store, Arc::new(MockRemote::new()), RetryPolicy::default());

    store.close().await;

    let err = manager.sync_all().await.unwrap_err();
    assert!(err.is_storage());
    assert!(!manager.is_syncing());
}

#[tokio::test]
async fn test_auto_sync_drains_on_start_and_on_reconnect() {
    let store = setup_store().await;
    store.add_verification(ann()).await.unwrap();

    let remote = ScriptedRemote::with(vec![]);
    let (manager, connectivity) = build_manager(&store, remote.clone(), RetryPolicy::default());

    assert!(manager.start_auto_sync().await);
    assert!(!manager.start_auto_sync().await);
    assert!(manager.is_auto_sync_running().await);

    // first timer tick fires immediately
    wait_for_queue_size(&store, 0).await;

    connectivity.set_online(false);
    store.add_verification(bob()).await.unwrap();
    connectivity.set_online(true);
    wait_for_queue_size(&store, 0).await;
    assert_eq!(remote.calls(), 2);

    assert!(manager.stop_auto_sync().await);
    assert!(!manager.stop_auto_sync().await);
    assert!(!manager.is_auto_sync_running().await);

    connectivity.set_online(false);
    store
        .add_verification(NewVerification::new("Cy Ama", "cy@x.edu", "CS003", "CPS-GHI"))
        .await
        .unwrap();
    connectivity.set_online(true);
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(store.get_stats().await.unwrap().sync_queue_size, 1);
    assert_eq!(remote.calls(), 2);
}

#[tokio::test]
async fn test_auto_sync_survives_backoff_beyond_calendar_range() {
    let store = setup_store().await;
    store.add_verification(ann()).await.unwrap();

    let remote = ScriptedRemote::with(vec![RemoteOutcome::TransientFailure(
        "503: Service Unavailable".to_string(),
    )]);
    let huge = Duration::from_secs(1_000_000_000_000_000);
    let retry = RetryPolicy {
        max_retries: 5,
        base_delay: huge,
        max_delay: huge,
        jitter: false,
    };
    let (manager, _) = build_manager(&store, remote.clone(), retry);

    assert!(manager.start_auto_sync().await);
    tokio::time::timeout(Duration::from_secs(5), async {
        while manager.metrics().passes_completed == 0 {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("first pass did not complete");

    assert_eq!(remote.calls(), 1);
    let queue = store.get_sync_queue().await.unwrap();
    assert_eq!(queue.len(), 1);
    assert_eq!(queue[0].retry_count, 1);
    assert_eq!(
        queue[0].next_attempt_at.map(|at| at.timestamp_millis()),
        Some(DateTime::<Utc>::MAX_UTC.timestamp_millis())
    );

    assert!(manager.is_auto_sync_running().await);
    assert!(manager.stop_auto_sync().await);
}

#[tokio::test]
async fn test_dead_auto_sync_task_is_reported_and_restartable() {
    let store = setup_store().await;
    store.add_verification(ann()).await.unwrap();
    let (manager, _) = build_manager(&store, Arc::new(PanickingRemote), RetryPolicy::default());

    assert!(manager.start_auto_sync().await);
    tokio::time::timeout(Duration::from_secs(5), async {
        while manager.is_auto_sync_running().await {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("auto sync task should have ended");

    assert!(!manager.get_status().await.unwrap().auto_sync_active);
    assert!(!manager.is_syncing());
    assert!(manager.start_auto_sync().await);
    manager.stop_auto_sync().await;
}

#[tokio::test]
async fn test_status_snapshot_merges_store_stats() {
    let store = setup_store().await;
    store.add_verification(ann()).await.unwrap();
    store.add_code("CPS-ABC12345", "CS001").await.unwrap();

    let (manager, connectivity) =
        build_manager(&store, ScriptedRemote::with(vec![]), RetryPolicy::default());
    connectivity.set_online(false);

    let status = manager.get_status().await.unwrap();
    assert!(!status.is_online);
    assert!(!status.is_syncing);
    assert!(!status.auto_sync_active);
    assert_eq!(status.stats.total_verifications, 1);
    assert_eq!(status.stats.total_codes, 1);
    assert_eq!(status.stats.sync_queue_size, 1);
    assert_eq!(status.stats.unsynced_count, 1);
    assert!(status.last_sync_at.is_none());

    connectivity.set_online(true);
    manager.sync_all().await.unwrap();
    let status = manager.get_status().await.unwrap();
    assert!(status.last_sync_at.is_some());
    assert_eq!(status.stats.sync_queue_size, 0);
    assert_eq!(status.metrics.passes_completed, 1);

    let json = serde_json::to_value(&status).unwrap();
    assert_eq!(json["isOnline"], true);
    assert_eq!(json["totalVerifications"], 1);
    assert_eq!(json["syncQueueSize"], 0);
}
