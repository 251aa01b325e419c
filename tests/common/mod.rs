use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use verisync::application::ports::{LocalStore, RemoteApi, RemoteOutcome};
use verisync::application::services::RetryPolicy;
use verisync::domain::entities::{NewVerification, ServerReferenceCode};
use verisync::{AppError, ConnectivityMonitor, SqliteLocalStore, SyncManager, SyncManagerConfig};

/// Remote stub that replays canned outcomes in order and accepts once the script runs out.
#[derive(Default)]
pub struct ScriptedRemote {
    script: Mutex<VecDeque<RemoteOutcome>>,
    calls: AtomicUsize,
}

impl ScriptedRemote {
    pub fn accepting() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn with(outcomes: Vec<RemoteOutcome>) -> Arc<Self> {
        Arc::new(Self {
            script: Mutex::new(outcomes.into()),
            calls: AtomicUsize::new(0),
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn next(&self) -> RemoteOutcome {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.script
            .lock()
            .expect("script lock")
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

pub struct SyncContext {
    pub store: Arc<SqliteLocalStore>,
    pub connectivity: ConnectivityMonitor,
    pub manager: Arc<SyncManager>,
}

pub async fn setup_sync(remote: Arc<dyn RemoteApi>, max_retries: u32) -> SyncContext {
    let store = Arc::new(SqliteLocalStore::in_memory());
    store.init().await.expect("in-memory store");

    let connectivity = ConnectivityMonitor::new(true);
    let manager = Arc::new(SyncManager::new(
        store.clone(),
        remote,
        connectivity.clone(),
        SyncManagerConfig {
            sync_interval: Duration::from_secs(3600),
            retry: RetryPolicy::without_backoff(max_retries),
        },
    ));

    SyncContext {
        store,
        connectivity,
        manager,
    }
}

#[allow(dead_code)]
pub fn ann() -> NewVerification {
    NewVerification::new("Ann Lee", "ann@x.edu", "CS001", "CPS-ABC12345")
}
