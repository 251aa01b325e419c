pub mod application;
pub mod domain;
pub mod infrastructure;
pub mod shared;
pub mod state;

pub use application::ports::{LocalStore, RemoteApi, RemoteOutcome};
pub use application::services::{
    DrainReport, SubmissionOutcome, SyncManager, SyncManagerConfig, SyncStatusSnapshot,
    VerificationService,
};
pub use infrastructure::network::ConnectivityMonitor;
pub use infrastructure::offline::SqliteLocalStore;
pub use shared::{AppConfig, AppError, Result};
pub use state::AppState;
