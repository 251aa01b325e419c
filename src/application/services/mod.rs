pub mod retry_policy;
pub mod settings_service;
pub mod sync_manager;
pub mod verification_service;

pub use retry_policy::RetryPolicy;
pub use settings_service::{Settings, SettingsService};
pub use sync_manager::{
    DrainReport, SyncManager, SyncManagerConfig, SyncRejection, SyncStatusSnapshot,
};
pub use verification_service::{SubmissionOutcome, VerificationService};
