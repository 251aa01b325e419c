pub mod reference_code;
pub mod store_stats;
pub mod sync_queue_item;
pub mod verification;

pub use reference_code::{CodeRecord, CodeUsagePayload, ServerReferenceCode};
pub use store_stats::StoreStats;
pub use sync_queue_item::SyncQueueItem;
pub use verification::{NewVerification, VerificationRecord};
