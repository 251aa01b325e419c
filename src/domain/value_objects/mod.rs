mod code_status;
mod email;
mod sync_action_type;
mod sync_queue_id;
mod sync_queue_status;

pub use code_status::CodeStatus;
pub use email::Email;
pub use sync_action_type::SyncActionType;
pub use sync_queue_id::SyncQueueId;
pub use sync_queue_status::SyncQueueStatus;
