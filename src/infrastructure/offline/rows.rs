use sqlx::FromRow;

#[derive(Debug, Clone, FromRow)]
pub struct VerificationRow {
    pub email: String,
    pub id: String,
    pub full_name: String,
    pub index_number: String,
    pub reference_code: String,
    pub created_at: i64,
    pub synced: bool,
    pub retry_count: i64,
}

#[derive(Debug, Clone, FromRow)]
pub struct CodeRow {
    pub code: String,
    pub index_number: String,
    pub status: String,
    pub generated_at: i64,
    pub synced: bool,
}

#[derive(Debug, Clone, FromRow)]
pub struct SyncQueueItemRow {
    pub id: i64,
    pub action_type: String,
    pub payload: String,
    pub status: String,
    pub retry_count: i64,
    pub created_at: i64,
    pub updated_at: i64,
    pub next_attempt_at: Option<i64>,
    pub error_message: Option<String>,
}
