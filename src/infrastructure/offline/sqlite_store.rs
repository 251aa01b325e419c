use super::mappers::{code_from_row, sync_queue_item_from_row, verification_from_row};
use super::rows::{CodeRow, SyncQueueItemRow, VerificationRow};
use crate::application::ports::local_store::LocalStore;
use crate::domain::entities::{
    CodeRecord, CodeUsagePayload, NewVerification, ServerReferenceCode, StoreStats,
    SyncQueueItem, VerificationRecord,
};
use crate::domain::value_objects::{CodeStatus, Email, SyncActionType, SyncQueueId};
use crate::infrastructure::database::ConnectionPool;
use crate::shared::error::AppError;
use async_trait::async_trait;
use chrono::{DateTime, SubsecRound, Utc};
use serde_json::Value;
use sqlx::{SqliteConnection, SqlitePool};
use tokio::sync::OnceCell;
use tracing::{debug, info};

/// SQLite implementation of [`LocalStore`]. The pool is opened and migrated lazily on the
/// first call to [`LocalStore::init`] (every operation goes through it).
pub struct SqliteLocalStore {
    database_url: String,
    max_connections: u32,
    connection: OnceCell<ConnectionPool>,
}

impl SqliteLocalStore {
    pub fn new(database_url: impl Into<String>, max_connections: u32) -> Self {
        Self {
            database_url: database_url.into(),
            max_connections,
            connection: OnceCell::new(),
        }
    }

    pub fn in_memory() -> Self {
        Self::new("sqlite::memory:", 1)
    }

    pub fn database_url(&self) -> &str {
        &self.database_url
    }

    pub(crate) async fn pool(&self) -> Result<&SqlitePool, AppError> {
        let connection = self
            .connection
            .get_or_try_init(|| async {
                let connection =
                    ConnectionPool::new(&self.database_url, self.max_connections).await?;
                connection.migrate().await?;
                info!(database_url = %self.database_url, "local store opened");
                Ok::<_, AppError>(connection)
            })
            .await?;
        Ok(connection.get_pool())
    }

    pub async fn close(&self) {
        if let Some(connection) = self.connection.get() {
            connection.close().await;
        }
    }
}

fn now() -> DateTime<Utc> {
    // stored with millisecond precision
    Utc::now().trunc_subsecs(3)
}

async fn insert_queue_item(
    conn: &mut SqliteConnection,
    action_type: &SyncActionType,
    payload: &Value,
    at: DateTime<Utc>,
) -> Result<SyncQueueId, AppError> {
    let payload = serde_json::to_string(payload)?;
    let created_at = at.timestamp_millis();

    let result = sqlx::query(
        r#"
        INSERT INTO sync_queue (action_type, payload, status, retry_count, created_at, updated_at)
        VALUES (?1, ?2, 'pending', 0, ?3, ?3)
        "#,
    )
    .bind(action_type.as_str())
    .bind(&payload)
    .bind(created_at)
    .execute(&mut *conn)
    .await?;

    SyncQueueId::new(result.last_insert_rowid()).map_err(AppError::Internal)
}

async fn count(pool: &SqlitePool, sql: &str) -> Result<u64, AppError> {
    let (count,): (i64,) = sqlx::query_as(sql).fetch_one(pool).await?;
    Ok(count.max(0) as u64)
}

#[async_trait]
impl LocalStore for SqliteLocalStore {
    async fn init(&self) -> Result<(), AppError> {
        self.pool().await.map(|_| ())
    }

    async fn add_verification(
        &self,
        submission: NewVerification,
    ) -> Result<VerificationRecord, AppError> {
        let submission = submission
            .normalized()
            .map_err(AppError::ValidationError)?;
        let email = Email::parse(&submission.email).map_err(AppError::ValidationError)?;
        let created_at = now();
        let record = VerificationRecord::create(submission, email, created_at);
        let payload = serde_json::to_value(&record)?;

        let pool = self.pool().await?;
        let mut tx = pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO verifications (
                email, id, full_name, index_number, reference_code,
                created_at, synced, retry_count
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, 0, 0)
            ON CONFLICT(email) DO UPDATE SET
                id = excluded.id,
                full_name = excluded.full_name,
                index_number = excluded.index_number,
                reference_code = excluded.reference_code,
                created_at = excluded.created_at,
                synced = 0,
                retry_count = 0
            "#,
        )
        .bind(record.email.as_str())
        .bind(&record.id)
        .bind(&record.full_name)
        .bind(&record.index_number)
        .bind(&record.reference_code)
        .bind(created_at.timestamp_millis())
        .execute(&mut *tx)
        .await?;

        // an earlier attempt for the same email that never left the device is replaced
        let superseded = sqlx::query(
            r#"
            DELETE FROM sync_queue
            WHERE action_type = ?1
              AND status = 'pending'
              AND json_extract(payload, '$.email') = ?2
            "#,
        )
        .bind(SyncActionType::Verification.as_str())
        .bind(record.email.as_str())
        .execute(&mut *tx)
        .await?
        .rows_affected();

        let queue_id =
            insert_queue_item(&mut tx, &SyncActionType::Verification, &payload, created_at)
                .await?;

        tx.commit().await?;

        debug!(
            email = %record.email,
            queue_id = %queue_id,
            superseded,
            "verification stored locally"
        );
        Ok(record)
    }

    async fn get_verification(
        &self,
        email: &Email,
    ) -> Result<Option<VerificationRecord>, AppError> {
        let pool = self.pool().await?;
        let row = sqlx::query_as::<_, VerificationRow>(
            r#"SELECT * FROM verifications WHERE email = ?1"#,
        )
        .bind(email.as_str())
        .fetch_optional(pool)
        .await?;

        row.map(verification_from_row).transpose()
    }

    async fn mark_verification_synced(&self, email: &Email) -> Result<(), AppError> {
        let pool = self.pool().await?;
        sqlx::query(r#"UPDATE verifications SET synced = 1 WHERE email = ?1"#)
            .bind(email.as_str())
            .execute(pool)
            .await?;
        Ok(())
    }

    async fn get_unsynced_verifications(&self) -> Result<Vec<VerificationRecord>, AppError> {
        let pool = self.pool().await?;
        let rows = sqlx::query_as::<_, VerificationRow>(
            r#"
            SELECT * FROM verifications
            WHERE synced = 0
            ORDER BY created_at ASC
            "#,
        )
        .fetch_all(pool)
        .await?;

        rows.into_iter().map(verification_from_row).collect()
    }

    async fn add_code(&self, code: &str, index_number: &str) -> Result<CodeRecord, AppError> {
        let code = code.trim();
        if code.is_empty() {
            return Err(AppError::ValidationError("Code is required".to_string()));
        }

        let record = CodeRecord {
            code: code.to_string(),
            index_number: index_number.trim().to_string(),
            status: CodeStatus::Unused,
            generated_at: now(),
            synced: false,
        };

        let pool = self.pool().await?;
        let result = sqlx::query(
            r#"
            INSERT INTO codes (code, index_number, status, generated_at, synced)
            VALUES (?1, ?2, ?3, ?4, 0)
            "#,
        )
        .bind(&record.code)
        .bind(&record.index_number)
        .bind(record.status.as_str())
        .bind(record.generated_at.timestamp_millis())
        .execute(pool)
        .await;

        match result {
            Ok(_) => Ok(record),
            Err(sqlx::Error::Database(err)) if err.is_unique_violation() => Err(
                AppError::InvalidInput(format!("Code `{}` is already cached", record.code)),
            ),
            Err(err) => Err(err.into()),
        }
    }

    async fn get_code(&self, code: &str) -> Result<Option<CodeRecord>, AppError> {
        let pool = self.pool().await?;
        let row = sqlx::query_as::<_, CodeRow>(r#"SELECT * FROM codes WHERE code = ?1"#)
            .bind(code.trim())
            .fetch_optional(pool)
            .await?;

        row.map(code_from_row).transpose()
    }

    async fn mark_code_used(&self, code: &str) -> Result<(), AppError> {
        let code = code.trim();
        let pool = self.pool().await?;
        let mut tx = pool.begin().await?;

        let updated = sqlx::query(
            r#"
            UPDATE codes
            SET status = 'used', synced = 0
            WHERE code = ?1
            "#,
        )
        .bind(code)
        .execute(&mut *tx)
        .await?
        .rows_affected();

        if updated == 0 {
            debug!(code, "mark_code_used ignored unknown code");
            return Ok(());
        }

        let payload = serde_json::to_value(CodeUsagePayload {
            code: code.to_string(),
        })?;
        let queue_id =
            insert_queue_item(&mut tx, &SyncActionType::CodeUsage, &payload, now()).await?;

        tx.commit().await?;

        debug!(code, queue_id = %queue_id, "code marked used locally");
        Ok(())
    }

    async fn cache_reference_codes(
        &self,
        snapshot: &[ServerReferenceCode],
    ) -> Result<usize, AppError> {
        let pool = self.pool().await?;
        let mut tx = pool.begin().await?;

        for entry in snapshot {
            let status = entry.parsed_status().map_err(AppError::InvalidInput)?;
            let generated_at = entry.created_at_utc().map_err(AppError::InvalidInput)?;

            sqlx::query(
                r#"
                INSERT INTO codes (code, index_number, status, generated_at, synced)
                VALUES (?1, ?2, ?3, ?4, 1)
                ON CONFLICT(code) DO UPDATE SET
                    index_number = excluded.index_number,
                    generated_at = excluded.generated_at,
                    synced = CASE
                        WHEN codes.status = 'used' AND excluded.status = 'unused' THEN codes.synced
                        ELSE 1
                    END,
                    status = CASE
                        WHEN codes.status = 'used' THEN 'used'
                        ELSE excluded.status
                    END
                "#,
            )
            .bind(entry.code.trim())
            .bind(&entry.index_number)
            .bind(status.as_str())
            .bind(generated_at.timestamp_millis())
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;

        info!(count = snapshot.len(), "reference code cache refreshed");
        Ok(snapshot.len())
    }

    async fn get_all_codes(&self) -> Result<Vec<CodeRecord>, AppError> {
        let pool = self.pool().await?;
        let rows = sqlx::query_as::<_, CodeRow>(r#"SELECT * FROM codes ORDER BY rowid ASC"#)
            .fetch_all(pool)
            .await?;

        rows.into_iter().map(code_from_row).collect()
    }

    async fn enqueue_sync(
        &self,
        action_type: SyncActionType,
        payload: Value,
    ) -> Result<SyncQueueId, AppError> {
        let pool = self.pool().await?;
        let mut conn = pool.acquire().await?;
        insert_queue_item(&mut conn, &action_type, &payload, now()).await
    }

    async fn get_sync_queue(&self) -> Result<Vec<SyncQueueItem>, AppError> {
        let pool = self.pool().await?;
        let rows =
            sqlx::query_as::<_, SyncQueueItemRow>(r#"SELECT * FROM sync_queue ORDER BY id ASC"#)
                .fetch_all(pool)
                .await?;

        rows.into_iter().map(sync_queue_item_from_row).collect()
    }

    async fn list_failed_sync_items(&self) -> Result<Vec<SyncQueueItem>, AppError> {
        let pool = self.pool().await?;
        let rows = sqlx::query_as::<_, SyncQueueItemRow>(
            r#"
            SELECT * FROM sync_queue
            WHERE status = 'failed'
            ORDER BY id ASC
            "#,
        )
        .fetch_all(pool)
        .await?;

        rows.into_iter().map(sync_queue_item_from_row).collect()
    }

    async fn remove_sync_queue_item(&self, id: SyncQueueId) -> Result<(), AppError> {
        let pool = self.pool().await?;
        sqlx::query(r#"DELETE FROM sync_queue WHERE id = ?1"#)
            .bind(id.value())
            .execute(pool)
            .await?;
        Ok(())
    }

    async fn discard_failed_sync_item(&self, id: SyncQueueId) -> Result<(), AppError> {
        let pool = self.pool().await?;
        let result = sqlx::query(r#"DELETE FROM sync_queue WHERE id = ?1 AND status = 'failed'"#)
            .bind(id.value())
            .execute(pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(format!("failed queue entry {id}")));
        }
        Ok(())
    }

    async fn increment_sync_retry(
        &self,
        id: SyncQueueId,
        error_message: &str,
        next_attempt_at: Option<DateTime<Utc>>,
    ) -> Result<Option<u32>, AppError> {
        let pool = self.pool().await?;
        let retry_count: Option<(i64,)> = sqlx::query_as(
            r#"
            UPDATE sync_queue
            SET retry_count = retry_count + 1,
                error_message = ?1,
                next_attempt_at = ?2,
                updated_at = ?3
            WHERE id = ?4
            RETURNING retry_count
            "#,
        )
        .bind(error_message)
        .bind(next_attempt_at.map(|at| at.timestamp_millis()))
        .bind(now().timestamp_millis())
        .bind(id.value())
        .fetch_optional(pool)
        .await?;

        Ok(retry_count.map(|(count,)| count.max(0) as u32))
    }

    async fn mark_sync_failed(&self, id: SyncQueueId, reason: &str) -> Result<(), AppError> {
        let pool = self.pool().await?;
        sqlx::query(
            r#"
            UPDATE sync_queue
            SET status = 'failed',
                error_message = ?1,
                next_attempt_at = NULL,
                updated_at = ?2
            WHERE id = ?3
            "#,
        )
        .bind(reason)
        .bind(now().timestamp_millis())
        .bind(id.value())
        .execute(pool)
        .await?;
        Ok(())
    }

    async fn get_stats(&self) -> Result<StoreStats, AppError> {
        let pool = self.pool().await?;
        Ok(StoreStats {
            total_verifications: count(pool, "SELECT COUNT(*) FROM verifications").await?,
            total_codes: count(pool, "SELECT COUNT(*) FROM codes").await?,
            sync_queue_size: count(pool, "SELECT COUNT(*) FROM sync_queue").await?,
            unsynced_count: count(pool, "SELECT COUNT(*) FROM verifications WHERE synced = 0")
                .await?,
            failed_queue_size: count(
                pool,
                "SELECT COUNT(*) FROM sync_queue WHERE status = 'failed'",
            )
            .await?,
        })
    }

    async fn clear_all(&self) -> Result<(), AppError> {
        let pool = self.pool().await?;
        let mut tx = pool.begin().await?;
        for table in ["verifications", "codes", "sync_queue"] {
            sqlx::query(&format!("DELETE FROM {table}"))
                .execute(&mut *tx)
                .await?;
        }
        tx.commit().await?;

        info!("local store cleared");
        Ok(())
    }

    async fn get_setting(&self, key: &str) -> Result<Option<String>, AppError> {
        let pool = self.pool().await?;
        let value: Option<(String,)> =
            sqlx::query_as(r#"SELECT value FROM settings WHERE key = ?1"#)
                .bind(key)
                .fetch_optional(pool)
                .await?;
        Ok(value.map(|(value,)| value))
    }

    async fn put_setting(&self, key: &str, value: &str) -> Result<(), AppError> {
        let pool = self.pool().await?;
        sqlx::query(
            r#"
            INSERT INTO settings (key, value, updated_at)
            VALUES (?1, ?2, ?3)
            ON CONFLICT(key) DO UPDATE SET
                value = excluded.value,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(key)
        .bind(value)
        .bind(now().timestamp_millis())
        .execute(pool)
        .await?;
        Ok(())
    }
}
