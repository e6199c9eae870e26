//! Failed job repository implementation.
//!
//! The claim queries use `FOR UPDATE SKIP LOCKED` so multiple scheduler
//! instances can drain the queue without double-claiming a row.

use std::collections::HashMap;
use std::str::FromStr;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{Pool, Postgres, Row};
use uuid::Uuid;

use noteflow_core::{
    Error, FailedJob, FailedJobRepository, FailedJobStats, NewFailedJob, NewRetryLogEntry,
    Result, RetryJobStatus, RetryLogEntry,
};

/// PostgreSQL implementation of FailedJobRepository.
pub struct PgFailedJobRepository {
    pool: Pool<Postgres>,
}

impl PgFailedJobRepository {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }

    fn parse_job_row(row: sqlx::postgres::PgRow) -> Result<FailedJob> {
        let status: String = row.get("status");
        Ok(FailedJob {
            id: row.get("id"),
            job_type: row.get("job_type"),
            payload: row.get("payload"),
            error_message: row.get("error_message"),
            error_detail: row.get("error_detail"),
            attempt_count: row.get("attempt_count"),
            max_retries: row.get("max_retries"),
            next_retry_at: row.get("next_retry_at"),
            failed_at: row.get("failed_at"),
            last_attempted_at: row.get("last_attempted_at"),
            status: RetryJobStatus::from_str(&status)?,
        })
    }

    fn parse_log_row(row: sqlx::postgres::PgRow) -> RetryLogEntry {
        RetryLogEntry {
            id: row.get("id"),
            failed_job_id: row.get("failed_job_id"),
            attempt_number: row.get("attempt_number"),
            error: row.get("error"),
            attempted_at: row.get("attempted_at"),
        }
    }
}

const JOB_COLUMNS: &str = "id, job_type, payload, error_message, error_detail, \
     attempt_count, max_retries, next_retry_at, failed_at, last_attempted_at, status";

#[async_trait]
impl FailedJobRepository for PgFailedJobRepository {
    async fn insert(&self, job: NewFailedJob) -> Result<Uuid> {
        let id = Uuid::new_v4();
        let now = Utc::now();

        sqlx::query(
            "INSERT INTO failed_job
                 (id, job_type, payload, error_message, error_detail,
                  attempt_count, max_retries, next_retry_at, failed_at, status)
             VALUES ($1, $2, $3, $4, $5, 1, $6, $7, $8, 'failed')",
        )
        .bind(id)
        .bind(&job.job_type)
        .bind(&job.payload)
        .bind(&job.error_message)
        .bind(&job.error_detail)
        .bind(job.max_retries)
        .bind(job.next_retry_at)
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(Error::Database)?;

        Ok(id)
    }

    async fn get(&self, id: Uuid) -> Result<Option<FailedJob>> {
        let row = sqlx::query(&format!(
            "SELECT {JOB_COLUMNS} FROM failed_job WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(Error::Database)?;

        row.map(Self::parse_job_row).transpose()
    }

    async fn claim_due(&self, now: DateTime<Utc>, limit: i64) -> Result<Vec<FailedJob>> {
        let rows = sqlx::query(&format!(
            "UPDATE failed_job
             SET status = 'retrying', last_attempted_at = $1
             WHERE id IN (
                 SELECT id FROM failed_job
                 WHERE status = 'failed'
                   AND next_retry_at <= $1
                   AND attempt_count < max_retries
                 ORDER BY next_retry_at ASC
                 LIMIT $2
                 FOR UPDATE SKIP LOCKED
             )
             RETURNING {JOB_COLUMNS}"
        ))
        .bind(now)
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(Error::Database)?;

        rows.into_iter().map(Self::parse_job_row).collect()
    }

    async fn claim_by_id(&self, id: Uuid, now: DateTime<Utc>) -> Result<Option<FailedJob>> {
        let row = sqlx::query(&format!(
            "UPDATE failed_job
             SET status = 'retrying', last_attempted_at = $2
             WHERE id = (
                 SELECT id FROM failed_job
                 WHERE id = $1 AND status IN ('failed', 'abandoned')
                 FOR UPDATE SKIP LOCKED
             )
             RETURNING {JOB_COLUMNS}"
        ))
        .bind(id)
        .bind(now)
        .fetch_optional(&self.pool)
        .await
        .map_err(Error::Database)?;

        row.map(Self::parse_job_row).transpose()
    }

    async fn reschedule(
        &self,
        id: Uuid,
        attempt_count: i32,
        next_retry_at: DateTime<Utc>,
    ) -> Result<()> {
        sqlx::query(
            "UPDATE failed_job
             SET status = 'failed', attempt_count = $2, next_retry_at = $3
             WHERE id = $1",
        )
        .bind(id)
        .bind(attempt_count)
        .bind(next_retry_at)
        .execute(&self.pool)
        .await
        .map_err(Error::Database)?;
        Ok(())
    }

    async fn abandon(&self, id: Uuid, attempt_count: i32) -> Result<()> {
        sqlx::query(
            "UPDATE failed_job
             SET status = 'abandoned', attempt_count = $2
             WHERE id = $1",
        )
        .bind(id)
        .bind(attempt_count)
        .execute(&self.pool)
        .await
        .map_err(Error::Database)?;
        Ok(())
    }

    async fn restore_failed(&self, id: Uuid) -> Result<()> {
        sqlx::query("UPDATE failed_job SET status = 'failed' WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(Error::Database)?;
        Ok(())
    }

    async fn delete(&self, id: Uuid) -> Result<()> {
        sqlx::query("DELETE FROM failed_job WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(Error::Database)?;
        Ok(())
    }

    async fn append_log(&self, entry: NewRetryLogEntry) -> Result<()> {
        let id = Uuid::new_v4();
        let now = Utc::now();

        sqlx::query(
            "INSERT INTO retry_log (id, failed_job_id, attempt_number, error, attempted_at)
             VALUES ($1, $2, $3, $4, $5)",
        )
        .bind(id)
        .bind(entry.failed_job_id)
        .bind(entry.attempt_number)
        .bind(&entry.error)
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(Error::Database)?;
        Ok(())
    }

    async fn logs_for_job(&self, failed_job_id: Uuid) -> Result<Vec<RetryLogEntry>> {
        let rows = sqlx::query(
            "SELECT id, failed_job_id, attempt_number, error, attempted_at
             FROM retry_log
             WHERE failed_job_id = $1
             ORDER BY attempted_at ASC",
        )
        .bind(failed_job_id)
        .fetch_all(&self.pool)
        .await
        .map_err(Error::Database)?;

        Ok(rows.into_iter().map(Self::parse_log_row).collect())
    }

    async fn stats(&self) -> Result<FailedJobStats> {
        let rows = sqlx::query(
            "SELECT job_type, status, COUNT(*) as count
             FROM failed_job
             GROUP BY job_type, status",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(Error::Database)?;

        let mut stats = FailedJobStats {
            total: 0,
            by_type: HashMap::new(),
            by_status: HashMap::new(),
        };
        for row in rows {
            let job_type: String = row.get("job_type");
            let status: String = row.get("status");
            let count: i64 = row.get("count");
            stats.total += count;
            *stats.by_type.entry(job_type).or_insert(0) += count;
            *stats.by_status.entry(status).or_insert(0) += count;
        }
        Ok(stats)
    }

    async fn delete_abandoned_before(&self, cutoff: DateTime<Utc>) -> Result<u64> {
        let result = sqlx::query(
            "DELETE FROM failed_job WHERE status = 'abandoned' AND failed_at < $1",
        )
        .bind(cutoff)
        .execute(&self.pool)
        .await
        .map_err(Error::Database)?;

        Ok(result.rows_affected())
    }

    async fn prune_logs_before(&self, cutoff: DateTime<Utc>) -> Result<u64> {
        let result = sqlx::query("DELETE FROM retry_log WHERE attempted_at < $1")
            .bind(cutoff)
            .execute(&self.pool)
            .await
            .map_err(Error::Database)?;

        Ok(result.rows_affected())
    }
}
