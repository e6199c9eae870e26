//! Student summary repository implementation.

use async_trait::async_trait;
use chrono::Utc;
use sqlx::{Pool, Postgres, Row};
use uuid::Uuid;

use noteflow_core::{CreateSummaryRequest, Error, Result, StudentSummary, SummaryRepository};

/// PostgreSQL implementation of SummaryRepository.
pub struct PgSummaryRepository {
    pool: Pool<Postgres>,
}

impl PgSummaryRepository {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }

    fn parse_summary_row(row: sqlx::postgres::PgRow) -> StudentSummary {
        StudentSummary {
            id: row.get("id"),
            student_id: row.get("student_id"),
            summary: row.get("summary"),
            note_count: row.get("note_count"),
            last_note_id: row.get("last_note_id"),
            model: row.get("model"),
            created_at: row.get("created_at"),
        }
    }
}

#[async_trait]
impl SummaryRepository for PgSummaryRepository {
    async fn insert(&self, req: CreateSummaryRequest) -> Result<Uuid> {
        let id = Uuid::new_v4();
        let now = Utc::now();

        sqlx::query(
            "INSERT INTO student_summary
                 (id, student_id, summary, note_count, last_note_id, model, created_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7)",
        )
        .bind(id)
        .bind(req.student_id)
        .bind(&req.summary)
        .bind(req.note_count)
        .bind(req.last_note_id)
        .bind(&req.model)
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(Error::Database)?;

        Ok(id)
    }

    async fn latest_for_student(&self, student_id: Uuid) -> Result<Option<StudentSummary>> {
        let row = sqlx::query(
            "SELECT id, student_id, summary, note_count, last_note_id, model, created_at
             FROM student_summary
             WHERE student_id = $1
             ORDER BY created_at DESC
             LIMIT 1",
        )
        .bind(student_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(Error::Database)?;

        Ok(row.map(Self::parse_summary_row))
    }
}
