//! Admin note repository implementation.

use async_trait::async_trait;
use chrono::Utc;
use sqlx::{Pool, Postgres, Row};
use uuid::Uuid;

use noteflow_core::{AdminNote, CreateNoteRequest, Error, NoteRepository, Result};

/// PostgreSQL implementation of NoteRepository.
///
/// `admin_note` carries an AFTER INSERT trigger that raises the
/// note-created notification, so `insert` never publishes directly.
pub struct PgNoteRepository {
    pool: Pool<Postgres>,
}

impl PgNoteRepository {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }

    fn parse_note_row(row: sqlx::postgres::PgRow) -> AdminNote {
        AdminNote {
            id: row.get("id"),
            student_id: row.get("student_id"),
            author_id: row.get("author_id"),
            content: row.get("content"),
            created_at: row.get("created_at"),
        }
    }
}

#[async_trait]
impl NoteRepository for PgNoteRepository {
    async fn insert(&self, req: CreateNoteRequest) -> Result<AdminNote> {
        let id = Uuid::new_v4();
        let now = Utc::now();

        let row = sqlx::query(
            "INSERT INTO admin_note (id, student_id, author_id, content, created_at)
             VALUES ($1, $2, $3, $4, $5)
             RETURNING id, student_id, author_id, content, created_at",
        )
        .bind(id)
        .bind(req.student_id)
        .bind(req.author_id)
        .bind(&req.content)
        .bind(now)
        .fetch_one(&self.pool)
        .await
        .map_err(Error::Database)?;

        Ok(Self::parse_note_row(row))
    }

    async fn fetch(&self, id: Uuid) -> Result<Option<AdminNote>> {
        let row = sqlx::query(
            "SELECT id, student_id, author_id, content, created_at
             FROM admin_note WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(Error::Database)?;

        Ok(row.map(Self::parse_note_row))
    }

    async fn recent_for_student(&self, student_id: Uuid, limit: i64) -> Result<Vec<AdminNote>> {
        let rows = sqlx::query(
            "SELECT id, student_id, author_id, content, created_at
             FROM admin_note
             WHERE student_id = $1
             ORDER BY created_at DESC
             LIMIT $2",
        )
        .bind(student_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(Error::Database)?;

        Ok(rows.into_iter().map(Self::parse_note_row).collect())
    }
}
