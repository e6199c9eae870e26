//! # noteflow-db
//!
//! PostgreSQL storage and LISTEN/NOTIFY transport for noteflow.
//!
//! This crate provides:
//! - Connection pool management
//! - Repository implementations for notes, summaries, and failed jobs
//! - Typed notification publishing over `pg_notify`
//! - Channel subscriptions over dedicated listener connections
//!
//! ## Example
//!
//! ```rust,ignore
//! use noteflow_db::Database;
//! use noteflow_core::{CreateNoteRequest, NoteRepository};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let db = Database::connect("postgres://localhost/noteflow").await?;
//!
//!     let note = db.notes.insert(CreateNoteRequest {
//!         student_id: student,
//!         author_id: author,
//!         content: "Met with advisor to plan spring classes.".to_string(),
//!     }).await?;
//!
//!     println!("Created note: {}", note.id);
//!     Ok(())
//! }
//! ```

pub mod failed_jobs;
pub mod notes;
pub mod notify;
pub mod pool;
pub mod summaries;

// Re-export core types
pub use noteflow_core::*;

pub use failed_jobs::PgFailedJobRepository;
pub use notes::PgNoteRepository;
pub use notify::{PgNotificationPublisher, PgSubscriber, PgSubscriptionHandle};
pub use pool::{create_pool, create_pool_with_config, log_pool_metrics, PoolConfig};
pub use summaries::PgSummaryRepository;

/// Combined database context with all repositories and the pub/sub transport.
pub struct Database {
    /// The underlying connection pool.
    pub pool: sqlx::Pool<sqlx::Postgres>,
    /// Admin note repository.
    pub notes: PgNoteRepository,
    /// Student summary repository.
    pub summaries: PgSummaryRepository,
    /// Failed job repository for the retry subsystem.
    pub failed_jobs: PgFailedJobRepository,
    /// Outbound notification publisher.
    pub publisher: PgNotificationPublisher,
    /// Channel subscriber for the change listener.
    pub subscriber: PgSubscriber,
}

impl Database {
    /// Create a new Database instance from a connection pool.
    pub fn new(pool: sqlx::Pool<sqlx::Postgres>) -> Self {
        Self {
            notes: PgNoteRepository::new(pool.clone()),
            summaries: PgSummaryRepository::new(pool.clone()),
            failed_jobs: PgFailedJobRepository::new(pool.clone()),
            publisher: PgNotificationPublisher::new(pool.clone()),
            subscriber: PgSubscriber::new(pool.clone()),
            pool,
        }
    }

    /// Create a new Database instance by connecting to the given URL.
    pub async fn connect(url: &str) -> Result<Self> {
        let pool = create_pool(url).await?;
        Ok(Self::new(pool))
    }

    /// Create with custom pool configuration.
    pub async fn connect_with_config(url: &str, config: PoolConfig) -> Result<Self> {
        let pool = create_pool_with_config(url, config).await?;
        Ok(Self::new(pool))
    }

    /// Run pending migrations.
    #[cfg(feature = "migrations")]
    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("../../migrations")
            .run(&self.pool)
            .await
            .map_err(|e| Error::Database(sqlx::Error::Migrate(Box::new(e))))?;
        Ok(())
    }

    /// Get the underlying connection pool.
    pub fn pool(&self) -> &sqlx::Pool<sqlx::Postgres> {
        &self.pool
    }
}
