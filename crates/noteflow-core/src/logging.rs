//! Structured logging field name constants for noteflow.
//!
//! All crates use these constants for consistent structured logging
//! fields so log aggregation tools can query by standardized names
//! across every subsystem.
//!
//! ## Log Level Contract
//!
//! | Level | Usage |
//! |-------|-------|
//! | ERROR | Degraded service, requires operator attention |
//! | WARN  | Recoverable issue, automatic fallback applied |
//! | INFO  | Lifecycle events (startup, shutdown), operation completions |
//! | DEBUG | Decision points, intermediate values, config choices |

/// Subsystem originating the log event.
/// Values: "db", "providers", "listener", "orchestrator", "retry"
pub const SUBSYSTEM: &str = "subsystem";

/// Component within a subsystem.
/// Examples: "pool", "openai", "scheduler", "pg_subscriber"
pub const COMPONENT: &str = "component";

/// Logical operation name.
/// Examples: "generate_completion", "claim_due", "start_listening"
pub const OPERATION: &str = "op";

/// Note UUID being operated on.
pub const NOTE_ID: &str = "note_id";

/// Student UUID a summary belongs to.
pub const STUDENT_ID: &str = "student_id";

/// Failed job UUID being processed.
pub const JOB_ID: &str = "job_id";

/// Failed job type string.
pub const JOB_TYPE: &str = "job_type";

/// Pub/sub channel name.
pub const CHANNEL: &str = "channel";

/// Model name used for a completion.
pub const MODEL: &str = "model";

/// Provider identifier ("openai", "ollama").
pub const PROVIDER: &str = "provider";

/// Wall-clock duration in milliseconds.
pub const DURATION_MS: &str = "duration_ms";

/// Retry attempt number.
pub const ATTEMPT: &str = "attempt";

/// Error message when an operation fails.
pub const ERROR_MSG: &str = "error";
