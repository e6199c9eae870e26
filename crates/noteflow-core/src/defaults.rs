//! Default values shared across the noteflow crates.

/// Number of recent notes pulled into one summarization prompt.
pub const HISTORY_LIMIT: i64 = 10;

/// Maximum total attempts for a failed summarization job.
pub const MAX_RETRIES: i32 = 3;

/// Jobs claimed per scheduler tick.
pub const RETRY_BATCH_SIZE: i64 = 10;

/// Retry scheduler tick interval in milliseconds.
pub const RETRY_INTERVAL_MS: u64 = 30_000;

/// Backoff ladder indexed by attempt number (1m, 5m, 15m, 30m, 1h).
/// Attempts past the last rung clamp to it.
pub const BACKOFF_LADDER_SECS: [i64; 5] = [60, 300, 900, 1800, 3600];

/// Symmetric jitter applied to the selected backoff rung (±25%).
pub const BACKOFF_JITTER: f64 = 0.25;

/// Provider request timeout in seconds.
pub const PROVIDER_TIMEOUT_SECS: u64 = 30;

/// Delay before the subscriber resumes receiving after a transport error.
pub const SUBSCRIBER_RECONNECT_DELAY_MS: u64 = 1_000;

/// Default Ollama endpoint.
pub const OLLAMA_URL: &str = "http://localhost:11434";

/// Default OpenAI endpoint.
pub const OPENAI_URL: &str = "https://api.openai.com/v1";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backoff_ladder_is_non_decreasing() {
        for pair in BACKOFF_LADDER_SECS.windows(2) {
            assert!(pair[0] <= pair[1]);
        }
    }

    #[test]
    fn test_jitter_fraction_in_range() {
        assert!(BACKOFF_JITTER > 0.0 && BACKOFF_JITTER < 1.0);
    }
}
