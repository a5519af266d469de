//! Backoff for transient SQLite failures
//!
//! Workers write concurrently through one pool, so BUSY/LOCKED results are
//! expected under load. Store operations go through [`with_retry`].

use std::future::Future;
use std::time::Duration;

/// Maximum number of retry attempts for database operations
pub const MAX_RETRIES: u32 = 5;

/// SQLite result codes worth retrying
///
/// BUSY (5), LOCKED (6), IOERR (10) and its extended codes READ (266),
/// SHORT_READ (522), WRITE (2314), FSYNC (3338), LOCK (5386), plus
/// BUSY_SNAPSHOT (1032).
const TRANSIENT_CODES: &[&str] = &["5", "6", "10", "266", "522", "1032", "2314", "3338", "5386"];

/// Check if a SQLite error is transient and should be retried
pub fn is_transient_error(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Database(db_err) => db_err
            .code()
            .is_some_and(|code| TRANSIENT_CODES.iter().any(|c| *c == code)),
        sqlx::Error::PoolTimedOut => true,
        _ => false,
    }
}

/// 100ms, 200ms, 400ms, ...
fn backoff_delay(attempt: u32) -> Duration {
    Duration::from_millis(100 * 2u64.pow(attempt.saturating_sub(1)))
}

/// Run a database operation, retrying transient errors with exponential backoff
pub async fn with_retry<F, Fut, T>(operation: F) -> std::result::Result<T, sqlx::Error>
where
    F: Fn() -> Fut,
    Fut: Future<Output = std::result::Result<T, sqlx::Error>>,
{
    let mut attempts = 0;
    loop {
        match operation().await {
            Ok(result) => return Ok(result),
            Err(e) if is_transient_error(&e) && attempts < MAX_RETRIES => {
                attempts += 1;
                let delay = backoff_delay(attempts);
                tracing::debug!(
                    error = %e,
                    attempt = attempts,
                    max_retries = MAX_RETRIES,
                    delay_ms = delay.as_millis() as u64,
                    "Database transient error, retrying"
                );
                tokio::time::sleep(delay).await;
            }
            Err(e) => return Err(e),
        }
    }
}
