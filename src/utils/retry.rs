//! Transient-failure retry for store operations
//!
//! Only errors the store marks transient (timeouts, unavailability) are
//! worth retrying in place. Anything else surfaces to the caller — for
//! rollup work that simply means waiting for the next pass, since the
//! unconsumed work-queue entries make redoing it later safe.

use std::time::Duration;

use crate::data::error::StoreError;

/// In-place attempts before giving up on a store operation
const MAX_ATTEMPTS: u32 = 3;

/// Backoff before the second attempt; doubles on each further attempt
const INITIAL_BACKOFF: Duration = Duration::from_millis(100);

/// Run `operation`, retrying transient store errors with doubling backoff.
///
/// Non-transient errors fail immediately without burning attempts.
/// `agent_rollup_id` names the work being retried in the logs.
pub async fn retry_transient<F, Fut>(
    agent_rollup_id: &str,
    mut operation: F,
) -> Result<(), StoreError>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<(), StoreError>>,
{
    let mut attempt = 1u32;
    let mut backoff = INITIAL_BACKOFF;
    loop {
        match operation().await {
            Ok(()) => return Ok(()),
            Err(e) if e.is_transient() && attempt < MAX_ATTEMPTS => {
                tracing::warn!(
                    agent_rollup_id,
                    attempt,
                    backoff_ms = backoff.as_millis() as u64,
                    error = %e,
                    "Transient store error, backing off"
                );
                tokio::time::sleep(backoff).await;
                attempt += 1;
                backoff *= 2;
            }
            Err(e) => return Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn timeout() -> StoreError {
        StoreError::Timeout { timeout_secs: 1 }
    }

    #[tokio::test]
    async fn test_transient_errors_retry_until_success() {
        let calls = AtomicU32::new(0);
        let result = retry_transient("agent-1", || {
            let call = calls.fetch_add(1, Ordering::SeqCst);
            async move { if call < 2 { Err(timeout()) } else { Ok(()) } }
        })
        .await;
        assert!(result.is_ok());
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_non_transient_errors_fail_fast() {
        let calls = AtomicU32::new(0);
        let result = retry_transient("agent-1", || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(StoreError::Decode("truncated varint".into())) }
        })
        .await;
        assert!(matches!(result, Err(StoreError::Decode(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_gives_up_after_exhausting_attempts() {
        let calls = AtomicU32::new(0);
        let result = retry_transient("agent-1", || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(timeout()) }
        })
        .await;
        assert!(matches!(result, Err(StoreError::Timeout { .. })));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }
}
