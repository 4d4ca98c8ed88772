//! Bounded retry with doubling backoff for session controller calls.

use std::time::Duration;

use tracing::warn;

use forgeflow_types::{ForgeflowError, RetryConfig};

use crate::clock::{CancelToken, Clock};

/// Run `op` until it succeeds, fails with a non-transient error, or the
/// attempt budget is spent.
///
/// Transient failures ([`ForgeflowError::is_transient`]) are retried after a
/// backoff that starts at `initial_backoff_ms` and doubles up to
/// `max_backoff_ms`. Exhaustion is reported as
/// [`ForgeflowError::ResourceExhausted`]. If `cancel` fires during a
/// backoff, the last error is returned without another attempt.
pub fn with_retry<T, C, F>(
    operation: &str,
    policy: &RetryConfig,
    clock: &C,
    cancel: &CancelToken,
    mut op: F,
) -> Result<T, ForgeflowError>
where
    C: Clock + ?Sized,
    F: FnMut() -> Result<T, ForgeflowError>,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut backoff_ms = policy.initial_backoff_ms;
    let mut attempt = 1;

    loop {
        let err = match op() {
            Ok(value) => return Ok(value),
            Err(e) if !e.is_transient() => return Err(e),
            Err(e) => e,
        };

        if attempt >= max_attempts {
            return Err(ForgeflowError::ResourceExhausted {
                operation: operation.to_string(),
                attempts: attempt,
                last_error: err.to_string(),
            });
        }

        warn!(
            operation,
            attempt,
            error = %err,
            backoff_ms,
            "controller call failed, backing off"
        );
        if !clock.sleep(Duration::from_millis(backoff_ms), cancel) {
            return Err(err);
        }
        backoff_ms = backoff_ms.saturating_mul(2).min(policy.max_backoff_ms);
        attempt += 1;
    }
}
