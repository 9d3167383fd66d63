//! Caller-side retry with exponential backoff for transient errors.
//!
//! The reconciler itself never retries. These helpers wrap a whole call and
//! repeat it only while the failure is retryable.

use crate::error::{Error, ErrorDescriptor, Result};
use crate::types::{ReconciliationOutcome, RetryConfig};
use std::thread;
use std::time::Duration;

/// Callback trait for retry progress notifications.
pub trait RetryCallback {
    /// Called before sleeping ahead of another attempt.
    ///
    /// # Arguments
    /// * `attempt` - Attempt that just failed (1-indexed)
    /// * `max_attempts` - Maximum number of attempts
    /// * `error` - The failure that triggered the retry
    /// * `delay` - Time until the next attempt
    fn on_retry(&self, attempt: u32, max_attempts: u32, error: &ErrorDescriptor, delay: Duration);
}

/// No-op callback that does nothing.
pub struct NoCallback;

impl RetryCallback for NoCallback {
    fn on_retry(&self, _attempt: u32, _max_attempts: u32, _error: &ErrorDescriptor, _delay: Duration) {
    }
}

/// Callback that logs retries at warn level.
pub struct LogCallback;

impl RetryCallback for LogCallback {
    fn on_retry(&self, attempt: u32, max_attempts: u32, error: &ErrorDescriptor, delay: Duration) {
        log::warn!(
            "attempt {attempt}/{max_attempts} failed: {error}. Retrying in {}s",
            delay.as_secs()
        );
    }
}

/// Execute an operation with retry logic.
///
/// Retries the operation while it returns a retryable error, sleeping with
/// exponential backoff between attempts.
///
/// # Returns
/// The result of the operation, or the last error if all attempts failed.
pub fn with_retry<T, F>(
    config: &RetryConfig,
    callback: Option<&dyn RetryCallback>,
    mut operation: F,
) -> Result<T>
where
    F: FnMut() -> Result<T>,
{
    let max_attempts = config.max_attempts.max(1);
    let mut attempt = 0;
    loop {
        match operation() {
            Ok(result) => return Ok(result),
            Err(e) if !e.is_retryable() || attempt + 1 >= max_attempts => return Err(e),
            Err(e) => {
                pause(config, callback, attempt, max_attempts, &ErrorDescriptor::from(&e));
                attempt += 1;
            }
        }
    }
}

/// Repeat a reconciliation while its outcome carries a retryable error.
///
/// Safe because each reconciliation re-locates before mutating.
pub fn reconcile_with_retry<F>(
    config: &RetryConfig,
    callback: Option<&dyn RetryCallback>,
    mut operation: F,
) -> ReconciliationOutcome
where
    F: FnMut() -> ReconciliationOutcome,
{
    let max_attempts = config.max_attempts.max(1);
    let mut attempt = 0;
    loop {
        let outcome = operation();
        let retryable = outcome.error.as_ref().filter(|e| e.retryable).cloned();
        match retryable {
            Some(error) if attempt + 1 < max_attempts => {
                pause(config, callback, attempt, max_attempts, &error);
                attempt += 1;
            }
            _ => return outcome,
        }
    }
}

fn pause(
    config: &RetryConfig,
    callback: Option<&dyn RetryCallback>,
    attempt: u32,
    max_attempts: u32,
    error: &ErrorDescriptor,
) {
    let delay = config.delay_for_attempt(attempt);
    if let Some(cb) = callback {
        cb.on_retry(attempt + 1, max_attempts, error, delay);
    }
    thread::sleep(delay);
}
