//! Backoff for throttled directory reads
//!
//! Microsoft Graph signals throttling with `429 Too Many Requests` or
//! `503 Service Unavailable`, usually with a `Retry-After` header. Reads that
//! hit throttling are re-issued after the advertised delay, or after an
//! exponentially growing delay when the service gives none. Any other failure
//! is returned to the caller as-is: failed operations are not retried.
//!
//! Mutating requests never go through this module.

use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;
use tracing::debug;

/// Configuration for the exponential backoff strategy
///
/// # Examples
///
/// ```
/// use mbxgroups::retry::RetryConfig;
///
/// let config = RetryConfig {
///     max_attempts: 5,
///     initial_backoff_ms: 500,
///     backoff_factor: 2.0,
///     max_backoff_ms: 30_000,
///     add_jitter: true,
/// };
/// assert!(config.max_attempts > RetryConfig::default().max_attempts);
/// ```
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum number of attempts, including the first one
    pub max_attempts: u32,

    /// Wait before the second attempt when no delay is advertised
    pub initial_backoff_ms: u64,

    /// Multiplier for each subsequent wait
    pub backoff_factor: f64,

    /// Upper bound for any single wait, advertised or computed
    pub max_backoff_ms: u64,

    /// Whether to add jitter to computed waits
    pub add_jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 4,
            initial_backoff_ms: 1000,
            backoff_factor: 2.0,
            max_backoff_ms: 60_000,
            add_jitter: true,
        }
    }
}

/// What to do after a failed attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Return the error to the caller
    GiveUp,
    /// Wait the computed backoff, then try again
    Backoff,
    /// Wait the delay advertised by the service, then try again
    After(Duration),
}

/// Executes an operation, re-issuing it while `decide` asks for a retry
///
/// # Arguments
/// * `operation` - An async function that returns a Result
/// * `decide` - Classifies an error into a [`RetryDecision`]
/// * `config` - RetryConfig with backoff parameters
///
/// # Returns
/// * `Result<T, E>` - The first success, or the last error once attempts run
///   out or `decide` gives up
///
/// # Examples
///
/// ```
/// use mbxgroups::retry::{RetryConfig, RetryDecision, with_backoff};
///
/// # async fn example() -> anyhow::Result<()> {
/// let config = RetryConfig::default();
/// let value = with_backoff(
///     || async { Ok::<_, anyhow::Error>("groups") },
///     |_err| RetryDecision::GiveUp,
///     &config,
/// )
/// .await?;
/// assert_eq!(value, "groups");
/// # Ok(())
/// # }
/// ```
pub async fn with_backoff<F, Fut, T, E, D>(operation: F, decide: D, config: &RetryConfig) -> Result<T, E>
where
    F: Fn() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    D: Fn(&E) -> RetryDecision,
{
    let mut attempt = 0;
    let mut backoff_ms = config.initial_backoff_ms;

    loop {
        let result = operation().await;

        let err = match &result {
            Ok(_) => return result,
            Err(err) => err,
        };

        attempt += 1;
        if attempt >= config.max_attempts {
            return result;
        }

        let delay_ms = match decide(err) {
            RetryDecision::GiveUp => return result,
            RetryDecision::After(delay) => delay.as_millis() as u64,
            RetryDecision::Backoff if config.add_jitter => {
                let jitter_factor = rand::random::<f64>() * 0.2 + 0.9; // 0.9-1.1 range
                (backoff_ms as f64 * jitter_factor) as u64
            }
            RetryDecision::Backoff => backoff_ms,
        };
        let delay_ms = delay_ms.min(config.max_backoff_ms);

        debug!(
            "Throttled, attempt {}/{} again after {}ms",
            attempt + 1,
            config.max_attempts,
            delay_ms
        );
        sleep(Duration::from_millis(delay_ms)).await;

        backoff_ms = ((backoff_ms as f64 * config.backoff_factor) as u64).min(config.max_backoff_ms);
    }
}

/// Parses a `Retry-After` header given in delta-seconds
///
/// The HTTP-date form is not used by Graph and yields `None`.
pub fn parse_retry_after(value: &str) -> Option<Duration> {
    value.trim().parse::<u64>().ok().map(Duration::from_secs)
}
