//! Retry policy for LibreLinkUp data reads.
//!
//! LibreLinkUp throttles follower accounts with HTTP 429, and its gateways
//! shed load with 503. Both usually carry a `Retry-After` header. When the
//! server names a delay the client waits exactly that long (capped);
//! otherwise it falls back to exponential back-off with jitter.
//!
//! Only the idempotent GET endpoints go through [`RetryPolicy::run`]. Login
//! is never retried here; its only second attempt is the region redirect.

use std::future::Future;
use std::time::Duration;

use chrono::{DateTime, Utc};
use rand::Rng;

use crate::error::LibreLinkError;

/// Upper bound for any single wait, hinted or computed.
const MAX_DELAY: Duration = Duration::from_secs(60);

#[derive(Debug, Clone, Copy)]
pub(crate) struct RetryPolicy {
    pub(crate) max_retries: u32,
    pub(crate) backoff_base_ms: u64,
}

impl RetryPolicy {
    pub(crate) fn new(max_retries: u32, backoff_base_ms: u64) -> Self {
        Self {
            max_retries,
            backoff_base_ms,
        }
    }

    /// How long to wait before retry number `attempt` (1-based) after `err`,
    /// or `None` when the error is final.
    pub(crate) fn delay_for(&self, attempt: u32, err: &LibreLinkError) -> Option<Duration> {
        if attempt == 0 || attempt > self.max_retries {
            return None;
        }
        match err {
            LibreLinkError::ServerBusy {
                retry_after: Some(hint),
                ..
            } => Some((*hint).min(MAX_DELAY)),
            LibreLinkError::ServerBusy { .. } => Some(self.backoff(attempt)),
            LibreLinkError::Http(e) if e.is_timeout() || e.is_connect() => {
                Some(self.backoff(attempt))
            }
            _ => None,
        }
    }

    /// `backoff_base_ms × 2^(attempt-1)`, capped, then scaled by a random
    /// factor in `[0.75, 1.25]`.
    fn backoff(&self, attempt: u32) -> Duration {
        let exponent = (attempt - 1).min(10);
        let base = Duration::from_millis(self.backoff_base_ms.saturating_mul(1u64 << exponent));
        base.min(MAX_DELAY)
            .mul_f64(rand::rng().random_range(0.75..=1.25))
    }

    /// Runs `operation`, retrying while [`RetryPolicy::delay_for`] allows.
    pub(crate) async fn run<T, F, Fut>(&self, mut operation: F) -> Result<T, LibreLinkError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, LibreLinkError>>,
    {
        let mut attempt = 0u32;
        loop {
            let err = match operation().await {
                Ok(value) => return Ok(value),
                Err(err) => err,
            };
            attempt += 1;
            let Some(delay) = self.delay_for(attempt, &err) else {
                return Err(err);
            };
            tracing::warn!(
                attempt,
                max_retries = self.max_retries,
                delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                error = %err,
                "LibreLinkUp read failed, waiting before retry"
            );
            tokio::time::sleep(delay).await;
        }
    }
}

/// Parses a `Retry-After` value: either delta-seconds or an HTTP date.
/// Dates in the past mean "retry now".
pub(crate) fn parse_retry_after(value: &str, now: DateTime<Utc>) -> Option<Duration> {
    let value = value.trim();
    if let Ok(secs) = value.parse::<u64>() {
        return Some(Duration::from_secs(secs));
    }
    let at = DateTime::parse_from_rfc2822(value).ok()?;
    Some(
        (at.with_timezone(&Utc) - now)
            .to_std()
            .unwrap_or(Duration::ZERO),
    )
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;

    use super::*;

    fn busy(retry_after: Option<Duration>) -> LibreLinkError {
        LibreLinkError::ServerBusy {
            path: "llu/connections".to_owned(),
            status: 429,
            retry_after,
        }
    }

    #[test]
    fn server_hint_wins_over_backoff() {
        let policy = RetryPolicy::new(3, 10_000);
        assert_eq!(
            policy.delay_for(1, &busy(Some(Duration::from_secs(2)))),
            Some(Duration::from_secs(2))
        );
    }

    #[test]
    fn server_hint_is_capped() {
        let policy = RetryPolicy::new(3, 0);
        assert_eq!(
            policy.delay_for(1, &busy(Some(Duration::from_secs(3_600)))),
            Some(MAX_DELAY)
        );
    }

    #[test]
    fn backoff_without_hint_doubles_within_jitter() {
        let policy = RetryPolicy::new(5, 1_000);
        let first = policy.delay_for(1, &busy(None)).unwrap();
        let third = policy.delay_for(3, &busy(None)).unwrap();
        assert!((750..=1_250).contains(&first.as_millis()), "{first:?}");
        assert!((3_000..=5_000).contains(&third.as_millis()), "{third:?}");
    }

    #[test]
    fn gives_up_after_max_retries() {
        let policy = RetryPolicy::new(2, 0);
        assert!(policy.delay_for(2, &busy(None)).is_some());
        assert!(policy.delay_for(3, &busy(None)).is_none());
    }

    #[test]
    fn final_errors_are_not_retried() {
        let policy = RetryPolicy::new(3, 0);
        assert!(policy.delay_for(1, &LibreLinkError::InvalidCredentials).is_none());
        assert!(policy
            .delay_for(
                1,
                &LibreLinkError::EndpointUnavailable {
                    path: "llu/connections/x/logbook".to_owned(),
                    status: 404,
                }
            )
            .is_none());
    }

    #[test]
    fn parses_retry_after_forms() {
        let now = DateTime::parse_from_rfc3339("2024-01-15T00:00:00Z")
            .unwrap()
            .with_timezone(&Utc);
        assert_eq!(parse_retry_after(" 7 ", now), Some(Duration::from_secs(7)));
        assert_eq!(
            parse_retry_after("Mon, 15 Jan 2024 00:00:30 GMT", now),
            Some(Duration::from_secs(30))
        );
        assert_eq!(
            parse_retry_after("Sun, 14 Jan 2024 23:00:00 GMT", now),
            Some(Duration::ZERO)
        );
        assert_eq!(parse_retry_after("soon", now), None);
    }

    #[tokio::test]
    async fn run_stops_on_final_error() {
        let calls = Cell::new(0);
        let result: Result<(), _> = RetryPolicy::new(3, 0)
            .run(|| {
                calls.set(calls.get() + 1);
                async { Err(LibreLinkError::NoPatients) }
            })
            .await;
        assert!(matches!(result, Err(LibreLinkError::NoPatients)));
        assert_eq!(calls.get(), 1);
    }

    #[tokio::test]
    async fn run_retries_busy_reads_until_success() {
        let calls = Cell::new(0);
        let result = RetryPolicy::new(2, 0)
            .run(|| {
                calls.set(calls.get() + 1);
                let n = calls.get();
                async move {
                    if n < 3 {
                        Err(busy(Some(Duration::ZERO)))
                    } else {
                        Ok(n)
                    }
                }
            })
            .await;
        assert_eq!(result.unwrap(), 3);
    }
}
