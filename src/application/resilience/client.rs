use std::future::Future;

use thiserror::Error;
use tokio::time::{sleep, timeout};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

use super::cache::TtlCache;
use super::retry::RetryPolicy;
use crate::domain::{DomainError, UpstreamError};

/// Terminal failure of a resilient fetch.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum FetchError {
    /// Every attempt failed with a transient error.
    #[error("upstream unavailable after {attempts} attempts: {last}")]
    Exhausted { attempts: u32, last: UpstreamError },

    /// A non-transient failure stopped the retry loop immediately.
    #[error("upstream rejected request: {0}")]
    Rejected(UpstreamError),

    #[error("fetch cancelled by caller")]
    Cancelled,
}

impl From<FetchError> for DomainError {
    fn from(err: FetchError) -> Self {
        match err {
            FetchError::Exhausted { .. } => DomainError::upstream_unavailable(err.to_string()),
            FetchError::Rejected(cause) => DomainError::upstream_rejected(cause.to_string()),
            FetchError::Cancelled => DomainError::Cancelled,
        }
    }
}

/// Outbound caller for one upstream: cache first, then bounded retries.
///
/// The cache is owned by the client instance; share the client (behind an
/// `Arc`) to share the cache.
pub struct ResilientClient<V> {
    name: String,
    policy: RetryPolicy,
    cache: TtlCache<V>,
}

impl<V: Clone> ResilientClient<V> {
    pub fn new(name: impl Into<String>, policy: RetryPolicy, cache: TtlCache<V>) -> Self {
        Self {
            name: name.into(),
            policy,
            cache,
        }
    }

    /// Return the cached value for `key` or produce, cache and return a new one.
    pub async fn fetch<F, Fut>(&self, key: &str, producer: F) -> Result<V, FetchError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<V, UpstreamError>>,
    {
        self.fetch_with_cancel(key, producer, &CancellationToken::new())
            .await
    }

    /// Like [`fetch`](Self::fetch), but stops at the next attempt boundary
    /// once `cancel` fires. A cancelled fetch never writes the cache.
    pub async fn fetch_with_cancel<F, Fut>(
        &self,
        key: &str,
        mut producer: F,
        cancel: &CancellationToken,
    ) -> Result<V, FetchError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<V, UpstreamError>>,
    {
        if let Some(value) = self.cache.get(key) {
            debug!(upstream = %self.name, key, "cache hit");
            return Ok(value);
        }
        debug!(upstream = %self.name, key, "cache miss");

        let max_attempts = self.policy.max_attempts().max(1);
        let per_attempt = self.policy.timeout_per_attempt();
        let mut last = UpstreamError::Aborted("no attempt made".into());

        for attempt in 0..max_attempts {
            if attempt > 0 {
                let delay = self.policy.delay_for_attempt(attempt - 1);
                tokio::select! {
                    _ = cancel.cancelled() => return Err(FetchError::Cancelled),
                    _ = sleep(delay) => {}
                }
            }
            if cancel.is_cancelled() {
                debug!(upstream = %self.name, key, attempt, "caller gone, abandoning fetch");
                return Err(FetchError::Cancelled);
            }

            let outcome = match timeout(per_attempt, producer()).await {
                Ok(outcome) => outcome,
                Err(_) => Err(UpstreamError::Timeout(per_attempt)),
            };

            match outcome {
                Ok(value) => {
                    if attempt > 0 {
                        debug!(upstream = %self.name, attempts = attempt + 1, "succeeded after retry");
                    }
                    self.cache.insert(key, value.clone());
                    return Ok(value);
                }
                Err(err) if !err.is_transient() => {
                    warn!(upstream = %self.name, key, error = %err, "non-retryable upstream failure");
                    return Err(FetchError::Rejected(err));
                }
                Err(err) => {
                    warn!(
                        upstream = %self.name,
                        attempt = attempt + 1,
                        max_attempts,
                        error = %err,
                        "transient upstream failure"
                    );
                    last = err;
                }
            }
        }

        error!(upstream = %self.name, key, attempts = max_attempts, last = %last, "retries exhausted");
        Err(FetchError::Exhausted {
            attempts: max_attempts,
            last,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    use parking_lot::Mutex;
    use tokio::time::Instant;

    use super::*;

    fn client(max_attempts: u32) -> ResilientClient<String> {
        ResilientClient::new(
            "test",
            RetryPolicy::new(max_attempts, Duration::from_millis(100), Duration::from_secs(1)),
            TtlCache::new(Duration::from_secs(60)),
        )
    }

    #[tokio::test(start_paused = true)]
    async fn second_fetch_within_ttl_hits_cache() {
        let client = client(3);
        let calls = AtomicU32::new(0);
        let produce = || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Ok::<_, UpstreamError>("fresh".to_string()) }
        };

        let first = client.fetch("news?q=farming", produce).await.unwrap();
        let second = client.fetch("news?q=farming", produce).await.unwrap();

        assert_eq!(first, second);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn expired_entry_is_refetched_and_replaced() {
        let client = client(3);
        let calls = AtomicU32::new(0);
        let produce = || {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move { Ok::<_, UpstreamError>(format!("v{n}")) }
        };

        assert_eq!(client.fetch("k", produce).await.unwrap(), "v0");
        tokio::time::advance(Duration::from_secs(61)).await;
        assert_eq!(client.fetch("k", produce).await.unwrap(), "v1");
        assert_eq!(client.fetch("k", produce).await.unwrap(), "v1");
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(client.cache.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn timeouts_use_every_attempt_with_growing_backoff() {
        let client = client(3);
        let starts = Arc::new(Mutex::new(Vec::new()));
        let produce = || {
            starts.lock().push(Instant::now());
            std::future::pending::<Result<String, UpstreamError>>()
        };

        let err = client.fetch("slow", produce).await.unwrap_err();

        assert!(matches!(
            err,
            FetchError::Exhausted {
                attempts: 3,
                last: UpstreamError::Timeout(_)
            }
        ));
        let starts = starts.lock();
        assert_eq!(starts.len(), 3);
        let first_gap = starts[1] - starts[0];
        let second_gap = starts[2] - starts[1];
        assert!(first_gap >= Duration::from_millis(1100));
        assert!(second_gap >= Duration::from_millis(1200));
        assert!(second_gap > first_gap);
        assert!(client.cache.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn client_error_aborts_after_one_attempt() {
        let client = client(5);
        let calls = AtomicU32::new(0);
        let produce = || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err::<String, _>(UpstreamError::from_status(401, "bad api key")) }
        };

        let err = client.fetch("k", produce).await.unwrap_err();

        assert!(matches!(err, FetchError::Rejected(UpstreamError::Client { status: 401, .. })));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(matches!(DomainError::from(err), DomainError::UpstreamRejected(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn transient_failure_then_success_is_cached() {
        let client = client(3);
        let calls = AtomicU32::new(0);
        let produce = || {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if n == 0 {
                    Err(UpstreamError::from_status(502, "bad gateway"))
                } else {
                    Ok("ok".to_string())
                }
            }
        };

        assert_eq!(client.fetch("k", produce).await.unwrap(), "ok");
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(client.cache.get("k").as_deref(), Some("ok"));
    }

    #[tokio::test(start_paused = true)]
    async fn exhausted_fetch_maps_to_unavailable() {
        let client = client(2);
        let produce =
            || async { Err::<String, _>(UpstreamError::Connection("connection reset".into())) };

        let err = client.fetch("k", produce).await.unwrap_err();
        assert!(matches!(
            DomainError::from(err),
            DomainError::UpstreamUnavailable(_)
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_stops_at_attempt_boundary() {
        let client = client(5);
        let cancel = CancellationToken::new();
        let calls = AtomicU32::new(0);
        let produce = || {
            calls.fetch_add(1, Ordering::SeqCst);
            cancel.cancel();
            async { Err::<String, _>(UpstreamError::Connection("refused".into())) }
        };

        let err = client
            .fetch_with_cancel("k", produce, &cancel)
            .await
            .unwrap_err();

        assert_eq!(err, FetchError::Cancelled);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(client.cache.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn zero_attempt_policy_still_calls_upstream_once() {
        let client = client(0);
        let calls = AtomicU32::new(0);
        let produce = || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err::<String, _>(UpstreamError::from_status(503, "busy")) }
        };

        let err = client.fetch("k", produce).await.unwrap_err();

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(matches!(
            err,
            FetchError::Exhausted {
                attempts: 1,
                last: UpstreamError::Server { status: 503, .. }
            }
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn concurrent_cold_fetches_all_succeed() {
        let client = Arc::new(client(3));
        let calls = Arc::new(AtomicU32::new(0));

        let tasks = (0..8).map(|_| {
            let client = Arc::clone(&client);
            let calls = Arc::clone(&calls);
            tokio::spawn(async move {
                client
                    .fetch("cold", || {
                        calls.fetch_add(1, Ordering::SeqCst);
                        async {
                            sleep(Duration::from_millis(50)).await;
                            Ok::<_, UpstreamError>("value".to_string())
                        }
                    })
                    .await
            })
        });

        for result in futures::future::join_all(tasks).await {
            assert_eq!(result.unwrap().unwrap(), "value");
        }
        let cold_calls = calls.load(Ordering::SeqCst);
        assert!((1..=8).contains(&cold_calls));

        let again = client
            .fetch("cold", || async { Ok::<_, UpstreamError>("other".to_string()) })
            .await
            .unwrap();
        assert_eq!(again, "value");
        assert_eq!(calls.load(Ordering::SeqCst), cold_calls);
    }
}
