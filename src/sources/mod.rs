//! # Document Source Module
//!
//! ## Purpose
//! Interfaces to the external legal-data APIs the pipeline ingests from,
//! with a shared retry policy for the transient failure modes those APIs
//! exhibit (rate limits, 5xx, "still processing").
//!
//! ## Key Features
//! - Unified `DocumentSource` trait over concrete providers
//! - Capped exponential backoff with jitter for retryable errors
//! - Per-source statistics and health checks
//!
//! ## Architecture
//! - `courtlistener`: CourtListener REST API source

pub mod courtlistener;

pub use courtlistener::{CourtListenerSource, RateLimiter};

use crate::errors::{EnrichmentError, Result};
use crate::RawDocument;
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::future::Future;
use tokio::time::{sleep, Duration};

/// Filters for one fetch call against a source.
#[derive(Debug, Clone, Default)]
pub struct FetchQuery {
    pub court_id: Option<String>,
    pub judge_name: Option<String>,
    pub date_after: Option<NaiveDate>,
    pub date_before: Option<NaiveDate>,
    pub max_results: usize,
}

/// Statistics for individual data sources
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SourceStats {
    pub source_name: String,
    pub fetched: usize,
    pub pending_content: usize,
    pub fetch_errors: usize,
    pub rate_limit_hits: usize,
    pub last_fetch: Option<DateTime<Utc>>,
}

/// Source availability snapshot
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceHealth {
    pub is_healthy: bool,
    pub last_check: DateTime<Utc>,
    pub response_time_ms: u64,
    pub error_message: Option<String>,
}

/// Unified interface over document providers.
#[async_trait]
pub trait DocumentSource: Send + Sync {
    fn name(&self) -> &str;

    async fn health_check(&self) -> Result<SourceHealth>;

    /// Fetch up to `query.max_results` documents matching the filters.
    /// Documents may arrive without content; that is a pending state, not
    /// an error.
    async fn fetch(&self, query: &FetchQuery) -> Result<Vec<RawDocument>>;

    async fn get_stats(&self) -> SourceStats;
}

/// Capped exponential backoff with jitter for retryable source errors.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_delay_ms: u64, max_delay_ms: u64) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay: Duration::from_millis(base_delay_ms),
            max_delay: Duration::from_millis(max_delay_ms),
        }
    }

    /// Run `operation` until it succeeds, fails non-recoverably, or exhausts
    /// the attempt budget. Only recoverable errors (429/5xx/"processing")
    /// are retried.
    pub async fn run<T, F, Fut>(&self, operation: &str, mut f: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut last_error: Option<EnrichmentError> = None;

        for attempt in 0..self.max_attempts {
            if attempt > 0 {
                let delay = self.delay_for_attempt(attempt, last_error.as_ref());
                tracing::debug!(
                    "Retry {}/{} for {} after {:?}",
                    attempt,
                    self.max_attempts - 1,
                    operation,
                    delay
                );
                sleep(delay).await;
            }

            match f().await {
                Ok(value) => return Ok(value),
                Err(e) if e.is_recoverable() => {
                    tracing::warn!("{} attempt {} failed: {}", operation, attempt + 1, e);
                    last_error = Some(e);
                }
                Err(e) => return Err(e),
            }
        }

        Err(EnrichmentError::RetriesExhausted {
            operation: operation.to_string(),
            attempts: self.max_attempts,
            details: last_error
                .map(|e| e.to_string())
                .unwrap_or_else(|| "unknown".to_string()),
        })
    }

    /// Exponential delay capped at `max_delay`, plus up to 50% jitter. A
    /// server-provided retry-after wins over the computed backoff.
    fn delay_for_attempt(&self, attempt: u32, last_error: Option<&EnrichmentError>) -> Duration {
        if let Some(EnrichmentError::RateLimitExceeded {
            retry_after_seconds: Some(seconds),
            ..
        }) = last_error
        {
            return Duration::from_secs(*seconds).min(self.max_delay);
        }

        let exponential = self
            .base_delay
            .saturating_mul(2u32.saturating_pow(attempt.saturating_sub(1)))
            .min(self.max_delay);
        let jitter_ms = rand::thread_rng().gen_range(0..=exponential.as_millis() as u64 / 2);
        (exponential + Duration::from_millis(jitter_ms)).min(self.max_delay)
    }
}

impl From<&crate::config::RetryConfig> for RetryPolicy {
    fn from(config: &crate::config::RetryConfig) -> Self {
        Self::new(config.max_attempts, config.base_delay_ms, config.max_delay_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test]
    async fn test_retry_recovers_from_transient_failure() {
        let policy = RetryPolicy::new(3, 1, 10);
        let calls = AtomicU32::new(0);

        let result: Result<u32> = policy
            .run("test_fetch", || {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                async move {
                    if n < 2 {
                        Err(EnrichmentError::Network {
                            details: "transient".into(),
                        })
                    } else {
                        Ok(7)
                    }
                }
            })
            .await;

        assert_eq!(result.unwrap(), 7);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_retry_gives_up_after_max_attempts() {
        let policy = RetryPolicy::new(2, 1, 10);
        let result: Result<u32> = policy
            .run("test_fetch", || async {
                Err(EnrichmentError::Network {
                    details: "still down".into(),
                })
            })
            .await;

        match result {
            Err(EnrichmentError::RetriesExhausted { attempts, .. }) => assert_eq!(attempts, 2),
            other => panic!("expected RetriesExhausted, got {:?}", other.map(|_| ())),
        }
    }

    #[tokio::test]
    async fn test_non_recoverable_error_not_retried() {
        let policy = RetryPolicy::new(5, 1, 10);
        let calls = AtomicU32::new(0);

        let result: Result<u32> = policy
            .run("test_fetch", || {
                calls.fetch_add(1, Ordering::SeqCst);
                async {
                    Err(EnrichmentError::DataParsing {
                        source_name: "test".into(),
                        details: "bad json".into(),
                    })
                }
            })
            .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
