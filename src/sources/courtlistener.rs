//! # CourtListener Data Source
//!
//! ## Purpose
//! Fetches court opinions and docket entries from the CourtListener REST
//! API. Provides authenticated, rate-limited, paginated access and converts
//! the API's loosely-typed result shapes into `RawDocument`s.
//!
//! ## Input/Output Specification
//! - **Input**: Court/judge/date filters, pagination parameters
//! - **Output**: Raw documents; opinions without text carry a
//!   `[PDF available: <url>]` placeholder
//! - **Rate Limits**: enforced client-side, with server 429s surfaced as
//!   recoverable errors
//!
//! ## Key Features
//! - Token authentication
//! - Automatic pagination via the API's `next` cursor
//! - 429 / 5xx / "still processing" surfaced for the shared retry policy

use super::{DocumentSource, FetchQuery, RetryPolicy, SourceHealth, SourceStats};
use crate::config::CourtListenerConfig;
use crate::errors::{EnrichmentError, Result};
use crate::{Metadata, RawDocument, PDF_PENDING_PREFIX};
use async_trait::async_trait;
use chrono::Utc;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::RwLock;
use tokio::time::{sleep, Duration, Instant};

/// Minimal client-side rate limiter: enforces a floor interval between
/// requests.
pub struct RateLimiter {
    requests_per_minute: u32,
    last_request_time: Option<Instant>,
}

impl RateLimiter {
    pub fn new(requests_per_minute: u32) -> Self {
        Self {
            requests_per_minute: requests_per_minute.max(1),
            last_request_time: None,
        }
    }

    pub async fn enforce(&mut self) {
        if let Some(last_time) = self.last_request_time {
            let min_interval = Duration::from_secs(60) / self.requests_per_minute;
            let elapsed = last_time.elapsed();
            if elapsed < min_interval {
                sleep(min_interval - elapsed).await;
            }
        }
        self.last_request_time = Some(Instant::now());
    }
}

/// Paginated search response envelope.
#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[allow(dead_code)]
    count: Option<usize>,
    next: Option<String>,
    results: Vec<Value>,
}

/// CourtListener source implementation.
pub struct CourtListenerSource {
    config: CourtListenerConfig,
    client: Client,
    retry: RetryPolicy,
    stats: Arc<RwLock<SourceStats>>,
    rate_limiter: Arc<RwLock<RateLimiter>>,
}

impl CourtListenerSource {
    pub fn new(config: CourtListenerConfig, retry: RetryPolicy) -> Result<Self> {
        let mut headers = reqwest::header::HeaderMap::new();
        if let Some(token) = &config.api_token {
            headers.insert(
                reqwest::header::AUTHORIZATION,
                format!("Token {}", token)
                    .parse()
                    .map_err(|e| EnrichmentError::Config {
                        message: format!("Invalid API token format: {}", e),
                    })?,
            );
        }

        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .default_headers(headers)
            .user_agent("docket-enrichment/0.1")
            .build()?;

        let rate_limit_rpm = config.rate_limit_rpm;
        Ok(Self {
            config,
            client,
            retry,
            stats: Arc::new(RwLock::new(SourceStats {
                source_name: "courtlistener".to_string(),
                ..SourceStats::default()
            })),
            rate_limiter: Arc::new(RwLock::new(RateLimiter::new(rate_limit_rpm))),
        })
    }

    fn search_url(&self, query: &FetchQuery) -> String {
        let mut url = format!("{}/search/?type=o", self.config.base_url.trim_end_matches('/'));
        if let Some(court) = &query.court_id {
            url.push_str(&format!("&court={}", court));
        }
        if let Some(judge) = &query.judge_name {
            url.push_str(&format!("&judge={}", judge));
        }
        if let Some(after) = &query.date_after {
            url.push_str(&format!("&filed_after={}", after.format("%Y-%m-%d")));
        }
        if let Some(before) = &query.date_before {
            url.push_str(&format!("&filed_before={}", before.format("%Y-%m-%d")));
        }
        url.push_str(&format!("&page_size={}", self.config.page_size));
        url
    }

    /// Fetch one page, classifying the failure modes the retry policy
    /// understands.
    async fn fetch_page(&self, url: &str) -> Result<SearchResponse> {
        self.rate_limiter.write().await.enforce().await;

        // Transport failures are transient as far as the retry policy is
        // concerned.
        let response =
            self.client
                .get(url)
                .send()
                .await
                .map_err(|e| EnrichmentError::Network {
                    details: e.to_string(),
                })?;

        if response.status() == StatusCode::TOO_MANY_REQUESTS {
            let retry_after = response
                .headers()
                .get(reqwest::header::RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(|s| s.parse().ok());
            self.stats.write().await.rate_limit_hits += 1;
            return Err(EnrichmentError::RateLimitExceeded {
                source_name: "courtlistener".to_string(),
                retry_after_seconds: retry_after,
            });
        }

        if response.status().is_server_error() {
            return Err(EnrichmentError::Network {
                details: format!("HTTP {} from {}", response.status(), url),
            });
        }

        if !response.status().is_success() {
            return Err(EnrichmentError::DataParsing {
                source_name: "courtlistener".to_string(),
                details: format!(
                    "HTTP {}: {}",
                    response.status(),
                    response.text().await.unwrap_or_default()
                ),
            });
        }

        let body: Value = response.json().await.map_err(|e| EnrichmentError::DataParsing {
            source_name: "courtlistener".to_string(),
            details: e.to_string(),
        })?;

        // RECAP purchase flow answers with a processing status before the
        // document materializes.
        if body.get("status").and_then(|v| v.as_str()) == Some("processing") {
            return Err(EnrichmentError::StillProcessing {
                document_id: url.to_string(),
            });
        }

        serde_json::from_value(body).map_err(|e| EnrichmentError::DataParsing {
            source_name: "courtlistener".to_string(),
            details: format!("unexpected search envelope: {}", e),
        })
    }

    /// Convert one API result object into a `RawDocument`. Entries without
    /// an ID are dropped with a log line.
    fn convert_result(&self, value: &Value) -> Option<RawDocument> {
        let obj = value.as_object()?;

        let source_id = match obj.get("id") {
            Some(Value::String(s)) if !s.is_empty() => s.clone(),
            Some(Value::Number(n)) => n.to_string(),
            _ => {
                tracing::warn!("Search result without id, dropping");
                return None;
            }
        };

        let cluster_id = id_or_url_tail(obj.get("cluster_id").or_else(|| obj.get("cluster")));
        let docket_id = id_or_url_tail(obj.get("docket_id").or_else(|| obj.get("docket")));

        let plain_text = obj
            .get("plain_text")
            .or_else(|| obj.get("text"))
            .and_then(|v| v.as_str())
            .filter(|s| !s.trim().is_empty());

        let content = match plain_text {
            Some(text) => Some(text.to_string()),
            None => obj
                .get("download_url")
                .or_else(|| obj.get("filepath_local"))
                .and_then(|v| v.as_str())
                .filter(|s| !s.trim().is_empty())
                .map(|url| format!("{} {}]", PDF_PENDING_PREFIX, url)),
        };

        let mut metadata = Metadata::new();
        for (k, v) in obj {
            metadata.insert(k.clone(), v.clone());
        }

        Some(RawDocument {
            source_id,
            cluster_id,
            docket_id,
            content,
            metadata,
        })
    }
}

/// Accept an ID as a number, a bare string, or the tail segment of a
/// resource URL.
fn id_or_url_tail(value: Option<&Value>) -> Option<String> {
    match value? {
        Value::Number(n) => Some(n.to_string()),
        Value::String(s) => {
            let trimmed = s.trim_end_matches('/');
            if trimmed.is_empty() {
                None
            } else {
                Some(trimmed.rsplit('/').next().unwrap_or(trimmed).to_string())
            }
        }
        _ => None,
    }
}

#[async_trait]
impl DocumentSource for CourtListenerSource {
    fn name(&self) -> &str {
        "courtlistener"
    }

    async fn health_check(&self) -> Result<SourceHealth> {
        let start = Instant::now();
        let url = format!(
            "{}/search/?type=o&page_size=1",
            self.config.base_url.trim_end_matches('/')
        );
        let response = self.client.get(&url).send().await;
        let response_time_ms = start.elapsed().as_millis() as u64;

        match response {
            Ok(resp) if resp.status().is_success() => Ok(SourceHealth {
                is_healthy: true,
                last_check: Utc::now(),
                response_time_ms,
                error_message: None,
            }),
            Ok(resp) => Ok(SourceHealth {
                is_healthy: false,
                last_check: Utc::now(),
                response_time_ms,
                error_message: Some(format!("HTTP {}", resp.status())),
            }),
            Err(e) => Ok(SourceHealth {
                is_healthy: false,
                last_check: Utc::now(),
                response_time_ms,
                error_message: Some(e.to_string()),
            }),
        }
    }

    async fn fetch(&self, query: &FetchQuery) -> Result<Vec<RawDocument>> {
        let max_results = if query.max_results == 0 {
            self.config.page_size
        } else {
            query.max_results
        };

        let mut documents = Vec::new();
        let mut next_url = Some(self.search_url(query));

        while let Some(url) = next_url {
            if documents.len() >= max_results {
                break;
            }

            let page = self
                .retry
                .run("courtlistener.fetch_page", || self.fetch_page(&url))
                .await;

            let page = match page {
                Ok(page) => page,
                Err(e) => {
                    self.stats.write().await.fetch_errors += 1;
                    return Err(e);
                }
            };

            for result in &page.results {
                if documents.len() >= max_results {
                    break;
                }
                if let Some(doc) = self.convert_result(result) {
                    documents.push(doc);
                }
            }

            next_url = page.next;
        }

        let mut stats = self.stats.write().await;
        stats.fetched += documents.len();
        stats.pending_content += documents.iter().filter(|d| !d.has_content()).count();
        stats.last_fetch = Some(Utc::now());

        tracing::info!(
            "Fetched {} documents from CourtListener ({} pending content)",
            documents.len(),
            documents.iter().filter(|d| !d.has_content()).count()
        );

        Ok(documents)
    }

    async fn get_stats(&self) -> SourceStats {
        self.stats.read().await.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn source_for(server_uri: &str) -> CourtListenerSource {
        let config = CourtListenerConfig {
            base_url: server_uri.to_string(),
            api_token: None,
            page_size: 10,
            timeout_seconds: 5,
            rate_limit_rpm: 6000,
        };
        CourtListenerSource::new(config, RetryPolicy::new(3, 1, 10)).unwrap()
    }

    #[tokio::test]
    async fn test_fetch_converts_results_and_pending_placeholders() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/search/"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "count": 2,
                "next": null,
                "results": [
                    {"id": 101, "plain_text": "Full opinion text", "cluster": "https://host/clusters/55/"},
                    {"id": 102, "plain_text": "", "download_url": "https://host/pdf/102.pdf"}
                ]
            })))
            .mount(&server)
            .await;

        let source = source_for(&server.uri());
        let docs = source
            .fetch(&FetchQuery {
                max_results: 10,
                ..FetchQuery::default()
            })
            .await
            .unwrap();

        assert_eq!(docs.len(), 2);
        assert_eq!(docs[0].source_id, "101");
        assert_eq!(docs[0].cluster_id.as_deref(), Some("55"));
        assert!(docs[0].has_content());

        assert!(!docs[1].has_content());
        assert_eq!(
            docs[1].pending_pdf_url(),
            Some("https://host/pdf/102.pdf")
        );

        let stats = source.get_stats().await;
        assert_eq!(stats.fetched, 2);
        assert_eq!(stats.pending_content, 1);
    }

    #[tokio::test]
    async fn test_fetch_retries_through_rate_limit() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/search/"))
            .respond_with(ResponseTemplate::new(429))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/search/"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "count": 1,
                "next": null,
                "results": [{"id": 7, "plain_text": "text"}]
            })))
            .mount(&server)
            .await;

        let source = source_for(&server.uri());
        let docs = source
            .fetch(&FetchQuery {
                max_results: 5,
                ..FetchQuery::default()
            })
            .await
            .unwrap();

        assert_eq!(docs.len(), 1);
        assert_eq!(source.get_stats().await.rate_limit_hits, 1);
    }

    #[tokio::test]
    async fn test_fetch_respects_max_results_filter_params() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/search/"))
            .and(query_param("court", "scotus"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "count": 3,
                "next": null,
                "results": [
                    {"id": 1, "plain_text": "a"},
                    {"id": 2, "plain_text": "b"},
                    {"id": 3, "plain_text": "c"}
                ]
            })))
            .mount(&server)
            .await;

        let source = source_for(&server.uri());
        let docs = source
            .fetch(&FetchQuery {
                court_id: Some("scotus".to_string()),
                max_results: 2,
                ..FetchQuery::default()
            })
            .await
            .unwrap();

        assert_eq!(docs.len(), 2);
    }
}
