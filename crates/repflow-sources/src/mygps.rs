// SPDX-FileCopyrightText: 2026 Repflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Internal knowledge source adapter (myGPS).
//!
//! Requires credentialed access. Absent credentials surface as an
//! `unauthorized` per-source error, which the fan-out absorbs; the
//! workflow proceeds on the remaining sources.

use std::time::Duration;

use async_trait::async_trait;
use repflow_core::types::{AdapterType, HealthStatus, SourceErrorKind, SourceResult};
use repflow_core::{ComponentAdapter, RepflowError, SourceAdapter};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// Request payload for the internal search endpoint.
#[derive(Debug, Serialize)]
struct SearchPayload<'a> {
    query: &'a str,
    limit: usize,
    include_content: bool,
}

/// One result item in the internal search response.
#[derive(Debug, Deserialize)]
struct SearchItem {
    #[serde(default)]
    title: String,
    #[serde(default)]
    url: String,
    #[serde(default, alias = "snippet")]
    content: String,
    #[serde(default)]
    score: Option<f64>,
}

/// Internal search response envelope.
#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    results: Vec<SearchItem>,
}

/// Searches internal myGPS content over its credentialed JSON API.
pub struct MyGpsSearcher {
    client: reqwest::Client,
    api_url: Option<String>,
    api_key: Option<String>,
}

impl MyGpsSearcher {
    /// Creates a searcher. Either credential may be absent; searches then
    /// report `unauthorized` instead of failing construction, so a
    /// partially-configured deployment still starts.
    pub fn new(api_url: Option<String>, api_key: Option<String>) -> Result<Self, RepflowError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| RepflowError::Internal(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            client,
            api_url: api_url.map(|u| u.trim_end_matches('/').to_string()),
            api_key,
        })
    }
}

#[async_trait]
impl ComponentAdapter for MyGpsSearcher {
    fn name(&self) -> &str {
        "mygps"
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::Source
    }

    async fn health_check(&self) -> Result<HealthStatus, RepflowError> {
        if self.api_url.is_none() || self.api_key.is_none() {
            return Ok(HealthStatus::Degraded("credentials not configured".into()));
        }
        Ok(HealthStatus::Healthy)
    }

    async fn shutdown(&self) -> Result<(), RepflowError> {
        Ok(())
    }
}

#[async_trait]
impl SourceAdapter for MyGpsSearcher {
    fn source_tag(&self) -> &str {
        "mygps"
    }

    async fn search(
        &self,
        query: &str,
        k: usize,
        _deadline: Duration,
    ) -> Result<Vec<SourceResult>, SourceErrorKind> {
        let (Some(api_url), Some(api_key)) = (&self.api_url, &self.api_key) else {
            debug!("myGPS credentials not configured, skipping internal search");
            return Err(SourceErrorKind::Unauthorized);
        };

        let response = self
            .client
            .post(format!("{api_url}/search"))
            .bearer_auth(api_key)
            .json(&SearchPayload {
                query,
                limit: k,
                include_content: true,
            })
            .send()
            .await
            .map_err(|e| {
                warn!(error = %e, "myGPS search request failed");
                SourceErrorKind::Http
            })?;

        let status = response.status();
        if status == reqwest::StatusCode::UNAUTHORIZED
            || status == reqwest::StatusCode::FORBIDDEN
        {
            warn!(status = %status, "myGPS rejected credentials");
            return Err(SourceErrorKind::Unauthorized);
        }
        if !status.is_success() {
            warn!(status = %status, "myGPS search returned non-success");
            return Err(SourceErrorKind::Http);
        }

        let payload: SearchResponse = response.json().await.map_err(|e| {
            warn!(error = %e, "myGPS response parse failed");
            SourceErrorKind::Parse
        })?;

        let results = payload
            .results
            .into_iter()
            .take(k)
            .enumerate()
            .filter(|(_, item)| !item.url.is_empty())
            .map(|(idx, item)| SourceResult {
                source: "mygps".to_string(),
                title: item.title,
                url: item.url,
                snippet: item.content,
                relevance: item.score.unwrap_or(0.9 - idx as f64 * 0.05),
            })
            .collect::<Vec<_>>();

        debug!(count = results.len(), "myGPS search returned results");
        Ok(results)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn missing_credentials_yield_unauthorized() {
        let searcher = MyGpsSearcher::new(None, None).unwrap();
        let err = searcher
            .search("q", 5, Duration::from_secs(10))
            .await
            .unwrap_err();
        assert_eq!(err, SourceErrorKind::Unauthorized);

        // Partial credentials behave the same.
        let searcher =
            MyGpsSearcher::new(Some("https://mygps.internal".into()), None).unwrap();
        let err = searcher
            .search("q", 5, Duration::from_secs(10))
            .await
            .unwrap_err();
        assert_eq!(err, SourceErrorKind::Unauthorized);
    }

    #[tokio::test]
    async fn search_sends_bearer_and_parses_results() {
        let server = MockServer::start().await;
        let payload = serde_json::json!({
            "results": [
                {"title": "Plan FAQ", "url": "https://mygps.internal/faq", "content": "faq text", "score": 0.95},
                {"title": "No score", "url": "https://mygps.internal/other", "content": "other"}
            ]
        });
        Mock::given(method("POST"))
            .and(path("/search"))
            .and(header("authorization", "Bearer key-123"))
            .and(body_partial_json(serde_json::json!({"query": "401k", "limit": 5})))
            .respond_with(ResponseTemplate::new(200).set_body_json(&payload))
            .mount(&server)
            .await;

        let searcher =
            MyGpsSearcher::new(Some(server.uri()), Some("key-123".into())).unwrap();
        let results = searcher
            .search("401k", 5, Duration::from_secs(10))
            .await
            .unwrap();

        assert_eq!(results.len(), 2);
        assert_eq!(results[0].title, "Plan FAQ");
        assert!((results[0].relevance - 0.95).abs() < 1e-9);
        // Second item gets the positional default score.
        assert!((results[1].relevance - 0.85).abs() < 1e-9);
    }

    #[tokio::test]
    async fn rejected_credentials_yield_unauthorized() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/search"))
            .respond_with(ResponseTemplate::new(401))
            .mount(&server)
            .await;

        let searcher =
            MyGpsSearcher::new(Some(server.uri()), Some("bad-key".into())).unwrap();
        let err = searcher
            .search("q", 5, Duration::from_secs(10))
            .await
            .unwrap_err();
        assert_eq!(err, SourceErrorKind::Unauthorized);
    }

    #[tokio::test]
    async fn malformed_body_yields_parse_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/search"))
            .respond_with(ResponseTemplate::new(200).set_body_string("not json"))
            .mount(&server)
            .await;

        let searcher = MyGpsSearcher::new(Some(server.uri()), Some("k".into())).unwrap();
        let err = searcher
            .search("q", 5, Duration::from_secs(10))
            .await
            .unwrap_err();
        assert_eq!(err, SourceErrorKind::Parse);
    }

    #[tokio::test]
    async fn health_check_degraded_without_credentials() {
        let searcher = MyGpsSearcher::new(None, None).unwrap();
        match searcher.health_check().await.unwrap() {
            HealthStatus::Degraded(reason) => assert!(reason.contains("credentials")),
            other => panic!("expected Degraded, got {other:?}"),
        }
    }
}
