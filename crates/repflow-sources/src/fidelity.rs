// SPDX-FileCopyrightText: 2026 Repflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Public web source adapter for fidelity.com help content.
//!
//! Two strategies, tried in order:
//! 1. Site-scoped web search against a search engine endpoint (HTML result
//!    page, anchors extracted).
//! 2. The site's native search endpoint (JSON, with an HTML fallback parse).
//!
//! Which strategy produced a result is invisible to the fan-out.

use std::sync::LazyLock;
use std::time::Duration;

use async_trait::async_trait;
use regex::Regex;
use repflow_core::types::{AdapterType, HealthStatus, SourceErrorKind, SourceResult};
use repflow_core::{ComponentAdapter, RepflowError, SourceAdapter};
use serde::Deserialize;
use tracing::{debug, warn};

/// Default endpoint for site-scoped web search.
const DEFAULT_SITE_SEARCH_URL: &str = "https://www.google.com/search";

/// Browser-like user agent; both endpoints reject obvious bots.
const USER_AGENT: &str =
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36";

static ANCHOR_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"<a[^>]+href="(https?://[^"]+)"[^>]*>(.*?)</a>"#).expect("valid regex")
});

static TAG_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"<[^>]+>").expect("valid regex"));

/// One result item in the native search JSON payload.
#[derive(Debug, Deserialize)]
struct NativeSearchItem {
    #[serde(default)]
    title: String,
    #[serde(default, alias = "link")]
    url: String,
    #[serde(default, alias = "snippet")]
    content: String,
    #[serde(default)]
    score: Option<f64>,
}

/// Native search JSON payload.
#[derive(Debug, Deserialize)]
struct NativeSearchPayload {
    #[serde(default, alias = "items")]
    results: Vec<NativeSearchItem>,
}

/// Searches fidelity.com via site-scoped web search with a native-search
/// fallback.
pub struct FidelitySearcher {
    client: reqwest::Client,
    base_url: String,
    site_search_url: String,
    site_host: String,
}

impl FidelitySearcher {
    /// Creates a searcher for the given site base URL.
    pub fn new(base_url: &str) -> Result<Self, RepflowError> {
        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| RepflowError::Internal(format!("failed to build HTTP client: {e}")))?;

        let site_host = base_url
            .trim_start_matches("https://")
            .trim_start_matches("http://")
            .trim_start_matches("www.")
            .trim_end_matches('/')
            .to_string();

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            site_search_url: DEFAULT_SITE_SEARCH_URL.to_string(),
            site_host,
        })
    }

    /// Overrides the site-scoped search endpoint (for testing).
    pub fn with_site_search_url(mut self, url: String) -> Self {
        self.site_search_url = url;
        self
    }

    /// Primary strategy: site-scoped query against a web search engine.
    async fn site_search(&self, query: &str, k: usize) -> Result<Vec<SourceResult>, SourceErrorKind> {
        let site_query = format!("site:{} {}", self.site_host, query);
        let response = self
            .client
            .get(&self.site_search_url)
            .query(&[("q", site_query.as_str()), ("num", &k.to_string())])
            .send()
            .await
            .map_err(|e| {
                warn!(error = %e, "site search request failed");
                SourceErrorKind::Http
            })?;

        if !response.status().is_success() {
            warn!(status = %response.status(), "site search returned non-success");
            return Err(SourceErrorKind::Http);
        }

        let html = response.text().await.map_err(|_| SourceErrorKind::Http)?;
        let results = self.parse_result_page(&html, k);
        debug!(count = results.len(), "site search parsed results");
        Ok(results)
    }

    /// Fallback strategy: the site's own search endpoint.
    async fn native_search(
        &self,
        query: &str,
        k: usize,
    ) -> Result<Vec<SourceResult>, SourceErrorKind> {
        let url = format!("{}/search", self.base_url);
        let response = self
            .client
            .get(&url)
            .query(&[("query", query), ("limit", &k.to_string())])
            .send()
            .await
            .map_err(|e| {
                warn!(error = %e, "native search request failed");
                SourceErrorKind::Http
            })?;

        if !response.status().is_success() {
            return Err(SourceErrorKind::Http);
        }

        let body = response.text().await.map_err(|_| SourceErrorKind::Http)?;

        // JSON first, HTML result page as a last resort.
        if let Ok(payload) = serde_json::from_str::<NativeSearchPayload>(&body) {
            let results = payload
                .results
                .into_iter()
                .take(k)
                .enumerate()
                .filter(|(_, item)| item.url.starts_with("http"))
                .map(|(idx, item)| SourceResult {
                    source: "fidelity".to_string(),
                    title: item.title,
                    url: item.url,
                    snippet: item.content,
                    relevance: item.score.unwrap_or(0.8 - idx as f64 * 0.05),
                })
                .collect();
            return Ok(results);
        }

        let results = self.parse_result_page(&body, k);
        if results.is_empty() {
            return Err(SourceErrorKind::Parse);
        }
        Ok(results)
    }

    /// Extracts result links from an HTML search result page.
    ///
    /// Only absolute links into the site host are kept; relevance descends
    /// with page position.
    fn parse_result_page(&self, html: &str, k: usize) -> Vec<SourceResult> {
        let mut results = Vec::new();
        for captures in ANCHOR_RE.captures_iter(html) {
            if results.len() >= k {
                break;
            }
            let url = captures[1].to_string();
            if !url.contains(&self.site_host) {
                continue;
            }
            let title = TAG_RE.replace_all(&captures[2], "").trim().to_string();
            if title.is_empty() {
                continue;
            }
            let relevance = 0.9 - results.len() as f64 * 0.05;
            results.push(SourceResult {
                source: "fidelity".to_string(),
                title,
                url,
                snippet: String::new(),
                relevance,
            });
        }
        results
    }
}

#[async_trait]
impl ComponentAdapter for FidelitySearcher {
    fn name(&self) -> &str {
        "fidelity"
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::Source
    }

    async fn health_check(&self) -> Result<HealthStatus, RepflowError> {
        Ok(HealthStatus::Healthy)
    }

    async fn shutdown(&self) -> Result<(), RepflowError> {
        Ok(())
    }
}

#[async_trait]
impl SourceAdapter for FidelitySearcher {
    fn source_tag(&self) -> &str {
        "fidelity"
    }

    async fn search(
        &self,
        query: &str,
        k: usize,
        _deadline: Duration,
    ) -> Result<Vec<SourceResult>, SourceErrorKind> {
        // Primary: site-scoped web search. Fall back to native search when
        // it errors or comes back empty.
        match self.site_search(query, k).await {
            Ok(results) if !results.is_empty() => return Ok(results),
            Ok(_) => debug!("site search empty, falling back to native search"),
            Err(kind) => debug!(kind = %kind, "site search failed, falling back to native search"),
        }
        self.native_search(query, k).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn result_page_html() -> String {
        r#"
        <html><body>
          <div class="g">
            <a href="https://www.fidelity.com/help/reset-password"><h3>Reset your password</h3></a>
          </div>
          <div class="g">
            <a href="https://www.fidelity.com/help/401k"><h3>401k basics</h3></a>
          </div>
          <div class="g">
            <a href="https://elsewhere.example/unrelated"><h3>Unrelated</h3></a>
          </div>
        </body></html>
        "#
        .to_string()
    }

    #[tokio::test]
    async fn site_search_extracts_site_links_only() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/search"))
            .respond_with(ResponseTemplate::new(200).set_body_string(result_page_html()))
            .mount(&server)
            .await;

        let searcher = FidelitySearcher::new("https://www.fidelity.com")
            .unwrap()
            .with_site_search_url(format!("{}/search", server.uri()));

        let results = searcher
            .search("reset password", 5, Duration::from_secs(10))
            .await
            .unwrap();

        assert_eq!(results.len(), 2);
        assert_eq!(results[0].title, "Reset your password");
        assert_eq!(results[0].url, "https://www.fidelity.com/help/reset-password");
        assert!(results[0].relevance > results[1].relevance);
        // The off-site link is filtered.
        assert!(results.iter().all(|r| r.url.contains("fidelity.com")));
    }

    #[tokio::test]
    async fn falls_back_to_native_search_on_primary_failure() {
        let site_server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/search"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&site_server)
            .await;

        let native_server = MockServer::start().await;
        let payload = serde_json::json!({
            "results": [
                {"title": "Native hit", "url": "https://www.fidelity.com/native", "content": "native snippet", "score": 0.7}
            ]
        });
        Mock::given(method("GET"))
            .and(path("/search"))
            .and(query_param("query", "401k"))
            .respond_with(ResponseTemplate::new(200).set_body_json(&payload))
            .mount(&native_server)
            .await;

        // base_url points at the native mock; site search points at the
        // failing mock.
        let mut searcher = FidelitySearcher::new(&native_server.uri()).unwrap();
        searcher.site_host = "fidelity.com".to_string();
        let searcher =
            searcher.with_site_search_url(format!("{}/search", site_server.uri()));

        let results = searcher
            .search("401k", 5, Duration::from_secs(10))
            .await
            .unwrap();

        assert_eq!(results.len(), 1);
        assert_eq!(results[0].title, "Native hit");
        assert!((results[0].relevance - 0.7).abs() < 1e-9);
        assert_eq!(results[0].snippet, "native snippet");
    }

    #[tokio::test]
    async fn both_strategies_failing_reports_http_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/search"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let mut searcher = FidelitySearcher::new(&server.uri()).unwrap();
        searcher.site_host = "fidelity.com".to_string();
        let searcher = searcher.with_site_search_url(format!("{}/search", server.uri()));

        let err = searcher
            .search("anything", 5, Duration::from_secs(10))
            .await
            .unwrap_err();
        assert_eq!(err, SourceErrorKind::Http);
    }

    #[test]
    fn parse_result_page_caps_at_k() {
        let searcher = FidelitySearcher::new("https://www.fidelity.com").unwrap();
        let html: String = (0..10)
            .map(|i| {
                format!(
                    r#"<a href="https://www.fidelity.com/p{i}"><h3>Page {i}</h3></a>"#
                )
            })
            .collect();
        let results = searcher.parse_result_page(&html, 3);
        assert_eq!(results.len(), 3);
    }

    #[test]
    fn adapter_metadata() {
        let searcher = FidelitySearcher::new("https://www.fidelity.com").unwrap();
        assert_eq!(searcher.source_tag(), "fidelity");
        assert_eq!(searcher.adapter_type(), AdapterType::Source);
    }
}
