//! Client for the Tavily search and extract API.

use std::time::Duration;

use reqwest::Client;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Upper bound on results per search accepted by the API.
pub const MAX_SEARCH_RESULTS: u32 = 20;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

#[derive(Debug, Error)]
pub enum TavilyError {
    #[error("Tavily request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Tavily returned HTTP {status}: {message}")]
    Api { status: u16, message: String },
}

#[derive(Debug, Clone, Serialize)]
pub struct SearchRequest {
    pub query: String,
    pub max_results: u32,

    /// `general`, `news` or `finance`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub topic: Option<String>,

    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub include_raw_content: bool,
}

impl SearchRequest {
    pub fn new(query: impl Into<String>, max_results: u32) -> Self {
        Self {
            query: query.into(),
            max_results: max_results.clamp(1, MAX_SEARCH_RESULTS),
            topic: None,
            include_raw_content: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchResponse {
    pub query: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub answer: Option<String>,

    #[serde(default)]
    pub results: Vec<SearchResult>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response_time: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchResult {
    pub title: String,
    pub url: String,

    #[serde(default)]
    pub content: String,

    #[serde(default)]
    pub score: f64,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw_content: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ExtractRequest {
    pub urls: Vec<String>,
    pub include_images: bool,

    /// `markdown` or `text`
    pub format: String,

    /// `basic` or `advanced`
    pub extract_depth: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractResponse {
    #[serde(default)]
    pub results: Vec<ExtractResult>,

    #[serde(default)]
    pub failed_results: Vec<FailedExtraction>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response_time: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractResult {
    pub url: String,

    #[serde(default)]
    pub raw_content: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FailedExtraction {
    pub url: String,

    #[serde(default)]
    pub error: String,
}

/// Thin async wrapper over `POST /search` and `POST /extract`.
#[derive(Debug, Clone)]
pub struct TavilyClient {
    client: Client,
    base_url: String,
    api_key: String,
}

impl TavilyClient {
    pub fn new(api_key: impl Into<String>, base_url: impl Into<String>) -> Result<Self, TavilyError> {
        let client = Client::builder().timeout(REQUEST_TIMEOUT).build()?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
        })
    }

    pub async fn search(&self, request: &SearchRequest) -> Result<SearchResponse, TavilyError> {
        tracing::debug!(query = %request.query, max_results = request.max_results, "Tavily search");
        self.post("search", request).await
    }

    pub async fn extract(&self, request: &ExtractRequest) -> Result<ExtractResponse, TavilyError> {
        tracing::debug!(urls = request.urls.len(), depth = %request.extract_depth, "Tavily extract");
        self.post("extract", request).await
    }

    async fn post<B, R>(&self, endpoint: &str, body: &B) -> Result<R, TavilyError>
    where
        B: Serialize + ?Sized,
        R: for<'de> Deserialize<'de>,
    {
        let url = format!("{}/{}", self.base_url, endpoint);
        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<ErrorBody>(&body)
                .ok()
                .and_then(ErrorBody::message)
                .unwrap_or(body);
            tracing::warn!(status = %status, endpoint, "Tavily request rejected");
            return Err(TavilyError::Api {
                status: status.as_u16(),
                message,
            });
        }

        Ok(response.json().await?)
    }
}

/// Tavily reports errors as `{"detail": {"error": "..."}}` or `{"detail": "..."}`.
#[derive(Debug, Deserialize)]
struct ErrorBody {
    detail: serde_json::Value,
}

impl ErrorBody {
    fn message(self) -> Option<String> {
        match self.detail {
            serde_json::Value::String(s) => Some(s),
            serde_json::Value::Object(map) => map
                .get("error")
                .and_then(|v| v.as_str())
                .map(str::to_string),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{http::HeaderMap, http::StatusCode, routing::post, Json, Router};
    use serde_json::{json, Value};

    async fn spawn(router: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        format!("http://{}", addr)
    }

    #[test]
    fn search_request_clamps_result_count() {
        assert_eq!(SearchRequest::new("q", 0).max_results, 1);
        assert_eq!(SearchRequest::new("q", 500).max_results, MAX_SEARCH_RESULTS);
        let body = serde_json::to_value(SearchRequest::new("rust", 3)).unwrap();
        assert_eq!(body, json!({"query": "rust", "max_results": 3}));
    }

    #[tokio::test]
    async fn search_sends_bearer_key_and_parses_results() {
        let router = Router::new().route(
            "/search",
            post(|headers: HeaderMap, Json(body): Json<Value>| async move {
                assert_eq!(headers["authorization"], "Bearer tvly-test");
                assert_eq!(body["query"], "rust async");
                Json(json!({
                    "query": "rust async",
                    "answer": null,
                    "results": [
                        {"title": "Tokio", "url": "https://tokio.rs", "content": "runtime", "score": 0.9}
                    ],
                    "response_time": 0.42
                }))
            }),
        );
        let base = spawn(router).await;
        let client = TavilyClient::new("tvly-test", format!("{}/", base)).unwrap();

        let response = client
            .search(&SearchRequest::new("rust async", 5))
            .await
            .unwrap();
        assert_eq!(response.results.len(), 1);
        assert_eq!(response.results[0].url, "https://tokio.rs");
        assert_eq!(response.response_time, Some(0.42));
    }

    #[tokio::test]
    async fn extract_reports_failed_urls() {
        let router = Router::new().route(
            "/extract",
            post(|Json(body): Json<Value>| async move {
                assert_eq!(body["format"], "markdown");
                assert_eq!(body["include_images"], false);
                Json(json!({
                    "results": [{"url": "https://a.example", "raw_content": "# A"}],
                    "failed_results": [{"url": "https://b.example", "error": "timeout"}]
                }))
            }),
        );
        let base = spawn(router).await;
        let client = TavilyClient::new("k", base).unwrap();

        let response = client
            .extract(&ExtractRequest {
                urls: vec!["https://a.example".into(), "https://b.example".into()],
                include_images: false,
                format: "markdown".into(),
                extract_depth: "basic".into(),
            })
            .await
            .unwrap();
        assert_eq!(response.results[0].raw_content, "# A");
        assert_eq!(response.failed_results[0].error, "timeout");
    }

    #[tokio::test]
    async fn api_errors_carry_detail_message() {
        let router = Router::new().route(
            "/search",
            post(|| async {
                (
                    StatusCode::UNAUTHORIZED,
                    Json(json!({"detail": {"error": "Unauthorized: missing or invalid API key."}})),
                )
            }),
        );
        let base = spawn(router).await;
        let client = TavilyClient::new("bad", base).unwrap();

        match client.search(&SearchRequest::new("q", 1)).await {
            Err(TavilyError::Api { status, message }) => {
                assert_eq!(status, 401);
                assert!(message.contains("invalid API key"));
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }
}
