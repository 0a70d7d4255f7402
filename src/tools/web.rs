//! Web access tools: search and page extraction.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};

use super::{arg_str, arg_u64, require_str, Tool};
use crate::crawler::LocalCrawler;
use crate::sandbox::Sandbox;
use crate::tavily::{ExtractRequest, SearchRequest, TavilyClient};

const DEFAULT_MAX_RESULTS: u64 = 5;

/// Search the web through Tavily.
pub struct InternetSearch {
    client: Arc<TavilyClient>,
}

impl InternetSearch {
    pub fn new(client: Arc<TavilyClient>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Tool for InternetSearch {
    fn name(&self) -> &str {
        "internet_search"
    }

    fn description(&self) -> &str {
        "Run a web search. Returns the top results with title, URL, a content snippet and a relevance score. Use precise, well-constructed queries."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "query": {
                    "type": "string",
                    "description": "The search query"
                },
                "max_results": {
                    "type": "integer",
                    "description": "Maximum number of results to return (1-20, default: 5)"
                },
                "topic": {
                    "type": "string",
                    "enum": ["general", "news", "finance"],
                    "description": "Search category (default: general)"
                },
                "include_raw_content": {
                    "type": "boolean",
                    "description": "Also return the full page text of each result (default: false)"
                }
            },
            "required": ["query"]
        })
    }

    async fn execute(&self, args: Value, _sandbox: &Sandbox) -> anyhow::Result<String> {
        let query = require_str(&args, "query")?.trim();
        if query.is_empty() {
            anyhow::bail!("'query' must not be empty");
        }
        let max_results = arg_u64(&args, "max_results").unwrap_or(DEFAULT_MAX_RESULTS);
        let mut request = SearchRequest::new(query, u32::try_from(max_results).unwrap_or(u32::MAX));
        if let Some(topic) = arg_str(&args, "topic") {
            if !matches!(topic, "general" | "news" | "finance") {
                anyhow::bail!("'topic' must be one of general, news, finance (got '{}')", topic);
            }
            request.topic = Some(topic.to_string());
        }
        request.include_raw_content = args["include_raw_content"].as_bool().unwrap_or(false);

        let response = self.client.search(&request).await?;
        tracing::info!(query, results = response.results.len(), "internet_search");
        Ok(serde_json::to_string_pretty(&response)?)
    }
}

/// Where `crawl_url` gets page content from.
pub enum ExtractBackend {
    Tavily(Arc<TavilyClient>),
    Local(LocalCrawler),
}

/// Extract readable content from one or more URLs.
pub struct CrawlUrl {
    backend: ExtractBackend,
}

impl CrawlUrl {
    pub fn new(backend: ExtractBackend) -> Self {
        Self { backend }
    }
}

#[async_trait]
impl Tool for CrawlUrl {
    fn name(&self) -> &str {
        "crawl_url"
    }

    fn description(&self) -> &str {
        "Fetch and extract the main content of web pages. Accepts a single URL or a list of URLs. Use after internet_search to read a source in full."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "urls": {
                    "description": "A URL or a list of URLs to extract",
                    "anyOf": [
                        {"type": "string"},
                        {"type": "array", "items": {"type": "string"}}
                    ]
                },
                "format": {
                    "type": "string",
                    "enum": ["markdown", "text"],
                    "description": "Output format (default: markdown)"
                },
                "extract_depth": {
                    "type": "string",
                    "enum": ["basic", "advanced"],
                    "description": "Extraction depth; advanced also handles tables and embedded content (default: basic)"
                }
            },
            "required": ["urls"]
        })
    }

    async fn execute(&self, args: Value, _sandbox: &Sandbox) -> anyhow::Result<String> {
        let urls = parse_urls(&args["urls"])?;
        let format = arg_str(&args, "format").unwrap_or("markdown");
        let extract_depth = arg_str(&args, "extract_depth").unwrap_or("basic");
        if !matches!(format, "markdown" | "text") {
            anyhow::bail!("'format' must be 'markdown' or 'text'");
        }
        if !matches!(extract_depth, "basic" | "advanced") {
            anyhow::bail!("'extract_depth' must be 'basic' or 'advanced'");
        }

        match &self.backend {
            ExtractBackend::Tavily(client) => {
                let response = client
                    .extract(&ExtractRequest {
                        urls,
                        include_images: false,
                        format: format.to_string(),
                        extract_depth: extract_depth.to_string(),
                    })
                    .await?;
                tracing::info!(
                    ok = response.results.len(),
                    failed = response.failed_results.len(),
                    "crawl_url"
                );
                Ok(serde_json::to_string_pretty(&response)?)
            }
            ExtractBackend::Local(crawler) => Ok(crawler.crawl(&urls).await),
        }
    }
}

/// `urls` may be a single string, a comma/whitespace separated string, or a
/// list of strings.
fn parse_urls(value: &Value) -> anyhow::Result<Vec<String>> {
    let urls: Vec<String> = match value {
        Value::String(s) => s
            .split(|c: char| c == ',' || c.is_whitespace())
            .filter(|u| !u.is_empty())
            .map(str::to_string)
            .collect(),
        Value::Array(items) => items
            .iter()
            .filter_map(Value::as_str)
            .map(str::trim)
            .filter(|u| !u.is_empty())
            .map(str::to_string)
            .collect(),
        _ => anyhow::bail!("Missing 'urls' argument"),
    };
    if urls.is_empty() {
        anyhow::bail!("'urls' must contain at least one URL");
    }
    Ok(urls)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{routing::post, Json, Router};

    async fn spawn(router: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        format!("http://{}", addr)
    }

    fn sandbox() -> (tempfile::TempDir, Sandbox) {
        let dir = tempfile::tempdir().unwrap();
        let sandbox = Sandbox::open(dir.path()).unwrap();
        (dir, sandbox)
    }

    #[test]
    fn urls_accept_string_or_list() {
        assert_eq!(parse_urls(&json!("https://a.io")).unwrap(), ["https://a.io"]);
        assert_eq!(
            parse_urls(&json!("https://a.io, https://b.io")).unwrap(),
            ["https://a.io", "https://b.io"]
        );
        assert_eq!(
            parse_urls(&json!(["https://a.io", " ", "https://b.io"])).unwrap(),
            ["https://a.io", "https://b.io"]
        );
        assert!(parse_urls(&json!([])).is_err());
        assert!(parse_urls(&Value::Null).is_err());
    }

    #[tokio::test]
    async fn search_clamps_and_returns_json() {
        let router = Router::new().route(
            "/search",
            post(|Json(body): Json<Value>| async move {
                Json(json!({
                    "query": body["query"],
                    "results": [{
                        "title": "max",
                        "url": "https://example.com",
                        "content": body["max_results"].to_string(),
                        "score": 1.0
                    }]
                }))
            }),
        );
        let base = spawn(router).await;
        let tool = InternetSearch::new(Arc::new(TavilyClient::new("k", base).unwrap()));
        let (_dir, sandbox) = sandbox();

        let out = tool
            .execute(json!({"query": "quantum", "max_results": 99}), &sandbox)
            .await
            .unwrap();
        let parsed: Value = serde_json::from_str(&out).unwrap();
        assert_eq!(parsed["query"], "quantum");
        assert_eq!(parsed["results"][0]["content"], "20");

        let err = tool.execute(json!({"query": "  "}), &sandbox).await.unwrap_err();
        assert!(err.to_string().contains("must not be empty"));
    }

    #[tokio::test]
    async fn search_forwards_topic_and_raw_content() {
        let router = Router::new().route(
            "/search",
            post(|Json(body): Json<Value>| async move {
                assert_eq!(body["topic"], "news");
                assert_eq!(body["include_raw_content"], true);
                Json(json!({
                    "query": body["query"],
                    "results": [{
                        "title": "t",
                        "url": "https://example.com",
                        "content": "snippet",
                        "score": 0.5,
                        "raw_content": "full page"
                    }]
                }))
            }),
        );
        let base = spawn(router).await;
        let tool = InternetSearch::new(Arc::new(TavilyClient::new("k", base).unwrap()));
        let (_dir, sandbox) = sandbox();

        let out = tool
            .execute(
                json!({"query": "q", "topic": "news", "include_raw_content": true}),
                &sandbox,
            )
            .await
            .unwrap();
        let parsed: Value = serde_json::from_str(&out).unwrap();
        assert_eq!(parsed["results"][0]["raw_content"], "full page");

        let err = tool
            .execute(json!({"query": "q", "topic": "sports"}), &sandbox)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("'topic'"));
    }

    #[tokio::test]
    async fn crawl_uses_tavily_extract() {
        let router = Router::new().route(
            "/extract",
            post(|Json(body): Json<Value>| async move {
                assert_eq!(body["extract_depth"], "advanced");
                Json(json!({
                    "results": [{"url": body["urls"][0], "raw_content": "body text"}],
                    "failed_results": []
                }))
            }),
        );
        let base = spawn(router).await;
        let tool = CrawlUrl::new(ExtractBackend::Tavily(Arc::new(
            TavilyClient::new("k", base).unwrap(),
        )));
        let (_dir, sandbox) = sandbox();

        let out = tool
            .execute(
                json!({"urls": "https://a.io", "extract_depth": "advanced"}),
                &sandbox,
            )
            .await
            .unwrap();
        assert!(out.contains("body text"));

        let err = tool
            .execute(json!({"urls": "https://a.io", "format": "pdf"}), &sandbox)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("'format'"));
    }
}
