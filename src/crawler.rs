//! Local page fetcher used by `crawl_url` when Tavily extract is disabled.
//!
//! Plain HTTP GET, no JavaScript. Non-content blocks are dropped before the
//! HTML is flattened to text with `nanohtml2text`.

use std::sync::LazyLock;
use std::time::Duration;

use regex::Regex;
use reqwest::Client;
use thiserror::Error;
use url::Url;

const FETCH_TIMEOUT: Duration = Duration::from_secs(30);
const MAX_REDIRECTS: usize = 10;
const USER_AGENT: &str = concat!("research-agent/", env!("CARGO_PKG_VERSION"));

/// Characters kept per page.
pub const MAX_PAGE_CHARS: usize = 20_000;

const NON_CONTENT_TAGS: [&str; 8] = [
    "script", "style", "nav", "header", "footer", "aside", "noscript", "form",
];

static NON_CONTENT: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    NON_CONTENT_TAGS
        .iter()
        .map(|tag| Regex::new(&format!(r"(?is)<{tag}\b[^>]*>.*?</{tag}\s*>")).unwrap())
        .collect()
});
static COMMENT: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?s)<!--.*?-->").unwrap());
static BLANK_LINES: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\n[ \t]*(\n[ \t]*)+").unwrap());

#[derive(Debug, Error)]
pub enum CrawlError {
    #[error("invalid URL '{0}'")]
    InvalidUrl(String),

    #[error("unsupported URL scheme '{0}', only http and https are allowed")]
    UnsupportedScheme(String),

    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("HTTP {0}")]
    Status(u16),
}

/// A fetched page reduced to readable text.
#[derive(Debug, Clone, PartialEq)]
pub struct Page {
    pub url: String,
    pub content: String,
}

#[derive(Debug, Clone)]
pub struct LocalCrawler {
    client: Client,
}

impl LocalCrawler {
    pub fn new() -> Result<Self, CrawlError> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(FETCH_TIMEOUT)
            .redirect(reqwest::redirect::Policy::limited(MAX_REDIRECTS))
            .build()?;
        Ok(Self { client })
    }

    pub async fn fetch(&self, raw_url: &str) -> Result<Page, CrawlError> {
        let url = validate_url(raw_url)?;
        tracing::debug!(url = %url, "Fetching page");

        let response = self.client.get(url.clone()).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(CrawlError::Status(status.as_u16()));
        }

        let is_html = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(|ct| ct.contains("html"))
            .unwrap_or(true);
        let body = response.text().await?;

        let content = if is_html { html_to_text(&body) } else { body };
        Ok(Page {
            url: url.to_string(),
            content: truncate(content.trim(), MAX_PAGE_CHARS),
        })
    }

    /// Fetch every URL in order. Failures are reported inline so one bad URL
    /// doesn't hide the others.
    pub async fn crawl(&self, urls: &[String]) -> String {
        let mut sections = Vec::with_capacity(urls.len());
        for url in urls {
            let body = match self.fetch(url).await {
                Ok(page) if page.content.is_empty() => "(no readable content)".to_string(),
                Ok(page) => page.content,
                Err(e) => {
                    tracing::warn!(url = %url, error = %e, "Crawl failed");
                    format!("Error: {}", e)
                }
            };
            sections.push(format!("## {}\n\n{}", url, body));
        }
        sections.join("\n\n---\n\n")
    }
}

fn validate_url(raw: &str) -> Result<Url, CrawlError> {
    let url = Url::parse(raw.trim()).map_err(|_| CrawlError::InvalidUrl(raw.to_string()))?;
    match url.scheme() {
        "http" | "https" => Ok(url),
        other => Err(CrawlError::UnsupportedScheme(other.to_string())),
    }
}

/// Drop non-content blocks, convert to text and collapse runs of blank lines.
pub fn html_to_text(html: &str) -> String {
    let mut cleaned = COMMENT.replace_all(html, "").into_owned();
    for re in NON_CONTENT.iter() {
        cleaned = re.replace_all(&cleaned, "").into_owned();
    }
    let text = nanohtml2text::html2text(&cleaned);
    BLANK_LINES.replace_all(&text, "\n\n").trim().to_string()
}

fn truncate(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => format!(
            "{}\n\n... [content truncated, showing first {} chars]",
            &text[..idx],
            max_chars
        ),
        None => text.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{http::header, http::StatusCode, response::IntoResponse, routing::get, Router};

    const PAGE: &str = r#"<html><head><title>T</title><style>body { color: red }</style></head>
<body>
<header><a href="/">Home</a></header>
<nav><ul><li>Menu item</li></ul></nav>
<!-- tracking -->
<h1>Rust 2024</h1>


<p>The edition ships async closures.</p>
<script>console.log("secret")</script>
<footer>Copyright</footer>
</body></html>"#;

    async fn spawn(router: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        format!("http://{}", addr)
    }

    #[test]
    fn strips_non_content_blocks() {
        let text = html_to_text(PAGE);
        assert!(text.contains("Rust 2024"));
        assert!(text.contains("async closures"));
        for hidden in ["Menu item", "secret", "Copyright", "color: red", "tracking", "Home"] {
            assert!(!text.contains(hidden), "{hidden} leaked into {text:?}");
        }
        assert!(!text.contains("\n\n\n"));
    }

    #[test]
    fn rejects_non_http_schemes() {
        assert!(matches!(
            validate_url("ftp://example.com/file"),
            Err(CrawlError::UnsupportedScheme(s)) if s == "ftp"
        ));
        assert!(matches!(validate_url("not a url"), Err(CrawlError::InvalidUrl(_))));
        assert!(validate_url(" https://example.com ").is_ok());
    }

    #[test]
    fn truncates_on_char_boundaries() {
        let text = "é".repeat(10);
        let out = truncate(&text, 4);
        assert!(out.starts_with("éééé\n\n..."));
        assert_eq!(truncate("short", 10), "short");
    }

    #[tokio::test]
    async fn crawl_reports_each_url() {
        let router = Router::new()
            .route(
                "/page",
                get(|| async { ([(header::CONTENT_TYPE, "text/html")], PAGE) }),
            )
            .route("/missing", get(|| async { StatusCode::NOT_FOUND.into_response() }));
        let base = spawn(router).await;
        let crawler = LocalCrawler::new().unwrap();

        let urls = vec![format!("{}/page", base), format!("{}/missing", base)];
        let out = crawler.crawl(&urls).await;

        assert!(out.contains(&format!("## {}/page", base)));
        assert!(out.contains("async closures"));
        assert!(out.contains("Error: HTTP 404"));
        assert!(!out.contains("secret"));
    }
}
