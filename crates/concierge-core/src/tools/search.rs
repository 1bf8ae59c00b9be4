//! Web search and page scraping tools

use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use regex::Regex;
use reqwest::Client;
use serde::Deserialize;
use serde_json::Value;
use std::net::IpAddr;
use std::sync::LazyLock;
use std::time::Duration;
use tracing::{debug, info, warn};

use super::{ToolHandler, json_schema, str_arg};

const TAVILY_URL: &str = "https://api.tavily.com/search";
const DUCKDUCKGO_URL: &str = "https://api.duckduckgo.com/";
const MAX_PAGE_CHARS: usize = 50_000;
const USER_AGENT: &str = concat!("concierge/", env!("CARGO_PKG_VERSION"));

/// Search the web: Tavily when a key is configured, DuckDuckGo otherwise
pub struct WebSearchTool {
    client: Client,
    tavily_api_key: Option<String>,
    max_results: usize,
}

impl WebSearchTool {
    pub fn new(tavily_api_key: Option<String>, max_results: usize) -> Self {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(Duration::from_secs(30))
            .build()
            .expect("Failed to build HTTP client");
        Self {
            client,
            tavily_api_key: tavily_api_key.filter(|k| !k.is_empty()),
            max_results: max_results.max(1),
        }
    }

    async fn tavily_search(&self, api_key: &str, query: &str) -> Result<String> {
        info!("Searching Tavily for '{}'", query);
        let response = self
            .client
            .post(TAVILY_URL)
            .json(&serde_json::json!({
                "api_key": api_key,
                "query": query,
                "max_results": self.max_results,
            }))
            .send()
            .await
            .context("Failed to send request to Tavily")?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(anyhow!("Tavily search failed with status {}: {}", status, body));
        }

        let parsed: TavilyResponse = response
            .json()
            .await
            .context("Failed to parse Tavily response")?;
        Ok(format_tavily(&parsed))
    }

    async fn duckduckgo_search(&self, query: &str) -> Result<String> {
        info!("Searching DuckDuckGo for '{}'", query);
        let response = self
            .client
            .get(DUCKDUCKGO_URL)
            .query(&[
                ("q", query),
                ("format", "json"),
                ("no_html", "1"),
                ("skip_disambig", "1"),
            ])
            .send()
            .await
            .context("Failed to send request to DuckDuckGo")?;

        let status = response.status();
        if !status.is_success() {
            return Err(anyhow!("DuckDuckGo search failed with status {}", status));
        }

        let parsed: DuckDuckGoResponse = response
            .json()
            .await
            .context("Failed to parse DuckDuckGo response")?;
        Ok(format_duckduckgo(&parsed, self.max_results))
    }
}

#[async_trait]
impl ToolHandler for WebSearchTool {
    fn name(&self) -> &str {
        "web_search"
    }

    fn description(&self) -> &str {
        "Search the web for up-to-date information. Returns titles, URLs and snippets."
    }

    fn input_schema(&self) -> Value {
        json_schema(
            serde_json::json!({
                "query": {
                    "type": "string",
                    "description": "The search query"
                }
            }),
            vec!["query"],
        )
    }

    async fn execute(&self, input: Value) -> Result<String> {
        let query = str_arg(&input, "query")?.trim();
        if query.is_empty() {
            return Err(anyhow!("Please provide a search query"));
        }

        if let Some(key) = &self.tavily_api_key {
            match self.tavily_search(key, query).await {
                Ok(results) => return Ok(results),
                Err(e) => warn!("Tavily search failed, falling back to DuckDuckGo: {:#}", e),
            }
        } else {
            debug!("No Tavily key configured; using DuckDuckGo");
        }

        self.duckduckgo_search(query).await
    }
}

#[derive(Debug, Deserialize)]
struct TavilyResponse {
    #[serde(default)]
    answer: Option<String>,
    #[serde(default)]
    results: Vec<TavilyResult>,
}

#[derive(Debug, Deserialize)]
struct TavilyResult {
    title: String,
    url: String,
    #[serde(default)]
    content: String,
}

fn format_tavily(resp: &TavilyResponse) -> String {
    if resp.results.is_empty() && resp.answer.is_none() {
        return "No results found.".to_string();
    }
    let mut out = String::new();
    if let Some(answer) = resp.answer.as_deref().filter(|a| !a.is_empty()) {
        out.push_str(&format!("Answer: {}\n\n", answer));
    }
    for (i, r) in resp.results.iter().enumerate() {
        out.push_str(&format!("{}. {}\n   {}\n   {}\n", i + 1, r.title, r.url, r.content.trim()));
    }
    out.trim_end().to_string()
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct DuckDuckGoResponse {
    #[serde(default)]
    heading: String,
    #[serde(default)]
    abstract_text: String,
    #[serde(rename = "AbstractURL", default)]
    abstract_url: String,
    #[serde(default)]
    answer: Value,
    #[serde(default)]
    related_topics: Vec<DuckDuckGoTopic>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum DuckDuckGoTopic {
    Entry {
        #[serde(rename = "Text")]
        text: String,
        #[serde(rename = "FirstURL")]
        first_url: String,
    },
    Group {
        #[serde(rename = "Topics")]
        topics: Vec<DuckDuckGoTopic>,
    },
}

fn flatten_topics<'a>(topics: &'a [DuckDuckGoTopic], out: &mut Vec<(&'a str, &'a str)>) {
    for topic in topics {
        match topic {
            DuckDuckGoTopic::Entry { text, first_url } => out.push((text, first_url)),
            DuckDuckGoTopic::Group { topics } => flatten_topics(topics, out),
        }
    }
}

fn format_duckduckgo(resp: &DuckDuckGoResponse, max_results: usize) -> String {
    let mut out = String::new();
    if let Some(answer) = resp.answer.as_str().filter(|a| !a.is_empty()) {
        out.push_str(&format!("Answer: {}\n\n", answer));
    }
    if !resp.abstract_text.is_empty() {
        out.push_str(&format!("{}: {}\n", resp.heading, resp.abstract_text));
        if !resp.abstract_url.is_empty() {
            out.push_str(&format!("   {}\n", resp.abstract_url));
        }
        out.push('\n');
    }

    let mut topics = Vec::new();
    flatten_topics(&resp.related_topics, &mut topics);
    for (i, (text, url)) in topics.into_iter().take(max_results).enumerate() {
        out.push_str(&format!("{}. {}\n   {}\n", i + 1, text, url));
    }

    let out = out.trim_end();
    if out.is_empty() {
        "No results found.".to_string()
    } else {
        out.to_string()
    }
}

/// Fetch a web page and return its readable text
pub struct ScrapeUrlTool {
    client: Client,
}

impl ScrapeUrlTool {
    pub fn new() -> Self {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(Duration::from_secs(15))
            .redirect(reqwest::redirect::Policy::limited(5))
            .build()
            .expect("Failed to build HTTP client");
        Self { client }
    }
}

impl Default for ScrapeUrlTool {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ToolHandler for ScrapeUrlTool {
    fn name(&self) -> &str {
        "scrape_url"
    }

    fn description(&self) -> &str {
        "Fetch a web page and return its clean text content for reading, analysis or summarization."
    }

    fn input_schema(&self) -> Value {
        json_schema(
            serde_json::json!({
                "url": {
                    "type": "string",
                    "description": "Full http(s) URL of the page"
                }
            }),
            vec!["url"],
        )
    }

    async fn execute(&self, input: Value) -> Result<String> {
        let url = str_arg(&input, "url")?;
        let parsed = validate_url(url)?;
        debug!("Scraping {}", parsed);

        let response = self
            .client
            .get(parsed)
            .send()
            .await
            .with_context(|| format!("Error browsing URL '{}'", url))?;

        let status = response.status();
        if !status.is_success() {
            return Err(anyhow!("HTTP request to '{}' failed with status {}", url, status));
        }

        let html = response
            .text()
            .await
            .context("Failed to read response body")?;
        let text = truncate_chars(html_to_text(&html), MAX_PAGE_CHARS);
        Ok(format!("Successfully browsed URL '{}'. Content:\n\n{}", url, text))
    }
}

/// Only public http(s) hosts may be fetched
fn validate_url(url_str: &str) -> Result<url::Url> {
    let url = url::Url::parse(url_str).context("Invalid URL format")?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(anyhow!("Only HTTP and HTTPS schemes are allowed"));
    }

    let host = url
        .host_str()
        .ok_or_else(|| anyhow!("URL must have a host"))?;
    if host.eq_ignore_ascii_case("localhost") {
        return Err(anyhow!("Access to localhost is not allowed"));
    }
    let bare = host.trim_start_matches('[').trim_end_matches(']');
    if let Ok(ip) = bare.parse::<IpAddr>()
        && let Some(reason) = private_ip_reason(&ip)
    {
        return Err(anyhow!("Access to {} is not allowed", reason));
    }
    Ok(url)
}

fn private_ip_reason(ip: &IpAddr) -> Option<&'static str> {
    match ip {
        IpAddr::V4(v4) => {
            let o = v4.octets();
            if v4.is_loopback() {
                Some("loopback address")
            } else if v4.is_private() {
                Some("private IP range")
            } else if v4.is_link_local() {
                Some("link-local address")
            } else if o[0] == 0 {
                Some("unspecified address")
            } else {
                None
            }
        }
        IpAddr::V6(v6) => {
            if v6.is_loopback() || v6.is_unspecified() {
                Some("IPv6 loopback")
            } else if v6.segments()[0] & 0xffc0 == 0xfe80 {
                Some("IPv6 link-local address")
            } else if v6.segments()[0] & 0xfe00 == 0xfc00 {
                Some("IPv6 unique local address")
            } else {
                None
            }
        }
    }
}

static SCRIPT_OR_STYLE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?is)<(script|style|noscript)\b.*?</(script|style|noscript)\s*>")
        .expect("valid regex")
});
static COMMENT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)<!--.*?-->").expect("valid regex"));
static BLOCK_BREAK: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)<(br|/p|/div|/li|/h[1-6]|/tr|/section|/article)\b[^>]*>").expect("valid regex")
});
static TAG: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?s)<[^>]*>").expect("valid regex"));

/// Strip markup from an HTML document, one phrase per line
pub fn html_to_text(html: &str) -> String {
    let text = SCRIPT_OR_STYLE.replace_all(html, " ");
    let text = COMMENT.replace_all(&text, " ");
    let text = BLOCK_BREAK.replace_all(&text, "\n");
    let text = TAG.replace_all(&text, " ");
    let text = decode_entities(&text);

    text.lines()
        .flat_map(|line| line.split("  "))
        .map(|chunk| chunk.split_whitespace().collect::<Vec<_>>().join(" "))
        .filter(|chunk| !chunk.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

fn decode_entities(text: &str) -> String {
    text.replace("&nbsp;", " ")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&apos;", "'")
        .replace("&amp;", "&")
}

fn truncate_chars(text: String, max: usize) -> String {
    match text.char_indices().nth(max) {
        Some((idx, _)) => format!("{}\n\n[Content truncated at {} chars]", &text[..idx], max),
        None => text,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_schemas() {
        let search = WebSearchTool::new(None, 5);
        assert_eq!(search.name(), "web_search");
        assert_eq!(search.input_schema()["required"][0], "query");

        let scrape = ScrapeUrlTool::new();
        assert_eq!(scrape.name(), "scrape_url");
        assert_eq!(scrape.input_schema()["required"][0], "url");
    }

    #[test]
    fn test_empty_tavily_key_is_ignored() {
        let search = WebSearchTool::new(Some(String::new()), 0);
        assert!(search.tavily_api_key.is_none());
        assert_eq!(search.max_results, 1);
    }

    #[tokio::test]
    async fn test_blank_query_rejected() {
        let search = WebSearchTool::new(None, 5);
        assert!(search.execute(serde_json::json!({"query": "   "})).await.is_err());
        assert!(search.execute(serde_json::json!({})).await.is_err());
    }

    #[test]
    fn test_format_tavily() {
        let resp: TavilyResponse = serde_json::from_value(serde_json::json!({
            "answer": "Sunny",
            "results": [
                {"title": "Forecast", "url": "https://weather.example", "content": " Clear skies "}
            ]
        }))
        .unwrap();
        assert_eq!(
            format_tavily(&resp),
            "Answer: Sunny\n\n1. Forecast\n   https://weather.example\n   Clear skies"
        );

        let empty: TavilyResponse = serde_json::from_value(serde_json::json!({"results": []})).unwrap();
        assert_eq!(format_tavily(&empty), "No results found.");
    }

    #[test]
    fn test_format_duckduckgo() {
        let resp: DuckDuckGoResponse = serde_json::from_value(serde_json::json!({
            "Heading": "Rust",
            "AbstractText": "A systems language.",
            "AbstractURL": "https://en.wikipedia.org/wiki/Rust",
            "Answer": "",
            "RelatedTopics": [
                {"Text": "Cargo - package manager", "FirstURL": "https://ddg.example/cargo"},
                {"Name": "Tools", "Topics": [
                    {"Text": "rustup - installer", "FirstURL": "https://ddg.example/rustup"},
                    {"Text": "clippy - linter", "FirstURL": "https://ddg.example/clippy"}
                ]}
            ]
        }))
        .unwrap();

        let out = format_duckduckgo(&resp, 2);
        assert!(out.starts_with("Rust: A systems language.\n   https://en.wikipedia.org/wiki/Rust"));
        assert!(out.contains("1. Cargo - package manager"));
        assert!(out.contains("2. rustup - installer"));
        assert!(!out.contains("clippy"));

        assert_eq!(format_duckduckgo(&DuckDuckGoResponse::default(), 5), "No results found.");
    }

    #[test]
    fn test_validate_url() {
        assert!(validate_url("https://example.com/page").is_ok());
        assert!(validate_url("ftp://example.com").is_err());
        assert!(validate_url("file:///etc/passwd").is_err());
        assert!(validate_url("not a url").is_err());
        for blocked in [
            "http://localhost/api",
            "http://127.0.0.1/",
            "http://10.0.0.1/",
            "http://192.168.1.1/",
            "http://172.16.0.1/",
            "http://169.254.169.254/latest",
            "http://0.0.0.0/",
            "http://[::1]/",
            "http://[fe80::1]/",
        ] {
            assert!(validate_url(blocked).is_err(), "{} should be blocked", blocked);
        }
    }

    #[test]
    fn test_html_to_text() {
        let html = r#"<html><head><title>T</title><style>body { color: red; }</style>
            <script>var x = "<p>hidden</p>";</script></head>
            <body><h1>Hello&nbsp;World</h1><!-- note --><p>Fish &amp; chips</p>
            <ul><li>one</li><li>two</li></ul></body></html>"#;
        let text = html_to_text(html);
        assert!(!text.contains("color"));
        assert!(!text.contains("hidden"));
        assert!(!text.contains("note"));
        assert!(text.contains("Hello World"));
        assert!(text.contains("Fish & chips"));
        assert!(text.contains("one\ntwo"));
    }

    #[test]
    fn test_truncate_chars() {
        assert_eq!(truncate_chars("short".to_string(), 10), "short");
        let cut = truncate_chars("ééééé".to_string(), 2);
        assert!(cut.starts_with("éé\n\n[Content truncated at 2 chars]"));
    }
}
