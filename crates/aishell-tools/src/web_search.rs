//! Web search: DuckDuckGo's HTML endpoint (no key) or the Brave Search API.

use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;
use std::time::Duration;

use anyhow::{anyhow, bail, Context};
use regex::Regex;
use reqwest::Client;
use serde::Deserialize;
use tracing::{debug, info};

use aishell_core::config::schema::SearchConfig;

const USER_AGENT: &str =
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 14_7_2) AppleWebKit/537.36 (KHTML, like Gecko)";

pub const DUCKDUCKGO_ENDPOINT: &str = "https://html.duckduckgo.com/html/";
pub const BRAVE_ENDPOINT: &str = "https://api.search.brave.com/res/v1/web/search";

/// Brave caps `count` at 20.
const BRAVE_MAX_COUNT: usize = 20;

static DDG_TITLE: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r#"(?s)<a\s([^>]*class="result__a"[^>]*)>(.*?)</a>"#).ok());
static DDG_SNIPPET: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r#"(?s)class="result__snippet"[^>]*>(.*?)</(?:a|div|td)>"#).ok());
static HREF: LazyLock<Option<Regex>> = LazyLock::new(|| Regex::new(r#"href="([^"]*)""#).ok());
static TAG: LazyLock<Option<Regex>> = LazyLock::new(|| Regex::new(r"<[^>]*>").ok());

/// One search result.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SearchHit {
    pub title: String,
    pub url: String,
    pub snippet: String,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SearchEngine {
    DuckDuckGo,
    Brave,
}

impl SearchEngine {
    pub fn as_str(&self) -> &'static str {
        match self {
            SearchEngine::DuckDuckGo => "duckduckgo",
            SearchEngine::Brave => "brave",
        }
    }

    fn default_endpoint(&self) -> &'static str {
        match self {
            SearchEngine::DuckDuckGo => DUCKDUCKGO_ENDPOINT,
            SearchEngine::Brave => BRAVE_ENDPOINT,
        }
    }
}

impl fmt::Display for SearchEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SearchEngine {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "duckduckgo" | "ddg" => Ok(SearchEngine::DuckDuckGo),
            "brave" => Ok(SearchEngine::Brave),
            other => Err(anyhow!(
                "unknown search engine '{other}' (available: duckduckgo, brave)"
            )),
        }
    }
}

// ─────────────────────────────────────────────
// WebSearch
// ─────────────────────────────────────────────

/// Search client bound to one engine.
#[derive(Clone, Debug)]
pub struct WebSearch {
    client: Client,
    engine: SearchEngine,
    endpoint: String,
    brave_api_key: Option<String>,
}

impl WebSearch {
    pub fn new(engine: SearchEngine, brave_api_key: Option<String>) -> Self {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(Duration::from_secs(30))
            .build()
            .unwrap_or_default();
        Self {
            client,
            engine,
            endpoint: engine.default_endpoint().to_string(),
            brave_api_key: brave_api_key.filter(|k| !k.is_empty()),
        }
    }

    pub fn from_config(config: &SearchConfig) -> anyhow::Result<Self> {
        let engine: SearchEngine = config.engine.parse()?;
        Ok(Self::new(engine, Some(config.brave_api_key.clone())))
    }

    /// Point the client at another URL (a mirror, or a mock server).
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    pub fn engine(&self) -> SearchEngine {
        self.engine
    }

    pub async fn search(&self, query: &str, limit: usize) -> anyhow::Result<Vec<SearchHit>> {
        info!(engine = %self.engine, query = %query, limit = limit, "Searching the web");
        let mut hits = match self.engine {
            SearchEngine::DuckDuckGo => self.search_duckduckgo(query).await?,
            SearchEngine::Brave => self.search_brave(query, limit).await?,
        };
        hits.truncate(limit);
        debug!(results = hits.len(), "Web search complete");
        Ok(hits)
    }

    async fn search_duckduckgo(&self, query: &str) -> anyhow::Result<Vec<SearchHit>> {
        let resp = self
            .client
            .get(&self.endpoint)
            .query(&[("q", query)])
            .send()
            .await
            .context("DuckDuckGo request failed")?;

        if !resp.status().is_success() {
            bail!("DuckDuckGo returned {}", resp.status());
        }
        let html = resp.text().await.context("Failed to read DuckDuckGo response")?;
        Ok(parse_duckduckgo_html(&html))
    }

    async fn search_brave(&self, query: &str, limit: usize) -> anyhow::Result<Vec<SearchHit>> {
        let api_key = self
            .brave_api_key
            .as_deref()
            .ok_or_else(|| anyhow!("No Brave API key configured (set BRAVE_API_KEY)"))?;
        let count = limit.clamp(1, BRAVE_MAX_COUNT).to_string();

        let resp = self
            .client
            .get(&self.endpoint)
            .header("X-Subscription-Token", api_key)
            .header("Accept", "application/json")
            .query(&[("q", query), ("count", count.as_str())])
            .send()
            .await
            .context("Brave API request failed")?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            bail!("Brave API returned {status}: {body}");
        }

        let body: BraveResponse = resp.json().await.context("Failed to parse Brave response")?;
        Ok(body
            .web
            .map(|w| w.results)
            .unwrap_or_default()
            .into_iter()
            .map(|r| SearchHit {
                title: clean_text(&r.title),
                url: r.url,
                snippet: clean_text(&r.description),
            })
            .collect())
    }
}

#[derive(Debug, Deserialize)]
struct BraveResponse {
    web: Option<BraveWeb>,
}

#[derive(Debug, Deserialize)]
struct BraveWeb {
    #[serde(default)]
    results: Vec<BraveResult>,
}

#[derive(Debug, Deserialize)]
struct BraveResult {
    #[serde(default)]
    title: String,
    #[serde(default)]
    url: String,
    #[serde(default)]
    description: String,
}

// ─────────────────────────────────────────────
// DuckDuckGo HTML parsing
// ─────────────────────────────────────────────

/// Extract results from a DuckDuckGo HTML results page.
pub fn parse_duckduckgo_html(html: &str) -> Vec<SearchHit> {
    let (Some(title_re), Some(snippet_re), Some(href_re)) =
        (DDG_TITLE.as_ref(), DDG_SNIPPET.as_ref(), HREF.as_ref())
    else {
        return Vec::new();
    };

    let titles: Vec<_> = title_re.captures_iter(html).collect();
    let mut hits = Vec::with_capacity(titles.len());

    for (i, caps) in titles.iter().enumerate() {
        let Some(whole) = caps.get(0) else { continue };
        let attrs = &caps[1];
        let Some(href) = href_re.captures(attrs).map(|c| c[1].to_string()) else {
            continue;
        };

        // the snippet sits between this title and the next one
        let block_end = titles
            .get(i + 1)
            .and_then(|next| next.get(0))
            .map(|m| m.start())
            .unwrap_or(html.len());
        let block = &html[whole.end()..block_end];
        let snippet = snippet_re
            .captures(block)
            .map(|c| clean_text(&c[1]))
            .unwrap_or_default();

        let title = clean_text(&caps[2]);
        let url = decode_redirect(&decode_entities(&href));
        if !title.is_empty() && !url.is_empty() {
            hits.push(SearchHit {
                title,
                url,
                snippet,
            });
        }
    }
    hits
}

/// Unwrap DuckDuckGo's `/l/?uddg=<encoded>` redirect links.
pub fn decode_redirect(href: &str) -> String {
    if let Some(pos) = href.find("uddg=") {
        let encoded = &href[pos + 5..];
        let encoded = encoded.split('&').next().unwrap_or(encoded);
        if let Ok(decoded) = urlencoding::decode(encoded) {
            return decoded.into_owned();
        }
    }
    match href.strip_prefix("//") {
        Some(rest) => format!("https://{rest}"),
        None => href.to_string(),
    }
}

fn clean_text(html: &str) -> String {
    let stripped = match TAG.as_ref() {
        Some(re) => re.replace_all(html, ""),
        None => html.into(),
    };
    decode_entities(&stripped)
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

fn decode_entities(text: &str) -> String {
    text.replace("&nbsp;", " ")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#x27;", "'")
        .replace("&#39;", "'")
        .replace("&amp;", "&")
}
