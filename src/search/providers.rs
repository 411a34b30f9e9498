//! 检索后端：结构化API（Google Custom Search、Brave Search）与HTML抓取兜底（DuckDuckGo）

use async_trait::async_trait;
use regex::Regex;
use serde::Deserialize;
use std::sync::LazyLock;

use crate::search::{SearchError, SearchProvider};

const GOOGLE_ENDPOINT: &str = "https://www.googleapis.com/customsearch/v1";
const BRAVE_ENDPOINT: &str = "https://api.search.brave.com/res/v1/web/search";
const DUCKDUCKGO_ENDPOINT: &str = "https://html.duckduckgo.com/html/";

/// 后端的能力标签，同时决定其在检索链中的位置
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ProviderCapability {
    StructuredPrimary,
    StructuredSecondary,
    ScrapeFallback,
}

/// 单条命中结果
#[derive(Debug, Clone, PartialEq)]
pub struct SearchHit {
    pub title: String,
    pub url: String,
    pub snippet: String,
}

/// 将命中结果格式化为一段摘要文本
pub fn format_hits(hits: &[SearchHit]) -> String {
    hits.iter()
        .map(|hit| {
            if hit.url.is_empty() {
                format!("- {}: {}", hit.title, hit.snippet)
            } else {
                format!("- {}: {} ({})", hit.title, hit.snippet, hit.url)
            }
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// 发送请求并读取响应正文，非2xx状态视为失败
async fn fetch_text(
    provider: &'static str,
    request: reqwest::RequestBuilder,
) -> Result<String, SearchError> {
    let response = request.send().await.map_err(|e| SearchError::Request {
        provider,
        message: e.to_string(),
    })?;

    let status = response.status();
    if !status.is_success() {
        return Err(SearchError::Status {
            provider,
            status: status.as_u16(),
        });
    }

    response.text().await.map_err(|e| SearchError::Request {
        provider,
        message: e.to_string(),
    })
}

fn non_empty(provider: &'static str, hits: Vec<SearchHit>) -> Result<Vec<SearchHit>, SearchError> {
    if hits.is_empty() {
        Err(SearchError::NoResults { provider })
    } else {
        Ok(hits)
    }
}

// ---------------------------------------------------------------------------
// Google Custom Search
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
struct GoogleResponse {
    #[serde(default)]
    items: Vec<GoogleItem>,
}

#[derive(Deserialize)]
struct GoogleItem {
    #[serde(default)]
    title: String,
    #[serde(default)]
    link: String,
    #[serde(default)]
    snippet: String,
}

/// 解析Google Custom Search的JSON响应
pub fn parse_google_response(body: &str, max_results: usize) -> Result<Vec<SearchHit>, SearchError> {
    let payload: GoogleResponse = serde_json::from_str(body).map_err(|e| SearchError::Parse {
        provider: GoogleSearch::NAME,
        message: e.to_string(),
    })?;

    let hits = payload
        .items
        .into_iter()
        .filter(|item| !item.title.is_empty() || !item.snippet.is_empty())
        .take(max_results)
        .map(|item| SearchHit {
            title: item.title,
            url: item.link,
            snippet: collapse_whitespace(&item.snippet),
        })
        .collect();
    non_empty(GoogleSearch::NAME, hits)
}

pub struct GoogleSearch {
    http: reqwest::Client,
    api_key: String,
    engine_id: String,
    max_results: u32,
}

impl GoogleSearch {
    pub const NAME: &'static str = "google";

    pub fn new(http: reqwest::Client, api_key: String, engine_id: String, max_results: u32) -> Self {
        Self {
            http,
            api_key,
            engine_id,
            // Custom Search API单次最多返回10条
            max_results: max_results.clamp(1, 10),
        }
    }
}

#[async_trait]
impl SearchProvider for GoogleSearch {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn capability(&self) -> ProviderCapability {
        ProviderCapability::StructuredPrimary
    }

    async fn search(&self, query: &str) -> Result<String, SearchError> {
        let num = self.max_results.to_string();
        let request = self.http.get(GOOGLE_ENDPOINT).query(&[
            ("key", self.api_key.as_str()),
            ("cx", self.engine_id.as_str()),
            ("q", query),
            ("num", num.as_str()),
        ]);
        let body = fetch_text(Self::NAME, request).await?;
        let hits = parse_google_response(&body, self.max_results as usize)?;
        Ok(format_hits(&hits))
    }
}

// ---------------------------------------------------------------------------
// Brave Search
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
struct BraveResponse {
    web: Option<BraveWeb>,
}

#[derive(Deserialize)]
struct BraveWeb {
    #[serde(default)]
    results: Vec<BraveItem>,
}

#[derive(Deserialize)]
struct BraveItem {
    #[serde(default)]
    title: String,
    #[serde(default)]
    url: String,
    #[serde(default)]
    description: String,
}

/// 解析Brave Search的JSON响应
pub fn parse_brave_response(body: &str, max_results: usize) -> Result<Vec<SearchHit>, SearchError> {
    let payload: BraveResponse = serde_json::from_str(body).map_err(|e| SearchError::Parse {
        provider: BraveSearch::NAME,
        message: e.to_string(),
    })?;

    let hits = payload
        .web
        .map(|web| web.results)
        .unwrap_or_default()
        .into_iter()
        .filter(|item| !item.url.trim().is_empty())
        .take(max_results)
        .map(|item| SearchHit {
            title: strip_tags(&item.title),
            url: item.url,
            snippet: strip_tags(&item.description),
        })
        .collect();
    non_empty(BraveSearch::NAME, hits)
}

pub struct BraveSearch {
    http: reqwest::Client,
    api_key: String,
    max_results: u32,
}

impl BraveSearch {
    pub const NAME: &'static str = "brave";

    pub fn new(http: reqwest::Client, api_key: String, max_results: u32) -> Self {
        Self {
            http,
            api_key,
            max_results: max_results.clamp(1, 20),
        }
    }
}

#[async_trait]
impl SearchProvider for BraveSearch {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn capability(&self) -> ProviderCapability {
        ProviderCapability::StructuredSecondary
    }

    async fn search(&self, query: &str) -> Result<String, SearchError> {
        let count = self.max_results.to_string();
        let request = self
            .http
            .get(BRAVE_ENDPOINT)
            .header("X-Subscription-Token", &self.api_key)
            .header("Accept", "application/json")
            .query(&[("q", query), ("count", count.as_str())]);
        let body = fetch_text(Self::NAME, request).await?;
        let hits = parse_brave_response(&body, self.max_results as usize)?;
        Ok(format_hits(&hits))
    }
}

// ---------------------------------------------------------------------------
// DuckDuckGo HTML 抓取
// ---------------------------------------------------------------------------

static RESULT_TITLE_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"(?s)<a([^>]*class="result__a"[^>]*)>(.*?)</a>"#).unwrap());
static RESULT_SNIPPET_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?s)<(?:a|div)[^>]*class="result__snippet"[^>]*>(.*?)</(?:a|div)>"#).unwrap()
});
static HREF_REGEX: LazyLock<Regex> = LazyLock::new(|| Regex::new(r#"href="([^"]*)""#).unwrap());
static TAG_REGEX: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"<[^>]+>").unwrap());
static WHITESPACE_REGEX: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").unwrap());

fn collapse_whitespace(text: &str) -> String {
    WHITESPACE_REGEX.replace_all(text, " ").trim().to_string()
}

/// 去除HTML标签并还原常见实体
fn strip_tags(html: &str) -> String {
    let text = TAG_REGEX.replace_all(html, "");
    let decoded = text
        .replace("&amp;", "&")
        .replace("&quot;", "\"")
        .replace("&#x27;", "'")
        .replace("&#39;", "'")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&nbsp;", " ");
    collapse_whitespace(&decoded)
}

/// 从DuckDuckGo HTML结果页中提取命中结果
pub fn parse_duckduckgo_html(html: &str, max_results: usize) -> Result<Vec<SearchHit>, SearchError> {
    let titles: Vec<(String, String)> = RESULT_TITLE_REGEX
        .captures_iter(html)
        .map(|cap| {
            let url = HREF_REGEX
                .captures(&cap[1])
                .map(|href| href[1].replace("&amp;", "&"))
                .filter(|href| href.starts_with("http"))
                .unwrap_or_default();
            (strip_tags(&cap[2]), url)
        })
        .collect();
    let snippets: Vec<String> = RESULT_SNIPPET_REGEX
        .captures_iter(html)
        .map(|cap| strip_tags(&cap[1]))
        .collect();

    let hits = titles
        .into_iter()
        .enumerate()
        .map(|(i, (title, url))| SearchHit {
            title,
            url,
            snippet: snippets.get(i).cloned().unwrap_or_default(),
        })
        .filter(|hit| !hit.title.is_empty())
        .take(max_results)
        .collect();
    non_empty(DuckDuckGoScraper::NAME, hits)
}

pub struct DuckDuckGoScraper {
    http: reqwest::Client,
    augmentation: String,
    max_results: u32,
}

impl DuckDuckGoScraper {
    pub const NAME: &'static str = "duckduckgo";

    pub fn new(http: reqwest::Client, augmentation: String, max_results: u32) -> Self {
        Self {
            http,
            augmentation,
            max_results: max_results.max(1),
        }
    }

    /// 在查询后追加教育领域关键词
    pub fn augment_query(&self, query: &str) -> String {
        let augmentation = self.augmentation.trim();
        if augmentation.is_empty() || query.contains(augmentation) {
            query.to_string()
        } else {
            format!("{} {}", query, augmentation)
        }
    }
}

#[async_trait]
impl SearchProvider for DuckDuckGoScraper {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn capability(&self) -> ProviderCapability {
        ProviderCapability::ScrapeFallback
    }

    async fn search(&self, query: &str) -> Result<String, SearchError> {
        let augmented = self.augment_query(query);
        let request = self
            .http
            .get(DUCKDUCKGO_ENDPOINT)
            .query(&[("q", augmented.as_str()), ("kl", "jp-jp")]);
        let body = fetch_text(Self::NAME, request).await?;
        let hits = parse_duckduckgo_html(&body, self.max_results as usize)?;
        Ok(format_hits(&hits))
    }
}
