//! 信息检索客户端 - 按顺序尝试多个检索后端，为每个主题返回一段文本

use async_trait::async_trait;
use futures::{StreamExt, stream};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::config::SearchConfig;

pub mod providers;
pub mod types;

pub use providers::{BraveSearch, DuckDuckGoScraper, GoogleSearch, ProviderCapability};
pub use types::{SearchRecord, SearchResults, SearchSource};

/// 检索失败的原因
#[derive(Debug, Error)]
pub enum SearchError {
    #[error("{provider}: request failed: {message}")]
    Request {
        provider: &'static str,
        message: String,
    },

    #[error("{provider}: unexpected HTTP status {status}")]
    Status { provider: &'static str, status: u16 },

    #[error("{provider}: failed to parse response: {message}")]
    Parse {
        provider: &'static str,
        message: String,
    },

    #[error("{provider}: no results")]
    NoResults { provider: &'static str },

    #[error("all providers failed: {}", join_errors(.0))]
    Exhausted(Vec<SearchError>),

    #[error("no search provider is configured")]
    NoProviders,

    #[error("failed to build HTTP client: {0}")]
    Client(String),
}

fn join_errors(errors: &[SearchError]) -> String {
    errors
        .iter()
        .map(|e| e.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}

/// 检索后端
#[async_trait]
pub trait SearchProvider: Send + Sync {
    fn name(&self) -> &'static str;

    fn capability(&self) -> ProviderCapability;

    /// 执行一次检索，返回格式化后的结果文本
    async fn search(&self, query: &str) -> Result<String, SearchError>;
}

/// 主题检索失败时的占位文本
pub fn no_results_placeholder(topic: &str) -> String {
    format!("No results found for '{}'.", topic)
}

/// 信息检索客户端
pub struct RetrievalClient {
    providers: Vec<Box<dyn SearchProvider>>,
    throttle: Duration,
    max_parallels: usize,
}

impl RetrievalClient {
    /// 使用给定的后端创建客户端，后端按能力排序（稳定排序，同级保持传入顺序）
    pub fn new(
        mut providers: Vec<Box<dyn SearchProvider>>,
        throttle: Duration,
        max_parallels: usize,
    ) -> Self {
        providers.sort_by_key(|p| p.capability());
        Self {
            providers,
            throttle,
            max_parallels: max_parallels.max(1),
        }
    }

    /// 根据配置构建检索链，缺少凭据的后端不会加入
    pub fn from_config(config: &SearchConfig) -> Result<Self, SearchError> {
        let http = reqwest::Client::builder()
            .user_agent(config.user_agent.clone())
            .timeout(Duration::from_secs(config.request_timeout_seconds))
            .build()
            .map_err(|e| SearchError::Client(e.to_string()))?;

        let mut providers: Vec<Box<dyn SearchProvider>> = Vec::new();

        match (&config.google_api_key, &config.google_engine_id) {
            (Some(key), Some(engine_id)) => providers.push(Box::new(GoogleSearch::new(
                http.clone(),
                key.clone(),
                engine_id.clone(),
                config.max_results_per_query,
            ))),
            _ => debug!("Google Custom Search未配置，跳过"),
        }

        match &config.brave_api_key {
            Some(key) => providers.push(Box::new(BraveSearch::new(
                http.clone(),
                key.clone(),
                config.max_results_per_query,
            ))),
            None => debug!("Brave Search未配置，跳过"),
        }

        if config.enable_scrape_fallback {
            providers.push(Box::new(DuckDuckGoScraper::new(
                http,
                config.scrape_augmentation.clone(),
                config.max_results_per_query,
            )));
        }

        if providers.is_empty() {
            return Err(SearchError::NoProviders);
        }

        let client = Self::new(
            providers,
            Duration::from_millis(config.throttle_ms),
            config.max_parallels,
        );
        info!("🔎 检索链: {}", client.provider_names().join(" → "));
        Ok(client)
    }

    pub fn provider_names(&self) -> Vec<&'static str> {
        self.providers.iter().map(|p| p.name()).collect()
    }

    /// 逐主题检索，结果标记为详细检索
    pub async fn search(&self, topics: &[String]) -> SearchResults {
        self.search_with_source(topics, SearchSource::Detailed).await
    }

    /// 逐主题检索，每个不同主题恰好对应一条记录，顺序与输入一致
    pub async fn search_with_source(&self, topics: &[String], source: SearchSource) -> SearchResults {
        let mut distinct: Vec<&str> = Vec::with_capacity(topics.len());
        for topic in topics {
            if !distinct.contains(&topic.as_str()) {
                distinct.push(topic.as_str());
            }
        }

        let texts: Vec<(&str, String)> = stream::iter(distinct)
            .map(|topic| async move {
                let text = match self.query_chain(topic).await {
                    Ok(text) => text,
                    Err(e) => {
                        warn!("⚠️ 主题检索失败 '{}': {}", topic, e);
                        no_results_placeholder(topic)
                    }
                };
                self.pause().await;
                (topic, text)
            })
            .buffered(self.max_parallels)
            .collect()
            .await;

        let mut results = SearchResults::new();
        for (topic, text) in texts {
            results.insert(source, topic, text);
        }
        results
    }

    /// 限定站点的检索
    pub async fn search_domain(&self, query: &str, domain: &str) -> Result<String, SearchError> {
        let scoped = format!("{} site:{}", query, domain);
        let result = self.query_chain(&scoped).await;
        self.pause().await;
        result
    }

    async fn pause(&self) {
        if !self.throttle.is_zero() {
            tokio::time::sleep(self.throttle).await;
        }
    }

    /// 依次尝试各个后端，返回第一个成功的结果
    async fn query_chain(&self, query: &str) -> Result<String, SearchError> {
        if self.providers.is_empty() {
            return Err(SearchError::NoProviders);
        }

        let mut errors = Vec::new();
        for provider in &self.providers {
            match provider.search(query).await {
                Ok(text) if !text.trim().is_empty() => {
                    debug!("{} 返回结果: {}", provider.name(), query);
                    return Ok(text);
                }
                Ok(_) => errors.push(SearchError::NoResults {
                    provider: provider.name(),
                }),
                Err(e) => {
                    debug!("{} 检索失败，尝试下一个后端: {}", provider.name(), e);
                    errors.push(e);
                }
            }
        }
        Err(SearchError::Exhausted(errors))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    /// 记录收到的查询，并按规则返回结果的测试后端
    struct FakeProvider {
        name: &'static str,
        capability: ProviderCapability,
        fail_on: Vec<&'static str>,
        seen: Arc<Mutex<Vec<String>>>,
    }

    impl FakeProvider {
        fn new(name: &'static str, capability: ProviderCapability) -> Self {
            Self {
                name,
                capability,
                fail_on: Vec::new(),
                seen: Arc::new(Mutex::new(Vec::new())),
            }
        }

        fn failing_on(mut self, fragments: &[&'static str]) -> Self {
            self.fail_on = fragments.to_vec();
            self
        }
    }

    #[async_trait]
    impl SearchProvider for FakeProvider {
        fn name(&self) -> &'static str {
            self.name
        }

        fn capability(&self) -> ProviderCapability {
            self.capability
        }

        async fn search(&self, query: &str) -> Result<String, SearchError> {
            self.seen.lock().unwrap().push(query.to_string());
            if self.fail_on.iter().any(|f| *f == "*" || query.contains(f)) {
                return Err(SearchError::Status {
                    provider: self.name,
                    status: 503,
                });
            }
            Ok(format!("{} result for {}", self.name, query))
        }
    }

    fn topics(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[tokio::test]
    async fn test_search_one_entry_per_topic_in_order() {
        let client = RetrievalClient::new(
            vec![Box::new(FakeProvider::new("primary", ProviderCapability::StructuredPrimary))],
            Duration::ZERO,
            1,
        );

        let results = client.search(&topics(&["b", "a", "c"])).await;

        let keys: Vec<_> = results.keys().collect();
        assert_eq!(keys, vec!["b", "a", "c"]);
        assert_eq!(results.count_by(SearchSource::Detailed), 3);
        assert_eq!(results.get("a"), Some("primary result for a"));
    }

    #[tokio::test]
    async fn test_search_deduplicates_topics() {
        let client = RetrievalClient::new(
            vec![Box::new(FakeProvider::new("primary", ProviderCapability::StructuredPrimary))],
            Duration::ZERO,
            1,
        );

        let results = client.search(&topics(&["x", "y", "x"])).await;
        assert_eq!(results.len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_sequential_search_is_throttled() {
        let client = RetrievalClient::new(
            vec![Box::new(FakeProvider::new("primary", ProviderCapability::StructuredPrimary))],
            Duration::from_millis(1000),
            1,
        );
        let started = tokio::time::Instant::now();

        let results = client.search(&topics(&["a", "b", "c"])).await;

        assert_eq!(results.len(), 3);
        assert!(started.elapsed() >= Duration::from_millis(3000));
    }

    #[tokio::test(start_paused = true)]
    async fn test_search_domain_is_throttled() {
        let client = RetrievalClient::new(
            vec![Box::new(FakeProvider::new("primary", ProviderCapability::StructuredPrimary))],
            Duration::from_millis(1000),
            1,
        );
        let started = tokio::time::Instant::now();

        client.search_domain("比較級", "mext.go.jp").await.unwrap();
        client.search_domain("比較級", "nier.go.jp").await.unwrap();

        assert!(started.elapsed() >= Duration::from_millis(2000));
    }

    #[tokio::test]
    async fn test_chain_falls_through_in_capability_order() {
        let primary = FakeProvider::new("google", ProviderCapability::StructuredPrimary)
            .failing_on(&["fail"]);
        let scrape = FakeProvider::new("duckduckgo", ProviderCapability::ScrapeFallback);
        let scrape_seen = scrape.seen.clone();
        // 传入顺序与能力顺序相反
        let client = RetrievalClient::new(vec![Box::new(scrape), Box::new(primary)], Duration::ZERO, 1);

        assert_eq!(client.provider_names(), vec!["google", "duckduckgo"]);

        let results = client.search(&topics(&["ok", "fail here"])).await;

        assert_eq!(results.get("ok"), Some("google result for ok"));
        assert_eq!(
            results.get("fail here"),
            Some("duckduckgo result for fail here")
        );
        assert_eq!(scrape_seen.lock().unwrap().as_slice(), ["fail here"]);
    }

    #[tokio::test]
    async fn test_failed_topic_gets_placeholder() {
        let client = RetrievalClient::new(
            vec![Box::new(
                FakeProvider::new("google", ProviderCapability::StructuredPrimary).failing_on(&["bad"]),
            )],
            Duration::ZERO,
            1,
        );

        let results = client.search(&topics(&["good", "bad"])).await;

        assert_eq!(results.len(), 2);
        assert_eq!(results.get("bad"), Some("No results found for 'bad'."));
        assert_eq!(results.get("good"), Some("google result for good"));
    }

    #[tokio::test]
    async fn test_parallel_search_preserves_order() {
        let client = RetrievalClient::new(
            vec![Box::new(FakeProvider::new("primary", ProviderCapability::StructuredPrimary))],
            Duration::ZERO,
            4,
        );
        let input: Vec<String> = (0..8).map(|i| format!("topic {}", i)).collect();

        let results = client.search(&input).await;

        let keys: Vec<_> = results.keys().map(|k| k.to_string()).collect();
        assert_eq!(keys, input);
    }

    #[tokio::test]
    async fn test_search_with_source_tags_records() {
        let client = RetrievalClient::new(
            vec![Box::new(FakeProvider::new("primary", ProviderCapability::StructuredPrimary))],
            Duration::ZERO,
            1,
        );

        let results = client
            .search_with_source(&topics(&["refined"]), SearchSource::General)
            .await;

        assert_eq!(results.count_by(SearchSource::General), 1);
        assert_eq!(results.count_by(SearchSource::Detailed), 0);
    }

    #[tokio::test]
    async fn test_search_domain_appends_site_filter() {
        let provider = FakeProvider::new("google", ProviderCapability::StructuredPrimary);
        let seen = provider.seen.clone();
        let client = RetrievalClient::new(vec![Box::new(provider)], Duration::ZERO, 1);

        let text = client.search_domain("比較級", "mext.go.jp").await.unwrap();

        assert_eq!(text, "google result for 比較級 site:mext.go.jp");
        assert_eq!(seen.lock().unwrap().as_slice(), ["比較級 site:mext.go.jp"]);
    }

    #[tokio::test]
    async fn test_search_domain_reports_exhausted_chain() {
        let client = RetrievalClient::new(
            vec![
                Box::new(FakeProvider::new("google", ProviderCapability::StructuredPrimary).failing_on(&["*"])),
                Box::new(FakeProvider::new("brave", ProviderCapability::StructuredSecondary).failing_on(&["*"])),
            ],
            Duration::ZERO,
            1,
        );

        let err = client.search_domain("q", "nier.go.jp").await.unwrap_err();

        match &err {
            SearchError::Exhausted(errors) => assert_eq!(errors.len(), 2),
            other => panic!("unexpected error: {other:?}"),
        }
        let message = err.to_string();
        assert!(message.contains("google: unexpected HTTP status 503"));
        assert!(message.contains("brave: unexpected HTTP status 503"));
    }

    #[tokio::test]
    async fn test_empty_chain() {
        let client = RetrievalClient::new(Vec::new(), Duration::ZERO, 1);

        let results = client.search(&topics(&["t"])).await;
        assert_eq!(results.get("t"), Some("No results found for 't'."));
        assert!(matches!(
            client.search_domain("t", "mext.go.jp").await,
            Err(SearchError::NoProviders)
        ));
    }

    #[test]
    fn test_from_config_skips_providers_without_credentials() {
        let config = SearchConfig::default();
        let client = RetrievalClient::from_config(&config).unwrap();
        assert_eq!(client.provider_names(), vec!["duckduckgo"]);

        let config = SearchConfig {
            google_api_key: Some("key".to_string()),
            google_engine_id: Some("cx".to_string()),
            brave_api_key: Some("brave".to_string()),
            ..Default::default()
        };
        let client = RetrievalClient::from_config(&config).unwrap();
        assert_eq!(client.provider_names(), vec!["google", "brave", "duckduckgo"]);
    }

    #[test]
    fn test_from_config_without_any_provider() {
        let config = SearchConfig {
            enable_scrape_fallback: false,
            ..Default::default()
        };
        assert!(matches!(
            RetrievalClient::from_config(&config),
            Err(SearchError::NoProviders)
        ));
    }
}
