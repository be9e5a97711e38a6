use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::Mutex;

use super::http::{send_json, ContentError};
use crate::storage::{CacheEntry, LocalCache};
use crate::util::{validate_service_url, validate_url};

/// Readable article extracted by the backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Article {
    pub title: String,
    #[serde(default)]
    pub byline: Option<String>,
    /// Sanitised article HTML.
    pub content: String,
    /// Length of the article's plain text, in characters.
    #[serde(default)]
    pub length: u64,
    #[serde(default)]
    pub site_name: Option<String>,
}

/// A cached article body with its write time.
pub type CachedArticle = CacheEntry<Article>;

/// Shared handle to the article body cache.
pub type ArticleCache = Arc<Mutex<LocalCache<Article>>>;

/// Client for the article extraction service, cache first.
#[derive(Clone)]
pub struct ArticleFetcher {
    client: reqwest::Client,
    endpoint: String,
    cache: ArticleCache,
}

impl ArticleFetcher {
    /// `base_url` is the backend root, e.g. `http://localhost:3000`.
    pub fn new(
        client: reqwest::Client,
        base_url: &str,
        cache: ArticleCache,
    ) -> Result<Self, ContentError> {
        let base = validate_service_url(base_url).map_err(|e| {
            tracing::error!(base_url, error = %e, "Rejecting article service URL");
            ContentError::InsecureBaseUrl
        })?;
        Ok(Self {
            client,
            endpoint: format!("{}/api/article", base.as_str().trim_end_matches('/')),
            cache,
        })
    }

    pub fn cache(&self) -> &ArticleCache {
        &self.cache
    }

    /// Return the readable article for `url`.
    ///
    /// Served from the local cache when fresh; otherwise fetched and written
    /// through. Failures are returned as-is for the reader's error panel.
    ///
    /// # Errors
    ///
    /// Returns [`ContentError`] if:
    /// - `url` is not a public http(s) URL ([`ContentError::InvalidUrl`])
    /// - The service does not answer within 20s ([`ContentError::Timeout`])
    /// - The service answers non-2xx ([`ContentError::Service`] carries its `message`)
    /// - The body exceeds the size limit or is not a valid article
    pub async fn fetch(&self, url: &str) -> Result<Article, ContentError> {
        validate_url(url).map_err(|_| ContentError::InvalidUrl)?;

        if let Some(article) = self.cache.lock().await.get(url).await {
            tracing::debug!(url, "Article cache hit");
            return Ok(article);
        }

        tracing::debug!(url, "Article cache miss, fetching");
        let article: Article =
            send_json(self.client.get(&self.endpoint).query(&[("url", url)])).await?;

        self.cache.lock().await.put(url, article.clone()).await;
        Ok(article)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::content::build_client;
    use crate::storage::{CachePolicy, Database, ARTICLE_CACHE_KEY};
    use crate::util::SystemClock;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const BODY: &str = r#"{
        "title": "Why Rust",
        "byline": "Ada",
        "content": "<p>Because.</p>",
        "length": 8,
        "siteName": "Ada's Blog"
    }"#;

    async fn fetcher(base: &str) -> ArticleFetcher {
        let db = Database::open(":memory:").await.unwrap();
        let cache = LocalCache::load(
            db,
            ARTICLE_CACHE_KEY,
            CachePolicy::default(),
            Arc::new(SystemClock),
        )
        .await;
        ArticleFetcher::new(build_client(), base, Arc::new(Mutex::new(cache))).unwrap()
    }

    #[tokio::test]
    async fn test_fetch_parses_and_caches() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/article"))
            .and(query_param("url", "https://blog.example.com/why-rust"))
            .respond_with(ResponseTemplate::new(200).set_body_string(BODY))
            .expect(1)
            .mount(&server)
            .await;

        let fetcher = fetcher(&server.uri()).await;
        let first = fetcher.fetch("https://blog.example.com/why-rust").await.unwrap();
        assert_eq!(first.title, "Why Rust");
        assert_eq!(first.site_name.as_deref(), Some("Ada's Blog"));

        // Second read is served from cache (mock expects exactly one call)
        let second = fetcher.fetch("https://blog.example.com/why-rust").await.unwrap();
        assert_eq!(first, second);
        assert_eq!(fetcher.cache().lock().await.len(), 1);
    }

    #[tokio::test]
    async fn test_service_error_message() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(
                ResponseTemplate::new(500).set_body_string(r#"{"message": "Failed to fetch article"}"#),
            )
            .mount(&server)
            .await;

        let fetcher = fetcher(&server.uri()).await;
        let err = fetcher.fetch("https://blog.example.com/x").await.unwrap_err();
        assert!(err.to_string().contains("Failed to fetch article"));
        assert!(fetcher.cache().lock().await.is_empty());
    }

    #[tokio::test]
    async fn test_private_article_url_rejected() {
        let fetcher = fetcher("http://127.0.0.1:9").await;
        let err = fetcher.fetch("http://10.0.0.1/post").await.unwrap_err();
        assert!(matches!(err, ContentError::InvalidUrl));
    }

    #[tokio::test]
    async fn test_insecure_base_rejected() {
        let db = Database::open(":memory:").await.unwrap();
        let cache = LocalCache::load(db, ARTICLE_CACHE_KEY, CachePolicy::default(), Arc::new(SystemClock)).await;
        let result = ArticleFetcher::new(build_client(), "http://api.example.com", Arc::new(Mutex::new(cache)));
        assert!(matches!(result, Err(ContentError::InsecureBaseUrl)));
    }
}
