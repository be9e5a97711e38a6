//! AI summaries (TL;DR, key points, recommendation) for swipe cards.
//!
//! [`SummaryFetcher`] never fails: a cache hit returns immediately, a miss
//! issues one request, and any failure collapses to
//! [`SummaryLookup::Unavailable`]. Concurrent lookups for the same URL share
//! one in-flight request.
use async_trait::async_trait;
use futures::future::{BoxFuture, FutureExt, Shared};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex as StdMutex, PoisonError};
use tokio::sync::Mutex;

use super::http::{send_json, ContentError};
use crate::storage::LocalCache;
use crate::util::{validate_service_url, validate_url};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecommendationScore {
    High,
    Medium,
    Low,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Recommendation {
    pub score: RecommendationScore,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SummaryRecord {
    pub tldr: String,
    #[serde(default)]
    pub key_points: Vec<String>,
    #[serde(default)]
    pub recommendation: Option<Recommendation>,
    /// Estimated reading time in minutes.
    #[serde(default)]
    pub reading_time: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SummaryLookup {
    Ready(SummaryRecord),
    Unavailable,
}

impl SummaryLookup {
    pub fn record(&self) -> Option<&SummaryRecord> {
        match self {
            SummaryLookup::Ready(record) => Some(record),
            SummaryLookup::Unavailable => None,
        }
    }
}

/// Source of summaries. Swap in [`NoSummaries`] to disable the feature.
#[async_trait]
pub trait SummaryProvider: Send + Sync {
    async fn fetch_summary(&self, url: &str) -> Result<SummaryRecord, ContentError>;
}

/// Provider used when no summary service is configured.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoSummaries;

#[async_trait]
impl SummaryProvider for NoSummaries {
    async fn fetch_summary(&self, _url: &str) -> Result<SummaryRecord, ContentError> {
        Err(ContentError::NotConfigured)
    }
}

/// Summary service client: `GET /api/summary?url=<url>&interests=<...>`.
pub struct HttpSummaryProvider {
    client: reqwest::Client,
    endpoint: String,
    interests: Option<String>,
}

impl HttpSummaryProvider {
    pub fn new(
        client: reqwest::Client,
        base_url: &str,
        interests: Option<String>,
    ) -> Result<Self, ContentError> {
        let base = validate_service_url(base_url).map_err(|e| {
            tracing::error!(base_url, error = %e, "Rejecting summary service URL");
            ContentError::InsecureBaseUrl
        })?;
        Ok(Self {
            client,
            endpoint: format!("{}/api/summary", base.as_str().trim_end_matches('/')),
            interests: interests.filter(|s| !s.trim().is_empty()),
        })
    }
}

#[async_trait]
impl SummaryProvider for HttpSummaryProvider {
    async fn fetch_summary(&self, url: &str) -> Result<SummaryRecord, ContentError> {
        validate_url(url).map_err(|_| ContentError::InvalidUrl)?;

        let mut request = self.client.get(&self.endpoint).query(&[("url", url)]);
        if let Some(interests) = &self.interests {
            request = request.query(&[("interests", interests.as_str())]);
        }
        send_json(request).await
    }
}

/// Shared handle to the summary cache.
pub type SummaryCache = Arc<Mutex<LocalCache<SummaryRecord>>>;

type InFlight = Shared<BoxFuture<'static, SummaryLookup>>;

#[derive(Clone)]
pub struct SummaryFetcher {
    provider: Arc<dyn SummaryProvider>,
    cache: SummaryCache,
    in_flight: Arc<StdMutex<HashMap<String, InFlight>>>,
}

impl SummaryFetcher {
    pub fn new(provider: Arc<dyn SummaryProvider>, cache: SummaryCache) -> Self {
        Self {
            provider,
            cache,
            in_flight: Arc::new(StdMutex::new(HashMap::new())),
        }
    }

    /// Cached summary only, no network.
    pub async fn cached(&self, url: &str) -> Option<SummaryRecord> {
        self.cache.lock().await.get(url).await
    }

    /// Resolve the summary for `url`: cache, then one request. Never errors.
    pub async fn get_summary(&self, url: &str) -> SummaryLookup {
        if let Some(record) = self.cached(url).await {
            tracing::debug!(url, "Summary cache hit");
            return SummaryLookup::Ready(record);
        }

        let request = {
            let mut in_flight = self.in_flight.lock().unwrap_or_else(PoisonError::into_inner);
            match in_flight.get(url) {
                Some(existing) => {
                    tracing::debug!(url, "Joining in-flight summary request");
                    existing.clone()
                }
                None => {
                    let request = self.request(url.to_string()).boxed().shared();
                    in_flight.insert(url.to_string(), request.clone());
                    request
                }
            }
        };

        request.await
    }

    fn request(&self, url: String) -> impl Future<Output = SummaryLookup> + Send + 'static {
        let provider = Arc::clone(&self.provider);
        let cache = Arc::clone(&self.cache);
        let in_flight = Arc::clone(&self.in_flight);

        async move {
            let lookup = match provider.fetch_summary(&url).await {
                Ok(record) => {
                    cache.lock().await.put(&url, record.clone()).await;
                    SummaryLookup::Ready(record)
                }
                Err(ContentError::NotConfigured) => SummaryLookup::Unavailable,
                Err(e) => {
                    tracing::warn!(url = %url, error = %e, "Summary unavailable");
                    SummaryLookup::Unavailable
                }
            };

            in_flight
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .remove(&url);
            lookup
        }
    }
}
