//! Article bodies and AI summaries from the backend services.
//!
//! - [`article`] - readable article extraction, cached for 24 hours
//! - [`summary`] - TL;DR and recommendation per article, cached and deduplicated
//! - [`http`] - shared client, timeouts, size limits and error mapping

mod article;
mod http;
mod summary;

pub use article::{Article, ArticleCache, ArticleFetcher, CachedArticle};
pub use http::{build_client, ContentError};
pub(crate) use http::{send_json, send_text};
pub use summary::{
    HttpSummaryProvider, NoSummaries, Recommendation, RecommendationScore, SummaryCache,
    SummaryFetcher, SummaryLookup, SummaryProvider, SummaryRecord,
};
