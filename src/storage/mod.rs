mod local_cache;
mod local_store;
mod posts;
mod schema;
mod types;

pub use local_cache::{
    CacheEntry, CachePolicy, LocalCache, ARTICLE_CACHE_KEY, DEFAULT_CAPACITY, DEFAULT_TTL_HOURS,
    SUMMARY_CACHE_KEY,
};
pub use schema::{Database, DEFAULT_STORAGE_QUOTA_BYTES};
pub use types::{DatabaseError, Post, PostSource, PostStatus, StorageError, UnknownStatus};
