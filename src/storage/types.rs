use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

// ============================================================================
// Error Types
// ============================================================================

/// Database-specific errors with user-friendly messages
#[derive(Debug, Error)]
pub enum DatabaseError {
    /// Another blogdeck process has the database locked
    #[error("Another instance of blogdeck appears to be running. Please close it and try again.")]
    InstanceLocked,

    /// Migration failed
    #[error("Database migration failed: {0}")]
    Migration(String),

    /// Generic database error
    #[error("Database error: {0}")]
    Other(#[from] sqlx::Error),
}

impl DatabaseError {
    /// Check if a sqlx error indicates database locking
    pub(crate) fn from_sqlx(err: sqlx::Error) -> Self {
        let error_string = err.to_string().to_lowercase();

        // SQLITE_BUSY (5), SQLITE_LOCKED (6), SQLITE_CANTOPEN (14)
        if error_string.contains("database is locked")
            || error_string.contains("database table is locked")
            || error_string.contains("sqlite_busy")
            || error_string.contains("sqlite_locked")
            || error_string.contains("unable to open database file")
        {
            return DatabaseError::InstanceLocked;
        }

        DatabaseError::Other(err)
    }
}

/// Errors from the on-device key-value store.
#[derive(Debug, Error)]
pub enum StorageError {
    /// Writing the value would push the store past its byte quota.
    #[error("Storage quota exceeded writing '{key}' ({size} bytes, quota {quota} bytes)")]
    QuotaExceeded { key: String, size: u64, quota: u64 },

    #[error("Failed to serialize '{key}': {source}")]
    Serialize {
        key: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("Storage backend error: {0}")]
    Backend(#[from] sqlx::Error),
}

// ============================================================================
// Post Model
// ============================================================================

/// Triage status of a post. Every post carries exactly one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PostStatus {
    Inbox,
    Pending,
    Cleared,
    Favorite,
}

impl PostStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            PostStatus::Inbox => "inbox",
            PostStatus::Pending => "pending",
            PostStatus::Cleared => "cleared",
            PostStatus::Favorite => "favorite",
        }
    }
}

impl fmt::Display for PostStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error)]
#[error("Unknown post status: {0}")]
pub struct UnknownStatus(pub String);

impl FromStr for PostStatus {
    type Err = UnknownStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "inbox" => Ok(PostStatus::Inbox),
            "pending" => Ok(PostStatus::Pending),
            "cleared" => Ok(PostStatus::Cleared),
            "favorite" => Ok(PostStatus::Favorite),
            other => Err(UnknownStatus(other.to_string())),
        }
    }
}

/// Where a post came from. Tweets get their own list deck.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PostSource {
    #[default]
    Blog,
    Twitter,
}

impl PostSource {
    pub fn as_str(self) -> &'static str {
        match self {
            PostSource::Blog => "blog",
            PostSource::Twitter => "twitter",
        }
    }

    /// Lenient parse for rows written by older versions; unknown values fall back to blog.
    pub(crate) fn from_db(s: &str) -> Self {
        match s {
            "twitter" => PostSource::Twitter,
            _ => PostSource::Blog,
        }
    }
}

/// A post in the triage collection. `link` is the unique id and doubles as
/// the article URL handed to the extraction and summary services.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Post {
    pub link: String,
    pub title: String,
    pub blog_name: String,
    /// Publication time, unix seconds.
    pub date: Option<i64>,
    pub status: PostStatus,
    #[serde(default)]
    pub source: PostSource,
}

impl Post {
    /// New blog post in the inbox.
    pub fn new(link: impl Into<String>, title: impl Into<String>, blog_name: impl Into<String>) -> Self {
        Self {
            link: link.into(),
            title: title.into(),
            blog_name: blog_name.into(),
            date: None,
            status: PostStatus::Inbox,
            source: PostSource::Blog,
        }
    }
}

/// Internal row type for post queries
#[derive(Debug, sqlx::FromRow)]
pub(crate) struct PostRow {
    pub link: String,
    pub title: String,
    pub blog_name: String,
    pub date: Option<i64>,
    pub status: String,
    pub source: String,
}

impl PostRow {
    /// Rows with an unrecognised status are treated as inbox rather than dropped.
    pub(crate) fn into_post(self) -> Post {
        let status = self.status.parse().unwrap_or_else(|e: UnknownStatus| {
            tracing::warn!(link = %self.link, error = %e, "Unrecognised status in database, treating as inbox");
            PostStatus::Inbox
        });
        Post {
            source: PostSource::from_db(&self.source),
            link: self.link,
            title: self.title,
            blog_name: self.blog_name,
            date: self.date,
            status,
        }
    }
}
