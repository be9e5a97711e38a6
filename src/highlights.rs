//! Per-article text highlights, local first with a cloud mirror.
//!
//! All highlights live in one JSON document under `articleHighlights`,
//! keyed by article URL. Positions are unique per article.
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

use crate::storage::{Database, StorageError};
use crate::sync::{CloudSync, SyncError};
use crate::util::Clock;

/// Logical storage key for the highlight document.
pub const HIGHLIGHTS_KEY: &str = "articleHighlights";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Highlight {
    pub article_url: String,
    pub text: String,
    /// Character offset of the highlight in the article text.
    pub position: u64,
    /// Unix milliseconds.
    pub timestamp: i64,
}

/// What a cloud merge changed locally.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MergeReport {
    pub added: usize,
    pub replaced: usize,
}

/// Merge `remote` into `local` for one article.
///
/// Union keyed by position. When both sides hold a position, the newer
/// timestamp wins; ties keep the local entry. Result is sorted by position.
pub fn merge_highlights(local: &mut Vec<Highlight>, remote: Vec<Highlight>) -> MergeReport {
    let mut report = MergeReport::default();
    for incoming in remote {
        match local.iter_mut().find(|h| h.position == incoming.position) {
            Some(existing) if incoming.timestamp > existing.timestamp => {
                if *existing != incoming {
                    *existing = incoming;
                    report.replaced += 1;
                }
            }
            Some(_) => {}
            None => {
                local.push(incoming);
                report.added += 1;
            }
        }
    }
    local.sort_by_key(|h| h.position);
    report
}

pub struct HighlightStore {
    db: Database,
    entries: BTreeMap<String, Vec<Highlight>>,
    clock: Arc<dyn Clock>,
    sync: CloudSync,
}

impl HighlightStore {
    /// Load the highlight document. Malformed or unreadable data starts empty.
    pub async fn load(db: Database, clock: Arc<dyn Clock>, sync: CloudSync) -> Self {
        let entries = match db.store_get(HIGHLIGHTS_KEY).await {
            Ok(Some(raw)) => serde_json::from_str(&raw).unwrap_or_else(|e| {
                tracing::warn!(error = %e, "Malformed highlight data, starting empty");
                BTreeMap::new()
            }),
            Ok(None) => BTreeMap::new(),
            Err(e) => {
                tracing::warn!(error = %e, "Failed to read highlights, starting empty");
                BTreeMap::new()
            }
        };
        Self {
            db,
            entries,
            clock,
            sync,
        }
    }

    pub fn for_article(&self, article_url: &str) -> &[Highlight] {
        self.entries
            .get(article_url)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    /// URLs with at least one highlight (the `highlights` deck).
    pub fn highlighted_articles(&self) -> HashSet<String> {
        self.entries
            .iter()
            .filter(|(_, list)| !list.is_empty())
            .map(|(url, _)| url.clone())
            .collect()
    }

    /// Record a highlight and mirror it. A highlight already at `position`
    /// is replaced.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError`] if the document cannot be saved. The in-memory
    /// highlights are rolled back and nothing is mirrored.
    pub async fn add(
        &mut self,
        article_url: &str,
        text: &str,
        position: u64,
    ) -> Result<Highlight, StorageError> {
        let highlight = Highlight {
            article_url: article_url.to_string(),
            text: text.to_string(),
            position,
            timestamp: self.clock.now_ms(),
        };

        let previous = self.entries.clone();
        let list = self.entries.entry(article_url.to_string()).or_default();
        list.retain(|h| h.position != position);
        list.push(highlight.clone());
        list.sort_by_key(|h| h.position);

        if let Err(e) = self.persist().await {
            self.entries = previous;
            return Err(e);
        }

        tracing::debug!(article_url, position, "Highlight added");
        self.sync.mirror_highlight_added(&highlight);
        Ok(highlight)
    }

    /// Remove the highlight at `position`. `Ok(None)` when there was none.
    pub async fn remove(
        &mut self,
        article_url: &str,
        position: u64,
    ) -> Result<Option<Highlight>, StorageError> {
        let Some(list) = self.entries.get(article_url) else {
            return Ok(None);
        };
        let Some(index) = list.iter().position(|h| h.position == position) else {
            return Ok(None);
        };

        let previous = self.entries.clone();
        let removed = self.take(article_url, index);
        if let Err(e) = self.persist().await {
            self.entries = previous;
            return Err(e);
        }

        tracing::debug!(article_url, position, "Highlight removed");
        self.sync
            .mirror_highlight_removed(&removed.article_url, &removed.text);
        Ok(Some(removed))
    }

    fn take(&mut self, article_url: &str, index: usize) -> Highlight {
        let list = self.entries.entry(article_url.to_string()).or_default();
        let removed = list.remove(index);
        if list.is_empty() {
            self.entries.remove(article_url);
        }
        removed
    }

    /// Pull the user's cloud highlights and merge them in per article.
    pub async fn merge_from_cloud(&mut self) -> Result<MergeReport, SyncError> {
        let remote = self.sync.pull_highlights().await?;

        let mut grouped: BTreeMap<String, Vec<Highlight>> = BTreeMap::new();
        for highlight in remote {
            grouped
                .entry(highlight.article_url.clone())
                .or_default()
                .push(highlight);
        }

        let previous = self.entries.clone();
        let mut report = MergeReport::default();
        for (url, incoming) in grouped {
            let merged = merge_highlights(self.entries.entry(url).or_default(), incoming);
            report.added += merged.added;
            report.replaced += merged.replaced;
        }
        self.entries.retain(|_, list| !list.is_empty());

        if report != MergeReport::default() {
            if let Err(e) = self.persist().await {
                self.entries = previous;
                return Err(e.into());
            }
        }

        tracing::info!(added = report.added, replaced = report.replaced, "Merged cloud highlights");
        Ok(report)
    }

    async fn persist(&self) -> Result<(), StorageError> {
        let raw = serde_json::to_string(&self.entries).map_err(|source| StorageError::Serialize {
            key: HIGHLIGHTS_KEY.to_string(),
            source,
        })?;
        self.db.store_put(HIGHLIGHTS_KEY, &raw).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::util::{ManualClock, SystemClock};
    use chrono::{TimeZone, Utc};
    use pretty_assertions::assert_eq;

    fn highlight(position: u64, text: &str, timestamp: i64) -> Highlight {
        Highlight {
            article_url: "https://blog.example.com/a".to_string(),
            text: text.to_string(),
            position,
            timestamp,
        }
    }

    async fn store() -> (HighlightStore, Database) {
        let db = Database::open(":memory:").await.unwrap();
        let store = HighlightStore::load(db.clone(), Arc::new(SystemClock), CloudSync::disabled()).await;
        (store, db)
    }

    #[test]
    fn test_merge_keeps_local_only_entries() {
        let mut local = vec![highlight(5, "local", 100)];
        let report = merge_highlights(&mut local, vec![highlight(9, "remote", 50)]);
        assert_eq!(local, vec![highlight(5, "local", 100), highlight(9, "remote", 50)]);
        assert_eq!(report, MergeReport { added: 1, replaced: 0 });
    }

    #[test]
    fn test_merge_newer_timestamp_wins() {
        let mut local = vec![highlight(5, "old", 100), highlight(7, "fresh", 300)];
        let report = merge_highlights(
            &mut local,
            vec![highlight(5, "new", 200), highlight(7, "stale", 100)],
        );
        assert_eq!(local, vec![highlight(5, "new", 200), highlight(7, "fresh", 300)]);
        assert_eq!(report, MergeReport { added: 0, replaced: 1 });
    }

    #[tokio::test]
    async fn test_add_persists_and_reloads() {
        let (mut store, db) = store().await;
        store.add("https://blog.example.com/a", "second", 20).await.unwrap();
        store.add("https://blog.example.com/a", "first", 3).await.unwrap();

        let reloaded = HighlightStore::load(db, Arc::new(SystemClock), CloudSync::disabled()).await;
        let texts: Vec<_> = reloaded
            .for_article("https://blog.example.com/a")
            .iter()
            .map(|h| h.text.as_str())
            .collect();
        assert_eq!(texts, vec!["first", "second"]);
    }

    #[tokio::test]
    async fn test_add_same_position_replaces() {
        let clock = ManualClock::new(Utc.timestamp_opt(1_700_000_000, 0).unwrap());
        let db = Database::open(":memory:").await.unwrap();
        let mut store = HighlightStore::load(db, Arc::new(clock.clone()), CloudSync::disabled()).await;

        store.add("https://a", "one", 4).await.unwrap();
        clock.advance(chrono::Duration::seconds(1));
        store.add("https://a", "two", 4).await.unwrap();

        assert_eq!(store.for_article("https://a").len(), 1);
        assert_eq!(store.for_article("https://a")[0].text, "two");
    }

    #[tokio::test]
    async fn test_remove_last_clears_article() {
        let (mut store, _db) = store().await;
        store.add("https://a", "x", 1).await.unwrap();
        assert!(store.highlighted_articles().contains("https://a"));

        let removed = store.remove("https://a", 1).await.unwrap();
        assert_eq!(removed.map(|h| h.text), Some("x".to_string()));
        assert!(store.highlighted_articles().is_empty());
        assert_eq!(store.remove("https://a", 1).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_malformed_document_loads_empty() {
        let db = Database::open(":memory:").await.unwrap();
        db.store_put(HIGHLIGHTS_KEY, "[not json").await.unwrap();
        let store = HighlightStore::load(db, Arc::new(SystemClock), CloudSync::disabled()).await;
        assert!(store.highlighted_articles().is_empty());
    }

    #[tokio::test]
    async fn test_failed_persist_rolls_back() {
        let db = Database::open(":memory:").await.unwrap().with_storage_quota(16);
        let mut store = HighlightStore::load(db, Arc::new(SystemClock), CloudSync::disabled()).await;

        let err = store.add("https://blog.example.com/a", "too long to fit", 1).await;
        assert!(matches!(err, Err(StorageError::QuotaExceeded { .. })));
        assert!(store.for_article("https://blog.example.com/a").is_empty());
    }

    #[tokio::test]
    async fn test_merge_requires_sign_in() {
        let (mut store, _db) = store().await;
        assert!(matches!(
            store.merge_from_cloud().await,
            Err(SyncError::NotAuthenticated)
        ));
    }
}
