use super::schema::Database;
use super::types::StorageError;

impl Database {
    // ========================================================================
    // Key-Value Store Operations
    // ========================================================================

    /// Get the raw value stored under `key`.
    pub async fn store_get(&self, key: &str) -> Result<Option<String>, StorageError> {
        let row: Option<(String,)> = sqlx::query_as("SELECT value FROM local_store WHERE key = ?")
            .bind(key)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.map(|(value,)| value))
    }

    /// Store `value` under `key`, replacing any previous value.
    ///
    /// The store enforces a byte quota across all keys. A write that would
    /// exceed it fails with [`StorageError::QuotaExceeded`] and leaves the
    /// previous value in place.
    ///
    /// # Errors
    ///
    /// - [`StorageError::QuotaExceeded`] if the write would exceed the quota
    /// - [`StorageError::Backend`] for SQLite failures
    pub async fn store_put(&self, key: &str, value: &str) -> Result<(), StorageError> {
        let mut tx = self.pool.begin().await?;

        let (others,): (i64,) = sqlx::query_as(
            "SELECT COALESCE(SUM(LENGTH(CAST(value AS BLOB))), 0) FROM local_store WHERE key != ?",
        )
        .bind(key)
        .fetch_one(&mut *tx)
        .await?;

        let size = value.len() as u64;
        if (others.max(0) as u64).saturating_add(size) > self.quota_bytes {
            return Err(StorageError::QuotaExceeded {
                key: key.to_string(),
                size,
                quota: self.quota_bytes,
            });
        }

        sqlx::query(
            r#"
            INSERT INTO local_store (key, value, updated_at)
            VALUES (?, ?, datetime('now'))
            ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at
        "#,
        )
        .bind(key)
        .bind(value)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(())
    }

    /// Remove `key` from the store. Returns true if a value was removed.
    pub async fn store_remove(&self, key: &str) -> Result<bool, StorageError> {
        let result = sqlx::query("DELETE FROM local_store WHERE key = ?")
            .bind(key)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Total bytes currently held by the store.
    pub async fn store_usage(&self) -> Result<u64, StorageError> {
        let (bytes,): (i64,) =
            sqlx::query_as("SELECT COALESCE(SUM(LENGTH(CAST(value AS BLOB))), 0) FROM local_store")
                .fetch_one(&self.pool)
                .await?;

        Ok(bytes.max(0) as u64)
    }
}

#[cfg(test)]
mod tests {
    use crate::storage::{Database, StorageError};

    async fn test_db() -> Database {
        Database::open(":memory:").await.unwrap()
    }

    #[tokio::test]
    async fn test_get_missing_key() {
        let db = test_db().await;
        assert_eq!(db.store_get("articleCache").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_put_and_get() {
        let db = test_db().await;
        db.store_put("articleCache", "{}").await.unwrap();
        assert_eq!(
            db.store_get("articleCache").await.unwrap().as_deref(),
            Some("{}")
        );
    }

    #[tokio::test]
    async fn test_put_replaces() {
        let db = test_db().await;
        db.store_put("k", "old").await.unwrap();
        db.store_put("k", "new").await.unwrap();
        assert_eq!(db.store_get("k").await.unwrap().as_deref(), Some("new"));
        assert_eq!(db.store_usage().await.unwrap(), 3);
    }

    #[tokio::test]
    async fn test_quota_counts_other_keys() {
        let db = test_db().await.with_storage_quota(10);
        db.store_put("a", "123456").await.unwrap();

        let err = db.store_put("b", "12345").await.unwrap_err();
        assert!(matches!(err, StorageError::QuotaExceeded { size: 5, quota: 10, .. }));

        // Rewriting the same key only counts the new value
        db.store_put("a", "1234567890").await.unwrap();
    }

    #[tokio::test]
    async fn test_quota_failure_keeps_previous_value() {
        let db = test_db().await.with_storage_quota(4);
        db.store_put("k", "abc").await.unwrap();
        assert!(db.store_put("k", "abcdef").await.is_err());
        assert_eq!(db.store_get("k").await.unwrap().as_deref(), Some("abc"));
    }

    #[tokio::test]
    async fn test_remove() {
        let db = test_db().await;
        db.store_put("k", "v").await.unwrap();
        assert!(db.store_remove("k").await.unwrap());
        assert!(!db.store_remove("k").await.unwrap());
        assert_eq!(db.store_usage().await.unwrap(), 0);
    }
}
