use anyhow::Result;
use sqlx::QueryBuilder;

use super::schema::Database;
use super::types::{Post, PostRow, PostStatus};

impl Database {
    // ========================================================================
    // Post Operations
    // ========================================================================

    /// Insert posts that are not yet known. Returns the number inserted.
    ///
    /// Existing posts keep their status; only title, blog name and date are
    /// refreshed from the incoming data. Batches of 50 keep us well under
    /// SQLite's bind-parameter limit.
    pub async fn upsert_posts(&self, posts: &[Post]) -> Result<usize> {
        if posts.is_empty() {
            return Ok(0);
        }

        let mut tx = self.pool.begin().await?;
        let mut inserted = 0usize;

        const BATCH_SIZE: usize = 50;
        for chunk in posts.chunks(BATCH_SIZE) {
            let mut builder: QueryBuilder<sqlx::Sqlite> = QueryBuilder::new(
                "INSERT OR IGNORE INTO posts (link, title, blog_name, date, status, source) ",
            );
            builder.push_values(chunk, |mut b, post| {
                b.push_bind(&post.link)
                    .push_bind(&post.title)
                    .push_bind(&post.blog_name)
                    .push_bind(post.date)
                    .push_bind(post.status.as_str())
                    .push_bind(post.source.as_str());
            });
            builder.build().execute(&mut *tx).await?;

            let changes: (i64,) = sqlx::query_as("SELECT changes()")
                .fetch_one(&mut *tx)
                .await?;
            inserted += changes.0 as usize;

            for post in chunk {
                sqlx::query("UPDATE posts SET title = ?, blog_name = ?, date = ? WHERE link = ?")
                    .bind(&post.title)
                    .bind(&post.blog_name)
                    .bind(post.date)
                    .bind(&post.link)
                    .execute(&mut *tx)
                    .await?;
            }
        }

        tx.commit().await?;
        Ok(inserted)
    }

    /// All posts, newest first. Undated posts sort last in insertion order.
    pub async fn get_posts(&self) -> Result<Vec<Post>> {
        let rows: Vec<PostRow> = sqlx::query_as(
            r#"
            SELECT link, title, blog_name, date, status, source
            FROM posts
            ORDER BY date IS NULL, date DESC, seq ASC
        "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(PostRow::into_post).collect())
    }

    /// Record a local status change made at `updated_at` (unix ms).
    ///
    /// Returns false if no post has this link.
    pub async fn set_post_status(
        &self,
        link: &str,
        status: PostStatus,
        updated_at: i64,
    ) -> Result<bool> {
        let result = sqlx::query("UPDATE posts SET status = ?, updated_at = ? WHERE link = ?")
            .bind(status.as_str())
            .bind(updated_at)
            .bind(link)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Apply a status coming from the cloud mirror, last writer wins.
    ///
    /// The row is only touched when the remote edit is strictly newer than
    /// the local one. Returns true if the status was applied.
    pub async fn apply_remote_status(
        &self,
        link: &str,
        status: PostStatus,
        updated_at: i64,
    ) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE posts SET status = ?, updated_at = ? WHERE link = ? AND updated_at < ?",
        )
        .bind(status.as_str())
        .bind(updated_at)
        .bind(link)
        .bind(updated_at)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }
}
