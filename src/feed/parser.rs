use anyhow::{Context, Result};
use feed_rs::parser;
use url::Url;

use crate::storage::{Post, PostSource, PostStatus};

/// Parse an RSS/Atom document into inbox posts.
///
/// `blog_name` labels every post; when blank the feed's own title is used.
/// Entries without a link are skipped since the link is the post id.
///
/// # Errors
///
/// Returns an error if `bytes` is not a parseable RSS or Atom document.
pub fn parse_feed(bytes: &[u8], blog_name: &str) -> Result<Vec<Post>> {
    let feed = parser::parse(bytes).context("Failed to parse feed")?;

    let blog_name = match blog_name.trim() {
        "" => feed
            .title
            .as_ref()
            .map(|t| t.content.trim().to_string())
            .filter(|t| !t.is_empty())
            .unwrap_or_else(|| "Unknown blog".to_string()),
        name => name.to_string(),
    };

    let mut skipped = 0usize;
    let posts: Vec<Post> = feed
        .entries
        .into_iter()
        .filter_map(|entry| {
            let Some(link) = entry
                .links
                .first()
                .map(|l| l.href.trim().to_string())
                .filter(|href| !href.is_empty())
            else {
                skipped += 1;
                return None;
            };

            let title = entry
                .title
                .map(|t| t.content.trim().to_string())
                .filter(|t| !t.is_empty())
                .unwrap_or_else(|| "Untitled".to_string());
            let date = entry.published.or(entry.updated).map(|dt| dt.timestamp());

            Some(Post {
                source: source_for(&link),
                link,
                title,
                blog_name: blog_name.clone(),
                date,
                status: PostStatus::Inbox,
            })
        })
        .collect();

    if skipped > 0 {
        tracing::debug!(skipped, blog = %blog_name, "Skipped feed entries without links");
    }
    Ok(posts)
}

fn source_for(link: &str) -> PostSource {
    let host = Url::parse(link)
        .ok()
        .and_then(|u| u.host_str().map(|h| h.trim_start_matches("www.").to_ascii_lowercase()));
    match host.as_deref() {
        Some("twitter.com" | "x.com" | "mobile.twitter.com") => PostSource::Twitter,
        _ => PostSource::Blog,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const RSS: &str = r#"<?xml version="1.0"?>
<rss version="2.0">
  <channel>
    <title>Ada's Blog</title>
    <item>
      <title>Why Rust</title>
      <link>https://blog.example.com/why-rust</link>
      <pubDate>Mon, 06 Jan 2025 10:00:00 +0000</pubDate>
    </item>
    <item>
      <title>No link here</title>
    </item>
    <item>
      <link>https://x.com/ada/status/1</link>
    </item>
  </channel>
</rss>"#;

    #[test]
    fn test_parse_rss_items() {
        let posts = parse_feed(RSS.as_bytes(), "").unwrap();
        assert_eq!(posts.len(), 2);

        assert_eq!(posts[0].link, "https://blog.example.com/why-rust");
        assert_eq!(posts[0].title, "Why Rust");
        assert_eq!(posts[0].blog_name, "Ada's Blog");
        assert_eq!(posts[0].date, Some(1_736_157_600));
        assert_eq!(posts[0].status, PostStatus::Inbox);
        assert_eq!(posts[0].source, PostSource::Blog);

        assert_eq!(posts[1].title, "Untitled");
        assert_eq!(posts[1].source, PostSource::Twitter);
    }

    #[test]
    fn test_explicit_blog_name_wins() {
        let posts = parse_feed(RSS.as_bytes(), "Ada").unwrap();
        assert!(posts.iter().all(|p| p.blog_name == "Ada"));
    }

    #[test]
    fn test_parse_atom() {
        let atom = r#"<?xml version="1.0" encoding="utf-8"?>
<feed xmlns="http://www.w3.org/2005/Atom">
  <title>Atom Blog</title>
  <id>urn:uuid:1</id>
  <updated>2025-01-01T00:00:00Z</updated>
  <entry>
    <title>Entry</title>
    <id>urn:uuid:2</id>
    <link href="https://atom.example.com/entry"/>
    <updated>2025-01-01T00:00:00Z</updated>
  </entry>
</feed>"#;
        let posts = parse_feed(atom.as_bytes(), "").unwrap();
        assert_eq!(posts.len(), 1);
        assert_eq!(posts[0].blog_name, "Atom Blog");
        assert_eq!(posts[0].date, Some(1_735_689_600));
    }

    #[test]
    fn test_garbage_is_error() {
        assert!(parse_feed(b"not a feed", "x").is_err());
    }
}
