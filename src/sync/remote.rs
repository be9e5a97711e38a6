use async_trait::async_trait;
use reqwest::Method;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};

use super::identity::User;
use super::SyncError;
use crate::content::{send_json, send_text, ContentError};
use crate::highlights::Highlight;
use crate::storage::PostStatus;
use crate::util::validate_service_url;

/// A post's status as last written by any device.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Classification {
    pub link: String,
    pub status: PostStatus,
    /// Unix milliseconds of the edit.
    pub updated_at: i64,
}

/// Keyed remote tables for highlights and classifications.
#[async_trait]
pub trait RemoteTable: Send + Sync {
    async fn insert_highlight(&self, user: &User, highlight: &Highlight) -> Result<(), SyncError>;

    /// Delete by `(user, article_url, text)`.
    async fn delete_highlight(
        &self,
        user: &User,
        article_url: &str,
        text: &str,
    ) -> Result<(), SyncError>;

    async fn select_highlights(&self, user: &User) -> Result<Vec<Highlight>, SyncError>;

    async fn upsert_classification(
        &self,
        user: &User,
        classification: &Classification,
    ) -> Result<(), SyncError>;

    async fn select_classifications(&self, user: &User) -> Result<Vec<Classification>, SyncError>;
}

/// Remote used when no cloud store is configured. Reads are empty.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoRemote;

#[async_trait]
impl RemoteTable for NoRemote {
    async fn insert_highlight(&self, _: &User, _: &Highlight) -> Result<(), SyncError> {
        Ok(())
    }

    async fn delete_highlight(&self, _: &User, _: &str, _: &str) -> Result<(), SyncError> {
        Ok(())
    }

    async fn select_highlights(&self, _: &User) -> Result<Vec<Highlight>, SyncError> {
        Ok(Vec::new())
    }

    async fn upsert_classification(&self, _: &User, _: &Classification) -> Result<(), SyncError> {
        Ok(())
    }

    async fn select_classifications(&self, _: &User) -> Result<Vec<Classification>, SyncError> {
        Ok(Vec::new())
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct HighlightRow {
    user_id: String,
    article_url: String,
    text: String,
    position: u64,
    created_at: i64,
}

#[derive(Debug, Serialize, Deserialize)]
struct ClassificationRow {
    user_id: String,
    link: String,
    status: PostStatus,
    updated_at: i64,
}

/// REST table client (PostgREST conventions: `eq.` filters, upsert via
/// `Prefer: resolution=merge-duplicates`).
pub struct HttpRemoteTable {
    client: reqwest::Client,
    base: String,
    api_key: SecretString,
    access_token: Option<SecretString>,
}

impl std::fmt::Debug for HttpRemoteTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpRemoteTable")
            .field("base", &self.base)
            .field("api_key", &"[REDACTED]")
            .field("access_token", &self.access_token.as_ref().map(|_| "[REDACTED]"))
            .finish()
    }
}

impl HttpRemoteTable {
    /// `base_url` is the REST root, e.g. `https://project.example.co/rest/v1`.
    pub fn new(
        client: reqwest::Client,
        base_url: &str,
        api_key: SecretString,
        access_token: Option<SecretString>,
    ) -> Result<Self, SyncError> {
        let base = validate_service_url(base_url).map_err(|e| {
            tracing::error!(base_url, error = %e, "Rejecting cloud store URL");
            SyncError::Remote(ContentError::InsecureBaseUrl)
        })?;
        Ok(Self {
            client,
            base: base.as_str().trim_end_matches('/').to_string(),
            api_key,
            access_token,
        })
    }

    fn request(&self, method: Method, table: &str) -> reqwest::RequestBuilder {
        // The user's access token scopes rows; fall back to the project key
        let bearer = self
            .access_token
            .as_ref()
            .unwrap_or(&self.api_key)
            .expose_secret();
        self.client
            .request(method, format!("{}/{}", self.base, table))
            .header("apikey", self.api_key.expose_secret())
            .header(reqwest::header::AUTHORIZATION, format!("Bearer {bearer}"))
    }
}

fn eq(value: &str) -> String {
    format!("eq.{value}")
}

#[async_trait]
impl RemoteTable for HttpRemoteTable {
    async fn insert_highlight(&self, user: &User, highlight: &Highlight) -> Result<(), SyncError> {
        let row = HighlightRow {
            user_id: user.id.clone(),
            article_url: highlight.article_url.clone(),
            text: highlight.text.clone(),
            position: highlight.position,
            created_at: highlight.timestamp,
        };
        let request = self
            .request(Method::POST, "highlights")
            .query(&[("on_conflict", "user_id,article_url,position")])
            .header("Prefer", "resolution=merge-duplicates")
            .json(&row);
        send_text(request).await?;
        Ok(())
    }

    async fn delete_highlight(
        &self,
        user: &User,
        article_url: &str,
        text: &str,
    ) -> Result<(), SyncError> {
        let request = self.request(Method::DELETE, "highlights").query(&[
            ("user_id", eq(&user.id)),
            ("article_url", eq(article_url)),
            ("text", eq(text)),
        ]);
        send_text(request).await?;
        Ok(())
    }

    async fn select_highlights(&self, user: &User) -> Result<Vec<Highlight>, SyncError> {
        let request = self
            .request(Method::GET, "highlights")
            .query(&[("user_id", eq(&user.id)), ("select", "*".to_string())]);
        let rows: Vec<HighlightRow> = send_json(request).await?;
        Ok(rows
            .into_iter()
            .map(|row| Highlight {
                article_url: row.article_url,
                text: row.text,
                position: row.position,
                timestamp: row.created_at,
            })
            .collect())
    }

    async fn upsert_classification(
        &self,
        user: &User,
        classification: &Classification,
    ) -> Result<(), SyncError> {
        let row = ClassificationRow {
            user_id: user.id.clone(),
            link: classification.link.clone(),
            status: classification.status,
            updated_at: classification.updated_at,
        };
        let request = self
            .request(Method::POST, "classifications")
            .query(&[("on_conflict", "user_id,link")])
            .header("Prefer", "resolution=merge-duplicates")
            .json(&row);
        send_text(request).await?;
        Ok(())
    }

    async fn select_classifications(&self, user: &User) -> Result<Vec<Classification>, SyncError> {
        let request = self
            .request(Method::GET, "classifications")
            .query(&[("user_id", eq(&user.id)), ("select", "*".to_string())]);
        let rows: Vec<ClassificationRow> = send_json(request).await?;
        Ok(rows
            .into_iter()
            .map(|row| Classification {
                link: row.link,
                status: row.status,
                updated_at: row.updated_at,
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::content::build_client;
    use wiremock::matchers::{body_json, header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn remote(server: &MockServer) -> HttpRemoteTable {
        HttpRemoteTable::new(
            build_client(),
            &format!("{}/rest/v1", server.uri()),
            SecretString::from("anon-key".to_string()),
            Some(SecretString::from("user-token".to_string())),
        )
        .unwrap()
    }

    fn user() -> User {
        User {
            id: "u-1".to_string(),
        }
    }

    #[tokio::test]
    async fn test_insert_highlight_upserts_row() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/rest/v1/highlights"))
            .and(header("apikey", "anon-key"))
            .and(header("authorization", "Bearer user-token"))
            .and(header("prefer", "resolution=merge-duplicates"))
            .and(body_json(serde_json::json!({
                "user_id": "u-1",
                "article_url": "https://blog.example.com/a",
                "text": "quote",
                "position": 42,
                "created_at": 1000
            })))
            .respond_with(ResponseTemplate::new(201))
            .expect(1)
            .mount(&server)
            .await;

        let highlight = Highlight {
            article_url: "https://blog.example.com/a".to_string(),
            text: "quote".to_string(),
            position: 42,
            timestamp: 1000,
        };
        remote(&server).insert_highlight(&user(), &highlight).await.unwrap();
    }

    #[tokio::test]
    async fn test_delete_highlight_filters() {
        let server = MockServer::start().await;
        Mock::given(method("DELETE"))
            .and(path("/rest/v1/highlights"))
            .and(query_param("user_id", "eq.u-1"))
            .and(query_param("article_url", "eq.https://blog.example.com/a"))
            .and(query_param("text", "eq.some words"))
            .respond_with(ResponseTemplate::new(204))
            .expect(1)
            .mount(&server)
            .await;

        remote(&server)
            .delete_highlight(&user(), "https://blog.example.com/a", "some words")
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_select_classifications() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/rest/v1/classifications"))
            .and(query_param("user_id", "eq.u-1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([
                {"user_id": "u-1", "link": "https://a", "status": "pending", "updated_at": 5}
            ])))
            .mount(&server)
            .await;

        let rows = remote(&server).select_classifications(&user()).await.unwrap();
        assert_eq!(
            rows,
            vec![Classification {
                link: "https://a".to_string(),
                status: PostStatus::Pending,
                updated_at: 5,
            }]
        );
    }

    #[tokio::test]
    async fn test_remote_failure_is_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(401).set_body_string(r#"{"message": "JWT expired"}"#))
            .mount(&server)
            .await;

        let err = remote(&server).select_highlights(&user()).await.unwrap_err();
        assert!(err.to_string().contains("JWT expired"));
    }

    #[test]
    fn test_debug_redacts_keys() {
        let table = HttpRemoteTable::new(
            reqwest::Client::new(),
            "https://cloud.example.com/rest/v1",
            SecretString::from("secret-anon".to_string()),
            None,
        )
        .unwrap();
        let debug = format!("{table:?}");
        assert!(!debug.contains("secret-anon"));
        assert!(debug.contains("[REDACTED]"));
    }
}
