use futures::StreamExt;
use reqwest::redirect::Policy;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::time::Duration;
use thiserror::Error;

const MAX_RESPONSE_SIZE: usize = 5 * 1024 * 1024; // 5MB
const REQUEST_TIMEOUT: Duration = Duration::from_secs(20);

#[derive(Debug, Error)]
pub enum ContentError {
    #[error("Request timed out after 20s")]
    Timeout,
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),
    #[error("HTTP error: status {0}")]
    HttpStatus(u16),
    /// Non-2xx with a JSON `{ "message": ... }` body from the service.
    #[error("{message} (status {status})")]
    Service { status: u16, message: String },
    #[error("Response too large (exceeds {0} bytes)")]
    ResponseTooLarge(usize),
    #[error("Invalid UTF-8 in response")]
    InvalidUtf8,
    #[error("Malformed response body: {0}")]
    Malformed(#[from] serde_json::Error),
    #[error("Invalid URL")]
    InvalidUrl,
    #[error("Insecure service URL: HTTPS required (except localhost)")]
    InsecureBaseUrl,
    /// No provider is configured for this capability.
    #[error("Service not configured")]
    NotConfigured,
}

#[derive(Deserialize)]
struct ErrorBody {
    message: String,
}

/// HTTP client shared by the article, summary and cloud clients.
///
/// Redirects are limited to 3 hops and loops are rejected.
pub fn build_client() -> reqwest::Client {
    let policy = Policy::custom(|attempt| {
        if attempt.previous().len() >= 3 {
            return attempt.error("Too many redirects (max 3)");
        }
        let url = attempt.url();
        if attempt.previous().iter().any(|prev| prev.as_str() == url.as_str()) {
            return attempt.error("Redirect loop detected");
        }
        tracing::debug!(to = %url, hop = attempt.previous().len() + 1, "Following redirect");
        attempt.follow()
    });

    reqwest::Client::builder()
        .redirect(policy)
        .user_agent(concat!("blogdeck/", env!("CARGO_PKG_VERSION")))
        .build()
        .unwrap_or_else(|e| {
            tracing::warn!(error = %e, "Failed to build configured HTTP client, using defaults");
            reqwest::Client::new()
        })
}

/// Send `request` and decode a JSON body.
///
/// Non-2xx responses become [`ContentError::Service`] when the body carries a
/// `message`, otherwise [`ContentError::HttpStatus`].
pub(crate) async fn send_json<T: DeserializeOwned>(
    request: reqwest::RequestBuilder,
) -> Result<T, ContentError> {
    let body = send_text(request).await?;
    Ok(serde_json::from_str(&body)?)
}

/// Send `request` and return the body as text, enforcing timeout and size limit.
pub(crate) async fn send_text(request: reqwest::RequestBuilder) -> Result<String, ContentError> {
    let response = tokio::time::timeout(REQUEST_TIMEOUT, request.send())
        .await
        .map_err(|_| ContentError::Timeout)?
        .map_err(ContentError::Network)?;

    let status = response.status();
    let body = read_limited_text(response, MAX_RESPONSE_SIZE).await;

    if !status.is_success() {
        let message = body
            .ok()
            .and_then(|text| serde_json::from_str::<ErrorBody>(&text).ok())
            .map(|b| b.message);
        return Err(match message {
            Some(message) => ContentError::Service {
                status: status.as_u16(),
                message,
            },
            None => ContentError::HttpStatus(status.as_u16()),
        });
    }

    body
}

async fn read_limited_text(
    response: reqwest::Response,
    limit: usize,
) -> Result<String, ContentError> {
    // Fast path: check Content-Length header
    if let Some(len) = response.content_length() {
        if len as usize > limit {
            return Err(ContentError::ResponseTooLarge(limit));
        }
    }

    let mut bytes = Vec::new();
    let mut stream = response.bytes_stream();

    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(ContentError::Network)?;
        if bytes.len().saturating_add(chunk.len()) > limit {
            return Err(ContentError::ResponseTooLarge(limit));
        }
        bytes.extend_from_slice(&chunk);
    }

    String::from_utf8(bytes).map_err(|_| ContentError::InvalidUtf8)
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::method;
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[derive(Debug, Deserialize)]
    struct Payload {
        n: u32,
    }

    #[tokio::test]
    async fn test_json_success() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string(r#"{"n": 3}"#))
            .mount(&server)
            .await;

        let client = build_client();
        let payload: Payload = send_json(client.get(server.uri())).await.unwrap();
        assert_eq!(payload.n, 3);
    }

    #[tokio::test]
    async fn test_error_message_surfaced() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(
                ResponseTemplate::new(422).set_body_string(r#"{"message": "Could not parse article"}"#),
            )
            .mount(&server)
            .await;

        let err = send_json::<Payload>(build_client().get(server.uri()))
            .await
            .unwrap_err();
        match err {
            ContentError::Service { status, message } => {
                assert_eq!(status, 422);
                assert_eq!(message, "Could not parse article");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_error_without_message() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(502).set_body_string("Bad Gateway"))
            .mount(&server)
            .await;

        let err = send_text(build_client().get(server.uri())).await.unwrap_err();
        assert!(matches!(err, ContentError::HttpStatus(502)));
    }

    #[tokio::test]
    async fn test_malformed_json() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>"))
            .mount(&server)
            .await;

        let err = send_json::<Payload>(build_client().get(server.uri()))
            .await
            .unwrap_err();
        assert!(matches!(err, ContentError::Malformed(_)));
    }

    #[tokio::test]
    async fn test_oversized_response_rejected() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string("x".repeat(MAX_RESPONSE_SIZE + 1)))
            .mount(&server)
            .await;

        let err = send_text(build_client().get(server.uri())).await.unwrap_err();
        assert!(matches!(err, ContentError::ResponseTooLarge(_)));
    }
}
