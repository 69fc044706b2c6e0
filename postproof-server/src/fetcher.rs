//! Post-fetch collaborator client
//!
//! The collaborator answers `GET {base}/posts/{content_ref}` with
//! `{"exists": bool, "content": PostSnapshot?}`.

use std::time::Duration;

use async_trait::async_trait;
use postproof_core::{ContentFetcher, FetchOutcome, PostSnapshot, ProofError, Result};
use serde::Deserialize;
use url::Url;

#[derive(Debug, Deserialize)]
struct FetchResponse {
    exists: bool,
    #[serde(default)]
    content: Option<PostSnapshot>,
}

/// HTTP client for the post-fetch collaborator.
pub struct HttpContentFetcher {
    client: reqwest::Client,
    base_url: Url,
}

impl HttpContentFetcher {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        let base_url = Url::parse(base_url)
            .map_err(|e| ProofError::InvalidInput(format!("invalid POST_FETCH_URL: {e}")))?;
        if base_url.cannot_be_a_base() {
            return Err(ProofError::InvalidInput(format!(
                "POST_FETCH_URL {base_url} cannot be a base URL"
            )));
        }
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("postproof-server/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| ProofError::Fetch(format!("Failed to create HTTP client: {e}")))?;
        Ok(Self { client, base_url })
    }

    fn post_url(&self, content_ref: &str) -> Result<Url> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| ProofError::Fetch("post fetch URL cannot be a base".into()))?
            .pop_if_empty()
            .push("posts")
            .push(content_ref);
        Ok(url)
    }
}

#[async_trait]
impl ContentFetcher for HttpContentFetcher {
    #[tracing::instrument(skip(self))]
    async fn fetch_content_by_id(&self, content_ref: &str) -> Result<FetchOutcome> {
        let url = self.post_url(content_ref)?;
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| ProofError::Fetch(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(ProofError::Fetch(format!(
                "post fetch service returned {status}"
            )));
        }

        let body: FetchResponse = response
            .json()
            .await
            .map_err(|e| ProofError::Fetch(format!("invalid post fetch response: {e}")))?;

        match (body.exists, body.content) {
            (false, _) => Ok(FetchOutcome::Missing),
            (true, Some(snapshot)) => Ok(FetchOutcome::Found(snapshot)),
            (true, None) => Err(ProofError::Fetch(
                "post fetch service reported an existing post without content".into(),
            )),
        }
    }
}

/// Fetcher used when no collaborator is configured.
pub struct UnconfiguredFetcher;

#[async_trait]
impl ContentFetcher for UnconfiguredFetcher {
    async fn fetch_content_by_id(&self, _content_ref: &str) -> Result<FetchOutcome> {
        Err(ProofError::Fetch(
            "post fetch service is not configured (set POST_FETCH_URL)".into(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn fetcher(server: &MockServer) -> HttpContentFetcher {
        HttpContentFetcher::new(&server.uri(), Duration::from_secs(2)).unwrap()
    }

    #[test]
    fn test_content_ref_is_path_encoded() {
        let fetcher =
            HttpContentFetcher::new("https://fetch.example/api/", Duration::from_secs(1)).unwrap();
        let url = fetcher.post_url("x/status 1").unwrap();
        assert_eq!(url.as_str(), "https://fetch.example/api/posts/x%2Fstatus%201");
    }

    #[test]
    fn test_invalid_base_url() {
        assert!(HttpContentFetcher::new("not a url", Duration::from_secs(1)).is_err());
    }

    #[tokio::test]
    async fn test_existing_post() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/posts/post-1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "exists": true,
                "content": {
                    "content": {"post_id": "1", "author": "ann", "text": "hi"},
                    "engagement": {"likes": 1, "reposts": 0, "replies": 0},
                    "captured_at": "2025-06-01T00:00:00Z"
                }
            })))
            .mount(&server)
            .await;

        let outcome = fetcher(&server).fetch_content_by_id("post-1").await.unwrap();
        let FetchOutcome::Found(snapshot) = outcome else {
            panic!("expected a post");
        };
        assert_eq!(snapshot.content.text, "hi");
    }

    #[tokio::test]
    async fn test_deleted_post() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/posts/gone"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "exists": false
            })))
            .mount(&server)
            .await;

        let outcome = fetcher(&server).fetch_content_by_id("gone").await.unwrap();
        assert_eq!(outcome, FetchOutcome::Missing);
    }

    #[tokio::test]
    async fn test_collaborator_failure_is_an_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let err = fetcher(&server).fetch_content_by_id("any").await.unwrap_err();
        assert!(matches!(err, ProofError::Fetch(_)));
    }
}
