//! Social media post model and the post-fetch collaborator seam.
//!
//! Only [`PostContent`] is fingerprinted. Engagement counters travel with the
//! snapshot for display but change constantly, so hashing them would make
//! every live re-check look like tampering.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::fingerprint::{self, Content, ContentFingerprint};

/// The attested part of a post.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PostContent {
    /// Platform identifier of the post
    pub post_id: String,
    /// Author handle as shown on the platform
    pub author: String,
    /// Full post text
    pub text: String,
    /// Platform publication time, when known
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub posted_at: Option<DateTime<Utc>>,
    /// Attached media URLs, in platform order
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub media: Vec<String>,
}

impl PostContent {
    /// Fingerprint of the canonicalized post.
    pub fn fingerprint(&self) -> Result<ContentFingerprint> {
        fingerprint::fingerprint(&Content::structured(self)?)
    }
}

/// Engagement counters at capture time.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Engagement {
    pub likes: u64,
    pub reposts: u64,
    pub replies: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub views: Option<u64>,
}

/// A captured post as submitted for timestamping.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PostSnapshot {
    pub content: PostContent,
    #[serde(default)]
    pub engagement: Engagement,
    pub captured_at: DateTime<Utc>,
}

impl PostSnapshot {
    pub fn new(content: PostContent, engagement: Engagement) -> Self {
        Self {
            content,
            engagement,
            captured_at: Utc::now(),
        }
    }
}

/// Result of asking the collaborator for a post.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchOutcome {
    Found(PostSnapshot),
    /// The platform reports the post no longer exists.
    Missing,
}

impl FetchOutcome {
    pub fn exists(&self) -> bool {
        matches!(self, Self::Found(_))
    }
}

/// External collaborator that returns live post data for a content reference.
///
/// Errors mean the collaborator itself failed; a deleted post is
/// [`FetchOutcome::Missing`], not an error.
#[async_trait]
pub trait ContentFetcher: Send + Sync {
    async fn fetch_content_by_id(&self, content_ref: &str) -> Result<FetchOutcome>;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn post(text: &str) -> PostContent {
        PostContent {
            post_id: "1790000000000000001".into(),
            author: "@ana".into(),
            text: text.into(),
            posted_at: None,
            media: vec![],
        }
    }

    #[test]
    fn test_engagement_excluded_from_fingerprint() {
        let a = PostSnapshot::new(post("gm"), Engagement::default());
        let b = PostSnapshot::new(
            post("gm"),
            Engagement {
                likes: 900,
                reposts: 12,
                replies: 3,
                views: Some(10_000),
            },
        );
        assert_eq!(
            a.content.fingerprint().unwrap(),
            b.content.fingerprint().unwrap()
        );
    }

    #[test]
    fn test_text_change_changes_fingerprint() {
        assert_ne!(
            post("gm").fingerprint().unwrap(),
            post("gn").fingerprint().unwrap()
        );
    }

    #[test]
    fn test_snapshot_json_defaults() {
        let json = r#"{"content":{"post_id":"1","author":"@a","text":"t"},"captured_at":"2026-01-08T10:00:00Z"}"#;
        let snapshot: PostSnapshot = serde_json::from_str(json).unwrap();
        assert_eq!(snapshot.engagement, Engagement::default());
        assert!(snapshot.content.media.is_empty());
    }
}
