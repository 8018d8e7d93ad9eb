use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

use crate::error::RemoteError;

pub const DEFAULT_BASE_URL: &str = "https://www.googleapis.com/youtube/v3";
/// Largest `maxResults` the commentThreads endpoint accepts.
pub const MAX_PAGE_SIZE: usize = 100;

/// One `commentThreads.list` response. Entries stay untyped here so a single
/// malformed entry can be skipped without losing the page.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Page {
    #[serde(default)]
    pub items: Vec<Value>,
    #[serde(default)]
    pub next_page_token: Option<String>,
}

impl Page {
    /// Continuation cursor, treating an empty token as absent.
    pub fn cursor(&self) -> Option<&str> {
        self.next_page_token.as_deref().filter(|t| !t.is_empty())
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawThread {
    #[serde(default)]
    pub snippet: ThreadSnippet,
    #[serde(default)]
    pub replies: Option<RawReplies>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ThreadSnippet {
    #[serde(default)]
    pub top_level_comment: Option<RawComment>,
    #[serde(default)]
    pub total_reply_count: Option<u64>,
}

/// Replies stay untyped until extraction so one bad reply is skipped alone.
#[derive(Debug, Default, Deserialize)]
pub struct RawReplies {
    #[serde(default)]
    pub comments: Vec<Value>,
}

#[derive(Debug, Default, Deserialize)]
pub struct RawComment {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub snippet: CommentSnippet,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommentSnippet {
    #[serde(default)]
    pub author_display_name: Option<String>,
    #[serde(default)]
    pub author_channel_id: Option<ChannelRef>,
    #[serde(default)]
    pub text_display: Option<String>,
    #[serde(default)]
    pub like_count: Option<u64>,
    #[serde(default)]
    pub published_at: Option<String>,
    #[serde(default)]
    pub updated_at: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ChannelRef {
    #[serde(default)]
    pub value: Option<String>,
}

/// Source of comment pages for one identifier.
///
/// Implementations must be safe to share between collector tasks.
#[async_trait]
pub trait PageFetcher: Send + Sync {
    async fn fetch_page(
        &self,
        identifier: &str,
        cursor: Option<&str>,
        page_size: usize,
    ) -> Result<Page, RemoteError>;
}

/// YouTube Data API v3 client for `commentThreads`.
pub struct YouTubeClient {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl YouTubeClient {
    pub fn new(base_url: &str, api_key: &str, timeout: Duration) -> Result<Self, reqwest::Error> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(YouTubeClient {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
        })
    }
}

#[async_trait]
impl PageFetcher for YouTubeClient {
    async fn fetch_page(
        &self,
        identifier: &str,
        cursor: Option<&str>,
        page_size: usize,
    ) -> Result<Page, RemoteError> {
        let url = format!("{}/commentThreads", self.base_url);
        let max_results = page_size.clamp(1, MAX_PAGE_SIZE).to_string();
        let mut query = vec![
            ("part", "snippet,replies"),
            ("videoId", identifier),
            ("maxResults", max_results.as_str()),
            ("textFormat", "plainText"),
            ("key", self.api_key.as_str()),
        ];
        if let Some(token) = cursor {
            query.push(("pageToken", token));
        }

        debug!(identifier, cursor = cursor.unwrap_or(""), "fetching comment page");
        let response = self
            .http
            .get(&url)
            .query(&query)
            .send()
            .await
            .map_err(RemoteError::transport)?;

        let status = response.status();
        let body = response.text().await.map_err(RemoteError::transport)?;

        if !status.is_success() {
            let message = api_error_message(&body)
                .or_else(|| status.canonical_reason().map(str::to_string))
                .unwrap_or_else(|| "unexpected status".to_string());
            return Err(RemoteError::new(Some(status.as_u16()), message));
        }

        serde_json::from_str(&body).map_err(|e| {
            RemoteError::new(Some(status.as_u16()), format!("invalid response body: {}", e))
        })
    }
}

/// Pull `error.message` out of a Google API error body.
fn api_error_message(body: &str) -> Option<String> {
    let value: Value = serde_json::from_str(body).ok()?;
    value
        .get("error")?
        .get("message")?
        .as_str()
        .map(str::to_string)
}
