//! In-memory fetchers and page builders shared by unit tests.

use std::sync::Mutex;

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::api::{Page, PageFetcher};
use crate::error::RemoteError;

type Responder = dyn Fn(&str, Option<&str>, usize) -> Result<Page, RemoteError> + Send + Sync;

/// Fetcher driven by a closure; records every call as `(identifier, cursor)`.
pub struct FnFetcher {
    respond: Box<Responder>,
    calls: Mutex<Vec<(String, Option<String>)>>,
}

impl FnFetcher {
    pub fn new<F>(respond: F) -> Self
    where
        F: Fn(&str, Option<&str>, usize) -> Result<Page, RemoteError> + Send + Sync + 'static,
    {
        FnFetcher {
            respond: Box::new(respond),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Serve `pages` in order for every identifier. Page `n` is requested with
    /// cursor `p{n}`; the last page has no cursor.
    pub fn pages(pages: Vec<Vec<Value>>) -> Self {
        let total = pages.len();
        FnFetcher::new(move |_, cursor, _| {
            let n = page_number(cursor);
            let items = pages.get(n).cloned().unwrap_or_default();
            let next = (n + 1 < total).then(|| format!("p{}", n + 1));
            Ok(page(items, next))
        })
    }

    pub fn calls(&self) -> Vec<(String, Option<String>)> {
        self.calls.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

#[async_trait]
impl PageFetcher for FnFetcher {
    async fn fetch_page(
        &self,
        identifier: &str,
        cursor: Option<&str>,
        page_size: usize,
    ) -> Result<Page, RemoteError> {
        self.calls
            .lock()
            .unwrap()
            .push((identifier.to_string(), cursor.map(str::to_string)));
        (self.respond)(identifier, cursor, page_size)
    }
}

/// Zero-based page index from a `p{n}` cursor; no cursor is page 0.
pub fn page_number(cursor: Option<&str>) -> usize {
    cursor
        .and_then(|c| c.strip_prefix('p'))
        .and_then(|n| n.parse().ok())
        .unwrap_or(0)
}

pub fn page(items: Vec<Value>, next: Option<String>) -> Page {
    Page {
        items,
        next_page_token: next,
    }
}

/// A comment thread entry with `replies` inline replies.
pub fn thread(id: &str, replies: usize) -> Value {
    let inline: Vec<Value> = (0..replies)
        .map(|r| {
            json!({
                "id": format!("{}.r{}", id, r),
                "snippet": {"authorDisplayName": "replier", "textDisplay": "reply", "likeCount": 1}
            })
        })
        .collect();
    json!({
        "id": id,
        "snippet": {
            "topLevelComment": {
                "id": id,
                "snippet": {
                    "authorDisplayName": "author",
                    "authorChannelId": {"value": "UCauthor"},
                    "textDisplay": format!("comment {}", id),
                    "likeCount": 3,
                    "publishedAt": "2025-06-01T00:00:00Z",
                    "updatedAt": "2025-06-01T00:00:00Z"
                }
            },
            "totalReplyCount": replies
        },
        "replies": {"comments": inline}
    })
}

/// `count` threads with ids `{prefix}{start}..`, each carrying `replies` replies.
pub fn threads(prefix: &str, start: usize, count: usize, replies: usize) -> Vec<Value> {
    (start..start + count)
        .map(|i| thread(&format!("{}{}", prefix, i), replies))
        .collect()
}
