use std::time::Duration;

use serde::Serialize;

use crate::error::CollectError;

/// One top-level comment. Field names in the serialized form match the
/// comments CSV header.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TopLevelRecord {
    #[serde(rename = "video_id")]
    pub identifier: String,
    #[serde(rename = "comment_id")]
    pub record_id: String,
    pub author: String,
    #[serde(rename = "author_channel_id")]
    pub author_id: String,
    pub text: String,
    #[serde(rename = "likeCount")]
    pub like_count: u64,
    #[serde(rename = "publishedAt")]
    pub published_at: String,
    #[serde(rename = "updatedAt")]
    pub updated_at: String,
    /// API-reported total; may exceed the replies actually returned inline.
    #[serde(rename = "replyCount")]
    pub child_count: u64,
}

/// One reply, attached to its parent by `parent_record_id`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChildRecord {
    #[serde(rename = "video_id")]
    pub identifier: String,
    #[serde(rename = "parent_comment_id")]
    pub parent_record_id: String,
    #[serde(rename = "reply_id")]
    pub child_id: String,
    pub author: String,
    #[serde(rename = "author_channel_id")]
    pub author_id: String,
    pub text: String,
    #[serde(rename = "likeCount")]
    pub like_count: u64,
    #[serde(rename = "publishedAt")]
    pub published_at: String,
    #[serde(rename = "updatedAt")]
    pub updated_at: String,
}

/// Outcome of collecting one identifier. Records and `error` are both set
/// when a later page failed after earlier pages succeeded.
#[derive(Debug)]
pub struct CollectionResult {
    pub identifier: String,
    pub top_level: Vec<TopLevelRecord>,
    pub children: Vec<ChildRecord>,
    pub error: Option<CollectError>,
}

impl CollectionResult {
    pub fn has_records(&self) -> bool {
        !self.top_level.is_empty() || !self.children.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailedIdentifier {
    pub identifier: String,
    pub error: String,
}

/// Terminal artifact of one batch run.
#[derive(Debug, Clone, Default)]
pub struct RunSummary {
    pub run_date: String,
    pub identifiers: usize,
    pub written: usize,
    pub total_top_level: usize,
    pub total_child: usize,
    pub failed: Vec<FailedIdentifier>,
    pub elapsed: Duration,
}

impl RunSummary {
    pub fn new(run_date: &str, identifiers: usize) -> Self {
        RunSummary {
            run_date: run_date.to_string(),
            identifiers,
            ..Default::default()
        }
    }

    pub fn failed_identifiers(&self) -> Vec<&str> {
        self.failed.iter().map(|f| f.identifier.as_str()).collect()
    }
}
