use serde::Deserialize;
use tracing::warn;

use crate::api::{CommentSnippet, Page, RawComment, RawThread};
use crate::error::EntryExtractionWarning;
use crate::model::{ChildRecord, TopLevelRecord};
use crate::normalize::normalize;

/// Records pulled out of one page, plus the entries that had to be skipped.
#[derive(Debug, Default)]
pub struct Extracted {
    pub top_level: Vec<TopLevelRecord>,
    pub children: Vec<ChildRecord>,
    pub skipped: Vec<EntryExtractionWarning>,
}

/// Map every entry of `page` into records for `identifier`. Best-effort per
/// entry: malformed entries and id-less replies are skipped and logged.
pub fn extract(page: &Page, identifier: &str) -> Extracted {
    let mut out = Extracted::default();

    for (index, item) in page.items.iter().enumerate() {
        let thread = match RawThread::deserialize(item) {
            Ok(t) => t,
            Err(e) => {
                out.skip(identifier, index, format!("malformed entry: {}", e));
                continue;
            }
        };

        let Some(top) = thread.snippet.top_level_comment else {
            out.skip(identifier, index, "missing topLevelComment".into());
            continue;
        };
        let Some(record_id) = top.id.filter(|id| !id.is_empty()) else {
            out.skip(identifier, index, "missing comment id".into());
            continue;
        };

        let child_count = thread.snippet.total_reply_count.unwrap_or(0);
        let fields = Fields::from(&top.snippet);
        out.top_level.push(TopLevelRecord {
            identifier: identifier.to_string(),
            record_id: record_id.clone(),
            author: fields.author,
            author_id: fields.author_id,
            text: fields.text,
            like_count: fields.like_count,
            published_at: fields.published_at,
            updated_at: fields.updated_at,
            child_count,
        });

        if child_count == 0 {
            continue;
        }
        let replies = thread.replies.map(|r| r.comments).unwrap_or_default();
        for raw in &replies {
            let reply = match RawComment::deserialize(raw) {
                Ok(r) => r,
                Err(e) => {
                    out.skip(identifier, index, format!("malformed reply to {}: {}", record_id, e));
                    continue;
                }
            };
            let Some(child_id) = reply.id.filter(|id| !id.is_empty()) else {
                out.skip(identifier, index, format!("reply to {} without id", record_id));
                continue;
            };
            let fields = Fields::from(&reply.snippet);
            out.children.push(ChildRecord {
                identifier: identifier.to_string(),
                parent_record_id: record_id.clone(),
                child_id,
                author: fields.author,
                author_id: fields.author_id,
                text: fields.text,
                like_count: fields.like_count,
                published_at: fields.published_at,
                updated_at: fields.updated_at,
            });
        }
    }

    out
}

impl Extracted {
    fn skip(&mut self, identifier: &str, index: usize, reason: String) {
        let warning = EntryExtractionWarning {
            identifier: identifier.to_string(),
            index,
            reason,
        };
        warn!("{}", warning);
        self.skipped.push(warning);
    }
}

/// Snippet fields shared by comments and replies, defaulted and normalized.
struct Fields {
    author: String,
    author_id: String,
    text: String,
    like_count: u64,
    published_at: String,
    updated_at: String,
}

impl From<&CommentSnippet> for Fields {
    fn from(s: &CommentSnippet) -> Self {
        Fields {
            author: normalize(s.author_display_name.as_deref().unwrap_or_default()),
            author_id: s
                .author_channel_id
                .as_ref()
                .and_then(|c| c.value.clone())
                .unwrap_or_default(),
            text: normalize(s.text_display.as_deref().unwrap_or_default()),
            like_count: s.like_count.unwrap_or(0),
            published_at: s.published_at.clone().unwrap_or_default(),
            updated_at: s.updated_at.clone().unwrap_or_default(),
        }
    }
}
