use std::collections::HashSet;

use tracing::debug;

use crate::api::{PageFetcher, MAX_PAGE_SIZE};
use crate::error::CollectError;
use crate::extract::{extract, Extracted};
use crate::model::{ChildRecord, TopLevelRecord};

/// Fetches allowed on top of one per wanted record. Every page that makes
/// progress adds at least one record, so only idle pages eat into this.
const IDLE_FETCH_ALLOWANCE: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PaginationLimits {
    pub cap: usize,
    pub page_size: usize,
    pub max_fetches: usize,
}

impl PaginationLimits {
    pub fn new(cap: usize, page_size: usize) -> Self {
        let page_size = page_size.clamp(1, MAX_PAGE_SIZE);
        PaginationLimits {
            cap,
            page_size,
            max_fetches: default_fetch_ceiling(cap),
        }
    }

    pub fn with_max_fetches(mut self, max_fetches: usize) -> Self {
        self.max_fetches = max_fetches.max(1);
        self
    }
}

pub fn default_fetch_ceiling(cap: usize) -> usize {
    cap.saturating_add(IDLE_FETCH_ALLOWANCE)
}

/// Records gathered so far for one identifier, deduplicated by id.
#[derive(Debug, Default)]
pub struct Accumulator {
    top_level: Vec<TopLevelRecord>,
    children: Vec<ChildRecord>,
    seen_top_level: HashSet<String>,
    seen_children: HashSet<String>,
    fetches: usize,
}

impl Accumulator {
    pub fn top_level_len(&self) -> usize {
        self.top_level.len()
    }

    pub fn fetches(&self) -> usize {
        self.fetches
    }

    /// Append a page's records. A repeated cursor can hand back threads we
    /// already have; the first copy wins and the repeat's replies go with it.
    pub fn absorb(&mut self, extracted: Extracted) {
        let mut repeated = HashSet::new();
        for record in extracted.top_level {
            if self.seen_top_level.insert(record.record_id.clone()) {
                self.top_level.push(record);
            } else {
                repeated.insert(record.record_id);
            }
        }
        for child in extracted.children {
            if repeated.contains(&child.parent_record_id) {
                continue;
            }
            if self.seen_children.insert(child.child_id.clone()) {
                self.children.push(child);
            }
        }
    }

    /// Trim top-level records to `cap`. Children of trimmed parents are kept.
    pub fn finish(mut self, cap: usize) -> (Vec<TopLevelRecord>, Vec<ChildRecord>) {
        self.top_level.truncate(cap);
        (self.top_level, self.children)
    }
}

/// Walk the cursor chain for `identifier` until `limits.cap` top-level
/// records are held or the cursor runs out.
///
/// Records land in `acc` as each page arrives, so whatever was gathered
/// before an error is still there when this returns `Err`.
pub async fn paginate(
    fetcher: &dyn PageFetcher,
    identifier: &str,
    limits: &PaginationLimits,
    acc: &mut Accumulator,
) -> Result<(), CollectError> {
    let mut cursor: Option<String> = None;

    while acc.top_level_len() < limits.cap {
        if acc.fetches >= limits.max_fetches {
            return Err(CollectError::PaginationExhausted {
                fetches: acc.fetches,
                collected: acc.top_level_len(),
                cap: limits.cap,
            });
        }

        acc.fetches += 1;
        let page = fetcher
            .fetch_page(identifier, cursor.as_deref(), limits.page_size)
            .await?;
        let next = page.cursor().map(str::to_string);
        let extracted = extract(&page, identifier);
        debug!(
            identifier,
            page = acc.fetches,
            comments = extracted.top_level.len(),
            replies = extracted.children.len(),
            skipped = extracted.skipped.len(),
            "page extracted"
        );
        acc.absorb(extracted);

        match next {
            Some(token) => cursor = Some(token),
            None => break,
        }
    }

    Ok(())
}
