use std::sync::Arc;

use tracing::debug;

use crate::api::PageFetcher;
use crate::model::CollectionResult;
use crate::paginator::{paginate, Accumulator, PaginationLimits};

/// Collects one identifier at a time. Every failure ends up in
/// `CollectionResult::error`; nothing is returned as `Err`.
pub struct Collector {
    fetcher: Arc<dyn PageFetcher>,
    limits: PaginationLimits,
}

impl Collector {
    pub fn new(fetcher: Arc<dyn PageFetcher>, limits: PaginationLimits) -> Self {
        Collector { fetcher, limits }
    }

    pub fn limits(&self) -> &PaginationLimits {
        &self.limits
    }

    pub async fn run(&self, identifier: &str) -> CollectionResult {
        let mut acc = Accumulator::default();
        let outcome = paginate(self.fetcher.as_ref(), identifier, &self.limits, &mut acc).await;
        let fetches = acc.fetches();
        let (top_level, children) = acc.finish(self.limits.cap);

        debug!(
            identifier,
            fetches,
            comments = top_level.len(),
            replies = children.len(),
            failed = outcome.is_err(),
            "collection finished"
        );

        CollectionResult {
            identifier: identifier.to_string(),
            top_level,
            children,
            error: outcome.err(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{CollectError, RemoteError};
    use crate::testing::{page, page_number, threads, FnFetcher};

    #[tokio::test]
    async fn failure_on_page_three_keeps_first_two() {
        let fetcher = Arc::new(FnFetcher::new(|_, cursor, _| {
            let n = page_number(cursor);
            if n == 2 {
                return Err(RemoteError::new(None, "operation timed out"));
            }
            let next = (n < 4).then(|| format!("p{}", n + 1));
            Ok(page(threads("c", n * 10, 10, 1), next))
        }));
        let collector = Collector::new(fetcher.clone(), PaginationLimits::new(100, 10));

        let result = collector.run("X").await;
        assert_eq!(result.identifier, "X");
        assert_eq!(result.top_level.len(), 20);
        assert_eq!(result.children.len(), 20);
        assert!(matches!(result.error, Some(CollectError::Remote(_))));
        assert_eq!(fetcher.call_count(), 3);
    }

    #[tokio::test]
    async fn clean_run_has_no_error() {
        let fetcher = Arc::new(FnFetcher::pages(vec![threads("c", 0, 7, 2)]));
        let collector = Collector::new(fetcher, PaginationLimits::new(100, 100));
        let result = collector.run("v").await;
        assert!(result.error.is_none());
        assert_eq!(result.top_level.len(), 7);
        assert_eq!(result.children.len(), 14);
        assert!(result.top_level.iter().all(|r| r.identifier == "v"));
    }

    #[tokio::test]
    async fn exhausted_identifier_reports_error() {
        let fetcher = Arc::new(FnFetcher::new(|_, cursor, _| {
            Ok(page(vec![], Some(format!("p{}", page_number(cursor) + 1))))
        }));
        let collector = Collector::new(fetcher, PaginationLimits::new(10, 10).with_max_fetches(4));
        let result = collector.run("v").await;
        assert!(!result.has_records());
        assert_eq!(
            result.error,
            Some(CollectError::PaginationExhausted {
                fetches: 4,
                collected: 0,
                cap: 10
            })
        );
    }
}
