//! Paginated collection aggregation
//!
//! Listing endpoints return one page per call together with the total size
//! of the collection. [`PaginatedAggregator::fetch_all`] keeps requesting
//! pages until the accumulated item count equals the reported total.
//!
//! Termination relies on that equality. A server whose total disagrees with
//! what it actually serves would keep the loop going, so the number of pages
//! is capped and exceeding the cap yields [`AggregationInconsistency`].

use std::future::Future;

use serde_json::Value;
use thiserror::Error;
use tracing::{debug, warn};

use crate::config::PaginationConfig;
use crate::transport::TransportError;

/// Position of the next page to request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageCursor {
    /// Index of the first requested item
    pub offset: usize,
    /// Items requested
    pub limit: usize,
}

/// One page as returned by a listing endpoint
#[derive(Debug, Clone, PartialEq)]
pub struct PageResult<T> {
    /// Items of this page
    pub items: Vec<T>,
    /// Size of the whole collection according to the server
    pub reported_total: usize,
}

impl PageResult<Value> {
    /// Parse the platform's `{"data": [...], "total": n}` envelope
    pub fn from_envelope(path: &str, envelope: Value) -> Result<Self, TransportError> {
        let Value::Object(mut fields) = envelope else {
            return Err(TransportError::decode(path, "page envelope is not a JSON object"));
        };

        let reported_total = fields
            .get("total")
            .and_then(Value::as_u64)
            .ok_or_else(|| TransportError::decode(path, "page envelope has no numeric total"))?;

        let items = match fields.remove("data") {
            Some(Value::Array(items)) => items,
            Some(Value::Null) | None => Vec::new(),
            Some(_) => {
                return Err(TransportError::decode(path, "page envelope data is not an array"))
            }
        };

        Ok(Self { items, reported_total: reported_total as usize })
    }
}

/// Pagination did not converge within the page ceiling
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error(
    "pagination stopped after {pages} pages: accumulated {accumulated} items but the server reports {reported_total}"
)]
pub struct AggregationInconsistency {
    /// Pages fetched
    pub pages: usize,
    /// Items received over those pages
    pub accumulated: usize,
    /// Total the server kept reporting
    pub reported_total: usize,
}

/// Sequential "fetch until complete" loop
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PaginatedAggregator {
    page_size: usize,
    max_pages: usize,
}

impl Default for PaginatedAggregator {
    fn default() -> Self {
        Self::from_config(&PaginationConfig::default())
    }
}

impl PaginatedAggregator {
    /// Both limits are raised to at least 1
    pub fn new(page_size: usize, max_pages: usize) -> Self {
        Self { page_size: page_size.max(1), max_pages: max_pages.max(1) }
    }

    /// Aggregator using the configured limits
    pub fn from_config(config: &PaginationConfig) -> Self {
        Self::new(config.page_size, config.max_pages)
    }

    /// Items requested per page
    pub fn page_size(&self) -> usize {
        self.page_size
    }

    /// Fetch every page and return the items in the order received
    ///
    /// Any page failure aborts the whole fetch with that error.
    pub async fn fetch_all<T, E, F, Fut>(&self, mut fetch_page: F) -> Result<Vec<T>, E>
    where
        F: FnMut(PageCursor) -> Fut,
        Fut: Future<Output = Result<PageResult<T>, E>>,
        E: From<AggregationInconsistency>,
    {
        let mut accumulated = Vec::new();
        let mut cursor = PageCursor { offset: 0, limit: self.page_size };
        let mut pages = 0;
        let mut reported_total = 0;

        loop {
            if pages == self.max_pages {
                warn!(pages, accumulated = accumulated.len(), reported_total, "pagination ceiling reached");
                return Err(AggregationInconsistency {
                    pages,
                    accumulated: accumulated.len(),
                    reported_total,
                }
                .into());
            }

            let page = fetch_page(cursor).await?;
            pages += 1;
            reported_total = page.reported_total;
            accumulated.extend(page.items);
            debug!(offset = cursor.offset, accumulated = accumulated.len(), reported_total, "page received");

            if accumulated.len() == reported_total {
                return Ok(accumulated);
            }
            cursor.offset += self.page_size;
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use parking_lot::Mutex;
    use serde_json::json;

    use super::*;

    #[derive(Debug, PartialEq)]
    enum FetchError {
        Page(String),
        Inconsistent(AggregationInconsistency),
    }

    impl From<AggregationInconsistency> for FetchError {
        fn from(err: AggregationInconsistency) -> Self {
            Self::Inconsistent(err)
        }
    }

    fn collection(total: usize) -> Vec<usize> {
        (0..total).collect()
    }

    #[tokio::test]
    async fn fetches_three_pages_for_250_items() {
        let source = collection(250);
        let cursors = Arc::new(Mutex::new(Vec::new()));
        let seen = Arc::clone(&cursors);

        let items = PaginatedAggregator::new(100, 1_000)
            .fetch_all(|cursor| {
                seen.lock().push(cursor);
                let end = (cursor.offset + cursor.limit).min(source.len());
                let page = source[cursor.offset..end].to_vec();
                async move { Ok::<_, FetchError>(PageResult { items: page, reported_total: 250 }) }
            })
            .await
            .expect("all pages");

        assert_eq!(items, source);
        let offsets: Vec<usize> = cursors.lock().iter().map(|c| c.offset).collect();
        assert_eq!(offsets, vec![0, 100, 200]);
        assert!(cursors.lock().iter().all(|c| c.limit == 100));
    }

    #[tokio::test]
    async fn empty_collection_needs_one_fetch() {
        let mut calls = 0;
        let items: Vec<u8> = PaginatedAggregator::default()
            .fetch_all(|_| {
                calls += 1;
                async { Ok::<_, FetchError>(PageResult { items: Vec::new(), reported_total: 0 }) }
            })
            .await
            .expect("empty");

        assert!(items.is_empty());
        assert_eq!(calls, 1);
    }

    #[tokio::test]
    async fn page_failure_aborts_without_partial_result() {
        let result: Result<Vec<usize>, FetchError> = PaginatedAggregator::new(10, 100)
            .fetch_all(|cursor| async move {
                if cursor.offset == 20 {
                    Err(FetchError::Page("boom".into()))
                } else {
                    Ok(PageResult { items: vec![0; 10], reported_total: 50 })
                }
            })
            .await;

        assert_eq!(result, Err(FetchError::Page("boom".into())));
    }

    #[tokio::test]
    async fn overreported_total_hits_ceiling() {
        let result: Result<Vec<usize>, FetchError> = PaginatedAggregator::new(10, 4)
            .fetch_all(|_| async { Ok(PageResult { items: Vec::new(), reported_total: 99 }) })
            .await;

        assert_eq!(
            result,
            Err(FetchError::Inconsistent(AggregationInconsistency {
                pages: 4,
                accumulated: 0,
                reported_total: 99,
            }))
        );
    }

    #[tokio::test]
    async fn duplicates_and_order_are_preserved() {
        let pages = vec![vec!["b", "a"], vec!["a", "c"]];
        let items = PaginatedAggregator::new(2, 10)
            .fetch_all(|cursor| {
                let page = pages[cursor.offset / 2].clone();
                async move { Ok::<_, FetchError>(PageResult { items: page, reported_total: 4 }) }
            })
            .await
            .expect("pages");

        assert_eq!(items, vec!["b", "a", "a", "c"]);
    }

    #[test]
    fn parses_envelope() {
        let page = PageResult::from_envelope(
            "/api/rainbow/enduser/v1.0/bubbles",
            json!({"data": [{"id": 1}, {"id": 2}], "total": 7, "limit": 2, "offset": 0}),
        )
        .expect("envelope");
        assert_eq!(page.items.len(), 2);
        assert_eq!(page.reported_total, 7);
    }

    #[test]
    fn rejects_envelope_without_total() {
        let err = PageResult::from_envelope("/groups", json!({"data": []})).unwrap_err();
        assert!(err.message.contains("total"));
        assert!(PageResult::from_envelope("/groups", json!([1, 2])).is_err());
        assert!(PageResult::from_envelope("/groups", json!({"data": {}, "total": 0})).is_err());
    }
}
