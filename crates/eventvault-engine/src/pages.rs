//! Paginated scans over a storage adapter.

use std::sync::Arc;

use eventvault_core::error::Result;
use eventvault_core::event::Event;
use eventvault_core::query::EventFilter;
use eventvault_core::storage::StorageAdapter;

/// Continuation token of a paginated scan: the number of matching events
/// already consumed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageToken {
    /// Events to skip to reach the next page.
    pub skip: usize,
}

/// A lazy sequence of event pages. Nothing is read until `next_page` is
/// called, and a scan can be resumed elsewhere from its `continuation`.
pub struct EventPages {
    adapter: Arc<dyn StorageAdapter>,
    filter: EventFilter,
    page_size: usize,
    token: Option<PageToken>,
}

impl EventPages {
    /// Starts a scan at the first matching event.
    #[must_use]
    pub fn new(adapter: Arc<dyn StorageAdapter>, filter: EventFilter, page_size: usize) -> Self {
        Self::resume(adapter, filter, page_size, PageToken { skip: 0 })
    }

    /// Resumes a scan from a continuation token.
    #[must_use]
    pub fn resume(
        adapter: Arc<dyn StorageAdapter>,
        filter: EventFilter,
        page_size: usize,
        token: PageToken,
    ) -> Self {
        Self {
            adapter,
            filter,
            page_size: page_size.max(1),
            token: Some(token),
        }
    }

    /// Token for the next page, or `None` once the scan is exhausted.
    #[must_use]
    pub fn continuation(&self) -> Option<PageToken> {
        self.token
    }

    /// Fetches the next page. Returns `None` once the scan is exhausted.
    ///
    /// # Errors
    ///
    /// Returns the adapter's error; the token is left unchanged so the
    /// same page can be retried.
    pub async fn next_page(&mut self) -> Result<Option<Vec<Event>>> {
        let Some(token) = self.token else {
            return Ok(None);
        };
        let page = self
            .adapter
            .find_events(&self.filter, token.skip, Some(self.page_size))
            .await?;

        self.token = (page.len() == self.page_size).then(|| PageToken {
            skip: token.skip + page.len(),
        });
        Ok((!page.is_empty()).then_some(page))
    }

    /// Drains the remaining pages into one vector.
    ///
    /// # Errors
    ///
    /// Returns the first adapter error encountered.
    pub async fn collect_all(mut self) -> Result<Vec<Event>> {
        let mut events = Vec::new();
        while let Some(page) = self.next_page().await? {
            events.extend(page);
        }
        Ok(events)
    }
}
