//! Client-side accumulation of the paginated pending-log listing.

use std::collections::HashSet;
use std::sync::Arc;

use thiserror::Error;
use tracing::{debug, info, warn};

use crate::api::{ApiError, PendingLogSource};
use crate::model::{LogPage, LogRecord, PageQuery, ReviewStatus};

pub const DEFAULT_PAGE_SIZE: u32 = 6;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ListError {
    #[error("invalid page request (page {page}, size {size}); pages start at 1 and hold at least one record")]
    InvalidPage { page: u32, size: u32 },

    #[error("page {0} is already loading")]
    Busy(u32),

    #[error("no request for page {0} is in flight")]
    NotInFlight(u32),

    #[error(transparent)]
    Api(#[from] ApiError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListState {
    /// Nothing requested yet.
    Idle,
    Loading,
    HasMore,
    Exhausted,
}

/// Pending log records accumulated page by page.
///
/// Page 1 replaces whatever was loaded, later pages append in fetch order.
/// A failed fetch leaves records, page counter and `has_more` untouched so
/// the same page can be requested again.
pub struct PaginatedLogList<S> {
    source: Arc<S>,
    status: ReviewStatus,
    page_size: u32,
    records: Vec<LogRecord>,
    seen: HashSet<String>,
    page: u32,
    has_more: bool,
    loaded_once: bool,
    in_flight: Option<PageQuery>,
    last_error: Option<ApiError>,
}

impl<S: PendingLogSource> PaginatedLogList<S> {
    pub fn new(source: Arc<S>) -> Self {
        Self::with_page_size(source, DEFAULT_PAGE_SIZE)
    }

    pub fn with_page_size(source: Arc<S>, page_size: u32) -> Self {
        Self {
            source,
            status: ReviewStatus::Pending,
            page_size: page_size.max(1),
            records: Vec::new(),
            seen: HashSet::new(),
            page: 0,
            has_more: true,
            loaded_once: false,
            in_flight: None,
            last_error: None,
        }
    }

    pub fn records(&self) -> &[LogRecord] {
        &self.records
    }

    /// Last page successfully loaded, 0 before the first load.
    pub fn page(&self) -> u32 {
        self.page
    }

    pub fn page_size(&self) -> u32 {
        self.page_size
    }

    pub fn has_more(&self) -> bool {
        self.has_more
    }

    pub fn is_loading(&self) -> bool {
        self.in_flight.is_some()
    }

    pub fn last_error(&self) -> Option<&ApiError> {
        self.last_error.as_ref()
    }

    /// The listing loaded successfully and there is nothing pending.
    pub fn is_empty_result(&self) -> bool {
        self.loaded_once && self.records.is_empty() && !self.has_more
    }

    pub fn state(&self) -> ListState {
        if self.in_flight.is_some() {
            ListState::Loading
        } else if !self.loaded_once && self.last_error.is_none() {
            ListState::Idle
        } else if self.has_more {
            ListState::HasMore
        } else {
            ListState::Exhausted
        }
    }

    /// Marks `page` as loading and returns the request to send.
    pub fn begin_page(&mut self, page: u32, size: u32) -> Result<PageQuery, ListError> {
        if page == 0 || size == 0 {
            return Err(ListError::InvalidPage { page, size });
        }
        if let Some(in_flight) = self.in_flight {
            return Err(ListError::Busy(in_flight.page));
        }
        let query = PageQuery {
            status: self.status,
            page,
            limit: size,
        };
        debug!(page, size, "loading pending logs");
        self.in_flight = Some(query);
        Ok(query)
    }

    /// The request for the next page, or `None` while loading or once the
    /// listing is exhausted.
    pub fn begin_more(&mut self) -> Option<PageQuery> {
        if self.in_flight.is_some() || !self.has_more {
            debug!(loading = self.in_flight.is_some(), has_more = self.has_more, "load more ignored");
            return None;
        }
        self.begin_page(self.page + 1, self.page_size).ok()
    }

    /// Applies the result of `query`. Returns how many records were added.
    pub fn complete(&mut self, query: PageQuery, result: Result<LogPage, ApiError>) -> Result<usize, ListError> {
        if self.in_flight != Some(query) {
            return Err(ListError::NotInFlight(query.page));
        }
        self.in_flight = None;

        let page = match result {
            Ok(page) => page,
            Err(e) => {
                warn!(%e, page = query.page, "failed to fetch pending logs");
                self.last_error = Some(e.clone());
                return Err(e.into());
            }
        };

        if query.page == 1 {
            self.records.clear();
            self.seen.clear();
        }
        let before = self.records.len();
        for record in page.logs {
            if self.seen.insert(record.log_id.clone()) {
                self.records.push(record);
            } else {
                warn!(log_id = %record.log_id, page = query.page, "dropping duplicate log record");
            }
        }
        let added = self.records.len() - before;

        self.page = query.page;
        self.page_size = query.limit;
        self.has_more = page.has_more;
        self.loaded_once = true;
        self.last_error = None;
        info!(page = query.page, added, total = self.records.len(), has_more = self.has_more, "loaded pending logs");
        Ok(added)
    }

    /// Forgets an in-flight request whose future was dropped.
    pub fn cancel(&mut self) -> Option<PageQuery> {
        self.in_flight.take()
    }

    async fn fetch(&mut self, query: PageQuery) -> Result<usize, ListError> {
        let source = self.source.clone();
        let request = InFlight {
            list: self,
            query,
            done: false,
        };
        let result = source.pending_logs(query).await;
        request.finish(result)
    }

    /// Dropping the returned future before it resolves abandons the request
    /// and leaves the list idle.
    pub async fn load_page(&mut self, page: u32, size: u32) -> Result<usize, ListError> {
        let query = self.begin_page(page, size)?;
        self.fetch(query).await
    }

    /// Loads the next page. `None` means nothing was requested.
    pub async fn load_more(&mut self) -> Option<Result<usize, ListError>> {
        let query = self.begin_more()?;
        Some(self.fetch(query).await)
    }

    pub async fn refresh(&mut self) -> Result<usize, ListError> {
        self.load_page(1, self.page_size).await
    }

    /// Refreshes and keeps loading until `limit` pages are loaded (all pages
    /// for `None`). Stops at the first failure.
    pub async fn load_pages(&mut self, limit: Option<u32>) -> Result<usize, ListError> {
        let mut added = self.refresh().await?;
        while limit.map_or(true, |limit| self.page < limit) {
            match self.load_more().await {
                Some(result) => added += result?,
                None => break,
            }
        }
        Ok(added)
    }
}

/// Clears the in-flight marker unless the request was completed.
struct InFlight<'a, S> {
    list: &'a mut PaginatedLogList<S>,
    query: PageQuery,
    done: bool,
}

impl<S: PendingLogSource> InFlight<'_, S> {
    fn finish(mut self, result: Result<LogPage, ApiError>) -> Result<usize, ListError> {
        self.done = true;
        self.list.complete(self.query, result)
    }
}

impl<S> Drop for InFlight<'_, S> {
    fn drop(&mut self) {
        if !self.done && self.list.in_flight == Some(self.query) {
            debug!(page = self.query.page, "pending log request abandoned");
            self.list.in_flight = None;
        }
    }
}
