// src/pagination/paginator.rs
//
// Paginated fetch protocol
//
// PRINCIPLES:
// 1. The first page replaces the accumulated items, later pages append
// 2. `has_more` is true iff a page came back full
// 3. A failed fetch only raises `has_error`; loaded items stay
// 4. One request per page at a time
// 5. Pages load one after another, so appends land in page order

use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::{watch, Mutex as AsyncMutex};
use tokio::task::JoinHandle;

use crate::error::AppResult;

/// Pages are numbered from 1
pub const FIRST_PAGE: u32 = 1;

/// Anything that can serve page `page` of `limit` items.
#[async_trait]
pub trait PageSource: Send + Sync + 'static {
    type Item: Clone + Send + Sync + 'static;

    async fn load_page(&self, page: u32, limit: u32) -> AppResult<Vec<Self::Item>>;
}

/// Observable state of one paginated list
#[derive(Debug, Clone, PartialEq)]
pub struct PageState<T> {
    pub current_page: u32,
    pub items: Vec<T>,
    pub has_more: bool,
    pub has_error: bool,
}

impl<T> Default for PageState<T> {
    fn default() -> Self {
        Self {
            current_page: FIRST_PAGE,
            items: Vec::new(),
            has_more: true,
            has_error: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchOutcome {
    /// First page loaded; carries the page length
    Replaced(usize),
    Appended(usize),
    Failed,
    /// The page was already being fetched
    Skipped,
}

// Releases the page on every exit path, cancellation included
struct InFlight<'a> {
    pages: &'a Mutex<HashSet<u32>>,
    page: u32,
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.pages
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.page);
    }
}

pub struct Paginator<S: PageSource> {
    source: S,
    limit: u32,
    state: watch::Sender<PageState<S::Item>>,
    in_flight: Mutex<HashSet<u32>>,
    // held from picking a page until its result is applied
    sequence: AsyncMutex<()>,
}

impl<S: PageSource> Paginator<S> {
    pub fn new(source: S, limit: u32) -> Self {
        let (state, _) = watch::channel(PageState::default());
        Self {
            source,
            limit,
            state,
            in_flight: Mutex::new(HashSet::new()),
            sequence: AsyncMutex::new(()),
        }
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    pub fn limit(&self) -> u32 {
        self.limit
    }

    /// Receiver notified on every state change
    pub fn subscribe(&self) -> watch::Receiver<PageState<S::Item>> {
        self.state.subscribe()
    }

    pub fn state(&self) -> PageState<S::Item> {
        self.state.borrow().clone()
    }

    pub fn current_page(&self) -> u32 {
        self.state.borrow().current_page
    }

    fn begin(&self, page: u32) -> Option<InFlight<'_>> {
        let mut pages = self
            .in_flight
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if !pages.insert(page) {
            return None;
        }
        Some(InFlight {
            pages: &self.in_flight,
            page,
        })
    }

    /// Load `page` and fold it into the state.
    ///
    /// Waits for any fetch already running; a second request for a page that
    /// is queued or loading is skipped.
    pub async fn fetch(&self, page: u32) -> FetchOutcome {
        let Some(_guard) = self.begin(page) else {
            log::warn!("page {} is already being fetched, skipping", page);
            return FetchOutcome::Skipped;
        };
        let _sequence = self.sequence.lock().await;
        self.load_and_apply(page).await
    }

    // Caller holds `sequence` and the in-flight entry for `page`
    async fn load_and_apply(&self, page: u32) -> FetchOutcome {
        let result = self.source.load_page(page, self.limit).await;
        let limit = self.limit as usize;

        let mut outcome = FetchOutcome::Failed;
        self.state.send_modify(|state| match result {
            Ok(items) => {
                let count = items.len();
                state.has_more = count >= limit;
                state.has_error = false;
                if page == FIRST_PAGE {
                    state.items = items;
                    outcome = FetchOutcome::Replaced(count);
                } else {
                    state.items.extend(items);
                    outcome = FetchOutcome::Appended(count);
                }
            }
            Err(e) => {
                log::warn!("fetching page {} failed: {}", page, e);
                state.has_error = true;
            }
        });

        outcome
    }

    pub async fn fetch_current(&self) -> FetchOutcome {
        self.fetch(self.current_page()).await
    }

    /// Advance to the next page and fetch it.
    ///
    /// The page is picked only once earlier fetches finished, so concurrent
    /// bumps append consecutive pages in order.
    pub async fn bump_page(&self) -> FetchOutcome {
        let _sequence = self.sequence.lock().await;

        let mut next = FIRST_PAGE;
        self.state.send_modify(|state| {
            state.current_page += 1;
            next = state.current_page;
        });

        let Some(_guard) = self.begin(next) else {
            log::warn!("page {} is already being fetched, skipping", next);
            return FetchOutcome::Skipped;
        };
        self.load_and_apply(next).await
    }

    /// Start the sequence over from the first page.
    pub async fn restart(&self) -> FetchOutcome {
        self.state
            .send_modify(|state| state.current_page = FIRST_PAGE);
        self.fetch(FIRST_PAGE).await
    }

    /// Re-issue the fetch for the current page, e.g. after an error.
    pub async fn retry(&self) -> FetchOutcome {
        self.fetch_current().await
    }

    pub fn spawn_fetch(self: &Arc<Self>) -> JoinHandle<FetchOutcome> {
        let paginator = Arc::clone(self);
        tokio::spawn(async move { paginator.fetch_current().await })
    }

    pub fn spawn_bump(self: &Arc<Self>) -> JoinHandle<FetchOutcome> {
        let paginator = Arc::clone(self);
        tokio::spawn(async move { paginator.bump_page().await })
    }
}
