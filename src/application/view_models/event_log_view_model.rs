// src/application/view_models/event_log_view_model.rs
//
// Paginated log of tracked events

use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::domain::EventDto;
use crate::error::AppResult;
use crate::pagination::{FetchOutcome, PageSource, PageState, Paginator};
use crate::services::EventTracker;

/// Event pages read through the tracker
pub struct EventPages {
    tracker: Arc<dyn EventTracker>,
}

#[async_trait]
impl PageSource for EventPages {
    type Item = EventDto;

    async fn load_page(&self, page: u32, limit: u32) -> AppResult<Vec<EventDto>> {
        self.tracker.fetch_events(page, limit).await
    }
}

pub struct EventLogViewModel {
    events: Arc<Paginator<EventPages>>,
}

impl EventLogViewModel {
    pub const ITEMS_PER_PAGE: u32 = 10;

    pub fn new(tracker: Arc<dyn EventTracker>) -> Self {
        Self::with_page_size(tracker, Self::ITEMS_PER_PAGE)
    }

    pub fn with_page_size(tracker: Arc<dyn EventTracker>, per_page: u32) -> Self {
        Self {
            events: Arc::new(Paginator::new(EventPages { tracker }, per_page)),
        }
    }

    pub fn events(&self) -> &Arc<Paginator<EventPages>> {
        &self.events
    }

    pub fn state(&self) -> PageState<EventDto> {
        self.events.state()
    }

    pub fn subscribe(&self) -> watch::Receiver<PageState<EventDto>> {
        self.events.subscribe()
    }

    pub fn fetch_events(&self) -> JoinHandle<FetchOutcome> {
        self.events.spawn_fetch()
    }

    pub fn bump_page(&self) -> JoinHandle<FetchOutcome> {
        self.events.spawn_bump()
    }

    /// Reload from the first page, e.g. when the log is shown again.
    pub async fn refresh(&self) -> FetchOutcome {
        self.events.restart().await
    }

    pub fn formatted(&self, event: &EventDto) -> String {
        event.describe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{format_timestamp, ButtonEvent};
    use crate::error::AppError;
    use crate::services::MockEventTracker;
    use chrono::Utc;
    use mockall::predicate::eq;

    fn events(count: i64) -> Vec<EventDto> {
        (0..count)
            .map(|i| EventDto {
                created_at: Some(Utc::now()),
                ..EventDto::new(i % 2 + 1, format!("Event {}", i % 2 + 1), ButtonEvent::Tap)
            })
            .collect()
    }

    #[tokio::test]
    async fn test_full_page_keeps_has_more() {
        let page = events(10);
        let expected = page.clone();
        let mut tracker = MockEventTracker::new();
        tracker
            .expect_fetch_events()
            .with(eq(1), eq(10))
            .returning(move |_, _| Ok(page.clone()));

        let view_model = EventLogViewModel::new(Arc::new(tracker));
        view_model.fetch_events().await.unwrap();

        let state = view_model.state();
        assert_eq!(state.items, expected);
        assert!(state.has_more);
    }

    #[tokio::test]
    async fn test_short_page_ends_the_log() {
        let mut tracker = MockEventTracker::new();
        tracker.expect_fetch_events().returning(|_, _| Ok(events(1)));

        let view_model = EventLogViewModel::new(Arc::new(tracker));
        view_model.fetch_events().await.unwrap();

        assert!(!view_model.state().has_more);
    }

    #[tokio::test]
    async fn test_bump_page_appends_next_page() {
        let mut tracker = MockEventTracker::new();
        tracker
            .expect_fetch_events()
            .with(eq(1), eq(10))
            .returning(|_, _| Ok(vec![EventDto::new(1, "Event 1", ButtonEvent::Tap)]));
        tracker
            .expect_fetch_events()
            .with(eq(2), eq(10))
            .returning(|_, _| Ok(vec![EventDto::new(2, "Event 2", ButtonEvent::DoubleTap)]));

        let view_model = EventLogViewModel::new(Arc::new(tracker));
        view_model.fetch_events().await.unwrap();
        view_model.bump_page().await.unwrap();

        let ids: Vec<i64> = view_model.state().items.iter().map(|e| e.id).collect();
        assert_eq!(ids, vec![1, 2]);
    }

    #[tokio::test]
    async fn test_error_does_not_touch_events() {
        let mut tracker = MockEventTracker::new();
        tracker
            .expect_fetch_events()
            .returning(|_, _| Err(AppError::Other("TestError".to_string())));

        let view_model = EventLogViewModel::new(Arc::new(tracker));
        view_model.fetch_events().await.unwrap();

        let state = view_model.state();
        assert!(state.items.is_empty());
        assert!(state.has_more);
        assert!(state.has_error);
    }

    #[test]
    fn test_formatted_with_and_without_timestamp() {
        let view_model = EventLogViewModel::new(Arc::new(MockEventTracker::new()));
        let now = Utc::now();

        let stamped = EventDto {
            created_at: Some(now),
            ..EventDto::new(1, "Test Event", ButtonEvent::Tap)
        };
        assert_eq!(
            view_model.formatted(&stamped),
            format!("Test Event was tap at {} with ID: 1", format_timestamp(now))
        );

        let unstamped = EventDto::new(1, "Test Event", ButtonEvent::Tap);
        assert_eq!(view_model.formatted(&unstamped), "Test Event was tap with ID: 1");
    }
}
