// src/application/view_models/main_view_model.rs
//
// Button list + interaction tracking

use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::domain::{ButtonData, ButtonEvent, EventDto};
use crate::error::AppResult;
use crate::pagination::{FetchOutcome, PageSource, PageState, Paginator};
use crate::services::{DataLoadable, EventTracker};

/// Button pages served by a data collaborator
pub struct ButtonPages {
    loader: Arc<dyn DataLoadable>,
}

#[async_trait]
impl PageSource for ButtonPages {
    type Item = ButtonData;

    async fn load_page(&self, page: u32, limit: u32) -> AppResult<Vec<ButtonData>> {
        Ok(self.loader.load_data(page, limit).await?)
    }
}

pub struct MainViewModel {
    buttons: Arc<Paginator<ButtonPages>>,
    tracker: Arc<dyn EventTracker>,
}

impl MainViewModel {
    pub const ITEMS_PER_PAGE: u32 = 20;

    pub fn new(data_service: Arc<dyn DataLoadable>, tracker: Arc<dyn EventTracker>) -> Self {
        Self::with_page_size(data_service, tracker, Self::ITEMS_PER_PAGE)
    }

    pub fn with_page_size(
        data_service: Arc<dyn DataLoadable>,
        tracker: Arc<dyn EventTracker>,
        per_page: u32,
    ) -> Self {
        Self {
            buttons: Arc::new(Paginator::new(
                ButtonPages {
                    loader: data_service,
                },
                per_page,
            )),
            tracker,
        }
    }

    pub fn buttons(&self) -> &Arc<Paginator<ButtonPages>> {
        &self.buttons
    }

    pub fn state(&self) -> PageState<ButtonData> {
        self.buttons.state()
    }

    pub fn subscribe(&self) -> watch::Receiver<PageState<ButtonData>> {
        self.buttons.subscribe()
    }

    /// Fetch the current page in the background.
    pub fn fetch_button_datasource(&self) -> JoinHandle<FetchOutcome> {
        self.buttons.spawn_fetch()
    }

    /// Advance to the next page and fetch it in the background.
    pub fn bump_page(&self) -> JoinHandle<FetchOutcome> {
        self.buttons.spawn_bump()
    }

    /// Record `kind` on `button`. The store stamps the creation time.
    pub fn track_event(&self, button: &ButtonData, kind: ButtonEvent) -> JoinHandle<AppResult<EventDto>> {
        let event = EventDto::from_interaction(button, kind);
        let tracker = Arc::clone(&self.tracker);

        tokio::spawn(async move {
            let result = tracker.create_event(event).await;
            if let Err(e) = &result {
                log::error!("failed to track interaction: {}", e);
            }
            result
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{AppError, DataServiceError};
    use crate::services::{MockDataLoadable, MockEventTracker};
    use mockall::predicate::eq;
    use mockall::Sequence;

    fn buttons(range: std::ops::Range<i64>) -> Vec<ButtonData> {
        range.map(|i| ButtonData::new(i, format!("Button {}", i))).collect()
    }

    #[tokio::test]
    async fn test_pages_are_requested_with_twenty_items() {
        let mut loader = MockDataLoadable::new();
        let mut seq = Sequence::new();
        loader
            .expect_load_data()
            .with(eq(1), eq(20))
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _| Ok(buttons(0..20)));
        loader
            .expect_load_data()
            .with(eq(2), eq(20))
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _| Ok(buttons(20..25)));

        let view_model = MainViewModel::new(Arc::new(loader), Arc::new(MockEventTracker::new()));

        view_model.fetch_button_datasource().await.unwrap();
        assert!(view_model.state().has_more);

        view_model.bump_page().await.unwrap();
        let state = view_model.state();
        assert_eq!(state.items, buttons(0..25));
        assert!(!state.has_more);
        assert_eq!(state.current_page, 2);
    }

    #[tokio::test]
    async fn test_load_failure_raises_error_flag() {
        let mut loader = MockDataLoadable::new();
        loader
            .expect_load_data()
            .returning(|_, _| Err(DataServiceError::Unknown));

        let view_model = MainViewModel::new(Arc::new(loader), Arc::new(MockEventTracker::new()));

        assert_eq!(
            view_model.fetch_button_datasource().await.unwrap(),
            FetchOutcome::Failed
        );
        let state = view_model.state();
        assert!(state.has_error);
        assert!(state.items.is_empty());
    }

    /// PROVES: tracking builds an untimestamped event from the button
    #[tokio::test]
    async fn test_track_event_sends_event_without_timestamp() {
        let mut tracker = MockEventTracker::new();
        tracker
            .expect_create_event()
            .withf(|event| {
                *event == EventDto {
                    id: 7,
                    title: "X".to_string(),
                    kind: ButtonEvent::Tap,
                    created_at: None,
                }
            })
            .times(1)
            .returning(Ok);

        let view_model = MainViewModel::new(Arc::new(MockDataLoadable::new()), Arc::new(tracker));

        let tracked = view_model
            .track_event(&ButtonData::new(7, "X"), ButtonEvent::Tap)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(tracked.id, 7);
    }

    #[tokio::test]
    async fn test_track_event_failure_is_returned() {
        let mut tracker = MockEventTracker::new();
        tracker
            .expect_create_event()
            .returning(|_| Err(AppError::ContextClosed("background".to_string())));

        let view_model = MainViewModel::new(Arc::new(MockDataLoadable::new()), Arc::new(tracker));

        let result = view_model
            .track_event(&ButtonData::new(1, "Button 1"), ButtonEvent::LongPress)
            .await
            .unwrap();
        assert!(matches!(result, Err(AppError::ContextClosed(_))));
    }
}
