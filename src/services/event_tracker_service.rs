// src/services/event_tracker_service.rs
//
// Event Tracker Service - Interaction Recording
//
// CRITICAL RULES:
// - Thin facade over a repository of events
// - No storage access of its own
// - Errors pass through untouched

use async_trait::async_trait;
#[cfg(test)]
use mockall::automock;

use crate::domain::EventDto;
use crate::error::AppResult;
use crate::repositories::Repository;

#[cfg_attr(test, automock)]
#[async_trait]
pub trait EventTracker: Send + Sync {
    async fn create_event(&self, event: EventDto) -> AppResult<EventDto>;

    async fn delete_event(&self, id: i64) -> AppResult<()>;

    async fn fetch_events(&self, page: u32, limit: u32) -> AppResult<Vec<EventDto>>;

    async fn fetch_event(&self, id: i64) -> AppResult<Option<EventDto>>;

    async fn update_event(&self, event: EventDto) -> AppResult<EventDto>;
}

pub struct EventTrackerService<R> {
    repository: R,
}

impl<R> EventTrackerService<R>
where
    R: Repository<Model = EventDto>,
{
    pub fn new(repository: R) -> Self {
        Self { repository }
    }

    pub fn repository(&self) -> &R {
        &self.repository
    }
}

#[async_trait]
impl<R> EventTracker for EventTrackerService<R>
where
    R: Repository<Model = EventDto>,
{
    async fn create_event(&self, event: EventDto) -> AppResult<EventDto> {
        log::debug!("tracking {} on button {}", event.kind, event.id);
        self.repository.create(event).await
    }

    async fn delete_event(&self, id: i64) -> AppResult<()> {
        self.repository.delete(id).await
    }

    async fn fetch_events(&self, page: u32, limit: u32) -> AppResult<Vec<EventDto>> {
        self.repository.get(page, limit).await
    }

    async fn fetch_event(&self, id: i64) -> AppResult<Option<EventDto>> {
        self.repository.get_by_id(id).await
    }

    async fn update_event(&self, event: EventDto) -> AppResult<EventDto> {
        self.repository.update(event).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ButtonEvent;
    use crate::error::AppError;
    use std::sync::Mutex;

    /// In-memory repository recording the calls it receives
    #[derive(Default)]
    struct RecordingRepository {
        calls: Mutex<Vec<String>>,
    }

    impl RecordingRepository {
        fn record(&self, call: String) {
            self.calls.lock().unwrap().push(call);
        }
    }

    #[async_trait]
    impl Repository for RecordingRepository {
        type Model = EventDto;

        async fn create(&self, object: EventDto) -> AppResult<EventDto> {
            self.record(format!("create {}", object.id));
            Ok(object)
        }

        async fn create_many(&self, objects: Vec<EventDto>) -> AppResult<Vec<EventDto>> {
            Ok(objects)
        }

        async fn get(&self, page: u32, limit: u32) -> AppResult<Vec<EventDto>> {
            self.record(format!("get {page} {limit}"));
            Ok(Vec::new())
        }

        async fn get_by_id(&self, id: i64) -> AppResult<Option<EventDto>> {
            self.record(format!("get_by_id {id}"));
            Ok(None)
        }

        async fn update(&self, object: EventDto) -> AppResult<EventDto> {
            self.record(format!("update {}", object.id));
            Err(AppError::NotFound)
        }

        async fn delete(&self, id: i64) -> AppResult<()> {
            self.record(format!("delete {id}"));
            Ok(())
        }

        async fn create_or_update(&self, object: EventDto) -> AppResult<EventDto> {
            Ok(object)
        }
    }

    #[tokio::test]
    async fn test_calls_are_forwarded_to_repository() {
        let service = EventTrackerService::new(RecordingRepository::default());

        let event = EventDto::new(7, "X", ButtonEvent::Tap);
        assert_eq!(service.create_event(event.clone()).await.unwrap(), event);
        service.fetch_events(2, 10).await.unwrap();
        assert!(service.fetch_event(7).await.unwrap().is_none());
        service.delete_event(7).await.unwrap();

        let calls = service.repository().calls.lock().unwrap().clone();
        assert_eq!(calls, vec!["create 7", "get 2 10", "get_by_id 7", "delete 7"]);
    }

    #[tokio::test]
    async fn test_repository_errors_pass_through() {
        let service = EventTrackerService::new(RecordingRepository::default());

        let result = service
            .update_event(EventDto::new(1, "missing", ButtonEvent::LongPress))
            .await;
        assert!(matches!(result, Err(AppError::NotFound)));
    }
}
