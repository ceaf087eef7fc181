// src/application/state.rs
//
// Application state: the single store and everything built on it.
// Constructed once in main.rs and passed by reference.

use std::sync::Arc;

use crate::application::view_models::{EventLogViewModel, MainViewModel};
use crate::config::AppConfig;
use crate::db::PersistentStore;
use crate::error::AppResult;
use crate::events::EventBus;
use crate::repositories::EventRepository;
use crate::services::{DataLoadable, DataService, EventTracker, EventTrackerService};

pub struct AppState {
    pub config: AppConfig,
    pub store: Arc<PersistentStore>,
    pub tracker: Arc<dyn EventTracker>,
    pub main_view_model: MainViewModel,
    pub event_log_view_model: EventLogViewModel,
}

impl AppState {
    /// Open the configured store and wire the mock button generator.
    pub fn initialize(config: AppConfig) -> AppResult<Self> {
        let store = Arc::new(PersistentStore::from_config(&config)?);
        Ok(Self::with_store(config, store, Arc::new(DataService::new())))
    }

    pub fn with_store(
        config: AppConfig,
        store: Arc<PersistentStore>,
        data_service: Arc<dyn DataLoadable>,
    ) -> Self {
        let repository = EventRepository::new(Arc::clone(&store));
        let tracker: Arc<dyn EventTracker> = Arc::new(EventTrackerService::new(repository));

        let main_view_model = MainViewModel::with_page_size(
            data_service,
            Arc::clone(&tracker),
            config.buttons_per_page,
        );
        let event_log_view_model =
            EventLogViewModel::with_page_size(Arc::clone(&tracker), config.events_per_page);

        Self {
            config,
            store,
            tracker,
            main_view_model,
            event_log_view_model,
        }
    }

    pub fn event_bus(&self) -> &Arc<EventBus> {
        self.store.event_bus()
    }
}
