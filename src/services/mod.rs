// src/services/mod.rs
//
// Services Module - Orchestration Layer

pub mod button_data_service;
pub mod event_tracker_service;

pub use button_data_service::{DataLoadable, DataService, JsonFileDataService};
pub use event_tracker_service::{EventTracker, EventTrackerService};

#[cfg(test)]
pub use button_data_service::MockDataLoadable;
#[cfg(test)]
pub use event_tracker_service::MockEventTracker;
