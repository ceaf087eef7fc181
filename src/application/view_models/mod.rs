// src/application/view_models/mod.rs
//
// Data side of the two list screens. Rendering is left to the caller,
// which observes `PageState` snapshots.

pub mod event_log_view_model;
pub mod main_view_model;

pub use event_log_view_model::{EventLogViewModel, EventPages};
pub use main_view_model::{ButtonPages, MainViewModel};
