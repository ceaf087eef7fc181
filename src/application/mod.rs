// src/application/mod.rs
//
// Application Layer
//
// ARCHITECTURE:
// - Sits above services and the store
// - Exposes observable list state to whatever renders it
// - Never touches storage directly

pub mod state;
pub mod view_models;

pub use state::AppState;
pub use view_models::{ButtonPages, EventLogViewModel, EventPages, MainViewModel};
