// src/events/mod.rs
//
// Internal notification system - public API
//
// CRITICAL: the type-erased handler alias stays private to the bus module

pub mod bus;
pub mod types;

pub use bus::{EventBus, EventLogEntry, EVENT_LOG_CAPACITY};
pub use types::{ContextDidSave, DeletedObject, DomainEvent, SavedObject};

/// Initialize a new event bus
pub fn create_event_bus() -> EventBus {
    EventBus::new()
}
