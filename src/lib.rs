// src/lib.rs
// EventLogger - Local-first interaction logger
//
// Architecture:
// - Domain: plain event and button values
// - Persistence: one store, a main context and background contexts, each
//   on its own serial worker; background commits merge into main
// - Repositories: generic CRUD + pagination over mappable entities
// - Application: paginated view models observing page state
// - Explicit wiring: the store is built once and passed by reference

pub mod application;
pub mod config;
pub mod db;
pub mod domain;
pub mod error;
pub mod events;
pub mod pagination;
pub mod repositories;
pub mod services;

// ============================================================================
// PUBLIC API
// ============================================================================

pub use application::{AppState, EventLogViewModel, MainViewModel};
pub use config::AppConfig;
pub use db::{
    ContextKind, ContextScope, ContextStats, ContextType, FetchRequest, Managed, ObjectRef,
    PersistenceContext, PersistentStore, Predicate, StoredRecord,
};
pub use domain::{ButtonData, ButtonEvent, EventDto};
pub use error::{AppError, AppResult, DataServiceError, IgnoreNoChanges};
pub use events::{ContextDidSave, EventBus};
pub use pagination::{FetchOutcome, PageSource, PageState, Paginator, FIRST_PAGE};
pub use repositories::{
    DomainMappable, EventRecord, EventRepository, Persistable, Repository, StoreMappable,
    StoreRepository,
};
pub use services::{
    DataLoadable, DataService, EventTracker, EventTrackerService, JsonFileDataService,
};
