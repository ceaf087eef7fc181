// src/repositories/mod.rs
//
// Repository layer
//
// CRITICAL RULES:
// - Repositories are DUMB data mappers
// - NO business logic
// - NO event emission (contexts announce their own commits)
// - NO cross-repository calls
// - Storage access only through persistence contexts

pub mod event_record;
pub mod mapping;
pub mod store_repository;

pub use event_record::EventRecord;
pub use mapping::{DomainMappable, Persistable, StoreMappable};
pub use store_repository::{page_request, Repository, StoreRepository};

/// Repository of tracked events
pub type EventRepository = StoreRepository<crate::domain::EventDto>;
