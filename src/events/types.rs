// events/types.rs
//
// Notifications published on the event bus.
// Each event is an immutable fact that has already happened.

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::db::record::ManagedRecord;
use crate::db::ContextDescriptor;

/// Trait that all bus events must implement
pub trait DomainEvent: std::fmt::Debug + Clone {
    /// Unique identifier for this event instance
    fn event_id(&self) -> Uuid;

    /// When this event occurred
    fn occurred_at(&self) -> DateTime<Utc>;

    /// Human-readable event type name
    fn event_type(&self) -> &'static str;
}

/// A record written by a commit, with its committed values
#[derive(Debug, Clone)]
pub struct SavedObject {
    pub entity: &'static str,
    pub row_id: i64,
    pub record: Box<dyn ManagedRecord>,
}

/// A record removed by a commit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DeletedObject {
    pub entity: &'static str,
    pub row_id: i64,
}

/// Emitted by a context right after its transaction committed
#[derive(Debug, Clone)]
pub struct ContextDidSave {
    pub event_id: Uuid,
    pub occurred_at: DateTime<Utc>,
    pub origin: ContextDescriptor,
    pub inserted: Vec<SavedObject>,
    pub updated: Vec<SavedObject>,
    pub deleted: Vec<DeletedObject>,
}

impl ContextDidSave {
    pub fn new(
        origin: ContextDescriptor,
        inserted: Vec<SavedObject>,
        updated: Vec<SavedObject>,
        deleted: Vec<DeletedObject>,
    ) -> Self {
        Self {
            event_id: Uuid::new_v4(),
            occurred_at: Utc::now(),
            origin,
            inserted,
            updated,
            deleted,
        }
    }

    pub fn change_count(&self) -> usize {
        self.inserted.len() + self.updated.len() + self.deleted.len()
    }
}

impl DomainEvent for ContextDidSave {
    fn event_id(&self) -> Uuid { self.event_id }
    fn occurred_at(&self) -> DateTime<Utc> { self.occurred_at }
    fn event_type(&self) -> &'static str { "ContextDidSave" }
}
