// src/repositories/mapping.rs
//
// Entity mapping contracts
//
// A domain object and its stored record convert into each other through
// these traits. Each concrete entity provides both directions.

use crate::db::{ContextScope, ObjectRef, StoredRecord};

/// Anything addressable by a domain identifier.
pub trait Persistable {
    fn id(&self) -> i64;
}

/// Domain -> stored.
pub trait StoreMappable: Persistable + Clone + Send + Sync + 'static {
    type Stored: StoredRecord + DomainMappable<Domain = Self>;

    /// Register a brand-new record in `scope` holding a copy of every field.
    /// The creation time is stamped as "now", whatever `self` carries.
    fn to_stored(&self, scope: &mut ContextScope) -> ObjectRef<Self::Stored>;

    /// Copy every field onto `existing` except the creation time.
    fn to_stored_existing(&self, existing: &mut Self::Stored);
}

/// Stored -> domain.
///
/// Lenient: a record missing required fields maps to a fallback object
/// instead of failing.
pub trait DomainMappable {
    type Domain;

    fn to_domain(&self) -> Self::Domain;
}
