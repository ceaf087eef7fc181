// src/db/mod.rs
//
// Database module
//
// Provides:
// - Connection pooling
// - Schema migrations
// - Stored records and fetch requests
// - Persistence contexts and the store that owns them

pub mod connection;
pub mod context;
pub mod migrations;
pub mod record;
pub mod store;

pub use connection::{
    create_connection_pool, get_connection, get_database_path, ConnectionPool, PooledConn,
};

pub use context::{
    ContextDescriptor, ContextKind, ContextScope, ContextStats, PersistenceContext, WeakContext,
};

pub use migrations::{initialize_database, verify_database_integrity};

pub use record::{FetchRequest, Managed, ManagedRecord, ObjectRef, Predicate, SortDescriptor, StoredRecord};

pub use store::{ContextType, PersistentStore};
