// src/db/store.rs
//
// Persistent store
//
// Owns the connection pool, the main context and the shared background
// context. Background commits are merged into the main context through the
// event bus, so records read on main reflect background writes.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use crate::config::AppConfig;
use crate::db::connection::{create_connection_pool, get_connection, get_database_path, ConnectionPool};
use crate::db::context::{ContextDescriptor, ContextKind, PersistenceContext};
use crate::db::migrations::{initialize_database, verify_database_integrity};
use crate::db::record::{FetchRequest, Managed, ObjectRef, StoredRecord};
use crate::error::{AppError, AppResult};
use crate::events::{create_event_bus, ContextDidSave, EventBus};

const MAIN_CONTEXT_ID: u64 = 1;

/// Selects the context an operation runs on.
#[derive(Debug, Clone, Default)]
pub enum ContextType {
    Main,
    /// The store's shared background context, created on first use
    #[default]
    Background,
    Custom(PersistenceContext),
}

pub struct PersistentStore {
    path: PathBuf,
    pool: Arc<ConnectionPool>,
    bus: Arc<EventBus>,
    main: PersistenceContext,
    background: Mutex<Option<PersistenceContext>>,
    next_context_id: AtomicU64,
}

impl PersistentStore {
    /// Open (or create) the store at `path` with up to `pool_size` connections.
    pub fn open(path: &Path, pool_size: u32) -> AppResult<Self> {
        let pool = Arc::new(create_connection_pool(path, pool_size)?);

        {
            let conn = get_connection(&pool)?;
            initialize_database(&conn)?;
        }

        let bus = Arc::new(create_event_bus());
        let main = PersistenceContext::spawn(
            ContextDescriptor::new(MAIN_CONTEXT_ID, ContextKind::Main, "main"),
            get_connection(&pool)?,
            Arc::clone(&bus),
        )?;

        let merge_target = main.downgrade();
        bus.subscribe::<ContextDidSave, _>(move |event| {
            if event.origin.kind != ContextKind::Background {
                return;
            }
            let Some(main) = merge_target.upgrade() else {
                log::debug!("main context gone, dropping merge from '{}'", event.origin.name);
                return;
            };
            if let Err(e) = main.enqueue_merge(event.clone()) {
                log::warn!("failed to merge '{}' into main: {}", event.origin.name, e);
            }
        });

        log::info!("persistent store opened at {}", path.display());

        Ok(Self {
            path: path.to_path_buf(),
            pool,
            bus,
            main,
            background: Mutex::new(None),
            next_context_id: AtomicU64::new(MAIN_CONTEXT_ID + 1),
        })
    }

    /// Open the store configured by `config`, defaulting to the platform data directory.
    pub fn from_config(config: &AppConfig) -> AppResult<Self> {
        let path = match &config.database_path {
            Some(path) => path.clone(),
            None => get_database_path()?,
        };
        Self::open(&path, config.pool_size)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn event_bus(&self) -> &Arc<EventBus> {
        &self.bus
    }

    pub fn main_context(&self) -> &PersistenceContext {
        &self.main
    }

    /// A fresh background context with its own connection and registry.
    pub fn new_background_context(&self) -> AppResult<PersistenceContext> {
        let id = self.next_context_id.fetch_add(1, Ordering::SeqCst);
        PersistenceContext::spawn(
            ContextDescriptor::new(id, ContextKind::Background, format!("background-{id}")),
            get_connection(&self.pool)?,
            Arc::clone(&self.bus),
        )
    }

    /// Resolve `ty` to a concrete context.
    pub fn context(&self, ty: ContextType) -> AppResult<PersistenceContext> {
        match ty {
            ContextType::Main => Ok(self.main.clone()),
            ContextType::Custom(context) => Ok(context),
            ContextType::Background => {
                let mut background = self
                    .background
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner);
                if let Some(context) = background.as_ref() {
                    return Ok(context.clone());
                }
                let context = self.new_background_context()?;
                *background = Some(context.clone());
                Ok(context)
            }
        }
    }

    /// Allocate an empty `T` on the context. It is persisted by the next save.
    pub async fn create<T: StoredRecord>(&self, ty: ContextType) -> AppResult<ObjectRef<T>> {
        self.context(ty)?
            .perform(|scope| Ok(scope.create::<T>()))
            .await
    }

    /// Commit the context's pending changes; `AppError::NoChanges` when there are none.
    pub async fn save(&self, ty: ContextType) -> AppResult<()> {
        self.context(ty)?.perform(|scope| scope.save()).await
    }

    /// Delete `object` and commit immediately.
    pub async fn delete<T: StoredRecord>(&self, object: ObjectRef<T>, ty: ContextType) -> AppResult<()> {
        let context = self.context(ty)?;
        if object.context_id() != context.id() {
            return Err(AppError::ForeignObject {
                owner: object.context_id(),
                used_on: context.id(),
            });
        }
        context
            .perform(move |scope| {
                scope.delete(&object)?;
                scope.save()
            })
            .await
    }

    pub async fn fetch<T: StoredRecord>(
        &self,
        request: FetchRequest,
        ty: ContextType,
    ) -> AppResult<Vec<Managed<T>>> {
        self.context(ty)?
            .perform(move |scope| {
                let objects = scope.fetch::<T>(&request)?;
                objects.iter().map(|object| scope.snapshot(object)).collect()
            })
            .await
    }

    /// First record whose domain id equals `id`, if any.
    pub async fn fetch_by_id<T: StoredRecord>(
        &self,
        id: i64,
        ty: ContextType,
    ) -> AppResult<Option<Managed<T>>> {
        self.context(ty)?
            .perform(move |scope| {
                scope
                    .fetch_by_id::<T>(id)?
                    .map(|object| scope.snapshot(&object))
                    .transpose()
            })
            .await
    }

    /// Run SQLite's integrity check on the main context's connection.
    pub async fn verify_integrity(&self) -> AppResult<()> {
        self.main
            .perform(|scope| verify_database_integrity(scope.connection()))
            .await
    }
}
