// src/repositories/store_repository.rs
//
// Generic repository
//
// RULES:
// - Writes run on the background context, one unit of work per call
// - Reads run on the main context
// - A unit of work leaves no clean registrations behind
// - Store failures propagate unchanged; nothing is retried
// - An empty commit is a no-op, never an error

use async_trait::async_trait;
use std::marker::PhantomData;
use std::sync::Arc;

use crate::db::{ContextScope, ContextType, FetchRequest, PersistentStore};
use crate::error::{AppError, AppResult, IgnoreNoChanges};
use crate::repositories::mapping::{DomainMappable, StoreMappable};

// ---------------------------------------------------------------------
// Repository contract
// ---------------------------------------------------------------------
#[async_trait]
pub trait Repository: Send + Sync {
    type Model: Send + 'static;

    /// Persist `object`; returns it unchanged.
    async fn create(&self, object: Self::Model) -> AppResult<Self::Model>;

    async fn create_many(&self, objects: Vec<Self::Model>) -> AppResult<Vec<Self::Model>>;

    /// Page `page` (first page is 1) of `limit` objects, in store order.
    async fn get(&self, page: u32, limit: u32) -> AppResult<Vec<Self::Model>>;

    async fn get_by_id(&self, id: i64) -> AppResult<Option<Self::Model>>;

    /// Overwrite the stored object with the same id. `NotFound` if there is none.
    async fn update(&self, object: Self::Model) -> AppResult<Self::Model>;

    /// Delete the first object with `id`; unknown ids are ignored.
    async fn delete(&self, id: i64) -> AppResult<()>;

    async fn create_or_update(&self, object: Self::Model) -> AppResult<Self::Model>;
}

/// Fetch request for page `page` of `limit` rows: offset `(page - 1) * limit`.
pub fn page_request(page: u32, limit: u32) -> AppResult<FetchRequest> {
    if page < 1 {
        return Err(AppError::Other(format!(
            "Page {} is out of range, pages start at 1",
            page
        )));
    }
    if limit == 0 {
        return Err(AppError::Other("Page limit must be greater than zero".to_string()));
    }

    let offset = (page as usize - 1) * limit as usize;
    Ok(FetchRequest::all().limit(limit as usize).offset(offset))
}

// Save, discarding the pending changes if the commit failed
fn commit(scope: &mut ContextScope) -> AppResult<()> {
    match scope.save() {
        Err(e) if !e.is_no_changes() => {
            scope.rollback();
            Err(e)
        }
        result => result,
    }
}

// ---------------------------------------------------------------------
// Store implementation
// ---------------------------------------------------------------------
pub struct StoreRepository<D> {
    store: Arc<PersistentStore>,
    _marker: PhantomData<fn() -> D>,
}

impl<D: StoreMappable> StoreRepository<D> {
    pub fn new(store: Arc<PersistentStore>) -> Self {
        Self {
            store,
            _marker: PhantomData,
        }
    }

    pub fn store(&self) -> &Arc<PersistentStore> {
        &self.store
    }

    // Run `work` on the context, then evict the clean records it registered
    async fn unit_of_work<T, F>(&self, ty: ContextType, work: F) -> AppResult<T>
    where
        F: FnOnce(&mut ContextScope) -> AppResult<T> + Send + 'static,
        T: Send + 'static,
    {
        self.store
            .context(ty)?
            .perform(move |scope| {
                let result = work(scope);
                scope.reset();
                result
            })
            .await
    }
}

#[async_trait]
impl<D: StoreMappable> Repository for StoreRepository<D> {
    type Model = D;

    async fn create(&self, object: D) -> AppResult<D> {
        let pending = object.clone();
        self.unit_of_work(ContextType::Background, move |scope| {
            pending.to_stored(scope);
            commit(scope)
        })
        .await?;

        Ok(object)
    }

    async fn create_many(&self, objects: Vec<D>) -> AppResult<Vec<D>> {
        let pending = objects.clone();
        self.unit_of_work(ContextType::Background, move |scope| {
            for object in &pending {
                object.to_stored(scope);
            }
            commit(scope)
        })
        .await
        .ignore_no_changes()?;

        log::debug!("created {} object(s)", objects.len());
        Ok(objects)
    }

    async fn get(&self, page: u32, limit: u32) -> AppResult<Vec<D>> {
        let request = page_request(page, limit)?;
        self.unit_of_work(ContextType::Main, move |scope| {
            let objects = scope.fetch::<D::Stored>(&request)?;
            objects
                .iter()
                .map(|object| scope.object(object).map(|record| record.to_domain()))
                .collect()
        })
        .await
    }

    async fn get_by_id(&self, id: i64) -> AppResult<Option<D>> {
        self.unit_of_work(ContextType::Main, move |scope| {
            match scope.fetch_by_id::<D::Stored>(id)? {
                Some(object) => Ok(Some(scope.object(&object)?.to_domain())),
                None => Ok(None),
            }
        })
        .await
    }

    async fn update(&self, object: D) -> AppResult<D> {
        let pending = object.clone();
        self.unit_of_work(ContextType::Background, move |scope| {
            let existing = scope
                .fetch_by_id::<D::Stored>(pending.id())?
                .ok_or(AppError::NotFound)?;
            pending.to_stored_existing(scope.object_mut(&existing)?);
            commit(scope)
        })
        .await?;

        Ok(object)
    }

    async fn delete(&self, id: i64) -> AppResult<()> {
        self.unit_of_work(ContextType::Background, move |scope| {
            let Some(existing) = scope.fetch_by_id::<D::Stored>(id)? else {
                log::debug!("delete of unknown id {} ignored", id);
                return Ok(());
            };
            scope.delete(&existing)?;
            commit(scope)
        })
        .await
    }

    async fn create_or_update(&self, object: D) -> AppResult<D> {
        let pending = object.clone();
        self.unit_of_work(ContextType::Background, move |scope| {
            match scope.fetch_by_id::<D::Stored>(pending.id())? {
                Some(existing) => pending.to_stored_existing(scope.object_mut(&existing)?),
                None => {
                    pending.to_stored(scope);
                }
            }
            commit(scope)
        })
        .await
        .ignore_no_changes()?;

        Ok(object)
    }
}
