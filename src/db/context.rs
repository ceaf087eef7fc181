// src/db/context.rs
//
// Persistence contexts
//
// A context is a transactional unit of work bound to one serial execution
// line: a dedicated worker thread that owns one pooled connection and the
// context's registered records. Every read or mutation is shipped to that
// thread as a task; the caller awaits the reply.
//
// RULES:
// - Records never leave their context; callers hold `ObjectRef` handles or
//   detached `Managed` snapshots
// - Cross-context visibility only through `ContextDidSave` merges
// - No locking beyond the per-context serial line

use rusqlite::{params_from_iter, Connection};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{mpsc, Arc, Mutex, PoisonError, Weak};
use std::thread::{self, JoinHandle};
use tokio::sync::oneshot;

use crate::db::connection::PooledConn;
use crate::db::record::{FetchRequest, Managed, ManagedRecord, ObjectRef, StoredRecord, ROW_ID};
use crate::error::{AppError, AppResult};
use crate::events::{ContextDidSave, DeletedObject, EventBus, SavedObject};

/// Which execution line a context is bound to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ContextKind {
    /// The single UI-facing context
    Main,
    Background,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContextDescriptor {
    pub id: u64,
    pub kind: ContextKind,
    pub name: String,
}

impl ContextDescriptor {
    pub fn new(id: u64, kind: ContextKind, name: impl Into<String>) -> Self {
        Self {
            id,
            kind,
            name: name.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ContextStats {
    pub registered: usize,
    pub pending_changes: usize,
    pub merges_applied: u64,
    pub saves: u64,
}

type ContextTask = Box<dyn FnOnce(&mut ContextScope) + Send + 'static>;

enum ContextCommand {
    Perform(ContextTask),
    Merge(ContextDidSave),
    Shutdown,
}

struct ContextInner {
    descriptor: ContextDescriptor,
    sender: mpsc::Sender<ContextCommand>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl Drop for ContextInner {
    fn drop(&mut self) {
        let mut guard = self.worker.lock().unwrap_or_else(PoisonError::into_inner);

        if let Some(handle) = guard.take() {
            if let Err(err) = self.sender.send(ContextCommand::Shutdown) {
                log::error!(
                    "failed to send shutdown to context '{}': {err}",
                    self.descriptor.name
                );
            }
            // the last handle can be released by a task running on the worker itself
            if handle.thread().id() == thread::current().id() {
                return;
            }
            if let Err(join_err) = handle.join() {
                log::error!(
                    "failed to join context '{}' worker: {join_err:?}",
                    self.descriptor.name
                );
            }
        }
    }
}

/// Cloneable handle to one context's serial execution line.
#[derive(Clone)]
pub struct PersistenceContext {
    inner: Arc<ContextInner>,
}

/// Non-owning handle; used by subscriptions that must not keep a context alive.
#[derive(Clone)]
pub struct WeakContext {
    inner: Weak<ContextInner>,
}

impl WeakContext {
    pub fn upgrade(&self) -> Option<PersistenceContext> {
        self.inner.upgrade().map(|inner| PersistenceContext { inner })
    }
}

impl PersistenceContext {
    /// Start the worker thread that owns `conn` for the context's lifetime.
    pub(crate) fn spawn(
        descriptor: ContextDescriptor,
        conn: PooledConn,
        bus: Arc<EventBus>,
    ) -> AppResult<Self> {
        let (sender, receiver) = mpsc::channel::<ContextCommand>();
        let worker_descriptor = descriptor.clone();

        let worker = thread::Builder::new()
            .name(format!("eventlogger-ctx-{}", descriptor.name))
            .spawn(move || {
                let name = worker_descriptor.name.clone();
                let mut scope = ContextScope::new(worker_descriptor, conn, bus);

                while let Ok(command) = receiver.recv() {
                    match command {
                        ContextCommand::Perform(task) => {
                            let outcome = catch_unwind(AssertUnwindSafe(|| task(&mut scope)));
                            if outcome.is_err() {
                                log::error!("task panicked on context '{name}'");
                            }
                        }
                        ContextCommand::Merge(changes) => scope.merge(&changes),
                        ContextCommand::Shutdown => break,
                    }
                }

                log::debug!("context '{name}' shutting down");
            })?;

        log::debug!(
            "spawned {:?} context '{}' (id {})",
            descriptor.kind,
            descriptor.name,
            descriptor.id
        );

        Ok(Self {
            inner: Arc::new(ContextInner {
                descriptor,
                sender,
                worker: Mutex::new(Some(worker)),
            }),
        })
    }

    pub fn descriptor(&self) -> &ContextDescriptor {
        &self.inner.descriptor
    }

    pub fn id(&self) -> u64 {
        self.inner.descriptor.id
    }

    pub fn kind(&self) -> ContextKind {
        self.inner.descriptor.kind
    }

    pub fn name(&self) -> &str {
        &self.inner.descriptor.name
    }

    pub fn downgrade(&self) -> WeakContext {
        WeakContext {
            inner: Arc::downgrade(&self.inner),
        }
    }

    /// Run `task` on this context's execution line and wait for its result.
    ///
    /// Tasks on one context never overlap. The scope is only reachable from
    /// inside the task, so nothing registered in it escapes.
    pub async fn perform<F, T>(&self, task: F) -> AppResult<T>
    where
        F: FnOnce(&mut ContextScope) -> AppResult<T> + Send + 'static,
        T: Send + 'static,
    {
        let (reply_tx, reply_rx) = oneshot::channel();

        let command = ContextCommand::Perform(Box::new(move |scope| {
            let result = task(scope);
            if reply_tx.send(result).is_err() {
                log::error!("context caller dropped before receiving result");
            }
        }));

        self.inner
            .sender
            .send(command)
            .map_err(|_| AppError::ContextClosed(self.name().to_string()))?;

        reply_rx
            .await
            .map_err(|_| AppError::ContextClosed(self.name().to_string()))?
    }

    /// Queue another context's commit for merging. Returns immediately.
    pub(crate) fn enqueue_merge(&self, changes: ContextDidSave) -> AppResult<()> {
        self.inner
            .sender
            .send(ContextCommand::Merge(changes))
            .map_err(|_| AppError::ContextClosed(self.name().to_string()))
    }

    pub async fn stats(&self) -> AppResult<ContextStats> {
        self.perform(|scope| Ok(scope.stats())).await
    }
}

impl fmt::Debug for PersistenceContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("PersistenceContext")
            .field(&self.inner.descriptor)
            .finish()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SlotStatus {
    /// Created here, not yet committed
    Inserted,
    /// Matches the store as of the last fetch, save or merge
    Clean,
    Updated,
    Deleted,
}

#[derive(Debug)]
struct Slot {
    row_id: Option<i64>,
    status: SlotStatus,
    record: Box<dyn ManagedRecord>,
}

/// The state owned by a context's worker: its connection and registered
/// records. Only ever handed out by reference to tasks running on the
/// worker thread.
pub struct ContextScope {
    descriptor: ContextDescriptor,
    conn: PooledConn,
    bus: Arc<EventBus>,
    // ordered by registration so commits insert in creation order
    slots: BTreeMap<u64, Slot>,
    rows: HashMap<(&'static str, i64), u64>,
    next_slot: u64,
    merges_applied: u64,
    saves: u64,
}

impl ContextScope {
    fn new(descriptor: ContextDescriptor, conn: PooledConn, bus: Arc<EventBus>) -> Self {
        Self {
            descriptor,
            conn,
            bus,
            slots: BTreeMap::new(),
            rows: HashMap::new(),
            next_slot: 1,
            merges_applied: 0,
            saves: 0,
        }
    }

    pub fn descriptor(&self) -> &ContextDescriptor {
        &self.descriptor
    }

    pub(crate) fn connection(&self) -> &Connection {
        &self.conn
    }

    fn register(&mut self, row_id: Option<i64>, status: SlotStatus, record: Box<dyn ManagedRecord>) -> u64 {
        let slot_id = self.next_slot;
        self.next_slot += 1;
        if let Some(row_id) = row_id {
            self.rows.insert((record.entity(), row_id), slot_id);
        }
        self.slots.insert(
            slot_id,
            Slot {
                row_id,
                status,
                record,
            },
        );
        slot_id
    }

    /// Allocate an empty record of type `T`. It is persisted by the next save.
    pub fn create<T: StoredRecord>(&mut self) -> ObjectRef<T> {
        let slot_id = self.register(None, SlotStatus::Inserted, Box::new(T::default()));
        ObjectRef::new(self.descriptor.id, slot_id)
    }

    /// Allocate a record of type `T` and fill it in one step.
    pub fn create_with<T, F>(&mut self, fill: F) -> ObjectRef<T>
    where
        T: StoredRecord,
        F: FnOnce(&mut T),
    {
        let mut record = T::default();
        fill(&mut record);
        let slot_id = self.register(None, SlotStatus::Inserted, Box::new(record));
        ObjectRef::new(self.descriptor.id, slot_id)
    }

    fn check_owner<T>(&self, object: &ObjectRef<T>) -> AppResult<()> {
        if object.context_id() != self.descriptor.id {
            return Err(AppError::ForeignObject {
                owner: object.context_id(),
                used_on: self.descriptor.id,
            });
        }
        Ok(())
    }

    pub fn object<T: StoredRecord>(&self, object: &ObjectRef<T>) -> AppResult<&T> {
        self.check_owner(object)?;
        self.slots
            .get(&object.slot())
            .filter(|slot| slot.status != SlotStatus::Deleted)
            .and_then(|slot| slot.record.as_any().downcast_ref::<T>())
            .ok_or(AppError::NotFound)
    }

    /// Mutable access; a committed record becomes pending-update.
    pub fn object_mut<T: StoredRecord>(&mut self, object: &ObjectRef<T>) -> AppResult<&mut T> {
        self.check_owner(object)?;
        let slot = self
            .slots
            .get_mut(&object.slot())
            .filter(|slot| slot.status != SlotStatus::Deleted)
            .ok_or(AppError::NotFound)?;

        if slot.status == SlotStatus::Clean {
            slot.status = SlotStatus::Updated;
        }

        slot.record
            .as_any_mut()
            .downcast_mut::<T>()
            .ok_or(AppError::NotFound)
    }

    pub fn snapshot<T: StoredRecord>(&self, object: &ObjectRef<T>) -> AppResult<Managed<T>> {
        Ok(Managed {
            object: *object,
            record: self.object(object)?.clone(),
        })
    }

    /// Run `request` and register the matching records.
    ///
    /// Pending local edits win over fetched values and pending deletes are
    /// left out. Uncommitted inserts are not part of the result.
    pub fn fetch<T: StoredRecord>(&mut self, request: &FetchRequest) -> AppResult<Vec<ObjectRef<T>>> {
        let (sql, values) = request.to_sql::<T>()?;

        let rows = {
            let mut stmt = self.conn.prepare(&sql)?;
            let mapped = stmt.query_map(params_from_iter(values), |row| {
                Ok((row.get::<_, i64>(ROW_ID)?, T::from_row(row)?))
            })?;
            let rows = mapped.collect::<Result<Vec<_>, _>>()?;
            rows
        };

        let mut objects = Vec::with_capacity(rows.len());
        for (row_id, record) in rows {
            let known = self.rows.get(&(T::ENTITY, row_id)).copied();
            let slot_id = match known {
                Some(slot_id) => {
                    if let Some(slot) = self.slots.get_mut(&slot_id) {
                        match slot.status {
                            SlotStatus::Deleted => continue,
                            SlotStatus::Clean => slot.record = Box::new(record),
                            SlotStatus::Updated | SlotStatus::Inserted => {}
                        }
                    }
                    slot_id
                }
                None => self.register(Some(row_id), SlotStatus::Clean, Box::new(record)),
            };
            objects.push(ObjectRef::new(self.descriptor.id, slot_id));
        }

        log::debug!(
            "context '{}' fetched {} {} record(s)",
            self.descriptor.name,
            objects.len(),
            T::ENTITY
        );

        Ok(objects)
    }

    /// First record whose `id` equals `id`, in store order.
    pub fn fetch_by_id<T: StoredRecord>(&mut self, id: i64) -> AppResult<Option<ObjectRef<T>>> {
        Ok(self.fetch::<T>(&FetchRequest::by_id(id))?.into_iter().next())
    }

    /// Mark a record deleted. Records never committed are simply dropped.
    pub fn delete<T: StoredRecord>(&mut self, object: &ObjectRef<T>) -> AppResult<()> {
        self.check_owner(object)?;
        let slot = self
            .slots
            .get_mut(&object.slot())
            .ok_or(AppError::NotFound)?;

        if slot.status == SlotStatus::Inserted {
            self.slots.remove(&object.slot());
        } else {
            slot.status = SlotStatus::Deleted;
        }
        Ok(())
    }

    pub fn pending_changes(&self) -> usize {
        self.slots
            .values()
            .filter(|slot| slot.status != SlotStatus::Clean)
            .count()
    }

    pub fn has_changes(&self) -> bool {
        self.pending_changes() > 0
    }

    /// Commit every pending change in one transaction, then announce it.
    ///
    /// Fails with `AppError::NoChanges` when nothing is pending. On failure
    /// the transaction is rolled back and the changes stay pending.
    pub fn save(&mut self) -> AppResult<()> {
        if !self.has_changes() {
            return Err(AppError::NoChanges);
        }

        let mut inserted = Vec::new();
        let mut updated = Vec::new();
        let mut deleted = Vec::new();
        let mut assigned = Vec::new();

        {
            let tx = self.conn.transaction()?;

            for (slot_id, slot) in self.slots.iter() {
                let entity = slot.record.entity();
                match (slot.status, slot.row_id) {
                    (SlotStatus::Inserted, _) => {
                        let row_id = slot.record.insert_into(&tx)?;
                        assigned.push((*slot_id, row_id));
                        inserted.push(SavedObject {
                            entity,
                            row_id,
                            record: slot.record.clone_boxed(),
                        });
                    }
                    (SlotStatus::Updated, Some(row_id)) => {
                        slot.record.update_in(&tx, row_id)?;
                        updated.push(SavedObject {
                            entity,
                            row_id,
                            record: slot.record.clone_boxed(),
                        });
                    }
                    (SlotStatus::Deleted, Some(row_id)) => {
                        tx.execute(
                            &format!("DELETE FROM {} WHERE {} = ?1", entity, ROW_ID),
                            [row_id],
                        )?;
                        deleted.push(DeletedObject { entity, row_id });
                    }
                    _ => {}
                }
            }

            tx.commit()?;
        }

        for (slot_id, row_id) in assigned {
            if let Some(slot) = self.slots.get_mut(&slot_id) {
                slot.row_id = Some(row_id);
                self.rows.insert((slot.record.entity(), row_id), slot_id);
            }
        }
        for object in &deleted {
            if let Some(slot_id) = self.rows.remove(&(object.entity, object.row_id)) {
                self.slots.remove(&slot_id);
            }
        }
        for slot in self.slots.values_mut() {
            slot.status = SlotStatus::Clean;
        }
        self.saves += 1;

        log::debug!(
            "context '{}' committed {} insert(s), {} update(s), {} delete(s)",
            self.descriptor.name,
            inserted.len(),
            updated.len(),
            deleted.len()
        );

        self.bus.emit(ContextDidSave::new(
            self.descriptor.clone(),
            inserted,
            updated,
            deleted,
        ));

        Ok(())
    }

    /// Discard pending changes. Edited and deleted records are evicted so
    /// the next fetch reloads them from the store.
    pub fn rollback(&mut self) {
        let discarded: Vec<u64> = self
            .slots
            .iter()
            .filter(|(_, slot)| slot.status != SlotStatus::Clean)
            .map(|(slot_id, _)| *slot_id)
            .collect();

        for slot_id in discarded {
            if let Some(slot) = self.slots.remove(&slot_id) {
                if let Some(row_id) = slot.row_id {
                    self.rows.remove(&(slot.record.entity(), row_id));
                }
            }
        }
    }

    /// Forget every clean record. Pending changes stay registered; handles to
    /// evicted records resolve to `NotFound` until fetched again.
    pub fn reset(&mut self) {
        let rows = &mut self.rows;
        self.slots.retain(|_, slot| {
            if slot.status != SlotStatus::Clean {
                return true;
            }
            if let Some(row_id) = slot.row_id {
                rows.remove(&(slot.record.entity(), row_id));
            }
            false
        });
    }

    /// Apply another context's commit: refresh clean records, evict deleted ones.
    pub(crate) fn merge(&mut self, changes: &ContextDidSave) {
        if changes.origin.id == self.descriptor.id {
            return;
        }

        for object in changes.inserted.iter().chain(changes.updated.iter()) {
            let Some(slot_id) = self.rows.get(&(object.entity, object.row_id)) else {
                continue;
            };
            if let Some(slot) = self.slots.get_mut(slot_id) {
                if slot.status == SlotStatus::Clean {
                    slot.record = object.record.clone_boxed();
                }
            }
        }

        for object in &changes.deleted {
            if let Some(slot_id) = self.rows.remove(&(object.entity, object.row_id)) {
                self.slots.remove(&slot_id);
            }
        }

        self.merges_applied += 1;
        log::debug!(
            "context '{}' merged {} change(s) from '{}'",
            self.descriptor.name,
            changes.change_count(),
            changes.origin.name
        );
    }

    pub fn stats(&self) -> ContextStats {
        ContextStats {
            registered: self.slots.len(),
            pending_changes: self.pending_changes(),
            merges_applied: self.merges_applied,
            saves: self.saves,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::connection::{create_connection_pool, get_connection, ConnectionPool};
    use rusqlite::types::Value;
    use rusqlite::Row;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::TempDir;

    #[derive(Debug, Clone, Default, PartialEq)]
    struct TagRecord {
        id: i64,
        label: Option<String>,
    }

    impl StoredRecord for TagRecord {
        const ENTITY: &'static str = "tags";
        const FIELDS: &'static [&'static str] = &["id", "label"];

        fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
            Ok(Self {
                id: row.get("id")?,
                label: row.get("label")?,
            })
        }

        fn to_values(&self) -> Vec<Value> {
            vec![Value::Integer(self.id), self.label.clone().into()]
        }
    }

    struct Fixture {
        _dir: TempDir,
        pool: ConnectionPool,
        bus: Arc<EventBus>,
    }

    impl Fixture {
        fn new() -> Self {
            let dir = TempDir::new().unwrap();
            let pool = create_connection_pool(&dir.path().join("ctx.db"), 4).unwrap();
            get_connection(&pool)
                .unwrap()
                .execute_batch(
                    "CREATE TABLE tags (row_id INTEGER PRIMARY KEY AUTOINCREMENT, id INTEGER, label TEXT)",
                )
                .unwrap();
            Self {
                _dir: dir,
                pool,
                bus: Arc::new(EventBus::new()),
            }
        }

        fn context(&self, id: u64, kind: ContextKind) -> PersistenceContext {
            PersistenceContext::spawn(
                ContextDescriptor::new(id, kind, format!("test-{id}")),
                get_connection(&self.pool).unwrap(),
                Arc::clone(&self.bus),
            )
            .unwrap()
        }
    }

    fn add_tag(scope: &mut ContextScope, id: i64, label: &str) -> ObjectRef<TagRecord> {
        scope.create_with(|record: &mut TagRecord| {
            record.id = id;
            record.label = Some(label.to_string());
        })
    }

    #[tokio::test]
    async fn test_save_without_changes_reports_no_changes() {
        let fixture = Fixture::new();
        let ctx = fixture.context(1, ContextKind::Background);

        let result = ctx.perform(|scope| scope.save()).await;
        assert!(matches!(result, Err(AppError::NoChanges)));
    }

    #[tokio::test]
    async fn test_created_records_commit_in_creation_order() {
        let fixture = Fixture::new();
        let ctx = fixture.context(1, ContextKind::Background);

        let ids = ctx
            .perform(|scope| {
                for id in [5, 1, 3] {
                    add_tag(scope, id, "t");
                }
                assert_eq!(scope.pending_changes(), 3);
                scope.save()?;
                let fetched = scope.fetch::<TagRecord>(&FetchRequest::all())?;
                fetched
                    .iter()
                    .map(|object| scope.object(object).map(|r| r.id))
                    .collect::<AppResult<Vec<_>>>()
            })
            .await
            .unwrap();

        assert_eq!(ids, vec![5, 1, 3]);
        assert!(!ctx.perform(|scope| Ok(scope.has_changes())).await.unwrap());
    }

    #[tokio::test]
    async fn test_fetch_by_id_returns_first_match() {
        let fixture = Fixture::new();
        let ctx = fixture.context(1, ContextKind::Background);

        let label = ctx
            .perform(|scope| {
                add_tag(scope, 2, "first");
                add_tag(scope, 2, "second");
                scope.save()?;
                let found = scope.fetch_by_id::<TagRecord>(2)?.ok_or(AppError::NotFound)?;
                Ok(scope.object(&found)?.label.clone())
            })
            .await
            .unwrap();

        assert_eq!(label.as_deref(), Some("first"));
    }

    #[tokio::test]
    async fn test_foreign_object_is_rejected() {
        let fixture = Fixture::new();
        let owner = fixture.context(1, ContextKind::Background);
        let other = fixture.context(2, ContextKind::Background);

        let object = owner
            .perform(|scope| Ok(scope.create::<TagRecord>()))
            .await
            .unwrap();

        let result = other.perform(move |scope| scope.delete(&object)).await;
        assert!(matches!(
            result,
            Err(AppError::ForeignObject { owner: 1, used_on: 2 })
        ));
    }

    #[tokio::test]
    async fn test_failed_save_keeps_changes_pending_until_rollback() {
        let fixture = Fixture::new();
        let ctx = fixture.context(1, ContextKind::Background);
        get_connection(&fixture.pool)
            .unwrap()
            .execute_batch("DROP TABLE tags")
            .unwrap();

        let pending = ctx
            .perform(|scope| {
                add_tag(scope, 1, "lost");
                assert!(scope.save().is_err());
                let pending = scope.pending_changes();
                scope.rollback();
                assert!(!scope.has_changes());
                Ok(pending)
            })
            .await
            .unwrap();

        assert_eq!(pending, 1);
    }

    #[tokio::test]
    async fn test_delete_removes_row_and_unsaved_inserts_vanish() {
        let fixture = Fixture::new();
        let ctx = fixture.context(1, ContextKind::Background);

        let remaining = ctx
            .perform(|scope| {
                let kept = add_tag(scope, 1, "kept");
                let doomed = add_tag(scope, 2, "doomed");
                scope.save()?;

                scope.delete(&doomed)?;
                assert!(matches!(scope.object(&doomed), Err(AppError::NotFound)));
                scope.save()?;

                let never_saved = scope.create::<TagRecord>();
                scope.delete(&never_saved)?;
                assert!(!scope.has_changes());

                scope.object(&kept)?;
                Ok(scope.fetch::<TagRecord>(&FetchRequest::all())?.len())
            })
            .await
            .unwrap();

        assert_eq!(remaining, 1);
    }

    #[tokio::test]
    async fn test_save_announces_commit_on_bus() {
        let fixture = Fixture::new();
        let seen = Arc::new(AtomicUsize::new(0));
        let seen_clone = Arc::clone(&seen);
        fixture.bus.subscribe::<ContextDidSave, _>(move |event| {
            seen_clone.fetch_add(event.change_count(), Ordering::SeqCst);
        });

        let ctx = fixture.context(1, ContextKind::Background);
        ctx.perform(|scope| {
            add_tag(scope, 1, "a");
            add_tag(scope, 2, "b");
            scope.save()
        })
        .await
        .unwrap();

        assert_eq!(seen.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_merge_refreshes_clean_records_and_keeps_local_edits() {
        let fixture = Fixture::new();
        let main = fixture.context(1, ContextKind::Main);
        let background = fixture.context(2, ContextKind::Background);

        background
            .perform(|scope| {
                add_tag(scope, 1, "one");
                add_tag(scope, 2, "two");
                scope.save()
            })
            .await
            .unwrap();

        // main registers both rows, then edits the second locally
        let (first, second) = main
            .perform(|scope| {
                let objects = scope.fetch::<TagRecord>(&FetchRequest::all())?;
                scope.object_mut(&objects[1])?.label = Some("local".to_string());
                Ok((objects[0], objects[1]))
            })
            .await
            .unwrap();

        let did_save = Arc::new(Mutex::new(None));
        let slot = Arc::clone(&did_save);
        fixture.bus.subscribe::<ContextDidSave, _>(move |event| {
            *slot.lock().unwrap() = Some(event.clone());
        });

        background
            .perform(|scope| {
                for object in scope.fetch::<TagRecord>(&FetchRequest::all())? {
                    scope.object_mut(&object)?.label = Some("remote".to_string());
                }
                scope.save()
            })
            .await
            .unwrap();

        let changes = did_save.lock().unwrap().take().unwrap();
        assert_eq!(changes.updated.len(), 2);
        main.enqueue_merge(changes).unwrap();

        let (first_label, second_label, stats) = main
            .perform(move |scope| {
                Ok((
                    scope.object(&first)?.label.clone(),
                    scope.object(&second)?.label.clone(),
                    scope.stats(),
                ))
            })
            .await
            .unwrap();

        assert_eq!(first_label.as_deref(), Some("remote"));
        assert_eq!(second_label.as_deref(), Some("local"));
        assert_eq!(stats.merges_applied, 1);
        assert_eq!(stats.pending_changes, 1);
    }

    #[tokio::test]
    async fn test_merge_evicts_deleted_records() {
        let fixture = Fixture::new();
        let main = fixture.context(1, ContextKind::Main);
        let background = fixture.context(2, ContextKind::Background);

        let did_save = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&did_save);
        fixture.bus.subscribe::<ContextDidSave, _>(move |event| {
            sink.lock().unwrap().push(event.clone());
        });

        let remote = background
            .perform(|scope| {
                let object = add_tag(scope, 9, "gone");
                scope.save()?;
                Ok(object)
            })
            .await
            .unwrap();

        let local = main
            .perform(|scope| Ok(scope.fetch::<TagRecord>(&FetchRequest::by_id(9))?[0]))
            .await
            .unwrap();

        background
            .perform(move |scope| {
                scope.delete(&remote)?;
                scope.save()
            })
            .await
            .unwrap();

        let changes = did_save.lock().unwrap().pop().unwrap();
        assert_eq!(changes.deleted.len(), 1);
        main.enqueue_merge(changes).unwrap();

        let result = main.perform(move |scope| scope.object(&local).map(|_| ())).await;
        assert!(matches!(result, Err(AppError::NotFound)));
    }

    #[tokio::test]
    async fn test_panicking_task_leaves_context_usable() {
        let fixture = Fixture::new();
        let ctx = fixture.context(1, ContextKind::Background);

        let result: AppResult<()> = ctx.perform(|_| panic!("boom")).await;
        assert!(matches!(result, Err(AppError::ContextClosed(_))));

        let stats = ctx.stats().await.unwrap();
        assert_eq!(stats.registered, 0);
    }

    #[tokio::test]
    async fn test_reset_evicts_clean_records_and_keeps_pending_ones() {
        let fixture = Fixture::new();
        let ctx = fixture.context(1, ContextKind::Background);

        let (committed, stats) = ctx
            .perform(|scope| {
                let committed = add_tag(scope, 1, "saved");
                scope.save()?;
                add_tag(scope, 2, "pending");
                scope.reset();
                Ok((committed, scope.stats()))
            })
            .await
            .unwrap();
        assert_eq!(stats.registered, 1);
        assert_eq!(stats.pending_changes, 1);

        let result = ctx.perform(move |scope| scope.object(&committed).map(|_| ())).await;
        assert!(matches!(result, Err(AppError::NotFound)));

        // a later fetch registers the row again
        let label = ctx
            .perform(|scope| {
                let object = scope.fetch_by_id::<TagRecord>(1)?.ok_or(AppError::NotFound)?;
                Ok(scope.object(&object)?.label.clone())
            })
            .await
            .unwrap();
        assert_eq!(label.as_deref(), Some("saved"));
    }
}
