// src/db/record.rs
//
// Stored records and fetch requests
//
// A stored record is the storage-native form of a domain object. It only
// lives inside the context that registered it; outside code addresses it
// through an `ObjectRef` handle or reads a detached `Managed` snapshot.

use rusqlite::types::Value;
use rusqlite::{params_from_iter, Connection, Row};
use std::any::Any;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::marker::PhantomData;
use std::ops::Deref;

use crate::error::{AppError, AppResult};

/// Storage key column present on every entity table
pub const ROW_ID: &str = "row_id";

/// A record type backed by one table.
pub trait StoredRecord: Any + Clone + Default + fmt::Debug + Send + 'static {
    /// Table backing this record type
    const ENTITY: &'static str;

    /// Persisted fields, in the order produced by [`StoredRecord::to_values`]
    const FIELDS: &'static [&'static str];

    /// Decode a row selected as `row_id, FIELDS...`
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self>;

    /// Column values in [`StoredRecord::FIELDS`] order
    fn to_values(&self) -> Vec<Value>;
}

/// Object-safe view of a [`StoredRecord`] so a context can hold records of
/// several types in one registry.
pub trait ManagedRecord: fmt::Debug + Send {
    fn entity(&self) -> &'static str;
    fn insert_into(&self, conn: &Connection) -> rusqlite::Result<i64>;
    fn update_in(&self, conn: &Connection, row_id: i64) -> rusqlite::Result<()>;
    fn clone_boxed(&self) -> Box<dyn ManagedRecord>;
    fn as_any(&self) -> &dyn Any;
    fn as_any_mut(&mut self) -> &mut dyn Any;
}

impl<T: StoredRecord> ManagedRecord for T {
    fn entity(&self) -> &'static str {
        T::ENTITY
    }

    fn insert_into(&self, conn: &Connection) -> rusqlite::Result<i64> {
        let placeholders = (1..=T::FIELDS.len())
            .map(|i| format!("?{}", i))
            .collect::<Vec<_>>()
            .join(", ");
        let sql = format!(
            "INSERT INTO {} ({}) VALUES ({})",
            T::ENTITY,
            T::FIELDS.join(", "),
            placeholders
        );
        conn.execute(&sql, params_from_iter(self.to_values()))?;
        Ok(conn.last_insert_rowid())
    }

    fn update_in(&self, conn: &Connection, row_id: i64) -> rusqlite::Result<()> {
        let assignments = T::FIELDS
            .iter()
            .enumerate()
            .map(|(i, field)| format!("{} = ?{}", field, i + 1))
            .collect::<Vec<_>>()
            .join(", ");
        let sql = format!(
            "UPDATE {} SET {} WHERE {} = ?{}",
            T::ENTITY,
            assignments,
            ROW_ID,
            T::FIELDS.len() + 1
        );
        let mut values = self.to_values();
        values.push(Value::Integer(row_id));
        conn.execute(&sql, params_from_iter(values))?;
        Ok(())
    }

    fn clone_boxed(&self) -> Box<dyn ManagedRecord> {
        Box::new(self.clone())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

impl Clone for Box<dyn ManagedRecord> {
    fn clone(&self) -> Self {
        self.clone_boxed()
    }
}

/// Handle to a record registered in one context.
///
/// Carries the owning context id; a context refuses handles it did not issue.
pub struct ObjectRef<T> {
    context_id: u64,
    slot: u64,
    _marker: PhantomData<fn() -> T>,
}

impl<T> ObjectRef<T> {
    pub(crate) fn new(context_id: u64, slot: u64) -> Self {
        Self {
            context_id,
            slot,
            _marker: PhantomData,
        }
    }

    pub fn context_id(&self) -> u64 {
        self.context_id
    }

    pub(crate) fn slot(&self) -> u64 {
        self.slot
    }
}

impl<T> Clone for ObjectRef<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for ObjectRef<T> {}

impl<T> PartialEq for ObjectRef<T> {
    fn eq(&self, other: &Self) -> bool {
        self.context_id == other.context_id && self.slot == other.slot
    }
}

impl<T> Eq for ObjectRef<T> {}

impl<T> Hash for ObjectRef<T> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.context_id.hash(state);
        self.slot.hash(state);
    }
}

impl<T> fmt::Debug for ObjectRef<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObjectRef")
            .field("context_id", &self.context_id)
            .field("slot", &self.slot)
            .finish()
    }
}

/// Detached snapshot of a registered record plus the handle to reach it again.
#[derive(Debug, Clone)]
pub struct Managed<T> {
    pub object: ObjectRef<T>,
    pub record: T,
}

impl<T> Deref for Managed<T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.record
    }
}

/// Simple `field == value` filter
#[derive(Debug, Clone, PartialEq)]
pub enum Predicate {
    Equals { field: String, value: Value },
}

impl Predicate {
    pub fn equals(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Predicate::Equals {
            field: field.into(),
            value: value.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SortDescriptor {
    pub field: String,
    pub ascending: bool,
}

/// Query against one entity. Without sort descriptors rows come back in
/// store order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FetchRequest {
    pub predicate: Option<Predicate>,
    pub sort: Vec<SortDescriptor>,
    pub limit: Option<usize>,
    pub offset: usize,
}

impl FetchRequest {
    pub fn all() -> Self {
        Self::default()
    }

    /// Equality on the domain identifier, first match only
    pub fn by_id(id: i64) -> Self {
        Self::all().filter(Predicate::equals("id", id)).limit(1)
    }

    pub fn filter(mut self, predicate: Predicate) -> Self {
        self.predicate = Some(predicate);
        self
    }

    pub fn sorted_by(mut self, field: impl Into<String>, ascending: bool) -> Self {
        self.sort.push(SortDescriptor {
            field: field.into(),
            ascending,
        });
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn offset(mut self, offset: usize) -> Self {
        self.offset = offset;
        self
    }

    /// Render the SELECT for `T`, rejecting unknown field names.
    pub(crate) fn to_sql<T: StoredRecord>(&self) -> AppResult<(String, Vec<Value>)> {
        let mut sql = format!("SELECT {}, {} FROM {}", ROW_ID, T::FIELDS.join(", "), T::ENTITY);
        let mut values = Vec::new();

        if let Some(Predicate::Equals { field, value }) = &self.predicate {
            check_field::<T>(field)?;
            sql.push_str(&format!(" WHERE {} = ?", field));
            values.push(value.clone());
        }

        if !self.sort.is_empty() {
            let order = self
                .sort
                .iter()
                .map(|s| {
                    check_field::<T>(&s.field)?;
                    Ok(format!("{} {}", s.field, if s.ascending { "ASC" } else { "DESC" }))
                })
                .collect::<AppResult<Vec<_>>>()?;
            sql.push_str(&format!(" ORDER BY {}", order.join(", ")));
        }

        // SQLite only accepts OFFSET after a LIMIT; -1 means unbounded
        let limit = self.limit.map(|l| l as i64).unwrap_or(-1);
        sql.push_str(" LIMIT ? OFFSET ?");
        values.push(Value::Integer(limit));
        values.push(Value::Integer(self.offset as i64));

        Ok((sql, values))
    }
}

fn check_field<T: StoredRecord>(field: &str) -> AppResult<()> {
    if field == ROW_ID || T::FIELDS.contains(&field) {
        Ok(())
    } else {
        Err(AppError::InvalidField {
            entity: T::ENTITY,
            field: field.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, Default, PartialEq)]
    struct NoteRecord {
        id: i64,
        body: Option<String>,
    }

    impl StoredRecord for NoteRecord {
        const ENTITY: &'static str = "notes";
        const FIELDS: &'static [&'static str] = &["id", "body"];

        fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
            Ok(Self {
                id: row.get("id")?,
                body: row.get("body")?,
            })
        }

        fn to_values(&self) -> Vec<Value> {
            vec![Value::Integer(self.id), self.body.clone().into()]
        }
    }

    fn notes_table() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(
            "CREATE TABLE notes (row_id INTEGER PRIMARY KEY AUTOINCREMENT, id INTEGER, body TEXT)",
        )
        .unwrap();
        conn
    }

    #[test]
    fn test_by_id_renders_equality_and_single_row_limit() {
        let (sql, values) = FetchRequest::by_id(7).to_sql::<NoteRecord>().unwrap();

        assert_eq!(sql, "SELECT row_id, id, body FROM notes WHERE id = ? LIMIT ? OFFSET ?");
        assert_eq!(values, vec![Value::Integer(7), Value::Integer(1), Value::Integer(0)]);
    }

    #[test]
    fn test_unbounded_request_uses_negative_limit() {
        let (sql, values) = FetchRequest::all().offset(20).to_sql::<NoteRecord>().unwrap();

        assert!(!sql.contains("WHERE"));
        assert_eq!(values, vec![Value::Integer(-1), Value::Integer(20)]);
    }

    #[test]
    fn test_sort_descriptors_render_in_order() {
        let (sql, _) = FetchRequest::all()
            .sorted_by("id", false)
            .sorted_by("row_id", true)
            .to_sql::<NoteRecord>()
            .unwrap();

        assert!(sql.contains("ORDER BY id DESC, row_id ASC"));
    }

    #[test]
    fn test_unknown_fields_are_rejected() {
        let request = FetchRequest::all().filter(Predicate::equals("1 = 1; DROP TABLE notes", 1));
        assert!(matches!(
            request.to_sql::<NoteRecord>(),
            Err(AppError::InvalidField { entity: "notes", .. })
        ));

        let request = FetchRequest::all().sorted_by("missing", true);
        assert!(request.to_sql::<NoteRecord>().is_err());
    }

    #[test]
    fn test_managed_record_insert_and_update() {
        let conn = notes_table();
        let mut note = NoteRecord {
            id: 4,
            body: Some("draft".to_string()),
        };

        let row_id = note.insert_into(&conn).unwrap();
        note.body = Some("final".to_string());
        note.update_in(&conn, row_id).unwrap();

        let body: String = conn
            .query_row("SELECT body FROM notes WHERE row_id = ?1", [row_id], |row| row.get(0))
            .unwrap();
        assert_eq!(body, "final");
    }

    #[test]
    fn test_object_refs_compare_by_context_and_slot() {
        let a: ObjectRef<NoteRecord> = ObjectRef::new(1, 10);
        let b: ObjectRef<NoteRecord> = ObjectRef::new(1, 10);
        let c: ObjectRef<NoteRecord> = ObjectRef::new(2, 10);

        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(c.context_id(), 2);
    }
}
