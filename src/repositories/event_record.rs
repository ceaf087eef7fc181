// src/repositories/event_record.rs
//
// Stored form of a tracked event and its mappings
//
// Timestamps are persisted as RFC 3339 text. Title, kind and creation
// time are nullable columns; rows missing title or kind decode to the
// fallback event.

use chrono::{DateTime, Utc};
use rusqlite::types::Value;
use rusqlite::Row;

use crate::db::{ContextScope, ObjectRef, StoredRecord};
use crate::domain::{ButtonEvent, EventDto};
use crate::repositories::mapping::{DomainMappable, Persistable, StoreMappable};

#[derive(Debug, Clone, Default, PartialEq)]
pub struct EventRecord {
    pub id: i64,
    pub title: Option<String>,
    pub kind: Option<String>,
    pub created_at: Option<DateTime<Utc>>,
}

impl StoredRecord for EventRecord {
    const ENTITY: &'static str = "events";
    const FIELDS: &'static [&'static str] = &["id", "title", "kind", "created_at"];

    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        let created_at: Option<String> = row.get("created_at")?;

        Ok(Self {
            id: row.get("id")?,
            title: row.get("title")?,
            kind: row.get("kind")?,
            created_at: created_at.as_deref().and_then(parse_timestamp),
        })
    }

    fn to_values(&self) -> Vec<Value> {
        vec![
            Value::Integer(self.id),
            self.title.clone().into(),
            self.kind.clone().into(),
            self.created_at.map(|at| at.to_rfc3339()).into(),
        ]
    }
}

// Unparseable timestamps read as absent
fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    match DateTime::parse_from_rfc3339(raw) {
        Ok(at) => Some(at.with_timezone(&Utc)),
        Err(e) => {
            log::warn!("ignoring malformed event timestamp '{}': {}", raw, e);
            None
        }
    }
}

impl Persistable for EventDto {
    fn id(&self) -> i64 {
        self.id
    }
}

impl StoreMappable for EventDto {
    type Stored = EventRecord;

    fn to_stored(&self, scope: &mut ContextScope) -> ObjectRef<EventRecord> {
        scope.create_with(|record: &mut EventRecord| {
            self.to_stored_existing(record);
            record.created_at = Some(Utc::now());
        })
    }

    fn to_stored_existing(&self, existing: &mut EventRecord) {
        existing.id = self.id;
        existing.title = Some(self.title.clone());
        existing.kind = Some(self.kind.as_str().to_string());
    }
}

impl DomainMappable for EventRecord {
    type Domain = EventDto;

    fn to_domain(&self) -> EventDto {
        let (Some(title), Some(raw_kind)) = (&self.title, &self.kind) else {
            log::warn!("event record {} is incomplete, using fallback", self.id);
            return EventDto::default();
        };

        match raw_kind.parse::<ButtonEvent>() {
            Ok(kind) => EventDto {
                id: self.id,
                title: title.clone(),
                kind,
                created_at: self.created_at,
            },
            Err(e) => {
                log::warn!("event record {} has {}, using fallback", self.id, e);
                EventDto::default()
            }
        }
    }
}
