// src/domain/event/entity.rs
//
// Tracked interaction event and its display form

use chrono::{DateTime, Local, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::domain::{ButtonData, DomainError};

/// Display format used for event timestamps, e.g. `03/14/25 09:26 PM`
pub const TIMESTAMP_FORMAT: &str = "%m/%d/%y %I:%M %p";

/// Kind of interaction recorded for a button
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ButtonEvent {
    #[default]
    Tap,
    DoubleTap,
    LongPress,
}

impl ButtonEvent {
    pub fn as_str(&self) -> &'static str {
        match self {
            ButtonEvent::Tap => "tap",
            ButtonEvent::DoubleTap => "double_tap",
            ButtonEvent::LongPress => "long_press",
        }
    }
}

impl fmt::Display for ButtonEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ButtonEvent {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "tap" => Ok(ButtonEvent::Tap),
            "double_tap" => Ok(ButtonEvent::DoubleTap),
            "long_press" => Ok(ButtonEvent::LongPress),
            other => Err(DomainError::UnknownEventKind(other.to_string())),
        }
    }
}

/// One recorded interaction.
///
/// `created_at` is `None` until the event has been persisted; the store
/// stamps the creation time itself when the record is inserted.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventDto {
    pub id: i64,
    pub title: String,
    pub kind: ButtonEvent,
    pub created_at: Option<DateTime<Utc>>,
}

impl EventDto {
    pub fn new(id: i64, title: impl Into<String>, kind: ButtonEvent) -> Self {
        Self {
            id,
            title: title.into(),
            kind,
            created_at: None,
        }
    }

    /// Build the event for an interaction with a button.
    pub fn from_interaction(button: &ButtonData, kind: ButtonEvent) -> Self {
        Self::new(button.id, button.title.clone(), kind)
    }

    /// `"{title} was {kind} at {timestamp} with ID: {id}"`, dropping the
    /// `at` clause when the event has no timestamp.
    pub fn describe(&self) -> String {
        match self.created_at {
            Some(created_at) => format!(
                "{} was {} at {} with ID: {}",
                self.title,
                self.kind,
                format_timestamp(created_at),
                self.id
            ),
            None => format!("{} was {} with ID: {}", self.title, self.kind, self.id),
        }
    }
}

/// Render a timestamp in local time using [`TIMESTAMP_FORMAT`].
pub fn format_timestamp(at: DateTime<Utc>) -> String {
    at.with_timezone(&Local).format(TIMESTAMP_FORMAT).to_string()
}
