// src/domain/mod.rs
//
// Domain Root
//
// Plain in-memory values, independent of how they are stored.

pub mod button;
pub mod event;

pub use button::ButtonData;
pub use event::{format_timestamp, ButtonEvent, EventDto, TIMESTAMP_FORMAT};

use thiserror::Error;

/// Domain-level errors
#[derive(Debug, Error)]
pub enum DomainError {
    #[error("Unknown event kind: {0}")]
    UnknownEventKind(String),
}
