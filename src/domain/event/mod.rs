// src/domain/event/mod.rs

pub mod entity;

pub use entity::{format_timestamp, ButtonEvent, EventDto, TIMESTAMP_FORMAT};
