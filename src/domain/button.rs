// src/domain/button.rs
//
// Button datasource item
//
// Immutable value describing a tappable affordance. Supplied by the data
// collaborators, never persisted.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ButtonData {
    pub id: i64,
    pub title: String,
}

impl ButtonData {
    pub fn new(id: i64, title: impl Into<String>) -> Self {
        Self {
            id,
            title: title.into(),
        }
    }
}
