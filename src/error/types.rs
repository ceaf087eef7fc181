// src/error/types.rs
use serde::Serialize;
use thiserror::Error;

/// Failures raised by the button data collaborators (mock generator, JSON fixtures).
#[derive(Debug, Error)]
pub enum DataServiceError {
    #[error("The file named {file_name} was not found.")]
    FileNotFound { file_name: String },

    #[error("Failed to decode the JSON data: {0}")]
    DecodingFailed(#[source] serde_json::Error),

    #[error("An unknown error occurred.")]
    Unknown,
}

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Pool error: {0}")]
    Pool(String),

    /// A save was requested on a context without pending changes.
    /// Callers treat this as a no-op, never as a user-visible failure.
    #[error("No changes to save")]
    NoChanges,

    #[error("Object belongs to context {owner}, not context {used_on}")]
    ForeignObject { owner: u64, used_on: u64 },

    #[error("Persistence context '{0}' is closed")]
    ContextClosed(String),

    #[error("Entity '{entity}' has no field '{field}'")]
    InvalidField {
        entity: &'static str,
        field: String,
    },

    #[error("Data service error: {0}")]
    DataService(#[from] DataServiceError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Resource not found")]
    NotFound,

    #[error("Other error: {0}")]
    Other(String),
}

impl AppError {
    pub fn is_no_changes(&self) -> bool {
        matches!(self, AppError::NoChanges)
    }
}

impl Serialize for AppError {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

impl From<r2d2::Error> for AppError {
    fn from(err: r2d2::Error) -> Self {
        AppError::Pool(err.to_string())
    }
}

pub type AppResult<T> = Result<T, AppError>;

/// Folds the benign `NoChanges` save outcome into success.
pub trait IgnoreNoChanges {
    fn ignore_no_changes(self) -> AppResult<()>;
}

impl<T> IgnoreNoChanges for AppResult<T> {
    fn ignore_no_changes(self) -> AppResult<()> {
        match self {
            Ok(_) => Ok(()),
            Err(AppError::NoChanges) => {
                log::warn!("save skipped: context had no pending changes");
                Ok(())
            }
            Err(e) => Err(e),
        }
    }
}
