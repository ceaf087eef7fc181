pub mod types;

pub use types::{AppError, AppResult, DataServiceError, IgnoreNoChanges};
