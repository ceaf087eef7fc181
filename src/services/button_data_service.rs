// src/services/button_data_service.rs
//
// Button datasource collaborators
//
// Pages are 1-based: page `p` holds items `(p - 1) * per_page` up to
// `p * per_page`, exclusive.

use async_trait::async_trait;
#[cfg(test)]
use mockall::automock;
use serde_json::json;
use std::path::{Path, PathBuf};

use crate::domain::ButtonData;
use crate::error::DataServiceError;

#[cfg_attr(test, automock)]
#[async_trait]
pub trait DataLoadable: Send + Sync {
    async fn load_data(&self, page: u32, per_page: u32) -> Result<Vec<ButtonData>, DataServiceError>;
}

fn page_bounds(page: u32, per_page: u32) -> (u64, u64) {
    let start = u64::from(page.saturating_sub(1)) * u64::from(per_page);
    (start, start + u64::from(per_page))
}

/// Mock generator: item `i` is `{"id": i, "title": "Button i"}`.
#[derive(Debug, Clone, Default)]
pub struct DataService {
    total: Option<u64>,
}

impl DataService {
    /// Unbounded generator
    pub fn new() -> Self {
        Self::default()
    }

    /// Generator that runs dry after `total` items
    pub fn with_total(total: u64) -> Self {
        Self { total: Some(total) }
    }
}

#[async_trait]
impl DataLoadable for DataService {
    async fn load_data(&self, page: u32, per_page: u32) -> Result<Vec<ButtonData>, DataServiceError> {
        let (start, mut end) = page_bounds(page, per_page);
        if let Some(total) = self.total {
            end = end.min(total);
        }

        (start..end)
            .map(|index| {
                let raw = json!({ "id": index, "title": format!("Button {}", index) });
                serde_json::from_value::<ButtonData>(raw).map_err(DataServiceError::DecodingFailed)
            })
            .collect()
    }
}

/// Serves pages out of a JSON array of buttons on disk.
#[derive(Debug, Clone)]
pub struct JsonFileDataService {
    path: PathBuf,
}

impl JsonFileDataService {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn file_name(&self) -> String {
        self.path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.path.display().to_string())
    }
}

#[async_trait]
impl DataLoadable for JsonFileDataService {
    async fn load_data(&self, page: u32, per_page: u32) -> Result<Vec<ButtonData>, DataServiceError> {
        let contents = match tokio::fs::read_to_string(&self.path).await {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(DataServiceError::FileNotFound {
                    file_name: self.file_name(),
                });
            }
            Err(e) => {
                log::error!("failed to read {}: {}", self.path.display(), e);
                return Err(DataServiceError::Unknown);
            }
        };

        let buttons: Vec<ButtonData> =
            serde_json::from_str(&contents).map_err(DataServiceError::DecodingFailed)?;

        let (start, end) = page_bounds(page, per_page);
        Ok(buttons
            .into_iter()
            .skip(start as usize)
            .take((end - start) as usize)
            .collect())
    }
}
