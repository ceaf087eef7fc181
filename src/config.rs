// src/config.rs
//
// Application configuration
//
// Resolution order:
// 1. Built-in defaults
// 2. Optional JSON file
// 3. Environment overrides (EVENTLOGGER_DB_PATH, EVENTLOGGER_LOG)

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{AppError, AppResult};

pub const ENV_DB_PATH: &str = "EVENTLOGGER_DB_PATH";
pub const ENV_LOG: &str = "EVENTLOGGER_LOG";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// SQLite file; `None` resolves to the platform data directory
    pub database_path: Option<PathBuf>,
    /// Upper bound of pooled connections (one per live context)
    pub pool_size: u32,
    pub buttons_per_page: u32,
    pub events_per_page: u32,
    pub log_filter: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database_path: None,
            pool_size: 15,
            buttons_per_page: 20,
            events_per_page: 10,
            log_filter: "info".to_string(),
        }
    }
}

impl AppConfig {
    /// Load configuration from `path` if it exists, then apply env overrides.
    pub fn load(path: Option<&Path>) -> AppResult<Self> {
        let mut config = match path {
            Some(path) if path.exists() => {
                let contents = fs::read_to_string(path)?;
                serde_json::from_str(&contents)?
            }
            _ => Self::default(),
        };

        config.apply_env_overrides(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    fn apply_env_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(path) = lookup(ENV_DB_PATH).filter(|v| !v.trim().is_empty()) {
            self.database_path = Some(PathBuf::from(path));
        }
        if let Some(filter) = lookup(ENV_LOG).filter(|v| !v.trim().is_empty()) {
            self.log_filter = filter;
        }
    }

    pub fn validate(&self) -> AppResult<()> {
        if self.buttons_per_page == 0 || self.events_per_page == 0 {
            return Err(AppError::Other(
                "Page sizes must be greater than zero".to_string(),
            ));
        }
        // main context + at least one background context
        if self.pool_size < 2 {
            return Err(AppError::Other(format!(
                "Pool size {} is too small, at least 2 connections are required",
                self.pool_size
            )));
        }
        Ok(())
    }
}
