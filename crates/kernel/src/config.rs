//! Configuration loaded from environment variables.

use std::env;

use anyhow::{Context, Result};

use crate::gather::types::JoinMode;

/// Engine configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    /// Deepest nested fetch allowed (default: 8).
    pub max_nesting_depth: u8,

    /// Page size for batched retrieval when the request sets none (default: 500).
    pub batch_size: u64,

    /// Join mode for top-level filters of new requests (default: AND).
    pub filter_mode: JoinMode,

    /// Log every generated statement at debug level (default: false).
    pub log_sql: bool,

    /// Languages translations exist for, searched by `overAllTranslations`
    /// filters (default: none).
    pub supported_languages: Vec<String>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_nesting_depth: 8,
            batch_size: 500,
            filter_mode: JoinMode::And,
            log_sql: false,
            supported_languages: Vec::new(),
        }
    }
}

impl EngineConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self> {
        Self::from_vars(|key| env::var(key).ok())
    }

    /// Load configuration through `lookup`, which maps a variable name to
    /// its value.
    pub fn from_vars(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let max_nesting_depth = lookup("SETACCIO_MAX_NESTING_DEPTH")
            .unwrap_or_else(|| "8".to_string())
            .trim()
            .parse()
            .context("SETACCIO_MAX_NESTING_DEPTH must be a valid u8")?;

        let batch_size: u64 = lookup("SETACCIO_BATCH_SIZE")
            .unwrap_or_else(|| "500".to_string())
            .trim()
            .parse()
            .context("SETACCIO_BATCH_SIZE must be a valid u64")?;
        if batch_size == 0 {
            anyhow::bail!("SETACCIO_BATCH_SIZE must be greater than 0");
        }

        let filter_mode = lookup("SETACCIO_FILTER_MODE")
            .and_then(|mode| mode.parse().ok())
            .unwrap_or_default();

        let log_sql = lookup("SETACCIO_LOG_SQL")
            .map(|v| matches!(v.trim().to_lowercase().as_str(), "1" | "true" | "yes" | "on"))
            .unwrap_or(false);

        let supported_languages = lookup("SETACCIO_SUPPORTED_LANGUAGES")
            .map(|list| {
                list.split(',')
                    .map(str::trim)
                    .filter(|language| !language.is_empty())
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();

        Ok(Self {
            max_nesting_depth,
            batch_size,
            filter_mode,
            log_sql,
            supported_languages,
        })
    }
}
