//! Core runtime configuration.
//!
//! # Responsibility
//! - Describe every tunable the core reads at startup.
//! - Load it from a JSON document with all fields defaulted.
//!
//! # Invariants
//! - Unknown keys are rejected so typos never silently fall back to defaults.
//! - A loaded config always passes `validate`.

use crate::logging::default_log_level;
use crate::processor::DEFAULT_MAX_CONFLICT_RETRIES;
use crate::search::aggregator::DEFAULT_SEARCH_LIMIT;
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::path::{Path, PathBuf};

/// Searchable entities in declaration order.
pub const DEFAULT_SEARCH_ENTITIES: &[&str] = &[
    "Broods",
    "Individuals",
    "Organisations",
    "SharingGroups",
    "Users",
    "EncryptionKeys",
];

/// Tables summarized by the instance statistics.
pub const DEFAULT_STATISTICS_TABLES: &[&str] = &[
    "users",
    "individuals",
    "organisations",
    "sharing_groups",
    "broods",
    "encryption_keys",
];

#[derive(Debug)]
pub enum ConfigError {
    Io { path: PathBuf, source: std::io::Error },
    Parse(serde_json::Error),
    Invalid(String),
}

impl Display for ConfigError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io { path, source } => {
                write!(f, "failed to read config `{}`: {source}", path.display())
            }
            Self::Parse(err) => write!(f, "invalid config document: {err}"),
            Self::Invalid(message) => write!(f, "invalid config: {message}"),
        }
    }
}

impl Error for ConfigError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Io { source, .. } => Some(source),
            Self::Parse(err) => Some(err),
            Self::Invalid(_) => None,
        }
    }
}

impl From<serde_json::Error> for ConfigError {
    fn from(value: serde_json::Error) -> Self {
        Self::Parse(value)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CoreConfig {
    pub log_level: String,
    /// Absolute directory for rolling log files; logging stays off when unset.
    pub log_dir: Option<String>,
    pub search: SearchConfig,
    pub inbox: InboxConfig,
    pub statistics: StatisticsConfig,
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level().to_string(),
            log_dir: None,
            search: SearchConfig::default(),
            inbox: InboxConfig::default(),
            statistics: StatisticsConfig::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SearchConfig {
    pub default_limit: u32,
    pub entities: Vec<String>,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            default_limit: DEFAULT_SEARCH_LIMIT,
            entities: DEFAULT_SEARCH_ENTITIES
                .iter()
                .map(|name| name.to_string())
                .collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct InboxConfig {
    pub default_page_size: u32,
    pub max_page_size: u32,
    /// Extra attempts granted to an apply hitting a busy/locked database.
    pub apply_max_retries: u32,
}

impl Default for InboxConfig {
    fn default() -> Self {
        Self {
            default_page_size: 20,
            max_page_size: 100,
            apply_max_retries: DEFAULT_MAX_CONFLICT_RETRIES,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct StatisticsConfig {
    pub days: u32,
    pub tables: Vec<String>,
}

impl Default for StatisticsConfig {
    fn default() -> Self {
        Self {
            days: 30,
            tables: DEFAULT_STATISTICS_TABLES
                .iter()
                .map(|table| table.to_string())
                .collect(),
        }
    }
}

impl CoreConfig {
    /// Parses and validates a JSON config document.
    pub fn from_json_str(document: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(document)?;
        config.validate()?;
        Ok(config)
    }

    /// Reads and parses the config file at `path`.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let document = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json_str(&document)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.search.default_limit == 0 {
            return Err(ConfigError::Invalid(
                "search.default_limit must be greater than zero".to_string(),
            ));
        }
        if self.inbox.default_page_size == 0 {
            return Err(ConfigError::Invalid(
                "inbox.default_page_size must be greater than zero".to_string(),
            ));
        }
        if self.inbox.max_page_size < self.inbox.default_page_size {
            return Err(ConfigError::Invalid(format!(
                "inbox.max_page_size ({}) is below inbox.default_page_size ({})",
                self.inbox.max_page_size, self.inbox.default_page_size
            )));
        }
        if self.statistics.days == 0 {
            return Err(ConfigError::Invalid(
                "statistics.days must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::{ConfigError, CoreConfig, DEFAULT_SEARCH_ENTITIES};

    #[test]
    fn empty_document_yields_defaults() {
        let config = CoreConfig::from_json_str("{}").unwrap();
        assert_eq!(config, CoreConfig::default());
        assert_eq!(config.search.default_limit, 5);
        assert_eq!(config.search.entities.len(), DEFAULT_SEARCH_ENTITIES.len());
        assert_eq!(config.inbox.apply_max_retries, 1);
        assert_eq!(config.statistics.days, 30);
    }

    #[test]
    fn nested_sections_are_partially_overridable() {
        let config = CoreConfig::from_json_str(
            r#"{"search": {"entities": ["Organisations"]}, "inbox": {"max_page_size": 50}}"#,
        )
        .unwrap();
        assert_eq!(config.search.entities, vec!["Organisations".to_string()]);
        assert_eq!(config.search.default_limit, 5);
        assert_eq!(config.inbox.max_page_size, 50);
        assert_eq!(config.inbox.default_page_size, 20);
    }

    #[test]
    fn unknown_keys_are_rejected() {
        let err = CoreConfig::from_json_str(r#"{"serach": {}}"#).unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn inconsistent_page_sizes_are_rejected() {
        let err = CoreConfig::from_json_str(
            r#"{"inbox": {"default_page_size": 40, "max_page_size": 10}}"#,
        )
        .unwrap_err();
        assert!(err.to_string().contains("max_page_size"));
    }
}
