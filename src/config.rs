//! Forge configuration
//!
//! Loaded from TOML, by default `<config dir>/sqlforge/config.toml`:
//!
//! ```toml
//! [cache]
//! enabled = true
//! sql_capacity = 1000
//! plan_capacity = 1000
//! compiled_capacity = 500
//!
//! [query]
//! default_tracking = "no_tracking"
//! log_sql = true
//! ```

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{QueryError, QueryResult};
use crate::query::TrackingMode;

/// Cache sizing
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Attach a SQL/plan cache to contexts built from this config
    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default = "default_sql_capacity")]
    pub sql_capacity: usize,

    #[serde(default = "default_plan_capacity")]
    pub plan_capacity: usize,

    #[serde(default = "default_compiled_capacity")]
    pub compiled_capacity: usize,
}

fn default_true() -> bool { true }
fn default_sql_capacity() -> usize { 1000 }
fn default_plan_capacity() -> usize { 1000 }
fn default_compiled_capacity() -> usize { 500 }

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            sql_capacity: default_sql_capacity(),
            plan_capacity: default_plan_capacity(),
            compiled_capacity: default_compiled_capacity(),
        }
    }
}

/// Query defaults
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryConfig {
    /// Tracking mode of new builders
    #[serde(default)]
    pub default_tracking: TrackingMode,

    /// Log rendered SQL at info instead of debug
    #[serde(default)]
    pub log_sql: bool,
}

/// Main configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForgeConfig {
    #[serde(default)]
    pub cache: CacheConfig,

    #[serde(default)]
    pub query: QueryConfig,
}

impl ForgeConfig {
    pub fn builder() -> ForgeConfigBuilder {
        ForgeConfigBuilder::default()
    }

    pub fn from_toml_str(content: &str) -> QueryResult<Self> {
        toml::from_str(content).map_err(|e| QueryError::Config(e.to_string()))
    }

    pub fn load(path: impl AsRef<Path>) -> QueryResult<Self> {
        let path = path.as_ref();
        debug!(path = %path.display(), "loading config");
        let content = fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    /// `<config dir>/sqlforge/config.toml`, when the platform has a config dir.
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("sqlforge").join("config.toml"))
    }

    /// Load the default config file, or fall back to defaults when it is absent.
    pub fn load_default() -> QueryResult<Self> {
        match Self::default_path() {
            Some(path) if path.exists() => Self::load(path),
            _ => Ok(Self::default()),
        }
    }

    pub fn to_toml_string(&self) -> QueryResult<String> {
        toml::to_string_pretty(self).map_err(|e| QueryError::Config(e.to_string()))
    }
}

/// Builder for ForgeConfig
#[derive(Debug, Default)]
pub struct ForgeConfigBuilder {
    config: ForgeConfig,
}

impl ForgeConfigBuilder {
    pub fn cache_enabled(mut self, enabled: bool) -> Self {
        self.config.cache.enabled = enabled;
        self
    }

    pub fn sql_capacity(mut self, capacity: usize) -> Self {
        self.config.cache.sql_capacity = capacity;
        self
    }

    pub fn plan_capacity(mut self, capacity: usize) -> Self {
        self.config.cache.plan_capacity = capacity;
        self
    }

    pub fn compiled_capacity(mut self, capacity: usize) -> Self {
        self.config.cache.compiled_capacity = capacity;
        self
    }

    pub fn default_tracking(mut self, mode: TrackingMode) -> Self {
        self.config.query.default_tracking = mode;
        self
    }

    pub fn log_sql(mut self, enabled: bool) -> Self {
        self.config.query.log_sql = enabled;
        self
    }

    pub fn build(self) -> ForgeConfig {
        self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_defaults() {
        let config = ForgeConfig::default();
        assert!(config.cache.enabled);
        assert_eq!(config.cache.sql_capacity, 1000);
        assert_eq!(config.cache.plan_capacity, 1000);
        assert_eq!(config.cache.compiled_capacity, 500);
        assert_eq!(config.query.default_tracking, TrackingMode::Tracking);
        assert!(!config.query.log_sql);
    }

    #[test]
    fn test_partial_toml() {
        let config = ForgeConfig::from_toml_str(
            r#"
            [cache]
            sql_capacity = 10

            [query]
            default_tracking = "no_tracking"
            "#,
        )
        .unwrap();
        assert_eq!(config.cache.sql_capacity, 10);
        assert_eq!(config.cache.plan_capacity, 1000);
        assert!(config.cache.enabled);
        assert_eq!(config.query.default_tracking, TrackingMode::NoTracking);
    }

    #[test]
    fn test_empty_toml_is_default() {
        assert_eq!(ForgeConfig::from_toml_str("").unwrap(), ForgeConfig::default());
    }

    #[test]
    fn test_invalid_toml() {
        let err = ForgeConfig::from_toml_str("[cache]\nsql_capacity = \"many\"").unwrap_err();
        assert!(matches!(err, QueryError::Config(_)));
    }

    #[test]
    fn test_builder_round_trips_through_toml() {
        let config = ForgeConfig::builder().sql_capacity(5).log_sql(true).build();
        let text = config.to_toml_string().unwrap();
        assert_eq!(ForgeConfig::from_toml_str(&text).unwrap(), config);
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let err = ForgeConfig::load("/nonexistent/sqlforge/config.toml").unwrap_err();
        assert!(matches!(err, QueryError::Io(_)));
    }
}
