//! Service configuration.
//!
//! Values come from the built-in defaults, then an optional TOML file, then
//! `AIRQ_`-prefixed environment variables. Nested keys use `__`, so
//! `AIRQ_INGEST__BATCH_SIZE=500` sets `ingest.batch_size`.

use crate::constants::{
    BATCH_SIZE, CACHE_MAX_ENTRIES, CACHE_TTL, DEFAULT_PAGE_LIMIT, ERROR_FILE_CLEANUP_DELAY,
    JOB_MAX_AGE_HOURS, MAX_PAGE_LIMIT,
};
use figment::providers::{Env, Format, Serialized, Toml};
use figment::Figment;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error(transparent)]
    Load(#[from] Box<figment::Error>),
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IngestConfig {
    /// Rows per storage write.
    pub batch_size: usize,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            batch_size: BATCH_SIZE,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportConfig {
    /// Where published error reports are written.
    pub dir: PathBuf,
    /// Seconds a report survives after its download.
    pub cleanup_delay_secs: u64,
}

impl ReportConfig {
    pub fn cleanup_delay(&self) -> Duration {
        Duration::from_secs(self.cleanup_delay_secs)
    }
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("./uploads"),
            cleanup_delay_secs: ERROR_FILE_CLEANUP_DELAY.as_secs(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheConfig {
    pub ttl_secs: u64,
    pub max_entries: usize,
}

impl CacheConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl_secs: CACHE_TTL.as_secs(),
            max_entries: CACHE_MAX_ENTRIES,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryConfig {
    pub default_limit: u32,
    pub max_limit: u32,
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self {
            default_limit: DEFAULT_PAGE_LIMIT,
            max_limit: MAX_PAGE_LIMIT,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobConfig {
    pub max_age_hours: i64,
}

impl Default for JobConfig {
    fn default() -> Self {
        Self {
            max_age_hours: JOB_MAX_AGE_HOURS,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub ingest: IngestConfig,
    pub reports: ReportConfig,
    pub cache: CacheConfig,
    pub query: QueryConfig,
    pub jobs: JobConfig,
    /// Enables the SQLite store when built with the `sqlite` feature.
    pub database_url: Option<String>,
}

impl Config {
    /// Layer defaults, `path` (if given) and the environment.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut figment = Figment::from(Serialized::defaults(Config::default()));
        if let Some(path) = path {
            debug!(path = %path.display(), "loading configuration file");
            figment = figment.merge(Toml::file(path));
        }
        figment = figment.merge(Env::prefixed("AIRQ_").split("__"));

        let config: Config = figment.extract().map_err(Box::new)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.ingest.batch_size == 0 {
            return Err(ConfigError::Invalid("ingest.batch_size must be at least 1".into()));
        }
        if self.query.default_limit == 0 {
            return Err(ConfigError::Invalid("query.default_limit must be at least 1".into()));
        }
        if self.query.default_limit > self.query.max_limit {
            return Err(ConfigError::Invalid(format!(
                "query.default_limit ({}) exceeds query.max_limit ({})",
                self.query.default_limit, self.query.max_limit
            )));
        }
        if self.cache.max_entries == 0 {
            return Err(ConfigError::Invalid("cache.max_entries must be at least 1".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn defaults_are_valid() {
        let config = Config::default();
        assert_eq!(config.ingest.batch_size, 1000);
        assert_eq!(config.reports.cleanup_delay(), Duration::from_secs(300));
        assert_eq!(config.query.max_limit, 10_000);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn toml_overrides_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[ingest]\nbatch_size = 250\n\n[reports]\ndir = \"/tmp/reports\"").unwrap();

        let config = Config::load(Some(file.path())).unwrap();
        assert_eq!(config.ingest.batch_size, 250);
        assert_eq!(config.reports.dir, PathBuf::from("/tmp/reports"));
        assert_eq!(config.reports.cleanup_delay_secs, 300);
        assert_eq!(config.cache, CacheConfig::default());
    }

    #[test]
    fn zero_batch_size_is_rejected() {
        let mut config = Config::default();
        config.ingest.batch_size = 0;
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn default_limit_above_max_is_rejected() {
        let mut config = Config::default();
        config.query.default_limit = 20_000;
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }
}
