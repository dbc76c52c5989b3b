//! Persistence configuration.
//!
//! Loaded from TOML, e.g.
//!
//! ```toml
//! dialect = "postgresql"
//! max_in_keys = 32767
//!
//! [cache.record]
//! capacity = 10000
//!
//! [cache.short_keyset]
//! capacity = 1000
//! ttl_secs = 60
//! ```

use crate::cache::CacheCategory;
use crate::error::{OrmError, OrmResult};
use relstore_sql::{DialectKind, MAX_KEYS};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersistenceConfig {
    /// SQL dialect to render statements in
    #[serde(default)]
    pub dialect: DialectKind,
    /// Largest key batch fetched by one statement
    #[serde(default = "default_max_in_keys")]
    pub max_in_keys: usize,
    #[serde(default)]
    pub cache: CacheConfig,
}

fn default_max_in_keys() -> usize {
    MAX_KEYS
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        Self {
            dialect: DialectKind::default(),
            max_in_keys: default_max_in_keys(),
            cache: CacheConfig::default(),
        }
    }
}

impl PersistenceConfig {
    pub fn from_toml_str(content: &str) -> OrmResult<Self> {
        let config: PersistenceConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> OrmResult<Self> {
        let content = std::fs::read_to_string(path)?;
        let config = Self::from_toml_str(&content)?;
        tracing::info!(
            "Loaded persistence config from {} (dialect {:?}, max_in_keys {})",
            path.display(),
            config.dialect,
            config.max_in_keys
        );
        Ok(config)
    }

    pub fn validate(&self) -> OrmResult<()> {
        if self.max_in_keys == 0 || self.max_in_keys > MAX_KEYS {
            return Err(OrmError::Config(format!(
                "max_in_keys must be between 1 and {}, got {}",
                MAX_KEYS, self.max_in_keys
            )));
        }
        for (name, category) in [
            ("record", &self.cache.record),
            ("short_keyset", &self.cache.short_keyset),
            ("long_keyset", &self.cache.long_keyset),
            ("result", &self.cache.result),
        ] {
            if category.capacity == 0 {
                return Err(OrmError::Config(format!("cache.{}.capacity must be positive", name)));
            }
        }
        Ok(())
    }
}

/// Capacity (entries per namespace) and time-to-live of one cache category.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CategoryConfig {
    pub capacity: usize,
    #[serde(default)]
    pub ttl_secs: Option<u64>,
}

impl CategoryConfig {
    pub fn new(capacity: usize, ttl_secs: Option<u64>) -> Self {
        Self { capacity, ttl_secs }
    }

    pub fn ttl(&self) -> Option<Duration> {
        self.ttl_secs.map(Duration::from_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// When false, every lookup misses and nothing is stored
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(default = "default_record")]
    pub record: CategoryConfig,
    #[serde(default = "default_short_keyset")]
    pub short_keyset: CategoryConfig,
    #[serde(default = "default_long_keyset")]
    pub long_keyset: CategoryConfig,
    #[serde(default = "default_result")]
    pub result: CategoryConfig,
}

fn default_enabled() -> bool {
    true
}

fn default_record() -> CategoryConfig {
    CategoryConfig::new(10_000, None)
}

fn default_short_keyset() -> CategoryConfig {
    CategoryConfig::new(1_000, Some(60))
}

fn default_long_keyset() -> CategoryConfig {
    CategoryConfig::new(1_000, Some(3_600))
}

fn default_result() -> CategoryConfig {
    CategoryConfig::new(100, Some(60))
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: default_enabled(),
            record: default_record(),
            short_keyset: default_short_keyset(),
            long_keyset: default_long_keyset(),
            result: default_result(),
        }
    }
}

impl CacheConfig {
    pub fn category(&self, category: CacheCategory) -> &CategoryConfig {
        match category {
            CacheCategory::Record => &self.record,
            CacheCategory::ShortKeyset => &self.short_keyset,
            CacheCategory::LongKeyset => &self.long_keyset,
            CacheCategory::Result => &self.result,
        }
    }
}
