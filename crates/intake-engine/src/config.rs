use chrono::{NaiveDate, Utc};
use intake_rules::CacheConfig;
use serde::{Deserialize, Serialize};

use crate::errors::{EngineError, Result};

/// Options for file validation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Lower bound for rows per batch.
    pub min_batch_size: usize,
    /// Upper bound for rows per batch.
    pub max_batch_size: usize,
    /// Worker threads evaluating rows within a batch.
    pub workers: usize,
    /// Compiled-rule cache sizing.
    pub cache: CacheConfig,
    /// Limit the number of examples emitted in the report.
    pub max_examples: usize,
    /// Processing date for `today()` and temporal bounds; defaults to the current UTC date.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub as_of: Option<NaiveDate>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            min_batch_size: 50,
            max_batch_size: 500,
            workers: 4,
            cache: CacheConfig::default(),
            max_examples: 20,
            as_of: None,
        }
    }
}

impl EngineConfig {
    pub fn validate(&self) -> Result<()> {
        if self.min_batch_size == 0 {
            return Err(EngineError::InvalidConfig(
                "min_batch_size must be at least 1".to_string(),
            ));
        }
        if self.min_batch_size > self.max_batch_size {
            return Err(EngineError::InvalidConfig(format!(
                "min_batch_size {} exceeds max_batch_size {}",
                self.min_batch_size, self.max_batch_size
            )));
        }
        if self.workers == 0 {
            return Err(EngineError::InvalidConfig(
                "workers must be at least 1".to_string(),
            ));
        }
        if self.cache.capacity == 0 || self.cache.shards == 0 {
            return Err(EngineError::InvalidConfig(
                "cache capacity and shards must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    pub fn processing_date(&self) -> NaiveDate {
        self.as_of.unwrap_or_else(|| Utc::now().date_naive())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_config_keeps_defaults() {
        let config: EngineConfig =
            serde_json::from_str(r#"{"workers": 2, "as_of": "2024-06-30"}"#).expect("config");
        assert_eq!(config.workers, 2);
        assert_eq!(config.min_batch_size, 50);
        assert_eq!(
            config.processing_date(),
            NaiveDate::from_ymd_opt(2024, 6, 30).expect("date")
        );
        assert!(config.validate().is_ok());
    }

    #[test]
    fn inverted_batch_bounds_are_rejected() {
        let config = EngineConfig {
            min_batch_size: 600,
            ..EngineConfig::default()
        };
        assert!(matches!(config.validate(), Err(EngineError::InvalidConfig(_))));
    }
}
