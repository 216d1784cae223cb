use std::path::Path;

use intake_engine::EngineConfig;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("io error reading {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },
    #[error("toml decode error: {0}")]
    TomlDecode(#[from] toml::de::Error),
}

/// Contents of `intake.toml`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub engine: EngineConfig,
}

/// Load settings from `path`, or defaults when no file is given.
pub fn load_settings(path: Option<&Path>) -> Result<Settings, SettingsError> {
    let Some(path) = path else {
        return Ok(Settings::default());
    };
    let content = std::fs::read_to_string(path).map_err(|source| SettingsError::Io {
        path: path.display().to_string(),
        source,
    })?;
    parse_settings(&content)
}

pub fn parse_settings(content: &str) -> Result<Settings, SettingsError> {
    Ok(toml::from_str(content)?)
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;

    use super::*;

    #[test]
    fn partial_settings_fill_defaults() {
        let settings = parse_settings(
            r#"
[engine]
workers = 8
as_of = "2024-06-30"

[engine.cache]
capacity = 64
"#,
        )
        .expect("settings");

        assert_eq!(settings.engine.workers, 8);
        assert_eq!(settings.engine.min_batch_size, 50);
        assert_eq!(settings.engine.cache.capacity, 64);
        assert_eq!(settings.engine.as_of, NaiveDate::from_ymd_opt(2024, 6, 30));
    }

    #[test]
    fn empty_settings_are_defaults() {
        assert_eq!(parse_settings("").expect("settings"), Settings::default());
    }

    #[test]
    fn unknown_types_are_rejected() {
        assert!(parse_settings("[engine]\nworkers = \"many\"\n").is_err());
    }
}
