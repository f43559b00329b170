use crate::report::{CATEGORY_POWER_SUPPLY, CATEGORY_POWER_UNIT};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    #[serde(default = "default_command")]
    pub command: String,
    #[serde(default = "default_args")]
    pub args: Vec<String>,
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    #[serde(default = "default_categories")]
    pub categories: Vec<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            command: default_command(),
            args: default_args(),
            timeout_ms: default_timeout_ms(),
            categories: default_categories(),
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },
    #[error("failed to parse YAML in {path}: {source}")]
    Parse {
        path: String,
        source: serde_yaml::Error,
    },
    #[error("invalid configuration: {0}")]
    Validation(String),
}

impl Config {
    pub fn load_from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path_ref = path.as_ref();
        let path_display = path_ref.display().to_string();
        let text = fs::read_to_string(path_ref).map_err(|source| ConfigError::Read {
            path: path_display.clone(),
            source,
        })?;

        let cfg: Config = serde_yaml::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path_display,
            source,
        })?;

        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.command.trim().is_empty() {
            return Err(ConfigError::Validation(
                "command must not be empty".to_string(),
            ));
        }
        if self.timeout_ms == 0 {
            return Err(ConfigError::Validation(
                "timeout_ms must be > 0".to_string(),
            ));
        }

        validate_categories(&self.categories)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn example_yaml() -> &'static str {
        include_str!("../config.yaml.example")
    }
}

fn validate_categories(categories: &[String]) -> Result<(), ConfigError> {
    if categories.is_empty() {
        return Err(ConfigError::Validation(
            "categories must list at least one sensor type".to_string(),
        ));
    }

    let mut seen = HashSet::new();
    for category in categories {
        if category.trim().is_empty() {
            return Err(ConfigError::Validation(
                "categories[*] must not be empty".to_string(),
            ));
        }
        if !seen.insert(category.as_str()) {
            return Err(ConfigError::Validation(format!(
                "category '{}' is listed more than once",
                category
            )));
        }
    }
    Ok(())
}

fn default_command() -> String {
    "ipmimonitoring".to_string()
}

fn default_args() -> Vec<String> {
    vec!["--comma-separated-output".to_string()]
}

const fn default_timeout_ms() -> u64 {
    30_000
}

fn default_categories() -> Vec<String> {
    vec![
        CATEGORY_POWER_UNIT.to_string(),
        CATEGORY_POWER_SUPPLY.to_string(),
    ]
}
