use chrono::format::{Item, StrftimeItems};
use kassa_match::{MatchRule, RuleError};
use kassa_notify::TelegramConfig;
use kassa_sources::{PosterConfig, PrivatConfig};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use thiserror::Error;

pub const DEFAULT_CONFIG_PATH: &str = "config/config.toml";

pub const ENV_PRIVAT_TOKEN: &str = "KASSA_PRIVAT_TOKEN";
pub const ENV_POSTER_TOKEN: &str = "KASSA_POSTER_TOKEN";
pub const ENV_TELEGRAM_TOKEN: &str = "KASSA_TELEGRAM_TOKEN";

/// Largest accepted lookback, in days.
const MAX_LOOKBACK_DAYS: u32 = 366;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Configuration file not found: {0}")]
    NotFound(PathBuf),
    #[error("Failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Invalid configuration syntax: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("Invalid matching rule: {0}")]
    Rule(#[from] RuleError),
    #[error("{0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub lookback_days: u32,
    /// chrono format used for the report's period labels.
    pub date_format: String,
    pub matched_ids_path: PathBuf,
    pub log_level: String,
    /// Also write logs here, next to the console output.
    pub log_file: Option<PathBuf>,
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            lookback_days: 1,
            date_format: "%Y-%m-%d".to_string(),
            matched_ids_path: PathBuf::from("data/matched_ids.json"),
            log_level: "info".to_string(),
            log_file: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub settings: Settings,
    #[serde(default)]
    pub matching: MatchRule,
    pub privatbank: PrivatConfig,
    pub poster: PosterConfig,
    #[serde(default)]
    pub telegram: Option<TelegramConfig>,
}

impl Config {
    /// Reads, applies environment overrides and validates.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let config = Self::read(path)?;
        config.validate()?;
        Ok(config)
    }

    /// Reads and applies environment overrides without validating, so the
    /// notifier and logging sections stay usable when other sections are bad.
    pub fn read(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| {
            if source.kind() == std::io::ErrorKind::NotFound {
                ConfigError::NotFound(path.to_path_buf())
            } else {
                ConfigError::Read {
                    path: path.to_path_buf(),
                    source,
                }
            }
        })?;
        let mut config = Self::from_toml(&text)?;
        config.apply_env(|key| std::env::var(key).ok());
        Ok(config)
    }

    pub fn from_toml(text: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(text)?)
    }

    /// Non-empty values from `lookup` replace the tokens from the file.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        if let Some(token) = get(ENV_PRIVAT_TOKEN) {
            self.privatbank.token = token;
        }
        if let Some(token) = get(ENV_POSTER_TOKEN) {
            self.poster.token = token;
        }
        if let (Some(telegram), Some(token)) = (self.telegram.as_mut(), get(ENV_TELEGRAM_TOKEN)) {
            telegram.token = token;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.privatbank.token.trim().is_empty() {
            return Err(missing("privatbank.token", ENV_PRIVAT_TOKEN));
        }
        if self.privatbank.iban.trim().is_empty() {
            return Err(ConfigError::Invalid("privatbank.iban is missing".into()));
        }
        if self.poster.token.trim().is_empty() {
            return Err(missing("poster.token", ENV_POSTER_TOKEN));
        }
        if self.poster.account_id <= 0 {
            return Err(ConfigError::Invalid(format!(
                "poster.account_id must be positive, got {}",
                self.poster.account_id
            )));
        }
        if let Some(telegram) = &self.telegram {
            if telegram.token.trim().is_empty() {
                return Err(missing("telegram.token", ENV_TELEGRAM_TOKEN));
            }
            if telegram.chat_id.is_empty() {
                return Err(ConfigError::Invalid("telegram.chat_id is missing".into()));
            }
        }
        if self.settings.lookback_days > MAX_LOOKBACK_DAYS {
            return Err(ConfigError::Invalid(format!(
                "settings.lookback_days must be at most {MAX_LOOKBACK_DAYS}"
            )));
        }
        if StrftimeItems::new(&self.settings.date_format).any(|item| matches!(item, Item::Error)) {
            return Err(ConfigError::Invalid(format!(
                "settings.date_format '{}' is not a valid date format",
                self.settings.date_format
            )));
        }
        self.matching.validate()?;
        Ok(())
    }
}

fn missing(field: &str, env: &str) -> ConfigError {
    ConfigError::Invalid(format!("{field} is missing (set it in the file or via {env})"))
}
