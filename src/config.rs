use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use camino::Utf8PathBuf;
use serde::{Deserialize, Serialize};

use crate::connectors::IngestOptions;
use crate::domain::DatasetKey;
use crate::error::PathwayError;
use crate::fetcher::FetchSettings;
use crate::rate_limit::DEFAULT_MIN_INTERVAL;
use crate::shared_cache::DEFAULT_MAX_AGE_DAYS;

pub const CONFIG_FILE: &str = "pathwaydb.json";

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub schema_version: Option<u32>,
    #[serde(default)]
    pub datasets: Vec<DatasetEntry>,
    #[serde(default)]
    pub settings: SettingsEntry,
}

#[derive(Debug, Deserialize, Serialize)]
#[serde(untagged)]
pub enum DatasetEntry {
    Shorthand(String),
    Detailed(DatasetEntryObject),
}

#[derive(Debug, Deserialize, Serialize)]
pub struct DatasetEntryObject {
    pub key: String,
    #[serde(default)]
    pub evidence_codes: Option<Vec<String>>,
    #[serde(default)]
    pub fetch_descriptions: Option<bool>,
}

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct SettingsEntry {
    #[serde(default)]
    pub cache_dir: Option<String>,
    #[serde(default)]
    pub min_interval_ms: Option<u64>,
    #[serde(default)]
    pub max_retries: Option<usize>,
    #[serde(default)]
    pub timeout_secs: Option<u64>,
    #[serde(default)]
    pub response_ttl_hours: Option<u64>,
    /// Zero keeps cached stores current forever.
    #[serde(default)]
    pub cache_max_age_days: Option<u32>,
    #[serde(default)]
    pub term_names_path: Option<String>,
}

#[derive(Debug, Clone)]
pub struct DatasetRequest {
    pub key: DatasetKey,
    pub options: IngestOptions,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    pub cache_dir: Option<Utf8PathBuf>,
    pub min_interval: Duration,
    pub max_retries: usize,
    pub timeout: Duration,
    pub response_ttl: Duration,
    pub cache_max_age: Option<chrono::Duration>,
    pub term_names_path: Option<Utf8PathBuf>,
}

impl Default for Settings {
    fn default() -> Self {
        let fetch = FetchSettings::default();
        Self {
            cache_dir: None,
            min_interval: DEFAULT_MIN_INTERVAL,
            max_retries: fetch.max_retries,
            timeout: fetch.timeout,
            response_ttl: Duration::from_secs(DEFAULT_MAX_AGE_DAYS as u64 * 24 * 3600),
            cache_max_age: Some(chrono::Duration::days(DEFAULT_MAX_AGE_DAYS)),
            term_names_path: None,
        }
    }
}

impl Settings {
    pub fn fetch_settings(&self) -> FetchSettings {
        FetchSettings {
            max_retries: self.max_retries,
            timeout: self.timeout,
            ..FetchSettings::default()
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct ResolvedConfig {
    pub schema_version: u32,
    pub datasets: Vec<DatasetRequest>,
    pub settings: Settings,
}

pub struct ConfigLoader;

impl ConfigLoader {
    /// Reads `path`, or `pathwaydb.json` in the current directory.
    pub fn resolve(path: Option<&str>) -> Result<ResolvedConfig, PathwayError> {
        let config_path = match path {
            Some(path) => PathBuf::from(path),
            None => PathBuf::from(CONFIG_FILE),
        };

        if path.is_none() && !config_path.exists() {
            return Err(PathwayError::MissingConfig);
        }

        let content = fs::read_to_string(&config_path)
            .map_err(|_| PathwayError::ConfigRead(config_path.clone()))?;
        let config: Config = serde_json::from_str(&content)
            .map_err(|err| PathwayError::ConfigParse(err.to_string()))?;

        Self::resolve_config(config)
    }

    /// Like [`ConfigLoader::resolve`], but a missing default file yields defaults.
    pub fn resolve_or_default(path: Option<&str>) -> Result<ResolvedConfig, PathwayError> {
        match Self::resolve(path) {
            Err(PathwayError::MissingConfig) => Self::resolve_config(Config::default()),
            other => other,
        }
    }

    pub fn resolve_config(config: Config) -> Result<ResolvedConfig, PathwayError> {
        let schema_version = config.schema_version.unwrap_or(1);

        let datasets = config
            .datasets
            .into_iter()
            .map(|entry| match entry {
                DatasetEntry::Shorthand(value) => Ok(DatasetRequest {
                    key: value.parse()?,
                    options: IngestOptions::default(),
                }),
                DatasetEntry::Detailed(obj) => Ok(DatasetRequest {
                    key: obj.key.parse()?,
                    options: IngestOptions {
                        fetch_descriptions: obj.fetch_descriptions.unwrap_or(true),
                        evidence_codes: obj.evidence_codes,
                    },
                }),
            })
            .collect::<Result<Vec<_>, PathwayError>>()?;

        Ok(ResolvedConfig {
            schema_version,
            datasets,
            settings: resolve_settings(config.settings)?,
        })
    }
}

fn resolve_settings(entry: SettingsEntry) -> Result<Settings, PathwayError> {
    let defaults = Settings::default();
    let response_ttl = match entry.response_ttl_hours {
        Some(hours) => hours
            .checked_mul(3600)
            .map(Duration::from_secs)
            .ok_or_else(|| {
                PathwayError::ConfigParse(format!("response_ttl_hours {hours} is out of range"))
            })?,
        None => defaults.response_ttl,
    };
    Ok(Settings {
        cache_dir: entry.cache_dir.map(Utf8PathBuf::from),
        min_interval: entry
            .min_interval_ms
            .map(Duration::from_millis)
            .unwrap_or(defaults.min_interval),
        max_retries: entry.max_retries.unwrap_or(defaults.max_retries),
        timeout: entry
            .timeout_secs
            .map(Duration::from_secs)
            .unwrap_or(defaults.timeout),
        response_ttl,
        cache_max_age: match entry.cache_max_age_days {
            Some(0) => None,
            Some(days) => Some(chrono::Duration::days(days as i64)),
            None => defaults.cache_max_age,
        },
        term_names_path: entry.term_names_path.map(Utf8PathBuf::from),
    })
}
