use anyhow::{Context, Result};
use std::collections::BTreeMap;
use std::fs;
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, warn};

use crate::fetcher::transport::DEFAULT_API_URL;

/// Flat `Section/Key` view over a config file.
///
/// The file is read as TOML, with tables as sections. Files that are not
/// valid TOML, such as ini files with unquoted values, are read line by line
/// instead and their values are kept as raw strings.
#[derive(Debug, Clone, Default)]
pub struct ConfigStore {
    values: BTreeMap<String, toml::Value>,
}

impl ConfigStore {
    pub fn load(path: &str) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path))?;

        Self::parse(&contents).with_context(|| format!("Failed to parse config file: {}", path))
    }

    pub fn parse(contents: &str) -> Result<Self> {
        let table: toml::Table = match toml::from_str(contents) {
            Ok(table) => table,
            Err(e) => {
                debug!("Config is not TOML, reading it as ini: {}", e);
                return Ok(Self::parse_ini(contents));
            }
        };
        let mut values = BTreeMap::new();

        for (key, value) in table {
            match value {
                toml::Value::Table(section) => {
                    for (inner, value) in section {
                        values.insert(format!("{}/{}", key, inner), value);
                    }
                }
                other => {
                    values.insert(key, other);
                }
            }
        }

        Ok(Self { values })
    }

    /// `[Section]` headers and `key = value` lines; other lines are ignored.
    fn parse_ini(contents: &str) -> Self {
        let mut values = BTreeMap::new();
        let mut section = String::new();

        for line in contents.lines().map(str::trim) {
            if line.is_empty() || line.starts_with(';') || line.starts_with('#') {
                continue;
            }
            if line.starts_with('[') && line.ends_with(']') {
                section = line[1..line.len() - 1].trim().to_string();
                continue;
            }
            let Some((key, value)) = line.split_once('=') else {
                continue;
            };
            let key = if section.is_empty() {
                key.trim().to_string()
            } else {
                format!("{}/{}", section, key.trim())
            };
            values.insert(key, toml::Value::String(value.trim().to_string()));
        }

        Self { values }
    }

    pub fn contains(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    /// Value for `key`, or an empty value (and a warning) when absent.
    pub fn get_value(&self, key: &str) -> ConfigValue {
        match self.values.get(key) {
            Some(value) => ConfigValue(Some(value.clone())),
            None => {
                warn!("Config key not found: {}", key);
                ConfigValue(None)
            }
        }
    }

    fn get_or<V>(&self, key: &str, default: V, convert: impl FnOnce(ConfigValue) -> V) -> V {
        if self.contains(key) {
            convert(self.get_value(key))
        } else {
            default
        }
    }
}

/// Loosely typed config value; conversions fall back to the zero value.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConfigValue(Option<toml::Value>);

impl ConfigValue {
    pub fn is_empty(&self) -> bool {
        self.0.is_none()
    }

    pub fn as_string(&self) -> String {
        match &self.0 {
            Some(toml::Value::String(s)) => s.clone(),
            Some(toml::Value::Integer(i)) => i.to_string(),
            Some(toml::Value::Float(f)) => f.to_string(),
            Some(toml::Value::Boolean(b)) => b.to_string(),
            _ => String::new(),
        }
    }

    pub fn as_f64(&self) -> f64 {
        match &self.0 {
            Some(toml::Value::Float(f)) => *f,
            Some(toml::Value::Integer(i)) => *i as f64,
            Some(toml::Value::String(s)) => s.trim().parse().unwrap_or(0.0),
            _ => 0.0,
        }
    }

    pub fn as_u64(&self) -> u64 {
        match &self.0 {
            Some(toml::Value::Integer(i)) => u64::try_from(*i).unwrap_or(0),
            Some(toml::Value::String(s)) => s.trim().parse().unwrap_or(0),
            _ => 0,
        }
    }

    pub fn as_bool(&self) -> bool {
        match &self.0 {
            Some(toml::Value::Boolean(b)) => *b,
            Some(toml::Value::Integer(i)) => *i != 0,
            Some(toml::Value::String(s)) => {
                matches!(s.trim().to_ascii_lowercase().as_str(), "true" | "1" | "yes" | "on")
            }
            _ => false,
        }
    }
}

fn default_poll_interval() -> u64 { 600 }
fn default_request_timeout() -> u64 { 30 }
fn default_log_path() -> String { "forecast-panel.log".to_string() }
fn default_log_level() -> String { "info".to_string() }

#[derive(Debug, Clone)]
pub struct WeatherSettings {
    pub api_key: String,
    pub latitude: f64,
    pub longitude: f64,
    pub poll_interval: Duration,
    pub request_timeout: Duration,
    pub api_url: String,
}

impl WeatherSettings {
    pub fn from_store(store: &ConfigStore, env: &EnvConfig) -> Self {
        let api_key = match &env.api_key {
            Some(key) => key.clone(),
            None => store.get_value("Weather/OpenWeatherApiKey").as_string(),
        };

        let poll_secs = match store.get_or("Weather/PollIntervalSecs", 0, |v| v.as_u64()) {
            0 => default_poll_interval(),
            secs => secs,
        };
        let timeout_secs = match store.get_or("Weather/RequestTimeoutSecs", 0, |v| v.as_u64()) {
            0 => default_request_timeout(),
            secs => secs,
        };

        let api_url = store.get_or("Weather/ApiUrl", DEFAULT_API_URL.to_string(), |v| v.as_string());

        Self {
            api_key,
            latitude: store.get_value("Weather/Latitude").as_f64(),
            longitude: store.get_value("Weather/Longitude").as_f64(),
            poll_interval: Duration::from_secs(poll_secs),
            request_timeout: Duration::from_secs(timeout_secs),
            api_url,
        }
    }
}

#[derive(Debug, Clone)]
pub struct LoggingSettings {
    pub log_to_console: bool,
    pub log_to_file: bool,
    pub file_path: PathBuf,
    pub level: String,
}

impl LoggingSettings {
    /// Read without warnings; the logger is not installed yet.
    pub fn from_store(store: &ConfigStore) -> Self {
        Self {
            log_to_console: store.get_or("Logging/LogToConsole", true, |v| v.as_bool()),
            log_to_file: store.get_or("Logging/LogToFile", false, |v| v.as_bool()),
            file_path: PathBuf::from(store.get_or("Logging/FilePath", default_log_path(), |v| {
                v.as_string()
            })),
            level: store.get_or("Logging/Level", default_log_level(), |v| v.as_string()),
        }
    }
}

#[derive(Debug, Clone)]
pub struct EnvConfig {
    pub config_path: String,
    pub api_key: Option<String>,
}

impl EnvConfig {
    pub fn load() -> Self {
        dotenv::dotenv().ok();

        Self {
            config_path: std::env::var("FORECAST_CONFIG")
                .unwrap_or_else(|_| "config.toml".to_string()),
            api_key: std::env::var("OPENWEATHER_API_KEY")
                .ok()
                .filter(|key| !key.trim().is_empty()),
        }
    }
}
