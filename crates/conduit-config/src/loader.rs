//! Layered configuration loading.
//!
//! This module provides the [`ConfigLoader`] for loading configuration from
//! defaults, files, a `.env` file, and environment variables.

use serde_json::{Map, Value};
use std::env;
use std::fs;
use std::path::Path;

use crate::{ConduitConfig, ConfigError};

/// Default prefix for environment overrides.
pub const ENV_PREFIX: &str = "CONDUIT";

/// Configuration loader with layered approach.
///
/// Later layers override earlier ones key by key:
/// 1. Default values (or a preset)
/// 2. Configuration files (TOML or JSON), in the order given
/// 3. Environment variables of the form `PREFIX__SECTION__KEY`
///
/// # Example
///
/// ```no_run
/// use conduit_config::ConfigLoader;
///
/// # fn main() -> Result<(), conduit_config::ConfigError> {
/// let config = ConfigLoader::new()
///     .with_defaults()
///     .with_optional_file("conduit.toml")?
///     .with_dotenv()?
///     .with_env_prefix("CONDUIT")
///     .load()?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct ConfigLoader {
    layered: Value,
    env_prefix: Option<String>,
    env_vars: Option<Vec<(String, String)>>,
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigLoader {
    /// Create a new configuration loader seeded with defaults.
    #[must_use]
    pub fn new() -> Self {
        Self::seeded(&ConduitConfig::default())
    }

    fn seeded(config: &ConduitConfig) -> Self {
        Self {
            layered: serde_json::to_value(config).unwrap_or(Value::Object(Map::new())),
            env_prefix: None,
            env_vars: None,
        }
    }

    fn reseed(mut self, config: &ConduitConfig) -> Self {
        let seeded = Self::seeded(config);
        self.layered = seeded.layered;
        self
    }

    /// Start from default configuration values.
    #[must_use]
    pub fn with_defaults(self) -> Self {
        self.reseed(&ConduitConfig::default())
    }

    /// Start from the development preset.
    ///
    /// # Example
    ///
    /// ```
    /// use conduit_config::ConfigLoader;
    ///
    /// let config = ConfigLoader::new()
    ///     .with_development()
    ///     .load()
    ///     .unwrap();
    ///
    /// assert_eq!(config.telemetry.logging.level, "debug");
    /// ```
    #[must_use]
    pub fn with_development(self) -> Self {
        self.reseed(&ConduitConfig::development())
    }

    /// Start from the production preset.
    #[must_use]
    pub fn with_production(self) -> Self {
        self.reseed(&ConduitConfig::production())
    }

    /// Layer a configuration file over the current values.
    ///
    /// The format follows the extension: `.toml` or `.json`.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if the file is missing, unreadable, has an
    /// unsupported extension, or does not parse.
    pub fn with_file<P: AsRef<Path>>(self, path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();

        if !path.exists() {
            return Err(ConfigError::file_not_found(path));
        }

        let content = fs::read_to_string(path).map_err(|e| ConfigError::read_error(path, e))?;

        let format = path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_lowercase)
            .ok_or_else(|| ConfigError::UnsupportedFormat(path.display().to_string()))?;

        self.with_string(&content, &format)
    }

    /// Layer a configuration file if it exists.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if the file exists but cannot be loaded.
    pub fn with_optional_file<P: AsRef<Path>>(self, path: P) -> Result<Self, ConfigError> {
        if path.as_ref().exists() {
            self.with_file(path)
        } else {
            Ok(self)
        }
    }

    /// Layer configuration from a string in `format` (`toml` or `json`).
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if parsing fails or the format is unknown.
    ///
    /// # Example
    ///
    /// ```
    /// use conduit_config::ConfigLoader;
    ///
    /// let toml = r#"
    ///     [http]
    ///     addr = "127.0.0.1:3000"
    /// "#;
    ///
    /// let config = ConfigLoader::new()
    ///     .with_string(toml, "toml")
    ///     .unwrap()
    ///     .load()
    ///     .unwrap();
    ///
    /// assert_eq!(config.http.addr, "127.0.0.1:3000");
    /// assert_eq!(config.http.shutdown_timeout_ms, 30_000);
    /// ```
    pub fn with_string(mut self, content: &str, format: &str) -> Result<Self, ConfigError> {
        let overlay: Value = match format.to_lowercase().as_str() {
            "toml" => {
                let table: toml::Table = toml::from_str(content)?;
                serde_json::to_value(table)?
            }
            "json" => serde_json::from_str(content)?,
            other => return Err(ConfigError::UnsupportedFormat(other.to_string())),
        };

        merge(&mut self.layered, overlay);
        Ok(self)
    }

    /// Load a `.env` file from the working directory into the process
    /// environment, if one exists.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::DotEnv` if the file exists but is malformed.
    pub fn with_dotenv(self) -> Result<Self, ConfigError> {
        match dotenvy::dotenv() {
            Ok(_) => Ok(self),
            Err(e) if e.not_found() => Ok(self),
            Err(e) => Err(e.into()),
        }
    }

    /// Set the environment variable prefix for overrides.
    ///
    /// With prefix `CONDUIT`:
    /// - `CONDUIT__HTTP__ADDR=0.0.0.0:9000`
    /// - `CONDUIT__TELEMETRY__LOGGING__LEVEL=debug`
    #[must_use]
    pub fn with_env_prefix(mut self, prefix: &str) -> Self {
        self.env_prefix = Some(prefix.to_uppercase());
        self
    }

    /// Read overrides from `vars` instead of the process environment.
    #[must_use]
    pub fn with_env_vars<I, K, V>(mut self, vars: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.env_vars = Some(
            vars.into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        );
        self
    }

    /// Apply environment overrides, deserialize, and validate.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if an override names an unknown key or cannot
    /// be parsed, if the layered values do not fit the schema, or if
    /// validation fails.
    ///
    /// # Example
    ///
    /// ```
    /// use conduit_config::ConfigLoader;
    ///
    /// let config = ConfigLoader::new().load().unwrap();
    /// assert_eq!(config.http.addr, "0.0.0.0:8080");
    /// ```
    pub fn load(self) -> Result<ConduitConfig, ConfigError> {
        let config = self.load_unvalidated()?;
        config.validate()?;
        Ok(config)
    }

    /// Apply environment overrides and deserialize without validating.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if an override is malformed or the layered
    /// values do not fit the schema.
    pub fn load_unvalidated(mut self) -> Result<ConduitConfig, ConfigError> {
        if let Some(prefix) = self.env_prefix.take() {
            let vars = self.env_vars.take().unwrap_or_else(|| env::vars().collect());
            for (key, value) in vars {
                apply_env_var(&mut self.layered, &prefix, &key, &value)?;
            }
        }

        Ok(serde_json::from_value(self.layered)?)
    }
}

/// Recursively overlays `overlay` onto `base`. Tables merge; everything else
/// replaces.
fn merge(base: &mut Value, overlay: Value) {
    match (base, overlay) {
        (Value::Object(base), Value::Object(overlay)) => {
            for (key, value) in overlay {
                match base.get_mut(&key) {
                    Some(existing) => merge(existing, value),
                    None => {
                        base.insert(key, value);
                    }
                }
            }
        }
        (base, overlay) => *base = overlay,
    }
}

/// Applies one `PREFIX__SECTION__KEY` variable. Variables without the prefix
/// are ignored.
fn apply_env_var(
    layered: &mut Value,
    prefix: &str,
    key: &str,
    value: &str,
) -> Result<(), ConfigError> {
    let Some(path) = key
        .strip_prefix(prefix)
        .and_then(|rest| rest.strip_prefix("__"))
    else {
        return Ok(());
    };

    let segments: Vec<String> = path.split("__").map(str::to_lowercase).collect();
    let Some((field, sections)) = segments.split_last() else {
        return Err(ConfigError::env_parse_error(key, "missing key"));
    };

    let mut target = &mut *layered;
    for section in sections {
        target = target
            .get_mut(section.as_str())
            .filter(|v| v.is_object())
            .ok_or_else(|| ConfigError::unknown_field(section.clone(), "root"))?;
    }

    let section_name = if sections.is_empty() {
        "root".to_string()
    } else {
        sections.join(".")
    };
    let slot = target
        .get_mut(field.as_str())
        .ok_or_else(|| ConfigError::unknown_field(field.clone(), section_name))?;

    *slot = env_value(slot, key, value)?;
    Ok(())
}

/// Interprets `raw` according to the type of the value it replaces.
fn env_value(current: &Value, key: &str, raw: &str) -> Result<Value, ConfigError> {
    match current {
        Value::String(_) => Ok(Value::String(raw.to_string())),
        Value::Bool(_) => parse_bool(raw)
            .map(Value::Bool)
            .ok_or_else(|| ConfigError::env_parse_error(key, "expected boolean")),
        Value::Number(n) if n.is_f64() => raw
            .parse::<f64>()
            .ok()
            .and_then(|f| serde_json::Number::from_f64(f).map(Value::Number))
            .ok_or_else(|| ConfigError::env_parse_error(key, "expected number")),
        Value::Number(_) => raw
            .parse::<u64>()
            .map(Value::from)
            .map_err(|_| ConfigError::env_parse_error(key, "expected integer")),
        // Unset optionals: an empty value keeps them unset.
        Value::Null if raw.is_empty() => Ok(Value::Null),
        Value::Null => Ok(Value::String(raw.to_string())),
        Value::Array(_) | Value::Object(_) => Err(ConfigError::env_parse_error(
            key,
            "cannot override a table from the environment",
        )),
    }
}

/// Parse a boolean from a string.
fn parse_bool(s: &str) -> Option<bool> {
    match s.to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}
