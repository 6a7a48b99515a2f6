//! Service configuration.
//!
//! Settings come from an optional YAML file, then environment variables
//! (including a `.env` file loaded by the binaries) override individual keys.

use std::fs;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::engine::{BatchEvaluator, ObservationFields, ObservationScope};
use crate::reference::TableSources;

/// Environment variable naming the YAML config file.
pub const CONFIG_PATH_VAR: &str = "ORU_CONFIG";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Invalid value '{value}' for {key}: {reason}")]
    InvalidValue {
        key: String,
        value: String,
        reason: String,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    pub host: String,
    pub port: u16,
    pub metrics_csv: PathBuf,
    pub conditions_csv: PathBuf,
    /// Separator between codes (and units) in one metrics cell
    pub list_delimiter: char,
    /// Multipart part carrying the ORU file
    pub upload_field: String,
    pub max_upload_bytes: usize,
    pub observation_scope: ObservationScope,
    pub fields: ObservationFields,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3001,
            metrics_csv: PathBuf::from("diagnostic_metrics.csv"),
            conditions_csv: PathBuf::from("conditions.csv"),
            list_delimiter: ';',
            upload_field: "oruFile".to_string(),
            max_upload_bytes: 10 * 1024 * 1024, // 10 MiB
            observation_scope: ObservationScope::First,
            fields: ObservationFields::default(),
        }
    }
}

fn invalid(key: &str, value: &str, reason: impl ToString) -> ConfigError {
    ConfigError::InvalidValue {
        key: key.to_string(),
        value: value.to_string(),
        reason: reason.to_string(),
    }
}

impl ServiceConfig {
    /// Load configuration from a YAML file.
    ///
    /// Keys missing from the file keep their defaults.
    ///
    /// # Example
    /// ```ignore
    /// use oru_risk::ServiceConfig;
    ///
    /// let config = ServiceConfig::load_from_file("oru-risk.yaml")?;
    /// println!("Serving on {}", config.bind_address()?);
    /// ```
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;

        Self::from_yaml(&contents)
    }

    pub fn from_yaml(contents: &str) -> Result<Self, ConfigError> {
        // An empty document deserializes to unit, not a map
        if contents.trim().is_empty() {
            return Ok(Self::default());
        }
        Ok(serde_yaml::from_str(contents)?)
    }

    /// Resolve the full configuration for a process.
    ///
    /// Reads `path` (or the file named by `ORU_CONFIG`) when given, then
    /// applies environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let from_env = std::env::var(CONFIG_PATH_VAR).ok().map(PathBuf::from);
        let mut config = match path.map(Path::to_path_buf).or(from_env) {
            Some(path) => {
                tracing::info!("Loading configuration from {}", path.display());
                Self::load_from_file(path)?
            }
            None => Self::default(),
        };

        config.apply_overrides(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    /// Override settings from a key lookup (normally the process environment).
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(host) = lookup("ORU_HOST") {
            self.host = host;
        }
        if let Some(port) = lookup("PORT") {
            self.port = port.trim().parse().map_err(|e| invalid("PORT", &port, e))?;
        }
        if let Some(path) = lookup("ORU_METRICS_CSV") {
            self.metrics_csv = PathBuf::from(path);
        }
        if let Some(path) = lookup("ORU_CONDITIONS_CSV") {
            self.conditions_csv = PathBuf::from(path);
        }
        if let Some(delimiter) = lookup("ORU_LIST_DELIMITER") {
            let mut chars = delimiter.chars();
            self.list_delimiter = match (chars.next(), chars.next()) {
                (Some(c), None) => c,
                _ => {
                    return Err(invalid(
                        "ORU_LIST_DELIMITER",
                        &delimiter,
                        "expected a single character",
                    ))
                }
            };
        }
        if let Some(field) = lookup("ORU_UPLOAD_FIELD") {
            self.upload_field = field;
        }
        if let Some(bytes) = lookup("ORU_MAX_UPLOAD_BYTES") {
            self.max_upload_bytes = bytes
                .trim()
                .parse()
                .map_err(|e| invalid("ORU_MAX_UPLOAD_BYTES", &bytes, e))?;
        }
        if let Some(scope) = lookup("ORU_OBSERVATION_SCOPE") {
            self.observation_scope = scope
                .parse()
                .map_err(|e| invalid("ORU_OBSERVATION_SCOPE", &scope, e))?;
        }
        Ok(())
    }

    pub fn bind_address(&self) -> Result<SocketAddr, ConfigError> {
        let raw = format!("{}:{}", self.host, self.port);
        raw.parse().map_err(|e| invalid("host", &raw, e))
    }

    pub fn table_sources(&self) -> TableSources {
        TableSources {
            metrics: self.metrics_csv.clone(),
            conditions: self.conditions_csv.clone(),
            list_delimiter: self.list_delimiter,
        }
    }

    /// Apply the evaluation settings to an evaluator.
    pub fn configure(&self, evaluator: BatchEvaluator) -> BatchEvaluator {
        evaluator
            .with_fields(self.fields.clone())
            .with_scope(self.observation_scope)
    }
}
