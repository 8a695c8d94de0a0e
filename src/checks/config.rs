//! Versioned check configurations
//!
//! Configurations are stored as `{"version": N, ...fields}`. A strategy
//! declares its current version and a chain of migrations, one per version
//! step. Resolving a stored configuration is a pure function:
//!
//! ```text
//! stored (vN) ──migrate──▶ … ──migrate──▶ current (vM) ──deserialize──▶ typed ──validate──▶ Ok(typed)
//! ```

use std::fmt;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A stored configuration together with the schema version it was written with
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VersionedConfig {
    pub version: u32,

    #[serde(flatten)]
    pub data: Map<String, Value>,
}

impl VersionedConfig {
    pub fn new(version: u32, data: Value) -> Self {
        let data = match data {
            Value::Object(map) => map,
            _ => Map::new(),
        };
        Self { version, data }
    }
}

/// One step of a migration chain: upgrades `from_version` to `from_version + 1`
#[derive(Debug, Clone, Copy)]
pub struct ConfigMigration {
    pub from_version: u32,
    pub migrate: fn(Map<String, Value>) -> Result<Map<String, Value>, ConfigError>,
}

/// Errors raised while migrating or validating a configuration
#[derive(Debug, Clone, PartialEq)]
pub enum ConfigError {
    /// A field failed validation
    Validation { field: String, message: String },

    /// The stored version is newer than this build understands
    UnsupportedVersion { found: u32, current: u32 },

    /// No migration is registered for this version step
    MissingMigration { from_version: u32 },

    /// The configuration could not be deserialized into its typed form
    Malformed(String),
}

impl ConfigError {
    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        ConfigError::Validation {
            field: field.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::Validation { field, message } => {
                write!(f, "invalid configuration field '{}': {}", field, message)
            }
            ConfigError::UnsupportedVersion { found, current } => write!(
                f,
                "configuration version {} is newer than supported version {}",
                found, current
            ),
            ConfigError::MissingMigration { from_version } => {
                write!(f, "no migration from configuration version {}", from_version)
            }
            ConfigError::Malformed(msg) => write!(f, "malformed configuration: {}", msg),
        }
    }
}

impl std::error::Error for ConfigError {}

/// Typed configuration with validation beyond what serde defaults express
pub trait ValidateConfig: DeserializeOwned {
    fn validate(&self) -> Result<(), ConfigError>;
}

/// Run the migration chain until `current_version` is reached.
pub fn migrate_config(
    config: &VersionedConfig,
    current_version: u32,
    migrations: &[ConfigMigration],
) -> Result<Map<String, Value>, ConfigError> {
    if config.version > current_version {
        return Err(ConfigError::UnsupportedVersion {
            found: config.version,
            current: current_version,
        });
    }

    let mut data = config.data.clone();
    for version in config.version..current_version {
        let step = migrations
            .iter()
            .find(|m| m.from_version == version)
            .ok_or(ConfigError::MissingMigration {
                from_version: version,
            })?;
        data = (step.migrate)(data)?;
    }

    Ok(data)
}

/// Migrate, deserialize and validate a stored configuration.
pub fn resolve_config<T: ValidateConfig>(
    config: &VersionedConfig,
    current_version: u32,
    migrations: &[ConfigMigration],
) -> Result<T, ConfigError> {
    let data = migrate_config(config, current_version, migrations)?;
    let typed: T = serde_json::from_value(Value::Object(data))
        .map_err(|e| ConfigError::Malformed(e.to_string()))?;
    typed.validate()?;
    Ok(typed)
}
