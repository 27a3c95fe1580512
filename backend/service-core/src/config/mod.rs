use crate::connector::binding::{BindOptions, RebindPolicy};
use crate::error::config::ConfigError;

use common::ErrorLocation;

use std::panic::Location;
use std::path::Path;
use std::time::Duration;

use log::{info, warn};
use serde::{Deserialize, Serialize};

const CONFIG_FILE_NAME: &str = "config.json";
const CONFIG_VERSION: u32 = 1;

/// Longest rebind delay accepted from configuration.
const MAX_REBIND_DELAY_MS: u64 = 60_000;

// ============================================
// ENUMS WITH DEFAULTS
// ============================================

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RebindStrategy {
    Immediate,
    Backoff,
}

impl Default for RebindStrategy {
    fn default() -> Self {
        RebindStrategy::Immediate
    }
}

// ============================================
// CONFIG STRUCTS
// ============================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerSettings {
    #[serde(default = "default_auto_spawn")]
    pub auto_spawn: bool,
    pub binary_override: Option<String>,
    pub port_override: Option<u16>,
}

impl Default for WorkerSettings {
    fn default() -> Self {
        Self {
            auto_spawn: default_auto_spawn(),
            binary_override: None,
            port_override: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RebindSettings {
    #[serde(default)]
    pub strategy: RebindStrategy,
    #[serde(default = "default_rebind_delay_ms")]
    pub initial_delay_ms: u64,
}

impl Default for RebindSettings {
    fn default() -> Self {
        Self {
            strategy: RebindStrategy::default(),
            initial_delay_ms: default_rebind_delay_ms(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    #[serde(default = "default_version")]
    pub version: u32,

    #[serde(default)]
    pub worker: WorkerSettings,

    #[serde(default)]
    pub rebind: RebindSettings,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            version: CONFIG_VERSION,
            worker: WorkerSettings::default(),
            rebind: RebindSettings::default(),
        }
    }
}

// ============================================
// DEFAULT FUNCTIONS
// ============================================

fn default_version() -> u32 {
    CONFIG_VERSION
}
fn default_auto_spawn() -> bool {
    true
}
fn default_rebind_delay_ms() -> u64 {
    500
}

// ============================================
// IMPLEMENTATION
// ============================================

impl ClientConfig {
    /// Load config from {config_dir}/config.json.
    ///
    /// Falls back to defaults when the file is missing.
    ///
    /// # Returns
    ///
    /// Returns `Ok(ClientConfig)` if loaded successfully or defaults if file missing.
    /// Returns `Err(ConfigError)` if file exists but is corrupted/invalid.
    pub fn load(config_dir: &Path) -> Result<Self, ConfigError> {
        let config_path = config_dir.join(CONFIG_FILE_NAME);

        if !config_path.exists() {
            info!(
                "Config file not found at {}, using defaults",
                config_path.display()
            );
            return Ok(Self::default());
        }

        // Read file
        let contents = std::fs::read_to_string(&config_path).map_err(|e| {
            warn!("Failed to read config file: {}", e);
            ConfigError::ReadError {
                location: ErrorLocation::from(Location::caller()),
                path: config_path.clone(),
                source: e,
            }
        })?;

        // Parse JSON
        let config: ClientConfig = serde_json::from_str(&contents).map_err(|e| {
            warn!("Failed to parse config JSON: {}", e);
            ConfigError::ParseError {
                location: ErrorLocation::from(Location::caller()),
                path: config_path.clone(),
                reason: e.to_string(),
            }
        })?;

        // Validate
        config.validate()?;

        info!("Config loaded from {}", config_path.display());
        Ok(config)
    }

    /// Save config to {config_dir}/config.json using atomic write.
    ///
    /// Uses temp file + rename for atomicity (no corruption on crash).
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if:
    /// - Directory creation fails
    /// - Serialization fails
    /// - Write fails
    /// - Rename fails
    pub fn save(&self, config_dir: &Path) -> Result<(), ConfigError> {
        // Validate before saving
        self.validate()?;

        // Ensure directory exists
        std::fs::create_dir_all(config_dir).map_err(|e| ConfigError::WriteError {
            location: ErrorLocation::from(Location::caller()),
            path: config_dir.to_path_buf(),
            source: e,
        })?;

        let config_path = config_dir.join(CONFIG_FILE_NAME);
        let temp_path = config_dir.join(format!("{}.tmp", CONFIG_FILE_NAME));

        // Serialize to JSON
        let json = serde_json::to_string_pretty(self).map_err(|e| ConfigError::SerializeError {
            location: ErrorLocation::from(Location::caller()),
            reason: e.to_string(),
        })?;

        // Write to temp file
        std::fs::write(&temp_path, json).map_err(|e| ConfigError::WriteError {
            location: ErrorLocation::from(Location::caller()),
            path: temp_path.clone(),
            source: e,
        })?;

        // Atomic rename (POSIX guarantees atomicity)
        std::fs::rename(&temp_path, &config_path).map_err(|e| ConfigError::WriteError {
            location: ErrorLocation::from(Location::caller()),
            path: config_path.clone(),
            source: e,
        })?;

        info!("Config saved to {}", config_path.display());
        Ok(())
    }

    /// Validate config values.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::ValidationError`] if any value is invalid.
    pub fn validate(&self) -> Result<(), ConfigError> {
        // Version check
        if self.version == 0 || self.version > CONFIG_VERSION {
            return Err(ConfigError::ValidationError {
                location: ErrorLocation::from(Location::caller()),
                reason: format!(
                    "Invalid version: {} (expected 1-{})",
                    self.version, CONFIG_VERSION
                ),
            });
        }

        // Rebind delay bounds
        if self.rebind.initial_delay_ms == 0 || self.rebind.initial_delay_ms > MAX_REBIND_DELAY_MS {
            return Err(ConfigError::ValidationError {
                location: ErrorLocation::from(Location::caller()),
                reason: format!(
                    "Invalid rebind delay: {}ms (must be 1-{MAX_REBIND_DELAY_MS})",
                    self.rebind.initial_delay_ms
                ),
            });
        }

        // Binary override (if set)
        if let Some(ref binary) = self.worker.binary_override
            && binary.is_empty()
        {
            return Err(ConfigError::ValidationError {
                location: ErrorLocation::from(Location::caller()),
                reason: "binary_override cannot be empty string".to_string(),
            });
        }

        Ok(())
    }

    /// Rebind pacing as the connector's binding consumes it.
    pub fn rebind_policy(&self) -> RebindPolicy {
        match self.rebind.strategy {
            RebindStrategy::Immediate => RebindPolicy::Immediate,
            RebindStrategy::Backoff => RebindPolicy::Backoff {
                initial: Duration::from_millis(self.rebind.initial_delay_ms),
            },
        }
    }

    /// Binding options derived from this config.
    pub fn bind_options(&self) -> BindOptions {
        BindOptions {
            auto_spawn: self.worker.auto_spawn,
            binary_override: self.worker.binary_override.clone(),
            rebind: self.rebind_policy(),
        }
    }
}
