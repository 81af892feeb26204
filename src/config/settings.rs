//! Application settings loaded from `config.toml`.
//!
//! Business logic never reads the environment. Everything it needs travels in
//! [`PolicySettings`], which is handed to [`crate::AppContext`] at construction.

use crate::errors::{Error, Result};
use serde::Deserialize;
use std::path::Path;

/// Knobs consulted by the core operations.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct PolicySettings {
    /// Length of the one-time login credential generated at enrollment
    pub credential_length: usize,
    /// bcrypt cost used to hash generated credentials
    pub password_hash_cost: u32,
    /// Plan used for renewals when the caller does not name one
    pub default_plan: Option<String>,
}

impl Default for PolicySettings {
    fn default() -> Self {
        Self {
            credential_length: 8,
            password_hash_cost: bcrypt::DEFAULT_COST,
            default_plan: None,
        }
    }
}

/// One `[[plans]]` entry of the catalog.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct PlanConfig {
    pub name: String,
    /// Price in paise
    pub price: i64,
    pub duration_days: i32,
    pub max_members: i32,
    pub max_groups: i32,
}

/// Configuration structure representing the entire config.toml file
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    /// Overridden by `DATABASE_URL` when set
    #[serde(default)]
    pub database_url: Option<String>,
    /// Seconds between two runs of the subscription sweep
    #[serde(default = "default_sweep_interval")]
    pub sweep_interval_secs: u64,
    #[serde(default)]
    pub policy: PolicySettings,
    #[serde(default)]
    pub plans: Vec<PlanConfig>,
}

const fn default_sweep_interval() -> u64 {
    3600
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database_url: None,
            sweep_interval_secs: default_sweep_interval(),
            policy: PolicySettings::default(),
            plans: Vec::new(),
        }
    }
}

impl AppConfig {
    fn validate(self) -> Result<Self> {
        if self.sweep_interval_secs == 0 {
            return Err(Error::Config {
                message: "sweep_interval_secs must be positive".to_string(),
            });
        }
        if self.policy.credential_length < 6 {
            return Err(Error::Config {
                message: "policy.credential_length must be at least 6".to_string(),
            });
        }
        if !(4..=31).contains(&self.policy.password_hash_cost) {
            return Err(Error::Config {
                message: "policy.password_hash_cost must be between 4 and 31".to_string(),
            });
        }
        for plan in &self.plans {
            if plan.name.trim().is_empty()
                || plan.price < 0
                || plan.duration_days <= 0
                || plan.max_members <= 0
                || plan.max_groups <= 0
            {
                return Err(Error::Config {
                    message: format!("Invalid plan entry `{}`", plan.name),
                });
            }
        }
        Ok(self)
    }
}

/// Parses and validates configuration from a TOML string.
pub fn parse_config(contents: &str) -> Result<AppConfig> {
    let config: AppConfig = toml::from_str(contents).map_err(|e| Error::Config {
        message: format!("Failed to parse config.toml: {e}"),
    })?;
    config.validate()
}

/// Loads configuration from a TOML file.
///
/// # Errors
/// Returns an error if:
/// - The file cannot be read
/// - The TOML syntax is invalid
/// - A value is out of range
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<AppConfig> {
    let path_ref = path.as_ref();
    tracing::debug!("Loading configuration from {:?}", path_ref);
    let contents = std::fs::read_to_string(path_ref).map_err(|e| Error::Config {
        message: format!("Failed to read config file {path_ref:?}: {e}"),
    })?;
    parse_config(&contents)
}

/// Loads `./config.toml`, or the defaults when the file does not exist.
pub fn load_default_config() -> Result<AppConfig> {
    let path = Path::new("config.toml");
    if path.exists() {
        load_config(path)
    } else {
        tracing::info!("No config.toml found, using defaults");
        Ok(AppConfig::default())
    }
}
