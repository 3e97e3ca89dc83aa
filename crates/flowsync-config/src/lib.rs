//! Configuration for the flowsync reconciliation engine.
//!
//! Settings are layered with figment: built-in defaults, then
//! `~/.config/flowsync/config.toml` (or an explicit path), then
//! `FLOWSYNC_`-prefixed environment variables. Nested keys use a double
//! underscore, e.g. `FLOWSYNC_RECONCILE__WORKER_POOL_SIZE=8`.

pub mod logging;

use std::path::{Path, PathBuf};
use std::str::FromStr;

use figment::Figment;
use figment::providers::{Env, Format, Serialized, Toml};
use serde::{Deserialize, Serialize};

use flowsync_core::{BarrierPolicy, EngineConfig, UpgradeState};

pub use logging::{LogFormat, init_tracing};

// ── Error type ──────────────────────────────────────────────────────

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid value for {field}: {reason}")]
    Validation { field: String, reason: String },

    #[error("Failed to serialize config: {0}")]
    Serialization(#[from] toml::ser::Error),

    #[error("Failed to load config: {0}")]
    Figment(Box<figment::Error>),

    #[error("Failed to install tracing subscriber: {0}")]
    Tracing(#[from] tracing_subscriber::util::TryInitError),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl From<figment::Error> for ConfigError {
    fn from(err: figment::Error) -> Self {
        Self::Figment(Box::new(err))
    }
}

impl ConfigError {
    fn invalid(field: &str, reason: impl Into<String>) -> Self {
        Self::Validation {
            field: field.to_owned(),
            reason: reason.into(),
        }
    }
}

// ── Config types ────────────────────────────────────────────────────

/// Top-level config file structure.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub reconcile: ReconcileSettings,
    #[serde(default)]
    pub batch: BatchSettings,
    #[serde(default)]
    pub upgrade: UpgradeSettings,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Device reconciliation knobs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconcileSettings {
    /// Reconciliations allowed to run at once.
    #[serde(default = "default_worker_pool_size")]
    pub worker_pool_size: usize,
    /// Send updates for objects present on the device but different.
    #[serde(default = "default_true")]
    pub gather_updates: bool,
    /// Delete device objects the desired state does not mention.
    #[serde(default = "default_true")]
    pub remove_redundant: bool,
}

impl Default for ReconcileSettings {
    fn default() -> Self {
        Self {
            worker_pool_size: default_worker_pool_size(),
            gather_updates: true,
            remove_redundant: true,
        }
    }
}

/// Flat batch execution settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchSettings {
    /// `"after-every-step"`, `"at-end"` or `"where-needed"`.
    #[serde(default = "default_barrier_policy")]
    pub barrier_policy: String,
    #[serde(default = "default_true")]
    pub exit_on_first_error: bool,
}

impl Default for BatchSettings {
    fn default() -> Self {
        Self {
            barrier_policy: default_barrier_policy(),
            exit_on_first_error: true,
        }
    }
}

/// Upgrade switch as seen at startup.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpgradeSettings {
    /// Start with an upgrade in progress, so connecting devices stage
    /// bundles until the upgrade is marked ended.
    #[serde(default)]
    pub in_progress: bool,
}

/// Tracing output settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Filter directive used when `RUST_LOG` is unset.
    #[serde(default = "default_log_level")]
    pub level: String,
    /// `"text"` or `"json"`.
    #[serde(default = "default_log_format")]
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

fn default_worker_pool_size() -> usize {
    EngineConfig::default().worker_pool_size
}

fn default_true() -> bool {
    true
}

fn default_barrier_policy() -> String {
    BarrierPolicy::default().to_string()
}

fn default_log_level() -> String {
    "info".into()
}

fn default_log_format() -> String {
    LogFormat::default().to_string()
}

// ── Validation and conversion ───────────────────────────────────────

impl Config {
    /// Reject values the engine cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.reconcile.worker_pool_size == 0 {
            return Err(ConfigError::invalid(
                "reconcile.worker_pool_size",
                "must be at least 1",
            ));
        }
        self.barrier_policy()?;
        self.logging.log_format()?;
        if self.logging.level.trim().is_empty() {
            return Err(ConfigError::invalid("logging.level", "must not be empty"));
        }
        Ok(())
    }

    pub fn barrier_policy(&self) -> Result<BarrierPolicy, ConfigError> {
        BarrierPolicy::from_str(&self.batch.barrier_policy).map_err(|_| {
            ConfigError::invalid(
                "batch.barrier_policy",
                format!(
                    "unknown policy '{}' (expected after-every-step, at-end or where-needed)",
                    self.batch.barrier_policy
                ),
            )
        })
    }

    /// Engine settings derived from this config. Validates first.
    pub fn to_engine_config(&self) -> Result<EngineConfig, ConfigError> {
        self.validate()?;
        Ok(EngineConfig {
            worker_pool_size: self.reconcile.worker_pool_size,
            gather_updates: self.reconcile.gather_updates,
            remove_redundant: self.reconcile.remove_redundant,
            batch_barrier_policy: self.barrier_policy()?,
            exit_on_first_error: self.batch.exit_on_first_error,
        })
    }

    /// Upgrade state the engine should start in.
    pub fn initial_upgrade_state(&self) -> UpgradeState {
        if self.upgrade.in_progress {
            UpgradeState::InProgress
        } else {
            UpgradeState::Idle
        }
    }
}

// ── Loading ─────────────────────────────────────────────────────────

/// Canonical config file path.
pub fn config_path() -> PathBuf {
    directories::ProjectDirs::from("org", "flowsync", "flowsync").map_or_else(
        || dirs_fallback().join("config.toml"),
        |dirs| dirs.config_dir().join("config.toml"),
    )
}

fn dirs_fallback() -> PathBuf {
    std::env::var("HOME").map_or_else(
        |_| PathBuf::from(".").join(".config").join("flowsync"),
        |home| PathBuf::from(home).join(".config").join("flowsync"),
    )
}

/// Load and validate config from the canonical path plus environment.
pub fn load_config() -> Result<Config, ConfigError> {
    load_config_from(&config_path())
}

/// Load and validate config from `path` plus environment. A missing file
/// yields the defaults.
pub fn load_config_from(path: &Path) -> Result<Config, ConfigError> {
    let config: Config = Figment::new()
        .merge(Serialized::defaults(Config::default()))
        .merge(Toml::file(path))
        .merge(Env::prefixed("FLOWSYNC_").split("__"))
        .extract()?;
    config.validate()?;
    tracing::debug!(path = %path.display(), "configuration loaded");
    Ok(config)
}

/// Load config, falling back to defaults when it cannot be read.
pub fn load_config_or_default() -> Config {
    load_config().unwrap_or_else(|err| {
        tracing::warn!(error = %err, "using default configuration");
        Config::default()
    })
}

/// Write config to the canonical path.
pub fn save_config(config: &Config) -> Result<(), ConfigError> {
    save_config_to(&config_path(), config)
}

/// Write config to `path`, creating parent directories.
pub fn save_config_to(path: &Path, config: &Config) -> Result<(), ConfigError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let rendered = toml::to_string_pretty(config)?;
    std::fs::write(path, rendered)?;
    Ok(())
}
