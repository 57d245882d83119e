//! core::config
//!
//! Configuration schema and loading.
//!
//! # Overview
//!
//! Redstring has two configuration scopes:
//! - **Global**: User-level settings (identity, federation)
//! - **Pod**: Per-pod settings (space, sync tuning, providers)
//!
//! # Precedence
//!
//! Configuration values are resolved in this order (later overrides earlier):
//! 1. Default values
//! 2. Global config file
//! 3. Pod config file
//! 4. CLI flags (not handled here)
//!
//! # Global Config Locations
//!
//! Searched in order:
//! 1. `$REDSTRING_CONFIG` if set
//! 2. `$XDG_CONFIG_HOME/redstring/config.toml`
//! 3. `~/.redstring/config.toml` (canonical write location)
//!
//! # Pod Config Location
//!
//! `<pod>/.redstring/config.toml`
//!
//! # Example
//!
//! ```no_run
//! use redstring_pod::core::config::Config;
//! use std::path::Path;
//!
//! let result = Config::load(Some(Path::new("/path/to/pod"))).unwrap();
//! let config = result.config;
//!
//! println!("Space: {}", config.space());
//! println!("Quorum: {}", config.quorum());
//! for provider in config.providers() {
//!     println!("{} ({})", provider.id, provider.kind);
//! }
//! ```

pub mod schema;

pub use schema::{
    FederationConfig, GlobalConfig, IdentityConfig, PodConfig, ProviderConfig, ProviderRole,
    SyncSettings,
};

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;

use thiserror::Error;

use crate::core::domain::Domain;

/// Default DNS-over-HTTPS JSON endpoint.
pub const DEFAULT_DOH_ENDPOINT: &str = "https://dns.google/resolve";

/// Default semantic space name.
pub const DEFAULT_SPACE: &str = "default";

/// Errors from configuration operations.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file '{path}': {source}")]
    ReadError {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse config file '{path}': {message}")]
    ParseError { path: PathBuf, message: String },

    #[error("failed to write config file '{path}': {source}")]
    WriteError {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("invalid config value: {0}")]
    InvalidValue(String),
}

/// Warnings generated during config loading.
#[derive(Debug, Clone)]
pub struct ConfigWarning {
    /// The warning message.
    pub message: String,
    /// The path that triggered the warning.
    pub path: PathBuf,
}

/// Result of loading configuration.
#[derive(Debug)]
pub struct ConfigLoadResult {
    /// The loaded configuration.
    pub config: Config,
    /// Any warnings generated during loading.
    pub warnings: Vec<ConfigWarning>,
}

/// Merged configuration from all sources.
///
/// Accessors apply defaults, so callers never see an unset value.
#[derive(Debug, Clone, Default)]
pub struct Config {
    /// Global configuration
    pub global: GlobalConfig,
    /// Pod configuration (if a pod path was given)
    pub pod: Option<PodConfig>,
    global_path: Option<PathBuf>,
    pod_path: Option<PathBuf>,
    pod_root: Option<PathBuf>,
}

impl Config {
    /// Load configuration from default locations.
    ///
    /// If `pod_root` is provided, also loads the pod config.
    ///
    /// # Errors
    ///
    /// Returns an error if config files exist but cannot be parsed or
    /// fail validation. Missing files are not an error.
    pub fn load(pod_root: Option<&Path>) -> Result<ConfigLoadResult, ConfigError> {
        let global_path = Self::find_global();
        Self::load_from(global_path.as_deref(), pod_root)
    }

    /// Load configuration from an explicit global file and pod root.
    pub fn load_from(
        global_path: Option<&Path>,
        pod_root: Option<&Path>,
    ) -> Result<ConfigLoadResult, ConfigError> {
        let mut warnings = Vec::new();

        let (global, global_path) = match global_path {
            Some(path) if path.exists() => {
                (Self::read_config::<GlobalConfig>(path)?, Some(path.to_path_buf()))
            }
            Some(path) => {
                warnings.push(ConfigWarning {
                    message: "global config file not found, using defaults".to_string(),
                    path: path.to_path_buf(),
                });
                (GlobalConfig::default(), None)
            }
            None => (GlobalConfig::default(), None),
        };

        let (pod, pod_path) = match pod_root {
            Some(root) => {
                let path = Self::pod_config_path(root);
                if path.exists() {
                    (Some(Self::read_config::<PodConfig>(&path)?), Some(path))
                } else {
                    (None, None)
                }
            }
            None => (None, None),
        };

        global.validate()?;
        if let Some(ref p) = pod {
            p.validate()?;
            if p.providers.is_empty() {
                warnings.push(ConfigWarning {
                    message: "no providers configured; edits stay local".to_string(),
                    path: pod_path.clone().unwrap_or_default(),
                });
            }
        }

        Ok(ConfigLoadResult {
            config: Config {
                global,
                pod,
                global_path,
                pod_path,
                pod_root: pod_root.map(Path::to_path_buf),
            },
            warnings,
        })
    }

    /// Find the global config file in standard locations.
    fn find_global() -> Option<PathBuf> {
        // 1. $REDSTRING_CONFIG
        if let Ok(path) = std::env::var("REDSTRING_CONFIG") {
            return Some(PathBuf::from(path));
        }

        // 2. $XDG_CONFIG_HOME/redstring/config.toml
        if let Ok(xdg_home) = std::env::var("XDG_CONFIG_HOME") {
            let path = PathBuf::from(xdg_home).join("redstring/config.toml");
            if path.exists() {
                return Some(path);
            }
        }

        // 3. ~/.redstring/config.toml
        dirs::home_dir()
            .map(|home| home.join(".redstring/config.toml"))
            .filter(|path| path.exists())
    }

    fn read_config<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T, ConfigError> {
        let contents = fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            source: e,
        })?;

        toml::from_str(&contents).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            message: e.to_string(),
        })
    }

    /// Get the path for a pod's config file.
    pub fn pod_config_path(pod_root: &Path) -> PathBuf {
        pod_root.join(".redstring/config.toml")
    }

    /// Write pod config atomically.
    pub fn write_pod(pod_root: &Path, config: &PodConfig) -> Result<PathBuf, ConfigError> {
        let path = Self::pod_config_path(pod_root);
        Self::write_config_atomic(&path, config)?;
        Ok(path)
    }

    /// Write a config file via temp file and rename.
    fn write_config_atomic<T: serde::Serialize>(
        path: &Path,
        config: &T,
    ) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| ConfigError::WriteError {
                path: path.to_path_buf(),
                source: e,
            })?;
        }

        let contents =
            toml::to_string_pretty(config).map_err(|e| ConfigError::InvalidValue(e.to_string()))?;

        let temp_path = path.with_extension("toml.tmp");
        let mut file = fs::File::create(&temp_path).map_err(|e| ConfigError::WriteError {
            path: temp_path.clone(),
            source: e,
        })?;

        file.write_all(contents.as_bytes())
            .map_err(|e| ConfigError::WriteError {
                path: temp_path.clone(),
                source: e,
            })?;

        file.sync_all().map_err(|e| ConfigError::WriteError {
            path: temp_path.clone(),
            source: e,
        })?;

        fs::rename(&temp_path, path).map_err(|e| ConfigError::WriteError {
            path: path.to_path_buf(),
            source: e,
        })?;

        Ok(())
    }

    // =========================================================================
    // Accessor methods with defaults
    // =========================================================================

    fn identity(&self) -> Option<&IdentityConfig> {
        self.global.identity.as_ref()
    }

    fn federation(&self) -> Option<&FederationConfig> {
        self.global.federation.as_ref()
    }

    fn sync(&self) -> Option<&SyncSettings> {
        self.pod.as_ref().and_then(|p| p.sync.as_ref())
    }

    /// The configured owner domain, normalized.
    ///
    /// Returns `None` if not configured. Validation already rejected
    /// unparseable values.
    pub fn domain(&self) -> Option<Domain> {
        self.identity()
            .and_then(|i| i.domain.as_deref())
            .and_then(|d| Domain::normalize(d).ok())
    }

    /// DNS-over-HTTPS endpoint.
    ///
    /// Defaults to [`DEFAULT_DOH_ENDPOINT`].
    pub fn doh_endpoint(&self) -> &str {
        self.identity()
            .and_then(|i| i.doh_endpoint.as_deref())
            .unwrap_or(DEFAULT_DOH_ENDPOINT)
    }

    /// HTTP timeout for identity and federation requests.
    ///
    /// Defaults to 10 seconds.
    pub fn http_timeout(&self) -> Duration {
        Duration::from_millis(
            self.identity()
                .and_then(|i| i.http_timeout_ms)
                .unwrap_or(10_000),
        )
    }

    /// How long verification outcomes are cached.
    ///
    /// Defaults to 10 minutes.
    pub fn verification_ttl(&self) -> Duration {
        Duration::from_secs(
            self.identity()
                .and_then(|i| i.verification_ttl_secs)
                .unwrap_or(600),
        )
    }

    /// How long discovery documents are cached.
    ///
    /// Defaults to 5 minutes.
    pub fn federation_cache_ttl(&self) -> Duration {
        Duration::from_secs(
            self.federation()
                .and_then(|f| f.cache_ttl_secs)
                .unwrap_or(300),
        )
    }

    /// Base delay before re-fetching an unreachable peer.
    ///
    /// Defaults to 1 second.
    pub fn federation_backoff_base(&self) -> Duration {
        Duration::from_millis(
            self.federation()
                .and_then(|f| f.backoff_base_ms)
                .unwrap_or(1_000),
        )
    }

    /// Ceiling on the unreachable-peer backoff.
    ///
    /// Defaults to 5 minutes.
    pub fn federation_backoff_max(&self) -> Duration {
        Duration::from_millis(
            self.federation()
                .and_then(|f| f.backoff_max_ms)
                .unwrap_or(300_000),
        )
    }

    /// The semantic space name.
    ///
    /// Defaults to [`DEFAULT_SPACE`].
    pub fn space(&self) -> &str {
        self.pod
            .as_ref()
            .and_then(|p| p.space.as_deref())
            .unwrap_or(DEFAULT_SPACE)
    }

    /// Debounce interval. Defaults to 1 second.
    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.sync().and_then(|s| s.debounce_ms).unwrap_or(1_000))
    }

    /// Maximum time edits wait for a flush. Defaults to 5 seconds.
    pub fn max_flush_delay(&self) -> Duration {
        Duration::from_millis(
            self.sync()
                .and_then(|s| s.max_flush_delay_ms)
                .unwrap_or(5_000),
        )
    }

    /// Change-log size that forces a flush. Defaults to 256.
    pub fn max_pending_changes(&self) -> usize {
        self.sync()
            .and_then(|s| s.max_pending_changes)
            .unwrap_or(256)
    }

    /// Acknowledgements required for a durable flush. Defaults to 1.
    pub fn quorum(&self) -> usize {
        self.sync().and_then(|s| s.quorum).unwrap_or(1)
    }

    /// Per-attempt provider timeout. Defaults to 15 seconds.
    pub fn provider_timeout(&self) -> Duration {
        Duration::from_millis(
            self.sync()
                .and_then(|s| s.provider_timeout_ms)
                .unwrap_or(15_000),
        )
    }

    /// First retry delay for a failing provider. Defaults to 500ms.
    pub fn retry_base(&self) -> Duration {
        Duration::from_millis(self.sync().and_then(|s| s.retry_base_ms).unwrap_or(500))
    }

    /// Retry delay ceiling. Defaults to 60 seconds.
    pub fn retry_max(&self) -> Duration {
        Duration::from_millis(self.sync().and_then(|s| s.retry_max_ms).unwrap_or(60_000))
    }

    /// Attempts per flush before a provider is reported failed. Defaults to 6.
    pub fn retry_max_attempts(&self) -> u32 {
        self.sync()
            .and_then(|s| s.retry_max_attempts)
            .unwrap_or(6)
    }

    /// Directory for the persisted sync history.
    ///
    /// Defaults to `<pod>/.redstring/state` when a pod is loaded.
    pub fn state_dir(&self) -> Option<PathBuf> {
        self.sync()
            .and_then(|s| s.state_dir.clone())
            .or_else(|| self.pod_root.as_ref().map(|r| r.join(".redstring/state")))
    }

    /// Configured providers, in file order.
    pub fn providers(&self) -> &[ProviderConfig] {
        self.pod
            .as_ref()
            .map(|p| p.providers.as_slice())
            .unwrap_or(&[])
    }

    /// The provider with role `primary`, if any.
    pub fn primary_provider(&self) -> Option<&ProviderConfig> {
        self.providers()
            .iter()
            .find(|p| p.role == ProviderRole::Primary)
    }

    /// Get the path to the loaded global config file.
    pub fn global_config_loaded_from(&self) -> Option<&Path> {
        self.global_path.as_deref()
    }

    /// Get the path to the loaded pod config file.
    pub fn pod_config_loaded_from(&self) -> Option<&Path> {
        self.pod_path.as_deref()
    }
}
