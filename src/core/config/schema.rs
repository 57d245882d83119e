//! core::config::schema
//!
//! Configuration schema types.
//!
//! # Global Config
//!
//! Located at (in order of precedence):
//! 1. `$REDSTRING_CONFIG` if set
//! 2. `$XDG_CONFIG_HOME/redstring/config.toml`
//! 3. `~/.redstring/config.toml` (canonical write location)
//!
//! # Pod Config
//!
//! Located at `<pod>/.redstring/config.toml`.
//!
//! # Validation
//!
//! Config values are validated after parsing: domains must normalize,
//! provider kinds must be known, ids must be unique, exactly one provider
//! is primary, and the quorum must fit the number of flush targets.

use std::collections::HashSet;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use super::ConfigError;
use crate::core::domain::Domain;

/// Global configuration (user scope).
///
/// # Example
///
/// ```toml
/// [identity]
/// domain = "alice.com"
/// doh_endpoint = "https://dns.google/resolve"
/// verification_ttl_secs = 600
///
/// [federation]
/// cache_ttl_secs = 300
/// backoff_base_ms = 1000
/// backoff_max_ms = 300000
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct GlobalConfig {
    /// Identity and verification settings
    pub identity: Option<IdentityConfig>,

    /// Federation discovery settings
    pub federation: Option<FederationConfig>,
}

impl GlobalConfig {
    /// Validate the configuration values.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidValue` if any value is invalid.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if let Some(identity) = &self.identity {
            if let Some(domain) = &identity.domain {
                Domain::normalize(domain).map_err(|e| {
                    ConfigError::InvalidValue(format!("invalid identity.domain: {}", e))
                })?;
            }
            if identity.http_timeout_ms == Some(0) {
                return Err(ConfigError::InvalidValue(
                    "identity.http_timeout_ms must be positive".to_string(),
                ));
            }
        }

        if let Some(federation) = &self.federation {
            if let (Some(base), Some(max)) = (federation.backoff_base_ms, federation.backoff_max_ms)
            {
                if base > max {
                    return Err(ConfigError::InvalidValue(format!(
                        "federation.backoff_base_ms ({}) exceeds backoff_max_ms ({})",
                        base, max
                    )));
                }
            }
        }

        Ok(())
    }
}

/// Identity settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct IdentityConfig {
    /// The domain that owns this pod
    pub domain: Option<String>,

    /// DNS-over-HTTPS JSON endpoint used for TXT lookups
    pub doh_endpoint: Option<String>,

    /// Timeout for identity/federation HTTP requests
    pub http_timeout_ms: Option<u64>,

    /// How long verification outcomes stay cached
    pub verification_ttl_secs: Option<u64>,
}

/// Federation discovery settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct FederationConfig {
    /// How long a discovery document stays cached
    pub cache_ttl_secs: Option<u64>,

    /// First retry delay after a failed discovery fetch
    pub backoff_base_ms: Option<u64>,

    /// Retry delay ceiling
    pub backoff_max_ms: Option<u64>,
}

/// Pod configuration.
///
/// # Example
///
/// ```toml
/// space = "personal"
///
/// [sync]
/// debounce_ms = 1000
/// quorum = 2
///
/// [[providers]]
/// id = "github"
/// kind = "github"
/// role = "primary"
/// owner = "alice"
/// repo = "semantic-pod"
/// token_env = "GITHUB_TOKEN"
///
/// [[providers]]
/// id = "home"
/// kind = "gitea"
/// role = "replica"
/// api_base = "https://git.alice.com/api/v1"
/// owner = "alice"
/// repo = "semantic-pod"
/// token_env = "GITEA_TOKEN"
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct PodConfig {
    /// Name of the semantic space (one Git repository)
    pub space: Option<String>,

    /// Synchronization engine tuning
    pub sync: Option<SyncSettings>,

    /// Configured provider connections
    pub providers: Vec<ProviderConfig>,
}

impl PodConfig {
    /// Validate the configuration values.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidValue` if any value is invalid.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if let Some(space) = &self.space {
            crate::core::slug::slugify(space)
                .ok()
                .filter(|slug| slug.as_str() == space)
                .ok_or_else(|| {
                    ConfigError::InvalidValue(format!(
                        "space '{}' must be lowercase alphanumeric, '-' or '_'",
                        space
                    ))
                })?;
        }

        let mut ids = HashSet::new();
        for provider in &self.providers {
            provider.validate()?;
            if !ids.insert(provider.id.as_str()) {
                return Err(ConfigError::InvalidValue(format!(
                    "duplicate provider id '{}'",
                    provider.id
                )));
            }
        }

        if !self.providers.is_empty() {
            let primaries = self
                .providers
                .iter()
                .filter(|p| p.role == ProviderRole::Primary)
                .count();
            if primaries != 1 {
                return Err(ConfigError::InvalidValue(format!(
                    "exactly one provider must have role 'primary', found {}",
                    primaries
                )));
            }
        }

        if let Some(sync) = &self.sync {
            let targets = self
                .providers
                .iter()
                .filter(|p| p.role != ProviderRole::Standby)
                .count();
            sync.validate(targets)?;
        }

        Ok(())
    }
}

/// Synchronization engine settings (all optional, defaults in accessors).
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct SyncSettings {
    /// Quiet period after the last edit before a flush
    pub debounce_ms: Option<u64>,

    /// Ceiling on how long edits wait for a flush
    pub max_flush_delay_ms: Option<u64>,

    /// Change-log size that forces a flush
    pub max_pending_changes: Option<usize>,

    /// Acknowledgements required for a durable flush
    pub quorum: Option<usize>,

    /// Per-attempt provider timeout
    pub provider_timeout_ms: Option<u64>,

    /// First retry delay for a failing provider
    pub retry_base_ms: Option<u64>,

    /// Retry delay ceiling
    pub retry_max_ms: Option<u64>,

    /// Attempts per flush before a provider is reported failed
    pub retry_max_attempts: Option<u32>,

    /// Directory for the persisted sync history
    pub state_dir: Option<PathBuf>,
}

impl SyncSettings {
    /// Validate against the number of flush targets.
    pub fn validate(&self, targets: usize) -> Result<(), ConfigError> {
        if let Some(quorum) = self.quorum {
            if quorum == 0 {
                return Err(ConfigError::InvalidValue(
                    "sync.quorum must be at least 1".to_string(),
                ));
            }
            if targets > 0 && quorum > targets {
                return Err(ConfigError::InvalidValue(format!(
                    "sync.quorum ({}) exceeds the number of primary and replica providers ({})",
                    quorum, targets
                )));
            }
        }
        if self.retry_max_attempts == Some(0) {
            return Err(ConfigError::InvalidValue(
                "sync.retry_max_attempts must be at least 1".to_string(),
            ));
        }
        if let (Some(debounce), Some(ceiling)) = (self.debounce_ms, self.max_flush_delay_ms) {
            if debounce > ceiling {
                return Err(ConfigError::InvalidValue(format!(
                    "sync.debounce_ms ({}) exceeds max_flush_delay_ms ({})",
                    debounce, ceiling
                )));
            }
        }
        Ok(())
    }
}

/// Role a provider connection plays for the engine.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ProviderRole {
    /// Authoritative remote; source for bootstrap and migration
    Primary,
    /// Additional flush target for redundancy
    #[default]
    Replica,
    /// Retained but not written to
    Standby,
}

/// One configured provider connection.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct ProviderConfig {
    /// Unique connection id
    pub id: String,

    /// Backend kind ("github", "gitea", "local-git")
    pub kind: String,

    /// Role in the engine
    pub role: ProviderRole,

    /// Repository owner (user or organization)
    pub owner: Option<String>,

    /// Repository name; defaults to the space name
    pub repo: Option<String>,

    /// API base URL (GitHub Enterprise, Gitea instance)
    pub api_base: Option<String>,

    /// Root directory for local repositories
    pub root: Option<PathBuf>,

    /// Environment variable holding the access token
    pub token_env: Option<String>,

    /// Branch to write to (default "main")
    pub branch: Option<String>,
}

impl ProviderConfig {
    /// Validate one provider entry.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.id.is_empty() {
            return Err(ConfigError::InvalidValue(
                "provider id cannot be empty".to_string(),
            ));
        }

        let valid = crate::provider::valid_provider_names();
        if !valid.contains(&self.kind.as_str()) {
            return Err(ConfigError::InvalidValue(format!(
                "provider '{}': invalid kind '{}', must be one of: {}",
                self.id,
                self.kind,
                valid.join(", ")
            )));
        }

        match self.kind.as_str() {
            "local-git" if self.root.is_none() => Err(ConfigError::InvalidValue(format!(
                "provider '{}': local-git requires 'root'",
                self.id
            ))),
            "gitea" if self.api_base.is_none() => Err(ConfigError::InvalidValue(format!(
                "provider '{}': gitea requires 'api_base'",
                self.id
            ))),
            _ => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn provider(id: &str, kind: &str, role: ProviderRole) -> ProviderConfig {
        ProviderConfig {
            id: id.to_string(),
            kind: kind.to_string(),
            role,
            root: Some(PathBuf::from("/tmp/pods")),
            api_base: Some("https://git.example.com/api/v1".to_string()),
            ..Default::default()
        }
    }

    #[test]
    fn global_parses_from_toml() {
        let config: GlobalConfig = toml::from_str(
            r#"
            [identity]
            domain = "WWW.Alice.com"
            verification_ttl_secs = 60

            [federation]
            cache_ttl_secs = 120
            "#,
        )
        .unwrap();
        assert!(config.validate().is_ok());
        assert_eq!(
            config.identity.unwrap().domain.as_deref(),
            Some("WWW.Alice.com")
        );
    }

    #[test]
    fn global_invalid_domain_rejected() {
        let config = GlobalConfig {
            identity: Some(IdentityConfig {
                domain: Some("not a domain".to_string()),
                ..Default::default()
            }),
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn global_backoff_order_checked() {
        let config = GlobalConfig {
            federation: Some(FederationConfig {
                backoff_base_ms: Some(10_000),
                backoff_max_ms: Some(100),
                ..Default::default()
            }),
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn pod_parses_providers() {
        let config: PodConfig = toml::from_str(
            r#"
            space = "personal"

            [sync]
            quorum = 2

            [[providers]]
            id = "gh"
            kind = "github"
            role = "primary"
            owner = "alice"

            [[providers]]
            id = "local"
            kind = "local-git"
            root = "/var/pods"
            "#,
        )
        .unwrap();
        assert!(config.validate().is_ok());
        assert_eq!(config.providers.len(), 2);
        assert_eq!(config.providers[1].role, ProviderRole::Replica);
    }

    #[test]
    fn pod_requires_single_primary() {
        let config = PodConfig {
            providers: vec![
                provider("a", "github", ProviderRole::Replica),
                provider("b", "gitea", ProviderRole::Replica),
            ],
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let config = PodConfig {
            providers: vec![
                provider("a", "github", ProviderRole::Primary),
                provider("b", "gitea", ProviderRole::Primary),
            ],
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn pod_rejects_duplicate_ids() {
        let config = PodConfig {
            providers: vec![
                provider("a", "github", ProviderRole::Primary),
                provider("a", "gitea", ProviderRole::Replica),
            ],
            ..Default::default()
        };
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("duplicate"));
    }

    #[test]
    fn pod_rejects_unknown_kind() {
        let config = PodConfig {
            providers: vec![provider("a", "bitbucket", ProviderRole::Primary)],
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn quorum_bounded_by_targets() {
        let config = PodConfig {
            sync: Some(SyncSettings {
                quorum: Some(3),
                ..Default::default()
            }),
            providers: vec![
                provider("a", "github", ProviderRole::Primary),
                provider("b", "gitea", ProviderRole::Replica),
                provider("c", "local-git", ProviderRole::Standby),
            ],
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn zero_quorum_rejected() {
        let sync = SyncSettings {
            quorum: Some(0),
            ..Default::default()
        };
        assert!(sync.validate(3).is_err());
    }

    #[test]
    fn space_must_be_slug() {
        let config = PodConfig {
            space: Some("My Space".to_string()),
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn local_git_requires_root() {
        let mut p = provider("a", "local-git", ProviderRole::Primary);
        p.root = None;
        assert!(p.validate().is_err());
    }

    #[test]
    fn unknown_fields_rejected() {
        let result: Result<PodConfig, _> = toml::from_str("space = \"x\"\nbogus = 1\n");
        assert!(result.is_err());
    }
}
