//! provider::factory
//!
//! Provider selection and creation.
//!
//! # Design
//!
//! Commands and the engine build providers through `create_provider()`
//! instead of importing concrete backends, so core logic never depends on
//! a specific host.
//!
//! # Example
//!
//! ```ignore
//! use redstring_pod::provider::{create_provider, credentials_for};
//!
//! let provider = create_provider(&config, Duration::from_secs(15))?;
//! provider.authenticate(&credentials_for(&config)).await?;
//! ```

use std::sync::Arc;
use std::time::Duration;

use super::gitea::GiteaProvider;
use super::github::GitHubProvider;
use super::local_git::LocalGitProvider;
use super::traits::{Credentials, ProviderError, SemanticProvider};
use crate::core::config::ProviderConfig;

/// Supported provider backends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderKind {
    /// github.com or GitHub Enterprise
    GitHub,
    /// Self-hosted Gitea or Forgejo
    Gitea,
    /// Bare repositories on the local filesystem
    LocalGit,
}

impl ProviderKind {
    /// All supported backends.
    ///
    /// # Example
    ///
    /// ```
    /// use redstring_pod::provider::ProviderKind;
    ///
    /// assert!(ProviderKind::all().contains(&ProviderKind::GitHub));
    /// ```
    pub fn all() -> &'static [ProviderKind] {
        &[
            ProviderKind::GitHub,
            ProviderKind::Gitea,
            ProviderKind::LocalGit,
        ]
    }

    /// Name as used in configuration files.
    pub fn name(&self) -> &'static str {
        match self {
            ProviderKind::GitHub => "github",
            ProviderKind::Gitea => "gitea",
            ProviderKind::LocalGit => "local-git",
        }
    }

    /// Parse a backend name, case-insensitively.
    ///
    /// # Example
    ///
    /// ```
    /// use redstring_pod::provider::ProviderKind;
    ///
    /// assert_eq!(ProviderKind::parse("GitHub"), Some(ProviderKind::GitHub));
    /// assert_eq!(ProviderKind::parse("svn"), None);
    /// ```
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "github" => Some(ProviderKind::GitHub),
            "gitea" | "forgejo" => Some(ProviderKind::Gitea),
            "local-git" | "local" => Some(ProviderKind::LocalGit),
            _ => None,
        }
    }
}

impl std::fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Valid backend names for configuration validation.
pub fn valid_provider_names() -> Vec<&'static str> {
    ProviderKind::all().iter().map(|k| k.name()).collect()
}

/// Build the provider described by a configuration entry.
///
/// # Errors
///
/// - `ProviderError::NotImplemented` for an unknown kind
/// - `ProviderError::Write` if a required setting is missing
pub fn create_provider(
    config: &ProviderConfig,
    timeout: Duration,
) -> Result<Arc<dyn SemanticProvider>, ProviderError> {
    let kind = ProviderKind::parse(&config.kind).ok_or_else(|| {
        ProviderError::NotImplemented(format!(
            "provider kind '{}' (supported: {})",
            config.kind,
            valid_provider_names().join(", ")
        ))
    })?;
    let owner = config.owner.clone().unwrap_or_default();

    let provider: Arc<dyn SemanticProvider> = match kind {
        ProviderKind::GitHub => {
            let mut github = GitHubProvider::new(owner).with_timeout(timeout);
            if let Some(api_base) = &config.api_base {
                github = github.with_api_base(api_base);
            }
            if let Some(repo) = &config.repo {
                github = github.with_repo(repo);
            }
            if let Some(branch) = &config.branch {
                github = github.with_branch(branch);
            }
            Arc::new(github)
        }
        ProviderKind::Gitea => {
            let api_base = config.api_base.as_ref().ok_or_else(|| {
                ProviderError::Write(format!("provider '{}' requires api_base", config.id))
            })?;
            let mut gitea = GiteaProvider::new(api_base, owner).with_timeout(timeout);
            if let Some(repo) = &config.repo {
                gitea = gitea.with_repo(repo);
            }
            if let Some(branch) = &config.branch {
                gitea = gitea.with_branch(branch);
            }
            Arc::new(gitea)
        }
        ProviderKind::LocalGit => {
            let root = config.root.as_ref().ok_or_else(|| {
                ProviderError::Write(format!("provider '{}' requires root", config.id))
            })?;
            let mut local = LocalGitProvider::new(root);
            if let Some(branch) = &config.branch {
                local = local.with_branch(branch);
            }
            Arc::new(local)
        }
    };
    Ok(provider)
}

/// Credentials for a configuration entry, read from its token variable.
///
/// Hosted backends get OAuth-style bearer credentials, self-hosted ones an
/// API token. A missing variable yields `Credentials::None`, which hosted
/// backends reject with `AuthRequired`.
pub fn credentials_for(config: &ProviderConfig) -> Credentials {
    let token = config
        .token_env
        .as_deref()
        .and_then(|var| std::env::var(var).ok())
        .filter(|t| !t.is_empty());

    match (ProviderKind::parse(&config.kind), token) {
        (Some(ProviderKind::GitHub), Some(access_token)) => Credentials::OAuth { access_token },
        (Some(ProviderKind::Gitea), Some(token)) => Credentials::Token { token },
        _ => Credentials::None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn config(kind: &str) -> ProviderConfig {
        ProviderConfig {
            id: "p".into(),
            kind: kind.into(),
            ..Default::default()
        }
    }

    #[test]
    fn names_round_trip() {
        for kind in ProviderKind::all() {
            assert_eq!(ProviderKind::parse(kind.name()), Some(*kind));
        }
        assert_eq!(
            valid_provider_names(),
            vec!["github", "gitea", "local-git"]
        );
    }

    #[test]
    fn creates_each_kind() {
        let github = create_provider(&config("github"), Duration::from_secs(1)).unwrap();
        assert_eq!(github.name(), "github");

        let mut gitea = config("gitea");
        gitea.api_base = Some("https://git.example.com".into());
        assert_eq!(
            create_provider(&gitea, Duration::from_secs(1)).unwrap().name(),
            "gitea"
        );

        let mut local = config("local-git");
        local.root = Some(PathBuf::from("/tmp/redstring"));
        assert_eq!(
            create_provider(&local, Duration::from_secs(1)).unwrap().name(),
            "local-git"
        );
    }

    #[test]
    fn rejects_unknown_kind() {
        let err = create_provider(&config("svn"), Duration::from_secs(1))
            .err()
            .unwrap();
        assert!(matches!(err, ProviderError::NotImplemented(_)));
    }

    #[test]
    fn gitea_requires_api_base() {
        assert!(create_provider(&config("gitea"), Duration::from_secs(1)).is_err());
    }

    #[test]
    fn missing_token_env_gives_no_credentials() {
        let mut github = config("github");
        github.token_env = Some("REDSTRING_TEST_TOKEN_THAT_IS_NEVER_SET".into());
        assert_eq!(credentials_for(&github), Credentials::None);
    }
}
