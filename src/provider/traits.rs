//! provider::traits
//!
//! The capability contract every storage backend implements.
//!
//! # Design
//!
//! The `SemanticProvider` trait is async because every backend does I/O.
//! The synchronization engine depends on this contract only; a backend that
//! satisfies it is pluggable without engine changes.
//!
//! Writes are staged: `write_semantic_file` records a file for the next
//! `commit_changes`, which publishes every staged file in one commit. The
//! staged set is consumed by the commit whether it succeeds or not. A
//! caller abandoned between the two (a timeout, a failed write) leaves
//! staged entries behind; `discard_staged` drops them before the next
//! attempt stages its own.
//!
//! # Example
//!
//! ```ignore
//! use redstring_pod::provider::{Credentials, SemanticProvider};
//!
//! async fn publish(provider: &dyn SemanticProvider) -> Result<(), ProviderError> {
//!     provider.authenticate(&Credentials::Token { token: "t".into() }).await?;
//!     let space = provider.create_semantic_space("personal").await?;
//!     provider.write_semantic_file(&space, "profile/webid.ttl", "…").await?;
//!     let commit = provider.commit_changes(&space, "Update profile").await?;
//!     println!("committed {}", commit);
//!     Ok(())
//! }
//! ```

use std::collections::BTreeMap;
use std::fmt;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::graph::Graph;
use crate::layout;

/// Errors from provider operations.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ProviderError {
    /// No credentials were supplied.
    #[error("authentication required")]
    AuthRequired,

    /// Credentials were rejected.
    #[error("authentication failed: {0}")]
    AuthFailed(String),

    /// The space or file does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// A write or commit was rejected for a non-transient reason.
    #[error("write failed: {0}")]
    Write(String),

    /// The remote moved underneath a commit (non-fast-forward).
    #[error("conflict: {0}")]
    Conflict(String),

    /// Rate limit exceeded.
    #[error("rate limited")]
    RateLimited,

    /// Network failure, timeout or server outage.
    #[error("provider unavailable: {0}")]
    Unavailable(String),

    /// Any other API error.
    #[error("API error: {status} - {message}")]
    Api {
        /// HTTP status code
        status: u16,
        /// Error message from the API
        message: String,
    },

    /// Full-graph export or import failed.
    #[error("import/export failed: {0}")]
    ImportExport(String),

    /// The backend does not support the operation.
    #[error("not implemented: {0}")]
    NotImplemented(String),
}

impl ProviderError {
    /// Whether retrying later may succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            ProviderError::Unavailable(_) | ProviderError::RateLimited => true,
            ProviderError::Api { status, .. } => *status >= 500,
            _ => false,
        }
    }

    /// Whether the credentials were missing or rejected.
    pub fn is_credential_failure(&self) -> bool {
        matches!(self, ProviderError::AuthRequired | ProviderError::AuthFailed(_))
    }
}

/// Credentials handed to [`SemanticProvider::authenticate`].
///
/// Acquiring them (OAuth flows, token prompts) happens elsewhere.
#[derive(Clone, PartialEq, Eq)]
pub enum Credentials {
    /// OAuth access token (hosted providers)
    OAuth { access_token: String },
    /// API token (self-hosted providers)
    Token { token: String },
    /// No credentials (local providers)
    None,
}

impl Credentials {
    /// The secret, if any.
    pub fn secret(&self) -> Option<&str> {
        match self {
            Credentials::OAuth { access_token } => Some(access_token),
            Credentials::Token { token } => Some(token),
            Credentials::None => None,
        }
    }

    /// Mechanism name, for status output.
    pub fn mechanism(&self) -> &'static str {
        match self {
            Credentials::OAuth { .. } => "oauth",
            Credentials::Token { .. } => "token",
            Credentials::None => "none",
        }
    }
}

// Custom Debug so secrets never reach logs
impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Credentials::OAuth { .. } => f.write_str("Credentials::OAuth([REDACTED])"),
            Credentials::Token { .. } => f.write_str("Credentials::Token([REDACTED])"),
            Credentials::None => f.write_str("Credentials::None"),
        }
    }
}

/// An authenticated session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    /// Provider name
    pub provider: String,
    /// Account name, when the backend has one
    pub user: Option<String>,
    pub authenticated_at: DateTime<Utc>,
}

/// A remote repository holding one semantic space.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SpaceRef {
    pub owner: String,
    pub name: String,
    pub branch: String,
}

impl fmt::Display for SpaceRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.owner.is_empty() {
            write!(f, "{}@{}", self.name, self.branch)
        } else {
            write!(f, "{}/{}@{}", self.owner, self.name, self.branch)
        }
    }
}

/// An opaque commit (or staged content) identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CommitRef(pub String);

impl CommitRef {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// First seven characters, for display.
    pub fn short(&self) -> &str {
        let end = self
            .0
            .char_indices()
            .nth(7)
            .map(|(i, _)| i)
            .unwrap_or(self.0.len());
        &self.0[..end]
    }
}

impl fmt::Display for CommitRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// API rate limit snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimit {
    pub limit: u64,
    pub remaining: u64,
    pub reset_at: Option<DateTime<Utc>>,
}

/// Storage quota snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Quota {
    pub used_bytes: u64,
    pub limit_bytes: Option<u64>,
}

/// Provider health as reported by [`SemanticProvider::get_status`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderStatus {
    pub rate_limit: Option<RateLimit>,
    pub quota: Option<Quota>,
    pub last_sync: Option<DateTime<Utc>>,
}

/// Uniform capability contract over Git-hosting backends.
///
/// # Thread Safety
///
/// Implementations must be `Send + Sync`; the engine calls one provider
/// from several tasks.
///
/// # Error Handling
///
/// - `AuthRequired` / `AuthFailed`: surface to the user; the engine drops
///   the connection
/// - `NotFound`: the space or file does not exist
/// - `Conflict`: re-fetch the head and retry
/// - `Unavailable` / `RateLimited` / 5xx: retry with backoff
#[async_trait]
pub trait SemanticProvider: Send + Sync {
    /// Provider name (e.g., "github", "gitea").
    fn name(&self) -> &'static str;

    /// Authenticate with the given credentials.
    async fn authenticate(&self, credentials: &Credentials) -> Result<Session, ProviderError>;

    /// Create the repository for a space, or adopt it if it exists.
    async fn create_semantic_space(&self, name: &str) -> Result<SpaceRef, ProviderError>;

    /// Stage a file for the next commit.
    ///
    /// Returns the content identifier of the staged file.
    async fn write_semantic_file(
        &self,
        space: &SpaceRef,
        path: &str,
        content: &str,
    ) -> Result<CommitRef, ProviderError>;

    /// Read a file at the branch head.
    ///
    /// # Errors
    ///
    /// - `NotFound` if the file does not exist
    async fn read_semantic_file(&self, space: &SpaceRef, path: &str)
        -> Result<String, ProviderError>;

    /// Drop every file staged for `space` without committing.
    fn discard_staged(&self, space: &SpaceRef);

    /// Publish every staged file as one commit on the space branch.
    ///
    /// # Errors
    ///
    /// - `Conflict` if the branch moved during the commit
    /// - `Write` if nothing was staged
    async fn commit_changes(&self, space: &SpaceRef, message: &str)
        -> Result<CommitRef, ProviderError>;

    /// Paths of every file at the branch head.
    async fn list_semantic_files(&self, space: &SpaceRef) -> Result<Vec<String>, ProviderError>;

    /// The branch head, or `None` for an empty repository.
    async fn current_head(&self, space: &SpaceRef) -> Result<Option<CommitRef>, ProviderError>;

    /// Bounded-timeout liveness probe.
    async fn is_available(&self) -> bool;

    /// Rate limit, quota and last successful sync.
    async fn get_status(&self) -> Result<ProviderStatus, ProviderError>;

    /// Read every file at the branch head.
    async fn read_all_files(&self, space: &SpaceRef) -> Result<layout::FileMap, ProviderError> {
        let mut files = BTreeMap::new();
        for path in self.list_semantic_files(space).await? {
            let content = self.read_semantic_file(space, &path).await?;
            files.insert(path, content);
        }
        Ok(files)
    }

    /// Export the whole space as an N-Quads stream.
    async fn export_full_graph(&self, space: &SpaceRef) -> Result<Vec<u8>, ProviderError> {
        let files = self.read_all_files(space).await?;
        let graph =
            layout::parse(&files).map_err(|e| ProviderError::ImportExport(e.to_string()))?;
        Ok(layout::export_all(&graph))
    }

    /// Replace the space contents with an N-Quads stream and commit.
    ///
    /// Returns the imported graph so the caller can verify it.
    async fn import_full_graph(
        &self,
        space: &SpaceRef,
        stream: &[u8],
    ) -> Result<Graph, ProviderError> {
        let graph =
            layout::import_all(stream).map_err(|e| ProviderError::ImportExport(e.to_string()))?;
        self.discard_staged(space);
        let existing = self.list_semantic_files(space).await?;
        let files = layout::serialize(&graph);
        for path in existing.iter().filter(|p| !files.contains_key(*p)) {
            self.write_semantic_file(space, path, "").await?;
        }
        for (path, content) in &files {
            self.write_semantic_file(space, path, content).await?;
        }
        self.commit_changes(space, "Import full graph").await?;
        Ok(graph)
    }
}
