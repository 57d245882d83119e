//! provider::github
//!
//! GitHub provider using the REST Git Data API.
//!
//! # Design
//!
//! Staged files become blobs immediately. `commit_changes` builds one tree
//! on top of the branch tip, creates a commit and moves the branch with
//! `force: false`, so a concurrent writer surfaces as a `Conflict` instead
//! of a lost update.
//!
//! Writing empty content stages a deletion.
//!
//! # Rate Limiting
//!
//! GitHub rate limits are reported as `ProviderError::RateLimited`. Retrying
//! is the caller's responsibility.
//!
//! # Example
//!
//! ```ignore
//! use redstring_pod::provider::github::GitHubProvider;
//! use redstring_pod::provider::{Credentials, SemanticProvider};
//!
//! let provider = GitHubProvider::new("alice");
//! provider.authenticate(&Credentials::OAuth { access_token: token }).await?;
//! let space = provider.create_semantic_space("personal").await?;
//! ```

use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use chrono::{DateTime, TimeZone, Utc};
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, AUTHORIZATION, USER_AGENT};
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::http::{
    client_with_timeout, error_from_response, handle_response, network_error, USER_AGENT_VALUE,
};
use super::traits::{
    CommitRef, Credentials, ProviderError, ProviderStatus, RateLimit, SemanticProvider, Session,
    SpaceRef,
};

/// Default GitHub API base URL.
pub const DEFAULT_API_BASE: &str = "https://api.github.com";

/// Timeout for the liveness probe.
const PROBE_TIMEOUT: Duration = Duration::from_secs(5);

/// Staged entries per space: path to blob sha, `None` for deletion.
type Staged = BTreeMap<String, Option<String>>;

/// GitHub provider.
pub struct GitHubProvider {
    /// HTTP client for making requests
    client: Client,
    /// Token set by `authenticate` or `with_token`
    token: RwLock<Option<String>>,
    /// Configured repository owner; falls back to the authenticated user
    owner: Option<String>,
    /// Repository name override; defaults to the space name
    repo: Option<String>,
    /// Login of the authenticated user
    user: RwLock<Option<String>>,
    /// Branch to commit to
    branch: String,
    /// API base URL (configurable for GitHub Enterprise)
    api_base: String,
    staged: Mutex<HashMap<SpaceRef, Staged>>,
    last_sync: Mutex<Option<DateTime<Utc>>>,
}

// Custom Debug to avoid exposing the token
impl std::fmt::Debug for GitHubProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let has_token = self.token.read().map(|t| t.is_some()).unwrap_or(false);
        f.debug_struct("GitHubProvider")
            .field("has_token", &has_token)
            .field("owner", &self.owner)
            .field("repo", &self.repo)
            .field("branch", &self.branch)
            .field("api_base", &self.api_base)
            .finish()
    }
}

impl GitHubProvider {
    /// Create a provider for repositories under `owner`.
    ///
    /// An empty owner means "the authenticated user".
    pub fn new(owner: impl Into<String>) -> Self {
        let owner = owner.into();
        Self {
            client: Client::new(),
            token: RwLock::new(None),
            owner: (!owner.is_empty()).then_some(owner),
            repo: None,
            user: RwLock::new(None),
            branch: "main".to_string(),
            api_base: DEFAULT_API_BASE.to_string(),
            staged: Mutex::new(HashMap::new()),
            last_sync: Mutex::new(None),
        }
    }

    /// Use a custom API base URL (GitHub Enterprise, tests).
    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into().trim_end_matches('/').to_string();
        self
    }

    /// Use a fixed repository name instead of the space name.
    pub fn with_repo(mut self, repo: impl Into<String>) -> Self {
        self.repo = Some(repo.into());
        self
    }

    /// Commit to this branch when creating a space.
    pub fn with_branch(mut self, branch: impl Into<String>) -> Self {
        self.branch = branch.into();
        self
    }

    /// Bound every request by `timeout`.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.client = client_with_timeout(timeout);
        self
    }

    /// Authenticate up front with a static token.
    pub fn with_token(self, token: impl Into<String>) -> Self {
        if let Ok(mut slot) = self.token.write() {
            *slot = Some(token.into());
        }
        self
    }

    /// The API base URL.
    pub fn api_base(&self) -> &str {
        &self.api_base
    }

    fn current_token(&self) -> Result<String, ProviderError> {
        self.token
            .read()
            .ok()
            .and_then(|t| t.clone())
            .ok_or(ProviderError::AuthRequired)
    }

    fn public_headers() -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(
            ACCEPT,
            HeaderValue::from_static("application/vnd.github+json"),
        );
        headers.insert(USER_AGENT, HeaderValue::from_static(USER_AGENT_VALUE));
        headers.insert(
            "X-GitHub-Api-Version",
            HeaderValue::from_static("2022-11-28"),
        );
        headers
    }

    /// Build request headers with authentication.
    fn headers(&self) -> Result<HeaderMap, ProviderError> {
        let token = self.current_token()?;
        let mut headers = Self::public_headers();
        let value = HeaderValue::from_str(&format!("Bearer {}", token))
            .map_err(|_| ProviderError::AuthFailed("token contains invalid characters".into()))?;
        headers.insert(AUTHORIZATION, value);
        Ok(headers)
    }

    /// Build URL for a repository endpoint.
    fn repo_url(&self, space: &SpaceRef, path: &str) -> String {
        format!(
            "{}/repos/{}/{}/{}",
            self.api_base, space.owner, space.name, path
        )
    }

    fn effective_owner(&self) -> Result<String, ProviderError> {
        if let Some(owner) = &self.owner {
            return Ok(owner.clone());
        }
        self.user
            .read()
            .ok()
            .and_then(|u| u.clone())
            .ok_or(ProviderError::AuthRequired)
    }

    fn stage(&self, space: &SpaceRef, path: &str, sha: Option<String>) {
        let mut staged = self.staged.lock().unwrap_or_else(|e| e.into_inner());
        staged
            .entry(space.clone())
            .or_default()
            .insert(path.to_string(), sha);
    }

    fn take_staged(&self, space: &SpaceRef) -> Staged {
        let mut staged = self.staged.lock().unwrap_or_else(|e| e.into_inner());
        staged.remove(space).unwrap_or_default()
    }

    /// The branch tip, or `None` when the branch or repository is empty.
    async fn branch_tip(&self, space: &SpaceRef) -> Result<Option<String>, ProviderError> {
        let url = self.repo_url(space, &format!("git/ref/heads/{}", space.branch));
        let response = self
            .client
            .get(&url)
            .headers(self.headers()?)
            .send()
            .await
            .map_err(network_error)?;

        // 409 is GitHub's answer for a repository without commits
        if matches!(
            response.status(),
            StatusCode::NOT_FOUND | StatusCode::CONFLICT
        ) {
            return Ok(None);
        }
        let reference: GitRefResponse = handle_response(response, "GitHub").await?;
        Ok(Some(reference.object.sha))
    }

    async fn move_branch(
        &self,
        space: &SpaceRef,
        sha: &str,
        create: bool,
    ) -> Result<(), ProviderError> {
        let request = if create {
            self.client
                .post(self.repo_url(space, "git/refs"))
                .json(&CreateRefRequest {
                    reference: format!("refs/heads/{}", space.branch),
                    sha: sha.to_string(),
                })
        } else {
            self.client
                .patch(self.repo_url(space, &format!("git/refs/heads/{}", space.branch)))
                .json(&UpdateRefRequest {
                    sha: sha.to_string(),
                    force: false,
                })
        };
        let response = request
            .headers(self.headers()?)
            .send()
            .await
            .map_err(network_error)?;

        let status = response.status();
        if status.is_success() {
            return Ok(());
        }
        match error_from_response(response, "GitHub").await {
            ProviderError::Api { status: 422, message } => Err(ProviderError::Conflict(message)),
            err => {
                debug!(status = status.as_u16(), "ref update rejected");
                Err(err)
            }
        }
    }
}

#[async_trait]
impl SemanticProvider for GitHubProvider {
    fn name(&self) -> &'static str {
        "github"
    }

    async fn authenticate(&self, credentials: &Credentials) -> Result<Session, ProviderError> {
        let token = credentials
            .secret()
            .ok_or(ProviderError::AuthRequired)?
            .to_string();
        if let Ok(mut slot) = self.token.write() {
            *slot = Some(token);
        }

        let url = format!("{}/user", self.api_base);
        let response = self
            .client
            .get(&url)
            .headers(self.headers()?)
            .send()
            .await
            .map_err(network_error)?;
        let user: UserResponse = handle_response(response, "GitHub").await?;

        info!(user = %user.login, "authenticated with GitHub");
        if let Ok(mut slot) = self.user.write() {
            *slot = Some(user.login.clone());
        }
        Ok(Session {
            provider: self.name().to_string(),
            user: Some(user.login),
            authenticated_at: Utc::now(),
        })
    }

    async fn create_semantic_space(&self, name: &str) -> Result<SpaceRef, ProviderError> {
        let owner = self.effective_owner()?;
        let repo = self.repo.clone().unwrap_or_else(|| name.to_string());

        let url = format!("{}/repos/{}/{}", self.api_base, owner, repo);
        let response = self
            .client
            .get(&url)
            .headers(self.headers()?)
            .send()
            .await
            .map_err(network_error)?;

        if response.status().is_success() {
            let existing: RepoResponse = handle_response(response, "GitHub").await?;
            debug!(repo = %existing.full_name, "adopting existing repository");
            return Ok(SpaceRef {
                owner: existing.owner.login,
                name: existing.name,
                branch: existing.default_branch,
            });
        }
        if response.status() != StatusCode::NOT_FOUND {
            return Err(error_from_response(response, "GitHub").await);
        }

        let is_self = self
            .user
            .read()
            .ok()
            .and_then(|u| u.clone())
            .is_some_and(|login| login == owner);
        let create_url = if is_self || self.owner.is_none() {
            format!("{}/user/repos", self.api_base)
        } else {
            format!("{}/orgs/{}/repos", self.api_base, owner)
        };
        let request = CreateRepoRequest {
            name: repo.clone(),
            description: format!("Redstring semantic space '{}'", name),
            private: true,
            auto_init: true,
        };
        let response = self
            .client
            .post(&create_url)
            .headers(self.headers()?)
            .json(&request)
            .send()
            .await
            .map_err(network_error)?;
        let created: RepoResponse = handle_response(response, "GitHub").await?;

        info!(repo = %created.full_name, "created space repository");
        Ok(SpaceRef {
            owner: created.owner.login,
            name: created.name,
            branch: created.default_branch,
        })
    }

    async fn write_semantic_file(
        &self,
        space: &SpaceRef,
        path: &str,
        content: &str,
    ) -> Result<CommitRef, ProviderError> {
        if content.is_empty() {
            self.stage(space, path, None);
            return Ok(CommitRef(String::new()));
        }

        let request = CreateBlobRequest {
            content: STANDARD.encode(content.as_bytes()),
            encoding: "base64",
        };
        let response = self
            .client
            .post(self.repo_url(space, "git/blobs"))
            .headers(self.headers()?)
            .json(&request)
            .send()
            .await
            .map_err(network_error)?;
        let blob: ShaResponse = handle_response(response, "GitHub").await?;

        self.stage(space, path, Some(blob.sha.clone()));
        Ok(CommitRef(blob.sha))
    }

    async fn read_semantic_file(
        &self,
        space: &SpaceRef,
        path: &str,
    ) -> Result<String, ProviderError> {
        let url = self.repo_url(
            space,
            &format!(
                "contents/{}?ref={}",
                super::http::encode_path(path),
                space.branch
            ),
        );
        let mut headers = self.headers()?;
        headers.insert(
            ACCEPT,
            HeaderValue::from_static("application/vnd.github.raw+json"),
        );
        let response = self
            .client
            .get(&url)
            .headers(headers)
            .send()
            .await
            .map_err(network_error)?;

        if !response.status().is_success() {
            return Err(match error_from_response(response, "GitHub").await {
                ProviderError::NotFound(_) => ProviderError::NotFound(path.to_string()),
                err => err,
            });
        }
        response.text().await.map_err(network_error)
    }

    fn discard_staged(&self, space: &SpaceRef) {
        self.take_staged(space);
    }

    async fn commit_changes(
        &self,
        space: &SpaceRef,
        message: &str,
    ) -> Result<CommitRef, ProviderError> {
        let staged = self.take_staged(space);
        if staged.is_empty() {
            return Err(ProviderError::Write("nothing staged".into()));
        }

        let parent = self.branch_tip(space).await?;
        let base_tree = match &parent {
            Some(sha) => {
                let url = self.repo_url(space, &format!("git/commits/{}", sha));
                let response = self
                    .client
                    .get(&url)
                    .headers(self.headers()?)
                    .send()
                    .await
                    .map_err(network_error)?;
                let commit: CommitResponse = handle_response(response, "GitHub").await?;
                Some(commit.tree.sha)
            }
            None => None,
        };

        // Deleting a path that is absent from the base tree is an API error
        let has_deletions = staged.values().any(Option::is_none);
        let existing: Vec<String> = if has_deletions && parent.is_some() {
            self.list_semantic_files(space).await?
        } else {
            Vec::new()
        };
        let entries: Vec<TreeEntryRequest> = staged
            .into_iter()
            .filter(|(path, sha)| sha.is_some() || existing.contains(path))
            .map(|(path, sha)| TreeEntryRequest {
                path,
                mode: "100644",
                kind: "blob",
                sha,
            })
            .collect();

        let response = self
            .client
            .post(self.repo_url(space, "git/trees"))
            .headers(self.headers()?)
            .json(&CreateTreeRequest {
                base_tree,
                tree: entries,
            })
            .send()
            .await
            .map_err(network_error)?;
        let tree: ShaResponse = handle_response(response, "GitHub").await?;

        let response = self
            .client
            .post(self.repo_url(space, "git/commits"))
            .headers(self.headers()?)
            .json(&CreateCommitRequest {
                message: message.to_string(),
                tree: tree.sha,
                parents: parent.iter().cloned().collect(),
            })
            .send()
            .await
            .map_err(network_error)?;
        let commit: ShaResponse = handle_response(response, "GitHub").await?;

        self.move_branch(space, &commit.sha, parent.is_none()).await?;

        info!(space = %space, commit = %commit.sha, "committed to GitHub");
        *self.last_sync.lock().unwrap_or_else(|e| e.into_inner()) = Some(Utc::now());
        Ok(CommitRef(commit.sha))
    }

    async fn list_semantic_files(&self, space: &SpaceRef) -> Result<Vec<String>, ProviderError> {
        let url = self.repo_url(space, &format!("git/trees/{}?recursive=1", space.branch));
        let response = self
            .client
            .get(&url)
            .headers(self.headers()?)
            .send()
            .await
            .map_err(network_error)?;

        if matches!(
            response.status(),
            StatusCode::NOT_FOUND | StatusCode::CONFLICT
        ) {
            return Ok(Vec::new());
        }
        let listing: TreeListing = handle_response(response, "GitHub").await?;
        if listing.truncated {
            debug!(space = %space, "tree listing truncated by GitHub");
        }
        Ok(listing
            .tree
            .into_iter()
            .filter(|e| e.kind == "blob")
            .map(|e| e.path)
            .collect())
    }

    async fn current_head(&self, space: &SpaceRef) -> Result<Option<CommitRef>, ProviderError> {
        Ok(self.branch_tip(space).await?.map(CommitRef))
    }

    async fn is_available(&self) -> bool {
        let url = format!("{}/rate_limit", self.api_base);
        let headers = self.headers().unwrap_or_else(|_| Self::public_headers());
        match self
            .client
            .get(&url)
            .headers(headers)
            .timeout(PROBE_TIMEOUT)
            .send()
            .await
        {
            Ok(response) => !response.status().is_server_error(),
            Err(_) => false,
        }
    }

    async fn get_status(&self) -> Result<ProviderStatus, ProviderError> {
        let url = format!("{}/rate_limit", self.api_base);
        let response = self
            .client
            .get(&url)
            .headers(self.headers()?)
            .send()
            .await
            .map_err(network_error)?;
        let limits: RateLimitResponse = handle_response(response, "GitHub").await?;
        let core = limits.resources.core;

        Ok(ProviderStatus {
            rate_limit: Some(RateLimit {
                limit: core.limit,
                remaining: core.remaining,
                reset_at: Utc.timestamp_opt(core.reset, 0).single(),
            }),
            quota: None,
            last_sync: *self.last_sync.lock().unwrap_or_else(|e| e.into_inner()),
        })
    }
}

// =============================================================================
// GitHub API request/response types
// =============================================================================

#[derive(Debug, Deserialize)]
struct UserResponse {
    login: String,
}

#[derive(Debug, Deserialize)]
struct OwnerResponse {
    login: String,
}

#[derive(Debug, Deserialize)]
struct RepoResponse {
    name: String,
    full_name: String,
    owner: OwnerResponse,
    default_branch: String,
}

#[derive(Debug, Serialize)]
struct CreateRepoRequest {
    name: String,
    description: String,
    private: bool,
    auto_init: bool,
}

#[derive(Debug, Serialize)]
struct CreateBlobRequest {
    content: String,
    encoding: &'static str,
}

#[derive(Debug, Deserialize)]
struct ShaResponse {
    sha: String,
}

#[derive(Debug, Deserialize)]
struct GitRefResponse {
    object: ShaResponse,
}

#[derive(Debug, Deserialize)]
struct CommitResponse {
    tree: ShaResponse,
}

#[derive(Debug, Serialize)]
struct TreeEntryRequest {
    path: String,
    mode: &'static str,
    #[serde(rename = "type")]
    kind: &'static str,
    /// `null` deletes the path
    sha: Option<String>,
}

#[derive(Debug, Serialize)]
struct CreateTreeRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    base_tree: Option<String>,
    tree: Vec<TreeEntryRequest>,
}

#[derive(Debug, Serialize)]
struct CreateCommitRequest {
    message: String,
    tree: String,
    parents: Vec<String>,
}

#[derive(Debug, Serialize)]
struct CreateRefRequest {
    #[serde(rename = "ref")]
    reference: String,
    sha: String,
}

#[derive(Debug, Serialize)]
struct UpdateRefRequest {
    sha: String,
    force: bool,
}

#[derive(Debug, Deserialize)]
struct TreeListingEntry {
    path: String,
    #[serde(rename = "type")]
    kind: String,
}

#[derive(Debug, Deserialize)]
struct TreeListing {
    tree: Vec<TreeListingEntry>,
    #[serde(default)]
    truncated: bool,
}

#[derive(Debug, Deserialize)]
struct RateLimitCore {
    limit: u64,
    remaining: u64,
    reset: i64,
}

#[derive(Debug, Deserialize)]
struct RateLimitResources {
    core: RateLimitCore,
}

#[derive(Debug, Deserialize)]
struct RateLimitResponse {
    resources: RateLimitResources,
}
