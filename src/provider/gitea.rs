//! provider::gitea
//!
//! Gitea (and Forgejo) provider for self-hosted pods.
//!
//! # Design
//!
//! Gitea has no public tree-building API, so staged files stay in memory
//! until `commit_changes`, which sends them in one `POST .../contents`
//! change set. Each update carries the blob sha the server last reported
//! for that path; a stale sha or a moved branch is answered with 409 or
//! 422 and surfaces as `Conflict`.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use chrono::{DateTime, Utc};
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, AUTHORIZATION, USER_AGENT};
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{debug, info};

use super::http::{
    client_with_timeout, encode_path, error_from_response, handle_response, network_error,
    USER_AGENT_VALUE,
};
use super::traits::{
    CommitRef, Credentials, ProviderError, ProviderStatus, SemanticProvider, Session, SpaceRef,
};

/// Timeout for the liveness probe.
const PROBE_TIMEOUT: Duration = Duration::from_secs(5);

/// Gitea provider.
pub struct GiteaProvider {
    client: Client,
    token: RwLock<Option<String>>,
    /// Base URL including `/api/v1`
    api_base: String,
    owner: Option<String>,
    repo: Option<String>,
    user: RwLock<Option<String>>,
    branch: String,
    /// Staged content per space; `None` marks a deletion
    staged: Mutex<HashMap<SpaceRef, BTreeMap<String, Option<String>>>>,
    last_sync: Mutex<Option<DateTime<Utc>>>,
}

// Custom Debug to avoid exposing the token
impl std::fmt::Debug for GiteaProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let has_token = self.token.read().map(|t| t.is_some()).unwrap_or(false);
        f.debug_struct("GiteaProvider")
            .field("has_token", &has_token)
            .field("api_base", &self.api_base)
            .field("owner", &self.owner)
            .field("repo", &self.repo)
            .finish()
    }
}

impl GiteaProvider {
    /// Create a provider for the instance at `api_base`.
    ///
    /// `api_base` may be the instance root or its `/api/v1` endpoint.
    pub fn new(api_base: impl Into<String>, owner: impl Into<String>) -> Self {
        let base = api_base.into().trim_end_matches('/').to_string();
        let api_base = if base.ends_with("/api/v1") {
            base
        } else {
            format!("{}/api/v1", base)
        };
        let owner = owner.into();
        Self {
            client: Client::new(),
            token: RwLock::new(None),
            api_base,
            owner: (!owner.is_empty()).then_some(owner),
            repo: None,
            user: RwLock::new(None),
            branch: "main".to_string(),
            staged: Mutex::new(HashMap::new()),
            last_sync: Mutex::new(None),
        }
    }

    /// Use a fixed repository name instead of the space name.
    pub fn with_repo(mut self, repo: impl Into<String>) -> Self {
        self.repo = Some(repo.into());
        self
    }

    pub fn with_branch(mut self, branch: impl Into<String>) -> Self {
        self.branch = branch.into();
        self
    }

    /// Bound every request by `timeout`.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.client = client_with_timeout(timeout);
        self
    }

    pub fn with_token(self, token: impl Into<String>) -> Self {
        if let Ok(mut slot) = self.token.write() {
            *slot = Some(token.into());
        }
        self
    }

    pub fn api_base(&self) -> &str {
        &self.api_base
    }

    fn headers(&self) -> Result<HeaderMap, ProviderError> {
        let token = self
            .token
            .read()
            .ok()
            .and_then(|t| t.clone())
            .ok_or(ProviderError::AuthRequired)?;
        let mut headers = HeaderMap::new();
        let value = HeaderValue::from_str(&format!("token {}", token))
            .map_err(|_| ProviderError::AuthFailed("token contains invalid characters".into()))?;
        headers.insert(AUTHORIZATION, value);
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
        headers.insert(USER_AGENT, HeaderValue::from_static(USER_AGENT_VALUE));
        Ok(headers)
    }

    fn repo_url(&self, space: &SpaceRef, path: &str) -> String {
        format!(
            "{}/repos/{}/{}/{}",
            self.api_base, space.owner, space.name, path
        )
    }

    /// Blob sha of `path` at the branch head, if the file exists.
    async fn file_sha(&self, space: &SpaceRef, path: &str) -> Result<Option<String>, ProviderError> {
        let url = self.repo_url(
            space,
            &format!("contents/{}?ref={}", encode_path(path), space.branch),
        );
        let response = self
            .client
            .get(&url)
            .headers(self.headers()?)
            .send()
            .await
            .map_err(network_error)?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let entry: ContentEntry = handle_response(response, "Gitea").await?;
        Ok(Some(entry.sha))
    }
}

#[async_trait]
impl SemanticProvider for GiteaProvider {
    fn name(&self) -> &'static str {
        "gitea"
    }

    async fn authenticate(&self, credentials: &Credentials) -> Result<Session, ProviderError> {
        let token = credentials
            .secret()
            .ok_or(ProviderError::AuthRequired)?
            .to_string();
        if let Ok(mut slot) = self.token.write() {
            *slot = Some(token);
        }

        let response = self
            .client
            .get(format!("{}/user", self.api_base))
            .headers(self.headers()?)
            .send()
            .await
            .map_err(network_error)?;
        let user: UserResponse = handle_response(response, "Gitea").await?;

        info!(user = %user.login, "authenticated with Gitea");
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
        let owner = match &self.owner {
            Some(owner) => owner.clone(),
            None => self
                .user
                .read()
                .ok()
                .and_then(|u| u.clone())
                .ok_or(ProviderError::AuthRequired)?,
        };
        let repo = self.repo.clone().unwrap_or_else(|| name.to_string());

        let response = self
            .client
            .get(format!("{}/repos/{}/{}", self.api_base, owner, repo))
            .headers(self.headers()?)
            .send()
            .await
            .map_err(network_error)?;
        if response.status().is_success() {
            let existing: RepoResponse = handle_response(response, "Gitea").await?;
            return Ok(SpaceRef {
                owner: existing.owner.login,
                name: existing.name,
                branch: existing.default_branch,
            });
        }
        if response.status() != StatusCode::NOT_FOUND {
            return Err(error_from_response(response, "Gitea").await);
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
        let response = self
            .client
            .post(create_url)
            .headers(self.headers()?)
            .json(&CreateRepoRequest {
                name: repo,
                description: format!("Redstring semantic space '{}'", name),
                private: true,
                auto_init: true,
                default_branch: self.branch.clone(),
            })
            .send()
            .await
            .map_err(network_error)?;
        let created: RepoResponse = handle_response(response, "Gitea").await?;

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
        let digest = hex::encode(Sha256::digest(content.as_bytes()));
        let entry = (!content.is_empty()).then(|| content.to_string());
        let mut staged = self.staged.lock().unwrap_or_else(|e| e.into_inner());
        staged
            .entry(space.clone())
            .or_default()
            .insert(path.to_string(), entry);
        Ok(CommitRef(digest))
    }

    async fn read_semantic_file(
        &self,
        space: &SpaceRef,
        path: &str,
    ) -> Result<String, ProviderError> {
        let url = self.repo_url(
            space,
            &format!("raw/{}?ref={}", encode_path(path), space.branch),
        );
        let response = self
            .client
            .get(&url)
            .headers(self.headers()?)
            .send()
            .await
            .map_err(network_error)?;
        if !response.status().is_success() {
            return Err(match error_from_response(response, "Gitea").await {
                ProviderError::NotFound(_) => ProviderError::NotFound(path.to_string()),
                err => err,
            });
        }
        response.text().await.map_err(network_error)
    }

    fn discard_staged(&self, space: &SpaceRef) {
        let mut staged = self.staged.lock().unwrap_or_else(|e| e.into_inner());
        staged.remove(space);
    }

    async fn commit_changes(
        &self,
        space: &SpaceRef,
        message: &str,
    ) -> Result<CommitRef, ProviderError> {
        let staged = {
            let mut staged = self.staged.lock().unwrap_or_else(|e| e.into_inner());
            staged.remove(space).unwrap_or_default()
        };
        if staged.is_empty() {
            return Err(ProviderError::Write("nothing staged".into()));
        }

        let mut files = Vec::with_capacity(staged.len());
        for (path, content) in staged {
            let sha = self.file_sha(space, &path).await?;
            let operation = match (&content, &sha) {
                (Some(_), None) => "create",
                (Some(_), Some(_)) => "update",
                (None, Some(_)) => "delete",
                (None, None) => continue,
            };
            files.push(ChangeFileOperation {
                operation,
                path,
                content: content.map(|c| STANDARD.encode(c.as_bytes())),
                sha,
            });
        }
        if files.is_empty() {
            // Only deletions of absent files were staged
            return self
                .current_head(space)
                .await?
                .ok_or_else(|| ProviderError::Write("nothing to commit".into()));
        }

        let response = self
            .client
            .post(self.repo_url(space, "contents"))
            .headers(self.headers()?)
            .json(&ChangeFilesRequest {
                branch: space.branch.clone(),
                message: message.to_string(),
                files,
            })
            .send()
            .await
            .map_err(network_error)?;

        if !response.status().is_success() {
            return Err(match error_from_response(response, "Gitea").await {
                ProviderError::Api { status: 422, message } => ProviderError::Conflict(message),
                err => err,
            });
        }
        let result: ChangeFilesResponse = handle_response(response, "Gitea").await?;

        info!(space = %space, commit = %result.commit.sha, "committed to Gitea");
        *self.last_sync.lock().unwrap_or_else(|e| e.into_inner()) = Some(Utc::now());
        Ok(CommitRef(result.commit.sha))
    }

    async fn list_semantic_files(&self, space: &SpaceRef) -> Result<Vec<String>, ProviderError> {
        let url = self.repo_url(
            space,
            &format!("git/trees/{}?recursive=true&per_page=10000", space.branch),
        );
        let response = self
            .client
            .get(&url)
            .headers(self.headers()?)
            .send()
            .await
            .map_err(network_error)?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(Vec::new());
        }
        let listing: TreeListing = handle_response(response, "Gitea").await?;
        if listing.truncated {
            debug!(space = %space, "tree listing truncated by Gitea");
        }
        Ok(listing
            .tree
            .into_iter()
            .filter(|e| e.kind == "blob")
            .map(|e| e.path)
            .collect())
    }

    async fn current_head(&self, space: &SpaceRef) -> Result<Option<CommitRef>, ProviderError> {
        let url = self.repo_url(space, &format!("branches/{}", space.branch));
        let response = self
            .client
            .get(&url)
            .headers(self.headers()?)
            .send()
            .await
            .map_err(network_error)?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let branch: BranchResponse = handle_response(response, "Gitea").await?;
        Ok(Some(CommitRef(branch.commit.id)))
    }

    async fn is_available(&self) -> bool {
        match self
            .client
            .get(format!("{}/version", self.api_base))
            .header(USER_AGENT, USER_AGENT_VALUE)
            .timeout(PROBE_TIMEOUT)
            .send()
            .await
        {
            Ok(response) => response.status().is_success(),
            Err(_) => false,
        }
    }

    async fn get_status(&self) -> Result<ProviderStatus, ProviderError> {
        Ok(ProviderStatus {
            rate_limit: None,
            quota: None,
            last_sync: *self.last_sync.lock().unwrap_or_else(|e| e.into_inner()),
        })
    }
}

// =============================================================================
// Gitea API request/response types
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
    default_branch: String,
}

#[derive(Debug, Deserialize)]
struct ContentEntry {
    sha: String,
}

#[derive(Debug, Serialize)]
struct ChangeFileOperation {
    operation: &'static str,
    path: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    sha: Option<String>,
}

#[derive(Debug, Serialize)]
struct ChangeFilesRequest {
    branch: String,
    message: String,
    files: Vec<ChangeFileOperation>,
}

#[derive(Debug, Deserialize)]
struct CommitSha {
    sha: String,
}

#[derive(Debug, Deserialize)]
struct ChangeFilesResponse {
    commit: CommitSha,
}

#[derive(Debug, Deserialize)]
struct TreeListingEntry {
    path: String,
    #[serde(rename = "type")]
    kind: String,
}

#[derive(Debug, Deserialize)]
struct TreeListing {
    #[serde(default)]
    tree: Vec<TreeListingEntry>,
    #[serde(default)]
    truncated: bool,
}

#[derive(Debug, Deserialize)]
struct BranchCommit {
    id: String,
}

#[derive(Debug, Deserialize)]
struct BranchResponse {
    commit: BranchCommit,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn api_base_gets_api_suffix() {
        assert_eq!(
            GiteaProvider::new("https://git.example.com/", "alice").api_base(),
            "https://git.example.com/api/v1"
        );
        assert_eq!(
            GiteaProvider::new("https://git.example.com/api/v1", "alice").api_base(),
            "https://git.example.com/api/v1"
        );
    }

    #[test]
    fn uses_token_authorization_scheme() {
        let provider = GiteaProvider::new("https://git.example.com", "alice").with_token("abc");
        let headers = provider.headers().unwrap();
        assert_eq!(headers.get(AUTHORIZATION).unwrap(), "token abc");
    }

    #[test]
    fn debug_hides_token() {
        let provider = GiteaProvider::new("https://git.example.com", "alice").with_token("sekrit");
        assert!(!format!("{:?}", provider).contains("sekrit"));
    }

    #[tokio::test]
    async fn write_stages_without_network() {
        let provider = GiteaProvider::new("http://127.0.0.1:1", "alice").with_token("t");
        let space = SpaceRef {
            owner: "alice".into(),
            name: "personal".into(),
            branch: "main".into(),
        };
        let staged = provider
            .write_semantic_file(&space, "a.ttl", "content")
            .await
            .unwrap();
        assert_eq!(staged.as_str().len(), 64);
    }
}
