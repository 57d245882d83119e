//! provider::local_git
//!
//! Provider backed by bare Git repositories on the local filesystem.
//!
//! # Design
//!
//! Each space is `<root>/<space>.git`. Staged files are written as blobs
//! right away; `commit_changes` folds them into the branch tree and moves
//! the branch with compare-and-swap, so two writers racing on one repository
//! produce a `Conflict` rather than a lost commit.
//!
//! All git2 work runs on the blocking pool; `git2::Repository` is opened
//! per operation because it is not `Sync`.

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use git2::{ErrorCode, ObjectType, Oid, Repository, RepositoryInitOptions, Signature, Tree};
use tracing::{debug, info};

use super::traits::{
    CommitRef, Credentials, ProviderError, ProviderStatus, SemanticProvider, Session, SpaceRef,
};

const COMMITTER_NAME: &str = "Redstring";
const COMMITTER_EMAIL: &str = "redstring@localhost";

/// Local bare-repository provider.
#[derive(Debug)]
pub struct LocalGitProvider {
    root: PathBuf,
    branch: String,
    staged: Mutex<HashMap<SpaceRef, BTreeMap<String, Option<Oid>>>>,
    last_sync: Mutex<Option<DateTime<Utc>>>,
}

impl LocalGitProvider {
    /// Create a provider storing spaces under `root`.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            branch: "main".to_string(),
            staged: Mutex::new(HashMap::new()),
            last_sync: Mutex::new(None),
        }
    }

    pub fn with_branch(mut self, branch: impl Into<String>) -> Self {
        self.branch = branch.into();
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Path of the bare repository for a space.
    pub fn repo_path(&self, space: &str) -> PathBuf {
        self.root.join(format!("{}.git", space))
    }
}

fn git_error(err: git2::Error) -> ProviderError {
    match err.code() {
        ErrorCode::NotFound => ProviderError::NotFound(err.message().to_string()),
        ErrorCode::Exists | ErrorCode::Modified => ProviderError::Conflict(err.message().to_string()),
        ErrorCode::Locked => ProviderError::Unavailable(format!("repository is locked: {}", err.message())),
        _ => ProviderError::Write(err.message().to_string()),
    }
}

async fn blocking<T, F>(f: F) -> Result<T, ProviderError>
where
    F: FnOnce() -> Result<T, ProviderError> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| ProviderError::Write(format!("blocking task failed: {}", e)))?
}

fn open(path: &Path) -> Result<Repository, ProviderError> {
    Repository::open_bare(path).map_err(|e| match e.code() {
        ErrorCode::NotFound => ProviderError::NotFound(format!("no space at {}", path.display())),
        _ => git_error(e),
    })
}

/// Tree at the branch tip, or `None` for an unborn branch.
fn branch_tree<'r>(repo: &'r Repository, branch: &str) -> Result<Option<Tree<'r>>, ProviderError> {
    match repo.find_reference(&format!("refs/heads/{}", branch)) {
        Ok(reference) => {
            let commit = reference.peel_to_commit().map_err(git_error)?;
            commit.tree().map(Some).map_err(git_error)
        }
        Err(e) if e.code() == ErrorCode::NotFound => Ok(None),
        Err(e) => Err(git_error(e)),
    }
}

/// Insert (or with `None`, remove) a blob at `components` under `base`.
///
/// Returns `None` when the resulting tree is empty.
fn update_tree(
    repo: &Repository,
    base: Option<&Tree<'_>>,
    components: &[&str],
    blob: Option<Oid>,
) -> Result<Option<Oid>, git2::Error> {
    let (&head, rest) = components
        .split_first()
        .ok_or_else(|| git2::Error::from_str("empty path"))?;
    let mut builder = repo.treebuilder(base)?;

    let updated = if rest.is_empty() {
        blob
    } else {
        let subtree = match builder.get(head)? {
            Some(entry) if entry.kind() == Some(ObjectType::Tree) => Some(repo.find_tree(entry.id())?),
            _ => None,
        };
        update_tree(repo, subtree.as_ref(), rest, blob)?
    };

    match updated {
        Some(oid) if rest.is_empty() => {
            builder.insert(head, oid, 0o100644)?;
        }
        Some(oid) => {
            builder.insert(head, oid, 0o040000)?;
        }
        None => {
            if builder.get(head)?.is_some() {
                builder.remove(head)?;
            }
        }
    }

    if builder.is_empty() {
        return Ok(None);
    }
    builder.write().map(Some)
}

#[async_trait]
impl SemanticProvider for LocalGitProvider {
    fn name(&self) -> &'static str {
        "local-git"
    }

    async fn authenticate(&self, _credentials: &Credentials) -> Result<Session, ProviderError> {
        Ok(Session {
            provider: self.name().to_string(),
            user: None,
            authenticated_at: Utc::now(),
        })
    }

    async fn create_semantic_space(&self, name: &str) -> Result<SpaceRef, ProviderError> {
        let path = self.repo_path(name);
        let branch = self.branch.clone();
        let created = blocking(move || {
            if path.exists() {
                open(&path)?;
                return Ok(false);
            }
            let mut opts = RepositoryInitOptions::new();
            opts.bare(true).initial_head(&branch);
            Repository::init_opts(&path, &opts).map_err(git_error)?;
            Ok(true)
        })
        .await?;

        if created {
            info!(space = name, root = %self.root.display(), "created local space repository");
        }
        Ok(SpaceRef {
            owner: String::new(),
            name: name.to_string(),
            branch: self.branch.clone(),
        })
    }

    async fn write_semantic_file(
        &self,
        space: &SpaceRef,
        path: &str,
        content: &str,
    ) -> Result<CommitRef, ProviderError> {
        let oid = if content.is_empty() {
            None
        } else {
            let repo_path = self.repo_path(&space.name);
            let bytes = content.as_bytes().to_vec();
            Some(blocking(move || open(&repo_path)?.blob(&bytes).map_err(git_error)).await?)
        };

        let mut staged = self.staged.lock().unwrap_or_else(|e| e.into_inner());
        staged
            .entry(space.clone())
            .or_default()
            .insert(path.to_string(), oid);
        Ok(CommitRef(oid.map(|o| o.to_string()).unwrap_or_default()))
    }

    async fn read_semantic_file(
        &self,
        space: &SpaceRef,
        path: &str,
    ) -> Result<String, ProviderError> {
        let repo_path = self.repo_path(&space.name);
        let branch = space.branch.clone();
        let file = path.to_string();
        blocking(move || {
            let repo = open(&repo_path)?;
            let not_found = || ProviderError::NotFound(file.clone());
            let tree = branch_tree(&repo, &branch)?.ok_or_else(not_found)?;
            let entry = tree.get_path(Path::new(&file)).map_err(|_| not_found())?;
            let blob = entry
                .to_object(&repo)
                .and_then(|o| o.peel_to_blob())
                .map_err(|_| not_found())?;
            String::from_utf8(blob.content().to_vec())
                .map_err(|_| ProviderError::Write(format!("{} is not valid UTF-8", file)))
        })
        .await
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

        let repo_path = self.repo_path(&space.name);
        let branch = space.branch.clone();
        let message = message.to_string();
        let oid = blocking(move || {
            let repo = open(&repo_path)?;
            let refname = format!("refs/heads/{}", branch);
            let parent = match repo.find_reference(&refname) {
                Ok(reference) => Some(reference.peel_to_commit().map_err(git_error)?),
                Err(e) if e.code() == ErrorCode::NotFound => None,
                Err(e) => return Err(git_error(e)),
            };

            let mut tree = match &parent {
                Some(commit) => Some(commit.tree().map_err(git_error)?),
                None => None,
            };
            for (path, blob) in &staged {
                let components: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
                let updated = update_tree(&repo, tree.as_ref(), &components, *blob).map_err(git_error)?;
                tree = match updated {
                    Some(oid) => Some(repo.find_tree(oid).map_err(git_error)?),
                    None => None,
                };
            }
            let tree = match tree {
                Some(tree) => tree,
                None => {
                    let empty = repo.treebuilder(None).and_then(|b| b.write()).map_err(git_error)?;
                    repo.find_tree(empty).map_err(git_error)?
                }
            };

            let sig = Signature::now(COMMITTER_NAME, COMMITTER_EMAIL).map_err(git_error)?;
            let parents: Vec<&git2::Commit<'_>> = parent.iter().collect();
            let oid = repo
                .commit(None, &sig, &sig, &message, &tree, &parents)
                .map_err(git_error)?;

            // Compare-and-swap on the branch tip
            match &parent {
                Some(p) => repo
                    .reference_matching(&refname, oid, true, p.id(), &message)
                    .map_err(git_error)?,
                None => repo
                    .reference(&refname, oid, false, &message)
                    .map_err(git_error)?,
            };
            Ok(oid)
        })
        .await?;

        debug!(space = %space, commit = %oid, "committed to local repository");
        *self.last_sync.lock().unwrap_or_else(|e| e.into_inner()) = Some(Utc::now());
        Ok(CommitRef(oid.to_string()))
    }

    async fn list_semantic_files(&self, space: &SpaceRef) -> Result<Vec<String>, ProviderError> {
        let repo_path = self.repo_path(&space.name);
        let branch = space.branch.clone();
        blocking(move || {
            let repo = open(&repo_path)?;
            let mut paths = Vec::new();
            if let Some(tree) = branch_tree(&repo, &branch)? {
                tree.walk(git2::TreeWalkMode::PreOrder, |root, entry| {
                    if entry.kind() == Some(ObjectType::Blob) {
                        if let Some(name) = entry.name() {
                            paths.push(format!("{}{}", root, name));
                        }
                    }
                    git2::TreeWalkResult::Ok
                })
                .map_err(git_error)?;
            }
            paths.sort();
            Ok(paths)
        })
        .await
    }

    async fn current_head(&self, space: &SpaceRef) -> Result<Option<CommitRef>, ProviderError> {
        let repo_path = self.repo_path(&space.name);
        let refname = format!("refs/heads/{}", space.branch);
        blocking(move || {
            let repo = open(&repo_path)?;
            match repo.refname_to_id(&refname) {
                Ok(oid) => Ok(Some(CommitRef(oid.to_string()))),
                Err(e) if e.code() == ErrorCode::NotFound => Ok(None),
                Err(e) => Err(git_error(e)),
            }
        })
        .await
    }

    async fn is_available(&self) -> bool {
        let root = self.root.clone();
        tokio::task::spawn_blocking(move || root.is_dir() || std::fs::create_dir_all(&root).is_ok())
            .await
            .unwrap_or(false)
    }

    async fn get_status(&self) -> Result<ProviderStatus, ProviderError> {
        Ok(ProviderStatus {
            rate_limit: None,
            quota: None,
            last_sync: *self.last_sync.lock().unwrap_or_else(|e| e.into_inner()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    async fn provider_with_space() -> (TempDir, LocalGitProvider, SpaceRef) {
        let dir = TempDir::new().unwrap();
        let provider = LocalGitProvider::new(dir.path());
        let space = provider.create_semantic_space("personal").await.unwrap();
        (dir, provider, space)
    }

    #[tokio::test]
    async fn new_space_has_no_head() {
        let (_dir, provider, space) = provider_with_space().await;
        assert_eq!(provider.current_head(&space).await.unwrap(), None);
        assert!(provider.list_semantic_files(&space).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn commit_publishes_nested_files() {
        let (_dir, provider, space) = provider_with_space().await;
        provider
            .write_semantic_file(&space, "vocabulary/concepts/a.ttl", "A")
            .await
            .unwrap();
        provider
            .write_semantic_file(&space, "profile/webid.ttl", "W")
            .await
            .unwrap();
        let commit = provider.commit_changes(&space, "first").await.unwrap();

        assert_eq!(
            provider.current_head(&space).await.unwrap(),
            Some(commit)
        );
        assert_eq!(
            provider.list_semantic_files(&space).await.unwrap(),
            vec!["profile/webid.ttl", "vocabulary/concepts/a.ttl"]
        );
        assert_eq!(
            provider
                .read_semantic_file(&space, "vocabulary/concepts/a.ttl")
                .await
                .unwrap(),
            "A"
        );
    }

    #[tokio::test]
    async fn empty_content_deletes() {
        let (_dir, provider, space) = provider_with_space().await;
        provider.write_semantic_file(&space, "a/b.ttl", "x").await.unwrap();
        provider.write_semantic_file(&space, "c.ttl", "y").await.unwrap();
        provider.commit_changes(&space, "add").await.unwrap();

        provider.write_semantic_file(&space, "a/b.ttl", "").await.unwrap();
        provider.commit_changes(&space, "remove").await.unwrap();

        assert_eq!(
            provider.list_semantic_files(&space).await.unwrap(),
            vec!["c.ttl"]
        );
        assert!(matches!(
            provider.read_semantic_file(&space, "a/b.ttl").await,
            Err(ProviderError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn commit_without_staged_files_fails() {
        let (_dir, provider, space) = provider_with_space().await;
        assert!(matches!(
            provider.commit_changes(&space, "empty").await,
            Err(ProviderError::Write(_))
        ));
    }

    #[tokio::test]
    async fn discarded_files_never_reach_the_tree() {
        let (_dir, provider, space) = provider_with_space().await;
        provider.write_semantic_file(&space, "stale.ttl", "x").await.unwrap();
        provider.discard_staged(&space);
        assert!(matches!(
            provider.commit_changes(&space, "empty").await,
            Err(ProviderError::Write(_))
        ));

        provider.write_semantic_file(&space, "fresh.ttl", "y").await.unwrap();
        provider.commit_changes(&space, "fresh").await.unwrap();
        assert_eq!(
            provider.list_semantic_files(&space).await.unwrap(),
            vec!["fresh.ttl"]
        );
    }

    #[tokio::test]
    async fn adopting_existing_space_keeps_history() {
        let (dir, provider, space) = provider_with_space().await;
        provider.write_semantic_file(&space, "a.ttl", "x").await.unwrap();
        let commit = provider.commit_changes(&space, "add").await.unwrap();

        let again = LocalGitProvider::new(dir.path());
        let adopted = again.create_semantic_space("personal").await.unwrap();
        assert_eq!(again.current_head(&adopted).await.unwrap(), Some(commit));
    }

    #[tokio::test]
    async fn status_records_last_sync() {
        let (_dir, provider, space) = provider_with_space().await;
        assert_eq!(provider.get_status().await.unwrap().last_sync, None);
        provider.write_semantic_file(&space, "a.ttl", "x").await.unwrap();
        provider.commit_changes(&space, "add").await.unwrap();
        assert!(provider.get_status().await.unwrap().last_sync.is_some());
        assert!(provider.is_available().await);
    }
}
