//! provider::mock
//!
//! Mock provider for deterministic testing.
//!
//! # Design
//!
//! The mock keeps spaces in memory and records every operation. Tests can
//! inject failures (optionally for a bounded number of calls), latency,
//! unavailability, and commits from another writer.
//!
//! # Example
//!
//! ```
//! use redstring_pod::provider::mock::MockProvider;
//! use redstring_pod::provider::SemanticProvider;
//!
//! # tokio_test::block_on(async {
//! let provider = MockProvider::new();
//! let space = provider.create_semantic_space("personal").await.unwrap();
//!
//! provider.write_semantic_file(&space, "profile/webid.ttl", "x").await.unwrap();
//! provider.commit_changes(&space, "first").await.unwrap();
//!
//! assert_eq!(provider.commit_count("personal"), 1);
//! assert_eq!(provider.file("personal", "profile/webid.ttl").as_deref(), Some("x"));
//! # });
//! ```

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use super::traits::{
    CommitRef, Credentials, ProviderError, ProviderStatus, SemanticProvider, Session, SpaceRef,
};

/// Mock provider for testing.
///
/// Thread-safe via internal `Arc<Mutex<...>>` wrapping; clones share state.
#[derive(Debug, Clone)]
pub struct MockProvider {
    inner: Arc<Mutex<MockProviderInner>>,
    name: &'static str,
}

#[derive(Debug, Default)]
struct MockSpace {
    files: BTreeMap<String, String>,
    staged: BTreeMap<String, String>,
    commits: Vec<MockCommit>,
}

/// A commit recorded by the mock.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MockCommit {
    pub id: String,
    pub message: String,
    /// Paths touched by the commit
    pub paths: Vec<String>,
}

#[derive(Debug, Default)]
struct MockProviderInner {
    spaces: HashMap<String, MockSpace>,
    /// Failure to inject and how many more calls it applies to
    fail_on: Option<(FailOn, Option<u32>)>,
    latency: Option<Duration>,
    unavailable: bool,
    next_commit: u64,
    last_sync: Option<DateTime<Utc>>,
    operations: Vec<MockOperation>,
}

/// Which operation should fail, and with what.
#[derive(Debug, Clone)]
pub enum FailOn {
    Authenticate(ProviderError),
    CreateSpace(ProviderError),
    Write(ProviderError),
    Read(ProviderError),
    Commit(ProviderError),
    List(ProviderError),
    Head(ProviderError),
    Status(ProviderError),
}

impl FailOn {
    fn error_for(&self, op: &MockOperation) -> Option<ProviderError> {
        match (self, op) {
            (FailOn::Authenticate(e), MockOperation::Authenticate)
            | (FailOn::CreateSpace(e), MockOperation::CreateSpace { .. })
            | (FailOn::Write(e), MockOperation::Write { .. })
            | (FailOn::Read(e), MockOperation::Read { .. })
            | (FailOn::Commit(e), MockOperation::Commit { .. })
            | (FailOn::List(e), MockOperation::List { .. })
            | (FailOn::Head(e), MockOperation::Head { .. })
            | (FailOn::Status(e), MockOperation::Status) => Some(e.clone()),
            _ => None,
        }
    }
}

/// Recorded operation for test verification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MockOperation {
    Authenticate,
    CreateSpace { name: String },
    Write { space: String, path: String },
    Read { space: String, path: String },
    Commit { space: String, message: String },
    List { space: String },
    Head { space: String },
    Status,
}

impl Default for MockProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl MockProvider {
    /// Create an empty mock provider named "mock".
    pub fn new() -> Self {
        Self::named("mock")
    }

    /// Create an empty mock provider reporting `name`.
    pub fn named(name: &'static str) -> Self {
        Self {
            inner: Arc::new(Mutex::new(MockProviderInner::default())),
            name,
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MockProviderInner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Fail every matching operation until cleared.
    pub fn fail_on(&self, fail: FailOn) {
        self.lock().fail_on = Some((fail, None));
    }

    /// Fail the next `times` matching operations.
    pub fn fail_times(&self, fail: FailOn, times: u32) {
        self.lock().fail_on = Some((fail, Some(times)));
    }

    /// Clear any injected failure.
    pub fn clear_failure(&self) {
        self.lock().fail_on = None;
    }

    /// Delay every operation by `latency`.
    pub fn set_latency(&self, latency: Option<Duration>) {
        self.lock().latency = latency;
    }

    /// Toggle the liveness probe result.
    ///
    /// While unavailable every operation fails with `Unavailable`.
    pub fn set_available(&self, available: bool) {
        self.lock().unavailable = !available;
    }

    /// Simulate another writer committing `files` to a space.
    pub fn inject_remote_commit(&self, space: &str, files: &[(&str, &str)]) -> CommitRef {
        let mut inner = self.lock();
        inner.next_commit += 1;
        let id = format!("remote-{:04}", inner.next_commit);
        let space = inner.spaces.entry(space.to_string()).or_default();
        for (path, content) in files {
            if content.is_empty() {
                space.files.remove(*path);
            } else {
                space.files.insert(path.to_string(), content.to_string());
            }
        }
        space.commits.push(MockCommit {
            id: id.clone(),
            message: "remote change".to_string(),
            paths: files.iter().map(|(p, _)| p.to_string()).collect(),
        });
        CommitRef(id)
    }

    /// Current content of a committed file.
    pub fn file(&self, space: &str, path: &str) -> Option<String> {
        self.lock()
            .spaces
            .get(space)
            .and_then(|s| s.files.get(path).cloned())
    }

    /// Every committed file of a space.
    pub fn files(&self, space: &str) -> BTreeMap<String, String> {
        self.lock()
            .spaces
            .get(space)
            .map(|s| s.files.clone())
            .unwrap_or_default()
    }

    /// Commits recorded for a space, oldest first.
    pub fn commits(&self, space: &str) -> Vec<MockCommit> {
        self.lock()
            .spaces
            .get(space)
            .map(|s| s.commits.clone())
            .unwrap_or_default()
    }

    pub fn commit_count(&self, space: &str) -> usize {
        self.commits(space).len()
    }

    /// Every operation performed so far.
    pub fn operations(&self) -> Vec<MockOperation> {
        self.lock().operations.clone()
    }

    /// Record `op`, apply latency, and return any injected failure.
    async fn enter(&self, op: MockOperation) -> Result<(), ProviderError> {
        let latency = {
            let mut inner = self.lock();
            inner.operations.push(op.clone());
            inner.latency
        };
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }

        let mut inner = self.lock();
        if inner.unavailable {
            return Err(ProviderError::Unavailable("mock provider offline".into()));
        }
        let Some(err) = inner.fail_on.as_ref().and_then(|(fail, _)| fail.error_for(&op)) else {
            return Ok(());
        };
        let remaining = inner.fail_on.as_ref().and_then(|(_, times)| *times);
        match remaining {
            None => Err(err),
            Some(0) => {
                inner.fail_on = None;
                Ok(())
            }
            Some(1) => {
                inner.fail_on = None;
                Err(err)
            }
            Some(n) => {
                if let Some((_, times)) = inner.fail_on.as_mut() {
                    *times = Some(n - 1);
                }
                Err(err)
            }
        }
    }
}

#[async_trait]
impl SemanticProvider for MockProvider {
    fn name(&self) -> &'static str {
        self.name
    }

    async fn authenticate(&self, credentials: &Credentials) -> Result<Session, ProviderError> {
        self.enter(MockOperation::Authenticate).await?;
        Ok(Session {
            provider: self.name.to_string(),
            user: credentials.secret().map(|_| "mock-user".to_string()),
            authenticated_at: Utc::now(),
        })
    }

    async fn create_semantic_space(&self, name: &str) -> Result<SpaceRef, ProviderError> {
        self.enter(MockOperation::CreateSpace {
            name: name.to_string(),
        })
        .await?;
        self.lock().spaces.entry(name.to_string()).or_default();
        Ok(SpaceRef {
            owner: "mock".to_string(),
            name: name.to_string(),
            branch: "main".to_string(),
        })
    }

    async fn write_semantic_file(
        &self,
        space: &SpaceRef,
        path: &str,
        content: &str,
    ) -> Result<CommitRef, ProviderError> {
        self.enter(MockOperation::Write {
            space: space.name.clone(),
            path: path.to_string(),
        })
        .await?;
        let mut inner = self.lock();
        let state = inner
            .spaces
            .get_mut(&space.name)
            .ok_or_else(|| ProviderError::NotFound(space.name.clone()))?;
        state.staged.insert(path.to_string(), content.to_string());
        Ok(CommitRef(format!("staged:{}", path)))
    }

    async fn read_semantic_file(
        &self,
        space: &SpaceRef,
        path: &str,
    ) -> Result<String, ProviderError> {
        self.enter(MockOperation::Read {
            space: space.name.clone(),
            path: path.to_string(),
        })
        .await?;
        self.lock()
            .spaces
            .get(&space.name)
            .and_then(|s| s.files.get(path).cloned())
            .ok_or_else(|| ProviderError::NotFound(path.to_string()))
    }

    fn discard_staged(&self, space: &SpaceRef) {
        if let Some(state) = self.lock().spaces.get_mut(&space.name) {
            state.staged.clear();
        }
    }

    async fn commit_changes(
        &self,
        space: &SpaceRef,
        message: &str,
    ) -> Result<CommitRef, ProviderError> {
        let op = MockOperation::Commit {
            space: space.name.clone(),
            message: message.to_string(),
        };
        if let Err(err) = self.enter(op).await {
            // A failed commit still consumes the staged set
            if let Some(state) = self.lock().spaces.get_mut(&space.name) {
                state.staged.clear();
            }
            return Err(err);
        }

        let mut inner = self.lock();
        inner.next_commit += 1;
        let id = format!("commit-{:04}", inner.next_commit);
        let state = inner
            .spaces
            .get_mut(&space.name)
            .ok_or_else(|| ProviderError::NotFound(space.name.clone()))?;
        let staged = std::mem::take(&mut state.staged);
        if staged.is_empty() {
            return Err(ProviderError::Write("nothing staged".into()));
        }
        let paths = staged.keys().cloned().collect();
        for (path, content) in staged {
            if content.is_empty() {
                state.files.remove(&path);
            } else {
                state.files.insert(path, content);
            }
        }
        state.commits.push(MockCommit {
            id: id.clone(),
            message: message.to_string(),
            paths,
        });
        inner.last_sync = Some(Utc::now());
        Ok(CommitRef(id))
    }

    async fn list_semantic_files(&self, space: &SpaceRef) -> Result<Vec<String>, ProviderError> {
        self.enter(MockOperation::List {
            space: space.name.clone(),
        })
        .await?;
        let inner = self.lock();
        let state = inner
            .spaces
            .get(&space.name)
            .ok_or_else(|| ProviderError::NotFound(space.name.clone()))?;
        Ok(state.files.keys().cloned().collect())
    }

    async fn current_head(&self, space: &SpaceRef) -> Result<Option<CommitRef>, ProviderError> {
        self.enter(MockOperation::Head {
            space: space.name.clone(),
        })
        .await?;
        let inner = self.lock();
        let state = inner
            .spaces
            .get(&space.name)
            .ok_or_else(|| ProviderError::NotFound(space.name.clone()))?;
        Ok(state.commits.last().map(|c| CommitRef(c.id.clone())))
    }

    async fn is_available(&self) -> bool {
        !self.lock().unavailable
    }

    async fn get_status(&self) -> Result<ProviderStatus, ProviderError> {
        self.enter(MockOperation::Status).await?;
        Ok(ProviderStatus {
            rate_limit: None,
            quota: None,
            last_sync: self.lock().last_sync,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn space(provider: &MockProvider) -> SpaceRef {
        provider.create_semantic_space("personal").await.unwrap()
    }

    #[tokio::test]
    async fn staged_files_invisible_until_commit() {
        let provider = MockProvider::new();
        let space = space(&provider).await;
        provider.write_semantic_file(&space, "a.ttl", "x").await.unwrap();

        assert!(provider.list_semantic_files(&space).await.unwrap().is_empty());
        assert_eq!(provider.current_head(&space).await.unwrap(), None);

        let commit = provider.commit_changes(&space, "add a").await.unwrap();
        assert_eq!(provider.current_head(&space).await.unwrap(), Some(commit));
        assert_eq!(provider.read_semantic_file(&space, "a.ttl").await.unwrap(), "x");
    }

    #[tokio::test]
    async fn fail_times_expires() {
        let provider = MockProvider::new();
        let space = space(&provider).await;
        provider.fail_times(FailOn::Commit(ProviderError::Unavailable("down".into())), 2);

        for _ in 0..2 {
            provider.write_semantic_file(&space, "a.ttl", "x").await.unwrap();
            assert!(provider.commit_changes(&space, "try").await.is_err());
        }
        provider.write_semantic_file(&space, "a.ttl", "x").await.unwrap();
        assert!(provider.commit_changes(&space, "try").await.is_ok());
        assert_eq!(provider.commit_count("personal"), 1);
    }

    #[tokio::test]
    async fn failed_commit_drops_staged_files() {
        let provider = MockProvider::new();
        let space = space(&provider).await;
        provider.fail_times(FailOn::Commit(ProviderError::RateLimited), 1);
        provider.write_semantic_file(&space, "a.ttl", "x").await.unwrap();
        assert!(provider.commit_changes(&space, "try").await.is_err());

        assert!(matches!(
            provider.commit_changes(&space, "again").await,
            Err(ProviderError::Write(_))
        ));
    }

    #[tokio::test]
    async fn discarded_files_are_not_committed() {
        let provider = MockProvider::new();
        let space = space(&provider).await;
        provider.write_semantic_file(&space, "a.ttl", "x").await.unwrap();
        provider.discard_staged(&space);
        provider.write_semantic_file(&space, "b.ttl", "y").await.unwrap();
        provider.commit_changes(&space, "only b").await.unwrap();

        assert!(provider.file("personal", "a.ttl").is_none());
        assert_eq!(provider.commits("personal")[0].paths, vec!["b.ttl".to_string()]);
    }

    #[tokio::test]
    async fn unavailable_fails_everything() {
        let provider = MockProvider::new();
        let space = space(&provider).await;
        provider.set_available(false);

        assert!(!provider.is_available().await);
        assert!(matches!(
            provider.list_semantic_files(&space).await,
            Err(ProviderError::Unavailable(_))
        ));
    }

    #[tokio::test]
    async fn remote_commit_moves_head() {
        let provider = MockProvider::new();
        let space = space(&provider).await;
        let remote = provider.inject_remote_commit("personal", &[("b.ttl", "remote")]);

        assert_eq!(provider.current_head(&space).await.unwrap(), Some(remote));
        assert_eq!(provider.file("personal", "b.ttl").as_deref(), Some("remote"));
    }

    #[tokio::test]
    async fn records_operations() {
        let provider = MockProvider::new();
        let space = space(&provider).await;
        provider.write_semantic_file(&space, "a.ttl", "x").await.unwrap();

        assert_eq!(
            provider.operations(),
            vec![
                MockOperation::CreateSpace {
                    name: "personal".into()
                },
                MockOperation::Write {
                    space: "personal".into(),
                    path: "a.ttl".into()
                },
            ]
        );
    }
}
