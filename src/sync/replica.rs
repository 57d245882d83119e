//! sync::replica
//!
//! Per-provider sync state and the attempt loop.
//!
//! # Design
//!
//! A replica remembers the head it last wrote or read (`base_head`), the
//! files at that head, and the graph they encode. An attempt compares the
//! provider's current head with `base_head`; on divergence it reads the
//! remote files and merges them three-way before writing. Only the paths
//! that differ from the remote are written, deletions as empty tombstones.
//!
//! Attempts against one replica are serialized by its state lock. An
//! attempt for a sequence the replica already persisted is superseded and
//! does nothing. Every attempt starts from an empty staged set, and a
//! failed or timed-out attempt drops whatever it staged.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde::Serialize;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use super::engine::{SyncError, SyncEvent};
use super::merge::{merge_graphs, MergeError};
use super::retry::RetryPolicy;
use crate::core::config::ProviderRole;
use crate::graph::Graph;
use crate::layout::{self, FileMap, LayoutError};
use crate::provider::{CommitRef, ProviderError, SemanticProvider, SpaceRef};
use crate::sync::connection::ProviderConnection;

/// What a replica knows about its remote.
#[derive(Debug, Default)]
struct ReplicaState {
    base_head: Option<CommitRef>,
    base_files: FileMap,
    base_graph: Option<Arc<Graph>>,
    persisted_seq: u64,
}

/// Observable replica state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReplicaStatus {
    pub id: String,
    pub kind: String,
    pub role: ProviderRole,
    pub space: String,
    pub persisted_seq: u64,
    pub head: Option<CommitRef>,
    /// Paths not yet written, with the sequence that first changed them
    pub pending: BTreeMap<String, u64>,
    pub last_error: Option<String>,
}

/// Result of a successful attempt.
#[derive(Debug)]
pub enum AttemptOutcome {
    Synced {
        commit: Option<CommitRef>,
        /// The merge result, when the remote had changes of its own
        merged: Option<Graph>,
    },
    Superseded,
}

enum AttemptError {
    Provider(ProviderError),
    Merge(String),
}

impl From<ProviderError> for AttemptError {
    fn from(err: ProviderError) -> Self {
        AttemptError::Provider(err)
    }
}

impl From<MergeError> for AttemptError {
    fn from(err: MergeError) -> Self {
        AttemptError::Merge(err.to_string())
    }
}

impl From<LayoutError> for AttemptError {
    fn from(err: LayoutError) -> Self {
        AttemptError::Merge(format!("remote files do not parse: {}", err))
    }
}

/// One provider connection as the engine tracks it.
pub struct Replica {
    id: String,
    provider: Arc<dyn SemanticProvider>,
    space: SpaceRef,
    role: Mutex<ProviderRole>,
    state: tokio::sync::Mutex<ReplicaState>,
    status: Mutex<ReplicaStatus>,
}

impl std::fmt::Debug for Replica {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Replica")
            .field("id", &self.id)
            .field("provider", &self.provider.name())
            .field("space", &self.space)
            .finish()
    }
}

impl Replica {
    pub fn new(conn: ProviderConnection) -> Self {
        let status = ReplicaStatus {
            id: conn.id.clone(),
            kind: conn.provider.name().to_string(),
            role: conn.role,
            space: conn.space.to_string(),
            persisted_seq: 0,
            head: None,
            pending: BTreeMap::new(),
            last_error: None,
        };
        Self {
            id: conn.id,
            provider: conn.provider,
            space: conn.space,
            role: Mutex::new(conn.role),
            state: tokio::sync::Mutex::new(ReplicaState::default()),
            status: Mutex::new(status),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn provider(&self) -> &Arc<dyn SemanticProvider> {
        &self.provider
    }

    pub fn space(&self) -> &SpaceRef {
        &self.space
    }

    pub fn role(&self) -> ProviderRole {
        *self.role.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn set_role(&self, role: ProviderRole) {
        *self.role.lock().unwrap_or_else(|e| e.into_inner()) = role;
        self.status_mut().role = role;
    }

    pub fn is_flush_target(&self) -> bool {
        self.role() != ProviderRole::Standby
    }

    pub fn status(&self) -> ReplicaStatus {
        self.status_mut().clone()
    }

    fn status_mut(&self) -> std::sync::MutexGuard<'_, ReplicaStatus> {
        self.status.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Record that the remote holds `files` at `head`, encoding `graph`
    /// as of sequence `seq`.
    pub async fn seed(&self, seq: u64, head: Option<CommitRef>, files: FileMap, graph: Arc<Graph>) {
        let mut state = self.state.lock().await;
        state.base_head = head.clone();
        state.base_files = files;
        state.base_graph = Some(graph);
        state.persisted_seq = seq;
        let mut status = self.status_mut();
        status.head = head;
        status.persisted_seq = seq;
    }

    /// Read every file and the head from the remote.
    pub async fn fetch(&self) -> Result<(Option<CommitRef>, FileMap), ProviderError> {
        let head = self.provider.current_head(&self.space).await?;
        let files = self.provider.read_all_files(&self.space).await?;
        Ok((head, files))
    }

    /// Bring the remote to `snapshot`, retrying per `policy`.
    pub(crate) async fn sync(
        &self,
        seq: u64,
        snapshot: Arc<Graph>,
        timeout: Duration,
        policy: RetryPolicy,
        events: &broadcast::Sender<SyncEvent>,
    ) -> Result<AttemptOutcome, SyncError> {
        let mut failures = 0u32;
        let mut conflicts = 0u32;
        loop {
            let result = match tokio::time::timeout(timeout, self.attempt(seq, &snapshot)).await {
                Ok(result) => result,
                Err(_) => Err(AttemptError::Provider(ProviderError::Unavailable(format!(
                    "timed out after {}ms",
                    timeout.as_millis()
                )))),
            };

            let err = match result {
                Ok(outcome) => {
                    self.status_mut().last_error = None;
                    return Ok(outcome);
                }
                Err(err) => err,
            };
            self.provider.discard_staged(&self.space);

            match err {
                AttemptError::Provider(ProviderError::Conflict(reason))
                | AttemptError::Merge(reason) => {
                    conflicts += 1;
                    self.status_mut().last_error = Some(reason.clone());
                    if conflicts > 1 {
                        warn!(provider = %self.id, seq, reason = %reason, "unresolved conflict");
                        return Err(SyncError::UnresolvedConflict {
                            provider: self.id.clone(),
                            reason,
                        });
                    }
                    debug!(provider = %self.id, seq, reason = %reason, "conflict, re-fetching head");
                }
                AttemptError::Provider(err) if err.is_transient() && policy.allows(failures + 1) => {
                    failures += 1;
                    let delay = policy.delay(failures);
                    warn!(provider = %self.id, seq, attempt = failures, error = %err, ?delay, "sync attempt failed, retrying");
                    self.status_mut().last_error = Some(err.to_string());
                    let _ = events.send(SyncEvent::ReplicaFailed {
                        provider: self.id.clone(),
                        seq,
                        error: err.to_string(),
                        will_retry: true,
                    });
                    tokio::time::sleep(delay).await;
                }
                AttemptError::Provider(err) => {
                    self.status_mut().last_error = Some(err.to_string());
                    return Err(SyncError::Provider {
                        provider: self.id.clone(),
                        source: err,
                    });
                }
            }
        }
    }

    async fn attempt(&self, seq: u64, snapshot: &Arc<Graph>) -> Result<AttemptOutcome, AttemptError> {
        let mut state = self.state.lock().await;
        if state.persisted_seq >= seq && state.base_graph.is_some() {
            debug!(provider = %self.id, seq, persisted = state.persisted_seq, "flush superseded");
            return Ok(AttemptOutcome::Superseded);
        }
        self.provider.discard_staged(&self.space);

        let head = self.provider.current_head(&self.space).await?;
        let mut target = Arc::clone(snapshot);
        let mut merged = None;
        let mut remote_files = state.base_files.clone();

        if head != state.base_head {
            remote_files = self.provider.read_all_files(&self.space).await?;
            remote_files.retain(|_, content| !content.is_empty());
            if !remote_files.is_empty() {
                let theirs = layout::parse(&remote_files)?;
                let result = merge_graphs(state.base_graph.as_deref(), snapshot, &theirs)?;
                info!(provider = %self.id, seq, head = ?head, "merged remote changes");
                if result != **snapshot {
                    merged = Some(result.clone());
                }
                target = Arc::new(result);
            }
        }

        let files = layout::serialize(&target);
        let changes = layout::diff(&remote_files, &files);
        {
            let mut status = self.status_mut();
            for path in changes.keys() {
                status.pending.entry(path.clone()).or_insert(seq);
            }
        }

        let commit = if changes.is_empty() {
            head
        } else {
            for (path, content) in &changes {
                self.provider
                    .write_semantic_file(&self.space, path, content)
                    .await?;
            }
            let message = format!("redstring: sync #{} ({} files)", seq, changes.len());
            Some(self.provider.commit_changes(&self.space, &message).await?)
        };

        debug!(provider = %self.id, seq, files = changes.len(), commit = ?commit, "replica synced");
        state.base_head = commit.clone();
        state.base_files = files;
        state.base_graph = Some(target);
        state.persisted_seq = seq;

        let mut status = self.status_mut();
        status.persisted_seq = seq;
        status.head = commit.clone();
        status.pending.clear();
        Ok(AttemptOutcome::Synced { commit, merged })
    }
}
