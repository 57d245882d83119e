//! sync::engine
//!
//! The synchronization engine: instant local edits, debounced durable
//! flushes to every configured provider.
//!
//! # Architecture
//!
//! ```text
//! apply() ──► Arc<Graph> swap ──► ChangeLog ──► trigger channel
//!                                                    │
//!                                      worker: debounce / size / explicit
//!                                                    │
//!                                               flush(seq)
//!                                     ┌──────────────┼──────────────┐
//!                                 replica A      replica B      replica C
//!                                     └──── quorum acks ─┘   (keeps retrying)
//! ```
//!
//! Edits never wait on the network. `apply` validates the mutation
//! against a copy of the current graph, swaps the copy in, logs the
//! mutation and nudges the worker. Readers hold `Arc<Graph>` snapshots
//! that later edits never touch.
//!
//! The worker coalesces triggers: a flush fires when the debounce window
//! after the last edit closes, when the oldest unflushed edit reaches the
//! maximum flush delay, when the change log reaches its size threshold,
//! or on request. One flush runs at a time. It fans out to every flush
//! target in parallel and returns once `quorum` of them acknowledge; the
//! rest keep retrying in the background and record their outcome when
//! they finish.
//!
//! # Example
//!
//! ```ignore
//! use redstring_pod::sync::{Mutation, SyncEngine, SyncOptions};
//!
//! let engine = SyncEngine::from_config(&config).await?;
//! engine.apply(Mutation::AddConcept { name: "Climate Policy".into() })?;
//! let report = engine.flush().await?;
//! println!("flush #{} acknowledged by {:?}", report.seq, report.acknowledged);
//! engine.shutdown().await?;
//! ```

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;

use serde::Serialize;
use thiserror::Error;
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use super::changelog::{ChangeLog, Mutation};
use super::connection::ProviderConnection;
use super::history::{SyncHistory, SyncRecord};
use super::merge::{canonical_triples, merge_graphs};
use super::replica::{AttemptOutcome, Replica, ReplicaStatus};
use super::retry::RetryPolicy;
use crate::core::config::{Config, ProviderRole};
use crate::core::Domain;
use crate::graph::{Graph, GraphError};
use crate::layout;
use crate::provider::{CommitRef, ProviderError};

/// Errors from synchronization.
#[derive(Debug, Clone, Error)]
pub enum SyncError {
    /// A divergence could not be merged, even after re-fetching.
    #[error("unresolved conflict on {provider}: {reason}")]
    UnresolvedConflict { provider: String, reason: String },

    /// Too few providers acknowledged a flush.
    #[error("flush #{seq} reached {acknowledged} of {required} required acknowledgements")]
    QuorumNotReached {
        seq: u64,
        acknowledged: usize,
        required: usize,
        failures: Vec<(String, String)>,
    },

    /// A provider failed permanently or exhausted its retries.
    #[error("provider {provider}: {source}")]
    Provider {
        provider: String,
        source: ProviderError,
    },

    /// Provider files could not be read as a graph.
    #[error("layout error: {0}")]
    Layout(String),

    #[error(transparent)]
    Graph(#[from] GraphError),

    #[error("migration failed: {0}")]
    Migration(String),

    /// The engine's worker is gone.
    #[error("sync engine stopped")]
    Stopped,
}

/// Things subscribers hear about, including every asynchronous failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum SyncEvent {
    /// A flush reached quorum
    FlushCompleted {
        seq: u64,
        acknowledged: Vec<String>,
    },
    ReplicaSynced {
        provider: String,
        seq: u64,
        commit: Option<CommitRef>,
    },
    ReplicaFailed {
        provider: String,
        seq: u64,
        error: String,
        will_retry: bool,
    },
    ConflictUnresolved {
        provider: String,
        seq: u64,
        reason: String,
    },
    /// Remote changes were merged into the local graph
    RemoteMerged { provider: String, seq: u64 },
    /// A connection was removed after its credentials were rejected
    ReplicaDisconnected { provider: String, reason: String },
}

/// Outcome of a flush that reached quorum.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FlushReport {
    pub seq: u64,
    /// Providers holding `seq`, in acknowledgement order
    pub acknowledged: Vec<String>,
    /// Providers still working on `seq` in the background
    pub pending: Vec<String>,
}

/// Result of [`SyncEngine::apply`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Applied {
    pub seq: u64,
    /// Id of the entity created or touched
    pub id: Option<String>,
}

/// Result of [`SyncEngine::migrate`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MigrationReport {
    pub from: String,
    pub to: String,
    pub head: Option<CommitRef>,
}

/// Engine tuning.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncOptions {
    pub debounce: Duration,
    pub max_flush_delay: Duration,
    pub max_pending_changes: usize,
    pub quorum: usize,
    pub provider_timeout: Duration,
    pub retry: RetryPolicy,
}

impl Default for SyncOptions {
    fn default() -> Self {
        Self {
            debounce: Duration::from_secs(1),
            max_flush_delay: Duration::from_secs(5),
            max_pending_changes: 256,
            quorum: 1,
            provider_timeout: Duration::from_secs(15),
            retry: RetryPolicy::default(),
        }
    }
}

impl SyncOptions {
    pub fn from_config(config: &Config) -> Self {
        Self {
            debounce: config.debounce(),
            max_flush_delay: config.max_flush_delay(),
            max_pending_changes: config.max_pending_changes(),
            quorum: config.quorum(),
            provider_timeout: config.provider_timeout(),
            retry: RetryPolicy::from_config(config),
        }
    }
}

type FlushResult = Result<FlushReport, SyncError>;

enum Trigger {
    Edit,
    Flush(oneshot::Sender<FlushResult>),
    Shutdown(oneshot::Sender<FlushResult>),
}

struct Shared {
    graph: RwLock<Arc<Graph>>,
    log: Mutex<ChangeLog>,
    replicas: RwLock<Vec<Arc<Replica>>>,
    history: Mutex<SyncHistory>,
    events: broadcast::Sender<SyncEvent>,
    trigger: mpsc::UnboundedSender<Trigger>,
    options: SyncOptions,
    flush_lock: tokio::sync::Mutex<()>,
    durable_seq: AtomicU64,
}

/// Local-first graph with background multi-provider persistence.
pub struct SyncEngine {
    shared: Arc<Shared>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl std::fmt::Debug for SyncEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncEngine")
            .field("last_seq", &self.last_seq())
            .field("durable_seq", &self.durable_seq())
            .field("replicas", &self.shared.replicas().len())
            .finish()
    }
}

impl SyncEngine {
    /// Start an engine over `graph`. Must be called within a Tokio runtime.
    pub fn new(
        graph: Graph,
        connections: Vec<ProviderConnection>,
        options: SyncOptions,
        history: SyncHistory,
    ) -> Self {
        let replicas = connections
            .into_iter()
            .map(|c| Arc::new(Replica::new(c)))
            .collect();
        Self::start(graph, replicas, options, history)
    }

    /// Start an engine over the graph stored at the primary provider.
    ///
    /// An empty primary, or no provider at all, starts an empty graph
    /// owned by `owner`.
    pub async fn load(
        owner: Domain,
        space: &str,
        connections: Vec<ProviderConnection>,
        options: SyncOptions,
        history: SyncHistory,
    ) -> Result<Self, SyncError> {
        let replicas: Vec<Arc<Replica>> = connections
            .into_iter()
            .map(|c| Arc::new(Replica::new(c)))
            .collect();
        let primary = replicas
            .iter()
            .find(|r| r.role() == ProviderRole::Primary)
            .or_else(|| replicas.iter().find(|r| r.is_flush_target()));

        let mut graph = None;
        if let Some(primary) = primary {
            let (head, mut files) = primary.fetch().await.map_err(|source| SyncError::Provider {
                provider: primary.id().to_string(),
                source,
            })?;
            files.retain(|_, content| !content.is_empty());
            if !files.is_empty() {
                let loaded = layout::parse(&files).map_err(|e| SyncError::Layout(e.to_string()))?;
                info!(provider = %primary.id(), files = files.len(), entities = loaded.len(), "loaded graph");
                primary.seed(0, head, files, Arc::new(loaded.clone())).await;
                graph = Some(loaded);
            }
        }
        let graph = match graph {
            Some(graph) => graph,
            None => Graph::new(owner, space)?,
        };
        Ok(Self::start(graph, replicas, options, history))
    }

    /// Connect every configured provider and load the pod.
    ///
    /// The primary must connect; replicas that fail to connect are skipped
    /// with a warning.
    pub async fn from_config(config: &Config) -> Result<Self, SyncError> {
        let owner = config
            .domain()
            .ok_or_else(|| SyncError::Layout("no identity.domain configured".into()))?;
        let space = config.space().to_string();

        let mut connections = Vec::new();
        for provider in config.providers() {
            match ProviderConnection::from_config(provider, &space, config.provider_timeout()).await
            {
                Ok(conn) => connections.push(conn),
                Err(source) if provider.role == ProviderRole::Primary => {
                    return Err(SyncError::Provider {
                        provider: provider.id.clone(),
                        source,
                    });
                }
                Err(e) => warn!(provider = %provider.id, error = %e, "skipping provider"),
            }
        }

        let history = match config.state_dir() {
            Some(dir) => SyncHistory::open(&dir).unwrap_or_else(|e| {
                warn!(dir = %dir.display(), error = %e, "sync history not persisted");
                SyncHistory::in_memory()
            }),
            None => SyncHistory::in_memory(),
        };
        Self::load(owner, &space, connections, SyncOptions::from_config(config), history).await
    }

    fn start(
        graph: Graph,
        replicas: Vec<Arc<Replica>>,
        options: SyncOptions,
        history: SyncHistory,
    ) -> Self {
        let (trigger, rx) = mpsc::unbounded_channel();
        let (events, _) = broadcast::channel(256);
        let shared = Arc::new(Shared {
            graph: RwLock::new(Arc::new(graph)),
            log: Mutex::new(ChangeLog::new()),
            replicas: RwLock::new(replicas),
            history: Mutex::new(history),
            events,
            trigger,
            options,
            flush_lock: tokio::sync::Mutex::new(()),
            durable_seq: AtomicU64::new(0),
        });
        let worker = tokio::spawn(run(Arc::clone(&shared), rx));
        Self {
            shared,
            worker: Mutex::new(Some(worker)),
        }
    }

    // =========================================================================
    // Local edits
    // =========================================================================

    /// Apply a mutation to the local graph.
    ///
    /// Visible to readers on return. Never touches the network; provider
    /// failures surface through [`subscribe`](Self::subscribe) instead.
    pub fn apply(&self, mutation: Mutation) -> Result<Applied, GraphError> {
        let mut log = self.shared.lock_log();
        let mut next = (*self.shared.snapshot()).clone();
        let id = mutation.apply(&mut next)?;
        self.shared.swap(next);
        debug!(op = mutation.name(), id = ?id, "applied");
        let seq = log.append(mutation);
        drop(log);
        let _ = self.shared.trigger.send(Trigger::Edit);
        Ok(Applied { seq, id })
    }

    /// The current graph. Later edits do not affect the returned snapshot.
    pub fn snapshot(&self) -> Arc<Graph> {
        self.shared.snapshot()
    }

    /// Sequence number of the newest edit.
    pub fn last_seq(&self) -> u64 {
        self.shared.lock_log().last_seq()
    }

    /// Highest sequence that reached quorum.
    pub fn durable_seq(&self) -> u64 {
        self.shared.durable_seq.load(Ordering::SeqCst)
    }

    /// Edits not yet durable.
    pub fn pending_changes(&self) -> usize {
        self.shared.pending_changes()
    }

    // =========================================================================
    // Persistence
    // =========================================================================

    /// Flush now and wait for quorum.
    pub async fn flush(&self) -> Result<FlushReport, SyncError> {
        let (tx, rx) = oneshot::channel();
        self.shared
            .trigger
            .send(Trigger::Flush(tx))
            .map_err(|_| SyncError::Stopped)?;
        rx.await.map_err(|_| SyncError::Stopped)?
    }

    /// Final flush, then stop the worker.
    pub async fn shutdown(&self) -> Result<FlushReport, SyncError> {
        let (tx, rx) = oneshot::channel();
        self.shared
            .trigger
            .send(Trigger::Shutdown(tx))
            .map_err(|_| SyncError::Stopped)?;
        let result = rx.await.map_err(|_| SyncError::Stopped)?;
        let worker = self.worker.lock().unwrap_or_else(|e| e.into_inner()).take();
        if let Some(worker) = worker {
            let _ = worker.await;
        }
        result
    }

    /// Events from flushes and background retries.
    pub fn subscribe(&self) -> broadcast::Receiver<SyncEvent> {
        self.shared.events.subscribe()
    }

    /// Every sync record so far, oldest first.
    pub fn history(&self) -> Vec<SyncRecord> {
        self.shared.lock_history().records().to_vec()
    }

    // =========================================================================
    // Connections
    // =========================================================================

    pub fn status(&self) -> Vec<ReplicaStatus> {
        self.shared.replicas().iter().map(|r| r.status()).collect()
    }

    /// Id of the primary connection.
    pub fn primary(&self) -> Option<String> {
        self.shared
            .replicas()
            .iter()
            .find(|r| r.role() == ProviderRole::Primary)
            .map(|r| r.id().to_string())
    }

    /// Add a connection. It catches up on the next flush.
    pub fn connect(&self, connection: ProviderConnection) {
        info!(provider = %connection.id, role = ?connection.role, "connection added");
        self.shared
            .replicas
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .push(Arc::new(Replica::new(connection)));
        let _ = self.shared.trigger.send(Trigger::Edit);
    }

    /// Remove a connection. Its remote data is left untouched.
    pub fn disconnect(&self, id: &str) -> bool {
        let removed = self.shared.remove_replica(id);
        if removed {
            info!(provider = %id, "connection removed");
        }
        removed
    }

    /// Move the space to the connection `to` and make it primary.
    ///
    /// Pending edits are flushed first. The graph is exported from the
    /// current primary, imported at `to`, and read back; only when the
    /// read-back matches is `to` promoted. The old primary becomes a
    /// standby and keeps its data.
    pub async fn migrate(&self, to: &str) -> Result<MigrationReport, SyncError> {
        let replicas = self.shared.replicas();
        let source = replicas
            .iter()
            .find(|r| r.role() == ProviderRole::Primary)
            .cloned()
            .ok_or_else(|| SyncError::Migration("no primary connection".into()))?;
        let destination = replicas
            .iter()
            .find(|r| r.id() == to)
            .cloned()
            .ok_or_else(|| SyncError::Migration(format!("unknown connection '{}'", to)))?;
        if source.id() == destination.id() {
            return Err(SyncError::Migration(format!("'{}' is already primary", to)));
        }

        if self.pending_changes() > 0 {
            self.flush().await?;
        }

        let migration = |e: ProviderError| SyncError::Migration(e.to_string());
        let exported = source
            .provider()
            .export_full_graph(source.space())
            .await
            .map_err(migration)?;
        let expected = layout::import_all(&exported)
            .map_err(|e| SyncError::Migration(format!("export unreadable: {}", e)))?;

        destination
            .provider()
            .import_full_graph(destination.space(), &exported)
            .await
            .map_err(migration)?;

        let (head, mut files) = destination.fetch().await.map_err(migration)?;
        files.retain(|_, content| !content.is_empty());
        let stored = layout::parse(&files)
            .map_err(|e| SyncError::Migration(format!("imported files unreadable: {}", e)))?;
        if canonical_triples(&stored) != canonical_triples(&expected) {
            return Err(SyncError::Migration(format!(
                "'{}' does not hold the exported graph",
                to
            )));
        }

        destination
            .seed(self.durable_seq(), head.clone(), files, Arc::new(stored))
            .await;
        {
            let _log = self.shared.lock_log();
            destination.set_role(ProviderRole::Primary);
            source.set_role(ProviderRole::Standby);
        }
        info!(from = %source.id(), to = %destination.id(), head = ?head, "migrated primary");

        Ok(MigrationReport {
            from: source.id().to_string(),
            to: destination.id().to_string(),
            head,
        })
    }
}

impl Drop for SyncEngine {
    fn drop(&mut self) {
        if let Some(worker) = self.worker.lock().unwrap_or_else(|e| e.into_inner()).take() {
            worker.abort();
        }
    }
}

// =============================================================================
// Worker
// =============================================================================

async fn run(shared: Arc<Shared>, mut rx: mpsc::UnboundedReceiver<Trigger>) {
    let options = shared.options.clone();
    while let Some(trigger) = rx.recv().await {
        let mut waiters = Vec::new();
        let mut stop = None;

        match trigger {
            Trigger::Edit => {
                let hard_deadline = Instant::now() + options.max_flush_delay;
                let mut deadline = (Instant::now() + options.debounce).min(hard_deadline);
                loop {
                    if shared.pending_changes() >= options.max_pending_changes {
                        debug!(pending = shared.pending_changes(), "change log full, flushing");
                        break;
                    }
                    tokio::select! {
                        msg = rx.recv() => match msg {
                            Some(Trigger::Edit) => {
                                deadline = (Instant::now() + options.debounce).min(hard_deadline);
                            }
                            Some(Trigger::Flush(ack)) => {
                                waiters.push(ack);
                                break;
                            }
                            Some(Trigger::Shutdown(ack)) => {
                                stop = Some(ack);
                                break;
                            }
                            None => break,
                        },
                        _ = tokio::time::sleep_until(deadline) => break,
                    }
                }
            }
            Trigger::Flush(ack) => waiters.push(ack),
            Trigger::Shutdown(ack) => stop = Some(ack),
        }

        let result = Arc::clone(&shared).flush().await;
        if let Err(e) = &result {
            warn!(error = %e, "flush failed");
        }
        for ack in waiters {
            let _ = ack.send(result.clone());
        }
        if let Some(ack) = stop {
            let _ = ack.send(result);
            debug!("sync worker stopped");
            break;
        }
    }
}

impl Shared {
    fn snapshot(&self) -> Arc<Graph> {
        Arc::clone(&self.graph.read().unwrap_or_else(|e| e.into_inner()))
    }

    fn swap(&self, graph: Graph) {
        *self.graph.write().unwrap_or_else(|e| e.into_inner()) = Arc::new(graph);
    }

    fn lock_log(&self) -> std::sync::MutexGuard<'_, ChangeLog> {
        self.log.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn lock_history(&self) -> std::sync::MutexGuard<'_, SyncHistory> {
        self.history.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn replicas(&self) -> Vec<Arc<Replica>> {
        self.replicas
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    fn pending_changes(&self) -> usize {
        self.lock_log().len()
    }

    fn remove_replica(&self, id: &str) -> bool {
        let mut replicas = self.replicas.write().unwrap_or_else(|e| e.into_inner());
        let before = replicas.len();
        replicas.retain(|r| r.id() != id);
        before != replicas.len()
    }

    /// Drop a connection whose credentials were rejected.
    fn revoke(&self, id: &str, reason: String) {
        if self.remove_replica(id) {
            warn!(provider = %id, reason = %reason, "credentials rejected, connection removed");
            let _ = self.events.send(SyncEvent::ReplicaDisconnected {
                provider: id.to_string(),
                reason,
            });
        }
    }

    fn record(&self, record: SyncRecord) {
        if let Err(e) = self.lock_history().append(record) {
            warn!(error = %e, "failed to persist sync record");
        }
    }

    async fn flush(self: Arc<Self>) -> FlushResult {
        let _flushing = self.flush_lock.lock().await;
        let (seq, snapshot) = {
            let log = self.lock_log();
            (log.last_seq(), self.snapshot())
        };

        let targets: Vec<Arc<Replica>> = self
            .replicas()
            .into_iter()
            .filter(|r| r.is_flush_target())
            .collect();
        if targets.is_empty() {
            self.lock_log().truncate_through(seq);
            self.durable_seq.fetch_max(seq, Ordering::SeqCst);
            return Ok(FlushReport {
                seq,
                acknowledged: Vec::new(),
                pending: Vec::new(),
            });
        }

        let (current, behind): (Vec<_>, Vec<_>) = targets
            .into_iter()
            .partition(|r| r.status().persisted_seq >= seq && r.status().head.is_some());
        let mut acknowledged: Vec<String> = current.iter().map(|r| r.id().to_string()).collect();
        if behind.is_empty() {
            return Ok(FlushReport {
                seq,
                acknowledged,
                pending: Vec::new(),
            });
        }

        let required = self
            .options
            .quorum
            .clamp(1, acknowledged.len() + behind.len());
        let mut pending: Vec<String> = behind.iter().map(|r| r.id().to_string()).collect();
        info!(seq, targets = pending.len(), required, "flushing");

        let (tx, mut rx) = mpsc::unbounded_channel();
        for replica in behind {
            tokio::spawn(sync_replica(
                Arc::clone(&self),
                replica,
                seq,
                Arc::clone(&snapshot),
                tx.clone(),
            ));
        }
        drop(tx);

        let mut failures = Vec::new();
        let mut conflict = None;
        while acknowledged.len() < required {
            let Some((id, result)) = rx.recv().await else {
                break;
            };
            pending.retain(|p| p != &id);
            match result {
                Ok(()) => acknowledged.push(id),
                Err(err) => {
                    if matches!(err, SyncError::UnresolvedConflict { .. }) {
                        conflict = Some(err.clone());
                    }
                    failures.push((id, err.to_string()));
                }
            }
        }

        if acknowledged.len() < required {
            return Err(conflict.unwrap_or(SyncError::QuorumNotReached {
                seq,
                acknowledged: acknowledged.len(),
                required,
                failures,
            }));
        }

        let truncated = self.lock_log().truncate_through(seq);
        self.durable_seq.fetch_max(seq, Ordering::SeqCst);
        info!(seq, acknowledged = ?acknowledged, truncated, "flush durable");
        let _ = self.events.send(SyncEvent::FlushCompleted {
            seq,
            acknowledged: acknowledged.clone(),
        });
        Ok(FlushReport {
            seq,
            acknowledged,
            pending,
        })
    }

    /// Fold a replica's merge result into the live graph.
    fn adopt(&self, base: &Graph, merged: Graph, provider: &str, seq: u64) {
        let mut log = self.lock_log();
        let current = self.snapshot();
        let next = if *current == *base {
            merged
        } else {
            // Edits landed while the replica was merging
            match merge_graphs(Some(base), &current, &merged) {
                Ok(next) => next,
                Err(e) => {
                    warn!(provider, seq, error = %e, "remote changes not adopted");
                    let _ = self.events.send(SyncEvent::ConflictUnresolved {
                        provider: provider.to_string(),
                        seq,
                        reason: e.to_string(),
                    });
                    return;
                }
            }
        };
        self.swap(next);
        let seq_after = log.advance();
        drop(log);
        info!(provider, seq, next_seq = seq_after, "adopted remote changes");
        let _ = self.events.send(SyncEvent::RemoteMerged {
            provider: provider.to_string(),
            seq,
        });
        // Other replicas still lack the remote changes
        let _ = self.trigger.send(Trigger::Edit);
    }
}

async fn sync_replica(
    shared: Arc<Shared>,
    replica: Arc<Replica>,
    seq: u64,
    snapshot: Arc<Graph>,
    done: mpsc::UnboundedSender<(String, Result<(), SyncError>)>,
) {
    let id = replica.id().to_string();
    let result = replica
        .sync(
            seq,
            Arc::clone(&snapshot),
            shared.options.provider_timeout,
            shared.options.retry,
            &shared.events,
        )
        .await;

    let result = match result {
        Ok(AttemptOutcome::Synced { commit, merged }) => {
            if let Some(merged) = merged {
                shared.adopt(&snapshot, merged, &id, seq);
            }
            shared.record(SyncRecord::synced(seq, &id, commit.clone()));
            let _ = shared.events.send(SyncEvent::ReplicaSynced {
                provider: id.clone(),
                seq,
                commit,
            });
            Ok(())
        }
        Ok(AttemptOutcome::Superseded) => {
            shared.record(SyncRecord::superseded(seq, &id));
            Ok(())
        }
        Err(err) => {
            shared.record(SyncRecord::failed(seq, &id, err.to_string()));
            let event = match &err {
                SyncError::UnresolvedConflict { reason, .. } => SyncEvent::ConflictUnresolved {
                    provider: id.clone(),
                    seq,
                    reason: reason.clone(),
                },
                other => SyncEvent::ReplicaFailed {
                    provider: id.clone(),
                    seq,
                    error: other.to_string(),
                    will_retry: false,
                },
            };
            let _ = shared.events.send(event);
            if let SyncError::Provider { source, .. } = &err {
                if source.is_credential_failure() {
                    shared.revoke(&id, source.to_string());
                }
            }
            Err(err)
        }
    };
    let _ = done.send((id, result));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::mock::MockProvider;
    use crate::provider::Credentials;

    fn options() -> SyncOptions {
        SyncOptions {
            debounce: Duration::from_millis(500),
            max_flush_delay: Duration::from_secs(5),
            max_pending_changes: 100,
            quorum: 1,
            provider_timeout: Duration::from_secs(5),
            retry: RetryPolicy {
                base: Duration::from_millis(100),
                max: Duration::from_secs(1),
                max_attempts: 3,
            },
        }
    }

    fn empty() -> Graph {
        Graph::new(Domain::normalize("alice.com").unwrap(), "personal").unwrap()
    }

    async fn connection(id: &str, role: ProviderRole, mock: &MockProvider) -> ProviderConnection {
        ProviderConnection::connect(id, role, Arc::new(mock.clone()), &Credentials::None, "personal")
            .await
            .unwrap()
    }

    fn concept(name: &str) -> Mutation {
        Mutation::AddConcept { name: name.into() }
    }

    #[tokio::test(start_paused = true)]
    async fn edits_are_visible_immediately() {
        let mock = MockProvider::new();
        let engine = SyncEngine::new(
            empty(),
            vec![connection("m", ProviderRole::Primary, &mock).await],
            options(),
            SyncHistory::in_memory(),
        );
        let before = engine.snapshot();
        let applied = engine.apply(concept("Climate Policy")).unwrap();

        assert_eq!(applied.seq, 1);
        assert!(engine
            .snapshot()
            .node("https://alice.com/redstring/vocab/climatepolicy")
            .is_some());
        assert!(before.is_empty());
        assert_eq!(mock.commit_count("personal"), 0);
        assert_eq!(engine.pending_changes(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn invalid_edit_is_rejected_without_logging() {
        let engine = SyncEngine::new(empty(), vec![], options(), SyncHistory::in_memory());
        let err = engine
            .apply(Mutation::AddSubclass {
                child: "https://alice.com/redstring/vocab/a".into(),
                parent: "https://alice.com/redstring/vocab/a".into(),
            })
            .unwrap_err();
        assert!(matches!(err, GraphError::CyclicHierarchy { .. }));
        assert_eq!(engine.pending_changes(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn explicit_flush_commits_and_truncates() {
        let mock = MockProvider::new();
        let engine = SyncEngine::new(
            empty(),
            vec![connection("m", ProviderRole::Primary, &mock).await],
            options(),
            SyncHistory::in_memory(),
        );
        engine.apply(concept("A")).unwrap();
        let report = engine.flush().await.unwrap();

        assert_eq!(report.seq, 1);
        assert_eq!(report.acknowledged, vec!["m".to_string()]);
        assert_eq!(engine.durable_seq(), 1);
        assert_eq!(engine.pending_changes(), 0);
        assert!(mock.file("personal", "vocabulary/concepts/a.ttl").is_some());
        assert!(mock.commits("personal")[0].message.contains("#1"));
        assert_eq!(engine.history().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn flush_with_nothing_new_does_not_commit() {
        let mock = MockProvider::new();
        let engine = SyncEngine::new(
            empty(),
            vec![connection("m", ProviderRole::Primary, &mock).await],
            options(),
            SyncHistory::in_memory(),
        );
        engine.apply(concept("A")).unwrap();
        engine.flush().await.unwrap();
        engine.flush().await.unwrap();
        assert_eq!(mock.commit_count("personal"), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn change_log_threshold_forces_flush() {
        let mock = MockProvider::new();
        let engine = SyncEngine::new(
            empty(),
            vec![connection("m", ProviderRole::Primary, &mock).await],
            SyncOptions {
                max_pending_changes: 2,
                debounce: Duration::from_secs(60),
                max_flush_delay: Duration::from_secs(600),
                ..options()
            },
            SyncHistory::in_memory(),
        );
        let mut events = engine.subscribe();
        engine.apply(concept("A")).unwrap();
        engine.apply(concept("B")).unwrap();

        let started = Instant::now();
        loop {
            if let SyncEvent::FlushCompleted { .. } = events.recv().await.unwrap() {
                break;
            }
        }
        assert!(started.elapsed() < Duration::from_secs(60));
        assert_eq!(mock.commit_count("personal"), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn standby_is_not_written() {
        let primary = MockProvider::new();
        let standby = MockProvider::new();
        let engine = SyncEngine::new(
            empty(),
            vec![
                connection("p", ProviderRole::Primary, &primary).await,
                connection("s", ProviderRole::Standby, &standby).await,
            ],
            options(),
            SyncHistory::in_memory(),
        );
        engine.apply(concept("A")).unwrap();
        engine.flush().await.unwrap();
        assert_eq!(primary.commit_count("personal"), 1);
        assert_eq!(standby.commit_count("personal"), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn load_reads_primary() {
        let mock = MockProvider::new();
        let mut stored = empty();
        stored.add_concept("Stored").unwrap();
        let files = layout::serialize(&stored);
        let pairs: Vec<(&str, &str)> = files.iter().map(|(p, c)| (p.as_str(), c.as_str())).collect();
        mock.inject_remote_commit("personal", &pairs);

        let engine = SyncEngine::load(
            Domain::normalize("alice.com").unwrap(),
            "personal",
            vec![connection("m", ProviderRole::Primary, &mock).await],
            options(),
            SyncHistory::in_memory(),
        )
        .await
        .unwrap();
        assert_eq!(*engine.snapshot(), stored);

        // Seeded base: an edit writes one file without a merge
        engine.apply(concept("Fresh")).unwrap();
        engine.flush().await.unwrap();
        let last = mock.commits("personal").pop().unwrap();
        assert_eq!(last.paths, vec!["vocabulary/concepts/fresh.ttl".to_string()]);
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_flushes_pending_edits() {
        let mock = MockProvider::new();
        let engine = SyncEngine::new(
            empty(),
            vec![connection("m", ProviderRole::Primary, &mock).await],
            SyncOptions {
                debounce: Duration::from_secs(600),
                max_flush_delay: Duration::from_secs(600),
                ..options()
            },
            SyncHistory::in_memory(),
        );
        engine.apply(concept("A")).unwrap();
        engine.shutdown().await.unwrap();
        assert_eq!(mock.commit_count("personal"), 1);
        assert!(matches!(engine.flush().await, Err(SyncError::Stopped)));
    }

    #[tokio::test(start_paused = true)]
    async fn migrate_promotes_destination() {
        let old = MockProvider::named("old");
        let new = MockProvider::named("new");
        let engine = SyncEngine::new(
            empty(),
            vec![
                connection("old", ProviderRole::Primary, &old).await,
                connection("new", ProviderRole::Standby, &new).await,
            ],
            options(),
            SyncHistory::in_memory(),
        );
        engine.apply(concept("A")).unwrap();

        let report = engine.migrate("new").await.unwrap();
        assert_eq!(report.from, "old");
        assert_eq!(engine.primary().as_deref(), Some("new"));
        assert!(new.file("personal", "vocabulary/concepts/a.ttl").is_some());
        // The old primary keeps its data
        assert!(old.file("personal", "vocabulary/concepts/a.ttl").is_some());

        engine.apply(concept("B")).unwrap();
        engine.flush().await.unwrap();
        assert!(new.file("personal", "vocabulary/concepts/b.ttl").is_some());
        assert!(old.file("personal", "vocabulary/concepts/b.ttl").is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn migrate_to_unknown_connection_fails() {
        let engine = SyncEngine::new(
            empty(),
            vec![connection("p", ProviderRole::Primary, &MockProvider::new()).await],
            options(),
            SyncHistory::in_memory(),
        );
        assert!(matches!(
            engine.migrate("nowhere").await,
            Err(SyncError::Migration(_))
        ));
    }
}
