//! federation::directory
//!
//! Cached peer discovery with failure backoff.
//!
//! # Design
//!
//! Each queried domain has one cache entry:
//!
//! - `Fresh`: peers fetched at some instant, served until the TTL passes
//! - `Unreachable`: the last fetch failed; no fetch is attempted before
//!   `retry_at`, and the domain is excluded from cross-domain resolution
//!   until a retry succeeds
//!
//! Consecutive failures back off exponentially (`base * 2^(n-1)`), capped
//! at `max`. A successful fetch resets the failure count.

use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, info, warn};

use super::discovery::{DiscoverySource, FederationError, HttpDiscovery};
use crate::core::config::Config;
use crate::core::Domain;

#[derive(Debug, Clone)]
enum CacheEntry {
    Fresh {
        peers: BTreeSet<Domain>,
        fetched_at: Instant,
    },
    Unreachable {
        failures: u32,
        retry_at: Instant,
        reason: String,
    },
}

/// Federation directory with an explicit TTL cache.
pub struct FederationDirectory {
    source: Arc<dyn DiscoverySource>,
    ttl: Duration,
    backoff_base: Duration,
    backoff_max: Duration,
    cache: Mutex<HashMap<Domain, CacheEntry>>,
}

impl std::fmt::Debug for FederationDirectory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FederationDirectory")
            .field("ttl", &self.ttl)
            .field("backoff_base", &self.backoff_base)
            .field("backoff_max", &self.backoff_max)
            .finish()
    }
}

impl FederationDirectory {
    /// Create a directory with default backoff (1s doubling to 5 minutes).
    pub fn new(source: Arc<dyn DiscoverySource>, ttl: Duration) -> Self {
        Self {
            source,
            ttl,
            backoff_base: Duration::from_secs(1),
            backoff_max: Duration::from_secs(300),
            cache: Mutex::new(HashMap::new()),
        }
    }

    pub fn with_backoff(mut self, base: Duration, max: Duration) -> Self {
        self.backoff_base = base;
        self.backoff_max = max;
        self
    }

    /// Build a directory fetching over HTTPS with configured TTL and backoff.
    pub fn from_config(config: &Config) -> Self {
        Self::new(
            Arc::new(HttpDiscovery::new(config.http_timeout())),
            config.federation_cache_ttl(),
        )
        .with_backoff(
            config.federation_backoff_base(),
            config.federation_backoff_max(),
        )
    }

    /// Delay before the next attempt after `failures` consecutive failures.
    pub fn backoff(&self, failures: u32) -> Duration {
        let exponent = failures.saturating_sub(1).min(31);
        self.backoff_base
            .saturating_mul(1u32 << exponent)
            .min(self.backoff_max)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<Domain, CacheEntry>> {
        self.cache.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Peers federated with `domain`.
    ///
    /// # Errors
    ///
    /// - `Unreachable` while a previous failure is backing off
    /// - the fetch error otherwise; the domain is then marked unreachable
    pub async fn discover_peers(&self, domain: &Domain) -> Result<BTreeSet<Domain>, FederationError> {
        let previous_failures = {
            let cache = self.lock();
            match cache.get(domain) {
                Some(CacheEntry::Fresh { peers, fetched_at }) if fetched_at.elapsed() < self.ttl => {
                    debug!(domain = %domain, "federation cache hit");
                    return Ok(peers.clone());
                }
                Some(CacheEntry::Unreachable { retry_at, .. }) if Instant::now() < *retry_at => {
                    return Err(FederationError::Unreachable {
                        domain: domain.to_string(),
                        retry_in: retry_at.saturating_duration_since(Instant::now()),
                    });
                }
                Some(CacheEntry::Unreachable { failures, .. }) => *failures,
                _ => 0,
            }
        };

        match self.source.fetch(domain).await {
            Ok(document) => {
                let peers = document.peers();
                info!(domain = %domain, peers = peers.len(), "discovered federation peers");
                self.lock().insert(
                    domain.clone(),
                    CacheEntry::Fresh {
                        peers: peers.clone(),
                        fetched_at: Instant::now(),
                    },
                );
                Ok(peers)
            }
            Err(err) => {
                let failures = previous_failures + 1;
                let delay = self.backoff(failures);
                warn!(
                    domain = %domain,
                    failures,
                    retry_in_ms = delay.as_millis() as u64,
                    error = %err,
                    "discovery failed"
                );
                self.lock().insert(
                    domain.clone(),
                    CacheEntry::Unreachable {
                        failures,
                        retry_at: Instant::now() + delay,
                        reason: err.to_string(),
                    },
                );
                Err(err)
            }
        }
    }

    /// Whether `domain` is usable for resolution.
    ///
    /// Unknown domains are reachable until a fetch fails. An unreachable
    /// domain stays excluded, even past its backoff, until a retry
    /// succeeds.
    pub fn is_reachable(&self, domain: &Domain) -> bool {
        !matches!(self.lock().get(domain), Some(CacheEntry::Unreachable { .. }))
    }

    /// Whether an unreachable `domain` has waited out its backoff.
    pub fn retry_due(&self, domain: &Domain) -> bool {
        matches!(
            self.lock().get(domain),
            Some(CacheEntry::Unreachable { retry_at, .. }) if Instant::now() >= *retry_at
        )
    }

    /// Why `domain` is unreachable, if it is.
    pub fn unreachable_reason(&self, domain: &Domain) -> Option<String> {
        match self.lock().get(domain) {
            Some(CacheEntry::Unreachable { reason, .. }) => Some(reason.clone()),
            _ => None,
        }
    }

    /// Clear a failure after another component reached `domain`.
    pub fn mark_reachable(&self, domain: &Domain) {
        let mut cache = self.lock();
        if matches!(cache.get(domain), Some(CacheEntry::Unreachable { .. })) {
            debug!(domain = %domain, "domain reachable again");
            cache.remove(domain);
        }
    }

    /// Mark `domain` unreachable as if a fetch had failed.
    ///
    /// Used when another component (such as the reference resolver) sees
    /// the domain fail.
    pub fn mark_unreachable(&self, domain: &Domain, reason: impl Into<String>) {
        let mut cache = self.lock();
        let failures = match cache.get(domain) {
            Some(CacheEntry::Unreachable { failures, .. }) => failures + 1,
            _ => 1,
        };
        let retry_at = Instant::now() + self.backoff(failures);
        cache.insert(
            domain.clone(),
            CacheEntry::Unreachable {
                failures,
                retry_at,
                reason: reason.into(),
            },
        );
    }

    /// Drop the cache entry for `domain`.
    pub fn invalidate(&self, domain: &Domain) {
        self.lock().remove(domain);
    }

    /// Domains with an unexpired peer list, sorted.
    pub fn cached_domains(&self) -> Vec<Domain> {
        let mut domains: Vec<Domain> = self
            .lock()
            .iter()
            .filter_map(|(domain, entry)| match entry {
                CacheEntry::Fresh { fetched_at, .. } if fetched_at.elapsed() < self.ttl => {
                    Some(domain.clone())
                }
                _ => None,
            })
            .collect();
        domains.sort();
        domains
    }

    /// Union of the peer sets of `querying` and `others`.
    ///
    /// `querying` is always included, even when absent from its own
    /// document or unreachable. Domains whose discovery fails contribute
    /// nothing.
    pub async fn merge_directories(&self, querying: &Domain, others: &[Domain]) -> BTreeSet<Domain> {
        let mut sets = Vec::with_capacity(others.len() + 1);
        for domain in std::iter::once(querying).chain(others) {
            if let Ok(peers) = self.discover_peers(domain).await {
                sets.push(peers);
            }
        }
        merge_peer_sets(querying, sets)
    }
}

/// Set union of peer sets, always containing `querying`.
pub fn merge_peer_sets<I>(querying: &Domain, sets: I) -> BTreeSet<Domain>
where
    I: IntoIterator<Item = BTreeSet<Domain>>,
{
    let mut merged: BTreeSet<Domain> = sets.into_iter().flatten().collect();
    merged.insert(querying.clone());
    merged
}
