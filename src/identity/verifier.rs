//! identity::verifier
//!
//! Domain ownership checks with a TTL cache.
//!
//! # Design
//!
//! The verifier owns its cache explicitly; there is no process-global
//! state. Definitive outcomes (verified, not found, mismatch) are cached
//! per `(domain, method)` for the configured TTL. Transient outcomes are
//! never cached, so the next call retries the lookup. Claim checks always
//! query the source and refresh the cached entry.
//!
//! # Example
//!
//! ```ignore
//! use redstring_pod::identity::{DomainVerifier, VerificationMethod};
//!
//! let verifier = DomainVerifier::from_config(&config);
//! match verifier.verify(&domain, VerificationMethod::DnsTxt).await {
//!     Ok(v) => println!("verified at {}", v.verified_at),
//!     Err(e) if e.is_transient() => println!("try again later: {}", e),
//!     Err(e) => println!("not verified: {}", e),
//! }
//! ```

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::Utc;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use super::resolver::{DohResolver, HttpWellKnown, TxtResolver, WellKnownFetcher};
use super::verification::{
    classify, well_known_records, ClaimError, DomainClaim, VerificationError, VerificationMethod,
    VerificationResult, Verified,
};
use crate::core::config::Config;
use crate::core::Domain;

struct CacheEntry {
    outcome: VerificationResult,
    stored_at: Instant,
}

/// Verifies domain ownership by DNS TXT record or well-known file.
pub struct DomainVerifier {
    resolver: Arc<dyn TxtResolver>,
    fetcher: Arc<dyn WellKnownFetcher>,
    ttl: Duration,
    cache: Mutex<HashMap<(Domain, VerificationMethod), CacheEntry>>,
}

impl std::fmt::Debug for DomainVerifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DomainVerifier")
            .field("ttl", &self.ttl)
            .field("cached", &self.cached_len())
            .finish()
    }
}

impl DomainVerifier {
    pub fn new(
        resolver: Arc<dyn TxtResolver>,
        fetcher: Arc<dyn WellKnownFetcher>,
        ttl: Duration,
    ) -> Self {
        Self {
            resolver,
            fetcher,
            ttl,
            cache: Mutex::new(HashMap::new()),
        }
    }

    /// Build a verifier using DNS-over-HTTPS and HTTPS fetches.
    pub fn from_config(config: &Config) -> Self {
        let timeout = config.http_timeout();
        Self::new(
            Arc::new(DohResolver::new(config.doh_endpoint(), timeout)),
            Arc::new(HttpWellKnown::new(timeout)),
            config.verification_ttl(),
        )
    }

    /// Check ownership of `domain` using `method`.
    pub async fn verify(&self, domain: &Domain, method: VerificationMethod) -> VerificationResult {
        let key = (domain.clone(), method);
        if let Some(cached) = self.cached(&key) {
            debug!(domain = %domain, method = %method, "verification cache hit");
            return cached;
        }

        let outcome = self.check(domain, method).await;
        match &outcome {
            Ok(_) => info!(domain = %domain, method = %method, "domain verified"),
            Err(e) if e.is_transient() => {
                warn!(domain = %domain, method = %method, error = %e, "verification inconclusive")
            }
            Err(e) => info!(domain = %domain, method = %method, error = %e, "domain not verified"),
        }

        if !matches!(&outcome, Err(e) if e.is_transient()) {
            self.lock().insert(
                key,
                CacheEntry {
                    outcome: outcome.clone(),
                    stored_at: Instant::now(),
                },
            );
        }
        outcome
    }

    /// Check a claim and record the outcome on it.
    ///
    /// The cache is bypassed: a claim is pending because its proof may
    /// have changed since the last lookup.
    pub async fn check_claim(
        &self,
        claim: &mut DomainClaim,
        method: VerificationMethod,
    ) -> Result<VerificationResult, ClaimError> {
        // Reject illegal transitions before doing any I/O
        if claim.pending_token().is_none() {
            return Err(ClaimError {
                from: claim.state.name(),
                action: "check",
            });
        }
        self.lock().remove(&(claim.domain.clone(), method));
        let outcome = self.verify(&claim.domain, method).await;
        claim.apply_check(&outcome)?;
        Ok(outcome)
    }

    /// Drop cached outcomes for `domain`.
    pub fn invalidate(&self, domain: &Domain) {
        self.lock().retain(|(d, _), _| d != domain);
    }

    pub fn clear(&self) {
        self.lock().clear();
    }

    /// Number of cached outcomes, expired ones included.
    pub fn cached_len(&self) -> usize {
        self.lock().len()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<(Domain, VerificationMethod), CacheEntry>> {
        self.cache.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn cached(&self, key: &(Domain, VerificationMethod)) -> Option<VerificationResult> {
        let mut cache = self.lock();
        match cache.get(key) {
            Some(entry) if entry.stored_at.elapsed() < self.ttl => Some(entry.outcome.clone()),
            Some(_) => {
                cache.remove(key);
                None
            }
            None => None,
        }
    }

    async fn check(&self, domain: &Domain, method: VerificationMethod) -> VerificationResult {
        let records = match method {
            VerificationMethod::DnsTxt => self
                .resolver
                .query_txt(domain.as_str())
                .await
                .map_err(|e| VerificationError::transient(domain, e.to_string()))?,
            VerificationMethod::WellKnownFile => {
                let url = domain.uris().verification;
                match self.fetcher.fetch(&url).await {
                    Ok(Some(body)) => well_known_records(&body),
                    Ok(None) => Vec::new(),
                    Err(e) => return Err(VerificationError::transient(domain, e.to_string())),
                }
            }
        };

        classify(domain, &records)?;
        Ok(Verified {
            domain: domain.clone(),
            method,
            verified_at: Utc::now(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::resolver::LookupError;
    use crate::identity::verification::ClaimState;
    use crate::identity::VERIFICATION_TOKEN;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Scripted resolver returning queued answers, counting calls.
    #[derive(Default)]
    struct ScriptedDns {
        answers: Mutex<Vec<Result<Vec<String>, LookupError>>>,
        calls: AtomicUsize,
    }

    impl ScriptedDns {
        fn with(answers: Vec<Result<Vec<String>, LookupError>>) -> Arc<Self> {
            Arc::new(Self {
                answers: Mutex::new(answers),
                calls: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl TxtResolver for ScriptedDns {
        async fn query_txt(&self, _name: &str) -> Result<Vec<String>, LookupError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let mut answers = self.answers.lock().unwrap();
            if answers.is_empty() {
                Ok(Vec::new())
            } else {
                answers.remove(0)
            }
        }
    }

    struct StaticFile(Option<String>);

    #[async_trait]
    impl WellKnownFetcher for StaticFile {
        async fn fetch(&self, _url: &str) -> Result<Option<String>, LookupError> {
            Ok(self.0.clone())
        }
    }

    fn domain(s: &str) -> Domain {
        Domain::normalize(s).unwrap()
    }

    fn verifier(dns: Arc<ScriptedDns>, file: Option<&str>) -> DomainVerifier {
        DomainVerifier::new(
            dns,
            Arc::new(StaticFile(file.map(String::from))),
            Duration::from_secs(60),
        )
    }

    #[tokio::test]
    async fn no_txt_records_is_not_found_not_transient() {
        let dns = ScriptedDns::with(vec![Ok(vec![])]);
        let err = verifier(dns, None)
            .verify(&domain("test.invalid"), VerificationMethod::DnsTxt)
            .await
            .unwrap_err();
        assert!(matches!(err, VerificationError::NotFound { .. }));
        assert!(!err.is_transient());
    }

    #[tokio::test]
    async fn lookup_failure_is_transient_and_not_cached() {
        let dns = ScriptedDns::with(vec![
            Err(LookupError("timeout".into())),
            Ok(vec![VERIFICATION_TOKEN.to_string()]),
        ]);
        let verifier = verifier(dns.clone(), None);
        let d = domain("alice.com");

        let first = verifier.verify(&d, VerificationMethod::DnsTxt).await;
        assert!(first.unwrap_err().is_transient());
        assert_eq!(verifier.cached_len(), 0);

        assert!(verifier.verify(&d, VerificationMethod::DnsTxt).await.is_ok());
        assert_eq!(dns.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn definitive_outcome_cached_until_ttl() {
        let dns = ScriptedDns::with(vec![
            Ok(vec![VERIFICATION_TOKEN.to_string()]),
            Ok(vec![]),
        ]);
        let verifier = verifier(dns.clone(), None);
        let d = domain("alice.com");

        assert!(verifier.verify(&d, VerificationMethod::DnsTxt).await.is_ok());
        assert!(verifier.verify(&d, VerificationMethod::DnsTxt).await.is_ok());
        assert_eq!(dns.calls.load(Ordering::SeqCst), 1);

        tokio::time::advance(Duration::from_secs(61)).await;
        assert!(verifier.verify(&d, VerificationMethod::DnsTxt).await.is_err());
        assert_eq!(dns.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn invalidate_forces_lookup() {
        let dns = ScriptedDns::with(vec![Ok(vec![]), Ok(vec![VERIFICATION_TOKEN.to_string()])]);
        let verifier = verifier(dns, None);
        let d = domain("alice.com");

        assert!(verifier.verify(&d, VerificationMethod::DnsTxt).await.is_err());
        verifier.invalidate(&d);
        assert!(verifier.verify(&d, VerificationMethod::DnsTxt).await.is_ok());
    }

    #[tokio::test]
    async fn well_known_file_verifies() {
        let verifier = verifier(
            ScriptedDns::with(vec![]),
            Some("redstring-verification=verified\n"),
        );
        let verified = verifier
            .verify(&domain("alice.com"), VerificationMethod::WellKnownFile)
            .await
            .unwrap();
        assert_eq!(verified.method, VerificationMethod::WellKnownFile);
    }

    #[tokio::test]
    async fn missing_well_known_file_is_not_found() {
        let verifier = verifier(ScriptedDns::with(vec![]), None);
        let err = verifier
            .verify(&domain("alice.com"), VerificationMethod::WellKnownFile)
            .await
            .unwrap_err();
        assert!(matches!(err, VerificationError::NotFound { .. }));
    }

    #[tokio::test]
    async fn check_claim_moves_state() {
        let dns = ScriptedDns::with(vec![Ok(vec![VERIFICATION_TOKEN.to_string()])]);
        let verifier = verifier(dns, None);
        let mut claim = DomainClaim::new(domain("alice.com"));

        assert!(verifier
            .check_claim(&mut claim, VerificationMethod::DnsTxt)
            .await
            .is_err());

        claim.claim();
        let outcome = verifier
            .check_claim(&mut claim, VerificationMethod::DnsTxt)
            .await
            .unwrap();
        assert!(outcome.is_ok());
        assert!(claim.is_verified());
    }

    #[tokio::test]
    async fn fresh_claim_after_failure_queries_again() {
        let dns = ScriptedDns::with(vec![Ok(vec![]), Ok(vec![VERIFICATION_TOKEN.to_string()])]);
        let verifier = verifier(dns.clone(), None);
        let mut claim = DomainClaim::new(domain("alice.com"));

        claim.claim();
        verifier
            .check_claim(&mut claim, VerificationMethod::DnsTxt)
            .await
            .unwrap();
        assert!(matches!(claim.state, ClaimState::Failed { .. }));

        // The record is published, then the user claims again
        claim.claim();
        verifier
            .check_claim(&mut claim, VerificationMethod::DnsTxt)
            .await
            .unwrap();
        assert!(claim.is_verified());
        assert_eq!(dns.calls.load(Ordering::SeqCst), 2);
        // The fresh outcome replaced the cached failure
        assert!(verifier
            .verify(&domain("alice.com"), VerificationMethod::DnsTxt)
            .await
            .is_ok());
        assert_eq!(dns.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn rotation_re_verifies_against_the_source() {
        let dns = ScriptedDns::with(vec![Ok(vec![VERIFICATION_TOKEN.to_string()]), Ok(vec![])]);
        let verifier = verifier(dns.clone(), None);
        let mut claim = DomainClaim::new(domain("alice.com"));

        claim.claim();
        verifier
            .check_claim(&mut claim, VerificationMethod::DnsTxt)
            .await
            .unwrap();
        assert!(claim.is_verified());

        // The record was removed; rotation must notice
        claim.rotate().unwrap();
        let outcome = verifier
            .check_claim(&mut claim, VerificationMethod::DnsTxt)
            .await
            .unwrap();
        assert!(matches!(outcome, Err(VerificationError::NotFound { .. })));
        assert!(matches!(claim.state, ClaimState::Failed { .. }));
        assert_eq!(dns.calls.load(Ordering::SeqCst), 2);
    }
}
