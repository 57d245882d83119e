//! identity::verification
//!
//! Verification outcomes, record classification and the domain claim
//! state machine.
//!
//! # Acceptance rule
//!
//! A domain is verified only when one record equals
//! [`VERIFICATION_TOKEN`] byte for byte. Case and surrounding whitespace
//! are significant; the only relaxation is that a well-known body may end
//! with one line terminator.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::core::Domain;

/// The literal token that proves control of a domain.
pub const VERIFICATION_TOKEN: &str = "redstring-verification=verified";

const TOKEN_PREFIX: &str = "redstring-verification=";

/// How ownership is checked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum VerificationMethod {
    /// TXT record on the domain itself
    DnsTxt,
    /// `https://{domain}/.well-known/redstring-verification`
    WellKnownFile,
}

impl VerificationMethod {
    pub fn all() -> &'static [VerificationMethod] {
        &[VerificationMethod::DnsTxt, VerificationMethod::WellKnownFile]
    }

    pub fn name(&self) -> &'static str {
        match self {
            VerificationMethod::DnsTxt => "dns-txt",
            VerificationMethod::WellKnownFile => "well-known-file",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "dns-txt" | "dns" | "txt" => Some(VerificationMethod::DnsTxt),
            "well-known-file" | "well-known" | "file" => Some(VerificationMethod::WellKnownFile),
            _ => None,
        }
    }
}

impl fmt::Display for VerificationMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for VerificationMethod {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s).ok_or_else(|| {
            format!(
                "unknown verification method '{}', expected dns-txt or well-known-file",
                s
            )
        })
    }
}

/// Why a domain could not be verified.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum VerificationError {
    /// No verification record exists.
    #[error("no verification record found for {domain}")]
    NotFound { domain: String },

    /// A verification record exists but carries the wrong value.
    #[error("verification record for {domain} does not match (found {found:?})")]
    Mismatch { domain: String, found: Vec<String> },

    /// The check could not complete; the claim itself is unaffected.
    #[error("verification of {domain} could not complete: {reason}")]
    Transient { domain: String, reason: String },
}

impl VerificationError {
    /// Whether the check should be retried later.
    pub fn is_transient(&self) -> bool {
        matches!(self, VerificationError::Transient { .. })
    }

    pub(crate) fn transient(domain: &Domain, reason: impl Into<String>) -> Self {
        VerificationError::Transient {
            domain: domain.to_string(),
            reason: reason.into(),
        }
    }
}

/// A successful verification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Verified {
    pub domain: Domain,
    pub method: VerificationMethod,
    pub verified_at: DateTime<Utc>,
}

/// Outcome of a verification check.
pub type VerificationResult = Result<Verified, VerificationError>;

/// Classify the records found for a domain.
///
/// Any record equal to the token verifies. Otherwise a record that looks
/// like a verification record but carries another value is a mismatch, and
/// anything else counts as no record at all.
pub fn classify(domain: &Domain, records: &[String]) -> Result<(), VerificationError> {
    if records.iter().any(|r| r == VERIFICATION_TOKEN) {
        return Ok(());
    }
    let found: Vec<String> = records
        .iter()
        .filter(|r| r.starts_with(TOKEN_PREFIX))
        .cloned()
        .collect();
    if found.is_empty() {
        Err(VerificationError::NotFound {
            domain: domain.to_string(),
        })
    } else {
        Err(VerificationError::Mismatch {
            domain: domain.to_string(),
            found,
        })
    }
}

/// Records carried by a well-known verification body.
///
/// One trailing line terminator is removed. An empty body has no records.
pub fn well_known_records(body: &str) -> Vec<String> {
    let body = body
        .strip_suffix("\r\n")
        .or_else(|| body.strip_suffix('\n'))
        .unwrap_or(body);
    if body.is_empty() {
        Vec::new()
    } else {
        vec![body.to_string()]
    }
}

/// Verification state of a claimed domain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum ClaimState {
    Unclaimed,
    /// Claimed; awaiting a check. `token` identifies this claim attempt.
    Pending { token: String },
    Verified { at: DateTime<Utc> },
    Failed { reason: String },
}

impl ClaimState {
    pub fn name(&self) -> &'static str {
        match self {
            ClaimState::Unclaimed => "unclaimed",
            ClaimState::Pending { .. } => "pending",
            ClaimState::Verified { .. } => "verified",
            ClaimState::Failed { .. } => "failed",
        }
    }
}

/// An illegal claim transition.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("cannot {action} a domain claim in state '{from}'")]
pub struct ClaimError {
    pub from: &'static str,
    pub action: &'static str,
}

/// A user's claim on a domain.
///
/// `Unclaimed → Pending → Verified | Failed`. A verified claim can be
/// rotated back to `Pending` for re-verification; a failed claim only
/// leaves `Failed` through a fresh [`claim`](Self::claim).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DomainClaim {
    pub domain: Domain,
    pub state: ClaimState,
}

impl DomainClaim {
    pub fn new(domain: Domain) -> Self {
        Self {
            domain,
            state: ClaimState::Unclaimed,
        }
    }

    /// Start a fresh claim from any state.
    pub fn claim(&mut self) -> &str {
        self.state = ClaimState::Pending {
            token: new_claim_token(),
        };
        self.pending_token().unwrap_or_default()
    }

    /// Re-enter `Pending` with a new token for re-verification.
    pub fn rotate(&mut self) -> Result<&str, ClaimError> {
        if !self.is_verified() {
            return Err(ClaimError {
                from: self.state.name(),
                action: "rotate",
            });
        }
        Ok(self.claim())
    }

    /// Record the outcome of a check.
    ///
    /// Transient outcomes leave the claim pending.
    pub fn apply_check(&mut self, outcome: &VerificationResult) -> Result<(), ClaimError> {
        if !matches!(self.state, ClaimState::Pending { .. }) {
            return Err(ClaimError {
                from: self.state.name(),
                action: "check",
            });
        }
        match outcome {
            Ok(verified) => {
                self.state = ClaimState::Verified {
                    at: verified.verified_at,
                }
            }
            Err(err) if err.is_transient() => {}
            Err(err) => {
                self.state = ClaimState::Failed {
                    reason: err.to_string(),
                }
            }
        }
        Ok(())
    }

    pub fn pending_token(&self) -> Option<&str> {
        match &self.state {
            ClaimState::Pending { token } => Some(token),
            _ => None,
        }
    }

    pub fn is_verified(&self) -> bool {
        matches!(self.state, ClaimState::Verified { .. })
    }
}

fn new_claim_token() -> String {
    uuid::Uuid::new_v4().simple().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn domain() -> Domain {
        Domain::normalize("alice.com").unwrap()
    }

    fn records(values: &[&str]) -> Vec<String> {
        values.iter().map(|s| s.to_string()).collect()
    }

    mod classify {
        use super::*;

        #[test]
        fn exact_token_verifies() {
            assert!(classify(&domain(), &records(&[VERIFICATION_TOKEN])).is_ok());
        }

        #[test]
        fn token_among_other_records_verifies() {
            let found = records(&["v=spf1 -all", VERIFICATION_TOKEN, "google-site=abc"]);
            assert!(classify(&domain(), &found).is_ok());
        }

        #[test]
        fn no_records_is_not_found() {
            assert_eq!(
                classify(&domain(), &[]),
                Err(VerificationError::NotFound {
                    domain: "alice.com".into()
                })
            );
        }

        #[test]
        fn unrelated_records_are_not_found() {
            let err = classify(&domain(), &records(&["v=spf1 -all"])).unwrap_err();
            assert!(matches!(err, VerificationError::NotFound { .. }));
        }

        #[test]
        fn wrong_value_is_mismatch() {
            let err =
                classify(&domain(), &records(&["redstring-verification=pending"])).unwrap_err();
            assert_eq!(
                err,
                VerificationError::Mismatch {
                    domain: "alice.com".into(),
                    found: records(&["redstring-verification=pending"]),
                }
            );
        }

        #[test]
        fn case_and_whitespace_are_significant() {
            assert!(classify(&domain(), &records(&["Redstring-Verification=Verified"])).is_err());
            assert!(matches!(
                classify(&domain(), &records(&["redstring-verification=verified "])),
                Err(VerificationError::Mismatch { .. })
            ));
            assert!(classify(&domain(), &records(&[" redstring-verification=verified"])).is_err());
        }
    }

    #[test]
    fn well_known_body_trailing_newline() {
        assert_eq!(
            well_known_records("redstring-verification=verified\n"),
            records(&[VERIFICATION_TOKEN])
        );
        assert_eq!(
            well_known_records("redstring-verification=verified\r\n"),
            records(&[VERIFICATION_TOKEN])
        );
        assert_eq!(
            well_known_records("redstring-verification=verified\n\n"),
            records(&["redstring-verification=verified\n"])
        );
        assert!(well_known_records("").is_empty());
    }

    #[test]
    fn method_names() {
        for method in VerificationMethod::all() {
            assert_eq!(VerificationMethod::parse(method.name()), Some(*method));
        }
        assert!("carrier-pigeon".parse::<VerificationMethod>().is_err());
    }

    mod claim {
        use super::*;

        fn verified() -> VerificationResult {
            Ok(Verified {
                domain: domain(),
                method: VerificationMethod::DnsTxt,
                verified_at: Utc::now(),
            })
        }

        #[test]
        fn happy_path() {
            let mut claim = DomainClaim::new(domain());
            assert_eq!(claim.state, ClaimState::Unclaimed);

            let token = claim.claim().to_string();
            assert!(!token.is_empty());
            assert_eq!(claim.pending_token(), Some(token.as_str()));

            claim.apply_check(&verified()).unwrap();
            assert!(claim.is_verified());
        }

        #[test]
        fn transient_keeps_pending() {
            let mut claim = DomainClaim::new(domain());
            claim.claim();
            claim
                .apply_check(&Err(VerificationError::transient(&domain(), "timeout")))
                .unwrap();
            assert_eq!(claim.state.name(), "pending");
        }

        #[test]
        fn not_found_fails() {
            let mut claim = DomainClaim::new(domain());
            claim.claim();
            claim
                .apply_check(&Err(VerificationError::NotFound {
                    domain: "alice.com".into(),
                }))
                .unwrap();
            assert_eq!(claim.state.name(), "failed");
        }

        #[test]
        fn failed_only_leaves_through_claim() {
            let mut claim = DomainClaim::new(domain());
            claim.claim();
            claim
                .apply_check(&Err(VerificationError::NotFound {
                    domain: "alice.com".into(),
                }))
                .unwrap();

            assert!(claim.rotate().is_err());
            assert!(claim.apply_check(&verified()).is_err());

            claim.claim();
            assert_eq!(claim.state.name(), "pending");
        }

        #[test]
        fn rotate_from_verified_issues_new_token() {
            let mut claim = DomainClaim::new(domain());
            let first = claim.claim().to_string();
            claim.apply_check(&verified()).unwrap();

            let second = claim.rotate().unwrap().to_string();
            assert_ne!(first, second);
            assert_eq!(claim.state.name(), "pending");
        }

        #[test]
        fn cannot_check_unclaimed() {
            let mut claim = DomainClaim::new(domain());
            let err = claim.apply_check(&verified()).unwrap_err();
            assert_eq!(err.from, "unclaimed");
        }
    }
}
