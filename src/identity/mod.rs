//! identity
//!
//! Domain ownership verification.
//!
//! # Modules
//!
//! - [`verification`] - Outcomes, classification and the claim state machine
//! - [`resolver`] - DNS TXT and well-known fetch interfaces
//! - [`verifier`] - Cached verification driver
//!
//! Normalization and URI derivation live in [`crate::core::domain`]; this
//! layer only answers "does this user control this domain?".

pub mod resolver;
pub mod verification;
pub mod verifier;

pub use resolver::{
    DohResolver, HttpWellKnown, LookupError, TxtResolver, WellKnownFetcher, DEFAULT_DOH_ENDPOINT,
};
pub use verification::{
    classify, ClaimError, ClaimState, DomainClaim, VerificationError, VerificationMethod,
    VerificationResult, Verified, VERIFICATION_TOKEN,
};
pub use verifier::DomainVerifier;
