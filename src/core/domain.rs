//! core::domain
//!
//! Domain normalization and canonical URI derivation.
//!
//! # Types
//!
//! - [`Domain`] - A normalized host string (lowercase, no scheme, no `www.`)
//! - [`UriSet`] - The six URIs every pod derives from its domain
//!
//! # Normalization
//!
//! [`Domain::normalize`] strips a scheme, any path/query/fragment, a single
//! trailing dot and leading `www.` labels, then lowercases and validates the
//! remaining host. Normalization is idempotent:
//! `normalize(normalize(x)) == normalize(x)`.
//!
//! # Example
//!
//! ```
//! use redstring_pod::core::domain::Domain;
//!
//! let domain = Domain::normalize("https://WWW.Alice.COM/profile").unwrap();
//! assert_eq!(domain.as_str(), "alice.com");
//!
//! let uris = domain.uris();
//! assert_eq!(uris.vocab, "https://alice.com/redstring/vocab/");
//! assert_eq!(uris.web_id, "https://alice.com/profile/card#me");
//! ```

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Maximum length of a single DNS label.
const MAX_LABEL_LEN: usize = 63;

/// Maximum length of a full host name.
const MAX_DOMAIN_LEN: usize = 253;

/// Errors from domain normalization.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum DomainError {
    /// The input was empty after trimming.
    #[error("invalid domain: input is empty")]
    Empty,

    /// The input could not be interpreted as a host name.
    #[error("invalid domain '{input}': {reason}")]
    Malformed {
        /// The raw input
        input: String,
        /// Why it was rejected
        reason: String,
    },
}

impl DomainError {
    fn malformed(input: &str, reason: impl Into<String>) -> Self {
        DomainError::Malformed {
            input: input.to_string(),
            reason: reason.into(),
        }
    }
}

/// A normalized domain name.
///
/// Construction goes through [`Domain::normalize`], so every value of this
/// type is lowercase, scheme-free and without a leading `www.` label.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Domain(String);

impl Domain {
    /// Normalize a raw domain string.
    ///
    /// # Errors
    ///
    /// Returns [`DomainError::Empty`] for blank input and
    /// [`DomainError::Malformed`] when the host contains a port, user-info,
    /// empty labels or characters outside `[a-z0-9-]`.
    pub fn normalize(raw: &str) -> Result<Self, DomainError> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(DomainError::Empty);
        }

        let without_scheme = strip_scheme(trimmed);
        let host = without_scheme
            .split(['/', '?', '#'])
            .next()
            .unwrap_or_default();

        if host.contains('@') {
            return Err(DomainError::malformed(raw, "user-info is not allowed"));
        }
        if host.contains(':') {
            return Err(DomainError::malformed(raw, "ports are not allowed"));
        }

        let mut host = host.to_lowercase();
        if host.ends_with('.') {
            host.pop();
        }

        // Strip `www.` while at least two labels would remain.
        while let Some(rest) = host.strip_prefix("www.") {
            if !rest.contains('.') {
                break;
            }
            host = rest.to_string();
        }

        validate_host(raw, &host)?;
        Ok(Self(host))
    }

    /// Get the domain as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Derive the canonical URI set for this domain.
    pub fn uris(&self) -> UriSet {
        UriSet::derive(self)
    }
}

impl fmt::Display for Domain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for Domain {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for Domain {
    type Error = DomainError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Domain::normalize(&value)
    }
}

impl From<Domain> for String {
    fn from(domain: Domain) -> Self {
        domain.0
    }
}

impl std::str::FromStr for Domain {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Domain::normalize(s)
    }
}

/// Remove a leading `scheme://` if present.
fn strip_scheme(input: &str) -> &str {
    if let Some(idx) = input.find("://") {
        let scheme = &input[..idx];
        let is_scheme = !scheme.is_empty()
            && scheme.starts_with(|c: char| c.is_ascii_alphabetic())
            && scheme
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'));
        if is_scheme {
            return &input[idx + 3..];
        }
    }
    input
}

/// Check a lowercased host against DNS label rules.
fn validate_host(raw: &str, host: &str) -> Result<(), DomainError> {
    if host.is_empty() {
        return Err(DomainError::malformed(raw, "host is empty"));
    }
    if host.len() > MAX_DOMAIN_LEN {
        return Err(DomainError::malformed(raw, "host is too long"));
    }

    for label in host.split('.') {
        if label.is_empty() {
            return Err(DomainError::malformed(raw, "empty label"));
        }
        if label.len() > MAX_LABEL_LEN {
            return Err(DomainError::malformed(
                raw,
                format!("label '{}' exceeds {} bytes", label, MAX_LABEL_LEN),
            ));
        }
        if label.starts_with('-') || label.ends_with('-') {
            return Err(DomainError::malformed(
                raw,
                format!("label '{}' starts or ends with '-'", label),
            ));
        }
        if let Some(c) = label
            .chars()
            .find(|c| !(c.is_ascii_lowercase() || c.is_ascii_digit() || *c == '-'))
        {
            return Err(DomainError::malformed(
                raw,
                format!("invalid character '{}'", c),
            ));
        }
    }

    Ok(())
}

/// Canonical URIs derived from a domain.
///
/// Derived, never stored: every field is a pure function of the normalized
/// domain and shares it as the authority component.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UriSet {
    /// Vocabulary namespace (`https://{domain}/redstring/vocab/`)
    pub vocab: String,
    /// Semantic spaces root (`https://{domain}/redstring/spaces/`)
    pub spaces: String,
    /// WebID of the pod owner (`https://{domain}/profile/card#me`)
    pub web_id: String,
    /// Pod root (`https://{domain}/`)
    pub pod: String,
    /// Federation discovery document
    pub discovery: String,
    /// Domain verification document
    pub verification: String,
    #[serde(skip)]
    authority: String,
}

impl UriSet {
    /// Derive the URI set for a domain. No I/O.
    pub fn derive(domain: &Domain) -> Self {
        let d = domain.as_str();
        Self {
            vocab: format!("https://{}/redstring/vocab/", d),
            spaces: format!("https://{}/redstring/spaces/", d),
            web_id: format!("https://{}/profile/card#me", d),
            pod: format!("https://{}/", d),
            discovery: format!("https://{}/.well-known/redstring-discovery", d),
            verification: format!("https://{}/.well-known/redstring-verification", d),
            authority: d.to_string(),
        }
    }

    /// The authority component shared by all URIs in the set.
    pub fn authority(&self) -> &str {
        &self.authority
    }

    /// IRI of a named space under this domain.
    pub fn space(&self, name: &str) -> String {
        format!("{}{}", self.spaces, name)
    }

    /// All six URIs, in declaration order.
    pub fn all(&self) -> [&str; 6] {
        [
            &self.vocab,
            &self.spaces,
            &self.web_id,
            &self.pod,
            &self.discovery,
            &self.verification,
        ]
    }
}

/// Extract the authority of an `https://` or `http://` IRI.
pub fn authority_of(iri: &str) -> Option<&str> {
    let rest = iri
        .strip_prefix("https://")
        .or_else(|| iri.strip_prefix("http://"))?;
    let end = rest.find(['/', '#', '?']).unwrap_or(rest.len());
    let authority = &rest[..end];
    if authority.is_empty() {
        None
    } else {
        Some(authority)
    }
}
