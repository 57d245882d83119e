//! core::reference
//!
//! Cross-domain references.
//!
//! A reference lets one domain's vocabulary point at a concept in another
//! domain's vocabulary. It yields two URIs:
//!
//! - the reference URI, under the source vocabulary:
//!   `{vocab(source)}references:{target}:{slug}`
//! - the target URI, under the target vocabulary:
//!   `{vocab(target)}{slug}`
//!
//! References are directional. Creating one says nothing about whether the
//! target concept exists; resolution is a separate, fallible step (see
//! [`crate::federation::ReferenceResolver`]).
//!
//! # Example
//!
//! ```
//! use redstring_pod::core::reference::CrossDomainReference;
//!
//! let r = CrossDomainReference::new("alice.com", "bob.net", "ClimatePolicy").unwrap();
//! assert_eq!(
//!     r.reference_uri(),
//!     "https://alice.com/redstring/vocab/references:bob.net:climatepolicy"
//! );
//! assert_eq!(r.target_uri(), "https://bob.net/redstring/vocab/climatepolicy");
//! ```

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::domain::{Domain, DomainError};
use super::slug::{slugify, Slug, SlugError};

/// Errors from building a cross-domain reference.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ReferenceError {
    #[error("source domain: {0}")]
    Source(DomainError),

    #[error("target domain: {0}")]
    Target(DomainError),

    #[error(transparent)]
    Slug(#[from] SlugError),

    #[error("not a cross-domain reference URI: {0}")]
    NotAReference(String),
}

/// A directional pointer from one domain's vocabulary into another's.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct CrossDomainReference {
    /// Domain whose vocabulary holds the reference
    pub source: Domain,
    /// Domain whose vocabulary holds the concept
    pub target: Domain,
    /// Slug of the referenced concept
    pub concept: Slug,
}

impl CrossDomainReference {
    /// Build a reference from raw inputs, normalizing domains and slugifying
    /// the concept name.
    pub fn new(source: &str, target: &str, concept: &str) -> Result<Self, ReferenceError> {
        let source = Domain::normalize(source).map_err(ReferenceError::Source)?;
        let target = Domain::normalize(target).map_err(ReferenceError::Target)?;
        let concept = slugify(concept)?;
        Ok(Self {
            source,
            target,
            concept,
        })
    }

    /// The reference URI under the source vocabulary.
    pub fn reference_uri(&self) -> String {
        format!(
            "{}references:{}:{}",
            self.source.uris().vocab,
            self.target,
            self.concept
        )
    }

    /// The concept URI under the target vocabulary.
    pub fn target_uri(&self) -> String {
        format!("{}{}", self.target.uris().vocab, self.concept)
    }

    /// Parse a reference URI back into its parts.
    ///
    /// Accepts exactly the shape produced by [`reference_uri`](Self::reference_uri).
    pub fn from_reference_uri(uri: &str) -> Result<Self, ReferenceError> {
        let not_ref = || ReferenceError::NotAReference(uri.to_string());

        let source_raw = super::domain::authority_of(uri).ok_or_else(not_ref)?;
        let source = Domain::normalize(source_raw).map_err(ReferenceError::Source)?;
        let prefix = format!("{}references:", source.uris().vocab);
        let rest = uri.strip_prefix(&prefix).ok_or_else(not_ref)?;
        let (target, concept) = rest.split_once(':').ok_or_else(not_ref)?;

        let target = Domain::normalize(target).map_err(ReferenceError::Target)?;
        let concept = slugify(concept)?;
        let reference = Self {
            source,
            target,
            concept,
        };
        if reference.reference_uri() != uri {
            return Err(not_ref());
        }
        Ok(reference)
    }
}

/// Build the `(reference_uri, target_uri)` pair for a concept.
pub fn cross_domain_reference(
    source: &str,
    target: &str,
    concept: &str,
) -> Result<(String, String), ReferenceError> {
    let reference = CrossDomainReference::new(source, target, concept)?;
    Ok((reference.reference_uri(), reference.target_uri()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_reference_and_target() {
        let (reference, target) =
            cross_domain_reference("alice.com", "bob.net", "ClimatePolicy").unwrap();
        assert_eq!(
            reference,
            "https://alice.com/redstring/vocab/references:bob.net:climatepolicy"
        );
        assert_eq!(target, "https://bob.net/redstring/vocab/climatepolicy");
    }

    #[test]
    fn normalizes_both_domains() {
        let r = CrossDomainReference::new("WWW.Alice.com", "https://www.Bob.NET/", "X").unwrap();
        assert_eq!(r.source.as_str(), "alice.com");
        assert_eq!(r.target.as_str(), "bob.net");
    }

    #[test]
    fn is_directional() {
        let ab = CrossDomainReference::new("alice.com", "bob.net", "c").unwrap();
        let ba = CrossDomainReference::new("bob.net", "alice.com", "c").unwrap();
        assert_ne!(ab.reference_uri(), ba.reference_uri());
        assert_ne!(ab.target_uri(), ba.target_uri());
    }

    #[test]
    fn invalid_parts_rejected() {
        assert!(matches!(
            CrossDomainReference::new("", "bob.net", "c"),
            Err(ReferenceError::Source(_))
        ));
        assert!(matches!(
            CrossDomainReference::new("alice.com", "bad host", "c"),
            Err(ReferenceError::Target(_))
        ));
        assert!(matches!(
            CrossDomainReference::new("alice.com", "bob.net", "!!"),
            Err(ReferenceError::Slug(_))
        ));
    }

    #[test]
    fn parses_reference_uri() {
        let r = CrossDomainReference::new("alice.com", "bob.net", "ClimatePolicy").unwrap();
        let parsed = CrossDomainReference::from_reference_uri(&r.reference_uri()).unwrap();
        assert_eq!(parsed, r);
    }

    #[test]
    fn rejects_non_reference_uri() {
        assert!(CrossDomainReference::from_reference_uri(
            "https://alice.com/redstring/vocab/climatepolicy"
        )
        .is_err());
        assert!(CrossDomainReference::from_reference_uri(
            "https://alice.com/redstring/vocab/references:Bob.net:x"
        )
        .is_err());
    }
}
