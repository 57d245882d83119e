//! core::slug
//!
//! Concept identifiers derived from human-readable names.
//!
//! A slug keeps only alphanumeric characters, `-` and `_`, then lowercases
//! the result. Nothing is substituted for dropped characters, so
//! `"Climate Policy"` and `"ClimatePolicy"` share the slug `climatepolicy`.
//!
//! # Example
//!
//! ```
//! use redstring_pod::core::slug::slugify;
//!
//! assert_eq!(slugify("ClimatePolicy").unwrap().as_str(), "climatepolicy");
//! assert_eq!(slugify("Carbon Tax (2024)!").unwrap().as_str(), "carbontax2024");
//! assert!(slugify("!!!").is_err());
//! ```

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors from slug normalization.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SlugError {
    /// Nothing usable remained after filtering.
    #[error("cannot derive a slug from '{0}': no alphanumeric, '-' or '_' characters")]
    Empty(String),
}

/// A URI-safe concept identifier.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Slug(String);

impl Slug {
    /// Get the slug as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Slug {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for Slug {
    type Error = SlugError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        slugify(&value)
    }
}

impl From<Slug> for String {
    fn from(slug: Slug) -> Self {
        slug.0
    }
}

/// Derive a slug from a name.
///
/// # Errors
///
/// Returns [`SlugError::Empty`] when no character survives filtering.
pub fn slugify(name: &str) -> Result<Slug, SlugError> {
    let kept: String = name
        .chars()
        .filter(|c| c.is_alphanumeric() || *c == '-' || *c == '_')
        .collect();
    let slug = kept.to_lowercase();

    if slug.is_empty() {
        return Err(SlugError::Empty(name.to_string()));
    }
    Ok(Slug(slug))
}
