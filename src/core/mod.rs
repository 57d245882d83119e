//! core
//!
//! Core identity types and configuration for Redstring pods.
//!
//! # Modules
//!
//! - [`domain`] - Domain normalization and canonical URI derivation
//! - [`slug`] - Concept identifiers derived from names
//! - [`reference`] - Cross-domain references
//! - [`config`] - Configuration schema and loading
//!
//! # Design Principles
//!
//! - Strong typing prevents invalid states at compile time
//! - URI derivation is pure: no I/O, no hidden state
//! - Schemas are strict and self-describing

pub mod config;
pub mod domain;
pub mod reference;
pub mod slug;

pub use domain::{Domain, DomainError, UriSet};
pub use reference::{cross_domain_reference, CrossDomainReference, ReferenceError};
pub use slug::{slugify, Slug, SlugError};
