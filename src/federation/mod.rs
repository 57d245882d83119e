//! federation
//!
//! Peer discovery and cross-domain reference resolution.
//!
//! # Modules
//!
//! - [`discovery`] - The well-known discovery document
//! - [`directory`] - Cached peer sets with unreachable backoff
//! - [`references`] - Resolving references to remote concepts

pub mod directory;
pub mod discovery;
pub mod references;

pub use directory::{merge_peer_sets, FederationDirectory};
pub use discovery::{
    DiscoveryDocument, DiscoverySource, FederationError, HttpDiscovery, DEFAULT_DISCOVERY_TEMPLATE,
};
pub use references::{ConceptSource, HttpConceptSource, ReferenceResolver, ResolveError};
