//! graph
//!
//! Semantic graph and reification model.
//!
//! # Modules
//!
//! - [`term`] - RDF terms and plain triples
//! - [`vocab`] - Namespaces, the per-domain vocabulary, JSON-LD context
//! - [`model`] - Nodes, edge types, reified statements, the `Graph`
//! - [`rdf`] - Entity to triple encoding and back
//!
//! # Example
//!
//! ```
//! use redstring_pod::core::domain::Domain;
//! use redstring_pod::graph::{ConnectionKind, Graph};
//!
//! let mut graph = Graph::new(Domain::normalize("alice.com").unwrap(), "personal").unwrap();
//! let policy = graph.add_concept("Climate Policy").unwrap();
//! let tax = graph.add_concept("Carbon Tax").unwrap();
//! let drives = graph.define_edge_type("drives", ConnectionKind::Influence).unwrap();
//! let statement = graph.add_statement(&tax, &drives, &policy, Some("shapes"), None).unwrap();
//!
//! assert!(graph.statement(&statement).is_some());
//! assert!(graph.add_subclass(&tax, &tax).is_err());
//! ```

pub mod model;
pub mod rdf;
pub mod term;
pub mod vocab;

pub use model::{
    AccessMode, ConnectionKind, EdgeType, Graph, GraphError, Node, Permission, Profile, Statement,
};
pub use term::{Literal, Term, Triple};
pub use vocab::{jsonld_context, Vocab};
