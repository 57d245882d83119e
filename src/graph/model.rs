//! graph::model
//!
//! The in-memory semantic graph of one pod space.
//!
//! # Entities
//!
//! - [`Node`] - A concept in the owner's vocabulary
//! - [`EdgeType`] - A relationship type, filed by [`ConnectionKind`]
//! - [`Statement`] - A reified edge carrying an optional name
//! - [`Permission`] - An access grant to another agent
//! - Plain [`Triple`]s for metadata-free relations
//!
//! # Invariants
//!
//! - Every node, edge type and statement IRI lives in the owner's vocab.
//! - A statement's subject, predicate and object resolve to something the
//!   graph knows at write time, and never to the statement itself.
//! - The `rdfs:subClassOf` relation is acyclic.
//!
//! Graphs rebuilt from persisted triples skip write-time validation; the
//! files are the record of what was accepted earlier.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;

use super::term::{Term, Triple};
use super::vocab::{self, Vocab};
use crate::core::domain::Domain;
use crate::core::reference::{CrossDomainReference, ReferenceError};
use crate::core::slug::{slugify, Slug, SlugError};

/// Errors from graph mutation.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum GraphError {
    #[error("cyclic hierarchy: '{child}' subClassOf '{parent}' would close a cycle")]
    CyclicHierarchy { child: String, parent: String },

    #[error("unknown reference '{0}': not a node, edge type, statement or cross-domain reference")]
    UnknownReference(String),

    #[error("'{id}' is already a {existing}")]
    DuplicateId { id: String, existing: &'static str },

    #[error("statement '{0}' cannot reference itself")]
    SelfReference(String),

    #[error("'{iri}' is not in the vocabulary of {owner}")]
    ForeignConcept { iri: String, owner: String },

    #[error("invalid IRI '{0}'")]
    InvalidIri(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("no graph manifest found")]
    MissingManifest,

    #[error("multiple graph manifests found: {0} and {1}")]
    ConflictingManifests(String, String),

    #[error(transparent)]
    Slug(#[from] SlugError),

    #[error(transparent)]
    Reference(#[from] ReferenceError),
}

/// Filing category of an edge type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionKind {
    Influence,
    Composition,
    Abstraction,
}

impl ConnectionKind {
    /// Parse a kind name.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "influence" => Some(ConnectionKind::Influence),
            "composition" => Some(ConnectionKind::Composition),
            "abstraction" => Some(ConnectionKind::Abstraction),
            _ => None,
        }
    }

    /// The kind name.
    pub fn name(&self) -> &'static str {
        match self {
            ConnectionKind::Influence => "influence",
            ConnectionKind::Composition => "composition",
            ConnectionKind::Abstraction => "abstraction",
        }
    }

    /// Directory name under `connections/`.
    pub fn directory(&self) -> &'static str {
        match self {
            ConnectionKind::Influence => "influences",
            ConnectionKind::Composition => "compositions",
            ConnectionKind::Abstraction => "abstractions",
        }
    }
}

/// A concept.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Node {
    pub id: String,
    pub name: String,
    pub description: Option<String>,
}

/// A relationship type usable as a statement predicate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EdgeType {
    pub id: String,
    pub name: String,
    pub kind: ConnectionKind,
}

/// A reified edge.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Statement {
    pub id: String,
    pub subject: String,
    pub predicate: String,
    pub object: String,
    pub name: Option<String>,
}

impl Statement {
    /// Deterministic statement IRI for a `(s, p, o, name)` tuple.
    pub fn derive_id(
        vocab: &Vocab,
        subject: &str,
        predicate: &str,
        object: &str,
        name: Option<&str>,
    ) -> String {
        let mut hasher = Sha256::new();
        for part in [subject, predicate, object, name.unwrap_or("")] {
            hasher.update(part.as_bytes());
            hasher.update([0u8]);
        }
        let digest = hex::encode(hasher.finalize());
        vocab.term(&format!("statement-{}", &digest[..16]))
    }
}

/// Access level granted to an agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AccessMode {
    Read,
    Write,
    Control,
}

impl AccessMode {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "read" => Some(AccessMode::Read),
            "write" => Some(AccessMode::Write),
            "control" => Some(AccessMode::Control),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            AccessMode::Read => "read",
            AccessMode::Write => "write",
            AccessMode::Control => "control",
        }
    }
}

/// An access grant.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Permission {
    /// WebID of the agent
    pub agent: String,
    pub mode: AccessMode,
}

/// Profile data attached to the owner's WebID.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Profile {
    pub name: Option<String>,
}

/// A named collection of concepts, edge types and statements scoped to
/// one space.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Graph {
    owner: Domain,
    space: Slug,
    vocab: Vocab,
    pub(crate) nodes: BTreeMap<String, Node>,
    pub(crate) edge_types: BTreeMap<String, EdgeType>,
    pub(crate) statements: BTreeMap<String, Statement>,
    pub(crate) triples: BTreeSet<Triple>,
    pub(crate) cross_refs: BTreeMap<String, CrossDomainReference>,
    pub(crate) subscriptions: BTreeSet<Domain>,
    pub(crate) permissions: BTreeSet<Permission>,
    pub(crate) preferences: BTreeMap<String, String>,
    pub(crate) profile: Profile,
}

impl Graph {
    /// Create an empty graph.
    pub fn new(owner: Domain, space: &str) -> Result<Self, GraphError> {
        let space = slugify(space)?;
        let vocab = Vocab::for_domain(&owner);
        Ok(Self {
            owner,
            space,
            vocab,
            nodes: BTreeMap::new(),
            edge_types: BTreeMap::new(),
            statements: BTreeMap::new(),
            triples: BTreeSet::new(),
            cross_refs: BTreeMap::new(),
            subscriptions: BTreeSet::new(),
            permissions: BTreeSet::new(),
            preferences: BTreeMap::new(),
            profile: Profile::default(),
        })
    }

    pub fn owner(&self) -> &Domain {
        &self.owner
    }

    pub fn space(&self) -> &str {
        self.space.as_str()
    }

    pub fn vocab(&self) -> &Vocab {
        &self.vocab
    }

    /// IRI of this graph's space.
    pub fn space_iri(&self) -> String {
        self.owner.uris().space(self.space.as_str())
    }

    // =========================================================================
    // Read access
    // =========================================================================

    pub fn node(&self, id: &str) -> Option<&Node> {
        self.nodes.get(id)
    }

    pub fn nodes(&self) -> impl Iterator<Item = &Node> {
        self.nodes.values()
    }

    pub fn edge_type(&self, id: &str) -> Option<&EdgeType> {
        self.edge_types.get(id)
    }

    pub fn edge_types(&self) -> impl Iterator<Item = &EdgeType> {
        self.edge_types.values()
    }

    pub fn statement(&self, id: &str) -> Option<&Statement> {
        self.statements.get(id)
    }

    pub fn statements(&self) -> impl Iterator<Item = &Statement> {
        self.statements.values()
    }

    pub fn triples(&self) -> impl Iterator<Item = &Triple> {
        self.triples.iter()
    }

    pub fn cross_references(&self) -> impl Iterator<Item = (&String, &CrossDomainReference)> {
        self.cross_refs.iter()
    }

    pub fn subscriptions(&self) -> impl Iterator<Item = &Domain> {
        self.subscriptions.iter()
    }

    pub fn permissions(&self) -> impl Iterator<Item = &Permission> {
        self.permissions.iter()
    }

    pub fn preferences(&self) -> &BTreeMap<String, String> {
        &self.preferences
    }

    pub fn profile(&self) -> &Profile {
        &self.profile
    }

    /// Total number of entities, for status output.
    pub fn len(&self) -> usize {
        self.nodes.len()
            + self.edge_types.len()
            + self.statements.len()
            + self.triples.len()
            + self.cross_refs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    // =========================================================================
    // Mutation
    // =========================================================================

    /// Add a concept by name. The id is `{vocab}{slug(name)}`.
    ///
    /// Re-adding an existing concept updates its name.
    pub fn add_concept(&mut self, name: &str) -> Result<String, GraphError> {
        let slug = slugify(name)?;
        let id = self.vocab.term(slug.as_str());
        self.check_unclaimed(&id, "node")?;
        let description = self.nodes.get(&id).and_then(|n| n.description.clone());
        self.nodes.insert(
            id.clone(),
            Node {
                id: id.clone(),
                name: name.to_string(),
                description,
            },
        );
        Ok(id)
    }

    /// Insert or replace a node.
    pub fn add_node(&mut self, node: Node) -> Result<(), GraphError> {
        self.check_local(&node.id)?;
        self.check_unclaimed(&node.id, "node")?;
        self.nodes.insert(node.id.clone(), node);
        Ok(())
    }

    /// Set a node's description.
    pub fn describe(&mut self, id: &str, description: Option<String>) -> Result<(), GraphError> {
        let node = self
            .nodes
            .get_mut(id)
            .ok_or_else(|| GraphError::NotFound(id.to_string()))?;
        node.description = description;
        Ok(())
    }

    /// Remove a node and every statement and triple that mentions it.
    ///
    /// Statements that mention a removed statement are removed as well.
    pub fn remove_node(&mut self, id: &str) -> Result<Node, GraphError> {
        let node = self
            .nodes
            .remove(id)
            .ok_or_else(|| GraphError::NotFound(id.to_string()))?;

        let mut doomed: BTreeSet<String> = BTreeSet::new();
        doomed.insert(id.to_string());
        loop {
            let next: Vec<String> = self
                .statements
                .values()
                .filter(|s| !doomed.contains(&s.id))
                .filter(|s| {
                    doomed.contains(&s.subject)
                        || doomed.contains(&s.predicate)
                        || doomed.contains(&s.object)
                })
                .map(|s| s.id.clone())
                .collect();
            if next.is_empty() {
                break;
            }
            doomed.extend(next);
        }

        self.statements.retain(|sid, _| !doomed.contains(sid));
        self.triples.retain(|t| {
            let mentions = |term: &Term| term.as_iri().is_some_and(|iri| doomed.contains(iri));
            !mentions(&t.subject) && !mentions(&t.object)
        });
        Ok(node)
    }

    /// Insert or replace an edge type.
    pub fn add_edge_type(&mut self, edge: EdgeType) -> Result<(), GraphError> {
        self.check_local(&edge.id)?;
        self.check_unclaimed(&edge.id, "edge type")?;
        self.edge_types.insert(edge.id.clone(), edge);
        Ok(())
    }

    /// Define an edge type by name. The id is `{vocab}{slug(name)}`.
    pub fn define_edge_type(
        &mut self,
        name: &str,
        kind: ConnectionKind,
    ) -> Result<String, GraphError> {
        let id = self.vocab.term(slugify(name)?.as_str());
        self.add_edge_type(EdgeType {
            id: id.clone(),
            name: name.to_string(),
            kind,
        })?;
        Ok(id)
    }

    /// Add a reified statement and return its id.
    ///
    /// The id is derived from the content when `id` is `None`.
    ///
    /// # Errors
    ///
    /// - [`GraphError::DuplicateId`] if `id` already names a node, edge
    ///   type or cross-domain reference
    /// - [`GraphError::UnknownReference`] if any position does not resolve
    /// - [`GraphError::SelfReference`] if a position names the statement
    /// - [`GraphError::CyclicHierarchy`] for a cycle-closing `rdfs:subClassOf`
    pub fn add_statement(
        &mut self,
        subject: &str,
        predicate: &str,
        object: &str,
        name: Option<&str>,
        id: Option<&str>,
    ) -> Result<String, GraphError> {
        let id = match id {
            Some(id) => {
                self.check_local(id)?;
                self.check_unclaimed(id, "statement")?;
                id.to_string()
            }
            None => Statement::derive_id(&self.vocab, subject, predicate, object, name),
        };

        for position in [subject, predicate, object] {
            if position == id {
                return Err(GraphError::SelfReference(id));
            }
        }
        self.check_resolvable(subject)?;
        self.check_predicate(predicate)?;
        self.check_resolvable(object)?;

        if predicate == vocab::RDFS_SUBCLASS_OF {
            self.check_acyclic(subject, object)?;
        }

        self.statements.insert(
            id.clone(),
            Statement {
                id: id.clone(),
                subject: subject.to_string(),
                predicate: predicate.to_string(),
                object: object.to_string(),
                name: name.map(str::to_string),
            },
        );
        Ok(id)
    }

    /// Remove a statement and anything built on it.
    pub fn remove_statement(&mut self, id: &str) -> Result<Statement, GraphError> {
        let statement = self
            .statements
            .remove(id)
            .ok_or_else(|| GraphError::NotFound(id.to_string()))?;
        let dependents: Vec<String> = self
            .statements
            .values()
            .filter(|s| s.subject == id || s.object == id)
            .map(|s| s.id.clone())
            .collect();
        for dependent in dependents {
            // Already removed through an earlier dependent.
            let _ = self.remove_statement(&dependent);
        }
        Ok(statement)
    }

    /// Add a plain triple.
    ///
    /// `rdfs:subClassOf` triples are checked for cycles.
    pub fn add_triple(&mut self, triple: Triple) -> Result<(), GraphError> {
        if triple.predicate.is_empty() || !triple.predicate.contains(':') {
            return Err(GraphError::InvalidIri(triple.predicate));
        }
        if let Term::Literal(_) = triple.subject {
            return Err(GraphError::InvalidIri(triple.subject.to_string()));
        }
        if triple.predicate == vocab::RDFS_SUBCLASS_OF {
            if let (Some(child), Some(parent)) = (triple.subject.as_iri(), triple.object.as_iri())
            {
                self.check_acyclic(child, parent)?;
            }
        }
        self.triples.insert(triple);
        Ok(())
    }

    pub fn remove_triple(&mut self, triple: &Triple) -> bool {
        self.triples.remove(triple)
    }

    /// Declare `child rdfs:subClassOf parent` as a plain triple.
    pub fn add_subclass(&mut self, child: &str, parent: &str) -> Result<(), GraphError> {
        self.add_triple(Triple::new(
            Term::iri(child),
            vocab::RDFS_SUBCLASS_OF,
            Term::iri(parent),
        ))
    }

    /// Record a reference to a concept in another domain and return its
    /// reference URI.
    pub fn add_cross_reference(
        &mut self,
        target: &str,
        concept: &str,
    ) -> Result<String, GraphError> {
        let reference = CrossDomainReference::new(self.owner.as_str(), target, concept)?;
        let uri = reference.reference_uri();
        self.cross_refs.insert(uri.clone(), reference);
        Ok(uri)
    }

    pub fn remove_cross_reference(&mut self, uri: &str) -> Option<CrossDomainReference> {
        self.cross_refs.remove(uri)
    }

    pub fn subscribe(&mut self, domain: Domain) -> bool {
        self.subscriptions.insert(domain)
    }

    pub fn unsubscribe(&mut self, domain: &Domain) -> bool {
        self.subscriptions.remove(domain)
    }

    pub fn grant(&mut self, permission: Permission) -> bool {
        self.permissions.insert(permission)
    }

    pub fn revoke(&mut self, permission: &Permission) -> bool {
        self.permissions.remove(permission)
    }

    pub fn set_preference(&mut self, key: &str, value: Option<&str>) {
        match value {
            Some(v) => {
                self.preferences.insert(key.to_string(), v.to_string());
            }
            None => {
                self.preferences.remove(key);
            }
        }
    }

    pub fn set_profile_name(&mut self, name: Option<&str>) {
        self.profile.name = name.map(str::to_string);
    }

    // =========================================================================
    // Validation
    // =========================================================================

    fn check_local(&self, iri: &str) -> Result<(), GraphError> {
        let local = self
            .vocab
            .local(iri)
            .ok_or_else(|| GraphError::ForeignConcept {
                iri: iri.to_string(),
                owner: self.owner.to_string(),
            })?;
        let file_safe = !local.is_empty()
            && local
                .chars()
                .all(|c| c.is_alphanumeric() || c == '-' || c == '_');
        if !file_safe {
            return Err(GraphError::InvalidIri(iri.to_string()));
        }
        Ok(())
    }

    /// Reject `id` when an entity of another kind already holds it.
    ///
    /// Re-adding an entity of the same kind is an update.
    fn check_unclaimed(&self, id: &str, kind: &'static str) -> Result<(), GraphError> {
        let existing = if self.nodes.contains_key(id) {
            "node"
        } else if self.edge_types.contains_key(id) {
            "edge type"
        } else if self.statements.contains_key(id) {
            "statement"
        } else if self.cross_refs.contains_key(id) {
            "cross-domain reference"
        } else {
            return Ok(());
        };
        if existing == kind {
            Ok(())
        } else {
            Err(GraphError::DuplicateId {
                id: id.to_string(),
                existing,
            })
        }
    }

    /// Whether an IRI names something this graph knows.
    pub fn resolves(&self, iri: &str) -> bool {
        self.nodes.contains_key(iri)
            || self.edge_types.contains_key(iri)
            || self.statements.contains_key(iri)
            || self.cross_refs.contains_key(iri)
            || self.cross_refs.values().any(|r| r.target_uri() == iri)
    }

    fn check_resolvable(&self, iri: &str) -> Result<(), GraphError> {
        if self.resolves(iri) {
            Ok(())
        } else {
            Err(GraphError::UnknownReference(iri.to_string()))
        }
    }

    fn check_predicate(&self, iri: &str) -> Result<(), GraphError> {
        let well_known = vocab::WELL_KNOWN_PREDICATES.contains(&iri)
            || iri == self.vocab.references()
            || iri == self.vocab.linked_thinking();
        if well_known || self.edge_types.contains_key(iri) {
            Ok(())
        } else {
            Err(GraphError::UnknownReference(iri.to_string()))
        }
    }

    /// Parents of a class across both plain triples and statements.
    fn parents_of(&self, child: &str) -> Vec<&str> {
        let from_triples = self.triples.iter().filter_map(|t| {
            (t.predicate == vocab::RDFS_SUBCLASS_OF && t.subject.as_iri() == Some(child))
                .then(|| t.object.as_iri())
                .flatten()
        });
        let from_statements = self
            .statements
            .values()
            .filter(|s| s.predicate == vocab::RDFS_SUBCLASS_OF && s.subject == child)
            .map(|s| s.object.as_str());
        from_triples.chain(from_statements).collect()
    }

    /// Check that the whole `rdfs:subClassOf` hierarchy is acyclic.
    ///
    /// Mutations check each new edge; this is for graphs assembled
    /// without them, such as merge results.
    pub fn check_hierarchy(&self) -> Result<(), GraphError> {
        let triple_edges = self.triples.iter().filter_map(|t| {
            if t.predicate != vocab::RDFS_SUBCLASS_OF {
                return None;
            }
            Some((t.subject.as_iri()?, t.object.as_iri()?))
        });
        let statement_edges = self
            .statements
            .values()
            .filter(|s| s.predicate == vocab::RDFS_SUBCLASS_OF)
            .map(|s| (s.subject.as_str(), s.object.as_str()));

        for (child, parent) in triple_edges.chain(statement_edges) {
            let mut seen = BTreeSet::new();
            let mut stack = vec![parent];
            while let Some(current) = stack.pop() {
                if current == child {
                    return Err(GraphError::CyclicHierarchy {
                        child: child.to_string(),
                        parent: parent.to_string(),
                    });
                }
                if seen.insert(current) {
                    stack.extend(self.parents_of(current));
                }
            }
        }
        Ok(())
    }

    /// Check that every statement position resolves.
    ///
    /// Mutations check each new statement; this is for graphs assembled
    /// without them, where a statement can outlive the node it names.
    pub fn check_references(&self) -> Result<(), GraphError> {
        for statement in self.statements.values() {
            self.check_resolvable(&statement.subject)?;
            self.check_predicate(&statement.predicate)?;
            self.check_resolvable(&statement.object)?;
        }
        Ok(())
    }

    fn check_acyclic(&self, child: &str, parent: &str) -> Result<(), GraphError> {
        let cyclic = || GraphError::CyclicHierarchy {
            child: child.to_string(),
            parent: parent.to_string(),
        };
        if child == parent {
            return Err(cyclic());
        }
        let mut seen = BTreeSet::new();
        let mut stack = vec![parent];
        while let Some(current) = stack.pop() {
            if current == child {
                return Err(cyclic());
            }
            if seen.insert(current) {
                stack.extend(self.parents_of(current));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn graph() -> Graph {
        Graph::new(Domain::normalize("alice.com").unwrap(), "personal").unwrap()
    }

    mod concepts {
        use super::*;

        #[test]
        fn add_concept_uses_slug() {
            let mut g = graph();
            let id = g.add_concept("Climate Policy").unwrap();
            assert_eq!(id, "https://alice.com/redstring/vocab/climatepolicy");
            assert_eq!(g.node(&id).unwrap().name, "Climate Policy");
        }

        #[test]
        fn foreign_node_rejected() {
            let mut g = graph();
            let err = g
                .add_node(Node {
                    id: "https://bob.net/redstring/vocab/x".to_string(),
                    name: "x".to_string(),
                    description: None,
                })
                .unwrap_err();
            assert!(matches!(err, GraphError::ForeignConcept { .. }));
        }

        #[test]
        fn unsafe_local_name_rejected() {
            let mut g = graph();
            let err = g
                .add_node(Node {
                    id: "https://alice.com/redstring/vocab/a/b".to_string(),
                    name: "x".to_string(),
                    description: None,
                })
                .unwrap_err();
            assert!(matches!(err, GraphError::InvalidIri(_)));
        }

        #[test]
        fn readding_keeps_description() {
            let mut g = graph();
            let id = g.add_concept("Tax").unwrap();
            g.describe(&id, Some("levy".to_string())).unwrap();
            g.add_concept("TAX").unwrap();
            let node = g.node(&id).unwrap();
            assert_eq!(node.name, "TAX");
            assert_eq!(node.description.as_deref(), Some("levy"));
        }
    }

    mod statements {
        use super::*;

        #[test]
        fn statement_requires_known_positions() {
            let mut g = graph();
            let a = g.add_concept("A").unwrap();
            let err = g
                .add_statement(&a, vocab::RDFS_SEE_ALSO, "https://alice.com/redstring/vocab/missing", None, None)
                .unwrap_err();
            assert!(matches!(err, GraphError::UnknownReference(_)));
        }

        #[test]
        fn statement_predicate_must_be_edge_type_or_well_known() {
            let mut g = graph();
            let a = g.add_concept("A").unwrap();
            let b = g.add_concept("B").unwrap();
            assert!(g
                .add_statement(&a, "https://alice.com/redstring/vocab/causes", &b, None, None)
                .is_err());

            let causes = g.define_edge_type("causes", ConnectionKind::Influence).unwrap();
            let id = g.add_statement(&a, &causes, &b, Some("drives"), None).unwrap();
            assert!(id.starts_with("https://alice.com/redstring/vocab/statement-"));
            assert_eq!(g.statement(&id).unwrap().name.as_deref(), Some("drives"));
        }

        #[test]
        fn derived_ids_are_deterministic_and_name_sensitive() {
            let vocab = Vocab::for_domain(&Domain::normalize("alice.com").unwrap());
            let one = Statement::derive_id(&vocab, "s", "p", "o", None);
            let two = Statement::derive_id(&vocab, "s", "p", "o", None);
            let named = Statement::derive_id(&vocab, "s", "p", "o", Some("n"));
            assert_eq!(one, two);
            assert_ne!(one, named);
        }

        #[test]
        fn explicit_id_cannot_reuse_a_node() {
            let mut g = graph();
            let a = g.add_concept("A").unwrap();
            let c = g.add_concept("C").unwrap();
            let err = g
                .add_statement(&a, vocab::RDFS_SEE_ALSO, &a, Some("shapes"), Some(&c))
                .unwrap_err();
            assert_eq!(
                err,
                GraphError::DuplicateId {
                    id: c.clone(),
                    existing: "node"
                }
            );
            assert!(g.statement(&c).is_none());
        }

        #[test]
        fn explicit_id_may_replace_a_statement() {
            let mut g = graph();
            let a = g.add_concept("A").unwrap();
            let b = g.add_concept("B").unwrap();
            let id = "https://alice.com/redstring/vocab/stmt1";
            g.add_statement(&a, vocab::RDFS_SEE_ALSO, &b, None, Some(id)).unwrap();
            g.add_statement(&b, vocab::RDFS_SEE_ALSO, &a, Some("back"), Some(id))
                .unwrap();
            assert_eq!(g.statement(id).unwrap().subject, b);
        }

        #[test]
        fn concept_and_edge_type_cannot_share_an_id() {
            let mut g = graph();
            g.define_edge_type("drives", ConnectionKind::Influence).unwrap();
            assert!(matches!(
                g.add_concept("Drives"),
                Err(GraphError::DuplicateId { existing: "edge type", .. })
            ));
            g.add_concept("Policy").unwrap();
            assert!(matches!(
                g.define_edge_type("policy", ConnectionKind::Influence),
                Err(GraphError::DuplicateId { existing: "node", .. })
            ));
        }

        #[test]
        fn statement_cannot_reference_itself() {
            let mut g = graph();
            let a = g.add_concept("A").unwrap();
            let id = "https://alice.com/redstring/vocab/stmt1";
            let err = g
                .add_statement(&a, vocab::RDFS_SEE_ALSO, id, None, Some(id))
                .unwrap_err();
            assert!(matches!(err, GraphError::SelfReference(_)));
        }

        #[test]
        fn statement_about_statement_allowed() {
            let mut g = graph();
            let a = g.add_concept("A").unwrap();
            let b = g.add_concept("B").unwrap();
            let s1 = g.add_statement(&a, vocab::RDFS_SEE_ALSO, &b, None, None).unwrap();
            let s2 = g.add_statement(&s1, vocab::RDFS_SEE_ALSO, &a, None, None).unwrap();
            assert!(g.statement(&s2).is_some());
        }

        #[test]
        fn cross_reference_targets_resolve() {
            let mut g = graph();
            let a = g.add_concept("A").unwrap();
            let reference = g.add_cross_reference("bob.net", "Carbon Tax").unwrap();
            let references = g.vocab().references();
            g.add_statement(&a, &references, &reference, None, None)
                .unwrap();
            g.add_statement(
                &a,
                vocab::RDFS_SEE_ALSO,
                "https://bob.net/redstring/vocab/carbontax",
                None,
                None,
            )
            .unwrap();
        }

        #[test]
        fn removing_statement_cascades_to_dependents() {
            let mut g = graph();
            let a = g.add_concept("A").unwrap();
            let b = g.add_concept("B").unwrap();
            let s1 = g.add_statement(&a, vocab::RDFS_SEE_ALSO, &b, None, None).unwrap();
            let s2 = g.add_statement(&s1, vocab::RDFS_LABEL, &a, None, None).unwrap();
            g.remove_statement(&s1).unwrap();
            assert!(g.statement(&s2).is_none());
        }
    }

    mod hierarchy {
        use super::*;

        #[test]
        fn direct_cycle_rejected() {
            let mut g = graph();
            let a = g.add_concept("A").unwrap();
            let b = g.add_concept("B").unwrap();
            g.add_subclass(&a, &b).unwrap();
            let err = g.add_subclass(&b, &a).unwrap_err();
            assert!(matches!(err, GraphError::CyclicHierarchy { .. }));
        }

        #[test]
        fn self_subclass_rejected() {
            let mut g = graph();
            let a = g.add_concept("A").unwrap();
            assert!(g.add_subclass(&a, &a).is_err());
        }

        #[test]
        fn transitive_cycle_through_statement_rejected() {
            let mut g = graph();
            let a = g.add_concept("A").unwrap();
            let b = g.add_concept("B").unwrap();
            let c = g.add_concept("C").unwrap();
            g.add_subclass(&a, &b).unwrap();
            g.add_statement(&b, vocab::RDFS_SUBCLASS_OF, &c, None, None)
                .unwrap();
            let err = g
                .add_statement(&c, vocab::RDFS_SUBCLASS_OF, &a, None, None)
                .unwrap_err();
            assert!(matches!(err, GraphError::CyclicHierarchy { .. }));
        }

        #[test]
        fn diamond_is_fine() {
            let mut g = graph();
            let a = g.add_concept("A").unwrap();
            let b = g.add_concept("B").unwrap();
            let c = g.add_concept("C").unwrap();
            let d = g.add_concept("D").unwrap();
            g.add_subclass(&a, &b).unwrap();
            g.add_subclass(&a, &c).unwrap();
            g.add_subclass(&b, &d).unwrap();
            g.add_subclass(&c, &d).unwrap();
            assert!(g.check_hierarchy().is_ok());
        }

        #[test]
        fn check_hierarchy_finds_assembled_cycle() {
            let mut g = graph();
            let a = g.add_concept("A").unwrap();
            let b = g.add_concept("B").unwrap();
            g.add_subclass(&a, &b).unwrap();
            // Bypass the per-edge check, as a merge would
            g.triples.insert(Triple::new(
                Term::iri(&b),
                vocab::RDFS_SUBCLASS_OF,
                Term::iri(&a),
            ));
            assert!(matches!(
                g.check_hierarchy(),
                Err(GraphError::CyclicHierarchy { .. })
            ));
        }
    }

    mod references {
        use super::*;

        #[test]
        fn assembled_graph_with_dangling_statement_fails() {
            let mut g = graph();
            let a = g.add_concept("A").unwrap();
            let b = g.add_concept("B").unwrap();
            g.add_statement(&a, vocab::RDFS_SEE_ALSO, &b, None, None).unwrap();
            assert!(g.check_references().is_ok());

            // Drop the node without the cascade, as a merge would
            g.nodes.remove(&b);
            assert_eq!(g.check_references(), Err(GraphError::UnknownReference(b)));
        }
    }

    mod removal {
        use super::*;

        #[test]
        fn remove_node_cascades() {
            let mut g = graph();
            let a = g.add_concept("A").unwrap();
            let b = g.add_concept("B").unwrap();
            let s = g.add_statement(&a, vocab::RDFS_SEE_ALSO, &b, None, None).unwrap();
            let meta = g.add_statement(&s, vocab::RDFS_LABEL, &b, None, None).unwrap();
            g.add_subclass(&b, &a).unwrap();

            g.remove_node(&a).unwrap();

            assert!(g.node(&a).is_none());
            assert!(g.statement(&s).is_none());
            assert!(g.statement(&meta).is_none());
            assert_eq!(g.triples().count(), 0);
            assert!(g.node(&b).is_some());
        }

        #[test]
        fn remove_missing_node_errors() {
            let mut g = graph();
            assert!(matches!(
                g.remove_node("https://alice.com/redstring/vocab/none"),
                Err(GraphError::NotFound(_))
            ));
        }
    }

    #[test]
    fn literal_subject_rejected() {
        let mut g = graph();
        let err = g
            .add_triple(Triple::new(
                Term::literal("x"),
                vocab::RDFS_LABEL,
                Term::literal("y"),
            ))
            .unwrap_err();
        assert!(matches!(err, GraphError::InvalidIri(_)));
    }

    #[test]
    fn preferences_set_and_clear() {
        let mut g = graph();
        g.set_preference("theme", Some("dark"));
        assert_eq!(g.preferences().get("theme").map(String::as_str), Some("dark"));
        g.set_preference("theme", None);
        assert!(g.preferences().is_empty());
    }
}
