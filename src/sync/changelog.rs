//! sync::changelog
//!
//! Graph mutations and the ordered log of those not yet durable.
//!
//! Every local edit is a [`Mutation`]. The engine applies it to its
//! in-memory graph and appends it here with a monotonic sequence number.
//! A flush that reaches quorum truncates the log through the sequence it
//! carried.

use std::collections::VecDeque;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::core::Domain;
use crate::graph::{ConnectionKind, EdgeType, Graph, GraphError, Node, Permission, Triple};

/// One local edit to a graph.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", content = "args", rename_all = "snake_case")]
pub enum Mutation {
    AddConcept {
        name: String,
    },
    AddNode(Node),
    Describe {
        id: String,
        description: Option<String>,
    },
    RemoveNode {
        id: String,
    },
    DefineEdgeType {
        name: String,
        kind: ConnectionKind,
    },
    AddEdgeType(EdgeType),
    AddStatement {
        subject: String,
        predicate: String,
        object: String,
        name: Option<String>,
        id: Option<String>,
    },
    RemoveStatement {
        id: String,
    },
    AddTriple(Triple),
    RemoveTriple(Triple),
    AddSubclass {
        child: String,
        parent: String,
    },
    AddCrossReference {
        target: String,
        concept: String,
    },
    RemoveCrossReference {
        uri: String,
    },
    Subscribe(Domain),
    Unsubscribe(Domain),
    Grant(Permission),
    Revoke(Permission),
    SetPreference {
        key: String,
        value: Option<String>,
    },
    SetProfileName(Option<String>),
}

impl Mutation {
    /// Apply to `graph`.
    ///
    /// Returns the id of the entity created or touched, when there is one.
    /// A failed mutation leaves `graph` unchanged.
    pub fn apply(&self, graph: &mut Graph) -> Result<Option<String>, GraphError> {
        match self {
            Mutation::AddConcept { name } => graph.add_concept(name).map(Some),
            Mutation::AddNode(node) => {
                graph.add_node(node.clone())?;
                Ok(Some(node.id.clone()))
            }
            Mutation::Describe { id, description } => {
                graph.describe(id, description.clone())?;
                Ok(Some(id.clone()))
            }
            Mutation::RemoveNode { id } => graph.remove_node(id).map(|n| Some(n.id)),
            Mutation::DefineEdgeType { name, kind } => {
                graph.define_edge_type(name, *kind).map(Some)
            }
            Mutation::AddEdgeType(edge) => {
                graph.add_edge_type(edge.clone())?;
                Ok(Some(edge.id.clone()))
            }
            Mutation::AddStatement {
                subject,
                predicate,
                object,
                name,
                id,
            } => graph
                .add_statement(subject, predicate, object, name.as_deref(), id.as_deref())
                .map(Some),
            Mutation::RemoveStatement { id } => graph.remove_statement(id).map(|s| Some(s.id)),
            Mutation::AddTriple(triple) => graph.add_triple(triple.clone()).map(|_| None),
            Mutation::RemoveTriple(triple) => {
                graph.remove_triple(triple);
                Ok(None)
            }
            Mutation::AddSubclass { child, parent } => {
                graph.add_subclass(child, parent)?;
                Ok(Some(child.clone()))
            }
            Mutation::AddCrossReference { target, concept } => {
                graph.add_cross_reference(target, concept).map(Some)
            }
            Mutation::RemoveCrossReference { uri } => {
                Ok(graph.remove_cross_reference(uri).map(|_| uri.clone()))
            }
            Mutation::Subscribe(domain) => {
                graph.subscribe(domain.clone());
                Ok(None)
            }
            Mutation::Unsubscribe(domain) => {
                graph.unsubscribe(domain);
                Ok(None)
            }
            Mutation::Grant(permission) => {
                graph.grant(permission.clone());
                Ok(None)
            }
            Mutation::Revoke(permission) => {
                graph.revoke(permission);
                Ok(None)
            }
            Mutation::SetPreference { key, value } => {
                graph.set_preference(key, value.as_deref());
                Ok(None)
            }
            Mutation::SetProfileName(name) => {
                graph.set_profile_name(name.as_deref());
                Ok(None)
            }
        }
    }

    /// Short operation name for logs.
    pub fn name(&self) -> &'static str {
        match self {
            Mutation::AddConcept { .. } => "add_concept",
            Mutation::AddNode(_) => "add_node",
            Mutation::Describe { .. } => "describe",
            Mutation::RemoveNode { .. } => "remove_node",
            Mutation::DefineEdgeType { .. } => "define_edge_type",
            Mutation::AddEdgeType(_) => "add_edge_type",
            Mutation::AddStatement { .. } => "add_statement",
            Mutation::RemoveStatement { .. } => "remove_statement",
            Mutation::AddTriple(_) => "add_triple",
            Mutation::RemoveTriple(_) => "remove_triple",
            Mutation::AddSubclass { .. } => "add_subclass",
            Mutation::AddCrossReference { .. } => "add_cross_reference",
            Mutation::RemoveCrossReference { .. } => "remove_cross_reference",
            Mutation::Subscribe(_) => "subscribe",
            Mutation::Unsubscribe(_) => "unsubscribe",
            Mutation::Grant(_) => "grant",
            Mutation::Revoke(_) => "revoke",
            Mutation::SetPreference { .. } => "set_preference",
            Mutation::SetProfileName(_) => "set_profile_name",
        }
    }
}

/// A logged mutation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeEntry {
    pub seq: u64,
    pub mutation: Mutation,
    pub at: DateTime<Utc>,
}

/// Mutations applied locally but not yet durable.
#[derive(Debug, Default)]
pub struct ChangeLog {
    entries: VecDeque<ChangeEntry>,
    last_seq: u64,
}

impl ChangeLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a mutation and return its sequence number.
    pub fn append(&mut self, mutation: Mutation) -> u64 {
        self.last_seq += 1;
        self.entries.push_back(ChangeEntry {
            seq: self.last_seq,
            mutation,
            at: Utc::now(),
        });
        self.last_seq
    }

    /// Take a sequence number for a change that has no mutation of its
    /// own, such as adopted remote edits.
    pub fn advance(&mut self) -> u64 {
        self.last_seq += 1;
        self.last_seq
    }

    /// Sequence number of the newest mutation, durable or not.
    pub fn last_seq(&self) -> u64 {
        self.last_seq
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Drop entries up to and including `seq`. Returns how many were dropped.
    pub fn truncate_through(&mut self, seq: u64) -> usize {
        let before = self.entries.len();
        while self.entries.front().is_some_and(|e| e.seq <= seq) {
            self.entries.pop_front();
        }
        before - self.entries.len()
    }

    /// Entries newer than `seq`, oldest first.
    pub fn entries_after(&self, seq: u64) -> impl Iterator<Item = &ChangeEntry> {
        self.entries.iter().filter(move |e| e.seq > seq)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn graph() -> Graph {
        Graph::new(Domain::normalize("alice.com").unwrap(), "personal").unwrap()
    }

    #[test]
    fn sequence_is_monotonic() {
        let mut log = ChangeLog::new();
        let a = log.append(Mutation::AddConcept { name: "A".into() });
        let b = log.append(Mutation::AddConcept { name: "B".into() });
        assert_eq!((a, b), (1, 2));
        assert_eq!(log.last_seq(), 2);
    }

    #[test]
    fn truncate_keeps_newer_entries() {
        let mut log = ChangeLog::new();
        for name in ["A", "B", "C"] {
            log.append(Mutation::AddConcept { name: name.into() });
        }
        assert_eq!(log.truncate_through(2), 2);
        assert_eq!(log.len(), 1);
        assert_eq!(log.entries_after(0).next().unwrap().seq, 3);
        // Sequence numbers never restart
        assert_eq!(log.append(Mutation::AddConcept { name: "D".into() }), 4);
    }

    #[test]
    fn advance_takes_a_sequence_without_an_entry() {
        let mut log = ChangeLog::new();
        log.append(Mutation::AddConcept { name: "A".into() });
        assert_eq!(log.advance(), 2);
        assert_eq!(log.len(), 1);
        assert_eq!(log.append(Mutation::AddConcept { name: "B".into() }), 3);
    }

    #[test]
    fn apply_returns_created_id() {
        let mut g = graph();
        let id = Mutation::AddConcept {
            name: "Climate Policy".into(),
        }
        .apply(&mut g)
        .unwrap();
        assert_eq!(
            id.as_deref(),
            Some("https://alice.com/redstring/vocab/climatepolicy")
        );
    }

    #[test]
    fn failed_apply_is_reported() {
        let mut g = graph();
        let err = Mutation::AddStatement {
            subject: "https://alice.com/redstring/vocab/a".into(),
            predicate: "https://alice.com/redstring/vocab/p".into(),
            object: "https://alice.com/redstring/vocab/b".into(),
            name: None,
            id: None,
        }
        .apply(&mut g)
        .unwrap_err();
        assert!(matches!(err, GraphError::UnknownReference(_)));
        assert!(g.statements().next().is_none());
    }

    #[test]
    fn mutations_serialize_tagged() {
        let json = serde_json::to_string(&Mutation::AddConcept { name: "A".into() }).unwrap();
        assert_eq!(json, r#"{"op":"add_concept","args":{"name":"A"}}"#);
    }
}
