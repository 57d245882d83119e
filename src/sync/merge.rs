//! sync::merge
//!
//! Three-way merge of graphs at triple granularity.
//!
//! # Policy
//!
//! With `base` the last state both sides agreed on, the merge result is
//!
//! ```text
//! (ours ∩ theirs) ∪ (ours − base) ∪ (theirs − base)
//! ```
//!
//! Additions from either side survive. A triple from `base` survives only
//! if neither side removed it. The result is rebuilt into a `Graph`, so
//! every entity is reassembled from its triples.
//!
//! Blank node labels carry no identity across serializations. Before the
//! set operations every blank node is relabeled from a hash of the
//! triples around it, so equal structures compare equal on both sides.
//!
//! A merge fails rather than guess when both sides gave one subject
//! different names or descriptions, when the union closes a cycle in the
//! class hierarchy, or when one side removed a node or edge type that the
//! other side's new statements still name.

use std::collections::{BTreeMap, BTreeSet};

use sha2::{Digest, Sha256};
use thiserror::Error;

use crate::graph::rdf;
use crate::graph::{vocab, Graph, GraphError, Term, Triple};

/// Predicates that hold at most one value per subject.
const FUNCTIONAL_PREDICATES: [&str; 2] = [vocab::SCHEMA_NAME, vocab::SCHEMA_DESCRIPTION];

/// Why two graphs could not be merged.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum MergeError {
    /// The sides describe different graphs.
    #[error("cannot merge {ours} with {theirs}")]
    Incompatible { ours: String, theirs: String },

    /// Both sides set a single-valued property to different values.
    #[error("conflicting values for <{predicate}> of {subject}")]
    ConflictingValues { subject: String, predicate: String },

    /// The merged triples do not form a valid graph.
    #[error("merged graph is invalid: {0}")]
    Invalid(#[from] GraphError),
}

/// Merge `theirs` into `ours` relative to `base`.
///
/// A missing `base` means the sides share no history; the result is the
/// union of both.
pub fn merge_graphs(base: Option<&Graph>, ours: &Graph, theirs: &Graph) -> Result<Graph, MergeError> {
    if ours.space_iri() != theirs.space_iri() {
        return Err(MergeError::Incompatible {
            ours: ours.space_iri(),
            theirs: theirs.space_iri(),
        });
    }

    let ours_set = canonical_triples(ours);
    let theirs_set = canonical_triples(theirs);
    let base_set = base.map(canonical_triples).unwrap_or_default();

    let merged = merge_triples(&base_set, &ours_set, &theirs_set);
    check_functional(&merged)?;

    let graph = rdf::from_triples(merged)?;
    graph.check_hierarchy()?;
    graph.check_references()?;
    Ok(graph)
}

/// Three-way merge of triple sets.
pub fn merge_triples(
    base: &BTreeSet<Triple>,
    ours: &BTreeSet<Triple>,
    theirs: &BTreeSet<Triple>,
) -> BTreeSet<Triple> {
    let mut merged: BTreeSet<Triple> = ours.intersection(theirs).cloned().collect();
    merged.extend(ours.difference(base).cloned());
    merged.extend(theirs.difference(base).cloned());
    merged
}

/// The graph's triples with content-derived blank node labels.
pub fn canonical_triples(graph: &Graph) -> BTreeSet<Triple> {
    canonicalize_blanks(rdf::to_triples(graph))
}

/// Relabel blank nodes from a hash of their incoming and outgoing triples.
///
/// Blank nodes nested inside other blank nodes hash their neighbors as
/// anonymous, which is enough for the shallow structures graphs emit.
pub fn canonicalize_blanks(triples: Vec<Triple>) -> BTreeSet<Triple> {
    let mut neighborhoods: BTreeMap<String, Vec<String>> = BTreeMap::new();
    for t in &triples {
        if let Some(label) = t.subject.as_blank() {
            neighborhoods
                .entry(label.to_string())
                .or_default()
                .push(format!("out {} {}", t.predicate, anonymous(&t.object)));
        }
        if let Some(label) = t.object.as_blank() {
            neighborhoods
                .entry(label.to_string())
                .or_default()
                .push(format!("in {} {}", anonymous(&t.subject), t.predicate));
        }
    }

    let labels: BTreeMap<String, String> = neighborhoods
        .into_iter()
        .map(|(label, mut lines)| {
            lines.sort();
            let mut hasher = Sha256::new();
            for line in &lines {
                hasher.update(line.as_bytes());
                hasher.update(b"\n");
            }
            let digest = hex::encode(hasher.finalize());
            (label, format!("c{}", &digest[..16]))
        })
        .collect();

    let relabel = |term: Term| match term {
        Term::Blank(label) => Term::Blank(labels.get(&label).cloned().unwrap_or(label)),
        other => other,
    };
    triples
        .into_iter()
        .map(|t| Triple::new(relabel(t.subject), t.predicate, relabel(t.object)))
        .collect()
}

fn anonymous(term: &Term) -> String {
    if term.is_blank() {
        "_".to_string()
    } else {
        term.to_string()
    }
}

fn check_functional(triples: &BTreeSet<Triple>) -> Result<(), MergeError> {
    let mut seen: BTreeMap<(&Term, &str), &Term> = BTreeMap::new();
    for t in triples {
        if !FUNCTIONAL_PREDICATES.contains(&t.predicate.as_str()) {
            continue;
        }
        let existing = seen
            .entry((&t.subject, t.predicate.as_str()))
            .or_insert(&t.object);
        if *existing != &t.object {
            return Err(MergeError::ConflictingValues {
                subject: t.subject.to_string(),
                predicate: t.predicate.clone(),
            });
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::Domain;
    use crate::graph::ConnectionKind;

    fn base() -> Graph {
        let mut g = Graph::new(Domain::normalize("alice.com").unwrap(), "personal").unwrap();
        g.add_concept("Climate Policy").unwrap();
        g.add_concept("Carbon Tax").unwrap();
        g.define_edge_type("drives", ConnectionKind::Influence)
            .unwrap();
        g
    }

    fn iri(local: &str) -> String {
        format!("https://alice.com/redstring/vocab/{}", local)
    }

    #[test]
    fn disjoint_statements_both_survive() {
        let base = base();
        let mut ours = base.clone();
        let mut theirs = base.clone();
        let a = ours
            .add_statement(&iri("carbontax"), &iri("drives"), &iri("climatepolicy"), Some("shapes"), None)
            .unwrap();
        let b = theirs
            .add_statement(&iri("climatepolicy"), &iri("drives"), &iri("carbontax"), None, None)
            .unwrap();

        let merged = merge_graphs(Some(&base), &ours, &theirs).unwrap();
        assert!(merged.statement(&a).is_some());
        assert!(merged.statement(&b).is_some());
    }

    #[test]
    fn local_removal_wins_over_stale_remote() {
        let base = base();
        let mut ours = base.clone();
        ours.remove_node(&iri("carbontax")).unwrap();
        let mut theirs = base.clone();
        theirs.add_concept("Emissions").unwrap();

        let merged = merge_graphs(Some(&base), &ours, &theirs).unwrap();
        assert!(merged.node(&iri("carbontax")).is_none());
        assert!(merged.node(&iri("emissions")).is_some());
    }

    #[test]
    fn remote_removal_applies_when_untouched_locally() {
        let base = base();
        let ours = base.clone();
        let mut theirs = base.clone();
        theirs.remove_node(&iri("carbontax")).unwrap();

        let merged = merge_graphs(Some(&base), &ours, &theirs).unwrap();
        assert!(merged.node(&iri("carbontax")).is_none());
    }

    #[test]
    fn no_base_is_union() {
        let mut ours = base();
        ours.add_concept("Local").unwrap();
        let mut theirs = base();
        theirs.add_concept("Remote").unwrap();

        let merged = merge_graphs(None, &ours, &theirs).unwrap();
        assert!(merged.node(&iri("local")).is_some());
        assert!(merged.node(&iri("remote")).is_some());
    }

    #[test]
    fn preferences_merge_despite_blank_labels() {
        let mut base = base();
        base.set_preference("theme", Some("dark"));
        let mut ours = base.clone();
        ours.set_preference("lang", Some("en"));
        let mut theirs = base.clone();
        theirs.set_preference("font", Some("serif"));

        let merged = merge_graphs(Some(&base), &ours, &theirs).unwrap();
        let keys: Vec<&str> = merged.preferences().keys().map(String::as_str).collect();
        assert_eq!(keys, vec!["font", "lang", "theme"]);
    }

    #[test]
    fn diverging_descriptions_conflict() {
        let base = base();
        let mut ours = base.clone();
        ours.describe(&iri("carbontax"), Some("ours".into())).unwrap();
        let mut theirs = base.clone();
        theirs.describe(&iri("carbontax"), Some("theirs".into())).unwrap();

        let err = merge_graphs(Some(&base), &ours, &theirs).unwrap_err();
        assert!(matches!(err, MergeError::ConflictingValues { .. }));
    }

    #[test]
    fn concurrent_subclass_cycle_is_rejected() {
        let base = base();
        let mut ours = base.clone();
        ours.add_subclass(&iri("carbontax"), &iri("climatepolicy")).unwrap();
        let mut theirs = base.clone();
        theirs.add_subclass(&iri("climatepolicy"), &iri("carbontax")).unwrap();

        let err = merge_graphs(Some(&base), &ours, &theirs).unwrap_err();
        assert!(matches!(err, MergeError::Invalid(GraphError::CyclicHierarchy { .. })));
    }

    #[test]
    fn statement_about_removed_node_is_rejected() {
        let base = base();
        let mut ours = base.clone();
        ours.remove_node(&iri("carbontax")).unwrap();
        let mut theirs = base.clone();
        theirs
            .add_statement(&iri("carbontax"), &iri("drives"), &iri("climatepolicy"), None, None)
            .unwrap();

        let err = merge_graphs(Some(&base), &ours, &theirs).unwrap_err();
        assert_eq!(
            err,
            MergeError::Invalid(GraphError::UnknownReference(iri("carbontax")))
        );
        // Symmetric: the removal may come from either side
        let err = merge_graphs(Some(&base), &theirs, &ours).unwrap_err();
        assert!(matches!(err, MergeError::Invalid(GraphError::UnknownReference(_))));
    }

    #[test]
    fn statement_with_removed_predicate_is_rejected() {
        let mut base = base();
        base.define_edge_type("limits", ConnectionKind::Influence).unwrap();
        let mut ours = base.clone();
        ours.edge_types.remove(&iri("limits"));
        let mut theirs = base.clone();
        theirs
            .add_statement(&iri("carbontax"), &iri("limits"), &iri("climatepolicy"), None, None)
            .unwrap();

        let err = merge_graphs(Some(&base), &ours, &theirs).unwrap_err();
        assert_eq!(
            err,
            MergeError::Invalid(GraphError::UnknownReference(iri("limits")))
        );
    }

    #[test]
    fn different_spaces_are_incompatible() {
        let ours = base();
        let theirs = Graph::new(Domain::normalize("alice.com").unwrap(), "work").unwrap();
        assert!(matches!(
            merge_graphs(None, &ours, &theirs),
            Err(MergeError::Incompatible { .. })
        ));
    }

    #[test]
    fn canonical_labels_ignore_rendering_position() {
        let mut one = base();
        one.set_preference("theme", Some("dark"));
        let mut two = one.clone();
        // Shifts the position, and so the raw label, of "theme"
        two.set_preference("aaa", Some("first"));

        let one = canonical_triples(&one);
        let two = canonical_triples(&two);
        assert!(one.is_subset(&two));
    }

    #[test]
    fn triple_merge_is_three_way() {
        let t = |s: &str| Triple::new(Term::iri(iri(s)), vocab::RDFS_LABEL, Term::literal(s));
        let base: BTreeSet<Triple> = [t("kept"), t("dropped-ours"), t("dropped-theirs")].into();
        let ours: BTreeSet<Triple> = [t("kept"), t("dropped-theirs"), t("new-ours")].into();
        let theirs: BTreeSet<Triple> = [t("kept"), t("dropped-ours"), t("new-theirs")].into();

        let merged = merge_triples(&base, &ours, &theirs);
        let expected: BTreeSet<Triple> = [t("kept"), t("new-ours"), t("new-theirs")].into();
        assert_eq!(merged, expected);
    }
}
