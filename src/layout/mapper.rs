//! layout::mapper
//!
//! Bidirectional mapping between a [`Graph`] and the canonical file layout.
//!
//! # Operations
//!
//! - [`serialize`] renders one Turtle file per entity
//! - [`parse`] rebuilds the graph from those files
//! - [`export_all`] renders the whole graph as one N-Quads stream
//! - [`import_all`] rebuilds the graph from that stream
//! - [`diff`] computes the writes that turn one rendering into another
//!
//! Blank node labels are scoped per file on parse and are not stable
//! across a round trip.

use std::collections::BTreeMap;

use thiserror::Error;
use tracing::debug;

use super::paths;
use super::{nquads, turtle};
use crate::graph::rdf;
use crate::graph::term::{Term, Triple};
use crate::graph::vocab;
use crate::graph::{ConnectionKind, Graph, GraphError};

/// Rendered files keyed by layout path.
pub type FileMap = BTreeMap<String, String>;

/// Errors from layout parsing and import.
#[derive(Debug, Error)]
pub enum LayoutError {
    #[error("syntax error in '{path}': {message}")]
    Syntax { path: String, message: String },

    #[error("no graph manifest (spaces/<space>/graph.ttl) found")]
    MissingManifest,

    #[error("export is not valid UTF-8")]
    Encoding,

    #[error(transparent)]
    Graph(GraphError),
}

impl From<GraphError> for LayoutError {
    fn from(err: GraphError) -> Self {
        match err {
            GraphError::MissingManifest => LayoutError::MissingManifest,
            other => LayoutError::Graph(other),
        }
    }
}

/// Render a graph into the canonical layout.
///
/// Profile, preferences, the graph manifest and the three federation files
/// are always present, even when empty of data.
pub fn serialize(graph: &Graph) -> FileMap {
    let vocab = graph.vocab();
    let mut files: BTreeMap<String, Vec<Triple>> = BTreeMap::new();
    let mut add = |path: String, triples: Vec<Triple>| {
        files.entry(path).or_default().extend(triples);
    };

    add(paths::PROFILE_WEBID.to_string(), rdf::profile_triples(graph));
    add(paths::PROFILE_PREFERENCES.to_string(), rdf::preference_triples(graph));
    add(paths::space_manifest(graph.space()), rdf::manifest_triples(graph));
    add(paths::FEDERATION_SUBSCRIPTIONS.to_string(), rdf::subscription_triples(graph));
    add(paths::FEDERATION_PERMISSIONS.to_string(), rdf::permission_triples(graph));
    add(
        paths::FEDERATION_CROSS_REFS.to_string(),
        graph
            .cross_references()
            .flat_map(|(uri, r)| rdf::cross_ref_triples(vocab, uri, r))
            .collect(),
    );

    for node in graph.nodes() {
        let local = vocab.local(&node.id).unwrap_or(&node.id);
        add(paths::concept(local), rdf::node_triples(vocab, node));
    }

    for edge in graph.edge_types() {
        let local = vocab.local(&edge.id).unwrap_or(&edge.id);
        add(paths::schema(local), rdf::edge_type_triples(vocab, edge));
    }

    for statement in graph.statements() {
        let kind = statement_kind(graph, &statement.predicate);
        let local = vocab.local(&statement.id).unwrap_or(&statement.id);
        add(paths::connection(kind, local), rdf::statement_triples(statement));
    }

    let mut leftover = Vec::new();
    for triple in graph.triples() {
        match abstraction_child(graph, triple) {
            Some(child) => add(
                paths::connection(ConnectionKind::Abstraction, child),
                vec![triple.clone()],
            ),
            None => leftover.push(triple.clone()),
        }
    }
    if !leftover.is_empty() {
        add(paths::space_triples(graph.space()), leftover);
    }

    let prefixes = turtle::Prefixes::for_vocab(vocab.base());
    files
        .into_iter()
        .map(|(path, triples)| {
            let text = turtle::write(&triples, &prefixes);
            (path, text)
        })
        .collect()
}

fn statement_kind(graph: &Graph, predicate: &str) -> ConnectionKind {
    if predicate == vocab::RDFS_SUBCLASS_OF {
        return ConnectionKind::Abstraction;
    }
    graph
        .edge_type(predicate)
        .map(|e| e.kind)
        .unwrap_or(ConnectionKind::Influence)
}

/// Local name of the child of a plain `rdfs:subClassOf` triple, when the
/// child is a file-safe name in the owner vocab.
fn abstraction_child<'a>(graph: &Graph, triple: &'a Triple) -> Option<&'a str> {
    if triple.predicate != vocab::RDFS_SUBCLASS_OF || triple.object.as_iri().is_none() {
        return None;
    }
    let local = graph.vocab().local(triple.subject.as_iri()?)?;
    let safe = !local.is_empty()
        && local
            .chars()
            .all(|c| c.is_alphanumeric() || c == '-' || c == '_');
    safe.then_some(local)
}

/// Rebuild a graph from layout files.
///
/// Empty files are deletion markers and are skipped, as are files that are
/// not Turtle.
///
/// # Errors
///
/// - [`LayoutError::Syntax`] naming the file
/// - [`LayoutError::MissingManifest`] if no graph manifest is present
pub fn parse(files: &FileMap) -> Result<Graph, LayoutError> {
    let mut triples = Vec::new();
    for (index, (path, content)) in files.iter().enumerate() {
        if content.trim().is_empty() {
            continue;
        }
        if !path.ends_with(".ttl") {
            debug!(path = %path, "skipping non-Turtle file");
            continue;
        }
        let parsed = turtle::parse(content).map_err(|e| LayoutError::Syntax {
            path: path.clone(),
            message: e.message,
        })?;
        triples.extend(scope_blanks(parsed, &format!("f{}", index)));
    }
    Ok(rdf::from_triples(triples)?)
}

/// Prefix blank node labels so labels from different files stay apart.
pub fn scope_blanks(triples: Vec<Triple>, scope: &str) -> Vec<Triple> {
    let rename = |term: Term| match term {
        Term::Blank(label) => Term::Blank(format!("{}{}", scope, label)),
        other => other,
    };
    triples
        .into_iter()
        .map(|t| Triple {
            subject: rename(t.subject),
            predicate: t.predicate,
            object: rename(t.object),
        })
        .collect()
}

/// Render the whole graph as N-Quads in the space's named graph.
pub fn export_all(graph: &Graph) -> Vec<u8> {
    let context = graph.space_iri();
    let mut triples = rdf::to_triples(graph);
    triples.sort();
    nquads::write(&triples, Some(&context)).into_bytes()
}

/// Rebuild a graph from an N-Quads export.
pub fn import_all(bytes: &[u8]) -> Result<Graph, LayoutError> {
    let text = std::str::from_utf8(bytes).map_err(|_| LayoutError::Encoding)?;
    let quads = nquads::parse(text).map_err(|e| LayoutError::Syntax {
        path: "<export>".to_string(),
        message: e.message,
    })?;
    Ok(rdf::from_triples(quads.into_iter().map(|q| q.triple))?)
}

/// Writes that turn `base` into `target`.
///
/// Changed and new files map to their new content. Files missing from
/// `target` map to an empty string.
pub fn diff(base: &FileMap, target: &FileMap) -> FileMap {
    let mut changes: FileMap = target
        .iter()
        .filter(|(path, content)| base.get(*path) != Some(*content))
        .map(|(path, content)| (path.clone(), content.clone()))
        .collect();
    for (path, content) in base {
        if !target.contains_key(path) && !content.is_empty() {
            changes.insert(path.clone(), String::new());
        }
    }
    changes
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::domain::Domain;
    use crate::graph::{AccessMode, Permission};

    fn sample() -> Graph {
        let mut g = Graph::new(Domain::normalize("alice.com").unwrap(), "personal").unwrap();
        g.set_profile_name(Some("Alice"));
        g.set_preference("theme", Some("dark"));
        let policy = g.add_concept("Climate Policy").unwrap();
        let tax = g.add_concept("Carbon Tax").unwrap();
        let part = g.add_concept("Rebate").unwrap();
        let drives = g.define_edge_type("drives", ConnectionKind::Influence).unwrap();
        let has = g.define_edge_type("has part", ConnectionKind::Composition).unwrap();
        g.add_statement(&tax, &drives, &policy, Some("shapes"), None).unwrap();
        g.add_statement(&tax, &has, &part, None, None).unwrap();
        g.add_subclass(&tax, &policy).unwrap();
        g.add_cross_reference("bob.net", "Economic Growth").unwrap();
        g.subscribe(Domain::normalize("bob.net").unwrap());
        g.grant(Permission {
            agent: "https://bob.net/profile/card#me".to_string(),
            mode: AccessMode::Write,
        });
        g.add_triple(Triple::new(
            Term::iri("https://example.org/a"),
            "https://example.org/p",
            Term::literal("x"),
        ))
        .unwrap();
        g
    }

    #[test]
    fn serialize_uses_canonical_paths() {
        let files = serialize(&sample());
        let expected = [
            "profile/webid.ttl",
            "profile/preferences.ttl",
            "vocabulary/concepts/climatepolicy.ttl",
            "vocabulary/concepts/carbontax.ttl",
            "vocabulary/schemas/drives.ttl",
            "vocabulary/schemas/haspart.ttl",
            "spaces/personal/graph.ttl",
            "spaces/personal/triples.ttl",
            "connections/abstractions/carbontax.ttl",
            "federation/subscriptions.ttl",
            "federation/permissions.ttl",
            "federation/cross-refs.ttl",
        ];
        for path in expected {
            assert!(files.contains_key(path), "missing {}", path);
        }
        assert_eq!(
            files
                .keys()
                .filter(|p| p.starts_with("connections/influences/"))
                .count(),
            1
        );
        assert_eq!(
            files
                .keys()
                .filter(|p| p.starts_with("connections/compositions/"))
                .count(),
            1
        );
    }

    #[test]
    fn empty_graph_still_has_fixed_files() {
        let g = Graph::new(Domain::normalize("alice.com").unwrap(), "personal").unwrap();
        let files = serialize(&g);
        assert_eq!(files.len(), 6);
        assert!(files.contains_key("federation/cross-refs.ttl"));
    }

    #[test]
    fn parse_reverses_serialize() {
        let g = sample();
        let parsed = parse(&serialize(&g)).unwrap();
        assert_eq!(parsed, g);
    }

    #[test]
    fn import_reverses_export() {
        let g = sample();
        let imported = import_all(&export_all(&g)).unwrap();
        assert_eq!(imported, g);
    }

    #[test]
    fn export_uses_space_context() {
        let text = String::from_utf8(export_all(&sample())).unwrap();
        assert!(text
            .lines()
            .all(|l| l.ends_with("<https://alice.com/redstring/spaces/personal> .")));
    }

    #[test]
    fn tombstones_are_ignored() {
        let g = sample();
        let mut files = serialize(&g);
        files.insert("vocabulary/concepts/gone.ttl".to_string(), String::new());
        assert_eq!(parse(&files).unwrap(), g);
    }

    #[test]
    fn missing_manifest_reported() {
        let mut files = serialize(&sample());
        files.remove("spaces/personal/graph.ttl");
        assert!(matches!(parse(&files), Err(LayoutError::MissingManifest)));
    }

    #[test]
    fn syntax_error_names_file() {
        let mut files = serialize(&sample());
        files.insert("vocabulary/concepts/bad.ttl".to_string(), "<a> <b>".to_string());
        match parse(&files) {
            Err(LayoutError::Syntax { path, .. }) => {
                assert_eq!(path, "vocabulary/concepts/bad.ttl")
            }
            other => panic!("expected syntax error, got {:?}", other),
        }
    }

    #[test]
    fn hand_edited_collection_parses() {
        let mut files = serialize(&sample());
        let path = "spaces/personal/triples.ttl".to_string();
        let edited = format!(
            "{}\n<https://example.org/a> <https://example.org/list> ( \"x\" \"y\" ) .\n",
            files[&path]
        );
        files.insert(path, edited);

        let parsed = parse(&files).unwrap();
        let first = format!("{}first", vocab::RDF);
        assert_eq!(parsed.triples().filter(|t| t.predicate == first).count(), 2);
        assert!(parsed.node("https://alice.com/redstring/vocab/carbontax").is_some());
    }

    #[test]
    fn diff_marks_changes_and_deletions() {
        let mut before = FileMap::new();
        before.insert("a.ttl".to_string(), "1".to_string());
        before.insert("b.ttl".to_string(), "2".to_string());
        let mut after = FileMap::new();
        after.insert("a.ttl".to_string(), "1".to_string());
        after.insert("c.ttl".to_string(), "3".to_string());

        let changes = diff(&before, &after);
        assert_eq!(changes.len(), 2);
        assert_eq!(changes["b.ttl"], "");
        assert_eq!(changes["c.ttl"], "3");
    }
}
