//! graph::rdf
//!
//! Conversion between the entity model and RDF triples.
//!
//! # Encoding
//!
//! | Entity | Triples |
//! |---|---|
//! | Graph manifest | `<space> a redstring:Graph ; schema:name "space"` |
//! | Node | `<id> a redstring:Node ; schema:name ; schema:description?` |
//! | Edge type | `<id> a redstring:Edge ; schema:name ; redstring:kind` |
//! | Statement | `<id> a rdf:Statement ; rdf:subject ; rdf:predicate ; rdf:object ; schema:name?` |
//! | Cross-domain reference | `<ref> a redstring:Reference ; redstring:references <target> ; …` |
//! | Profile | `<webId> a foaf:Person ; schema:name? ; redstring:pod <pod>` |
//! | Preference | `<webId> redstring:preference [ redstring:key ; redstring:value ]` |
//! | Subscription | `<pod> redstring:subscribesTo <https://peer/>` |
//! | Permission | `<pod> redstring:grants [ redstring:agent ; redstring:mode ]` |
//!
//! [`from_triples`] reverses the encoding. Anything it does not recognize
//! becomes a plain triple, so unknown data survives a round trip.

use std::collections::BTreeSet;

use super::model::{AccessMode, ConnectionKind, EdgeType, Graph, GraphError, Node, Permission, Statement};
use super::term::{Term, Triple};
use super::vocab::{self, domain_of_class, Vocab};
use crate::core::domain::{authority_of, Domain};
use crate::core::reference::CrossDomainReference;

fn typed(subject: &str, class: &str) -> Triple {
    Triple::new(Term::iri(subject), vocab::RDF_TYPE, Term::iri(class))
}

/// Triples of the graph manifest.
pub fn manifest_triples(graph: &Graph) -> Vec<Triple> {
    let iri = graph.space_iri();
    vec![
        typed(&iri, &graph.vocab().graph_class()),
        Triple::new(Term::iri(&iri), vocab::SCHEMA_NAME, Term::literal(graph.space())),
    ]
}

/// Triples of one node.
pub fn node_triples(vocab: &Vocab, node: &Node) -> Vec<Triple> {
    let mut out = vec![
        typed(&node.id, &vocab.node_class()),
        Triple::new(Term::iri(&node.id), vocab::SCHEMA_NAME, Term::literal(&node.name)),
    ];
    if let Some(description) = &node.description {
        out.push(Triple::new(
            Term::iri(&node.id),
            vocab::SCHEMA_DESCRIPTION,
            Term::literal(description),
        ));
    }
    out
}

/// Triples of one edge type.
pub fn edge_type_triples(vocab: &Vocab, edge: &EdgeType) -> Vec<Triple> {
    vec![
        typed(&edge.id, &vocab.edge_class()),
        Triple::new(Term::iri(&edge.id), vocab::SCHEMA_NAME, Term::literal(&edge.name)),
        Triple::new(
            Term::iri(&edge.id),
            vocab.term("kind"),
            Term::literal(edge.kind.name()),
        ),
    ]
}

/// Triples of one reified statement.
pub fn statement_triples(statement: &Statement) -> Vec<Triple> {
    let id = Term::iri(&statement.id);
    let mut out = vec![
        typed(&statement.id, vocab::RDF_STATEMENT),
        Triple::new(id.clone(), vocab::RDF_SUBJECT, Term::iri(&statement.subject)),
        Triple::new(id.clone(), vocab::RDF_PREDICATE, Term::iri(&statement.predicate)),
        Triple::new(id.clone(), vocab::RDF_OBJECT, Term::iri(&statement.object)),
    ];
    if let Some(name) = &statement.name {
        out.push(Triple::new(id, vocab::SCHEMA_NAME, Term::literal(name)));
    }
    out
}

/// Triples of one cross-domain reference.
pub fn cross_ref_triples(vocab: &Vocab, uri: &str, reference: &CrossDomainReference) -> Vec<Triple> {
    let subject = Term::iri(uri);
    vec![
        typed(uri, &vocab.reference_class()),
        Triple::new(
            subject.clone(),
            vocab.references(),
            Term::iri(reference.target_uri()),
        ),
        Triple::new(
            subject.clone(),
            vocab.term("sourceDomain"),
            Term::literal(reference.source.as_str()),
        ),
        Triple::new(
            subject.clone(),
            vocab.term("targetDomain"),
            Term::literal(reference.target.as_str()),
        ),
        Triple::new(subject, vocab.term("concept"), Term::literal(reference.concept.as_str())),
    ]
}

/// Triples of the owner's WebID profile.
pub fn profile_triples(graph: &Graph) -> Vec<Triple> {
    let uris = graph.owner().uris();
    let web_id = Term::iri(&uris.web_id);
    let mut out = vec![
        typed(&uris.web_id, vocab::FOAF_PERSON),
        Triple::new(web_id.clone(), graph.vocab().term("pod"), Term::iri(&uris.pod)),
    ];
    if let Some(name) = &graph.profile().name {
        out.push(Triple::new(web_id, vocab::SCHEMA_NAME, Term::literal(name)));
    }
    out
}

/// Triples of the owner's preferences.
pub fn preference_triples(graph: &Graph) -> Vec<Triple> {
    let vocab = graph.vocab();
    let web_id = Term::iri(graph.owner().uris().web_id);
    let mut out = Vec::new();
    for (i, (key, value)) in graph.preferences().iter().enumerate() {
        let node = Term::blank(format!("pref{}", i));
        out.push(Triple::new(web_id.clone(), vocab.term("preference"), node.clone()));
        out.push(Triple::new(node.clone(), vocab.term("key"), Term::literal(key)));
        out.push(Triple::new(node, vocab.term("value"), Term::literal(value)));
    }
    out
}

/// Triples of federation subscriptions.
pub fn subscription_triples(graph: &Graph) -> Vec<Triple> {
    let pod = Term::iri(graph.owner().uris().pod);
    graph
        .subscriptions()
        .map(|domain| {
            Triple::new(
                pod.clone(),
                graph.vocab().term("subscribesTo"),
                Term::iri(domain.uris().pod),
            )
        })
        .collect()
}

/// Triples of access grants.
pub fn permission_triples(graph: &Graph) -> Vec<Triple> {
    let vocab = graph.vocab();
    let pod = Term::iri(graph.owner().uris().pod);
    let mut out = Vec::new();
    for (i, permission) in graph.permissions().enumerate() {
        let node = Term::blank(format!("grant{}", i));
        out.push(Triple::new(pod.clone(), vocab.term("grants"), node.clone()));
        out.push(Triple::new(node.clone(), vocab.term("agent"), Term::iri(&permission.agent)));
        out.push(Triple::new(
            node,
            vocab.term("mode"),
            Term::literal(permission.mode.name()),
        ));
    }
    out
}

/// Every triple of the graph.
pub fn to_triples(graph: &Graph) -> Vec<Triple> {
    let vocab = graph.vocab();
    let mut out = manifest_triples(graph);
    out.extend(profile_triples(graph));
    out.extend(preference_triples(graph));
    out.extend(graph.nodes().flat_map(|n| node_triples(vocab, n)));
    out.extend(graph.edge_types().flat_map(|e| edge_type_triples(vocab, e)));
    out.extend(graph.statements().flat_map(statement_triples));
    out.extend(
        graph
            .cross_references()
            .flat_map(|(uri, r)| cross_ref_triples(vocab, uri, r)),
    );
    out.extend(subscription_triples(graph));
    out.extend(permission_triples(graph));
    out.extend(graph.triples().cloned());
    out
}

/// Objects of `(subject, predicate, *)` in a sorted triple set.
fn objects(remaining: &BTreeSet<Triple>, subject: &Term, predicate: &str) -> Vec<Term> {
    let lower = Triple::new(subject.clone(), predicate, Term::Iri(String::new()));
    remaining
        .range(lower..)
        .take_while(|t| &t.subject == subject && t.predicate == predicate)
        .map(|t| t.object.clone())
        .collect()
}

fn take_where(
    remaining: &mut BTreeSet<Triple>,
    subject: &Term,
    predicate: &str,
    accept: impl Fn(&Term) -> bool,
) -> Option<Term> {
    let object = objects(remaining, subject, predicate)
        .into_iter()
        .find(|o| accept(o))?;
    remaining.remove(&Triple::new(subject.clone(), predicate, object.clone()));
    Some(object)
}

fn take_literal(remaining: &mut BTreeSet<Triple>, subject: &Term, predicate: &str) -> Option<String> {
    take_where(remaining, subject, predicate, |o| matches!(o, Term::Literal(_)))
        .and_then(|o| o.as_literal().map(str::to_string))
}

fn take_iri(remaining: &mut BTreeSet<Triple>, subject: &Term, predicate: &str) -> Option<String> {
    take_where(remaining, subject, predicate, |o| matches!(o, Term::Iri(_)))
        .and_then(|o| o.as_iri().map(str::to_string))
}

fn has_iri(remaining: &BTreeSet<Triple>, subject: &Term, predicate: &str) -> bool {
    objects(remaining, subject, predicate)
        .iter()
        .any(|o| o.as_iri().is_some())
}

fn find_manifest(triples: &BTreeSet<Triple>) -> Result<(Domain, String), GraphError> {
    let mut manifest: Option<(Domain, String)> = None;
    for t in triples.iter().filter(|t| t.predicate == vocab::RDF_TYPE) {
        let (Some(subject), Some(class)) = (t.subject.as_iri(), t.object.as_iri()) else {
            continue;
        };
        let Some(domain) = domain_of_class(class, "Graph") else {
            continue;
        };
        match &manifest {
            Some((_, existing)) if existing != subject => {
                return Err(GraphError::ConflictingManifests(
                    existing.clone(),
                    subject.to_string(),
                ));
            }
            _ => manifest = Some((domain, subject.to_string())),
        }
    }
    manifest.ok_or(GraphError::MissingManifest)
}

/// Rebuild a graph from triples.
///
/// The owner domain and space come from the graph manifest.
///
/// # Errors
///
/// - [`GraphError::MissingManifest`] if no `redstring:Graph` is declared
/// - [`GraphError::ConflictingManifests`] if more than one is
pub fn from_triples<I>(triples: I) -> Result<Graph, GraphError>
where
    I: IntoIterator<Item = Triple>,
{
    let mut remaining: BTreeSet<Triple> = triples.into_iter().collect();
    let (owner, space_iri) = find_manifest(&remaining)?;
    let uris = owner.uris();
    let space = space_iri
        .strip_prefix(uris.spaces.as_str())
        .ok_or_else(|| GraphError::InvalidIri(space_iri.clone()))?;
    let mut graph = Graph::new(owner.clone(), space)?;
    let vocab = graph.vocab().clone();

    let manifest = Term::iri(&space_iri);
    take_iri(&mut remaining, &manifest, vocab::RDF_TYPE);
    take_literal(&mut remaining, &manifest, vocab::SCHEMA_NAME);

    let typed_subjects: Vec<(Term, String)> = remaining
        .iter()
        .filter(|t| t.predicate == vocab::RDF_TYPE)
        .filter_map(|t| Some((t.subject.clone(), t.object.as_iri()?.to_string())))
        .collect();

    for (subject, class) in typed_subjects {
        let Some(id) = subject.as_iri().map(str::to_string) else {
            continue;
        };
        let type_triple = Triple::new(subject.clone(), vocab::RDF_TYPE, Term::iri(&class));

        if class == vocab.node_class() {
            remaining.remove(&type_triple);
            let name = take_literal(&mut remaining, &subject, vocab::SCHEMA_NAME)
                .unwrap_or_else(|| vocab.local(&id).unwrap_or(&id).to_string());
            let description = take_literal(&mut remaining, &subject, vocab::SCHEMA_DESCRIPTION);
            graph.nodes.insert(id.clone(), Node { id, name, description });
        } else if class == vocab.edge_class() {
            remaining.remove(&type_triple);
            let name = take_literal(&mut remaining, &subject, vocab::SCHEMA_NAME)
                .unwrap_or_else(|| vocab.local(&id).unwrap_or(&id).to_string());
            let kind = take_literal(&mut remaining, &subject, &vocab.term("kind"))
                .and_then(|k| ConnectionKind::parse(&k))
                .unwrap_or(ConnectionKind::Influence);
            graph.edge_types.insert(id.clone(), EdgeType { id, name, kind });
        } else if class == vocab::RDF_STATEMENT {
            let complete = [vocab::RDF_SUBJECT, vocab::RDF_PREDICATE, vocab::RDF_OBJECT]
                .iter()
                .all(|p| has_iri(&remaining, &subject, p));
            if !complete {
                continue;
            }
            remaining.remove(&type_triple);
            let s = take_iri(&mut remaining, &subject, vocab::RDF_SUBJECT).unwrap_or_default();
            let p = take_iri(&mut remaining, &subject, vocab::RDF_PREDICATE).unwrap_or_default();
            let o = take_iri(&mut remaining, &subject, vocab::RDF_OBJECT).unwrap_or_default();
            let name = take_literal(&mut remaining, &subject, vocab::SCHEMA_NAME);
            graph.statements.insert(
                id.clone(),
                Statement {
                    id,
                    subject: s,
                    predicate: p,
                    object: o,
                    name,
                },
            );
        } else if class == vocab.reference_class() {
            let Ok(reference) = CrossDomainReference::from_reference_uri(&id) else {
                continue;
            };
            remaining.remove(&type_triple);
            take_iri(&mut remaining, &subject, &vocab.references());
            for field in ["sourceDomain", "targetDomain", "concept"] {
                take_literal(&mut remaining, &subject, &vocab.term(field));
            }
            graph.cross_refs.insert(id, reference);
        } else if class == vocab::FOAF_PERSON && id == uris.web_id {
            remaining.remove(&type_triple);
            take_iri(&mut remaining, &subject, &vocab.term("pod"));
            graph.profile.name = take_literal(&mut remaining, &subject, vocab::SCHEMA_NAME);
        }
    }

    // Preferences hang off the WebID through blank nodes.
    let web_id = Term::iri(&uris.web_id);
    while let Some(node) = take_where(&mut remaining, &web_id, &vocab.term("preference"), Term::is_blank) {
        let key = take_literal(&mut remaining, &node, &vocab.term("key"));
        let value = take_literal(&mut remaining, &node, &vocab.term("value"));
        if let (Some(key), Some(value)) = (key, value) {
            graph.preferences.insert(key, value);
        }
    }

    let pod = Term::iri(&uris.pod);
    while let Some(peer) = take_iri(&mut remaining, &pod, &vocab.term("subscribesTo")) {
        if let Some(domain) = authority_of(&peer).and_then(|a| Domain::normalize(a).ok()) {
            graph.subscriptions.insert(domain);
        }
    }

    while let Some(node) = take_where(&mut remaining, &pod, &vocab.term("grants"), Term::is_blank) {
        let agent = take_iri(&mut remaining, &node, &vocab.term("agent"));
        let mode = take_literal(&mut remaining, &node, &vocab.term("mode"))
            .and_then(|m| AccessMode::parse(&m));
        if let (Some(agent), Some(mode)) = (agent, mode) {
            graph.permissions.insert(Permission { agent, mode });
        }
    }

    graph.triples = remaining;
    Ok(graph)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Graph {
        let mut g = Graph::new(Domain::normalize("alice.com").unwrap(), "personal").unwrap();
        g.set_profile_name(Some("Alice"));
        g.set_preference("theme", Some("dark"));
        g.set_preference("lang", Some("en"));
        let a = g.add_concept("Climate Policy").unwrap();
        let b = g.add_concept("Carbon Tax").unwrap();
        g.describe(&a, Some("Public policy on climate".to_string())).unwrap();
        let drives = g.define_edge_type("drives", ConnectionKind::Influence).unwrap();
        g.add_statement(&b, &drives, &a, Some("shapes"), None).unwrap();
        g.add_subclass(&b, &a).unwrap();
        g.add_cross_reference("bob.net", "Economic Growth").unwrap();
        g.subscribe(Domain::normalize("bob.net").unwrap());
        g.grant(Permission {
            agent: "https://bob.net/profile/card#me".to_string(),
            mode: AccessMode::Read,
        });
        g
    }

    #[test]
    fn round_trips_every_entity() {
        let g = sample();
        let rebuilt = from_triples(to_triples(&g)).unwrap();
        assert_eq!(rebuilt, g);
    }

    #[test]
    fn missing_manifest_is_error() {
        let g = sample();
        let triples: Vec<Triple> = to_triples(&g)
            .into_iter()
            .filter(|t| t.subject.as_iri() != Some(g.space_iri().as_str()))
            .collect();
        assert_eq!(from_triples(triples).unwrap_err(), GraphError::MissingManifest);
    }

    #[test]
    fn conflicting_manifests_rejected() {
        let g = sample();
        let mut triples = to_triples(&g);
        triples.push(typed(
            "https://alice.com/redstring/spaces/other",
            "https://alice.com/redstring/vocab/Graph",
        ));
        assert!(matches!(
            from_triples(triples),
            Err(GraphError::ConflictingManifests(..))
        ));
    }

    #[test]
    fn unknown_triples_survive_as_plain() {
        let g = sample();
        let extra = Triple::new(
            Term::iri("https://example.org/thing"),
            "https://example.org/prop",
            Term::typed("42", vocab::XSD_INTEGER),
        );
        let mut triples = to_triples(&g);
        triples.push(extra.clone());
        let rebuilt = from_triples(triples).unwrap();
        assert!(rebuilt.triples().any(|t| *t == extra));
    }

    #[test]
    fn incomplete_statement_stays_plain() {
        let g = Graph::new(Domain::normalize("alice.com").unwrap(), "s").unwrap();
        let id = "https://alice.com/redstring/vocab/statement-x";
        let mut triples = to_triples(&g);
        triples.push(typed(id, vocab::RDF_STATEMENT));
        triples.push(Triple::new(
            Term::iri(id),
            vocab::RDF_SUBJECT,
            Term::iri("https://alice.com/redstring/vocab/a"),
        ));
        let rebuilt = from_triples(triples).unwrap();
        assert_eq!(rebuilt.statements().count(), 0);
        assert_eq!(rebuilt.triples().count(), 2);
    }
}
