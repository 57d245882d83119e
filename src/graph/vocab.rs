//! graph::vocab
//!
//! Namespace constants and the per-domain Redstring vocabulary.
//!
//! Standard namespaces (RDF, RDFS, XSD, schema.org, FOAF) are fixed. The
//! `redstring:` namespace is the owner domain's vocab URI, so class and
//! property IRIs such as `redstring:Node` differ per pod.

use serde_json::{json, Value};

use crate::core::domain::Domain;

pub const RDF: &str = "http://www.w3.org/1999/02/22-rdf-syntax-ns#";
pub const RDFS: &str = "http://www.w3.org/2000/01/rdf-schema#";
pub const XSD: &str = "http://www.w3.org/2001/XMLSchema#";
pub const SCHEMA: &str = "http://schema.org/";
pub const FOAF: &str = "http://xmlns.com/foaf/0.1/";

pub const RDF_TYPE: &str = "http://www.w3.org/1999/02/22-rdf-syntax-ns#type";
pub const RDF_STATEMENT: &str = "http://www.w3.org/1999/02/22-rdf-syntax-ns#Statement";
pub const RDF_SUBJECT: &str = "http://www.w3.org/1999/02/22-rdf-syntax-ns#subject";
pub const RDF_PREDICATE: &str = "http://www.w3.org/1999/02/22-rdf-syntax-ns#predicate";
pub const RDF_OBJECT: &str = "http://www.w3.org/1999/02/22-rdf-syntax-ns#object";

pub const RDFS_SUBCLASS_OF: &str = "http://www.w3.org/2000/01/rdf-schema#subClassOf";
pub const RDFS_LABEL: &str = "http://www.w3.org/2000/01/rdf-schema#label";
pub const RDFS_SEE_ALSO: &str = "http://www.w3.org/2000/01/rdf-schema#seeAlso";

pub const XSD_INTEGER: &str = "http://www.w3.org/2001/XMLSchema#integer";
pub const XSD_BOOLEAN: &str = "http://www.w3.org/2001/XMLSchema#boolean";
pub const XSD_DECIMAL: &str = "http://www.w3.org/2001/XMLSchema#decimal";

pub const SCHEMA_NAME: &str = "http://schema.org/name";
pub const SCHEMA_DESCRIPTION: &str = "http://schema.org/description";

pub const FOAF_PERSON: &str = "http://xmlns.com/foaf/0.1/Person";

/// Prefixes every Turtle file declares, besides `redstring:`.
pub const STANDARD_PREFIXES: [(&str, &str); 5] = [
    ("rdf", RDF),
    ("rdfs", RDFS),
    ("xsd", XSD),
    ("schema", SCHEMA),
    ("foaf", FOAF),
];

/// Predicates a statement may use without declaring an edge type.
pub const WELL_KNOWN_PREDICATES: [&str; 5] = [
    RDF_TYPE,
    RDFS_SUBCLASS_OF,
    RDFS_LABEL,
    RDFS_SEE_ALSO,
    SCHEMA_NAME,
];

/// The Redstring vocabulary of one domain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Vocab {
    base: String,
}

impl Vocab {
    /// Vocabulary rooted at the domain's vocab URI.
    pub fn for_domain(domain: &Domain) -> Self {
        Self {
            base: domain.uris().vocab,
        }
    }

    /// The namespace IRI (ends with `/`).
    pub fn base(&self) -> &str {
        &self.base
    }

    /// Expand a local name.
    pub fn term(&self, local: &str) -> String {
        format!("{}{}", self.base, local)
    }

    /// Strip the namespace from an IRI.
    pub fn local<'a>(&self, iri: &'a str) -> Option<&'a str> {
        iri.strip_prefix(self.base.as_str())
    }

    pub fn graph_class(&self) -> String {
        self.term("Graph")
    }

    pub fn node_class(&self) -> String {
        self.term("Node")
    }

    pub fn edge_class(&self) -> String {
        self.term("Edge")
    }

    pub fn reference_class(&self) -> String {
        self.term("Reference")
    }

    pub fn references(&self) -> String {
        self.term("references")
    }

    pub fn linked_thinking(&self) -> String {
        self.term("linkedThinking")
    }
}

/// Build the JSON-LD context document for a domain.
///
/// # Example
///
/// ```
/// use redstring_pod::core::domain::Domain;
/// use redstring_pod::graph::vocab::jsonld_context;
///
/// let ctx = jsonld_context(&Domain::normalize("alice.com").unwrap());
/// assert_eq!(ctx["@context"]["@vocab"], "https://alice.com/redstring/vocab/");
/// ```
pub fn jsonld_context(domain: &Domain) -> Value {
    let vocab = domain.uris().vocab;
    json!({
        "@context": {
            "@version": 1.1,
            "@vocab": vocab,
            "redstring": vocab,
            "Graph": "redstring:Graph",
            "Node": "redstring:Node",
            "Edge": "redstring:Edge",
            "name": "http://schema.org/name",
            "description": "http://schema.org/description",
            "references": "redstring:references",
            "linkedThinking": "redstring:linkedThinking"
        }
    })
}

/// Recover the owner domain from a Redstring class IRI such as
/// `https://alice.com/redstring/vocab/Graph`.
pub fn domain_of_class(iri: &str, class: &str) -> Option<Domain> {
    let authority = crate::core::domain::authority_of(iri)?;
    let domain = Domain::normalize(authority).ok()?;
    (Vocab::for_domain(&domain).term(class) == iri).then_some(domain)
}
