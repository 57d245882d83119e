//! layout::turtle
//!
//! Turtle writer and reader for per-file storage.
//!
//! # Writer
//!
//! Emits `@prefix` lines, then one block per subject with predicates
//! joined by `;` and objects by `,`. `rdf:type` comes first and prints as
//! `a`. IRIs are compacted only when the local part is a plain name.
//!
//! # Reader
//!
//! Full Turtle through `sophia_turtle`, so hand-edited files may use any
//! syntax the format allows. Collections expand to `rdf:first`/`rdf:rest`
//! chains of blank nodes. Blank nodes are relabeled `b0`, `b1`, … in order
//! of appearance; labels are scoped to one document.

use std::collections::{BTreeMap, BTreeSet};

use sophia_api::source::{StreamError, TripleSource};
use sophia_api::triple::Triple as _;
use sophia_turtle::parser::turtle;
use thiserror::Error;

use super::terms::Converter;
use crate::graph::term::{escape_literal, Term, Triple};
use crate::graph::vocab::{self, STANDARD_PREFIXES};

/// A Turtle syntax error.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{message}")]
pub struct TurtleError {
    pub message: String,
}

/// Prefix table used for writing.
#[derive(Debug, Clone)]
pub struct Prefixes(Vec<(String, String)>);

impl Prefixes {
    /// Standard prefixes plus `redstring:` bound to the given vocab.
    pub fn for_vocab(vocab_base: &str) -> Self {
        let mut table: Vec<(String, String)> = STANDARD_PREFIXES
            .iter()
            .map(|(p, ns)| (p.to_string(), ns.to_string()))
            .collect();
        table.push(("redstring".to_string(), vocab_base.to_string()));
        Self(table)
    }

    fn compact(&self, iri: &str) -> Option<String> {
        self.0
            .iter()
            .filter_map(|(prefix, ns)| {
                let local = iri.strip_prefix(ns.as_str())?;
                is_plain_local(local).then(|| (ns.len(), format!("{}:{}", prefix, local)))
            })
            .max_by_key(|(len, _)| *len)
            .map(|(_, pname)| pname)
    }

    fn iri(&self, iri: &str) -> String {
        self.compact(iri).unwrap_or_else(|| format!("<{}>", iri))
    }

    fn term(&self, term: &Term) -> String {
        match term {
            Term::Iri(iri) => self.iri(iri),
            Term::Blank(label) => format!("_:{}", label),
            Term::Literal(lit) => {
                let mut out = format!("\"{}\"", escape_literal(&lit.lexical));
                if let Some(lang) = &lit.language {
                    out.push('@');
                    out.push_str(lang);
                } else if let Some(dt) = &lit.datatype {
                    out.push_str("^^");
                    out.push_str(&self.iri(dt));
                }
                out
            }
        }
    }
}

fn is_plain_local(local: &str) -> bool {
    let mut chars = local.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}

/// Render triples as a Turtle document.
pub fn write<'a, I>(triples: I, prefixes: &Prefixes) -> String
where
    I: IntoIterator<Item = &'a Triple>,
{
    let sorted: BTreeSet<&Triple> = triples.into_iter().collect();
    let mut out = String::new();
    for (prefix, ns) in &prefixes.0 {
        out.push_str(&format!("@prefix {}: <{}> .\n", prefix, ns));
    }

    let mut by_subject: BTreeMap<&Term, BTreeMap<&str, Vec<&Term>>> = BTreeMap::new();
    for t in &sorted {
        by_subject
            .entry(&t.subject)
            .or_default()
            .entry(t.predicate.as_str())
            .or_default()
            .push(&t.object);
    }

    for (subject, predicates) in by_subject {
        out.push('\n');
        out.push_str(&prefixes.term(subject));

        let mut ordered: Vec<(&str, Vec<&Term>)> = predicates.into_iter().collect();
        ordered.sort_by_key(|(p, _)| *p != vocab::RDF_TYPE);

        for (i, (predicate, objects)) in ordered.iter().enumerate() {
            out.push_str(if i == 0 { " " } else { " ;\n    " });
            if *predicate == vocab::RDF_TYPE {
                out.push('a');
            } else {
                out.push_str(&prefixes.iri(predicate));
            }
            out.push(' ');
            let rendered: Vec<String> = objects.iter().map(|o| prefixes.term(o)).collect();
            out.push_str(&rendered.join(", "));
        }
        out.push_str(" .\n");
    }
    out
}

/// Parse a Turtle document into triples.
pub fn parse(input: &str) -> Result<Vec<Triple>, TurtleError> {
    let mut converter = Converter::default();
    let mut triples = Vec::new();
    turtle::parse_str(input)
        .try_for_each_triple(|t| {
            let triple = converter
                .triple(t.s(), t.p(), t.o())
                .map_err(|message| TurtleError { message })?;
            triples.push(triple);
            Ok::<_, TurtleError>(())
        })
        .map_err(|err| match err {
            StreamError::SourceError(e) => TurtleError {
                message: e.to_string(),
            },
            StreamError::SinkError(e) => e,
        })?;
    Ok(triples)
}
