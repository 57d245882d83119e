//! layout::nquads
//!
//! N-Quads reader and writer for bulk export.
//!
//! One quad per line: `subject predicate object [graph] .` with absolute
//! IRIs only. Reading goes through `sophia_turtle`'s N-Quads parser.

use sophia_api::quad::Quad as _;
use sophia_api::source::{QuadSource, StreamError};
use sophia_turtle::parser::nq;
use thiserror::Error;

use super::terms::Converter;
use crate::graph::term::{Term, Triple};

/// An N-Quads syntax error.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{message}")]
pub struct NQuadsError {
    pub message: String,
}

/// A triple in an optional named graph.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct Quad {
    pub triple: Triple,
    pub graph: Option<String>,
}

/// Render triples as N-Quads in the given named graph.
pub fn write<'a, I>(triples: I, graph: Option<&str>) -> String
where
    I: IntoIterator<Item = &'a Triple>,
{
    let mut out = String::new();
    for t in triples {
        out.push_str(&format!("{} <{}> {}", t.subject, t.predicate, t.object));
        if let Some(g) = graph {
            out.push_str(&format!(" <{}>", g));
        }
        out.push_str(" .\n");
    }
    out
}

/// Parse an N-Quads document.
pub fn parse(input: &str) -> Result<Vec<Quad>, NQuadsError> {
    let mut converter = Converter::default();
    let mut quads = Vec::new();
    nq::parse_str(input)
        .try_for_each_quad(|q| {
            let invalid = |message| NQuadsError { message };
            let triple = converter.triple(q.s(), q.p(), q.o()).map_err(invalid)?;
            let graph = match q.g() {
                None => None,
                Some(g) => match converter.term(g).map_err(invalid)? {
                    Term::Iri(iri) => Some(iri),
                    other => return Err(invalid(format!("graph name {} is not an IRI", other))),
                },
            };
            quads.push(Quad { triple, graph });
            Ok::<_, NQuadsError>(())
        })
        .map_err(|err| match err {
            StreamError::SourceError(e) => NQuadsError {
                message: e.to_string(),
            },
            StreamError::SinkError(e) => e,
        })?;
    Ok(quads)
}
