//! layout::terms
//!
//! Conversion from parsed sophia terms into [`Term`] and [`Triple`].
//!
//! Blank nodes are relabeled `b0`, `b1`, … in order of appearance, so
//! labels are scoped to one document whatever the parser generated.

use std::collections::HashMap;

use sophia_api::term::Term as RdfTerm;

use crate::graph::term::{Literal, Term, Triple};

const XSD_STRING: &str = "http://www.w3.org/2001/XMLSchema#string";

#[derive(Debug, Default)]
pub(crate) struct Converter {
    blanks: HashMap<String, String>,
}

impl Converter {
    pub fn triple<S, P, O>(&mut self, s: S, p: P, o: O) -> Result<Triple, String>
    where
        S: RdfTerm,
        P: RdfTerm,
        O: RdfTerm,
    {
        let subject = self.term(s)?;
        if matches!(subject, Term::Literal(_)) {
            return Err("literal in subject position".to_string());
        }
        let predicate = match self.term(p)? {
            Term::Iri(iri) => iri,
            other => return Err(format!("predicate {} is not an IRI", other)),
        };
        let object = self.term(o)?;
        Ok(Triple::new(subject, predicate, object))
    }

    pub fn term<T: RdfTerm>(&mut self, term: T) -> Result<Term, String> {
        if let Some(iri) = term.iri() {
            return Ok(Term::iri(iri.as_str()));
        }
        if let Some(id) = term.bnode_id() {
            let next = self.blanks.len();
            let label = self
                .blanks
                .entry(id.as_str().to_string())
                .or_insert_with(|| format!("b{}", next));
            return Ok(Term::Blank(label.clone()));
        }
        if let Some(lexical) = term.lexical_form() {
            let lexical = String::from(&*lexical);
            if let Some(tag) = term.language_tag() {
                return Ok(Term::lang(lexical, tag.as_str()));
            }
            let datatype = term
                .datatype()
                .map(|dt| dt.as_str().to_string())
                .filter(|dt| dt != XSD_STRING);
            return Ok(Term::Literal(Literal {
                lexical,
                datatype,
                language: None,
            }));
        }
        Err("quoted triples and variables are not supported".to_string())
    }
}
