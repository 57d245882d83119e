//! graph::term
//!
//! RDF terms and plain triples.
//!
//! # Types
//!
//! - [`Term`] - IRI, blank node or literal
//! - [`Literal`] - Lexical form with optional datatype or language tag
//! - [`Triple`] - A `(subject, predicate, object)` statement without metadata
//!
//! Terms order IRIs before blank nodes before literals, which gives every
//! serializer a deterministic output order.

use std::fmt;

use serde::{Deserialize, Serialize};

/// A literal value.
///
/// A literal carries either a datatype or a language tag, never both.
/// Plain string literals have neither.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Literal {
    /// The lexical form
    pub lexical: String,
    /// Datatype IRI, `None` for plain strings
    pub datatype: Option<String>,
    /// Language tag, lowercased
    pub language: Option<String>,
}

/// An RDF term.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Term {
    /// Absolute IRI
    Iri(String),
    /// Blank node label (without `_:`)
    Blank(String),
    /// Literal value
    Literal(Literal),
}

impl Term {
    /// Create an IRI term.
    pub fn iri(iri: impl Into<String>) -> Self {
        Term::Iri(iri.into())
    }

    /// Create a blank node term.
    pub fn blank(label: impl Into<String>) -> Self {
        Term::Blank(label.into())
    }

    /// Create a plain string literal.
    pub fn literal(value: impl Into<String>) -> Self {
        Term::Literal(Literal {
            lexical: value.into(),
            datatype: None,
            language: None,
        })
    }

    /// Create a typed literal.
    pub fn typed(value: impl Into<String>, datatype: impl Into<String>) -> Self {
        Term::Literal(Literal {
            lexical: value.into(),
            datatype: Some(datatype.into()),
            language: None,
        })
    }

    /// Create a language-tagged literal.
    pub fn lang(value: impl Into<String>, language: impl Into<String>) -> Self {
        Term::Literal(Literal {
            lexical: value.into(),
            datatype: None,
            language: Some(language.into().to_lowercase()),
        })
    }

    /// The IRI, if this is an IRI term.
    pub fn as_iri(&self) -> Option<&str> {
        match self {
            Term::Iri(iri) => Some(iri),
            _ => None,
        }
    }

    /// The blank node label, if this is a blank node.
    pub fn as_blank(&self) -> Option<&str> {
        match self {
            Term::Blank(label) => Some(label),
            _ => None,
        }
    }

    /// The lexical form, if this is a literal.
    pub fn as_literal(&self) -> Option<&str> {
        match self {
            Term::Literal(lit) => Some(&lit.lexical),
            _ => None,
        }
    }

    /// Check whether this is a blank node.
    pub fn is_blank(&self) -> bool {
        matches!(self, Term::Blank(_))
    }
}

impl fmt::Display for Term {
    /// Formats the term in N-Triples syntax.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Term::Iri(iri) => write!(f, "<{}>", iri),
            Term::Blank(label) => write!(f, "_:{}", label),
            Term::Literal(lit) => {
                write!(f, "\"{}\"", escape_literal(&lit.lexical))?;
                if let Some(lang) = &lit.language {
                    write!(f, "@{}", lang)
                } else if let Some(dt) = &lit.datatype {
                    write!(f, "^^<{}>", dt)
                } else {
                    Ok(())
                }
            }
        }
    }
}

/// A plain triple.
///
/// Plain triples carry no metadata. Relationships that need a label or
/// provenance are modeled as [`Statement`](super::model::Statement)s.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Triple {
    /// IRI or blank node
    pub subject: Term,
    /// Predicate IRI
    pub predicate: String,
    /// Any term
    pub object: Term,
}

impl Triple {
    /// Create a triple.
    pub fn new(subject: Term, predicate: impl Into<String>, object: Term) -> Self {
        Self {
            subject,
            predicate: predicate.into(),
            object,
        }
    }

    /// Check whether any position holds a blank node.
    pub fn has_blank(&self) -> bool {
        self.subject.is_blank() || self.object.is_blank()
    }
}

impl fmt::Display for Triple {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} <{}> {} .", self.subject, self.predicate, self.object)
    }
}

/// Escape a literal's lexical form for N-Triples/Turtle short strings.
pub fn escape_literal(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '"' => out.push_str("\\\""),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c => out.push(c),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_ntriples_forms() {
        assert_eq!(Term::iri("http://x/a").to_string(), "<http://x/a>");
        assert_eq!(Term::blank("b0").to_string(), "_:b0");
        assert_eq!(Term::literal("hi").to_string(), "\"hi\"");
        assert_eq!(Term::lang("hi", "EN").to_string(), "\"hi\"@en");
        assert_eq!(
            Term::typed("1", "http://www.w3.org/2001/XMLSchema#integer").to_string(),
            "\"1\"^^<http://www.w3.org/2001/XMLSchema#integer>"
        );
    }

    #[test]
    fn escapes_special_characters() {
        assert_eq!(escape_literal("a\"b\\c\nd"), "a\\\"b\\\\c\\nd");
    }

    #[test]
    fn iris_sort_before_blanks_and_literals() {
        let mut terms = vec![Term::literal("z"), Term::blank("a"), Term::iri("http://x")];
        terms.sort();
        assert!(matches!(terms[0], Term::Iri(_)));
        assert!(matches!(terms[1], Term::Blank(_)));
        assert!(matches!(terms[2], Term::Literal(_)));
    }

    #[test]
    fn triple_display() {
        let t = Triple::new(Term::iri("http://x/s"), "http://x/p", Term::literal("o"));
        assert_eq!(t.to_string(), "<http://x/s> <http://x/p> \"o\" .");
        assert!(!t.has_blank());
    }
}
