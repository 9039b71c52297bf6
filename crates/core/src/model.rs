//! RDF value types: terms, triples and derived views.

use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::{OverlayError, Result};

pub(crate) const XSD_STRING: &str = "http://www.w3.org/2001/XMLSchema#string";

/// A literal value in object position.
///
/// `datatype` is `None` for plain strings and language-tagged strings.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Literal {
    pub value: String,
    pub datatype: Option<String>,
    pub language: Option<String>,
}

/// An RDF term: a resource identifier or a literal.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(tag = "type", content = "value")]
pub enum Term {
    /// An absolute IRI.
    Iri(String),
    /// A blank node id, without the `_:` prefix.
    BlankNode(String),
    /// A plain, typed or language-tagged literal.
    Literal(Literal),
}

impl Term {
    pub fn iri(iri: impl Into<String>) -> Self {
        Term::Iri(iri.into())
    }

    pub fn blank(id: impl Into<String>) -> Self {
        Term::BlankNode(id.into())
    }

    /// A plain string literal.
    pub fn literal(value: impl Into<String>) -> Self {
        Term::Literal(Literal {
            value: value.into(),
            datatype: None,
            language: None,
        })
    }

    /// A typed literal. `xsd:string` is stored as a plain literal, which is
    /// how the engine hands it back.
    pub fn typed_literal(value: impl Into<String>, datatype: impl Into<String>) -> Self {
        let datatype = datatype.into();
        Term::Literal(Literal {
            value: value.into(),
            datatype: (datatype != XSD_STRING).then_some(datatype),
            language: None,
        })
    }

    /// A language-tagged literal; the tag is lowercased.
    pub fn lang_literal(value: impl Into<String>, language: impl Into<String>) -> Self {
        Term::Literal(Literal {
            value: value.into(),
            datatype: None,
            language: Some(language.into().to_ascii_lowercase()),
        })
    }

    pub fn is_literal(&self) -> bool {
        matches!(self, Term::Literal(_))
    }

    pub fn as_iri(&self) -> Option<&str> {
        match self {
            Term::Iri(iri) => Some(iri),
            _ => None,
        }
    }
}

impl fmt::Display for Term {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Term::Iri(iri) => write!(f, "<{iri}>"),
            Term::BlankNode(id) => write!(f, "_:{id}"),
            Term::Literal(lit) => {
                write!(f, "{:?}", lit.value)?;
                if let Some(lang) = &lit.language {
                    write!(f, "@{lang}")
                } else if let Some(dt) = &lit.datatype {
                    write!(f, "^^<{dt}>")
                } else {
                    Ok(())
                }
            }
        }
    }
}

/// An immutable `(subject, predicate, object)` value. Equality is by value.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Triple {
    pub subject: Term,
    pub predicate: Term,
    pub object: Term,
}

impl Triple {
    pub fn new(subject: Term, predicate: Term, object: Term) -> Self {
        Self {
            subject,
            predicate,
            object,
        }
    }

    /// Check the RDF position rules: the subject is an IRI or blank node,
    /// the predicate is an IRI, and every IRI and blank node id parses.
    pub fn check_well_formed(&self) -> Result<()> {
        if self.subject.is_literal() {
            return Err(OverlayError::Serialization(format!(
                "literal {} cannot be a subject",
                self.subject
            )));
        }
        if self.predicate.as_iri().is_none() {
            return Err(OverlayError::Serialization(format!(
                "{} cannot be a predicate, only IRIs can",
                self.predicate
            )));
        }
        for term in [&self.subject, &self.predicate, &self.object] {
            check_term(term)?;
        }
        Ok(())
    }

    /// Does this triple match the pattern? `None` matches anything.
    pub fn matches(&self, s: Option<&Term>, p: Option<&Term>, o: Option<&Term>) -> bool {
        s.is_none_or(|s| *s == self.subject)
            && p.is_none_or(|p| *p == self.predicate)
            && o.is_none_or(|o| *o == self.object)
    }
}

impl fmt::Display for Triple {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {} .", self.subject, self.predicate, self.object)
    }
}

fn check_term(term: &Term) -> Result<()> {
    use oxigraph::model::{BlankNode, NamedNode};

    match term {
        Term::Iri(iri) => NamedNode::new(iri.as_str())
            .map(|_| ())
            .map_err(|e| OverlayError::Serialization(format!("invalid IRI {iri:?}: {e}"))),
        Term::BlankNode(id) => BlankNode::new(id.as_str())
            .map(|_| ())
            .map_err(|e| OverlayError::Serialization(format!("invalid blank node id {id:?}: {e}"))),
        // Only the canonical literal forms survive a round trip through the
        // engine, so anything else is rejected here.
        Term::Literal(lit) => match (&lit.language, &lit.datatype) {
            (Some(_), Some(dt)) => Err(OverlayError::Serialization(format!(
                "literal {term} has both a language tag and datatype {dt:?}"
            ))),
            (Some(lang), None) if lang.chars().any(|c| c.is_ascii_uppercase()) => {
                Err(OverlayError::Serialization(format!(
                    "language tag {lang:?} must be lowercase"
                )))
            }
            (None, Some(dt)) if dt == XSD_STRING => Err(OverlayError::Serialization(format!(
                "literal {term} must be a plain literal, not typed xsd:string"
            ))),
            (None, Some(dt)) => NamedNode::new(dt.as_str())
                .map(|_| ())
                .map_err(|e| OverlayError::Serialization(format!("invalid datatype {dt:?}: {e}"))),
            _ => Ok(()),
        },
    }
}

/// A derived, ephemeral set of triples computed for one query.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct View {
    triples: BTreeSet<Triple>,
}

impl View {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a triple; returns `false` if it was already present.
    pub fn insert(&mut self, triple: Triple) -> bool {
        self.triples.insert(triple)
    }

    pub fn contains(&self, triple: &Triple) -> bool {
        self.triples.contains(triple)
    }

    pub fn len(&self) -> usize {
        self.triples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.triples.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Triple> {
        self.triples.iter()
    }

    pub fn into_triples(self) -> Vec<Triple> {
        self.triples.into_iter().collect()
    }
}

impl FromIterator<Triple> for View {
    fn from_iter<I: IntoIterator<Item = Triple>>(iter: I) -> Self {
        Self {
            triples: iter.into_iter().collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ex(local: &str) -> Term {
        Term::iri(format!("http://example.org/{local}"))
    }

    #[test]
    fn literal_subject_is_rejected() {
        let t = Triple::new(Term::literal("Alice"), ex("knows"), ex("Bob"));
        let err = t.check_well_formed().unwrap_err();
        assert!(matches!(err, OverlayError::Serialization(_)));
    }

    #[test]
    fn blank_predicate_is_rejected() {
        let t = Triple::new(ex("Alice"), Term::blank("p"), ex("Bob"));
        assert!(t.check_well_formed().is_err());
    }

    #[test]
    fn relative_iri_is_rejected() {
        let t = Triple::new(Term::iri("not an iri"), ex("knows"), ex("Bob"));
        assert!(matches!(
            t.check_well_formed(),
            Err(OverlayError::Serialization(_))
        ));
    }

    #[test]
    fn well_formed_triples_pass() {
        let t = Triple::new(
            Term::blank("b0"),
            ex("age"),
            Term::typed_literal("42", "http://www.w3.org/2001/XMLSchema#integer"),
        );
        t.check_well_formed().unwrap();
    }

    #[test]
    fn xsd_string_literal_is_canonicalised() {
        let typed = Term::typed_literal("x", XSD_STRING);
        assert_eq!(typed, Term::literal("x"));
        Triple::new(ex("A"), ex("name"), typed).check_well_formed().unwrap();

        let raw = Term::Literal(Literal {
            value: "x".into(),
            datatype: Some(XSD_STRING.into()),
            language: None,
        });
        let err = Triple::new(ex("A"), ex("name"), raw).check_well_formed().unwrap_err();
        assert!(matches!(err, OverlayError::Serialization(_)));
    }

    #[test]
    fn language_and_datatype_together_are_rejected() {
        let both = Term::Literal(Literal {
            value: "chat".into(),
            datatype: Some("http://www.w3.org/2001/XMLSchema#token".into()),
            language: Some("fr".into()),
        });
        let err = Triple::new(ex("A"), ex("name"), both).check_well_formed().unwrap_err();
        assert!(matches!(err, OverlayError::Serialization(_)));
    }

    #[test]
    fn language_tags_are_lowercased() {
        assert_eq!(
            Term::lang_literal("Alice", "en-GB"),
            Term::lang_literal("Alice", "en-gb")
        );
        let upper = Term::Literal(Literal {
            value: "Alice".into(),
            datatype: None,
            language: Some("EN".into()),
        });
        assert!(Triple::new(ex("A"), ex("name"), upper).check_well_formed().is_err());
    }

    #[test]
    fn view_collapses_duplicates() {
        let t = Triple::new(ex("Alice"), ex("knows"), ex("Bob"));
        let view: View = vec![t.clone(), t.clone()].into_iter().collect();
        assert_eq!(view.len(), 1);
        assert!(view.contains(&t));
    }

    #[test]
    fn pattern_matching_treats_none_as_wildcard() {
        let t = Triple::new(ex("Alice"), ex("knows"), ex("Bob"));
        assert!(t.matches(None, None, None));
        assert!(t.matches(Some(&ex("Alice")), None, Some(&ex("Bob"))));
        assert!(!t.matches(Some(&ex("Bob")), None, None));
    }

    #[test]
    fn display_uses_ntriples_like_syntax() {
        let t = Triple::new(ex("Alice"), ex("name"), Term::lang_literal("Alice", "en"));
        assert_eq!(
            t.to_string(),
            "<http://example.org/Alice> <http://example.org/name> \"Alice\"@en ."
        );
    }
}
