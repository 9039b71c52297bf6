//! Ontology definitions in the live graph and validation against them.
//!
//! Ontology triples are ordinary live-graph triples written without
//! temporal annotations, so they never show up in temporal views.

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use tracing::{debug, info};

use crate::engine::RdfEngine;
use crate::model::{Term, Triple};
use crate::{Result, TemporalOverlay};

pub const RDF_TYPE: &str = "http://www.w3.org/1999/02/22-rdf-syntax-ns#type";
pub const RDFS_LABEL: &str = "http://www.w3.org/2000/01/rdf-schema#label";
pub const RDFS_COMMENT: &str = "http://www.w3.org/2000/01/rdf-schema#comment";
pub const RDFS_DOMAIN: &str = "http://www.w3.org/2000/01/rdf-schema#domain";
pub const RDFS_RANGE: &str = "http://www.w3.org/2000/01/rdf-schema#range";
pub const OWL_CLASS: &str = "http://www.w3.org/2002/07/owl#Class";
pub const OWL_OBJECT_PROPERTY: &str = "http://www.w3.org/2002/07/owl#ObjectProperty";
pub const OWL_DATATYPE_PROPERTY: &str = "http://www.w3.org/2002/07/owl#DatatypeProperty";

/// `owl:ObjectProperty` or `owl:DatatypeProperty`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PropertyKind {
    #[default]
    Object,
    Datatype,
}

impl PropertyKind {
    fn class_iri(self) -> &'static str {
        match self {
            PropertyKind::Object => OWL_OBJECT_PROPERTY,
            PropertyKind::Datatype => OWL_DATATYPE_PROPERTY,
        }
    }
}

/// Optional parts of a property definition.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PropertyDefinition {
    pub kind: PropertyKind,
    pub domain: Option<String>,
    pub range: Option<String>,
    pub label: Option<String>,
    pub comment: Option<String>,
}

/// One reason a data triple does not fit the ontology.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum OntologyViolation {
    #[error("predicate {predicate} is not defined in the ontology")]
    UndefinedPredicate { predicate: Term },
    #[error("subject {subject} is not an instance of domain {domain} of {predicate}")]
    DomainMismatch {
        subject: Term,
        predicate: Term,
        domain: Term,
    },
    #[error("object {object} is not an instance of range {range} of {predicate}")]
    RangeMismatch {
        object: Term,
        predicate: Term,
        range: Term,
    },
}

#[derive(Debug, Default)]
struct PropertyShape {
    domain: Option<Term>,
    range: Option<Term>,
}

/// Checks triples against the properties declared in the live graph.
///
/// A predicate must be typed `owl:ObjectProperty` or
/// `owl:DatatypeProperty`. When it declares an `rdfs:domain`, the subject
/// must be typed with it; when it declares an `rdfs:range`, an IRI object
/// must be typed with it. Literal and blank-node objects are not range
/// checked. Only the first declared domain and range are used.
pub struct OntologyValidator<'a, E: RdfEngine> {
    engine: &'a E,
}

impl<'a, E: RdfEngine> OntologyValidator<'a, E> {
    pub fn new(engine: &'a E) -> Self {
        Self { engine }
    }

    /// Every violation found in `triples`, in input order. Empty means valid.
    pub fn validate(&self, triples: &[Triple]) -> Result<Vec<OntologyViolation>> {
        let properties = self.properties()?;
        let rdf_type = Term::iri(RDF_TYPE);
        let mut violations = Vec::new();

        for triple in triples {
            let Some(shape) = properties.get(&triple.predicate) else {
                violations.push(OntologyViolation::UndefinedPredicate {
                    predicate: triple.predicate.clone(),
                });
                continue;
            };
            if let Some(domain) = &shape.domain {
                let typed = Triple::new(triple.subject.clone(), rdf_type.clone(), domain.clone());
                if !self.engine.contains(&typed)? {
                    violations.push(OntologyViolation::DomainMismatch {
                        subject: triple.subject.clone(),
                        predicate: triple.predicate.clone(),
                        domain: domain.clone(),
                    });
                }
            }
            if let (Some(range), Term::Iri(_)) = (&shape.range, &triple.object) {
                let typed = Triple::new(triple.object.clone(), rdf_type.clone(), range.clone());
                if !self.engine.contains(&typed)? {
                    violations.push(OntologyViolation::RangeMismatch {
                        object: triple.object.clone(),
                        predicate: triple.predicate.clone(),
                        range: range.clone(),
                    });
                }
            }
        }
        debug!(
            checked = triples.len(),
            properties = properties.len(),
            violations = violations.len(),
            "ontology validation"
        );
        Ok(violations)
    }

    fn properties(&self) -> Result<BTreeMap<Term, PropertyShape>> {
        let rdf_type = Term::iri(RDF_TYPE);
        let mut declared = BTreeSet::new();
        for kind in [PropertyKind::Object, PropertyKind::Datatype] {
            let class = Term::iri(kind.class_iri());
            for t in self
                .engine
                .triples_matching(None, Some(&rdf_type), Some(&class))?
            {
                declared.insert(t.subject);
            }
        }

        let domain = Term::iri(RDFS_DOMAIN);
        let range = Term::iri(RDFS_RANGE);
        let mut shapes = BTreeMap::new();
        for property in declared {
            let shape = PropertyShape {
                domain: self.first_object(&property, &domain)?,
                range: self.first_object(&property, &range)?,
            };
            shapes.insert(property, shape);
        }
        Ok(shapes)
    }

    fn first_object(&self, subject: &Term, predicate: &Term) -> Result<Option<Term>> {
        Ok(self
            .engine
            .triples_matching(Some(subject), Some(predicate), None)?
            .into_iter()
            .map(|t| t.object)
            .min())
    }
}

// ---------------------------------------------------------------------------
// Overlay surface
// ---------------------------------------------------------------------------

impl<E: RdfEngine> TemporalOverlay<E> {
    /// Declare `class_iri` as an `owl:Class`, with optional label and comment.
    pub fn define_class(
        &mut self,
        class_iri: &str,
        label: Option<&str>,
        comment: Option<&str>,
    ) -> Result<Term> {
        let class = Term::iri(class_iri);
        let mut triples = vec![Triple::new(
            class.clone(),
            Term::iri(RDF_TYPE),
            Term::iri(OWL_CLASS),
        )];
        push_annotations(&mut triples, &class, label, comment);
        self.extend_ontology(&triples)?;
        Ok(class)
    }

    /// Declare `property_iri` as an object or datatype property.
    pub fn define_property(
        &mut self,
        property_iri: &str,
        definition: &PropertyDefinition,
    ) -> Result<Term> {
        let property = Term::iri(property_iri);
        let mut triples = vec![Triple::new(
            property.clone(),
            Term::iri(RDF_TYPE),
            Term::iri(definition.kind.class_iri()),
        )];
        if let Some(domain) = &definition.domain {
            triples.push(Triple::new(
                property.clone(),
                Term::iri(RDFS_DOMAIN),
                Term::iri(domain.as_str()),
            ));
        }
        if let Some(range) = &definition.range {
            triples.push(Triple::new(
                property.clone(),
                Term::iri(RDFS_RANGE),
                Term::iri(range.as_str()),
            ));
        }
        push_annotations(
            &mut triples,
            &property,
            definition.label.as_deref(),
            definition.comment.as_deref(),
        );
        self.extend_ontology(&triples)?;
        Ok(property)
    }

    /// Add ontology triples to the live graph, unannotated. Every triple is
    /// checked before the first write.
    pub fn extend_ontology(&mut self, triples: &[Triple]) -> Result<usize> {
        for triple in triples {
            triple.check_well_formed()?;
        }
        let added = self.add_triples(triples, None, None, None)?;
        debug!(triples = triples.len(), added, "ontology extended");
        Ok(added)
    }

    /// Load an ontology document; the format comes from the file extension.
    pub fn load_ontology(&mut self, path: impl AsRef<Path>) -> Result<usize> {
        let path = path.as_ref();
        let added = self.bulk_load_file(path, None, None, None)?;
        info!(path = %path.display(), added, "ontology loaded");
        Ok(added)
    }

    /// Check `triples` against the ontology in the live graph.
    pub fn validate_against_ontology(&self, triples: &[Triple]) -> Result<Vec<OntologyViolation>> {
        OntologyValidator::new(self.engine()).validate(triples)
    }
}

fn push_annotations(
    triples: &mut Vec<Triple>,
    subject: &Term,
    label: Option<&str>,
    comment: Option<&str>,
) {
    if let Some(label) = label {
        triples.push(Triple::new(
            subject.clone(),
            Term::iri(RDFS_LABEL),
            Term::literal(label),
        ));
    }
    if let Some(comment) = comment {
        triples.push(Triple::new(
            subject.clone(),
            Term::iri(RDFS_COMMENT),
            Term::literal(comment),
        ));
    }
}
