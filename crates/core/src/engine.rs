//! The RDF graph/query engine collaborator and its oxigraph implementation.
//!
//! The overlay never evaluates SPARQL itself. It hands either the live graph
//! or a resolver-built [`View`] to an [`RdfEngine`] and converts whatever
//! comes back into its own [`Term`] / [`Triple`] values.

use std::collections::BTreeMap;
use std::io::Read;
use std::path::Path;
use std::str::FromStr;

use oxigraph::io::{RdfFormat, RdfParser};
use oxigraph::model::{
    BlankNode, GraphName, Literal as OxLiteral, NamedNode, Quad, Term as OxTerm,
    Triple as OxTriple,
};
use oxigraph::sparql::QueryResults;
use oxigraph::store::Store;
use serde::Serialize;

use crate::model::{Literal, Term, Triple, View, XSD_STRING};
use crate::{OverlayError, Result};

// ---------------------------------------------------------------------------
// Collaborator interface
// ---------------------------------------------------------------------------

/// What a query is evaluated against.
#[derive(Debug, Clone, Copy)]
pub enum QueryTarget<'a> {
    /// The mutable, currently-asserted graph.
    Live,
    /// A derived view; evaluated in isolation from the live graph.
    View(&'a View),
}

/// One solution row: variable name to bound term. Unbound variables are absent.
pub type Binding = BTreeMap<String, Term>;

/// Tabular form of a SELECT result, one column per projected variable.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Table {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Option<Term>>>,
}

impl Table {
    /// All cells of one column, or `None` if no such column.
    pub fn column(&self, name: &str) -> Option<Vec<Option<&Term>>> {
        let idx = self.columns.iter().position(|c| c == name)?;
        Some(self.rows.iter().map(|row| row[idx].as_ref()).collect())
    }
}

/// SELECT output: bindings in solution order plus the equivalent table.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SelectResult {
    pub bindings: Vec<Binding>,
    pub table: Table,
}

impl SelectResult {
    pub fn new(columns: Vec<String>, bindings: Vec<Binding>) -> Self {
        let rows = bindings
            .iter()
            .map(|b| columns.iter().map(|c| b.get(c).cloned()).collect())
            .collect();
        Self {
            bindings,
            table: Table { columns, rows },
        }
    }

    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }
}

/// Serialisation formats accepted by [`RdfEngine::parse`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceFormat {
    Turtle,
    NTriples,
    NQuads,
    TriG,
    RdfXml,
    N3,
}

impl SourceFormat {
    /// Infer the format from a file extension.
    pub fn from_path(path: &Path) -> Result<Self> {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase)
            .unwrap_or_default();
        match ext.as_str() {
            "ttl" => Ok(SourceFormat::Turtle),
            "nt" => Ok(SourceFormat::NTriples),
            "nq" => Ok(SourceFormat::NQuads),
            "trig" => Ok(SourceFormat::TriG),
            "rdf" | "owl" | "xml" => Ok(SourceFormat::RdfXml),
            "n3" => Ok(SourceFormat::N3),
            _ => Err(OverlayError::Engine(format!(
                "cannot infer an RDF format from {}",
                path.display()
            ))),
        }
    }

    fn rdf_format(self) -> RdfFormat {
        match self {
            SourceFormat::Turtle => RdfFormat::Turtle,
            SourceFormat::NTriples => RdfFormat::NTriples,
            SourceFormat::NQuads => RdfFormat::NQuads,
            SourceFormat::TriG => RdfFormat::TriG,
            SourceFormat::RdfXml => RdfFormat::RdfXml,
            SourceFormat::N3 => RdfFormat::N3,
        }
    }
}

impl FromStr for SourceFormat {
    type Err = OverlayError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "turtle" | "ttl" => Ok(SourceFormat::Turtle),
            "ntriples" | "n-triples" | "nt" => Ok(SourceFormat::NTriples),
            "nquads" | "n-quads" | "nq" => Ok(SourceFormat::NQuads),
            "trig" => Ok(SourceFormat::TriG),
            "xml" | "rdfxml" | "rdf/xml" => Ok(SourceFormat::RdfXml),
            "n3" => Ok(SourceFormat::N3),
            other => Err(OverlayError::Engine(format!("unknown RDF format {other:?}"))),
        }
    }
}

/// The RDF graph/query engine the overlay delegates to.
///
/// Implementations own the live graph. Methods take `&self`; the overlay
/// serialises writes itself.
pub trait RdfEngine {
    /// Insert into the live graph. Returns `false` if it was already there.
    fn add(&self, triple: &Triple) -> Result<bool>;

    /// Remove from the live graph. Returns `false` if it was absent.
    fn remove(&self, triple: &Triple) -> Result<bool>;

    fn contains(&self, triple: &Triple) -> Result<bool>;

    /// Number of triples in the live graph.
    fn len(&self) -> Result<usize>;

    /// Parse a serialised document into a scratch triple list without
    /// touching the live graph.
    fn parse(&self, source: &mut dyn Read, format: SourceFormat) -> Result<Vec<Triple>>;

    /// Live-graph triples matching a pattern; `None` is a wildcard.
    fn triples_matching(
        &self,
        subject: Option<&Term>,
        predicate: Option<&Term>,
        object: Option<&Term>,
    ) -> Result<Vec<Triple>>;

    fn select(&self, sparql: &str, target: QueryTarget<'_>) -> Result<SelectResult>;

    fn construct(&self, sparql: &str, target: QueryTarget<'_>) -> Result<Vec<Triple>>;

    /// SPARQL UPDATE against the live graph.
    fn update(&self, sparql: &str) -> Result<()>;
}

// ---------------------------------------------------------------------------
// Oxigraph
// ---------------------------------------------------------------------------

/// [`RdfEngine`] backed by an oxigraph [`Store`].
pub struct OxigraphEngine {
    store: Store,
}

impl OxigraphEngine {
    /// Create an in-memory engine (no persistence).
    pub fn in_memory() -> Result<Self> {
        let store = Store::new()
            .map_err(|e| OverlayError::Engine(format!("failed to create oxigraph store: {e}")))?;
        Ok(Self { store })
    }

    /// Open or create a persistent engine in the directory `path`.
    pub fn open(path: &Path) -> Result<Self> {
        std::fs::create_dir_all(path)?;
        let store = Store::open(path).map_err(|e| {
            OverlayError::Engine(format!(
                "failed to open oxigraph store at {}: {e}",
                path.display()
            ))
        })?;
        Ok(Self { store })
    }

    /// A throwaway store holding exactly the triples of `view`.
    fn scratch(view: &View) -> Result<Store> {
        let store = Store::new()
            .map_err(|e| OverlayError::Engine(format!("failed to create scratch store: {e}")))?;
        for triple in view.iter() {
            store
                .insert(&to_quad(triple)?)
                .map_err(|e| OverlayError::Engine(format!("scratch insert failed: {e}")))?;
        }
        Ok(store)
    }

    fn has_quad(&self, quad: &Quad) -> Result<bool> {
        self.store
            .contains(quad)
            .map_err(|e| OverlayError::Engine(format!("lookup failed: {e}")))
    }

    fn select_on(store: &Store, sparql: &str) -> Result<SelectResult> {
        let results = store
            .query(sparql)
            .map_err(|e| OverlayError::Engine(format!("SPARQL query failed: {e}")))?;
        match results {
            QueryResults::Solutions(solutions) => {
                let columns: Vec<String> = solutions
                    .variables()
                    .iter()
                    .map(|v| v.as_str().to_string())
                    .collect();
                let mut bindings = Vec::new();
                for solution in solutions {
                    let solution = solution
                        .map_err(|e| OverlayError::Engine(format!("solution error: {e}")))?;
                    let mut binding = Binding::new();
                    for (var, term) in solution.iter() {
                        binding.insert(var.as_str().to_string(), from_ox_term(term.clone())?);
                    }
                    bindings.push(binding);
                }
                Ok(SelectResult::new(columns, bindings))
            }
            _ => Err(OverlayError::Engine(
                "expected a SELECT query, got ASK/CONSTRUCT/DESCRIBE".into(),
            )),
        }
    }

    fn construct_on(store: &Store, sparql: &str) -> Result<Vec<Triple>> {
        let results = store
            .query(sparql)
            .map_err(|e| OverlayError::Engine(format!("SPARQL query failed: {e}")))?;
        match results {
            QueryResults::Graph(triples) => {
                let mut out = Vec::new();
                for triple in triples {
                    let triple = triple
                        .map_err(|e| OverlayError::Engine(format!("construct error: {e}")))?;
                    out.push(from_ox_triple(triple)?);
                }
                Ok(out)
            }
            _ => Err(OverlayError::Engine(
                "expected a CONSTRUCT or DESCRIBE query".into(),
            )),
        }
    }
}

impl RdfEngine for OxigraphEngine {
    fn add(&self, triple: &Triple) -> Result<bool> {
        let quad = to_quad(triple)?;
        // `Store::insert` does not report presence, so check first.
        if self.has_quad(&quad)? {
            return Ok(false);
        }
        self.store
            .insert(&quad)
            .map_err(|e| OverlayError::Engine(format!("insert failed: {e}")))?;
        Ok(true)
    }

    fn remove(&self, triple: &Triple) -> Result<bool> {
        let quad = to_quad(triple)?;
        if !self.has_quad(&quad)? {
            return Ok(false);
        }
        self.store
            .remove(&quad)
            .map_err(|e| OverlayError::Engine(format!("remove failed: {e}")))?;
        Ok(true)
    }

    fn contains(&self, triple: &Triple) -> Result<bool> {
        self.has_quad(&to_quad(triple)?)
    }

    fn len(&self) -> Result<usize> {
        self.store
            .len()
            .map_err(|e| OverlayError::Engine(format!("count failed: {e}")))
    }

    fn parse(&self, source: &mut dyn Read, format: SourceFormat) -> Result<Vec<Triple>> {
        let mut triples = Vec::new();
        for quad in RdfParser::from_format(format.rdf_format()).for_reader(source) {
            let quad = quad.map_err(|e| OverlayError::Engine(format!("parse error: {e}")))?;
            triples.push(from_quad(quad)?);
        }
        Ok(triples)
    }

    fn triples_matching(
        &self,
        subject: Option<&Term>,
        predicate: Option<&Term>,
        object: Option<&Term>,
    ) -> Result<Vec<Triple>> {
        let mut out = Vec::new();
        for quad in self.store.iter() {
            let quad = quad.map_err(|e| OverlayError::Engine(format!("scan failed: {e}")))?;
            if !quad.graph_name.is_default_graph() {
                continue;
            }
            let triple = from_quad(quad)?;
            if triple.matches(subject, predicate, object) {
                out.push(triple);
            }
        }
        Ok(out)
    }

    fn select(&self, sparql: &str, target: QueryTarget<'_>) -> Result<SelectResult> {
        match target {
            QueryTarget::Live => Self::select_on(&self.store, sparql),
            QueryTarget::View(view) => Self::select_on(&Self::scratch(view)?, sparql),
        }
    }

    fn construct(&self, sparql: &str, target: QueryTarget<'_>) -> Result<Vec<Triple>> {
        match target {
            QueryTarget::Live => Self::construct_on(&self.store, sparql),
            QueryTarget::View(view) => Self::construct_on(&Self::scratch(view)?, sparql),
        }
    }

    fn update(&self, sparql: &str) -> Result<()> {
        self.store
            .update(sparql)
            .map_err(|e| OverlayError::Engine(format!("SPARQL update failed: {e}")))
    }
}

impl std::fmt::Debug for OxigraphEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OxigraphEngine").finish()
    }
}

// ---------------------------------------------------------------------------
// Term conversion
// ---------------------------------------------------------------------------

fn named_node(iri: &str) -> Result<NamedNode> {
    NamedNode::new(iri).map_err(|e| OverlayError::Serialization(format!("invalid IRI {iri:?}: {e}")))
}

fn blank_node(id: &str) -> Result<BlankNode> {
    BlankNode::new(id)
        .map_err(|e| OverlayError::Serialization(format!("invalid blank node id {id:?}: {e}")))
}

fn to_ox_term(term: &Term) -> Result<OxTerm> {
    Ok(match term {
        Term::Iri(iri) => named_node(iri)?.into(),
        Term::BlankNode(id) => blank_node(id)?.into(),
        Term::Literal(lit) => {
            let literal = match (&lit.language, &lit.datatype) {
                (Some(lang), _) => {
                    OxLiteral::new_language_tagged_literal(lit.value.as_str(), lang.as_str())
                        .map_err(|e| {
                            OverlayError::Serialization(format!("invalid language tag {lang:?}: {e}"))
                        })?
                }
                (None, Some(dt)) => OxLiteral::new_typed_literal(lit.value.as_str(), named_node(dt)?),
                (None, None) => OxLiteral::new_simple_literal(lit.value.as_str()),
            };
            literal.into()
        }
    })
}

fn to_quad(triple: &Triple) -> Result<Quad> {
    triple.check_well_formed()?;
    let predicate = match &triple.predicate {
        Term::Iri(iri) => named_node(iri)?,
        other => {
            return Err(OverlayError::Serialization(format!(
                "{other} cannot be a predicate"
            )))
        }
    };
    let object = to_ox_term(&triple.object)?;
    match &triple.subject {
        Term::Iri(iri) => Ok(Quad::new(
            named_node(iri)?,
            predicate,
            object,
            GraphName::DefaultGraph,
        )),
        Term::BlankNode(id) => Ok(Quad::new(
            blank_node(id)?,
            predicate,
            object,
            GraphName::DefaultGraph,
        )),
        Term::Literal(_) => Err(OverlayError::Serialization(format!(
            "literal {} cannot be a subject",
            triple.subject
        ))),
    }
}

fn from_ox_term(term: OxTerm) -> Result<Term> {
    match term {
        OxTerm::NamedNode(node) => Ok(Term::Iri(node.into_string())),
        OxTerm::BlankNode(node) => Ok(Term::BlankNode(node.into_string())),
        OxTerm::Literal(lit) => {
            let language = lit.language().map(str::to_string);
            let datatype = lit.datatype().as_str();
            // Plain and language-tagged strings carry no explicit datatype.
            let datatype = if language.is_some() || datatype == XSD_STRING {
                None
            } else {
                Some(datatype.to_string())
            };
            Ok(Term::Literal(Literal {
                value: lit.value().to_string(),
                datatype,
                language,
            }))
        }
        #[allow(unreachable_patterns)]
        other => Err(OverlayError::Engine(format!(
            "quoted triple {other} is not supported"
        ))),
    }
}

fn from_quad(quad: Quad) -> Result<Triple> {
    Ok(Triple::new(
        from_ox_term(quad.subject.into())?,
        Term::Iri(quad.predicate.into_string()),
        from_ox_term(quad.object)?,
    ))
}

fn from_ox_triple(triple: OxTriple) -> Result<Triple> {
    Ok(Triple::new(
        from_ox_term(triple.subject.into())?,
        Term::Iri(triple.predicate.into_string()),
        from_ox_term(triple.object)?,
    ))
}
