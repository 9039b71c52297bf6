//! Tempora: bitemporal annotation overlay for RDF graphs.
//!
//! The live graph holds the triples that are asserted *now*. Next to it sits
//! an append-only [`AnnotationStore`]: every time a triple is written with a
//! valid-time or transaction-time interval, one [`AnnotationRecord`] is
//! appended. Temporal queries never look at the live graph; they rebuild a
//! [`View`] from the annotation log and hand it to the SPARQL engine.
//!
//! **Valid time** captures when a fact was true *in the world*.
//! **Transaction time** captures when the fact was *known to the system*.
//! Both bounds of an interval are inclusive and an absent upper bound is
//! open-ended.
//!
//! # Quick start
//!
//! ```rust,no_run
//! use tempora::{Interval, TemporalOverlay, Term, Triple};
//!
//! let mut overlay = TemporalOverlay::open_in_memory().unwrap();
//! let knows = Triple::new(
//!     Term::iri("http://example.org/Alice"),
//!     Term::iri("http://example.org/knows"),
//!     Term::iri("http://example.org/Bob"),
//! );
//! let valid = Interval::parse("2024-01-01", Some("2024-06-30")).unwrap();
//! overlay.add_triples(&[knows], Some(&valid), None, None).unwrap();
//!
//! let at = "2024-03-01".parse().unwrap();
//! let result = overlay
//!     .select_point_in_time("SELECT ?s ?o WHERE { ?s ?p ?o }", at)
//!     .unwrap();
//! assert_eq!(result.bindings.len(), 1);
//! ```

mod annotation;
mod config;
mod dispatch;
mod engine;
mod model;
mod mutation;
mod ontology;
mod provenance;
mod resolver;
mod time;

use std::io::Read;
use std::path::Path;

pub use annotation::{
    AnnotationRecord, AnnotationStore, RecordId, RecordOrigin, TemporalAnnotator,
};
pub use config::OverlayConfig;
pub use dispatch::QueryDispatcher;
pub use engine::{
    Binding, OxigraphEngine, QueryTarget, RdfEngine, SelectResult, SourceFormat, Table,
};
pub use model::{Literal, Term, Triple, View};
pub use mutation::MutationCoordinator;
pub use ontology::{
    OntologyValidator, OntologyViolation, PropertyDefinition, PropertyKind, OWL_CLASS,
    OWL_DATATYPE_PROPERTY, OWL_OBJECT_PROPERTY, RDFS_COMMENT, RDFS_DOMAIN, RDFS_LABEL,
    RDFS_RANGE, RDF_TYPE,
};
pub use provenance::{NoopProvenance, Provenance, ProvenanceSink};
pub use resolver::{TemporalResolver, TemporalSelector};
pub use time::{Interval, TimeKind, Timestamp};

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum OverlayError {
    #[error("storage error: {0}")]
    Storage(String),
    #[error("serialization error: {0}")]
    Serialization(String),
    #[error("invalid timestamp: {0}")]
    InvalidTimestamp(String),
    #[error("invalid interval: {0}")]
    InvalidInterval(String),
    #[error("rdf engine error: {0}")]
    Engine(String),
    #[error("configuration error: {0}")]
    Config(String),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<serde_json::Error> for OverlayError {
    fn from(e: serde_json::Error) -> Self {
        OverlayError::Serialization(e.to_string())
    }
}
impl From<redb::DatabaseError> for OverlayError {
    fn from(e: redb::DatabaseError) -> Self {
        OverlayError::Storage(e.to_string())
    }
}
impl From<redb::TransactionError> for OverlayError {
    fn from(e: redb::TransactionError) -> Self {
        OverlayError::Storage(e.to_string())
    }
}
impl From<redb::TableError> for OverlayError {
    fn from(e: redb::TableError) -> Self {
        OverlayError::Storage(e.to_string())
    }
}
impl From<redb::StorageError> for OverlayError {
    fn from(e: redb::StorageError) -> Self {
        OverlayError::Storage(e.to_string())
    }
}
impl From<redb::CommitError> for OverlayError {
    fn from(e: redb::CommitError) -> Self {
        OverlayError::Storage(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, OverlayError>;

// ---------------------------------------------------------------------------
// Overlay
// ---------------------------------------------------------------------------

/// A live RDF graph plus its bitemporal annotation log.
///
/// All write paths go through [`MutationCoordinator`] (see
/// [`mutations`](TemporalOverlay::mutations)); all query paths go through
/// [`QueryDispatcher`] (see [`queries`](TemporalOverlay::queries)). The
/// convenience methods on this type forward to those two.
///
/// Writes take `&mut self`, so there is exactly one writer at a time.
/// The live graph and the annotation log are separate stores and are not
/// updated atomically together.
pub struct TemporalOverlay<E: RdfEngine = OxigraphEngine> {
    engine: E,
    annotations: AnnotationStore,
    provenance: Box<dyn ProvenanceSink>,
}

impl TemporalOverlay<OxigraphEngine> {
    /// Open an overlay as described by `config`.
    ///
    /// Each store is file-backed when its path is set and in-memory otherwise.
    pub fn open(config: &OverlayConfig) -> Result<Self> {
        let engine = match &config.live_graph_path {
            Some(path) => OxigraphEngine::open(path)?,
            None => OxigraphEngine::in_memory()?,
        };
        let annotations = match &config.annotation_path {
            Some(path) => AnnotationStore::open(path)?,
            None => AnnotationStore::open_in_memory()?,
        };
        Ok(Self::with_engine(engine, annotations))
    }

    /// Open a fully in-memory overlay. Data is lost when it is dropped.
    pub fn open_in_memory() -> Result<Self> {
        Self::open(&OverlayConfig::default())
    }
}

impl<E: RdfEngine> TemporalOverlay<E> {
    /// Assemble an overlay from an engine and an annotation store.
    pub fn with_engine(engine: E, annotations: AnnotationStore) -> Self {
        Self {
            engine,
            annotations,
            provenance: Box::new(NoopProvenance),
        }
    }

    /// Replace the provenance hook used by every write path.
    pub fn with_provenance(mut self, sink: impl ProvenanceSink + 'static) -> Self {
        self.provenance = Box::new(sink);
        self
    }

    pub fn engine(&self) -> &E {
        &self.engine
    }

    pub fn annotations(&self) -> &AnnotationStore {
        &self.annotations
    }

    /// Borrow the write-path coordinator.
    pub fn mutations(&mut self) -> MutationCoordinator<'_, E> {
        MutationCoordinator::new(&self.engine, &mut self.annotations, self.provenance.as_ref())
    }

    /// Borrow the query dispatcher.
    pub fn queries(&self) -> QueryDispatcher<'_, E> {
        QueryDispatcher::new(&self.engine, &self.annotations)
    }

    /// Borrow a resolver over the annotation log.
    pub fn resolver(&self) -> TemporalResolver<'_> {
        TemporalResolver::new(&self.annotations)
    }

    // -- write surface -----------------------------------------------------

    /// Add every triple in `triples` with the same temporal and provenance
    /// arguments. Returns how many were not already in the live graph.
    pub fn add_triples(
        &mut self,
        triples: &[Triple],
        valid_time: Option<&Interval>,
        transaction_time: Option<&Interval>,
        provenance: Option<&Provenance>,
    ) -> Result<usize> {
        self.mutations()
            .add_triples(triples, valid_time, transaction_time, provenance)
    }

    /// Replace `old` with `new`. Not atomic, see [`MutationCoordinator::update`].
    pub fn update_triple(
        &mut self,
        old: &Triple,
        new: &Triple,
        valid_time: Option<&Interval>,
        transaction_time: Option<&Interval>,
        provenance: Option<&Provenance>,
    ) -> Result<()> {
        self.mutations()
            .update(old, new, valid_time, transaction_time, provenance)
    }

    /// Remove `triple` from the live graph. Absent triples are a no-op.
    pub fn delete_triple(
        &mut self,
        triple: &Triple,
        transaction_time: Option<&Interval>,
        provenance: Option<&Provenance>,
    ) -> Result<bool> {
        self.mutations().delete(triple, transaction_time, provenance)
    }

    /// Parse `source` and add every triple with the same arguments. Returns
    /// how many were newly inserted into the live graph.
    pub fn bulk_load(
        &mut self,
        source: impl Read,
        format: SourceFormat,
        valid_time: Option<&Interval>,
        transaction_time: Option<&Interval>,
        provenance: Option<&Provenance>,
    ) -> Result<usize> {
        self.mutations()
            .bulk_load(source, format, valid_time, transaction_time, provenance)
    }

    /// [`bulk_load`](Self::bulk_load) from a file, format inferred from its extension.
    pub fn bulk_load_file(
        &mut self,
        path: impl AsRef<Path>,
        valid_time: Option<&Interval>,
        transaction_time: Option<&Interval>,
        provenance: Option<&Provenance>,
    ) -> Result<usize> {
        self.mutations()
            .bulk_load_file(path.as_ref(), valid_time, transaction_time, provenance)
    }

    // -- query surface -----------------------------------------------------

    pub fn select(&self, sparql: &str) -> Result<SelectResult> {
        self.queries().select(sparql)
    }

    pub fn select_point_in_time(&self, sparql: &str, at: Timestamp) -> Result<SelectResult> {
        self.queries().select_point_in_time(sparql, at)
    }

    pub fn select_as_of(&self, sparql: &str, at: Timestamp) -> Result<SelectResult> {
        self.queries().select_as_of(sparql, at)
    }

    pub fn select_interval_valid_time(
        &self,
        sparql: &str,
        start: Timestamp,
        end: Timestamp,
    ) -> Result<SelectResult> {
        self.queries().select_interval_valid_time(sparql, start, end)
    }

    pub fn select_interval_transaction_time(
        &self,
        sparql: &str,
        start: Timestamp,
        end: Timestamp,
    ) -> Result<SelectResult> {
        self.queries()
            .select_interval_transaction_time(sparql, start, end)
    }

    /// Any SELECT (property paths and aggregates included) against a temporal view.
    pub fn select_temporal(
        &self,
        sparql: &str,
        selector: &TemporalSelector,
    ) -> Result<SelectResult> {
        self.queries().select_temporal(sparql, selector)
    }

    /// CONSTRUCT against a temporal view.
    pub fn construct_temporal(
        &self,
        sparql: &str,
        selector: &TemporalSelector,
    ) -> Result<Vec<Triple>> {
        self.queries().construct_temporal(sparql, selector)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
