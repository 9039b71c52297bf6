//! Routes queries to the live graph or to a resolver-built view.

use tracing::debug;

use crate::annotation::AnnotationStore;
use crate::engine::{QueryTarget, RdfEngine, SelectResult};
use crate::model::{Triple, View};
use crate::resolver::{TemporalResolver, TemporalSelector};
use crate::time::Timestamp;
use crate::Result;

/// Read-only entry point for SPARQL over the live graph and temporal views.
///
/// Temporal queries rebuild their view from the annotation log on every
/// call and evaluate against it in isolation: the live graph is never
/// consulted, so a deleted triple still appears in a past view and a live
/// triple without annotations never appears in one.
pub struct QueryDispatcher<'a, E: RdfEngine> {
    engine: &'a E,
    annotations: &'a AnnotationStore,
}

impl<'a, E: RdfEngine> QueryDispatcher<'a, E> {
    pub fn new(engine: &'a E, annotations: &'a AnnotationStore) -> Self {
        Self {
            engine,
            annotations,
        }
    }

    // -- live graph --------------------------------------------------------

    /// SELECT against the live graph.
    pub fn select(&self, sparql: &str) -> Result<SelectResult> {
        self.engine.select(sparql, QueryTarget::Live)
    }

    /// CONSTRUCT or DESCRIBE against the live graph.
    pub fn construct(&self, sparql: &str) -> Result<Vec<Triple>> {
        self.engine.construct(sparql, QueryTarget::Live)
    }

    /// SPARQL UPDATE against the live graph.
    ///
    /// Bypasses the annotation log entirely: no records are written for
    /// inserted or deleted triples.
    pub fn update(&self, sparql: &str) -> Result<()> {
        self.engine.update(sparql)
    }

    // -- temporal views ----------------------------------------------------

    /// SELECT against the triples valid at `at`.
    pub fn select_point_in_time(&self, sparql: &str, at: Timestamp) -> Result<SelectResult> {
        self.select_temporal(sparql, &TemporalSelector::PointInTime(at))
    }

    /// SELECT against the triples known to the system at `at`.
    pub fn select_as_of(&self, sparql: &str, at: Timestamp) -> Result<SelectResult> {
        self.select_temporal(sparql, &TemporalSelector::AsOf(at))
    }

    pub fn select_interval_valid_time(
        &self,
        sparql: &str,
        start: Timestamp,
        end: Timestamp,
    ) -> Result<SelectResult> {
        self.select_temporal(sparql, &TemporalSelector::ValidOverlap { start, end })
    }

    pub fn select_interval_transaction_time(
        &self,
        sparql: &str,
        start: Timestamp,
        end: Timestamp,
    ) -> Result<SelectResult> {
        self.select_temporal(sparql, &TemporalSelector::TransactionOverlap { start, end })
    }

    pub fn select_temporal(
        &self,
        sparql: &str,
        selector: &TemporalSelector,
    ) -> Result<SelectResult> {
        let view = self.view(selector)?;
        let result = self.engine.select(sparql, QueryTarget::View(&view))?;
        debug!(?selector, view = view.len(), rows = result.len(), "temporal select");
        Ok(result)
    }

    pub fn construct_temporal(
        &self,
        sparql: &str,
        selector: &TemporalSelector,
    ) -> Result<Vec<Triple>> {
        let view = self.view(selector)?;
        self.engine.construct(sparql, QueryTarget::View(&view))
    }

    fn view(&self, selector: &TemporalSelector) -> Result<View> {
        TemporalResolver::new(self.annotations).resolve(selector)
    }
}
