//! Provenance metadata and the hook that receives it on every write.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::model::Triple;
use crate::Result;

/// Where a written triple came from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Provenance {
    /// Data source (API, file name, conversation id, ...).
    pub source: String,
    /// Ingestion time as given by the caller.
    pub timestamp: String,
    /// Agent responsible for the data.
    pub agent: String,
}

impl Provenance {
    pub fn new(
        source: impl Into<String>,
        timestamp: impl Into<String>,
        agent: impl Into<String>,
    ) -> Self {
        Self {
            source: source.into(),
            timestamp: timestamp.into(),
            agent: agent.into(),
        }
    }
}

/// Receives provenance for each triple written through the coordinator.
///
/// Called after the live-graph write and the annotation writes for that
/// triple. An error aborts the remaining steps of the mutation.
pub trait ProvenanceSink {
    fn attach(&self, triple: &Triple, provenance: &Provenance) -> Result<()>;
}

/// Default sink: records nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopProvenance;

impl ProvenanceSink for NoopProvenance {
    fn attach(&self, triple: &Triple, provenance: &Provenance) -> Result<()> {
        debug!(
            %triple,
            source = %provenance.source,
            agent = %provenance.agent,
            "provenance dropped by no-op sink"
        );
        Ok(())
    }
}
