//! Agent context and memory helpers built on Tempora.
//!
//! Memories are small RDF nodes hanging off an agent resource:
//!
//! ```text
//! <urn:tempora:agent:agent-001> mem:hasMemory <urn:tempora:memory:01J...> .
//! <urn:tempora:memory:01J...>   mem:event     "login" .
//! <urn:tempora:memory:01J...>   dcterms:source "chat" .
//! ```
//!
//! Everything goes through a [`TemporalOverlay`], so memories stored with a
//! `valid_from` can later be read back from a point-in-time view.
//!
//! # Usage
//!
//! ```rust,no_run
//! use tempora_agent_memory::{AgentMemory, ContextFormat};
//!
//! let mut memory = AgentMemory::open_in_memory().unwrap();
//! memory
//!     .store_memory("agent-001", &[("event", "login")], None, None)
//!     .unwrap();
//!
//! let facts = memory.context_for_agent("agent-001", None).unwrap();
//! let prompt = AgentMemory::format_context(&facts, ContextFormat::Text).unwrap();
//! ```

use std::collections::BTreeMap;

use serde::Serialize;
use tempora::{
    Interval, OverlayConfig, Provenance, RdfEngine, TemporalOverlay, TemporalSelector, Term,
    Timestamp, Triple,
};
use tracing::{debug, info};
use ulid::Ulid;

pub use tempora::OverlayError as Error;
pub type Result<T> = std::result::Result<T, Error>;

/// Namespace for memory predicates (`mem:hasMemory`, `mem:<field>`).
pub const MEM_NS: &str = "urn:tempora:mem:";
/// Prefix of agent resources.
pub const AGENT_PREFIX: &str = "urn:tempora:agent:";
/// Prefix of minted memory nodes.
pub const MEMORY_PREFIX: &str = "urn:tempora:memory:";
const DCTERMS_NS: &str = "http://purl.org/dc/terms/";

/// One stored memory read back from the live graph.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MemoryEntry {
    pub iri: String,
    /// Memory fields by local name; provenance fields are prefixed `prov_`.
    pub fields: BTreeMap<String, String>,
}

/// A flattened `(subject, predicate, object)` suitable for prompts.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub struct ContextFact {
    pub subject: String,
    pub predicate: String,
    pub object: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContextFormat {
    /// One `key: value, ...` line per fact.
    Text,
    /// Pretty-printed JSON array.
    Json,
}

/// Agent memory store on top of a [`TemporalOverlay`].
pub struct AgentMemory {
    overlay: TemporalOverlay,
}

impl AgentMemory {
    /// Open or create a memory store as described by `config`.
    pub fn open(config: &OverlayConfig) -> Result<Self> {
        Ok(Self {
            overlay: TemporalOverlay::open(config)?,
        })
    }

    pub fn open_in_memory() -> Result<Self> {
        Ok(Self {
            overlay: TemporalOverlay::open_in_memory()?,
        })
    }

    /// Wrap an existing overlay.
    pub fn with_overlay(overlay: TemporalOverlay) -> Self {
        Self { overlay }
    }

    pub fn overlay(&self) -> &TemporalOverlay {
        &self.overlay
    }

    /// Store one memory for `agent_id` and return the IRI of its node.
    ///
    /// Field keys become predicate local names, so they must be valid IRI
    /// characters. When `valid_from` is set, every written triple gets an
    /// open-ended valid-time record starting there.
    pub fn store_memory(
        &mut self,
        agent_id: &str,
        fields: &[(&str, &str)],
        provenance: Option<&Provenance>,
        valid_from: Option<Timestamp>,
    ) -> Result<String> {
        let agent = agent_term(agent_id);
        let node = format!("{MEMORY_PREFIX}{}", Ulid::new());
        let node_term = Term::iri(node.as_str());

        let mut triples = vec![Triple::new(
            agent,
            Term::iri(format!("{MEM_NS}hasMemory")),
            node_term.clone(),
        )];
        for (key, value) in fields {
            triples.push(Triple::new(
                node_term.clone(),
                Term::iri(format!("{MEM_NS}{key}")),
                Term::literal(*value),
            ));
        }
        if let Some(prov) = provenance {
            for (key, value) in [
                ("source", &prov.source),
                ("created", &prov.timestamp),
                ("creator", &prov.agent),
            ] {
                triples.push(Triple::new(
                    node_term.clone(),
                    Term::iri(format!("{DCTERMS_NS}{key}")),
                    Term::literal(value.as_str()),
                ));
            }
        }

        // Validate the whole memory up front so a bad key cannot leave a
        // dangling `hasMemory` link behind.
        for triple in &triples {
            triple.check_well_formed()?;
        }
        let valid = valid_from.map(Interval::starting);
        self.overlay
            .add_triples(&triples, valid.as_ref(), None, provenance)?;
        info!(agent = agent_id, memory = %node, fields = fields.len(), "memory stored");
        Ok(node)
    }

    /// Every memory currently attached to `agent_id`, ordered by IRI.
    pub fn retrieve_memories(&self, agent_id: &str) -> Result<Vec<MemoryEntry>> {
        let engine = self.overlay.engine();
        let has_memory = Term::iri(format!("{MEM_NS}hasMemory"));
        let links = engine.triples_matching(Some(&agent_term(agent_id)), Some(&has_memory), None)?;

        let mut entries = Vec::with_capacity(links.len());
        for link in links {
            let Term::Iri(iri) = link.object else {
                continue;
            };
            let mut fields = BTreeMap::new();
            for fact in engine.triples_matching(Some(&Term::iri(iri.as_str())), None, None)? {
                let Some(predicate) = fact.predicate.as_iri() else {
                    continue;
                };
                let key = if let Some(local) = predicate.strip_prefix(MEM_NS) {
                    local.to_string()
                } else if let Some(local) = predicate.strip_prefix(DCTERMS_NS) {
                    format!("prov_{local}")
                } else {
                    continue;
                };
                fields.insert(key, term_text(&fact.object));
            }
            entries.push(MemoryEntry { iri, fields });
        }
        entries.sort_by(|a, b| a.iri.cmp(&b.iri));
        debug!(agent = agent_id, memories = entries.len(), "memories retrieved");
        Ok(entries)
    }

    /// All facts with the agent as subject.
    ///
    /// Without a selector the live graph is read; with one, the facts come
    /// from the temporal view it selects.
    pub fn context_for_agent(
        &self,
        agent_id: &str,
        selector: Option<&TemporalSelector>,
    ) -> Result<Vec<ContextFact>> {
        let agent = agent_term(agent_id);
        let triples: Vec<Triple> = match selector {
            None => self
                .overlay
                .engine()
                .triples_matching(Some(&agent), None, None)?,
            Some(selector) => self
                .overlay
                .resolver()
                .resolve(selector)?
                .iter()
                .filter(|t| t.matches(Some(&agent), None, None))
                .cloned()
                .collect(),
        };
        let mut facts: Vec<ContextFact> = triples.iter().map(ContextFact::from).collect();
        facts.sort();
        Ok(facts)
    }

    /// Render facts for an LLM prompt.
    pub fn format_context(facts: &[ContextFact], format: ContextFormat) -> Result<String> {
        match format {
            ContextFormat::Json => Ok(serde_json::to_string_pretty(facts)?),
            ContextFormat::Text => Ok(facts
                .iter()
                .map(|f| {
                    format!(
                        "subject: {}, predicate: {}, object: {}",
                        f.subject, f.predicate, f.object
                    )
                })
                .collect::<Vec<_>>()
                .join("\n")),
        }
    }

    /// Text context for `agent_id`, cut off once it would exceed roughly
    /// `max_tokens` tokens.
    pub fn assemble_context(
        &self,
        agent_id: &str,
        selector: Option<&TemporalSelector>,
        max_tokens: usize,
    ) -> Result<String> {
        let facts = self.context_for_agent(agent_id, selector)?;
        let char_budget = max_tokens.saturating_mul(4); // ~4 chars per token
        let mut context = String::new();
        for fact in &facts {
            let line = format!("{} · {} · {}\n", fact.subject, fact.predicate, fact.object);
            if context.len() + line.len() > char_budget {
                break;
            }
            context.push_str(&line);
        }
        Ok(context)
    }
}

impl From<&Triple> for ContextFact {
    fn from(triple: &Triple) -> Self {
        Self {
            subject: term_text(&triple.subject),
            predicate: term_text(&triple.predicate),
            object: term_text(&triple.object),
        }
    }
}

fn agent_term(agent_id: &str) -> Term {
    Term::iri(format!("{AGENT_PREFIX}{agent_id}"))
}

fn term_text(term: &Term) -> String {
    match term {
        Term::Iri(iri) => iri.clone(),
        Term::BlankNode(id) => format!("_:{id}"),
        Term::Literal(lit) => lit.value.clone(),
    }
}
