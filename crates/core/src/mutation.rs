//! The single write path: live-graph mutation plus annotation and provenance.

use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

use tracing::{debug, info, warn};

use crate::annotation::{AnnotationStore, RecordOrigin, TemporalAnnotator};
use crate::engine::{RdfEngine, SourceFormat};
use crate::model::Triple;
use crate::provenance::{Provenance, ProvenanceSink};
use crate::time::{Interval, TimeKind};
use crate::Result;

/// Orchestrates writes to the live graph together with annotation records.
///
/// # Failure behaviour
///
/// The live graph and the annotation log are separate stores. Each step
/// commits on its own and nothing is rolled back: if `add` fails while
/// writing the transaction-time record, the triple is already in the live
/// graph with its valid-time record. `update` and `bulk_load` inherit this,
/// so an error part-way leaves the completed steps in place and is returned
/// to the caller as-is.
pub struct MutationCoordinator<'a, E: RdfEngine> {
    engine: &'a E,
    annotations: &'a mut AnnotationStore,
    provenance: &'a dyn ProvenanceSink,
}

impl<'a, E: RdfEngine> MutationCoordinator<'a, E> {
    pub fn new(
        engine: &'a E,
        annotations: &'a mut AnnotationStore,
        provenance: &'a dyn ProvenanceSink,
    ) -> Self {
        Self {
            engine,
            annotations,
            provenance,
        }
    }

    /// Insert `triple` into the live graph and append the requested records.
    ///
    /// Re-adding a present triple leaves the live graph unchanged but still
    /// appends fresh records. Returns whether the triple was newly inserted.
    pub fn add(
        &mut self,
        triple: &Triple,
        valid_time: Option<&Interval>,
        transaction_time: Option<&Interval>,
        provenance: Option<&Provenance>,
    ) -> Result<bool> {
        triple.check_well_formed()?;
        let inserted = self.engine.add(triple)?;
        let mut annotator = TemporalAnnotator::new(&mut *self.annotations);
        if let Some(interval) = valid_time {
            annotator.attach(triple, TimeKind::ValidTime, *interval, RecordOrigin::Assertion)?;
        }
        if let Some(interval) = transaction_time {
            annotator.attach(
                triple,
                TimeKind::TransactionTime,
                *interval,
                RecordOrigin::Assertion,
            )?;
        }
        if let Some(prov) = provenance {
            self.provenance.attach(triple, prov)?;
        }
        debug!(%triple, inserted, "triple added");
        Ok(inserted)
    }

    /// [`add`](Self::add) each triple with the same arguments.
    /// Returns how many were newly inserted.
    pub fn add_triples(
        &mut self,
        triples: &[Triple],
        valid_time: Option<&Interval>,
        transaction_time: Option<&Interval>,
        provenance: Option<&Provenance>,
    ) -> Result<usize> {
        let mut inserted = 0;
        for triple in triples {
            if self.add(triple, valid_time, transaction_time, provenance)? {
                inserted += 1;
            }
        }
        Ok(inserted)
    }

    /// Remove `triple` from the live graph.
    ///
    /// Deleting an absent triple is a silent no-op and returns `false`. When
    /// `transaction_time` is given, a transaction-time record marking the
    /// removal is appended either way. Existing valid-time records are
    /// left untouched, open-ended ones included; closing them is up to the
    /// caller.
    ///
    /// Resolution does not look at a record's origin, so that retraction
    /// record is an ordinary transaction-time record to the resolver: the
    /// deleted triple *is* included in [`TemporalSelector::AsOf`] and
    /// [`TemporalSelector::TransactionOverlap`] views covering the
    /// retraction interval.
    ///
    /// [`TemporalSelector::AsOf`]: crate::TemporalSelector::AsOf
    /// [`TemporalSelector::TransactionOverlap`]: crate::TemporalSelector::TransactionOverlap
    pub fn delete(
        &mut self,
        triple: &Triple,
        transaction_time: Option<&Interval>,
        provenance: Option<&Provenance>,
    ) -> Result<bool> {
        triple.check_well_formed()?;
        let removed = self.engine.remove(triple)?;
        if !removed {
            warn!(%triple, "delete of absent triple ignored");
        }
        if let Some(interval) = transaction_time {
            TemporalAnnotator::new(&mut *self.annotations).attach(
                triple,
                TimeKind::TransactionTime,
                *interval,
                RecordOrigin::Retraction,
            )?;
        }
        if let Some(prov) = provenance {
            self.provenance.attach(triple, prov)?;
        }
        debug!(%triple, removed, "triple deleted");
        Ok(removed)
    }

    /// `delete(old)` followed by `add(new)`. Not atomic: if the add fails,
    /// `old` is already gone.
    pub fn update(
        &mut self,
        old: &Triple,
        new: &Triple,
        valid_time: Option<&Interval>,
        transaction_time: Option<&Interval>,
        provenance: Option<&Provenance>,
    ) -> Result<()> {
        self.delete(old, transaction_time, provenance)?;
        self.add(new, valid_time, transaction_time, provenance)?;
        Ok(())
    }

    /// Parse `source` and [`add`](Self::add) every triple with the same
    /// temporal and provenance arguments.
    ///
    /// The whole document is parsed before the first write, so a syntax
    /// error leaves no trace. Errors during the add loop leave the earlier
    /// triples in place.
    ///
    /// Returns how many triples were newly inserted, as
    /// [`add_triples`](Self::add_triples) does. Duplicates within the
    /// document and triples already in the live graph are not counted,
    /// but every parsed triple still gets its annotation records.
    pub fn bulk_load(
        &mut self,
        mut source: impl Read,
        format: SourceFormat,
        valid_time: Option<&Interval>,
        transaction_time: Option<&Interval>,
        provenance: Option<&Provenance>,
    ) -> Result<usize> {
        let triples = self.engine.parse(&mut source, format)?;
        let inserted = self.add_triples(&triples, valid_time, transaction_time, provenance)?;
        info!(
            ?format,
            parsed = triples.len(),
            inserted,
            "bulk load complete"
        );
        Ok(inserted)
    }

    /// [`bulk_load`](Self::bulk_load) from a file; the format comes from
    /// its extension.
    pub fn bulk_load_file(
        &mut self,
        path: &Path,
        valid_time: Option<&Interval>,
        transaction_time: Option<&Interval>,
        provenance: Option<&Provenance>,
    ) -> Result<usize> {
        let format = SourceFormat::from_path(path)?;
        let reader = BufReader::new(File::open(path)?);
        self.bulk_load(reader, format, valid_time, transaction_time, provenance)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::OxigraphEngine;
    use crate::model::Term;
    use crate::provenance::NoopProvenance;
    use crate::resolver::TemporalResolver;
    use crate::time::Timestamp;
    use crate::OverlayError;

    struct Fixture {
        engine: OxigraphEngine,
        annotations: AnnotationStore,
    }

    impl Fixture {
        fn new() -> Self {
            Self {
                engine: OxigraphEngine::in_memory().unwrap(),
                annotations: AnnotationStore::open_in_memory().unwrap(),
            }
        }

        fn coordinator(&mut self) -> MutationCoordinator<'_, OxigraphEngine> {
            MutationCoordinator::new(&self.engine, &mut self.annotations, &NoopProvenance)
        }
    }

    fn ts(s: &str) -> Timestamp {
        s.parse().unwrap()
    }

    fn iv(from: &str, to: Option<&str>) -> Interval {
        Interval::parse(from, to).unwrap()
    }

    fn knows(a: &str, b: &str) -> Triple {
        Triple::new(
            Term::iri(format!("http://example.org/{a}")),
            Term::iri("http://example.org/knows"),
            Term::iri(format!("http://example.org/{b}")),
        )
    }

    #[test]
    fn add_without_intervals_writes_no_records() {
        let mut fx = Fixture::new();
        assert!(fx.coordinator().add(&knows("A", "B"), None, None, None).unwrap());
        assert!(fx.engine.contains(&knows("A", "B")).unwrap());
        assert!(fx.annotations.is_empty());
    }

    #[test]
    fn re_add_keeps_one_triple_but_two_records() {
        let mut fx = Fixture::new();
        let t = knows("Alice", "Bob");
        let valid = iv("2024-01-01", None);

        assert!(fx.coordinator().add(&t, Some(&valid), None, None).unwrap());
        assert!(!fx.coordinator().add(&t, Some(&valid), None, None).unwrap());

        assert_eq!(fx.engine.len().unwrap(), 1);
        assert_eq!(fx.annotations.history(&t).count(), 2);
        assert!(fx
            .annotations
            .iter()
            .all(|r| r.origin == RecordOrigin::Assertion));
    }

    #[test]
    fn add_writes_both_axes() {
        let mut fx = Fixture::new();
        let t = knows("Alice", "Bob");
        fx.coordinator()
            .add(
                &t,
                Some(&iv("2020-01-01", None)),
                Some(&iv("2024-05-01", None)),
                None,
            )
            .unwrap();
        assert_eq!(fx.annotations.count(TimeKind::ValidTime), 1);
        assert_eq!(fx.annotations.count(TimeKind::TransactionTime), 1);
    }

    #[test]
    fn literal_triples_match_their_history_after_round_trip() {
        let mut fx = Fixture::new();
        let name = Triple::new(
            Term::iri("http://example.org/A"),
            Term::iri("http://example.org/name"),
            Term::typed_literal("x", "http://www.w3.org/2001/XMLSchema#string"),
        );
        let label = Triple::new(
            Term::iri("http://example.org/A"),
            Term::iri("http://example.org/label"),
            Term::lang_literal("Colour", "en-GB"),
        );
        fx.coordinator()
            .add_triples(&[name, label], Some(&iv("2024-01-01", None)), None, None)
            .unwrap();

        let live = fx.engine.triples_matching(None, None, None).unwrap();
        assert_eq!(live.len(), 2);
        for triple in &live {
            assert_eq!(fx.annotations.history(triple).count(), 1, "{triple}");
        }
    }

    #[test]
    fn delete_of_absent_triple_is_a_no_op() {
        let mut fx = Fixture::new();
        let removed = fx.coordinator().delete(&knows("X", "Y"), None, None).unwrap();
        assert!(!removed);
        assert_eq!(fx.engine.len().unwrap(), 0);
    }

    #[test]
    fn delete_keeps_history_queryable() {
        let mut fx = Fixture::new();
        let t = knows("Alice", "Bob");
        fx.coordinator()
            .add(&t, Some(&iv("2024-01-01", Some("2024-06-30"))), None, None)
            .unwrap();
        let before: Vec<_> = fx.annotations.iter().cloned().collect();

        fx.coordinator().delete(&t, None, None).unwrap();

        assert!(!fx.engine.contains(&t).unwrap());
        let after: Vec<_> = fx.annotations.iter().cloned().collect();
        assert_eq!(before, after, "deletion must not touch the log");
        let view = TemporalResolver::new(&fx.annotations)
            .point_in_time(ts("2024-03-01"))
            .unwrap();
        assert!(view.contains(&t));
    }

    #[test]
    fn delete_with_transaction_time_appends_retraction_only() {
        let mut fx = Fixture::new();
        let t = knows("Alice", "Bob");
        fx.coordinator()
            .add(&t, Some(&iv("2024-01-01", None)), None, None)
            .unwrap();
        fx.coordinator()
            .delete(&t, Some(&iv("2024-09-01", None)), None)
            .unwrap();

        let records: Vec<_> = fx.annotations.history(&t).cloned().collect();
        assert_eq!(records.len(), 2);
        assert_eq!(records[1].kind, TimeKind::TransactionTime);
        assert_eq!(records[1].origin, RecordOrigin::Retraction);
        // The open valid-time record is not closed.
        assert_eq!(records[0].interval.to(), None);
        assert!(TemporalResolver::new(&fx.annotations)
            .point_in_time(ts("2030-01-01"))
            .unwrap()
            .contains(&t));
    }

    #[test]
    fn update_swaps_triples_and_annotates_both_halves() {
        let mut fx = Fixture::new();
        let old = knows("Alice", "Bob");
        let new = knows("Alice", "Carol");
        fx.coordinator().add(&old, None, None, None).unwrap();

        let tx = iv("2024-07-01", None);
        fx.coordinator()
            .update(&old, &new, Some(&iv("2024-07-01", None)), Some(&tx), None)
            .unwrap();

        assert!(!fx.engine.contains(&old).unwrap());
        assert!(fx.engine.contains(&new).unwrap());
        let origins: Vec<_> = fx.annotations.iter().map(|r| (r.origin, r.kind)).collect();
        assert_eq!(
            origins,
            vec![
                (RecordOrigin::Retraction, TimeKind::TransactionTime),
                (RecordOrigin::Assertion, TimeKind::ValidTime),
                (RecordOrigin::Assertion, TimeKind::TransactionTime),
            ]
        );
    }

    #[test]
    fn update_to_malformed_triple_leaves_old_deleted() {
        let mut fx = Fixture::new();
        let old = knows("Alice", "Bob");
        let bad = Triple::new(
            Term::literal("Alice"),
            Term::iri("http://example.org/knows"),
            Term::iri("http://example.org/Carol"),
        );
        fx.coordinator().add(&old, None, None, None).unwrap();

        let err = fx.coordinator().update(&old, &bad, None, None, None).unwrap_err();
        assert!(matches!(err, OverlayError::Serialization(_)));
        assert!(!fx.engine.contains(&old).unwrap());
        assert_eq!(fx.engine.len().unwrap(), 0);
    }

    #[test]
    fn bulk_load_applies_arguments_uniformly() {
        let mut fx = Fixture::new();
        let doc = "<http://example.org/A> <http://example.org/knows> <http://example.org/B> .\n\
                   <http://example.org/B> <http://example.org/knows> <http://example.org/C> .\n";
        let valid = iv("2024-01-01", Some("2024-12-31"));

        let applied = fx
            .coordinator()
            .bulk_load(doc.as_bytes(), SourceFormat::NTriples, Some(&valid), None, None)
            .unwrap();

        assert_eq!(applied, 2);
        assert_eq!(fx.engine.len().unwrap(), 2);
        assert_eq!(fx.annotations.len(), 2);
        assert!(fx.annotations.iter().all(|r| r.interval == valid));
    }

    #[test]
    fn bulk_load_counts_only_new_triples() {
        let mut fx = Fixture::new();
        fx.coordinator().add(&knows("B", "C"), None, None, None).unwrap();
        let doc = "<http://example.org/A> <http://example.org/knows> <http://example.org/B> .\n\
                   <http://example.org/A> <http://example.org/knows> <http://example.org/B> .\n\
                   <http://example.org/B> <http://example.org/knows> <http://example.org/C> .\n";
        let valid = iv("2024-01-01", None);

        let added = fx
            .coordinator()
            .bulk_load(doc.as_bytes(), SourceFormat::NTriples, Some(&valid), None, None)
            .unwrap();

        assert_eq!(added, 1);
        assert_eq!(fx.engine.len().unwrap(), 2);
        assert_eq!(fx.annotations.len(), 3, "every parsed triple is annotated");
    }

    #[test]
    fn add_triples_counts_newly_inserted() {
        let mut fx = Fixture::new();
        let batch = [knows("A", "B"), knows("A", "B"), knows("B", "C")];
        assert_eq!(fx.coordinator().add_triples(&batch, None, None, None).unwrap(), 2);
        assert_eq!(fx.coordinator().add_triples(&batch, None, None, None).unwrap(), 0);
        assert_eq!(fx.engine.len().unwrap(), 2);
    }

    #[test]
    fn delete_reports_whether_triple_was_present() {
        let mut fx = Fixture::new();
        let t = knows("A", "B");
        fx.coordinator().add(&t, None, None, None).unwrap();
        assert!(fx.coordinator().delete(&t, None, None).unwrap());
        assert!(!fx.coordinator().delete(&t, None, None).unwrap());
    }

    #[test]
    fn retraction_record_is_included_in_as_of_views() {
        let mut fx = Fixture::new();
        let t = knows("Alice", "Bob");
        fx.coordinator().add(&t, None, None, None).unwrap();
        fx.coordinator()
            .delete(&t, Some(&iv("2024-09-01", Some("2024-09-30"))), None)
            .unwrap();

        let resolver = TemporalResolver::new(&fx.annotations);
        assert!(resolver.as_of(ts("2024-09-15")).unwrap().contains(&t));
        assert!(resolver
            .transaction_overlap(ts("2024-09-20"), ts("2024-10-20"))
            .unwrap()
            .contains(&t));
        assert!(resolver.as_of(ts("2024-10-01")).unwrap().is_empty());
    }

    #[test]
    fn bulk_load_syntax_error_writes_nothing() {
        let mut fx = Fixture::new();
        let doc = "<http://example.org/A> <http://example.org/knows> <http://example.org/B> .\n\
                   <http://example.org/B> <http://example.org/knows> oops\n";
        let err = fx
            .coordinator()
            .bulk_load(
                doc.as_bytes(),
                SourceFormat::NTriples,
                Some(&iv("2024-01-01", None)),
                None,
                None,
            )
            .unwrap_err();
        assert!(matches!(err, OverlayError::Engine(_)));
        assert_eq!(fx.engine.len().unwrap(), 0);
        assert!(fx.annotations.is_empty());
    }

    #[test]
    fn bulk_load_file_infers_format() {
        let mut fx = Fixture::new();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("people.ttl");
        std::fs::write(
            &path,
            "@prefix ex: <http://example.org/> .\nex:A ex:knows ex:B , ex:C .\n",
        )
        .unwrap();

        let applied = fx
            .coordinator()
            .bulk_load_file(&path, None, Some(&iv("2024-02-02", None)), None)
            .unwrap();
        assert_eq!(applied, 2);
        assert_eq!(fx.annotations.count(TimeKind::TransactionTime), 2);
    }
}
