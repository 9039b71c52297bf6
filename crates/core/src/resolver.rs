//! Rebuilds point-in-time, as-of and interval views from the annotation log.

use tracing::debug;

use crate::annotation::{AnnotationRecord, AnnotationStore};
use crate::model::View;
use crate::time::{TimeKind, Timestamp};
use crate::{OverlayError, Result};

/// Which records to select, and on which time axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TemporalSelector {
    /// Valid-time records with `from <= t <= to`.
    PointInTime(Timestamp),
    /// Transaction-time records with `from <= t <= to`.
    AsOf(Timestamp),
    /// Valid-time records overlapping `[start, end]`.
    ValidOverlap { start: Timestamp, end: Timestamp },
    /// Transaction-time records overlapping `[start, end]`.
    TransactionOverlap { start: Timestamp, end: Timestamp },
}

impl TemporalSelector {
    pub fn kind(&self) -> TimeKind {
        match self {
            TemporalSelector::PointInTime(_) | TemporalSelector::ValidOverlap { .. } => {
                TimeKind::ValidTime
            }
            TemporalSelector::AsOf(_) | TemporalSelector::TransactionOverlap { .. } => {
                TimeKind::TransactionTime
            }
        }
    }

    /// The latest interval start a matching record can have.
    fn upper(&self) -> Timestamp {
        match *self {
            TemporalSelector::PointInTime(t) | TemporalSelector::AsOf(t) => t,
            TemporalSelector::ValidOverlap { end, .. }
            | TemporalSelector::TransactionOverlap { end, .. } => end,
        }
    }

    fn check(&self) -> Result<()> {
        match *self {
            TemporalSelector::ValidOverlap { start, end }
            | TemporalSelector::TransactionOverlap { start, end }
                if end < start =>
            {
                Err(OverlayError::InvalidInterval(format!(
                    "query window end {end} is before start {start}"
                )))
            }
            _ => Ok(()),
        }
    }

    /// Does `record` satisfy this selector? The kind is not checked here.
    pub fn admits(&self, record: &AnnotationRecord) -> bool {
        match *self {
            TemporalSelector::PointInTime(t) | TemporalSelector::AsOf(t) => {
                record.interval.contains(t)
            }
            TemporalSelector::ValidOverlap { start, end }
            | TemporalSelector::TransactionOverlap { start, end } => {
                record.interval.overlaps(start, end)
            }
        }
    }
}

/// Read-only resolver over an [`AnnotationStore`].
///
/// A triple is in the view when **any** of its records of the selected kind
/// matches; records that exclude it do not veto the ones that include it.
/// Views are recomputed on every call and never written to the live graph.
pub struct TemporalResolver<'a> {
    store: &'a AnnotationStore,
}

impl<'a> TemporalResolver<'a> {
    pub fn new(store: &'a AnnotationStore) -> Self {
        Self { store }
    }

    /// Build the view selected by `selector`. No matches is an empty view.
    pub fn resolve(&self, selector: &TemporalSelector) -> Result<View> {
        selector.check()?;
        let kind = selector.kind();
        let mut scanned = 0usize;
        let mut view = View::new();
        for record in self.store.starting_by(kind, selector.upper()) {
            scanned += 1;
            if selector.admits(record) {
                view.insert(record.triple.clone());
            }
        }
        debug!(
            %kind,
            total = self.store.count(kind),
            scanned,
            matched = view.len(),
            "temporal view resolved"
        );
        Ok(view)
    }

    pub fn point_in_time(&self, at: Timestamp) -> Result<View> {
        self.resolve(&TemporalSelector::PointInTime(at))
    }

    pub fn as_of(&self, at: Timestamp) -> Result<View> {
        self.resolve(&TemporalSelector::AsOf(at))
    }

    pub fn valid_overlap(&self, start: Timestamp, end: Timestamp) -> Result<View> {
        self.resolve(&TemporalSelector::ValidOverlap { start, end })
    }

    pub fn transaction_overlap(&self, start: Timestamp, end: Timestamp) -> Result<View> {
        self.resolve(&TemporalSelector::TransactionOverlap { start, end })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::annotation::TemporalAnnotator;
    use crate::model::{Term, Triple};

    fn ts(s: &str) -> Timestamp {
        s.parse().unwrap()
    }

    fn knows(a: &str, b: &str) -> Triple {
        Triple::new(
            Term::iri(format!("http://example.org/{a}")),
            Term::iri("http://example.org/knows"),
            Term::iri(format!("http://example.org/{b}")),
        )
    }

    fn store_with_valid(entries: &[(Triple, &str, Option<&str>)]) -> AnnotationStore {
        let mut store = AnnotationStore::open_in_memory().unwrap();
        let mut annotator = TemporalAnnotator::new(&mut store);
        for (triple, from, to) in entries {
            annotator
                .attach_valid_time(triple, ts(from), to.map(ts))
                .unwrap();
        }
        store
    }

    #[test]
    fn point_in_time_bounds_are_inclusive() {
        let t = knows("Alice", "Bob");
        let store = store_with_valid(&[(t.clone(), "2024-01-01", Some("2024-12-31"))]);
        let resolver = TemporalResolver::new(&store);

        for at in ["2024-01-01", "2024-06-01", "2024-12-31"] {
            assert!(resolver.point_in_time(ts(at)).unwrap().contains(&t), "{at}");
        }
        for at in ["2023-12-31", "2025-01-01"] {
            assert!(resolver.point_in_time(ts(at)).unwrap().is_empty(), "{at}");
        }
    }

    #[test]
    fn open_ended_record_covers_every_later_instant() {
        let t = knows("Alice", "Bob");
        let store = store_with_valid(&[(t.clone(), "2024-01-01", None)]);
        let resolver = TemporalResolver::new(&store);

        assert!(resolver.point_in_time(ts("2024-01-01")).unwrap().contains(&t));
        assert!(resolver.point_in_time(ts("2024-06-01")).unwrap().contains(&t));
        assert!(resolver.point_in_time(ts("2099-01-01")).unwrap().contains(&t));
        assert!(!resolver.point_in_time(ts("2023-12-31")).unwrap().contains(&t));
    }

    #[test]
    fn interval_overlap_windows() {
        let first = knows("Alice", "Bob");
        let second = knows("Bob", "Charlie");
        let store = store_with_valid(&[
            (first.clone(), "2024-01-01", Some("2024-06-30")),
            (second.clone(), "2024-07-01", Some("2024-12-31")),
        ]);
        let resolver = TemporalResolver::new(&store);

        let both = resolver
            .valid_overlap(ts("2024-06-01"), ts("2024-07-15"))
            .unwrap();
        assert_eq!(both.len(), 2);

        let only_first = resolver
            .valid_overlap(ts("2024-01-01"), ts("2024-06-30"))
            .unwrap();
        assert_eq!(only_first.into_triples(), vec![first]);

        let only_second = resolver
            .valid_overlap(ts("2024-07-01"), ts("2024-12-31"))
            .unwrap();
        assert_eq!(only_second.into_triples(), vec![second]);
    }

    #[test]
    fn any_matching_record_includes_the_triple() {
        let t = knows("Alice", "Bob");
        let store = store_with_valid(&[
            (t.clone(), "2020-01-01", Some("2020-12-31")),
            (t.clone(), "2024-01-01", Some("2024-12-31")),
        ]);
        let resolver = TemporalResolver::new(&store);

        // The 2020 record excludes mid-2024, the 2024 record includes it.
        let view = resolver.point_in_time(ts("2024-06-01")).unwrap();
        assert_eq!(view.len(), 1);
        assert!(view.contains(&t));

        // Both records match a window spanning both years: still one triple.
        let view = resolver
            .valid_overlap(ts("2020-06-01"), ts("2024-06-01"))
            .unwrap();
        assert_eq!(view.len(), 1);
    }

    #[test]
    fn axes_are_resolved_independently() {
        let valid_only = knows("Alice", "Bob");
        let tx_only = knows("Carol", "Dave");
        let mut store = AnnotationStore::open_in_memory().unwrap();
        let mut annotator = TemporalAnnotator::new(&mut store);
        annotator
            .attach_valid_time(&valid_only, ts("2024-01-01"), None)
            .unwrap();
        annotator
            .attach_transaction_time(&tx_only, ts("2024-01-01"), Some(ts("2024-12-31")))
            .unwrap();
        let resolver = TemporalResolver::new(&store);

        let at = ts("2024-06-01");
        assert_eq!(resolver.point_in_time(at).unwrap().into_triples(), vec![valid_only]);
        assert_eq!(resolver.as_of(at).unwrap().into_triples(), vec![tx_only.clone()]);
        assert!(resolver.as_of(ts("2025-01-01")).unwrap().is_empty());
        assert_eq!(
            resolver
                .transaction_overlap(ts("2023-01-01"), ts("2024-01-01"))
                .unwrap()
                .into_triples(),
            vec![tx_only]
        );
    }

    #[test]
    fn empty_store_resolves_to_empty_view() {
        let store = AnnotationStore::open_in_memory().unwrap();
        let resolver = TemporalResolver::new(&store);
        assert!(resolver.point_in_time(ts("2024-01-01")).unwrap().is_empty());
        assert!(resolver
            .transaction_overlap(ts("2024-01-01"), ts("2024-12-31"))
            .unwrap()
            .is_empty());
    }

    #[test]
    fn inverted_query_window_is_rejected() {
        let store = AnnotationStore::open_in_memory().unwrap();
        let err = TemporalResolver::new(&store)
            .valid_overlap(ts("2024-12-31"), ts("2024-01-01"))
            .unwrap_err();
        assert!(matches!(err, OverlayError::InvalidInterval(_)));
    }

    #[test]
    fn indexed_scan_agrees_with_full_scan() {
        let mut store = AnnotationStore::open_in_memory().unwrap();
        let mut annotator = TemporalAnnotator::new(&mut store);
        let days = ["2024-01-10", "2024-03-05", "2024-02-01", "2024-05-20", "2024-04-01"];
        for (i, from) in days.iter().enumerate() {
            let to = if i % 2 == 0 { Some(ts("2024-04-15")) } else { None };
            let to = to.filter(|to| *to >= ts(from));
            annotator
                .attach_valid_time(&knows(&format!("P{i}"), "X"), ts(from), to)
                .unwrap();
        }
        let resolver = TemporalResolver::new(&store);

        for probe in ["2024-01-01", "2024-02-15", "2024-04-15", "2024-04-16", "2024-06-01"] {
            let selector = TemporalSelector::PointInTime(ts(probe));
            let expected: View = store
                .iter()
                .filter(|r| r.kind == TimeKind::ValidTime && selector.admits(r))
                .map(|r| r.triple.clone())
                .collect();
            assert_eq!(resolver.resolve(&selector).unwrap(), expected, "{probe}");
        }
    }
}
