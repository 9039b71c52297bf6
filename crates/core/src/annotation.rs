//! Append-only annotation log and the annotator that writes to it.

use std::path::Path;

use redb::{Database, ReadableDatabase, ReadableTable, TableDefinition};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::model::Triple;
use crate::time::{Interval, TimeKind, Timestamp};
use crate::{OverlayError, Result};

/// Stable identifier of an [`AnnotationRecord`]: its position in the log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RecordId(pub u64);

impl std::fmt::Display for RecordId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Which write path produced a record. Resolution ignores it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RecordOrigin {
    /// Written directly through [`TemporalAnnotator`].
    Annotation,
    /// Written while adding the triple to the live graph.
    Assertion,
    /// Written while removing the triple from the live graph.
    Retraction,
}

/// One interval attached to one triple value. Never updated after creation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnnotationRecord {
    pub id: RecordId,
    pub triple: Triple,
    pub kind: TimeKind,
    pub interval: Interval,
    pub origin: RecordOrigin,
}

// ---------------------------------------------------------------------------
// Storage
// ---------------------------------------------------------------------------

/// Records keyed by [`RecordId`], JSON-encoded.
const ANNOTATIONS: TableDefinition<u64, &str> = TableDefinition::new("annotations");

/// Per-kind index entries `(from, arena position)`, sorted by `from`.
type FromIndex = Vec<(Timestamp, usize)>;

/// Append-only log of [`AnnotationRecord`]s.
///
/// The redb table is the source of truth. An in-memory copy of every record
/// plus a per-kind index sorted by interval start are rebuilt on open and
/// kept in sync on every append, so resolution never touches disk.
pub struct AnnotationStore {
    db: Database,
    records: Vec<AnnotationRecord>,
    valid_index: FromIndex,
    transaction_index: FromIndex,
}

impl AnnotationStore {
    /// Open or create a file-backed log.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let db = Database::create(path.as_ref())?;
        Self::init(db)
    }

    /// Create an in-memory log (no file I/O).
    pub fn open_in_memory() -> Result<Self> {
        let backend = redb::backends::InMemoryBackend::new();
        let db = Database::builder().create_with_backend(backend)?;
        Self::init(db)
    }

    fn init(db: Database) -> Result<Self> {
        {
            let write_txn = db.begin_write()?;
            write_txn.open_table(ANNOTATIONS)?;
            write_txn.commit()?;
        }

        let mut store = Self {
            db,
            records: Vec::new(),
            valid_index: Vec::new(),
            transaction_index: Vec::new(),
        };
        for record in Self::load_records(&store.db)? {
            store.cache(record);
        }
        info!(records = store.records.len(), "annotation store opened");
        Ok(store)
    }

    fn load_records(db: &Database) -> Result<Vec<AnnotationRecord>> {
        let read_txn = db.begin_read()?;
        let table = read_txn.open_table(ANNOTATIONS)?;
        let mut records = Vec::new();
        for entry in table.iter()? {
            let (key, value) = entry?;
            let record: AnnotationRecord = serde_json::from_str(value.value())?;
            if record.id.0 != key.value() {
                return Err(OverlayError::Storage(format!(
                    "corrupt annotation row {}: holds record {}",
                    key.value(),
                    record.id
                )));
            }
            records.push(record);
        }
        Ok(records)
    }

    fn index_mut(&mut self, kind: TimeKind) -> &mut FromIndex {
        match kind {
            TimeKind::ValidTime => &mut self.valid_index,
            TimeKind::TransactionTime => &mut self.transaction_index,
        }
    }

    fn index(&self, kind: TimeKind) -> &FromIndex {
        match kind {
            TimeKind::ValidTime => &self.valid_index,
            TimeKind::TransactionTime => &self.transaction_index,
        }
    }

    fn cache(&mut self, record: AnnotationRecord) {
        let pos = self.records.len();
        let from = record.interval.from();
        let index = self.index_mut(record.kind);
        // Equal starts keep append order.
        let at = index.partition_point(|(f, _)| *f <= from);
        index.insert(at, (from, pos));
        self.records.push(record);
    }

    /// Append one record and return its id.
    ///
    /// The record is committed to redb before it becomes visible to
    /// resolution. Nothing is deduplicated.
    pub fn append(
        &mut self,
        triple: Triple,
        kind: TimeKind,
        interval: Interval,
        origin: RecordOrigin,
    ) -> Result<RecordId> {
        let id = RecordId(self.records.len() as u64);
        let record = AnnotationRecord {
            id,
            triple,
            kind,
            interval,
            origin,
        };
        let value = serde_json::to_string(&record)?;

        let write_txn = self.db.begin_write()?;
        {
            let mut table = write_txn.open_table(ANNOTATIONS)?;
            table.insert(id.0, value.as_str())?;
        }
        write_txn.commit()?;

        debug!(%id, %kind, %interval, triple = %record.triple, "annotation appended");
        self.cache(record);
        Ok(id)
    }

    pub fn get(&self, id: RecordId) -> Option<&AnnotationRecord> {
        usize::try_from(id.0).ok().and_then(|i| self.records.get(i))
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Every record, in append order.
    pub fn iter(&self) -> impl Iterator<Item = &AnnotationRecord> {
        self.records.iter()
    }

    /// Number of records on one time axis.
    pub fn count(&self, kind: TimeKind) -> usize {
        self.index(kind).len()
    }

    /// Every record ever written for `triple`, in append order.
    pub fn history<'a>(&'a self, triple: &'a Triple) -> impl Iterator<Item = &'a AnnotationRecord> {
        self.records.iter().filter(move |r| r.triple == *triple)
    }

    /// Records of `kind` whose interval starts at or before `upper`.
    ///
    /// Uses the sorted start index, so records starting after `upper` are
    /// never visited.
    pub fn starting_by(
        &self,
        kind: TimeKind,
        upper: Timestamp,
    ) -> impl Iterator<Item = &AnnotationRecord> {
        let index = self.index(kind);
        let end = index.partition_point(|(from, _)| *from <= upper);
        index[..end].iter().map(move |(_, pos)| &self.records[*pos])
    }
}

impl std::fmt::Debug for AnnotationStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AnnotationStore")
            .field("records", &self.records.len())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Annotator
// ---------------------------------------------------------------------------

/// Writes valid-time and transaction-time records for triples.
///
/// Pure append: no deduplication, and no check that the triple is present
/// in the live graph. Overlapping or contradictory records are all kept.
pub struct TemporalAnnotator<'a> {
    store: &'a mut AnnotationStore,
}

impl<'a> TemporalAnnotator<'a> {
    pub fn new(store: &'a mut AnnotationStore) -> Self {
        Self { store }
    }

    /// Append a [`TimeKind::ValidTime`] record for `triple`.
    pub fn attach_valid_time(
        &mut self,
        triple: &Triple,
        from: Timestamp,
        to: Option<Timestamp>,
    ) -> Result<RecordId> {
        let interval = Interval::new(from, to)?;
        self.attach(triple, TimeKind::ValidTime, interval, RecordOrigin::Annotation)
    }

    /// Append a [`TimeKind::TransactionTime`] record for `triple`.
    pub fn attach_transaction_time(
        &mut self,
        triple: &Triple,
        from: Timestamp,
        to: Option<Timestamp>,
    ) -> Result<RecordId> {
        let interval = Interval::new(from, to)?;
        self.attach(
            triple,
            TimeKind::TransactionTime,
            interval,
            RecordOrigin::Annotation,
        )
    }

    /// Append a record of any kind after checking the triple can be encoded.
    pub fn attach(
        &mut self,
        triple: &Triple,
        kind: TimeKind,
        interval: Interval,
        origin: RecordOrigin,
    ) -> Result<RecordId> {
        triple.check_well_formed()?;
        self.store.append(triple.clone(), kind, interval, origin)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
