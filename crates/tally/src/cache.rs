//! In-memory aggregation cache.

use std::collections::HashMap;

use parking_lot::RwLock;

use tally_core::observe;
use tally_core::types::{EventId, StatsUpdate, SubjectKey, UserStats};

/// Result of folding one update into a subject's record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FoldOutcome {
    /// The update was folded and `updated_at` advanced.
    Applied,
    /// The update's offset was at or below the record's `updated_at`;
    /// the record is untouched.
    Stale,
}

/// Mapping from subject key to aggregate record.
///
/// The cache owns the per-subject monotonic-offset guard: an update
/// whose offset is not strictly newer than the record is refused. This
/// is what makes the replay-cutoff/live-subscription overlap harmless;
/// a double-delivered event folds once and is stale the second time.
///
/// Single logical writer per phase (replayer, then live processor);
/// the lock exists for concurrent *readers* of snapshots, not writer
/// coordination.
#[derive(Debug)]
pub struct AggregationCache {
    records: RwLock<HashMap<SubjectKey, UserStats>>,
}

impl AggregationCache {
    pub fn new() -> Self {
        Self {
            records: RwLock::new(HashMap::new()),
        }
    }

    /// Fold one update into `subject`'s record, creating the record on
    /// first contact.
    ///
    /// Callers must deliver per-subject updates in non-decreasing offset
    /// order (log order guarantees this); an older offset is refused as
    /// [`FoldOutcome::Stale`]. At most one update per subject per event.
    pub fn fold(
        &self,
        subject: &SubjectKey,
        offset: EventId,
        update: &StatsUpdate,
    ) -> FoldOutcome {
        let mut records = self.records.write();
        let record = records
            .entry(subject.clone())
            .or_insert_with(|| UserStats::new(subject.clone()));

        if offset <= record.updated_at {
            observe::record_fold(false);
            return FoldOutcome::Stale;
        }

        record.apply(update);
        record.updated_at = offset;
        observe::record_fold(true);
        FoldOutcome::Applied
    }

    /// Install a record wholesale. Restore-only: replaces whatever is
    /// present for the subject.
    pub fn set(&self, record: UserStats) {
        self.records.write().insert(record.subject.clone(), record);
    }

    /// Snapshot of one subject's record.
    pub fn get(&self, subject: &SubjectKey) -> Option<UserStats> {
        self.records.read().get(subject).cloned()
    }

    /// Snapshot of all current records, unordered.
    pub fn list(&self) -> Vec<UserStats> {
        self.records.read().values().cloned().collect()
    }

    /// Lazy export of every record for bulk persistence.
    ///
    /// The subject set is fixed at call time, but each record is read
    /// when the iterator reaches it, so re-exporting after further
    /// mutation yields the updated state.
    pub fn export(&self) -> ExportIter<'_> {
        let subjects: Vec<SubjectKey> = self.records.read().keys().cloned().collect();
        ExportIter {
            cache: self,
            subjects: subjects.into_iter(),
        }
    }

    /// Highest offset folded into any record (0 when empty).
    pub fn checkpoint(&self) -> EventId {
        self.records
            .read()
            .values()
            .map(|r| r.updated_at)
            .max()
            .unwrap_or(0)
    }

    pub fn len(&self) -> usize {
        self.records.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.read().is_empty()
    }
}

impl Default for AggregationCache {
    fn default() -> Self {
        Self::new()
    }
}

/// Iterator returned by [`AggregationCache::export`].
pub struct ExportIter<'a> {
    cache: &'a AggregationCache,
    subjects: std::vec::IntoIter<SubjectKey>,
}

impl Iterator for ExportIter<'_> {
    type Item = UserStats;

    fn next(&mut self) -> Option<UserStats> {
        // Records are never deleted, so every captured subject resolves.
        self.subjects
            .by_ref()
            .find_map(|subject| self.cache.get(&subject))
    }
}
