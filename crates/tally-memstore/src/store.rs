use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use async_trait::async_trait;
use parking_lot::Mutex;

use tally_core::error::{Result, TallyError};
use tally_core::traits::{BoxStore, ItemStore, ProfileStore, RecordCursor, StatsStore};
use tally_core::types::{BoxInfo, ItemRecord, ProfilePatch, SubjectKey, UserStats};

/// In-memory durable-store stand-in for the per-subject aggregates.
///
/// Failure toggles let tests exercise the fatal restore/persist paths
/// without a real backend misbehaving on cue.
pub struct MemoryStatsStore {
    records: Mutex<HashMap<SubjectKey, UserStats>>,
    fail_stream: AtomicBool,
    fail_upsert: AtomicBool,
}

impl MemoryStatsStore {
    pub fn new() -> Self {
        Self {
            records: Mutex::new(HashMap::new()),
            fail_stream: AtomicBool::new(false),
            fail_upsert: AtomicBool::new(false),
        }
    }

    /// Seed a persisted record, as if a previous run had flushed it.
    pub fn insert(&self, record: UserStats) {
        self.records.lock().insert(record.subject.clone(), record);
    }

    /// All persisted records, unordered.
    pub fn snapshot(&self) -> Vec<UserStats> {
        self.records.lock().values().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.records.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Make the next `stream_sorted` call fail (corrupt-snapshot path).
    pub fn fail_stream_sorted(&self, fail: bool) {
        self.fail_stream.store(fail, Ordering::SeqCst);
    }

    /// Make `upsert` calls fail (flush/persist failure path).
    pub fn fail_upsert(&self, fail: bool) {
        self.fail_upsert.store(fail, Ordering::SeqCst);
    }
}

impl Default for MemoryStatsStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl StatsStore for MemoryStatsStore {
    async fn stream_sorted(&self) -> Result<Box<dyn RecordCursor>> {
        if self.fail_stream.load(Ordering::SeqCst) {
            return Err(TallyError::Store("stream_sorted failure injected".into()));
        }
        let mut records: Vec<UserStats> = self.records.lock().values().cloned().collect();
        records.sort_by(|a, b| {
            a.updated_at
                .cmp(&b.updated_at)
                .then_with(|| a.subject.cmp(&b.subject))
        });
        Ok(Box::new(VecRecordCursor { records, pos: 0 }))
    }

    async fn upsert(&self, record: &UserStats) -> Result<()> {
        if self.fail_upsert.load(Ordering::SeqCst) {
            return Err(TallyError::Store("upsert failure injected".into()));
        }
        self.records
            .lock()
            .insert(record.subject.clone(), record.clone());
        Ok(())
    }

    async fn get(&self, subject: &SubjectKey) -> Result<Option<UserStats>> {
        Ok(self.records.lock().get(subject).cloned())
    }
}

struct VecRecordCursor {
    records: Vec<UserStats>,
    pos: usize,
}

#[async_trait]
impl RecordCursor for VecRecordCursor {
    async fn next(&mut self) -> Result<Option<UserStats>> {
        let record = self.records.get(self.pos).cloned();
        if record.is_some() {
            self.pos += 1;
        }
        Ok(record)
    }
}

/// Stored profile state for the merge-upsert side store.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StoredProfile {
    pub user_name: Option<String>,
    pub avatar: Option<String>,
}

/// In-memory profile side store, merge-upsert last-write-wins.
#[derive(Default)]
pub struct MemoryProfileStore {
    profiles: Mutex<HashMap<String, StoredProfile>>,
}

impl MemoryProfileStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, user_id: &str) -> Option<StoredProfile> {
        self.profiles.lock().get(user_id).cloned()
    }

    pub fn len(&self) -> usize {
        self.profiles.lock().len()
    }
}

#[async_trait]
impl ProfileStore for MemoryProfileStore {
    async fn save(&self, user_id: &str, patch: ProfilePatch) -> Result<()> {
        let mut profiles = self.profiles.lock();
        let entry = profiles.entry(user_id.to_string()).or_default();
        if patch.user_name.is_some() {
            entry.user_name = patch.user_name;
        }
        if patch.avatar.is_some() {
            entry.avatar = patch.avatar;
        }
        Ok(())
    }
}

/// In-memory item side store, full replace by id.
#[derive(Default)]
pub struct MemoryItemStore {
    items: Mutex<HashMap<String, ItemRecord>>,
}

impl MemoryItemStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, id: &str) -> Option<ItemRecord> {
        self.items.lock().get(id).cloned()
    }

    pub fn len(&self) -> usize {
        self.items.lock().len()
    }
}

#[async_trait]
impl ItemStore for MemoryItemStore {
    async fn upsert(&self, item: &ItemRecord) -> Result<()> {
        self.items.lock().insert(item.id.clone(), item.clone());
        Ok(())
    }
}

/// In-memory box reference store with a lookup counter, so tests can
/// prove the classifier-side catalog memoizes.
pub struct MemoryBoxStore {
    boxes: Mutex<HashMap<String, BoxInfo>>,
    lookups: AtomicU64,
    fail_get: AtomicBool,
}

impl MemoryBoxStore {
    pub fn new() -> Self {
        Self {
            boxes: Mutex::new(HashMap::new()),
            lookups: AtomicU64::new(0),
            fail_get: AtomicBool::new(false),
        }
    }

    pub fn insert(&self, info: BoxInfo) {
        self.boxes.lock().insert(info.id.clone(), info);
    }

    /// How many times `get` reached this store (cache misses only, if a
    /// catalog sits in front).
    pub fn lookups(&self) -> u64 {
        self.lookups.load(Ordering::SeqCst)
    }

    /// Make `get` calls fail (live-processing error path).
    pub fn fail_get(&self, fail: bool) {
        self.fail_get.store(fail, Ordering::SeqCst);
    }
}

impl Default for MemoryBoxStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl BoxStore for MemoryBoxStore {
    async fn get(&self, box_id: &str) -> Result<Option<BoxInfo>> {
        self.lookups.fetch_add(1, Ordering::SeqCst);
        if self.fail_get.load(Ordering::SeqCst) {
            return Err(TallyError::Store("box lookup failure injected".into()));
        }
        Ok(self.boxes.lock().get(box_id).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(user: &str, updated_at: u64) -> UserStats {
        let mut stats = UserStats::new(SubjectKey::user(user));
        stats.updated_at = updated_at;
        stats
    }

    #[tokio::test]
    async fn test_stream_sorted_orders_by_updated_at() {
        let store = MemoryStatsStore::new();
        store.insert(record("u3", 30));
        store.insert(record("u1", 10));
        store.insert(record("u2", 20));

        let mut cursor = store.stream_sorted().await.unwrap();
        let mut seen = Vec::new();
        while let Some(rec) = cursor.next().await.unwrap() {
            seen.push(rec.updated_at);
        }
        assert_eq!(seen, vec![10, 20, 30]);
    }

    #[tokio::test]
    async fn test_profile_merge_upsert_keeps_unpatched_fields() {
        let store = MemoryProfileStore::new();
        store
            .save(
                "u1",
                ProfilePatch::named("alice").with_avatar(Some("a.png".into())),
            )
            .await
            .unwrap();
        store.save("u1", ProfilePatch::named("alice2")).await.unwrap();

        let profile = store.get("u1").unwrap();
        assert_eq!(profile.user_name.as_deref(), Some("alice2"));
        assert_eq!(profile.avatar.as_deref(), Some("a.png"));
    }

    #[tokio::test]
    async fn test_stats_store_failure_injection() {
        let store = MemoryStatsStore::new();
        store.fail_stream_sorted(true);
        assert!(store.stream_sorted().await.is_err());

        store.fail_upsert(true);
        let rec = record("u1", 1);
        assert!(store.upsert(&rec).await.is_err());
    }
}
