use std::path::Path;

use async_trait::async_trait;
use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension, Row};
use tracing::debug;

use tally_core::error::{Result, TallyError};
use tally_core::traits::{BoxStore, ItemStore, ProfileStore, RecordCursor, StatsStore};
use tally_core::types::{BoxInfo, EventId, ItemRecord, ProfilePatch, SubjectKey, UserStats};

use crate::schema;

pub(crate) fn db_err(e: rusqlite::Error) -> TallyError {
    TallyError::Store(e.to_string())
}

/// SQLite-backed aggregate store.
///
/// The connection sits behind a mutex; every operation is a single
/// short statement, so contention is not a concern at this layer.
pub struct SqliteStatsStore {
    conn: Mutex<Connection>,
}

impl SqliteStatsStore {
    /// Open (creating if needed) a stats database at `path`.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let conn = Connection::open(&path).map_err(db_err)?;
        schema::init_stats_schema(&conn)?;
        debug!(path = %path.as_ref().display(), "Opened stats database");
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Open a private in-memory database, for tests.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(db_err)?;
        schema::init_stats_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn row_to_stats(row: &Row<'_>) -> rusqlite::Result<UserStats> {
        Ok(UserStats {
            subject: SubjectKey::from_key(&row.get::<_, String>(0)?),
            cases_opened: row.get::<_, i64>(1)? as u64,
            total_spent: row.get(2)?,
            total_drop_value: row.get(3)?,
            best_drop_value: row.get(4)?,
            best_drop_name: row.get(5)?,
            trades_sent: row.get::<_, i64>(6)? as u64,
            trades_received: row.get::<_, i64>(7)? as u64,
            sent_value: row.get(8)?,
            received_value: row.get(9)?,
            updated_at: row.get::<_, i64>(10)? as EventId,
        })
    }
}

const STATS_COLUMNS: &str = "subject, cases_opened, total_spent, total_drop_value, \
     best_drop_value, best_drop_name, trades_sent, trades_received, \
     sent_value, received_value, updated_at";

#[async_trait]
impl StatsStore for SqliteStatsStore {
    async fn stream_sorted(&self) -> Result<Box<dyn RecordCursor>> {
        let records = {
            let conn = self.conn.lock();
            let mut stmt = conn
                .prepare(&format!(
                    "SELECT {STATS_COLUMNS} FROM user_stats ORDER BY updated_at ASC, subject ASC"
                ))
                .map_err(db_err)?;
            let records = stmt
                .query_map([], Self::row_to_stats)
                .map_err(db_err)?
                .collect::<rusqlite::Result<Vec<_>>>()
                .map_err(db_err)?;
            records
        };
        Ok(Box::new(VecRecordCursor { records, pos: 0 }))
    }

    async fn upsert(&self, record: &UserStats) -> Result<()> {
        let conn = self.conn.lock();
        conn.execute(
            r#"
            INSERT INTO user_stats
            (subject, cases_opened, total_spent, total_drop_value,
             best_drop_value, best_drop_name, trades_sent, trades_received,
             sent_value, received_value, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(subject) DO UPDATE SET
                cases_opened = excluded.cases_opened,
                total_spent = excluded.total_spent,
                total_drop_value = excluded.total_drop_value,
                best_drop_value = excluded.best_drop_value,
                best_drop_name = excluded.best_drop_name,
                trades_sent = excluded.trades_sent,
                trades_received = excluded.trades_received,
                sent_value = excluded.sent_value,
                received_value = excluded.received_value,
                updated_at = excluded.updated_at
            "#,
            params![
                record.subject.as_key(),
                record.cases_opened as i64,
                record.total_spent,
                record.total_drop_value,
                record.best_drop_value,
                record.best_drop_name,
                record.trades_sent as i64,
                record.trades_received as i64,
                record.sent_value,
                record.received_value,
                record.updated_at as i64,
            ],
        )
        .map_err(db_err)?;
        Ok(())
    }

    async fn get(&self, subject: &SubjectKey) -> Result<Option<UserStats>> {
        let conn = self.conn.lock();
        conn.query_row(
            &format!("SELECT {STATS_COLUMNS} FROM user_stats WHERE subject = ?"),
            params![subject.as_key()],
            Self::row_to_stats,
        )
        .optional()
        .map_err(db_err)
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

/// SQLite-backed side-entity stores: user profiles, items, boxes.
pub struct SqliteCatalogStore {
    conn: Mutex<Connection>,
}

impl SqliteCatalogStore {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let conn = Connection::open(&path).map_err(db_err)?;
        schema::init_catalog_schema(&conn)?;
        debug!(path = %path.as_ref().display(), "Opened catalog database");
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(db_err)?;
        schema::init_catalog_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Seed box reference data.
    pub fn put_box(&self, info: &BoxInfo) -> Result<()> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT OR REPLACE INTO boxes (id, name, price) VALUES (?, ?, ?)",
            params![info.id, info.name, info.price],
        )
        .map_err(db_err)?;
        Ok(())
    }

    /// Stored profile fields, for tests and read APIs.
    pub fn get_profile(&self, user_id: &str) -> Result<Option<(Option<String>, Option<String>)>> {
        let conn = self.conn.lock();
        conn.query_row(
            "SELECT user_name, avatar FROM users WHERE user_id = ?",
            params![user_id],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )
        .optional()
        .map_err(db_err)
    }

    pub fn get_item(&self, id: &str) -> Result<Option<ItemRecord>> {
        let conn = self.conn.lock();
        conn.query_row(
            "SELECT id, name, price, rarity, image FROM items WHERE id = ?",
            params![id],
            |row| {
                Ok(ItemRecord {
                    id: row.get(0)?,
                    name: row.get(1)?,
                    price: row.get(2)?,
                    rarity: row.get(3)?,
                    image: row.get(4)?,
                })
            },
        )
        .optional()
        .map_err(db_err)
    }
}

#[async_trait]
impl ProfileStore for SqliteCatalogStore {
    async fn save(&self, user_id: &str, patch: ProfilePatch) -> Result<()> {
        let conn = self.conn.lock();
        // COALESCE keeps the stored value when the patch field is NULL:
        // merge-upsert, last-write-wins per field.
        conn.execute(
            r#"
            INSERT INTO users (user_id, user_name, avatar)
            VALUES (?, ?, ?)
            ON CONFLICT(user_id) DO UPDATE SET
                user_name = COALESCE(excluded.user_name, user_name),
                avatar = COALESCE(excluded.avatar, avatar)
            "#,
            params![user_id, patch.user_name, patch.avatar],
        )
        .map_err(db_err)?;
        Ok(())
    }
}

#[async_trait]
impl ItemStore for SqliteCatalogStore {
    async fn upsert(&self, item: &ItemRecord) -> Result<()> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT OR REPLACE INTO items (id, name, price, rarity, image) \
             VALUES (?, ?, ?, ?, ?)",
            params![item.id, item.name, item.price, item.rarity, item.image],
        )
        .map_err(db_err)?;
        Ok(())
    }
}

#[async_trait]
impl BoxStore for SqliteCatalogStore {
    async fn get(&self, box_id: &str) -> Result<Option<BoxInfo>> {
        let conn = self.conn.lock();
        conn.query_row(
            "SELECT id, name, price FROM boxes WHERE id = ?",
            params![box_id],
            |row| {
                Ok(BoxInfo {
                    id: row.get(0)?,
                    name: row.get(1)?,
                    price: row.get(2)?,
                })
            },
        )
        .optional()
        .map_err(db_err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(user: &str, updated_at: EventId) -> UserStats {
        let mut stats = UserStats::new(SubjectKey::user(user));
        stats.cases_opened = 3;
        stats.total_spent = 7.5;
        stats.total_drop_value = 11.0;
        stats.best_drop_value = 9.0;
        stats.best_drop_name = Some("knife".into());
        stats.updated_at = updated_at;
        stats
    }

    #[tokio::test]
    async fn test_upsert_roundtrip() {
        let store = SqliteStatsStore::open_in_memory().unwrap();
        let rec = record("u1", 42);
        store.upsert(&rec).await.unwrap();

        let back = store.get(&SubjectKey::user("u1")).await.unwrap().unwrap();
        assert_eq!(back, rec);
    }

    #[tokio::test]
    async fn test_upsert_replaces_by_subject() {
        let store = SqliteStatsStore::open_in_memory().unwrap();
        store.upsert(&record("u1", 1)).await.unwrap();

        let mut updated = record("u1", 2);
        updated.cases_opened = 4;
        store.upsert(&updated).await.unwrap();

        let back = store.get(&SubjectKey::user("u1")).await.unwrap().unwrap();
        assert_eq!(back.cases_opened, 4);
        assert_eq!(back.updated_at, 2);
    }

    #[tokio::test]
    async fn test_reopen_preserves_rows() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("stats.db");
        {
            let store = SqliteStatsStore::open(&path).unwrap();
            store.upsert(&record("u1", 3)).await.unwrap();
        }

        let store = SqliteStatsStore::open(&path).unwrap();
        let back = store.get(&SubjectKey::user("u1")).await.unwrap().unwrap();
        assert_eq!(back.updated_at, 3);
    }

    #[tokio::test]
    async fn test_stream_sorted_ascending() {
        let store = SqliteStatsStore::open_in_memory().unwrap();
        store.upsert(&record("u2", 20)).await.unwrap();
        store.upsert(&record("u1", 10)).await.unwrap();
        store.upsert(&record("u3", 30)).await.unwrap();

        let mut cursor = store.stream_sorted().await.unwrap();
        let mut offsets = Vec::new();
        while let Some(rec) = cursor.next().await.unwrap() {
            offsets.push(rec.updated_at);
        }
        assert_eq!(offsets, vec![10, 20, 30]);
    }

    #[tokio::test]
    async fn test_global_subject_key() {
        let store = SqliteStatsStore::open_in_memory().unwrap();
        let mut rec = UserStats::new(SubjectKey::Global);
        rec.updated_at = 5;
        store.upsert(&rec).await.unwrap();

        let back = store.get(&SubjectKey::Global).await.unwrap().unwrap();
        assert_eq!(back.subject, SubjectKey::Global);
    }

    #[tokio::test]
    async fn test_profile_merge_upsert() {
        let store = SqliteCatalogStore::open_in_memory().unwrap();
        store
            .save(
                "u1",
                ProfilePatch::named("alice").with_avatar(Some("a.png".into())),
            )
            .await
            .unwrap();
        // Name-only patch must keep the avatar.
        store.save("u1", ProfilePatch::named("alice2")).await.unwrap();

        let (name, avatar) = store.get_profile("u1").unwrap().unwrap();
        assert_eq!(name.as_deref(), Some("alice2"));
        assert_eq!(avatar.as_deref(), Some("a.png"));
    }

    #[tokio::test]
    async fn test_item_full_replace() {
        let store = SqliteCatalogStore::open_in_memory().unwrap();
        store
            .upsert(&ItemRecord {
                id: "knife".into(),
                name: "knife".into(),
                price: 100.0,
                rarity: Some("covert".into()),
                image: Some("k.png".into()),
            })
            .await
            .unwrap();
        // Full replace: missing fields become NULL, not merged.
        store
            .upsert(&ItemRecord {
                id: "knife".into(),
                name: "knife".into(),
                price: 90.0,
                rarity: None,
                image: None,
            })
            .await
            .unwrap();

        let item = store.get_item("knife").unwrap().unwrap();
        assert_eq!(item.price, 90.0);
        assert!(item.rarity.is_none());
    }

    #[tokio::test]
    async fn test_box_lookup() {
        let store = SqliteCatalogStore::open_in_memory().unwrap();
        store
            .put_box(&BoxInfo {
                id: "b1".into(),
                name: "Chroma".into(),
                price: 2.5,
            })
            .unwrap();

        let info = store.get("b1").await.unwrap().unwrap();
        assert_eq!(info.price, 2.5);
        assert!(store.get("missing").await.unwrap().is_none());
    }
}
