//! SQLite-backed durable stores for tally.
//!
//! Two stores over plain `rusqlite` connections:
//! - [`SqliteStatsStore`]: the per-subject aggregate table, upsert by
//!   subject key, restore stream ordered by `updated_at`
//! - [`SqliteCatalogStore`]: the denormalized side tables (user
//!   profiles with per-field merge-upsert, items with full replace,
//!   box reference data)
//!
//! Both bootstrap their schema on open and are safe to reopen over an
//! existing database.

mod schema;
mod store;

pub use store::{SqliteCatalogStore, SqliteStatsStore};
