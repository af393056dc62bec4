//! Schema bootstrap for the durable stores.

use rusqlite::Connection;

use crate::store::db_err;
use tally_core::error::Result;

/// Aggregate-store tables.
pub fn init_stats_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS user_stats (
            subject TEXT PRIMARY KEY,
            cases_opened INTEGER NOT NULL DEFAULT 0,
            total_spent REAL NOT NULL DEFAULT 0,
            total_drop_value REAL NOT NULL DEFAULT 0,
            best_drop_value REAL NOT NULL DEFAULT 0,
            best_drop_name TEXT,
            trades_sent INTEGER NOT NULL DEFAULT 0,
            trades_received INTEGER NOT NULL DEFAULT 0,
            sent_value REAL NOT NULL DEFAULT 0,
            received_value REAL NOT NULL DEFAULT 0,
            updated_at INTEGER NOT NULL DEFAULT 0
        );

        CREATE INDEX IF NOT EXISTS idx_user_stats_updated
            ON user_stats(updated_at);
        "#,
    )
    .map_err(db_err)?;
    Ok(())
}

/// Side-entity tables: profiles, items, boxes.
pub fn init_catalog_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS users (
            user_id TEXT PRIMARY KEY,
            user_name TEXT,
            avatar TEXT
        );

        CREATE TABLE IF NOT EXISTS items (
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            price REAL NOT NULL,
            rarity TEXT,
            image TEXT
        );

        CREATE TABLE IF NOT EXISTS boxes (
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            price REAL NOT NULL
        );
        "#,
    )
    .map_err(db_err)?;
    Ok(())
}
