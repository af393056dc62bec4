//! Tally Core: types and traits for the stats aggregation pipeline
//!
//! This crate defines the shared abstractions for an event-log-driven
//! per-user statistics aggregator:
//! - Event model: typed payloads ordered by log-assigned offsets
//! - Aggregate model: per-subject records with monotonic fold bookkeeping
//! - Collaborator traits: event log, durable stats store, side-entity
//!   stores (profiles, items, boxes)
//!
//! Key properties:
//! - Offsets, not wall-clock, order everything: checkpoint and
//!   `updated_at` are log offsets
//! - Folding an event at or below a record's `updated_at` is a no-op,
//!   which is what makes restart-time replay overlap harmless
//! - Collaborators are plain async traits so the pipeline can run
//!   against in-memory, SQLite, or remote backends unchanged

pub mod config;
pub mod error;
pub mod observe;
pub mod traits;
pub mod types;

pub use config::AggregatorConfig;
pub use error::{Result, TallyError};
pub use traits::{
    BoxStore, EventCursor, EventLog, ItemStore, LiveEvents, ProfileStore, RecordCursor, StatsStore,
};
pub use types::{
    BoxInfo, Event, EventId, EventKind, ItemDrop, ItemRecord, ProfilePatch, StatsUpdate,
    SubjectKey, TradeParty, UserStats, GLOBAL_KEY,
};
