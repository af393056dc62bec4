//! Shared data model: events, aggregate records, side entities.

mod catalog;
mod event;
mod stats;

pub use catalog::{BoxInfo, ItemRecord, ProfilePatch};
pub use event::{Event, EventId, EventKind, ItemDrop, TradeParty};
pub use stats::{StatsUpdate, SubjectKey, UserStats, GLOBAL_KEY};
