//! In-memory implementations of the tally collaborator traits.
//!
//! Backs tests, examples, and anything else that wants the full pipeline
//! without a durable backend: an append-only event log with live
//! subscriptions, plus stats/profile/item/box stores with failure
//! injection for the fatal-path tests.

mod log;
mod store;

pub use log::MemoryEventLog;
pub use store::{
    MemoryBoxStore, MemoryItemStore, MemoryProfileStore, MemoryStatsStore, StoredProfile,
};
