//! Collaborator interfaces consumed by the aggregation pipeline.
//!
//! The pipeline never talks to a concrete log or store; everything
//! reaches it through these traits so tests can substitute in-memory
//! implementations and inject faults.

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::error::Result;
use crate::types::{BoxInfo, Event, EventId, ItemRecord, ProfilePatch, SubjectKey, UserStats};

/// Bounded historical read over the event log.
#[async_trait]
pub trait EventCursor: Send {
    /// Next event in log order, or `None` when the bound is reached.
    async fn next(&mut self) -> Result<Option<Event>>;
}

/// Live subscription to the event log, subscribe-from-now semantics.
///
/// Wraps an unbounded channel: the log pushes, the buffer drains.
/// No backpressure reaches the log; the queue grows while consumers
/// lag.
pub struct LiveEvents {
    rx: mpsc::UnboundedReceiver<Event>,
}

impl LiveEvents {
    /// Create a feed plus the sender half a log implementation pushes to.
    pub fn channel() -> (mpsc::UnboundedSender<Event>, LiveEvents) {
        let (tx, rx) = mpsc::unbounded_channel();
        (tx, LiveEvents { rx })
    }

    /// Next live event in arrival order. `None` means the log side hung
    /// up and no further events will ever arrive.
    pub async fn recv(&mut self) -> Option<Event> {
        self.rx.recv().await
    }

    /// Number of events queued and not yet received.
    pub fn backlog(&self) -> usize {
        self.rx.len()
    }
}

/// The append-only event log collaborator.
#[async_trait]
pub trait EventLog: Send + Sync {
    /// Offset of the newest event in the log (0 when empty). Captured
    /// once by the caller and passed to catch-up as the explicit replay
    /// cutoff.
    async fn head(&self) -> Result<EventId>;

    /// Bounded historical read: events with `after < offset <= up_to`,
    /// in log order.
    async fn stream_from(&self, after: EventId, up_to: EventId) -> Result<Box<dyn EventCursor>>;

    /// Subscribe to events appended from now on.
    async fn changes(&self) -> Result<LiveEvents>;
}

/// Cursor over persisted aggregate records.
#[async_trait]
pub trait RecordCursor: Send {
    async fn next(&mut self) -> Result<Option<UserStats>>;
}

/// The durable aggregate store collaborator.
#[async_trait]
pub trait StatsStore: Send + Sync {
    /// All persisted records ordered by `updated_at` ascending, for
    /// restore.
    async fn stream_sorted(&self) -> Result<Box<dyn RecordCursor>>;

    /// Install or replace the record for its subject. Idempotent by
    /// subject key.
    async fn upsert(&self, record: &UserStats) -> Result<()>;

    /// Fetch one record by subject.
    async fn get(&self, subject: &SubjectKey) -> Result<Option<UserStats>>;
}

/// User profile side store: merge-upsert, last-write-wins per field.
#[async_trait]
pub trait ProfileStore: Send + Sync {
    async fn save(&self, user_id: &str, patch: ProfilePatch) -> Result<()>;
}

/// Item side store: full replace by id.
#[async_trait]
pub trait ItemStore: Send + Sync {
    async fn upsert(&self, item: &ItemRecord) -> Result<()>;
}

/// Read-only box (case) reference data.
#[async_trait]
pub trait BoxStore: Send + Sync {
    async fn get(&self, box_id: &str) -> Result<Option<BoxInfo>>;
}
