//! Tally: continuously-updated per-user statistics over an append-only
//! event log.
//!
//! # Overview
//!
//! Tally maintains an in-memory aggregate per subject (user, plus an
//! optional global roll-up) derived from case-opening and trading
//! events, and survives process restarts without losing or
//! double-counting anything.
//!
//! # Architecture
//!
//! Startup runs a fixed sequence:
//!
//! 1. **Live buffer**: subscribes to the log *first*, so every event
//!    arriving from this moment on is captured
//! 2. **Restore**: installs the last persisted snapshot and finds the
//!    checkpoint (max `updated_at` across records)
//! 3. **Replay**: folds history strictly after the checkpoint, up to a
//!    cutoff captured at startup; fatal on any error
//! 4. **Flush**: bulk-persists the caught-up cache
//! 5. **Live loop**: drains buffered-then-live events forever, folding
//!    and persisting per event; per-event errors are logged and skipped
//!
//! The replay cutoff and the subscription start may overlap; the
//! cache's monotonic-offset fold guard makes any double-delivery a
//! no-op, so every event lands in each aggregate exactly once.
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use tally::StatsService;
//! use tally_memstore::{MemoryEventLog, MemoryStatsStore};
//!
//! #[tokio::main]
//! async fn main() -> tally_core::Result<()> {
//!     let log = Arc::new(MemoryEventLog::new());
//!     let stats = Arc::new(MemoryStatsStore::new());
//!
//!     let service = StatsService::builder(log.clone(), stats).start().await?;
//!
//!     // ... events flow; the service folds and persists them.
//!     for record in service.list() {
//!         println!("{}: {} cases", record.subject, record.cases_opened);
//!     }
//!
//!     service.shutdown();
//!     service.join().await;
//!     Ok(())
//! }
//! ```

pub mod applier;
pub mod buffer;
pub mod cache;
pub mod catalog;
pub mod classifier;
pub mod processor;
pub mod replay;
pub mod service;

pub use applier::{ApplyOutcome, EventApplier};
pub use buffer::{BufferStats, LiveBuffer};
pub use cache::{AggregationCache, ExportIter, FoldOutcome};
pub use catalog::BoxCatalog;
pub use classifier::{CacheOp, Classification, EventClassifier, SideWrite};
pub use processor::{LiveProcessor, ShutdownHandle};
pub use replay::{CatchUpReplayer, ReplayReport};
pub use service::{PhaseStream, PipelinePhase, StatsService, StatsServiceBuilder};
