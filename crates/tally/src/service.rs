//! Service wiring: buffer-first startup, catch-up, flush, live loop.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::info;

use tally_core::config::AggregatorConfig;
use tally_core::error::{Result, TallyError};
use tally_core::observe;
use tally_core::traits::{BoxStore, EventLog, ItemStore, ProfileStore, StatsStore};
use tally_core::types::{SubjectKey, UserStats};

use crate::applier::EventApplier;
use crate::buffer::{BufferStats, LiveBuffer};
use crate::cache::AggregationCache;
use crate::catalog::BoxCatalog;
use crate::classifier::EventClassifier;
use crate::processor::{LiveProcessor, ShutdownHandle};
use crate::replay::{CatchUpReplayer, ReplayReport};

/// Lifecycle of the aggregation pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelinePhase {
    /// Installing the persisted snapshot.
    Restoring,
    /// Replaying history up to the captured cutoff.
    Replaying,
    /// Steady state: draining buffered-then-live events.
    Live,
    /// The live processor has exited.
    Stopped,
}

/// Observer over the pipeline lifecycle, handed out by
/// [`StatsService::open_stream`].
pub struct PhaseStream {
    rx: watch::Receiver<PipelinePhase>,
}

impl PhaseStream {
    pub fn current(&self) -> PipelinePhase {
        *self.rx.borrow()
    }

    /// Await the next phase change. `None` once the pipeline is gone
    /// and no further change can happen.
    pub async fn next_change(&mut self) -> Option<PipelinePhase> {
        match self.rx.changed().await {
            Ok(()) => Some(*self.rx.borrow_and_update()),
            Err(_) => None,
        }
    }

    /// Await a specific phase (resolves immediately if already there).
    pub async fn wait_for(&mut self, phase: PipelinePhase) -> bool {
        self.rx.wait_for(|p| *p == phase).await.is_ok()
    }

    /// Await the end of the live loop, for shutdown coordination.
    pub async fn stopped(&mut self) {
        let _ = self.rx.wait_for(|p| *p == PipelinePhase::Stopped).await;
    }
}

/// Builder for [`StatsService`].
///
/// The event log and the aggregate store are mandatory; side-entity
/// stores are optional and their writes are skipped when absent.
pub struct StatsServiceBuilder {
    log: Arc<dyn EventLog>,
    stats: Arc<dyn StatsStore>,
    boxes: Option<Arc<dyn BoxStore>>,
    profiles: Option<Arc<dyn ProfileStore>>,
    items: Option<Arc<dyn ItemStore>>,
    config: AggregatorConfig,
}

impl StatsServiceBuilder {
    pub fn new(log: Arc<dyn EventLog>, stats: Arc<dyn StatsStore>) -> Self {
        Self {
            log,
            stats,
            boxes: None,
            profiles: None,
            items: None,
            config: AggregatorConfig::default(),
        }
    }

    pub fn with_box_store(mut self, boxes: Arc<dyn BoxStore>) -> Self {
        self.boxes = Some(boxes);
        self
    }

    pub fn with_profile_store(mut self, profiles: Arc<dyn ProfileStore>) -> Self {
        self.profiles = Some(profiles);
        self
    }

    pub fn with_item_store(mut self, items: Arc<dyn ItemStore>) -> Self {
        self.items = Some(items);
        self
    }

    pub fn with_config(mut self, config: AggregatorConfig) -> Self {
        self.config = config;
        self
    }

    /// Run the full startup sequence and hand back the live service.
    ///
    /// Ordering is the whole point:
    /// 1. open the live buffer (capture starts **before** any replay
    ///    work, so nothing can fall between replay and subscription)
    /// 2. capture the replay cutoff once, from the log head
    /// 3. restore + replay (any error is fatal and surfaces here)
    /// 4. bulk-flush the caught-up cache (fatal on error: cache and
    ///    store must not diverge at the handover point)
    /// 5. spawn the live processor over the buffered backlog
    pub async fn start(self) -> Result<StatsService> {
        let (phase_tx, phase_rx) = watch::channel(PipelinePhase::Restoring);
        info!("Starting stats aggregation service");

        let buffer = LiveBuffer::open(self.log.as_ref()).await?;
        let buffer_stats = buffer.stats();

        let cache = Arc::new(AggregationCache::new());
        let mut applier = EventApplier::new(
            EventClassifier::new(self.config.include_global),
            BoxCatalog::new(self.boxes.clone(), self.config.box_cache_limit),
            self.profiles.clone(),
            self.items.clone(),
        );

        let cutoff = self.log.head().await?;

        let replayer = CatchUpReplayer::new(self.config.log_progress_every);
        let mut report = replayer
            .run(
                &cache,
                &mut applier,
                self.log.as_ref(),
                self.stats.as_ref(),
                cutoff,
                &phase_tx,
            )
            .await?;

        // One-time bulk flush of the caught-up state.
        let flush_started = Instant::now();
        let mut flushed_records = 0;
        for record in cache.export() {
            if let Err(e) = self.stats.upsert(&record).await {
                observe::record_flush(flush_started.elapsed(), false);
                return Err(TallyError::Persist(e.to_string()));
            }
            flushed_records += 1;
        }
        observe::record_flush(flush_started.elapsed(), true);
        report.flushed_records = flushed_records;
        info!(flushed_records, "Flushed caught-up aggregates");

        let shutdown = ShutdownHandle::new();
        let processed = Arc::new(AtomicU64::new(0));
        let failed = Arc::new(AtomicU64::new(0));
        let processor = LiveProcessor::new(
            buffer,
            applier,
            cache.clone(),
            self.stats.clone(),
            shutdown.clone(),
            processed.clone(),
            failed.clone(),
        );

        let task = tokio::spawn(async move {
            phase_tx.send_replace(PipelinePhase::Live);
            processor.run().await;
            phase_tx.send_replace(PipelinePhase::Stopped);
        });

        Ok(StatsService {
            cache,
            report,
            phase_rx,
            shutdown,
            task,
            buffer_stats,
            processed,
            failed,
        })
    }
}

/// A running aggregation pipeline: caught up, flushed, and processing
/// live events in the background.
#[derive(Debug)]
pub struct StatsService {
    cache: Arc<AggregationCache>,
    report: ReplayReport,
    phase_rx: watch::Receiver<PipelinePhase>,
    shutdown: ShutdownHandle,
    task: JoinHandle<()>,
    buffer_stats: Arc<BufferStats>,
    processed: Arc<AtomicU64>,
    failed: Arc<AtomicU64>,
}

impl StatsService {
    pub fn builder(log: Arc<dyn EventLog>, stats: Arc<dyn StatsStore>) -> StatsServiceBuilder {
        StatsServiceBuilder::new(log, stats)
    }

    /// Current in-memory snapshot of every aggregate record.
    pub fn list(&self) -> Vec<UserStats> {
        self.cache.list()
    }

    /// One subject's current record.
    pub fn get(&self, subject: &SubjectKey) -> Option<UserStats> {
        self.cache.get(subject)
    }

    /// What catch-up did.
    pub fn report(&self) -> &ReplayReport {
        &self.report
    }

    pub fn phase(&self) -> PipelinePhase {
        *self.phase_rx.borrow()
    }

    /// Observe the pipeline lifecycle; awaitable for shutdown
    /// coordination.
    pub fn open_stream(&self) -> PhaseStream {
        PhaseStream {
            rx: self.phase_rx.clone(),
        }
    }

    /// Live buffer ingestion counters.
    pub fn buffer_stats(&self) -> Arc<BufferStats> {
        self.buffer_stats.clone()
    }

    /// Live events fully processed (folded and persisted).
    pub fn processed(&self) -> u64 {
        self.processed.load(Ordering::SeqCst)
    }

    /// Live events skipped after a processing or persistence failure.
    pub fn failed(&self) -> u64 {
        self.failed.load(Ordering::SeqCst)
    }

    /// Stop the live processor.
    pub fn shutdown(&self) {
        self.shutdown.shutdown();
    }

    /// Await the live processor's exit.
    pub async fn join(self) {
        let _ = self.task.await;
    }
}
