//! Catch-up: snapshot restore followed by bounded historical replay.

use std::time::Instant;

use tokio::sync::watch;
use tracing::{debug, info};

use tally_core::error::{Result, TallyError};
use tally_core::observe;
use tally_core::traits::{EventLog, StatsStore};
use tally_core::types::EventId;

use crate::applier::{ApplyOutcome, EventApplier};
use crate::cache::AggregationCache;
use crate::service::PipelinePhase;

/// What catch-up did, returned to the host through the service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplayReport {
    /// Records installed from the persisted snapshot.
    pub restored_records: usize,
    /// Max `updated_at` across the restored records; replay starts
    /// strictly after this offset.
    pub checkpoint: EventId,
    /// Historical events folded during replay.
    pub replayed_events: usize,
    /// Historical events dropped by the price filter.
    pub skipped_unpriced: usize,
    /// Records written by the one-time post-catch-up flush.
    pub flushed_records: usize,
    /// The fixed upper bound replay ran to.
    pub cutoff: EventId,
}

/// Restores the cache from the persisted snapshot, then replays the log
/// from the checkpoint to an explicit cutoff.
///
/// Both stages are all-or-nothing: any error aborts catch-up, because a
/// silent gap in the aggregates is worse than a crash. The live buffer
/// must already be capturing before `run` is called.
pub struct CatchUpReplayer {
    log_progress_every: u64,
}

impl CatchUpReplayer {
    pub fn new(log_progress_every: u64) -> Self {
        Self {
            log_progress_every: log_progress_every.max(1),
        }
    }

    /// Run restore + replay to completion. `cutoff` is the offset
    /// captured by the caller at startup: the moment replay is bounded
    /// to, not an open-ended tail.
    pub async fn run(
        &self,
        cache: &AggregationCache,
        applier: &mut EventApplier,
        log: &dyn EventLog,
        store: &dyn StatsStore,
        cutoff: EventId,
        phase: &watch::Sender<PipelinePhase>,
    ) -> Result<ReplayReport> {
        let started = Instant::now();

        // Restoring: install the persisted snapshot and find the
        // checkpoint.
        phase.send_replace(PipelinePhase::Restoring);
        info!("Restoring aggregate snapshot");

        let mut restored_records = 0;
        let mut checkpoint: EventId = 0;
        let mut records = store
            .stream_sorted()
            .await
            .map_err(|e| TallyError::Restore(e.to_string()))?;
        loop {
            match records.next().await {
                Ok(Some(record)) => {
                    checkpoint = checkpoint.max(record.updated_at);
                    cache.set(record);
                    restored_records += 1;
                }
                Ok(None) => break,
                Err(e) => return Err(TallyError::Restore(e.to_string())),
            }
        }
        info!(restored_records, checkpoint, "Snapshot restored");

        // Replaying: bounded read strictly after the checkpoint, in log
        // order, sequentially.
        phase.send_replace(PipelinePhase::Replaying);
        info!(checkpoint, cutoff, "Replaying history");

        let mut replayed_events = 0usize;
        let mut skipped_unpriced = 0usize;
        if cutoff > checkpoint {
            let mut events = log
                .stream_from(checkpoint, cutoff)
                .await
                .map_err(|e| TallyError::replay_at(checkpoint, e))?;
            loop {
                let event = match events.next().await {
                    Ok(Some(event)) => event,
                    Ok(None) => break,
                    Err(e) => return Err(TallyError::replay_at(checkpoint, e)),
                };
                let offset = event.offset;
                match applier.apply(cache, &event).await {
                    Ok(ApplyOutcome::Filtered) => skipped_unpriced += 1,
                    Ok(ApplyOutcome::Applied { .. }) => {
                        replayed_events += 1;
                        if replayed_events as u64 % self.log_progress_every == 0 {
                            debug!(replayed_events, offset, "Replay progress");
                        }
                    }
                    Err(e) => return Err(TallyError::replay_at(offset, e)),
                }
            }
        }

        observe::record_replay(started.elapsed(), replayed_events as u64);
        info!(
            replayed_events,
            skipped_unpriced,
            cutoff,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Caught up"
        );

        Ok(ReplayReport {
            restored_records,
            checkpoint,
            replayed_events,
            skipped_unpriced,
            flushed_records: 0,
            cutoff,
        })
    }
}
