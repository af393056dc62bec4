//! The steady-state live processing loop.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::watch;
use tracing::{debug, error, info};

use tally_core::observe;
use tally_core::traits::StatsStore;
use tally_core::types::Event;

use crate::applier::{ApplyOutcome, EventApplier};
use crate::buffer::LiveBuffer;
use crate::cache::AggregationCache;

/// Cloneable handle for stopping the live processor.
#[derive(Clone, Debug)]
pub struct ShutdownHandle {
    tx: Arc<watch::Sender<bool>>,
}

impl ShutdownHandle {
    pub(crate) fn new() -> Self {
        let (tx, _rx) = watch::channel(false);
        Self { tx: Arc::new(tx) }
    }

    /// Signal shutdown. Idempotent.
    pub fn shutdown(&self) {
        self.tx.send_replace(true);
    }

    pub fn is_shutdown(&self) -> bool {
        *self.tx.borrow()
    }

    pub(crate) async fn wait(&self) {
        let mut rx = self.tx.subscribe();
        // Resolves immediately if shutdown was already signalled.
        let _ = rx.wait_for(|stop| *stop).await;
    }
}

/// Drains the live buffer forever: classify, fold, persist the touched
/// aggregates.
///
/// A per-event failure is logged and the loop continues, unlike
/// catch-up's fatal policy. One bad event must not halt the service;
/// that event's contribution is the accepted loss.
pub struct LiveProcessor {
    buffer: LiveBuffer,
    applier: EventApplier,
    cache: Arc<AggregationCache>,
    store: Arc<dyn StatsStore>,
    shutdown: ShutdownHandle,
    processed: Arc<AtomicU64>,
    failed: Arc<AtomicU64>,
}

impl LiveProcessor {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        buffer: LiveBuffer,
        applier: EventApplier,
        cache: Arc<AggregationCache>,
        store: Arc<dyn StatsStore>,
        shutdown: ShutdownHandle,
        processed: Arc<AtomicU64>,
        failed: Arc<AtomicU64>,
    ) -> Self {
        Self {
            buffer,
            applier,
            cache,
            store,
            shutdown,
            processed,
            failed,
        }
    }

    /// Run until shutdown is signalled or the live feed closes.
    pub async fn run(mut self) {
        info!("Live processor started");

        loop {
            tokio::select! {
                maybe = self.buffer.recv() => match maybe {
                    Some(event) => self.handle(event).await,
                    None => {
                        info!("Live feed closed, processor draining done");
                        break;
                    }
                },
                _ = self.shutdown.wait() => break,
            }
        }

        info!(
            processed = self.processed.load(Ordering::SeqCst),
            failed = self.failed.load(Ordering::SeqCst),
            "Live processor stopped"
        );
    }

    async fn handle(&mut self, event: Event) {
        match self.applier.apply(&self.cache, &event).await {
            Ok(ApplyOutcome::Filtered) => {}
            Ok(ApplyOutcome::Applied { touched }) => {
                let mut persisted = true;
                for subject in &touched {
                    if let Some(record) = self.cache.get(subject) {
                        if let Err(e) = self.store.upsert(&record).await {
                            // Recoverable in steady state: the fold is in
                            // the cache and the next touch re-upserts the
                            // full record.
                            error!(%subject, "Failed to persist aggregate: {e}");
                            persisted = false;
                        }
                    }
                }
                if persisted {
                    self.processed.fetch_add(1, Ordering::SeqCst);
                } else {
                    self.failed.fetch_add(1, Ordering::SeqCst);
                }
                observe::record_live_event(persisted);
                debug!(id = %event.id, offset = event.offset, subjects = touched.len(), "Processed live event");
            }
            Err(e) => {
                error!(id = %event.id, offset = event.offset, "Failed to process live event, skipping: {e}");
                self.failed.fetch_add(1, Ordering::SeqCst);
                observe::record_live_event(false);
            }
        }
    }
}
