//! The shared per-event application step.

use std::sync::Arc;

use tracing::debug;

use tally_core::error::Result;
use tally_core::traits::{ItemStore, ProfileStore};
use tally_core::types::{Event, EventKind, SubjectKey};

use crate::cache::{AggregationCache, FoldOutcome};
use crate::catalog::BoxCatalog;
use crate::classifier::{EventClassifier, SideWrite};

/// What applying one event did.
#[derive(Debug, Clone, PartialEq)]
pub enum ApplyOutcome {
    /// The event had no usable price and was dropped before
    /// classification.
    Filtered,
    /// The event was classified and folded; `touched` lists the subjects
    /// whose records actually changed (stale folds are excluded).
    Applied { touched: Vec<SubjectKey> },
}

/// Runs the filter → resolve → classify → fold → side-write sequence for
/// one event. Both the catch-up replayer and the live processor drive
/// their events through the same applier; only their error policies
/// differ.
pub struct EventApplier {
    classifier: EventClassifier,
    catalog: BoxCatalog,
    profiles: Option<Arc<dyn ProfileStore>>,
    items: Option<Arc<dyn ItemStore>>,
}

impl EventApplier {
    pub fn new(
        classifier: EventClassifier,
        catalog: BoxCatalog,
        profiles: Option<Arc<dyn ProfileStore>>,
        items: Option<Arc<dyn ItemStore>>,
    ) -> Self {
        Self {
            classifier,
            catalog,
            profiles,
            items,
        }
    }

    pub async fn apply(&mut self, cache: &AggregationCache, event: &Event) -> Result<ApplyOutcome> {
        if !event.has_usable_price() {
            debug!(id = %event.id, offset = event.offset, "Dropping unpriced event");
            return Ok(ApplyOutcome::Filtered);
        }

        let box_info = match &event.kind {
            EventKind::CaseOpened { box_id, .. } => self.catalog.resolve(box_id).await?,
            _ => None,
        };

        let classification = self.classifier.classify(event, box_info.as_deref());

        let mut touched = Vec::with_capacity(classification.cache_ops.len());
        for op in &classification.cache_ops {
            if cache.fold(&op.subject, event.offset, &op.update) == FoldOutcome::Applied {
                touched.push(op.subject.clone());
            }
        }

        for write in classification.side_writes {
            match write {
                SideWrite::Profile { user_id, patch } => {
                    if let Some(profiles) = &self.profiles {
                        profiles.save(&user_id, patch).await?;
                    }
                }
                SideWrite::Item(item) => {
                    if let Some(items) = &self.items {
                        items.upsert(&item).await?;
                    }
                }
            }
        }

        Ok(ApplyOutcome::Applied { touched })
    }
}
