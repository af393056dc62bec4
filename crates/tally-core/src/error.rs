use std::io;
use thiserror::Error;

use crate::types::EventId;

/// Result type for tally operations.
pub type Result<T> = std::result::Result<T, TallyError>;

/// Errors that can occur across the aggregation pipeline.
///
/// The fatal/recoverable split is a policy of the *phase*, not the error:
/// `Restore`, `Replay` and `Persist` abort start-up, while the live
/// processor logs collaborator failures and keeps draining.
#[derive(Debug, Error)]
pub enum TallyError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Restore failed: {0}")]
    Restore(String),

    #[error("Replay failed at offset {offset}: {source}")]
    Replay {
        offset: EventId,
        #[source]
        source: Box<TallyError>,
    },

    #[error("Persist failed: {0}")]
    Persist(String),

    #[error("Event log error: {0}")]
    Log(String),

    #[error("Store error: {0}")]
    Store(String),

    #[error("Live event feed closed")]
    Closed,

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Other error: {0}")]
    Other(#[from] anyhow::Error),
}

impl TallyError {
    /// Wrap an error as a fatal replay failure at the given offset.
    pub fn replay_at(offset: EventId, source: TallyError) -> Self {
        TallyError::Replay {
            offset,
            source: Box::new(source),
        }
    }
}
