use serde::{Deserialize, Serialize};

/// Configuration for the aggregation pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AggregatorConfig {
    /// Fold every case-opened event into the reserved global subject in
    /// addition to the opener.
    /// Default: false
    #[serde(default)]
    pub include_global: bool,

    /// Emit a progress log line every N replayed events.
    /// Default: 1000
    #[serde(default = "default_log_progress_every")]
    pub log_progress_every: u64,

    /// Maximum number of box entries the classifier-side lookup cache
    /// will hold. `None` keeps every box ever seen (reference data is
    /// small); a limit stops caching once reached.
    /// Default: None
    #[serde(default)]
    pub box_cache_limit: Option<usize>,
}

fn default_log_progress_every() -> u64 {
    1000
}

impl Default for AggregatorConfig {
    fn default() -> Self {
        Self {
            include_global: false,
            log_progress_every: default_log_progress_every(),
            box_cache_limit: None,
        }
    }
}

impl AggregatorConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_global(mut self, include_global: bool) -> Self {
        self.include_global = include_global;
        self
    }

    pub fn with_log_progress_every(mut self, every: u64) -> Self {
        self.log_progress_every = every;
        self
    }

    pub fn with_box_cache_limit(mut self, limit: Option<usize>) -> Self {
        self.box_cache_limit = limit;
        self
    }
}
