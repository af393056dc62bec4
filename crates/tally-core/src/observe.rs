//! Optional metrics instrumentation.
//!
//! When the `observe` feature is enabled, key pipeline operations emit
//! counters and histograms via the [`metrics`] crate. A downstream
//! application must install a metrics recorder to collect the data.
//!
//! When the feature is **not** enabled every function in this module is a
//! zero-cost no-op.

/// Record a fold into the aggregation cache.
///
/// - `tally.cache.folds_total` – counter with `outcome` label (`applied` / `stale`)
#[inline]
pub fn record_fold(applied: bool) {
    #[cfg(feature = "observe")]
    {
        let outcome = if applied { "applied" } else { "stale" };
        metrics::counter!("tally.cache.folds_total", "outcome" => outcome).increment(1);
    }
    #[cfg(not(feature = "observe"))]
    {
        let _ = applied;
    }
}

/// Record a completed catch-up replay.
///
/// - `tally.replay.runs_total` – counter
/// - `tally.replay.duration_seconds` – histogram
/// - `tally.replay.events_total` – counter
#[inline]
pub fn record_replay(duration: std::time::Duration, events: u64) {
    #[cfg(feature = "observe")]
    {
        metrics::counter!("tally.replay.runs_total").increment(1);
        metrics::histogram!("tally.replay.duration_seconds").record(duration.as_secs_f64());
        metrics::counter!("tally.replay.events_total").increment(events);
    }
    #[cfg(not(feature = "observe"))]
    {
        let _ = (duration, events);
    }
}

/// Record a live event outcome.
///
/// - `tally.live.events_total` – counter with `outcome` label (`ok` / `failed`)
#[inline]
pub fn record_live_event(success: bool) {
    #[cfg(feature = "observe")]
    {
        let outcome = if success { "ok" } else { "failed" };
        metrics::counter!("tally.live.events_total", "outcome" => outcome).increment(1);
    }
    #[cfg(not(feature = "observe"))]
    {
        let _ = success;
    }
}

/// Set the current live-buffer backlog gauge.
///
/// - `tally.buffer.backlog` – gauge
#[inline]
pub fn set_buffer_backlog(depth: usize) {
    #[cfg(feature = "observe")]
    {
        metrics::gauge!("tally.buffer.backlog").set(depth as f64);
    }
    #[cfg(not(feature = "observe"))]
    {
        let _ = depth;
    }
}

/// Record the one-time post-catch-up flush.
///
/// - `tally.flush.total` – counter with `outcome` label
/// - `tally.flush.duration_seconds` – histogram
#[inline]
pub fn record_flush(duration: std::time::Duration, success: bool) {
    #[cfg(feature = "observe")]
    {
        let outcome = if success { "ok" } else { "fail" };
        metrics::counter!("tally.flush.total", "outcome" => outcome).increment(1);
        metrics::histogram!("tally.flush.duration_seconds").record(duration.as_secs_f64());
    }
    #[cfg(not(feature = "observe"))]
    {
        let _ = (duration, success);
    }
}
