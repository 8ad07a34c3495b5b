use std::fmt;

/// Counters describing how much work a loader saved
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoaderStats {
    /// Windows that dispatched at least one batch
    pub windows_flushed: u64,
    /// Queries handed to the execution primitive (one batch may need several)
    pub queries_executed: u64,
    /// Distinct keys sent to the store
    pub keys_dispatched: u64,
    /// Loads answered from the context cache
    pub cache_hits: u64,
    /// Loads attached to a key that was already queued or in flight
    pub coalesced: u64,
    /// Batches that resolved with a failure
    pub failed_batches: u64,
}

impl LoaderStats {
    /// Share of non-cached loads that did not need a key of their own
    pub fn coalescing_ratio(&self) -> f64 {
        let total = self.keys_dispatched + self.coalesced;
        if total == 0 {
            0.0
        } else {
            self.coalesced as f64 / total as f64
        }
    }

    /// Loads that never needed a key of their own
    pub fn loads_saved(&self) -> u64 {
        self.cache_hits + self.coalesced
    }
}

impl fmt::Display for LoaderStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "LoaderStats {{ windows: {}, queries: {}, keys: {}, cache hits: {}, coalesced: {}, failed batches: {}, coalescing ratio: {:.2}% }}",
            self.windows_flushed,
            self.queries_executed,
            self.keys_dispatched,
            self.cache_hits,
            self.coalesced,
            self.failed_batches,
            self.coalescing_ratio() * 100.0
        )
    }
}
