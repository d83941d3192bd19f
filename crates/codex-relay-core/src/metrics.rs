//! Global atomic counters for relay observability.
//!
//! Counters are incremented silently at the call site. Call
//! [`Metrics::flush`] to emit current values as a single
//! `tracing::info!` event (e.g. when the daemon shuts down).

use std::sync::atomic::{AtomicU64, Ordering};

/// Global metrics singleton.
pub static METRICS: Metrics = Metrics::new();

/// Lightweight atomic counters with no allocation or locking.
pub struct Metrics {
    engine_runs: AtomicU64,
    retries: AtomicU64,
    salvages: AtomicU64,
    cache_hits: AtomicU64,
    cache_misses: AtomicU64,
    chunk_fallbacks: AtomicU64,
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Metrics {
    pub const fn new() -> Self {
        Self {
            engine_runs: AtomicU64::new(0),
            retries: AtomicU64::new(0),
            salvages: AtomicU64::new(0),
            cache_hits: AtomicU64::new(0),
            cache_misses: AtomicU64::new(0),
            chunk_fallbacks: AtomicU64::new(0),
        }
    }

    pub fn inc_engine_runs(&self) {
        self.engine_runs.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "engine_runs", "counter incremented");
    }

    pub fn inc_retries(&self) {
        self.retries.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "retries", "counter incremented");
    }

    pub fn inc_salvages(&self) {
        self.salvages.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "salvages", "counter incremented");
    }

    /// Record a cache lookup outcome.
    pub fn record_cache_lookup(&self, hit: bool) {
        let counter = if hit {
            &self.cache_hits
        } else {
            &self.cache_misses
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_chunk_fallbacks(&self) {
        self.chunk_fallbacks.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "chunk_fallbacks", "counter incremented");
    }

    /// Emit all current counter values as a single `info!` event.
    ///
    /// Call this at natural boundaries (daemon shutdown, end of a CLI run)
    /// rather than on every increment.
    pub fn flush(&self) {
        tracing::info!(
            metric = "flush",
            engine_runs = self.engine_runs(),
            retries = self.retries(),
            salvages = self.salvages(),
            cache_hits = self.cache_hits(),
            cache_misses = self.cache_misses(),
            chunk_fallbacks = self.chunk_fallbacks(),
        );
    }

    pub fn engine_runs(&self) -> u64 {
        self.engine_runs.load(Ordering::Relaxed)
    }

    pub fn retries(&self) -> u64 {
        self.retries.load(Ordering::Relaxed)
    }

    pub fn salvages(&self) -> u64 {
        self.salvages.load(Ordering::Relaxed)
    }

    pub fn cache_hits(&self) -> u64 {
        self.cache_hits.load(Ordering::Relaxed)
    }

    pub fn cache_misses(&self) -> u64 {
        self.cache_misses.load(Ordering::Relaxed)
    }

    pub fn chunk_fallbacks(&self) -> u64 {
        self.chunk_fallbacks.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters_increment() {
        let m = Metrics::new();
        m.inc_engine_runs();
        m.inc_engine_runs();
        m.inc_retries();
        m.record_cache_lookup(true);
        m.record_cache_lookup(false);
        m.record_cache_lookup(false);
        assert_eq!(m.engine_runs(), 2);
        assert_eq!(m.retries(), 1);
        assert_eq!(m.cache_hits(), 1);
        assert_eq!(m.cache_misses(), 2);
        assert_eq!(m.salvages(), 0);
    }

    #[test]
    fn test_flush_does_not_panic() {
        let m = Metrics::new();
        m.inc_chunk_fallbacks();
        m.flush();
        assert_eq!(m.chunk_fallbacks(), 1);
    }
}
