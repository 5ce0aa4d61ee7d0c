//! Telemetry
//!
//! Lock-free counters for the hot fetch path. Counters are monotonic within
//! a process lifetime; a snapshot is a consistent-enough point-in-time read
//! for dashboards and tests, not a transaction.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

use crate::model::ActivationTier;

/// Counters for the tiered fetch path and its supporting machinery.
#[derive(Debug, Default)]
pub struct Telemetry {
    /// Fetches answered from the fast tier
    fast_hits: AtomicU64,
    /// Fetches answered from the mid tier
    mid_hits: AtomicU64,
    /// Fetches answered from the durable tier
    durable_hits: AtomicU64,
    /// Fetches that missed every tier and produced a cold default
    cold_defaults: AtomicU64,
    /// Callers that joined an already in-flight fetch
    single_flight_joins: AtomicU64,
    /// Gold residents evicted from the fast tier
    evictions_gold: AtomicU64,
    /// Silver residents evicted from the fast tier
    evictions_silver: AtomicU64,
    /// Bronze residents evicted from the fast tier
    evictions_bronze: AtomicU64,
    /// Summaries written back to the mid tier on eviction
    writebacks: AtomicU64,
    /// Durable appends that succeeded (after any retries)
    durable_appends: AtomicU64,
    /// Durable appends dropped after exhausting retries
    durable_drops: AtomicU64,
    /// Records shed at enqueue because the write-behind queue was full
    durable_queue_drops: AtomicU64,
    /// Durable append attempts that failed and were retried
    durable_retries: AtomicU64,
    /// Adapter chains served from the coordinator's chain cache
    chain_cache_hits: AtomicU64,
    /// Adapter chains resolved against the registry
    chain_cache_misses: AtomicU64,
    /// Mid tier entries dropped by expiry purges
    mid_expirations: AtomicU64,
}

/// Point-in-time copy of all counters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TelemetrySnapshot {
    /// Fetches answered from the fast tier
    pub fast_hits: u64,
    /// Fetches answered from the mid tier
    pub mid_hits: u64,
    /// Fetches answered from the durable tier
    pub durable_hits: u64,
    /// Fetches that missed every tier and produced a cold default
    pub cold_defaults: u64,
    /// Callers that joined an already in-flight fetch
    pub single_flight_joins: u64,
    /// Gold residents evicted from the fast tier
    pub evictions_gold: u64,
    /// Silver residents evicted from the fast tier
    pub evictions_silver: u64,
    /// Bronze residents evicted from the fast tier
    pub evictions_bronze: u64,
    /// Summaries written back to the mid tier on eviction
    pub writebacks: u64,
    /// Durable appends that succeeded (after any retries)
    pub durable_appends: u64,
    /// Durable appends dropped after exhausting retries
    pub durable_drops: u64,
    /// Records shed at enqueue because the write-behind queue was full
    pub durable_queue_drops: u64,
    /// Durable append attempts that failed and were retried
    pub durable_retries: u64,
    /// Adapter chains served from the coordinator's chain cache
    pub chain_cache_hits: u64,
    /// Adapter chains resolved against the registry
    pub chain_cache_misses: u64,
    /// Mid tier entries dropped by expiry purges
    pub mid_expirations: u64,
}

impl TelemetrySnapshot {
    /// Total fetches that completed through any source.
    #[must_use]
    pub fn fetches_total(&self) -> u64 {
        self.fast_hits + self.mid_hits + self.durable_hits + self.cold_defaults
    }

    /// Total evictions across activation tiers.
    #[must_use]
    pub fn evictions_total(&self) -> u64 {
        self.evictions_gold + self.evictions_silver + self.evictions_bronze
    }
}

impl Telemetry {
    /// Create zeroed counters.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Count a fetch answered from the fast tier.
    pub fn record_fast_hit(&self) {
        self.fast_hits.fetch_add(1, Ordering::Relaxed);
    }

    /// Count a fetch answered from the mid tier.
    pub fn record_mid_hit(&self) {
        self.mid_hits.fetch_add(1, Ordering::Relaxed);
    }

    /// Count a fetch rebuilt from the durable tail.
    pub fn record_durable_hit(&self) {
        self.durable_hits.fetch_add(1, Ordering::Relaxed);
    }

    /// Count a fetch that missed every tier.
    pub fn record_cold_default(&self) {
        self.cold_defaults.fetch_add(1, Ordering::Relaxed);
    }

    /// Count a caller joining an in-flight fill.
    pub fn record_single_flight_join(&self) {
        self.single_flight_joins.fetch_add(1, Ordering::Relaxed);
    }

    /// Count an eviction under the victim's activation tier.
    pub fn record_eviction(&self, tier: ActivationTier) {
        let counter = match tier {
            ActivationTier::Gold => &self.evictions_gold,
            ActivationTier::Silver => &self.evictions_silver,
            ActivationTier::Bronze => &self.evictions_bronze,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    /// Count a summary written back to the mid tier.
    pub fn record_writeback(&self) {
        self.writebacks.fetch_add(1, Ordering::Relaxed);
    }

    /// Count a durable append that landed.
    pub fn record_durable_append(&self) {
        self.durable_appends.fetch_add(1, Ordering::Relaxed);
    }

    /// Count a record dropped after its retry budget.
    pub fn record_durable_drop(&self) {
        self.durable_drops.fetch_add(1, Ordering::Relaxed);
    }

    /// Count a record shed at enqueue because the queue was full.
    pub fn record_durable_queue_drop(&self) {
        self.durable_queue_drops.fetch_add(1, Ordering::Relaxed);
    }

    /// Count a failed append attempt that will be retried.
    pub fn record_durable_retry(&self) {
        self.durable_retries.fetch_add(1, Ordering::Relaxed);
    }

    /// Count an adapter chain served from the coordinator cache.
    pub fn record_chain_cache_hit(&self) {
        self.chain_cache_hits.fetch_add(1, Ordering::Relaxed);
    }

    /// Count an adapter chain resolved against the registry.
    pub fn record_chain_cache_miss(&self) {
        self.chain_cache_misses.fetch_add(1, Ordering::Relaxed);
    }

    /// Count mid tier entries dropped by an expiry purge.
    pub fn record_mid_expirations(&self, count: u64) {
        self.mid_expirations.fetch_add(count, Ordering::Relaxed);
    }

    /// Take a point-in-time snapshot of all counters.
    #[must_use]
    pub fn snapshot(&self) -> TelemetrySnapshot {
        TelemetrySnapshot {
            fast_hits: self.fast_hits.load(Ordering::Relaxed),
            mid_hits: self.mid_hits.load(Ordering::Relaxed),
            durable_hits: self.durable_hits.load(Ordering::Relaxed),
            cold_defaults: self.cold_defaults.load(Ordering::Relaxed),
            single_flight_joins: self.single_flight_joins.load(Ordering::Relaxed),
            evictions_gold: self.evictions_gold.load(Ordering::Relaxed),
            evictions_silver: self.evictions_silver.load(Ordering::Relaxed),
            evictions_bronze: self.evictions_bronze.load(Ordering::Relaxed),
            writebacks: self.writebacks.load(Ordering::Relaxed),
            durable_appends: self.durable_appends.load(Ordering::Relaxed),
            durable_drops: self.durable_drops.load(Ordering::Relaxed),
            durable_queue_drops: self.durable_queue_drops.load(Ordering::Relaxed),
            durable_retries: self.durable_retries.load(Ordering::Relaxed),
            chain_cache_hits: self.chain_cache_hits.load(Ordering::Relaxed),
            chain_cache_misses: self.chain_cache_misses.load(Ordering::Relaxed),
            mid_expirations: self.mid_expirations.load(Ordering::Relaxed),
        }
    }
}
