//! Mimir Configuration
//!
//! `TigerStyle`: Sensible defaults, builder pattern, explicit over implicit.

use std::path::PathBuf;

use crate::constants::{
    ARCHETYPE_SLOTS_COUNT_DEFAULT, ARCHETYPE_SLOTS_COUNT_MAX, DURABLE_REHYDRATE_TAIL_COUNT,
    FAST_TIER_RESIDENTS_COUNT_DEFAULT, FAST_TIER_TURNS_BRONZE_DEFAULT,
    FAST_TIER_TURNS_GOLD_DEFAULT, FAST_TIER_TURNS_SILVER_DEFAULT, MID_TIER_WINDOW_MS_DEFAULT,
    MID_TIER_WINDOW_MS_MAX,
};
use crate::coordinator::CoordinatorConfig;
use crate::registry::RegistryConfig;
use crate::tiers::{DurableWriterConfig, FastTierConfig};

/// Top-level configuration.
///
/// All storage lives under one data directory:
/// - `adapters/` holds the adapter files chains point at;
/// - `manifests/` holds persisted chain manifests;
/// - `durable/` holds the append-only episodic history.
///
/// # Example
///
/// ```rust
/// use mimir::MimirConfig;
///
/// let config = MimirConfig::new("/var/lib/mimir")
///     .with_fast_capacity(1024)
///     .with_slot_count(7);
/// ```
#[derive(Debug, Clone)]
pub struct MimirConfig {
    /// Directory adapter paths resolve under
    pub base_dir: PathBuf,
    /// Directory persisted manifests live in
    pub manifest_dir: PathBuf,
    /// Directory for the durable episodic store
    pub durable_dir: PathBuf,
    /// Adapter slots per archetype chain
    pub slot_count: usize,
    /// Fast tier resident capacity
    pub fast_capacity: usize,
    /// Turn budget for Gold residents
    pub turns_gold: usize,
    /// Turn budget for Silver residents
    pub turns_silver: usize,
    /// Turn budget for Bronze residents
    pub turns_bronze: usize,
    /// Mid tier visibility window in milliseconds
    pub mid_window_ms: u64,
    /// Durable write-behind policy
    pub writer: DurableWriterConfig,
    /// Episodic tail length read when rebuilding from durable data
    pub rehydrate_tail_count: usize,
}

impl MimirConfig {
    /// Create a configuration rooted at a data directory, with defaults for
    /// everything else.
    #[must_use]
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        let data_dir = data_dir.into();
        Self {
            base_dir: data_dir.join("adapters"),
            manifest_dir: data_dir.join("manifests"),
            durable_dir: data_dir.join("durable"),
            slot_count: ARCHETYPE_SLOTS_COUNT_DEFAULT,
            fast_capacity: FAST_TIER_RESIDENTS_COUNT_DEFAULT,
            turns_gold: FAST_TIER_TURNS_GOLD_DEFAULT,
            turns_silver: FAST_TIER_TURNS_SILVER_DEFAULT,
            turns_bronze: FAST_TIER_TURNS_BRONZE_DEFAULT,
            mid_window_ms: MID_TIER_WINDOW_MS_DEFAULT,
            writer: DurableWriterConfig::default(),
            rehydrate_tail_count: DURABLE_REHYDRATE_TAIL_COUNT,
        }
    }

    /// Override the adapter base directory.
    #[must_use]
    pub fn with_base_dir(mut self, base_dir: impl Into<PathBuf>) -> Self {
        self.base_dir = base_dir.into();
        self
    }

    /// Override the number of adapter slots per chain.
    ///
    /// # Panics
    /// Panics if `slot_count` is zero or exceeds `ARCHETYPE_SLOTS_COUNT_MAX`.
    #[must_use]
    pub fn with_slot_count(mut self, slot_count: usize) -> Self {
        assert!(slot_count > 0, "slot_count must be positive");
        assert!(
            slot_count <= ARCHETYPE_SLOTS_COUNT_MAX,
            "slot_count exceeds ARCHETYPE_SLOTS_COUNT_MAX"
        );
        self.slot_count = slot_count;
        self
    }

    /// Override the fast tier resident capacity.
    #[must_use]
    pub fn with_fast_capacity(mut self, capacity: usize) -> Self {
        assert!(capacity > 0, "fast_capacity must be positive");
        self.fast_capacity = capacity;
        self
    }

    /// Override the per-tier turn budgets.
    ///
    /// # Panics
    /// Panics unless `bronze <= silver <= gold`.
    #[must_use]
    pub fn with_turn_budgets(mut self, gold: usize, silver: usize, bronze: usize) -> Self {
        assert!(bronze <= silver && silver <= gold, "budgets must be ordered");
        self.turns_gold = gold;
        self.turns_silver = silver;
        self.turns_bronze = bronze;
        self
    }

    /// Override the mid tier visibility window.
    ///
    /// # Panics
    /// Panics if the window is zero or exceeds `MID_TIER_WINDOW_MS_MAX`.
    #[must_use]
    pub fn with_mid_window_ms(mut self, window_ms: u64) -> Self {
        assert!(window_ms > 0, "mid window must be positive");
        assert!(
            window_ms <= MID_TIER_WINDOW_MS_MAX,
            "mid window exceeds MID_TIER_WINDOW_MS_MAX"
        );
        self.mid_window_ms = window_ms;
        self
    }

    /// Override the durable write-behind policy.
    #[must_use]
    pub fn with_writer(mut self, writer: DurableWriterConfig) -> Self {
        self.writer = writer;
        self
    }

    /// Override the rehydration tail length.
    #[must_use]
    pub fn with_rehydrate_tail_count(mut self, count: usize) -> Self {
        assert!(count > 0, "rehydrate_tail_count must be positive");
        self.rehydrate_tail_count = count;
        self
    }

    pub(crate) fn registry_config(&self) -> RegistryConfig {
        RegistryConfig::new(self.base_dir.clone(), self.manifest_dir.clone())
            .with_slot_count(self.slot_count)
    }

    pub(crate) fn coordinator_config(&self) -> CoordinatorConfig {
        CoordinatorConfig {
            fast: FastTierConfig {
                capacity: self.fast_capacity,
                turns_gold: self.turns_gold,
                turns_silver: self.turns_silver,
                turns_bronze: self.turns_bronze,
            },
            mid_window_ms: Some(self.mid_window_ms),
            writer: self.writer.clone(),
            rehydrate_tail_count: self.rehydrate_tail_count,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_defaults() {
        let config = MimirConfig::new("/data/mimir");
        assert_eq!(config.base_dir, PathBuf::from("/data/mimir/adapters"));
        assert_eq!(config.manifest_dir, PathBuf::from("/data/mimir/manifests"));
        assert_eq!(config.slot_count, ARCHETYPE_SLOTS_COUNT_DEFAULT);
        assert_eq!(config.mid_window_ms, MID_TIER_WINDOW_MS_DEFAULT);
    }

    #[test]
    fn test_config_builder() {
        let config = MimirConfig::new("/data/mimir")
            .with_slot_count(4)
            .with_fast_capacity(512)
            .with_turn_budgets(48, 24, 12)
            .with_mid_window_ms(1_000_000);

        assert_eq!(config.slot_count, 4);
        assert_eq!(config.fast_capacity, 512);
        assert_eq!(config.turns_silver, 24);
        assert_eq!(config.mid_window_ms, 1_000_000);
    }

    #[test]
    #[should_panic(expected = "budgets must be ordered")]
    fn test_config_rejects_unordered_budgets() {
        let _ = MimirConfig::new("/data/mimir").with_turn_budgets(8, 16, 32);
    }
}
