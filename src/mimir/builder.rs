//! Mimir Builder
//!
//! Wires the registry, tiers, and coordinator together. Production builds
//! default to the file-backed durable store and a wall-clock-seeded clock;
//! tests inject `SimDurableStore` and a controlled `SimClock`.

use std::sync::Arc;

use crate::dst::SimClock;
use crate::registry::AdapterRegistry;
use crate::telemetry::Telemetry;
use crate::tiers::{DurableResult, DurableStore, FileDurableStore};

use super::config::MimirConfig;
use super::Mimir;

/// Builder for [`Mimir`].
///
/// # Example
///
/// ```rust,no_run
/// use mimir::{Mimir, MimirConfig};
///
/// # async fn example() {
/// let mimir = Mimir::builder(MimirConfig::new("/var/lib/mimir"))
///     .build()
///     .await
///     .unwrap();
/// mimir.init().await.unwrap();
/// # }
/// ```
pub struct MimirBuilder {
    config: MimirConfig,
    durable: Option<Arc<dyn DurableStore>>,
    clock: Option<SimClock>,
    telemetry: Option<Arc<Telemetry>>,
}

impl MimirBuilder {
    /// Start a builder from a configuration.
    #[must_use]
    pub fn new(config: MimirConfig) -> Self {
        Self {
            config,
            durable: None,
            clock: None,
            telemetry: None,
        }
    }

    /// Use a specific durable backend instead of the default file store.
    #[must_use]
    pub fn with_durable_store(mut self, store: Arc<dyn DurableStore>) -> Self {
        self.durable = Some(store);
        self
    }

    /// Use a specific clock (tests pass a controlled `SimClock`).
    #[must_use]
    pub fn with_clock(mut self, clock: SimClock) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Share an existing telemetry handle.
    #[must_use]
    pub fn with_telemetry(mut self, telemetry: Arc<Telemetry>) -> Self {
        self.telemetry = Some(telemetry);
        self
    }

    /// Build the system. Does not run registry init; call
    /// [`Mimir::init`] before fetching.
    ///
    /// # Errors
    /// Returns an error if the default file durable store cannot be opened.
    pub async fn build(self) -> DurableResult<Mimir> {
        let durable = match self.durable {
            Some(store) => store,
            None => Arc::new(FileDurableStore::open(self.config.durable_dir.clone()).await?),
        };
        let clock = self.clock.unwrap_or_else(SimClock::at_wall_time);
        let telemetry = self.telemetry.unwrap_or_else(|| Arc::new(Telemetry::new()));
        let registry = Arc::new(AdapterRegistry::new(self.config.registry_config()));

        Ok(Mimir::assemble(
            registry,
            durable,
            telemetry,
            clock,
            self.config,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tiers::SimDurableStore;

    #[tokio::test]
    async fn test_build_with_injected_parts() {
        let dir = tempfile::tempdir().unwrap();
        let clock = SimClock::at_ms(1000);
        let mimir = MimirBuilder::new(MimirConfig::new(dir.path()))
            .with_durable_store(Arc::new(SimDurableStore::new()))
            .with_clock(clock.clone())
            .build()
            .await
            .unwrap();

        assert_eq!(mimir.clock().now_ms(), 1000);
        clock.advance_ms(500);
        assert_eq!(mimir.clock().now_ms(), 1500);
    }

    #[tokio::test]
    async fn test_build_default_file_store() {
        let dir = tempfile::tempdir().unwrap();
        let mimir = MimirBuilder::new(MimirConfig::new(dir.path()))
            .build()
            .await
            .unwrap();
        mimir.init().await.unwrap();

        assert!(dir.path().join("durable").is_dir());
    }
}
