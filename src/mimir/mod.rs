//! Mimir - Main Interface
//!
//! `TigerStyle`: Sim-first, deterministic, graceful degradation.
//!
//! # Overview
//!
//! One `Mimir` instance coordinates the whole system:
//! - the adapter registry maps archetypes to validated chains;
//! - the fast, mid, and durable tiers hold per-agent memory at decreasing
//!   freshness and increasing permanence;
//! - the request coordinator answers fetches with single-flight dedup.
//!
//! # Example
//!
//! ```rust,no_run
//! use mimir::{
//!     ActivationTier, AdapterSlotSpec, ArchetypeId, AgentId, FetchRequest, Mimir, MimirConfig,
//! };
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mimir = Mimir::builder(MimirConfig::new("/var/lib/mimir").with_slot_count(2))
//!         .build()
//!         .await?;
//!     mimir.init().await?;
//!
//!     let vampire = ArchetypeId::new("vampire")?;
//!     mimir
//!         .register_archetype(
//!             &vampire,
//!             1,
//!             &[
//!                 AdapterSlotSpec::new("personality", "vampire/personality.bin", 1),
//!                 AdapterSlotSpec::new("dialogue", "vampire/dialogue.bin", 1),
//!             ],
//!         )
//!         .await?;
//!
//!     let response = mimir
//!         .fetch(&FetchRequest {
//!             agent_id: AgentId::new("castle-guard-07")?,
//!             archetype_id: vampire,
//!             activation: ActivationTier::Gold,
//!         })
//!         .await?;
//!     println!("card for {} via {:?}", response.card.agent_id, response.source);
//!
//!     mimir.shutdown().await;
//!     Ok(())
//! }
//! ```

mod builder;
mod config;

use std::sync::Arc;

use crate::coordinator::{Coordinator, CoordinatorConfig, FetchRequest, FetchResponse, FetchResult};
use crate::dst::SimClock;
use crate::eval::EvalView;
use crate::model::{ActivationTier, AgentId, ArchetypeId, Fact, Turn};
use crate::registry::{AdapterChain, AdapterRegistry, AdapterSlotSpec, RegistryResult};
use crate::telemetry::{Telemetry, TelemetrySnapshot};
use crate::tiers::DurableStore;

pub use builder::MimirBuilder;
pub use config::MimirConfig;

/// The assembled system: registry plus coordinator behind one handle.
///
/// Cheap to clone; clones share all state.
#[derive(Clone)]
pub struct Mimir {
    registry: Arc<AdapterRegistry>,
    coordinator: Coordinator,
}

impl Mimir {
    /// Start building an instance.
    #[must_use]
    pub fn builder(config: MimirConfig) -> MimirBuilder {
        MimirBuilder::new(config)
    }

    pub(crate) fn assemble(
        registry: Arc<AdapterRegistry>,
        durable: Arc<dyn DurableStore>,
        telemetry: Arc<Telemetry>,
        clock: SimClock,
        config: MimirConfig,
    ) -> Self {
        let coordinator_config: CoordinatorConfig = config.coordinator_config();
        let coordinator = Coordinator::new(
            Arc::clone(&registry),
            durable,
            telemetry,
            clock,
            coordinator_config,
        );
        Self {
            registry,
            coordinator,
        }
    }

    /// Load persisted manifests and open the registry's readiness gate.
    /// Must complete before any fetch or registration.
    ///
    /// # Errors
    /// Returns an error on a second call or if manifest storage is
    /// unreadable.
    pub async fn init(&self) -> RegistryResult<()> {
        self.registry.init().await
    }

    /// Register (or supersede) an archetype's adapter chain.
    ///
    /// # Errors
    /// See [`AdapterRegistry::register`].
    pub async fn register_archetype(
        &self,
        archetype_id: &ArchetypeId,
        version: u32,
        slots: &[AdapterSlotSpec],
    ) -> RegistryResult<Arc<AdapterChain>> {
        self.registry.register(archetype_id, version, slots).await
    }

    /// Fetch one agent's card and adapter chain.
    ///
    /// # Errors
    /// See [`Coordinator::fetch`].
    pub async fn fetch(&self, request: &FetchRequest) -> FetchResult<FetchResponse> {
        self.coordinator.fetch(request).await
    }

    /// Fetch a batch of agents; results are positional and independent.
    ///
    /// # Errors
    /// See [`Coordinator::fetch_many`].
    pub async fn fetch_many(
        &self,
        requests: &[FetchRequest],
    ) -> FetchResult<Vec<FetchResult<FetchResponse>>> {
        self.coordinator.fetch_many(requests).await
    }

    /// Record a dialogue turn for an agent.
    ///
    /// # Errors
    /// Returns an error if the durable write-behind queue is closed.
    pub async fn record_turn(&self, agent_id: &AgentId, turn: Turn) -> FetchResult<()> {
        self.coordinator.record_turn(agent_id, turn).await
    }

    /// Record a salient fact for an agent.
    ///
    /// # Errors
    /// Returns an error if the durable write-behind queue is closed.
    pub async fn record_fact(&self, agent_id: &AgentId, fact: Fact) -> FetchResult<()> {
        self.coordinator.record_fact(agent_id, fact).await
    }

    /// Change an agent's activation tier.
    pub async fn set_activation(&self, agent_id: &AgentId, activation: ActivationTier) {
        self.coordinator.set_activation(agent_id, activation).await;
    }

    /// Drop an agent from the fast tier (summary written back first).
    pub async fn invalidate(&self, agent_id: &AgentId) {
        self.coordinator.invalidate(agent_id).await;
    }

    /// Purge expired mid tier entries; returns the number dropped.
    pub async fn purge_expired(&self) -> usize {
        self.coordinator.purge_expired().await
    }

    /// Flush residents to the mid tier and drain the durable queue.
    pub async fn shutdown(&self) {
        self.coordinator.shutdown().await;
    }

    /// Read-only evaluation view.
    #[must_use]
    pub fn eval(&self) -> EvalView {
        EvalView::new(self.coordinator.clone())
    }

    /// The shared clock.
    #[must_use]
    pub fn clock(&self) -> SimClock {
        self.coordinator.clock()
    }

    /// Point-in-time telemetry counters.
    #[must_use]
    pub fn telemetry_snapshot(&self) -> TelemetrySnapshot {
        self.coordinator.telemetry_snapshot()
    }

    /// The adapter registry handle.
    #[must_use]
    pub fn registry(&self) -> Arc<AdapterRegistry> {
        Arc::clone(&self.registry)
    }
}
