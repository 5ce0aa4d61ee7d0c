//! # Mimir
//!
//! Tiered agent memory and adapter-chain coordination for simulation hosts
//! that serve many lightweight NPC agents from a small set of GPU-resident
//! model adapters.
//!
//! ## Features
//!
//! - **Tiered memory**: a bounded fast tier of resident memory cards, a
//!   volatile mid tier of rolling-window session summaries, and an
//!   append-only durable tier of episodic records
//! - **Adapter registry**: validated, versioned, persisted adapter-chain
//!   manifests per archetype, with content-hash verification
//! - **Single-flight fetches**: concurrent requests for one agent share a
//!   single downstream fill and its outcome
//! - **Activation tiers**: Gold/Silver/Bronze fidelity budgets drive both
//!   card sizes and eviction order
//! - **Deterministic testing**: shared `SimClock`, seeded RNG, and a
//!   fault-injecting simulation durable store
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use mimir::{
//!     ActivationTier, AdapterSlotSpec, AgentId, ArchetypeId, FetchRequest, Mimir, MimirConfig,
//! };
//!
//! # #[tokio::main]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let mimir = Mimir::builder(MimirConfig::new("/var/lib/mimir").with_slot_count(2))
//!     .build()
//!     .await?;
//! mimir.init().await?;
//!
//! let vampire = ArchetypeId::new("vampire")?;
//! mimir
//!     .register_archetype(
//!         &vampire,
//!         1,
//!         &[
//!             AdapterSlotSpec::new("personality", "vampire/personality.bin", 1),
//!             AdapterSlotSpec::new("dialogue", "vampire/dialogue.bin", 1),
//!         ],
//!     )
//!     .await?;
//!
//! let response = mimir
//!     .fetch(&FetchRequest {
//!         agent_id: AgentId::new("castle-guard-07")?,
//!         archetype_id: vampire,
//!         activation: ActivationTier::Gold,
//!     })
//!     .await?;
//! println!("serving {} adapters", response.chain.slot_count());
//! # Ok(())
//! # }
//! ```
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │                        Mimir                            │
//! ├────────────────────────────┬────────────────────────────┤
//! │     Adapter Registry       │    Request Coordinator     │
//! │  archetype → chain,        │  single-flight fills,      │
//! │  manifests on disk         │  chain cache, batching     │
//! ├────────────────────────────┴────────────────────────────┤
//! │  Fast Tier      │ bounded resident cards, tiered LRU    │
//! │  Mid Tier       │ session summaries, rolling window     │
//! │  Durable Tier   │ append-only episodic log, write-behind│
//! ├─────────────────────────────────────────────────────────┤
//! │  DST            │ SimClock, seeded RNG, fault injection │
//! └─────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Simulation-First Philosophy
//!
//! Every time-dependent component takes a [`SimClock`], and the durable
//! tier ships a fault-injecting in-memory backend, so whole-system behavior
//! (30-day expiry included) is testable without waiting on wall time:
//!
//! ```rust
//! use mimir::dst::{SimConfig, Simulation};
//!
//! # async fn example() {
//! let sim = Simulation::new(SimConfig::with_seed(42));
//! sim.run(|env| async move {
//!     env.advance_time_ms(1000);
//!     assert_eq!(env.now_ms(), 1000);
//!     Ok::<(), std::convert::Infallible>(())
//! })
//! .await
//! .unwrap();
//! # }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod card;
pub mod constants;
pub mod coordinator;
pub mod dst;
pub mod eval;
pub mod mimir;
pub mod model;
pub mod registry;
pub mod telemetry;
pub mod tiers;

// Re-export common types
pub use constants::*;
pub use dst::{DeterministicRng, SimClock, SimConfig, SimEnvironment, Simulation};

pub use card::CardBuilder;
pub use model::{
    ActivationTier, AgentId, ArchetypeId, EpisodicPayload, EpisodicRecord, Fact, FactKind,
    MemoryCard, ModelError, ModelResult, SessionSummary, Turn,
};

// Registry exports
pub use registry::{
    AdapterChain, AdapterDescriptor, AdapterRegistry, AdapterSlotSpec, Manifest, ManifestAdapter,
    RegistryConfig, RegistryError, RegistryResult, ValidationError,
};

// Tier exports
pub use tiers::{
    DurableError, DurableResult, DurableStore, DurableWriter, DurableWriterConfig, EvictedResident,
    FastTier, FastTierConfig, FileDurableStore, MidTier, SimDurableStore,
};

// Coordinator exports
pub use coordinator::{
    Coordinator, CoordinatorConfig, FetchError, FetchRequest, FetchResponse, FetchResult,
    FetchSource, SingleFlight,
};

pub use eval::EvalView;
pub use telemetry::{Telemetry, TelemetrySnapshot};

// Main API
pub use crate::mimir::{Mimir, MimirBuilder, MimirConfig};
