//! Storage Tiers
//!
//! Three tiers, fastest and most lossy first:
//! - [`fast`]: bounded in-memory resident cards, evicted by activation tier
//!   then recency;
//! - [`mid`]: volatile session summaries with a rolling visibility window;
//! - [`durable`]: append-only episodic history behind a write-behind queue.

pub mod durable;
pub mod fast;
pub mod mid;

pub use durable::{
    DurableError, DurableResult, DurableStore, DurableWriter, DurableWriterConfig,
    FileDurableStore, SimDurableStore,
};
pub use fast::{EvictedResident, FastTier, FastTierConfig};
pub use mid::MidTier;
