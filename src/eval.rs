//! Evaluation View
//!
//! Read-only window over a running coordinator for dashboards, tests, and
//! offline evaluation. Nothing here perturbs caching state: card reads skip
//! recency, summary reads never refresh TTLs, and no fill is ever started.

use std::sync::Arc;

use crate::coordinator::Coordinator;
use crate::model::{AgentId, ArchetypeId, MemoryCard, SessionSummary};
use crate::registry::{AdapterChain, RegistryResult};
use crate::telemetry::TelemetrySnapshot;

/// Read-only view over a coordinator.
#[derive(Clone)]
pub struct EvalView {
    coordinator: Coordinator,
}

impl EvalView {
    /// Create a view over a coordinator.
    #[must_use]
    pub fn new(coordinator: Coordinator) -> Self {
        Self { coordinator }
    }

    /// Resident card for an agent, if any, without touching eviction order.
    pub async fn resident_card(&self, agent_id: &AgentId) -> Option<Arc<MemoryCard>> {
        self.coordinator.peek_card(agent_id).await
    }

    /// Mid tier summary visible at the current clock, if any.
    pub async fn session_summary(&self, agent_id: &AgentId) -> Option<SessionSummary> {
        self.coordinator.peek_summary(agent_id).await
    }

    /// Number of fast tier residents.
    pub async fn resident_count(&self) -> usize {
        self.coordinator.resident_count().await
    }

    /// Number of mid tier summaries currently visible.
    pub async fn visible_summary_count(&self) -> usize {
        self.coordinator.visible_summary_count().await
    }

    /// The registered adapter chain for an archetype.
    ///
    /// # Errors
    /// Returns an error if the archetype is unknown or its manifest is
    /// invalid.
    pub async fn chain(&self, archetype_id: &ArchetypeId) -> RegistryResult<Arc<AdapterChain>> {
        self.coordinator.peek_chain(archetype_id).await
    }

    /// Up to `limit` resident cards fetched under an archetype, without
    /// touching eviction order.
    pub async fn resident_cards(
        &self,
        archetype_id: &ArchetypeId,
        limit: usize,
    ) -> Vec<Arc<MemoryCard>> {
        self.coordinator.sample_residents(archetype_id, limit).await
    }

    /// Point-in-time telemetry counters.
    #[must_use]
    pub fn telemetry(&self) -> TelemetrySnapshot {
        self.coordinator.telemetry_snapshot()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coordinator::{CoordinatorConfig, FetchRequest};
    use crate::dst::SimClock;
    use crate::model::{ActivationTier, ArchetypeId, Turn};
    use crate::registry::{AdapterRegistry, AdapterSlotSpec, RegistryConfig};
    use crate::telemetry::Telemetry;
    use crate::tiers::{DurableStore, FastTierConfig, SimDurableStore};

    async fn coordinator() -> (tempfile::TempDir, Coordinator) {
        let dir = tempfile::tempdir().unwrap();
        let base_dir = dir.path().join("adapters");
        tokio::fs::create_dir_all(&base_dir).await.unwrap();
        tokio::fs::write(base_dir.join("p.bin"), b"p").await.unwrap();

        let registry = Arc::new(AdapterRegistry::new(
            RegistryConfig::new(base_dir, dir.path().join("manifests")).with_slot_count(1),
        ));
        registry.init().await.unwrap();
        let archetype = ArchetypeId::new("vampire").unwrap();
        registry
            .register(&archetype, 1, &[AdapterSlotSpec::new("personality", "p.bin", 1)])
            .await
            .unwrap();

        let coordinator = Coordinator::new(
            registry,
            Arc::new(SimDurableStore::new()) as Arc<dyn DurableStore>,
            Arc::new(Telemetry::new()),
            SimClock::new(),
            CoordinatorConfig {
                fast: FastTierConfig::default().with_capacity(2),
                ..CoordinatorConfig::default()
            },
        );
        (dir, coordinator)
    }

    #[tokio::test]
    async fn test_view_observes_without_perturbing() {
        let (_dir, coordinator) = coordinator().await;
        let view = EvalView::new(coordinator.clone());
        let agent = AgentId::new("agent1").unwrap();

        assert!(view.resident_card(&agent).await.is_none());
        assert_eq!(view.resident_count().await, 0);

        coordinator
            .record_turn(&agent, Turn::new("npc", "hello", 1).unwrap())
            .await
            .unwrap();
        coordinator
            .fetch(&FetchRequest {
                agent_id: agent.clone(),
                archetype_id: ArchetypeId::new("vampire").unwrap(),
                activation: ActivationTier::Gold,
            })
            .await
            .unwrap();

        assert_eq!(view.resident_count().await, 1);
        assert!(view.resident_card(&agent).await.is_some());
        assert!(view.session_summary(&agent).await.is_some());
        assert_eq!(view.visible_summary_count().await, 1);

        let vampire = ArchetypeId::new("vampire").unwrap();
        assert_eq!(view.chain(&vampire).await.unwrap().slot_count(), 1);
        assert_eq!(view.resident_cards(&vampire, 8).await.len(), 1);

        // Observation is not a fetch: totals unchanged by the reads above
        assert_eq!(view.telemetry().fetches_total(), 1);
        coordinator.shutdown().await;
    }
}
