//! Fast Tier
//!
//! Bounded in-memory cache of resident memory cards, one per active agent.
//! Capacity pressure evicts by activation tier first (all Bronze before any
//! Silver, all Silver before any Gold) and least-recent access within a tier.
//!
//! Not internally synchronized; the coordinator owns it behind a lock.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::debug;

use crate::card::CardBuilder;
use crate::constants::{
    FAST_TIER_RESIDENTS_COUNT_DEFAULT, FAST_TIER_RESIDENTS_COUNT_MAX,
    FAST_TIER_TURNS_BRONZE_DEFAULT, FAST_TIER_TURNS_GOLD_DEFAULT, FAST_TIER_TURNS_SILVER_DEFAULT,
};
use crate::model::{ActivationTier, AgentId, MemoryCard};

/// Fast tier configuration.
#[derive(Debug, Clone)]
pub struct FastTierConfig {
    /// Maximum number of resident agents
    pub capacity: usize,
    /// Turn budget for Gold residents
    pub turns_gold: usize,
    /// Turn budget for Silver residents
    pub turns_silver: usize,
    /// Turn budget for Bronze residents
    pub turns_bronze: usize,
}

impl Default for FastTierConfig {
    fn default() -> Self {
        Self {
            capacity: FAST_TIER_RESIDENTS_COUNT_DEFAULT,
            turns_gold: FAST_TIER_TURNS_GOLD_DEFAULT,
            turns_silver: FAST_TIER_TURNS_SILVER_DEFAULT,
            turns_bronze: FAST_TIER_TURNS_BRONZE_DEFAULT,
        }
    }
}

impl FastTierConfig {
    /// Override the resident capacity.
    ///
    /// # Panics
    /// Panics if `capacity` is zero or exceeds the hard maximum.
    #[must_use]
    pub fn with_capacity(mut self, capacity: usize) -> Self {
        assert!(capacity > 0, "fast tier capacity must be positive");
        assert!(
            capacity <= FAST_TIER_RESIDENTS_COUNT_MAX,
            "fast tier capacity exceeds FAST_TIER_RESIDENTS_COUNT_MAX"
        );
        self.capacity = capacity;
        self
    }

    fn turn_budget(&self, tier: ActivationTier) -> usize {
        match tier {
            ActivationTier::Gold => self.turns_gold,
            ActivationTier::Silver => self.turns_silver,
            ActivationTier::Bronze => self.turns_bronze,
        }
    }
}

struct Resident {
    card: Arc<MemoryCard>,
    activation: ActivationTier,
    /// Monotonic access sequence; smaller means colder.
    last_access_seq: u64,
}

/// A resident pushed out of the fast tier, handed back for write-back.
#[derive(Debug)]
pub struct EvictedResident {
    /// The evicted agent
    pub agent_id: AgentId,
    /// Its card at eviction time
    pub card: Arc<MemoryCard>,
    /// The activation tier it held
    pub activation: ActivationTier,
}

/// The fast tier: bounded resident card cache.
pub struct FastTier {
    config: FastTierConfig,
    residents: HashMap<AgentId, Resident>,
    access_seq: u64,
}

impl FastTier {
    /// Create an empty fast tier.
    #[must_use]
    pub fn new(config: FastTierConfig) -> Self {
        assert!(config.capacity > 0, "fast tier capacity must be positive");

        Self {
            config,
            residents: HashMap::new(),
            access_seq: 0,
        }
    }

    /// Number of resident agents.
    #[must_use]
    pub fn len(&self) -> usize {
        self.residents.len()
    }

    /// Whether no agents are resident.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.residents.is_empty()
    }

    /// Configured capacity.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.config.capacity
    }

    /// Look up a resident card and mark it recently used.
    pub fn get(&mut self, agent_id: &AgentId) -> Option<Arc<MemoryCard>> {
        self.access_seq += 1;
        let seq = self.access_seq;
        let resident = self.residents.get_mut(agent_id)?;
        resident.last_access_seq = seq;
        Some(Arc::clone(&resident.card))
    }

    /// Look up a resident card without touching recency. Read-only callers
    /// (evaluation views) must not perturb eviction order.
    #[must_use]
    pub fn peek(&self, agent_id: &AgentId) -> Option<Arc<MemoryCard>> {
        self.residents.get(agent_id).map(|r| Arc::clone(&r.card))
    }

    /// Activation tier of a resident agent.
    #[must_use]
    pub fn activation(&self, agent_id: &AgentId) -> Option<ActivationTier> {
        self.residents.get(agent_id).map(|r| r.activation)
    }

    /// Insert (or replace) a resident card, trimmed to the activation tier's
    /// turn budget. Returns the resident card as stored plus any residents
    /// evicted to stay within capacity; the caller owns their write-back.
    pub fn insert(
        &mut self,
        agent_id: AgentId,
        card: &MemoryCard,
        activation: ActivationTier,
    ) -> (Arc<MemoryCard>, Vec<EvictedResident>) {
        let trimmed = CardBuilder::retained(card, self.config.turn_budget(activation));

        self.access_seq += 1;
        let replacing = self.residents.contains_key(&agent_id);
        let mut evicted = Vec::new();
        if !replacing {
            while self.residents.len() >= self.config.capacity {
                // Capacity is positive and the incoming key is absent, so a
                // victim always exists.
                if let Some(victim) = self.evict_one() {
                    evicted.push(victim);
                } else {
                    break;
                }
            }
        }

        let resident = Arc::new(trimmed);
        self.residents.insert(
            agent_id,
            Resident {
                card: Arc::clone(&resident),
                activation,
                last_access_seq: self.access_seq,
            },
        );

        // Postcondition
        assert!(
            self.residents.len() <= self.config.capacity,
            "fast tier exceeded capacity"
        );
        (resident, evicted)
    }

    /// Change a resident's activation tier, re-trimming its card when the
    /// new budget is smaller. A miss is a no-op: non-resident agents pick up
    /// their tier at the next insert.
    pub fn set_activation(&mut self, agent_id: &AgentId, activation: ActivationTier) {
        if let Some(resident) = self.residents.get_mut(agent_id) {
            resident.activation = activation;
            let budget = self.config.turn_budget(activation);
            if resident.card.recent_turns.len() > budget {
                resident.card = Arc::new(CardBuilder::retained(&resident.card, budget));
            }
        }
    }

    /// Remove a resident, returning it for write-back.
    pub fn remove(&mut self, agent_id: &AgentId) -> Option<EvictedResident> {
        self.residents.remove(agent_id).map(|r| EvictedResident {
            agent_id: agent_id.clone(),
            card: r.card,
            activation: r.activation,
        })
    }

    /// Remove every resident, returning them for write-back (shutdown path).
    pub fn drain(&mut self) -> Vec<EvictedResident> {
        let drained = self
            .residents
            .drain()
            .map(|(agent_id, r)| EvictedResident {
                agent_id,
                card: r.card,
                activation: r.activation,
            })
            .collect();

        // Postcondition
        assert!(self.residents.is_empty());
        drained
    }

    /// Resident agent ids, unordered.
    #[must_use]
    pub fn resident_ids(&self) -> Vec<AgentId> {
        self.residents.keys().cloned().collect()
    }

    /// Evict the single coldest resident: lowest activation tier first, then
    /// least recently accessed within that tier.
    fn evict_one(&mut self) -> Option<EvictedResident> {
        let victim_id = self
            .residents
            .iter()
            .min_by_key(|(_, r)| (r.activation.eviction_rank(), r.last_access_seq))
            .map(|(id, _)| id.clone())?;

        let resident = self.residents.remove(&victim_id)?;
        debug!(
            agent = %victim_id,
            activation = %resident.activation,
            "evicted fast tier resident"
        );
        Some(EvictedResident {
            agent_id: victim_id,
            card: resident.card,
            activation: resident.activation,
        })
    }
}
