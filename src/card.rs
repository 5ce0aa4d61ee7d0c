//! Memory Card Builder
//!
//! `TigerStyle`: Pure, deterministic derivation. Given identical inputs the
//! output card is byte-identical, so racing rebuilds for the same agent are
//! idempotent cache fills.

use crate::constants::{
    CARD_FACTS_COUNT_MAX, CARD_TURNS_COUNT_MAX, SUMMARY_FACTS_COUNT_MAX, SUMMARY_TURNS_COUNT_MAX,
};
use crate::model::{
    AgentId, ArchetypeId, EpisodicPayload, EpisodicRecord, Fact, MemoryCard, SessionSummary, Turn,
};

/// Builds fixed-shape memory cards from the best available tier data.
///
/// All functions are side-effect free; normalization (sorting, dedup,
/// truncation) is the only processing applied.
pub struct CardBuilder;

impl CardBuilder {
    /// Build a card from a mid tier summary, or from a durable episodic tail
    /// when the mid tier also missed.
    ///
    /// Inputs are consumed in this priority order:
    /// 1. `summary` when present (episodic tail is ignored: the summary is
    ///    already the rolling-window digest of the same history);
    /// 2. the episodic tail, replayed oldest-first;
    /// 3. neither: the cold-start default.
    #[must_use]
    pub fn build(
        agent_id: &AgentId,
        archetype_id: &ArchetypeId,
        summary: Option<&SessionSummary>,
        episodic_tail: &[EpisodicRecord],
    ) -> MemoryCard {
        let (turns, facts) = match summary {
            Some(summary) => (summary.recent_turns.clone(), summary.facts.clone()),
            None => Self::replay_tail(episodic_tail),
        };

        let card = MemoryCard {
            agent_id: agent_id.clone(),
            archetype_id: archetype_id.clone(),
            recent_turns: Self::normalize_turns(turns, CARD_TURNS_COUNT_MAX),
            facts: Self::normalize_facts(facts, CARD_FACTS_COUNT_MAX),
        };

        // Postconditions
        assert!(card.recent_turns.len() <= CARD_TURNS_COUNT_MAX);
        assert!(card.facts.len() <= CARD_FACTS_COUNT_MAX);

        card
    }

    /// Cold-start default card: empty history, archetype defaults.
    ///
    /// A new agent has no history by definition, so a total miss across all
    /// tiers is not an error.
    #[must_use]
    pub fn cold_default(agent_id: &AgentId, archetype_id: &ArchetypeId) -> MemoryCard {
        MemoryCard {
            agent_id: agent_id.clone(),
            archetype_id: archetype_id.clone(),
            recent_turns: Vec::new(),
            facts: Vec::new(),
        }
    }

    /// Produce the resident copy of a card trimmed to an activation tier's
    /// turn budget. The original card is untouched.
    #[must_use]
    pub fn retained(card: &MemoryCard, turn_budget: usize) -> MemoryCard {
        let mut trimmed = card.clone();
        if trimmed.recent_turns.len() > turn_budget {
            let drop = trimmed.recent_turns.len() - turn_budget;
            trimmed.recent_turns.drain(..drop);
        }
        trimmed
    }

    /// Derive the session summary written back to the mid tier when a card
    /// is evicted from the fast tier.
    #[must_use]
    pub fn derive_summary(card: &MemoryCard, now_ms: u64) -> SessionSummary {
        SessionSummary {
            agent_id: card.agent_id.clone(),
            recent_turns: Self::normalize_turns(card.recent_turns.clone(), SUMMARY_TURNS_COUNT_MAX),
            facts: Self::normalize_facts(card.facts.clone(), SUMMARY_FACTS_COUNT_MAX),
            updated_at_ms: now_ms,
        }
    }

    /// Fold a new turn into an existing summary (record ingestion path).
    #[must_use]
    pub fn summary_with_turn(summary: &SessionSummary, turn: Turn, now_ms: u64) -> SessionSummary {
        let mut turns = summary.recent_turns.clone();
        turns.push(turn);
        SessionSummary {
            agent_id: summary.agent_id.clone(),
            recent_turns: Self::normalize_turns(turns, SUMMARY_TURNS_COUNT_MAX),
            facts: summary.facts.clone(),
            updated_at_ms: now_ms,
        }
    }

    /// Fold a new fact into an existing summary (record ingestion path).
    #[must_use]
    pub fn summary_with_fact(summary: &SessionSummary, fact: Fact, now_ms: u64) -> SessionSummary {
        let mut facts = summary.facts.clone();
        facts.push(fact);
        SessionSummary {
            agent_id: summary.agent_id.clone(),
            recent_turns: summary.recent_turns.clone(),
            facts: Self::normalize_facts(facts, SUMMARY_FACTS_COUNT_MAX),
            updated_at_ms: now_ms,
        }
    }

    fn replay_tail(tail: &[EpisodicRecord]) -> (Vec<Turn>, Vec<Fact>) {
        let mut turns = Vec::new();
        let mut facts = Vec::new();
        for record in tail {
            match &record.payload {
                EpisodicPayload::Turn { turn } => turns.push(turn.clone()),
                EpisodicPayload::Fact { fact } => facts.push(fact.clone()),
            }
        }
        (turns, facts)
    }

    /// Sort turns by timestamp (stable, so equal timestamps keep input
    /// order) and keep the most recent `limit`.
    fn normalize_turns(mut turns: Vec<Turn>, limit: usize) -> Vec<Turn> {
        turns.sort_by_key(|t| t.at_ms);
        if turns.len() > limit {
            let drop = turns.len() - limit;
            turns.drain(..drop);
        }
        turns
    }

    /// Sort facts by `(kind, subject, at_ms)`, keep only the newest fact per
    /// `(kind, subject)` key, and cap the result.
    fn normalize_facts(mut facts: Vec<Fact>, limit: usize) -> Vec<Fact> {
        facts.sort_by(|a, b| {
            (a.kind, &a.subject, a.at_ms).cmp(&(b.kind, &b.subject, b.at_ms))
        });
        // Newest per key wins; sort put it last within each key group
        let mut deduped: Vec<Fact> = Vec::with_capacity(facts.len());
        for fact in facts {
            match deduped.last_mut() {
                Some(last) if last.kind == fact.kind && last.subject == fact.subject => {
                    *last = fact;
                }
                _ => deduped.push(fact),
            }
        }
        deduped.truncate(limit);
        deduped
    }
}
