//! Core Data Model
//!
//! `TigerStyle`: Explicit types, validated constructors, serde everywhere a
//! value crosses a tier boundary.

use serde::{Deserialize, Serialize};

use crate::constants::{
    AGENT_ID_BYTES_MAX, ARCHETYPE_ID_BYTES_MAX, FACT_FIELD_BYTES_MAX, TURN_TEXT_BYTES_MAX,
};

// =============================================================================
// Error Types
// =============================================================================

/// Errors from model-level validation.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ModelError {
    /// Identifier is empty
    #[error("{what} is empty")]
    EmptyId {
        /// Which identifier
        what: &'static str,
    },

    /// Identifier too long
    #[error("{what} too long: {len} bytes exceeds max {max}")]
    IdTooLong {
        /// Which identifier
        what: &'static str,
        /// Actual length
        len: usize,
        /// Maximum allowed
        max: usize,
    },

    /// Field too long
    #[error("{what} too long: {len} bytes exceeds max {max}")]
    FieldTooLong {
        /// Which field
        what: &'static str,
        /// Actual length
        len: usize,
        /// Maximum allowed
        max: usize,
    },
}

/// Result type for model operations.
pub type ModelResult<T> = Result<T, ModelError>;

fn check_id(what: &'static str, value: &str, max: usize) -> ModelResult<()> {
    if value.is_empty() {
        return Err(ModelError::EmptyId { what });
    }
    if value.len() > max {
        return Err(ModelError::IdTooLong {
            what,
            len: value.len(),
            max,
        });
    }
    Ok(())
}

// =============================================================================
// Identifiers
// =============================================================================

/// Opaque stable identifier for a simulated agent.
///
/// Used as the cache and dedup key across all tiers.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AgentId(String);

impl AgentId {
    /// Create a validated agent id.
    ///
    /// # Errors
    /// Returns an error if the id is empty or exceeds `AGENT_ID_BYTES_MAX`.
    pub fn new(id: impl Into<String>) -> ModelResult<Self> {
        let id = id.into();
        check_id("agent id", &id, AGENT_ID_BYTES_MAX)?;
        Ok(Self(id))
    }

    /// Get the raw string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for AgentId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifier for an archetype (a named category of agent sharing one
/// fixed-order adapter chain).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ArchetypeId(String);

impl ArchetypeId {
    /// Create a validated archetype id.
    ///
    /// # Errors
    /// Returns an error if the id is empty or exceeds `ARCHETYPE_ID_BYTES_MAX`.
    pub fn new(id: impl Into<String>) -> ModelResult<Self> {
        let id = id.into();
        check_id("archetype id", &id, ARCHETYPE_ID_BYTES_MAX)?;
        Ok(Self(id))
    }

    /// Get the raw string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ArchetypeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

// =============================================================================
// Activation Tier
// =============================================================================

/// Fidelity budget label assigned to an agent by the external simulation.
///
/// Gold agents keep the largest fast tier footprint, Bronze the smallest.
/// Bronze entries are evicted before Silver, Silver before Gold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivationTier {
    /// Highest fidelity, evicted last
    Gold,
    /// Middle fidelity
    Silver,
    /// Lowest fidelity, evicted first
    Bronze,
}

impl ActivationTier {
    /// Eviction rank: lower ranks are evicted first.
    #[must_use]
    pub fn eviction_rank(self) -> u8 {
        match self {
            Self::Bronze => 0,
            Self::Silver => 1,
            Self::Gold => 2,
        }
    }

    /// Get string representation.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Gold => "gold",
            Self::Silver => "silver",
            Self::Bronze => "bronze",
        }
    }

    /// All tiers in eviction order (first evicted first).
    #[must_use]
    pub fn all() -> &'static [ActivationTier] {
        &[Self::Bronze, Self::Silver, Self::Gold]
    }
}

impl std::fmt::Display for ActivationTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// =============================================================================
// Turns and Facts
// =============================================================================

/// A single dialogue turn.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Turn {
    /// Who spoke (agent, player, narrator, ...)
    pub speaker: String,
    /// What was said
    pub text: String,
    /// When it was said (ms since epoch, from the shared clock)
    pub at_ms: u64,
}

impl Turn {
    /// Create a validated turn.
    ///
    /// # Errors
    /// Returns an error if the text exceeds `TURN_TEXT_BYTES_MAX`.
    pub fn new(speaker: impl Into<String>, text: impl Into<String>, at_ms: u64) -> ModelResult<Self> {
        let text = text.into();
        if text.len() > TURN_TEXT_BYTES_MAX {
            return Err(ModelError::FieldTooLong {
                what: "turn text",
                len: text.len(),
                max: TURN_TEXT_BYTES_MAX,
            });
        }
        Ok(Self {
            speaker: speaker.into(),
            text,
            at_ms,
        })
    }
}

/// Kind of salient fact retained about an agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FactKind {
    /// Standing between the agent and another character
    Relationship,
    /// Quest or objective state
    Quest,
    /// A notable event the agent witnessed or took part in
    Event,
}

impl FactKind {
    /// Get string representation.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Relationship => "relationship",
            Self::Quest => "quest",
            Self::Event => "event",
        }
    }
}

/// A salient fact about an agent.
///
/// Facts are keyed by `(kind, subject)`: a newer fact about the same subject
/// supersedes the older one when a card is built.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Fact {
    /// What kind of fact
    pub kind: FactKind,
    /// Who or what it concerns
    pub subject: String,
    /// The fact itself
    pub detail: String,
    /// When it was recorded (ms since epoch)
    pub at_ms: u64,
}

impl Fact {
    /// Create a validated fact.
    ///
    /// # Errors
    /// Returns an error if subject or detail exceed `FACT_FIELD_BYTES_MAX`.
    pub fn new(
        kind: FactKind,
        subject: impl Into<String>,
        detail: impl Into<String>,
        at_ms: u64,
    ) -> ModelResult<Self> {
        let subject = subject.into();
        let detail = detail.into();
        for (what, value) in [("fact subject", &subject), ("fact detail", &detail)] {
            if value.len() > FACT_FIELD_BYTES_MAX {
                return Err(ModelError::FieldTooLong {
                    what,
                    len: value.len(),
                    max: FACT_FIELD_BYTES_MAX,
                });
            }
        }
        Ok(Self {
            kind,
            subject,
            detail,
            at_ms,
        })
    }
}

// =============================================================================
// Session Summary (Mid Tier)
// =============================================================================

/// Per-agent rolling-window record held by the mid tier.
///
/// Survives fast tier eviction; expires by TTL. Intentionally lossy relative
/// to the durable tier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionSummary {
    /// Owning agent
    pub agent_id: AgentId,
    /// Recent turns, oldest first
    pub recent_turns: Vec<Turn>,
    /// Salient facts, normalized (sorted, deduped by key)
    pub facts: Vec<Fact>,
    /// When this summary was last written (ms since epoch)
    pub updated_at_ms: u64,
}

// =============================================================================
// Episodic Record (Durable Tier)
// =============================================================================

/// Payload of a durable episodic record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EpisodicPayload {
    /// A dialogue turn
    Turn {
        /// The turn
        turn: Turn,
    },
    /// A salient fact
    Fact {
        /// The fact
        fact: Fact,
    },
}

/// Append-only durable tier entry. Immutable once written; the durable
/// history of an agent is the ordered sequence of its records.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EpisodicRecord {
    /// Owning agent
    pub agent_id: AgentId,
    /// When the record was created (ms since epoch)
    pub at_ms: u64,
    /// What happened
    pub payload: EpisodicPayload,
}

impl EpisodicRecord {
    /// Create a record wrapping a turn.
    #[must_use]
    pub fn turn(agent_id: AgentId, turn: Turn) -> Self {
        let at_ms = turn.at_ms;
        Self {
            agent_id,
            at_ms,
            payload: EpisodicPayload::Turn { turn },
        }
    }

    /// Create a record wrapping a fact.
    #[must_use]
    pub fn fact(agent_id: AgentId, fact: Fact) -> Self {
        let at_ms = fact.at_ms;
        Self {
            agent_id,
            at_ms,
            payload: EpisodicPayload::Fact { fact },
        }
    }
}

// =============================================================================
// Memory Card (Fast Tier)
// =============================================================================

/// Compact, fixed-shape per-agent summary consumed at the fast tier.
///
/// Rebuilt, never mutated in place. Carries no wall time of its own so that
/// identical inputs to the builder yield byte-identical encodings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryCard {
    /// Owning agent
    pub agent_id: AgentId,
    /// Archetype the agent was fetched under
    pub archetype_id: ArchetypeId,
    /// Recent turns, oldest first
    pub recent_turns: Vec<Turn>,
    /// Salient facts, normalized (sorted, deduped by key)
    pub facts: Vec<Fact>,
}

impl MemoryCard {
    /// True for a cold-start card with no history.
    #[must_use]
    pub fn is_cold(&self) -> bool {
        self.recent_turns.is_empty() && self.facts.is_empty()
    }

    /// Deterministic canonical encoding.
    ///
    /// # Panics
    /// Never panics: the card contains only serializable fields.
    #[must_use]
    pub fn encoded(&self) -> Vec<u8> {
        serde_json::to_vec(self).unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_agent_id_valid() {
        let id = AgentId::new("agent42").unwrap();
        assert_eq!(id.as_str(), "agent42");
        assert_eq!(id.to_string(), "agent42");
    }

    #[test]
    fn test_agent_id_empty_rejected() {
        assert!(matches!(
            AgentId::new(""),
            Err(ModelError::EmptyId { what: "agent id" })
        ));
    }

    #[test]
    fn test_agent_id_too_long_rejected() {
        let long = "x".repeat(AGENT_ID_BYTES_MAX + 1);
        assert!(matches!(AgentId::new(long), Err(ModelError::IdTooLong { .. })));
    }

    #[test]
    fn test_activation_tier_eviction_order() {
        assert!(ActivationTier::Bronze.eviction_rank() < ActivationTier::Silver.eviction_rank());
        assert!(ActivationTier::Silver.eviction_rank() < ActivationTier::Gold.eviction_rank());
        assert_eq!(ActivationTier::all()[0], ActivationTier::Bronze);
    }

    #[test]
    fn test_turn_text_limit() {
        let too_long = "y".repeat(TURN_TEXT_BYTES_MAX + 1);
        assert!(matches!(
            Turn::new("npc", too_long, 0),
            Err(ModelError::FieldTooLong { .. })
        ));
        assert!(Turn::new("npc", "hello", 0).is_ok());
    }

    #[test]
    fn test_episodic_record_inherits_timestamp() {
        let agent = AgentId::new("a1").unwrap();
        let turn = Turn::new("npc", "hi", 777).unwrap();
        let record = EpisodicRecord::turn(agent, turn);
        assert_eq!(record.at_ms, 777);
    }

    #[test]
    fn test_card_encoding_roundtrip() {
        let card = MemoryCard {
            agent_id: AgentId::new("a1").unwrap(),
            archetype_id: ArchetypeId::new("vampire").unwrap(),
            recent_turns: vec![Turn::new("npc", "greetings", 1).unwrap()],
            facts: vec![Fact::new(FactKind::Quest, "crypt", "sealed", 2).unwrap()],
        };

        let bytes = card.encoded();
        let decoded: MemoryCard = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(decoded, card);
        assert!(!card.is_cold());
    }
}
