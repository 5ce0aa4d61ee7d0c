//! `TigerStyle` Constants
//!
//! All limits use big-endian naming: `CATEGORY_SPECIFICS_UNIT_LIMIT`
//! Example: `FAST_TIER_RESIDENTS_COUNT_MAX` (not `MAX_FAST_TIER_RESIDENTS`)
//!
//! Every constant includes units in the name:
//! - _`BYTES_MAX/MIN` for size limits
//! - _`COUNT_MAX/DEFAULT` for quantity limits
//! - _MS for milliseconds

// =============================================================================
// Identifier Limits
// =============================================================================

/// Maximum length of an agent identifier
pub const AGENT_ID_BYTES_MAX: usize = 256;

/// Maximum length of an archetype identifier
pub const ARCHETYPE_ID_BYTES_MAX: usize = 128;

/// Maximum length of an adapter slot name
pub const ADAPTER_SLOT_NAME_BYTES_MAX: usize = 64;

// =============================================================================
// Adapter Registry Limits
// =============================================================================

/// Number of adapter slots in an archetype chain
pub const ARCHETYPE_SLOTS_COUNT_DEFAULT: usize = 7;

/// Maximum number of adapter slots in an archetype chain
pub const ARCHETYPE_SLOTS_COUNT_MAX: usize = 16;

/// Maximum number of registered archetypes
pub const REGISTRY_ARCHETYPES_COUNT_MAX: usize = 1024;

/// Maximum length of an adapter path (relative to the base directory)
pub const ADAPTER_PATH_BYTES_MAX: usize = 512;

/// Length of a hex-encoded sha256 content hash
pub const ADAPTER_CONTENT_HASH_BYTES: usize = 64;

// =============================================================================
// Fast Tier Limits
// =============================================================================

/// Default maximum number of resident agents in the fast tier
pub const FAST_TIER_RESIDENTS_COUNT_DEFAULT: usize = 256;

/// Maximum configurable fast tier capacity
pub const FAST_TIER_RESIDENTS_COUNT_MAX: usize = 100_000;

/// Turns retained in a resident card for a Gold agent
pub const FAST_TIER_TURNS_GOLD_DEFAULT: usize = 32;

/// Turns retained in a resident card for a Silver agent
pub const FAST_TIER_TURNS_SILVER_DEFAULT: usize = 16;

/// Turns retained in a resident card for a Bronze agent
pub const FAST_TIER_TURNS_BRONZE_DEFAULT: usize = 8;

// =============================================================================
// Mid Tier Limits
// =============================================================================

/// Default mid tier visibility window (30 days)
pub const MID_TIER_WINDOW_MS_DEFAULT: u64 = 30 * TIME_MS_PER_DAY;

/// Maximum configurable mid tier window (1 year)
pub const MID_TIER_WINDOW_MS_MAX: u64 = 365 * TIME_MS_PER_DAY;

/// Maximum number of entries held by the mid tier
pub const MID_TIER_ENTRIES_COUNT_MAX: usize = 100_000;

// =============================================================================
// Memory Card / Session Summary Limits
// =============================================================================

/// Maximum turns carried by a memory card before tier trimming
pub const CARD_TURNS_COUNT_MAX: usize = 64;

/// Maximum facts carried by a memory card
pub const CARD_FACTS_COUNT_MAX: usize = 64;

/// Maximum turns carried by a session summary
pub const SUMMARY_TURNS_COUNT_MAX: usize = 64;

/// Maximum facts carried by a session summary
pub const SUMMARY_FACTS_COUNT_MAX: usize = 128;

/// Maximum length of a dialogue turn text
pub const TURN_TEXT_BYTES_MAX: usize = 4096;

/// Maximum length of a fact subject or detail
pub const FACT_FIELD_BYTES_MAX: usize = 1024;

// =============================================================================
// Durable Tier Limits
// =============================================================================

/// Maximum number of retry attempts for durable writes
pub const DURABLE_RETRY_COUNT_MAX: u32 = 5;

/// Base delay between durable write retries in milliseconds
pub const DURABLE_RETRY_DELAY_MS_BASE: u64 = 100;

/// Maximum delay between durable write retries in milliseconds
pub const DURABLE_RETRY_DELAY_MS_MAX: u64 = 5000;

/// Depth of the write-behind queue
pub const DURABLE_QUEUE_DEPTH_DEFAULT: usize = 1024;

/// Maximum records returned by a single rehydration read
pub const DURABLE_READ_RECORDS_COUNT_MAX: usize = 100_000;

/// Episodic tail length consumed when rebuilding a card from durable data
pub const DURABLE_REHYDRATE_TAIL_COUNT: usize = 256;

// =============================================================================
// Coordinator Limits
// =============================================================================

/// Maximum number of requests in a single batch fetch
pub const FETCH_BATCH_COUNT_MAX: usize = 256;

// =============================================================================
// Time Constants
// =============================================================================

/// Milliseconds per second
pub const TIME_MS_PER_SEC: u64 = 1000;

/// Milliseconds per minute
pub const TIME_MS_PER_MIN: u64 = 60 * TIME_MS_PER_SEC;

/// Milliseconds per hour
pub const TIME_MS_PER_HOUR: u64 = 60 * TIME_MS_PER_MIN;

/// Milliseconds per day
pub const TIME_MS_PER_DAY: u64 = 24 * TIME_MS_PER_HOUR;

// =============================================================================
// DST (Deterministic Simulation Testing) Limits
// =============================================================================

/// Maximum time advance per step in milliseconds
pub const DST_TIME_ADVANCE_MS_MAX: u64 = TIME_MS_PER_DAY;

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_time_constants_consistent() {
        assert_eq!(TIME_MS_PER_MIN, 60_000);
        assert_eq!(TIME_MS_PER_HOUR, 3_600_000);
        assert_eq!(TIME_MS_PER_DAY, 86_400_000);
    }

    #[test]
    fn test_fast_tier_limits_valid() {
        assert!(FAST_TIER_RESIDENTS_COUNT_DEFAULT <= FAST_TIER_RESIDENTS_COUNT_MAX);
        assert!(FAST_TIER_TURNS_BRONZE_DEFAULT < FAST_TIER_TURNS_SILVER_DEFAULT);
        assert!(FAST_TIER_TURNS_SILVER_DEFAULT < FAST_TIER_TURNS_GOLD_DEFAULT);
        assert!(FAST_TIER_TURNS_GOLD_DEFAULT <= CARD_TURNS_COUNT_MAX);
    }

    #[test]
    fn test_mid_tier_limits_valid() {
        assert!(MID_TIER_WINDOW_MS_DEFAULT < MID_TIER_WINDOW_MS_MAX);
        assert_eq!(MID_TIER_WINDOW_MS_DEFAULT, 30 * 86_400_000);
    }

    #[test]
    fn test_registry_limits_valid() {
        assert!(ARCHETYPE_SLOTS_COUNT_DEFAULT <= ARCHETYPE_SLOTS_COUNT_MAX);
        assert!(ARCHETYPE_SLOTS_COUNT_DEFAULT > 0);
    }

    #[test]
    fn test_durable_retry_limits_valid() {
        assert!(DURABLE_RETRY_DELAY_MS_BASE < DURABLE_RETRY_DELAY_MS_MAX);
        assert!(DURABLE_RETRY_COUNT_MAX > 0);
    }
}
