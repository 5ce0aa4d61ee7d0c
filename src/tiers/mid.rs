//! Mid Tier
//!
//! Volatile per-agent session summaries with a rolling visibility window.
//! Expiry is logical: an entry older than the window is invisible to reads
//! the moment the clock passes the boundary, whether or not a purge has run.
//!
//! Only writes refresh an entry's age. Reads are deliberately non-refreshing
//! so an agent nobody has talked to in a window genuinely fades out.

use std::collections::HashMap;

use tracing::debug;

use crate::constants::{MID_TIER_ENTRIES_COUNT_MAX, MID_TIER_WINDOW_MS_DEFAULT, MID_TIER_WINDOW_MS_MAX};
use crate::model::{AgentId, SessionSummary};

/// The mid tier: TTL-bounded session summary store.
pub struct MidTier {
    window_ms: u64,
    entries: HashMap<AgentId, SessionSummary>,
}

impl MidTier {
    /// Create a mid tier with the default 30-day window.
    #[must_use]
    pub fn new() -> Self {
        Self::with_window_ms(MID_TIER_WINDOW_MS_DEFAULT)
    }

    /// Create a mid tier with a custom visibility window.
    ///
    /// # Panics
    /// Panics if the window is zero or exceeds `MID_TIER_WINDOW_MS_MAX`.
    #[must_use]
    pub fn with_window_ms(window_ms: u64) -> Self {
        assert!(window_ms > 0, "mid tier window must be positive");
        assert!(
            window_ms <= MID_TIER_WINDOW_MS_MAX,
            "mid tier window exceeds MID_TIER_WINDOW_MS_MAX"
        );

        Self {
            window_ms,
            entries: HashMap::new(),
        }
    }

    /// Configured visibility window in milliseconds.
    #[must_use]
    pub fn window_ms(&self) -> u64 {
        self.window_ms
    }

    /// Number of stored entries, expired ones included until purged.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the store holds no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Store (or overwrite) an agent's summary. The summary's own
    /// `updated_at_ms` is its write timestamp; storing refreshes the age.
    pub fn put(&mut self, summary: SessionSummary) {
        if self.entries.len() >= MID_TIER_ENTRIES_COUNT_MAX
            && !self.entries.contains_key(&summary.agent_id)
        {
            self.evict_oldest();
        }
        self.entries.insert(summary.agent_id.clone(), summary);

        // Postcondition
        assert!(self.entries.len() <= MID_TIER_ENTRIES_COUNT_MAX);
    }

    /// Read an agent's summary if it is still inside the window at `now_ms`.
    ///
    /// An entry exactly at the window boundary is still visible; one past it
    /// is not, even if no purge has run yet.
    #[must_use]
    pub fn get(&self, agent_id: &AgentId, now_ms: u64) -> Option<&SessionSummary> {
        let summary = self.entries.get(agent_id)?;
        if self.is_expired(summary, now_ms) {
            return None;
        }
        Some(summary)
    }

    /// Whether an agent currently has a visible summary.
    #[must_use]
    pub fn contains(&self, agent_id: &AgentId, now_ms: u64) -> bool {
        self.get(agent_id, now_ms).is_some()
    }

    /// Drop an agent's summary regardless of age.
    pub fn remove(&mut self, agent_id: &AgentId) -> Option<SessionSummary> {
        self.entries.remove(agent_id)
    }

    /// Drop every entry past the window. Returns the number dropped.
    pub fn purge_expired(&mut self, now_ms: u64) -> usize {
        let before = self.entries.len();
        let window_ms = self.window_ms;
        self.entries
            .retain(|_, summary| !expired(summary, window_ms, now_ms));
        let dropped = before - self.entries.len();
        if dropped > 0 {
            debug!(dropped, "purged expired mid tier entries");
        }
        dropped
    }

    /// Visible agent ids at `now_ms`, unordered.
    #[must_use]
    pub fn visible_ids(&self, now_ms: u64) -> Vec<AgentId> {
        self.entries
            .iter()
            .filter(|(_, s)| !self.is_expired(s, now_ms))
            .map(|(id, _)| id.clone())
            .collect()
    }

    fn is_expired(&self, summary: &SessionSummary, now_ms: u64) -> bool {
        expired(summary, self.window_ms, now_ms)
    }

    /// Full store with the incoming agent absent: make room by dropping the
    /// stalest entry.
    fn evict_oldest(&mut self) {
        let oldest = self
            .entries
            .iter()
            .min_by_key(|(_, s)| s.updated_at_ms)
            .map(|(id, _)| id.clone());
        if let Some(id) = oldest {
            self.entries.remove(&id);
        }
    }
}

impl Default for MidTier {
    fn default() -> Self {
        Self::new()
    }
}

fn expired(summary: &SessionSummary, window_ms: u64, now_ms: u64) -> bool {
    now_ms.saturating_sub(summary.updated_at_ms) > window_ms
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::{TIME_MS_PER_DAY, TIME_MS_PER_SEC};
    use crate::model::Turn;

    fn agent(n: u32) -> AgentId {
        AgentId::new(format!("agent{n}")).unwrap()
    }

    fn summary(n: u32, updated_at_ms: u64) -> SessionSummary {
        SessionSummary {
            agent_id: agent(n),
            recent_turns: vec![Turn::new("npc", "hello", updated_at_ms).unwrap()],
            facts: Vec::new(),
            updated_at_ms,
        }
    }

    #[test]
    fn test_put_and_get_inside_window() {
        let mut mid = MidTier::new();
        mid.put(summary(1, 1000));

        assert!(mid.get(&agent(1), 2000).is_some());
        assert!(mid.get(&agent(2), 2000).is_none());
    }

    #[test]
    fn test_window_boundary() {
        let mut mid = MidTier::new();
        mid.put(summary(1, 0));
        let window = mid.window_ms();

        // One second inside the window: visible
        assert!(mid.get(&agent(1), window - TIME_MS_PER_SEC).is_some());
        // Exactly at the boundary: still visible
        assert!(mid.get(&agent(1), window).is_some());
        // One second past: logically expired even without a purge
        assert!(mid.get(&agent(1), window + TIME_MS_PER_SEC).is_none());
    }

    #[test]
    fn test_write_refreshes_age() {
        let mut mid = MidTier::with_window_ms(10 * TIME_MS_PER_DAY);

        mid.put(summary(1, 0));
        // Rewritten on day 8; still alive on day 15
        mid.put(summary(1, 8 * TIME_MS_PER_DAY));
        assert!(mid.get(&agent(1), 15 * TIME_MS_PER_DAY).is_some());
        // Dead on day 19
        assert!(mid.get(&agent(1), 19 * TIME_MS_PER_DAY).is_none());
    }

    #[test]
    fn test_read_does_not_refresh() {
        let mut mid = MidTier::with_window_ms(10 * TIME_MS_PER_DAY);
        mid.put(summary(1, 0));

        // Heavy reading on day 9 must not extend the lifetime
        for _ in 0..100 {
            assert!(mid.get(&agent(1), 9 * TIME_MS_PER_DAY).is_some());
        }
        assert!(mid.get(&agent(1), 11 * TIME_MS_PER_DAY).is_none());
    }

    #[test]
    fn test_purge_expired() {
        let mut mid = MidTier::with_window_ms(TIME_MS_PER_DAY);
        mid.put(summary(1, 0));
        mid.put(summary(2, TIME_MS_PER_DAY));
        assert_eq!(mid.len(), 2);

        let dropped = mid.purge_expired(2 * TIME_MS_PER_DAY - 1);
        assert_eq!(dropped, 1);
        assert_eq!(mid.len(), 1);
        assert!(mid.get(&agent(2), 2 * TIME_MS_PER_DAY - 1).is_some());
    }

    #[test]
    fn test_overwrite_replaces_contents() {
        let mut mid = MidTier::new();
        mid.put(summary(1, 100));

        let mut newer = summary(1, 200);
        newer.recent_turns.push(Turn::new("npc", "more", 150).unwrap());
        mid.put(newer);

        let stored = mid.get(&agent(1), 300).unwrap();
        assert_eq!(stored.recent_turns.len(), 2);
        assert_eq!(stored.updated_at_ms, 200);
        assert_eq!(mid.len(), 1);
    }

    #[test]
    fn test_visible_ids_excludes_expired() {
        let mut mid = MidTier::with_window_ms(TIME_MS_PER_DAY);
        mid.put(summary(1, 0));
        mid.put(summary(2, TIME_MS_PER_DAY));

        let visible = mid.visible_ids(2 * TIME_MS_PER_DAY - 1);
        assert_eq!(visible, vec![agent(2)]);
    }
}
