//! Request Coordinator
//!
//! The fetch path in front of the tiers: resolve the adapter chain, answer
//! from the fast tier, otherwise run a single-flight fill that walks mid
//! then durable, installs the result as a resident, and writes back whatever
//! got evicted to make room.
//!
//! Concurrency contract: any number of callers may fetch the same agent
//! under the same archetype at once; at most one downstream lookup runs,
//! and every caller observes the identical result. Fills are keyed by
//! agent and archetype together, so a fetch under a different archetype
//! never joins (or is answered by) another archetype's fill.

mod single_flight;

use std::collections::HashMap;
use std::sync::Arc;

use futures::FutureExt;
use tokio::sync::Mutex;
use tracing::{debug, instrument, warn};

use crate::card::CardBuilder;
use crate::constants::{DURABLE_REHYDRATE_TAIL_COUNT, FETCH_BATCH_COUNT_MAX};
use crate::dst::SimClock;
use crate::model::{
    ActivationTier, AgentId, ArchetypeId, EpisodicPayload, EpisodicRecord, Fact, MemoryCard,
    SessionSummary, Turn,
};
use crate::registry::{AdapterChain, AdapterRegistry, RegistryError, RegistryResult};
use crate::telemetry::{Telemetry, TelemetrySnapshot};
use crate::tiers::{
    DurableError, DurableStore, DurableWriter, DurableWriterConfig, EvictedResident, FastTier,
    FastTierConfig, MidTier,
};

pub use single_flight::SingleFlight;

// =============================================================================
// Error Types
// =============================================================================

/// Fetch path errors.
#[derive(Debug, Clone, thiserror::Error)]
pub enum FetchError {
    /// Adapter chain resolution failed
    #[error("registry error: {0}")]
    Registry(#[from] RegistryError),

    /// Durable write-behind enqueue failed (queue closed)
    #[error("durable error: {0}")]
    Durable(#[from] DurableError),

    /// Batch exceeds the configured size limit
    #[error("batch too large: {actual} requests exceeds max {max}")]
    BatchTooLarge {
        /// Requests supplied
        actual: usize,
        /// Maximum allowed
        max: usize,
    },
}

/// Result type for fetch operations.
pub type FetchResult<T> = Result<T, FetchError>;

// =============================================================================
// Request / Response Types
// =============================================================================

/// Which tier answered a fetch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchSource {
    /// Resident in the fast tier
    Fast,
    /// Rebuilt from a mid tier summary
    Mid,
    /// Rebuilt from the durable episodic tail
    Durable,
    /// No history anywhere: cold-start default
    ColdDefault,
}

/// One fetch request: which agent, under which archetype, at what fidelity.
#[derive(Debug, Clone)]
pub struct FetchRequest {
    /// Agent to fetch
    pub agent_id: AgentId,
    /// Archetype whose adapter chain serves the agent
    pub archetype_id: ArchetypeId,
    /// Fidelity budget assigned by the caller
    pub activation: ActivationTier,
}

/// Everything inference needs for one agent: the resident memory card and
/// the validated adapter chain.
#[derive(Debug, Clone)]
pub struct FetchResponse {
    /// The agent's resident card, trimmed to its activation budget
    pub card: Arc<MemoryCard>,
    /// The archetype's adapter chain
    pub chain: Arc<AdapterChain>,
    /// Which tier answered
    pub source: FetchSource,
}

/// Coordinator configuration.
#[derive(Debug, Clone)]
pub struct CoordinatorConfig {
    /// Fast tier sizing and budgets
    pub fast: FastTierConfig,
    /// Mid tier visibility window; `None` keeps the default
    pub mid_window_ms: Option<u64>,
    /// Durable write-behind policy
    pub writer: DurableWriterConfig,
    /// Episodic tail length read when rebuilding from durable data
    pub rehydrate_tail_count: usize,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            fast: FastTierConfig::default(),
            mid_window_ms: None,
            writer: DurableWriterConfig::default(),
            rehydrate_tail_count: DURABLE_REHYDRATE_TAIL_COUNT,
        }
    }
}

type FillOutcome = (Arc<MemoryCard>, FetchSource);

struct CachedChain {
    /// Registry version at which this entry was last validated.
    validated_at: u64,
    chain: Arc<AdapterChain>,
}

// =============================================================================
// Coordinator
// =============================================================================

struct CoordinatorInner {
    registry: Arc<AdapterRegistry>,
    fast: Mutex<FastTier>,
    mid: Mutex<MidTier>,
    durable: Arc<dyn DurableStore>,
    writer: DurableWriter,
    telemetry: Arc<Telemetry>,
    clock: SimClock,
    chain_cache: std::sync::Mutex<HashMap<ArchetypeId, CachedChain>>,
    single_flight: SingleFlight<(AgentId, ArchetypeId), FillOutcome>,
    rehydrate_tail_count: usize,
}

/// The request coordinator. Cheap to clone; clones share all state.
#[derive(Clone)]
pub struct Coordinator {
    inner: Arc<CoordinatorInner>,
}

impl Coordinator {
    /// Create a coordinator over an initialized registry and a durable
    /// backend. Spawns the write-behind worker.
    ///
    /// # Panics
    /// Panics if `rehydrate_tail_count` is zero.
    #[must_use]
    pub fn new(
        registry: Arc<AdapterRegistry>,
        durable: Arc<dyn DurableStore>,
        telemetry: Arc<Telemetry>,
        clock: SimClock,
        config: CoordinatorConfig,
    ) -> Self {
        // Precondition
        assert!(
            config.rehydrate_tail_count > 0,
            "rehydrate_tail_count must be positive"
        );

        let writer = DurableWriter::spawn(
            Arc::clone(&durable),
            Arc::clone(&telemetry),
            config.writer.clone(),
        );
        let mid = config
            .mid_window_ms
            .map_or_else(MidTier::new, MidTier::with_window_ms);

        Self {
            inner: Arc::new(CoordinatorInner {
                registry,
                fast: Mutex::new(FastTier::new(config.fast.clone())),
                mid: Mutex::new(mid),
                durable,
                writer,
                telemetry,
                clock,
                chain_cache: std::sync::Mutex::new(HashMap::new()),
                single_flight: SingleFlight::new(),
                rehydrate_tail_count: config.rehydrate_tail_count,
            }),
        }
    }

    /// Fetch an agent's card and adapter chain.
    ///
    /// Fast tier hits return immediately. Misses run at most one downstream
    /// fill per agent and archetype; concurrent callers for the same pair
    /// join it and share its outcome.
    ///
    /// # Errors
    /// Returns `Registry` if the archetype cannot be resolved. Durable read
    /// failures during a fill degrade to a cold start instead of failing.
    #[instrument(skip(self), fields(agent = %request.agent_id, archetype = %request.archetype_id))]
    pub async fn fetch(&self, request: &FetchRequest) -> FetchResult<FetchResponse> {
        let chain = self.inner.resolve_chain(&request.archetype_id).await?;

        // A resident built under another archetype is not a hit; the fill
        // rebuilds the card for the requested one.
        if let Some(card) = self.inner.resident_for(request).await {
            self.inner.telemetry.record_fast_hit();
            return Ok(FetchResponse {
                card,
                chain,
                source: FetchSource::Fast,
            });
        }

        let key = (request.agent_id.clone(), request.archetype_id.clone());
        let (fill, generation, joined) = self.inner.single_flight.join_or_start(&key, || {
            let inner = Arc::clone(&self.inner);
            let request = request.clone();
            async move { inner.fill_miss(&request).await }.boxed()
        });
        if joined {
            self.inner.telemetry.record_single_flight_join();
        }
        let (card, source) = fill.await;
        self.inner.single_flight.complete(&key, generation);

        Ok(FetchResponse { card, chain, source })
    }

    /// Fetch a batch of agents concurrently.
    ///
    /// Results are positional and independent: one failing request does not
    /// fail its neighbors. Duplicate agents in one batch share a single fill.
    ///
    /// # Errors
    /// Returns `BatchTooLarge` if the batch exceeds `FETCH_BATCH_COUNT_MAX`;
    /// per-request failures are inside the returned vector.
    pub async fn fetch_many(
        &self,
        requests: &[FetchRequest],
    ) -> FetchResult<Vec<FetchResult<FetchResponse>>> {
        if requests.len() > FETCH_BATCH_COUNT_MAX {
            return Err(FetchError::BatchTooLarge {
                actual: requests.len(),
                max: FETCH_BATCH_COUNT_MAX,
            });
        }

        let results = futures::future::join_all(requests.iter().map(|r| self.fetch(r))).await;

        // Postcondition
        assert_eq!(results.len(), requests.len());
        Ok(results)
    }

    /// Record a dialogue turn for an agent: durable append (write-behind),
    /// mid tier summary update, and resident card rebuild when present.
    ///
    /// # Errors
    /// Returns `Durable` if the write-behind queue is closed.
    pub async fn record_turn(&self, agent_id: &AgentId, turn: Turn) -> FetchResult<()> {
        self.inner
            .record(EpisodicRecord::turn(agent_id.clone(), turn))
            .await
    }

    /// Record a salient fact for an agent. Same propagation as
    /// [`record_turn`](Self::record_turn).
    ///
    /// # Errors
    /// Returns `Durable` if the write-behind queue is closed.
    pub async fn record_fact(&self, agent_id: &AgentId, fact: Fact) -> FetchResult<()> {
        self.inner
            .record(EpisodicRecord::fact(agent_id.clone(), fact))
            .await
    }

    /// Change an agent's activation tier. Takes effect immediately for a
    /// resident (re-trimming its card on a downgrade) and at the next fetch
    /// otherwise.
    pub async fn set_activation(&self, agent_id: &AgentId, activation: ActivationTier) {
        self.inner.fast.lock().await.set_activation(agent_id, activation);
    }

    /// Drop an agent from the fast tier, writing its summary back to the mid
    /// tier first. The next fetch rebuilds from there.
    pub async fn invalidate(&self, agent_id: &AgentId) {
        let removed = self.inner.fast.lock().await.remove(agent_id);
        if let Some(resident) = removed {
            self.inner.write_back(vec![resident]).await;
        }
    }

    /// Purge mid tier entries past the visibility window. Returns the number
    /// dropped. Reads are correct without this; purging only reclaims memory.
    pub async fn purge_expired(&self) -> usize {
        let now_ms = self.inner.clock.now_ms();
        let dropped = self.inner.mid.lock().await.purge_expired(now_ms);
        self.inner.telemetry.record_mid_expirations(dropped as u64);
        dropped
    }

    /// Flush residents back to the mid tier and drain the durable queue.
    pub async fn shutdown(&self) {
        let drained = self.inner.fast.lock().await.drain();
        for resident in &drained {
            self.inner.telemetry.record_eviction(resident.activation);
        }
        self.inner.write_back(drained).await;
        self.inner.writer.shutdown().await;
        debug!("coordinator shut down");
    }

    /// Shared telemetry handle.
    #[must_use]
    pub fn telemetry(&self) -> Arc<Telemetry> {
        Arc::clone(&self.inner.telemetry)
    }

    /// Point-in-time telemetry snapshot.
    #[must_use]
    pub fn telemetry_snapshot(&self) -> TelemetrySnapshot {
        self.inner.telemetry.snapshot()
    }

    /// The shared clock.
    #[must_use]
    pub fn clock(&self) -> SimClock {
        self.inner.clock.clone()
    }

    // Read-only accessors for the evaluation view.

    /// Resident card without touching recency.
    pub(crate) async fn peek_card(&self, agent_id: &AgentId) -> Option<Arc<MemoryCard>> {
        self.inner.fast.lock().await.peek(agent_id)
    }

    /// Mid tier summary visible at the current clock, if any.
    pub(crate) async fn peek_summary(&self, agent_id: &AgentId) -> Option<SessionSummary> {
        let now_ms = self.inner.clock.now_ms();
        self.inner.mid.lock().await.get(agent_id, now_ms).cloned()
    }

    /// Number of fast tier residents.
    pub(crate) async fn resident_count(&self) -> usize {
        self.inner.fast.lock().await.len()
    }

    /// Number of mid tier summaries visible at the current clock.
    pub(crate) async fn visible_summary_count(&self) -> usize {
        let now_ms = self.inner.clock.now_ms();
        self.inner.mid.lock().await.visible_ids(now_ms).len()
    }

    /// Registered chain for an archetype, straight from the registry.
    pub(crate) async fn peek_chain(
        &self,
        archetype_id: &ArchetypeId,
    ) -> RegistryResult<Arc<AdapterChain>> {
        self.inner.registry.resolve(archetype_id).await
    }

    /// Up to `limit` resident cards fetched under an archetype, recency
    /// untouched. Order is arbitrary.
    pub(crate) async fn sample_residents(
        &self,
        archetype_id: &ArchetypeId,
        limit: usize,
    ) -> Vec<Arc<MemoryCard>> {
        let fast = self.inner.fast.lock().await;
        let mut cards = Vec::new();
        for agent_id in fast.resident_ids() {
            if cards.len() == limit {
                break;
            }
            if let Some(card) = fast.peek(&agent_id) {
                if card.archetype_id == *archetype_id {
                    cards.push(card);
                }
            }
        }
        cards
    }
}

impl CoordinatorInner {
    /// Resolve an archetype's chain through the per-coordinator cache.
    ///
    /// A cached chain is valid while the global registry version is
    /// unchanged since it was cached; any registration anywhere invalidates
    /// the whole cache, which then revalidates lazily per archetype.
    async fn resolve_chain(&self, archetype_id: &ArchetypeId) -> FetchResult<Arc<AdapterChain>> {
        let current = self.registry.version();
        {
            let cache = self
                .chain_cache
                .lock()
                .unwrap_or_else(std::sync::PoisonError::into_inner);
            if let Some(cached) = cache.get(archetype_id) {
                if cached.validated_at == current {
                    self.telemetry.record_chain_cache_hit();
                    return Ok(Arc::clone(&cached.chain));
                }
            }
        }

        self.telemetry.record_chain_cache_miss();
        let chain = self.registry.resolve(archetype_id).await?;
        let mut cache = self
            .chain_cache
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        cache.insert(
            archetype_id.clone(),
            CachedChain {
                validated_at: current,
                chain: Arc::clone(&chain),
            },
        );
        Ok(chain)
    }

    /// Resident card for the request, only if it was built under the
    /// requested archetype.
    async fn resident_for(&self, request: &FetchRequest) -> Option<Arc<MemoryCard>> {
        let card = self.fast.lock().await.get(&request.agent_id)?;
        (card.archetype_id == request.archetype_id).then_some(card)
    }

    /// The single-flight fill body: walk mid then durable, install the card.
    async fn fill_miss(&self, request: &FetchRequest) -> FillOutcome {
        // Another fill may have landed between the caller's miss and this
        // fill starting.
        if let Some(card) = self.resident_for(request).await {
            self.telemetry.record_fast_hit();
            return (card, FetchSource::Fast);
        }

        let now_ms = self.clock.now_ms();
        let summary = self
            .mid
            .lock()
            .await
            .get(&request.agent_id, now_ms)
            .cloned();

        let (card, source) = if let Some(summary) = summary {
            self.telemetry.record_mid_hit();
            let card = CardBuilder::build(
                &request.agent_id,
                &request.archetype_id,
                Some(&summary),
                &[],
            );
            (card, FetchSource::Mid)
        } else {
            // A durable read failure degrades to a cold start rather than
            // failing the fetch; the history is still on disk for next time.
            let tail = match self
                .durable
                .read_tail(&request.agent_id, self.rehydrate_tail_count)
                .await
            {
                Ok(tail) => tail,
                Err(error) => {
                    warn!(agent = %request.agent_id, %error, "durable read failed, serving cold");
                    Vec::new()
                }
            };
            if tail.is_empty() {
                self.telemetry.record_cold_default();
                let card = CardBuilder::cold_default(&request.agent_id, &request.archetype_id);
                (card, FetchSource::ColdDefault)
            } else {
                self.telemetry.record_durable_hit();
                let card =
                    CardBuilder::build(&request.agent_id, &request.archetype_id, None, &tail);
                (card, FetchSource::Durable)
            }
        };

        // Rehydration repopulates the mid tier so the durable tail is not
        // re-read if this resident is evicted and fetched again.
        if source == FetchSource::Durable {
            let now_ms = self.clock.now_ms();
            self.mid
                .lock()
                .await
                .put(CardBuilder::derive_summary(&card, now_ms));
        }

        let (resident, evicted) = {
            let mut fast = self.fast.lock().await;
            fast.insert(request.agent_id.clone(), &card, request.activation)
        };
        for victim in &evicted {
            self.telemetry.record_eviction(victim.activation);
        }
        self.write_back(evicted).await;

        (resident, source)
    }

    /// Write evicted residents' summaries back to the mid tier. Cold cards
    /// carry nothing worth keeping and are skipped.
    async fn write_back(&self, evicted: Vec<EvictedResident>) {
        if evicted.is_empty() {
            return;
        }
        let now_ms = self.clock.now_ms();
        let mut mid = self.mid.lock().await;
        for resident in evicted {
            if resident.card.is_cold() {
                continue;
            }
            mid.put(CardBuilder::derive_summary(&resident.card, now_ms));
            self.telemetry.record_writeback();
        }
    }

    /// Shared body of the record operations: durable enqueue, mid fold,
    /// resident rebuild.
    async fn record(&self, record: EpisodicRecord) -> FetchResult<()> {
        let agent_id = record.agent_id.clone();
        let payload = record.payload.clone();
        self.writer.enqueue(record).await?;

        let now_ms = self.clock.now_ms();
        let updated = {
            let mut mid = self.mid.lock().await;
            let base = mid
                .get(&agent_id, now_ms)
                .cloned()
                .unwrap_or_else(|| SessionSummary {
                    agent_id: agent_id.clone(),
                    recent_turns: Vec::new(),
                    facts: Vec::new(),
                    updated_at_ms: now_ms,
                });
            let updated = match payload {
                EpisodicPayload::Turn { turn } => {
                    CardBuilder::summary_with_turn(&base, turn, now_ms)
                }
                EpisodicPayload::Fact { fact } => {
                    CardBuilder::summary_with_fact(&base, fact, now_ms)
                }
            };
            mid.put(updated.clone());
            updated
        };

        let mut fast = self.fast.lock().await;
        if let Some(resident) = fast.peek(&agent_id) {
            let activation = fast
                .activation(&agent_id)
                .unwrap_or(ActivationTier::Bronze);
            let card =
                CardBuilder::build(&agent_id, &resident.archetype_id, Some(&updated), &[]);
            // Replacement never evicts
            let (_, evicted) = fast.insert(agent_id, &card, activation);
            assert!(evicted.is_empty());
        }
        Ok(())
    }
}
