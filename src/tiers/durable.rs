//! Durable Tier
//!
//! Append-only episodic history, written behind the fetch path by a bounded
//! queue with retry. Two backends: an in-memory simulation store with fault
//! injection for deterministic tests, and a JSONL-per-agent file store.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::constants::{
    DURABLE_QUEUE_DEPTH_DEFAULT, DURABLE_READ_RECORDS_COUNT_MAX, DURABLE_RETRY_COUNT_MAX,
    DURABLE_RETRY_DELAY_MS_BASE, DURABLE_RETRY_DELAY_MS_MAX,
};
use crate::model::{AgentId, EpisodicRecord};
use crate::registry::hex_sha256;
use crate::telemetry::Telemetry;

// =============================================================================
// Error Types
// =============================================================================

/// Durable tier errors.
#[derive(Debug, Clone, thiserror::Error)]
pub enum DurableError {
    /// Backend I/O failure
    #[error("durable io error: {message}")]
    Io {
        /// Underlying error
        message: String,
    },

    /// Record could not be encoded or decoded
    #[error("durable serialization error: {message}")]
    Serialization {
        /// Underlying error
        message: String,
    },

    /// Write-behind queue is closed (writer shut down)
    #[error("durable writer is closed")]
    WriterClosed,

    /// Injected fault (simulation backends only)
    #[error("injected durable fault")]
    InjectedFault,
}

impl DurableError {
    fn io(err: &std::io::Error) -> Self {
        Self::Io {
            message: err.to_string(),
        }
    }
}

/// Result type for durable tier operations.
pub type DurableResult<T> = Result<T, DurableError>;

// =============================================================================
// Store Trait
// =============================================================================

/// Append-only episodic record store.
///
/// Appends for one agent are ordered by the single writer task; `read_tail`
/// returns the most recent records in append order (oldest of the tail
/// first).
#[async_trait]
pub trait DurableStore: Send + Sync {
    /// Append one record to the agent's history.
    async fn append(&self, record: &EpisodicRecord) -> DurableResult<()>;

    /// Read up to `limit` of the most recent records for an agent. An agent
    /// with no history yields an empty tail, not an error.
    async fn read_tail(&self, agent_id: &AgentId, limit: usize) -> DurableResult<Vec<EpisodicRecord>>;
}

// =============================================================================
// Simulation Store
// =============================================================================

/// In-memory durable store with fault injection, for deterministic tests.
pub struct SimDurableStore {
    histories: Mutex<HashMap<AgentId, Vec<EpisodicRecord>>>,
    fail_next_appends: AtomicU32,
    append_attempts: AtomicU64,
    append_successes: AtomicU64,
    tail_reads: AtomicU64,
}

impl SimDurableStore {
    /// Create an empty simulation store.
    #[must_use]
    pub fn new() -> Self {
        Self {
            histories: Mutex::new(HashMap::new()),
            fail_next_appends: AtomicU32::new(0),
            append_attempts: AtomicU64::new(0),
            append_successes: AtomicU64::new(0),
            tail_reads: AtomicU64::new(0),
        }
    }

    /// Make the next `count` append attempts fail with an injected fault.
    pub fn fail_next_appends(&self, count: u32) {
        self.fail_next_appends.store(count, Ordering::SeqCst);
    }

    /// Total append attempts, failed ones included.
    #[must_use]
    pub fn append_attempts(&self) -> u64 {
        self.append_attempts.load(Ordering::SeqCst)
    }

    /// Appends that landed.
    #[must_use]
    pub fn append_successes(&self) -> u64 {
        self.append_successes.load(Ordering::SeqCst)
    }

    /// Number of `read_tail` calls served.
    #[must_use]
    pub fn tail_reads(&self) -> u64 {
        self.tail_reads.load(Ordering::SeqCst)
    }

    /// Full history length for an agent.
    pub async fn history_len(&self, agent_id: &AgentId) -> usize {
        self.histories
            .lock()
            .await
            .get(agent_id)
            .map_or(0, Vec::len)
    }
}

impl Default for SimDurableStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DurableStore for SimDurableStore {
    async fn append(&self, record: &EpisodicRecord) -> DurableResult<()> {
        self.append_attempts.fetch_add(1, Ordering::SeqCst);

        let remaining = self.fail_next_appends.load(Ordering::SeqCst);
        if remaining > 0 {
            self.fail_next_appends.store(remaining - 1, Ordering::SeqCst);
            return Err(DurableError::InjectedFault);
        }

        let mut histories = self.histories.lock().await;
        histories
            .entry(record.agent_id.clone())
            .or_default()
            .push(record.clone());
        self.append_successes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn read_tail(&self, agent_id: &AgentId, limit: usize) -> DurableResult<Vec<EpisodicRecord>> {
        assert!(limit <= DURABLE_READ_RECORDS_COUNT_MAX, "tail limit too large");

        self.tail_reads.fetch_add(1, Ordering::SeqCst);
        let histories = self.histories.lock().await;
        let Some(history) = histories.get(agent_id) else {
            return Ok(Vec::new());
        };
        let start = history.len().saturating_sub(limit);
        Ok(history[start..].to_vec())
    }
}

// =============================================================================
// File Store
// =============================================================================

/// JSONL-per-agent durable store.
///
/// Agent ids are not constrained to filesystem-safe characters, so each
/// agent's file is named by the hash of its id. One record per line; a
/// corrupt line is skipped with a warning rather than poisoning the tail.
pub struct FileDurableStore {
    root_dir: PathBuf,
}

impl FileDurableStore {
    /// Open a file store rooted at `root_dir`, creating it if absent.
    ///
    /// # Errors
    /// Returns `Io` if the root directory cannot be created.
    pub async fn open(root_dir: impl Into<PathBuf>) -> DurableResult<Self> {
        let root_dir = root_dir.into();
        tokio::fs::create_dir_all(&root_dir)
            .await
            .map_err(|e| DurableError::io(&e))?;
        Ok(Self { root_dir })
    }

    fn agent_path(&self, agent_id: &AgentId) -> PathBuf {
        let name = hex_sha256(agent_id.as_str().as_bytes());
        self.root_dir.join(format!("{name}.jsonl"))
    }
}

#[async_trait]
impl DurableStore for FileDurableStore {
    async fn append(&self, record: &EpisodicRecord) -> DurableResult<()> {
        let mut line = serde_json::to_vec(record).map_err(|e| DurableError::Serialization {
            message: e.to_string(),
        })?;
        line.push(b'\n');

        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.agent_path(&record.agent_id))
            .await
            .map_err(|e| DurableError::io(&e))?;
        file.write_all(&line).await.map_err(|e| DurableError::io(&e))?;
        file.sync_data().await.map_err(|e| DurableError::io(&e))?;
        Ok(())
    }

    async fn read_tail(&self, agent_id: &AgentId, limit: usize) -> DurableResult<Vec<EpisodicRecord>> {
        assert!(limit <= DURABLE_READ_RECORDS_COUNT_MAX, "tail limit too large");

        let path = self.agent_path(agent_id);
        let bytes = match tokio::fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(DurableError::io(&e)),
        };

        let mut records = Vec::new();
        for line in bytes.split(|b| *b == b'\n') {
            if line.is_empty() {
                continue;
            }
            match serde_json::from_slice::<EpisodicRecord>(line) {
                Ok(record) => records.push(record),
                Err(e) => {
                    warn!(agent = %agent_id, error = %e, "skipping corrupt durable record");
                }
            }
        }

        let start = records.len().saturating_sub(limit);
        Ok(records.split_off(start))
    }
}

// =============================================================================
// Write-Behind Writer
// =============================================================================

/// Retry policy for the write-behind worker.
#[derive(Debug, Clone)]
pub struct DurableWriterConfig {
    /// Bounded queue depth
    pub queue_depth: usize,
    /// Attempts per record before it is dropped
    pub retry_count_max: u32,
    /// Base backoff delay, doubled per attempt
    pub retry_delay_ms_base: u64,
    /// Backoff ceiling
    pub retry_delay_ms_max: u64,
}

impl Default for DurableWriterConfig {
    fn default() -> Self {
        Self {
            queue_depth: DURABLE_QUEUE_DEPTH_DEFAULT,
            retry_count_max: DURABLE_RETRY_COUNT_MAX,
            retry_delay_ms_base: DURABLE_RETRY_DELAY_MS_BASE,
            retry_delay_ms_max: DURABLE_RETRY_DELAY_MS_MAX,
        }
    }
}

/// Write-behind durable writer: a bounded queue drained by one worker task.
///
/// The single worker preserves per-agent append order. Enqueue never waits:
/// a full queue sheds the record, logged and counted, so a slow or failing
/// backend cannot stall the callers in front of it. Records the worker does
/// accept are only dropped after the retry budget is exhausted, and that is
/// counted separately.
pub struct DurableWriter {
    /// Taken (and thereby closed) on shutdown so the worker can drain out.
    tx: Mutex<Option<mpsc::Sender<EpisodicRecord>>>,
    worker: Mutex<Option<JoinHandle<()>>>,
    telemetry: Arc<Telemetry>,
}

impl DurableWriter {
    /// Spawn the worker task over the given store.
    ///
    /// # Panics
    /// Panics if the queue depth or retry count is zero.
    #[must_use]
    pub fn spawn(
        store: Arc<dyn DurableStore>,
        telemetry: Arc<Telemetry>,
        config: DurableWriterConfig,
    ) -> Self {
        // Preconditions
        assert!(config.queue_depth > 0, "queue depth must be positive");
        assert!(config.retry_count_max > 0, "retry count must be positive");

        let (tx, rx) = mpsc::channel(config.queue_depth);
        let worker = tokio::spawn(worker_loop(rx, store, Arc::clone(&telemetry), config));
        Self {
            tx: Mutex::new(Some(tx)),
            worker: Mutex::new(Some(worker)),
            telemetry,
        }
    }

    /// Enqueue a record for durable append. Never waits: a full queue sheds
    /// the record, which is logged and counted rather than reported as an
    /// error.
    ///
    /// # Errors
    /// Returns `WriterClosed` after shutdown.
    pub async fn enqueue(&self, record: EpisodicRecord) -> DurableResult<()> {
        let guard = self.tx.lock().await;
        let tx = guard.as_ref().ok_or(DurableError::WriterClosed)?;
        match tx.try_send(record) {
            Ok(()) => Ok(()),
            Err(mpsc::error::TrySendError::Full(record)) => {
                self.telemetry.record_durable_queue_drop();
                warn!(agent = %record.agent_id, "durable queue full, record shed");
                Ok(())
            }
            Err(mpsc::error::TrySendError::Closed(_)) => Err(DurableError::WriterClosed),
        }
    }

    /// Close the queue and wait for the worker to drain every queued record.
    /// Idempotent.
    pub async fn shutdown(&self) {
        // Dropping the sender closes the channel; the worker exits after
        // draining what is already queued.
        drop(self.tx.lock().await.take());
        let handle = self.worker.lock().await.take();
        if let Some(handle) = handle {
            let _ = handle.await;
        }
    }
}

async fn worker_loop(
    mut rx: mpsc::Receiver<EpisodicRecord>,
    store: Arc<dyn DurableStore>,
    telemetry: Arc<Telemetry>,
    config: DurableWriterConfig,
) {
    while let Some(record) = rx.recv().await {
        append_with_retry(&*store, &telemetry, &config, &record).await;
    }
    debug!("durable writer drained and stopped");
}

async fn append_with_retry(
    store: &dyn DurableStore,
    telemetry: &Telemetry,
    config: &DurableWriterConfig,
    record: &EpisodicRecord,
) {
    for attempt in 0..config.retry_count_max {
        match store.append(record).await {
            Ok(()) => {
                telemetry.record_durable_append();
                return;
            }
            Err(e) => {
                let last = attempt + 1 == config.retry_count_max;
                if last {
                    telemetry.record_durable_drop();
                    warn!(
                        agent = %record.agent_id,
                        attempts = config.retry_count_max,
                        error = %e,
                        "durable append dropped after exhausting retries"
                    );
                    return;
                }
                telemetry.record_durable_retry();
                let delay_ms = backoff_delay_ms(config, attempt);
                tokio::time::sleep(std::time::Duration::from_millis(delay_ms)).await;
            }
        }
    }
}

/// Exponential backoff with a ceiling. Saturates instead of overflowing for
/// large attempt numbers or a large base.
fn backoff_delay_ms(config: &DurableWriterConfig, attempt: u32) -> u64 {
    let factor = 1u64.checked_shl(attempt).unwrap_or(u64::MAX);
    config
        .retry_delay_ms_base
        .saturating_mul(factor)
        .min(config.retry_delay_ms_max)
}
