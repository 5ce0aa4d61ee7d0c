//! Adapter Registry
//!
//! Maps archetype identifiers to validated, immutable adapter chains. The
//! registry is the single authority on which adapter files a chain loads:
//! every manifest is validated (slot count, path safety, content hashes)
//! before it becomes resolvable, and persisted manifests are re-verified at
//! startup before the readiness gate opens.
//!
//! `TigerStyle`: explicit readiness. Resolution before `init()` completes is
//! an error, never a silent empty answer.

mod manifest;

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::constants::{
    ARCHETYPE_SLOTS_COUNT_DEFAULT, ARCHETYPE_SLOTS_COUNT_MAX, REGISTRY_ARCHETYPES_COUNT_MAX,
};
use crate::model::ArchetypeId;

pub use manifest::{
    hex_sha256, AdapterSlotSpec, Manifest, ManifestAdapter, ValidationError,
};

// =============================================================================
// Error Types
// =============================================================================

/// Registry operation errors.
///
/// Clone-able so a shared in-flight failure can be handed to every waiter.
#[derive(Debug, Clone, thiserror::Error)]
pub enum RegistryError {
    /// Resolution or registration attempted before `init()` completed
    #[error("registry is not ready: init() has not completed")]
    NotReady,

    /// `init()` called more than once
    #[error("registry is already initialized")]
    AlreadyInitialized,

    /// No manifest registered for the archetype
    #[error("archetype not found: {archetype}")]
    NotFound {
        /// The unknown archetype
        archetype: String,
    },

    /// A persisted manifest failed validation at load time
    #[error("archetype {archetype} has an invalid persisted manifest: {reason}")]
    Invalid {
        /// The archetype whose manifest is unusable
        archetype: String,
        /// Why the manifest was rejected
        reason: String,
    },

    /// Manifest or descriptor validation failed
    #[error("validation failed: {0}")]
    Validation(#[from] ValidationError),

    /// Registration conflicts with the manifest already on record
    #[error(
        "registration conflict for {archetype}: version {version} does not supersede \
         existing version {existing_version}"
    )]
    Conflict {
        /// The contested archetype
        archetype: String,
        /// Version supplied by the caller
        version: u32,
        /// Version currently on record
        existing_version: u32,
    },

    /// Registry holds the maximum number of archetypes
    #[error("registry is full: {max} archetypes")]
    Full {
        /// Configured archetype limit
        max: usize,
    },

    /// Filesystem failure while persisting or loading manifests
    #[error("registry io error: {message}")]
    Io {
        /// Underlying error
        message: String,
    },
}

impl RegistryError {
    fn io(err: &std::io::Error) -> Self {
        Self::Io {
            message: err.to_string(),
        }
    }
}

/// Result type for registry operations.
pub type RegistryResult<T> = Result<T, RegistryError>;

// =============================================================================
// Adapter Chain
// =============================================================================

/// One resolved adapter in a chain, with its path anchored under the base
/// directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdapterDescriptor {
    /// Slot name
    pub slot: String,
    /// Absolute path to the adapter file
    pub path: PathBuf,
    /// Hex-encoded sha256 of the file contents
    pub content_hash: String,
    /// Adapter version
    pub adapter_version: u32,
}

/// A validated, immutable adapter chain for one archetype.
///
/// Shared as `Arc<AdapterChain>`; a chain never mutates after registration,
/// so callers may cache it and compare by pointer identity.
#[derive(Debug, PartialEq, Eq)]
pub struct AdapterChain {
    /// Archetype this chain serves
    pub archetype_id: ArchetypeId,
    /// Manifest version this chain was built from
    pub manifest_version: u32,
    /// Canonical digest of the source manifest
    pub manifest_digest: String,
    /// Registry version at which this chain became current
    pub registry_version: u64,
    /// Ordered adapters, one per slot
    pub adapters: Vec<AdapterDescriptor>,
}

impl AdapterChain {
    /// Number of slots in the chain.
    #[must_use]
    pub fn slot_count(&self) -> usize {
        self.adapters.len()
    }

    /// Look up an adapter by slot name.
    #[must_use]
    pub fn adapter(&self, slot: &str) -> Option<&AdapterDescriptor> {
        self.adapters.iter().find(|a| a.slot == slot)
    }
}

// =============================================================================
// Configuration
// =============================================================================

/// Registry configuration.
#[derive(Debug, Clone)]
pub struct RegistryConfig {
    /// Directory adapter paths resolve under
    pub base_dir: PathBuf,
    /// Directory persisted manifests live in
    pub manifest_dir: PathBuf,
    /// Required number of slots per chain
    pub slot_count: usize,
}

impl RegistryConfig {
    /// Create a configuration with the default slot count.
    ///
    /// # Panics
    /// Panics if `base_dir` and `manifest_dir` are the same path.
    #[must_use]
    pub fn new(base_dir: impl Into<PathBuf>, manifest_dir: impl Into<PathBuf>) -> Self {
        let base_dir = base_dir.into();
        let manifest_dir = manifest_dir.into();
        assert_ne!(base_dir, manifest_dir, "base_dir and manifest_dir must differ");

        Self {
            base_dir,
            manifest_dir,
            slot_count: ARCHETYPE_SLOTS_COUNT_DEFAULT,
        }
    }

    /// Override the required slot count.
    ///
    /// # Panics
    /// Panics if `slot_count` is zero or exceeds `ARCHETYPE_SLOTS_COUNT_MAX`.
    #[must_use]
    pub fn with_slot_count(mut self, slot_count: usize) -> Self {
        assert!(slot_count > 0, "slot_count must be positive");
        assert!(
            slot_count <= ARCHETYPE_SLOTS_COUNT_MAX,
            "slot_count exceeds ARCHETYPE_SLOTS_COUNT_MAX"
        );
        self.slot_count = slot_count;
        self
    }
}

// =============================================================================
// Registry
// =============================================================================

enum RegistryEntry {
    Loaded(Arc<AdapterChain>),
    /// Persisted manifest exists but failed load-time validation. Kept so
    /// resolution reports the real problem instead of a miss, and so a
    /// repairing re-registration must still supersede the stored version.
    Invalid { version: u32, reason: String },
}

struct RegistryState {
    ready: bool,
    entries: HashMap<ArchetypeId, RegistryEntry>,
}

/// The adapter registry.
///
/// `registry_version` is a global monotonic counter bumped on every accepted
/// registration; coordinators use it to revalidate cached chains without
/// re-reading manifests.
pub struct AdapterRegistry {
    config: RegistryConfig,
    state: RwLock<RegistryState>,
    registry_version: AtomicU64,
}

impl AdapterRegistry {
    /// Create a registry. It is not resolvable until [`init`](Self::init)
    /// completes.
    #[must_use]
    pub fn new(config: RegistryConfig) -> Self {
        Self {
            config,
            state: RwLock::new(RegistryState {
                ready: false,
                entries: HashMap::new(),
            }),
            registry_version: AtomicU64::new(0),
        }
    }

    /// Load and validate all persisted manifests, then open the readiness
    /// gate. Runs exactly once.
    ///
    /// A manifest that fails validation does not abort startup: the archetype
    /// is marked invalid and resolution for it reports the failure, while
    /// healthy archetypes stay serviceable.
    ///
    /// # Errors
    /// Returns `AlreadyInitialized` on a second call, or `Io` if the manifest
    /// directory cannot be read or created.
    pub async fn init(&self) -> RegistryResult<()> {
        {
            let state = self.state.read().await;
            if state.ready {
                return Err(RegistryError::AlreadyInitialized);
            }
        }

        tokio::fs::create_dir_all(&self.config.manifest_dir)
            .await
            .map_err(|e| RegistryError::io(&e))?;

        let mut loaded: HashMap<ArchetypeId, RegistryEntry> = HashMap::new();
        let mut dir = tokio::fs::read_dir(&self.config.manifest_dir)
            .await
            .map_err(|e| RegistryError::io(&e))?;

        while let Some(entry) = dir.next_entry().await.map_err(|e| RegistryError::io(&e))? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            self.load_one(&path, &mut loaded).await?;
        }

        let count = loaded.len();
        {
            let mut state = self.state.write().await;
            // init must win the gate exactly once
            assert!(!state.ready, "readiness gate opened twice");
            state.entries = loaded;
            state.ready = true;
        }
        self.registry_version.fetch_add(1, Ordering::SeqCst);

        info!(archetypes = count, "adapter registry initialized");
        Ok(())
    }

    /// Whether `init()` has completed.
    pub async fn ready(&self) -> bool {
        self.state.read().await.ready
    }

    /// Current global registry version.
    ///
    /// Monotonic; bumped on init and on every accepted registration.
    #[must_use]
    pub fn version(&self) -> u64 {
        self.registry_version.load(Ordering::SeqCst)
    }

    /// Register (or supersede) the adapter chain for an archetype.
    ///
    /// Idempotent: re-registering a manifest with an identical digest returns
    /// the existing chain without touching storage. A different manifest must
    /// carry a strictly greater version or the call fails with `Conflict`.
    ///
    /// The manifest is persisted with write-then-atomic-replace before the
    /// in-memory table is updated, so a crash between the two leaves either
    /// the old or the new manifest on disk, never a torn one.
    ///
    /// Conflict check, persistence, and the table update happen under one
    /// write lock, so concurrent registrations for the same archetype
    /// serialize: the second sees the first's record and conflicts instead
    /// of silently superseding it.
    ///
    /// # Errors
    /// Returns `NotReady` before init, `Validation` for malformed chains,
    /// `Conflict` for non-superseding versions, or `Io` on persistence
    /// failure.
    pub async fn register(
        &self,
        archetype_id: &ArchetypeId,
        version: u32,
        slots: &[AdapterSlotSpec],
    ) -> RegistryResult<Arc<AdapterChain>> {
        // Precondition
        assert!(version > 0, "manifest version must be positive");

        if !self.ready().await {
            return Err(RegistryError::NotReady);
        }

        let manifest = self.build_manifest(archetype_id, version, slots).await?;
        let digest = manifest.digest();

        let mut state = self.state.write().await;
        if state.entries.len() >= REGISTRY_ARCHETYPES_COUNT_MAX
            && !state.entries.contains_key(archetype_id)
        {
            return Err(RegistryError::Full {
                max: REGISTRY_ARCHETYPES_COUNT_MAX,
            });
        }
        match state.entries.get(archetype_id) {
            Some(RegistryEntry::Loaded(existing)) => {
                if existing.manifest_digest == digest {
                    debug!(
                        archetype = %archetype_id,
                        version,
                        "identical manifest re-registered, no-op"
                    );
                    return Ok(Arc::clone(existing));
                }
                if version <= existing.manifest_version {
                    return Err(RegistryError::Conflict {
                        archetype: archetype_id.as_str().to_string(),
                        version,
                        existing_version: existing.manifest_version,
                    });
                }
            }
            Some(RegistryEntry::Invalid {
                version: existing_version,
                ..
            }) => {
                if version <= *existing_version {
                    return Err(RegistryError::Conflict {
                        archetype: archetype_id.as_str().to_string(),
                        version,
                        existing_version: *existing_version,
                    });
                }
            }
            None => {}
        }

        self.persist_manifest(archetype_id, &manifest).await?;

        let new_version = self.registry_version.fetch_add(1, Ordering::SeqCst) + 1;
        let chain = Arc::new(self.chain_from_manifest(&manifest, new_version)?);
        state
            .entries
            .insert(archetype_id.clone(), RegistryEntry::Loaded(Arc::clone(&chain)));
        drop(state);

        info!(
            archetype = %archetype_id,
            manifest_version = version,
            registry_version = new_version,
            "adapter chain registered"
        );
        Ok(chain)
    }

    /// Resolve the current adapter chain for an archetype.
    ///
    /// # Errors
    /// Returns `NotReady` before init, `NotFound` for unknown archetypes, or
    /// `Invalid` when the persisted manifest failed load-time validation.
    pub async fn resolve(&self, archetype_id: &ArchetypeId) -> RegistryResult<Arc<AdapterChain>> {
        let state = self.state.read().await;
        if !state.ready {
            return Err(RegistryError::NotReady);
        }
        match state.entries.get(archetype_id) {
            Some(RegistryEntry::Loaded(chain)) => Ok(Arc::clone(chain)),
            Some(RegistryEntry::Invalid { reason, .. }) => Err(RegistryError::Invalid {
                archetype: archetype_id.as_str().to_string(),
                reason: reason.clone(),
            }),
            None => Err(RegistryError::NotFound {
                archetype: archetype_id.as_str().to_string(),
            }),
        }
    }

    /// Registered archetype count (loaded and invalid entries both count).
    pub async fn archetype_count(&self) -> usize {
        self.state.read().await.entries.len()
    }

    // =========================================================================
    // Internals
    // =========================================================================

    /// Validate slots against the filesystem and assemble the manifest.
    async fn build_manifest(
        &self,
        archetype_id: &ArchetypeId,
        version: u32,
        slots: &[AdapterSlotSpec],
    ) -> RegistryResult<Manifest> {
        if slots.len() != self.config.slot_count {
            return Err(RegistryError::Validation(ValidationError::SlotCount {
                expected: self.config.slot_count,
                actual: slots.len(),
            }));
        }

        let mut adapters = Vec::with_capacity(slots.len());
        for spec in slots {
            let resolved = manifest::resolve_under_base(&self.config.base_dir, &spec.path)?;
            let actual_hash = hash_file(&resolved).await?;
            if let Some(expected) = &spec.content_hash {
                if *expected != actual_hash {
                    return Err(RegistryError::Validation(ValidationError::HashMismatch {
                        slot: spec.slot.clone(),
                        expected: expected.clone(),
                        actual: actual_hash,
                    }));
                }
            }
            adapters.push(ManifestAdapter {
                slot: spec.slot.clone(),
                path: spec.path.clone(),
                content_hash: actual_hash,
                adapter_version: spec.adapter_version,
            });
        }

        let manifest = Manifest {
            archetype_id: archetype_id.as_str().to_string(),
            version,
            adapters,
        };
        manifest.validate_shape(self.config.slot_count)?;
        Ok(manifest)
    }

    /// Build the resolvable chain from a validated manifest.
    fn chain_from_manifest(
        &self,
        manifest: &Manifest,
        registry_version: u64,
    ) -> RegistryResult<AdapterChain> {
        let archetype_id = ArchetypeId::new(&manifest.archetype_id).map_err(|e| {
            RegistryError::Validation(ValidationError::InvalidArchetypeId {
                reason: e.to_string(),
            })
        })?;

        let mut adapters = Vec::with_capacity(manifest.adapters.len());
        for entry in &manifest.adapters {
            let path = manifest::resolve_under_base(&self.config.base_dir, &entry.path)?;
            adapters.push(AdapterDescriptor {
                slot: entry.slot.clone(),
                path,
                content_hash: entry.content_hash.clone(),
                adapter_version: entry.adapter_version,
            });
        }

        // Postcondition
        assert_eq!(adapters.len(), self.config.slot_count);

        Ok(AdapterChain {
            archetype_id,
            manifest_version: manifest.version,
            manifest_digest: manifest.digest(),
            registry_version,
            adapters,
        })
    }

    /// Load and validate one persisted manifest file during init.
    async fn load_one(
        &self,
        path: &Path,
        loaded: &mut HashMap<ArchetypeId, RegistryEntry>,
    ) -> RegistryResult<()> {
        let bytes = tokio::fs::read(path).await.map_err(|e| RegistryError::io(&e))?;

        let manifest: Manifest = match serde_json::from_slice(&bytes) {
            Ok(m) => m,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "skipping unparseable manifest");
                return Ok(());
            }
        };

        let archetype_id = match ArchetypeId::new(&manifest.archetype_id) {
            Ok(id) => id,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "skipping manifest with bad archetype id");
                return Ok(());
            }
        };

        if let Err(e) = self.verify_manifest(&manifest).await {
            warn!(
                archetype = %archetype_id,
                error = %e,
                "persisted manifest failed validation, marking invalid"
            );
            loaded.insert(
                archetype_id,
                RegistryEntry::Invalid {
                    version: manifest.version,
                    reason: e.to_string(),
                },
            );
            return Ok(());
        }

        // registry_version is bumped once after the whole load pass
        let chain = Arc::new(self.chain_from_manifest(&manifest, self.version() + 1)?);
        debug!(
            archetype = %archetype_id,
            manifest_version = manifest.version,
            "loaded persisted adapter chain"
        );
        loaded.insert(archetype_id, RegistryEntry::Loaded(chain));
        Ok(())
    }

    /// Full validation of a persisted manifest: shape plus content hashes
    /// recomputed from the adapter files.
    async fn verify_manifest(&self, manifest: &Manifest) -> Result<(), ValidationError> {
        manifest.validate_shape(self.config.slot_count)?;
        for entry in &manifest.adapters {
            let resolved = manifest::resolve_under_base(&self.config.base_dir, &entry.path)?;
            let actual = hash_file(&resolved).await?;
            if actual != entry.content_hash {
                return Err(ValidationError::HashMismatch {
                    slot: entry.slot.clone(),
                    expected: entry.content_hash.clone(),
                    actual,
                });
            }
        }
        Ok(())
    }

    /// Persist a manifest with write-then-atomic-replace.
    async fn persist_manifest(
        &self,
        archetype_id: &ArchetypeId,
        manifest: &Manifest,
    ) -> RegistryResult<()> {
        let final_path = self.manifest_path(archetype_id);
        let tmp_path = final_path.with_extension("json.tmp");

        let bytes = serde_json::to_vec_pretty(manifest).map_err(|e| RegistryError::Io {
            message: e.to_string(),
        })?;

        let mut file = tokio::fs::File::create(&tmp_path)
            .await
            .map_err(|e| RegistryError::io(&e))?;
        tokio::io::AsyncWriteExt::write_all(&mut file, &bytes)
            .await
            .map_err(|e| RegistryError::io(&e))?;
        file.sync_all().await.map_err(|e| RegistryError::io(&e))?;
        drop(file);

        tokio::fs::rename(&tmp_path, &final_path)
            .await
            .map_err(|e| RegistryError::io(&e))?;
        Ok(())
    }

    /// Manifest filename for an archetype. Archetype ids are not constrained
    /// to filesystem-safe characters, so the filename is the id's hash; the
    /// id itself is recovered from the manifest contents at load time.
    fn manifest_path(&self, archetype_id: &ArchetypeId) -> PathBuf {
        let name = hex_sha256(archetype_id.as_str().as_bytes());
        self.config.manifest_dir.join(format!("{name}.json"))
    }
}

async fn hash_file(path: &Path) -> Result<String, ValidationError> {
    let bytes = tokio::fs::read(path)
        .await
        .map_err(|e| ValidationError::AdapterUnreadable {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;
    Ok(hex_sha256(&bytes))
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn setup() -> (tempfile::TempDir, AdapterRegistry) {
        let dir = tempfile::tempdir().unwrap();
        let base_dir = dir.path().join("adapters");
        let manifest_dir = dir.path().join("manifests");
        tokio::fs::create_dir_all(&base_dir).await.unwrap();

        let registry =
            AdapterRegistry::new(RegistryConfig::new(base_dir, manifest_dir).with_slot_count(2));
        (dir, registry)
    }

    async fn write_adapter(dir: &tempfile::TempDir, rel: &str, contents: &[u8]) {
        let path = dir.path().join("adapters").join(rel);
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await.unwrap();
        }
        tokio::fs::write(path, contents).await.unwrap();
    }

    fn slots() -> Vec<AdapterSlotSpec> {
        vec![
            AdapterSlotSpec::new("personality", "vampire/personality.bin", 1),
            AdapterSlotSpec::new("dialogue", "vampire/dialogue.bin", 1),
        ]
    }

    async fn seeded_registry() -> (tempfile::TempDir, AdapterRegistry) {
        let (dir, registry) = setup().await;
        write_adapter(&dir, "vampire/personality.bin", b"personality-weights").await;
        write_adapter(&dir, "vampire/dialogue.bin", b"dialogue-weights").await;
        registry.init().await.unwrap();
        (dir, registry)
    }

    #[tokio::test]
    async fn test_resolve_before_init_fails() {
        let (_dir, registry) = setup().await;
        let archetype = ArchetypeId::new("vampire").unwrap();
        assert!(matches!(
            registry.resolve(&archetype).await,
            Err(RegistryError::NotReady)
        ));
    }

    #[tokio::test]
    async fn test_register_before_init_fails() {
        let (_dir, registry) = setup().await;
        let archetype = ArchetypeId::new("vampire").unwrap();
        assert!(matches!(
            registry.register(&archetype, 1, &slots()).await,
            Err(RegistryError::NotReady)
        ));
    }

    #[tokio::test]
    async fn test_init_twice_fails() {
        let (_dir, registry) = setup().await;
        registry.init().await.unwrap();
        assert!(matches!(
            registry.init().await,
            Err(RegistryError::AlreadyInitialized)
        ));
    }

    #[tokio::test]
    async fn test_register_and_resolve() {
        let (_dir, registry) = seeded_registry().await;
        let archetype = ArchetypeId::new("vampire").unwrap();

        let chain = registry.register(&archetype, 1, &slots()).await.unwrap();
        assert_eq!(chain.slot_count(), 2);
        assert_eq!(chain.manifest_version, 1);
        assert!(chain.adapter("personality").is_some());

        let resolved = registry.resolve(&archetype).await.unwrap();
        assert!(Arc::ptr_eq(&chain, &resolved));
    }

    #[tokio::test]
    async fn test_identical_reregistration_is_noop() {
        let (_dir, registry) = seeded_registry().await;
        let archetype = ArchetypeId::new("vampire").unwrap();

        let first = registry.register(&archetype, 1, &slots()).await.unwrap();
        let version_after_first = registry.version();
        let second = registry.register(&archetype, 1, &slots()).await.unwrap();

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(registry.version(), version_after_first);
    }

    #[tokio::test]
    async fn test_changed_content_without_version_bump_conflicts() {
        let (dir, registry) = seeded_registry().await;
        let archetype = ArchetypeId::new("vampire").unwrap();
        registry.register(&archetype, 1, &slots()).await.unwrap();

        write_adapter(&dir, "vampire/dialogue.bin", b"retrained-dialogue").await;
        assert!(matches!(
            registry.register(&archetype, 1, &slots()).await,
            Err(RegistryError::Conflict { .. })
        ));

        // Version bump makes the same change acceptable
        let chain = registry.register(&archetype, 2, &slots()).await.unwrap();
        assert_eq!(chain.manifest_version, 2);
    }

    #[tokio::test]
    async fn test_version_downgrade_conflicts() {
        let (_dir, registry) = seeded_registry().await;
        let archetype = ArchetypeId::new("vampire").unwrap();
        registry.register(&archetype, 3, &slots()).await.unwrap();

        let mut changed = slots();
        changed[0].adapter_version = 2;
        assert!(matches!(
            registry.register(&archetype, 2, &changed).await,
            Err(RegistryError::Conflict { existing_version: 3, .. })
        ));
    }

    #[tokio::test]
    async fn test_wrong_slot_count_rejected() {
        let (_dir, registry) = seeded_registry().await;
        let archetype = ArchetypeId::new("vampire").unwrap();

        let short = vec![AdapterSlotSpec::new("personality", "vampire/personality.bin", 1)];
        assert!(matches!(
            registry.register(&archetype, 1, &short).await,
            Err(RegistryError::Validation(ValidationError::SlotCount { .. }))
        ));
    }

    #[tokio::test]
    async fn test_traversal_path_rejected() {
        let (_dir, registry) = seeded_registry().await;
        let archetype = ArchetypeId::new("vampire").unwrap();

        let hostile = vec![
            AdapterSlotSpec::new("personality", "../outside.bin", 1),
            AdapterSlotSpec::new("dialogue", "vampire/dialogue.bin", 1),
        ];
        assert!(matches!(
            registry.register(&archetype, 1, &hostile).await,
            Err(RegistryError::Validation(ValidationError::PathUnsafe { .. }))
        ));
    }

    #[tokio::test]
    async fn test_supplied_hash_verified() {
        let (_dir, registry) = seeded_registry().await;
        let archetype = ArchetypeId::new("vampire").unwrap();

        let mut specs = slots();
        specs[0] = specs[0].clone().with_content_hash(hex_sha256(b"wrong-bytes"));
        assert!(matches!(
            registry.register(&archetype, 1, &specs).await,
            Err(RegistryError::Validation(ValidationError::HashMismatch { .. }))
        ));

        let mut ok = slots();
        ok[0] = ok[0].clone().with_content_hash(hex_sha256(b"personality-weights"));
        assert!(registry.register(&archetype, 1, &ok).await.is_ok());
    }

    #[tokio::test]
    async fn test_missing_adapter_file_rejected() {
        let (_dir, registry) = seeded_registry().await;
        let archetype = ArchetypeId::new("vampire").unwrap();

        let missing = vec![
            AdapterSlotSpec::new("personality", "vampire/personality.bin", 1),
            AdapterSlotSpec::new("dialogue", "vampire/nonexistent.bin", 1),
        ];
        assert!(matches!(
            registry.register(&archetype, 1, &missing).await,
            Err(RegistryError::Validation(ValidationError::AdapterUnreadable { .. }))
        ));
    }

    #[tokio::test]
    async fn test_persisted_manifests_reload() {
        let dir = tempfile::tempdir().unwrap();
        let base_dir = dir.path().join("adapters");
        let manifest_dir = dir.path().join("manifests");
        tokio::fs::create_dir_all(&base_dir).await.unwrap();
        tokio::fs::write(base_dir.join("p.bin"), b"p").await.unwrap();
        tokio::fs::write(base_dir.join("d.bin"), b"d").await.unwrap();

        let archetype = ArchetypeId::new("vampire").unwrap();
        let specs = vec![
            AdapterSlotSpec::new("personality", "p.bin", 2),
            AdapterSlotSpec::new("dialogue", "d.bin", 1),
        ];

        let config =
            RegistryConfig::new(base_dir.clone(), manifest_dir.clone()).with_slot_count(2);
        {
            let registry = AdapterRegistry::new(config.clone());
            registry.init().await.unwrap();
            registry.register(&archetype, 5, &specs).await.unwrap();
        }

        // Fresh registry over the same directories sees the chain after init
        let registry = AdapterRegistry::new(config);
        registry.init().await.unwrap();
        let chain = registry.resolve(&archetype).await.unwrap();
        assert_eq!(chain.manifest_version, 5);
        assert_eq!(chain.adapter("personality").unwrap().adapter_version, 2);
    }

    #[tokio::test]
    async fn test_tampered_adapter_detected_at_load() {
        let dir = tempfile::tempdir().unwrap();
        let base_dir = dir.path().join("adapters");
        let manifest_dir = dir.path().join("manifests");
        tokio::fs::create_dir_all(&base_dir).await.unwrap();
        tokio::fs::write(base_dir.join("p.bin"), b"p").await.unwrap();
        tokio::fs::write(base_dir.join("d.bin"), b"d").await.unwrap();

        let archetype = ArchetypeId::new("vampire").unwrap();
        let specs = vec![
            AdapterSlotSpec::new("personality", "p.bin", 1),
            AdapterSlotSpec::new("dialogue", "d.bin", 1),
        ];
        let config =
            RegistryConfig::new(base_dir.clone(), manifest_dir.clone()).with_slot_count(2);
        {
            let registry = AdapterRegistry::new(config.clone());
            registry.init().await.unwrap();
            registry.register(&archetype, 1, &specs).await.unwrap();
        }

        // Adapter file modified behind the registry's back
        tokio::fs::write(base_dir.join("p.bin"), b"tampered").await.unwrap();

        let registry = AdapterRegistry::new(config);
        registry.init().await.unwrap();
        assert!(matches!(
            registry.resolve(&archetype).await,
            Err(RegistryError::Invalid { .. })
        ));

        // A superseding registration repairs the entry
        let repaired = registry.register(&archetype, 2, &specs).await.unwrap();
        assert_eq!(repaired.manifest_version, 2);
        assert!(registry.resolve(&archetype).await.is_ok());
    }

    #[tokio::test]
    async fn test_concurrent_same_version_registrations_conflict() {
        let (_dir, registry) = seeded_registry().await;
        let registry = Arc::new(registry);
        let archetype = ArchetypeId::new("vampire").unwrap();

        // Same manifest version, different content: at most one may land
        let mut changed = slots();
        changed[0].adapter_version = 2;

        let a = {
            let registry = Arc::clone(&registry);
            let archetype = archetype.clone();
            let specs = slots();
            tokio::spawn(async move { registry.register(&archetype, 1, &specs).await })
        };
        let b = {
            let registry = Arc::clone(&registry);
            let archetype = archetype.clone();
            tokio::spawn(async move { registry.register(&archetype, 1, &changed).await })
        };

        let results = [a.await.unwrap(), b.await.unwrap()];
        let ok_count = results.iter().filter(|r| r.is_ok()).count();
        assert_eq!(ok_count, 1);
        assert!(results
            .iter()
            .any(|r| matches!(r, Err(RegistryError::Conflict { existing_version: 1, .. }))));

        // The surviving record resolves and matches the winner's digest
        let resolved = registry.resolve(&archetype).await.unwrap();
        let winner = results.iter().find_map(|r| r.as_ref().ok()).unwrap();
        assert_eq!(resolved.manifest_digest, winner.manifest_digest);
    }

    #[tokio::test]
    async fn test_registry_version_monotonic() {
        let (_dir, registry) = seeded_registry().await;
        let v0 = registry.version();
        let archetype = ArchetypeId::new("vampire").unwrap();
        registry.register(&archetype, 1, &slots()).await.unwrap();
        assert!(registry.version() > v0);
    }
}
