//! Adapter Manifests
//!
//! `TigerStyle`: Explicit validation before any filesystem access. A manifest
//! is the persisted record of one archetype's adapter chain; readers must
//! never observe a partially written or tampered one.

use std::path::{Component, Path, PathBuf};

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::constants::{
    ADAPTER_CONTENT_HASH_BYTES, ADAPTER_PATH_BYTES_MAX, ADAPTER_SLOT_NAME_BYTES_MAX,
    ARCHETYPE_SLOTS_COUNT_MAX,
};

// =============================================================================
// Error Types
// =============================================================================

/// Validation failures for manifests and adapter descriptors.
///
/// Rejected at registration or load time, never silently accepted.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ValidationError {
    /// Wrong number of adapter slots
    #[error("slot count mismatch: expected {expected}, got {actual}")]
    SlotCount {
        /// Configured chain length
        expected: usize,
        /// Supplied chain length
        actual: usize,
    },

    /// Slot name appears more than once
    #[error("duplicate slot name: {slot}")]
    DuplicateSlot {
        /// The repeated slot name
        slot: String,
    },

    /// Slot name is empty or too long
    #[error("invalid slot name: {reason}")]
    InvalidSlotName {
        /// Why the name was rejected
        reason: String,
    },

    /// Manifest carries a malformed archetype identifier
    #[error("invalid archetype id: {reason}")]
    InvalidArchetypeId {
        /// Why the identifier was rejected
        reason: String,
    },

    /// Adapter path escapes the base directory or is otherwise unsafe
    #[error("unsafe adapter path {path:?}: {reason}")]
    PathUnsafe {
        /// The offending path
        path: String,
        /// Why it was rejected
        reason: String,
    },

    /// Stored or supplied hash does not match the adapter file contents
    #[error("content hash mismatch for slot {slot}: expected {expected}, got {actual}")]
    HashMismatch {
        /// Slot whose adapter failed verification
        slot: String,
        /// Hash on record
        expected: String,
        /// Hash computed from the file
        actual: String,
    },

    /// Adapter file could not be read
    #[error("adapter unreadable at {path:?}: {message}")]
    AdapterUnreadable {
        /// Resolved adapter path
        path: String,
        /// Underlying error
        message: String,
    },
}

// =============================================================================
// Descriptor Types
// =============================================================================

/// Caller-supplied adapter slot specification for registration.
///
/// The registry computes the content hash from the file under the base
/// directory; a caller-supplied `content_hash` is verified against it.
#[derive(Debug, Clone)]
pub struct AdapterSlotSpec {
    /// Slot name (e.g. "personality", "dialogue_style")
    pub slot: String,
    /// Path relative to the configured base directory
    pub path: String,
    /// Adapter version
    pub adapter_version: u32,
    /// Expected content hash, verified when present
    pub content_hash: Option<String>,
}

impl AdapterSlotSpec {
    /// Create a spec without an expected hash.
    #[must_use]
    pub fn new(slot: impl Into<String>, path: impl Into<String>, adapter_version: u32) -> Self {
        Self {
            slot: slot.into(),
            path: path.into(),
            adapter_version,
            content_hash: None,
        }
    }

    /// Attach an expected content hash to verify at registration.
    #[must_use]
    pub fn with_content_hash(mut self, hash: impl Into<String>) -> Self {
        self.content_hash = Some(hash.into());
        self
    }
}

/// One adapter entry inside a persisted manifest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestAdapter {
    /// Slot name
    pub slot: String,
    /// Path relative to the base directory
    pub path: String,
    /// Hex-encoded sha256 of the adapter file contents
    pub content_hash: String,
    /// Adapter version
    pub adapter_version: u32,
}

/// Persisted manifest for one archetype: the ordered adapter chain.
///
/// The digest covers the whole manifest (version included), so an identical
/// re-registration is detected as a no-op and any content change requires an
/// explicit version bump to produce an acceptable manifest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Manifest {
    /// Archetype this chain belongs to
    pub archetype_id: String,
    /// Manifest version; bumped explicitly on content changes
    pub version: u32,
    /// Ordered adapter entries; slot order is fixed at registration
    pub adapters: Vec<ManifestAdapter>,
}

impl Manifest {
    /// Canonical digest of this manifest (hex sha256 over its JSON form).
    ///
    /// # Panics
    /// Never panics: the manifest contains only serializable fields.
    #[must_use]
    pub fn digest(&self) -> String {
        let bytes = serde_json::to_vec(self).unwrap_or_default();
        hex_sha256(&bytes)
    }

    /// Structural validation: slot count, slot names, path shape.
    ///
    /// Filesystem-dependent checks (hash verification) happen separately.
    ///
    /// # Errors
    /// Returns the first validation failure found.
    pub fn validate_shape(&self, expected_slots: usize) -> Result<(), ValidationError> {
        // Precondition
        assert!(
            expected_slots <= ARCHETYPE_SLOTS_COUNT_MAX,
            "expected_slots exceeds ARCHETYPE_SLOTS_COUNT_MAX"
        );

        if self.adapters.len() != expected_slots {
            return Err(ValidationError::SlotCount {
                expected: expected_slots,
                actual: self.adapters.len(),
            });
        }

        let mut seen: Vec<&str> = Vec::with_capacity(self.adapters.len());
        for adapter in &self.adapters {
            validate_slot_name(&adapter.slot)?;
            if seen.contains(&adapter.slot.as_str()) {
                return Err(ValidationError::DuplicateSlot {
                    slot: adapter.slot.clone(),
                });
            }
            seen.push(&adapter.slot);
            validate_relative_path(&adapter.path)?;
        }
        Ok(())
    }
}

// =============================================================================
// Validation Helpers
// =============================================================================

fn validate_slot_name(slot: &str) -> Result<(), ValidationError> {
    if slot.is_empty() {
        return Err(ValidationError::InvalidSlotName {
            reason: "slot name is empty".to_string(),
        });
    }
    if slot.len() > ADAPTER_SLOT_NAME_BYTES_MAX {
        return Err(ValidationError::InvalidSlotName {
            reason: format!(
                "slot name {} bytes exceeds max {ADAPTER_SLOT_NAME_BYTES_MAX}",
                slot.len()
            ),
        });
    }
    Ok(())
}

/// Lexical path safety: relative, bounded, no parent or root components.
///
/// Checked before touching the filesystem so a hostile path is rejected even
/// when nothing exists at it.
fn validate_relative_path(path: &str) -> Result<(), ValidationError> {
    if path.is_empty() {
        return Err(ValidationError::PathUnsafe {
            path: path.to_string(),
            reason: "path is empty".to_string(),
        });
    }
    if path.len() > ADAPTER_PATH_BYTES_MAX {
        return Err(ValidationError::PathUnsafe {
            path: path.to_string(),
            reason: format!("path {} bytes exceeds max {ADAPTER_PATH_BYTES_MAX}", path.len()),
        });
    }

    let p = Path::new(path);
    if p.is_absolute() {
        return Err(ValidationError::PathUnsafe {
            path: path.to_string(),
            reason: "absolute paths are not allowed".to_string(),
        });
    }
    for component in p.components() {
        match component {
            Component::Normal(_) | Component::CurDir => {}
            Component::ParentDir => {
                return Err(ValidationError::PathUnsafe {
                    path: path.to_string(),
                    reason: "parent directory traversal is not allowed".to_string(),
                });
            }
            Component::RootDir | Component::Prefix(_) => {
                return Err(ValidationError::PathUnsafe {
                    path: path.to_string(),
                    reason: "rooted paths are not allowed".to_string(),
                });
            }
        }
    }
    Ok(())
}

/// Resolve a validated relative path under the base directory.
///
/// # Errors
/// Returns `PathUnsafe` if the path fails lexical validation.
pub fn resolve_under_base(base_dir: &Path, rel: &str) -> Result<PathBuf, ValidationError> {
    validate_relative_path(rel)?;
    let resolved = base_dir.join(rel);

    // Postcondition: lexical containment held by construction
    assert!(
        resolved.starts_with(base_dir),
        "resolved path escaped base directory"
    );
    Ok(resolved)
}

/// Hex-encoded sha256 of a byte slice.
#[must_use]
pub fn hex_sha256(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    let digest = hasher.finalize();
    let hex: String = digest.iter().map(|b| format!("{b:02x}")).collect();

    // Postcondition
    assert_eq!(hex.len(), ADAPTER_CONTENT_HASH_BYTES);
    hex
}
