//! Blob storage: opaque byte payloads addressed by independent references.
//!
//! The artifact store never touches bytes directly. It creates, reads, replaces
//! and deletes blobs through the [`BlobBackend`] trait, and each version or
//! staging slot of an artifact owns exactly one [`BlobRef`].

pub mod fs;
pub mod memory;

pub use fs::FsBlobBackend;
pub use memory::MemoryBlobBackend;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Opaque reference to a blob held by a backend.
///
/// References are random 128-bit identifiers rendered as lowercase hex, so two
/// blobs with identical contents still get distinct references.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BlobRef(String);

impl BlobRef {
    /// Generate a fresh random reference.
    pub fn generate() -> Self {
        Self(format!("{:032x}", rand::random::<u128>()))
    }

    /// Wrap an existing reference string (e.g. one read back from a record).
    pub fn from_string(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// True if the reference has the shape produced by [`BlobRef::generate`].
    pub fn is_well_formed(&self) -> bool {
        self.0.len() == 32 && self.0.bytes().all(|b| b.is_ascii_hexdigit())
    }
}

impl fmt::Display for BlobRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Errors raised by blob backends.
#[derive(Debug, Error)]
pub enum BlobError {
    #[error("blob not found: {0}")]
    NotFound(BlobRef),

    #[error("invalid blob reference: {0}")]
    InvalidRef(String),

    #[error("blob {blob} failed integrity check: {reason}")]
    Integrity { blob: BlobRef, reason: String },

    #[error("blob metadata error: {0}")]
    Metadata(String),

    #[error("blob I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Durable key→bytes storage.
///
/// Implementations must hand out an independent reference for every `create`
/// call, and `created_at` reports when the blob's current contents were
/// written (a `replace` resets it).
pub trait BlobBackend: Send + Sync {
    /// Store `bytes` as a new blob and return its reference.
    fn create(&self, bytes: &[u8]) -> Result<BlobRef, BlobError>;

    /// Read a blob's full contents.
    fn read(&self, blob: &BlobRef) -> Result<Vec<u8>, BlobError>;

    /// Overwrite an existing blob's contents.
    fn replace(&self, blob: &BlobRef, bytes: &[u8]) -> Result<(), BlobError>;

    /// Delete a blob. Deleting a missing blob is `NotFound`.
    fn delete(&self, blob: &BlobRef) -> Result<(), BlobError>;

    /// When the blob's current contents were written.
    fn created_at(&self, blob: &BlobRef) -> Result<DateTime<Utc>, BlobError>;

    /// Whether the blob exists.
    fn exists(&self, blob: &BlobRef) -> bool;
}

/// Sidecar metadata kept next to every stored blob.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlobMeta {
    pub created_at: DateTime<Utc>,
    pub size: u64,
    /// BLAKE3 hex digest of the contents.
    pub hash: String,
}

impl BlobMeta {
    pub fn describe(bytes: &[u8]) -> Self {
        Self {
            created_at: Utc::now(),
            size: bytes.len() as u64,
            hash: blake3::hash(bytes).to_hex().to_string(),
        }
    }

    /// Check `bytes` against the recorded size and digest.
    pub fn verify(&self, blob: &BlobRef, bytes: &[u8]) -> Result<(), BlobError> {
        if bytes.len() as u64 != self.size {
            return Err(BlobError::Integrity {
                blob: blob.clone(),
                reason: format!("expected {} bytes, found {}", self.size, bytes.len()),
            });
        }
        let actual = blake3::hash(bytes).to_hex().to_string();
        if actual != self.hash {
            return Err(BlobError::Integrity {
                blob: blob.clone(),
                reason: "content hash mismatch".into(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_refs_are_distinct_and_well_formed() {
        let a = BlobRef::generate();
        let b = BlobRef::generate();
        assert_ne!(a, b);
        assert!(a.is_well_formed());
        assert!(!BlobRef::from_string("../etc/passwd").is_well_formed());
    }

    #[test]
    fn meta_detects_tampering() {
        let blob = BlobRef::generate();
        let meta = BlobMeta::describe(b"hello");
        assert!(meta.verify(&blob, b"hello").is_ok());
        assert!(matches!(
            meta.verify(&blob, b"hellO"),
            Err(BlobError::Integrity { .. })
        ));
        assert!(matches!(
            meta.verify(&blob, b"hello!"),
            Err(BlobError::Integrity { .. })
        ));
    }
}
