//! In-memory blob backend, for tests and embedded use.
//!
//! Supports arming one-shot failures per operation so callers can exercise
//! the store's failure paths without a real disk.

use super::{BlobBackend, BlobError, BlobMeta, BlobRef};
use chrono::{DateTime, Utc};
use std::collections::{HashMap, HashSet};
use std::io;
use std::sync::Mutex;

/// A backend operation that can be armed to fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BlobOp {
    Create,
    Read,
    Replace,
    Delete,
}

#[derive(Debug)]
struct StoredBlob {
    bytes: Vec<u8>,
    meta: BlobMeta,
}

#[derive(Debug, Default)]
pub struct MemoryBlobBackend {
    blobs: Mutex<HashMap<BlobRef, StoredBlob>>,
    armed: Mutex<HashSet<BlobOp>>,
}

impl MemoryBlobBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next call of `op` fail with an I/O error.
    pub fn fail_next(&self, op: BlobOp) {
        self.armed
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(op);
    }

    /// Drop every armed failure that has not fired yet.
    pub fn disarm_all(&self) {
        self.armed.lock().unwrap_or_else(|e| e.into_inner()).clear();
    }

    /// Number of blobs currently held.
    pub fn len(&self) -> usize {
        self.blobs.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn check_armed(&self, op: BlobOp) -> Result<(), BlobError> {
        let mut armed = self.armed.lock().unwrap_or_else(|e| e.into_inner());
        if armed.remove(&op) {
            return Err(BlobError::Io(io::Error::new(
                io::ErrorKind::Other,
                format!("injected {op:?} failure"),
            )));
        }
        Ok(())
    }
}

impl BlobBackend for MemoryBlobBackend {
    fn create(&self, bytes: &[u8]) -> Result<BlobRef, BlobError> {
        self.check_armed(BlobOp::Create)?;
        let mut blobs = self.blobs.lock().unwrap_or_else(|e| e.into_inner());
        let mut blob = BlobRef::generate();
        while blobs.contains_key(&blob) {
            blob = BlobRef::generate();
        }
        blobs.insert(
            blob.clone(),
            StoredBlob {
                bytes: bytes.to_vec(),
                meta: BlobMeta::describe(bytes),
            },
        );
        Ok(blob)
    }

    fn read(&self, blob: &BlobRef) -> Result<Vec<u8>, BlobError> {
        self.check_armed(BlobOp::Read)?;
        let blobs = self.blobs.lock().unwrap_or_else(|e| e.into_inner());
        let stored = blobs
            .get(blob)
            .ok_or_else(|| BlobError::NotFound(blob.clone()))?;
        stored.meta.verify(blob, &stored.bytes)?;
        Ok(stored.bytes.clone())
    }

    fn replace(&self, blob: &BlobRef, bytes: &[u8]) -> Result<(), BlobError> {
        self.check_armed(BlobOp::Replace)?;
        let mut blobs = self.blobs.lock().unwrap_or_else(|e| e.into_inner());
        let stored = blobs
            .get_mut(blob)
            .ok_or_else(|| BlobError::NotFound(blob.clone()))?;
        stored.bytes = bytes.to_vec();
        stored.meta = BlobMeta::describe(bytes);
        Ok(())
    }

    fn delete(&self, blob: &BlobRef) -> Result<(), BlobError> {
        self.check_armed(BlobOp::Delete)?;
        let mut blobs = self.blobs.lock().unwrap_or_else(|e| e.into_inner());
        blobs
            .remove(blob)
            .map(|_| ())
            .ok_or_else(|| BlobError::NotFound(blob.clone()))
    }

    fn created_at(&self, blob: &BlobRef) -> Result<DateTime<Utc>, BlobError> {
        let blobs = self.blobs.lock().unwrap_or_else(|e| e.into_inner());
        blobs
            .get(blob)
            .map(|stored| stored.meta.created_at)
            .ok_or_else(|| BlobError::NotFound(blob.clone()))
    }

    fn exists(&self, blob: &BlobRef) -> bool {
        self.blobs
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .contains_key(blob)
    }
}
