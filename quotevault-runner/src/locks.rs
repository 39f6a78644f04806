//! Per-artifact mutual exclusion.
//!
//! The store assumes a single writer per artifact name. Callers that refresh
//! from several threads share one `ArtifactLocks` and hold the name's lock
//! across the whole check → fetch → write span.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

#[derive(Debug, Default)]
pub struct ArtifactLocks {
    registry: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl ArtifactLocks {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock_for(&self, name: &str) -> Arc<Mutex<()>> {
        let mut registry = self.registry.lock().unwrap_or_else(|e| e.into_inner());
        registry
            .entry(name.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Run `f` while holding the lock for `name`. Different names never block
    /// each other.
    pub fn with_lock<R>(&self, name: &str, f: impl FnOnce() -> R) -> R {
        let lock = self.lock_for(name);
        let _guard = lock.lock().unwrap_or_else(|e| e.into_inner());
        f()
    }

    /// Number of names that have ever been locked.
    pub fn len(&self) -> usize {
        self.registry.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
