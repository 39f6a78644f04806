//! Versioned artifact store.
//!
//! An artifact is a named record holding labeled versions, each pointing at a
//! committed blob. Writes never overwrite committed data in place:
//!
//! 1. **stage-write** — the payload becomes a fresh blob in `staging[label]`
//! 2. **commit-replace** — staged bytes are copied into the committed slot
//! 3. **staging-cleanup** — the staged blob is deleted
//!
//! The record is saved after step 1 and again after step 2, so a crash leaves
//! either the old committed version plus a staging entry (reconciled on the
//! next read) or the new committed version plus an orphaned staged blob.
//! Readers only ever see a fully staged payload.

pub mod error;
pub mod migrate;
pub mod record;
pub mod repo;

pub use error::{StoreError, WriteStep};
pub use record::{Artifact, Notes, Parameters, CURRENT_SCHEMA_VERSION, DEFAULT_VERSION};
pub use repo::{FsRecordRepository, MemoryRecordRepository, RecordError, RecordRepository};

use crate::blob::{BlobBackend, BlobError, BlobRef, FsBlobBackend, MemoryBlobBackend};
use chrono::{DateTime, Utc};
use std::io;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, warn};

/// The artifact store: records in a [`RecordRepository`], bytes in a [`BlobBackend`].
#[derive(Clone)]
pub struct ArtifactStore {
    blobs: Arc<dyn BlobBackend>,
    records: Arc<dyn RecordRepository>,
}

impl ArtifactStore {
    pub fn new(blobs: Arc<dyn BlobBackend>, records: Arc<dyn RecordRepository>) -> Self {
        Self { blobs, records }
    }

    /// Filesystem store rooted at `root`: blobs in `{root}/blobs`, records in
    /// `{root}/artifacts`.
    pub fn open(root: impl AsRef<Path>) -> io::Result<Self> {
        let root = root.as_ref();
        let blobs = FsBlobBackend::open(root.join("blobs"))?;
        let records = FsRecordRepository::open(root.join("artifacts"))?;
        Ok(Self::new(Arc::new(blobs), Arc::new(records)))
    }

    /// Volatile store, for tests and scratch work.
    pub fn in_memory() -> Self {
        Self::new(
            Arc::new(MemoryBlobBackend::new()),
            Arc::new(MemoryRecordRepository::new()),
        )
    }

    pub fn blobs(&self) -> &dyn BlobBackend {
        self.blobs.as_ref()
    }

    // ── Lookup ──────────────────────────────────────────────────────

    /// Existing artifact by name, or a newly persisted empty one.
    pub fn get_or_create(&self, name: &str) -> Result<Artifact, StoreError> {
        if let Some(artifact) = self.records.load(name).map_err(record_err)? {
            return Ok(artifact);
        }
        let artifact = Artifact::new(name);
        match self.records.insert(&artifact) {
            Ok(()) => {
                debug!(artifact = name, "created artifact");
                Ok(artifact)
            }
            // Created by someone else between load and insert.
            Err(RecordError::Duplicate(_)) => self.get(name),
            Err(e) => Err(record_err(e)),
        }
    }

    /// Create a new artifact; `NameTaken` if one already exists.
    pub fn create(&self, name: &str) -> Result<Artifact, StoreError> {
        let artifact = Artifact::new(name);
        self.records.insert(&artifact).map_err(record_err)?;
        debug!(artifact = name, "created artifact");
        Ok(artifact)
    }

    /// Existing artifact by name; `NoSuchArtifact` if absent.
    pub fn get(&self, name: &str) -> Result<Artifact, StoreError> {
        self.records
            .load(name)
            .map_err(record_err)?
            .ok_or_else(|| StoreError::NoSuchArtifact(name.to_string()))
    }

    /// All artifact names, sorted.
    pub fn list(&self) -> Result<Vec<String>, StoreError> {
        self.records.names().map_err(record_err)
    }

    /// Names of artifacts holding staged writes that were never transferred.
    pub fn pending_staging(&self) -> Result<Vec<String>, StoreError> {
        let mut pending = Vec::new();
        for name in self.list()? {
            if self.get(&name)?.has_pending_staging() {
                pending.push(name);
            }
        }
        Ok(pending)
    }

    // ── Data path ───────────────────────────────────────────────────

    /// Committed payload for `version` (default label when `None`).
    ///
    /// A pending staged write for that label is transferred first. Returns
    /// `None` when the label has no committed data.
    pub fn read_data(
        &self,
        artifact: &mut Artifact,
        version: Option<&str>,
    ) -> Result<Option<Vec<u8>>, StoreError> {
        let label = artifact.resolve_version(version).to_string();
        if artifact.staging.contains_key(&label) {
            self.transfer(artifact, Some(&label))?;
        }

        let Some(blob) = artifact.versions.get(&label) else {
            return Ok(None);
        };
        match self.blobs.read(blob) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(BlobError::Integrity { reason, .. }) => Err(StoreError::CorruptArtifact {
                name: artifact.name.clone(),
                version: label,
                reason,
            }),
            Err(BlobError::NotFound(blob)) => Err(StoreError::CorruptArtifact {
                name: artifact.name.clone(),
                version: label,
                reason: format!("committed blob {blob} is missing from the backend"),
            }),
            Err(source) => Err(io_error(WriteStep::Read, artifact, &label, source)),
        }
    }

    /// Write `payload` as the new committed data for `version`.
    ///
    /// `None` or an empty payload clears every version of the artifact
    /// instead of writing.
    pub fn write_data(
        &self,
        artifact: &mut Artifact,
        payload: Option<&[u8]>,
        version: Option<&str>,
    ) -> Result<(), StoreError> {
        let payload = match payload {
            Some(bytes) if !bytes.is_empty() => bytes,
            _ => return self.remove_all(artifact),
        };
        let label = artifact.resolve_version(version).to_string();

        let staged = self
            .blobs
            .create(payload)
            .map_err(|e| io_error(WriteStep::StageWrite, artifact, &label, e))?;
        debug!(artifact = %artifact.name, version = %label, blob = %staged, bytes = payload.len(), "staged write");

        let previous = artifact.staging.get(&label).cloned();
        let result = self.save_with(artifact, |a| {
            a.staging.insert(label.clone(), staged.clone());
        });
        if let Err(e) = result {
            // The record never pointed at the new blob.
            let _ = self.blobs.delete(&staged);
            return Err(e);
        }
        if let Some(stale) = previous {
            self.discard_blob(&stale, artifact, &label)?;
        }

        self.transfer(artifact, Some(&label))
    }

    /// Promote `staging[version]` to `versions[version]`.
    ///
    /// No-op when nothing is staged for the label. This is the commit
    /// boundary: before it readers see the old version, after it the new one.
    pub fn transfer(&self, artifact: &mut Artifact, version: Option<&str>) -> Result<(), StoreError> {
        let label = artifact.resolve_version(version).to_string();
        let Some(staged) = artifact.staging.get(&label).cloned() else {
            return Ok(());
        };

        let bytes = match self.blobs.read(&staged) {
            Ok(bytes) => bytes,
            Err(BlobError::NotFound(_)) => {
                warn!(artifact = %artifact.name, version = %label, blob = %staged, "staged blob missing, discarding staging entry");
                return self.save_with(artifact, |a| {
                    a.staging.remove(&label);
                });
            }
            Err(source) => return Err(io_error(WriteStep::StagingRead, artifact, &label, source)),
        };

        let (committed, fresh_slot) = match artifact.versions.get(&label) {
            Some(existing) if self.blobs.exists(existing) => {
                self.blobs
                    .replace(existing, &bytes)
                    .map_err(|e| io_error(WriteStep::CommitReplace, artifact, &label, e))?;
                (existing.clone(), false)
            }
            _ => {
                let created = self
                    .blobs
                    .create(&bytes)
                    .map_err(|e| io_error(WriteStep::CommitReplace, artifact, &label, e))?;
                (created, true)
            }
        };

        let result = self.save_with(artifact, |a| {
            a.versions.insert(label.clone(), committed.clone());
            a.staging.remove(&label);
        });
        if let Err(e) = result {
            if fresh_slot {
                let _ = self.blobs.delete(&committed);
            }
            return Err(e);
        }
        debug!(artifact = %artifact.name, version = %label, blob = %committed, "committed version");

        match self.blobs.delete(&staged) {
            Ok(()) | Err(BlobError::NotFound(_)) => Ok(()),
            Err(source) => Err(io_error(WriteStep::StagingCleanup, artifact, &label, source)),
        }
    }

    /// Transfer every pending staged write of the artifact.
    pub fn reconcile(&self, artifact: &mut Artifact) -> Result<(), StoreError> {
        let labels: Vec<String> = artifact.staging.keys().cloned().collect();
        for label in labels {
            self.transfer(artifact, Some(&label))?;
        }
        Ok(())
    }

    /// Delete one committed version; `NoSuchVersion` if the label is absent.
    pub fn remove_version(&self, artifact: &mut Artifact, version: &str) -> Result<(), StoreError> {
        let blob = artifact
            .versions
            .get(version)
            .cloned()
            .ok_or_else(|| StoreError::NoSuchVersion {
                name: artifact.name.clone(),
                version: version.to_string(),
            })?;
        self.discard_blob(&blob, artifact, version)?;
        self.save_with(artifact, |a| {
            a.versions.remove(version);
        })
    }

    /// Delete every committed and staged blob of the artifact.
    ///
    /// Entries are dropped from the record only once their blob is gone, so a
    /// failed delete stays referenced and a retry finishes the job.
    pub fn remove_all(&self, artifact: &mut Artifact) -> Result<(), StoreError> {
        if artifact.versions.is_empty() && artifact.staging.is_empty() {
            return Ok(());
        }

        let mut first_error = None;
        let mut gone_versions = Vec::new();
        let mut gone_staged = Vec::new();
        for (label, blob) in &artifact.versions {
            match self.discard_blob(blob, artifact, label) {
                Ok(()) => gone_versions.push(label.clone()),
                Err(e) => {
                    warn!(artifact = %artifact.name, version = %label, error = %e, "failed to delete blob");
                    first_error.get_or_insert(e);
                }
            }
        }
        for (label, blob) in &artifact.staging {
            match self.discard_blob(blob, artifact, label) {
                Ok(()) => gone_staged.push(label.clone()),
                Err(e) => {
                    warn!(artifact = %artifact.name, version = %label, error = %e, "failed to delete staged blob");
                    first_error.get_or_insert(e);
                }
            }
        }

        self.save_with(artifact, |a| {
            for label in &gone_versions {
                a.versions.remove(label);
            }
            for label in &gone_staged {
                a.staging.remove(label);
            }
        })?;
        debug!(
            artifact = %artifact.name,
            removed = gone_versions.len() + gone_staged.len(),
            remaining = artifact.versions.len() + artifact.staging.len(),
            "removed versions"
        );
        first_error.map_or(Ok(()), Err)
    }

    /// Relabel a committed version, displacing any version already under `new`.
    pub fn rename_version(
        &self,
        artifact: &mut Artifact,
        old: &str,
        new: &str,
    ) -> Result<(), StoreError> {
        let blob = artifact
            .versions
            .get(old)
            .cloned()
            .ok_or_else(|| StoreError::NoSuchVersion {
                name: artifact.name.clone(),
                version: old.to_string(),
            })?;
        if old == new {
            return Ok(());
        }
        if let Some(displaced) = artifact.versions.get(new).cloned() {
            self.discard_blob(&displaced, artifact, new)?;
        }
        self.save_with(artifact, |a| {
            a.versions.remove(old);
            a.versions.insert(new.to_string(), blob);
        })
    }

    /// Creation time of the committed blob for `version`.
    pub fn last_commit_timestamp(
        &self,
        artifact: &Artifact,
        version: Option<&str>,
    ) -> Result<Option<DateTime<Utc>>, StoreError> {
        let label = artifact.resolve_version(version);
        let Some(blob) = artifact.versions.get(label) else {
            return Ok(None);
        };
        match self.blobs.created_at(blob) {
            Ok(ts) => Ok(Some(ts)),
            Err(BlobError::NotFound(_)) => {
                warn!(artifact = %artifact.name, version = label, blob = %blob, "committed blob missing");
                Ok(None)
            }
            Err(source) => Err(io_error(WriteStep::Read, artifact, label, source)),
        }
    }

    // ── Record mutations ────────────────────────────────────────────

    pub fn rename(&self, artifact: &mut Artifact, new_name: &str) -> Result<(), StoreError> {
        if artifact.name == new_name {
            return Ok(());
        }
        if self.records.load(new_name).map_err(record_err)?.is_some() {
            return Err(StoreError::NameTaken(new_name.to_string()));
        }
        let mut next = artifact.clone();
        next.name = new_name.to_string();
        self.records
            .rename(&artifact.name, &next)
            .map_err(record_err)?;
        debug!(from = %artifact.name, to = new_name, "renamed artifact");
        *artifact = next;
        Ok(())
    }

    pub fn set_default_version(&self, artifact: &mut Artifact, label: &str) -> Result<(), StoreError> {
        self.save_with(artifact, |a| a.default_version = label.to_string())
    }

    /// Merge parameters into the artifact, overwriting existing keys.
    pub fn add_params<I, K>(&self, artifact: &mut Artifact, params: I) -> Result<(), StoreError>
    where
        I: IntoIterator<Item = (K, serde_json::Value)>,
        K: Into<String>,
    {
        self.save_with(artifact, |a| {
            a.parameters
                .extend(params.into_iter().map(|(k, v)| (k.into(), v)));
        })
    }

    /// Remove parameters by key; unknown keys are ignored.
    pub fn remove_params<I, K>(&self, artifact: &mut Artifact, keys: I) -> Result<(), StoreError>
    where
        I: IntoIterator<Item = K>,
        K: AsRef<str>,
    {
        self.save_with(artifact, |a| {
            for key in keys {
                a.parameters.remove(key.as_ref());
            }
        })
    }

    /// Append `text` to the `title` thread. Empty text only creates the thread.
    pub fn add_note(&self, artifact: &mut Artifact, title: &str, text: &str) -> Result<(), StoreError> {
        self.save_with(artifact, |a| {
            let thread = a.notes.thread_mut(title);
            if !text.is_empty() {
                thread.push(text.to_string());
            }
        })
    }

    /// Delete one note (`Some(index)`) or the whole `title` thread (`None`).
    pub fn delete_note(
        &self,
        artifact: &mut Artifact,
        title: &str,
        index: Option<usize>,
    ) -> Result<(), StoreError> {
        match index {
            None => self.save_with(artifact, |a| {
                a.notes.remove(title);
            }),
            Some(index) => {
                let len = artifact.notes.get(title).map_or(0, <[String]>::len);
                if index >= len {
                    return Err(StoreError::NoSuchNote {
                        name: artifact.name.clone(),
                        title: title.to_string(),
                        index,
                    });
                }
                self.save_with(artifact, |a| {
                    if let Some(thread) = a.notes.existing_thread_mut(title) {
                        thread.remove(index);
                    }
                })
            }
        }
    }

    /// Formatted `"{i}: {text}"` listing of one thread, or of every thread
    /// (most recently created first) when `title` is `None`.
    pub fn read_notes(&self, artifact: &Artifact, title: Option<&str>) -> String {
        artifact.format_notes(title)
    }

    /// Delete the artifact: every blob first, then the record.
    pub fn delete(&self, mut artifact: Artifact) -> Result<(), StoreError> {
        self.remove_all(&mut artifact)?;
        self.records.remove(&artifact.name).map_err(record_err)?;
        debug!(artifact = %artifact.name, "deleted artifact");
        Ok(())
    }

    // ── Internals ───────────────────────────────────────────────────

    /// Apply `mutate` to a copy, persist it, and only then adopt it.
    fn save_with(
        &self,
        artifact: &mut Artifact,
        mutate: impl FnOnce(&mut Artifact),
    ) -> Result<(), StoreError> {
        let mut next = artifact.clone();
        mutate(&mut next);
        self.records.update(&next).map_err(record_err)?;
        *artifact = next;
        Ok(())
    }

    /// Delete a blob the record no longer references; absence is tolerated.
    fn discard_blob(&self, blob: &BlobRef, artifact: &Artifact, label: &str) -> Result<(), StoreError> {
        match self.blobs.delete(blob) {
            Ok(()) => Ok(()),
            Err(BlobError::NotFound(_)) => {
                debug!(artifact = %artifact.name, version = label, blob = %blob, "blob already gone");
                Ok(())
            }
            Err(source) => Err(io_error(WriteStep::Remove, artifact, label, source)),
        }
    }
}

fn io_error(step: WriteStep, artifact: &Artifact, version: &str, source: BlobError) -> StoreError {
    StoreError::Io {
        step,
        name: artifact.name.clone(),
        version: version.to_string(),
        source,
    }
}

fn record_err(e: RecordError) -> StoreError {
    match e {
        RecordError::Missing(name) => StoreError::NoSuchArtifact(name),
        RecordError::Duplicate(name) => StoreError::NameTaken(name),
        other => StoreError::Record(other),
    }
}
