//! Persistence of artifact records.
//!
//! Any [`RecordRepository`] that stores the [`Artifact`] shape is
//! interchangeable; the store only relies on the trait.

use super::migrate::migrate_record;
use super::record::Artifact;
use crate::blob::fs::write_atomic;
use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RecordError {
    #[error("artifact '{0}' already exists")]
    Duplicate(String),

    #[error("artifact '{0}' not found")]
    Missing(String),

    #[error("record for '{name}' is malformed: {reason}")]
    Malformed { name: String, reason: String },

    #[error("record for '{name}' uses schema version {found}, newer than supported version {supported}")]
    UnsupportedSchema {
        name: String,
        found: u32,
        supported: u32,
    },

    #[error("record I/O error: {0}")]
    Io(#[from] io::Error),
}

/// Storage for artifact records, keyed by artifact name.
pub trait RecordRepository: Send + Sync {
    /// Load a record by name.
    fn load(&self, name: &str) -> Result<Option<Artifact>, RecordError>;

    /// Insert a new record; `Duplicate` if the name is taken.
    fn insert(&self, artifact: &Artifact) -> Result<(), RecordError>;

    /// Overwrite an existing record; `Missing` if absent.
    fn update(&self, artifact: &Artifact) -> Result<(), RecordError>;

    /// Move the record stored under `old_name` to `artifact.name`, saving
    /// `artifact` as its new contents.
    fn rename(&self, old_name: &str, artifact: &Artifact) -> Result<(), RecordError>;

    /// Remove a record; `Missing` if absent.
    fn remove(&self, name: &str) -> Result<(), RecordError>;

    /// All stored names, sorted.
    fn names(&self) -> Result<Vec<String>, RecordError>;
}

// ── Filesystem repository ───────────────────────────────────────────

/// One JSON file per artifact: `{root}/{blake3(name)}.json`.
pub struct FsRecordRepository {
    root: PathBuf,
}

impl FsRecordRepository {
    pub fn open(root: impl Into<PathBuf>) -> io::Result<Self> {
        let root = root.into();
        fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn record_path(&self, name: &str) -> PathBuf {
        let digest = blake3::hash(name.as_bytes()).to_hex();
        self.root.join(format!("{digest}.json"))
    }

    fn write(&self, artifact: &Artifact) -> Result<(), RecordError> {
        let json = serde_json::to_vec_pretty(artifact).map_err(|e| RecordError::Malformed {
            name: artifact.name.clone(),
            reason: format!("serialization: {e}"),
        })?;
        write_atomic(&self.record_path(&artifact.name), &json)?;
        Ok(())
    }

    fn read_path(path: &Path, name_hint: &str) -> Result<Artifact, RecordError> {
        let content = fs::read(path)?;
        let value = serde_json::from_slice(&content).map_err(|e| RecordError::Malformed {
            name: name_hint.to_string(),
            reason: e.to_string(),
        })?;
        migrate_record(name_hint, value)
    }
}

impl RecordRepository for FsRecordRepository {
    fn load(&self, name: &str) -> Result<Option<Artifact>, RecordError> {
        let path = self.record_path(name);
        if !path.exists() {
            return Ok(None);
        }
        Self::read_path(&path, name).map(Some)
    }

    fn insert(&self, artifact: &Artifact) -> Result<(), RecordError> {
        if self.record_path(&artifact.name).exists() {
            return Err(RecordError::Duplicate(artifact.name.clone()));
        }
        self.write(artifact)
    }

    fn update(&self, artifact: &Artifact) -> Result<(), RecordError> {
        if !self.record_path(&artifact.name).exists() {
            return Err(RecordError::Missing(artifact.name.clone()));
        }
        self.write(artifact)
    }

    fn rename(&self, old_name: &str, artifact: &Artifact) -> Result<(), RecordError> {
        let old_path = self.record_path(old_name);
        if !old_path.exists() {
            return Err(RecordError::Missing(old_name.to_string()));
        }
        if old_name == artifact.name {
            return self.write(artifact);
        }
        if self.record_path(&artifact.name).exists() {
            return Err(RecordError::Duplicate(artifact.name.clone()));
        }
        self.write(artifact)?;
        fs::remove_file(old_path)?;
        Ok(())
    }

    fn remove(&self, name: &str) -> Result<(), RecordError> {
        match fs::remove_file(self.record_path(name)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                Err(RecordError::Missing(name.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }

    fn names(&self) -> Result<Vec<String>, RecordError> {
        let mut names = Vec::new();
        for entry in fs::read_dir(&self.root)? {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            match Self::read_path(&path, &path.display().to_string()) {
                Ok(artifact) => names.push(artifact.name),
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "skipping unreadable record");
                }
            }
        }
        names.sort();
        Ok(names)
    }
}

// ── In-memory repository ────────────────────────────────────────────

#[derive(Debug, Default)]
pub struct MemoryRecordRepository {
    records: Mutex<BTreeMap<String, Artifact>>,
}

impl MemoryRecordRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

impl RecordRepository for MemoryRecordRepository {
    fn load(&self, name: &str) -> Result<Option<Artifact>, RecordError> {
        let records = self.records.lock().unwrap_or_else(|e| e.into_inner());
        Ok(records.get(name).cloned())
    }

    fn insert(&self, artifact: &Artifact) -> Result<(), RecordError> {
        let mut records = self.records.lock().unwrap_or_else(|e| e.into_inner());
        if records.contains_key(&artifact.name) {
            return Err(RecordError::Duplicate(artifact.name.clone()));
        }
        records.insert(artifact.name.clone(), artifact.clone());
        Ok(())
    }

    fn update(&self, artifact: &Artifact) -> Result<(), RecordError> {
        let mut records = self.records.lock().unwrap_or_else(|e| e.into_inner());
        match records.get_mut(&artifact.name) {
            Some(slot) => {
                *slot = artifact.clone();
                Ok(())
            }
            None => Err(RecordError::Missing(artifact.name.clone())),
        }
    }

    fn rename(&self, old_name: &str, artifact: &Artifact) -> Result<(), RecordError> {
        let mut records = self.records.lock().unwrap_or_else(|e| e.into_inner());
        if !records.contains_key(old_name) {
            return Err(RecordError::Missing(old_name.to_string()));
        }
        if old_name != artifact.name && records.contains_key(&artifact.name) {
            return Err(RecordError::Duplicate(artifact.name.clone()));
        }
        records.remove(old_name);
        records.insert(artifact.name.clone(), artifact.clone());
        Ok(())
    }

    fn remove(&self, name: &str) -> Result<(), RecordError> {
        let mut records = self.records.lock().unwrap_or_else(|e| e.into_inner());
        records
            .remove(name)
            .map(|_| ())
            .ok_or_else(|| RecordError::Missing(name.to_string()))
    }

    fn names(&self) -> Result<Vec<String>, RecordError> {
        let records = self.records.lock().unwrap_or_else(|e| e.into_inner());
        Ok(records.keys().cloned().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn exercise(repo: &dyn RecordRepository) {
        let artifact = Artifact::new("AAA_daily");
        repo.insert(&artifact).unwrap();
        assert!(matches!(
            repo.insert(&artifact),
            Err(RecordError::Duplicate(_))
        ));
        assert_eq!(repo.load("AAA_daily").unwrap(), Some(artifact.clone()));
        assert_eq!(repo.load("BBB_daily").unwrap(), None);

        let mut renamed = artifact.clone();
        renamed.name = "AAA_intraday".into();
        repo.rename("AAA_daily", &renamed).unwrap();
        assert_eq!(repo.load("AAA_daily").unwrap(), None);
        assert_eq!(repo.names().unwrap(), vec!["AAA_intraday".to_string()]);

        repo.insert(&Artifact::new("BBB_daily")).unwrap();
        let mut clash = renamed.clone();
        clash.name = "BBB_daily".into();
        assert!(matches!(
            repo.rename("AAA_intraday", &clash),
            Err(RecordError::Duplicate(_))
        ));

        repo.remove("AAA_intraday").unwrap();
        assert!(matches!(
            repo.remove("AAA_intraday"),
            Err(RecordError::Missing(_))
        ));
        assert!(matches!(
            repo.update(&Artifact::new("ghost")),
            Err(RecordError::Missing(_))
        ));
    }

    #[test]
    fn memory_repository_contract() {
        exercise(&MemoryRecordRepository::new());
    }

    #[test]
    fn fs_repository_contract() {
        let dir = tempfile::tempdir().unwrap();
        exercise(&FsRecordRepository::open(dir.path()).unwrap());
    }

    #[test]
    fn fs_repository_names_may_contain_path_separators() {
        let dir = tempfile::tempdir().unwrap();
        let repo = FsRecordRepository::open(dir.path()).unwrap();
        repo.insert(&Artifact::new("BRK/B_daily")).unwrap();
        assert!(repo.load("BRK/B_daily").unwrap().is_some());
    }

    #[test]
    fn fs_repository_migrates_legacy_files() {
        let dir = tempfile::tempdir().unwrap();
        let repo = FsRecordRepository::open(dir.path()).unwrap();
        let legacy = r#"{"name":"OLD_daily","params":{"symbol":"OLD"},"versiondefault":"default"}"#;
        fs::write(repo.record_path("OLD_daily"), legacy).unwrap();

        let artifact = repo.load("OLD_daily").unwrap().unwrap();
        assert_eq!(artifact.parameters()["symbol"], "OLD");
        assert_eq!(artifact.schema_version(), super::super::record::CURRENT_SCHEMA_VERSION);
    }

    #[test]
    fn fs_repository_skips_corrupt_files_when_listing() {
        let dir = tempfile::tempdir().unwrap();
        let repo = FsRecordRepository::open(dir.path()).unwrap();
        repo.insert(&Artifact::new("GOOD")).unwrap();
        fs::write(dir.path().join("garbage.json"), "{not json").unwrap();
        assert_eq!(repo.names().unwrap(), vec!["GOOD".to_string()]);
    }
}
