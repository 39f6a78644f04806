//! Filesystem blob backend.
//!
//! Layout: `{root}/{ref[0..2]}/{ref}.blob`
//!
//! Each blob file is a single JSON header line ([`BlobMeta`]) followed by the
//! raw payload bytes. Writes go to a `.tmp` sibling and are renamed into
//! place, so a reader sees either the old file or the new one, never a
//! partially written blob.

use super::{BlobBackend, BlobError, BlobMeta, BlobRef};
use chrono::{DateTime, Utc};
use std::fs;
use std::io::{self, BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

pub struct FsBlobBackend {
    root: PathBuf,
}

impl FsBlobBackend {
    /// Open (creating if needed) a blob directory.
    pub fn open(root: impl Into<PathBuf>) -> io::Result<Self> {
        let root = root.into();
        fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn blob_path(&self, blob: &BlobRef) -> Result<PathBuf, BlobError> {
        // Refs come back from persisted records; never let one escape the root.
        if !blob.is_well_formed() {
            return Err(BlobError::InvalidRef(blob.to_string()));
        }
        let id = blob.as_str();
        Ok(self.root.join(&id[..2]).join(format!("{id}.blob")))
    }

    fn write_blob(&self, blob: &BlobRef, bytes: &[u8]) -> Result<(), BlobError> {
        let path = self.blob_path(blob)?;
        let meta = BlobMeta::describe(bytes);
        let mut header = serde_json::to_vec(&meta)
            .map_err(|e| BlobError::Metadata(format!("header serialization: {e}")))?;
        header.push(b'\n');

        let mut contents = Vec::with_capacity(header.len() + bytes.len());
        contents.extend_from_slice(&header);
        contents.extend_from_slice(bytes);
        write_atomic(&path, &contents)?;
        Ok(())
    }

    fn read_header(path: &Path) -> Result<(BlobMeta, usize), BlobError> {
        let file = fs::File::open(path)?;
        let mut reader = BufReader::new(file);
        let mut line = String::new();
        let header_len = reader.read_line(&mut line)?;
        let meta = serde_json::from_str(line.trim_end())
            .map_err(|e| BlobError::Metadata(format!("header parse: {e}")))?;
        Ok((meta, header_len))
    }

    fn existing_path(&self, blob: &BlobRef) -> Result<PathBuf, BlobError> {
        let path = self.blob_path(blob)?;
        if !path.exists() {
            return Err(BlobError::NotFound(blob.clone()));
        }
        Ok(path)
    }
}

impl BlobBackend for FsBlobBackend {
    fn create(&self, bytes: &[u8]) -> Result<BlobRef, BlobError> {
        let mut blob = BlobRef::generate();
        while self.blob_path(&blob)?.exists() {
            blob = BlobRef::generate();
        }
        self.write_blob(&blob, bytes)?;
        Ok(blob)
    }

    fn read(&self, blob: &BlobRef) -> Result<Vec<u8>, BlobError> {
        let path = self.existing_path(blob)?;
        let contents = fs::read(&path)?;
        let split = contents
            .iter()
            .position(|b| *b == b'\n')
            .ok_or_else(|| BlobError::Integrity {
                blob: blob.clone(),
                reason: "missing header".into(),
            })?;
        let meta: BlobMeta =
            serde_json::from_slice(&contents[..split]).map_err(|e| BlobError::Integrity {
                blob: blob.clone(),
                reason: format!("unreadable header: {e}"),
            })?;
        let payload = &contents[split + 1..];
        meta.verify(blob, payload)?;
        Ok(payload.to_vec())
    }

    fn replace(&self, blob: &BlobRef, bytes: &[u8]) -> Result<(), BlobError> {
        self.existing_path(blob)?;
        self.write_blob(blob, bytes)
    }

    fn delete(&self, blob: &BlobRef) -> Result<(), BlobError> {
        let path = self.blob_path(blob)?;
        match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Err(BlobError::NotFound(blob.clone())),
            Err(e) => Err(e.into()),
        }
    }

    fn created_at(&self, blob: &BlobRef) -> Result<DateTime<Utc>, BlobError> {
        let path = self.existing_path(blob)?;
        let (meta, _) = Self::read_header(&path)?;
        Ok(meta.created_at)
    }

    fn exists(&self, blob: &BlobRef) -> bool {
        self.blob_path(blob).map(|p| p.exists()).unwrap_or(false)
    }
}

/// Write `contents` to `path` via a `.tmp` sibling and an atomic rename.
pub(crate) fn write_atomic(path: &Path, contents: &[u8]) -> io::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let mut tmp_name = path.as_os_str().to_owned();
    tmp_name.push(".tmp");
    let tmp_path = PathBuf::from(tmp_name);

    {
        let mut file = fs::File::create(&tmp_path)?;
        file.write_all(contents)?;
        file.sync_all()?;
    }

    fs::rename(&tmp_path, path).map_err(|e| {
        // Clean up temp file on rename failure
        let _ = fs::remove_file(&tmp_path);
        e
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn backend() -> (tempfile::TempDir, FsBlobBackend) {
        let dir = tempfile::tempdir().unwrap();
        let backend = FsBlobBackend::open(dir.path().join("blobs")).unwrap();
        (dir, backend)
    }

    #[test]
    fn create_read_replace_delete() {
        let (_dir, backend) = backend();

        let blob = backend.create(b"first").unwrap();
        assert!(backend.exists(&blob));
        assert_eq!(backend.read(&blob).unwrap(), b"first");

        backend.replace(&blob, b"second, longer").unwrap();
        assert_eq!(backend.read(&blob).unwrap(), b"second, longer");

        backend.delete(&blob).unwrap();
        assert!(!backend.exists(&blob));
        assert!(matches!(backend.read(&blob), Err(BlobError::NotFound(_))));
        assert!(matches!(backend.delete(&blob), Err(BlobError::NotFound(_))));
    }

    #[test]
    fn payload_may_contain_newlines() {
        let (_dir, backend) = backend();
        let payload = b"line one\nline two\n\n";
        let blob = backend.create(payload).unwrap();
        assert_eq!(backend.read(&blob).unwrap(), payload);
    }

    #[test]
    fn identical_payloads_get_independent_refs() {
        let (_dir, backend) = backend();
        let a = backend.create(b"same").unwrap();
        let b = backend.create(b"same").unwrap();
        assert_ne!(a, b);
        backend.delete(&a).unwrap();
        assert_eq!(backend.read(&b).unwrap(), b"same");
    }

    #[test]
    fn replace_resets_creation_time() {
        let (_dir, backend) = backend();
        let blob = backend.create(b"v1").unwrap();
        let first = backend.created_at(&blob).unwrap();
        std::thread::sleep(std::time::Duration::from_millis(5));
        backend.replace(&blob, b"v2").unwrap();
        assert!(backend.created_at(&blob).unwrap() > first);
    }

    #[test]
    fn replace_missing_blob_is_not_found() {
        let (_dir, backend) = backend();
        let ghost = BlobRef::generate();
        assert!(matches!(
            backend.replace(&ghost, b"x"),
            Err(BlobError::NotFound(_))
        ));
    }

    #[test]
    fn tampered_file_fails_integrity() {
        let (_dir, backend) = backend();
        let blob = backend.create(b"original").unwrap();
        let path = backend.blob_path(&blob).unwrap();

        let mut contents = fs::read(&path).unwrap();
        let last = contents.len() - 1;
        contents[last] = b'X';
        fs::write(&path, contents).unwrap();

        assert!(matches!(
            backend.read(&blob),
            Err(BlobError::Integrity { .. })
        ));
    }

    #[test]
    fn malformed_refs_are_rejected() {
        let (_dir, backend) = backend();
        let bad = BlobRef::from_string("../../outside");
        assert!(matches!(backend.read(&bad), Err(BlobError::InvalidRef(_))));
        assert!(!backend.exists(&bad));
    }
}
