use super::repo::RecordError;
use crate::blob::BlobError;
use std::fmt;
use thiserror::Error;

/// The blob-backend step a store operation was performing when it failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteStep {
    /// Creating the staged blob for a new payload.
    StageWrite,
    /// Reading the staged blob back during transfer.
    StagingRead,
    /// Copying staged bytes into the committed slot.
    CommitReplace,
    /// Deleting the staged blob after commit.
    StagingCleanup,
    /// Reading committed data.
    Read,
    /// Deleting a committed or staged blob.
    Remove,
}

impl fmt::Display for WriteStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            WriteStep::StageWrite => "stage-write",
            WriteStep::StagingRead => "staging-read",
            WriteStep::CommitReplace => "commit-replace",
            WriteStep::StagingCleanup => "staging-cleanup",
            WriteStep::Read => "read",
            WriteStep::Remove => "remove",
        })
    }
}

/// Errors surfaced by [`ArtifactStore`](super::ArtifactStore).
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("no artifact named '{0}'")]
    NoSuchArtifact(String),

    #[error("artifact name '{0}' is already taken")]
    NameTaken(String),

    #[error("artifact '{name}' has no version '{version}'")]
    NoSuchVersion { name: String, version: String },

    #[error("artifact '{name}' has no note {index} under '{title}'")]
    NoSuchNote {
        name: String,
        title: String,
        index: usize,
    },

    #[error("artifact '{name}' version '{version}' is corrupt: {reason}")]
    CorruptArtifact {
        name: String,
        version: String,
        reason: String,
    },

    #[error("blob backend failed at {step} for '{name}' version '{version}': {source}")]
    Io {
        step: WriteStep,
        name: String,
        version: String,
        #[source]
        source: BlobError,
    },

    #[error("record store error: {0}")]
    Record(#[from] RecordError),
}

impl StoreError {
    /// The failed backend step, for `Io` errors.
    pub fn step(&self) -> Option<WriteStep> {
        match self {
            StoreError::Io { step, .. } => Some(*step),
            _ => None,
        }
    }
}
