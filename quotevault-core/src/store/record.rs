//! The persisted artifact record.
//!
//! Layout (JSON):
//! `{name, parameters, default_version, versions: {label: blob}, staging: {label: blob},
//!   notes: {title: [text, ...]}, schema_version}`
//!
//! The record owns blob references only; bytes live in the blob backend.
//! Fields are crate-private so every change to `versions` and `staging` goes
//! through [`ArtifactStore`](super::ArtifactStore).

use crate::blob::BlobRef;
use serde::de::{MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::BTreeMap;
use std::fmt;

/// Label used when no version is named.
pub const DEFAULT_VERSION: &str = "default";

/// Record layout version written by this crate.
pub const CURRENT_SCHEMA_VERSION: u32 = 2;

/// Arbitrary processing metadata attached to an artifact.
pub type Parameters = BTreeMap<String, serde_json::Value>;

fn default_version_label() -> String {
    DEFAULT_VERSION.to_string()
}

fn current_schema() -> u32 {
    CURRENT_SCHEMA_VERSION
}

/// A named, versioned dataset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Artifact {
    pub(crate) name: String,
    #[serde(default)]
    pub(crate) parameters: Parameters,
    #[serde(default = "default_version_label")]
    pub(crate) default_version: String,
    #[serde(default)]
    pub(crate) versions: BTreeMap<String, BlobRef>,
    #[serde(default)]
    pub(crate) staging: BTreeMap<String, BlobRef>,
    #[serde(default)]
    pub(crate) notes: Notes,
    #[serde(default = "current_schema")]
    pub(crate) schema_version: u32,
}

impl Artifact {
    /// An empty artifact with no data, parameters, or notes.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            parameters: Parameters::new(),
            default_version: default_version_label(),
            versions: BTreeMap::new(),
            staging: BTreeMap::new(),
            notes: Notes::default(),
            schema_version: CURRENT_SCHEMA_VERSION,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn parameters(&self) -> &Parameters {
        &self.parameters
    }

    pub fn default_version(&self) -> &str {
        &self.default_version
    }

    pub fn schema_version(&self) -> u32 {
        self.schema_version
    }

    /// Committed version labels, sorted.
    pub fn all_versions(&self) -> Vec<&str> {
        self.versions.keys().map(String::as_str).collect()
    }

    /// Committed blob for a label, if any.
    pub fn committed(&self, version: &str) -> Option<&BlobRef> {
        self.versions.get(version)
    }

    /// Staged (not yet committed) blob for a label, if any.
    pub fn staged(&self, version: &str) -> Option<&BlobRef> {
        self.staging.get(version)
    }

    /// Labels with a staged write awaiting transfer.
    pub fn staged_versions(&self) -> Vec<&str> {
        self.staging.keys().map(String::as_str).collect()
    }

    pub fn has_pending_staging(&self) -> bool {
        !self.staging.is_empty()
    }

    /// Every blob this record references, committed and staged.
    pub fn blob_refs(&self) -> Vec<&BlobRef> {
        self.versions.values().chain(self.staging.values()).collect()
    }

    pub fn notes(&self) -> &Notes {
        &self.notes
    }

    /// Resolve an optional label against the default version pointer.
    pub fn resolve_version<'a>(&'a self, version: Option<&'a str>) -> &'a str {
        version.unwrap_or(&self.default_version)
    }

    /// Render notes as `"{title}\n\t0: text\n\t1: text"` blocks.
    ///
    /// With no title, every thread is rendered, most recently created first.
    pub fn format_notes(&self, title: Option<&str>) -> String {
        let render = |title: &str, entries: &[String]| {
            let lines: Vec<String> = entries
                .iter()
                .enumerate()
                .map(|(i, note)| format!("{i}: {note}"))
                .collect();
            format!("{title}\n\t{}", lines.join("\n\t"))
        };

        match title {
            Some(title) => render(title, self.notes.get(title).unwrap_or(&[])),
            None => self
                .notes
                .iter()
                .rev()
                .map(|(title, entries)| render(title, entries))
                .collect::<Vec<_>>()
                .join("\n"),
        }
    }
}

/// Note threads keyed by title, kept in creation order.
///
/// Serialized as a JSON object; deserialization keeps document order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Notes {
    threads: Vec<(String, Vec<String>)>,
}

impl Notes {
    pub fn get(&self, title: &str) -> Option<&[String]> {
        self.threads
            .iter()
            .find(|(t, _)| t == title)
            .map(|(_, entries)| entries.as_slice())
    }

    pub fn iter(&self) -> impl DoubleEndedIterator<Item = (&str, &[String])> {
        self.threads
            .iter()
            .map(|(title, entries)| (title.as_str(), entries.as_slice()))
    }

    pub fn titles(&self) -> Vec<&str> {
        self.threads.iter().map(|(t, _)| t.as_str()).collect()
    }

    pub fn len(&self) -> usize {
        self.threads.len()
    }

    pub fn is_empty(&self) -> bool {
        self.threads.is_empty()
    }

    /// The thread for `title`, created empty if missing.
    pub(crate) fn thread_mut(&mut self, title: &str) -> &mut Vec<String> {
        let index = match self.threads.iter().position(|(t, _)| t == title) {
            Some(index) => index,
            None => {
                self.threads.push((title.to_string(), Vec::new()));
                self.threads.len() - 1
            }
        };
        &mut self.threads[index].1
    }

    pub(crate) fn existing_thread_mut(&mut self, title: &str) -> Option<&mut Vec<String>> {
        self.threads
            .iter_mut()
            .find(|(t, _)| t == title)
            .map(|(_, entries)| entries)
    }

    pub(crate) fn remove(&mut self, title: &str) -> Option<Vec<String>> {
        let index = self.threads.iter().position(|(t, _)| t == title)?;
        Some(self.threads.remove(index).1)
    }
}

impl Serialize for Notes {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.threads.len()))?;
        for (title, entries) in &self.threads {
            map.serialize_entry(title, entries)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for Notes {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct NotesVisitor;

        impl<'de> Visitor<'de> for NotesVisitor {
            type Value = Notes;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a map of note titles to lists of strings")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<Notes, A::Error> {
                let mut notes = Notes::default();
                while let Some((title, entries)) = access.next_entry::<String, Vec<String>>()? {
                    *notes.thread_mut(&title) = entries;
                }
                Ok(notes)
            }
        }

        deserializer.deserialize_map(NotesVisitor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_artifact_is_empty_with_default_label() {
        let artifact = Artifact::new("AAA_daily");
        assert_eq!(artifact.name(), "AAA_daily");
        assert_eq!(artifact.default_version(), DEFAULT_VERSION);
        assert!(artifact.all_versions().is_empty());
        assert!(!artifact.has_pending_staging());
        assert_eq!(artifact.schema_version(), CURRENT_SCHEMA_VERSION);
    }

    #[test]
    fn record_json_has_documented_shape() {
        let mut artifact = Artifact::new("AAA_daily");
        artifact
            .versions
            .insert("default".into(), BlobRef::from_string("ab".repeat(16)));
        artifact.notes.thread_mut("source").push("csv".into());

        let json = serde_json::to_value(&artifact).unwrap();
        for key in [
            "name",
            "parameters",
            "default_version",
            "versions",
            "staging",
            "notes",
            "schema_version",
        ] {
            assert!(json.get(key).is_some(), "missing key {key}");
        }
        assert_eq!(json["versions"]["default"], "ab".repeat(16));
        assert_eq!(json["notes"]["source"][0], "csv");
    }

    #[test]
    fn notes_keep_document_order() {
        let json = r#"{"zeta":["z"],"alpha":["a1","a2"],"mid":[]}"#;
        let notes: Notes = serde_json::from_str(json).unwrap();
        assert_eq!(notes.titles(), vec!["zeta", "alpha", "mid"]);
        assert_eq!(serde_json::to_string(&notes).unwrap(), json);
    }

    #[test]
    fn format_notes_lists_latest_title_first() {
        let mut artifact = Artifact::new("n");
        artifact.notes.thread_mut("first").push("one".into());
        artifact.notes.thread_mut("second").push("two".into());
        artifact.notes.thread_mut("second").push("three".into());

        assert_eq!(
            artifact.format_notes(Some("second")),
            "second\n\t0: two\n\t1: three"
        );
        assert_eq!(
            artifact.format_notes(None),
            "second\n\t0: two\n\t1: three\nfirst\n\t0: one"
        );
    }
}
