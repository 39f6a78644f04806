//! Forward migrations of the artifact record layout.
//!
//! Records are upgraded in memory when loaded; the repository writes the
//! current layout the next time the record is saved.
//!
//! - v1: legacy layout (`params`, `fileversions`, `newfile`, `versiondefault`,
//!   plus a cached `_timestamp` display string)
//! - v2: current layout (see [`Artifact`])

use super::record::{Artifact, CURRENT_SCHEMA_VERSION};
use super::repo::RecordError;
use serde_json::{Map, Value};

type Migration = fn(&mut Map<String, Value>);

/// Migrations indexed by the version they upgrade *from*.
const MIGRATIONS: &[(u32, Migration)] = &[(1, upgrade_v1_to_v2)];

/// Upgrade a raw record to the current layout and decode it.
pub fn migrate_record(name_hint: &str, value: Value) -> Result<Artifact, RecordError> {
    let Value::Object(mut fields) = value else {
        return Err(RecordError::Malformed {
            name: name_hint.to_string(),
            reason: "record is not a JSON object".into(),
        });
    };

    let mut version = match fields.get("schema_version") {
        None => 1,
        Some(v) => v
            .as_u64()
            .and_then(|v| u32::try_from(v).ok())
            .ok_or_else(|| RecordError::Malformed {
                name: name_hint.to_string(),
                reason: format!("schema_version is not an integer: {v}"),
            })?,
    };

    if version > CURRENT_SCHEMA_VERSION {
        return Err(RecordError::UnsupportedSchema {
            name: name_hint.to_string(),
            found: version,
            supported: CURRENT_SCHEMA_VERSION,
        });
    }

    while version < CURRENT_SCHEMA_VERSION {
        let (_, migration) = MIGRATIONS
            .iter()
            .find(|(from, _)| *from == version)
            .ok_or_else(|| RecordError::Malformed {
                name: name_hint.to_string(),
                reason: format!("no migration from schema version {version}"),
            })?;
        migration(&mut fields);
        version += 1;
        fields.insert("schema_version".into(), Value::from(version));
        tracing::debug!(artifact = name_hint, schema_version = version, "migrated record");
    }

    serde_json::from_value(Value::Object(fields)).map_err(|e| RecordError::Malformed {
        name: name_hint.to_string(),
        reason: e.to_string(),
    })
}

fn upgrade_v1_to_v2(fields: &mut Map<String, Value>) {
    for (old, new) in [
        ("params", "parameters"),
        ("fileversions", "versions"),
        ("newfile", "staging"),
        ("versiondefault", "default_version"),
    ] {
        if let Some(value) = fields.remove(old) {
            fields.entry(new.to_string()).or_insert(value);
        }
    }
    // Display cache; derived from the blob backend now.
    fields.remove("_timestamp");
}
