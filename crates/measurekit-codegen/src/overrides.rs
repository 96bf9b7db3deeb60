//! The override store: manual per-component, per-format code replacements
//!
//! At most one override record exists per `(measure, component, format)`
//! key. Edits are serialized behind a store-level lock and carry an
//! optimistic version check, so a concurrent edit surfaces as a
//! [`OverrideError::VersionConflict`] instead of silently discarding a
//! just-appended audit note. Every edit must add a note; the note list is
//! append-only.

use crate::error::OverrideError;
use crate::target::TargetFormat;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Structured override key. A tuple of fields, not a delimited string, so
/// ids containing any particular character cannot collide.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OverrideKey {
    pub measure_id: String,
    pub component_id: String,
    pub format: TargetFormat,
}

impl OverrideKey {
    pub fn new(
        measure_id: impl Into<String>,
        component_id: impl Into<String>,
        format: TargetFormat,
    ) -> Self {
        Self {
            measure_id: measure_id.into(),
            component_id: component_id.into(),
            format,
        }
    }
}

/// One append-only audit entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OverrideNote {
    pub timestamp: DateTime<Utc>,
    pub author: String,
    pub content: String,
}

/// A stored override for one component and format
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OverrideRecord {
    pub format: TargetFormat,
    /// The replacement code, emitted verbatim when locked
    pub code: String,
    /// Only locked overrides take precedence over generated code
    pub is_locked: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Append-only audit trail
    pub notes: Vec<OverrideNote>,
    /// What the generator produced when the override was first created
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub original_generated_code: Option<String>,
    /// Optimistic-concurrency version, bumped on every edit
    pub version: u64,
}

/// In-memory override store.
///
/// The one piece of shared mutable state in the core: reads are cheap and
/// concurrent, writes serialize behind the lock.
#[derive(Debug, Default)]
pub struct OverrideStore {
    records: RwLock<HashMap<OverrideKey, OverrideRecord>>,
}

impl OverrideStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of the record for a key
    pub fn get(&self, key: &OverrideKey) -> Option<OverrideRecord> {
        self.records.read().get(key).cloned()
    }

    /// The stored code for a *locked* override, if one exists. This is the
    /// only lookup the compiler performs, keyed by the exact target format
    /// being rendered so override state cannot leak across formats.
    pub fn locked_code(
        &self,
        measure_id: &str,
        component_id: &str,
        format: TargetFormat,
    ) -> Option<String> {
        let key = OverrideKey::new(measure_id, component_id, format);
        let records = self.records.read();
        records
            .get(&key)
            .filter(|record| record.is_locked)
            .map(|record| record.code.clone())
    }

    /// Create or edit an override. `expected_version` must match the stored
    /// version when editing an existing record; pass `None` on creation.
    /// The audit note is mandatory.
    pub fn upsert(
        &self,
        key: OverrideKey,
        code: impl Into<String>,
        author: impl Into<String>,
        note: impl Into<String>,
        expected_version: Option<u64>,
        original_generated_code: Option<String>,
    ) -> Result<OverrideRecord, OverrideError> {
        let note = note.into();
        if note.trim().is_empty() {
            return Err(OverrideError::NoteRequired);
        }
        let author = author.into();
        let now = Utc::now();

        let mut records = self.records.write();
        let record = match records.get_mut(&key) {
            Some(existing) => {
                let expected = expected_version.unwrap_or(0);
                if expected != existing.version {
                    return Err(OverrideError::VersionConflict {
                        expected,
                        found: existing.version,
                    });
                }
                existing.code = code.into();
                existing.updated_at = now;
                existing.version += 1;
                existing.notes.push(OverrideNote {
                    timestamp: now,
                    author,
                    content: note,
                });
                existing.clone()
            }
            None => {
                let record = OverrideRecord {
                    format: key.format,
                    code: code.into(),
                    is_locked: false,
                    created_at: now,
                    updated_at: now,
                    notes: vec![OverrideNote {
                        timestamp: now,
                        author,
                        content: note,
                    }],
                    original_generated_code,
                    version: 1,
                };
                records.insert(key.clone(), record.clone());
                record
            }
        };
        Ok(record)
    }

    /// Lock or unlock an override. Locking is itself an audited edit.
    pub fn set_locked(
        &self,
        key: &OverrideKey,
        locked: bool,
        author: impl Into<String>,
        note: impl Into<String>,
    ) -> Result<OverrideRecord, OverrideError> {
        let note = note.into();
        if note.trim().is_empty() {
            return Err(OverrideError::NoteRequired);
        }
        let mut records = self.records.write();
        let record = records.get_mut(key).ok_or_else(|| OverrideError::NotFound {
            component: key.component_id.clone(),
        })?;
        let now = Utc::now();
        record.is_locked = locked;
        record.updated_at = now;
        record.version += 1;
        record.notes.push(OverrideNote {
            timestamp: now,
            author: author.into(),
            content: note,
        });
        Ok(record.clone())
    }

    /// Number of stored override records
    pub fn len(&self) -> usize {
        self.records.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.read().is_empty()
    }
}
