//! Typed, versioned checkpoints stored in a job execution's metadata bag.
//!
//! A checkpoint is written as an envelope `{ "kind", "version", "data" }` under the
//! `checkpoint` key, next to a `checkpoint_at` timestamp. Loading checks both `kind`
//! and `version` so a resumed run never reinterprets a checkpoint written by a
//! different job or an older layout.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use serde_json::{Map, Value};
use thiserror::Error;

use crate::error::RepositoryError;

pub const CHECKPOINT_KEY: &str = "checkpoint";
pub const CHECKPOINT_AT_KEY: &str = "checkpoint_at";
pub const CURRENT_ITEM_KEY: &str = "current_item";

/// State a job can persist and resume from.
pub trait CheckpointState: Serialize + DeserializeOwned {
    /// Identifies the job family that owns the checkpoint.
    const KIND: &'static str;
    /// Bumped whenever the serialized layout changes incompatibly.
    const VERSION: u32;
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CheckpointEnvelope {
    pub kind: String,
    pub version: u32,
    pub data: Value,
}

#[derive(Debug, Error)]
pub enum CheckpointError {
    #[error("checkpoint kind mismatch: expected '{expected}', found '{found}'")]
    KindMismatch { expected: String, found: String },

    #[error("checkpoint '{kind}' version mismatch: expected {expected}, found {found}")]
    VersionMismatch {
        kind: String,
        expected: u32,
        found: u32,
    },

    #[error("checkpoint could not be (de)serialized: {0}")]
    Serde(#[from] serde_json::Error),

    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

impl CheckpointEnvelope {
    pub fn wrap<C: CheckpointState>(state: &C) -> Result<Self, CheckpointError> {
        Ok(Self {
            kind: C::KIND.to_string(),
            version: C::VERSION,
            data: serde_json::to_value(state)?,
        })
    }

    pub fn unwrap_into<C: CheckpointState>(self) -> Result<C, CheckpointError> {
        if self.kind != C::KIND {
            return Err(CheckpointError::KindMismatch {
                expected: C::KIND.to_string(),
                found: self.kind,
            });
        }
        if self.version != C::VERSION {
            return Err(CheckpointError::VersionMismatch {
                kind: self.kind,
                expected: C::VERSION,
                found: self.version,
            });
        }
        Ok(serde_json::from_value(self.data)?)
    }
}

/// Returns `metadata` with `entries` inserted, preserving every other key.
///
/// Non-object metadata is replaced by an object holding only the new key.
pub fn merge_metadata(metadata: Option<Value>, entries: Vec<(&str, Value)>) -> Value {
    let mut map = match metadata {
        Some(Value::Object(map)) => map,
        _ => Map::new(),
    };
    for (key, value) in entries {
        map.insert(key.to_string(), value);
    }
    Value::Object(map)
}

/// Builds the metadata entries for a checkpoint written at `at`.
pub fn checkpoint_entries<C: CheckpointState>(
    state: &C,
    at: DateTime<Utc>,
) -> Result<Vec<(&'static str, Value)>, CheckpointError> {
    let envelope = CheckpointEnvelope::wrap(state)?;
    Ok(vec![
        (CHECKPOINT_KEY, serde_json::to_value(envelope)?),
        (CHECKPOINT_AT_KEY, Value::String(at.to_rfc3339())),
    ])
}

/// Extracts and validates the checkpoint from a metadata bag, if one exists.
pub fn read_checkpoint<C: CheckpointState>(
    metadata: Option<&Value>,
) -> Result<Option<C>, CheckpointError> {
    let Some(raw) = metadata.and_then(|m| m.get(CHECKPOINT_KEY)) else {
        return Ok(None);
    };
    if raw.is_null() {
        return Ok(None);
    }
    let envelope: CheckpointEnvelope = serde_json::from_value(raw.clone())?;
    envelope.unwrap_into().map(Some)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct PageCursor {
        offset: u32,
    }

    impl CheckpointState for PageCursor {
        const KIND: &'static str = "page_cursor";
        const VERSION: u32 = 2;
    }

    #[derive(Debug, Serialize, Deserialize)]
    struct OtherState {
        offset: u32,
    }

    impl CheckpointState for OtherState {
        const KIND: &'static str = "other";
        const VERSION: u32 = 2;
    }

    #[test]
    fn merge_preserves_existing_keys() {
        let merged = merge_metadata(
            Some(json!({"slug": "red-rock", "checkpoint": null})),
            vec![("current_item", json!("climb-1"))],
        );
        assert_eq!(merged["slug"], "red-rock");
        assert_eq!(merged["current_item"], "climb-1");
    }

    #[test]
    fn merge_replaces_non_object_metadata() {
        let merged = merge_metadata(Some(json!([1, 2])), vec![("k", json!(1))]);
        assert_eq!(merged, json!({"k": 1}));
    }

    #[test]
    fn checkpoint_reads_back_through_metadata() {
        let entries = checkpoint_entries(&PageCursor { offset: 40 }, Utc::now()).unwrap();
        let metadata = merge_metadata(Some(json!({"slug": "x"})), entries);

        assert!(metadata.get(CHECKPOINT_AT_KEY).is_some());
        let loaded: Option<PageCursor> = read_checkpoint(Some(&metadata)).unwrap();
        assert_eq!(loaded, Some(PageCursor { offset: 40 }));
    }

    #[test]
    fn missing_checkpoint_is_none() {
        let loaded: Option<PageCursor> = read_checkpoint(Some(&json!({"slug": "x"}))).unwrap();
        assert!(loaded.is_none());
        let loaded: Option<PageCursor> = read_checkpoint(None).unwrap();
        assert!(loaded.is_none());
    }

    #[test]
    fn rejects_other_kind() {
        let entries = checkpoint_entries(&OtherState { offset: 1 }, Utc::now()).unwrap();
        let metadata = merge_metadata(None, entries);
        let err = read_checkpoint::<PageCursor>(Some(&metadata)).unwrap_err();
        assert!(matches!(err, CheckpointError::KindMismatch { .. }));
    }

    #[test]
    fn rejects_older_version() {
        let metadata = json!({
            "checkpoint": {"kind": "page_cursor", "version": 1, "data": {"offset": 3}}
        });
        let err = read_checkpoint::<PageCursor>(Some(&metadata)).unwrap_err();
        assert!(matches!(
            err,
            CheckpointError::VersionMismatch {
                expected: 2,
                found: 1,
                ..
            }
        ));
    }
}
