//! Durable JSON state files.
//!
//! Three documents are maintained:
//!
//! ```text
//! <history_dir>/resolution_history.json   { "deal:template:field": [ResolutionRecord] }
//! <history_dir>/audit_trail.json          [AuditEntry]
//! <state_dir>/learning_state.json         { corrections, learning_model, last_saved }
//! ```
//!
//! Every write goes through [`write_json_atomic`]. Each file has a single
//! writer: the owning resolver or correction engine.

mod atomic;

use std::fs;
use std::io::ErrorKind;
use std::path::Path;

use serde::de::DeserializeOwned;

use crate::error::StorageError;

pub use atomic::{write_json_atomic, AtomicJsonWriter};
pub(crate) use atomic::remove_stale_temp_files;

/// Resolution history file name.
pub const HISTORY_FILE: &str = "resolution_history.json";
/// Audit trail file name.
pub const AUDIT_FILE: &str = "audit_trail.json";
/// Correction engine state file name.
pub const LEARNING_STATE_FILE: &str = "learning_state.json";

/// Reads a JSON document, returning `None` if the file does not exist.
///
/// # Errors
///
/// I/O errors other than "not found", and malformed JSON.
pub fn read_json_if_exists<T: DeserializeOwned>(path: &Path) -> Result<Option<T>, StorageError> {
    match fs::read(path) {
        Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
        Err(e) => Err(StorageError::io(path, e)),
    }
}

#[cfg(test)]
mod tests {
    use serde_json::{json, Value};
    use tempfile::tempdir;

    use super::*;

    #[test]
    fn missing_file_reads_as_none() {
        let dir = tempdir().unwrap();
        let read: Option<Value> = read_json_if_exists(&dir.path().join(HISTORY_FILE)).unwrap();
        assert!(read.is_none());
    }

    #[test]
    fn malformed_file_is_serialization_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join(AUDIT_FILE);
        fs::write(&path, b"[{\"half\":").unwrap();
        let err = read_json_if_exists::<Value>(&path).unwrap_err();
        assert!(matches!(err, StorageError::Serialization(_)));
    }

    #[test]
    fn written_document_reads_back() {
        let dir = tempdir().unwrap();
        let path = dir.path().join(LEARNING_STATE_FILE);
        write_json_atomic(&path, &json!({"total": 3})).unwrap();
        let read: Option<Value> = read_json_if_exists(&path).unwrap();
        assert_eq!(read, Some(json!({"total": 3})));
    }
}
