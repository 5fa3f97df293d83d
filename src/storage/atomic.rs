//! Crash-safe JSON document writes.
//!
//! A document is written to a uniquely named temporary file in the target
//! directory, flushed, fsynced, then renamed over the target. Readers see
//! either the previous document or the new one, never a partial write.

use std::fs::{self, File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use serde::Serialize;
use uuid::Uuid;

use crate::error::StorageError;

/// Marker embedded in temporary file names.
pub(crate) const TEMP_MARKER: &str = ".tmp.";

/// Writes one JSON document atomically.
///
/// Dropping the writer without calling [`AtomicJsonWriter::commit`]
/// removes the temporary file.
pub struct AtomicJsonWriter {
    temp_path: Option<PathBuf>,
    final_path: PathBuf,
    writer: Option<BufWriter<File>>,
}

impl AtomicJsonWriter {
    /// Opens a temporary file next to `final_path`, creating the directory
    /// if needed.
    ///
    /// # Errors
    ///
    /// `StorageError::Io` if the directory or temporary file cannot be
    /// created.
    pub fn create(final_path: impl Into<PathBuf>) -> Result<Self, StorageError> {
        let final_path = final_path.into();
        if let Some(dir) = final_path.parent().filter(|d| !d.as_os_str().is_empty()) {
            fs::create_dir_all(dir).map_err(|e| StorageError::io(dir, e))?;
        }

        let file_name = final_path
            .file_name()
            .map_or_else(|| "document".into(), |n| n.to_string_lossy().into_owned());
        let temp_path = final_path.with_file_name(format!("{file_name}{TEMP_MARKER}{}", Uuid::new_v4()));

        let file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&temp_path)
            .map_err(|e| StorageError::io(&temp_path, e))?;

        Ok(Self {
            temp_path: Some(temp_path),
            final_path,
            writer: Some(BufWriter::new(file)),
        })
    }

    /// Serializes `value` into the temporary file.
    ///
    /// # Errors
    ///
    /// Serialization or I/O failure.
    pub fn write<T: Serialize>(&mut self, value: &T) -> Result<(), StorageError> {
        let writer = self.writer.as_mut().ok_or_else(consumed)?;
        serde_json::to_writer_pretty(writer, value)?;
        Ok(())
    }

    /// Flush, fsync and rename. This is the commit point.
    ///
    /// # Errors
    ///
    /// I/O failure; the previous document at the target path is untouched.
    pub fn commit(mut self) -> Result<PathBuf, StorageError> {
        let mut writer = self.writer.take().ok_or_else(consumed)?;
        let temp_path = self.temp_path.take().ok_or_else(consumed)?;

        let finish = || -> std::io::Result<()> {
            writer.flush()?;
            writer.get_ref().sync_all()?;
            drop(writer);
            fs::rename(&temp_path, &self.final_path)
        };

        if let Err(e) = finish() {
            let _ = fs::remove_file(&temp_path);
            return Err(StorageError::io(&self.final_path, e));
        }
        Ok(self.final_path.clone())
    }
}

impl Drop for AtomicJsonWriter {
    fn drop(&mut self) {
        // Best-effort cleanup if not committed.
        self.writer.take();
        if let Some(ref temp_path) = self.temp_path {
            let _ = fs::remove_file(temp_path);
        }
    }
}

fn consumed() -> StorageError {
    StorageError::io(
        PathBuf::new(),
        std::io::Error::new(std::io::ErrorKind::Other, "writer already consumed"),
    )
}

/// Serializes `value` to `path` atomically.
///
/// # Errors
///
/// Directory creation, serialization, write, fsync or rename failure.
pub fn write_json_atomic<T: Serialize>(path: &Path, value: &T) -> Result<(), StorageError> {
    let mut writer = AtomicJsonWriter::create(path)?;
    writer.write(value)?;
    writer.commit()?;
    Ok(())
}

/// Removes temporary files left behind by an interrupted write.
pub(crate) fn remove_stale_temp_files(dir: &Path) {
    let Ok(entries) = fs::read_dir(dir) else {
        return;
    };
    for entry in entries.flatten() {
        let path = entry.path();
        let is_temp = path
            .file_name()
            .and_then(|n| n.to_str())
            .is_some_and(|n| n.contains(TEMP_MARKER));
        if is_temp {
            let _ = fs::remove_file(&path);
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use tempfile::tempdir;

    use super::*;

    fn temp_files(dir: &Path) -> usize {
        fs::read_dir(dir)
            .unwrap()
            .flatten()
            .filter(|e| e.file_name().to_string_lossy().contains(TEMP_MARKER))
            .count()
    }

    #[test]
    fn commit_replaces_target() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("state.json");

        write_json_atomic(&path, &json!({"v": 1})).unwrap();
        write_json_atomic(&path, &json!({"v": 2})).unwrap();

        let read: serde_json::Value = serde_json::from_slice(&fs::read(&path).unwrap()).unwrap();
        assert_eq!(read["v"], 2);
        assert_eq!(temp_files(dir.path()), 0);
    }

    #[test]
    fn creates_missing_directory() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested/deeper/state.json");
        write_json_atomic(&path, &json!([1, 2, 3])).unwrap();
        assert!(path.exists());
    }

    #[test]
    fn dropped_writer_leaves_previous_document() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("state.json");
        write_json_atomic(&path, &json!({"v": "old"})).unwrap();

        {
            let mut writer = AtomicJsonWriter::create(&path).unwrap();
            writer.write(&json!({"v": "new"})).unwrap();
            assert_eq!(temp_files(dir.path()), 1);
            // Dropped without commit: simulates a crash before rename.
        }

        let read: serde_json::Value = serde_json::from_slice(&fs::read(&path).unwrap()).unwrap();
        assert_eq!(read["v"], "old");
        assert_eq!(temp_files(dir.path()), 0);
    }

    #[test]
    fn stale_temp_files_are_removed() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join(format!("state.json{TEMP_MARKER}abc")), b"{").unwrap();
        fs::write(dir.path().join("state.json"), b"{}").unwrap();

        remove_stale_temp_files(dir.path());
        assert_eq!(temp_files(dir.path()), 0);
        assert!(dir.path().join("state.json").exists());
    }
}
