//! Atomic JSON persistence helpers
//!
//! Every persisted document in the engine goes through the same discipline:
//! serialize to a sibling temp file, then atomically rename over the target.
//! A reader never observes a half-written document; a crash leaves either the
//! old file or the new one.

use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::{Error, Result};

/// Write a value as pretty JSON via temp-file-then-atomic-rename.
///
/// The parent directory is created if missing. The temp file lives next to
/// the target so the rename stays on one filesystem.
pub fn atomic_write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .map_err(|e| Error::persistence(path, format!("create directory: {e}")))?;
    }

    let temp_path = path.with_extension("json.tmp");

    let file = File::create(&temp_path)
        .map_err(|e| Error::persistence(&temp_path, format!("create temp file: {e}")))?;
    let mut writer = BufWriter::new(file);
    serde_json::to_writer_pretty(&mut writer, value)
        .map_err(|e| Error::persistence(path, format!("serialize: {e}")))?;
    writer
        .flush()
        .map_err(|e| Error::persistence(&temp_path, format!("flush: {e}")))?;

    fs::rename(&temp_path, path)
        .map_err(|e| Error::persistence(path, format!("atomic rename: {e}")))?;

    tracing::trace!(path = %path.display(), "document saved");
    Ok(())
}

/// Load a JSON document, returning `None` if the file does not exist.
///
/// A file that exists but cannot be parsed is a persistence error, not an
/// empty document; callers for whom corruption is benign decide that at
/// their own layer (the offset cursor does, the registry must not).
pub fn read_json<T: DeserializeOwned>(path: &Path) -> Result<Option<T>> {
    if !path.exists() {
        return Ok(None);
    }

    let file =
        File::open(path).map_err(|e| Error::persistence(path, format!("open: {e}")))?;
    let reader = BufReader::new(file);
    let value = serde_json::from_reader(reader)
        .map_err(|e| Error::persistence(path, format!("parse: {e}")))?;

    Ok(Some(value))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Default, PartialEq, Serialize, Deserialize)]
    struct Doc {
        name: String,
        count: u32,
    }

    #[test]
    fn test_atomic_write_and_read() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("doc.json");

        let doc = Doc {
            name: "alpha".to_string(),
            count: 3,
        };
        atomic_write_json(&path, &doc).unwrap();

        let loaded: Option<Doc> = read_json(&path).unwrap();
        assert_eq!(loaded, Some(doc));

        // No temp file left behind
        assert!(!path.with_extension("json.tmp").exists());
    }

    #[test]
    fn test_read_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("absent.json");

        let loaded: Option<Doc> = read_json(&path).unwrap();
        assert!(loaded.is_none());
    }

    #[test]
    fn test_read_corrupt_file_is_persistence_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("corrupt.json");
        std::fs::write(&path, "{not json").unwrap();

        let result: Result<Option<Doc>> = read_json(&path);
        assert!(matches!(result, Err(Error::Persistence { .. })));
    }

    #[test]
    fn test_write_creates_parent_directory() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/deeper/doc.json");

        atomic_write_json(&path, &Doc::default()).unwrap();
        assert!(path.exists());
    }
}
