// storage/file_storage.rs
//! Local-file backend
//!
//! ```text
//! FileStorage (DocumentStore implementation)
//!      ↓
//! db.json  (pretty-printed document)
//! ```
//!
//! Writes land in a temporary sibling first and are renamed over the target,
//! so a crash mid-write leaves either the old or the new document, never a
//! truncated one. Each write uses its own temporary name, so concurrent
//! writers only race on the final rename.

use std::fs::{self, File};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use tracing::debug;

use super::{temp_path, DocumentStore};
use crate::document::Document;
use crate::error::{ComandaError, Result};

const BACKEND: &str = "file";

pub struct FileStorage {
    path: PathBuf,
}

impl FileStorage {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        FileStorage {
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl DocumentStore for FileStorage {
    fn backend_name(&self) -> &'static str {
        BACKEND
    }

    fn load(&self) -> Result<Document> {
        let content = match fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(ComandaError::NotFound(format!(
                    "document file {}",
                    self.path.display()
                )));
            }
            Err(e) => return Err(ComandaError::unavailable(BACKEND, e)),
        };

        let doc = Document::from_json(&content).map_err(|e| {
            ComandaError::unavailable(
                BACKEND,
                format!("corrupt document {}: {}", self.path.display(), e),
            )
        })?;
        debug!(path = %self.path.display(), bytes = content.len(), "loaded document");
        Ok(doc)
    }

    fn write(&self, doc: &Document) -> Result<()> {
        let json = doc
            .to_json_pretty()
            .map_err(|e| ComandaError::unavailable(BACKEND, format!("serialize: {}", e)))?;

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| ComandaError::unavailable(BACKEND, e))?;
        }

        let temp = temp_path(&self.path);
        let written = File::create(&temp)
            .and_then(|mut file| {
                file.write_all(json.as_bytes())?;
                file.sync_all()
            })
            .and_then(|_| fs::rename(&temp, &self.path));

        if let Err(e) = written {
            let _ = fs::remove_file(&temp);
            return Err(ComandaError::unavailable(
                BACKEND,
                format!("write {}: {}", self.path.display(), e),
            ));
        }

        debug!(path = %self.path.display(), bytes = json.len(), "wrote document");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collections::default_document;
    use serde_json::json;
    use tempfile::TempDir;

    #[test]
    fn test_load_missing_file_is_not_found() {
        let dir = TempDir::new().unwrap();
        let storage = FileStorage::new(dir.path().join("db.json"));
        assert!(storage.load().unwrap_err().is_not_found());
    }

    #[test]
    fn test_read_seeds_fresh_target() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("db.json");
        let storage = FileStorage::new(&path);

        assert_eq!(storage.read().unwrap(), default_document());
        assert!(path.exists());
        assert_eq!(storage.load().unwrap(), default_document());
    }

    #[test]
    fn test_corrupt_file_is_unavailable() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("db.json");
        fs::write(&path, "{ not json").unwrap();

        let err = FileStorage::new(&path).load().unwrap_err();
        assert!(err.is_retryable());
    }

    #[test]
    fn test_write_leaves_no_temp_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("db.json");
        let storage = FileStorage::new(&path);

        let doc = Document::from_value(json!({"pedidos": [{"id": 1}]})).unwrap();
        storage.write(&doc).unwrap();

        let files: Vec<_> = fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name())
            .collect();
        assert_eq!(files, vec![std::ffi::OsString::from("db.json")]);
        assert_eq!(storage.load().unwrap(), doc);
    }
}
