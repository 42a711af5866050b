// storage/kv_storage.rs
//! Key-value backend
//!
//! The whole document is serialized under a single key of a managed
//! key-value service. Only `get` and `set` of string values are required
//! from the service, which is what [`KvClient`] captures.
//!
//! ```text
//! KvStorage<C> (DocumentStore implementation)
//!      ↓
//! KvClient: MemoryKv | DirKv | external service client
//! ```

use parking_lot::RwLock;
use std::collections::HashMap;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::debug;

use super::{temp_path, DocumentStore};
use crate::document::Document;
use crate::error::{ComandaError, Result};

const BACKEND: &str = "kv";

/// Default key the document is stored under
pub const DEFAULT_KEY: &str = "comanda:db";

/// Narrow client interface of a key-value service
pub trait KvClient: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>>;
    fn set(&self, key: &str, value: String) -> Result<()>;
}

/// Process-local key-value map
#[derive(Default)]
pub struct MemoryKv {
    entries: RwLock<HashMap<String, String>>,
}

impl MemoryKv {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KvClient for MemoryKv {
    fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.entries.read().get(key).cloned())
    }

    fn set(&self, key: &str, value: String) -> Result<()> {
        self.entries.write().insert(key.to_string(), value);
        Ok(())
    }
}

/// Directory-backed key-value store: one file per key.
pub struct DirKv {
    dir: PathBuf,
}

impl DirKv {
    pub fn new<P: AsRef<Path>>(dir: P) -> Self {
        DirKv {
            dir: dir.as_ref().to_path_buf(),
        }
    }

    /// Keys may contain `:` or `/`; everything outside `[A-Za-z0-9_-]` maps
    /// to `_`.
    fn key_path(&self, key: &str) -> PathBuf {
        let file: String = key
            .chars()
            .map(|c| match c {
                'a'..='z' | 'A'..='Z' | '0'..='9' | '_' | '-' => c,
                _ => '_',
            })
            .collect();
        self.dir.join(format!("{}.kv", file))
    }
}

impl KvClient for DirKv {
    fn get(&self, key: &str) -> Result<Option<String>> {
        match fs::read_to_string(self.key_path(key)) {
            Ok(value) => Ok(Some(value)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(ComandaError::unavailable(BACKEND, e)),
        }
    }

    fn set(&self, key: &str, value: String) -> Result<()> {
        fs::create_dir_all(&self.dir).map_err(|e| ComandaError::unavailable(BACKEND, e))?;
        let path = self.key_path(key);
        let temp = temp_path(&path);
        fs::write(&temp, value)
            .and_then(|_| fs::rename(&temp, &path))
            .map_err(|e| {
                let _ = fs::remove_file(&temp);
                ComandaError::unavailable(BACKEND, format!("set {}: {}", key, e))
            })
    }
}

/// Document store over any [`KvClient`]
pub struct KvStorage<C: KvClient> {
    client: C,
    key: String,
}

impl<C: KvClient> KvStorage<C> {
    pub fn new(client: C) -> Self {
        Self::with_key(client, DEFAULT_KEY)
    }

    pub fn with_key(client: C, key: &str) -> Self {
        KvStorage {
            client,
            key: key.to_string(),
        }
    }

    pub fn client(&self) -> &C {
        &self.client
    }
}

impl<C: KvClient> DocumentStore for KvStorage<C> {
    fn backend_name(&self) -> &'static str {
        BACKEND
    }

    fn load(&self) -> Result<Document> {
        let value = self
            .client
            .get(&self.key)?
            .ok_or_else(|| ComandaError::NotFound(format!("key {}", self.key)))?;
        let doc = Document::from_json(&value).map_err(|e| {
            ComandaError::unavailable(BACKEND, format!("corrupt value at {}: {}", self.key, e))
        })?;
        debug!(key = %self.key, bytes = value.len(), "loaded document");
        Ok(doc)
    }

    fn write(&self, doc: &Document) -> Result<()> {
        let value = doc
            .to_json()
            .map_err(|e| ComandaError::unavailable(BACKEND, format!("serialize: {}", e)))?;
        let bytes = value.len();
        self.client.set(&self.key, value)?;
        debug!(key = %self.key, bytes, "wrote document");
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
    fn test_memory_kv_seed_and_round_trip() {
        let storage = KvStorage::new(MemoryKv::new());
        assert!(storage.load().unwrap_err().is_not_found());
        assert_eq!(storage.read().unwrap(), default_document());

        let doc = Document::from_value(json!({"pagos": [{"id": 1, "monto": 100}]})).unwrap();
        storage.write(&doc).unwrap();
        assert_eq!(storage.load().unwrap(), doc);
        assert!(storage.client().get(DEFAULT_KEY).unwrap().is_some());
    }

    #[test]
    fn test_corrupt_value_is_unavailable() {
        let kv = MemoryKv::new();
        kv.set("doc", "[1,2,3]".to_string()).unwrap();
        let storage = KvStorage::with_key(kv, "doc");
        assert!(storage.load().unwrap_err().is_retryable());
    }

    #[test]
    fn test_dir_kv_persists_across_instances() {
        let dir = TempDir::new().unwrap();
        let doc = Document::from_value(json!({"pedidos": [{"id": 3}]})).unwrap();

        KvStorage::new(DirKv::new(dir.path())).write(&doc).unwrap();
        let reopened = KvStorage::new(DirKv::new(dir.path()));
        assert_eq!(reopened.load().unwrap(), doc);
        assert!(dir.path().join("comanda_db.kv").exists());
    }
}
