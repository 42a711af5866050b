// storage/memory_storage.rs
//! Pure in-memory backend for fast testing
//!
//! The document is kept serialized, so every read parses a new copy exactly
//! like the persistent backends do and serialization failures surface at
//! write time.

use parking_lot::RwLock;

use super::DocumentStore;
use crate::document::Document;
use crate::error::{ComandaError, Result};

const BACKEND: &str = "memory";

/// In-memory storage backend (testing)
#[derive(Default)]
pub struct MemoryStorage {
    data: RwLock<Option<String>>,
}

impl MemoryStorage {
    /// Create an empty store; the first `read` seeds it
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store already holding `doc`
    pub fn with_document(doc: &Document) -> Result<Self> {
        let storage = Self::new();
        storage.write(doc)?;
        Ok(storage)
    }

    /// Raw serialized content, for byte-level comparisons in tests
    pub fn raw(&self) -> Option<String> {
        self.data.read().clone()
    }
}

impl DocumentStore for MemoryStorage {
    fn backend_name(&self) -> &'static str {
        BACKEND
    }

    fn load(&self) -> Result<Document> {
        let data = self.data.read();
        let json = data
            .as_deref()
            .ok_or_else(|| ComandaError::NotFound("in-memory document".to_string()))?;
        Document::from_json(json).map_err(|e| ComandaError::unavailable(BACKEND, e))
    }

    fn write(&self, doc: &Document) -> Result<()> {
        let json = doc
            .to_json()
            .map_err(|e| ComandaError::unavailable(BACKEND, e))?;
        *self.data.write() = Some(json);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_reads_are_independent_copies() {
        let storage = MemoryStorage::new();
        let mut first = storage.read().unwrap();
        first
            .collection_mut("pedidos")
            .push(json!({"id": 1}).as_object().unwrap().clone());

        let second = storage.read().unwrap();
        assert!(second.collection("pedidos").is_empty());
    }

    #[test]
    fn test_empty_store_load_is_not_found() {
        assert!(MemoryStorage::new().load().unwrap_err().is_not_found());
        assert!(MemoryStorage::new().raw().is_none());
    }
}
