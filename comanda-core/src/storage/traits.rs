// src/storage/traits.rs
//! Storage abstraction for the whole-document store
//!
//! Every backend persists exactly one [`Document`] and exposes the same two
//! capabilities: replace it, and load it back.
//!
//! ```text
//! DocumentStore (unified interface)
//!   ├── FileStorage    (one JSON file, atomic rename)
//!   ├── KvStorage<C>   (one key in a key-value service)
//!   ├── SqliteStorage  (one table per collection)
//!   └── MemoryStorage  (testing, in-process)
//! ```
//!
//! # No-cache policy
//!
//! Implementations must not cache. Each `load`/`read` goes back to the
//! backing medium and parses a fresh `Document`, so a caller never sees
//! another caller's in-memory edits and never reads stale data written by
//! another process. This does not make read-modify-write sequences
//! serializable: two concurrent writers race and the last one wins.

use tracing::info;

use crate::collections::default_document;
use crate::document::Document;
use crate::error::Result;

pub trait DocumentStore: Send + Sync {
    /// Short backend identifier used in logs and errors
    fn backend_name(&self) -> &'static str;

    /// Load the persisted document.
    ///
    /// Returns `NotFound` when the medium holds no document yet, and
    /// `StoreUnavailable` when it cannot be reached or its content does not
    /// parse as a document.
    fn load(&self) -> Result<Document>;

    /// Replace the persisted document as a whole.
    ///
    /// Either the full document is stored or the previous one is left in
    /// place. Failures are returned, never retried here.
    fn write(&self, doc: &Document) -> Result<()>;

    /// Load the persisted document, seeding a fresh target with the
    /// canonical default document instead of reporting `NotFound`.
    fn read(&self) -> Result<Document> {
        match self.load() {
            Err(e) if e.is_not_found() => {
                let seed = default_document();
                self.write(&seed)?;
                info!(backend = self.backend_name(), "seeded empty store with default document");
                Ok(seed)
            }
            other => other,
        }
    }
}

impl<S: DocumentStore + ?Sized> DocumentStore for Box<S> {
    fn backend_name(&self) -> &'static str {
        (**self).backend_name()
    }

    fn load(&self) -> Result<Document> {
        (**self).load()
    }

    fn write(&self, doc: &Document) -> Result<()> {
        (**self).write(doc)
    }

    fn read(&self) -> Result<Document> {
        (**self).read()
    }
}

impl<S: DocumentStore + ?Sized> DocumentStore for std::sync::Arc<S> {
    fn backend_name(&self) -> &'static str {
        (**self).backend_name()
    }

    fn load(&self) -> Result<Document> {
        (**self).load()
    }

    fn write(&self, doc: &Document) -> Result<()> {
        (**self).write(doc)
    }

    fn read(&self) -> Result<Document> {
        (**self).read()
    }
}
