// src/storage/mod.rs
//! Document store backends

pub mod file_storage;
pub mod kv_storage;
pub mod memory_storage;
pub mod sqlite_storage;
pub mod traits;

pub use file_storage::FileStorage;
pub use kv_storage::{DirKv, KvClient, KvStorage, MemoryKv};
pub use memory_storage::MemoryStorage;
pub use sqlite_storage::SqliteStorage;
pub use traits::DocumentStore;

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::info;

use crate::config::{BackendConfig, BackendKind};
use crate::error::Result;

static TEMP_SEQ: AtomicU64 = AtomicU64::new(0);

/// Fresh sibling of `target` to write into before renaming over it.
///
/// Unique per process and per call, so concurrent writers never share a
/// temporary file and only race on the final rename.
pub(crate) fn temp_path(target: &Path) -> PathBuf {
    let seq = TEMP_SEQ.fetch_add(1, Ordering::Relaxed);
    let mut name = target.as_os_str().to_os_string();
    name.push(format!(".{}.{}.tmp", std::process::id(), seq));
    PathBuf::from(name)
}

/// Open the backend selected by configuration.
///
/// This is the only place that branches on the backend kind; everything
/// above it works against `dyn DocumentStore`.
pub fn open_store(config: &BackendConfig) -> Result<Box<dyn DocumentStore>> {
    let path = config.resolved_path();
    let store: Box<dyn DocumentStore> = match config.kind {
        BackendKind::File => Box::new(FileStorage::new(&path)),
        BackendKind::Kv => Box::new(KvStorage::with_key(DirKv::new(&path), &config.key)),
        BackendKind::Sqlite => Box::new(SqliteStorage::open(&path)?),
        BackendKind::Memory => Box::new(MemoryStorage::new()),
    };
    info!(backend = store.backend_name(), path = %path.display(), "opened document store");
    Ok(store)
}
