//! Snapshot backup, rotation and restore
//!
//! Snapshots are JSON copies of the whole document stored as
//! `backup-<UTC timestamp>.json` in a backup directory (`_002`, `_003`, ...
//! is appended before `.json` when two land on the same millisecond). They are taken
//! through the [`DocumentStore`] interface, so the same manager works for
//! every backend. Backups are not coordinated with concurrent writers: a
//! snapshot reflects whatever document was persisted when it was read.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use crate::config::{BackupConfig, DEFAULT_RETENTION};
use crate::document::Document;
use crate::error::{ComandaError, Result};
use crate::storage::DocumentStore;

const PREFIX: &str = "backup-";
const SUFFIX: &str = ".json";

/// One entry of [`BackupManager::list`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BackupInfo {
    pub filename: String,
    pub timestamp: DateTime<Utc>,
    pub size: u64,
}

pub struct BackupManager<S: DocumentStore> {
    store: S,
    dir: PathBuf,
    retention: usize,
}

fn is_backup_name(name: &str) -> bool {
    name.starts_with(PREFIX) && name.ends_with(SUFFIX) && name.len() > PREFIX.len() + SUFFIX.len()
}

/// `backup-<stamp>.json`, then `backup-<stamp>_002.json` and so on for
/// snapshots taken within the same millisecond. `_` sorts after `.`, so
/// filename order matches creation order.
fn snapshot_name(stamp: &str, attempt: u32) -> String {
    if attempt <= 1 {
        format!("{}{}{}", PREFIX, stamp, SUFFIX)
    } else {
        format!("{}{}_{:03}{}", PREFIX, stamp, attempt, SUFFIX)
    }
}

/// Run `fill` against a freshly created snapshot file, deleting the file
/// when it fails so a partial snapshot is never listed.
fn fill_or_remove<F>(path: &Path, fill: F) -> std::io::Result<()>
where
    F: FnOnce() -> std::io::Result<()>,
{
    let result = fill();
    if result.is_err() {
        let _ = fs::remove_file(path);
    }
    result
}

impl<S: DocumentStore> BackupManager<S> {
    pub fn new<P: AsRef<Path>>(store: S, dir: P) -> Self {
        BackupManager {
            store,
            dir: dir.as_ref().to_path_buf(),
            retention: DEFAULT_RETENTION,
        }
    }

    pub fn from_config(store: S, config: &BackupConfig) -> Self {
        Self::new(store, &config.dir).with_retention(config.retention)
    }

    /// Keep at most `retention` snapshots (at least one).
    pub fn with_retention(mut self, retention: usize) -> Self {
        self.retention = retention.max(1);
        self
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn retention(&self) -> usize {
        self.retention
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Snapshot the persisted document and prune old snapshots.
    ///
    /// Returns the snapshot's filename.
    pub fn backup(&self) -> Result<String> {
        let doc = self.store.read()?;
        let filename = self.write_snapshot(&doc)?;
        info!(filename = %filename, records = doc.record_count(), "backup created");
        self.prune()?;
        Ok(filename)
    }

    /// Snapshots, newest first
    pub fn list(&self) -> Result<Vec<BackupInfo>> {
        let mut backups = self.scan()?;
        backups.sort_by(|a, b| {
            b.timestamp
                .cmp(&a.timestamp)
                .then_with(|| b.filename.cmp(&a.filename))
        });
        Ok(backups)
    }

    /// Replace the live document with a snapshot.
    ///
    /// The snapshot is read and parsed before anything else happens; a
    /// missing or unreadable snapshot leaves the live document untouched.
    /// A safety backup of the current state is taken before overwriting; it
    /// does not prune, so restoring never deletes a snapshot.
    pub fn restore(&self, filename: &str) -> Result<()> {
        let path = self.snapshot_path(filename)?;
        let content = match fs::read_to_string(&path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(ComandaError::NotFound(format!("backup {}", filename)));
            }
            Err(e) => return Err(ComandaError::backup(filename, e)),
        };
        let doc = Document::from_json(&content)
            .map_err(|e| ComandaError::backup(filename, format!("invalid snapshot: {}", e)))?;

        // No pruning: the snapshot being restored may be the oldest one
        let current = self.store.read()?;
        let safety = self.write_snapshot(&current)?;
        self.store.write(&doc)?;
        info!(filename, safety = %safety, "restored backup");
        Ok(())
    }

    // ========================================================================
    // INTERNALS
    // ========================================================================

    /// Resolve a snapshot filename inside the backup directory, refusing
    /// anything that could point elsewhere.
    fn snapshot_path(&self, filename: &str) -> Result<PathBuf> {
        let safe = is_backup_name(filename)
            && !filename.contains('/')
            && !filename.contains('\\')
            && !filename.contains("..");
        if !safe {
            return Err(ComandaError::NotFound(format!("backup {}", filename)));
        }
        Ok(self.dir.join(filename))
    }

    fn write_snapshot(&self, doc: &Document) -> Result<String> {
        fs::create_dir_all(&self.dir)
            .map_err(|e| ComandaError::backup(&self.dir.display().to_string(), e))?;

        let json = doc
            .to_json_pretty()
            .map_err(|e| ComandaError::unavailable(self.store.backend_name(), e))?;

        let stamp = Utc::now().format("%Y-%m-%dT%H-%M-%S-%3fZ").to_string();
        let mut attempt = self.last_attempt(&stamp) + 1;
        let mut file = loop {
            let filename = snapshot_name(&stamp, attempt);
            match File::options()
                .write(true)
                .create_new(true)
                .open(self.dir.join(&filename))
            {
                Ok(file) => break file,
                Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => attempt += 1,
                Err(e) => return Err(ComandaError::backup(&filename, e)),
            }
        };
        let filename = snapshot_name(&stamp, attempt);

        fill_or_remove(&self.dir.join(&filename), || {
            file.write_all(json.as_bytes())?;
            file.sync_all()
        })
        .map_err(|e| ComandaError::backup(&filename, e))?;
        Ok(filename)
    }

    /// Highest suffix already used for `stamp`, 0 when none.
    ///
    /// Continuing from the highest one means a pruned base name is never
    /// reissued, which would sort it before its same-instant siblings.
    fn last_attempt(&self, stamp: &str) -> u32 {
        let base = format!("{}{}", PREFIX, stamp);
        let Ok(entries) = fs::read_dir(&self.dir) else {
            return 0;
        };
        entries
            .filter_map(|entry| entry.ok())
            .filter_map(|entry| {
                let name = entry.file_name().to_string_lossy().to_string();
                let rest = name.strip_prefix(&base)?.strip_suffix(SUFFIX)?;
                match rest.strip_prefix('_') {
                    Some(n) => n.parse().ok(),
                    None if rest.is_empty() => Some(1),
                    None => None,
                }
            })
            .max()
            .unwrap_or(0)
    }

    fn scan(&self) -> Result<Vec<BackupInfo>> {
        let entries = match fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(ComandaError::backup(&self.dir.display().to_string(), e)),
        };

        let mut backups = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| ComandaError::backup(&self.dir.display().to_string(), e))?;
            let filename = entry.file_name().to_string_lossy().to_string();
            if !is_backup_name(&filename) {
                continue;
            }
            let meta = entry
                .metadata()
                .map_err(|e| ComandaError::backup(&filename, e))?;
            if !meta.is_file() {
                continue;
            }
            let modified = meta
                .modified()
                .map_err(|e| ComandaError::backup(&filename, e))?;
            backups.push(BackupInfo {
                filename,
                timestamp: DateTime::<Utc>::from(modified),
                size: meta.len(),
            });
        }
        Ok(backups)
    }

    /// Delete the oldest snapshots beyond the retention count.
    ///
    /// Order is by modification time, then filename. A file that cannot be
    /// removed is logged and skipped.
    fn prune(&self) -> Result<usize> {
        let backups = self.list()?;
        let mut removed = 0;
        for old in backups.iter().skip(self.retention) {
            match fs::remove_file(self.dir.join(&old.filename)) {
                Ok(()) => removed += 1,
                Err(e) => warn!(filename = %old.filename, error = %e, "failed to prune backup"),
            }
        }
        if removed > 0 {
            info!(removed, retention = self.retention, "pruned old backups");
        }
        Ok(removed)
    }
}
