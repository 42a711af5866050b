//! Deployment configuration
//!
//! Backend selection and backup policy are read from a TOML file, then
//! overridden from the environment:
//!
//! ```toml
//! [backend]
//! kind = "sqlite"          # file | kv | sqlite | memory
//! path = "data/db.sqlite"
//!
//! [backup]
//! dir = "data/backups"
//! retention = 30
//! ```
//!
//! | variable                    | field              |
//! |-----------------------------|--------------------|
//! | `COMANDA_BACKEND`           | `backend.kind`     |
//! | `COMANDA_DB_PATH`           | `backend.path`     |
//! | `COMANDA_KV_KEY`            | `backend.key`      |
//! | `COMANDA_BACKUP_DIR`        | `backup.dir`       |
//! | `COMANDA_BACKUP_RETENTION`  | `backup.retention` |

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use crate::error::{ComandaError, Result};
use crate::storage::kv_storage::DEFAULT_KEY;

pub const DEFAULT_RETENTION: usize = 30;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    File,
    Kv,
    Sqlite,
    Memory,
}

impl BackendKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            BackendKind::File => "file",
            BackendKind::Kv => "kv",
            BackendKind::Sqlite => "sqlite",
            BackendKind::Memory => "memory",
        }
    }

    fn default_path(&self) -> PathBuf {
        match self {
            BackendKind::File | BackendKind::Memory => PathBuf::from("data/db.json"),
            BackendKind::Kv => PathBuf::from("data/kv"),
            BackendKind::Sqlite => PathBuf::from("data/db.sqlite"),
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BackendKind {
    type Err = ComandaError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "file" | "json" => Ok(BackendKind::File),
            "kv" => Ok(BackendKind::Kv),
            "sqlite" | "sql" => Ok(BackendKind::Sqlite),
            "memory" => Ok(BackendKind::Memory),
            other => Err(ComandaError::Validation(format!(
                "unknown backend '{}' (expected file, kv, sqlite or memory)",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BackendConfig {
    pub kind: BackendKind,
    /// JSON file, key-value directory, or SQLite database, depending on `kind`.
    /// Defaults per kind when absent.
    pub path: Option<PathBuf>,
    pub key: String,
}

impl Default for BackendConfig {
    fn default() -> Self {
        BackendConfig {
            kind: BackendKind::File,
            path: None,
            key: DEFAULT_KEY.to_string(),
        }
    }
}

impl BackendConfig {
    pub fn resolved_path(&self) -> PathBuf {
        self.path.clone().unwrap_or_else(|| self.kind.default_path())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BackupConfig {
    pub dir: PathBuf,
    pub retention: usize,
}

impl Default for BackupConfig {
    fn default() -> Self {
        BackupConfig {
            dir: PathBuf::from("data/backups"),
            retention: DEFAULT_RETENTION,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub backend: BackendConfig,
    pub backup: BackupConfig,
}

impl StoreConfig {
    pub fn from_toml_str(s: &str) -> Result<Self> {
        let config: StoreConfig = toml::from_str(s)
            .map_err(|e| ComandaError::Validation(format!("invalid configuration: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            ComandaError::Validation(format!("cannot read config {}: {}", path.display(), e))
        })?;
        Self::from_toml_str(&content)
    }

    /// Load the file when given, then apply environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        config.apply_overrides(|name| std::env::var(name).ok())?;
        Ok(config)
    }

    /// Apply overrides from a variable lookup (the process environment in
    /// production).
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(kind) = lookup("COMANDA_BACKEND") {
            self.backend.kind = kind.parse()?;
        }
        if let Some(path) = lookup("COMANDA_DB_PATH") {
            self.backend.path = Some(PathBuf::from(path));
        }
        if let Some(key) = lookup("COMANDA_KV_KEY") {
            self.backend.key = key;
        }
        if let Some(dir) = lookup("COMANDA_BACKUP_DIR") {
            self.backup.dir = PathBuf::from(dir);
        }
        if let Some(retention) = lookup("COMANDA_BACKUP_RETENTION") {
            self.backup.retention = retention.trim().parse().map_err(|_| {
                ComandaError::Validation(format!("invalid backup retention '{}'", retention))
            })?;
        }
        self.validate()
    }

    pub fn validate(&self) -> Result<()> {
        if self.backup.retention == 0 {
            return Err(ComandaError::Validation(
                "backup retention must be at least 1".to_string(),
            ));
        }
        if self.backend.kind == BackendKind::Kv && self.backend.key.trim().is_empty() {
            return Err(ComandaError::Validation("kv key must not be empty".to_string()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_defaults() {
        let config = StoreConfig::default();
        assert_eq!(config.backend.kind, BackendKind::File);
        assert_eq!(config.backend.resolved_path(), PathBuf::from("data/db.json"));
        assert_eq!(config.backup.retention, DEFAULT_RETENTION);
    }

    #[test]
    fn test_parse_toml() {
        let config = StoreConfig::from_toml_str(
            r#"
            [backend]
            kind = "sqlite"
            path = "/var/lib/comanda/db.sqlite"

            [backup]
            retention = 7
            "#,
        )
        .unwrap();
        assert_eq!(config.backend.kind, BackendKind::Sqlite);
        assert_eq!(
            config.backend.resolved_path(),
            PathBuf::from("/var/lib/comanda/db.sqlite")
        );
        assert_eq!(config.backup.retention, 7);
        assert_eq!(config.backup.dir, PathBuf::from("data/backups"));
    }

    #[test]
    fn test_unknown_backend_rejected() {
        assert!(StoreConfig::from_toml_str("[backend]\nkind = \"postgres\"").is_err());
        assert!("postgres".parse::<BackendKind>().is_err());
    }

    #[test]
    fn test_overrides() {
        let env: HashMap<&str, &str> = [
            ("COMANDA_BACKEND", "kv"),
            ("COMANDA_DB_PATH", "/tmp/kv"),
            ("COMANDA_BACKUP_RETENTION", "5"),
        ]
        .into_iter()
        .collect();

        let mut config = StoreConfig::default();
        config
            .apply_overrides(|name| env.get(name).map(|v| v.to_string()))
            .unwrap();
        assert_eq!(config.backend.kind, BackendKind::Kv);
        assert_eq!(config.backend.resolved_path(), PathBuf::from("/tmp/kv"));
        assert_eq!(config.backup.retention, 5);
    }

    #[test]
    fn test_zero_retention_rejected() {
        let mut config = StoreConfig::default();
        let result = config.apply_overrides(|name| {
            (name == "COMANDA_BACKUP_RETENTION").then(|| "0".to_string())
        });
        assert!(matches!(result, Err(ComandaError::Validation(_))));
    }
}
