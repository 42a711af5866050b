// storage/sqlite_storage.rs
//! Relational backend: one table per collection
//!
//! ```text
//! _meta         (key, value)                      store initialization marker
//! _collections  (name, position, table_name)      collection catalog and order
//! c<n>_<name>   (position, id, data)              one row per record
//! ```
//!
//! Records are kept as JSON in `data` with their `id` mirrored into a column,
//! and rebuilt in `position` order on load. Collections are listed in the
//! catalog so empty ones survive a round trip. A write replaces every table
//! inside one transaction.

use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension, Transaction};
use std::path::Path;
use tracing::debug;

use super::DocumentStore;
use crate::document::{record_id, Document, Record};
use crate::error::{ComandaError, Result};

const BACKEND: &str = "sqlite";

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS _meta (
    key   TEXT PRIMARY KEY,
    value TEXT NOT NULL
);
CREATE TABLE IF NOT EXISTS _collections (
    name       TEXT PRIMARY KEY,
    position   INTEGER NOT NULL,
    table_name TEXT NOT NULL UNIQUE
);
";

fn sql_err(e: rusqlite::Error) -> ComandaError {
    ComandaError::unavailable(BACKEND, e)
}

/// Table holding the rows of the collection at catalog `position`.
///
/// SQLite compares table names case-insensitively, so the position prefix is
/// what keeps "pedidos" and "Pedidos" apart; the name part is for humans.
pub fn table_name(position: usize, collection: &str) -> String {
    let readable: String = collection
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect();
    format!("c{}_{}", position, readable)
}

pub struct SqliteStorage {
    conn: Mutex<Connection>,
}

impl SqliteStorage {
    /// Open (or create) the database file at `path`
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        if let Some(parent) = path.as_ref().parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| ComandaError::unavailable(BACKEND, e))?;
        }
        let conn = Connection::open(path).map_err(sql_err)?;
        Self::init(conn)
    }

    /// Private in-memory database, for tests
    pub fn open_in_memory() -> Result<Self> {
        Self::init(Connection::open_in_memory().map_err(sql_err)?)
    }

    fn init(conn: Connection) -> Result<Self> {
        conn.execute_batch(SCHEMA).map_err(sql_err)?;
        Ok(SqliteStorage {
            conn: Mutex::new(conn),
        })
    }

    fn replace_all(tx: &Transaction<'_>, doc: &Document) -> Result<()> {
        let existing: Vec<String> = {
            let mut stmt = tx
                .prepare("SELECT table_name FROM _collections")
                .map_err(sql_err)?;
            let rows = stmt
                .query_map([], |row| row.get::<_, String>(0))
                .map_err(sql_err)?;
            rows.collect::<rusqlite::Result<_>>().map_err(sql_err)?
        };
        for table in existing {
            tx.execute_batch(&format!("DROP TABLE IF EXISTS \"{}\"", table))
                .map_err(sql_err)?;
        }
        tx.execute("DELETE FROM _collections", []).map_err(sql_err)?;

        for (position, (name, records)) in doc.iter().enumerate() {
            let table = table_name(position, name);
            tx.execute_batch(&format!(
                "CREATE TABLE \"{}\" (position INTEGER PRIMARY KEY, id INTEGER, data TEXT NOT NULL)",
                table
            ))
            .map_err(sql_err)?;
            tx.execute(
                "INSERT INTO _collections (name, position, table_name) VALUES (?1, ?2, ?3)",
                params![name, position as i64, table],
            )
            .map_err(sql_err)?;

            let mut insert = tx
                .prepare(&format!(
                    "INSERT INTO \"{}\" (position, id, data) VALUES (?1, ?2, ?3)",
                    table
                ))
                .map_err(sql_err)?;
            for (row, record) in records.iter().enumerate() {
                let data = serde_json::to_string(record).map_err(|e| {
                    ComandaError::unavailable(BACKEND, format!("serialize {}: {}", name, e))
                })?;
                insert
                    .execute(params![row as i64, record_id(record), data])
                    .map_err(sql_err)?;
            }
        }

        tx.execute(
            "INSERT OR REPLACE INTO _meta (key, value) VALUES ('initialized', ?1)",
            params![chrono::Utc::now().to_rfc3339()],
        )
        .map_err(sql_err)?;
        Ok(())
    }

    fn load_collection(conn: &Connection, name: &str, table: &str) -> Result<Vec<Record>> {
        let mut stmt = conn
            .prepare(&format!("SELECT data FROM \"{}\" ORDER BY position", table))
            .map_err(sql_err)?;
        let rows = stmt
            .query_map([], |row| row.get::<_, String>(0))
            .map_err(sql_err)?;

        let mut records = Vec::new();
        for data in rows {
            let data = data.map_err(sql_err)?;
            let record: Record = serde_json::from_str(&data).map_err(|e| {
                ComandaError::unavailable(BACKEND, format!("corrupt row in {}: {}", name, e))
            })?;
            records.push(record);
        }
        Ok(records)
    }
}

impl DocumentStore for SqliteStorage {
    fn backend_name(&self) -> &'static str {
        BACKEND
    }

    fn load(&self) -> Result<Document> {
        let conn = self.conn.lock();

        let initialized: Option<String> = conn
            .query_row("SELECT value FROM _meta WHERE key = 'initialized'", [], |row| {
                row.get(0)
            })
            .optional()
            .map_err(sql_err)?;
        if initialized.is_none() {
            return Err(ComandaError::NotFound("sqlite document".to_string()));
        }

        let catalog: Vec<(String, String)> = {
            let mut stmt = conn
                .prepare("SELECT name, table_name FROM _collections ORDER BY position")
                .map_err(sql_err)?;
            let rows = stmt
                .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))
                .map_err(sql_err)?;
            rows.collect::<rusqlite::Result<_>>().map_err(sql_err)?
        };

        let mut doc = Document::new();
        for (name, table) in catalog {
            let records = Self::load_collection(&conn, &name, &table)?;
            doc.set_collection(&name, records);
        }
        debug!(collections = doc.len(), records = doc.record_count(), "loaded document");
        Ok(doc)
    }

    fn write(&self, doc: &Document) -> Result<()> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction().map_err(sql_err)?;
        Self::replace_all(&tx, doc)?;
        tx.commit().map_err(sql_err)?;
        debug!(collections = doc.len(), records = doc.record_count(), "wrote document");
        Ok(())
    }
}
