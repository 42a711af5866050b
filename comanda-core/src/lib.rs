// comanda-core/src/lib.rs
// Document persistence and consistency layer for order management

pub mod aggregation;
pub mod backup;
pub mod collections;
pub mod config;
pub mod database;
pub mod document;
pub mod error;
pub mod guard;
pub mod storage;
pub mod value_utils;

// Public exports
pub use aggregation::{summarize_production, ProductionSummary};
pub use backup::{BackupInfo, BackupManager};
pub use collections::{default_document, REQUIRED_COLLECTIONS};
pub use config::{BackendKind, StoreConfig};
pub use database::DatabaseCore;
pub use document::{Document, Record};
pub use error::{ComandaError, Result};
pub use guard::{authorize_write, protect_users, Role};
pub use storage::{open_store, DocumentStore};
