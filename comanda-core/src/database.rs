// comanda-core/src/database.rs
// Database facade: registry on read, guard on write

use serde_json::{Map, Value};
use tracing::{debug, info, warn};

use crate::aggregation::{parse_date, summarize_production, ProductionSummary};
use crate::collections::{default_document, ensure_collections, USERS};
use crate::document::{record_id, Document, Record};
use crate::error::{ComandaError, Result};
use crate::guard::{authorize_write, check_unique_ids, protect_users, Role};
use crate::storage::DocumentStore;

/// Entry point for callers of the document layer.
///
/// Generic over the storage backend:
/// - `DatabaseCore<FileStorage>` / `KvStorage<_>` / `SqliteStorage` in production
/// - `DatabaseCore<MemoryStorage>` for tests
/// - `DatabaseCore<Box<dyn DocumentStore>>` when the backend comes from configuration
///
/// No lock is held between the read and the write of a guarded operation.
/// Two callers racing on the same document both pass the guard against the
/// state they read, and the later write wins.
pub struct DatabaseCore<S: DocumentStore> {
    store: S,
}

impl<S: DocumentStore> DatabaseCore<S> {
    pub fn new(store: S) -> Self {
        DatabaseCore { store }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn into_store(self) -> S {
        self.store
    }

    // ========================================================================
    // WHOLE-DOCUMENT OPERATIONS
    // ========================================================================

    /// Read the whole document.
    ///
    /// Collections missing from the persisted document are added empty and
    /// the patched document is written back before it is returned.
    pub fn read(&self) -> Result<Document> {
        let mut doc = self.store.read()?;
        let added = ensure_collections(&mut doc);
        if !added.is_empty() {
            self.store.write(&doc)?;
            info!(collections = ?added, "added missing collections to stored document");
        }
        Ok(doc)
    }

    /// Replace the whole document on behalf of `role`.
    ///
    /// The submitted `users` collection is ignored; the persisted one is kept.
    pub fn write(&self, doc: Document, role: Role) -> Result<()> {
        let current = self.read()?;
        self.guarded_write(&current, doc, role)
    }

    /// Replace only the collections present in `patch`.
    ///
    /// Collections the patch does not name are kept as persisted. The merged
    /// document goes through the same guard as a full write.
    pub fn write_partial(&self, patch: Document, role: Role) -> Result<()> {
        let current = self.read()?;
        let mut merged = current.clone();
        for (name, records) in patch.iter() {
            if name == USERS {
                continue;
            }
            merged.set_collection(name, records.to_vec());
        }
        self.guarded_write(&current, merged, role)
    }

    /// Every write path ends here: ids must be unique, the role must allow
    /// the change, users are restored, and the `_ids` marks only move up.
    fn guarded_write(&self, current: &Document, doc: Document, role: Role) -> Result<()> {
        let checked = check_unique_ids(current, &doc).and_then(|_| authorize_write(current, &doc, role));
        if let Err(e) = checked {
            warn!(role = %role, error = %e, "rejected write");
            return Err(e);
        }
        let mut doc = protect_users(current, doc);
        doc.carry_sequences(current);
        self.store.write(&doc)?;
        debug!(role = %role, records = doc.record_count(), "document written");
        Ok(())
    }

    // ========================================================================
    // RECORD OPERATIONS
    // ========================================================================

    fn check_not_users(collection: &str) -> Result<()> {
        if collection == USERS {
            return Err(ComandaError::Validation(
                "users can only be changed through user management".to_string(),
            ));
        }
        Ok(())
    }

    /// Append a record with a freshly allocated id (see [`Document::next_id`]).
    ///
    /// Any `id` in `fields` is replaced. Returns the stored record.
    pub fn insert_record(&self, collection: &str, fields: Record, role: Role) -> Result<Record> {
        Self::check_not_users(collection)?;
        let current = self.read()?;
        let mut doc = current.clone();
        let id = doc.allocate_id(collection);

        let mut record = Map::new();
        record.insert("id".to_string(), Value::from(id));
        record.extend(fields.into_iter().filter(|(k, _)| k != "id"));

        doc.collection_mut(collection).push(record.clone());
        self.guarded_write(&current, doc, role)?;
        Ok(record)
    }

    /// Merge `fields` into the record with `id`. The id itself cannot change.
    pub fn update_record(
        &self,
        collection: &str,
        id: i64,
        fields: Record,
        role: Role,
    ) -> Result<Record> {
        Self::check_not_users(collection)?;
        let current = self.read()?;
        let mut doc = current.clone();

        let record = doc
            .collection_mut(collection)
            .iter_mut()
            .find(|r| record_id(r) == Some(id))
            .ok_or_else(|| ComandaError::NotFound(format!("{} record {}", collection, id)))?;
        for (key, value) in fields {
            if key != "id" {
                record.insert(key, value);
            }
        }
        let updated = record.clone();

        self.guarded_write(&current, doc, role)?;
        Ok(updated)
    }

    /// Remove the record with `id`. Only permitted to `Admin`.
    pub fn delete_record(&self, collection: &str, id: i64, role: Role) -> Result<Record> {
        Self::check_not_users(collection)?;
        let current = self.read()?;
        let mut doc = current.clone();

        let records = doc.collection_mut(collection);
        let index = records
            .iter()
            .position(|r| record_id(r) == Some(id))
            .ok_or_else(|| ComandaError::NotFound(format!("{} record {}", collection, id)))?;
        let removed = records.remove(index);

        self.guarded_write(&current, doc, role)?;
        Ok(removed)
    }

    // ========================================================================
    // USER MANAGEMENT
    // ========================================================================

    fn require_admin(caller: Role) -> Result<()> {
        if caller != Role::Admin {
            return Err(ComandaError::AuthorizationViolation {
                collection: USERS.to_string(),
                missing_ids: Vec::new(),
            });
        }
        Ok(())
    }

    /// Look up a user by username
    pub fn find_user(&self, username: &str) -> Result<Option<Record>> {
        let doc = self.read()?;
        Ok(doc
            .collection(USERS)
            .iter()
            .find(|u| u.get("username").and_then(Value::as_str) == Some(username))
            .cloned())
    }

    /// Register a user. `password_hash` is produced by the authentication
    /// service; this layer only stores it.
    pub fn create_user(
        &self,
        username: &str,
        password_hash: &str,
        role: Role,
        caller: Role,
    ) -> Result<Record> {
        Self::require_admin(caller)?;
        let username = username.trim();
        if username.is_empty() || password_hash.is_empty() {
            return Err(ComandaError::Validation(
                "username and password hash are required".to_string(),
            ));
        }

        let mut doc = self.read()?;
        let taken = doc
            .collection(USERS)
            .iter()
            .any(|u| u.get("username").and_then(Value::as_str) == Some(username));
        if taken {
            return Err(ComandaError::Validation(format!(
                "username '{}' already exists",
                username
            )));
        }

        let mut user = Map::new();
        user.insert("id".to_string(), Value::from(doc.allocate_id(USERS)));
        user.insert("username".to_string(), Value::from(username));
        user.insert("role".to_string(), Value::from(role.as_str()));
        user.insert("passwordHash".to_string(), Value::from(password_hash));

        doc.collection_mut(USERS).push(user.clone());
        self.store.write(&doc)?;
        info!(username, role = %role, "user created");
        Ok(user)
    }

    /// Remove a user. The last administrator cannot be removed.
    pub fn delete_user(&self, id: i64, caller: Role) -> Result<Record> {
        Self::require_admin(caller)?;
        let current = self.read()?;
        let mut doc = current.clone();
        let users = doc.collection_mut(USERS);

        let index = users
            .iter()
            .position(|u| record_id(u) == Some(id))
            .ok_or_else(|| ComandaError::NotFound(format!("user {}", id)))?;

        let is_admin = |u: &Record| u.get("role").and_then(Value::as_str) == Some(Role::Admin.as_str());
        if is_admin(&users[index]) && users.iter().filter(|u| is_admin(*u)).count() == 1 {
            return Err(ComandaError::Validation(
                "cannot remove the last administrator".to_string(),
            ));
        }

        let removed = users.remove(index);
        doc.carry_sequences(&current);
        self.store.write(&doc)?;
        info!(id, "user deleted");
        Ok(removed)
    }

    // ========================================================================
    // AGGREGATION
    // ========================================================================

    /// Production summary for one delivery date.
    ///
    /// Never writes, not even the registry patch or the first-use seed: a
    /// store holding no document summarizes as empty.
    pub fn summarize_production(&self, date: &str) -> Result<ProductionSummary> {
        parse_date(date)?;
        let doc = match self.store.load() {
            Err(e) if e.is_not_found() => default_document(),
            other => other?,
        };
        summarize_production(&doc, date)
    }
}
