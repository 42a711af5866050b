// comanda-core/src/guard.rs
//! Write-authorization guard
//!
//! Compares the persisted document with the one a caller wants to write and
//! decides whether the caller's role allows the difference. Only `Admin` may
//! remove records. Everything here is pure: the caller loads the current
//! document, runs the check, and persists only after it passes.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;

use crate::collections::USERS;
use crate::document::{record_id, Document, Record, ID_SEQUENCES};
use crate::error::{ComandaError, Result};

/// Caller role. The set is closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Privileged: may delete records and manage users
    Admin,
    /// Operational: may add and modify records
    Operador,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::Operador => "operador",
        }
    }

    pub fn can_delete(&self) -> bool {
        matches!(self, Role::Admin)
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = ComandaError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "admin" => Ok(Role::Admin),
            "operador" => Ok(Role::Operador),
            other => Err(ComandaError::Validation(format!("unknown role '{}'", other))),
        }
    }
}

/// Check a single collection transition for a caller that may not delete.
///
/// Rejects when the collection shrinks, or when any id of `old` is absent
/// from `new`. The id check runs even at equal length so that swapping a
/// deleted record for a new one is still caught.
pub fn check_collection(name: &str, old: &[Record], new: &[Record]) -> Result<()> {
    let new_ids: HashSet<i64> = new.iter().filter_map(record_id).collect();
    let missing_ids: Vec<i64> = old
        .iter()
        .filter_map(record_id)
        .filter(|id| !new_ids.contains(id))
        .collect();

    if new.len() < old.len() || !missing_ids.is_empty() {
        return Err(ComandaError::AuthorizationViolation {
            collection: name.to_string(),
            missing_ids,
        });
    }
    Ok(())
}

/// Decide whether `role` may replace `old` with `new`.
///
/// Every collection persisted in `old` is guarded except `users`, which is
/// never taken from the caller (see [`protect_users`]), and `_ids`, which is
/// rebuilt from the persisted marks on every write. A collection the caller
/// left out counts as emptied.
pub fn authorize_write(old: &Document, new: &Document, role: Role) -> Result<()> {
    if role.can_delete() {
        return Ok(());
    }
    for (name, old_records) in old.iter() {
        if name == USERS || name == ID_SEQUENCES {
            continue;
        }
        check_collection(name, old_records, new.collection(name))?;
    }
    Ok(())
}

/// Reject a write that stores two records with the same id in one
/// collection.
///
/// Collections submitted unchanged from `old` are not checked, so data
/// written before this rule existed does not block unrelated writes.
pub fn check_unique_ids(old: &Document, new: &Document) -> Result<()> {
    for (name, records) in new.iter() {
        if name == USERS || old.collection(name) == records {
            continue;
        }
        let mut seen = HashSet::new();
        if let Some(id) = records.iter().filter_map(record_id).find(|id| !seen.insert(*id)) {
            return Err(ComandaError::Validation(format!(
                "duplicate id {} in collection '{}'",
                id, name
            )));
        }
    }
    Ok(())
}

/// Replace the submitted users collection with the persisted one.
///
/// Bulk writes can never change users, whatever the role. When nothing is
/// persisted yet the submitted document simply carries no users.
pub fn protect_users(old: &Document, mut new: Document) -> Document {
    if old.has_collection(USERS) {
        new.set_collection(USERS, old.collection(USERS).to_vec());
    } else {
        new.remove_collection(USERS);
    }
    new
}
