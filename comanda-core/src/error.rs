// comanda-core/src/error.rs
//! Error taxonomy for the document layer

use thiserror::Error;

/// Errors surfaced by the store, the guard, the aggregation engine and the
/// backup manager.
#[derive(Debug, Error)]
pub enum ComandaError {
    /// Backend unreachable or its content is corrupt. Retryable.
    #[error("store unavailable ({backend}): {reason}")]
    StoreUnavailable { backend: String, reason: String },

    /// Missing document or missing snapshot.
    #[error("not found: {0}")]
    NotFound(String),

    /// A non-privileged caller tried to remove records, or to touch a
    /// collection reserved for administrators.
    #[error("authorization violation in collection '{collection}' (removed ids: {missing_ids:?})")]
    AuthorizationViolation {
        collection: String,
        missing_ids: Vec<i64>,
    },

    /// Caller-fixable input problem.
    #[error("validation error: {0}")]
    Validation(String),

    /// Backup or restore failed for a specific snapshot file.
    #[error("backup error ({filename}): {reason}")]
    Backup { filename: String, reason: String },
}

impl ComandaError {
    pub fn unavailable(backend: &str, reason: impl ToString) -> Self {
        ComandaError::StoreUnavailable {
            backend: backend.to_string(),
            reason: reason.to_string(),
        }
    }

    pub fn backup(filename: &str, reason: impl ToString) -> Self {
        ComandaError::Backup {
            filename: filename.to_string(),
            reason: reason.to_string(),
        }
    }

    /// Only infrastructure failures are worth retrying.
    pub fn is_retryable(&self) -> bool {
        matches!(self, ComandaError::StoreUnavailable { .. })
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, ComandaError::NotFound(_))
    }
}

pub type Result<T> = std::result::Result<T, ComandaError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_store_unavailable_is_retryable() {
        assert!(ComandaError::unavailable("file", "disk gone").is_retryable());
        assert!(!ComandaError::NotFound("x".into()).is_retryable());
        assert!(!ComandaError::Validation("x".into()).is_retryable());
        assert!(!ComandaError::AuthorizationViolation {
            collection: "pedidos".into(),
            missing_ids: vec![1],
        }
        .is_retryable());
    }

    #[test]
    fn test_violation_message_names_collection() {
        let err = ComandaError::AuthorizationViolation {
            collection: "pedidos".into(),
            missing_ids: vec![3, 4],
        };
        let msg = err.to_string();
        assert!(msg.contains("pedidos"));
        assert!(msg.contains("[3, 4]"));
    }
}
