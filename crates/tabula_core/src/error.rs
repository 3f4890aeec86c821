//! Error types for Tabula core.

use crate::watch::EntityKind;
use thiserror::Error;

/// Result type for core operations.
pub type CoreResult<T> = Result<T, CoreError>;

/// Errors that can occur in Tabula core operations.
///
/// Errors are `Clone` so that one failed fetch can be delivered to every
/// caller waiting on the same load.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CoreError {
    /// A single-key watch or unwatch call named a key the entity does not support.
    #[error("invalid key to watch for {kind}: {key}")]
    InvalidWatchKey {
        /// Kind of the entity being watched.
        kind: EntityKind,
        /// The rejected key.
        key: String,
    },

    /// The model's backing subtree is no longer present in the document.
    #[error("{entity} has been deleted")]
    DeletedEntity {
        /// Debug representation of the deleted entity, e.g. `[Table tbl1]`.
        entity: String,
    },

    /// Async data was read before it was loaded.
    #[error("data is not loaded for {entity}; call load_data() first")]
    DataNotLoaded {
        /// Debug representation of the entity.
        entity: String,
    },

    /// A field id does not exist in the table.
    #[error("no field with id {field_id} in table {table_id}")]
    FieldNotFound {
        /// The table searched.
        table_id: String,
        /// The missing field id.
        field_id: String,
    },

    /// The host failed to fetch async data.
    #[error("fetch failed: {message}")]
    Fetch {
        /// Host-supplied description of the failure.
        message: String,
    },

    /// Internal invariant was violated. Indicates a bug in the core itself.
    #[error("invariant violation: {message}")]
    InvariantViolation {
        /// Description of the violated invariant.
        message: String,
    },
}

impl CoreError {
    /// Creates an invalid watch key error.
    pub fn invalid_watch_key(kind: EntityKind, key: impl Into<String>) -> Self {
        Self::InvalidWatchKey {
            kind,
            key: key.into(),
        }
    }

    /// Creates a deleted entity error.
    pub fn deleted(entity: impl Into<String>) -> Self {
        Self::DeletedEntity {
            entity: entity.into(),
        }
    }

    /// Creates a data not loaded error.
    pub fn not_loaded(entity: impl Into<String>) -> Self {
        Self::DataNotLoaded {
            entity: entity.into(),
        }
    }

    /// Creates a field not found error.
    pub fn field_not_found(table_id: impl Into<String>, field_id: impl Into<String>) -> Self {
        Self::FieldNotFound {
            table_id: table_id.into(),
            field_id: field_id.into(),
        }
    }

    /// Creates a fetch error.
    pub fn fetch(message: impl Into<String>) -> Self {
        Self::Fetch {
            message: message.into(),
        }
    }

    /// Creates an invariant violation error.
    pub fn invariant(message: impl Into<String>) -> Self {
        Self::InvariantViolation {
            message: message.into(),
        }
    }

    /// Returns true for errors that indicate a bug in the core rather than bad input.
    pub fn is_fatal(&self) -> bool {
        matches!(self, CoreError::InvariantViolation { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display() {
        let err = CoreError::deleted("[Table tbl1]");
        assert_eq!(err.to_string(), "[Table tbl1] has been deleted");

        let err = CoreError::invalid_watch_key(EntityKind::Field, "bogus");
        assert_eq!(err.to_string(), "invalid key to watch for Field: bogus");

        let err = CoreError::field_not_found("tbl1", "fldX");
        assert!(err.to_string().contains("fldX"));
        assert!(err.to_string().contains("tbl1"));
    }

    #[test]
    fn fatal_errors() {
        assert!(CoreError::invariant("retain count is 2").is_fatal());
        assert!(!CoreError::fetch("offline").is_fatal());
        assert!(!CoreError::not_loaded("[RecordStore tbl1]").is_fatal());
    }
}
