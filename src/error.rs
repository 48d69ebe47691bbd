use thiserror::Error;

/// A rejected write or lookup. Every violation is reported synchronously for
/// the offending statement; nothing is retried and nothing is partially
/// applied.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum StoreError {
    /// A primary or unique key is already taken.
    #[error("duplicate {entity} key {key:?}")]
    DuplicateKey { entity: &'static str, key: String },

    /// A write referenced a row that does not exist, or a delete is blocked
    /// by rows that still reference the target.
    #[error("foreign key violation on {entity} {key:?}: {detail}")]
    ForeignKeyViolation {
        entity: &'static str,
        key: String,
        detail: String,
    },

    /// A numeric or enumeration check failed.
    #[error("value {value:?} out of range for {field}")]
    RangeViolation { field: &'static str, value: String },

    /// A delete or lookup targeted a nonexistent row.
    #[error("no such {entity} {key:?}")]
    NotFound { entity: &'static str, key: String },
}

impl StoreError {
    pub(crate) fn missing_reference(entity: &'static str, key: impl ToString) -> Self {
        StoreError::ForeignKeyViolation {
            entity,
            key: key.to_string(),
            detail: "referenced row does not exist".into(),
        }
    }

    pub(crate) fn restricted_delete(
        entity: &'static str,
        key: impl ToString,
        dependents: usize,
    ) -> Self {
        StoreError::ForeignKeyViolation {
            entity,
            key: key.to_string(),
            detail: format!("still referenced by {dependents} dependent row(s)"),
        }
    }
}
