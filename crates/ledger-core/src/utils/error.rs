use thiserror::Error;

/// Errors surfaced by the tenant-scoped record layer.
///
/// `Validation` and `Conflict` carry the offending field so callers can
/// report rejected writes field by field. `ScopeViolation` is always fatal
/// to the operation: no partially scoped data is ever returned.
#[derive(Error, Debug)]
pub enum DomainError {
    #[error("validation failed on `{field}`: {message}")]
    Validation { field: String, message: String },

    #[error("conflict on `{field}`: {message}")]
    Conflict { field: String, message: String },

    #[error("tenant scope violation: {0}")]
    ScopeViolation(String),

    #[error("unauthorized: {0}")]
    Unauthorized(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("internal error: {0}")]
    Internal(String),
}

impl DomainError {
    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Validation {
            field: field.into(),
            message: message.into(),
        }
    }

    pub fn conflict(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Conflict {
            field: field.into(),
            message: message.into(),
        }
    }
}

impl From<validator::ValidationErrors> for DomainError {
    fn from(errors: validator::ValidationErrors) -> Self {
        let (field, message) = errors
            .field_errors()
            .into_iter()
            .next()
            .map(|(field, field_errors)| {
                let message = field_errors
                    .first()
                    .and_then(|e| e.message.as_ref().map(|m| m.to_string()))
                    .unwrap_or_else(|| "invalid value".to_string());
                (field.to_string(), message)
            })
            .unwrap_or_else(|| ("unknown".to_string(), "validation failed".to_string()));

        DomainError::Validation { field, message }
    }
}

/// Translates PostgreSQL constraint violations into field-level errors.
///
/// `constraints` maps a constraint name to the field reported to the
/// caller; an unmapped unique violation still surfaces as a conflict
/// rather than an opaque database error.
pub fn map_constraint_violation(err: sqlx::Error, constraints: &[(&str, &str)]) -> DomainError {
    if let sqlx::Error::Database(db_err) = &err {
        if matches!(db_err.kind(), sqlx::error::ErrorKind::UniqueViolation) {
            let constraint = db_err.constraint().unwrap_or("");
            for (name, field) in constraints {
                if constraint == *name {
                    return DomainError::conflict(*field, format!("{field} already exists"));
                }
            }
            return DomainError::conflict("record", "unique constraint violated");
        }
        if matches!(db_err.kind(), sqlx::error::ErrorKind::ForeignKeyViolation) {
            return DomainError::conflict("record", "record is referenced by other records");
        }
    }
    DomainError::Database(err)
}
