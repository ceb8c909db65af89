use thiserror::Error;

/// Classified database failure
#[derive(Debug, Clone, Error)]
#[error("{kind}")]
pub struct DatabaseError {
    pub kind: DatabaseErrorKind,
}

#[derive(Debug, Clone, Error)]
pub enum DatabaseErrorKind {
    #[error("{entity} '{id}' not found")]
    NotFound { entity: String, id: String },

    #[error("unique constraint violated: {constraint}")]
    UniqueViolation { constraint: String },

    #[error("{entity} '{id}' was modified concurrently")]
    VersionConflict { entity: String, id: String },

    #[error("connection error: {message}")]
    Connection { message: String },

    #[error("query error: {message}")]
    Query { message: String },

    #[error("serialization error: {message}")]
    Serialization { message: String },

    #[error("database error: {message}")]
    Unknown { message: String },
}

impl DatabaseError {
    pub fn new(kind: DatabaseErrorKind) -> Self {
        Self { kind }
    }

    pub fn not_found(entity: impl Into<String>, id: impl Into<String>) -> Self {
        Self::new(DatabaseErrorKind::NotFound {
            entity: entity.into(),
            id: id.into(),
        })
    }

    pub fn version_conflict(entity: impl Into<String>, id: impl Into<String>) -> Self {
        Self::new(DatabaseErrorKind::VersionConflict {
            entity: entity.into(),
            id: id.into(),
        })
    }

    pub fn serialization(message: impl Into<String>) -> Self {
        Self::new(DatabaseErrorKind::Serialization {
            message: message.into(),
        })
    }

    pub fn from_sqlx(err: sqlx::Error) -> Self {
        match &err {
            sqlx::Error::RowNotFound => Self::new(DatabaseErrorKind::NotFound {
                entity: "row".to_string(),
                id: String::new(),
            }),
            sqlx::Error::Database(db) => {
                // 23505 = unique_violation
                if db.code().as_deref() == Some("23505") {
                    Self::new(DatabaseErrorKind::UniqueViolation {
                        constraint: db.constraint().unwrap_or("unknown").to_string(),
                    })
                } else {
                    Self::new(DatabaseErrorKind::Query {
                        message: db.message().to_string(),
                    })
                }
            }
            sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Io(_) => {
                Self::new(DatabaseErrorKind::Connection {
                    message: err.to_string(),
                })
            }
            _ => Self::new(DatabaseErrorKind::Unknown {
                message: err.to_string(),
            }),
        }
    }

    pub fn is_unique_violation(&self) -> bool {
        matches!(self.kind, DatabaseErrorKind::UniqueViolation { .. })
    }

    pub fn is_version_conflict(&self) -> bool {
        matches!(self.kind, DatabaseErrorKind::VersionConflict { .. })
    }

    pub fn is_retryable(&self) -> bool {
        matches!(
            self.kind,
            DatabaseErrorKind::Connection { .. } | DatabaseErrorKind::VersionConflict { .. }
        )
    }
}

impl From<DatabaseError> for crate::error::AppError {
    fn from(err: DatabaseError) -> Self {
        use crate::error::{AppError, AppErrorKind, InfrastructureError};

        AppError::new(AppErrorKind::Infrastructure(InfrastructureError::Database {
            message: err.to_string(),
            is_retryable: err.is_retryable(),
        }))
    }
}
