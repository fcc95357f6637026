//! Error types for rollcall.
//!
//! This module defines all error types used throughout the rollcall crate,
//! providing detailed context for debugging and user-friendly error messages.

use std::path::PathBuf;

use chrono::NaiveDate;
use thiserror::Error;

use crate::records::Role;

/// The main error type for rollcall operations.
#[derive(Error, Debug)]
pub enum Error {
    // === Storage Errors ===
    /// Failed to open or create the database.
    #[error("failed to open database at {path}: {source}")]
    DatabaseOpen {
        /// Path to the database file.
        path: PathBuf,
        /// The underlying error.
        #[source]
        source: rusqlite::Error,
    },

    /// A database query failed.
    #[error("database query failed: {0}")]
    DatabaseQuery(#[from] rusqlite::Error),

    /// Failed to run database migrations.
    #[error("database migration failed: {message}")]
    DatabaseMigration {
        /// Description of what went wrong.
        message: String,
    },

    // === Configuration Errors ===
    /// Failed to load configuration.
    #[error("failed to load configuration: {0}")]
    ConfigLoad(Box<figment::Error>),

    /// Configuration validation failed.
    #[error("invalid configuration: {message}")]
    ConfigValidation {
        /// Description of the validation failure.
        message: String,
    },

    // === Domain Errors ===
    /// An embedding could not be parsed or has the wrong shape.
    #[error("invalid embedding: {message}")]
    InvalidEmbedding {
        /// Description of what is wrong with the embedding.
        message: String,
    },

    /// A referenced row does not exist.
    #[error("{entity} {id} not found")]
    NotFound {
        /// Kind of row that was looked up.
        entity: &'static str,
        /// Identifier that was looked up.
        id: i64,
    },

    /// A write was rejected because it clashes with existing data.
    #[error("conflict: {message}")]
    Conflict {
        /// Description of the clash.
        message: String,
    },

    /// An attendance row already exists for this student and day.
    ///
    /// Raised by the storage layer when the uniqueness constraint rejects an
    /// insert. Callers marking attendance treat it as "already marked".
    #[error("attendance already recorded for student {student_id} on {date}")]
    DuplicateAttendance {
        /// Student the insert was for.
        student_id: i64,
        /// Calendar day the insert was for.
        date: NaiveDate,
    },

    /// The acting profile lacks the required role.
    #[error("profile {profile_id} is not permitted to act as {required}")]
    Unauthorized {
        /// Profile that attempted the action.
        profile_id: i64,
        /// Role the action requires.
        required: Role,
    },

    /// Invalid user input that is not tied to a specific row.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    // === I/O Errors ===
    /// File system operation failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Failed to create a required directory.
    #[error("failed to create directory {path}: {source}")]
    DirectoryCreate {
        /// Path that couldn't be created.
        path: PathBuf,
        /// The underlying error.
        #[source]
        source: std::io::Error,
    },

    // === Serialization Errors ===
    /// JSON serialization/deserialization failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    // === Generic Errors ===
    /// An internal error occurred (bug).
    #[error("internal error: {0}")]
    Internal(String),
}

/// A specialized Result type for rollcall operations.
pub type Result<T> = std::result::Result<T, Error>;

impl From<figment::Error> for Error {
    fn from(err: figment::Error) -> Self {
        Self::ConfigLoad(Box::new(err))
    }
}

impl Error {
    /// Create a new invalid embedding error.
    #[must_use]
    pub fn invalid_embedding(message: impl Into<String>) -> Self {
        Self::InvalidEmbedding {
            message: message.into(),
        }
    }

    /// Create a new conflict error.
    #[must_use]
    pub fn conflict(message: impl Into<String>) -> Self {
        Self::Conflict {
            message: message.into(),
        }
    }

    /// Create a new invalid input error.
    #[must_use]
    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::InvalidInput(message.into())
    }

    /// Create a new internal error.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    /// Create a not-found error for the given entity.
    #[must_use]
    pub fn not_found(entity: &'static str, id: i64) -> Self {
        Self::NotFound { entity, id }
    }

    /// Check if this error is the per-day attendance uniqueness rejection.
    #[must_use]
    pub fn is_duplicate_attendance(&self) -> bool {
        matches!(self, Self::DuplicateAttendance { .. })
    }

    /// Check if this error is a missing row.
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    /// Check if this error is a role check failure.
    #[must_use]
    pub fn is_unauthorized(&self) -> bool {
        matches!(self, Self::Unauthorized { .. })
    }
}

/// Check whether a rusqlite error is a UNIQUE constraint violation.
pub(crate) fn is_unique_violation(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(e, _)
            if e.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::not_found("student", 7);
        assert_eq!(err.to_string(), "student 7 not found");

        let err = Error::internal("test error");
        assert_eq!(err.to_string(), "internal error: test error");
    }

    #[test]
    fn test_duplicate_attendance_display() {
        let err = Error::DuplicateAttendance {
            student_id: 3,
            date: NaiveDate::from_ymd_opt(2024, 9, 2).unwrap(),
        };
        let msg = err.to_string();
        assert!(msg.contains("student 3"));
        assert!(msg.contains("2024-09-02"));
        assert!(err.is_duplicate_attendance());
        assert!(!Error::conflict("x").is_duplicate_attendance());
    }

    #[test]
    fn test_unauthorized_display() {
        let err = Error::Unauthorized {
            profile_id: 12,
            required: Role::Admin,
        };
        assert!(err.to_string().contains("profile 12"));
        assert!(err.to_string().contains("admin"));
        assert!(err.is_unauthorized());
    }

    #[test]
    fn test_is_not_found() {
        assert!(Error::not_found("class", 1).is_not_found());
        assert!(!Error::internal("x").is_not_found());
    }

    #[test]
    fn test_invalid_embedding_display() {
        let err = Error::invalid_embedding("expected 128 values, got 3");
        assert_eq!(
            err.to_string(),
            "invalid embedding: expected 128 values, got 3"
        );
    }

    #[test]
    fn test_from_io_error() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: Error = io_err.into();
        assert!(err.to_string().contains("file not found"));
    }

    #[test]
    fn test_from_json_error() {
        let json_result: std::result::Result<Vec<f32>, serde_json::Error> =
            serde_json::from_str("not valid json");
        if let Err(json_err) = json_result {
            let err: Error = json_err.into();
            assert!(matches!(err, Error::Json(_)));
        }
    }

    #[test]
    fn test_is_unique_violation() {
        let conn = rusqlite::Connection::open_in_memory().unwrap();
        conn.execute_batch("CREATE TABLE t (v INTEGER UNIQUE); INSERT INTO t VALUES (1);")
            .unwrap();
        let err = conn.execute("INSERT INTO t VALUES (1)", []).unwrap_err();
        assert!(is_unique_violation(&err));

        let err = conn.execute("INSERT INTO missing VALUES (1)", []).unwrap_err();
        assert!(!is_unique_violation(&err));
    }

    #[test]
    fn test_database_open_error_display() {
        let result = rusqlite::Connection::open_with_flags(
            "/nonexistent/path/db.sqlite",
            rusqlite::OpenFlags::SQLITE_OPEN_READ_ONLY,
        );
        if let Err(sqlite_err) = result {
            let err = Error::DatabaseOpen {
                path: PathBuf::from("/nonexistent/path/db.sqlite"),
                source: sqlite_err,
            };
            assert!(err.to_string().contains("/nonexistent/path/db.sqlite"));
        }
    }

    #[test]
    fn test_config_validation_error_display() {
        let err = Error::ConfigValidation {
            message: "match_threshold must be positive".to_string(),
        };
        assert!(err.to_string().contains("match_threshold"));
    }
}
