//! Result and error types for the core library

use thiserror::Error;

/// Core library error type
#[derive(Error, Debug)]
pub enum Error {
    #[error("Database error: {0}")]
    Database(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Mailbox error: {0}")]
    Mailbox(String),

    #[error("Workbook error: {0}")]
    Workbook(String),

    #[error("Missing column '{column}' for {report} sheet")]
    MissingColumn { report: String, column: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Create a database error
    pub fn database(msg: impl Into<String>) -> Self {
        Self::Database(msg.into())
    }

    /// Create a not found error
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    /// Create a validation error
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    /// Create a mailbox error
    pub fn mailbox(msg: impl Into<String>) -> Self {
        Self::Mailbox(msg.into())
    }

    /// Create a workbook error
    pub fn workbook(msg: impl Into<String>) -> Self {
        Self::Workbook(msg.into())
    }

    pub fn missing_column(report: impl ToString, column: impl Into<String>) -> Self {
        Self::MissingColumn {
            report: report.to_string(),
            column: column.into(),
        }
    }
}

impl From<duckdb::Error> for Error {
    fn from(e: duckdb::Error) -> Self {
        Self::Database(e.to_string())
    }
}

impl From<anyhow::Error> for Error {
    fn from(e: anyhow::Error) -> Self {
        Self::Other(format!("{:#}", e))
    }
}

/// Core library result type
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_column_message() {
        let err = Error::missing_column("COLLECTION", "VOUCHER");
        assert_eq!(err.to_string(), "Missing column 'VOUCHER' for COLLECTION sheet");
    }

    #[test]
    fn test_duckdb_error_maps_to_database() {
        let err: Error = duckdb::Error::QueryReturnedNoRows.into();
        assert!(matches!(err, Error::Database(_)));
    }
}
