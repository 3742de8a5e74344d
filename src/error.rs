//! Error types for db-scope.
//!
//! All failures, whether raised while registering a pool, acquiring a
//! connection, running a statement or committing, are reported as [`DbError`]
//! through the same channel the caller used for results.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DbError {
    /// Registration options are missing, ambiguous or conflict with an
    /// existing registration.
    #[error("db-scope: {message}")]
    Configuration { message: String },

    #[error("db-scope: failed to create pool: {message}")]
    PoolCreation { message: String, suggestion: String },

    #[error("db-scope: could not get pool alias '{alias}'")]
    PoolAliasNotFound { alias: String },

    #[error("Connection failed: {message}")]
    Connection { message: String, suggestion: String },

    #[error("Database error: {message}")]
    Database {
        message: String,
        /// e.g., "42P01" for undefined table
        sql_state: Option<String>,
        suggestion: String,
    },

    /// The connection was already closed and returned to its pool.
    #[error("Invalid connection: {message}")]
    InvalidConnection { message: String },

    #[error("Pool has {in_use} connection(s) in use; release them or close with a drain time")]
    PoolBusy { in_use: u32 },

    #[error("Timeout: {operation} exceeded {limit:?}")]
    Timeout { operation: String, limit: Duration },

    #[error("Invalid input: {message}")]
    InvalidInput { message: String },

    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl DbError {
    /// Create a configuration error.
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Create a pool creation error with a helpful suggestion.
    pub fn pool_creation(message: impl Into<String>, suggestion: impl Into<String>) -> Self {
        Self::PoolCreation {
            message: message.into(),
            suggestion: suggestion.into(),
        }
    }

    /// Create a pool alias lookup error.
    pub fn pool_alias_not_found(alias: impl Into<String>) -> Self {
        Self::PoolAliasNotFound {
            alias: alias.into(),
        }
    }

    /// Create a connection error with a helpful suggestion.
    pub fn connection(message: impl Into<String>, suggestion: impl Into<String>) -> Self {
        Self::Connection {
            message: message.into(),
            suggestion: suggestion.into(),
        }
    }

    /// Create a database error with optional SQL state.
    pub fn database(
        message: impl Into<String>,
        sql_state: Option<String>,
        suggestion: impl Into<String>,
    ) -> Self {
        Self::Database {
            message: message.into(),
            sql_state,
            suggestion: suggestion.into(),
        }
    }

    /// Create an invalid connection error.
    pub fn invalid_connection(message: impl Into<String>) -> Self {
        Self::InvalidConnection {
            message: message.into(),
        }
    }

    pub fn pool_busy(in_use: u32) -> Self {
        Self::PoolBusy { in_use }
    }

    /// Create a timeout error.
    pub fn timeout(operation: impl Into<String>, limit: Duration) -> Self {
        Self::Timeout {
            operation: operation.into(),
            limit,
        }
    }

    /// Create an invalid input error.
    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::InvalidInput {
            message: message.into(),
        }
    }

    /// Create an internal error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Get the suggestion for this error, if available.
    pub fn suggestion(&self) -> Option<&str> {
        match self {
            Self::PoolCreation { suggestion, .. } => Some(suggestion),
            Self::Connection { suggestion, .. } => Some(suggestion),
            Self::Database { suggestion, .. } => Some(suggestion),
            Self::PoolBusy { .. } => {
                Some("Close every leased connection before shutdown, or configure a drain time")
            }
            _ => None,
        }
    }

    /// HTTP status used when the error crosses the HTTP boundary.
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::Configuration { .. }
            | Self::InvalidInput { .. }
            | Self::Database { .. }
            | Self::InvalidConnection { .. } => StatusCode::BAD_REQUEST,
            Self::PoolAliasNotFound { .. } => StatusCode::NOT_FOUND,
            Self::Connection { .. } | Self::PoolBusy { .. } | Self::PoolCreation { .. } => {
                StatusCode::SERVICE_UNAVAILABLE
            }
            Self::Timeout { .. } => StatusCode::GATEWAY_TIMEOUT,
            Self::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// Convert sqlx errors to DbError.
impl From<sqlx::Error> for DbError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::Configuration(msg) => DbError::connection(
                msg.to_string(),
                "Check the connection string format and credentials",
            ),
            sqlx::Error::Database(db_err) => {
                let code = db_err.code().map(|c| c.to_string());
                DbError::database(
                    db_err.message(),
                    code,
                    "Check the SQL syntax and referenced objects",
                )
            }
            sqlx::Error::RowNotFound => DbError::database(
                "No rows returned",
                None,
                "Verify the query conditions match existing data",
            ),
            sqlx::Error::PoolTimedOut => DbError::timeout(
                "connection pool acquire",
                Duration::from_secs(crate::config::DEFAULT_ACQUIRE_TIMEOUT_SECS),
            ),
            sqlx::Error::PoolClosed => {
                DbError::connection("Connection pool is closed", "Register a new pool")
            }
            sqlx::Error::Io(io_err) => DbError::connection(
                format!("I/O error: {}", io_err),
                "Check network connectivity and database server status",
            ),
            sqlx::Error::Tls(tls_err) => DbError::connection(
                format!("TLS error: {}", tls_err),
                "Verify TLS configuration and certificates",
            ),
            sqlx::Error::Protocol(msg) => DbError::connection(
                format!("Protocol error: {}", msg),
                "Check database server compatibility",
            ),
            sqlx::Error::ColumnIndexOutOfBounds { index, len } => DbError::internal(format!(
                "Column index {} out of bounds (len: {})",
                index, len
            )),
            sqlx::Error::ColumnDecode { index, source } => {
                DbError::internal(format!("Failed to decode column {}: {}", index, source))
            }
            sqlx::Error::Decode(source) => DbError::internal(format!("Decode error: {}", source)),
            sqlx::Error::WorkerCrashed => DbError::internal("Database worker crashed"),
            _ => DbError::internal(format!("Unknown database error: {}", err)),
        }
    }
}

/// Result type alias for database operations.
pub type DbResult<T> = Result<T, DbError>;

/// Render errors as JSON bodies carrying the optional suggestion.
impl IntoResponse for DbError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let mut body = serde_json::json!({ "error": self.to_string() });
        if let Some(suggestion) = self.suggestion() {
            body["suggestion"] = serde_json::Value::String(suggestion.to_string());
        }
        if let Self::Database {
            sql_state: Some(code),
            ..
        } = &self
        {
            body["sql_state"] = serde_json::Value::String(code.clone());
        }
        (status, axum::Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = DbError::connection("Failed to connect", "Check credentials");
        assert!(err.to_string().contains("Connection failed"));
    }

    #[test]
    fn test_configuration_message_is_prefixed() {
        let err = DbError::configuration("must supply pool options");
        assert_eq!(err.to_string(), "db-scope: must supply pool options");
    }

    #[test]
    fn test_alias_message_names_alias() {
        let err = DbError::pool_alias_not_found("reports");
        assert_eq!(
            err.to_string(),
            "db-scope: could not get pool alias 'reports'"
        );
    }

    #[test]
    fn test_error_suggestion() {
        let err = DbError::database(
            "Syntax error",
            Some("42601".to_string()),
            "Check SQL syntax",
        );
        assert_eq!(err.suggestion(), Some("Check SQL syntax"));
        assert!(DbError::pool_busy(1).suggestion().is_some());
        assert_eq!(DbError::invalid_connection("closed").suggestion(), None);
    }

    #[test]
    fn test_status_codes() {
        assert_eq!(
            DbError::configuration("x").status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            DbError::pool_alias_not_found("x").status_code(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            DbError::pool_busy(1).status_code(),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(
            DbError::timeout("query", Duration::from_secs(30)).status_code(),
            StatusCode::GATEWAY_TIMEOUT
        );
        assert_eq!(
            DbError::internal("x").status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_pool_closed_maps_to_connection() {
        let err: DbError = sqlx::Error::PoolClosed.into();
        assert!(matches!(err, DbError::Connection { .. }));
        let err: DbError = sqlx::Error::PoolTimedOut.into();
        assert!(matches!(err, DbError::Timeout { .. }));
    }

    #[test]
    fn test_response_status_matches_category() {
        let response = DbError::invalid_input("bad").into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }
}
