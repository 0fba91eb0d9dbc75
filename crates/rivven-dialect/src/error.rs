//! Error types for rivven-dialect
//!
//! Errors are classified so the calling engine can decide what to do:
//! - Connectivity failures are propagated verbatim and may be retried by the caller
//! - Unsupported operations are a capability signal, never a transient failure
//! - Parse, schema and conversion errors are permanent for the given input

use std::fmt;
use thiserror::Error;

/// Result type for rivven-dialect operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error categories for classification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    /// Connection or metadata access failed (retriable by the caller)
    Connection,
    /// Statement execution failed
    Query,
    /// The dialect cannot express the requested operation
    Unsupported,
    /// Malformed identifier or URL
    Parse,
    /// A value could not be bound or converted under its declared type
    TypeConversion,
    /// Table or column shape problems
    Schema,
    /// Invalid configuration
    Configuration,
    /// Unknown/other errors
    Other,
}

impl ErrorCategory {
    /// Whether errors in this category are generally retriable
    #[inline]
    pub const fn is_retriable(self) -> bool {
        matches!(self, Self::Connection)
    }
}

/// Main error type for rivven-dialect
#[derive(Error, Debug)]
#[allow(missing_docs)]
pub enum Error {
    /// Connection or metadata access failed
    #[error("connection error: {message}")]
    Connection {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Statement execution failed
    #[error("query error: {message}")]
    Query {
        message: String,
        sql: Option<String>,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Operation not supported by this dialect
    #[error("unsupported operation '{operation}': {message}")]
    Unsupported { operation: String, message: String },

    /// Malformed identifier
    #[error("parse error: {message}")]
    Parse { message: String },

    /// Type conversion failed
    #[error("type conversion error: {message}")]
    TypeConversion { message: String },

    /// Schema error (missing key fields, non-optional added column)
    #[error("schema error: {message}")]
    Schema { message: String },

    /// Configuration error
    #[error("configuration error: {message}")]
    Configuration { message: String },

    /// Reading a streamed column value failed
    #[error("i/o error reading column value: {0}")]
    Io(#[from] std::io::Error),

    /// Internal error
    #[error("internal error: {message}")]
    Internal { message: String },
}

impl Error {
    /// Get the error category
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::Connection { .. } | Self::Io(_) => ErrorCategory::Connection,
            Self::Query { .. } => ErrorCategory::Query,
            Self::Unsupported { .. } => ErrorCategory::Unsupported,
            Self::Parse { .. } => ErrorCategory::Parse,
            Self::TypeConversion { .. } => ErrorCategory::TypeConversion,
            Self::Schema { .. } => ErrorCategory::Schema,
            Self::Configuration { .. } => ErrorCategory::Configuration,
            Self::Internal { .. } => ErrorCategory::Other,
        }
    }

    /// Whether this error is retriable
    #[inline]
    pub fn is_retriable(&self) -> bool {
        self.category().is_retriable()
    }

    /// Whether this error signals a missing dialect capability
    #[inline]
    pub fn is_unsupported(&self) -> bool {
        matches!(self, Self::Unsupported { .. })
    }

    /// Create a connection error
    pub fn connection(message: impl Into<String>) -> Self {
        Self::Connection {
            message: message.into(),
            source: None,
        }
    }

    /// Create a connection error with source
    pub fn connection_with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Connection {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Create a query error
    pub fn query(message: impl Into<String>) -> Self {
        Self::Query {
            message: message.into(),
            sql: None,
            source: None,
        }
    }

    /// Create a query error with SQL
    pub fn query_with_sql(message: impl Into<String>, sql: impl Into<String>) -> Self {
        Self::Query {
            message: message.into(),
            sql: Some(sql.into()),
            source: None,
        }
    }

    /// Create an unsupported operation error
    pub fn unsupported(operation: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Unsupported {
            operation: operation.into(),
            message: message.into(),
        }
    }

    /// Create a parse error
    pub fn parse(message: impl Into<String>) -> Self {
        Self::Parse {
            message: message.into(),
        }
    }

    /// Create a type conversion error
    pub fn type_conversion(message: impl Into<String>) -> Self {
        Self::TypeConversion {
            message: message.into(),
        }
    }

    /// Create a schema error
    pub fn schema(message: impl Into<String>) -> Self {
        Self::Schema {
            message: message.into(),
        }
    }

    /// Create a configuration error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Create an internal error
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Connection => write!(f, "connection"),
            Self::Query => write!(f, "query"),
            Self::Unsupported => write!(f, "unsupported"),
            Self::Parse => write!(f, "parse"),
            Self::TypeConversion => write!(f, "type_conversion"),
            Self::Schema => write!(f, "schema"),
            Self::Configuration => write!(f, "configuration"),
            Self::Other => write!(f, "other"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_category_retriable() {
        assert!(ErrorCategory::Connection.is_retriable());

        assert!(!ErrorCategory::Unsupported.is_retriable());
        assert!(!ErrorCategory::TypeConversion.is_retriable());
        assert!(!ErrorCategory::Query.is_retriable());
        assert!(!ErrorCategory::Parse.is_retriable());
    }

    #[test]
    fn test_unsupported_is_not_transient() {
        let err = Error::unsupported("upsert", "generic dialect has no upsert syntax");
        assert!(err.is_unsupported());
        assert!(!err.is_retriable());
        assert_eq!(err.category(), ErrorCategory::Unsupported);
    }

    #[test]
    fn test_error_display() {
        let err = Error::unsupported("delete", "not supported by Generic");
        let msg = err.to_string();
        assert!(msg.contains("delete"));
        assert!(msg.contains("Generic"));

        let err = Error::query_with_sql("syntax error", "SELECT * FORM users");
        assert!(err.to_string().contains("syntax error"));
    }

    #[test]
    fn test_io_error_conversion() {
        let io = std::io::Error::new(std::io::ErrorKind::UnexpectedEof, "stream closed");
        let err: Error = io.into();
        assert_eq!(err.category(), ErrorCategory::Connection);
        assert!(err.to_string().contains("stream closed"));
    }
}
