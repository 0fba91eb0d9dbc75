//! # rivven-dialect
//!
//! Database dialect abstraction for Rivven's JDBC-style source and sink
//! connectors.
//!
//! A dialect knows how one database family spells identifiers, maps column
//! types to record schemas, discovers tables and columns through driver
//! metadata, and renders the statements a connector issues. Every dialect
//! starts from ANSI behavior and overrides only what its database does
//! differently.
//!
//! ## Features
//!
//! - **Identifiers**: quoting, case folding and qualified-name parsing
//! - **Type Mapping**: column metadata to record schemas and value converters
//! - **Discovery**: tables, columns, primary keys and driver versions
//! - **Statements**: SELECT, INSERT, multi-row INSERT, UPDATE, DELETE, upsert and DDL
//! - **Binding**: sink records bound to prepared statement parameters
//! - **Incremental Queries**: timestamp and incrementing column criteria
//! - **Registry**: dialects resolved by name or connection URL
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use rivven_dialect::prelude::*;
//!
//! let config = DialectConfig::new("jdbc:postgresql://localhost:5432/shop");
//! let dialect = resolve(config)?;
//!
//! let table = dialect.parse_table_identifier("public.accounts")?;
//! let sql = dialect.build_upsert_query_statement(
//!     &table,
//!     &[table.column("id")],
//!     &[table.column("name"), table.column("balance")],
//!     None,
//! )?;
//! ```
//!
//! ## Feature Flags
//!
//! - `postgres` - PostgreSQL connection backend via tokio-postgres

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(unsafe_code)]

pub mod binder;
pub mod config;
pub mod connection;
pub mod criteria;
pub mod dialect;
pub mod discovery;
pub mod driver;
pub mod error;
pub mod fields;
pub mod identifier;
pub mod mapping;
pub mod record;
pub mod registry;
pub mod schema;
pub mod statements;
pub mod types;

// Backend implementations (conditionally compiled)
#[cfg(feature = "postgres")]
pub mod postgres;

/// Prelude module for convenient imports
pub mod prelude {
    // Error types
    pub use crate::error::{Error, ErrorCategory, Result};

    // Value and type system
    pub use crate::types::{
        Mutability, Nullability, ResultRow, ResultSet, ResultSetColumn, ResultSetMetadata, Row,
        SqlType, Value,
    };

    // Connection contract
    pub use crate::connection::{
        ColumnInfo, Connection, DatabaseMetadata, PreparedStatement, PrimaryKeyInfo, TableInfo,
    };
    pub use crate::driver::DriverInfo;

    // Identifiers
    pub use crate::identifier::{
        CaseFolding, ColumnId, ExpressionBuilder, IdentifierRules, QuoteMethod, TableId,
    };

    // Records and fields
    pub use crate::fields::{FieldsMetadata, InsertMode, PrimaryKeyMode, SinkRecordField};
    pub use crate::record::{
        Datum, LogicalType, Schema, SchemaBuilder, SchemaPair, SchemaRef, SchemaType, SinkRecord,
        Struct,
    };

    // Table metadata and type mapping
    pub use crate::mapping::{ColumnConverter, ColumnMapping, FieldKind, SchemaMapping, TypeMapping};
    pub use crate::schema::{ColumnDefinition, ColumnFacts, TableDefinition, TableType};

    // Dialects
    pub use crate::binder::{PreparedStatementBinder, StatementBinder};
    pub use crate::config::{DialectConfig, NumericMapping};
    pub use crate::criteria::{TimestampIncrementingCriteria, TimestampIncrementingOffset};
    pub use crate::dialect::{
        DatabaseDialect, DropOptions, GenericDialect, MySqlDialect, OracleDialect,
        PostgresDialect, SqlServerDialect,
    };
    pub use crate::registry::{resolve, DialectProvider, DialectRegistry};
}

// Re-export commonly used items at crate root
pub use error::{Error, Result};
pub use types::Value;
