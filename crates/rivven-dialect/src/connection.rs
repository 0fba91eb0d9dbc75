//! Connection traits consumed by the dialects
//!
//! The dialects never open or pool connections; callers hand them one per call.
//! - Connection: query execution and statement-level autocommit control
//! - PreparedStatement: positional (1-based) parameter binding
//! - DatabaseMetadata: catalog queries for tables, columns and keys

use async_trait::async_trait;

use crate::driver::DriverInfo;
use crate::error::Result;
use crate::types::{Nullability, ResultSet, Row, SqlType, Value};

/// A connection to a database
#[async_trait]
pub trait Connection: Send + Sync {
    /// Execute a query that returns rows
    async fn query(&self, sql: &str, params: &[Value]) -> Result<ResultSet>;

    /// Execute a statement that modifies data, returns affected row count
    async fn execute(&self, sql: &str, params: &[Value]) -> Result<u64>;

    /// Execute statements in order, returns affected counts per statement
    async fn execute_batch(&self, statements: &[(&str, &[Value])]) -> Result<Vec<u64>> {
        let mut results = Vec::with_capacity(statements.len());
        for (sql, params) in statements {
            results.push(self.execute(sql, params).await?);
        }
        Ok(results)
    }

    /// Execute a query and return the first row
    async fn query_one(&self, sql: &str, params: &[Value]) -> Result<Option<Row>> {
        let result = self.query(sql, params).await?;
        Ok(result.rows.into_iter().next())
    }

    /// Prepare a statement for binding and repeated execution
    async fn prepare(&self, sql: &str) -> Result<Box<dyn PreparedStatement>>;

    /// Whether each statement commits on its own
    fn auto_commit(&self) -> bool;

    /// Toggle statement-level autocommit
    async fn set_auto_commit(&self, auto_commit: bool) -> Result<()>;

    /// Commit pending work (no-op under autocommit)
    async fn commit(&self) -> Result<()>;

    /// Discard pending work (no-op under autocommit)
    async fn rollback(&self) -> Result<()>;

    /// Catalog metadata for this connection
    fn metadata(&self) -> &dyn DatabaseMetadata;

    /// Check if connection is valid/alive
    async fn is_valid(&self) -> bool;

    /// Close the connection
    async fn close(&self) -> Result<()>;
}

/// A prepared statement with positional parameters.
///
/// Parameter indices are 1-based.
#[async_trait]
pub trait PreparedStatement: Send + Sync {
    /// Get the SQL string
    fn sql(&self) -> &str;

    /// Bind a value to a parameter slot
    fn bind(&mut self, index: usize, value: Value) -> Result<()>;

    /// Bind NULL typed with the column's SQL type
    fn bind_null(&mut self, index: usize, sql_type: SqlType) -> Result<()>;

    /// Forget all bound parameters
    fn clear_parameters(&mut self);

    /// Queue the current parameters as one batch entry
    fn add_batch(&mut self) -> Result<()>;

    /// Hint the number of rows fetched per round trip
    fn set_fetch_size(&mut self, _rows: u32) {}

    /// Execute with the current parameters, returns affected row count
    async fn execute(&mut self) -> Result<u64>;

    /// Execute every queued batch entry
    async fn execute_batch(&mut self) -> Result<Vec<u64>>;

    /// Query with the current parameters
    async fn query(&mut self) -> Result<ResultSet>;
}

/// One row of a table listing
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableInfo {
    /// Catalog
    pub catalog: Option<String>,
    /// Schema
    pub schema: Option<String>,
    /// Table name
    pub name: String,
    /// Catalog table type (TABLE, VIEW, ...)
    pub table_type: String,
}

/// One row of a column listing
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnInfo {
    /// Catalog
    pub catalog: Option<String>,
    /// Schema
    pub schema: Option<String>,
    /// Table name
    pub table: String,
    /// Column name
    pub name: String,
    /// SQL type code
    pub sql_type: SqlType,
    /// Vendor type name
    pub type_name: String,
    /// Precision or length
    pub column_size: i32,
    /// Scale
    pub decimal_digits: i32,
    /// Nullability
    pub nullability: Nullability,
    /// Auto-increment column
    pub auto_increment: bool,
    /// Column default expression
    pub default: Option<String>,
    /// 1-based position in the table
    pub ordinal: usize,
}

impl ColumnInfo {
    /// Column listing entry with driver defaults
    pub fn new(table: impl Into<String>, name: impl Into<String>, sql_type: SqlType) -> Self {
        Self {
            catalog: None,
            schema: None,
            table: table.into(),
            name: name.into(),
            sql_type,
            type_name: format!("{:?}", sql_type).to_uppercase(),
            column_size: 0,
            decimal_digits: 0,
            nullability: Nullability::Unknown,
            auto_increment: false,
            default: None,
            ordinal: 0,
        }
    }
}

/// One primary key column
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrimaryKeyInfo {
    /// Catalog
    pub catalog: Option<String>,
    /// Schema
    pub schema: Option<String>,
    /// Table name
    pub table: String,
    /// Column name
    pub column: String,
    /// 1-based position within the key
    pub key_seq: u16,
}

/// Catalog metadata queries.
///
/// Patterns use SQL LIKE syntax; `None` means "do not filter".
#[async_trait]
pub trait DatabaseMetadata: Send + Sync {
    /// List tables matching the filters; an empty `types` lists every type
    async fn tables(
        &self,
        catalog: Option<&str>,
        schema_pattern: Option<&str>,
        table_pattern: Option<&str>,
        types: &[String],
    ) -> Result<Vec<TableInfo>>;

    /// Table types the database knows about
    async fn table_types(&self) -> Result<Vec<String>>;

    /// List columns matching the filters
    async fn columns(
        &self,
        catalog: Option<&str>,
        schema_pattern: Option<&str>,
        table_pattern: Option<&str>,
        column_pattern: Option<&str>,
    ) -> Result<Vec<ColumnInfo>>;

    /// Primary key columns of one table
    async fn primary_keys(
        &self,
        catalog: Option<&str>,
        schema: Option<&str>,
        table: &str,
    ) -> Result<Vec<PrimaryKeyInfo>>;

    /// Product and driver information
    async fn driver_info(&self) -> Result<DriverInfo>;

    /// Identifier quote string; `None` if quoting is unsupported
    fn identifier_quote(&self) -> Option<String>;
}
