//! Database dialect contract
//!
//! [`DatabaseDialect`] is the single abstraction the polling and writing
//! engines talk to. Every operation has a generic default built on the
//! helpers in [`statements`](crate::statements), [`discovery`](crate::discovery)
//! and [`mapping`](crate::mapping); product variants override only what
//! diverges.
//!
//! - Identifiers: quoting rules, expression builders, table name parsing
//! - Type mapping: column to field kinds, converters and parameter binding
//! - Statements: INSERT, multi-row INSERT, UPDATE, UPSERT, DELETE, DDL
//! - Discovery: tables, columns, table definitions, database clock

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::fmt;

use crate::binder::{PreparedStatementBinder, StatementBinder};
use crate::config::DialectConfig;
use crate::connection::{Connection, PreparedStatement};
use crate::criteria::TimestampIncrementingCriteria;
use crate::discovery::{self, ColumnDefinitions};
use crate::driver::DriverInfo;
use crate::error::{Error, Result};
use crate::fields::{FieldsMetadata, InsertMode, PrimaryKeyMode, SinkRecordField};
use crate::identifier::{ColumnId, ExpressionBuilder, IdentifierRules, TableId};
use crate::mapping::{
    self, ColumnConverter, ColumnMapping, FieldKind, SchemaMapping, TypeMapping,
};
use crate::record::{Schema, SchemaBuilder, SchemaPair};
use crate::schema::{ColumnDefinition, TableDefinition};
use crate::statements;
use crate::types::{ResultSetMetadata, Value};

mod generic;
mod mysql;
mod oracle;
mod postgres;
mod sqlserver;

pub use generic::GenericDialect;
pub use mysql::MySqlDialect;
pub use oracle::OracleDialect;
pub use postgres::PostgresDialect;
pub use sqlserver::SqlServerDialect;

/// Options of a DROP TABLE statement
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DropOptions {
    /// Do not fail when the table is absent
    pub if_exists: bool,
    /// Drop dependent objects too
    pub cascade: bool,
}

impl DropOptions {
    /// Plain `DROP TABLE`
    pub fn new() -> Self {
        Self::default()
    }

    /// Set IF EXISTS
    pub fn with_if_exists(mut self, if_exists: bool) -> Self {
        self.if_exists = if_exists;
        self
    }

    /// Set CASCADE
    pub fn with_cascade(mut self, cascade: bool) -> Self {
        self.cascade = cascade;
        self
    }
}

/// SQL generation, type mapping and metadata discovery for one database product.
///
/// Implementations hold no mutable state; one instance is shared by every
/// worker of a data source.
#[async_trait]
pub trait DatabaseDialect: Send + Sync + fmt::Debug {
    /// Dialect name, e.g. `PostgreSQL`
    fn name(&self) -> &'static str;

    /// Configuration this dialect was built with
    fn config(&self) -> &DialectConfig;

    /// Quoting and qualification rules
    fn identifier_rules(&self) -> &IdentifierRules;

    /// Fresh builder using the configured quoting policy
    fn expression_builder(&self) -> ExpressionBuilder<'_> {
        self.identifier_rules()
            .expression_builder(self.config().quote_identifiers)
    }

    /// Whether a two-part name means `catalog.table` rather than `schema.table`
    fn uses_catalogs(&self) -> bool {
        false
    }

    /// Parse a possibly qualified and quoted table name
    fn parse_table_identifier(&self, fqn: &str) -> Result<TableId> {
        let parts = self.identifier_rules().parse_qualified_identifier(fqn)?;
        let table = match parts.as_slice() {
            [table] => TableId::new(None, None, table.as_str()),
            [qualifier, table] if self.uses_catalogs() => {
                TableId::new(Some(qualifier.as_str()), None, table.as_str())
            }
            [schema, table] => TableId::new(None, Some(schema.as_str()), table.as_str()),
            [catalog, schema, table] => {
                TableId::new(Some(catalog.as_str()), Some(schema.as_str()), table.as_str())
            }
            _ => {
                return Err(Error::parse(format!(
                    "table identifier '{}' has {} parts; expected at most catalog.schema.table",
                    fqn,
                    parts.len()
                )))
            }
        };
        Ok(table)
    }

    /// Whether a table belongs to the database's own catalog
    fn is_system_table(&self, _table: &TableId) -> bool {
        false
    }

    // ---------------------------------------------------------------------
    // Type mapping
    // ---------------------------------------------------------------------

    /// Column-to-field rules for the configured numeric mapping
    fn type_mapping(&self) -> TypeMapping {
        TypeMapping::new(self.config().numeric_mapping)
    }

    /// Record type for a column; `None` skips the column
    fn field_kind(&self, column: &ColumnDefinition) -> Option<FieldKind> {
        self.type_mapping().field_kind(column)
    }

    /// Add the field for `column` to a schema under construction
    fn add_field_to_schema(
        &self,
        column: &ColumnDefinition,
        builder: &mut SchemaBuilder,
    ) -> Result<Option<String>> {
        mapping::add_field_to_schema(column, self.field_kind(column), builder)
    }

    /// Converter for one mapped column; `None` skips the column
    fn create_column_converter(&self, mapping: &ColumnMapping) -> Option<ColumnConverter> {
        mapping::column_converter(mapping, self.field_kind(mapping.column()))
    }

    /// Record schema and converters for a result set shape
    fn schema_mapping(
        &self,
        schema_name: Option<&str>,
        metadata: &ResultSetMetadata,
    ) -> Result<SchemaMapping> {
        discovery::schema_mapping(self, schema_name, metadata)
    }

    /// Column type declared for a field in CREATE and ALTER statements
    fn sql_type_name(&self, field: &SinkRecordField) -> Result<String> {
        statements::ansi_type_name(field)
    }

    /// Render a default value literal
    fn format_column_value(
        &self,
        builder: &mut ExpressionBuilder<'_>,
        schema: &Schema,
        value: &Value,
    ) -> Result<()> {
        statements::format_column_value(builder, schema, value)
    }

    /// Bind one value at a 1-based parameter index according to its schema.
    ///
    /// NULL is bound typed by the schema's SQL type.
    fn bind_field(
        &self,
        statement: &mut dyn PreparedStatement,
        index: usize,
        schema: &Schema,
        value: &Value,
    ) -> Result<()> {
        if value.is_null() {
            return statement.bind_null(index, mapping::sql_type_for_schema(schema));
        }
        statement.bind(index, mapping::value_for_schema(schema, value)?)
    }

    // ---------------------------------------------------------------------
    // Statements
    // ---------------------------------------------------------------------

    /// `SELECT * FROM t`
    fn build_select_table_query(&self, table: &TableId) -> String {
        statements::select_table(self, table)
    }

    /// Polling query for a table: SELECT, incremental WHERE and ORDER BY
    fn build_incremental_query(
        &self,
        table: &TableId,
        criteria: &TimestampIncrementingCriteria,
    ) -> String {
        let mut b = self.expression_builder();
        b.append(self.build_select_table_query(table));
        criteria.where_clause(&mut b);
        criteria.order_by(&mut b);
        b.build()
    }

    /// Single-row INSERT
    fn build_insert_statement(
        &self,
        table: &TableId,
        key_columns: &[ColumnId],
        non_key_columns: &[ColumnId],
        _definition: Option<&TableDefinition>,
    ) -> Result<String> {
        statements::insert(self, table, key_columns, non_key_columns)
    }

    /// Whether multi-row INSERT is supported
    fn supports_multi_insert(&self) -> bool {
        true
    }

    /// INSERT with one parameter tuple per record
    fn build_multi_insert_statement(
        &self,
        table: &TableId,
        records: usize,
        key_columns: &[ColumnId],
        non_key_columns: &[ColumnId],
    ) -> Result<String> {
        if !self.supports_multi_insert() {
            return Err(Error::unsupported(
                "multi-row insert",
                format!("the {} dialect has no multi-row INSERT syntax", self.name()),
            ));
        }
        statements::multi_insert(self, table, records, key_columns, non_key_columns)
    }

    /// UPDATE by key
    fn build_update_statement(
        &self,
        table: &TableId,
        key_columns: &[ColumnId],
        non_key_columns: &[ColumnId],
        _definition: Option<&TableDefinition>,
    ) -> Result<String> {
        statements::update(self, table, key_columns, non_key_columns)
    }

    /// Insert-or-update keyed by the key columns
    fn build_upsert_query_statement(
        &self,
        table: &TableId,
        _key_columns: &[ColumnId],
        _non_key_columns: &[ColumnId],
        _definition: Option<&TableDefinition>,
    ) -> Result<String> {
        Err(Error::unsupported(
            "upsert",
            format!("the {} dialect cannot upsert into {}", self.name(), table),
        ))
    }

    /// Whether DELETE statements are supported
    fn supports_delete(&self) -> bool {
        false
    }

    /// DELETE of `records` rows by key
    fn build_delete_statement(
        &self,
        table: &TableId,
        records: usize,
        key_columns: &[ColumnId],
    ) -> Result<String> {
        if !self.supports_delete() {
            return Err(Error::unsupported(
                "delete",
                format!("the {} dialect cannot delete from {}", self.name(), table),
            ));
        }
        statements::delete(self, table, records, key_columns)
    }

    /// CREATE TABLE for record fields
    fn build_create_table_statement(
        &self,
        table: &TableId,
        fields: &[SinkRecordField],
    ) -> Result<String> {
        statements::create_table(self, table, fields)
    }

    /// Additive ALTER TABLE statements for fields missing from the table
    fn build_alter_table(&self, table: &TableId, fields: &[SinkRecordField]) -> Result<Vec<String>> {
        statements::alter_table(self, table, fields)
    }

    /// DROP TABLE honoring the options the dialect supports
    fn build_drop_table_statement(&self, table: &TableId, options: DropOptions) -> Result<String> {
        Ok(statements::drop_table(self, table, options))
    }

    // ---------------------------------------------------------------------
    // Binding and criteria
    // ---------------------------------------------------------------------

    /// Binder for one statement and record shape
    fn statement_binder<'a>(
        &'a self,
        statement: &'a mut dyn PreparedStatement,
        pk_mode: PrimaryKeyMode,
        schema_pair: SchemaPair,
        fields: &'a FieldsMetadata,
        insert_mode: InsertMode,
    ) -> Box<dyn StatementBinder + 'a> {
        Box::new(PreparedStatementBinder::new(
            self,
            statement,
            pk_mode,
            schema_pair,
            fields,
            insert_mode,
        ))
    }

    /// Incremental polling criteria over the given columns
    fn criteria_for(
        &self,
        incrementing_column: Option<&ColumnId>,
        timestamp_columns: &[ColumnId],
    ) -> Result<TimestampIncrementingCriteria> {
        TimestampIncrementingCriteria::new(incrementing_column.cloned(), timestamp_columns.to_vec())
    }

    // ---------------------------------------------------------------------
    // Discovery
    // ---------------------------------------------------------------------

    /// Prepare a statement with the configured fetch size
    async fn create_prepared_statement(
        &self,
        conn: &dyn Connection,
        sql: &str,
    ) -> Result<Box<dyn PreparedStatement>> {
        discovery::create_prepared_statement(self, conn, sql).await
    }

    /// Query returning the database's current timestamp
    fn current_timestamp_query(&self) -> &'static str {
        "SELECT CURRENT_TIMESTAMP"
    }

    /// Current time according to the database
    async fn current_time_on_db(&self, conn: &dyn Connection) -> Result<DateTime<Utc>> {
        discovery::current_time_on_db(self, conn).await
    }

    /// Upper bound of a timestamp poll: database time minus the configured delay
    async fn end_time_on_db(&self, conn: &dyn Connection) -> Result<DateTime<Utc>> {
        let now = self.current_time_on_db(conn).await?;
        let delay = chrono::Duration::from_std(self.config().timestamp_delay())
            .map_err(|e| Error::config(format!("timestamp delay out of range: {}", e)))?;
        Ok(now - delay)
    }

    /// Non-system tables under the configured catalog and schema
    async fn table_ids(&self, conn: &dyn Connection) -> Result<Vec<TableId>> {
        discovery::table_ids(self, conn).await
    }

    /// Whether a table exists
    async fn table_exists(&self, conn: &dyn Connection, table: &TableId) -> Result<bool> {
        discovery::table_exists(self, conn, table).await
    }

    /// Columns matching catalog, schema, table and column patterns
    async fn describe_columns(
        &self,
        conn: &dyn Connection,
        catalog_pattern: Option<&str>,
        schema_pattern: Option<&str>,
        table_pattern: Option<&str>,
        column_pattern: Option<&str>,
    ) -> Result<ColumnDefinitions> {
        discovery::describe_columns(
            self,
            conn,
            catalog_pattern,
            schema_pattern,
            table_pattern,
            column_pattern,
        )
        .await
    }

    /// Columns matching table and column patterns under the configured catalog and schema
    async fn describe_table_columns(
        &self,
        conn: &dyn Connection,
        table_pattern: &str,
        column_pattern: Option<&str>,
    ) -> Result<ColumnDefinitions> {
        let config = self.config();
        self.describe_columns(
            conn,
            config.catalog_pattern.as_deref(),
            config.schema_pattern.as_deref(),
            Some(table_pattern),
            column_pattern,
        )
        .await
    }

    /// Columns of a result set, in result set order
    fn describe_result_set_columns(&self, metadata: &ResultSetMetadata) -> ColumnDefinitions {
        discovery::describe_result_set_columns(metadata)
    }

    /// Columns of a table found by running an empty SELECT
    async fn describe_columns_by_querying(
        &self,
        conn: &dyn Connection,
        table: &TableId,
    ) -> Result<ColumnDefinitions> {
        discovery::describe_columns_by_querying(self, conn, table).await
    }

    /// Full table definition, `None` when the table does not exist
    async fn describe_table(
        &self,
        conn: &dyn Connection,
        table: &TableId,
    ) -> Result<Option<TableDefinition>> {
        discovery::describe_table(self, conn, table).await
    }

    /// Product and driver facts of the connected database
    async fn driver_info(&self, conn: &dyn Connection) -> Result<DriverInfo> {
        conn.metadata().driver_info().await
    }

    /// Execute DDL statements in order
    async fn apply_ddl_statements(&self, conn: &dyn Connection, statements: &[String]) -> Result<()> {
        discovery::apply_ddl_statements(conn, statements).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_drop_options_builders() {
        let options = DropOptions::new().with_if_exists(true);
        assert!(options.if_exists);
        assert!(!options.cascade);
        assert_eq!(
            options.with_cascade(true),
            DropOptions {
                if_exists: true,
                cascade: true
            }
        );
    }

    #[test]
    fn test_parse_table_identifier_by_part_count() {
        let generic = GenericDialect::new(DialectConfig::default());
        assert_eq!(generic.parse_table_identifier("t").unwrap(), TableId::table("t"));
        assert_eq!(
            generic.parse_table_identifier("s.t").unwrap(),
            TableId::new(None, Some("s"), "t")
        );
        assert_eq!(
            generic.parse_table_identifier("c.s.t").unwrap(),
            TableId::new(Some("c"), Some("s"), "t")
        );
        assert!(generic.parse_table_identifier("a.b.c.d").is_err());

        let mysql = MySqlDialect::new(DialectConfig::default());
        assert_eq!(
            mysql.parse_table_identifier("shop.orders").unwrap(),
            TableId::new(Some("shop"), None, "orders")
        );
    }
}
