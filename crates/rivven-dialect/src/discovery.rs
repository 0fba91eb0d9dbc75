//! Generic metadata discovery
//!
//! Table enumeration, existence checks and column description through a
//! connection's [`DatabaseMetadata`](crate::connection::DatabaseMetadata).

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use std::collections::{HashMap, HashSet};
use tracing::{debug, info, warn};

use crate::connection::{ColumnInfo, Connection, PreparedStatement};
use crate::dialect::DatabaseDialect;
use crate::error::{Error, Result};
use crate::identifier::{ColumnId, TableId};
use crate::mapping::{ColumnMapping, SchemaMapping};
use crate::record::SchemaBuilder;
use crate::schema::{ColumnDefinition, ColumnFacts, TableDefinition, TableType};
use crate::types::{ResultSetColumn, ResultSetMetadata};

/// Ordered column definitions keyed by column id
pub type ColumnDefinitions = IndexMap<ColumnId, ColumnDefinition>;

/// Prepare a statement, applying the configured fetch size
pub async fn create_prepared_statement<D: DatabaseDialect + ?Sized>(
    dialect: &D,
    conn: &dyn Connection,
    sql: &str,
) -> Result<Box<dyn PreparedStatement>> {
    debug!("Creating a prepared statement '{}'", sql);
    let mut statement = conn.prepare(sql).await?;
    if let Some(rows) = dialect.config().fetch_size {
        statement.set_fetch_size(rows);
    }
    Ok(statement)
}

/// Current time according to the database clock
pub async fn current_time_on_db<D: DatabaseDialect + ?Sized>(
    dialect: &D,
    conn: &dyn Connection,
) -> Result<DateTime<Utc>> {
    let sql = dialect.current_timestamp_query();
    let row = conn.query_one(sql, &[]).await?;
    row.as_ref()
        .and_then(|r| r.get(0))
        .and_then(|v| v.as_timestamp())
        .ok_or_else(|| {
            Error::query_with_sql(
                format!(
                    "unable to get current time from the database using the {} dialect",
                    dialect.name()
                ),
                sql,
            )
        })
}

/// Requested table types that the database actually knows, matched case-insensitively
pub async fn table_types(conn: &dyn Connection, requested: &[String]) -> Result<Vec<String>> {
    let known = conn.metadata().table_types().await?;
    let mut matched = Vec::with_capacity(requested.len());
    for wanted in requested {
        match known.iter().find(|k| k.trim().eq_ignore_ascii_case(wanted.trim())) {
            Some(found) => matched.push(found.trim().to_string()),
            None => warn!("Table type '{}' is not supported by the database; ignoring", wanted),
        }
    }
    debug!("Using table types {:?}", matched);
    Ok(matched)
}

/// Non-system tables visible under the configured catalog and schema filters
pub async fn table_ids<D: DatabaseDialect + ?Sized>(
    dialect: &D,
    conn: &dyn Connection,
) -> Result<Vec<TableId>> {
    let config = dialect.config();
    let types = table_types(conn, &config.table_types).await?;
    let tables = conn
        .metadata()
        .tables(
            config.catalog_pattern.as_deref(),
            config.schema_pattern.as_deref(),
            Some("%"),
            &types,
        )
        .await?;

    let ids: Vec<TableId> = tables
        .into_iter()
        .map(|t| TableId::new(t.catalog.as_deref(), t.schema.as_deref(), t.name))
        .filter(|id| !dialect.is_system_table(id))
        .collect();
    debug!("Found {} table ids using the {} dialect", ids.len(), dialect.name());
    Ok(ids)
}

/// Whether a table exists; catalog errors count as "does not exist"
pub async fn table_exists<D: DatabaseDialect + ?Sized>(
    dialect: &D,
    conn: &dyn Connection,
    table: &TableId,
) -> Result<bool> {
    let types = &dialect.config().table_types;
    let listing = conn
        .metadata()
        .tables(
            table.catalog_name(),
            table.schema_name(),
            Some(table.table_name()),
            types,
        )
        .await;
    match listing {
        Ok(found) => {
            let exists = found.iter().any(|t| t.name == table.table_name());
            info!(
                "Using the {} dialect, table {} {}",
                dialect.name(),
                table,
                if exists { "is present" } else { "is absent" }
            );
            Ok(exists)
        }
        Err(e) => {
            warn!("Failed to check existence of table {}: {}", table, e);
            Ok(false)
        }
    }
}

fn definition_from_info(info: ColumnInfo, primary_key: bool) -> ColumnDefinition {
    let table = TableId::new(info.catalog.as_deref(), info.schema.as_deref(), info.table);
    let mut facts = ColumnFacts::new(info.sql_type, info.type_name);
    facts.nullability = info.nullability;
    facts.precision = info.column_size;
    facts.scale = info.decimal_digits;
    facts.display_size = info.column_size;
    facts.auto_increment = info.auto_increment;
    facts.primary_key = primary_key;
    ColumnDefinition::new(table.column(info.name), facts)
}

/// Describe columns matching catalog, schema, table and column patterns
pub async fn describe_columns<D: DatabaseDialect + ?Sized>(
    dialect: &D,
    conn: &dyn Connection,
    catalog_pattern: Option<&str>,
    schema_pattern: Option<&str>,
    table_pattern: Option<&str>,
    column_pattern: Option<&str>,
) -> Result<ColumnDefinitions> {
    debug!(
        "Querying {} dialect column metadata for catalog:{:?} schema:{:?} table:{:?}",
        dialect.name(),
        catalog_pattern,
        schema_pattern,
        table_pattern
    );
    let metadata = conn.metadata();
    let mut columns = metadata
        .columns(catalog_pattern, schema_pattern, table_pattern, column_pattern)
        .await?;
    columns.sort_by_key(|c| c.ordinal);

    let mut keys: HashMap<TableId, HashSet<String>> = HashMap::new();
    let mut results = ColumnDefinitions::with_capacity(columns.len());
    for info in columns {
        let table = TableId::new(info.catalog.as_deref(), info.schema.as_deref(), info.table.clone());
        if !keys.contains_key(&table) {
            let pk = metadata
                .primary_keys(table.catalog_name(), table.schema_name(), table.table_name())
                .await?
                .into_iter()
                .map(|k| k.column)
                .collect();
            keys.insert(table.clone(), pk);
        }
        let is_pk = keys.get(&table).is_some_and(|pk| pk.contains(&info.name));
        let definition = definition_from_info(info, is_pk);
        results.insert(definition.id().clone(), definition);
    }
    Ok(results)
}

/// Describe one column of a result set
pub fn describe_result_set_column(column: &ResultSetColumn) -> ColumnDefinition {
    let table = column
        .table
        .as_deref()
        .filter(|t| !t.is_empty())
        .map(|t| TableId::new(column.catalog.as_deref(), column.schema.as_deref(), t));
    let id = ColumnId::with_alias(table, column.name.clone(), Some(column.label.as_str()));

    let mut facts = ColumnFacts::new(column.sql_type, column.type_name.clone());
    facts.nullability = column.nullability;
    facts.mutability = column.mutability;
    facts.display_size = column.display_size;
    facts.precision = column.precision;
    facts.scale = column.scale;
    facts.auto_increment = column.auto_increment;
    facts.signed = column.signed;
    facts.case_sensitive = column.case_sensitive;
    facts.searchable = column.searchable;
    facts.currency = column.currency;
    ColumnDefinition::new(id, facts)
}

/// Describe result set columns, preserving their order
pub fn describe_result_set_columns(metadata: &ResultSetMetadata) -> ColumnDefinitions {
    metadata
        .columns()
        .iter()
        .map(describe_result_set_column)
        .map(|d| (d.id().clone(), d))
        .collect()
}

/// Describe a table by running a query that returns no rows
pub async fn describe_columns_by_querying<D: DatabaseDialect + ?Sized>(
    dialect: &D,
    conn: &dyn Connection,
    table: &TableId,
) -> Result<ColumnDefinitions> {
    let mut b = dialect.expression_builder();
    b.append("SELECT * FROM ").append_table(table).append(" WHERE 1 = 0");
    let sql = b.build();
    let result = conn.query(&sql, &[]).await?;
    Ok(dialect.describe_result_set_columns(&result.metadata))
}

/// Full definition of a table, or `None` when it does not exist
pub async fn describe_table<D: DatabaseDialect + ?Sized>(
    dialect: &D,
    conn: &dyn Connection,
    table: &TableId,
) -> Result<Option<TableDefinition>> {
    let columns = dialect
        .describe_columns(
            conn,
            table.catalog_name(),
            table.schema_name(),
            Some(table.table_name()),
            None,
        )
        .await?;
    let columns: Vec<ColumnDefinition> = columns
        .into_values()
        .filter(|c| c.id().table_id().is_some_and(|t| t.table_name() == table.table_name()))
        .collect();
    if columns.is_empty() {
        debug!("Table {} has no columns; treating as absent", table);
        return Ok(None);
    }

    let table_type = conn
        .metadata()
        .tables(
            table.catalog_name(),
            table.schema_name(),
            Some(table.table_name()),
            &[],
        )
        .await?
        .into_iter()
        .find(|t| t.name == table.table_name())
        .and_then(|t| TableType::parse(&t.table_type))
        .unwrap_or_default();

    Ok(Some(TableDefinition::new(table.clone(), columns, table_type)))
}

/// Record schema and converters for a result set shape
pub fn schema_mapping<D: DatabaseDialect + ?Sized>(
    dialect: &D,
    schema_name: Option<&str>,
    metadata: &ResultSetMetadata,
) -> Result<SchemaMapping> {
    let mut builder = SchemaBuilder::struct_schema();
    if let Some(name) = schema_name {
        builder = builder.name(name);
    }
    let mut setters = Vec::new();
    for (position, column) in dialect.describe_result_set_columns(metadata).into_values().enumerate() {
        let Some(field) = dialect.add_field_to_schema(&column, &mut builder)? else {
            continue;
        };
        let mapping = ColumnMapping::new(column, position + 1, field.clone());
        if let Some(converter) = dialect.create_column_converter(&mapping) {
            setters.push((field, converter));
        }
    }
    Ok(SchemaMapping::new(builder.build(), setters))
}

/// Execute DDL statements in order, committing when autocommit is off
pub async fn apply_ddl_statements(conn: &dyn Connection, statements: &[String]) -> Result<()> {
    for sql in statements {
        debug!("Applying DDL: {}", sql);
        conn.execute(sql, &[]).await?;
    }
    if !conn.auto_commit() {
        conn.commit().await?;
    }
    Ok(())
}
