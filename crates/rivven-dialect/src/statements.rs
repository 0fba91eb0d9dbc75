//! Generic statement text builders
//!
//! Pure functions shared by every dialect. Each call starts from a fresh
//! [`ExpressionBuilder`] and performs no I/O. Parameter order always follows
//! the caller's key and non-key column order.

use tracing::debug;

use crate::dialect::{DatabaseDialect, DropOptions};
use crate::error::{Error, Result};
use crate::fields::SinkRecordField;
use crate::identifier::{ColumnId, ExpressionBuilder, TableId};
use crate::record::{LogicalType, Schema, SchemaType};
use crate::types::Value;

/// `SELECT * FROM table`
pub fn select_table<D: DatabaseDialect + ?Sized>(dialect: &D, table: &TableId) -> String {
    let mut b = dialect.expression_builder();
    b.append("SELECT * FROM ").append_table(table);
    b.build()
}

/// Append a comma separated, unqualified column list
pub fn append_column_names(b: &mut ExpressionBuilder<'_>, columns: &[&ColumnId]) {
    b.append_list(",", columns.iter().copied(), |b, c| {
        b.append_column(c);
    });
}

/// Key columns followed by non-key columns
pub fn all_columns<'c>(key_columns: &'c [ColumnId], non_key_columns: &'c [ColumnId]) -> Vec<&'c ColumnId> {
    key_columns.iter().chain(non_key_columns).collect()
}

fn require_columns(table: &TableId, operation: &str, columns: usize) -> Result<()> {
    if columns == 0 {
        return Err(Error::schema(format!(
            "cannot build {} for {}: no columns",
            operation, table
        )));
    }
    Ok(())
}

pub(crate) fn log_statement(dialect: &str, sql: &str) {
    debug!("Built {} statement: {}", dialect, sql);
}

/// `INSERT INTO t ("k","v") VALUES (?,?)`
pub fn insert<D: DatabaseDialect + ?Sized>(
    dialect: &D,
    table: &TableId,
    key_columns: &[ColumnId],
    non_key_columns: &[ColumnId],
) -> Result<String> {
    let columns = all_columns(key_columns, non_key_columns);
    require_columns(table, "INSERT", columns.len())?;

    let mut b = dialect.expression_builder();
    b.append("INSERT INTO ").append_table(table).append(" (");
    append_column_names(&mut b, &columns);
    b.append(") VALUES (").append_multiple(",", "?", columns.len()).append(")");
    let sql = b.build();
    log_statement(dialect.name(), &sql);
    Ok(sql)
}

/// Multi-row INSERT with `records` parameter tuples
pub fn multi_insert<D: DatabaseDialect + ?Sized>(
    dialect: &D,
    table: &TableId,
    records: usize,
    key_columns: &[ColumnId],
    non_key_columns: &[ColumnId],
) -> Result<String> {
    if records == 0 {
        return Err(Error::schema(format!(
            "cannot build multi-row INSERT for {} with zero records",
            table
        )));
    }
    let columns = all_columns(key_columns, non_key_columns);
    require_columns(table, "multi-row INSERT", columns.len())?;

    let mut b = dialect.expression_builder();
    b.append("INSERT INTO ").append_table(table).append(" (");
    append_column_names(&mut b, &columns);
    b.append(") VALUES ");
    let mut tuple = String::with_capacity(columns.len() * 2 + 2);
    tuple.push('(');
    tuple.push_str(&vec!["?"; columns.len()].join(","));
    tuple.push(')');
    b.append_multiple(",", &tuple, records);
    let sql = b.build();
    log_statement(dialect.name(), &sql);
    Ok(sql)
}

/// Append `"c" = ?` pairs separated by `delimiter`
pub fn append_assignments(b: &mut ExpressionBuilder<'_>, delimiter: &str, columns: &[ColumnId]) {
    b.append_list(delimiter, columns, |b, c| {
        b.append_column(c).append(" = ?");
    });
}

/// `UPDATE t SET "v" = ? WHERE "k" = ?`
pub fn update<D: DatabaseDialect + ?Sized>(
    dialect: &D,
    table: &TableId,
    key_columns: &[ColumnId],
    non_key_columns: &[ColumnId],
) -> Result<String> {
    if non_key_columns.is_empty() {
        return Err(Error::schema(format!(
            "cannot build UPDATE for {}: no non-key columns to set",
            table
        )));
    }
    let mut b = dialect.expression_builder();
    b.append("UPDATE ").append_table(table).append(" SET ");
    append_assignments(&mut b, ", ", non_key_columns);
    if !key_columns.is_empty() {
        b.append(" WHERE ");
        append_assignments(&mut b, " AND ", key_columns);
    }
    let sql = b.build();
    log_statement(dialect.name(), &sql);
    Ok(sql)
}

/// `DELETE FROM t WHERE ("k" = ?) OR ("k" = ?)`, one group per record
pub fn delete<D: DatabaseDialect + ?Sized>(
    dialect: &D,
    table: &TableId,
    records: usize,
    key_columns: &[ColumnId],
) -> Result<String> {
    if records == 0 {
        return Err(Error::schema(format!(
            "cannot build DELETE for {} with zero records",
            table
        )));
    }
    if key_columns.is_empty() {
        return Err(Error::schema(format!(
            "cannot build DELETE for {}: no key columns",
            table
        )));
    }
    let mut b = dialect.expression_builder();
    b.append("DELETE FROM ").append_table(table).append(" WHERE ");
    b.append_list(" OR ", 0..records, |b, _| {
        b.append("(");
        append_assignments(b, " AND ", key_columns);
        b.append(")");
    });
    let sql = b.build();
    log_statement(dialect.name(), &sql);
    Ok(sql)
}

/// `DROP TABLE [IF EXISTS] t [CASCADE]`
pub fn drop_table<D: DatabaseDialect + ?Sized>(
    dialect: &D,
    table: &TableId,
    options: DropOptions,
) -> String {
    let mut b = dialect.expression_builder();
    b.append("DROP TABLE ");
    if options.if_exists {
        b.append("IF EXISTS ");
    }
    b.append_table(table);
    if options.cascade {
        b.append(" CASCADE");
    }
    b.build()
}

/// Render a default value as a SQL literal
pub fn format_column_value(
    b: &mut ExpressionBuilder<'_>,
    schema: &Schema,
    value: &Value,
) -> Result<()> {
    match (schema.logical, value) {
        (_, Value::Null) => {
            b.append("NULL");
        }
        (Some(LogicalType::Decimal { .. }), v) => {
            let d = v.as_decimal().ok_or_else(|| literal_error(schema, v))?;
            b.append(d);
        }
        (Some(LogicalType::Date), Value::Date(d)) => {
            b.append_string_literal(&d.format("%Y-%m-%d").to_string());
        }
        (Some(LogicalType::Time), Value::Time(t)) => {
            b.append_string_literal(&t.format("%H:%M:%S%.3f").to_string());
        }
        (Some(LogicalType::Timestamp), v) => {
            let ts = v.as_timestamp().ok_or_else(|| literal_error(schema, v))?;
            b.append_string_literal(&ts.format("%Y-%m-%d %H:%M:%S%.3f").to_string());
        }
        (Some(_), v) => return Err(literal_error(schema, v)),
        (None, v) => match schema.schema_type {
            SchemaType::Int8 | SchemaType::Int16 | SchemaType::Int32 | SchemaType::Int64 => {
                b.append(v.as_i64().ok_or_else(|| literal_error(schema, v))?);
            }
            SchemaType::Float32 | SchemaType::Float64 => {
                b.append(v.as_f64().ok_or_else(|| literal_error(schema, v))?);
            }
            SchemaType::Boolean => {
                let flag = v.as_bool().ok_or_else(|| literal_error(schema, v))?;
                b.append(if flag { 1 } else { 0 });
            }
            SchemaType::String => {
                let s = v.as_string().ok_or_else(|| literal_error(schema, v))?;
                b.append_string_literal(&s);
            }
            SchemaType::Bytes => {
                let bytes = v.as_bytes().ok_or_else(|| literal_error(schema, v))?;
                b.append("x'").append(hex::encode_upper(bytes)).append("'");
            }
            SchemaType::Array | SchemaType::Map | SchemaType::Struct => {
                return Err(literal_error(schema, v))
            }
        },
    }
    Ok(())
}

fn literal_error(schema: &Schema, value: &Value) -> Error {
    Error::type_conversion(format!(
        "cannot render {} as a {} literal",
        value.kind(),
        schema.logical.map(|l| l.name()).unwrap_or_else(|| schema_type_name(schema))
    ))
}

fn schema_type_name(schema: &Schema) -> &'static str {
    match schema.schema_type {
        SchemaType::Int8 => "int8",
        SchemaType::Int16 => "int16",
        SchemaType::Int32 => "int32",
        SchemaType::Int64 => "int64",
        SchemaType::Float32 => "float32",
        SchemaType::Float64 => "float64",
        SchemaType::Boolean => "boolean",
        SchemaType::String => "string",
        SchemaType::Bytes => "bytes",
        SchemaType::Array => "array",
        SchemaType::Map => "map",
        SchemaType::Struct => "struct",
    }
}

/// Append `"name" TYPE [DEFAULT x] NULL|NOT NULL`
pub fn append_column_spec<D: DatabaseDialect + ?Sized>(
    dialect: &D,
    b: &mut ExpressionBuilder<'_>,
    table: &TableId,
    field: &SinkRecordField,
) -> Result<()> {
    let sql_type = dialect.sql_type_name(field).map_err(|e| {
        Error::schema(format!(
            "cannot declare column {} of {}: {}",
            field.name(),
            table,
            e
        ))
    })?;
    b.append_identifier(field.name()).append(" ").append(sql_type);
    if let Some(default) = field.default_value() {
        b.append(" DEFAULT ");
        dialect.format_column_value(b, field.schema(), default)?;
    }
    b.append(if field.is_optional() { " NULL" } else { " NOT NULL" });
    Ok(())
}

/// CREATE TABLE with one line per column and a primary key constraint
pub fn create_table<D: DatabaseDialect + ?Sized>(
    dialect: &D,
    table: &TableId,
    fields: &[SinkRecordField],
) -> Result<String> {
    require_columns(table, "CREATE TABLE", fields.len())?;

    let mut b = dialect.expression_builder();
    b.append("CREATE TABLE ").append_table(table).append(" (");
    for (i, field) in fields.iter().enumerate() {
        if i > 0 {
            b.append(",");
        }
        b.append("\n");
        append_column_spec(dialect, &mut b, table, field)?;
    }
    let pk: Vec<&str> = fields
        .iter()
        .filter(|f| f.is_primary_key())
        .map(SinkRecordField::name)
        .collect();
    if !pk.is_empty() {
        b.append(",\nPRIMARY KEY(");
        b.append_list(",", pk, |b, name| {
            b.append_identifier(name);
        });
        b.append(")");
    }
    b.append(")");
    let sql = b.build();
    log_statement(dialect.name(), &sql);
    Ok(sql)
}

/// Refuse to add a required column that has no default
pub fn check_addable(table: &TableId, fields: &[SinkRecordField]) -> Result<()> {
    for field in fields {
        if !field.is_optional() && field.default_value().is_none() {
            return Err(Error::schema(format!(
                "cannot ALTER TABLE {} to add missing field {}: field is not optional and has no default value",
                table,
                field.name()
            )));
        }
    }
    Ok(())
}

/// One `ALTER TABLE t ADD ...` statement covering every field
pub fn alter_table<D: DatabaseDialect + ?Sized>(
    dialect: &D,
    table: &TableId,
    fields: &[SinkRecordField],
) -> Result<Vec<String>> {
    if fields.is_empty() {
        return Ok(Vec::new());
    }
    check_addable(table, fields)?;

    let newlines = fields.len() > 1;
    let mut b = dialect.expression_builder();
    b.append("ALTER TABLE ").append_table(table);
    for (i, field) in fields.iter().enumerate() {
        if i > 0 {
            b.append(",");
        }
        b.append(if newlines { "\n" } else { " " }).append("ADD ");
        append_column_spec(dialect, &mut b, table, field)?;
    }
    let sql = b.build();
    log_statement(dialect.name(), &sql);
    Ok(vec![sql])
}

/// ANSI column type for a field
pub fn ansi_type_name(field: &SinkRecordField) -> Result<String> {
    let name = match field.logical() {
        Some(LogicalType::Decimal { scale }) => return Ok(format!("DECIMAL(38,{})", scale)),
        Some(LogicalType::Date) => "DATE",
        Some(LogicalType::Time) => "TIME",
        Some(LogicalType::Timestamp) => "TIMESTAMP",
        None => match field.schema_type() {
            SchemaType::Int8 | SchemaType::Int16 => "SMALLINT",
            SchemaType::Int32 => "INTEGER",
            SchemaType::Int64 => "BIGINT",
            SchemaType::Float32 => "REAL",
            SchemaType::Float64 => "DOUBLE PRECISION",
            SchemaType::Boolean => "BOOLEAN",
            SchemaType::String => "VARCHAR(4000)",
            SchemaType::Bytes => "BLOB",
            other => return Err(unsupported_type(field, other)),
        },
    };
    Ok(name.to_string())
}

/// Error for a field whose schema type has no column equivalent
pub fn unsupported_type(field: &SinkRecordField, schema_type: SchemaType) -> Error {
    Error::unsupported(
        "column type",
        format!(
            "no column type for field {} of schema type {:?}",
            field.name(),
            schema_type
        ),
    )
}
