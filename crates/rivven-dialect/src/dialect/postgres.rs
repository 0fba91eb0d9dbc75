//! PostgreSQL dialect
//!
//! Upserts with `INSERT ... ON CONFLICT`, folds unquoted names to lower case
//! and casts parameters bound to `json`, `jsonb` and `uuid` columns when the
//! target table definition is known.

use crate::config::DialectConfig;
use crate::error::{Error, Result};
use crate::fields::SinkRecordField;
use crate::identifier::{CaseFolding, ColumnId, ExpressionBuilder, IdentifierRules, TableId};
use crate::mapping::{FieldKind, TypeMapping};
use crate::record::{LogicalType, Schema, SchemaType};
use crate::schema::{ColumnDefinition, TableDefinition};
use crate::statements::{self, all_columns, append_column_names, log_statement, unsupported_type};
use crate::types::{SqlType, Value};

use super::DatabaseDialect;

const SYSTEM_SCHEMAS: [&str; 2] = ["pg_catalog", "information_schema"];

/// Scale for `numeric` columns declared without precision (NUMERIC_MIN_SIG_DIGITS)
const UNCONSTRAINED_NUMERIC_SCALE: u32 = 16;

/// PostgreSQL dialect
#[derive(Debug, Clone)]
pub struct PostgresDialect {
    config: DialectConfig,
    rules: IdentifierRules,
}

impl PostgresDialect {
    /// Registered name
    pub const NAME: &'static str = "PostgreSQL";

    /// Create a PostgreSQL dialect
    pub fn new(config: DialectConfig) -> Self {
        Self {
            config,
            rules: IdentifierRules::quoted_with("\"", CaseFolding::Lower),
        }
    }

    fn placeholder(definition: Option<&TableDefinition>, column: &ColumnId) -> &'static str {
        let type_name = definition
            .and_then(|d| d.definition_for_column(column.name()))
            .map(|c| c.type_name().to_ascii_lowercase());
        match type_name.as_deref() {
            Some("json") => "?::json",
            Some("jsonb") => "?::jsonb",
            Some("uuid") => "?::uuid",
            _ => "?",
        }
    }

    fn append_placeholders(
        b: &mut ExpressionBuilder<'_>,
        columns: &[&ColumnId],
        definition: Option<&TableDefinition>,
    ) {
        b.append_list(",", columns.iter().copied(), |b, c| {
            b.append(Self::placeholder(definition, c));
        });
    }
}

impl DatabaseDialect for PostgresDialect {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn config(&self) -> &DialectConfig {
        &self.config
    }

    fn identifier_rules(&self) -> &IdentifierRules {
        &self.rules
    }

    fn is_system_table(&self, table: &TableId) -> bool {
        table
            .schema_name()
            .is_some_and(|s| SYSTEM_SCHEMAS.iter().any(|sys| sys.eq_ignore_ascii_case(s)))
    }

    fn type_mapping(&self) -> TypeMapping {
        TypeMapping::new(self.config.numeric_mapping)
            .with_default_decimal_scale(UNCONSTRAINED_NUMERIC_SCALE)
    }

    fn field_kind(&self, column: &ColumnDefinition) -> Option<FieldKind> {
        match column.sql_type() {
            SqlType::Bit if column.precision() <= 1 => return Some(FieldKind::Boolean),
            SqlType::Bit => return Some(FieldKind::Bytes),
            SqlType::Other | SqlType::Char | SqlType::VarChar | SqlType::JavaObject => {
                let type_name = column.type_name().to_ascii_lowercase();
                if matches!(type_name.as_str(), "uuid" | "json" | "jsonb") {
                    return Some(FieldKind::String);
                }
            }
            _ => {}
        }
        self.type_mapping().field_kind(column)
    }

    fn sql_type_name(&self, field: &SinkRecordField) -> Result<String> {
        let name = match field.logical() {
            Some(LogicalType::Decimal { .. }) => "DECIMAL",
            Some(LogicalType::Date) => "DATE",
            Some(LogicalType::Time) => "TIME",
            Some(LogicalType::Timestamp) => "TIMESTAMP",
            None => match field.schema_type() {
                SchemaType::Int8 | SchemaType::Int16 => "SMALLINT",
                SchemaType::Int32 => "INT",
                SchemaType::Int64 => "BIGINT",
                SchemaType::Float32 => "REAL",
                SchemaType::Float64 => "DOUBLE PRECISION",
                SchemaType::Boolean => "BOOLEAN",
                SchemaType::String => "TEXT",
                SchemaType::Bytes => "BYTEA",
                other => return Err(unsupported_type(field, other)),
            },
        };
        Ok(name.to_string())
    }

    fn format_column_value(
        &self,
        builder: &mut ExpressionBuilder<'_>,
        schema: &Schema,
        value: &Value,
    ) -> Result<()> {
        if schema.logical.is_none() && schema.schema_type == SchemaType::Boolean {
            if let Some(flag) = value.as_bool() {
                builder.append(if flag { "TRUE" } else { "FALSE" });
                return Ok(());
            }
        }
        statements::format_column_value(builder, schema, value)
    }

    fn build_insert_statement(
        &self,
        table: &TableId,
        key_columns: &[ColumnId],
        non_key_columns: &[ColumnId],
        definition: Option<&TableDefinition>,
    ) -> Result<String> {
        if definition.is_none() {
            return statements::insert(self, table, key_columns, non_key_columns);
        }
        let columns = all_columns(key_columns, non_key_columns);
        if columns.is_empty() {
            return Err(Error::schema(format!(
                "cannot build INSERT for {}: no columns",
                table
            )));
        }
        let mut b = self.expression_builder();
        b.append("INSERT INTO ").append_table(table).append(" (");
        append_column_names(&mut b, &columns);
        b.append(") VALUES (");
        Self::append_placeholders(&mut b, &columns, definition);
        b.append(")");
        let sql = b.build();
        log_statement(self.name(), &sql);
        Ok(sql)
    }

    fn build_update_statement(
        &self,
        table: &TableId,
        key_columns: &[ColumnId],
        non_key_columns: &[ColumnId],
        definition: Option<&TableDefinition>,
    ) -> Result<String> {
        if definition.is_none() {
            return statements::update(self, table, key_columns, non_key_columns);
        }
        if non_key_columns.is_empty() {
            return Err(Error::schema(format!(
                "cannot build UPDATE for {}: no non-key columns to set",
                table
            )));
        }
        let mut b = self.expression_builder();
        b.append("UPDATE ").append_table(table).append(" SET ");
        b.append_list(", ", non_key_columns, |b, c| {
            b.append_column(c)
                .append(" = ")
                .append(Self::placeholder(definition, c));
        });
        if !key_columns.is_empty() {
            b.append(" WHERE ");
            b.append_list(" AND ", key_columns, |b, c| {
                b.append_column(c)
                    .append(" = ")
                    .append(Self::placeholder(definition, c));
            });
        }
        let sql = b.build();
        log_statement(self.name(), &sql);
        Ok(sql)
    }

    fn build_upsert_query_statement(
        &self,
        table: &TableId,
        key_columns: &[ColumnId],
        non_key_columns: &[ColumnId],
        definition: Option<&TableDefinition>,
    ) -> Result<String> {
        if key_columns.is_empty() {
            return Err(Error::schema(format!(
                "cannot build upsert for {}: no key columns",
                table
            )));
        }
        let columns = all_columns(key_columns, non_key_columns);
        let mut b = self.expression_builder();
        b.append("INSERT INTO ").append_table(table).append(" (");
        append_column_names(&mut b, &columns);
        b.append(") VALUES (");
        Self::append_placeholders(&mut b, &columns, definition);
        b.append(") ON CONFLICT (");
        b.append_list(",", key_columns, |b, c| {
            b.append_column(c);
        });
        if non_key_columns.is_empty() {
            b.append(") DO NOTHING");
        } else {
            b.append(") DO UPDATE SET ");
            b.append_list(",", non_key_columns, |b, c| {
                b.append_column(c).append("=EXCLUDED.").append_column(c);
            });
        }
        let sql = b.build();
        log_statement(self.name(), &sql);
        Ok(sql)
    }

    fn supports_delete(&self) -> bool {
        true
    }
}
