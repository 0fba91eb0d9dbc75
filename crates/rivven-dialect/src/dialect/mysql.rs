//! MySQL dialect

use crate::config::DialectConfig;
use crate::error::{Error, Result};
use crate::fields::SinkRecordField;
use crate::identifier::{CaseFolding, ColumnId, IdentifierRules, TableId};
use crate::record::{LogicalType, SchemaType};
use crate::schema::TableDefinition;
use crate::statements::{all_columns, append_column_names, log_statement, unsupported_type};

use super::DatabaseDialect;

const SYSTEM_SCHEMAS: [&str; 4] = ["mysql", "sys", "performance_schema", "information_schema"];

/// MySQL dialect.
///
/// MySQL databases are exposed as catalogs, so `a.b` parses as
/// `catalog.table`.
#[derive(Debug, Clone)]
pub struct MySqlDialect {
    config: DialectConfig,
    rules: IdentifierRules,
}

impl MySqlDialect {
    /// Registered name
    pub const NAME: &'static str = "MySQL";

    /// Create a MySQL dialect
    pub fn new(config: DialectConfig) -> Self {
        Self {
            config,
            rules: IdentifierRules::quoted_with("`", CaseFolding::Preserve),
        }
    }
}

impl DatabaseDialect for MySqlDialect {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn config(&self) -> &DialectConfig {
        &self.config
    }

    fn identifier_rules(&self) -> &IdentifierRules {
        &self.rules
    }

    fn uses_catalogs(&self) -> bool {
        true
    }

    fn is_system_table(&self, table: &TableId) -> bool {
        [table.catalog_name(), table.schema_name()]
            .into_iter()
            .flatten()
            .any(|name| SYSTEM_SCHEMAS.iter().any(|sys| sys.eq_ignore_ascii_case(name)))
    }

    fn sql_type_name(&self, field: &SinkRecordField) -> Result<String> {
        let name = match field.logical() {
            Some(LogicalType::Decimal { scale }) => return Ok(format!("DECIMAL(65,{})", scale)),
            Some(LogicalType::Date) => "DATE",
            Some(LogicalType::Time) => "TIME(3)",
            Some(LogicalType::Timestamp) => "DATETIME(3)",
            None => match field.schema_type() {
                SchemaType::Int8 => "TINYINT",
                SchemaType::Int16 => "SMALLINT",
                SchemaType::Int32 => "INT",
                SchemaType::Int64 => "BIGINT",
                SchemaType::Float32 => "FLOAT",
                SchemaType::Float64 => "DOUBLE",
                SchemaType::Boolean => "TINYINT",
                // indexed columns need a bounded length
                SchemaType::String if field.is_primary_key() => "VARCHAR(256)",
                SchemaType::String => "TEXT",
                SchemaType::Bytes => "VARBINARY(1024)",
                other => return Err(unsupported_type(field, other)),
            },
        };
        Ok(name.to_string())
    }

    fn build_upsert_query_statement(
        &self,
        table: &TableId,
        key_columns: &[ColumnId],
        non_key_columns: &[ColumnId],
        _definition: Option<&TableDefinition>,
    ) -> Result<String> {
        if key_columns.is_empty() {
            return Err(Error::schema(format!(
                "cannot build upsert for {}: no key columns",
                table
            )));
        }
        let columns = all_columns(key_columns, non_key_columns);
        let updated = if non_key_columns.is_empty() {
            key_columns
        } else {
            non_key_columns
        };
        let mut b = self.expression_builder();
        b.append("INSERT INTO ").append_table(table).append(" (");
        append_column_names(&mut b, &columns);
        b.append(") VALUES (")
            .append_multiple(",", "?", columns.len())
            .append(") ON DUPLICATE KEY UPDATE ");
        b.append_list(",", updated, |b, c| {
            b.append_column(c).append("=VALUES(").append_column(c).append(")");
        });
        let sql = b.build();
        log_statement(self.name(), &sql);
        Ok(sql)
    }

    fn supports_delete(&self) -> bool {
        true
    }
}
