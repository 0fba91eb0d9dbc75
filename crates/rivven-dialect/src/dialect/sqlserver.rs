//! SQL Server dialect
//!
//! Upserts are expressed as a `MERGE` holding a range lock on the target so
//! concurrent writers cannot insert the same key twice.

use crate::config::DialectConfig;
use crate::error::{Error, Result};
use crate::fields::SinkRecordField;
use crate::identifier::{CaseFolding, ColumnId, IdentifierRules, TableId};
use crate::record::{LogicalType, SchemaType};
use crate::schema::TableDefinition;
use crate::statements::{
    self, all_columns, append_column_names, append_column_spec, check_addable, log_statement,
    unsupported_type,
};

use super::{DatabaseDialect, DropOptions};

/// Most parameters a single SQL Server statement accepts
pub const MAX_PARAMETERS: usize = 2100;

/// Row constructors allowed in a single VALUES list
pub const MAX_VALUES_ROWS: usize = 1000;

const SYSTEM_SCHEMAS: [&str; 2] = ["sys", "information_schema"];

/// SQL Server dialect
#[derive(Debug, Clone)]
pub struct SqlServerDialect {
    config: DialectConfig,
    rules: IdentifierRules,
}

impl SqlServerDialect {
    /// Registered name
    pub const NAME: &'static str = "SqlServer";

    /// Create a SQL Server dialect
    pub fn new(config: DialectConfig) -> Self {
        Self {
            config,
            rules: IdentifierRules::new(".", "[", "]", CaseFolding::Preserve),
        }
    }
}

impl DatabaseDialect for SqlServerDialect {
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

    fn sql_type_name(&self, field: &SinkRecordField) -> Result<String> {
        let name = match field.logical() {
            Some(LogicalType::Decimal { scale }) => return Ok(format!("decimal(38,{})", scale)),
            Some(LogicalType::Date) => "date",
            Some(LogicalType::Time) => "time",
            Some(LogicalType::Timestamp) => "datetime2",
            None => match field.schema_type() {
                SchemaType::Int8 => "tinyint",
                SchemaType::Int16 => "smallint",
                SchemaType::Int32 => "int",
                SchemaType::Int64 => "bigint",
                SchemaType::Float32 => "real",
                SchemaType::Float64 => "float",
                SchemaType::Boolean => "bit",
                // index keys are limited to 900 bytes
                SchemaType::String if field.is_primary_key() => "varchar(900)",
                SchemaType::String => "varchar(max)",
                SchemaType::Bytes => "varbinary(max)",
                other => return Err(unsupported_type(field, other)),
            },
        };
        Ok(name.to_string())
    }

    fn build_multi_insert_statement(
        &self,
        table: &TableId,
        records: usize,
        key_columns: &[ColumnId],
        non_key_columns: &[ColumnId],
    ) -> Result<String> {
        if records > MAX_VALUES_ROWS {
            return Err(Error::unsupported(
                "multi-row insert",
                format!(
                    "{} records into {}; {} accepts at most {} rows per VALUES list",
                    records,
                    table,
                    self.name(),
                    MAX_VALUES_ROWS
                ),
            ));
        }
        let parameters = records.saturating_mul(key_columns.len() + non_key_columns.len());
        if parameters > MAX_PARAMETERS {
            return Err(Error::unsupported(
                "multi-row insert",
                format!(
                    "{} records into {} need {} parameters; {} accepts at most {}",
                    records,
                    table,
                    parameters,
                    self.name(),
                    MAX_PARAMETERS
                ),
            ));
        }
        statements::multi_insert(self, table, records, key_columns, non_key_columns)
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
        let mut b = self.expression_builder();
        b.append("MERGE INTO ")
            .append_table(table)
            .append(" WITH (HOLDLOCK) AS target USING (SELECT ");
        b.append_list(", ", columns.iter().copied(), |b, c| {
            b.append("? AS ").append_column(c);
        });
        b.append(") AS incoming ON (");
        b.append_list(" AND ", key_columns, |b, c| {
            b.append("target.").append_column(c).append("=incoming.").append_column(c);
        });
        b.append(")");
        if !non_key_columns.is_empty() {
            b.append(" WHEN MATCHED THEN UPDATE SET ");
            b.append_list(",", non_key_columns, |b, c| {
                b.append_column(c).append("=incoming.").append_column(c);
            });
        }
        b.append(" WHEN NOT MATCHED THEN INSERT (");
        append_column_names(&mut b, &columns);
        b.append(") VALUES (");
        b.append_list(",", columns.iter().copied(), |b, c| {
            b.append("incoming.").append_column(c);
        });
        b.append(");");
        let sql = b.build();
        log_statement(self.name(), &sql);
        Ok(sql)
    }

    fn supports_delete(&self) -> bool {
        true
    }

    fn build_alter_table(&self, table: &TableId, fields: &[SinkRecordField]) -> Result<Vec<String>> {
        if fields.is_empty() {
            return Ok(Vec::new());
        }
        check_addable(table, fields)?;
        let newlines = fields.len() > 1;
        let mut b = self.expression_builder();
        b.append("ALTER TABLE ").append_table(table).append(" ADD");
        for (i, field) in fields.iter().enumerate() {
            if i > 0 {
                b.append(",");
            }
            b.append(if newlines { "\n" } else { " " });
            append_column_spec(self, &mut b, table, field)?;
        }
        let sql = b.build();
        log_statement(self.name(), &sql);
        Ok(vec![sql])
    }

    fn build_drop_table_statement(&self, table: &TableId, options: DropOptions) -> Result<String> {
        if options.cascade {
            return Err(Error::unsupported(
                "drop table",
                format!("{} has no DROP TABLE ... CASCADE", self.name()),
            ));
        }
        Ok(statements::drop_table(self, table, options))
    }

    fn current_timestamp_query(&self) -> &'static str {
        "SELECT GETDATE()"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::Schema;

    fn dialect() -> SqlServerDialect {
        SqlServerDialect::new(DialectConfig::default())
    }

    #[test]
    fn test_merge_upsert() {
        let d = dialect();
        let t = TableId::new(None, Some("dbo"), "accounts");
        let sql = d
            .build_upsert_query_statement(
                &t,
                &[ColumnId::named("id")],
                &[ColumnId::named("name")],
                None,
            )
            .unwrap();
        assert_eq!(
            sql,
            "MERGE INTO [dbo].[accounts] WITH (HOLDLOCK) AS target USING (SELECT ? AS [id], ? AS [name]) AS incoming ON (target.[id]=incoming.[id]) WHEN MATCHED THEN UPDATE SET [name]=incoming.[name] WHEN NOT MATCHED THEN INSERT ([id],[name]) VALUES (incoming.[id],incoming.[name]);"
        );
    }

    #[test]
    fn test_multi_insert_parameter_limit() {
        let d = dialect();
        let t = TableId::table("t");
        let cols: Vec<ColumnId> = (0..10).map(|i| ColumnId::named(format!("c{}", i))).collect();
        assert!(d.build_multi_insert_statement(&t, 210, &[], &cols).is_ok());
        let err = d.build_multi_insert_statement(&t, 211, &[], &cols).unwrap_err();
        assert!(err.is_unsupported());
    }

    #[test]
    fn test_multi_insert_row_limit() {
        let d = dialect();
        let t = TableId::table("t");
        let cols = [ColumnId::named("c")];
        assert!(d.build_multi_insert_statement(&t, 1000, &[], &cols).is_ok());
        let err = d.build_multi_insert_statement(&t, 2000, &[], &cols).unwrap_err();
        assert!(err.is_unsupported());
        assert!(err.to_string().contains("1000"), "{}", err);
    }

    #[test]
    fn test_drop_options() {
        let d = dialect();
        let t = TableId::table("t");
        assert_eq!(
            d.build_drop_table_statement(&t, DropOptions::new().with_if_exists(true))
                .unwrap(),
            "DROP TABLE IF EXISTS [t]"
        );
        assert!(d
            .build_drop_table_statement(&t, DropOptions::new().with_cascade(true))
            .unwrap_err()
            .is_unsupported());
    }

    #[test]
    fn test_alter_table_single_add() {
        let d = dialect();
        let t = TableId::table("t");
        let fields = vec![
            SinkRecordField::new(Schema::of(SchemaType::Int32).optional(), "a", false),
            SinkRecordField::new(Schema::of(SchemaType::String).optional(), "b", false),
        ];
        let single = d.build_alter_table(&t, &fields[..1]).unwrap();
        assert_eq!(single, vec!["ALTER TABLE [t] ADD [a] int NULL".to_string()]);
        let multi = d.build_alter_table(&t, &fields).unwrap();
        assert_eq!(
            multi,
            vec!["ALTER TABLE [t] ADD\n[a] int NULL,\n[b] varchar(max) NULL".to_string()]
        );
    }
}
