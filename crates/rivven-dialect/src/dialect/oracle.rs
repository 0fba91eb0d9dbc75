//! Oracle dialect

use crate::config::DialectConfig;
use crate::error::{Error, Result};
use crate::fields::SinkRecordField;
use crate::identifier::{CaseFolding, ColumnId, IdentifierRules, TableId};
use crate::mapping::FieldKind;
use crate::record::{LogicalType, SchemaType};
use crate::schema::{ColumnDefinition, TableDefinition};
use crate::statements::{
    append_column_spec, check_addable, log_statement, unsupported_type,
};

use super::{DatabaseDialect, DropOptions};

const SYSTEM_SCHEMAS: [&str; 10] = [
    "SYS", "SYSTEM", "OUTLN", "XDB", "MDSYS", "CTXSYS", "DBSNMP", "ORDSYS", "WMSYS", "APPQOSSYS",
];

/// Oracle dialect.
///
/// Unquoted names fold to upper case. Multi-row INSERT is not supported.
#[derive(Debug, Clone)]
pub struct OracleDialect {
    config: DialectConfig,
    rules: IdentifierRules,
}

impl OracleDialect {
    /// Registered name
    pub const NAME: &'static str = "Oracle";

    /// Create an Oracle dialect
    pub fn new(config: DialectConfig) -> Self {
        Self {
            config,
            rules: IdentifierRules::quoted_with("\"", CaseFolding::Upper),
        }
    }
}

impl DatabaseDialect for OracleDialect {
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
        // dropped tables linger in the recycle bin as BIN$...
        table.table_name().starts_with("BIN$")
            || table
                .schema_name()
                .is_some_and(|s| SYSTEM_SCHEMAS.iter().any(|sys| sys.eq_ignore_ascii_case(s)))
    }

    fn field_kind(&self, column: &ColumnDefinition) -> Option<FieldKind> {
        match column.type_name().to_ascii_uppercase().as_str() {
            "BINARY_FLOAT" => Some(FieldKind::Float32),
            "BINARY_DOUBLE" => Some(FieldKind::Float64),
            _ => self.type_mapping().field_kind(column),
        }
    }

    fn sql_type_name(&self, field: &SinkRecordField) -> Result<String> {
        let name = match field.logical() {
            Some(LogicalType::Decimal { scale }) => return Ok(format!("NUMBER(*,{})", scale)),
            Some(LogicalType::Date) | Some(LogicalType::Time) => "DATE",
            Some(LogicalType::Timestamp) => "TIMESTAMP",
            None => match field.schema_type() {
                SchemaType::Int8 => "NUMBER(3,0)",
                SchemaType::Int16 => "NUMBER(5,0)",
                SchemaType::Int32 => "NUMBER(10,0)",
                SchemaType::Int64 => "NUMBER(19,0)",
                SchemaType::Float32 => "BINARY_FLOAT",
                SchemaType::Float64 => "BINARY_DOUBLE",
                SchemaType::Boolean => "NUMBER(1,0)",
                SchemaType::String if field.is_primary_key() => "VARCHAR2(4000)",
                SchemaType::String => "CLOB",
                SchemaType::Bytes => "BLOB",
                other => return Err(unsupported_type(field, other)),
            },
        };
        Ok(name.to_string())
    }

    fn supports_multi_insert(&self) -> bool {
        false
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
        let columns: Vec<&ColumnId> = key_columns.iter().chain(non_key_columns).collect();
        let mut b = self.expression_builder();
        b.append("MERGE INTO ").append_table(table).append(" USING (SELECT ");
        b.append_list(", ", columns.iter().copied(), |b, c| {
            b.append("? ").append_column(c);
        });
        b.append(" FROM dual) incoming ON (");
        b.append_list(" AND ", key_columns, |b, c| {
            b.append_table(table)
                .append(".")
                .append_column(c)
                .append("=incoming.")
                .append_column(c);
        });
        b.append(")");
        if !non_key_columns.is_empty() {
            b.append(" WHEN MATCHED THEN UPDATE SET ");
            b.append_list(",", non_key_columns, |b, c| {
                b.append_table(table)
                    .append(".")
                    .append_column(c)
                    .append("=incoming.")
                    .append_column(c);
            });
        }
        b.append(" WHEN NOT MATCHED THEN INSERT (");
        b.append_list(",", columns.iter().copied(), |b, c| {
            b.append_table(table).append(".").append_column(c);
        });
        b.append(") VALUES (");
        b.append_list(",", columns.iter().copied(), |b, c| {
            b.append("incoming.").append_column(c);
        });
        b.append(")");
        let sql = b.build();
        log_statement(self.name(), &sql);
        Ok(sql)
    }

    fn build_alter_table(&self, table: &TableId, fields: &[SinkRecordField]) -> Result<Vec<String>> {
        if fields.is_empty() {
            return Ok(Vec::new());
        }
        check_addable(table, fields)?;
        let mut b = self.expression_builder();
        b.append("ALTER TABLE ").append_table(table).append(" ADD(");
        for (i, field) in fields.iter().enumerate() {
            if i > 0 {
                b.append(",");
            }
            b.append("\n");
            append_column_spec(self, &mut b, table, field)?;
        }
        b.append(")");
        let sql = b.build();
        log_statement(self.name(), &sql);
        Ok(vec![sql])
    }

    fn build_drop_table_statement(&self, table: &TableId, options: DropOptions) -> Result<String> {
        if options.if_exists {
            return Err(Error::unsupported(
                "drop table",
                format!("{} has no DROP TABLE IF EXISTS", self.name()),
            ));
        }
        let mut b = self.expression_builder();
        b.append("DROP TABLE ").append_table(table);
        if options.cascade {
            b.append(" CASCADE CONSTRAINTS");
        }
        Ok(b.build())
    }

    fn current_timestamp_query(&self) -> &'static str {
        "SELECT CURRENT_TIMESTAMP FROM dual"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::Schema;
    use crate::schema::ColumnFacts;
    use crate::types::SqlType;

    fn dialect() -> OracleDialect {
        OracleDialect::new(DialectConfig::default())
    }

    #[test]
    fn test_merge_from_dual() {
        let d = dialect();
        let t = TableId::table("ACCOUNTS");
        let sql = d
            .build_upsert_query_statement(
                &t,
                &[ColumnId::named("ID")],
                &[ColumnId::named("NAME")],
                None,
            )
            .unwrap();
        assert_eq!(
            sql,
            r#"MERGE INTO "ACCOUNTS" USING (SELECT ? "ID", ? "NAME" FROM dual) incoming ON ("ACCOUNTS"."ID"=incoming."ID") WHEN MATCHED THEN UPDATE SET "ACCOUNTS"."NAME"=incoming."NAME" WHEN NOT MATCHED THEN INSERT ("ACCOUNTS"."ID","ACCOUNTS"."NAME") VALUES (incoming."ID",incoming."NAME")"#
        );
    }

    #[test]
    fn test_multi_insert_unsupported() {
        let d = dialect();
        let err = d
            .build_multi_insert_statement(&TableId::table("T"), 2, &[ColumnId::named("A")], &[])
            .unwrap_err();
        assert!(err.is_unsupported());
    }

    #[test]
    fn test_drop_options() {
        let d = dialect();
        let t = TableId::table("T");
        assert_eq!(
            d.build_drop_table_statement(&t, DropOptions::new().with_cascade(true))
                .unwrap(),
            r#"DROP TABLE "T" CASCADE CONSTRAINTS"#
        );
        assert!(d
            .build_drop_table_statement(&t, DropOptions::new().with_if_exists(true))
            .unwrap_err()
            .is_unsupported());
    }

    #[test]
    fn test_alter_table_parenthesized() {
        let d = dialect();
        let t = TableId::table("T");
        let fields = vec![
            SinkRecordField::new(Schema::of(SchemaType::Int64).optional(), "A", false),
            SinkRecordField::new(Schema::of(SchemaType::String).optional(), "B", false),
        ];
        assert_eq!(
            d.build_alter_table(&t, &fields).unwrap(),
            vec!["ALTER TABLE \"T\" ADD(\n\"A\" NUMBER(19,0) NULL,\n\"B\" CLOB NULL)".to_string()]
        );
    }

    #[test]
    fn test_binary_float_by_type_name() {
        let d = dialect();
        let t = TableId::table("T");
        let c = ColumnDefinition::new(t.column("F"), ColumnFacts::new(SqlType::Other, "BINARY_FLOAT"));
        assert_eq!(d.field_kind(&c), Some(FieldKind::Float32));
    }
}
