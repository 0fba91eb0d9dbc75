//! ANSI fallback dialect

use crate::config::DialectConfig;
use crate::identifier::IdentifierRules;

use super::DatabaseDialect;

/// Dialect for databases without a dedicated variant.
///
/// Uses double-quoted identifiers and ANSI column types. Upsert and delete
/// are not supported.
#[derive(Debug, Clone)]
pub struct GenericDialect {
    config: DialectConfig,
    rules: IdentifierRules,
}

impl GenericDialect {
    /// Registered name
    pub const NAME: &'static str = "Generic";

    /// Create a generic dialect
    pub fn new(config: DialectConfig) -> Self {
        Self {
            config,
            rules: IdentifierRules::default(),
        }
    }

    /// Replace the identifier rules, e.g. with the quote string a driver reports
    pub fn with_identifier_rules(mut self, rules: IdentifierRules) -> Self {
        self.rules = rules;
        self
    }
}

impl DatabaseDialect for GenericDialect {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn config(&self) -> &DialectConfig {
        &self.config
    }

    fn identifier_rules(&self) -> &IdentifierRules {
        &self.rules
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dialect::DropOptions;
    use crate::identifier::{ColumnId, TableId};

    fn dialect() -> GenericDialect {
        GenericDialect::new(DialectConfig::default())
    }

    #[test]
    fn test_unsupported_operations() {
        let d = dialect();
        let t = TableId::table("t");
        let key = vec![t.column("id")];
        let err = d.build_upsert_query_statement(&t, &key, &[], None).unwrap_err();
        assert!(err.is_unsupported());
        assert!(!d.supports_delete());
        assert!(d.build_delete_statement(&t, 1, &key).unwrap_err().is_unsupported());
    }

    #[test]
    fn test_drop_accepts_every_option_combination() {
        let d = dialect();
        let t = TableId::table("t");
        let sql = d
            .build_drop_table_statement(&t, DropOptions::new().with_if_exists(true).with_cascade(true))
            .unwrap();
        assert_eq!(sql, r#"DROP TABLE IF EXISTS "t" CASCADE"#);
        assert_eq!(
            d.build_drop_table_statement(&t, DropOptions::new()).unwrap(),
            r#"DROP TABLE "t""#
        );
    }

    #[test]
    fn test_multi_insert() {
        let d = dialect();
        let t = TableId::table("t");
        let sql = d
            .build_multi_insert_statement(&t, 2, &[ColumnId::named("a")], &[ColumnId::named("b")])
            .unwrap();
        assert_eq!(sql, r#"INSERT INTO "t" ("a","b") VALUES (?,?),(?,?)"#);
    }
}
