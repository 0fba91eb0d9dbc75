//! Identifier quoting and table name parsing across dialects

use proptest::prelude::*;

use rivven_dialect::config::DialectConfig;
use rivven_dialect::dialect::{
    DatabaseDialect, GenericDialect, MySqlDialect, OracleDialect, PostgresDialect,
    SqlServerDialect,
};
use rivven_dialect::identifier::{QuoteMethod, TableId};

fn config() -> DialectConfig {
    DialectConfig::new("jdbc:test://localhost/db")
}

#[test]
fn test_quoting_per_dialect() {
    let table = TableId::new(None, Some("sales"), "orders");
    let cases: Vec<(Box<dyn DatabaseDialect>, &str)> = vec![
        (Box::new(GenericDialect::new(config())), "\"sales\".\"orders\""),
        (Box::new(PostgresDialect::new(config())), "\"sales\".\"orders\""),
        (Box::new(MySqlDialect::new(config())), "`sales`.`orders`"),
        (Box::new(SqlServerDialect::new(config())), "[sales].[orders]"),
        (Box::new(OracleDialect::new(config())), "\"sales\".\"orders\""),
    ];
    for (dialect, expected) in cases {
        let mut b = dialect.expression_builder();
        b.append_table(&table);
        assert_eq!(b.build(), expected, "dialect {}", dialect.name());
    }
}

#[test]
fn test_embedded_quotes_are_doubled() {
    let mysql = MySqlDialect::new(config());
    let mut b = mysql.expression_builder();
    b.append_identifier("my`table");
    assert_eq!(b.as_str(), "`my``table`");

    let sqlserver = SqlServerDialect::new(config());
    let mut b = sqlserver.expression_builder();
    b.append_identifier("a]b");
    assert_eq!(b.as_str(), "[a]]b]");
}

#[test]
fn test_quote_when_needed_follows_case_folding() {
    let pg = PostgresDialect::new(config().with_quote_identifiers(QuoteMethod::WhenNeeded));
    let mut b = pg.expression_builder();
    b.append_identifier("orders").append(",").append_identifier("Orders");
    assert_eq!(b.build(), "orders,\"Orders\"");

    let oracle = OracleDialect::new(config().with_quote_identifiers(QuoteMethod::WhenNeeded));
    let mut b = oracle.expression_builder();
    b.append_identifier("ORDERS").append(",").append_identifier("orders");
    assert_eq!(b.build(), "ORDERS,\"orders\"");
}

#[test]
fn test_never_quote() {
    let generic = GenericDialect::new(config().with_quote_identifiers(QuoteMethod::Never));
    assert_eq!(
        generic.build_select_table_query(&TableId::new(None, Some("s"), "t")),
        "SELECT * FROM s.t"
    );
}

#[test]
fn test_parse_one_two_three_parts() {
    let generic = GenericDialect::new(config());
    assert_eq!(generic.parse_table_identifier("t").unwrap(), TableId::table("t"));
    assert_eq!(
        generic.parse_table_identifier("s.t").unwrap(),
        TableId::new(None, Some("s"), "t")
    );
    assert_eq!(
        generic.parse_table_identifier("c.s.t").unwrap(),
        TableId::new(Some("c"), Some("s"), "t")
    );

    let mysql = MySqlDialect::new(config());
    assert_eq!(
        mysql.parse_table_identifier("shop.orders").unwrap(),
        TableId::new(Some("shop"), None, "orders")
    );
}

#[test]
fn test_parse_quoted_names_keep_delimiters() {
    let pg = PostgresDialect::new(config());
    let id = pg.parse_table_identifier(r#""my schema"."odd.name""#).unwrap();
    assert_eq!(id.schema_name(), Some("my schema"));
    assert_eq!(id.table_name(), "odd.name");

    let sqlserver = SqlServerDialect::new(config());
    let id = sqlserver.parse_table_identifier("[dbo].[order]]s]").unwrap();
    assert_eq!(id, TableId::new(None, Some("dbo"), "order]s"));
}

#[test]
fn test_parse_errors_fail_fast() {
    let generic = GenericDialect::new(config());
    for bad in ["", "   ", "a..b", "a.", ".a", "\"unterminated", "a.b.c.d", "\"a\"b"] {
        let err = generic.parse_table_identifier(bad).unwrap_err();
        assert!(
            err.to_string().contains("parse error"),
            "'{}' should fail to parse, got {}",
            bad,
            err
        );
    }
}

fn name() -> impl Strategy<Value = String> {
    "[A-Za-z_][A-Za-z0-9_ .\"`\\]\\[]{0,12}"
}

fn table_id() -> impl Strategy<Value = TableId> {
    (proptest::option::of((proptest::option::of(name()), name())), name()).prop_map(
        |(qualifier, table)| match qualifier {
            None => TableId::table(table),
            Some((catalog, schema)) => TableId::new(catalog.as_deref(), Some(&schema), table),
        },
    )
}

proptest! {
    #[test]
    fn prop_qualified_name_round_trips(id in table_id()) {
        let dialects: Vec<Box<dyn DatabaseDialect>> = vec![
            Box::new(GenericDialect::new(config())),
            Box::new(PostgresDialect::new(config())),
            Box::new(SqlServerDialect::new(config())),
            Box::new(OracleDialect::new(config())),
        ];
        for dialect in dialects {
            let rendered = dialect.identifier_rules().qualified(&id);
            let parsed = dialect.parse_table_identifier(&rendered).unwrap();
            prop_assert_eq!(&parsed, &id, "dialect {} rendered {}", dialect.name(), rendered);
        }
    }

    #[test]
    fn prop_catalog_qualified_round_trips_for_mysql(catalog in name(), table in name()) {
        let mysql = MySqlDialect::new(config());
        let id = TableId::new(Some(&catalog), None, table);
        let rendered = mysql.identifier_rules().qualified(&id);
        prop_assert_eq!(mysql.parse_table_identifier(&rendered).unwrap(), id);
    }
}
