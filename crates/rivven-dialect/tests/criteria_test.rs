//! Incremental polling queries and offsets

mod common;

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use proptest::prelude::*;

use common::MockStatement;
use rivven_dialect::config::DialectConfig;
use rivven_dialect::criteria::{
    CriteriaValues, TimestampIncrementingCriteria, TimestampIncrementingOffset,
};
use rivven_dialect::dialect::{DatabaseDialect, MySqlDialect, PostgresDialect};
use rivven_dialect::identifier::{ColumnId, TableId};
use rivven_dialect::record::{LogicalType, Schema, SchemaBuilder, SchemaType, Struct};
use rivven_dialect::types::Value;

fn config() -> DialectConfig {
    DialectConfig::new("jdbc:test://localhost/db")
}

fn orders() -> TableId {
    TableId::new(None, Some("shop"), "orders")
}

fn at(seconds: i64) -> DateTime<Utc> {
    DateTime::from_timestamp(1_700_000_000 + seconds, 0).unwrap()
}

#[test]
fn test_incremental_query_per_dialect() {
    let table = orders();
    let criteria = PostgresDialect::new(config())
        .criteria_for(Some(&table.column("id")), &[table.column("updated_at")])
        .unwrap();

    let pg = PostgresDialect::new(config());
    assert_eq!(
        pg.build_incremental_query(&table, &criteria),
        r#"SELECT * FROM "shop"."orders" WHERE "updated_at" < ? AND (("updated_at" = ? AND "id" > ?) OR "updated_at" > ?) ORDER BY "updated_at","id" ASC"#
    );

    let mysql = MySqlDialect::new(config());
    let table = TableId::new(Some("shop"), None, "orders");
    let criteria = mysql.criteria_for(Some(&ColumnId::named("id")), &[]).unwrap();
    assert_eq!(
        mysql.build_incremental_query(&table, &criteria),
        "SELECT * FROM `shop`.`orders` WHERE `id` > ? ORDER BY `id` ASC"
    );
}

#[test]
fn test_criteria_need_a_column() {
    let pg = PostgresDialect::new(config());
    let err = pg.criteria_for(None, &[]).unwrap_err();
    assert!(err.to_string().contains("configuration error"), "{}", err);
}

#[test]
fn test_parameters_follow_placeholder_order() {
    let offset = TimestampIncrementingOffset::new(Some(at(0)), Some(41));
    let values = CriteriaValues::from_offset(&offset, at(60));
    let id = ColumnId::named("id");
    let ts = ColumnId::named("ts");

    let mut both = MockStatement::new("poll").with_max_params(4);
    TimestampIncrementingCriteria::new(Some(id.clone()), vec![ts.clone()])
        .unwrap()
        .set_query_parameters(&mut both, &values)
        .unwrap();
    assert_eq!(
        both.values(),
        vec![
            Value::DateTimeTz(at(60)),
            Value::DateTimeTz(at(0)),
            Value::Int64(41),
            Value::DateTimeTz(at(0)),
        ]
    );

    let mut inc = MockStatement::new("poll").with_max_params(1);
    TimestampIncrementingCriteria::new(Some(id), vec![])
        .unwrap()
        .set_query_parameters(&mut inc, &values)
        .unwrap();
    assert_eq!(inc.values(), vec![Value::Int64(41)]);

    let mut timestamps = MockStatement::new("poll").with_max_params(2);
    TimestampIncrementingCriteria::new(None, vec![ts])
        .unwrap()
        .set_query_parameters(&mut timestamps, &values)
        .unwrap();
    assert_eq!(
        timestamps.values(),
        vec![Value::DateTimeTz(at(0)), Value::DateTimeTz(at(60))]
    );
}

#[test]
fn test_fresh_offset_starts_at_epoch() {
    let values = CriteriaValues::from_offset(&TimestampIncrementingOffset::default(), at(0));
    assert_eq!(values.begin, DateTime::<Utc>::UNIX_EPOCH);
    assert_eq!(values.last_incrementing, -1);
}

#[test]
fn test_offset_serializes_for_storage() {
    let offset = TimestampIncrementingOffset::new(Some(at(5)), Some(9));
    let json = serde_json::to_string(&offset).unwrap();
    let restored: TimestampIncrementingOffset = serde_json::from_str(&json).unwrap();
    assert_eq!(restored, offset);
}

#[test]
fn test_tie_break_accepts_only_later_rows() {
    let criteria = TimestampIncrementingCriteria::new(
        Some(ColumnId::named("id")),
        vec![ColumnId::named("ts")],
    )
    .unwrap();
    let previous = TimestampIncrementingOffset::new(Some(at(0)), Some(100));
    let verdicts: Vec<bool> = [(0, 100), (0, 101), (-1, 105), (1, 95)]
        .into_iter()
        .map(|(s, id)| {
            criteria.accepts(&previous, &TimestampIncrementingOffset::new(Some(at(s)), Some(id)))
        })
        .collect();
    assert_eq!(verdicts, vec![false, true, false, true]);
}

#[test]
fn test_extract_values_from_composite_timestamps() {
    let schema = Arc::new(
        SchemaBuilder::struct_schema()
            .field("id", Schema::of(SchemaType::Int64))
            .unwrap()
            .field("modified", Schema::logical(LogicalType::Timestamp).optional())
            .unwrap()
            .field("created", Schema::logical(LogicalType::Timestamp))
            .unwrap()
            .build(),
    );
    let criteria = TimestampIncrementingCriteria::new(
        Some(ColumnId::named("id")),
        vec![ColumnId::named("modified"), ColumnId::named("created")],
    )
    .unwrap();

    // a NULL first column falls back to the next one
    let never_modified = Struct::new(Arc::clone(&schema))
        .put("id", 7_i64)
        .unwrap()
        .put("created", at(3))
        .unwrap();
    assert_eq!(
        criteria.extract_values(&schema, &never_modified, None).unwrap(),
        TimestampIncrementingOffset::new(Some(at(3)), Some(7))
    );

    let modified = never_modified.put("modified", at(8)).unwrap();
    assert_eq!(
        criteria.extract_values(&schema, &modified, None).unwrap(),
        TimestampIncrementingOffset::new(Some(at(8)), Some(7))
    );

    let missing_id = Struct::new(Arc::clone(&schema)).put("created", at(1)).unwrap();
    assert!(criteria.extract_values(&schema, &missing_id, None).is_err());
}

#[test]
fn test_incrementing_going_backwards_is_tolerated() {
    let schema = Arc::new(
        SchemaBuilder::struct_schema()
            .field("id", Schema::of(SchemaType::Int32))
            .unwrap()
            .build(),
    );
    let criteria = TimestampIncrementingCriteria::new(Some(ColumnId::named("id")), vec![]).unwrap();
    let previous = TimestampIncrementingOffset::new(None, Some(50));
    let record = Struct::new(Arc::clone(&schema)).put("id", 10_i32).unwrap();
    let offset = criteria.extract_values(&schema, &record, Some(&previous)).unwrap();
    assert_eq!(offset.incrementing, 10);
    assert!(!criteria.accepts(&previous, &offset));
}

proptest! {
    #[test]
    fn prop_accepts_matches_lexicographic_order(
        prev_ts in 0i64..20,
        prev_id in 0i64..20,
        ts in 0i64..20,
        id in 0i64..20,
    ) {
        let criteria = TimestampIncrementingCriteria::new(
            Some(ColumnId::named("id")),
            vec![ColumnId::named("ts")],
        )
        .unwrap();
        let previous = TimestampIncrementingOffset::new(Some(at(prev_ts)), Some(prev_id));
        let candidate = TimestampIncrementingOffset::new(Some(at(ts)), Some(id));
        prop_assert_eq!(
            criteria.accepts(&previous, &candidate),
            (ts, id) > (prev_ts, prev_id)
        );
    }

    #[test]
    fn prop_window_excludes_its_bounds(begin in 0i64..100, width in 1i64..100, probe in -10i64..210) {
        let criteria = TimestampIncrementingCriteria::new(None, vec![ColumnId::named("ts")]).unwrap();
        let previous = TimestampIncrementingOffset::new(Some(at(begin)), None);
        let candidate = TimestampIncrementingOffset::new(Some(at(probe)), None);
        let end = at(begin) + Duration::seconds(width);
        let in_window = criteria.accepts(&previous, &candidate) && at(probe) < end;
        prop_assert_eq!(in_window, probe > begin && probe < begin + width);
    }
}
