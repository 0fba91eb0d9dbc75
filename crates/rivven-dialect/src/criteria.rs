//! Incremental polling criteria
//!
//! Builds WHERE and ORDER BY fragments for queries that poll for rows changed
//! since the last seen `(timestamp, incrementing id)` pair.
//!
//! Rows are ordered by timestamp and then by id. A row is new when its
//! timestamp is later than the last one, or equal with a greater id.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::connection::PreparedStatement;
use crate::error::{Error, Result};
use crate::identifier::{ColumnId, ExpressionBuilder};
use crate::record::{LogicalType, Schema, SchemaType, Struct};
use crate::types::Value;

/// Last position seen by a poller
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimestampIncrementingOffset {
    /// Last timestamp; `None` before the first timestamped row
    pub timestamp: Option<DateTime<Utc>>,
    /// Last incrementing id; -1 before the first row
    pub incrementing: i64,
}

impl Default for TimestampIncrementingOffset {
    fn default() -> Self {
        Self {
            timestamp: None,
            incrementing: -1,
        }
    }
}

impl TimestampIncrementingOffset {
    /// Create an offset
    pub fn new(timestamp: Option<DateTime<Utc>>, incrementing: Option<i64>) -> Self {
        Self {
            timestamp,
            incrementing: incrementing.unwrap_or(-1),
        }
    }

    /// Timestamp to resume from (the epoch when unset)
    pub fn timestamp_offset(&self) -> DateTime<Utc> {
        self.timestamp.unwrap_or(DateTime::<Utc>::UNIX_EPOCH)
    }

    /// Incrementing id to resume after
    #[inline]
    pub fn incrementing_offset(&self) -> i64 {
        self.incrementing
    }
}

/// Parameter values for one poll
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CriteriaValues {
    /// Exclusive lower timestamp bound
    pub begin: DateTime<Utc>,
    /// Exclusive upper timestamp bound
    pub end: DateTime<Utc>,
    /// Last incrementing id seen
    pub last_incrementing: i64,
}

impl CriteriaValues {
    /// Values resuming from `offset` up to `end`
    pub fn from_offset(offset: &TimestampIncrementingOffset, end: DateTime<Utc>) -> Self {
        Self {
            begin: offset.timestamp_offset(),
            end,
            last_incrementing: offset.incrementing_offset(),
        }
    }
}

/// Polling criteria over an incrementing column and/or timestamp columns
#[derive(Debug, Clone, PartialEq)]
pub struct TimestampIncrementingCriteria {
    incrementing: Option<ColumnId>,
    timestamps: Vec<ColumnId>,
}

impl TimestampIncrementingCriteria {
    /// Create criteria; at least one column kind must be given
    pub fn new(incrementing: Option<ColumnId>, timestamps: Vec<ColumnId>) -> Result<Self> {
        if incrementing.is_none() && timestamps.is_empty() {
            return Err(Error::config(
                "incremental criteria need an incrementing column, timestamp columns, or both",
            ));
        }
        Ok(Self {
            incrementing,
            timestamps,
        })
    }

    /// Incrementing column
    pub fn incrementing_column(&self) -> Option<&ColumnId> {
        self.incrementing.as_ref()
    }

    /// Timestamp columns, in COALESCE order
    pub fn timestamp_columns(&self) -> &[ColumnId] {
        &self.timestamps
    }

    /// Whether timestamp columns are configured
    #[inline]
    pub fn has_timestamp_columns(&self) -> bool {
        !self.timestamps.is_empty()
    }

    fn timestamp_expression(&self, builder: &mut ExpressionBuilder<'_>) {
        if let [single] = self.timestamps.as_slice() {
            builder.append_column(single);
        } else {
            builder.append("COALESCE(");
            builder.append_list(",", &self.timestamps, |b, c| {
                b.append_column(c);
            });
            builder.append(")");
        }
    }

    /// Append the WHERE clause
    pub fn where_clause(&self, builder: &mut ExpressionBuilder<'_>) {
        match &self.incrementing {
            Some(inc) if self.has_timestamp_columns() => {
                builder.append(" WHERE ");
                self.timestamp_expression(builder);
                builder.append(" < ? AND ((");
                self.timestamp_expression(builder);
                builder.append(" = ? AND ").append_column(inc).append(" > ?) OR ");
                self.timestamp_expression(builder);
                builder.append(" > ?)");
            }
            Some(inc) => {
                builder.append(" WHERE ").append_column(inc).append(" > ?");
            }
            None => {
                builder.append(" WHERE ");
                self.timestamp_expression(builder);
                builder.append(" > ? AND ");
                self.timestamp_expression(builder);
                builder.append(" < ?");
            }
        }
    }

    /// Append the ORDER BY clause
    pub fn order_by(&self, builder: &mut ExpressionBuilder<'_>) {
        builder.append(" ORDER BY ");
        if self.has_timestamp_columns() {
            self.timestamp_expression(builder);
            if let Some(inc) = &self.incrementing {
                builder.append(",").append_column(inc);
            }
        } else if let Some(inc) = &self.incrementing {
            builder.append_column(inc);
        }
        builder.append(" ASC");
    }

    /// Bind the poll parameters in the order the WHERE clause expects
    pub fn set_query_parameters(
        &self,
        statement: &mut dyn PreparedStatement,
        values: &CriteriaValues,
    ) -> Result<()> {
        let begin = Value::DateTimeTz(values.begin);
        let end = Value::DateTimeTz(values.end);
        let last = Value::Int64(values.last_incrementing);
        match (&self.incrementing, self.has_timestamp_columns()) {
            (Some(_), true) => {
                statement.bind(1, end)?;
                statement.bind(2, begin.clone())?;
                statement.bind(3, last)?;
                statement.bind(4, begin)?;
            }
            (Some(_), false) => statement.bind(1, last)?,
            (None, _) => {
                statement.bind(1, begin)?;
                statement.bind(2, end)?;
            }
        }
        Ok(())
    }

    /// Offset reached after emitting `record`
    pub fn extract_values(
        &self,
        schema: &Schema,
        record: &Struct,
        previous: Option<&TimestampIncrementingOffset>,
    ) -> Result<TimestampIncrementingOffset> {
        let timestamp = self
            .timestamps
            .iter()
            .find_map(|c| record.get(c.alias_or_name()).and_then(Value::as_timestamp));

        let incrementing = match &self.incrementing {
            Some(column) => Some(self.extract_incrementing(schema, record, column)?),
            None => None,
        };

        if let (Some(prev), Some(id), false) =
            (previous, incrementing, self.has_timestamp_columns())
        {
            if prev.incrementing != -1 && id <= prev.incrementing {
                warn!(
                    "Incrementing column {} went from {} to {}; rows may be skipped",
                    self.incrementing.as_ref().map(ColumnId::name).unwrap_or_default(),
                    prev.incrementing,
                    id
                );
            }
        }

        Ok(TimestampIncrementingOffset::new(timestamp, incrementing))
    }

    fn extract_incrementing(&self, schema: &Schema, record: &Struct, column: &ColumnId) -> Result<i64> {
        let name = column.alias_or_name();
        let field = schema.field(name).ok_or_else(|| {
            Error::schema(format!(
                "incrementing column {} not found in fields {:?}",
                name,
                schema.field_names().collect::<Vec<_>>()
            ))
        })?;
        let value = record.get(name).unwrap_or(&Value::Null);
        if value.is_null() {
            return Err(Error::type_conversion(format!(
                "null value for incrementing column {} of type {:?}",
                name, field.schema.schema_type
            )));
        }
        let integral = matches!(
            field.schema.schema_type,
            SchemaType::Int8 | SchemaType::Int16 | SchemaType::Int32 | SchemaType::Int64
        );
        let id = match field.schema.logical {
            None if integral => value.as_i64(),
            Some(LogicalType::Decimal { scale: 0 }) => value.as_i64(),
            Some(LogicalType::Decimal { scale }) => {
                return Err(Error::type_conversion(format!(
                    "incrementing column {} is a decimal with scale {}; only scale 0 is supported",
                    name, scale
                )))
            }
            _ => None,
        };
        id.ok_or_else(|| {
            Error::type_conversion(format!(
                "invalid type for incrementing column {}: {}",
                name,
                value.kind()
            ))
        })
    }

    /// Whether a row at `candidate` is new relative to `previous`
    pub fn accepts(
        &self,
        previous: &TimestampIncrementingOffset,
        candidate: &TimestampIncrementingOffset,
    ) -> bool {
        let has_inc = self.incrementing.is_some();
        if !self.has_timestamp_columns() {
            return candidate.incrementing > previous.incrementing;
        }
        let (Some(prev_ts), Some(ts)) = (previous.timestamp, candidate.timestamp) else {
            return previous.timestamp.is_none() && candidate.timestamp.is_some();
        };
        ts > prev_ts || (has_inc && ts == prev_ts && candidate.incrementing > previous.incrementing)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identifier::{IdentifierRules, QuoteMethod, TableId};
    use crate::record::SchemaBuilder;
    use chrono::Duration;
    use std::sync::Arc;

    fn col(name: &str) -> ColumnId {
        TableId::table("orders").column(name)
    }

    fn render(criteria: &TimestampIncrementingCriteria) -> String {
        let rules = IdentifierRules::default();
        let mut b = rules.expression_builder(QuoteMethod::Always);
        criteria.where_clause(&mut b);
        criteria.order_by(&mut b);
        b.build()
    }

    #[test]
    fn test_requires_a_column() {
        let err = TimestampIncrementingCriteria::new(None, vec![]).unwrap_err();
        assert!(matches!(err, Error::Configuration { .. }));
    }

    #[test]
    fn test_clauses() {
        let both = TimestampIncrementingCriteria::new(Some(col("id")), vec![col("updated")]).unwrap();
        assert_eq!(
            render(&both),
            r#" WHERE "updated" < ? AND (("updated" = ? AND "id" > ?) OR "updated" > ?) ORDER BY "updated","id" ASC"#
        );

        let inc = TimestampIncrementingCriteria::new(Some(col("id")), vec![]).unwrap();
        assert_eq!(render(&inc), r#" WHERE "id" > ? ORDER BY "id" ASC"#);

        let ts = TimestampIncrementingCriteria::new(None, vec![col("modified"), col("created")]).unwrap();
        assert_eq!(
            render(&ts),
            r#" WHERE COALESCE("modified","created") > ? AND COALESCE("modified","created") < ? ORDER BY COALESCE("modified","created") ASC"#
        );
    }

    #[test]
    fn test_tie_break() {
        let criteria = TimestampIncrementingCriteria::new(Some(col("id")), vec![col("ts")]).unwrap();
        let t0 = DateTime::from_timestamp(1_700_000_000, 0).unwrap();
        let id0 = 100;
        let previous = TimestampIncrementingOffset::new(Some(t0), Some(id0));

        let candidates = [
            (t0, id0),
            (t0, id0 + 1),
            (t0 - Duration::seconds(1), id0 + 5),
            (t0 + Duration::seconds(1), id0 - 5),
        ];
        let accepted: Vec<_> = candidates
            .iter()
            .filter(|(ts, id)| {
                criteria.accepts(&previous, &TimestampIncrementingOffset::new(Some(*ts), Some(*id)))
            })
            .copied()
            .collect();
        assert_eq!(accepted, vec![(t0, id0 + 1), (t0 + Duration::seconds(1), id0 - 5)]);
    }

    #[test]
    fn test_extract_values() {
        let schema = Arc::new(
            SchemaBuilder::struct_schema()
                .field("id", Schema::of(SchemaType::Int32))
                .unwrap()
                .field("ts", Schema::logical(LogicalType::Timestamp).optional())
                .unwrap()
                .build(),
        );
        let t = DateTime::from_timestamp(1_700_000_000, 0).unwrap();
        let record = Struct::new(Arc::clone(&schema))
            .put("id", 42)
            .unwrap()
            .put("ts", t)
            .unwrap();

        let criteria = TimestampIncrementingCriteria::new(Some(col("id")), vec![col("ts")]).unwrap();
        let offset = criteria.extract_values(&schema, &record, None).unwrap();
        assert_eq!(offset, TimestampIncrementingOffset::new(Some(t), Some(42)));
    }

    #[test]
    fn test_extract_rejects_scaled_decimal() {
        let schema = Arc::new(
            SchemaBuilder::struct_schema()
                .field("id", Schema::decimal(2))
                .unwrap()
                .build(),
        );
        let record = Struct::new(Arc::clone(&schema))
            .put("id", rust_decimal::Decimal::new(1250, 2))
            .unwrap();
        let criteria = TimestampIncrementingCriteria::new(Some(col("id")), vec![]).unwrap();
        assert!(criteria.extract_values(&schema, &record, None).is_err());
    }

    #[test]
    fn test_offset_defaults() {
        let offset = TimestampIncrementingOffset::default();
        assert_eq!(offset.incrementing_offset(), -1);
        assert_eq!(offset.timestamp_offset(), DateTime::<Utc>::UNIX_EPOCH);
    }
}
