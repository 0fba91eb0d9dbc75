//! Mapping between database columns and record field types
//!
//! A [`FieldKind`] is chosen once per column. It drives both the record schema
//! (`add_field_to_schema`) and the per-row [`ColumnConverter`], so the two can
//! never disagree. Dialects override [`TypeMapping::field_kind`] decisions by
//! wrapping the generic rules.

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use std::io::Read;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::config::NumericMapping;
use crate::error::{Error, Result};
use crate::record::{LogicalType, Schema, SchemaBuilder, SchemaRef, SchemaType, Struct};
use crate::schema::ColumnDefinition;
use crate::types::{ResultRow, SqlType, Value};

/// Largest scale representable by [`rust_decimal::Decimal`]
pub const MAX_DECIMAL_SCALE: u32 = 28;

/// Scale used when a DECIMAL/NUMERIC column reports none
pub const DEFAULT_DECIMAL_SCALE: u32 = MAX_DECIMAL_SCALE;

/// Largest precision that still fits a 64-bit integer
const MAX_INTEGER_TYPE_PRECISION: u32 = 18;

/// Largest precision converted to a double under best-fit mapping
const MAX_DOUBLE_TYPE_PRECISION: u32 = 15;

/// Converts the current row's value of one column into a field value
pub type ColumnConverter = Box<dyn Fn(&dyn ResultRow) -> Result<Value> + Send + Sync>;

/// Record type a column maps to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[allow(missing_docs)]
pub enum FieldKind {
    Boolean,
    Int8,
    Int16,
    Int32,
    Int64,
    Float32,
    Float64,
    Decimal { scale: u32 },
    String,
    Bytes,
    Date,
    Time,
    Timestamp,
}

impl FieldKind {
    /// Required schema for this kind
    pub fn schema(self) -> Schema {
        match self {
            Self::Boolean => Schema::of(SchemaType::Boolean),
            Self::Int8 => Schema::of(SchemaType::Int8),
            Self::Int16 => Schema::of(SchemaType::Int16),
            Self::Int32 => Schema::of(SchemaType::Int32),
            Self::Int64 => Schema::of(SchemaType::Int64),
            Self::Float32 => Schema::of(SchemaType::Float32),
            Self::Float64 => Schema::of(SchemaType::Float64),
            Self::Decimal { scale } => Schema::decimal(scale),
            Self::String => Schema::of(SchemaType::String),
            Self::Bytes => Schema::of(SchemaType::Bytes),
            Self::Date => Schema::logical(LogicalType::Date),
            Self::Time => Schema::logical(LogicalType::Time),
            Self::Timestamp => Schema::logical(LogicalType::Timestamp),
        }
    }
}

/// A result-set column paired with the record field it feeds
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnMapping {
    column: ColumnDefinition,
    column_number: usize,
    field_name: String,
}

impl ColumnMapping {
    /// Pair a column (1-based position) with a field
    pub fn new(column: ColumnDefinition, column_number: usize, field_name: impl Into<String>) -> Self {
        Self {
            column,
            column_number,
            field_name: field_name.into(),
        }
    }

    /// Column definition
    #[inline]
    pub fn column(&self) -> &ColumnDefinition {
        &self.column
    }

    /// 1-based column position in the result set
    #[inline]
    pub fn column_number(&self) -> usize {
        self.column_number
    }

    /// Name of the record field
    #[inline]
    pub fn field_name(&self) -> &str {
        &self.field_name
    }
}

/// Generic column-to-field rules, parameterized by numeric mapping
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TypeMapping {
    numeric_mapping: NumericMapping,
    default_decimal_scale: u32,
}

impl TypeMapping {
    /// Rules for a numeric mapping policy
    pub fn new(numeric_mapping: NumericMapping) -> Self {
        Self {
            numeric_mapping,
            default_decimal_scale: DEFAULT_DECIMAL_SCALE,
        }
    }

    /// Override the scale used when a column reports none
    pub fn with_default_decimal_scale(mut self, scale: u32) -> Self {
        self.default_decimal_scale = scale.min(MAX_DECIMAL_SCALE);
        self
    }

    /// Numeric mapping policy
    #[inline]
    pub fn numeric_mapping(&self) -> NumericMapping {
        self.numeric_mapping
    }

    /// Scale for a decimal column, clamped to what [`rust_decimal::Decimal`] holds
    pub fn decimal_scale(&self, column: &ColumnDefinition) -> u32 {
        match column.scale() {
            None => self.default_decimal_scale,
            Some(scale) if scale > MAX_DECIMAL_SCALE => {
                warn!(
                    "Column {} has scale {} above the supported maximum {}; clamping",
                    column.id(),
                    scale,
                    MAX_DECIMAL_SCALE
                );
                MAX_DECIMAL_SCALE
            }
            Some(scale) => scale,
        }
    }

    /// Record type for a column; `None` when the column type is unsupported
    pub fn field_kind(&self, column: &ColumnDefinition) -> Option<FieldKind> {
        let signed = column.is_signed();
        let kind = match column.sql_type() {
            SqlType::Boolean => FieldKind::Boolean,
            SqlType::Bit => FieldKind::Int8,
            SqlType::TinyInt if signed => FieldKind::Int8,
            SqlType::TinyInt => FieldKind::Int16,
            SqlType::SmallInt if signed => FieldKind::Int16,
            SqlType::SmallInt => FieldKind::Int32,
            SqlType::Integer if signed => FieldKind::Int32,
            SqlType::Integer => FieldKind::Int64,
            SqlType::BigInt => FieldKind::Int64,
            SqlType::Real => FieldKind::Float32,
            SqlType::Float | SqlType::Double => FieldKind::Float64,
            SqlType::Numeric => self.numeric_kind(column),
            SqlType::Decimal => FieldKind::Decimal {
                scale: self.decimal_scale(column),
            },
            SqlType::Char
            | SqlType::VarChar
            | SqlType::LongVarChar
            | SqlType::NChar
            | SqlType::NVarChar
            | SqlType::LongNVarChar
            | SqlType::Clob
            | SqlType::NClob
            | SqlType::DataLink
            | SqlType::SqlXml => FieldKind::String,
            SqlType::Binary | SqlType::VarBinary | SqlType::LongVarBinary | SqlType::Blob => {
                FieldKind::Bytes
            }
            SqlType::Date => FieldKind::Date,
            SqlType::Time | SqlType::TimeWithTimezone => FieldKind::Time,
            SqlType::Timestamp | SqlType::TimestampWithTimezone => FieldKind::Timestamp,
            _ => return None,
        };
        Some(kind)
    }

    fn numeric_kind(&self, column: &ColumnDefinition) -> FieldKind {
        let precision = column.precision();
        let scale = column.scale();
        if self.numeric_mapping != NumericMapping::None && precision > 0 {
            if scale == Some(0) && precision <= MAX_INTEGER_TYPE_PRECISION {
                return integer_kind_for_precision(precision);
            }
            if self.numeric_mapping == NumericMapping::BestFit
                && scale.is_some_and(|s| s > 0)
                && precision <= MAX_DOUBLE_TYPE_PRECISION
            {
                return FieldKind::Float64;
            }
        }
        FieldKind::Decimal {
            scale: self.decimal_scale(column),
        }
    }
}

fn integer_kind_for_precision(precision: u32) -> FieldKind {
    match precision {
        0..=2 => FieldKind::Int8,
        3..=4 => FieldKind::Int16,
        5..=9 => FieldKind::Int32,
        _ => FieldKind::Int64,
    }
}

/// Add a field for `column` to `builder`.
///
/// Returns the field name, or `None` when the column is skipped because its
/// type has no record equivalent.
pub fn add_field_to_schema(
    column: &ColumnDefinition,
    kind: Option<FieldKind>,
    builder: &mut SchemaBuilder,
) -> Result<Option<String>> {
    let name = column.id().alias_or_name().to_owned();
    let Some(kind) = kind else {
        warn!(
            "Column {} of type {} ({}) is not supported; skipping",
            column.id(),
            column.type_name(),
            column.sql_type().code()
        );
        return Ok(None);
    };
    let mut schema = kind.schema();
    if column.is_optional() {
        schema = schema.optional();
    }
    builder.add_field(name.clone(), schema)?;
    Ok(Some(name))
}

/// Build the converter for one mapped column; `None` when the column is skipped
pub fn column_converter(mapping: &ColumnMapping, kind: Option<FieldKind>) -> Option<ColumnConverter> {
    let kind = kind?;
    let index = mapping.column_number();
    let column = mapping.column().id().to_string();
    let streamed = mapping.column().sql_type().is_lob();

    let converter: ColumnConverter = match kind {
        FieldKind::String if streamed => Box::new(move |row: &dyn ResultRow| read_characters(row, index, &column)),
        FieldKind::Bytes if streamed => Box::new(move |row: &dyn ResultRow| read_binary(row, index, &column)),
        kind => Box::new(move |row: &dyn ResultRow| {
            let value = row.value(index)?;
            if value.is_null() {
                return Ok(Value::Null);
            }
            convert_value(kind, value).map_err(|e| conversion_error(&column, e))
        }),
    };
    Some(converter)
}

fn conversion_error(column: &str, e: Error) -> Error {
    Error::type_conversion(format!("column {}: {}", column, e))
}

fn read_characters(row: &dyn ResultRow, index: usize, column: &str) -> Result<Value> {
    match row.character_stream(index)? {
        None => Ok(Value::Null),
        Some(mut reader) => {
            let mut buf = String::new();
            reader
                .read_to_string(&mut buf)
                .map_err(|e| Error::type_conversion(format!("column {}: {}", column, e)))?;
            Ok(Value::String(buf))
        }
    }
}

fn read_binary(row: &dyn ResultRow, index: usize, column: &str) -> Result<Value> {
    match row.binary_stream(index)? {
        None => Ok(Value::Null),
        Some(mut reader) => {
            let mut buf = Vec::new();
            reader.read_to_end(&mut buf)?;
            debug!("Materialized {} bytes from column {}", buf.len(), column);
            Ok(Value::Bytes(buf))
        }
    }
}

fn mismatch(kind: FieldKind, value: &Value) -> Error {
    Error::type_conversion(format!("cannot convert {} to {:?}", value.kind(), kind))
}

fn integer<T: TryFrom<i64>>(kind: FieldKind, value: &Value) -> Result<T> {
    let n = value.as_i64().ok_or_else(|| mismatch(kind, value))?;
    T::try_from(n).map_err(|_| Error::type_conversion(format!("{} out of range for {:?}", n, kind)))
}

/// Coerce a non-null value to the representation of `kind`
pub fn convert_value(kind: FieldKind, value: Value) -> Result<Value> {
    let converted = match kind {
        FieldKind::Boolean => Value::Bool(value.as_bool().ok_or_else(|| mismatch(kind, &value))?),
        FieldKind::Int8 => Value::Int8(integer(kind, &value)?),
        FieldKind::Int16 => Value::Int16(integer(kind, &value)?),
        FieldKind::Int32 => Value::Int32(integer(kind, &value)?),
        FieldKind::Int64 => Value::Int64(integer(kind, &value)?),
        FieldKind::Float32 => {
            Value::Float32(value.as_f64().ok_or_else(|| mismatch(kind, &value))? as f32)
        }
        FieldKind::Float64 => Value::Float64(value.as_f64().ok_or_else(|| mismatch(kind, &value))?),
        FieldKind::Decimal { scale } => {
            let mut d = value.as_decimal().ok_or_else(|| mismatch(kind, &value))?;
            if d.scale() != scale {
                d.rescale(scale);
            }
            Value::Decimal(d)
        }
        FieldKind::String => match value {
            Value::String(_) => value,
            other => Value::String(other.as_string().ok_or_else(|| mismatch(kind, &other))?),
        },
        FieldKind::Bytes => match value {
            Value::Bytes(_) => value,
            Value::String(s) => Value::Bytes(s.into_bytes()),
            other => return Err(mismatch(kind, &other)),
        },
        FieldKind::Date => match value {
            Value::Date(_) => value,
            Value::DateTime(dt) => Value::Date(dt.date()),
            Value::DateTimeTz(dt) => Value::Date(dt.date_naive()),
            other => return Err(mismatch(kind, &other)),
        },
        FieldKind::Time => match value {
            Value::Time(_) => value,
            Value::DateTime(dt) => Value::Time(dt.time()),
            Value::DateTimeTz(dt) => Value::Time(dt.time()),
            other => return Err(mismatch(kind, &other)),
        },
        FieldKind::Timestamp => match value {
            Value::DateTimeTz(_) => value,
            Value::DateTime(dt) => Value::DateTimeTz(dt.and_utc()),
            Value::Date(d) => Value::DateTimeTz(start_of_day(d)),
            other => return Err(mismatch(kind, &other)),
        },
    };
    Ok(converted)
}

fn start_of_day(date: NaiveDate) -> DateTime<Utc> {
    date.and_time(NaiveTime::MIN).and_utc()
}

/// SQL type used to bind a NULL of the given schema
pub fn sql_type_for_schema(schema: &Schema) -> SqlType {
    match schema.logical {
        Some(LogicalType::Decimal { .. }) => return SqlType::Decimal,
        Some(LogicalType::Date) => return SqlType::Date,
        Some(LogicalType::Time) => return SqlType::Time,
        Some(LogicalType::Timestamp) => return SqlType::Timestamp,
        None => {}
    }
    match schema.schema_type {
        SchemaType::Int8 => SqlType::TinyInt,
        SchemaType::Int16 => SqlType::SmallInt,
        SchemaType::Int32 => SqlType::Integer,
        SchemaType::Int64 => SqlType::BigInt,
        SchemaType::Float32 => SqlType::Real,
        SchemaType::Float64 => SqlType::Double,
        SchemaType::Boolean => SqlType::Boolean,
        SchemaType::String => SqlType::VarChar,
        SchemaType::Bytes => SqlType::VarBinary,
        SchemaType::Array => SqlType::Array,
        SchemaType::Map | SchemaType::Struct => SqlType::Other,
    }
}

/// Coerce a record value to the representation its schema declares.
///
/// NULL is returned unchanged; callers bind it with [`sql_type_for_schema`].
pub fn value_for_schema(schema: &Schema, value: &Value) -> Result<Value> {
    if value.is_null() {
        return Ok(Value::Null);
    }
    let kind = match schema.logical {
        Some(LogicalType::Decimal { scale }) => FieldKind::Decimal { scale },
        Some(LogicalType::Date) => FieldKind::Date,
        Some(LogicalType::Time) => FieldKind::Time,
        Some(LogicalType::Timestamp) => FieldKind::Timestamp,
        None => match schema.schema_type {
            SchemaType::Int8 => FieldKind::Int8,
            SchemaType::Int16 => FieldKind::Int16,
            SchemaType::Int32 => FieldKind::Int32,
            SchemaType::Int64 => FieldKind::Int64,
            SchemaType::Float32 => FieldKind::Float32,
            SchemaType::Float64 => FieldKind::Float64,
            SchemaType::Boolean => FieldKind::Boolean,
            SchemaType::String => FieldKind::String,
            SchemaType::Bytes => FieldKind::Bytes,
            other => {
                return Err(Error::type_conversion(format!(
                    "{:?} values cannot be bound to a statement parameter",
                    other
                )))
            }
        },
    };
    convert_value(kind, value.clone())
}

/// Record schema and converters for one result-set shape.
///
/// Built once per query shape and reused for every row.
pub struct SchemaMapping {
    schema: SchemaRef,
    setters: Vec<(String, ColumnConverter)>,
}

impl SchemaMapping {
    /// Assemble from a schema and converters keyed by field name
    pub fn new(schema: Schema, setters: Vec<(String, ColumnConverter)>) -> Self {
        Self {
            schema: Arc::new(schema),
            setters,
        }
    }

    /// Record schema
    #[inline]
    pub fn schema(&self) -> &SchemaRef {
        &self.schema
    }

    /// Number of converted fields
    #[inline]
    pub fn len(&self) -> usize {
        self.setters.len()
    }

    /// Whether no column is converted
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.setters.is_empty()
    }

    /// Convert one row into a struct
    pub fn convert_row(&self, row: &dyn ResultRow) -> Result<Struct> {
        let mut record = Struct::new(Arc::clone(&self.schema));
        for (field, convert) in &self.setters {
            record = record.put(field, convert(row)?)?;
        }
        Ok(record)
    }
}

impl std::fmt::Debug for SchemaMapping {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SchemaMapping")
            .field("schema", &self.schema)
            .field(
                "fields",
                &self.setters.iter().map(|(n, _)| n.as_str()).collect::<Vec<_>>(),
            )
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identifier::TableId;
    use crate::schema::ColumnFacts;
    use crate::types::{Nullability, Row};
    use rust_decimal::Decimal;
    use std::str::FromStr;

    fn column(sql_type: SqlType, precision: i32, scale: i32) -> ColumnDefinition {
        let mut facts = ColumnFacts::new(sql_type, format!("{:?}", sql_type));
        facts.precision = precision;
        facts.scale = scale;
        facts.nullability = Nullability::NotNull;
        ColumnDefinition::new(TableId::table("t").column("c"), facts)
    }

    #[test]
    fn test_integer_widening_for_unsigned() {
        let mapping = TypeMapping::new(NumericMapping::None);
        let mut facts = ColumnFacts::new(SqlType::Integer, "INT UNSIGNED");
        facts.signed = false;
        let unsigned = ColumnDefinition::new(TableId::table("t").column("c"), facts);
        assert_eq!(mapping.field_kind(&unsigned), Some(FieldKind::Int64));
        assert_eq!(
            mapping.field_kind(&column(SqlType::Integer, 10, 0)),
            Some(FieldKind::Int32)
        );
        assert_eq!(mapping.field_kind(&column(SqlType::Bit, 1, 0)), Some(FieldKind::Int8));
    }

    #[test]
    fn test_numeric_mapping_policies() {
        let none = TypeMapping::new(NumericMapping::None);
        let precision = TypeMapping::new(NumericMapping::PrecisionOnly);
        let best = TypeMapping::new(NumericMapping::BestFit);

        let n4 = column(SqlType::Numeric, 4, 0);
        assert_eq!(none.field_kind(&n4), Some(FieldKind::Decimal { scale: 0 }));
        assert_eq!(precision.field_kind(&n4), Some(FieldKind::Int16));
        assert_eq!(precision.field_kind(&column(SqlType::Numeric, 18, 0)), Some(FieldKind::Int64));
        assert_eq!(
            precision.field_kind(&column(SqlType::Numeric, 20, 0)),
            Some(FieldKind::Decimal { scale: 0 })
        );

        let n10_2 = column(SqlType::Numeric, 10, 2);
        assert_eq!(precision.field_kind(&n10_2), Some(FieldKind::Decimal { scale: 2 }));
        assert_eq!(best.field_kind(&n10_2), Some(FieldKind::Float64));

        // zero precision means unknown, never an integer
        let unknown = column(SqlType::Numeric, 0, 0);
        assert_eq!(
            precision.field_kind(&unknown),
            Some(FieldKind::Decimal {
                scale: DEFAULT_DECIMAL_SCALE
            })
        );
        let narrow = precision.with_default_decimal_scale(6);
        assert_eq!(narrow.field_kind(&unknown), Some(FieldKind::Decimal { scale: 6 }));

        let unset = column(SqlType::Numeric, 0, crate::schema::NUMERIC_SCALE_UNSET);
        assert_eq!(
            none.field_kind(&unset),
            Some(FieldKind::Decimal {
                scale: DEFAULT_DECIMAL_SCALE
            })
        );
        assert_eq!(
            none.field_kind(&column(SqlType::Decimal, 38, 30)),
            Some(FieldKind::Decimal { scale: 28 })
        );
    }

    #[test]
    fn test_add_field_skips_unsupported() {
        let mut builder = SchemaBuilder::struct_schema();
        let mapping = TypeMapping::new(NumericMapping::None);
        let other = column(SqlType::Other, 0, 0);
        let added = add_field_to_schema(&other, mapping.field_kind(&other), &mut builder).unwrap();
        assert!(added.is_none());
        assert!(builder.is_empty());

        let text = column(SqlType::VarChar, 50, 0);
        let added = add_field_to_schema(&text, mapping.field_kind(&text), &mut builder).unwrap();
        assert_eq!(added.as_deref(), Some("c"));
        let schema = builder.build();
        assert_eq!(schema.field("c").unwrap().schema.schema_type, SchemaType::String);
        assert!(!schema.field("c").unwrap().schema.optional);
    }

    #[test]
    fn test_converter_rescales_decimal() {
        let col = column(SqlType::Decimal, 10, 2);
        let kind = TypeMapping::new(NumericMapping::None).field_kind(&col);
        let converter = column_converter(&ColumnMapping::new(col, 1, "c"), kind).unwrap();

        let row = Row::new(vec!["c".into()], vec![Value::Decimal(Decimal::from_str("12.5").unwrap())]);
        let value = converter(&row).unwrap();
        assert_eq!(value.as_decimal().unwrap().to_string(), "12.50");

        let null_row = Row::new(vec!["c".into()], vec![Value::Null]);
        assert_eq!(converter(&null_row).unwrap(), Value::Null);
    }

    #[test]
    fn test_converter_materializes_lobs() {
        let col = column(SqlType::Clob, 0, 0);
        let kind = TypeMapping::new(NumericMapping::None).field_kind(&col);
        let converter = column_converter(&ColumnMapping::new(col, 1, "c"), kind).unwrap();
        let row = Row::new(vec!["c".into()], vec![Value::String("long text".into())]);
        assert_eq!(converter(&row).unwrap(), Value::String("long text".into()));

        let col = column(SqlType::Blob, 0, 0);
        let kind = TypeMapping::new(NumericMapping::None).field_kind(&col);
        let converter = column_converter(&ColumnMapping::new(col, 1, "c"), kind).unwrap();
        let row = Row::new(vec!["c".into()], vec![Value::Bytes(vec![1, 2, 3])]);
        assert_eq!(converter(&row).unwrap(), Value::Bytes(vec![1, 2, 3]));
    }

    #[test]
    fn test_converter_reports_column_on_mismatch() {
        let col = column(SqlType::SmallInt, 5, 0);
        let kind = TypeMapping::new(NumericMapping::None).field_kind(&col);
        let converter = column_converter(&ColumnMapping::new(col, 1, "c"), kind).unwrap();
        let row = Row::new(vec!["c".into()], vec![Value::Int64(1 << 40)]);
        let err = converter(&row).unwrap_err();
        assert!(err.to_string().contains("t.c"));
    }

    #[test]
    fn test_value_for_schema() {
        let schema = Schema::of(SchemaType::Int16);
        assert_eq!(value_for_schema(&schema, &Value::Int64(7)).unwrap(), Value::Int16(7));
        assert!(value_for_schema(&schema, &Value::String("x".into())).is_err());
        assert_eq!(value_for_schema(&schema, &Value::Null).unwrap(), Value::Null);
        assert!(value_for_schema(&Schema::of(SchemaType::Map), &Value::Int32(1)).is_err());
        assert_eq!(sql_type_for_schema(&Schema::decimal(2)), SqlType::Decimal);
        assert_eq!(sql_type_for_schema(&Schema::of(SchemaType::String)), SqlType::VarChar);
    }
}
