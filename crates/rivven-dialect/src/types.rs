//! Value types for rivven-dialect
//!
//! - `Value`: a single database or record value
//! - `SqlType`: JDBC-style SQL type codes reported by drivers
//! - `ResultSet` / `ResultRow`: rows returned by a connection, including
//!   streamed binary and character columns

use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::io::{Cursor, Read};
use uuid::Uuid;

use crate::error::{Error, Result};

/// SQL value type that can hold any database value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    /// SQL NULL
    Null,
    /// Boolean value
    Bool(bool),
    /// 8-bit signed integer (TINYINT)
    Int8(i8),
    /// 16-bit signed integer (SMALLINT)
    Int16(i16),
    /// 32-bit signed integer (INTEGER)
    Int32(i32),
    /// 64-bit signed integer (BIGINT)
    Int64(i64),
    /// 32-bit floating point (REAL)
    Float32(f32),
    /// 64-bit floating point (DOUBLE PRECISION)
    Float64(f64),
    /// Arbitrary precision decimal (NUMERIC, DECIMAL)
    Decimal(Decimal),
    /// Text string (VARCHAR, TEXT, CHAR)
    String(String),
    /// Binary data (BYTEA, BLOB, VARBINARY)
    Bytes(Vec<u8>),
    /// Date without time (DATE)
    Date(NaiveDate),
    /// Time without date (TIME)
    Time(NaiveTime),
    /// Timestamp without timezone (TIMESTAMP)
    DateTime(NaiveDateTime),
    /// Timestamp with timezone (TIMESTAMPTZ)
    DateTimeTz(DateTime<Utc>),
    /// UUID
    Uuid(Uuid),
    /// JSON value
    Json(serde_json::Value),
    /// Array of values
    Array(Vec<Value>),
}

impl Value {
    /// Check if value is NULL
    #[inline]
    pub const fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Name of the variant, used in conversion error messages
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Bool(_) => "bool",
            Self::Int8(_) => "int8",
            Self::Int16(_) => "int16",
            Self::Int32(_) => "int32",
            Self::Int64(_) => "int64",
            Self::Float32(_) => "float32",
            Self::Float64(_) => "float64",
            Self::Decimal(_) => "decimal",
            Self::String(_) => "string",
            Self::Bytes(_) => "bytes",
            Self::Date(_) => "date",
            Self::Time(_) => "time",
            Self::DateTime(_) => "timestamp",
            Self::DateTimeTz(_) => "timestamptz",
            Self::Uuid(_) => "uuid",
            Self::Json(_) => "json",
            Self::Array(_) => "array",
        }
    }

    /// Try to convert to bool
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            Self::Int8(n) => Some(*n != 0),
            Self::Int16(n) => Some(*n != 0),
            Self::Int32(n) => Some(*n != 0),
            Self::Int64(n) => Some(*n != 0),
            Self::String(s) => match s.to_lowercase().as_str() {
                "true" | "t" | "yes" | "y" | "1" => Some(true),
                "false" | "f" | "no" | "n" | "0" => Some(false),
                _ => None,
            },
            _ => None,
        }
    }

    /// Try to convert to i64 without losing information
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Bool(b) => Some(i64::from(*b)),
            Self::Int8(n) => Some(i64::from(*n)),
            Self::Int16(n) => Some(i64::from(*n)),
            Self::Int32(n) => Some(i64::from(*n)),
            Self::Int64(n) => Some(*n),
            Self::Decimal(d) if d.fract().is_zero() => d.to_i64(),
            Self::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    /// Try to convert to f64
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Int8(n) => Some(f64::from(*n)),
            Self::Int16(n) => Some(f64::from(*n)),
            Self::Int32(n) => Some(f64::from(*n)),
            Self::Int64(n) => Some(*n as f64),
            Self::Float32(n) => Some(f64::from(*n)),
            Self::Float64(n) => Some(*n),
            Self::Decimal(d) => d.to_string().parse().ok(),
            Self::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    /// Try to convert to a decimal
    pub fn as_decimal(&self) -> Option<Decimal> {
        match self {
            Self::Decimal(d) => Some(*d),
            Self::Int8(n) => Some(Decimal::from(*n)),
            Self::Int16(n) => Some(Decimal::from(*n)),
            Self::Int32(n) => Some(Decimal::from(*n)),
            Self::Int64(n) => Some(Decimal::from(*n)),
            Self::Float32(n) => Decimal::try_from(*n).ok(),
            Self::Float64(n) => Decimal::try_from(*n).ok(),
            Self::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    /// Try to convert to string
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s.as_str()),
            _ => None,
        }
    }

    /// Try to convert to bytes
    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Self::Bytes(b) => Some(b.as_slice()),
            Self::String(s) => Some(s.as_bytes()),
            _ => None,
        }
    }

    /// Try to convert to a UTC timestamp. Naive timestamps are taken as UTC.
    pub fn as_timestamp(&self) -> Option<DateTime<Utc>> {
        match self {
            Self::DateTimeTz(ts) => Some(*ts),
            Self::DateTime(ts) => Some(ts.and_utc()),
            Self::Date(d) => d.and_hms_opt(0, 0, 0).map(|ts| ts.and_utc()),
            _ => None,
        }
    }

    /// Convert to owned string representation
    pub fn as_string(&self) -> Option<String> {
        match self {
            Self::String(s) => Some(s.clone()),
            Self::Int8(n) => Some(n.to_string()),
            Self::Int16(n) => Some(n.to_string()),
            Self::Int32(n) => Some(n.to_string()),
            Self::Int64(n) => Some(n.to_string()),
            Self::Float32(n) => Some(n.to_string()),
            Self::Float64(n) => Some(n.to_string()),
            Self::Decimal(d) => Some(d.to_string()),
            Self::Bool(b) => Some(b.to_string()),
            Self::Uuid(u) => Some(u.to_string()),
            Self::Json(j) => Some(j.to_string()),
            _ => None,
        }
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<i8> for Value {
    fn from(v: i8) -> Self {
        Self::Int8(v)
    }
}

impl From<i16> for Value {
    fn from(v: i16) -> Self {
        Self::Int16(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Self::Int32(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Self::Int64(v)
    }
}

impl From<f32> for Value {
    fn from(v: f32) -> Self {
        Self::Float32(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Self::Float64(v)
    }
}

impl From<Decimal> for Value {
    fn from(v: Decimal) -> Self {
        Self::Decimal(v)
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Self::String(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Self::String(v.to_owned())
    }
}

impl From<Vec<u8>> for Value {
    fn from(v: Vec<u8>) -> Self {
        Self::Bytes(v)
    }
}

impl From<NaiveDate> for Value {
    fn from(v: NaiveDate) -> Self {
        Self::Date(v)
    }
}

impl From<NaiveTime> for Value {
    fn from(v: NaiveTime) -> Self {
        Self::Time(v)
    }
}

impl From<NaiveDateTime> for Value {
    fn from(v: NaiveDateTime) -> Self {
        Self::DateTime(v)
    }
}

impl From<DateTime<Utc>> for Value {
    fn from(v: DateTime<Utc>) -> Self {
        Self::DateTimeTz(v)
    }
}

impl From<Uuid> for Value {
    fn from(v: Uuid) -> Self {
        Self::Uuid(v)
    }
}

impl From<serde_json::Value> for Value {
    fn from(v: serde_json::Value) -> Self {
        Self::Json(v)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        match v {
            Some(val) => val.into(),
            None => Self::Null,
        }
    }
}

/// SQL type codes as reported by database drivers (JDBC `java.sql.Types`)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[allow(missing_docs)]
pub enum SqlType {
    Null,
    Bit,
    Boolean,
    TinyInt,
    SmallInt,
    Integer,
    BigInt,
    Real,
    Float,
    Double,
    Numeric,
    Decimal,
    Char,
    VarChar,
    LongVarChar,
    NChar,
    NVarChar,
    LongNVarChar,
    Clob,
    NClob,
    Date,
    Time,
    TimeWithTimezone,
    Timestamp,
    TimestampWithTimezone,
    Binary,
    VarBinary,
    LongVarBinary,
    Blob,
    Array,
    Struct,
    Ref,
    RefCursor,
    DataLink,
    RowId,
    SqlXml,
    JavaObject,
    Distinct,
    Other,
}

impl SqlType {
    /// Numeric type code
    pub const fn code(self) -> i32 {
        match self {
            Self::Null => 0,
            Self::Bit => -7,
            Self::Boolean => 16,
            Self::TinyInt => -6,
            Self::SmallInt => 5,
            Self::Integer => 4,
            Self::BigInt => -5,
            Self::Real => 7,
            Self::Float => 6,
            Self::Double => 8,
            Self::Numeric => 2,
            Self::Decimal => 3,
            Self::Char => 1,
            Self::VarChar => 12,
            Self::LongVarChar => -1,
            Self::NChar => -15,
            Self::NVarChar => -9,
            Self::LongNVarChar => -16,
            Self::Clob => 2005,
            Self::NClob => 2011,
            Self::Date => 91,
            Self::Time => 92,
            Self::TimeWithTimezone => 2013,
            Self::Timestamp => 93,
            Self::TimestampWithTimezone => 2014,
            Self::Binary => -2,
            Self::VarBinary => -3,
            Self::LongVarBinary => -4,
            Self::Blob => 2004,
            Self::Array => 2003,
            Self::Struct => 2002,
            Self::Ref => 2006,
            Self::RefCursor => 2012,
            Self::DataLink => 70,
            Self::RowId => -8,
            Self::SqlXml => 2009,
            Self::JavaObject => 2000,
            Self::Distinct => 2001,
            Self::Other => 1111,
        }
    }

    /// Resolve a numeric type code; unknown codes map to `Other`
    pub const fn from_code(code: i32) -> Self {
        match code {
            0 => Self::Null,
            -7 => Self::Bit,
            16 => Self::Boolean,
            -6 => Self::TinyInt,
            5 => Self::SmallInt,
            4 => Self::Integer,
            -5 => Self::BigInt,
            7 => Self::Real,
            6 => Self::Float,
            8 => Self::Double,
            2 => Self::Numeric,
            3 => Self::Decimal,
            1 => Self::Char,
            12 => Self::VarChar,
            -1 => Self::LongVarChar,
            -15 => Self::NChar,
            -9 => Self::NVarChar,
            -16 => Self::LongNVarChar,
            2005 => Self::Clob,
            2011 => Self::NClob,
            91 => Self::Date,
            92 => Self::Time,
            2013 => Self::TimeWithTimezone,
            93 => Self::Timestamp,
            2014 => Self::TimestampWithTimezone,
            -2 => Self::Binary,
            -3 => Self::VarBinary,
            -4 => Self::LongVarBinary,
            2004 => Self::Blob,
            2003 => Self::Array,
            2002 => Self::Struct,
            2006 => Self::Ref,
            2012 => Self::RefCursor,
            70 => Self::DataLink,
            -8 => Self::RowId,
            2009 => Self::SqlXml,
            2000 => Self::JavaObject,
            2001 => Self::Distinct,
            _ => Self::Other,
        }
    }

    /// Whether values of this type may be streamed by the driver
    pub const fn is_lob(self) -> bool {
        matches!(
            self,
            Self::Blob | Self::Clob | Self::NClob | Self::LongVarBinary | Self::LongVarChar
                | Self::LongNVarChar | Self::SqlXml
        )
    }
}

impl fmt::Display for SqlType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}({})", self, self.code())
    }
}

/// Column nullability as reported by the driver
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Nullability {
    /// Column accepts NULL
    Nullable,
    /// Column rejects NULL
    NotNull,
    /// Driver could not tell
    #[default]
    Unknown,
}

/// Column writability as reported by the driver
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Mutability {
    /// Column cannot be written
    ReadOnly,
    /// Column may be writable
    MaybeWritable,
    /// Column is definitely writable
    Writable,
    /// Driver could not tell
    #[default]
    Unknown,
}

/// Description of one column in a result set
#[derive(Debug, Clone, PartialEq)]
#[allow(missing_docs)]
pub struct ResultSetColumn {
    pub catalog: Option<String>,
    pub schema: Option<String>,
    pub table: Option<String>,
    pub name: String,
    pub label: String,
    pub sql_type: SqlType,
    pub type_name: String,
    pub nullability: Nullability,
    pub display_size: i32,
    pub precision: i32,
    pub scale: i32,
    pub auto_increment: bool,
    pub signed: bool,
    pub case_sensitive: bool,
    pub searchable: bool,
    pub currency: bool,
    pub mutability: Mutability,
}

impl ResultSetColumn {
    /// Create a column description with driver defaults
    pub fn new(name: impl Into<String>, sql_type: SqlType) -> Self {
        let name = name.into();
        Self {
            catalog: None,
            schema: None,
            table: None,
            label: name.clone(),
            name,
            sql_type,
            type_name: format!("{:?}", sql_type).to_uppercase(),
            nullability: Nullability::Unknown,
            display_size: 0,
            precision: 0,
            scale: 0,
            auto_increment: false,
            signed: true,
            case_sensitive: false,
            searchable: true,
            currency: false,
            mutability: Mutability::Unknown,
        }
    }

    /// Set the owning table
    pub fn with_table(
        mut self,
        catalog: Option<&str>,
        schema: Option<&str>,
        table: impl Into<String>,
    ) -> Self {
        self.catalog = catalog.map(str::to_owned);
        self.schema = schema.map(str::to_owned);
        self.table = Some(table.into());
        self
    }

    /// Set the column label (alias)
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }

    /// Set the vendor type name
    pub fn with_type_name(mut self, type_name: impl Into<String>) -> Self {
        self.type_name = type_name.into();
        self
    }

    /// Set precision and scale
    pub fn with_precision(mut self, precision: i32, scale: i32) -> Self {
        self.precision = precision;
        self.scale = scale;
        self
    }

    /// Set nullability
    pub fn with_nullability(mut self, nullability: Nullability) -> Self {
        self.nullability = nullability;
        self
    }

    /// Set signedness
    pub fn with_signed(mut self, signed: bool) -> Self {
        self.signed = signed;
        self
    }

    /// Mark as auto-increment
    pub fn with_auto_increment(mut self, auto_increment: bool) -> Self {
        self.auto_increment = auto_increment;
        self
    }
}

/// Ordered column descriptions for a result set
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResultSetMetadata {
    columns: Vec<ResultSetColumn>,
}

impl ResultSetMetadata {
    /// Create metadata from ordered columns
    pub fn new(columns: Vec<ResultSetColumn>) -> Self {
        Self { columns }
    }

    /// Number of columns
    #[inline]
    pub fn column_count(&self) -> usize {
        self.columns.len()
    }

    /// Column by 1-based index
    pub fn column(&self, index: usize) -> Option<&ResultSetColumn> {
        index.checked_sub(1).and_then(|i| self.columns.get(i))
    }

    /// All columns in result order
    #[inline]
    pub fn columns(&self) -> &[ResultSetColumn] {
        &self.columns
    }
}

/// Read access to the current row of a result set.
///
/// Column indexes are 1-based. Streamed readers borrow the row and must be
/// drained before the caller advances to the next row.
pub trait ResultRow: Send + Sync {
    /// Number of columns in the row
    fn column_count(&self) -> usize;

    /// Read a column value
    fn value(&self, column: usize) -> Result<Value>;

    /// Open a binary stream for a column; `None` when the value is NULL
    fn binary_stream(&self, column: usize) -> Result<Option<Box<dyn Read + Send + '_>>> {
        match self.value(column)? {
            Value::Null => Ok(None),
            Value::Bytes(b) => Ok(Some(Box::new(Cursor::new(b)))),
            Value::String(s) => Ok(Some(Box::new(Cursor::new(s.into_bytes())))),
            other => Err(Error::type_conversion(format!(
                "column {} holds {}, not a binary value",
                column,
                other.kind()
            ))),
        }
    }

    /// Open a character stream for a column; `None` when the value is NULL
    fn character_stream(&self, column: usize) -> Result<Option<Box<dyn Read + Send + '_>>> {
        match self.value(column)? {
            Value::Null => Ok(None),
            Value::String(s) => Ok(Some(Box::new(Cursor::new(s.into_bytes())))),
            Value::Json(j) => Ok(Some(Box::new(Cursor::new(j.to_string().into_bytes())))),
            other => Err(Error::type_conversion(format!(
                "column {} holds {}, not a character value",
                column,
                other.kind()
            ))),
        }
    }
}

/// Database row as ordered column values
#[derive(Debug, Clone, PartialEq)]
pub struct Row {
    /// Column names
    columns: Vec<String>,
    /// Column values (same order as columns)
    values: Vec<Value>,
}

impl Row {
    /// Create a new row
    pub fn new(columns: Vec<String>, values: Vec<Value>) -> Self {
        debug_assert_eq!(columns.len(), values.len());
        Self { columns, values }
    }

    /// Get column count
    #[inline]
    pub fn len(&self) -> usize {
        self.columns.len()
    }

    /// Check if row is empty
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    /// Get column names
    #[inline]
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// Get all values
    #[inline]
    pub fn values(&self) -> &[Value] {
        &self.values
    }

    /// Get value by 0-based position
    #[inline]
    pub fn get(&self, idx: usize) -> Option<&Value> {
        self.values.get(idx)
    }
}

impl ResultRow for Row {
    fn column_count(&self) -> usize {
        self.values.len()
    }

    fn value(&self, column: usize) -> Result<Value> {
        column
            .checked_sub(1)
            .and_then(|i| self.values.get(i))
            .cloned()
            .ok_or_else(|| {
                Error::query(format!(
                    "column index {} out of range (1..={})",
                    column,
                    self.values.len()
                ))
            })
    }
}

/// Rows returned by a query together with their shape
#[derive(Debug, Clone, Default)]
pub struct ResultSet {
    /// Column descriptions
    pub metadata: ResultSetMetadata,
    /// Rows in result order
    pub rows: Vec<Row>,
}

impl ResultSet {
    /// Create a result set
    pub fn new(metadata: ResultSetMetadata, rows: Vec<Row>) -> Self {
        Self { metadata, rows }
    }

    /// Check if there are no rows
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// First row, if any
    pub fn first(&self) -> Option<&Row> {
        self.rows.first()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sql_type_code_round_trip() {
        for t in [
            SqlType::Bit,
            SqlType::Integer,
            SqlType::Numeric,
            SqlType::NVarChar,
            SqlType::Blob,
            SqlType::TimestampWithTimezone,
            SqlType::Other,
        ] {
            assert_eq!(SqlType::from_code(t.code()), t);
        }
        assert_eq!(SqlType::from_code(424242), SqlType::Other);
    }

    #[test]
    fn test_row_is_one_based() {
        let row = Row::new(
            vec!["id".into(), "name".into()],
            vec![Value::Int32(1), Value::from("a")],
        );
        assert_eq!(row.value(1).unwrap(), Value::Int32(1));
        assert_eq!(row.value(2).unwrap(), Value::from("a"));
        assert!(row.value(0).is_err());
        assert!(row.value(3).is_err());
    }

    #[test]
    fn test_row_streams() {
        let row = Row::new(
            vec!["data".into(), "text".into(), "nothing".into()],
            vec![
                Value::Bytes(vec![1, 2, 3]),
                Value::from("hello"),
                Value::Null,
            ],
        );

        let mut buf = Vec::new();
        row.binary_stream(1)
            .unwrap()
            .unwrap()
            .read_to_end(&mut buf)
            .unwrap();
        assert_eq!(buf, vec![1, 2, 3]);

        let mut text = String::new();
        row.character_stream(2)
            .unwrap()
            .unwrap()
            .read_to_string(&mut text)
            .unwrap();
        assert_eq!(text, "hello");

        assert!(row.binary_stream(3).unwrap().is_none());
        assert!(row.character_stream(1).is_err());
    }

    #[test]
    fn test_value_conversions() {
        assert_eq!(Value::Decimal(Decimal::new(700, 2)).as_i64(), Some(7));
        assert_eq!(Value::Decimal(Decimal::new(750, 2)).as_i64(), None);
        assert_eq!(Value::from("12.50").as_decimal(), Some(Decimal::new(1250, 2)));
        assert_eq!(Value::Int32(3).as_decimal(), Some(Decimal::from(3)));
    }

    #[test]
    fn test_metadata_column_lookup() {
        let meta = ResultSetMetadata::new(vec![
            ResultSetColumn::new("id", SqlType::Integer),
            ResultSetColumn::new("name", SqlType::VarChar),
        ]);
        assert_eq!(meta.column_count(), 2);
        assert_eq!(meta.column(1).map(|c| c.name.as_str()), Some("id"));
        assert!(meta.column(0).is_none());
        assert!(meta.column(3).is_none());
    }
}
