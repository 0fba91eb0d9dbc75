//! Structured record model consumed by the dialects
//!
//! Provides:
//! - Schema: logical field types with optionality, defaults and struct fields
//! - SchemaBuilder: incremental struct schema construction
//! - Struct / Datum: record payloads
//! - SinkRecord: one record to be written, possibly a tombstone

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::error::{Error, Result};
use crate::types::Value;

/// Physical type of a schema
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[allow(missing_docs)]
pub enum SchemaType {
    Int8,
    Int16,
    Int32,
    Int64,
    Float32,
    Float64,
    Boolean,
    String,
    Bytes,
    Array,
    Map,
    Struct,
}

impl SchemaType {
    /// Whether the type is a primitive (not array, map or struct)
    pub const fn is_primitive(self) -> bool {
        !matches!(self, Self::Array | Self::Map | Self::Struct)
    }
}

/// Logical type layered on top of a physical schema type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LogicalType {
    /// Arbitrary precision decimal carried as bytes, with a fixed scale
    Decimal {
        /// Digits after the decimal point
        scale: u32,
    },
    /// Calendar date carried as int32 days since epoch
    Date,
    /// Time of day carried as int32 milliseconds
    Time,
    /// Instant carried as int64 milliseconds since epoch
    Timestamp,
}

impl LogicalType {
    /// Physical type the logical type is carried by
    pub const fn schema_type(self) -> SchemaType {
        match self {
            Self::Decimal { .. } => SchemaType::Bytes,
            Self::Date | Self::Time => SchemaType::Int32,
            Self::Timestamp => SchemaType::Int64,
        }
    }

    /// Conventional logical type name
    pub const fn name(self) -> &'static str {
        match self {
            Self::Decimal { .. } => "decimal",
            Self::Date => "date",
            Self::Time => "time",
            Self::Timestamp => "timestamp",
        }
    }
}

/// Shared schema reference
pub type SchemaRef = Arc<Schema>;

/// A named field of a struct schema
#[derive(Debug, Clone, PartialEq)]
pub struct Field {
    /// Field name
    pub name: String,
    /// Position within the struct
    pub index: usize,
    /// Field schema
    pub schema: Schema,
}

/// Logical schema of a record key, value or field
#[derive(Debug, Clone, PartialEq)]
pub struct Schema {
    /// Physical type
    pub schema_type: SchemaType,
    /// Logical type, if any
    pub logical: Option<LogicalType>,
    /// Whether the value may be absent
    pub optional: bool,
    /// Default value
    pub default: Option<Value>,
    /// Schema name (structs and logical types)
    pub name: Option<String>,
    /// Free-form schema parameters
    pub parameters: BTreeMap<String, String>,
    /// Struct fields, in order
    pub fields: Vec<Field>,
}

impl Schema {
    /// Required schema of a physical type
    pub fn of(schema_type: SchemaType) -> Self {
        Self {
            schema_type,
            logical: None,
            optional: false,
            default: None,
            name: None,
            parameters: BTreeMap::new(),
            fields: Vec::new(),
        }
    }

    /// Required schema of a logical type
    pub fn logical(logical: LogicalType) -> Self {
        let mut schema = Self::of(logical.schema_type());
        schema.name = Some(logical.name().to_owned());
        if let LogicalType::Decimal { scale } = logical {
            schema.parameters.insert("scale".into(), scale.to_string());
        }
        schema.logical = Some(logical);
        schema
    }

    /// Decimal schema with the given scale
    pub fn decimal(scale: u32) -> Self {
        Self::logical(LogicalType::Decimal { scale })
    }

    /// Mark the schema optional
    pub fn optional(mut self) -> Self {
        self.optional = true;
        self
    }

    /// Set the default value
    pub fn with_default(mut self, value: impl Into<Value>) -> Self {
        self.default = Some(value.into());
        self
    }

    /// Set the schema name
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Look up a struct field by name
    pub fn field(&self, name: &str) -> Option<&Field> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Field names in order
    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|f| f.name.as_str())
    }
}

/// Incrementally builds a struct schema
#[derive(Debug, Clone)]
pub struct SchemaBuilder {
    schema: Schema,
}

impl SchemaBuilder {
    /// Start a struct schema
    pub fn struct_schema() -> Self {
        Self {
            schema: Schema::of(SchemaType::Struct),
        }
    }

    /// Set the struct name
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.schema.name = Some(name.into());
        self
    }

    /// Add a field, consuming the builder
    pub fn field(mut self, name: impl Into<String>, schema: Schema) -> Result<Self> {
        self.add_field(name, schema)?;
        Ok(self)
    }

    /// Add a field in place; duplicate names are rejected
    pub fn add_field(&mut self, name: impl Into<String>, schema: Schema) -> Result<()> {
        let name = name.into();
        if self.schema.field(&name).is_some() {
            return Err(Error::schema(format!(
                "cannot add field '{}': a field with that name already exists",
                name
            )));
        }
        let index = self.schema.fields.len();
        self.schema.fields.push(Field {
            name,
            index,
            schema,
        });
        Ok(())
    }

    /// Number of fields added so far
    pub fn len(&self) -> usize {
        self.schema.fields.len()
    }

    /// Whether no fields were added
    pub fn is_empty(&self) -> bool {
        self.schema.fields.is_empty()
    }

    /// Finish the schema
    pub fn build(self) -> Schema {
        self.schema
    }
}

/// Values of a struct, positionally aligned with its schema fields
#[derive(Debug, Clone, PartialEq)]
pub struct Struct {
    schema: SchemaRef,
    values: Vec<Value>,
}

impl Struct {
    /// Create a struct with all fields NULL
    pub fn new(schema: SchemaRef) -> Self {
        let values = vec![Value::Null; schema.fields.len()];
        Self { schema, values }
    }

    /// Struct schema
    #[inline]
    pub fn schema(&self) -> &SchemaRef {
        &self.schema
    }

    /// Set a field value by name
    pub fn put(mut self, field: &str, value: impl Into<Value>) -> Result<Self> {
        let index = self
            .schema
            .field(field)
            .map(|f| f.index)
            .ok_or_else(|| Error::schema(format!("struct has no field '{}'", field)))?;
        self.values[index] = value.into();
        Ok(self)
    }

    /// Get a field value by name
    pub fn get(&self, field: &str) -> Option<&Value> {
        self.schema
            .field(field)
            .and_then(|f| self.values.get(f.index))
    }
}

/// A record key or value payload
#[derive(Debug, Clone, PartialEq)]
pub enum Datum {
    /// A single primitive value
    Primitive(Value),
    /// A struct of named fields
    Struct(Struct),
}

impl Datum {
    /// Struct payload, if this is a struct
    pub fn as_struct(&self) -> Option<&Struct> {
        match self {
            Self::Struct(s) => Some(s),
            Self::Primitive(_) => None,
        }
    }

    /// Primitive payload, if this is a primitive
    pub fn as_primitive(&self) -> Option<&Value> {
        match self {
            Self::Primitive(v) => Some(v),
            Self::Struct(_) => None,
        }
    }
}

impl From<Struct> for Datum {
    fn from(s: Struct) -> Self {
        Self::Struct(s)
    }
}

impl From<Value> for Datum {
    fn from(v: Value) -> Self {
        Self::Primitive(v)
    }
}

/// A record to be written to a table
#[derive(Debug, Clone)]
pub struct SinkRecord {
    /// Source topic
    pub topic: String,
    /// Source partition
    pub partition: i32,
    /// Offset within the partition
    pub offset: i64,
    /// Key schema
    pub key_schema: Option<SchemaRef>,
    /// Key payload
    pub key: Option<Datum>,
    /// Value schema
    pub value_schema: Option<SchemaRef>,
    /// Value payload; `None` for a tombstone
    pub value: Option<Datum>,
}

impl SinkRecord {
    /// Create a record with a struct value and no key
    pub fn new(topic: impl Into<String>, value: Struct) -> Self {
        Self {
            topic: topic.into(),
            partition: 0,
            offset: 0,
            key_schema: None,
            key: None,
            value_schema: Some(Arc::clone(value.schema())),
            value: Some(Datum::Struct(value)),
        }
    }

    /// Create a tombstone carrying only a key
    pub fn tombstone(
        topic: impl Into<String>,
        key_schema: SchemaRef,
        key: impl Into<Datum>,
    ) -> Self {
        Self {
            topic: topic.into(),
            partition: 0,
            offset: 0,
            key_schema: Some(key_schema),
            key: Some(key.into()),
            value_schema: None,
            value: None,
        }
    }

    /// Set the key
    pub fn with_key(mut self, key_schema: SchemaRef, key: impl Into<Datum>) -> Self {
        self.key_schema = Some(key_schema);
        self.key = Some(key.into());
        self
    }

    /// Set the partition and offset
    pub fn with_position(mut self, partition: i32, offset: i64) -> Self {
        self.partition = partition;
        self.offset = offset;
        self
    }

    /// Whether the record carries no value
    #[inline]
    pub fn is_tombstone(&self) -> bool {
        self.value.is_none()
    }

    /// Key and value schemas of this record
    pub fn schema_pair(&self) -> SchemaPair {
        SchemaPair::new(self.key_schema.clone(), self.value_schema.clone())
    }
}

/// Key and value schemas of one record shape
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SchemaPair {
    /// Key schema
    pub key_schema: Option<SchemaRef>,
    /// Value schema
    pub value_schema: Option<SchemaRef>,
}

impl SchemaPair {
    /// Create a schema pair
    pub fn new(key_schema: Option<SchemaRef>, value_schema: Option<SchemaRef>) -> Self {
        Self {
            key_schema,
            value_schema,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn account_schema() -> SchemaRef {
        Arc::new(
            SchemaBuilder::struct_schema()
                .name("accounts")
                .field("id", Schema::of(SchemaType::Int32))
                .unwrap()
                .field("name", Schema::of(SchemaType::String).optional())
                .unwrap()
                .field("balance", Schema::decimal(2))
                .unwrap()
                .build(),
        )
    }

    #[test]
    fn test_schema_builder_preserves_order() {
        let schema = account_schema();
        let names: Vec<_> = schema.field_names().collect();
        assert_eq!(names, vec!["id", "name", "balance"]);
        assert_eq!(schema.field("balance").unwrap().index, 2);
    }

    #[test]
    fn test_schema_builder_rejects_duplicates() {
        let mut builder = SchemaBuilder::struct_schema();
        builder.add_field("id", Schema::of(SchemaType::Int32)).unwrap();
        assert!(builder.add_field("id", Schema::of(SchemaType::Int64)).is_err());
        assert_eq!(builder.len(), 1);
    }

    #[test]
    fn test_decimal_schema() {
        let schema = Schema::decimal(2);
        assert_eq!(schema.schema_type, SchemaType::Bytes);
        assert_eq!(schema.logical, Some(LogicalType::Decimal { scale: 2 }));
        assert_eq!(schema.parameters.get("scale").map(String::as_str), Some("2"));
    }

    #[test]
    fn test_struct_put_get() {
        let value = Struct::new(account_schema())
            .put("id", 7)
            .unwrap()
            .put("name", "Ann")
            .unwrap();

        assert_eq!(value.get("id"), Some(&Value::Int32(7)));
        assert_eq!(value.get("balance"), Some(&Value::Null));
        assert!(value.get("missing").is_none());
        assert!(value.clone().put("missing", 1).is_err());
    }

    #[test]
    fn test_tombstone() {
        let key_schema = Arc::new(Schema::of(SchemaType::Int32));
        let record = SinkRecord::tombstone("accounts", key_schema, Value::Int32(7));
        assert!(record.is_tombstone());
        assert!(record.schema_pair().value_schema.is_none());
    }
}
