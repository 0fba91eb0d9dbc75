//! Binding of sink records to prepared statement parameters
//!
//! A binder is created once per statement and record shape. Key and non-key
//! values are bound in the same order the statement builders emit columns:
//! keys first for INSERT and UPSERT, keys last for UPDATE, keys only for
//! tombstones.

use crate::connection::PreparedStatement;
use crate::dialect::DatabaseDialect;
use crate::error::{Error, Result};
use crate::fields::{FieldsMetadata, InsertMode, PrimaryKeyMode};
use crate::record::{Datum, Schema, SchemaPair, SchemaType, SinkRecord, Struct};
use crate::types::Value;

/// Binds whole records to one prepared statement
pub trait StatementBinder: Send {
    /// Bind a record starting at parameter 1 and queue it as a batch entry
    fn bind_record(&mut self, record: &SinkRecord) -> Result<()>;

    /// Bind a record starting at `index`; returns the number of slots used
    fn bind_record_at(&mut self, index: usize, record: &SinkRecord) -> Result<usize>;

    /// Bind the key of a record that has no value and queue it as a batch entry
    fn bind_tombstone_record(&mut self, _record: &SinkRecord) -> Result<()> {
        Err(Error::unsupported(
            "bind_tombstone_record",
            "this binder does not support deletes",
        ))
    }
}

/// [`StatementBinder`] that binds through a dialect's `bind_field`
pub struct PreparedStatementBinder<'a, D: ?Sized> {
    dialect: &'a D,
    statement: &'a mut dyn PreparedStatement,
    pk_mode: PrimaryKeyMode,
    schema_pair: SchemaPair,
    fields: &'a FieldsMetadata,
    insert_mode: InsertMode,
}

impl<'a, D: DatabaseDialect + ?Sized> PreparedStatementBinder<'a, D> {
    /// Create a binder for one statement and record shape
    pub fn new(
        dialect: &'a D,
        statement: &'a mut dyn PreparedStatement,
        pk_mode: PrimaryKeyMode,
        schema_pair: SchemaPair,
        fields: &'a FieldsMetadata,
        insert_mode: InsertMode,
    ) -> Self {
        Self {
            dialect,
            statement,
            pk_mode,
            schema_pair,
            fields,
            insert_mode,
        }
    }

    fn bind(&mut self, index: usize, name: &str, schema: &Schema, value: &Value) -> Result<()> {
        bind_field_at(self.dialect, &mut *self.statement, index, name, schema, value)
    }

    fn value_struct<'r>(&self, record: &'r SinkRecord) -> Result<&'r Struct> {
        record.value.as_ref().and_then(Datum::as_struct).ok_or_else(|| {
            Error::schema(format!(
                "record from {}-{}@{} has no struct value",
                record.topic, record.partition, record.offset
            ))
        })
    }

    fn bind_key_fields(&mut self, mut index: usize, record: &SinkRecord) -> Result<usize> {
        let fields = self.fields;
        match self.pk_mode {
            PrimaryKeyMode::None => {
                if !fields.key_field_names.is_empty() {
                    return Err(Error::internal(
                        "key fields present with primary key mode none",
                    ));
                }
            }
            PrimaryKeyMode::Kafka => {
                let mut names = fields.key_field_names.iter();
                let (Some(topic), Some(partition), Some(offset), None) =
                    (names.next(), names.next(), names.next(), names.next())
                else {
                    return Err(Error::internal(format!(
                        "kafka primary key mode needs 3 key fields, found {}",
                        fields.key_field_names.len()
                    )));
                };
                self.bind(index, topic, &Schema::of(SchemaType::String), &Value::String(record.topic.clone()))?;
                self.bind(index + 1, partition, &Schema::of(SchemaType::Int32), &Value::Int32(record.partition))?;
                self.bind(index + 2, offset, &Schema::of(SchemaType::Int64), &Value::Int64(record.offset))?;
                index += 3;
            }
            PrimaryKeyMode::RecordKey => {
                let key = record
                    .key
                    .as_ref()
                    .ok_or_else(|| Error::schema("record key primary key mode requires a key"))?;
                let key_schema = self.schema_pair.key_schema.as_deref().ok_or_else(|| {
                    Error::schema("record key primary key mode requires a key schema")
                })?;
                if key_schema.schema_type.is_primitive() {
                    let name = fields.key_field_names.first().map_or("", String::as_str);
                    let value = key.as_primitive().ok_or_else(|| {
                        Error::schema(format!(
                            "key field {} has a primitive schema but the record key is a struct",
                            name
                        ))
                    })?;
                    bind_field_at(self.dialect, &mut *self.statement, index, name, key_schema, value)?;
                    index += 1;
                } else {
                    let key_struct = key
                        .as_struct()
                        .ok_or_else(|| Error::schema("record key is not a struct"))?;
                    index = self.bind_struct_fields(index, KeySide::Key, key_struct)?;
                }
            }
            PrimaryKeyMode::RecordValue => {
                let value = self.value_struct(record)?;
                index = self.bind_struct_fields(index, KeySide::Value, value)?;
            }
        }
        Ok(index)
    }

    fn bind_struct_fields(&mut self, mut index: usize, side: KeySide, data: &Struct) -> Result<usize> {
        let schema = match side {
            KeySide::Key => self.schema_pair.key_schema.as_deref(),
            KeySide::Value => self.schema_pair.value_schema.as_deref(),
        }
        .ok_or_else(|| Error::schema("missing schema for key fields"))?;
        for name in &self.fields.key_field_names {
            let field = schema
                .field(name)
                .ok_or_else(|| Error::schema(format!("key field {} not found in schema", name)))?;
            let value = data.get(name).unwrap_or(&Value::Null);
            bind_field_at(self.dialect, &mut *self.statement, index, name, &field.schema, value)?;
            index += 1;
        }
        Ok(index)
    }

    fn bind_non_key_fields(&mut self, mut index: usize, record: &SinkRecord) -> Result<usize> {
        if self.fields.non_key_field_names.is_empty() {
            return Ok(index);
        }
        let value = self.value_struct(record)?;
        let schema = self
            .schema_pair
            .value_schema
            .as_deref()
            .ok_or_else(|| Error::schema("missing value schema for non-key fields"))?;
        for name in &self.fields.non_key_field_names {
            let field = schema
                .field(name)
                .ok_or_else(|| Error::schema(format!("field {} not found in value schema", name)))?;
            let datum = value.get(name).unwrap_or(&Value::Null);
            bind_field_at(self.dialect, &mut *self.statement, index, name, &field.schema, datum)?;
            index += 1;
        }
        Ok(index)
    }
}

fn bind_field_at<D: DatabaseDialect + ?Sized>(
    dialect: &D,
    statement: &mut dyn PreparedStatement,
    index: usize,
    name: &str,
    schema: &Schema,
    value: &Value,
) -> Result<()> {
    dialect
        .bind_field(statement, index, schema, value)
        .map_err(|e| match e {
            Error::TypeConversion { message } => Error::type_conversion(format!(
                "field {} (parameter {}): {}",
                name, index, message
            )),
            other => other,
        })
}

#[derive(Clone, Copy)]
enum KeySide {
    Key,
    Value,
}

impl<D: DatabaseDialect + ?Sized> StatementBinder for PreparedStatementBinder<'_, D> {
    fn bind_record(&mut self, record: &SinkRecord) -> Result<()> {
        self.bind_record_at(1, record)?;
        self.statement.add_batch()
    }

    fn bind_record_at(&mut self, index: usize, record: &SinkRecord) -> Result<usize> {
        if record.is_tombstone() {
            return Err(Error::schema(format!(
                "record from {}-{}@{} is a tombstone; bind it with bind_tombstone_record",
                record.topic, record.partition, record.offset
            )));
        }
        let next = match self.insert_mode {
            InsertMode::Insert | InsertMode::Multi | InsertMode::Upsert => {
                let next = self.bind_key_fields(index, record)?;
                self.bind_non_key_fields(next, record)?
            }
            InsertMode::Update => {
                let next = self.bind_non_key_fields(index, record)?;
                self.bind_key_fields(next, record)?
            }
        };
        Ok(next - index)
    }

    fn bind_tombstone_record(&mut self, record: &SinkRecord) -> Result<()> {
        if !self.dialect.supports_delete() {
            return Err(Error::unsupported(
                "bind_tombstone_record",
                format!("the {} dialect does not support deletes", self.dialect.name()),
            ));
        }
        if self.pk_mode != PrimaryKeyMode::RecordKey {
            return Err(Error::config(format!(
                "deleting on tombstones requires primary key mode record_key, not {:?}",
                self.pk_mode
            )));
        }
        self.bind_key_fields(1, record)?;
        self.statement.add_batch()
    }
}
