//! Mapping of record fields onto key and non-key table columns

use indexmap::{IndexMap, IndexSet};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use crate::error::{Error, Result};
use crate::record::{LogicalType, Schema, SchemaPair, SchemaType};
use crate::types::Value;

/// Default key column names in [`PrimaryKeyMode::Kafka`]
pub const DEFAULT_KAFKA_PK_NAMES: [&str; 3] =
    ["__connect_topic", "__connect_partition", "__connect_offset"];

/// Default key column name for a primitive record key
pub const DEFAULT_RECORD_KEY_PK_NAME: &str = "__connect_key";

/// Where primary key values come from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum PrimaryKeyMode {
    /// No key columns
    #[default]
    None,
    /// Topic, partition and offset of the record
    Kafka,
    /// The record key (primitive or struct)
    RecordKey,
    /// Fields of the record value
    RecordValue,
}

/// Statement shape used to write records
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum InsertMode {
    /// Plain INSERT
    #[default]
    Insert,
    /// Multi-row INSERT
    Multi,
    /// Dialect-specific upsert
    Upsert,
    /// UPDATE by key
    Update,
}

/// A record field that maps to a table column
#[derive(Debug, Clone, PartialEq)]
pub struct SinkRecordField {
    schema: Schema,
    name: String,
    is_primary_key: bool,
}

impl SinkRecordField {
    /// Create a field
    pub fn new(schema: Schema, name: impl Into<String>, is_primary_key: bool) -> Self {
        Self {
            schema,
            name: name.into(),
            is_primary_key,
        }
    }

    /// Column name
    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Field schema
    #[inline]
    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    /// Physical schema type
    #[inline]
    pub fn schema_type(&self) -> SchemaType {
        self.schema.schema_type
    }

    /// Logical type, if any
    #[inline]
    pub fn logical(&self) -> Option<LogicalType> {
        self.schema.logical
    }

    /// Default value
    #[inline]
    pub fn default_value(&self) -> Option<&Value> {
        self.schema.default.as_ref()
    }

    /// Whether the field is part of the primary key
    #[inline]
    pub fn is_primary_key(&self) -> bool {
        self.is_primary_key
    }

    /// Key columns are never nullable
    #[inline]
    pub fn is_optional(&self) -> bool {
        !self.is_primary_key && self.schema.optional
    }
}

/// Key and non-key fields of one record shape, in binding order
#[derive(Debug, Clone, PartialEq, Default)]
pub struct FieldsMetadata {
    /// Key field names, in key order
    pub key_field_names: IndexSet<String>,
    /// Non-key field names, in value schema order
    pub non_key_field_names: IndexSet<String>,
    /// All fields, keys first
    pub all_fields: IndexMap<String, SinkRecordField>,
}

impl FieldsMetadata {
    /// Derive key and non-key fields for `table_name` from a record shape.
    ///
    /// `pk_fields` selects key fields (empty means the mode's default) and
    /// `whitelist` restricts non-key fields (empty means all).
    pub fn extract(
        table_name: &str,
        pk_mode: PrimaryKeyMode,
        pk_fields: &[String],
        whitelist: &HashSet<String>,
        schema_pair: &SchemaPair,
    ) -> Result<Self> {
        let value_schema = schema_pair.value_schema.as_deref();
        if let Some(schema) = value_schema {
            if schema.schema_type != SchemaType::Struct {
                return Err(Error::config(format!(
                    "value schema for table '{}' must be a struct, found {:?}",
                    table_name, schema.schema_type
                )));
            }
        }

        let mut all_fields = IndexMap::new();
        match pk_mode {
            PrimaryKeyMode::None => {
                if !pk_fields.is_empty() {
                    return Err(Error::config(format!(
                        "primary key fields {:?} configured for table '{}' but primary key mode is none",
                        pk_fields, table_name
                    )));
                }
            }
            PrimaryKeyMode::Kafka => extract_kafka_pk(table_name, pk_fields, &mut all_fields)?,
            PrimaryKeyMode::RecordKey => {
                extract_record_key_pk(table_name, pk_fields, schema_pair, &mut all_fields)?
            }
            PrimaryKeyMode::RecordValue => {
                extract_record_value_pk(table_name, pk_fields, value_schema, &mut all_fields)?
            }
        }

        let key_field_names: IndexSet<String> = all_fields.keys().cloned().collect();
        let mut non_key_field_names = IndexSet::new();

        if let Some(schema) = value_schema {
            for field in &schema.fields {
                if key_field_names.contains(&field.name) {
                    continue;
                }
                if !whitelist.is_empty() && !whitelist.contains(&field.name) {
                    continue;
                }
                non_key_field_names.insert(field.name.clone());
                all_fields.insert(
                    field.name.clone(),
                    SinkRecordField::new(field.schema.clone(), field.name.clone(), false),
                );
            }
        }

        if all_fields.is_empty() {
            return Err(Error::config(format!(
                "no fields found using key and value schemas for table '{}'",
                table_name
            )));
        }

        Ok(Self {
            key_field_names,
            non_key_field_names,
            all_fields,
        })
    }

    /// Field by column name
    pub fn field(&self, name: &str) -> Option<&SinkRecordField> {
        self.all_fields.get(name)
    }
}

fn extract_kafka_pk(
    table_name: &str,
    pk_fields: &[String],
    all_fields: &mut IndexMap<String, SinkRecordField>,
) -> Result<()> {
    let names: Vec<String> = match pk_fields.len() {
        0 => DEFAULT_KAFKA_PK_NAMES.iter().map(|s| s.to_string()).collect(),
        3 => pk_fields.to_vec(),
        n => {
            return Err(Error::config(format!(
                "primary key mode for table '{}' is kafka: configure no key fields or exactly 3, got {}",
                table_name, n
            )))
        }
    };

    let types = [SchemaType::String, SchemaType::Int32, SchemaType::Int64];
    for (name, schema_type) in names.into_iter().zip(types) {
        all_fields.insert(
            name.clone(),
            SinkRecordField::new(Schema::of(schema_type), name, true),
        );
    }
    Ok(())
}

fn extract_record_key_pk(
    table_name: &str,
    pk_fields: &[String],
    schema_pair: &SchemaPair,
    all_fields: &mut IndexMap<String, SinkRecordField>,
) -> Result<()> {
    let key_schema = schema_pair.key_schema.as_deref().ok_or_else(|| {
        Error::config(format!(
            "primary key mode for table '{}' is record_key but the record has no key schema",
            table_name
        ))
    })?;

    if key_schema.schema_type.is_primitive() {
        let name = match pk_fields {
            [] => DEFAULT_RECORD_KEY_PK_NAME.to_string(),
            [single] => single.clone(),
            _ => {
                return Err(Error::config(format!(
                    "table '{}' has a primitive record key; configure at most one key field name",
                    table_name
                )))
            }
        };
        all_fields.insert(
            name.clone(),
            SinkRecordField::new(key_schema.clone(), name, true),
        );
        return Ok(());
    }

    if key_schema.schema_type != SchemaType::Struct {
        return Err(Error::config(format!(
            "record key for table '{}' must be a primitive or a struct, found {:?}",
            table_name, key_schema.schema_type
        )));
    }

    insert_struct_keys(table_name, "key", pk_fields, key_schema, all_fields)
}

fn extract_record_value_pk(
    table_name: &str,
    pk_fields: &[String],
    value_schema: Option<&Schema>,
    all_fields: &mut IndexMap<String, SinkRecordField>,
) -> Result<()> {
    let value_schema = value_schema.ok_or_else(|| {
        Error::config(format!(
            "primary key mode for table '{}' is record_value but the record has no value schema",
            table_name
        ))
    })?;
    insert_struct_keys(table_name, "value", pk_fields, value_schema, all_fields)
}

fn insert_struct_keys(
    table_name: &str,
    side: &str,
    pk_fields: &[String],
    schema: &Schema,
    all_fields: &mut IndexMap<String, SinkRecordField>,
) -> Result<()> {
    if pk_fields.is_empty() {
        for field in &schema.fields {
            all_fields.insert(
                field.name.clone(),
                SinkRecordField::new(field.schema.clone(), field.name.clone(), true),
            );
        }
        return Ok(());
    }

    for name in pk_fields {
        let field = schema.field(name).ok_or_else(|| {
            Error::config(format!(
                "primary key field '{}' for table '{}' is not in the record {} schema",
                name, table_name, side
            ))
        })?;
        all_fields.insert(
            name.clone(),
            SinkRecordField::new(field.schema.clone(), name.clone(), true),
        );
    }
    Ok(())
}
