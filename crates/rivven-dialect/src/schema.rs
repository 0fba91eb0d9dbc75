//! Column and table definitions discovered from database metadata
//!
//! Provides:
//! - ColumnDefinition: one column as described by the catalog or a result set
//! - TableDefinition: a table's ordered columns and primary key
//! - TableType: table or view

use indexmap::{IndexMap, IndexSet};
use std::collections::HashSet;
use std::fmt;
use tracing::warn;

use crate::fields::SinkRecordField;
use crate::identifier::{ColumnId, TableId};
use crate::types::{Mutability, Nullability, SqlType};

/// Scale reported by some drivers for NUMBER columns declared without one
pub const NUMERIC_SCALE_UNSET: i32 = -127;

/// Kind of relation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum TableType {
    /// Base table
    #[default]
    Table,
    /// View
    View,
}

impl TableType {
    /// Parse a catalog table type name; unknown names are `None`
    pub fn parse(name: &str) -> Option<Self> {
        match name.trim().to_ascii_uppercase().as_str() {
            "TABLE" | "BASE TABLE" | "PARTITIONED TABLE" => Some(Self::Table),
            "VIEW" | "MATERIALIZED VIEW" => Some(Self::View),
            _ => None,
        }
    }

    /// Catalog name of the type
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Table => "TABLE",
            Self::View => "VIEW",
        }
    }
}

impl fmt::Display for TableType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Raw column facts as reported by a driver, before normalization
#[derive(Debug, Clone, PartialEq)]
#[allow(missing_docs)]
pub struct ColumnFacts {
    pub sql_type: SqlType,
    pub type_name: String,
    pub nullability: Nullability,
    pub mutability: Mutability,
    pub display_size: i32,
    pub precision: i32,
    pub scale: i32,
    pub auto_increment: bool,
    pub signed: bool,
    pub case_sensitive: bool,
    pub searchable: bool,
    pub currency: bool,
    pub primary_key: bool,
}

impl ColumnFacts {
    /// Facts for a column of the given type with driver defaults
    pub fn new(sql_type: SqlType, type_name: impl Into<String>) -> Self {
        Self {
            sql_type,
            type_name: type_name.into(),
            nullability: Nullability::Unknown,
            mutability: Mutability::Unknown,
            display_size: 0,
            precision: 0,
            scale: 0,
            auto_increment: false,
            signed: true,
            case_sensitive: false,
            searchable: true,
            currency: false,
            primary_key: false,
        }
    }
}

/// Immutable description of one column.
///
/// Precision is 0 when unknown; scale is `None` when the driver did not report
/// a usable one. Negative values are never stored.
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnDefinition {
    id: ColumnId,
    sql_type: SqlType,
    type_name: String,
    nullability: Nullability,
    mutability: Mutability,
    display_size: u32,
    precision: u32,
    scale: Option<u32>,
    auto_increment: bool,
    signed: bool,
    case_sensitive: bool,
    searchable: bool,
    currency: bool,
    primary_key: bool,
}

impl ColumnDefinition {
    /// Build a definition, normalizing precision, scale and display size
    pub fn new(id: ColumnId, facts: ColumnFacts) -> Self {
        let precision = if facts.precision < 0 {
            warn!(
                "Column {} reported negative precision {}; treating as unknown",
                id, facts.precision
            );
            0
        } else {
            facts.precision as u32
        };

        let scale = match facts.scale {
            NUMERIC_SCALE_UNSET => None,
            s if s < 0 => {
                warn!("Column {} reported negative scale {}; treating as unset", id, s);
                None
            }
            // unconstrained NUMERIC: drivers report scale 0 alongside an unknown precision
            _ if precision == 0 && matches!(facts.sql_type, SqlType::Numeric | SqlType::Decimal) => {
                None
            }
            s => Some(s as u32),
        };

        Self {
            id,
            sql_type: facts.sql_type,
            type_name: facts.type_name,
            nullability: facts.nullability,
            mutability: facts.mutability,
            display_size: facts.display_size.max(0) as u32,
            precision,
            scale,
            auto_increment: facts.auto_increment,
            signed: facts.signed,
            case_sensitive: facts.case_sensitive,
            searchable: facts.searchable,
            currency: facts.currency,
            primary_key: facts.primary_key,
        }
    }

    /// Column identifier
    #[inline]
    pub fn id(&self) -> &ColumnId {
        &self.id
    }

    /// SQL type code
    #[inline]
    pub fn sql_type(&self) -> SqlType {
        self.sql_type
    }

    /// Vendor type name
    #[inline]
    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    /// Nullability
    #[inline]
    pub fn nullability(&self) -> Nullability {
        self.nullability
    }

    /// Whether NULL is accepted (unknown counts as nullable)
    #[inline]
    pub fn is_optional(&self) -> bool {
        self.nullability != Nullability::NotNull
    }

    /// Writability
    #[inline]
    pub fn mutability(&self) -> Mutability {
        self.mutability
    }

    /// Display size in characters
    #[inline]
    pub fn display_size(&self) -> u32 {
        self.display_size
    }

    /// Precision; 0 when unknown
    #[inline]
    pub fn precision(&self) -> u32 {
        self.precision
    }

    /// Scale; `None` when unset
    #[inline]
    pub fn scale(&self) -> Option<u32> {
        self.scale
    }

    /// Auto-increment column
    #[inline]
    pub fn is_auto_increment(&self) -> bool {
        self.auto_increment
    }

    /// Signed numeric column
    #[inline]
    pub fn is_signed(&self) -> bool {
        self.signed
    }

    /// Case sensitive column
    #[inline]
    pub fn is_case_sensitive(&self) -> bool {
        self.case_sensitive
    }

    /// Usable in a WHERE clause
    #[inline]
    pub fn is_searchable(&self) -> bool {
        self.searchable
    }

    /// Currency column
    #[inline]
    pub fn is_currency(&self) -> bool {
        self.currency
    }

    /// Part of the primary key
    #[inline]
    pub fn is_primary_key(&self) -> bool {
        self.primary_key
    }
}

/// Immutable description of a table.
///
/// Columns are kept in the order they were discovered.
#[derive(Debug, Clone, PartialEq)]
pub struct TableDefinition {
    id: TableId,
    columns: IndexMap<String, ColumnDefinition>,
    pk_column_names: IndexSet<String>,
    table_type: TableType,
}

impl TableDefinition {
    /// Create a table definition from ordered columns
    pub fn new(
        id: TableId,
        columns: impl IntoIterator<Item = ColumnDefinition>,
        table_type: TableType,
    ) -> Self {
        let mut by_name = IndexMap::new();
        let mut pk_column_names = IndexSet::new();
        for column in columns {
            let name = column.id().name().to_owned();
            if column.is_primary_key() {
                pk_column_names.insert(name.clone());
            }
            by_name.insert(name, column);
        }
        Self {
            id,
            columns: by_name,
            pk_column_names,
            table_type,
        }
    }

    /// Table identifier
    #[inline]
    pub fn id(&self) -> &TableId {
        &self.id
    }

    /// Table or view
    #[inline]
    pub fn table_type(&self) -> TableType {
        self.table_type
    }

    /// Number of columns
    #[inline]
    pub fn column_count(&self) -> usize {
        self.columns.len()
    }

    /// Column definition by exact name
    pub fn definition_for_column(&self, name: &str) -> Option<&ColumnDefinition> {
        self.columns.get(name)
    }

    /// Column definitions in order
    pub fn definitions(&self) -> impl Iterator<Item = &ColumnDefinition> {
        self.columns.values()
    }

    /// Column names in order
    pub fn column_names(&self) -> impl Iterator<Item = &str> {
        self.columns.keys().map(String::as_str)
    }

    /// Primary key column names in order
    pub fn primary_key_column_names(&self) -> impl Iterator<Item = &str> {
        self.pk_column_names.iter().map(String::as_str)
    }

    /// Fields with no matching column, compared exactly and then case-insensitively
    pub fn missing_fields<'f>(&self, fields: &'f [SinkRecordField]) -> Vec<&'f SinkRecordField> {
        let lower: HashSet<String> = self.columns.keys().map(|k| k.to_lowercase()).collect();
        fields
            .iter()
            .filter(|f| {
                !self.columns.contains_key(f.name()) && !lower.contains(&f.name().to_lowercase())
            })
            .collect()
    }
}
