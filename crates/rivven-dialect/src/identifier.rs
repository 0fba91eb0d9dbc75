//! Table and column identifiers, quoting rules and SQL expression building.
//!
//! Identifiers cannot be bound as statement parameters, so every statement the
//! dialects emit goes through an [`ExpressionBuilder`] that quotes table and
//! column names with the dialect's [`IdentifierRules`]. Row data never passes
//! through here; it is always bound to `?` parameters.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::hash::{Hash, Hasher};

use crate::error::{Error, Result};

/// Words that are never emitted unquoted under [`QuoteMethod::WhenNeeded`]
const RESERVED_WORDS: &[&str] = &[
    "all", "alter", "and", "any", "as", "asc", "between", "by", "case", "check", "column",
    "constraint", "create", "cross", "current", "default", "delete", "desc", "distinct", "drop",
    "else", "end", "exists", "from", "full", "grant", "group", "having", "in", "index", "inner",
    "insert", "into", "is", "join", "key", "left", "like", "limit", "not", "null", "of", "on",
    "or", "order", "outer", "primary", "references", "right", "select", "set", "table", "then",
    "to", "union", "unique", "update", "user", "using", "values", "when", "where", "with",
];

/// Identifier of a table: optional catalog, optional schema and a table name
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TableId {
    catalog: Option<String>,
    schema: Option<String>,
    table: String,
}

impl TableId {
    /// Create a table identifier
    pub fn new(catalog: Option<&str>, schema: Option<&str>, table: impl Into<String>) -> Self {
        Self {
            catalog: catalog.filter(|c| !c.is_empty()).map(str::to_owned),
            schema: schema.filter(|s| !s.is_empty()).map(str::to_owned),
            table: table.into(),
        }
    }

    /// Create an unqualified table identifier
    pub fn table(table: impl Into<String>) -> Self {
        Self::new(None, None, table)
    }

    /// Catalog name
    #[inline]
    pub fn catalog_name(&self) -> Option<&str> {
        self.catalog.as_deref()
    }

    /// Schema name
    #[inline]
    pub fn schema_name(&self) -> Option<&str> {
        self.schema.as_deref()
    }

    /// Table name
    #[inline]
    pub fn table_name(&self) -> &str {
        &self.table
    }

    /// Identifier of a column in this table
    pub fn column(&self, name: impl Into<String>) -> ColumnId {
        ColumnId::new(Some(self.clone()), name)
    }
}

impl fmt::Display for TableId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(catalog) = &self.catalog {
            write!(f, "{}.", catalog)?;
        }
        if let Some(schema) = &self.schema {
            write!(f, "{}.", schema)?;
        }
        write!(f, "{}", self.table)
    }
}

/// Identifier of a column, optionally bound to a table, with an optional alias.
///
/// Equality and hashing use the table and the column name only.
#[derive(Debug, Clone, Eq)]
pub struct ColumnId {
    table: Option<TableId>,
    name: String,
    alias: Option<String>,
}

impl ColumnId {
    /// Create a column identifier
    pub fn new(table: Option<TableId>, name: impl Into<String>) -> Self {
        Self {
            table,
            name: name.into(),
            alias: None,
        }
    }

    /// Create a column identifier with an alias
    pub fn with_alias(table: Option<TableId>, name: impl Into<String>, alias: Option<&str>) -> Self {
        let name = name.into();
        Self {
            alias: alias.filter(|a| !a.is_empty() && *a != name).map(str::to_owned),
            table,
            name,
        }
    }

    /// Unbound column identifier
    pub fn named(name: impl Into<String>) -> Self {
        Self::new(None, name)
    }

    /// Owning table
    #[inline]
    pub fn table_id(&self) -> Option<&TableId> {
        self.table.as_ref()
    }

    /// Column name
    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Alias, when different from the name
    #[inline]
    pub fn alias(&self) -> Option<&str> {
        self.alias.as_deref()
    }

    /// Alias if present, otherwise the column name
    #[inline]
    pub fn alias_or_name(&self) -> &str {
        self.alias.as_deref().unwrap_or(&self.name)
    }
}

impl PartialEq for ColumnId {
    fn eq(&self, other: &Self) -> bool {
        self.table == other.table && self.name == other.name
    }
}

impl Hash for ColumnId {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.table.hash(state);
        self.name.hash(state);
    }
}

impl fmt::Display for ColumnId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.table {
            Some(table) => write!(f, "{}.{}", table, self.name),
            None => write!(f, "{}", self.name),
        }
    }
}

/// When identifiers are quoted in generated SQL
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum QuoteMethod {
    /// Quote every identifier
    #[default]
    Always,
    /// Never quote identifiers
    Never,
    /// Quote only identifiers that would not survive the database's case folding
    WhenNeeded,
}

/// How the database folds unquoted identifiers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaseFolding {
    /// Unquoted identifiers are folded to lower case (PostgreSQL)
    Lower,
    /// Unquoted identifiers are folded to upper case (Oracle)
    Upper,
    /// Case is preserved (MySQL, SQL Server)
    Preserve,
}

/// Quoting and qualification rules of a dialect
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdentifierRules {
    delimiter: String,
    leading_quote: String,
    trailing_quote: String,
    case_folding: CaseFolding,
}

impl Default for IdentifierRules {
    fn default() -> Self {
        Self::new(".", "\"", "\"", CaseFolding::Preserve)
    }
}

impl IdentifierRules {
    /// Create identifier rules
    pub fn new(
        delimiter: impl Into<String>,
        leading_quote: impl Into<String>,
        trailing_quote: impl Into<String>,
        case_folding: CaseFolding,
    ) -> Self {
        Self {
            delimiter: delimiter.into(),
            leading_quote: leading_quote.into(),
            trailing_quote: trailing_quote.into(),
            case_folding,
        }
    }

    /// Rules with the same quote string on both sides
    pub fn quoted_with(quote: &str, case_folding: CaseFolding) -> Self {
        Self::new(".", quote, quote, case_folding)
    }

    /// Separator between catalog, schema and table
    #[inline]
    pub fn delimiter(&self) -> &str {
        &self.delimiter
    }

    /// Opening quote
    #[inline]
    pub fn leading_quote(&self) -> &str {
        &self.leading_quote
    }

    /// Closing quote
    #[inline]
    pub fn trailing_quote(&self) -> &str {
        &self.trailing_quote
    }

    /// Case folding applied to unquoted identifiers
    #[inline]
    pub fn case_folding(&self) -> CaseFolding {
        self.case_folding
    }

    /// Quote an identifier, doubling any embedded closing quote
    pub fn quote(&self, name: &str) -> String {
        let doubled = format!("{0}{0}", self.trailing_quote);
        format!(
            "{}{}{}",
            self.leading_quote,
            name.replace(&self.trailing_quote, &doubled),
            self.trailing_quote
        )
    }

    /// Whether `name` reads back unchanged when emitted without quotes
    pub fn is_safe_unquoted(&self, name: &str) -> bool {
        let mut chars = name.chars();
        let starts_ok = matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_');
        if !starts_ok || !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
            return false;
        }
        let folded_ok = match self.case_folding {
            CaseFolding::Lower => !name.chars().any(|c| c.is_ascii_uppercase()),
            CaseFolding::Upper => !name.chars().any(|c| c.is_ascii_lowercase()),
            CaseFolding::Preserve => true,
        };
        folded_ok && !RESERVED_WORDS.contains(&name.to_ascii_lowercase().as_str())
    }

    /// Render an identifier under a quoting policy
    pub fn render(&self, name: &str, method: QuoteMethod) -> String {
        match method {
            QuoteMethod::Always => self.quote(name),
            QuoteMethod::Never => name.to_owned(),
            QuoteMethod::WhenNeeded if self.is_safe_unquoted(name) => name.to_owned(),
            QuoteMethod::WhenNeeded => self.quote(name),
        }
    }

    /// Fully quoted, delimited form of a table identifier
    pub fn qualified(&self, table: &TableId) -> String {
        let mut parts = Vec::with_capacity(3);
        if let Some(catalog) = table.catalog_name() {
            parts.push(self.quote(catalog));
        }
        if let Some(schema) = table.schema_name() {
            parts.push(self.quote(schema));
        }
        parts.push(self.quote(table.table_name()));
        parts.join(&self.delimiter)
    }

    /// Split a possibly quoted, delimited name into its parts.
    ///
    /// Quoted parts may contain the delimiter and doubled closing quotes.
    /// Unbalanced quotes, empty parts and stray quote characters are errors.
    pub fn parse_qualified_identifier(&self, fqn: &str) -> Result<Vec<String>> {
        if fqn.trim().is_empty() {
            return Err(Error::parse("identifier cannot be empty"));
        }

        let lead = self.leading_quote.as_str();
        let trail = self.trailing_quote.as_str();
        let delim = self.delimiter.as_str();

        let mut parts = Vec::new();
        let mut rest = fqn;

        loop {
            let part;
            if !lead.is_empty() && rest.starts_with(lead) {
                rest = &rest[lead.len()..];
                let mut buf = String::new();
                loop {
                    match rest.find(trail) {
                        None => {
                            return Err(Error::parse(format!(
                                "unbalanced quotes in identifier '{}'",
                                fqn
                            )))
                        }
                        Some(pos) => {
                            buf.push_str(&rest[..pos]);
                            rest = &rest[pos + trail.len()..];
                            if rest.starts_with(trail) {
                                buf.push_str(trail);
                                rest = &rest[trail.len()..];
                            } else {
                                break;
                            }
                        }
                    }
                }
                part = buf;
            } else {
                let end = rest.find(delim).unwrap_or(rest.len());
                let raw = &rest[..end];
                if (!lead.is_empty() && raw.contains(lead)) || (!trail.is_empty() && raw.contains(trail))
                {
                    return Err(Error::parse(format!(
                        "unexpected quote in identifier '{}'",
                        fqn
                    )));
                }
                part = raw.trim().to_owned();
                rest = &rest[end..];
            }

            if part.is_empty() {
                return Err(Error::parse(format!("empty name part in identifier '{}'", fqn)));
            }
            parts.push(part);

            if rest.is_empty() {
                break;
            }
            match rest.strip_prefix(delim) {
                Some(next) if !next.is_empty() => rest = next,
                _ => {
                    return Err(Error::parse(format!(
                        "malformed identifier '{}' near '{}'",
                        fqn, rest
                    )))
                }
            }
        }

        Ok(parts)
    }

    /// Create an expression builder using these rules
    pub fn expression_builder(&self, quote: QuoteMethod) -> ExpressionBuilder<'_> {
        ExpressionBuilder::new(self, quote)
    }
}

/// Escape a value for a single-quoted SQL string literal (`'` becomes `''`)
pub fn escape_string_literal(value: &str) -> String {
    if !value.contains('\'') {
        return value.to_string();
    }
    value.replace('\'', "''")
}

/// Accumulates SQL text for one statement.
///
/// Create a fresh builder for every statement; builders are not shared.
#[derive(Debug)]
pub struct ExpressionBuilder<'a> {
    rules: &'a IdentifierRules,
    quote: QuoteMethod,
    sql: String,
}

impl<'a> ExpressionBuilder<'a> {
    /// Create an empty builder
    pub fn new(rules: &'a IdentifierRules, quote: QuoteMethod) -> Self {
        Self {
            rules,
            quote,
            sql: String::with_capacity(128),
        }
    }

    /// Rules used for quoting
    #[inline]
    pub fn rules(&self) -> &IdentifierRules {
        self.rules
    }

    /// Append raw SQL text
    pub fn append(&mut self, text: impl fmt::Display) -> &mut Self {
        use std::fmt::Write;
        let _ = write!(self.sql, "{}", text);
        self
    }

    /// Append an identifier using the configured quoting policy
    pub fn append_identifier(&mut self, name: &str) -> &mut Self {
        let rendered = self.rules.render(name, self.quote);
        self.sql.push_str(&rendered);
        self
    }

    /// Append a table identifier, qualified with catalog and schema when present
    pub fn append_table(&mut self, table: &TableId) -> &mut Self {
        if let Some(catalog) = table.catalog_name() {
            self.append_identifier(catalog);
            self.sql.push_str(self.rules.delimiter());
        }
        if let Some(schema) = table.schema_name() {
            self.append_identifier(schema);
            self.sql.push_str(self.rules.delimiter());
        }
        self.append_identifier(table.table_name())
    }

    /// Append a column name (unqualified)
    pub fn append_column(&mut self, column: &ColumnId) -> &mut Self {
        self.append_identifier(column.name())
    }

    /// Append `items` separated by `delimiter`, rendering each with `f`
    pub fn append_list<I, T, F>(&mut self, delimiter: &str, items: I, mut f: F) -> &mut Self
    where
        I: IntoIterator<Item = T>,
        F: FnMut(&mut Self, T),
    {
        for (i, item) in items.into_iter().enumerate() {
            if i > 0 {
                self.sql.push_str(delimiter);
            }
            f(self, item);
        }
        self
    }

    /// Append `expr` `times` times separated by `delimiter`
    pub fn append_multiple(&mut self, delimiter: &str, expr: &str, times: usize) -> &mut Self {
        for i in 0..times {
            if i > 0 {
                self.sql.push_str(delimiter);
            }
            self.sql.push_str(expr);
        }
        self
    }

    /// Append a single-quoted string literal
    pub fn append_string_literal(&mut self, value: &str) -> &mut Self {
        self.sql.push('\'');
        self.sql.push_str(&escape_string_literal(value));
        self.sql.push('\'');
        self
    }

    /// SQL accumulated so far
    #[inline]
    pub fn as_str(&self) -> &str {
        &self.sql
    }

    /// Finish and return the SQL text
    pub fn build(self) -> String {
        self.sql
    }
}

impl fmt::Display for ExpressionBuilder<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.sql)
    }
}
