//! PostgreSQL backend
//!
//! Implements the connection contract on top of `tokio-postgres`:
//! - PgConnection: queries, prepared statements and autocommit control
//! - PgPreparedStatement: 1-based binding with typed NULLs and batching
//! - PgMetadata: catalog queries against `information_schema`
//!
//! Statements use `?` placeholders; they are rewritten to `$n` before they
//! reach the server.

use async_trait::async_trait;
use std::fmt::Write;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio_postgres::types::{Kind, ToSql, Type};
use tracing::{debug, error};

use crate::connection::{
    ColumnInfo, Connection, DatabaseMetadata, PreparedStatement, PrimaryKeyInfo, TableInfo,
};
use crate::driver::DriverInfo;
use crate::error::{Error, Result};
use crate::schema::NUMERIC_SCALE_UNSET;
use crate::types::{Nullability, ResultSet, ResultSetColumn, ResultSetMetadata, Row, SqlType, Value};

type BoxedParam = Box<dyn ToSql + Sync + Send>;

/// Rewrite `?` placeholders outside quoted text to `$1`, `$2`, ...
pub fn rewrite_placeholders(sql: &str) -> String {
    let mut out = String::with_capacity(sql.len() + 8);
    let mut quote: Option<char> = None;
    let mut n = 0;
    for c in sql.chars() {
        match quote {
            Some(q) => {
                if c == q {
                    quote = None;
                }
                out.push(c);
            }
            None if c == '\'' || c == '"' => {
                quote = Some(c);
                out.push(c);
            }
            None if c == '?' => {
                n += 1;
                let _ = write!(out, "${}", n);
            }
            None => out.push(c),
        }
    }
    out
}

/// Convert a value to a tokio-postgres parameter
fn value_to_sql(value: &Value) -> BoxedParam {
    match value {
        Value::Null => Box::new(Option::<String>::None),
        Value::Bool(b) => Box::new(*b),
        // no single-byte integer type on the server
        Value::Int8(n) => Box::new(i16::from(*n)),
        Value::Int16(n) => Box::new(*n),
        Value::Int32(n) => Box::new(*n),
        Value::Int64(n) => Box::new(*n),
        Value::Float32(n) => Box::new(*n),
        Value::Float64(n) => Box::new(*n),
        Value::Decimal(d) => Box::new(*d),
        Value::String(s) => Box::new(s.clone()),
        Value::Bytes(b) => Box::new(b.clone()),
        Value::Date(d) => Box::new(*d),
        Value::Time(t) => Box::new(*t),
        Value::DateTime(dt) => Box::new(*dt),
        Value::DateTimeTz(dt) => Box::new(*dt),
        Value::Uuid(u) => Box::new(*u),
        Value::Json(j) => Box::new(j.clone()),
        Value::Array(arr) => Box::new(serde_json::to_value(arr).unwrap_or_default()),
    }
}

/// NULL parameter typed by the column's SQL type
fn typed_null(sql_type: SqlType) -> BoxedParam {
    match sql_type {
        SqlType::Boolean | SqlType::Bit => Box::new(Option::<bool>::None),
        SqlType::TinyInt | SqlType::SmallInt => Box::new(Option::<i16>::None),
        SqlType::Integer => Box::new(Option::<i32>::None),
        SqlType::BigInt => Box::new(Option::<i64>::None),
        SqlType::Real => Box::new(Option::<f32>::None),
        SqlType::Float | SqlType::Double => Box::new(Option::<f64>::None),
        SqlType::Numeric | SqlType::Decimal => Box::new(Option::<rust_decimal::Decimal>::None),
        SqlType::Binary | SqlType::VarBinary | SqlType::LongVarBinary | SqlType::Blob => {
            Box::new(Option::<Vec<u8>>::None)
        }
        SqlType::Date => Box::new(Option::<chrono::NaiveDate>::None),
        SqlType::Time => Box::new(Option::<chrono::NaiveTime>::None),
        SqlType::Timestamp => Box::new(Option::<chrono::NaiveDateTime>::None),
        SqlType::TimestampWithTimezone => {
            Box::new(Option::<chrono::DateTime<chrono::Utc>>::None)
        }
        _ => Box::new(Option::<String>::None),
    }
}

fn param_refs(params: &[BoxedParam]) -> Vec<&(dyn ToSql + Sync)> {
    params
        .iter()
        .map(|b| b.as_ref() as &(dyn ToSql + Sync))
        .collect()
}

/// SQL type code of a server type
pub fn sql_type_for(pg_type: &Type) -> SqlType {
    match *pg_type {
        Type::BOOL => SqlType::Boolean,
        Type::INT2 => SqlType::SmallInt,
        Type::INT4 => SqlType::Integer,
        Type::INT8 => SqlType::BigInt,
        Type::FLOAT4 => SqlType::Real,
        Type::FLOAT8 => SqlType::Double,
        Type::NUMERIC => SqlType::Numeric,
        Type::VARCHAR | Type::TEXT | Type::NAME => SqlType::VarChar,
        Type::BPCHAR => SqlType::Char,
        Type::BYTEA => SqlType::Binary,
        Type::DATE => SqlType::Date,
        Type::TIME => SqlType::Time,
        Type::TIMETZ => SqlType::TimeWithTimezone,
        Type::TIMESTAMP => SqlType::Timestamp,
        Type::TIMESTAMPTZ => SqlType::TimestampWithTimezone,
        Type::BIT => SqlType::Bit,
        _ if matches!(pg_type.kind(), Kind::Array(_)) => SqlType::Array,
        _ => SqlType::Other,
    }
}

/// SQL type code of an `information_schema.columns.data_type` value
pub fn sql_type_for_data_type(data_type: &str) -> SqlType {
    match data_type.to_ascii_lowercase().as_str() {
        "boolean" => SqlType::Boolean,
        "smallint" => SqlType::SmallInt,
        "integer" => SqlType::Integer,
        "bigint" => SqlType::BigInt,
        "real" => SqlType::Real,
        "double precision" => SqlType::Double,
        "numeric" => SqlType::Numeric,
        "character varying" | "text" | "name" => SqlType::VarChar,
        "character" => SqlType::Char,
        "bytea" => SqlType::Binary,
        "date" => SqlType::Date,
        "time without time zone" => SqlType::Time,
        "time with time zone" => SqlType::TimeWithTimezone,
        "timestamp without time zone" => SqlType::Timestamp,
        "timestamp with time zone" => SqlType::TimestampWithTimezone,
        "bit" => SqlType::Bit,
        "array" => SqlType::Array,
        _ => SqlType::Other,
    }
}

fn get<'a, T>(row: &'a tokio_postgres::Row, idx: usize) -> Option<T>
where
    T: tokio_postgres::types::FromSql<'a>,
{
    row.try_get::<_, Option<T>>(idx).ok().flatten()
}

/// Convert one server value to a [`Value`]
fn pg_value_to_value(row: &tokio_postgres::Row, idx: usize, pg_type: &Type) -> Value {
    let value = match *pg_type {
        Type::BOOL => get(row, idx).map(Value::Bool),
        Type::INT2 => get(row, idx).map(Value::Int16),
        Type::INT4 => get(row, idx).map(Value::Int32),
        Type::INT8 => get(row, idx).map(Value::Int64),
        Type::FLOAT4 => get(row, idx).map(Value::Float32),
        Type::FLOAT8 => get(row, idx).map(Value::Float64),
        Type::NUMERIC => get(row, idx).map(Value::Decimal),
        Type::VARCHAR | Type::TEXT | Type::BPCHAR | Type::NAME => get(row, idx).map(Value::String),
        Type::BYTEA => get(row, idx).map(Value::Bytes),
        Type::DATE => get(row, idx).map(Value::Date),
        Type::TIME => get(row, idx).map(Value::Time),
        Type::TIMESTAMP => get(row, idx).map(Value::DateTime),
        Type::TIMESTAMPTZ => get(row, idx).map(Value::DateTimeTz),
        Type::UUID => get(row, idx).map(Value::Uuid),
        Type::JSON | Type::JSONB => get(row, idx).map(Value::Json),
        _ => get(row, idx).map(Value::String),
    };
    value.unwrap_or(Value::Null)
}

fn pg_row_to_row(pg_row: &tokio_postgres::Row) -> Row {
    let columns = pg_row.columns();
    Row::new(
        columns.iter().map(|c| c.name().to_string()).collect(),
        columns
            .iter()
            .enumerate()
            .map(|(i, c)| pg_value_to_value(pg_row, i, c.type_()))
            .collect(),
    )
}

fn result_set_metadata(columns: &[tokio_postgres::Column]) -> ResultSetMetadata {
    ResultSetMetadata::new(
        columns
            .iter()
            .map(|c| {
                let column = ResultSetColumn::new(c.name(), sql_type_for(c.type_()))
                    .with_type_name(c.type_().name());
                // the wire protocol does not carry numeric typmods
                if *c.type_() == Type::NUMERIC {
                    column.with_precision(0, NUMERIC_SCALE_UNSET)
                } else {
                    column
                }
            })
            .collect(),
    )
}

fn query_error(e: tokio_postgres::Error, sql: &str) -> Error {
    Error::query_with_sql(e.to_string(), sql)
}

/// PostgreSQL connection
pub struct PgConnection {
    client: Arc<tokio_postgres::Client>,
    metadata: PgMetadata,
    auto_commit: AtomicBool,
    closed: AtomicBool,
}

impl PgConnection {
    /// Wrap a connected client; autocommit starts enabled
    pub fn new(client: tokio_postgres::Client) -> Self {
        let client = Arc::new(client);
        Self {
            metadata: PgMetadata {
                client: Arc::clone(&client),
            },
            client,
            auto_commit: AtomicBool::new(true),
            closed: AtomicBool::new(false),
        }
    }

    /// Underlying client
    pub fn client(&self) -> &tokio_postgres::Client {
        &self.client
    }

    fn ensure_open(&self) -> Result<()> {
        if self.closed.load(Ordering::Relaxed) {
            return Err(Error::connection("connection is closed"));
        }
        Ok(())
    }

    async fn run(&self, sql: &str) -> Result<()> {
        self.ensure_open()?;
        self.client
            .batch_execute(sql)
            .await
            .map_err(|e| query_error(e, sql))
    }
}

#[async_trait]
impl Connection for PgConnection {
    async fn query(&self, sql: &str, params: &[Value]) -> Result<ResultSet> {
        self.ensure_open()?;
        let sql = rewrite_placeholders(sql);
        let statement = self
            .client
            .prepare(&sql)
            .await
            .map_err(|e| query_error(e, &sql))?;
        let boxed: Vec<BoxedParam> = params.iter().map(value_to_sql).collect();
        let rows = self
            .client
            .query(&statement, &param_refs(&boxed))
            .await
            .map_err(|e| query_error(e, &sql))?;
        Ok(ResultSet::new(
            result_set_metadata(statement.columns()),
            rows.iter().map(pg_row_to_row).collect(),
        ))
    }

    async fn execute(&self, sql: &str, params: &[Value]) -> Result<u64> {
        self.ensure_open()?;
        let sql = rewrite_placeholders(sql);
        let boxed: Vec<BoxedParam> = params.iter().map(value_to_sql).collect();
        self.client
            .execute(sql.as_str(), &param_refs(&boxed))
            .await
            .map_err(|e| query_error(e, &sql))
    }

    async fn prepare(&self, sql: &str) -> Result<Box<dyn PreparedStatement>> {
        self.ensure_open()?;
        let rewritten = rewrite_placeholders(sql);
        let statement = self
            .client
            .prepare(&rewritten)
            .await
            .map_err(|e| query_error(e, &rewritten))?;
        Ok(Box::new(PgPreparedStatement {
            client: Arc::clone(&self.client),
            statement,
            sql: sql.to_string(),
            params: Vec::new(),
            batch: Vec::new(),
        }))
    }

    fn auto_commit(&self) -> bool {
        self.auto_commit.load(Ordering::SeqCst)
    }

    async fn set_auto_commit(&self, auto_commit: bool) -> Result<()> {
        let previous = self.auto_commit.swap(auto_commit, Ordering::SeqCst);
        match (previous, auto_commit) {
            (true, false) => self.run("BEGIN").await,
            (false, true) => self.run("COMMIT").await,
            _ => Ok(()),
        }
    }

    async fn commit(&self) -> Result<()> {
        if self.auto_commit() {
            return Ok(());
        }
        self.run("COMMIT").await?;
        self.run("BEGIN").await
    }

    async fn rollback(&self) -> Result<()> {
        if self.auto_commit() {
            return Ok(());
        }
        self.run("ROLLBACK").await?;
        self.run("BEGIN").await
    }

    fn metadata(&self) -> &dyn DatabaseMetadata {
        &self.metadata
    }

    async fn is_valid(&self) -> bool {
        if self.closed.load(Ordering::Relaxed) {
            return false;
        }
        self.client.simple_query("SELECT 1").await.is_ok()
    }

    async fn close(&self) -> Result<()> {
        self.closed.store(true, Ordering::Relaxed);
        Ok(())
    }
}

enum Param {
    Value(Value),
    Null(SqlType),
}

impl Param {
    fn to_sql(&self) -> BoxedParam {
        match self {
            Self::Value(v) => value_to_sql(v),
            Self::Null(t) => typed_null(*t),
        }
    }
}

/// Prepared statement with positional binding
pub struct PgPreparedStatement {
    client: Arc<tokio_postgres::Client>,
    statement: tokio_postgres::Statement,
    sql: String,
    params: Vec<Param>,
    batch: Vec<Vec<Param>>,
}

impl PgPreparedStatement {
    fn set(&mut self, index: usize, param: Param) -> Result<()> {
        let expected = self.statement.params().len();
        if index == 0 || index > expected {
            return Err(Error::query_with_sql(
                format!("parameter index {} out of range 1..={}", index, expected),
                &self.sql,
            ));
        }
        while self.params.len() < index {
            self.params.push(Param::Value(Value::Null));
        }
        self.params[index - 1] = param;
        Ok(())
    }

    async fn run(&self, params: &[Param]) -> Result<u64> {
        let boxed: Vec<BoxedParam> = params.iter().map(Param::to_sql).collect();
        self.client
            .execute(&self.statement, &param_refs(&boxed))
            .await
            .map_err(|e| query_error(e, &self.sql))
    }
}

#[async_trait]
impl PreparedStatement for PgPreparedStatement {
    fn sql(&self) -> &str {
        &self.sql
    }

    fn bind(&mut self, index: usize, value: Value) -> Result<()> {
        self.set(index, Param::Value(value))
    }

    fn bind_null(&mut self, index: usize, sql_type: SqlType) -> Result<()> {
        self.set(index, Param::Null(sql_type))
    }

    fn clear_parameters(&mut self) {
        self.params.clear();
    }

    fn add_batch(&mut self) -> Result<()> {
        let params = std::mem::take(&mut self.params);
        self.batch.push(params);
        Ok(())
    }

    async fn execute(&mut self) -> Result<u64> {
        self.run(&self.params).await
    }

    async fn execute_batch(&mut self) -> Result<Vec<u64>> {
        let batch = std::mem::take(&mut self.batch);
        debug!("Executing batch of {} for '{}'", batch.len(), self.sql);
        let mut counts = Vec::with_capacity(batch.len());
        for params in &batch {
            counts.push(self.run(params).await?);
        }
        Ok(counts)
    }

    async fn query(&mut self) -> Result<ResultSet> {
        let boxed: Vec<BoxedParam> = self.params.iter().map(Param::to_sql).collect();
        let rows = self
            .client
            .query(&self.statement, &param_refs(&boxed))
            .await
            .map_err(|e| query_error(e, &self.sql))?;
        Ok(ResultSet::new(
            result_set_metadata(self.statement.columns()),
            rows.iter().map(pg_row_to_row).collect(),
        ))
    }
}

const TABLES_SQL: &str = "SELECT table_catalog::text, table_schema::text, table_name::text, table_type::text \
     FROM information_schema.tables \
     WHERE ($1::text IS NULL OR table_catalog = $1) \
     AND ($2::text IS NULL OR table_schema LIKE $2) \
     AND ($3::text IS NULL OR table_name LIKE $3) \
     ORDER BY table_schema, table_name";

const COLUMNS_SQL: &str = "SELECT table_catalog::text, table_schema::text, table_name::text, column_name::text, \
     data_type::text, udt_name::text, \
     COALESCE(character_maximum_length, numeric_precision, datetime_precision)::int4, \
     numeric_scale::int4, is_nullable::text, column_default::text, ordinal_position::int4, \
     (is_identity::text = 'YES' OR column_default::text LIKE 'nextval(%') \
     FROM information_schema.columns \
     WHERE ($1::text IS NULL OR table_catalog = $1) \
     AND ($2::text IS NULL OR table_schema LIKE $2) \
     AND ($3::text IS NULL OR table_name LIKE $3) \
     AND ($4::text IS NULL OR column_name LIKE $4) \
     ORDER BY table_schema, table_name, ordinal_position";

const PRIMARY_KEYS_SQL: &str = "SELECT kcu.table_catalog::text, kcu.table_schema::text, kcu.table_name::text, \
     kcu.column_name::text, kcu.ordinal_position::int4 \
     FROM information_schema.table_constraints tc \
     JOIN information_schema.key_column_usage kcu \
       ON tc.constraint_name = kcu.constraint_name \
      AND tc.table_schema = kcu.table_schema \
      AND tc.table_name = kcu.table_name \
     WHERE tc.constraint_type = 'PRIMARY KEY' \
     AND kcu.table_name = $3 \
     AND ($1::text IS NULL OR kcu.table_catalog = $1) \
     AND ($2::text IS NULL OR kcu.table_schema = $2) \
     ORDER BY kcu.ordinal_position";

/// `information_schema` names `BASE TABLE` what the metadata contract calls `TABLE`
fn table_type_name(raw: &str) -> String {
    match raw {
        "BASE TABLE" => "TABLE".to_string(),
        "LOCAL TEMPORARY" => "TEMPORARY TABLE".to_string(),
        "FOREIGN" => "FOREIGN TABLE".to_string(),
        other => other.to_string(),
    }
}

/// Catalog metadata read from `information_schema`
pub struct PgMetadata {
    client: Arc<tokio_postgres::Client>,
}

impl PgMetadata {
    async fn rows(
        &self,
        sql: &str,
        params: &[&(dyn ToSql + Sync)],
    ) -> Result<Vec<tokio_postgres::Row>> {
        self.client
            .query(sql, params)
            .await
            .map_err(|e| query_error(e, sql))
    }
}

#[async_trait]
impl DatabaseMetadata for PgMetadata {
    async fn tables(
        &self,
        catalog: Option<&str>,
        schema_pattern: Option<&str>,
        table_pattern: Option<&str>,
        types: &[String],
    ) -> Result<Vec<TableInfo>> {
        let rows = self
            .rows(TABLES_SQL, &[&catalog, &schema_pattern, &table_pattern])
            .await?;
        Ok(rows
            .iter()
            .map(|r| TableInfo {
                catalog: get(r, 0),
                schema: get(r, 1),
                name: get(r, 2).unwrap_or_default(),
                table_type: table_type_name(&get::<String>(r, 3).unwrap_or_default()),
            })
            .filter(|t| types.is_empty() || types.iter().any(|ty| ty.eq_ignore_ascii_case(&t.table_type)))
            .collect())
    }

    async fn table_types(&self) -> Result<Vec<String>> {
        Ok(["TABLE", "VIEW", "FOREIGN TABLE", "TEMPORARY TABLE"]
            .into_iter()
            .map(String::from)
            .collect())
    }

    async fn columns(
        &self,
        catalog: Option<&str>,
        schema_pattern: Option<&str>,
        table_pattern: Option<&str>,
        column_pattern: Option<&str>,
    ) -> Result<Vec<ColumnInfo>> {
        let rows = self
            .rows(
                COLUMNS_SQL,
                &[&catalog, &schema_pattern, &table_pattern, &column_pattern],
            )
            .await?;
        Ok(rows
            .iter()
            .map(|r| {
                let data_type: String = get(r, 4).unwrap_or_default();
                let mut info = ColumnInfo::new(
                    get::<String>(r, 2).unwrap_or_default(),
                    get::<String>(r, 3).unwrap_or_default(),
                    sql_type_for_data_type(&data_type),
                );
                info.catalog = get(r, 0);
                info.schema = get(r, 1);
                info.type_name = get(r, 5).unwrap_or(data_type);
                info.column_size = get(r, 6).unwrap_or(0);
                info.decimal_digits = get(r, 7).unwrap_or(NUMERIC_SCALE_UNSET);
                info.nullability = match get::<String>(r, 8).as_deref() {
                    Some("YES") => Nullability::Nullable,
                    Some("NO") => Nullability::NotNull,
                    _ => Nullability::Unknown,
                };
                info.default = get(r, 9);
                info.ordinal = get::<i32>(r, 10).map(|o| o.max(0) as usize).unwrap_or(0);
                info.auto_increment = get(r, 11).unwrap_or(false);
                info
            })
            .collect())
    }

    async fn primary_keys(
        &self,
        catalog: Option<&str>,
        schema: Option<&str>,
        table: &str,
    ) -> Result<Vec<PrimaryKeyInfo>> {
        let rows = self
            .rows(PRIMARY_KEYS_SQL, &[&catalog, &schema, &table])
            .await?;
        Ok(rows
            .iter()
            .map(|r| PrimaryKeyInfo {
                catalog: get(r, 0),
                schema: get(r, 1),
                table: get(r, 2).unwrap_or_default(),
                column: get(r, 3).unwrap_or_default(),
                key_seq: get::<i32>(r, 4)
                    .and_then(|s| u16::try_from(s).ok())
                    .unwrap_or(0),
            })
            .collect())
    }

    async fn driver_info(&self) -> Result<DriverInfo> {
        let sql = "SHOW server_version";
        let row = self
            .client
            .query_one(sql, &[])
            .await
            .map_err(|e| query_error(e, sql))?;
        Ok(DriverInfo {
            product_name: Some("PostgreSQL".to_string()),
            product_version: get(&row, 0),
            driver_name: Some("tokio-postgres".to_string()),
            major_version: 0,
            minor_version: 7,
        })
    }

    fn identifier_quote(&self) -> Option<String> {
        Some("\"".to_string())
    }
}

/// Connect to PostgreSQL; a leading `jdbc:` is ignored
pub async fn connect(url: &str) -> Result<PgConnection> {
    let url = url.strip_prefix("jdbc:").unwrap_or(url);
    let (client, connection) = tokio_postgres::connect(url, tokio_postgres::NoTls)
        .await
        .map_err(|e| Error::connection_with_source("failed to connect", e))?;

    tokio::spawn(async move {
        if let Err(e) = connection.await {
            error!("PostgreSQL connection error: {}", e);
        }
    });

    Ok(PgConnection::new(client))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rewrite_placeholders() {
        assert_eq!(
            rewrite_placeholders(r#"INSERT INTO "t" ("a","b") VALUES (?,?::jsonb)"#),
            r#"INSERT INTO "t" ("a","b") VALUES ($1,$2::jsonb)"#
        );
        assert_eq!(
            rewrite_placeholders("SELECT '?', \"q?\" FROM t WHERE a = ? AND b = 'it''s?'"),
            "SELECT '?', \"q?\" FROM t WHERE a = $1 AND b = 'it''s?'"
        );
    }

    #[test]
    fn test_sql_type_mapping() {
        assert_eq!(sql_type_for(&Type::INT4), SqlType::Integer);
        assert_eq!(sql_type_for(&Type::TIMESTAMPTZ), SqlType::TimestampWithTimezone);
        assert_eq!(sql_type_for(&Type::UUID), SqlType::Other);
        assert_eq!(sql_type_for(&Type::INT4_ARRAY), SqlType::Array);
        assert_eq!(sql_type_for_data_type("character varying"), SqlType::VarChar);
        assert_eq!(sql_type_for_data_type("jsonb"), SqlType::Other);
    }

    #[test]
    fn test_table_type_names() {
        assert_eq!(table_type_name("BASE TABLE"), "TABLE");
        assert_eq!(table_type_name("VIEW"), "VIEW");
    }

    #[test]
    fn test_value_conversion() {
        let _ = value_to_sql(&Value::Int8(4));
        let _ = value_to_sql(&Value::Array(vec![Value::Int32(1)]));
        let _ = typed_null(SqlType::Timestamp);
    }
}
