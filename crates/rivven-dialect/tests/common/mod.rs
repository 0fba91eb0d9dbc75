//! In-memory connection used by the integration tests

#![allow(dead_code)]

use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use rivven_dialect::connection::{
    ColumnInfo, Connection, DatabaseMetadata, PreparedStatement, PrimaryKeyInfo, TableInfo,
};
use rivven_dialect::driver::DriverInfo;
use rivven_dialect::types::{Nullability, ResultSet, SqlType, Value};
use rivven_dialect::{Error, Result};

/// A bound parameter
#[derive(Debug, Clone, PartialEq)]
pub enum Bound {
    Value(Value),
    Null(SqlType),
}

impl Bound {
    pub fn value(&self) -> Option<&Value> {
        match self {
            Self::Value(v) => Some(v),
            Self::Null(_) => None,
        }
    }
}

/// Prepared statement that records what was bound
#[derive(Debug, Default)]
pub struct MockStatement {
    pub sql: String,
    pub params: BTreeMap<usize, Bound>,
    pub batches: Vec<BTreeMap<usize, Bound>>,
    pub fetch_size: Option<u32>,
    pub max_params: Option<usize>,
    /// Fetch sizes seen by every statement prepared on the same connection
    pub fetch_log: Option<Arc<Mutex<Vec<u32>>>>,
}

impl MockStatement {
    pub fn new(sql: impl Into<String>) -> Self {
        Self {
            sql: sql.into(),
            ..Default::default()
        }
    }

    /// Reject indices above `max`, like a driver that parsed the SQL
    pub fn with_max_params(mut self, max: usize) -> Self {
        self.max_params = Some(max);
        self
    }

    /// Values of the current parameters in index order; NULLs as `Value::Null`
    pub fn values(&self) -> Vec<Value> {
        self.params
            .values()
            .map(|b| b.value().cloned().unwrap_or(Value::Null))
            .collect()
    }

    fn check_index(&self, index: usize) -> Result<()> {
        if index == 0 || self.max_params.is_some_and(|max| index > max) {
            return Err(Error::query(format!("parameter index {} out of range", index)));
        }
        Ok(())
    }
}

#[async_trait]
impl PreparedStatement for MockStatement {
    fn sql(&self) -> &str {
        &self.sql
    }

    fn bind(&mut self, index: usize, value: Value) -> Result<()> {
        self.check_index(index)?;
        self.params.insert(index, Bound::Value(value));
        Ok(())
    }

    fn bind_null(&mut self, index: usize, sql_type: SqlType) -> Result<()> {
        self.check_index(index)?;
        self.params.insert(index, Bound::Null(sql_type));
        Ok(())
    }

    fn clear_parameters(&mut self) {
        self.params.clear();
    }

    fn add_batch(&mut self) -> Result<()> {
        self.batches.push(std::mem::take(&mut self.params));
        Ok(())
    }

    fn set_fetch_size(&mut self, rows: u32) {
        self.fetch_size = Some(rows);
        if let Some(log) = &self.fetch_log {
            log.lock().unwrap().push(rows);
        }
    }

    async fn execute(&mut self) -> Result<u64> {
        Ok(1)
    }

    async fn execute_batch(&mut self) -> Result<Vec<u64>> {
        Ok(std::mem::take(&mut self.batches).iter().map(|_| 1).collect())
    }

    async fn query(&mut self) -> Result<ResultSet> {
        Ok(ResultSet::default())
    }
}

/// Catalog served by [`MockConnection`]
#[derive(Debug, Default)]
pub struct MockMetadata {
    pub tables: Vec<TableInfo>,
    pub table_types: Vec<String>,
    pub columns: Vec<ColumnInfo>,
    pub primary_keys: Vec<PrimaryKeyInfo>,
    pub driver: DriverInfo,
    pub fail_catalog: bool,
    pub catalog_calls: AtomicUsize,
}

fn matches(pattern: Option<&str>, value: Option<&str>) -> bool {
    match pattern {
        None | Some("%") => true,
        Some(p) => value == Some(p),
    }
}

#[async_trait]
impl DatabaseMetadata for MockMetadata {
    async fn tables(
        &self,
        catalog: Option<&str>,
        schema_pattern: Option<&str>,
        table_pattern: Option<&str>,
        types: &[String],
    ) -> Result<Vec<TableInfo>> {
        self.catalog_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_catalog {
            return Err(Error::connection("permission denied for catalog"));
        }
        Ok(self
            .tables
            .iter()
            .filter(|t| matches(catalog, t.catalog.as_deref()))
            .filter(|t| matches(schema_pattern, t.schema.as_deref()))
            .filter(|t| matches(table_pattern, Some(&t.name)))
            .filter(|t| types.is_empty() || types.iter().any(|ty| *ty == t.table_type))
            .cloned()
            .collect())
    }

    async fn table_types(&self) -> Result<Vec<String>> {
        Ok(self.table_types.clone())
    }

    async fn columns(
        &self,
        catalog: Option<&str>,
        schema_pattern: Option<&str>,
        table_pattern: Option<&str>,
        column_pattern: Option<&str>,
    ) -> Result<Vec<ColumnInfo>> {
        if self.fail_catalog {
            return Err(Error::connection("permission denied for catalog"));
        }
        Ok(self
            .columns
            .iter()
            .filter(|c| matches(catalog, c.catalog.as_deref()))
            .filter(|c| matches(schema_pattern, c.schema.as_deref()))
            .filter(|c| matches(table_pattern, Some(&c.table)))
            .filter(|c| matches(column_pattern, Some(&c.name)))
            .cloned()
            .collect())
    }

    async fn primary_keys(
        &self,
        catalog: Option<&str>,
        schema: Option<&str>,
        table: &str,
    ) -> Result<Vec<PrimaryKeyInfo>> {
        Ok(self
            .primary_keys
            .iter()
            .filter(|k| matches(catalog, k.catalog.as_deref()))
            .filter(|k| matches(schema, k.schema.as_deref()))
            .filter(|k| k.table == table)
            .cloned()
            .collect())
    }

    async fn driver_info(&self) -> Result<DriverInfo> {
        Ok(self.driver.clone())
    }

    fn identifier_quote(&self) -> Option<String> {
        Some("\"".to_string())
    }
}

/// Connection over a [`MockMetadata`] catalog with canned query results
pub struct MockConnection {
    pub metadata: MockMetadata,
    pub results: Mutex<HashMap<String, ResultSet>>,
    pub executed: Mutex<Vec<String>>,
    pub auto_commit: AtomicBool,
    pub commits: AtomicUsize,
    pub fetch_sizes: Arc<Mutex<Vec<u32>>>,
}

impl MockConnection {
    pub fn new(metadata: MockMetadata) -> Self {
        Self {
            metadata,
            results: Mutex::new(HashMap::new()),
            executed: Mutex::new(Vec::new()),
            auto_commit: AtomicBool::new(true),
            commits: AtomicUsize::new(0),
            fetch_sizes: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Serve `result` for queries with exactly this SQL
    pub fn with_result(self, sql: impl Into<String>, result: ResultSet) -> Self {
        self.results.lock().unwrap().insert(sql.into(), result);
        self
    }

    pub fn executed(&self) -> Vec<String> {
        self.executed.lock().unwrap().clone()
    }
}

#[async_trait]
impl Connection for MockConnection {
    async fn query(&self, sql: &str, _params: &[Value]) -> Result<ResultSet> {
        self.results
            .lock()
            .unwrap()
            .get(sql)
            .cloned()
            .ok_or_else(|| Error::query_with_sql("no canned result", sql))
    }

    async fn execute(&self, sql: &str, _params: &[Value]) -> Result<u64> {
        self.executed.lock().unwrap().push(sql.to_string());
        Ok(0)
    }

    async fn prepare(&self, sql: &str) -> Result<Box<dyn PreparedStatement>> {
        let mut statement = MockStatement::new(sql);
        statement.fetch_log = Some(Arc::clone(&self.fetch_sizes));
        Ok(Box::new(statement))
    }

    fn auto_commit(&self) -> bool {
        self.auto_commit.load(Ordering::SeqCst)
    }

    async fn set_auto_commit(&self, auto_commit: bool) -> Result<()> {
        self.auto_commit.store(auto_commit, Ordering::SeqCst);
        Ok(())
    }

    async fn commit(&self) -> Result<()> {
        self.commits.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn rollback(&self) -> Result<()> {
        Ok(())
    }

    fn metadata(&self) -> &dyn DatabaseMetadata {
        &self.metadata
    }

    async fn is_valid(&self) -> bool {
        true
    }

    async fn close(&self) -> Result<()> {
        Ok(())
    }
}

pub fn table_info(schema: Option<&str>, name: &str, table_type: &str) -> TableInfo {
    TableInfo {
        catalog: None,
        schema: schema.map(str::to_owned),
        name: name.to_string(),
        table_type: table_type.to_string(),
    }
}

pub fn column_info(
    schema: Option<&str>,
    table: &str,
    name: &str,
    sql_type: SqlType,
    ordinal: usize,
) -> ColumnInfo {
    let mut info = ColumnInfo::new(table, name, sql_type);
    info.schema = schema.map(str::to_owned);
    info.nullability = Nullability::Nullable;
    info.ordinal = ordinal;
    info
}

pub fn primary_key(schema: Option<&str>, table: &str, column: &str, key_seq: u16) -> PrimaryKeyInfo {
    PrimaryKeyInfo {
        catalog: None,
        schema: schema.map(str::to_owned),
        table: table.to_string(),
        column: column.to_string(),
        key_seq,
    }
}

/// The `public.accounts` table: id INTEGER PRIMARY KEY, name VARCHAR(50), balance DECIMAL(10,2)
pub fn accounts_metadata() -> MockMetadata {
    let mut id = column_info(Some("public"), "accounts", "id", SqlType::Integer, 1);
    id.nullability = Nullability::NotNull;
    id.column_size = 10;
    let mut name = column_info(Some("public"), "accounts", "name", SqlType::VarChar, 2);
    name.column_size = 50;
    let mut balance = column_info(Some("public"), "accounts", "balance", SqlType::Decimal, 3);
    balance.column_size = 10;
    balance.decimal_digits = 2;

    MockMetadata {
        tables: vec![
            table_info(Some("public"), "accounts", "TABLE"),
            table_info(Some("public"), "account_view", "VIEW"),
            table_info(Some("pg_catalog"), "pg_class", "TABLE"),
        ],
        table_types: vec!["TABLE".to_string(), "VIEW".to_string()],
        // listed out of order on purpose
        columns: vec![balance, id, name],
        primary_keys: vec![primary_key(Some("public"), "accounts", "id", 1)],
        driver: DriverInfo {
            product_name: Some("PostgreSQL".to_string()),
            product_version: Some("16.2".to_string()),
            driver_name: Some("mock".to_string()),
            major_version: 4,
            minor_version: 2,
        },
        ..Default::default()
    }
}
