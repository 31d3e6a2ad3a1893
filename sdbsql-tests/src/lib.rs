/// Test utilities and helpers for sdbsql testing
///
/// Provides a connection over a fresh in-memory store, a store wrapper that
/// injects failures and counts calls, and row generators.

use async_trait::async_trait;
use parking_lot::Mutex;
use sdbsql_api::{Connection, ConnectionConfig, MemoryStore, MemoryStoreConfig, Rows, Value};
use sdbsql_core::store::{
    Attribute, AttributeStore, DeleteAttributesRequest, GetAttributesRequest,
    PutAttributesRequest, SelectPage, SelectRequest, StoreError, StoreResult,
};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

/// Store operations that can be counted and faulted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    CreateDomain,
    DeleteDomain,
    GetAttributes,
    PutAttributes,
    DeleteAttributes,
    Select,
}

/// Wraps a store, failing or delaying chosen operations
pub struct FaultyStore {
    inner: Arc<dyn AttributeStore>,
    faults: Mutex<HashMap<Operation, StoreError>>,
    delays: Mutex<HashMap<Operation, Duration>>,
    calls: Mutex<HashMap<Operation, usize>>,
}

impl FaultyStore {
    pub fn new(inner: Arc<dyn AttributeStore>) -> Self {
        Self {
            inner,
            faults: Mutex::new(HashMap::new()),
            delays: Mutex::new(HashMap::new()),
            calls: Mutex::new(HashMap::new()),
        }
    }

    /// Fail every call to `op` with `code` until cleared
    pub fn fail(&self, op: Operation, code: &str) {
        self.faults
            .lock()
            .insert(op, StoreError::new(code, format!("injected {:?} failure", op)));
    }

    pub fn clear(&self, op: Operation) {
        self.faults.lock().remove(&op);
        self.delays.lock().remove(&op);
    }

    /// Sleep before forwarding each call to `op`
    pub fn delay(&self, op: Operation, delay: Duration) {
        self.delays.lock().insert(op, delay);
    }

    /// Number of calls made to `op`, including failed ones
    pub fn calls(&self, op: Operation) -> usize {
        self.calls.lock().get(&op).copied().unwrap_or(0)
    }

    async fn enter(&self, op: Operation) -> StoreResult<()> {
        *self.calls.lock().entry(op).or_default() += 1;

        let delay = self.delays.lock().get(&op).copied();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        match self.faults.lock().get(&op) {
            Some(err) => Err(err.clone()),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl AttributeStore for FaultyStore {
    async fn create_domain(&self, domain: &str) -> StoreResult<()> {
        self.enter(Operation::CreateDomain).await?;
        self.inner.create_domain(domain).await
    }

    async fn delete_domain(&self, domain: &str) -> StoreResult<()> {
        self.enter(Operation::DeleteDomain).await?;
        self.inner.delete_domain(domain).await
    }

    async fn get_attributes(&self, request: GetAttributesRequest) -> StoreResult<Vec<Attribute>> {
        self.enter(Operation::GetAttributes).await?;
        self.inner.get_attributes(request).await
    }

    async fn put_attributes(&self, request: PutAttributesRequest) -> StoreResult<()> {
        self.enter(Operation::PutAttributes).await?;
        self.inner.put_attributes(request).await
    }

    async fn delete_attributes(&self, request: DeleteAttributesRequest) -> StoreResult<()> {
        self.enter(Operation::DeleteAttributes).await?;
        self.inner.delete_attributes(request).await
    }

    async fn select(&self, request: SelectRequest) -> StoreResult<SelectPage> {
        self.enter(Operation::Select).await?;
        self.inner.select(request).await
    }
}

/// Connection over a fresh in-memory store, optionally behind a
/// [`FaultyStore`]
pub struct TestConnection {
    pub conn: Connection,
    pub store: MemoryStore,
    pub faults: Arc<FaultyStore>,
}

impl TestConnection {
    /// Create a connection with default settings
    pub fn new() -> Self {
        Self::with_configs(MemoryStoreConfig::default(), ConnectionConfig::default())
    }

    /// Create a connection whose store returns `page_size` items per select
    pub fn with_page_size(page_size: usize) -> Self {
        Self::with_configs(
            MemoryStoreConfig::default().with_page_size(page_size),
            ConnectionConfig::default(),
        )
    }

    pub fn with_configs(store_config: MemoryStoreConfig, config: ConnectionConfig) -> Self {
        let store = MemoryStore::with_config(store_config);
        let faults = Arc::new(FaultyStore::new(Arc::new(store.clone())));
        let conn = Connection::with_config(faults.clone(), config);
        Self { conn, store, faults }
    }

    /// Create a table, panicking on failure
    pub async fn create_table(&self, table: &str) {
        self.conn
            .execute(&format!("create table {}", table), &[])
            .await
            .expect("Failed to create table");
    }

    /// Run a select and collect every row
    pub async fn rows(&self, sql: &str, args: &[Value]) -> Vec<Vec<Value>> {
        self.conn
            .query(sql, args)
            .await
            .expect("Failed to run query")
            .collect()
            .await
            .expect("Failed to read rows")
    }
}

impl Default for TestConnection {
    fn default() -> Self {
        Self::new()
    }
}

/// Generates user rows `(id, name, age)` with predictable contents
pub struct MockRowGenerator {
    counter: u64,
}

impl MockRowGenerator {
    pub fn new() -> Self {
        Self { counter: 0 }
    }

    /// Arguments for `insert into <t> (id, name, age) values (?, ?, ?)`
    pub fn next_args(&mut self) -> Vec<Value> {
        let idx = self.counter;
        self.counter += 1;
        vec![
            Value::from(format!("ID{:04}", idx)),
            Value::from(format!("user{}", idx)),
            Value::Int(20 + (idx % 50) as i64),
        ]
    }
}

impl Default for MockRowGenerator {
    fn default() -> Self {
        Self::new()
    }
}

/// Insert `count` generated users into `table`
pub async fn insert_users(conn: &Connection, table: &str, count: usize) {
    let sql = format!("insert into {} (id, name, age) values (?, ?, ?)", table);
    let mut gen = MockRowGenerator::new();
    for _ in 0..count {
        conn.execute(&sql, &gen.next_args()).await.expect("Failed to insert");
    }
}

/// Drain a cursor one row at a time through a reused destination slice
pub async fn drain(mut rows: Rows) -> Vec<Vec<Value>> {
    let mut dest = vec![Value::Null; rows.columns().len()];
    let mut out = Vec::new();
    while rows.next(&mut dest).await.expect("Failed to read row") {
        out.push(dest.clone());
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use sdbsql_core::store::codes;

    #[tokio::test]
    async fn test_connection_helper() {
        let test = TestConnection::new();
        test.create_table("users").await;
        insert_users(&test.conn, "users", 3).await;

        let rows = test.rows("select id from users", &[]).await;
        assert_eq!(rows.len(), 3);
        assert_eq!(test.store.item_count("users"), Some(3));
    }

    #[test]
    fn test_mock_generator() {
        let mut gen = MockRowGenerator::new();
        let first = gen.next_args();
        let second = gen.next_args();
        assert_eq!(first[0], Value::from("ID0000"));
        assert_ne!(first, second);
    }

    #[tokio::test]
    async fn test_faulty_store_counts_and_fails() {
        let test = TestConnection::new();
        test.faults.fail(Operation::CreateDomain, codes::SERVICE_UNAVAILABLE);

        let err = test.conn.execute("create table t", &[]).await.unwrap_err();
        assert_eq!(err.store_code(), Some(codes::SERVICE_UNAVAILABLE));
        assert_eq!(test.faults.calls(Operation::CreateDomain), 1);

        test.faults.clear(Operation::CreateDomain);
        test.create_table("t").await;
        assert_eq!(test.faults.calls(Operation::CreateDomain), 2);
        assert_eq!(test.store.domain_names(), vec!["t".to_string()]);
    }
}
