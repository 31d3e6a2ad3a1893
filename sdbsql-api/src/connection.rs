/// Statement execution against an attribute store
///
/// A [`Connection`] parses each statement, binds its arguments, issues the
/// store requests and interprets the responses. Parsing and binding finish
/// before the first request is sent, so a bad statement never causes a
/// partial write.

use crate::rows::Rows;
use crate::translate::{key_lookup, select_expression, WriteSet};
use sdbsql_core::parse::{
    parse, CreateTableStatement, DeleteStatement, DropTableStatement, InsertStatement, Key,
    Lexeme, SelectStatement, Statement, UpdateStatement, WhereClause,
};
use sdbsql_core::store::{
    codes, AttributeStore, DeleteAttributesRequest, PutAttributesRequest, StoreItem, StoreResult,
};
use sdbsql_core::{ConnectionConfig, Error, Result, Value};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::{JoinError, JoinSet};
use tracing::debug;

/// Run a store call under an optional deadline. The outer result reports
/// the deadline, the inner one the store's answer.
pub(crate) async fn with_deadline<T, F>(
    timeout: Option<Duration>,
    operation: &str,
    call: F,
) -> Result<StoreResult<T>>
where
    F: Future<Output = StoreResult<T>>,
{
    match timeout {
        None => Ok(call.await),
        Some(limit) => tokio::time::timeout(limit, call).await.map_err(|_| {
            Error::Canceled(format!("{} did not complete within {:?}", operation, limit))
        }),
    }
}

/// Outcome of a non-select statement
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExecResult {
    rows_affected: Option<u64>,
}

impl ExecResult {
    fn new(rows_affected: Option<u64>) -> Self {
        Self { rows_affected }
    }

    /// Number of rows changed, or None when the store cannot tell (delete)
    pub fn rows_affected(&self) -> Option<u64> {
        self.rows_affected
    }

    /// Items are keyed by name; there is no generated id to report
    pub fn last_insert_id(&self) -> Result<i64> {
        Err(Error::Unsupported("last insert id".into()))
    }
}

/// Executes sdbsql statements against an [`AttributeStore`].
///
/// Cloning is cheap; clones share the store handle and configuration.
///
/// # Examples
///
/// ```
/// use sdbsql_api::{Connection, MemoryStore, Value};
/// use std::sync::Arc;
///
/// # tokio_test::block_on(async {
/// let conn = Connection::new(Arc::new(MemoryStore::new()));
/// conn.execute("create table users", &[]).await.unwrap();
/// conn.execute(
///     "insert into users(id, name, age) values(?, ?, ?)",
///     &[Value::from("u1"), Value::from("Alice"), Value::Int(30)],
/// )
/// .await
/// .unwrap();
///
/// let mut rows = conn
///     .query("select id, age from users where name = ?", &[Value::from("Alice")])
///     .await
///     .unwrap();
/// assert_eq!(
///     rows.next_row().await.unwrap(),
///     Some(vec![Value::from("u1"), Value::Int(30)])
/// );
/// # });
/// ```
#[derive(Clone)]
pub struct Connection {
    store: Arc<dyn AttributeStore>,
    config: Arc<ConnectionConfig>,
}

impl Connection {
    /// Create a connection with default configuration
    pub fn new(store: Arc<dyn AttributeStore>) -> Self {
        Self::with_config(store, ConnectionConfig::default())
    }

    /// Create a connection with custom configuration
    pub fn with_config(store: Arc<dyn AttributeStore>, config: ConnectionConfig) -> Self {
        Self {
            store,
            config: Arc::new(config),
        }
    }

    pub fn config(&self) -> &ConnectionConfig {
        &self.config
    }

    /// Run a select statement
    pub async fn query(&self, sql: &str, args: &[Value]) -> Result<Rows> {
        let stmt = match parse(sql)? {
            Statement::Select(stmt) => stmt,
            _ => {
                return Err(Error::InvalidQuery(
                    "expected select statement for query".into(),
                ))
            }
        };

        match &stmt.where_clause {
            WhereClause::Key(key) => self.get_item(&stmt, key, args).await,
            WhereClause::Raw(tail) => self.select_items(&stmt, Some(tail.as_slice()), args).await,
            WhereClause::None => self.select_items(&stmt, None, args).await,
        }
    }

    /// Run any statement other than select
    pub async fn execute(&self, sql: &str, args: &[Value]) -> Result<ExecResult> {
        match parse(sql)? {
            Statement::Select(_) => Err(Error::InvalidQuery(
                "unexpected select statement for execute".into(),
            )),
            Statement::Insert(stmt) => self.insert_row(stmt, args).await,
            Statement::Update(stmt) => self.update_row(stmt, args).await,
            Statement::Delete(stmt) => self.delete_row(stmt, args).await,
            Statement::CreateTable(stmt) => self.create_table(stmt).await,
            Statement::DropTable(stmt) => self.drop_table(stmt).await,
        }
    }

    /// Prepared statements are not supported
    pub fn prepare(&self, _sql: &str) -> Result<Statement> {
        Err(Error::Unsupported("prepare".into()))
    }

    /// Transactions are not supported
    pub fn begin(&self) -> Result<()> {
        Err(Error::Unsupported("transactions".into()))
    }

    fn timeout(&self) -> Option<Duration> {
        self.config.request_timeout
    }

    async fn get_item(&self, stmt: &SelectStatement, key: &Key, args: &[Value]) -> Result<Rows> {
        let item_name = key.item_name(args)?;
        let domain = self.config.domain_name(&stmt.table_name);
        let request = key_lookup(&stmt.column_names, &domain, &item_name, stmt.consistent_read);

        debug!(
            domain = %domain,
            item = %item_name,
            attributes = request.attribute_names.len(),
            consistent = stmt.consistent_read,
            "get attributes"
        );
        let attributes = with_deadline(self.timeout(), "get attributes", self.store.get_attributes(request))
            .await?
            .map_err(|e| {
                Error::store("cannot get item", e)
                    .with_field("itemName", item_name.clone())
                    .with_field("table", stmt.table_name.clone())
                    .with_field("domain", domain.clone())
            })?;

        let item = (!attributes.is_empty()).then(|| StoreItem {
            name: item_name,
            attributes,
        });
        Ok(Rows::single(stmt.column_names.clone(), item))
    }

    async fn select_items(
        &self,
        stmt: &SelectStatement,
        tail: Option<&[Lexeme]>,
        args: &[Value],
    ) -> Result<Rows> {
        let domain = self.config.domain_name(&stmt.table_name);
        let expression = select_expression(&stmt.column_names, &domain, tail, args)?;

        Rows::select(
            self.store.clone(),
            stmt.column_names.clone(),
            expression,
            stmt.consistent_read,
            self.timeout(),
            stmt.table_name.clone(),
            domain,
        )
        .await
    }

    async fn insert_row(&self, stmt: InsertStatement, args: &[Value]) -> Result<ExecResult> {
        let item_name = stmt.key.item_name(args)?;
        let set = WriteSet::build(&stmt.columns, args)?;
        let domain = self.config.domain_name(&stmt.table_name);
        let request = set.insert_request(&domain, &item_name);

        debug!(
            domain = %domain,
            item = %item_name,
            attributes = request.attributes.len(),
            "put attributes (insert)"
        );
        match with_deadline(self.timeout(), "put attributes", self.store.put_attributes(request)).await? {
            Ok(()) => Ok(ExecResult::new(Some(1))),
            Err(e) if e.has_code(codes::CONDITIONAL_CHECK_FAILED) => Err(Error::DuplicateKey {
                table: stmt.table_name,
                item_name,
            }),
            Err(e) => Err(Error::store("cannot put attributes", e)
                .with_field("itemName", item_name)
                .with_field("table", stmt.table_name)
                .with_field("domain", domain)),
        }
    }

    /// Put and delete run as separate tasks. The row count is 1 if either
    /// found the item. The first real failure is returned and the other
    /// task is aborted.
    async fn update_row(&self, stmt: UpdateStatement, args: &[Value]) -> Result<ExecResult> {
        let item_name = stmt.key.item_name(args)?;
        let set = WriteSet::build(&stmt.columns, args)?;
        let domain = self.config.domain_name(&stmt.table_name);
        let (put, delete) = set.update_requests(&domain, &item_name, stmt.upsert);

        debug!(
            domain = %domain,
            item = %item_name,
            puts = put.as_ref().map_or(0, |r| r.attributes.len()),
            deletes = delete.as_ref().map_or(0, |r| r.attribute_names.len()),
            upsert = stmt.upsert,
            "update attributes"
        );

        let mut branches = JoinSet::new();
        if let Some(request) = put {
            let store = self.store.clone();
            let timeout = self.timeout();
            let table = stmt.table_name.clone();
            branches.spawn(async move { put_branch(store, request, timeout, table).await });
        }
        if let Some(request) = delete {
            let store = self.store.clone();
            let timeout = self.timeout();
            let table = stmt.table_name.clone();
            branches.spawn(async move { delete_branch(store, request, timeout, table).await });
        }

        let mut found = false;
        while let Some(joined) = branches.join_next().await {
            match joined.map_err(join_error).and_then(|outcome| outcome) {
                Ok(branch_found) => found |= branch_found,
                Err(e) => {
                    branches.abort_all();
                    debug!(domain = %domain, item = %item_name, "update branch failed, sibling aborted");
                    return Err(e);
                }
            }
        }
        Ok(ExecResult::new(Some(u64::from(found))))
    }

    async fn delete_row(&self, stmt: DeleteStatement, args: &[Value]) -> Result<ExecResult> {
        let item_name = stmt.key.item_name(args)?;
        let domain = self.config.domain_name(&stmt.table_name);
        let request = DeleteAttributesRequest {
            domain: domain.clone(),
            item_name: item_name.clone(),
            attribute_names: Vec::new(),
            expected: None,
        };

        debug!(domain = %domain, item = %item_name, "delete item");
        with_deadline(self.timeout(), "delete attributes", self.store.delete_attributes(request))
            .await?
            .map_err(|e| {
                Error::store("cannot delete attributes", e)
                    .with_field("itemName", item_name)
                    .with_field("table", stmt.table_name)
                    .with_field("domain", domain)
            })?;

        // the store does not report whether the item existed
        Ok(ExecResult::new(None))
    }

    async fn create_table(&self, stmt: CreateTableStatement) -> Result<ExecResult> {
        let domain = self.config.domain_name(&stmt.table_name);
        debug!(domain = %domain, "create domain");
        with_deadline(self.timeout(), "create domain", self.store.create_domain(&domain))
            .await?
            .map_err(|e| {
                Error::store("cannot create domain", e)
                    .with_field("table", stmt.table_name)
                    .with_field("domain", domain)
            })?;
        Ok(ExecResult::new(Some(1)))
    }

    async fn drop_table(&self, stmt: DropTableStatement) -> Result<ExecResult> {
        let domain = self.config.domain_name(&stmt.table_name);
        debug!(domain = %domain, "delete domain");
        with_deadline(self.timeout(), "delete domain", self.store.delete_domain(&domain))
            .await?
            .map_err(|e| {
                Error::store("cannot delete domain", e)
                    .with_field("table", stmt.table_name)
                    .with_field("domain", domain)
            })?;
        Ok(ExecResult::new(Some(1)))
    }
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection").field("config", &self.config).finish()
    }
}

/// Interpret one update branch: true if the item was found and changed,
/// false if the item does not exist.
fn branch_outcome(
    result: StoreResult<()>,
    message: &'static str,
    table: String,
    domain: &str,
    item_name: &str,
) -> Result<bool> {
    match result {
        Ok(()) => Ok(true),
        Err(e) if e.is_precondition_failure() => {
            debug!(domain, item = item_name, code = e.code(), "item does not exist");
            Ok(false)
        }
        Err(e) => Err(Error::store(message, e)
            .with_field("itemName", item_name)
            .with_field("table", table)
            .with_field("domain", domain)),
    }
}

async fn put_branch(
    store: Arc<dyn AttributeStore>,
    request: PutAttributesRequest,
    timeout: Option<Duration>,
    table: String,
) -> Result<bool> {
    let domain = request.domain.clone();
    let item_name = request.item_name.clone();
    let result = with_deadline(timeout, "put attributes", store.put_attributes(request)).await?;
    branch_outcome(result, "cannot put attributes", table, &domain, &item_name)
}

async fn delete_branch(
    store: Arc<dyn AttributeStore>,
    request: DeleteAttributesRequest,
    timeout: Option<Duration>,
    table: String,
) -> Result<bool> {
    let domain = request.domain.clone();
    let item_name = request.item_name.clone();
    let result = with_deadline(timeout, "delete attributes", store.delete_attributes(request)).await?;
    branch_outcome(result, "cannot delete attributes", table, &domain, &item_name)
}

fn join_error(e: JoinError) -> Error {
    if e.is_panic() {
        std::panic::resume_unwind(e.into_panic());
    }
    Error::Canceled(format!("update task did not complete: {}", e))
}
