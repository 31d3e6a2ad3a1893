/// Result cursor for select statements
///
/// Rows are materialized one item at a time into a caller-supplied slice.
/// A general select holds one page of items and fetches the next page only
/// when the buffered items run out and the store returned a continuation
/// token.

use crate::connection::with_deadline;
use crate::translate::{ID_ATTRIBUTE, TYPE_PREFIX};
use sdbsql_core::codec::{self, TypeTag};
use sdbsql_core::lex::is_id;
use sdbsql_core::store::{AttributeStore, SelectRequest, StoreItem};
use sdbsql_core::{Error, Result, Value};
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Maps attribute names to row positions
#[derive(Debug, Clone)]
struct ColumnMap {
    slots: HashMap<String, Vec<usize>>,
    id_slots: Vec<usize>,
    width: usize,
}

impl ColumnMap {
    fn new(columns: &[String]) -> Self {
        let mut slots: HashMap<String, Vec<usize>> = HashMap::new();
        let mut id_slots = Vec::new();
        for (index, column) in columns.iter().enumerate() {
            if is_id(column) {
                id_slots.push(index);
            } else {
                slots.entry(column.clone()).or_default().push(index);
            }
        }
        Self {
            slots,
            id_slots,
            width: columns.len(),
        }
    }

    fn set(&self, dest: &mut [Value], column: &str, value: &Value) {
        if let Some(indexes) = self.slots.get(column) {
            for &i in indexes {
                dest[i] = value.clone();
            }
        }
    }

    /// Decode one item into `dest`
    fn fill(&self, item: &StoreItem, dest: &mut [Value]) -> Result<()> {
        if dest.len() != self.width {
            return Err(Error::InvalidQuery(format!(
                "expected {} destination values, found {}",
                self.width,
                dest.len()
            )));
        }

        dest.fill(Value::Null);
        for &i in &self.id_slots {
            dest[i] = Value::String(item.name.clone());
        }

        // tags first, so a column with a tag but no value reads as the
        // tag's zero value
        let mut tags: HashMap<&str, &str> = HashMap::new();
        for attr in &item.attributes {
            if attr.name == ID_ATTRIBUTE {
                continue;
            }
            let Some(column) = attr.name.strip_prefix(TYPE_PREFIX) else {
                continue;
            };
            tags.insert(column, attr.value.as_str());
            if self.slots.contains_key(column) {
                let zero = TypeTag::parse(&attr.value).map_or(Value::Null, |t| t.zero_value());
                self.set(dest, column, &zero);
            }
        }

        for attr in &item.attributes {
            if attr.name.starts_with(TYPE_PREFIX) || !self.slots.contains_key(&attr.name) {
                continue;
            }
            let tag = tags.get(attr.name.as_str()).copied().unwrap_or(TypeTag::String.as_str());
            let value = codec::decode(&attr.value, tag);
            self.set(dest, &attr.name, &value);
        }
        Ok(())
    }
}

/// Continuation state of a general select
struct Pager {
    store: Arc<dyn AttributeStore>,
    expression: String,
    consistent_read: bool,
    next_token: Option<String>,
    timeout: Option<Duration>,
    table: String,
    domain: String,
}

impl Pager {
    async fn fetch(&mut self, next_token: Option<String>) -> Result<Vec<StoreItem>> {
        let request = SelectRequest {
            expression: self.expression.clone(),
            consistent_read: self.consistent_read,
            next_token,
        };
        debug!(
            domain = %self.domain,
            expression = %self.expression,
            continuation = request.next_token.is_some(),
            "select"
        );

        let page = with_deadline(self.timeout, "select", self.store.select(request))
            .await?
            .map_err(|e| {
                Error::store("cannot select items", e)
                    .with_field("table", self.table.clone())
                    .with_field("domain", self.domain.clone())
            })?;

        self.next_token = page.next_token;
        Ok(page.items)
    }
}

/// Cursor over the rows of a select
pub struct Rows {
    columns: Vec<String>,
    column_map: ColumnMap,
    items: VecDeque<StoreItem>,
    pager: Option<Pager>,
    closed: bool,
}

impl Rows {
    /// Rows of a point lookup: at most one item
    pub(crate) fn single(columns: Vec<String>, item: Option<StoreItem>) -> Self {
        Self {
            column_map: ColumnMap::new(&columns),
            columns,
            items: item.into_iter().collect(),
            pager: None,
            closed: false,
        }
    }

    /// Rows of a general select. The first page is fetched before
    /// returning, so expression errors surface here.
    pub(crate) async fn select(
        store: Arc<dyn AttributeStore>,
        columns: Vec<String>,
        expression: String,
        consistent_read: bool,
        timeout: Option<Duration>,
        table: String,
        domain: String,
    ) -> Result<Self> {
        let mut pager = Pager {
            store,
            expression,
            consistent_read,
            next_token: None,
            timeout,
            table,
            domain,
        };
        let items = pager.fetch(None).await?;

        Ok(Self {
            column_map: ColumnMap::new(&columns),
            columns,
            items: items.into(),
            pager: Some(pager),
            closed: false,
        })
    }

    /// Column names as written in the select list
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// Decode the next row into `dest`, which must have one slot per
    /// column. Returns false when there are no more rows.
    pub async fn next(&mut self, dest: &mut [Value]) -> Result<bool> {
        if self.closed {
            return Ok(false);
        }
        loop {
            // the item stays buffered if it cannot be decoded into `dest`
            if let Some(item) = self.items.front() {
                self.column_map.fill(item, dest)?;
                self.items.pop_front();
                return Ok(true);
            }
            let Some(pager) = self.pager.as_mut() else {
                return Ok(false);
            };
            // the token is replaced only by a successful fetch, so a failed
            // page can be retried
            let Some(token) = pager.next_token.clone() else {
                return Ok(false);
            };
            let items = pager.fetch(Some(token)).await?;
            self.items.extend(items);
        }
    }

    /// Next row as a new vector
    pub async fn next_row(&mut self) -> Result<Option<Vec<Value>>> {
        let mut row = vec![Value::Null; self.columns.len()];
        if self.next(&mut row).await? {
            Ok(Some(row))
        } else {
            Ok(None)
        }
    }

    /// Collect every remaining row
    pub async fn collect(mut self) -> Result<Vec<Vec<Value>>> {
        let mut rows = Vec::new();
        while let Some(row) = self.next_row().await? {
            rows.push(row);
        }
        Ok(rows)
    }

    /// Discard buffered items and stop paging
    pub fn close(&mut self) {
        self.closed = true;
        self.items.clear();
        self.pager = None;
    }
}

impl std::fmt::Debug for Rows {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Rows")
            .field("columns", &self.columns)
            .field("buffered", &self.items.len())
            .field("closed", &self.closed)
            .finish()
    }
}
