/// In-memory attribute store for tests and temporary databases
///
/// Implements [`AttributeStore`] over nested ordered maps: domains hold
/// items, items hold a list of attribute values where a name may repeat.
/// Conditional puts and deletes fail with the same error codes as the hosted
/// store, and selects are evaluated by [`SelectQuery`] and paginated by
/// offset. All data is lost when the last handle is dropped unless it is
/// saved as a [`Snapshot`].

pub mod select;

pub use select::SelectQuery;

use crate::config::MemoryStoreConfig;
use crate::store::{
    codes, Attribute, AttributeStore, DeleteAttributesRequest, GetAttributesRequest,
    PutAttributesRequest, SelectPage, SelectRequest, StoreError, StoreItem, StoreResult,
    UpdateCondition,
};
use async_trait::async_trait;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::Path;
use std::sync::Arc;
use tracing::trace;

type Domain = BTreeMap<String, Vec<Attribute>>;

/// In-memory attribute store. Clones share the same data.
#[derive(Clone, Default)]
pub struct MemoryStore {
    domains: Arc<RwLock<BTreeMap<String, Domain>>>,
    config: MemoryStoreConfig,
}

/// Serializable copy of a store's contents
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Snapshot {
    pub domains: BTreeMap<String, Vec<StoreItem>>,
}

impl MemoryStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty store with custom configuration
    pub fn with_config(config: MemoryStoreConfig) -> Self {
        Self {
            domains: Arc::default(),
            config,
        }
    }

    pub fn config(&self) -> &MemoryStoreConfig {
        &self.config
    }

    /// Names of all domains, sorted
    pub fn domain_names(&self) -> Vec<String> {
        self.domains.read().keys().cloned().collect()
    }

    /// Number of items in a domain, or None if the domain does not exist
    pub fn item_count(&self, domain: &str) -> Option<usize> {
        self.domains.read().get(domain).map(|d| d.len())
    }

    /// Attributes of one item, or None if the domain or item does not exist
    pub fn item(&self, domain: &str, item_name: &str) -> Option<Vec<Attribute>> {
        self.domains.read().get(domain)?.get(item_name).cloned()
    }

    /// Copy the current contents
    pub fn snapshot(&self) -> Snapshot {
        let domains = self
            .domains
            .read()
            .iter()
            .map(|(name, domain)| {
                let items = domain
                    .iter()
                    .map(|(item_name, attributes)| StoreItem {
                        name: item_name.clone(),
                        attributes: attributes.clone(),
                    })
                    .collect();
                (name.clone(), items)
            })
            .collect();
        Snapshot { domains }
    }

    /// Replace the current contents with a snapshot
    pub fn restore(&self, snapshot: Snapshot) {
        let domains = snapshot
            .domains
            .into_iter()
            .map(|(name, items)| {
                let domain = items
                    .into_iter()
                    .filter(|item| !item.attributes.is_empty())
                    .map(|item| (item.name, item.attributes))
                    .collect();
                (name, domain)
            })
            .collect();
        *self.domains.write() = domains;
    }

    /// Write the contents to `path` as JSON
    pub fn save(&self, path: impl AsRef<Path>) -> io::Result<()> {
        let json = serde_json::to_string_pretty(&self.snapshot())?;
        fs::write(path, json)
    }

    /// Open a store from a JSON snapshot written by [`MemoryStore::save`]
    pub fn load(path: impl AsRef<Path>, config: MemoryStoreConfig) -> io::Result<Self> {
        let json = fs::read_to_string(path)?;
        let snapshot: Snapshot = serde_json::from_str(&json)?;
        let store = Self::with_config(config);
        store.restore(snapshot);
        Ok(store)
    }
}

fn no_such_domain(domain: &str) -> StoreError {
    StoreError::new(
        codes::NO_SUCH_DOMAIN,
        format!("The specified domain does not exist: {}", domain),
    )
}

fn missing_parameter(name: &str) -> StoreError {
    StoreError::new(
        codes::MISSING_PARAMETER,
        format!("The request must contain the parameter {}", name),
    )
}

fn require(domain: &str, item_name: &str) -> StoreResult<()> {
    if domain.is_empty() {
        return Err(missing_parameter("DomainName"));
    }
    if item_name.is_empty() {
        return Err(missing_parameter("ItemName"));
    }
    Ok(())
}

/// Check an expected condition against the current attributes of an item
fn check_condition(expected: Option<&UpdateCondition>, current: Option<&Vec<Attribute>>) -> StoreResult<()> {
    let Some(cond) = expected else {
        return Ok(());
    };
    let mut values = current
        .into_iter()
        .flatten()
        .filter(|a| a.name == cond.name)
        .map(|a| a.value.as_str())
        .peekable();

    if !cond.exists {
        if values.peek().is_some() {
            return Err(StoreError::new(
                codes::CONDITIONAL_CHECK_FAILED,
                format!("Conditional check failed. Attribute ({}) value exists", cond.name),
            ));
        }
        return Ok(());
    }

    if values.peek().is_none() {
        return Err(StoreError::new(
            codes::ATTRIBUTE_DOES_NOT_EXIST,
            format!("Attribute ({}) does not exist", cond.name),
        ));
    }
    if let Some(expected_value) = &cond.value {
        if !values.any(|v| v == expected_value) {
            return Err(StoreError::new(
                codes::CONDITIONAL_CHECK_FAILED,
                format!(
                    "Conditional check failed. Attribute ({}) value is not ({})",
                    cond.name, expected_value
                ),
            ));
        }
    }
    Ok(())
}

#[async_trait]
impl AttributeStore for MemoryStore {
    async fn create_domain(&self, domain: &str) -> StoreResult<()> {
        if domain.is_empty() {
            return Err(missing_parameter("DomainName"));
        }
        trace!(domain, "create domain");
        self.domains.write().entry(domain.to_string()).or_default();
        Ok(())
    }

    async fn delete_domain(&self, domain: &str) -> StoreResult<()> {
        if domain.is_empty() {
            return Err(missing_parameter("DomainName"));
        }
        trace!(domain, "delete domain");
        self.domains.write().remove(domain);
        Ok(())
    }

    async fn get_attributes(&self, request: GetAttributesRequest) -> StoreResult<Vec<Attribute>> {
        require(&request.domain, &request.item_name)?;
        let domains = self.domains.read();
        let domain = domains
            .get(&request.domain)
            .ok_or_else(|| no_such_domain(&request.domain))?;

        let attributes = domain
            .get(&request.item_name)
            .map(|attrs| {
                attrs
                    .iter()
                    .filter(|a| {
                        request.attribute_names.is_empty() || request.attribute_names.contains(&a.name)
                    })
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();
        Ok(attributes)
    }

    async fn put_attributes(&self, request: PutAttributesRequest) -> StoreResult<()> {
        require(&request.domain, &request.item_name)?;
        if request.attributes.is_empty() {
            return Err(missing_parameter("Attribute.Name"));
        }

        let mut domains = self.domains.write();
        let domain = domains
            .get_mut(&request.domain)
            .ok_or_else(|| no_such_domain(&request.domain))?;
        check_condition(request.expected.as_ref(), domain.get(&request.item_name))?;

        trace!(
            domain = %request.domain,
            item = %request.item_name,
            attributes = request.attributes.len(),
            "put attributes"
        );

        let current = domain.entry(request.item_name).or_default();
        for attr in request.attributes.iter().filter(|a| a.replace) {
            current.retain(|a| a.name != attr.name);
        }
        for attr in request.attributes {
            let attr = Attribute::new(attr.name, attr.value);
            if !current.contains(&attr) {
                current.push(attr);
            }
        }
        Ok(())
    }

    async fn delete_attributes(&self, request: DeleteAttributesRequest) -> StoreResult<()> {
        require(&request.domain, &request.item_name)?;

        let mut domains = self.domains.write();
        let domain = domains
            .get_mut(&request.domain)
            .ok_or_else(|| no_such_domain(&request.domain))?;
        check_condition(request.expected.as_ref(), domain.get(&request.item_name))?;

        trace!(
            domain = %request.domain,
            item = %request.item_name,
            attributes = request.attribute_names.len(),
            "delete attributes"
        );

        if request.attribute_names.is_empty() {
            domain.remove(&request.item_name);
            return Ok(());
        }
        if let Some(current) = domain.get_mut(&request.item_name) {
            current.retain(|a| !request.attribute_names.contains(&a.name));
            if current.is_empty() {
                domain.remove(&request.item_name);
            }
        }
        Ok(())
    }

    async fn select(&self, request: SelectRequest) -> StoreResult<SelectPage> {
        let query = SelectQuery::parse(&request.expression)?;
        let offset = match &request.next_token {
            None => 0,
            Some(token) => token.parse::<usize>().map_err(|_| invalid_next_token(token))?,
        };

        let results = {
            let domains = self.domains.read();
            let domain = domains
                .get(&query.domain)
                .ok_or_else(|| no_such_domain(&query.domain))?;
            let items: Vec<StoreItem> = domain
                .iter()
                .map(|(name, attributes)| StoreItem {
                    name: name.clone(),
                    attributes: attributes.clone(),
                })
                .collect();
            query.run(&items)
        };

        if offset > results.len() {
            return Err(invalid_next_token(request.next_token.as_deref().unwrap_or_default()));
        }
        let end = results.len().min(offset + self.config.page_size);
        let next_token = (end < results.len()).then(|| end.to_string());

        trace!(
            domain = %query.domain,
            offset,
            returned = end - offset,
            more = next_token.is_some(),
            "select page"
        );

        Ok(SelectPage {
            items: results[offset..end].to_vec(),
            next_token,
        })
    }
}

fn invalid_next_token(token: &str) -> StoreError {
    StoreError::new(
        codes::INVALID_NEXT_TOKEN,
        format!("The specified next token is not valid: {:?}", token),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::ReplaceableAttribute;

    async fn store_with_domain(domain: &str) -> MemoryStore {
        let store = MemoryStore::new();
        store.create_domain(domain).await.unwrap();
        store
    }

    fn put(domain: &str, item: &str, attrs: &[(&str, &str)]) -> PutAttributesRequest {
        PutAttributesRequest {
            domain: domain.to_string(),
            item_name: item.to_string(),
            attributes: attrs
                .iter()
                .map(|(n, v)| ReplaceableAttribute::replace(*n, *v))
                .collect(),
            expected: None,
        }
    }

    fn get(domain: &str, item: &str) -> GetAttributesRequest {
        GetAttributesRequest {
            domain: domain.to_string(),
            item_name: item.to_string(),
            attribute_names: Vec::new(),
            consistent_read: true,
        }
    }

    fn select(expression: &str, next_token: Option<String>) -> SelectRequest {
        SelectRequest {
            expression: expression.to_string(),
            consistent_read: false,
            next_token,
        }
    }

    #[tokio::test]
    async fn test_domains_are_idempotent() {
        let store = MemoryStore::new();
        store.create_domain("d").await.unwrap();
        store.create_domain("d").await.unwrap();
        assert_eq!(store.domain_names(), vec!["d"]);

        store.delete_domain("d").await.unwrap();
        store.delete_domain("d").await.unwrap();
        assert!(store.domain_names().is_empty());
    }

    #[tokio::test]
    async fn test_missing_domain() {
        let store = MemoryStore::new();
        let err = store.get_attributes(get("nope", "i")).await.unwrap_err();
        assert_eq!(err.code(), codes::NO_SUCH_DOMAIN);
        let err = store.put_attributes(put("nope", "i", &[("a", "1")])).await.unwrap_err();
        assert_eq!(err.code(), codes::NO_SUCH_DOMAIN);
        let err = store.select(select("select * from nope", None)).await.unwrap_err();
        assert_eq!(err.code(), codes::NO_SUCH_DOMAIN);
    }

    #[tokio::test]
    async fn test_put_replace_and_append() {
        let store = store_with_domain("d").await;
        store.put_attributes(put("d", "i", &[("a", "1"), ("b", "x")])).await.unwrap();
        store.put_attributes(put("d", "i", &[("a", "2")])).await.unwrap();

        let mut append = put("d", "i", &[("b", "y")]);
        append.attributes[0].replace = false;
        store.put_attributes(append).await.unwrap();

        let attrs = store.get_attributes(get("d", "i")).await.unwrap();
        assert_eq!(
            attrs,
            vec![Attribute::new("b", "x"), Attribute::new("a", "2"), Attribute::new("b", "y")]
        );

        let mut only_a = get("d", "i");
        only_a.attribute_names = vec!["a".into()];
        assert_eq!(store.get_attributes(only_a).await.unwrap(), vec![Attribute::new("a", "2")]);
        assert!(store.get_attributes(get("d", "missing")).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_conditional_put() {
        let store = store_with_domain("d").await;
        let mut insert = put("d", "i", &[("sql:id", "string")]);
        insert.expected = Some(UpdateCondition::absent("sql:id"));
        store.put_attributes(insert.clone()).await.unwrap();

        let err = store.put_attributes(insert).await.unwrap_err();
        assert_eq!(err.code(), codes::CONDITIONAL_CHECK_FAILED);

        let mut update = put("d", "other", &[("a", "1")]);
        update.expected = Some(UpdateCondition::equals("sql:id", "string"));
        let err = store.put_attributes(update.clone()).await.unwrap_err();
        assert_eq!(err.code(), codes::ATTRIBUTE_DOES_NOT_EXIST);
        assert_eq!(store.item("d", "other"), None);

        update.item_name = "i".into();
        update.expected = Some(UpdateCondition::equals("sql:id", "int64"));
        let err = store.put_attributes(update).await.unwrap_err();
        assert_eq!(err.code(), codes::CONDITIONAL_CHECK_FAILED);
    }

    #[tokio::test]
    async fn test_delete_attributes() {
        let store = store_with_domain("d").await;
        store.put_attributes(put("d", "i", &[("a", "1"), ("b", "2")])).await.unwrap();

        let delete_a = DeleteAttributesRequest {
            domain: "d".into(),
            item_name: "i".into(),
            attribute_names: vec!["a".into()],
            expected: None,
        };
        store.delete_attributes(delete_a).await.unwrap();
        assert_eq!(store.item("d", "i"), Some(vec![Attribute::new("b", "2")]));

        let delete_b = DeleteAttributesRequest {
            domain: "d".into(),
            item_name: "i".into(),
            attribute_names: vec!["b".into()],
            expected: Some(UpdateCondition::equals("b", "2")),
        };
        store.delete_attributes(delete_b).await.unwrap();
        assert_eq!(store.item_count("d"), Some(0));

        let delete_all = DeleteAttributesRequest {
            domain: "d".into(),
            item_name: "gone".into(),
            attribute_names: Vec::new(),
            expected: None,
        };
        store.delete_attributes(delete_all).await.unwrap();
    }

    #[tokio::test]
    async fn test_select_pagination() {
        let store = MemoryStore::with_config(MemoryStoreConfig::new().with_page_size(2));
        store.create_domain("d").await.unwrap();
        for i in 0..5 {
            let name = format!("item{}", i);
            store.put_attributes(put("d", &name, &[("n", &i.to_string())])).await.unwrap();
        }

        let mut names = Vec::new();
        let mut token = None;
        let mut calls = 0;
        loop {
            let page = store.select(select("select * from `d`", token)).await.unwrap();
            calls += 1;
            assert!(page.items.len() <= 2);
            names.extend(page.items.into_iter().map(|i| i.name));
            token = page.next_token;
            if token.is_none() {
                break;
            }
        }
        assert_eq!(calls, 3);
        assert_eq!(names, vec!["item0", "item1", "item2", "item3", "item4"]);

        let err = store
            .select(select("select * from d", Some("bogus".into())))
            .await
            .unwrap_err();
        assert_eq!(err.code(), codes::INVALID_NEXT_TOKEN);
        let err = store
            .select(select("select * from d", Some("9".into())))
            .await
            .unwrap_err();
        assert_eq!(err.code(), codes::INVALID_NEXT_TOKEN);
    }

    #[tokio::test]
    async fn test_select_invalid_expression() {
        let store = store_with_domain("d").await;
        let err = store.select(select("select * from d where", None)).await.unwrap_err();
        assert_eq!(err.code(), codes::INVALID_QUERY_EXPRESSION);
    }

    #[tokio::test]
    async fn test_snapshot_save_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("store.json");

        let store = store_with_domain("users").await;
        store.create_domain("empty").await.unwrap();
        store
            .put_attributes(put("users", "u1", &[("name", "Alice"), ("sql:name", "string")]))
            .await
            .unwrap();
        store.save(&path).unwrap();

        let loaded = MemoryStore::load(&path, MemoryStoreConfig::default()).unwrap();
        assert_eq!(loaded.snapshot(), store.snapshot());
        assert_eq!(loaded.domain_names(), vec!["empty", "users"]);
        assert_eq!(
            loaded.item("users", "u1"),
            Some(vec![Attribute::new("name", "Alice"), Attribute::new("sql:name", "string")])
        );
    }

    #[test]
    fn test_load_rejects_malformed_snapshot() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.json");
        fs::write(&path, "{not json").unwrap();
        assert!(MemoryStore::load(&path, MemoryStoreConfig::default()).is_err());
        assert!(MemoryStore::load(dir.path().join("missing.json"), MemoryStoreConfig::default()).is_err());
    }
}
