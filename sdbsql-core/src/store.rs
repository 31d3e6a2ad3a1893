/// Attribute store capability
///
/// The executor reaches the underlying key/attribute store only through
/// [`AttributeStore`]. An implementation wraps an SDK client (signing,
/// transport retries and region resolution live there) or, for tests and the
/// shell, the in-process [`crate::memory::MemoryStore`].

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Error codes reported by the store
pub mod codes {
    /// An expected condition on a put or delete was not met
    pub const CONDITIONAL_CHECK_FAILED: &str = "ConditionalCheckFailed";
    /// An expected condition named an attribute that does not exist
    pub const ATTRIBUTE_DOES_NOT_EXIST: &str = "AttributeDoesNotExist";
    pub const NO_SUCH_DOMAIN: &str = "NoSuchDomain";
    pub const INVALID_QUERY_EXPRESSION: &str = "InvalidQueryExpression";
    pub const MISSING_PARAMETER: &str = "MissingParameter";
    pub const INVALID_NEXT_TOKEN: &str = "InvalidNextToken";
    pub const SERVICE_UNAVAILABLE: &str = "ServiceUnavailable";
    pub const REQUEST_TIMEOUT: &str = "RequestTimeout";
}

/// Failure reported by the store, with a retrievable error code
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{code}: {message}")]
pub struct StoreError {
    code: String,
    message: String,
}

impl StoreError {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
        }
    }

    pub fn code(&self) -> &str {
        &self.code
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn has_code(&self, code: &str) -> bool {
        self.code == code
    }

    /// Returns true if the failed condition means the targeted item (or
    /// attribute) is not in the expected state
    pub fn is_precondition_failure(&self) -> bool {
        self.has_code(codes::CONDITIONAL_CHECK_FAILED) || self.has_code(codes::ATTRIBUTE_DOES_NOT_EXIST)
    }

    /// Returns true for throttling and timeouts that may succeed on retry
    pub fn is_transient(&self) -> bool {
        self.has_code(codes::SERVICE_UNAVAILABLE) || self.has_code(codes::REQUEST_TIMEOUT)
    }
}

pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// A named attribute value
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attribute {
    pub name: String,
    pub value: String,
}

impl Attribute {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

/// Attribute to write; `replace` overwrites existing values of the name
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplaceableAttribute {
    pub name: String,
    pub value: String,
    pub replace: bool,
}

impl ReplaceableAttribute {
    pub fn replace(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
            replace: true,
        }
    }
}

/// Condition a put or delete must satisfy before it is applied
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpdateCondition {
    pub name: String,
    pub exists: bool,
    /// Value the attribute must hold; only meaningful when `exists` is true
    pub value: Option<String>,
}

impl UpdateCondition {
    /// The attribute must not exist
    pub fn absent(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            exists: false,
            value: None,
        }
    }

    /// The attribute must exist and hold `value`
    pub fn equals(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            exists: true,
            value: Some(value.into()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GetAttributesRequest {
    pub domain: String,
    pub item_name: String,
    /// Attributes to return; empty returns every attribute
    pub attribute_names: Vec<String>,
    pub consistent_read: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PutAttributesRequest {
    pub domain: String,
    pub item_name: String,
    pub attributes: Vec<ReplaceableAttribute>,
    pub expected: Option<UpdateCondition>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeleteAttributesRequest {
    pub domain: String,
    pub item_name: String,
    /// Attributes to remove; empty removes the whole item
    pub attribute_names: Vec<String>,
    pub expected: Option<UpdateCondition>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectRequest {
    pub expression: String,
    pub consistent_read: bool,
    pub next_token: Option<String>,
}

/// Item returned by a select
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreItem {
    pub name: String,
    pub attributes: Vec<Attribute>,
}

/// One page of select results
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SelectPage {
    pub items: Vec<StoreItem>,
    /// Present when more items may follow
    pub next_token: Option<String>,
}

/// Capabilities required of the key/attribute store.
///
/// Implementations are stateless handles shared across concurrent calls.
#[async_trait]
pub trait AttributeStore: Send + Sync {
    /// Create a domain; creating an existing domain succeeds
    async fn create_domain(&self, domain: &str) -> StoreResult<()>;

    /// Delete a domain and its items; deleting a missing domain succeeds
    async fn delete_domain(&self, domain: &str) -> StoreResult<()>;

    /// Point lookup. An item that does not exist returns no attributes.
    async fn get_attributes(&self, request: GetAttributesRequest) -> StoreResult<Vec<Attribute>>;

    async fn put_attributes(&self, request: PutAttributesRequest) -> StoreResult<()>;

    async fn delete_attributes(&self, request: DeleteAttributesRequest) -> StoreResult<()>;

    async fn select(&self, request: SelectRequest) -> StoreResult<SelectPage>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_precondition_codes() {
        assert!(StoreError::new(codes::CONDITIONAL_CHECK_FAILED, "x").is_precondition_failure());
        assert!(StoreError::new(codes::ATTRIBUTE_DOES_NOT_EXIST, "x").is_precondition_failure());
        assert!(!StoreError::new(codes::NO_SUCH_DOMAIN, "x").is_precondition_failure());
    }

    #[test]
    fn test_display() {
        let err = StoreError::new(codes::NO_SUCH_DOMAIN, "The specified domain does not exist.");
        assert_eq!(err.to_string(), "NoSuchDomain: The specified domain does not exist.");
        assert_eq!(err.code(), "NoSuchDomain");
        assert!(!err.is_transient());
        assert!(StoreError::new(codes::SERVICE_UNAVAILABLE, "slow down").is_transient());
    }

    #[test]
    fn test_conditions() {
        let absent = UpdateCondition::absent("sql:id");
        assert!(!absent.exists);
        assert_eq!(absent.value, None);

        let equals = UpdateCondition::equals("sql:id", "string");
        assert!(equals.exists);
        assert_eq!(equals.value.as_deref(), Some("string"));
    }
}
