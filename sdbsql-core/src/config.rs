use std::collections::HashMap;
use std::time::Duration;

/// Connection configuration: table-to-domain mapping and request deadlines
#[derive(Debug, Clone, Default)]
pub struct ConnectionConfig {
    /// Prefix joined to table names with a `.` (None = no prefix)
    pub schema: Option<String>,

    /// Explicit table-to-domain names; takes precedence over the schema
    pub synonyms: HashMap<String, String>,

    /// Deadline applied to each store request (None = wait indefinitely)
    pub request_timeout: Option<Duration>,
}

impl ConnectionConfig {
    /// Create a new configuration with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the schema prefix
    pub fn with_schema(mut self, schema: impl Into<String>) -> Self {
        self.schema = Some(schema.into());
        self
    }

    /// Map a table name to a domain name
    pub fn with_synonym(mut self, table: impl Into<String>, domain: impl Into<String>) -> Self {
        self.synonyms.insert(table.into(), domain.into());
        self
    }

    /// Set the per-request deadline
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = Some(timeout);
        self
    }

    /// Domain name for a table: its synonym if one is configured, otherwise
    /// the table name qualified by the schema, if any.
    pub fn domain_name(&self, table: &str) -> String {
        if let Some(domain) = self.synonyms.get(table) {
            return domain.clone();
        }
        match &self.schema {
            Some(schema) => format!("{}.{}", schema, table),
            None => table.to_string(),
        }
    }
}

/// Memory store configuration
#[derive(Debug, Clone)]
pub struct MemoryStoreConfig {
    /// Maximum number of items returned by one select call
    pub page_size: usize,
}

impl Default for MemoryStoreConfig {
    fn default() -> Self {
        Self { page_size: 100 }
    }
}

impl MemoryStoreConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the select page size (at least 1)
    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }
}
