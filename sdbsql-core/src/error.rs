use crate::store::StoreError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Syntax error: {0}")]
    Syntax(String),

    #[error("Binding error: {0}")]
    Binding(String),

    #[error("cannot insert duplicate key table={table:?} itemName={item_name:?}")]
    DuplicateKey { table: String, item_name: String },

    #[error("{message}{}: {source}", format_fields(.fields))]
    Store {
        message: String,
        fields: Vec<(&'static str, String)>,
        #[source]
        source: StoreError,
    },

    #[error("Not implemented: {0}")]
    Unsupported(String),

    #[error("Invalid query: {0}")]
    InvalidQuery(String),

    #[error("Operation canceled: {0}")]
    Canceled(String),
}

fn format_fields(fields: &[(&'static str, String)]) -> String {
    fields
        .iter()
        .map(|(name, value)| format!(" {}={:?}", name, value))
        .collect()
}

impl Error {
    /// Returns a stable error code for this error variant.
    /// These codes are stable and can be used by clients for error classification.
    pub fn code(&self) -> &'static str {
        match self {
            Error::Syntax(_) => "SYNTAX_ERROR",
            Error::Binding(_) => "BINDING_ERROR",
            Error::DuplicateKey { .. } => "DUPLICATE_KEY",
            Error::Store { .. } => "STORE_ERROR",
            Error::Unsupported(_) => "UNSUPPORTED",
            Error::InvalidQuery(_) => "INVALID_QUERY",
            Error::Canceled(_) => "CANCELED",
        }
    }

    /// Returns true if this error reports an insert against an item that
    /// already exists.
    ///
    /// Callers use this to tell a duplicate key apart from every other
    /// failure without matching on the message.
    pub fn is_duplicate_key(&self) -> bool {
        matches!(self, Error::DuplicateKey { .. })
    }

    /// Returns true if this error is potentially retryable.
    ///
    /// Deadlines and transient store throttling are retryable, while syntax,
    /// binding and duplicate-key errors are not.
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::Canceled(_) => true,
            Error::Store { source, .. } => source.is_transient(),

            Error::Syntax(_) => false,
            Error::Binding(_) => false,
            Error::DuplicateKey { .. } => false,
            Error::Unsupported(_) => false,
            Error::InvalidQuery(_) => false,
        }
    }

    /// Returns the store error code when this error wraps a store failure.
    pub fn store_code(&self) -> Option<&str> {
        match self {
            Error::Store { source, .. } => Some(source.code()),
            _ => None,
        }
    }

    /// Wraps a store failure with a message and the identity of the item,
    /// table or domain involved.
    ///
    /// # Examples
    ///
    /// ```
    /// use sdbsql_core::{Error, StoreError};
    ///
    /// let err = Error::store(
    ///     "cannot put attributes",
    ///     StoreError::new("NoSuchDomain", "domain does not exist"),
    /// )
    /// .with_field("itemName", "ID1");
    ///
    /// assert_eq!(err.store_code(), Some("NoSuchDomain"));
    /// assert!(err.to_string().contains("itemName=\"ID1\""));
    /// ```
    pub fn store(message: impl Into<String>, source: StoreError) -> Error {
        Error::Store {
            message: message.into(),
            fields: Vec::new(),
            source,
        }
    }

    /// Attaches an identity field to a store error. Other variants are
    /// returned unchanged.
    pub fn with_field(mut self, name: &'static str, value: impl Into<String>) -> Error {
        if let Error::Store { fields, .. } = &mut self {
            fields.push((name, value.into()));
        }
        self
    }
}

pub type Result<T> = std::result::Result<T, Error>;
