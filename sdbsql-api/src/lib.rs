pub mod connection;
pub mod rows;
pub mod translate;

pub use connection::{Connection, ExecResult};
pub use rows::Rows;

pub use sdbsql_core::{
    AttributeStore, ConnectionConfig, Error, MemoryStore, MemoryStoreConfig, Result, StoreError,
    Value,
};
