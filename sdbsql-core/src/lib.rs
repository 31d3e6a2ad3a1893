pub mod error;
pub mod types;
pub mod config;
pub mod lex;
pub mod codec; // typed values <-> (text, type tag)
pub mod parse;
pub mod store; // attribute store capability
pub mod memory; // in-process store for tests and the shell

pub use config::{ConnectionConfig, MemoryStoreConfig};
pub use error::{Error, Result};
pub use memory::MemoryStore;
pub use store::{AttributeStore, StoreError, StoreResult};
pub use types::*;
