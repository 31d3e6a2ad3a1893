/// Statement parsing for the sdbsql dialect
///
/// Supports SELECT (optionally `consistent`), INSERT, UPDATE, UPSERT, DELETE,
/// CREATE TABLE and DROP TABLE. A select's filter, ordering and limit are
/// kept verbatim for the store's own select language.

pub mod ast;
pub mod parser;

pub use ast::*;
pub use parser::*;
