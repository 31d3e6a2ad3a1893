/// Statement model produced by the parser
///
/// One enum variant per statement kind. Values are either literals taken
/// from the statement text or ordinals into the caller's argument vector.

use crate::{Error, Result, Value};
use std::fmt;

/// Top-level statement
#[derive(Debug, Clone, PartialEq)]
pub enum Statement {
    Select(SelectStatement),
    Insert(InsertStatement),
    Update(UpdateStatement),
    Delete(DeleteStatement),
    CreateTable(CreateTableStatement),
    DropTable(DropTableStatement),
}

impl Statement {
    /// Short name of the statement kind, for logging
    pub fn kind(&self) -> &'static str {
        match self {
            Statement::Select(_) => "select",
            Statement::Insert(_) => "insert",
            Statement::Update(s) if s.upsert => "upsert",
            Statement::Update(_) => "update",
            Statement::Delete(_) => "delete",
            Statement::CreateTable(_) => "create table",
            Statement::DropTable(_) => "drop table",
        }
    }

    pub fn table_name(&self) -> &str {
        match self {
            Statement::Select(s) => &s.table_name,
            Statement::Insert(s) => &s.table_name,
            Statement::Update(s) => &s.table_name,
            Statement::Delete(s) => &s.table_name,
            Statement::CreateTable(s) => &s.table_name,
            Statement::DropTable(s) => &s.table_name,
        }
    }

    /// Number of arguments the statement needs: one more than the highest
    /// placeholder ordinal, or zero when there are no placeholders.
    pub fn placeholder_count(&self) -> usize {
        let ordinals: Vec<usize> = match self {
            Statement::Select(s) => match &s.where_clause {
                WhereClause::None => Vec::new(),
                WhereClause::Key(key) => key.source.ordinal().into_iter().collect(),
                WhereClause::Raw(lexemes) => lexemes
                    .iter()
                    .filter_map(|l| match l {
                        Lexeme::Placeholder(n) => Some(*n),
                        _ => None,
                    })
                    .collect(),
            },
            Statement::Insert(s) => column_ordinals(&s.columns, &s.key),
            Statement::Update(s) => column_ordinals(&s.columns, &s.key),
            Statement::Delete(s) => s.key.source.ordinal().into_iter().collect(),
            Statement::CreateTable(_) | Statement::DropTable(_) => Vec::new(),
        };
        ordinals.into_iter().max().map_or(0, |n| n + 1)
    }
}

fn column_ordinals(columns: &[Column], key: &Key) -> Vec<usize> {
    columns
        .iter()
        .filter_map(|c| c.source.ordinal())
        .chain(key.source.ordinal())
        .collect()
}

/// SELECT statement
#[derive(Debug, Clone, PartialEq)]
pub struct SelectStatement {
    /// `consistent select`
    pub consistent_read: bool,
    /// Requested columns, unquoted, in order; may include `id`
    pub column_names: Vec<String>,
    pub table_name: String,
    pub where_clause: WhereClause,
}

/// Everything after `from <table>` in a select
#[derive(Debug, Clone, PartialEq)]
pub enum WhereClause {
    /// Nothing follows the table name
    None,
    /// Exactly `where id = <placeholder|literal>`
    Key(Key),
    /// Any other tail, verbatim, starting with its first token
    Raw(Vec<Lexeme>),
}

/// Element of a verbatim select tail
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Lexeme {
    /// Keyword, operator or literal text
    Text(String),
    /// Identifier as written, delimiters included
    Ident(String),
    /// Placeholder with its ordinal
    Placeholder(usize),
    /// White space
    Whitespace(String),
}

impl fmt::Display for Lexeme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Lexeme::Text(s) | Lexeme::Ident(s) | Lexeme::Whitespace(s) => f.write_str(s),
            Lexeme::Placeholder(_) => f.write_str("?"),
        }
    }
}

/// INSERT statement
#[derive(Debug, Clone, PartialEq)]
pub struct InsertStatement {
    pub table_name: String,
    /// Columns to write; never contains the id column
    pub columns: Vec<Column>,
    pub key: Key,
}

/// UPDATE or UPSERT statement
#[derive(Debug, Clone, PartialEq)]
pub struct UpdateStatement {
    pub table_name: String,
    pub columns: Vec<Column>,
    pub key: Key,
    /// Written as `upsert`: the item need not exist
    pub upsert: bool,
}

/// DELETE statement
#[derive(Debug, Clone, PartialEq)]
pub struct DeleteStatement {
    pub table_name: String,
    pub key: Key,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CreateTableStatement {
    pub table_name: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DropTableStatement {
    pub table_name: String,
}

/// Where a column or key value comes from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValueSource {
    /// Zero-based ordinal into the argument vector
    Placeholder(usize),
    /// Literal from the statement text, unquoted
    Literal(String),
}

impl ValueSource {
    pub fn ordinal(&self) -> Option<usize> {
        match self {
            ValueSource::Placeholder(n) => Some(*n),
            ValueSource::Literal(_) => None,
        }
    }

    /// Resolve against bound arguments. Literals are always strings.
    pub fn resolve(&self, args: &[Value]) -> Result<Value> {
        match self {
            ValueSource::Literal(s) => Ok(Value::String(s.clone())),
            ValueSource::Placeholder(n) => args
                .get(*n)
                .cloned()
                .ok_or_else(|| Error::Binding("not enough args supplied".into())),
        }
    }
}

/// Column assignment in an insert or update
#[derive(Debug, Clone, PartialEq)]
pub struct Column {
    pub column_name: String,
    pub source: ValueSource,
}

impl Column {
    pub fn placeholder(name: impl Into<String>, ordinal: usize) -> Self {
        Self {
            column_name: name.into(),
            source: ValueSource::Placeholder(ordinal),
        }
    }

    pub fn literal(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            column_name: name.into(),
            source: ValueSource::Literal(value.into()),
        }
    }
}

/// Item name of the row a statement targets
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Key {
    pub source: ValueSource,
}

impl Key {
    pub fn placeholder(ordinal: usize) -> Self {
        Self {
            source: ValueSource::Placeholder(ordinal),
        }
    }

    pub fn literal(value: impl Into<String>) -> Self {
        Self {
            source: ValueSource::Literal(value.into()),
        }
    }

    /// Resolve the item name. Bound item names must be strings.
    pub fn item_name(&self, args: &[Value]) -> Result<String> {
        match self.source.resolve(args)? {
            Value::String(s) => Ok(s),
            other => Err(Error::Binding(format!(
                "invalid type for item name: {:?}",
                other.type_name()
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_value_source_resolve() {
        let args = vec![Value::from("a"), Value::Int(2)];
        assert_eq!(ValueSource::Placeholder(1).resolve(&args).unwrap(), Value::Int(2));
        assert_eq!(
            ValueSource::Literal("lit".into()).resolve(&[]).unwrap(),
            Value::from("lit")
        );
        let err = ValueSource::Placeholder(2).resolve(&args).unwrap_err();
        assert!(matches!(err, Error::Binding(msg) if msg == "not enough args supplied"));
    }

    #[test]
    fn test_key_item_name() {
        let args = vec![Value::from("ID1"), Value::Int(7)];
        assert_eq!(Key::placeholder(0).item_name(&args).unwrap(), "ID1");
        assert_eq!(Key::literal("ID2").item_name(&[]).unwrap(), "ID2");
        let err = Key::placeholder(1).item_name(&args).unwrap_err();
        assert!(matches!(err, Error::Binding(msg) if msg == "invalid type for item name: \"int64\""));
    }

    #[test]
    fn test_placeholder_count() {
        let stmt = Statement::Update(UpdateStatement {
            table_name: "t".into(),
            columns: vec![Column::placeholder("a", 0), Column::literal("b", "x")],
            key: Key::placeholder(1),
            upsert: false,
        });
        assert_eq!(stmt.placeholder_count(), 2);
        assert_eq!(stmt.kind(), "update");

        let stmt = Statement::CreateTable(CreateTableStatement {
            table_name: "t".into(),
        });
        assert_eq!(stmt.placeholder_count(), 0);
    }

    #[test]
    fn test_lexeme_display() {
        let lexemes = [
            Lexeme::Text("where".into()),
            Lexeme::Whitespace(" ".into()),
            Lexeme::Ident("`a`".into()),
            Lexeme::Text(">".into()),
            Lexeme::Placeholder(3),
        ];
        let text: String = lexemes.iter().map(|l| l.to_string()).collect();
        assert_eq!(text, "where `a`>?");
    }
}
