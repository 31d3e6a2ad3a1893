/// Translates bound statements into attribute store requests
///
/// Every column `c` is stored as a value attribute `c` plus a type-tag
/// attribute `sql:c`. Every item also carries the existence marker
/// `sql:id = "string"`, which insert and update use as their condition.

use sdbsql_core::codec::{self, TypeTag};
use sdbsql_core::lex::is_id;
use sdbsql_core::parse::{Column, Lexeme};
use sdbsql_core::store::{
    DeleteAttributesRequest, GetAttributesRequest, PutAttributesRequest, ReplaceableAttribute,
    UpdateCondition,
};
use sdbsql_core::{Error, Result, Value};

/// Existence-marker attribute present on every item written through sdbsql
pub const ID_ATTRIBUTE: &str = "sql:id";

/// Value of the existence marker: the item-name type
pub const ID_MARKER_VALUE: &str = "string";

/// Prefix of type-tag attribute names
pub const TYPE_PREFIX: &str = "sql:";

/// Item-name accessor in select expressions
pub const ITEM_NAME: &str = "itemName()";

/// Name of the type-tag attribute for a column
pub fn type_attribute(column: &str) -> String {
    format!("{}{}", TYPE_PREFIX, column)
}

/// Quote a name for a select expression
pub fn quote_name(name: &str) -> String {
    format!("`{}`", name.replace('`', "``"))
}

/// Quote a string literal for a select expression
pub fn quote_literal(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

/// Build the select expression for a general select.
///
/// Projects the existence marker and, for each non-id column, the value
/// and type-tag attributes. The tail is replayed lexeme by lexeme with
/// placeholders replaced by quoted string arguments and `id` replaced by
/// [`ITEM_NAME`].
pub fn select_expression(
    columns: &[String],
    domain: &str,
    tail: Option<&[Lexeme]>,
    args: &[Value],
) -> Result<String> {
    let mut projected = vec![quote_name(ID_ATTRIBUTE)];
    for column in columns.iter().filter(|c| !is_id(c)) {
        projected.push(quote_name(column));
        projected.push(quote_name(&type_attribute(column)));
    }

    let mut expression = format!("select {} from {}", projected.join(", "), quote_name(domain));

    let Some(tail) = tail else {
        return Ok(expression);
    };
    expression.push(' ');
    for lexeme in tail {
        match lexeme {
            Lexeme::Ident(name) if is_id(name) => expression.push_str(ITEM_NAME),
            Lexeme::Placeholder(n) => {
                let arg = args
                    .get(*n)
                    .ok_or_else(|| Error::Binding("not enough args for select query".into()))?;
                match arg {
                    Value::String(s) => expression.push_str(&quote_literal(s)),
                    _ => {
                        return Err(Error::Binding(
                            "all args to a select query must be strings".into(),
                        ))
                    }
                }
            }
            other => expression.push_str(&other.to_string()),
        }
    }
    Ok(expression)
}

/// Point lookup for a key-form select
pub fn key_lookup(
    columns: &[String],
    domain: &str,
    item_name: &str,
    consistent_read: bool,
) -> GetAttributesRequest {
    let mut attribute_names = Vec::with_capacity(columns.len() * 2 + 1);
    for column in columns.iter().filter(|c| !is_id(c)) {
        attribute_names.push(column.clone());
        attribute_names.push(type_attribute(column));
    }
    attribute_names.push(ID_ATTRIBUTE.to_string());

    GetAttributesRequest {
        domain: domain.to_string(),
        item_name: item_name.to_string(),
        attribute_names,
        consistent_read,
    }
}

/// Attributes to write and to remove for one insert or update
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteSet {
    /// Existence marker, type tags and non-empty values
    pub puts: Vec<ReplaceableAttribute>,
    /// Value attributes of columns that are null or encode to empty text
    pub deletes: Vec<String>,
}

impl WriteSet {
    /// Resolve and encode every column. Fails before anything is sent if an
    /// argument is missing.
    pub fn build(columns: &[Column], args: &[Value]) -> Result<Self> {
        let mut puts = vec![ReplaceableAttribute::replace(ID_ATTRIBUTE, ID_MARKER_VALUE)];
        let mut deletes = Vec::new();

        for column in columns {
            let value = column.source.resolve(args)?;
            let encoded = codec::encode(&value);
            puts.push(ReplaceableAttribute::replace(
                type_attribute(&column.column_name),
                encoded.tag.as_str(),
            ));
            if encoded.is_storable() {
                puts.push(ReplaceableAttribute::replace(&column.column_name, encoded.text));
            } else {
                deletes.push(column.column_name.clone());
            }
        }

        Ok(Self { puts, deletes })
    }

    /// Put request for an insert: the item must not exist yet
    pub fn insert_request(&self, domain: &str, item_name: &str) -> PutAttributesRequest {
        PutAttributesRequest {
            domain: domain.to_string(),
            item_name: item_name.to_string(),
            attributes: self.puts.clone(),
            expected: Some(UpdateCondition::absent(ID_ATTRIBUTE)),
        }
    }

    /// Put and delete requests for an update. Without `upsert` both require
    /// the item to exist. An empty branch is `None`.
    pub fn update_requests(
        &self,
        domain: &str,
        item_name: &str,
        upsert: bool,
    ) -> (Option<PutAttributesRequest>, Option<DeleteAttributesRequest>) {
        let expected =
            (!upsert).then(|| UpdateCondition::equals(ID_ATTRIBUTE, TypeTag::String.as_str()));

        // the marker alone is not an update
        let put = (self.puts.len() > 1).then(|| PutAttributesRequest {
            domain: domain.to_string(),
            item_name: item_name.to_string(),
            attributes: self.puts.clone(),
            expected: expected.clone(),
        });
        let delete = (!self.deletes.is_empty()).then(|| DeleteAttributesRequest {
            domain: domain.to_string(),
            item_name: item_name.to_string(),
            attribute_names: self.deletes.clone(),
            expected,
        });
        (put, delete)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sdbsql_core::parse::{parse, SelectStatement, Statement, WhereClause};

    fn select(sql: &str) -> SelectStatement {
        match parse(sql).unwrap() {
            Statement::Select(s) => s,
            other => panic!("Expected SELECT statement, got {:?}", other),
        }
    }

    fn expression(sql: &str, args: &[Value]) -> Result<String> {
        let stmt = select(sql);
        let tail = match &stmt.where_clause {
            WhereClause::Raw(lexemes) => Some(lexemes.as_slice()),
            _ => None,
        };
        select_expression(&stmt.column_names, "dev.tbl", tail, args)
    }

    #[test]
    fn test_quoting() {
        assert_eq!(quote_name("a`b"), "`a``b`");
        assert_eq!(quote_literal("it's"), "'it''s'");
        assert_eq!(type_attribute("name"), "sql:name");
    }

    #[test]
    fn test_select_expression_no_tail() {
        let expr = expression("select id, a, b from tbl", &[]).unwrap();
        assert_eq!(
            expr,
            "select `sql:id`, `a`, `sql:a`, `b`, `sql:b` from `dev.tbl`"
        );
    }

    #[test]
    fn test_select_expression_replays_tail() {
        let expr = expression(
            "select a from tbl where id > ? and `a` = ?\norder by a limit 10",
            &[Value::from("k1"), Value::from("o'neil")],
        )
        .unwrap();
        assert_eq!(
            expr,
            "select `sql:id`, `a`, `sql:a` from `dev.tbl` where itemName() > 'k1' and `a` = 'o''neil'\norder by a limit 10"
        );
    }

    #[test]
    fn test_select_expression_quoted_id_becomes_item_name() {
        let expr = expression("select a from tbl where [ID] like ? ", &[Value::from("x%")]).unwrap();
        assert!(expr.ends_with("where itemName() like 'x%' "), "{}", expr);
    }

    #[test]
    fn test_select_expression_binding_errors() {
        let err = expression("select a from tbl where a = ? and b = ?", &[Value::from("x")]).unwrap_err();
        assert!(matches!(err, Error::Binding(msg) if msg == "not enough args for select query"));

        let err = expression("select a from tbl where a = ?", &[Value::Int(1)]).unwrap_err();
        assert!(matches!(err, Error::Binding(msg) if msg == "all args to a select query must be strings"));
    }

    #[test]
    fn test_key_lookup() {
        let columns = vec!["id".to_string(), "a".to_string()];
        let request = key_lookup(&columns, "tbl", "k1", true);
        assert_eq!(request.attribute_names, vec!["a", "sql:a", "sql:id"]);
        assert_eq!(request.item_name, "k1");
        assert!(request.consistent_read);
    }

    #[test]
    fn test_write_set() {
        let columns = vec![
            Column::placeholder("a", 1),
            Column::placeholder("b", 2),
            Column::literal("c", "lit"),
            Column::placeholder("d", 3),
        ];
        let args = vec![Value::from("k"), Value::Int(5), Value::from(""), Value::Null];
        let set = WriteSet::build(&columns, &args).unwrap();
        assert_eq!(
            set.puts,
            vec![
                ReplaceableAttribute::replace("sql:id", "string"),
                ReplaceableAttribute::replace("sql:a", "int64"),
                ReplaceableAttribute::replace("a", "5"),
                ReplaceableAttribute::replace("sql:b", "string"),
                ReplaceableAttribute::replace("sql:c", "string"),
                ReplaceableAttribute::replace("c", "lit"),
                ReplaceableAttribute::replace("sql:d", "null"),
            ]
        );
        assert_eq!(set.deletes, vec!["b", "d"]);

        let insert = set.insert_request("tbl", "k");
        assert_eq!(insert.expected, Some(UpdateCondition::absent("sql:id")));
    }

    #[test]
    fn test_write_set_missing_arg() {
        let err = WriteSet::build(&[Column::placeholder("a", 4)], &[]).unwrap_err();
        assert!(matches!(err, Error::Binding(_)));
    }

    #[test]
    fn test_update_requests() {
        let set = WriteSet::build(&[Column::literal("a", "x")], &[]).unwrap();
        let (put, delete) = set.update_requests("tbl", "k", false);
        let put = put.unwrap();
        assert_eq!(put.expected, Some(UpdateCondition::equals("sql:id", "string")));
        assert!(delete.is_none());

        let (put, _) = set.update_requests("tbl", "k", true);
        assert_eq!(put.unwrap().expected, None);

        let set = WriteSet::build(&[], &[]).unwrap();
        assert_eq!(set.update_requests("tbl", "k", false), (None, None));
    }
}
