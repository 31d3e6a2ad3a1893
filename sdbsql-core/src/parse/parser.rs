/// Recursive-descent parser for sdbsql statements
///
/// Consumes tokens from [`Scanner`] and builds a [`Statement`]. Parsing stops
/// at the first grammar violation with an [`Error::Syntax`] naming the
/// offending token.
///
/// Placeholders are numbered in the order they appear in the text, whatever
/// clause they belong to.

use crate::lex::{is_id, unquote, Scanner, Token};
use crate::parse::ast::*;
use crate::{Error, Result};
use tracing::debug;

/// Parse a single statement.
///
/// # Examples
///
/// ```
/// use sdbsql_core::parse::{parse, Column, Key, Statement};
///
/// let stmt = parse("insert into users(id, name) values(?, ?)").unwrap();
/// match stmt {
///     Statement::Insert(insert) => {
///         assert_eq!(insert.table_name, "users");
///         assert_eq!(insert.columns, vec![Column::placeholder("name", 1)]);
///         assert_eq!(insert.key, Key::placeholder(0));
///     }
///     _ => unreachable!(),
/// }
/// ```
pub fn parse(text: &str) -> Result<Statement> {
    let statement = Parser::new(text).parse_statement()?;
    debug!(kind = statement.kind(), table = statement.table_name(), "parsed statement");
    Ok(statement)
}

struct Parser {
    scanner: Scanner,
    /// Number of placeholders already consumed; the ordinal of the current
    /// token when it is a placeholder
    placeholder_index: usize,
    /// Verbatim select tail collected so far
    lexemes: Vec<Lexeme>,
}

impl Parser {
    fn new(text: &str) -> Self {
        let mut scanner = Scanner::new(text);
        scanner.set_ignore_whitespace(true);
        Self {
            scanner,
            placeholder_index: 0,
            lexemes: Vec::new(),
        }
    }

    fn token(&self) -> Token {
        self.scanner.token()
    }

    fn text(&self) -> &str {
        self.scanner.text()
    }

    /// Advance to the next significant token. Comments are always dropped;
    /// white space reaches this loop only while the select tail is being
    /// copied, and is then recorded as a single lexeme.
    fn next(&mut self) -> Result<()> {
        if self.token() == Token::Placeholder {
            self.placeholder_index += 1;
        }
        loop {
            self.scanner.scan();
            match self.token() {
                Token::Illegal => {
                    let msg = self.scanner.err().unwrap_or("illegal token").to_string();
                    return Err(Error::Syntax(msg));
                }
                Token::Whitespace | Token::Comment => {
                    let separator = match self.token() {
                        Token::Whitespace => self.text().to_string(),
                        _ => " ".to_string(),
                    };
                    let after_text = self
                        .lexemes
                        .last()
                        .is_some_and(|l| !matches!(l, Lexeme::Whitespace(_)));
                    if after_text {
                        self.lexemes.push(Lexeme::Whitespace(separator));
                    }
                }
                _ => return Ok(()),
            }
        }
    }

    fn describe(&self) -> String {
        match self.token() {
            Token::Eof => "end of query".to_string(),
            _ => format!("{:?}", self.text()),
        }
    }

    fn is_operator(&self, op: &str) -> bool {
        self.token() == Token::Operator && self.text() == op
    }

    fn expect(&self, tokens: &[Token]) -> Result<()> {
        if tokens.contains(&self.token()) {
            return Ok(());
        }
        Err(Error::Syntax(format!("unexpected {}", self.describe())))
    }

    fn expect_text(&self, text: &str) -> Result<()> {
        if self.token() != Token::Eof && self.text().eq_ignore_ascii_case(text) {
            return Ok(());
        }
        Err(Error::Syntax(format!("expected {:?}, found {}", text, self.describe())))
    }

    fn expect_eof(&self) -> Result<()> {
        if self.token() == Token::Eof {
            return Ok(());
        }
        Err(Error::Syntax(format!("expected end of query, found {:?}", self.text())))
    }

    /// Expect an identifier, return it unquoted and advance
    fn expect_ident(&mut self) -> Result<String> {
        self.expect(&[Token::Ident])?;
        let name = unquote(self.text());
        self.next()?;
        Ok(name)
    }

    fn parse_ident_list(&mut self) -> Result<Vec<String>> {
        let mut names = vec![self.expect_ident()?];
        while self.is_operator(",") {
            self.next()?;
            names.push(self.expect_ident()?);
        }
        Ok(names)
    }

    /// Expect a placeholder or literal and advance
    fn parse_value_source(&mut self) -> Result<ValueSource> {
        self.expect(&[Token::Placeholder, Token::Literal])?;
        let source = match self.token() {
            Token::Placeholder => ValueSource::Placeholder(self.placeholder_index),
            _ => ValueSource::Literal(unquote(self.text())),
        };
        self.next()?;
        Ok(source)
    }

    fn parse_statement(&mut self) -> Result<Statement> {
        self.next()?;
        let first = self.text().to_lowercase();
        match first.as_str() {
            "select" | "consistent" => self.parse_select().map(Statement::Select),
            "update" => self.parse_update(false).map(Statement::Update),
            "upsert" => self.parse_update(true).map(Statement::Update),
            "insert" => self.parse_insert().map(Statement::Insert),
            "delete" => self.parse_delete().map(Statement::Delete),
            "create" => self.parse_create_table().map(Statement::CreateTable),
            "drop" => self.parse_drop_table().map(Statement::DropTable),
            _ => match self.token() {
                Token::Eof => Err(Error::Syntax("empty query".into())),
                Token::Keyword => Err(Error::Syntax(format!("unexpected keyword {:?}", first))),
                _ => Err(Error::Syntax(format!("unrecognized query {:?}", self.text()))),
            },
        }
    }

    fn parse_select(&mut self) -> Result<SelectStatement> {
        let mut consistent_read = false;
        if self.text().eq_ignore_ascii_case("consistent") {
            consistent_read = true;
            self.next()?;
            self.expect_text("select")?;
        }
        self.next()?;
        let column_names = self.parse_ident_list()?;

        self.expect_text("from")?;
        self.next()?;
        self.expect(&[Token::Ident])?;
        let table_name = unquote(self.text());
        self.next()?;

        // the tail is copied verbatim, so white space matters from here on
        self.scanner.set_ignore_whitespace(false);
        let where_clause = self.parse_select_tail()?;

        Ok(SelectStatement {
            consistent_read,
            column_names,
            table_name,
            where_clause,
        })
    }

    /// Match `where id = (placeholder|literal)` and nothing else. Any
    /// mismatch keeps everything, including the matched prefix, as a raw
    /// tail.
    fn parse_select_tail(&mut self) -> Result<WhereClause> {
        if self.token() == Token::Eof {
            return Ok(WhereClause::None);
        }
        if !self.text().eq_ignore_ascii_case("where") {
            return self.copy_remaining();
        }
        self.copy_text();
        self.next()?;

        if self.token() != Token::Ident || !is_id(self.text()) {
            return self.copy_remaining();
        }
        self.copy_text();
        self.next()?;

        if !self.is_operator("=") {
            return self.copy_remaining();
        }
        self.copy_text();
        self.next()?;

        let source = match self.token() {
            Token::Placeholder => ValueSource::Placeholder(self.placeholder_index),
            Token::Literal => ValueSource::Literal(unquote(self.text())),
            _ => return self.copy_remaining(),
        };
        self.copy_text();
        self.next()?;

        if self.token() != Token::Eof {
            return self.copy_remaining();
        }
        self.lexemes.clear();
        Ok(WhereClause::Key(Key { source }))
    }

    fn copy_text(&mut self) {
        let lexeme = match self.token() {
            Token::Ident => Lexeme::Ident(self.text().to_string()),
            Token::Placeholder => Lexeme::Placeholder(self.placeholder_index),
            _ => Lexeme::Text(self.text().to_string()),
        };
        self.lexemes.push(lexeme);
    }

    fn copy_remaining(&mut self) -> Result<WhereClause> {
        while self.token() != Token::Eof {
            self.copy_text();
            self.next()?;
        }
        Ok(WhereClause::Raw(std::mem::take(&mut self.lexemes)))
    }

    fn parse_update(&mut self, upsert: bool) -> Result<UpdateStatement> {
        self.next()?;
        let table_name = self.expect_ident()?;
        self.expect_text("set")?;
        self.next()?;

        let mut columns = vec![self.parse_assignment()?];
        while self.is_operator(",") {
            self.next()?;
            columns.push(self.parse_assignment()?);
        }

        let key = self.parse_key_clause()?;
        self.expect_eof()?;

        Ok(UpdateStatement {
            table_name,
            columns,
            key,
            upsert,
        })
    }

    fn parse_assignment(&mut self) -> Result<Column> {
        let column_name = self.expect_ident()?;
        self.expect_text("=")?;
        self.next()?;
        let source = self.parse_value_source()?;
        Ok(Column {
            column_name,
            source,
        })
    }

    /// `where id = (placeholder|literal)`
    fn parse_key_clause(&mut self) -> Result<Key> {
        self.expect_text("where")?;
        self.next()?;
        if self.token() != Token::Ident || !is_id(self.text()) {
            return Err(Error::Syntax(format!("expected \"id\", found {}", self.describe())));
        }
        self.next()?;
        self.expect_text("=")?;
        self.next()?;
        let source = self.parse_value_source()?;
        Ok(Key { source })
    }

    fn parse_insert(&mut self) -> Result<InsertStatement> {
        self.next()?;
        if self.token() == Token::Ident && self.text().eq_ignore_ascii_case("into") {
            self.next()?;
        }
        let table_name = self.expect_ident()?;

        self.expect_text("(")?;
        self.next()?;
        let names = self.parse_ident_list()?;
        self.expect_text(")")?;
        self.next()?;

        self.expect_text("values")?;
        self.next()?;
        self.expect_text("(")?;
        self.next()?;
        let mut sources = vec![self.parse_value_source()?];
        while self.is_operator(",") {
            self.next()?;
            sources.push(self.parse_value_source()?);
        }
        self.expect_text(")")?;
        self.next()?;
        self.expect_eof()?;

        if names.len() != sources.len() {
            return Err(Error::Syntax(format!(
                "column count {} does not match value count {}",
                names.len(),
                sources.len()
            )));
        }

        // the id column becomes the key; everything else is written
        let mut key = None;
        let mut columns = Vec::with_capacity(names.len());
        for (column_name, source) in names.into_iter().zip(sources) {
            if is_id(&column_name) {
                if key.is_some() {
                    return Err(Error::Syntax("duplicate id column in insert statement".into()));
                }
                key = Some(Key { source });
            } else {
                columns.push(Column {
                    column_name,
                    source,
                });
            }
        }
        let key = key.ok_or_else(|| Error::Syntax("missing id column in insert statement".into()))?;

        Ok(InsertStatement {
            table_name,
            columns,
            key,
        })
    }

    fn parse_delete(&mut self) -> Result<DeleteStatement> {
        self.next()?;
        if self.text().eq_ignore_ascii_case("from") && self.token() == Token::Keyword {
            self.next()?;
        }
        let table_name = self.expect_ident()?;
        let key = self.parse_key_clause()?;
        self.expect_eof()?;
        Ok(DeleteStatement { table_name, key })
    }

    fn parse_create_table(&mut self) -> Result<CreateTableStatement> {
        self.next()?;
        self.expect_text("table")?;
        self.next()?;
        let table_name = self.expect_ident()?;
        self.expect_eof()?;
        Ok(CreateTableStatement { table_name })
    }

    fn parse_drop_table(&mut self) -> Result<DropTableStatement> {
        self.next()?;
        self.expect_text("table")?;
        self.next()?;
        let table_name = self.expect_ident()?;
        self.expect_eof()?;
        Ok(DropTableStatement { table_name })
    }
}
