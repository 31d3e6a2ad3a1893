/// Select-expression language of the attribute store
///
/// Supports:
/// - **Projection**: `*`, `itemName()`, or a list of attribute names
/// - **Predicates**: =, <>, <, <=, >, >=, LIKE, NOT LIKE, IN, BETWEEN,
///   IS NULL, IS NOT NULL combined with AND, OR, NOT and parentheses
/// - **Operands**: attribute names, `every(attr)`, `itemName()`
/// - **ORDER BY** one operand (ASC or DESC) and **LIMIT**
///
/// All comparisons are lexicographic on the stored strings. An attribute
/// with several values satisfies a predicate when any value does; wrapped
/// in `every()` it must have at least one value and all values must.

use crate::lex::{unquote, Scanner, Token};
use crate::store::{codes, StoreError, StoreItem, StoreResult};
use regex::Regex;
use std::cmp::Ordering;

/// Attributes returned for each matching item
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Projection {
    All,
    ItemName,
    Attributes(Vec<String>),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Operand {
    Attribute(String),
    Every(String),
    ItemName,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl CompareOp {
    fn holds(self, ordering: Ordering) -> bool {
        match self {
            CompareOp::Eq => ordering == Ordering::Equal,
            CompareOp::Ne => ordering != Ordering::Equal,
            CompareOp::Lt => ordering == Ordering::Less,
            CompareOp::Le => ordering != Ordering::Greater,
            CompareOp::Gt => ordering == Ordering::Greater,
            CompareOp::Ge => ordering != Ordering::Less,
        }
    }
}

/// Where-clause AST node
#[derive(Debug, Clone)]
pub enum Condition {
    And(Box<Condition>, Box<Condition>),
    Or(Box<Condition>, Box<Condition>),
    Not(Box<Condition>),
    Compare(Operand, CompareOp, String),
    Like {
        operand: Operand,
        pattern: Regex,
        negated: bool,
    },
    In(Operand, Vec<String>),
    Between(Operand, String, String),
    IsNull {
        operand: Operand,
        negated: bool,
    },
}

#[derive(Debug, Clone)]
pub struct OrderBy {
    pub operand: Operand,
    pub descending: bool,
}

/// Parsed select expression
#[derive(Debug, Clone)]
pub struct SelectQuery {
    pub projection: Projection,
    pub domain: String,
    pub condition: Option<Condition>,
    pub order_by: Option<OrderBy>,
    pub limit: Option<usize>,
}

impl SelectQuery {
    /// Parse a select expression
    pub fn parse(expression: &str) -> StoreResult<Self> {
        let mut scanner = Scanner::new(expression);
        scanner.set_ignore_whitespace(true);
        let mut tokens = Vec::new();
        loop {
            scanner.scan();
            let token = scanner.token();
            if token == Token::Illegal {
                return Err(invalid(scanner.err().unwrap_or("illegal token")));
            }
            tokens.push((token, scanner.text().to_string()));
            if token == Token::Eof {
                break;
            }
        }

        let mut parser = ExprParser { tokens, pos: 0 };
        parser.parse_query()
    }

    /// Returns true if the item satisfies the where clause
    pub fn matches(&self, item: &StoreItem) -> bool {
        self.condition.as_ref().map_or(true, |c| evaluate(c, item))
    }

    /// Copy of the item restricted to the projected attributes
    pub fn project(&self, item: &StoreItem) -> StoreItem {
        let attributes = match &self.projection {
            Projection::All => item.attributes.clone(),
            Projection::ItemName => Vec::new(),
            Projection::Attributes(names) => item
                .attributes
                .iter()
                .filter(|a| names.contains(&a.name))
                .cloned()
                .collect(),
        };
        StoreItem {
            name: item.name.clone(),
            attributes,
        }
    }

    /// Filter, order, limit and project `items`, which arrive in item-name
    /// order.
    pub fn run<'a>(&self, items: impl IntoIterator<Item = &'a StoreItem>) -> Vec<StoreItem> {
        let mut matched: Vec<&StoreItem> = items.into_iter().filter(|i| self.matches(i)).collect();

        if let Some(order) = &self.order_by {
            matched.sort_by(|a, b| {
                let ka = sort_key(a, &order.operand);
                let kb = sort_key(b, &order.operand);
                if order.descending {
                    kb.cmp(&ka)
                } else {
                    ka.cmp(&kb)
                }
            });
        }
        if let Some(limit) = self.limit {
            matched.truncate(limit);
        }

        matched.into_iter().map(|i| self.project(i)).collect()
    }
}

fn invalid(message: impl Into<String>) -> StoreError {
    StoreError::new(codes::INVALID_QUERY_EXPRESSION, message)
}

fn operand_values<'a>(item: &'a StoreItem, operand: &Operand) -> Vec<&'a str> {
    match operand {
        Operand::ItemName => vec![item.name.as_str()],
        Operand::Attribute(name) | Operand::Every(name) => item
            .attributes
            .iter()
            .filter(|a| &a.name == name)
            .map(|a| a.value.as_str())
            .collect(),
    }
}

fn sort_key<'a>(item: &'a StoreItem, operand: &Operand) -> Option<&'a str> {
    operand_values(item, operand).into_iter().min()
}

fn test(item: &StoreItem, operand: &Operand, pred: impl Fn(&str) -> bool) -> bool {
    let values = operand_values(item, operand);
    match operand {
        Operand::Every(_) => !values.is_empty() && values.into_iter().all(pred),
        _ => values.into_iter().any(pred),
    }
}

fn evaluate(condition: &Condition, item: &StoreItem) -> bool {
    match condition {
        Condition::And(left, right) => evaluate(left, item) && evaluate(right, item),
        Condition::Or(left, right) => evaluate(left, item) || evaluate(right, item),
        Condition::Not(inner) => !evaluate(inner, item),
        Condition::Compare(operand, op, literal) => {
            test(item, operand, |v| op.holds(v.cmp(literal.as_str())))
        }
        Condition::Like {
            operand,
            pattern,
            negated,
        } => test(item, operand, |v| pattern.is_match(v) != *negated),
        Condition::In(operand, list) => test(item, operand, |v| list.iter().any(|l| l == v)),
        Condition::Between(operand, low, high) => {
            test(item, operand, |v| v >= low.as_str() && v <= high.as_str())
        }
        Condition::IsNull { operand, negated } => {
            operand_values(item, operand).is_empty() != *negated
        }
    }
}

/// Translate a `like` pattern into an anchored regex. `%` matches any run of
/// characters; `\` escapes the next character.
fn like_pattern(pattern: &str) -> StoreResult<Regex> {
    let mut re = String::from("(?s)^");
    let mut chars = pattern.chars();
    while let Some(ch) = chars.next() {
        match ch {
            '%' => re.push_str(".*"),
            '\\' => {
                if let Some(escaped) = chars.next() {
                    re.push_str(&regex::escape(&escaped.to_string()));
                }
            }
            _ => re.push_str(&regex::escape(&ch.to_string())),
        }
    }
    re.push('$');
    Regex::new(&re).map_err(|e| invalid(format!("invalid like pattern {:?}: {}", pattern, e)))
}

struct ExprParser {
    tokens: Vec<(Token, String)>,
    pos: usize,
}

impl ExprParser {
    fn token(&self) -> Token {
        self.tokens.get(self.pos).map_or(Token::Eof, |(t, _)| *t)
    }

    fn text(&self) -> &str {
        self.tokens.get(self.pos).map_or("", |(_, s)| s.as_str())
    }

    fn advance(&mut self) {
        self.pos += 1;
    }

    fn is_keyword(&self, keyword: &str) -> bool {
        self.token() == Token::Keyword && self.text() == keyword
    }

    fn is_operator(&self, op: &str) -> bool {
        self.token() == Token::Operator && self.text() == op
    }

    fn unexpected(&self) -> StoreError {
        match self.token() {
            Token::Eof => invalid("unexpected end of expression"),
            _ => invalid(format!("unexpected {:?}", self.text())),
        }
    }

    fn expect_keyword(&mut self, keyword: &str) -> StoreResult<()> {
        if !self.is_keyword(keyword) {
            return Err(self.unexpected());
        }
        self.advance();
        Ok(())
    }

    fn expect_operator(&mut self, op: &str) -> StoreResult<()> {
        if !self.is_operator(op) {
            return Err(self.unexpected());
        }
        self.advance();
        Ok(())
    }

    fn parse_name(&mut self) -> StoreResult<String> {
        if self.token() != Token::Ident {
            return Err(self.unexpected());
        }
        let name = unquote(self.text());
        self.advance();
        Ok(name)
    }

    fn parse_literal(&mut self) -> StoreResult<String> {
        if self.token() != Token::Literal {
            return Err(self.unexpected());
        }
        let value = unquote(self.text());
        self.advance();
        Ok(value)
    }

    /// `itemName()`, consumed when present
    fn take_item_name(&mut self) -> bool {
        let is_item_name = self.token() == Token::Ident
            && self.text().eq_ignore_ascii_case("itemName")
            && self.tokens.get(self.pos + 1).is_some_and(|(t, s)| *t == Token::Operator && s == "(")
            && self.tokens.get(self.pos + 2).is_some_and(|(t, s)| *t == Token::Operator && s == ")");
        if is_item_name {
            self.pos += 3;
        }
        is_item_name
    }

    fn parse_query(&mut self) -> StoreResult<SelectQuery> {
        self.expect_keyword("select")?;
        let projection = if self.is_operator("*") {
            self.advance();
            Projection::All
        } else if self.take_item_name() {
            Projection::ItemName
        } else {
            let mut names = vec![self.parse_name()?];
            while self.is_operator(",") {
                self.advance();
                names.push(self.parse_name()?);
            }
            Projection::Attributes(names)
        };

        self.expect_keyword("from")?;
        let domain = self.parse_name()?;

        let mut condition = None;
        if self.is_keyword("where") {
            self.advance();
            condition = Some(self.parse_or()?);
        }

        let mut order_by = None;
        if self.is_keyword("order") {
            self.advance();
            self.expect_keyword("by")?;
            let operand = self.parse_operand()?;
            let mut descending = false;
            if self.is_keyword("asc") {
                self.advance();
            } else if self.is_keyword("desc") {
                self.advance();
                descending = true;
            }
            order_by = Some(OrderBy { operand, descending });
        }

        let mut limit = None;
        if self.is_keyword("limit") {
            self.advance();
            let text = self.parse_literal()?;
            let n = text
                .parse::<usize>()
                .map_err(|_| invalid(format!("invalid limit {:?}", text)))?;
            limit = Some(n);
        }

        if self.token() != Token::Eof {
            return Err(self.unexpected());
        }

        Ok(SelectQuery {
            projection,
            domain,
            condition,
            order_by,
            limit,
        })
    }

    fn parse_or(&mut self) -> StoreResult<Condition> {
        let mut left = self.parse_and()?;
        while self.is_keyword("or") {
            self.advance();
            let right = self.parse_and()?;
            left = Condition::Or(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_and(&mut self) -> StoreResult<Condition> {
        let mut left = self.parse_not()?;
        while self.is_keyword("and") {
            self.advance();
            let right = self.parse_not()?;
            left = Condition::And(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_not(&mut self) -> StoreResult<Condition> {
        if self.is_keyword("not") {
            self.advance();
            let inner = self.parse_not()?;
            return Ok(Condition::Not(Box::new(inner)));
        }
        self.parse_predicate()
    }

    fn parse_operand(&mut self) -> StoreResult<Operand> {
        if self.take_item_name() {
            return Ok(Operand::ItemName);
        }
        if self.is_keyword("every") {
            self.advance();
            self.expect_operator("(")?;
            let name = self.parse_name()?;
            self.expect_operator(")")?;
            return Ok(Operand::Every(name));
        }
        Ok(Operand::Attribute(self.parse_name()?))
    }

    fn parse_predicate(&mut self) -> StoreResult<Condition> {
        if self.is_operator("(") {
            self.advance();
            let inner = self.parse_or()?;
            self.expect_operator(")")?;
            return Ok(inner);
        }

        let operand = self.parse_operand()?;

        if self.token() == Token::Operator {
            let op = match self.text() {
                "=" => CompareOp::Eq,
                "<>" => CompareOp::Ne,
                "<" => CompareOp::Lt,
                ">" => CompareOp::Gt,
                _ => return Err(self.unexpected()),
            };
            self.advance();
            // `<=` and `>=` arrive as two operator tokens
            let op = match op {
                CompareOp::Lt if self.is_operator("=") => {
                    self.advance();
                    CompareOp::Le
                }
                CompareOp::Gt if self.is_operator("=") => {
                    self.advance();
                    CompareOp::Ge
                }
                op => op,
            };
            let literal = self.parse_literal()?;
            return Ok(Condition::Compare(operand, op, literal));
        }

        if self.is_keyword("like") {
            self.advance();
            let pattern = like_pattern(&self.parse_literal()?)?;
            return Ok(Condition::Like {
                operand,
                pattern,
                negated: false,
            });
        }

        if self.is_keyword("not") {
            self.advance();
            self.expect_keyword("like")?;
            let pattern = like_pattern(&self.parse_literal()?)?;
            return Ok(Condition::Like {
                operand,
                pattern,
                negated: true,
            });
        }

        if self.is_keyword("in") {
            self.advance();
            self.expect_operator("(")?;
            let mut values = vec![self.parse_literal()?];
            while self.is_operator(",") {
                self.advance();
                values.push(self.parse_literal()?);
            }
            self.expect_operator(")")?;
            return Ok(Condition::In(operand, values));
        }

        if self.is_keyword("between") {
            self.advance();
            let low = self.parse_literal()?;
            self.expect_keyword("and")?;
            let high = self.parse_literal()?;
            return Ok(Condition::Between(operand, low, high));
        }

        if self.is_keyword("is") {
            self.advance();
            let mut negated = false;
            if self.is_keyword("not") {
                self.advance();
                negated = true;
            }
            self.expect_keyword("null")?;
            return Ok(Condition::IsNull { operand, negated });
        }

        Err(self.unexpected())
    }
}
