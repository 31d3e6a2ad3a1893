/// Lexical scanner for sdbsql statements
///
/// Splits statement text into classified tokens: identifiers (bare or
/// delimited), keywords, literals, operators, placeholders, comments and
/// white space. The scanner keeps only the most recent token; callers pull
/// tokens one at a time with [`Scanner::scan`].

use std::collections::HashSet;

/// Lexical token class
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Token {
    /// Unexpected character or unterminated quote
    Illegal,
    /// End of input
    Eof,
    /// White space
    Whitespace,
    /// `--` line comment
    Comment,
    /// Identifier, which may be delimited
    Ident,
    /// Keyword (text is reported lower-cased)
    Keyword,
    /// String, binary or numeric literal
    Literal,
    /// Operator or punctuation
    Operator,
    /// Positional placeholder (`?`)
    Placeholder,
}

const OPERATORS: &str = "%&()*+,-./:;<=>?^|{}";

/// Words that are scanned as [`Token::Keyword`] unless configured otherwise.
///
/// The first group is reserved by the store's select language, the second
/// group is needed by the statement grammar.
pub const DEFAULT_KEYWORDS: &[&str] = &[
    "or", "and", "not", "from", "where", "select", "like", "null", "is", "order", "by", "asc",
    "desc", "in", "between", "intersection", "limit", "every",
    "update", "upsert", "insert", "delete", "create", "drop", "table", "values", "set",
];

/// Simple lexical scanner for SQL statements
#[derive(Debug)]
pub struct Scanner {
    input: Vec<char>,
    pos: usize,
    ignore_whitespace: bool,
    keywords: HashSet<String>,
    err: Option<String>,
    token: Token,
    text: String,
}

impl Scanner {
    /// Create a scanner over `text` using [`DEFAULT_KEYWORDS`].
    pub fn new(text: &str) -> Self {
        Self::with_keywords(text, DEFAULT_KEYWORDS.iter().copied())
    }

    /// Create a scanner with a custom keyword set. Keywords match
    /// case-insensitively.
    pub fn with_keywords<'a>(text: &str, keywords: impl IntoIterator<Item = &'a str>) -> Self {
        Self {
            input: text.chars().collect(),
            pos: 0,
            ignore_whitespace: false,
            keywords: keywords.into_iter().map(|k| k.to_lowercase()).collect(),
            err: None,
            token: Token::Eof,
            text: String::new(),
        }
    }

    /// When set, white space and comments are skipped instead of being
    /// reported. May be toggled between calls to [`Scanner::scan`].
    pub fn set_ignore_whitespace(&mut self, ignore: bool) {
        self.ignore_whitespace = ignore;
    }

    pub fn ignore_whitespace(&self) -> bool {
        self.ignore_whitespace
    }

    /// Token from the last scan
    pub fn token(&self) -> Token {
        self.token
    }

    /// Token text from the last scan
    pub fn text(&self) -> &str {
        &self.text
    }

    /// First error encountered, if any
    pub fn err(&self) -> Option<&str> {
        self.err.as_deref()
    }

    /// Scan the next token.
    ///
    /// Returns false at end of input or after an illegal token. Once an
    /// error has been recorded every further call returns false and the
    /// scanner stays on the illegal token.
    pub fn scan(&mut self) -> bool {
        if self.err.is_some() {
            return false;
        }
        loop {
            let more = self.scan_one();
            if self.ignore_whitespace
                && matches!(self.token, Token::Whitespace | Token::Comment)
            {
                continue;
            }
            return more;
        }
    }

    fn scan_one(&mut self) -> bool {
        let ch = match self.read() {
            Some(ch) => ch,
            None => return self.set_token(Token::Eof, String::new()),
        };

        if ch.is_whitespace() {
            self.unread();
            return self.scan_whitespace();
        }

        match ch {
            '-' => {
                if self.peek() == Some('-') {
                    self.read();
                    return self.scan_comment();
                }
                self.set_token(Token::Operator, ch.to_string())
            }
            '[' => self.scan_delimited_identifier('[', ']'),
            '`' => self.scan_delimited_identifier('`', '`'),
            '"' => self.scan_delimited_identifier('"', '"'),
            '{' => self.scan_delimited_identifier('{', '}'),
            '\'' => self.scan_quote(None),
            'N' | 'n' | 'X' | 'x' if self.peek() == Some('\'') => {
                self.read();
                self.scan_quote(Some(ch))
            }
            '.' if self.peek().is_some_and(|c| c.is_ascii_digit()) => self.scan_number(ch),
            '<' if self.peek() == Some('>') => {
                self.read();
                self.set_token(Token::Operator, "<>".to_string())
            }
            '?' => self.set_token(Token::Placeholder, ch.to_string()),
            _ if is_start_ident(ch) => self.scan_identifier(ch),
            _ if ch.is_ascii_digit() => self.scan_number(ch),
            _ if OPERATORS.contains(ch) => self.set_token(Token::Operator, ch.to_string()),
            _ => self.set_token(Token::Illegal, ch.to_string()),
        }
    }

    fn set_token(&mut self, token: Token, text: String) -> bool {
        if token == Token::Illegal {
            self.err = Some(format!("unrecognised input near {:?}", text));
        }
        self.token = token;
        self.text = text;
        !matches!(token, Token::Eof | Token::Illegal)
    }

    fn scan_whitespace(&mut self) -> bool {
        let mut buf = String::new();
        while let Some(ch) = self.peek() {
            if !ch.is_whitespace() {
                break;
            }
            buf.push(ch);
            self.pos += 1;
        }
        self.set_token(Token::Whitespace, buf)
    }

    fn scan_comment(&mut self) -> bool {
        let mut buf = String::from("--");
        while let Some(ch) = self.read() {
            buf.push(ch);
            if ch == '\n' {
                break;
            }
        }
        self.set_token(Token::Comment, buf)
    }

    fn scan_delimited_identifier(&mut self, start: char, end: char) -> bool {
        let mut buf = String::new();
        buf.push(start);
        loop {
            let ch = match self.read() {
                Some(ch) => ch,
                None => return self.set_token(Token::Illegal, buf),
            };
            buf.push(ch);
            if ch == end {
                // a doubled closing delimiter is an escape
                if self.peek() != Some(end) {
                    break;
                }
                self.read();
                buf.push(end);
            }
        }
        self.set_token(Token::Ident, buf)
    }

    fn scan_identifier(&mut self, start: char) -> bool {
        let mut buf = String::new();
        buf.push(start);
        while let Some(ch) = self.peek() {
            if !is_ident(ch) {
                break;
            }
            buf.push(ch);
            self.pos += 1;
        }
        let lower = buf.to_lowercase();
        if self.keywords.contains(&lower) {
            return self.set_token(Token::Keyword, lower);
        }
        self.set_token(Token::Ident, buf)
    }

    fn scan_number(&mut self, start: char) -> bool {
        let mut buf = String::new();
        buf.push(start);
        let mut seen_point = start == '.';
        while let Some(ch) = self.peek() {
            if ch.is_ascii_digit() || (ch == '.' && !seen_point) {
                seen_point |= ch == '.';
                buf.push(ch);
                self.pos += 1;
            } else {
                break;
            }
        }
        self.set_token(Token::Literal, buf)
    }

    fn scan_quote(&mut self, prefix: Option<char>) -> bool {
        let mut buf = String::new();
        if let Some(p) = prefix {
            buf.push(p);
        }
        buf.push('\'');
        loop {
            let ch = match self.read() {
                Some(ch) => ch,
                None => return self.set_token(Token::Illegal, buf),
            };
            buf.push(ch);
            if ch == '\'' {
                if self.peek() != Some('\'') {
                    break;
                }
                self.read();
                buf.push('\'');
            }
        }
        self.set_token(Token::Literal, buf)
    }

    fn read(&mut self) -> Option<char> {
        let ch = self.input.get(self.pos).copied();
        if ch.is_some() {
            self.pos += 1;
        }
        ch
    }

    fn unread(&mut self) {
        self.pos -= 1;
    }

    fn peek(&self) -> Option<char> {
        self.input.get(self.pos).copied()
    }
}

fn is_start_ident(ch: char) -> bool {
    ch == '_' || ch.is_alphabetic()
}

fn is_ident(ch: char) -> bool {
    is_start_ident(ch) || ch.is_ascii_digit()
}

/// Remove identifier delimiters or literal quotes from `text`.
///
/// Doubled delimiters inside the quoted text collapse to one. Literal
/// prefixes (`N'..'`, `X'..'`) are dropped. Text that is not quoted is
/// returned unchanged.
pub fn unquote(text: &str) -> String {
    let body = match text.chars().next() {
        Some('N' | 'n' | 'X' | 'x') if text[1..].starts_with('\'') => &text[1..],
        _ => text,
    };
    let end = match body.chars().next() {
        Some('[') => ']',
        Some('`') => '`',
        Some('"') => '"',
        Some('{') => '}',
        Some('\'') => '\'',
        _ => return text.to_string(),
    };
    if body.len() < 2 || !body.ends_with(end) {
        return text.to_string();
    }
    let inner = &body[1..body.len() - 1];
    let doubled: String = [end, end].iter().collect();
    inner.replace(&doubled, &end.to_string())
}

/// Returns true if `name` refers to the item-name column (`id`), in any
/// case and with or without delimiters.
pub fn is_id(name: &str) -> bool {
    unquote(name).eq_ignore_ascii_case("id")
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn scan_all(text: &str, ignore_whitespace: bool) -> Vec<(Token, String)> {
        let mut scanner = Scanner::new(text);
        scanner.set_ignore_whitespace(ignore_whitespace);
        let mut tokens = Vec::new();
        while scanner.scan() {
            tokens.push((scanner.token(), scanner.text().to_string()));
        }
        tokens.push((scanner.token(), scanner.text().to_string()));
        tokens
    }

    fn tok(token: Token, text: &str) -> (Token, String) {
        (token, text.to_string())
    }

    #[test]
    fn test_scan_select() {
        let tokens = scan_all("select a, [b c] from `tbl` where x <> ? -- trailing\n", false);
        assert_eq!(
            tokens,
            vec![
                tok(Token::Keyword, "select"),
                tok(Token::Whitespace, " "),
                tok(Token::Ident, "a"),
                tok(Token::Operator, ","),
                tok(Token::Whitespace, " "),
                tok(Token::Ident, "[b c]"),
                tok(Token::Whitespace, " "),
                tok(Token::Keyword, "from"),
                tok(Token::Whitespace, " "),
                tok(Token::Ident, "`tbl`"),
                tok(Token::Whitespace, " "),
                tok(Token::Keyword, "where"),
                tok(Token::Whitespace, " "),
                tok(Token::Ident, "x"),
                tok(Token::Whitespace, " "),
                tok(Token::Operator, "<>"),
                tok(Token::Whitespace, " "),
                tok(Token::Placeholder, "?"),
                tok(Token::Whitespace, " "),
                tok(Token::Comment, "-- trailing\n"),
                tok(Token::Eof, ""),
            ]
        );
    }

    #[test]
    fn test_ignore_whitespace() {
        let tokens = scan_all("SELECT  a--c\n,b", true);
        assert_eq!(
            tokens,
            vec![
                tok(Token::Keyword, "select"),
                tok(Token::Ident, "a"),
                tok(Token::Operator, ","),
                tok(Token::Ident, "b"),
                tok(Token::Eof, ""),
            ]
        );
    }

    #[test]
    fn test_toggle_whitespace_mid_scan() {
        let mut scanner = Scanner::new("a  b  c");
        scanner.set_ignore_whitespace(true);
        assert!(scanner.scan());
        assert_eq!(scanner.text(), "a");
        assert!(scanner.scan());
        assert_eq!(scanner.text(), "b");
        scanner.set_ignore_whitespace(false);
        assert!(scanner.scan());
        assert_eq!(scanner.token(), Token::Whitespace);
        assert_eq!(scanner.text(), "  ");
    }

    #[test]
    fn test_literals() {
        let tokens = scan_all("'it''s' N'x' x'0A' 12 3.25 .5 1.2.3", true);
        assert_eq!(
            tokens,
            vec![
                tok(Token::Literal, "'it''s'"),
                tok(Token::Literal, "N'x'"),
                tok(Token::Literal, "x'0A'"),
                tok(Token::Literal, "12"),
                tok(Token::Literal, "3.25"),
                tok(Token::Literal, ".5"),
                tok(Token::Literal, "1.2"),
                tok(Token::Literal, ".3"),
                tok(Token::Eof, ""),
            ]
        );
    }

    #[test]
    fn test_n_and_x_identifiers() {
        let tokens = scan_all("name xray n", true);
        assert_eq!(
            tokens,
            vec![
                tok(Token::Ident, "name"),
                tok(Token::Ident, "xray"),
                tok(Token::Ident, "n"),
                tok(Token::Eof, ""),
            ]
        );
    }

    #[test]
    fn test_delimited_identifiers() {
        let tokens = scan_all(r#"[a]]b] "x""y" {p}}q} `m``n`"#, true);
        assert_eq!(
            tokens,
            vec![
                tok(Token::Ident, "[a]]b]"),
                tok(Token::Ident, r#""x""y""#),
                tok(Token::Ident, "{p}}q}"),
                tok(Token::Ident, "`m``n`"),
                tok(Token::Eof, ""),
            ]
        );
    }

    #[test]
    fn test_placeholders_are_single() {
        let tokens = scan_all("??", true);
        assert_eq!(
            tokens,
            vec![
                tok(Token::Placeholder, "?"),
                tok(Token::Placeholder, "?"),
                tok(Token::Eof, ""),
            ]
        );
    }

    #[test]
    fn test_custom_keywords() {
        let mut scanner = Scanner::with_keywords("Select Foo", ["foo"]);
        assert!(scanner.scan());
        assert_eq!(scanner.token(), Token::Ident);
        assert_eq!(scanner.text(), "Select");
        scanner.scan();
        assert!(scanner.scan());
        assert_eq!(scanner.token(), Token::Keyword);
        assert_eq!(scanner.text(), "foo");
    }

    #[test]
    fn test_illegal_halts() {
        let mut scanner = Scanner::new("a 'unterminated");
        scanner.set_ignore_whitespace(true);
        assert!(scanner.scan());
        assert!(!scanner.scan());
        assert_eq!(scanner.token(), Token::Illegal);
        assert_eq!(scanner.err(), Some("unrecognised input near \"'unterminated\""));
        assert!(!scanner.scan());
        assert_eq!(scanner.token(), Token::Illegal);

        let mut scanner = Scanner::new("a # b");
        scanner.set_ignore_whitespace(true);
        scanner.scan();
        assert!(!scanner.scan());
        assert_eq!(scanner.err(), Some("unrecognised input near \"#\""));
    }

    #[test]
    fn test_eof_is_idempotent() {
        let mut scanner = Scanner::new("x");
        assert!(scanner.scan());
        assert!(!scanner.scan());
        assert!(!scanner.scan());
        assert_eq!(scanner.token(), Token::Eof);
        assert_eq!(scanner.err(), None);
    }

    #[test]
    fn test_unquote() {
        assert_eq!(unquote("plain"), "plain");
        assert_eq!(unquote("[a]]b]"), "a]b");
        assert_eq!(unquote("`m``n`"), "m`n");
        assert_eq!(unquote(r#""x""y""#), r#"x"y"#);
        assert_eq!(unquote("{p}}q}"), "p}q");
        assert_eq!(unquote("'it''s'"), "it's");
        assert_eq!(unquote("N'abc'"), "abc");
        assert_eq!(unquote("''"), "");
        assert_eq!(unquote("42"), "42");
    }

    #[test]
    fn test_is_id() {
        assert!(is_id("id"));
        assert!(is_id("ID"));
        assert!(is_id("`Id`"));
        assert!(is_id("[id]"));
        assert!(!is_id("idx"));
        assert!(!is_id("'x'"));
    }

    proptest! {
        #[test]
        fn prop_quoted_literal_unquotes(s in "[^\\x00]{0,40}") {
            let quoted = format!("'{}'", s.replace('\'', "''"));
            let mut scanner = Scanner::new(&quoted);
            prop_assert!(scanner.scan());
            prop_assert_eq!(scanner.token(), Token::Literal);
            prop_assert_eq!(scanner.text(), quoted.as_str());
            prop_assert_eq!(unquote(scanner.text()), s);
        }

        #[test]
        fn prop_scanner_never_panics(s in "\\PC{0,60}") {
            let mut scanner = Scanner::new(&s);
            let mut steps = 0;
            while scanner.scan() {
                steps += 1;
                prop_assert!(steps <= s.chars().count());
            }
        }
    }
}
