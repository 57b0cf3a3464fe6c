//! Tokenizer and parser for the statements the in-memory engine runs.
//!
//! The grammar is deliberately small:
//!
//! ```text
//! INSERT INTO t [(c, ...)] VALUES (v, ...)[, (v, ...)]
//! SELECT * FROM t | SELECT c, ... FROM t
//! TRUNCATE [TABLE] t
//! BEGIN [WORK] | START TRANSACTION | COMMIT [WORK] | ROLLBACK [WORK]
//! ```
//!
//! Keywords are case-insensitive, identifiers may be backtick-quoted and a
//! trailing `;` is optional. Values are literals or `?` placeholders.

use std::iter::Peekable;
use std::str::Chars;

use sqlsession_core::Value;
use sqlsession_core::error::{Error, QueryErrorKind, Result};

#[derive(Debug, Clone, PartialEq)]
enum Token {
    /// Bare word: a keyword or an unquoted identifier.
    Word(String),
    /// Backtick-quoted identifier, never a keyword.
    Quoted(String),
    Str(String),
    Number(String),
    Placeholder,
    Symbol(char),
}

impl Token {
    fn describe(&self) -> String {
        match self {
            Token::Word(w) => w.clone(),
            Token::Quoted(q) => format!("`{q}`"),
            Token::Str(s) => format!("'{s}'"),
            Token::Number(n) => n.clone(),
            Token::Placeholder => "?".to_string(),
            Token::Symbol(c) => c.to_string(),
        }
    }
}

/// A value position in an `INSERT`.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Literal(Value),
    /// Zero-based index into the bound parameters.
    Param(usize),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Projection {
    All,
    Columns(Vec<String>),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Statement {
    Insert {
        table: String,
        /// `None` when the statement lists no columns: every column, in
        /// table order.
        columns: Option<Vec<String>>,
        rows: Vec<Vec<Expr>>,
    },
    Select {
        table: String,
        projection: Projection,
    },
    Truncate {
        table: String,
    },
    Begin,
    Commit,
    Rollback,
}

impl Statement {
    pub fn kind(&self) -> &'static str {
        match self {
            Statement::Insert { .. } => "INSERT",
            Statement::Select { .. } => "SELECT",
            Statement::Truncate { .. } => "TRUNCATE",
            Statement::Begin => "BEGIN",
            Statement::Commit => "COMMIT",
            Statement::Rollback => "ROLLBACK",
        }
    }
}

/// A parsed statement and the number of `?` placeholders it contains.
#[derive(Debug, Clone, PartialEq)]
pub struct Parsed {
    pub statement: Statement,
    pub param_count: usize,
}

fn syntax(message: impl Into<String>) -> Error {
    Error::query(QueryErrorKind::Syntax, message)
}

fn tokenize(sql: &str) -> Result<Vec<Token>> {
    let mut tokens = Vec::new();
    let mut chars = sql.chars().peekable();

    while let Some(&ch) = chars.peek() {
        match ch {
            c if c.is_whitespace() => {
                chars.next();
            }
            '-' if sql_comment_ahead(&chars) => {
                for c in chars.by_ref() {
                    if c == '\n' {
                        break;
                    }
                }
            }
            '#' => {
                for c in chars.by_ref() {
                    if c == '\n' {
                        break;
                    }
                }
            }
            '/' if block_comment_ahead(&chars) => {
                chars.next();
                chars.next();
                let mut prev = '\0';
                let mut closed = false;
                for c in chars.by_ref() {
                    if prev == '*' && c == '/' {
                        closed = true;
                        break;
                    }
                    prev = c;
                }
                if !closed {
                    return Err(syntax("unterminated comment"));
                }
            }
            '\'' | '"' => {
                chars.next();
                tokens.push(Token::Str(read_string(ch, &mut chars)?));
            }
            '`' => {
                chars.next();
                let mut ident = String::new();
                loop {
                    match chars.next() {
                        Some('`') if chars.peek() == Some(&'`') => {
                            chars.next();
                            ident.push('`');
                        }
                        Some('`') => break,
                        Some(c) => ident.push(c),
                        None => return Err(syntax("unterminated quoted identifier")),
                    }
                }
                tokens.push(Token::Quoted(ident));
            }
            '?' => {
                chars.next();
                tokens.push(Token::Placeholder);
            }
            c if c.is_ascii_digit() || (c == '.' && digit_after_dot(&chars)) => {
                let mut number = String::new();
                while let Some(&c) = chars.peek() {
                    let exponent_sign =
                        (c == '+' || c == '-') && number.ends_with(['e', 'E']);
                    if c.is_ascii_alphanumeric() || c == '.' || exponent_sign {
                        number.push(c);
                        chars.next();
                    } else {
                        break;
                    }
                }
                tokens.push(Token::Number(number));
            }
            c if c.is_alphabetic() || c == '_' => {
                let mut word = String::new();
                while let Some(&c) = chars.peek() {
                    if c.is_alphanumeric() || c == '_' || c == '$' {
                        word.push(c);
                        chars.next();
                    } else {
                        break;
                    }
                }
                tokens.push(Token::Word(word));
            }
            '(' | ')' | ',' | '*' | ';' | '-' | '+' | '.' => {
                chars.next();
                tokens.push(Token::Symbol(ch));
            }
            other => return Err(syntax(format!("unexpected character '{other}'"))),
        }
    }

    Ok(tokens)
}

fn sql_comment_ahead(chars: &Peekable<Chars<'_>>) -> bool {
    let mut ahead = chars.clone();
    ahead.next();
    ahead.next() == Some('-')
}

fn block_comment_ahead(chars: &Peekable<Chars<'_>>) -> bool {
    let mut ahead = chars.clone();
    ahead.next();
    ahead.next() == Some('*')
}

fn digit_after_dot(chars: &Peekable<Chars<'_>>) -> bool {
    let mut ahead = chars.clone();
    ahead.next();
    ahead.next().is_some_and(|c| c.is_ascii_digit())
}

/// Read a quoted string after its opening quote. A doubled quote and the
/// usual backslash escapes are unescaped.
fn read_string(quote: char, chars: &mut Peekable<Chars<'_>>) -> Result<String> {
    let mut out = String::new();
    loop {
        match chars.next() {
            Some(c) if c == quote => {
                if chars.peek() == Some(&quote) {
                    chars.next();
                    out.push(quote);
                } else {
                    return Ok(out);
                }
            }
            Some('\\') => match chars.next() {
                Some('n') => out.push('\n'),
                Some('r') => out.push('\r'),
                Some('t') => out.push('\t'),
                Some('0') => out.push('\0'),
                Some('Z') => out.push('\x1a'),
                Some(c) => out.push(c),
                None => break,
            },
            Some(c) => out.push(c),
            None => break,
        }
    }
    Err(syntax("unterminated string literal"))
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    params: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn error_here(&self) -> Error {
        match self.peek() {
            Some(token) => syntax(format!("syntax error near '{}'", token.describe())),
            None => syntax("unexpected end of statement"),
        }
    }

    fn at_keyword(&self, keyword: &str) -> bool {
        matches!(self.peek(), Some(Token::Word(w)) if w.eq_ignore_ascii_case(keyword))
    }

    fn eat_keyword(&mut self, keyword: &str) -> bool {
        if self.at_keyword(keyword) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect_keyword(&mut self, keyword: &str) -> Result<()> {
        if self.eat_keyword(keyword) {
            Ok(())
        } else {
            Err(self.error_here())
        }
    }

    fn eat_symbol(&mut self, symbol: char) -> bool {
        if self.peek() == Some(&Token::Symbol(symbol)) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect_symbol(&mut self, symbol: char) -> Result<()> {
        if self.eat_symbol(symbol) {
            Ok(())
        } else {
            Err(self.error_here())
        }
    }

    fn identifier(&mut self) -> Result<String> {
        match self.peek() {
            Some(Token::Word(w) | Token::Quoted(w)) => {
                let ident = w.clone();
                self.pos += 1;
                Ok(ident)
            }
            _ => Err(self.error_here()),
        }
    }

    fn identifier_list(&mut self) -> Result<Vec<String>> {
        let mut idents = vec![self.identifier()?];
        while self.eat_symbol(',') {
            idents.push(self.identifier()?);
        }
        Ok(idents)
    }

    fn statement(&mut self) -> Result<Statement> {
        let Some(Token::Word(head)) = self.peek().cloned() else {
            return Err(self.error_here());
        };
        self.pos += 1;

        match head.to_ascii_uppercase().as_str() {
            "INSERT" => self.insert(),
            "SELECT" => self.select(),
            "TRUNCATE" => {
                self.eat_keyword("TABLE");
                Ok(Statement::Truncate {
                    table: self.identifier()?,
                })
            }
            "BEGIN" => {
                self.eat_keyword("WORK");
                Ok(Statement::Begin)
            }
            "START" => {
                self.expect_keyword("TRANSACTION")?;
                Ok(Statement::Begin)
            }
            "COMMIT" => {
                self.eat_keyword("WORK");
                Ok(Statement::Commit)
            }
            "ROLLBACK" => {
                self.eat_keyword("WORK");
                Ok(Statement::Rollback)
            }
            _ => Err(syntax(format!(
                "unsupported statement '{head}' for the in-memory engine"
            ))),
        }
    }

    fn insert(&mut self) -> Result<Statement> {
        self.expect_keyword("INTO")?;
        let table = self.identifier()?;

        let columns = if self.eat_symbol('(') {
            let columns = self.identifier_list()?;
            self.expect_symbol(')')?;
            Some(columns)
        } else {
            None
        };

        if !self.eat_keyword("VALUES") && !self.eat_keyword("VALUE") {
            return Err(self.error_here());
        }

        let mut rows = vec![self.value_row()?];
        while self.eat_symbol(',') {
            rows.push(self.value_row()?);
        }

        Ok(Statement::Insert {
            table,
            columns,
            rows,
        })
    }

    fn value_row(&mut self) -> Result<Vec<Expr>> {
        self.expect_symbol('(')?;
        let mut exprs = vec![self.expr()?];
        while self.eat_symbol(',') {
            exprs.push(self.expr()?);
        }
        self.expect_symbol(')')?;
        Ok(exprs)
    }

    fn expr(&mut self) -> Result<Expr> {
        let negative = if self.eat_symbol('-') {
            true
        } else {
            self.eat_symbol('+');
            false
        };

        let token = self.peek().cloned();
        let expr = match token {
            Some(Token::Number(n)) => Expr::Literal(parse_number(&n, negative)?),
            _ if negative => return Err(self.error_here()),
            Some(Token::Placeholder) => {
                let index = self.params;
                self.params += 1;
                Expr::Param(index)
            }
            Some(Token::Str(s)) => Expr::Literal(Value::Text(s)),
            Some(Token::Word(w)) if w.eq_ignore_ascii_case("NULL") => Expr::Literal(Value::Null),
            Some(Token::Word(w)) if w.eq_ignore_ascii_case("TRUE") => {
                Expr::Literal(Value::Bool(true))
            }
            Some(Token::Word(w)) if w.eq_ignore_ascii_case("FALSE") => {
                Expr::Literal(Value::Bool(false))
            }
            _ => return Err(self.error_here()),
        };
        self.pos += 1;
        Ok(expr)
    }

    fn select(&mut self) -> Result<Statement> {
        let projection = if self.eat_symbol('*') {
            Projection::All
        } else {
            Projection::Columns(self.identifier_list()?)
        };
        self.expect_keyword("FROM")?;
        Ok(Statement::Select {
            table: self.identifier()?,
            projection,
        })
    }
}

fn parse_number(text: &str, negative: bool) -> Result<Value> {
    let signed = if negative {
        format!("-{text}")
    } else {
        text.to_string()
    };
    if let Ok(v) = signed.parse::<i64>() {
        return Ok(Value::BigInt(v));
    }
    signed
        .parse::<f64>()
        .ok()
        .filter(|v| v.is_finite())
        .map(Value::Double)
        .ok_or_else(|| syntax(format!("invalid number '{text}'")))
}

/// Parse one statement.
pub fn parse(sql: &str) -> Result<Parsed> {
    let tokens = tokenize(sql).map_err(|e| e.with_sql(sql))?;
    if tokens.is_empty() {
        return Err(syntax("query was empty").with_sql(sql));
    }

    let mut parser = Parser {
        tokens,
        pos: 0,
        params: 0,
    };
    let statement = parser.statement().map_err(|e| e.with_sql(sql))?;
    parser.eat_symbol(';');
    if parser.peek().is_some() {
        return Err(parser.error_here().with_sql(sql));
    }

    Ok(Parsed {
        statement,
        param_count: parser.params,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kind_of(err: &Error) -> QueryErrorKind {
        match err {
            Error::Query(q) => q.kind,
            other => panic!("expected query error, got {other:?}"),
        }
    }

    #[test]
    fn fixture_statements() {
        let insert = parse("INSERT INTO table_1 (some_field) VALUES (?);").unwrap();
        assert_eq!(insert.param_count, 1);
        assert_eq!(
            insert.statement,
            Statement::Insert {
                table: "table_1".into(),
                columns: Some(vec!["some_field".into()]),
                rows: vec![vec![Expr::Param(0)]],
            }
        );

        let select = parse("SELECT * FROM table_1;").unwrap();
        assert_eq!(
            select.statement,
            Statement::Select {
                table: "table_1".into(),
                projection: Projection::All,
            }
        );

        let truncate = parse("TRUNCATE table_1;").unwrap();
        assert_eq!(
            truncate.statement,
            Statement::Truncate {
                table: "table_1".into()
            }
        );
        assert_eq!(truncate.param_count, 0);
    }

    #[test]
    fn keywords_are_case_insensitive() {
        let parsed = parse("select `id`, some_field from `table_1`").unwrap();
        assert_eq!(
            parsed.statement,
            Statement::Select {
                table: "table_1".into(),
                projection: Projection::Columns(vec!["id".into(), "some_field".into()]),
            }
        );
        assert_eq!(
            parse("truncate TABLE t").unwrap().statement,
            Statement::Truncate { table: "t".into() }
        );
    }

    #[test]
    fn transaction_statements() {
        assert_eq!(parse("BEGIN").unwrap().statement, Statement::Begin);
        assert_eq!(parse("start transaction;").unwrap().statement, Statement::Begin);
        assert_eq!(parse("COMMIT WORK").unwrap().statement, Statement::Commit);
        assert_eq!(parse("rollback").unwrap().statement, Statement::Rollback);
    }

    #[test]
    fn literals() {
        let parsed = parse(
            "INSERT INTO t VALUES (1, -2, 2.5, 'it''s', \"dq\", NULL, TRUE, false), (?, ?)",
        )
        .unwrap();
        assert_eq!(parsed.param_count, 2);
        let Statement::Insert { columns, rows, .. } = parsed.statement else {
            panic!("expected insert");
        };
        assert_eq!(columns, None);
        assert_eq!(
            rows[0],
            vec![
                Expr::Literal(Value::BigInt(1)),
                Expr::Literal(Value::BigInt(-2)),
                Expr::Literal(Value::Double(2.5)),
                Expr::Literal(Value::Text("it's".into())),
                Expr::Literal(Value::Text("dq".into())),
                Expr::Literal(Value::Null),
                Expr::Literal(Value::Bool(true)),
                Expr::Literal(Value::Bool(false)),
            ]
        );
        assert_eq!(rows[1], vec![Expr::Param(0), Expr::Param(1)]);
    }

    #[test]
    fn backslash_escapes() {
        let parsed = parse(r"INSERT INTO t (a) VALUES ('a\'b\\c\n')").unwrap();
        let Statement::Insert { rows, .. } = parsed.statement else {
            panic!("expected insert");
        };
        assert_eq!(rows[0][0], Expr::Literal(Value::Text("a'b\\c\n".into())));
    }

    #[test]
    fn question_mark_inside_string_is_not_a_placeholder() {
        let parsed = parse("INSERT INTO t (a, b) VALUES ('why?', ?)").unwrap();
        assert_eq!(parsed.param_count, 1);
    }

    #[test]
    fn comments_are_skipped() {
        let parsed = parse("-- seed\nSELECT /* all */ * FROM t # trailing").unwrap();
        assert_eq!(parsed.statement.kind(), "SELECT");
    }

    #[test]
    fn unsupported_statement_is_syntax_error() {
        let err = parse("DELETE FROM table_1").unwrap_err();
        assert_eq!(kind_of(&err), QueryErrorKind::Syntax);
        assert_eq!(err.sql(), Some("DELETE FROM table_1"));
    }

    #[test]
    fn malformed_statements() {
        for sql in [
            "",
            "   ;",
            "SELECT FROM t",
            "INSERT INTO t (a VALUES (1)",
            "INSERT INTO t (a) VALUES 1",
            "SELECT * FROM t extra",
            "SELECT * FROM t; SELECT * FROM t",
            "INSERT INTO t (a) VALUES ('open",
            "INSERT INTO t (a) VALUES (-'x')",
            "START",
        ] {
            let err = parse(sql).unwrap_err();
            assert_eq!(kind_of(&err), QueryErrorKind::Syntax, "{sql}");
        }
    }
}
