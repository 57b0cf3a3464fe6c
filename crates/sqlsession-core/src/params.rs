//! Named parameter binding.
//!
//! Sessions accept SQL written with `:name` placeholders, the style used by
//! most ORMs. Drivers only understand positional `?` placeholders, so
//! [`bind_named`] rewrites the SQL and orders the values before execution.

use crate::error::{Error, QueryErrorKind, Result};
use crate::value::Value;

/// An ordered set of named parameter values.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Params {
    entries: Vec<(String, Value)>,
}

impl Params {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind `value` to `name`, replacing any previous binding for that name.
    #[must_use]
    pub fn bind(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.insert(name, value);
        self
    }

    /// Bind in place.
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<Value>) {
        let name = name.into();
        let value = value.into();
        if let Some(slot) = self.entries.iter_mut().find(|(n, _)| *n == name) {
            slot.1 = value;
        } else {
            self.entries.push((name, value));
        }
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.entries
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.entries.iter().map(|(n, v)| (n.as_str(), v))
    }
}

/// Build [`Params`] from `name => value` pairs.
///
/// ```
/// use sqlsession_core::{Value, params};
///
/// let p = params! { "some_field" => "hello world" };
/// assert_eq!(p.get("some_field"), Some(&Value::Text("hello world".into())));
/// ```
#[macro_export]
macro_rules! params {
    () => {
        $crate::Params::new()
    };
    ($($name:expr => $value:expr),+ $(,)?) => {
        $crate::Params::new()$(.bind($name, $value))+
    };
}

fn is_ident_start(c: char) -> bool {
    c.is_ascii_alphabetic() || c == '_'
}

fn is_ident_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

/// Rewrite `:name` placeholders to `?` and collect their values in order.
///
/// Placeholders inside string literals, quoted identifiers and comments are
/// left alone, as are the `::` cast operator and a colon directly after an
/// identifier character (`a:b`). A name used twice is bound
/// twice. Referencing a name that `params` does not contain is an error.
///
/// ```
/// use sqlsession_core::{Params, Value, bind_named};
///
/// let params = Params::new().bind("some_field", "hello world");
/// let (sql, values) =
///     bind_named("INSERT INTO table_1 (some_field) VALUES (:some_field);", &params).unwrap();
/// assert_eq!(sql, "INSERT INTO table_1 (some_field) VALUES (?);");
/// assert_eq!(values, vec![Value::Text("hello world".into())]);
/// ```
pub fn bind_named(sql: &str, params: &Params) -> Result<(String, Vec<Value>)> {
    let mut out = String::with_capacity(sql.len());
    let mut values = Vec::new();
    let mut chars = sql.chars().peekable();

    while let Some(ch) = chars.next() {
        match ch {
            '\'' | '"' | '`' => {
                out.push(ch);
                copy_quoted(ch, &mut chars, &mut out);
            }
            '-' if chars.peek() == Some(&'-') => {
                out.push(ch);
                for c in chars.by_ref() {
                    out.push(c);
                    if c == '\n' {
                        break;
                    }
                }
            }
            '/' if chars.peek() == Some(&'*') => {
                out.push(ch);
                let mut prev = '\0';
                for c in chars.by_ref() {
                    out.push(c);
                    if prev == '*' && c == '/' {
                        break;
                    }
                    prev = c;
                }
            }
            ':' if chars.peek() == Some(&':') => {
                out.push_str("::");
                chars.next();
            }
            // `a:b` is not a placeholder; a name must not follow a word.
            ':' if !out.ends_with(is_ident_char)
                && chars.peek().copied().is_some_and(is_ident_start) =>
            {
                let mut name = String::new();
                while let Some(&c) = chars.peek() {
                    if !is_ident_char(c) {
                        break;
                    }
                    name.push(c);
                    chars.next();
                }
                let value = params.get(&name).ok_or_else(|| {
                    Error::query(
                        QueryErrorKind::Syntax,
                        format!("A value is required for bind parameter '{}'", name),
                    )
                    .with_sql(sql)
                })?;
                values.push(value.clone());
                out.push('?');
            }
            _ => out.push(ch),
        }
    }

    Ok((out, values))
}

/// Copy a quoted run up to and including the closing quote. Doubled quotes
/// and backslash escapes stay inside the run.
fn copy_quoted(
    quote: char,
    chars: &mut std::iter::Peekable<std::str::Chars<'_>>,
    out: &mut String,
) {
    while let Some(c) = chars.next() {
        out.push(c);
        if c == '\\' && quote != '`' {
            if let Some(escaped) = chars.next() {
                out.push(escaped);
            }
        } else if c == quote {
            if chars.peek() == Some(&quote) {
                out.push(quote);
                chars.next();
            } else {
                return;
            }
        }
    }
}
