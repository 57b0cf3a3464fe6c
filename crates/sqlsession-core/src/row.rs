//! Result rows and typed column access.

use std::sync::Arc;

use crate::Result;
use crate::error::{Error, TypeError};
use crate::value::Value;

/// Column names of a result set, shared by all of its rows.
///
/// Lookups try an exact match first and then fall back to an ASCII
/// case-insensitive match, since MySQL column names are case-insensitive.
/// A repeated name resolves to its first position.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnInfo {
    names: Vec<String>,
}

impl ColumnInfo {
    pub fn new(names: Vec<String>) -> Self {
        Self { names }
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.names.iter().position(|n| n == name).or_else(|| {
            self.names
                .iter()
                .position(|n| n.eq_ignore_ascii_case(name))
        })
    }

    pub fn name_at(&self, index: usize) -> Option<&str> {
        self.names.get(index).map(String::as_str)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.index_of(name).is_some()
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }
}

/// One row of a result set.
///
/// Values are addressed by position ([`get`](Row::get), [`get_as`](Row::get_as))
/// or by column name ([`get_by_name`](Row::get_by_name),
/// [`get_named`](Row::get_named)).
#[derive(Debug, Clone, PartialEq)]
pub struct Row {
    columns: Arc<ColumnInfo>,
    values: Vec<Value>,
}

impl Row {
    /// A row with its own column list.
    pub fn new(column_names: Vec<String>, values: Vec<Value>) -> Self {
        Self::with_columns(Arc::new(ColumnInfo::new(column_names)), values)
    }

    /// A row sharing `columns` with the other rows of its result set.
    pub fn with_columns(columns: Arc<ColumnInfo>, values: Vec<Value>) -> Self {
        Self { columns, values }
    }

    pub fn column_info(&self) -> Arc<ColumnInfo> {
        Arc::clone(&self.columns)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Value> {
        self.values.get(index)
    }

    pub fn get_by_name(&self, name: &str) -> Option<&Value> {
        self.values.get(self.columns.index_of(name)?)
    }

    pub fn contains_column(&self, name: &str) -> bool {
        self.columns.contains(name)
    }

    /// Convert the value at `index`.
    pub fn get_as<T: FromValue>(&self, index: usize) -> Result<T> {
        match self.get(index) {
            Some(value) => T::from_value(value),
            None => Err(Error::Type(TypeError {
                expected: std::any::type_name::<T>(),
                actual: format!("no column at index {index} (row has {})", self.len()),
                column: None,
            })),
        }
    }

    /// Convert the value of column `name`. Type errors carry the column
    /// name.
    pub fn get_named<T: FromValue>(&self, name: &str) -> Result<T> {
        let Some(value) = self.get_by_name(name) else {
            return Err(Error::Type(TypeError {
                expected: std::any::type_name::<T>(),
                actual: "missing column".to_string(),
                column: Some(name.to_string()),
            }));
        };
        T::from_value(value).map_err(|err| match err {
            Error::Type(inner) => Error::Type(TypeError {
                column: Some(name.to_string()),
                ..inner
            }),
            other => other,
        })
    }

    pub fn column_names(&self) -> impl Iterator<Item = &str> {
        self.columns.names.iter().map(String::as_str)
    }

    pub fn values(&self) -> impl Iterator<Item = &Value> {
        self.values.iter()
    }

    /// `(column name, value)` pairs in column order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.column_names().zip(&self.values)
    }

    pub fn into_values(self) -> Vec<Value> {
        self.values
    }
}

/// Conversion out of a [`Value`], used by [`Row::get_as`] and
/// [`Row::get_named`].
pub trait FromValue: Sized {
    fn from_value(value: &Value) -> Result<Self>;
}

fn mismatch(expected: &'static str, value: &Value) -> Error {
    Error::Type(TypeError {
        expected,
        actual: value.type_name().to_string(),
        column: None,
    })
}

/// Integers of any width convert to any integer type they fit in.
macro_rules! integer_from_value {
    ($($ty:ty),+) => {
        $(
            impl FromValue for $ty {
                fn from_value(value: &Value) -> Result<Self> {
                    let wide = value
                        .as_i64()
                        .ok_or_else(|| mismatch(stringify!($ty), value))?;
                    <$ty>::try_from(wide).map_err(|_| {
                        Error::Type(TypeError {
                            expected: stringify!($ty),
                            actual: format!("{wide}, which is out of range"),
                            column: None,
                        })
                    })
                }
            }
        )+
    };
}

integer_from_value!(i8, i16, i32, i64, u8, u16, u32, u64);

impl FromValue for bool {
    fn from_value(value: &Value) -> Result<Self> {
        value.as_bool().ok_or_else(|| mismatch("bool", value))
    }
}

impl FromValue for f64 {
    fn from_value(value: &Value) -> Result<Self> {
        value.as_f64().ok_or_else(|| mismatch("f64", value))
    }
}

impl FromValue for String {
    fn from_value(value: &Value) -> Result<Self> {
        value
            .as_str()
            .map(str::to_owned)
            .ok_or_else(|| mismatch("String", value))
    }
}

impl FromValue for Vec<u8> {
    fn from_value(value: &Value) -> Result<Self> {
        value
            .as_bytes()
            .map(<[u8]>::to_vec)
            .ok_or_else(|| mismatch("Vec<u8>", value))
    }
}

/// JSON columns, or text holding JSON.
impl FromValue for serde_json::Value {
    fn from_value(value: &Value) -> Result<Self> {
        match value {
            Value::Json(json) => Ok(json.clone()),
            Value::Text(text) => serde_json::from_str(text).map_err(|e| {
                Error::Type(TypeError {
                    expected: "JSON",
                    actual: format!("unparseable text ({e})"),
                    column: None,
                })
            }),
            other => Err(mismatch("JSON", other)),
        }
    }
}

impl<T: FromValue> FromValue for Option<T> {
    fn from_value(value: &Value) -> Result<Self> {
        match value {
            Value::Null => Ok(None),
            present => T::from_value(present).map(Some),
        }
    }
}

impl FromValue for Value {
    fn from_value(value: &Value) -> Result<Self> {
        Ok(value.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table_1_row(id: i32, some_field: &str) -> Row {
        Row::new(
            vec!["id".to_string(), "some_field".to_string()],
            vec![Value::Int(id), Value::Text(some_field.to_string())],
        )
    }

    #[test]
    fn positional_and_named_lookup() {
        let row = table_1_row(1, "hello world");

        assert_eq!(row.len(), 2);
        assert_eq!(row.get(0), Some(&Value::Int(1)));
        assert!(row.get(2).is_none());
        assert_eq!(
            row.get_by_name("some_field"),
            Some(&Value::Text("hello world".to_string()))
        );
        assert!(row.get_by_name("nope").is_none());
        assert!(row.contains_column("ID"));
    }

    #[test]
    fn integers_convert_across_widths() {
        let row = table_1_row(1, "hello world");

        assert_eq!(row.get_as::<i64>(0).unwrap(), 1);
        assert_eq!(row.get_named::<i32>("id").unwrap(), 1);
        assert_eq!(row.get_named::<u8>("id").unwrap(), 1);
        assert_eq!(row.get_named::<String>("some_field").unwrap(), "hello world");
    }

    #[test]
    fn named_type_errors_carry_the_column() {
        let row = table_1_row(1, "hello world");

        match row.get_named::<i64>("some_field") {
            Err(Error::Type(te)) => {
                assert_eq!(te.column.as_deref(), Some("some_field"));
                assert_eq!(te.actual, "TEXT");
            }
            other => panic!("expected type error, got {other:?}"),
        }
        match row.get_named::<i64>("nope") {
            Err(Error::Type(te)) => assert_eq!(te.column.as_deref(), Some("nope")),
            other => panic!("expected type error, got {other:?}"),
        }
        assert!(row.get_as::<i64>(9).is_err());
    }

    #[test]
    fn null_is_none() {
        let row = Row::new(vec!["some_field".to_string()], vec![Value::Null]);
        assert_eq!(row.get_named::<Option<String>>("some_field").unwrap(), None);
        assert!(row.get_named::<String>("some_field").is_err());
    }

    #[test]
    fn narrowing_checks_range() {
        let big = Row::new(vec!["n".to_string()], vec![Value::BigInt(i64::MAX)]);
        assert!(big.get_as::<i32>(0).is_err());
        assert_eq!(big.get_as::<u64>(0).unwrap(), i64::MAX.unsigned_abs());

        let negative = Row::new(vec!["n".to_string()], vec![Value::Int(-1)]);
        assert!(negative.get_as::<u64>(0).is_err());
        assert_eq!(negative.get_as::<i8>(0).unwrap(), -1);
    }

    #[test]
    fn rows_share_column_info() {
        let columns = Arc::new(ColumnInfo::new(vec!["id".to_string()]));
        let a = Row::with_columns(Arc::clone(&columns), vec![Value::Int(1)]);
        let b = Row::with_columns(Arc::clone(&columns), vec![Value::Int(2)]);
        assert!(Arc::ptr_eq(&a.column_info(), &b.column_info()));
        assert_eq!(b.get_named::<i64>("id").unwrap(), 2);
    }

    #[test]
    fn exact_match_wins_over_case_folding() {
        let info = ColumnInfo::new(vec!["Id".to_string(), "id".to_string(), "id".to_string()]);
        assert_eq!(info.index_of("id"), Some(1));
        assert_eq!(info.index_of("ID"), Some(0));
        assert_eq!(info.name_at(2), Some("id"));
    }

    #[test]
    fn json_from_text() {
        let row = Row::new(vec!["doc".to_string()], vec![Value::Text("{\"a\":1}".into())]);
        let doc: serde_json::Value = row.get_named("doc").unwrap();
        assert_eq!(doc["a"], 1);

        let bad = Row::new(vec!["doc".to_string()], vec![Value::Text("{".into())]);
        assert!(bad.get_named::<serde_json::Value>("doc").is_err());
    }

    #[test]
    fn pairs_in_column_order() {
        let row = table_1_row(7, "x");
        let pairs: Vec<_> = row.iter().collect();
        assert_eq!(
            pairs,
            vec![("id", &Value::Int(7)), ("some_field", &Value::Text("x".into()))]
        );
        assert_eq!(row.into_values().len(), 2);
    }
}
