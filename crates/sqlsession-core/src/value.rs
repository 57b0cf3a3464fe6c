//! Dynamic SQL values.

use serde::{Deserialize, Serialize};

/// A dynamically-typed SQL value.
///
/// Used both for parameter binding and for the columns of fetched rows.
/// Drivers decode into the narrowest variant the server reports, so an
/// `INT` column arrives as [`Value::Int`] and a `BIGINT` as [`Value::BigInt`];
/// use [`Value::as_i64`] or [`crate::Row::get_as`] to read integers without
/// caring about width.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    Null,
    Bool(bool),
    TinyInt(i8),
    SmallInt(i16),
    Int(i32),
    BigInt(i64),
    Float(f32),
    Double(f64),
    /// `DECIMAL` columns keep the server's text form.
    Decimal(String),
    Text(String),
    Bytes(Vec<u8>),
    Json(serde_json::Value),
}

impl Value {
    pub const fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// MySQL name of the variant, used in conversion errors.
    pub const fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "NULL",
            Value::Bool(_) => "BOOL",
            Value::TinyInt(_) => "TINYINT",
            Value::SmallInt(_) => "SMALLINT",
            Value::Int(_) => "INT",
            Value::BigInt(_) => "BIGINT",
            Value::Float(_) => "FLOAT",
            Value::Double(_) => "DOUBLE",
            Value::Decimal(_) => "DECIMAL",
            Value::Text(_) => "TEXT",
            Value::Bytes(_) => "BLOB",
            Value::Json(_) => "JSON",
        }
    }

    /// Integers of every width, and booleans as 0 or 1.
    pub fn as_i64(&self) -> Option<i64> {
        Some(match *self {
            Value::Bool(b) => i64::from(b),
            Value::TinyInt(n) => n.into(),
            Value::SmallInt(n) => n.into(),
            Value::Int(n) => n.into(),
            Value::BigInt(n) => n,
            _ => return None,
        })
    }

    /// Booleans, and integers compared against zero (MySQL `BOOL` is `TINYINT(1)`).
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            other => other.as_i64().map(|n| n != 0),
        }
    }

    #[allow(clippy::cast_precision_loss)]
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Float(x) => Some(f64::from(*x)),
            Value::Double(x) => Some(*x),
            Value::Decimal(text) => text.parse().ok(),
            Value::Bool(_) => None,
            other => other.as_i64().map(|n| n as f64),
        }
    }

    /// Text, including the text form of a decimal.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Text(text) | Value::Decimal(text) => Some(text),
            _ => None,
        }
    }

    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Value::Bytes(bytes) => Some(bytes),
            Value::Text(text) => Some(text.as_bytes()),
            _ => None,
        }
    }

    /// `BIGINT UNSIGNED` values above `i64::MAX` saturate.
    ///
    /// ```
    /// use sqlsession_core::Value;
    ///
    /// assert_eq!(Value::from_u64_clamped(42), Value::BigInt(42));
    /// assert_eq!(Value::from_u64_clamped(u64::MAX), Value::BigInt(i64::MAX));
    /// ```
    #[must_use]
    pub fn from_u64_clamped(v: u64) -> Self {
        Value::BigInt(i64::try_from(v).unwrap_or_else(|_| {
            tracing::warn!(value = v, "unsigned value saturated at i64::MAX");
            i64::MAX
        }))
    }
}

macro_rules! value_from {
    ($($ty:ty => |$v:ident| $body:expr;)+) => {
        $(
            impl From<$ty> for Value {
                fn from($v: $ty) -> Self {
                    $body
                }
            }
        )+
    };
}

value_from! {
    bool => |v| Value::Bool(v);
    i8 => |v| Value::TinyInt(v);
    i16 => |v| Value::SmallInt(v);
    i32 => |v| Value::Int(v);
    i64 => |v| Value::BigInt(v);
    u8 => |v| Value::SmallInt(i16::from(v));
    u16 => |v| Value::Int(i32::from(v));
    u32 => |v| Value::BigInt(i64::from(v));
    f32 => |v| Value::Float(v);
    f64 => |v| Value::Double(v);
    String => |v| Value::Text(v);
    &str => |v| Value::Text(v.to_owned());
    Vec<u8> => |v| Value::Bytes(v);
    &[u8] => |v| Value::Bytes(v.to_vec());
    serde_json::Value => |v| Value::Json(v);
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map_or(Value::Null, Into::into)
    }
}
