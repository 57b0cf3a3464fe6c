//! Column metadata, text-protocol decoding and literal formatting.
//!
//! The driver only speaks the text protocol: result cells arrive as strings
//! and parameters are inlined into the statement as escaped literals.

use sqlsession_core::error::QueryErrorKind;
use sqlsession_core::{Error, Result, Value};

use crate::protocol::PacketReader;
use crate::protocol::charset;

/// `MYSQL_TYPE_*` codes reported in column definitions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldType {
    Decimal,
    Tiny,
    Short,
    Long,
    Float,
    Double,
    Null,
    Timestamp,
    LongLong,
    Int24,
    Date,
    Time,
    DateTime,
    Year,
    VarChar,
    Bit,
    Json,
    NewDecimal,
    Enum,
    Set,
    TinyBlob,
    MediumBlob,
    LongBlob,
    Blob,
    VarString,
    String,
    Geometry,
}

impl FieldType {
    /// Unknown codes are treated as strings.
    pub fn from_u8(code: u8) -> Self {
        match code {
            0x00 => Self::Decimal,
            0x01 => Self::Tiny,
            0x02 => Self::Short,
            0x03 => Self::Long,
            0x04 => Self::Float,
            0x05 => Self::Double,
            0x06 => Self::Null,
            0x07 | 0x11 => Self::Timestamp,
            0x08 => Self::LongLong,
            0x09 => Self::Int24,
            0x0A | 0x0E => Self::Date,
            0x0B | 0x13 => Self::Time,
            0x0C | 0x12 => Self::DateTime,
            0x0D => Self::Year,
            0x0F => Self::VarChar,
            0x10 => Self::Bit,
            0xF5 => Self::Json,
            0xF6 => Self::NewDecimal,
            0xF7 => Self::Enum,
            0xF8 => Self::Set,
            0xF9 => Self::TinyBlob,
            0xFA => Self::MediumBlob,
            0xFB => Self::LongBlob,
            0xFC => Self::Blob,
            0xFD => Self::VarString,
            0xFF => Self::Geometry,
            _ => Self::String,
        }
    }

    pub const fn is_integer(self) -> bool {
        matches!(
            self,
            Self::Tiny | Self::Short | Self::Long | Self::LongLong | Self::Int24 | Self::Year
        )
    }

    /// Types whose payload may be binary, depending on the column charset.
    pub const fn is_string_like(self) -> bool {
        matches!(
            self,
            Self::VarChar
                | Self::VarString
                | Self::String
                | Self::TinyBlob
                | Self::MediumBlob
                | Self::LongBlob
                | Self::Blob
        )
    }
}

pub mod column_flags {
    pub const NOT_NULL: u16 = 1;
    pub const PRIMARY_KEY: u16 = 2;
    pub const UNSIGNED: u16 = 32;
    pub const BINARY: u16 = 128;
    pub const AUTO_INCREMENT: u16 = 512;
}

/// One column definition from a result set header.
#[derive(Debug, Clone)]
pub struct ColumnDef {
    pub schema: String,
    pub table: String,
    pub name: String,
    pub charset: u16,
    pub column_length: u32,
    pub column_type: FieldType,
    pub flags: u16,
    pub decimals: u8,
}

impl ColumnDef {
    /// Parse a protocol 4.1 column definition packet.
    pub fn parse(payload: &[u8]) -> Result<Self> {
        let mut r = PacketReader::new(payload);
        let truncated = || Error::protocol("truncated column definition");

        let _catalog = r.read_lenenc_bytes().ok_or_else(truncated)?;
        let schema = r.read_lenenc_string().ok_or_else(truncated)?;
        let table = r.read_lenenc_string().ok_or_else(truncated)?;
        let _org_table = r.read_lenenc_bytes().ok_or_else(truncated)?;
        let name = r.read_lenenc_string().ok_or_else(truncated)?;
        let _org_name = r.read_lenenc_bytes().ok_or_else(truncated)?;
        // Length of the fixed-size block that follows, always 0x0c.
        let _fixed_len = r.read_lenenc_int().ok_or_else(truncated)?;
        let charset = r.read_u16_le().ok_or_else(truncated)?;
        let column_length = r.read_u32_le().ok_or_else(truncated)?;
        let column_type = FieldType::from_u8(r.read_u8().ok_or_else(truncated)?);
        let flags = r.read_u16_le().ok_or_else(truncated)?;
        let decimals = r.read_u8().ok_or_else(truncated)?;

        Ok(Self {
            schema,
            table,
            name,
            charset,
            column_length,
            column_type,
            flags,
            decimals,
        })
    }

    pub const fn is_not_null(&self) -> bool {
        self.flags & column_flags::NOT_NULL != 0
    }

    pub const fn is_primary_key(&self) -> bool {
        self.flags & column_flags::PRIMARY_KEY != 0
    }

    pub const fn is_unsigned(&self) -> bool {
        self.flags & column_flags::UNSIGNED != 0
    }

    pub const fn is_auto_increment(&self) -> bool {
        self.flags & column_flags::AUTO_INCREMENT != 0
    }

    /// BLOB/BINARY columns carry the binary collation; TEXT/CHAR do not.
    pub fn is_binary(&self) -> bool {
        self.charset == u16::from(charset::BINARY)
    }

    /// Decode a non-NULL text-protocol cell for this column.
    pub fn decode(&self, data: &[u8]) -> Value {
        decode_text_value(self.column_type, data, self.is_unsigned(), self.is_binary())
    }
}

/// Decode a text-protocol cell.
///
/// Unsigned integers widen to the next signed width so no value wraps;
/// `BIGINT UNSIGNED` above `i64::MAX` is clamped. Cells that fail to parse
/// as their declared numeric type are returned as text.
pub fn decode_text_value(field_type: FieldType, data: &[u8], unsigned: bool, binary: bool) -> Value {
    if field_type == FieldType::Bit || (binary && field_type.is_string_like()) {
        return Value::Bytes(data.to_vec());
    }

    let text = String::from_utf8_lossy(data);
    let parsed = match (field_type, unsigned) {
        (FieldType::Tiny, false) => text.parse().ok().map(Value::TinyInt),
        (FieldType::Tiny, true) => text.parse::<u8>().ok().map(|v| Value::SmallInt(v.into())),
        (FieldType::Short | FieldType::Year, false) => text.parse().ok().map(Value::SmallInt),
        (FieldType::Short | FieldType::Year, true) => {
            text.parse::<u16>().ok().map(|v| Value::Int(v.into()))
        }
        (FieldType::Long | FieldType::Int24, false) => text.parse().ok().map(Value::Int),
        (FieldType::Long | FieldType::Int24, true) => {
            text.parse::<u32>().ok().map(|v| Value::BigInt(v.into()))
        }
        (FieldType::LongLong, false) => text.parse().ok().map(Value::BigInt),
        (FieldType::LongLong, true) => text.parse::<u64>().ok().map(Value::from_u64_clamped),
        (FieldType::Float, _) => text.parse().ok().map(Value::Float),
        (FieldType::Double, _) => text.parse().ok().map(Value::Double),
        (FieldType::Decimal | FieldType::NewDecimal, _) => Some(Value::Decimal(text.to_string())),
        (FieldType::Json, _) => serde_json::from_str(&text).ok().map(Value::Json),
        (FieldType::Null, _) => Some(Value::Null),
        _ => None,
    };

    parsed.unwrap_or_else(|| Value::Text(text.into_owned()))
}

/// Quote a string literal. Quotes are doubled; backslash and the control
/// characters MySQL treats specially are backslash-escaped.
pub fn escape_string(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    out.push('\'');
    for ch in s.chars() {
        match ch {
            '\'' => out.push_str("''"),
            '\\' => out.push_str("\\\\"),
            '\0' => out.push_str("\\0"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\x1a' => out.push_str("\\Z"),
            _ => out.push(ch),
        }
    }
    out.push('\'');
    out
}

/// Hex literal, `X'...'`.
pub fn escape_bytes(data: &[u8]) -> String {
    use std::fmt::Write;

    let mut out = String::with_capacity(data.len() * 2 + 3);
    out.push_str("X'");
    for byte in data {
        let _ = write!(out, "{byte:02X}");
    }
    out.push('\'');
    out
}

/// Render a value as a SQL literal.
pub fn format_value_for_sql(value: &Value) -> Result<String> {
    let literal = match value {
        Value::Null => "NULL".to_string(),
        Value::Bool(b) => if *b { "TRUE" } else { "FALSE" }.to_string(),
        Value::TinyInt(i) => i.to_string(),
        Value::SmallInt(i) => i.to_string(),
        Value::Int(i) => i.to_string(),
        Value::BigInt(i) => i.to_string(),
        Value::Float(f) if f.is_finite() => f.to_string(),
        Value::Double(f) if f.is_finite() => f.to_string(),
        Value::Float(_) | Value::Double(_) => {
            return Err(Error::query(
                QueryErrorKind::Syntax,
                "cannot bind a non-finite floating point value",
            ));
        }
        Value::Decimal(s) => {
            let numeric = !s.is_empty()
                && s.chars().any(|c| c.is_ascii_digit())
                && s.chars().all(|c| c.is_ascii_digit() || "+-.eE".contains(c));
            if !numeric {
                return Err(Error::query(
                    QueryErrorKind::Syntax,
                    format!("invalid decimal literal '{}'", s),
                ));
            }
            s.clone()
        }
        Value::Text(s) => escape_string(s),
        Value::Bytes(b) => escape_bytes(b),
        Value::Json(j) => escape_string(&j.to_string()),
    };
    Ok(literal)
}

/// Inline positional `?` parameters as literals.
///
/// Question marks inside quoted strings, quoted identifiers and comments
/// are not placeholders. The number of placeholders must equal
/// `params.len()`.
pub fn interpolate_params(sql: &str, params: &[Value]) -> Result<String> {
    let mut out = String::with_capacity(sql.len() + params.len() * 16);
    let mut values = params.iter();
    let mut used = 0usize;
    let mut chars = sql.chars().peekable();

    while let Some(ch) = chars.next() {
        match ch {
            '?' => {
                let value = values.next().ok_or_else(|| {
                    Error::query(
                        QueryErrorKind::Syntax,
                        format!("statement has more placeholders than the {} bound values", params.len()),
                    )
                    .with_sql(sql)
                })?;
                out.push_str(&format_value_for_sql(value).map_err(|e| e.with_sql(sql))?);
                used += 1;
            }
            '\'' | '"' | '`' => {
                out.push(ch);
                while let Some(c) = chars.next() {
                    out.push(c);
                    if c == '\\' && ch != '`' {
                        if let Some(escaped) = chars.next() {
                            out.push(escaped);
                        }
                    } else if c == ch {
                        if chars.peek() == Some(&ch) {
                            out.push(ch);
                            chars.next();
                        } else {
                            break;
                        }
                    }
                }
            }
            '#' => {
                out.push(ch);
                copy_line(&mut chars, &mut out);
            }
            '-' if chars.peek() == Some(&'-') => {
                out.push(ch);
                copy_line(&mut chars, &mut out);
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
            _ => out.push(ch),
        }
    }

    if used != params.len() {
        return Err(Error::query(
            QueryErrorKind::Syntax,
            format!("{} values bound but statement has {} placeholders", params.len(), used),
        )
        .with_sql(sql));
    }
    Ok(out)
}

fn copy_line(chars: &mut std::iter::Peekable<std::str::Chars<'_>>, out: &mut String) {
    for c in chars.by_ref() {
        out.push(c);
        if c == '\n' {
            break;
        }
    }
}
