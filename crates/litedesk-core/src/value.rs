//! The SQLite scalar value and affinity-directed coercion

use serde::{Deserialize, Serialize};

/// A database value covering every SQLite storage class
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    /// NULL value
    Null,
    /// 64-bit signed integer
    Integer(i64),
    /// 64-bit floating point
    Real(f64),
    /// UTF-8 string
    Text(String),
    /// Binary data
    Blob(Vec<u8>),
}

impl Value {
    /// Check if the value is NULL
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Try to get as a string
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Try to get as i64
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Integer(v) => Some(*v),
            Value::Text(s) => s.parse::<i64>().ok(),
            _ => None,
        }
    }

    /// Try to get as f64
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Integer(v) => Some(*v as f64),
            Value::Real(v) => Some(*v),
            Value::Text(s) => s.parse::<f64>().ok(),
            _ => None,
        }
    }

    /// The value as the user sees and edits it in a cell.
    ///
    /// NULL renders empty, blobs render through `escape_blob` so they can
    /// be round-tripped back by `Value::coerce`.
    pub fn display_text(&self) -> String {
        match self {
            Value::Null => String::new(),
            Value::Integer(v) => v.to_string(),
            Value::Real(v) => v.to_string(),
            Value::Text(s) => s.clone(),
            Value::Blob(b) => escape_blob(b),
        }
    }

    /// Coerce raw cell text per the target column's affinity.
    ///
    /// Integer and real affinities attempt a numeric parse and keep the raw
    /// text if it fails (the engine rejects it at commit). Blob affinity
    /// unescapes the display encoding. Numeric tries integer, then real,
    /// then text.
    pub fn coerce(raw: &str, affinity: Affinity) -> Value {
        match affinity {
            Affinity::Integer => match raw.trim().parse::<i64>() {
                Ok(v) => Value::Integer(v),
                Err(_) => Value::Text(raw.to_string()),
            },
            Affinity::Real => match raw.trim().parse::<f64>() {
                Ok(v) => Value::Real(v),
                Err(_) => Value::Text(raw.to_string()),
            },
            Affinity::Numeric => {
                let t = raw.trim();
                if let Ok(v) = t.parse::<i64>() {
                    Value::Integer(v)
                } else if let Ok(v) = t.parse::<f64>() {
                    Value::Real(v)
                } else {
                    Value::Text(raw.to_string())
                }
            }
            Affinity::Blob => Value::Blob(unescape_blob(raw)),
            Affinity::Text => Value::Text(raw.to_string()),
        }
    }
}

impl std::fmt::Display for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Value::Null => write!(f, "NULL"),
            Value::Integer(v) => write!(f, "{}", v),
            Value::Real(v) => write!(f, "{}", v),
            Value::Text(s) => write!(f, "{}", s),
            Value::Blob(b) => write!(f, "<{} bytes>", b.len()),
        }
    }
}

/// SQLite type affinity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum Affinity {
    Integer,
    Real,
    #[default]
    Text,
    Blob,
    Numeric,
}

impl Affinity {
    /// Affinity of a declared column type, per the SQLite determination
    /// rules: INT wins over everything, then CHAR/CLOB/TEXT, then BLOB or
    /// a missing type, then REAL/FLOA/DOUB, else NUMERIC.
    pub fn of_declared_type(declared: Option<&str>) -> Affinity {
        let Some(declared) = declared else {
            return Affinity::Blob;
        };
        let upper = declared.to_ascii_uppercase();
        if upper.contains("INT") {
            Affinity::Integer
        } else if upper.contains("CHAR") || upper.contains("CLOB") || upper.contains("TEXT") {
            Affinity::Text
        } else if upper.contains("BLOB") || upper.is_empty() {
            Affinity::Blob
        } else if upper.contains("REAL") || upper.contains("FLOA") || upper.contains("DOUB") {
            Affinity::Real
        } else {
            Affinity::Numeric
        }
    }

    /// Whether values of this affinity sort and filter as numbers.
    pub fn is_numeric(&self) -> bool {
        matches!(self, Affinity::Integer | Affinity::Real | Affinity::Numeric)
    }
}

/// Encode a blob for display and editing.
///
/// Printable ASCII passes through, backslash doubles, everything else
/// becomes `\xNN`. The encoding is reversed by `unescape_blob`.
pub fn escape_blob(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len());
    for &b in bytes {
        match b {
            b'\\' => out.push_str("\\\\"),
            0x20..=0x7e => out.push(b as char),
            _ => out.push_str(&format!("\\x{:02x}", b)),
        }
    }
    out
}

/// Decode the `escape_blob` encoding. Malformed escapes are kept literally.
pub fn unescape_blob(text: &str) -> Vec<u8> {
    let mut out = Vec::with_capacity(text.len());
    let bytes = text.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'\\' && i + 1 < bytes.len() {
            match bytes[i + 1] {
                b'\\' => {
                    out.push(b'\\');
                    i += 2;
                }
                b'x' | b'X'
                    if i + 3 < bytes.len()
                        && bytes[i + 2].is_ascii_hexdigit()
                        && bytes[i + 3].is_ascii_hexdigit() =>
                {
                    let high = (bytes[i + 2] as char).to_digit(16).unwrap_or(0) as u8;
                    let low = (bytes[i + 3] as char).to_digit(16).unwrap_or(0) as u8;
                    out.push(high * 16 + low);
                    i += 4;
                }
                _ => {
                    out.push(bytes[i]);
                    i += 1;
                }
            }
        } else {
            out.push(bytes[i]);
            i += 1;
        }
    }
    out
}

/// Render a value as a SQL literal, for generated scripts.
pub fn sql_literal(value: &Value) -> String {
    match value {
        Value::Null => "NULL".to_string(),
        Value::Integer(v) => v.to_string(),
        Value::Real(v) => v.to_string(),
        Value::Text(s) => format!("'{}'", s.replace('\'', "''")),
        Value::Blob(b) => {
            let mut out = String::with_capacity(b.len() * 2 + 3);
            out.push_str("X'");
            for byte in b {
                out.push_str(&format!("{:02X}", byte));
            }
            out.push('\'');
            out
        }
    }
}
