use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Column data types the store can persist and index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DataType {
    Boolean,
    Int,
    Long,
    Double,
    Varchar,
    Binary,
}

impl DataType {
    /// SQL name used in view files and error messages.
    pub fn name(&self) -> &'static str {
        match self {
            DataType::Boolean => "BOOLEAN",
            DataType::Int => "INT",
            DataType::Long => "BIGINT",
            DataType::Double => "DOUBLE",
            DataType::Varchar => "VARCHAR",
            DataType::Binary => "BINARY",
        }
    }

    /// Resolve a SQL type name, accepting the common aliases.
    pub fn from_name(name: &str) -> Option<Self> {
        match name.trim().to_ascii_uppercase().as_str() {
            "BOOLEAN" | "BOOL" | "BIT" => Some(DataType::Boolean),
            "INT" | "INTEGER" | "INT4" => Some(DataType::Int),
            "BIGINT" | "LONG" | "INT8" => Some(DataType::Long),
            "DOUBLE" | "FLOAT" | "FLOAT8" => Some(DataType::Double),
            "VARCHAR" | "CHAR" | "TEXT" => Some(DataType::Varchar),
            "BINARY" | "VARBINARY" | "BLOB" => Some(DataType::Binary),
            _ => None,
        }
    }

    /// Whether values of this type can serve directly as a row key.
    pub fn is_integral(&self) -> bool {
        matches!(self, DataType::Int | DataType::Long)
    }

    pub(crate) fn default_precision(&self) -> u32 {
        match self {
            DataType::Boolean => 1,
            DataType::Int => 10,
            DataType::Long => 19,
            DataType::Double => 17,
            DataType::Varchar | DataType::Binary => i32::MAX as u32,
        }
    }

    pub(crate) fn default_display_size(&self) -> u32 {
        match self {
            DataType::Boolean => 5,
            DataType::Int => 11,
            DataType::Long => 20,
            DataType::Double => 24,
            DataType::Varchar | DataType::Binary => i32::MAX as u32,
        }
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Error)]
pub enum ValueError {
    #[error("cannot convert {value} to {expected}")]
    TypeMismatch { value: String, expected: DataType },
    #[error("value {value} out of range for {expected}")]
    Overflow { value: String, expected: DataType },
}

/// A single typed column value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    Null,
    Boolean(bool),
    Int(i32),
    Long(i64),
    Double(f64),
    Varchar(String),
    Binary(Vec<u8>),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// The data type of a non-null value.
    pub fn data_type(&self) -> Option<DataType> {
        match self {
            Value::Null => None,
            Value::Boolean(_) => Some(DataType::Boolean),
            Value::Int(_) => Some(DataType::Int),
            Value::Long(_) => Some(DataType::Long),
            Value::Double(_) => Some(DataType::Double),
            Value::Varchar(_) => Some(DataType::Varchar),
            Value::Binary(_) => Some(DataType::Binary),
        }
    }

    /// Integral view of `Int` and `Long` values.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int(v) => Some(*v as i64),
            Value::Long(v) => Some(*v),
            _ => None,
        }
    }

    /// Convert this value to `target`, following the usual SQL widening and
    /// parsing rules. `Null` converts to `Null` for every type.
    pub fn convert_to(&self, target: DataType) -> Result<Value, ValueError> {
        if self.data_type().map_or(true, |ty| ty == target) {
            return Ok(self.clone());
        }
        let converted = match (self, target) {
            (Value::Int(v), DataType::Long) => Some(Value::Long(*v as i64)),
            (Value::Int(v), DataType::Double) => Some(Value::Double(*v as f64)),
            (Value::Long(v), DataType::Int) => {
                let narrowed = i32::try_from(*v).map_err(|_| self.overflow(target))?;
                Some(Value::Int(narrowed))
            }
            (Value::Long(v), DataType::Double) => Some(Value::Double(*v as f64)),
            (Value::Double(v), DataType::Int | DataType::Long) => {
                if v.fract() != 0.0 || !v.is_finite() {
                    None
                } else if target == DataType::Int {
                    if *v < i32::MIN as f64 || *v > i32::MAX as f64 {
                        return Err(self.overflow(target));
                    }
                    Some(Value::Int(*v as i32))
                } else {
                    if *v < i64::MIN as f64 || *v >= i64::MAX as f64 {
                        return Err(self.overflow(target));
                    }
                    Some(Value::Long(*v as i64))
                }
            }
            (Value::Boolean(v), DataType::Int) => Some(Value::Int(*v as i32)),
            (Value::Boolean(v), DataType::Long) => Some(Value::Long(*v as i64)),
            (Value::Int(v), DataType::Boolean) => Some(Value::Boolean(*v != 0)),
            (Value::Long(v), DataType::Boolean) => Some(Value::Boolean(*v != 0)),
            (Value::Varchar(s), DataType::Int) => s.trim().parse().ok().map(Value::Int),
            (Value::Varchar(s), DataType::Long) => s.trim().parse().ok().map(Value::Long),
            (Value::Varchar(s), DataType::Double) => s.trim().parse().ok().map(Value::Double),
            (Value::Varchar(s), DataType::Boolean) => {
                match s.trim().to_ascii_lowercase().as_str() {
                    "true" | "t" | "1" => Some(Value::Boolean(true)),
                    "false" | "f" | "0" => Some(Value::Boolean(false)),
                    _ => None,
                }
            }
            (Value::Varchar(s), DataType::Binary) => Some(Value::Binary(s.as_bytes().to_vec())),
            (Value::Binary(b), DataType::Varchar) => {
                String::from_utf8(b.clone()).ok().map(Value::Varchar)
            }
            (other, DataType::Varchar) => Some(Value::Varchar(other.to_string())),
            _ => None,
        };
        converted.ok_or_else(|| ValueError::TypeMismatch {
            value: self.to_string(),
            expected: target,
        })
    }

    fn overflow(&self, expected: DataType) -> ValueError {
        ValueError::Overflow {
            value: self.to_string(),
            expected,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => f.write_str("NULL"),
            Value::Boolean(v) => write!(f, "{}", if *v { "TRUE" } else { "FALSE" }),
            Value::Int(v) => write!(f, "{v}"),
            Value::Long(v) => write!(f, "{v}"),
            Value::Double(v) => write!(f, "{v}"),
            Value::Varchar(v) => write!(f, "'{}'", v.replace('\'', "''")),
            Value::Binary(v) => {
                f.write_str("X'")?;
                for byte in v {
                    write!(f, "{byte:02x}")?;
                }
                f.write_str("'")
            }
        }
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Boolean(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Int(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Long(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Double(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Varchar(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Varchar(v)
    }
}

impl From<Vec<u8>> for Value {
    fn from(v: Vec<u8>) -> Self {
        Value::Binary(v)
    }
}

impl<T> From<Option<T>> for Value
where
    T: Into<Value>,
{
    fn from(v: Option<T>) -> Self {
        v.map_or(Value::Null, Into::into)
    }
}
