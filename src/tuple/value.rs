use std::cmp::Ordering;
use std::fmt;

use crate::common::{QuarryError, Result};

use super::DataType;

/// A typed value held by one record field or key column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Value {
    Integer(i32),
    BigInt(i64),
    Chars(Vec<u8>),
}

impl Value {
    pub fn chars(s: &str) -> Self {
        Value::Chars(s.as_bytes().to_vec())
    }

    /// The smallest value of a type, used to seed range-scan lower bounds.
    pub fn min_of(data_type: DataType) -> Self {
        match data_type {
            DataType::Integer => Value::Integer(i32::MIN),
            DataType::BigInt => Value::BigInt(i64::MIN),
            DataType::Char(_) => Value::Chars(Vec::new()),
        }
    }

    /// The largest value of a type, used to seed range-scan upper bounds.
    pub fn max_of(data_type: DataType) -> Self {
        match data_type {
            DataType::Integer => Value::Integer(i32::MAX),
            DataType::BigInt => Value::BigInt(i64::MAX),
            DataType::Char(n) => Value::Chars(vec![0xFF; n as usize]),
        }
    }

    /// Writes the fixed-width encoding of this value into `out`, whose
    /// length must match the type's width.
    pub fn encode_into(&self, data_type: DataType, out: &mut [u8]) -> Result<()> {
        debug_assert_eq!(out.len(), data_type.size());
        match (self, data_type) {
            (Value::Integer(v), DataType::Integer) => out.copy_from_slice(&v.to_le_bytes()),
            (Value::BigInt(v), DataType::BigInt) => out.copy_from_slice(&v.to_le_bytes()),
            (Value::Chars(bytes), DataType::Char(n)) => {
                let n = n as usize;
                if bytes.len() > n {
                    return Err(QuarryError::SchemaMismatch(format!(
                        "value of {} bytes does not fit CHAR({})",
                        bytes.len(),
                        n
                    )));
                }
                out[..bytes.len()].copy_from_slice(bytes);
                out[bytes.len()..].fill(0);
            }
            (value, ty) => {
                return Err(QuarryError::SchemaMismatch(format!(
                    "value {:?} is incompatible with column type {}",
                    value, ty
                )))
            }
        }
        Ok(())
    }

    /// Decodes a value of `data_type` from its fixed-width encoding.
    pub fn decode(data_type: DataType, bytes: &[u8]) -> Self {
        debug_assert_eq!(bytes.len(), data_type.size());
        match data_type {
            DataType::Integer => {
                Value::Integer(i32::from_le_bytes(bytes.try_into().unwrap()))
            }
            DataType::BigInt => Value::BigInt(i64::from_le_bytes(bytes.try_into().unwrap())),
            DataType::Char(_) => Value::Chars(bytes.to_vec()),
        }
    }

    /// Compares two encoded fields of the same type.
    pub fn compare_encoded(data_type: DataType, a: &[u8], b: &[u8]) -> Ordering {
        match data_type {
            DataType::Integer => {
                let a = i32::from_le_bytes(a.try_into().unwrap());
                let b = i32::from_le_bytes(b.try_into().unwrap());
                a.cmp(&b)
            }
            DataType::BigInt => {
                let a = i64::from_le_bytes(a.try_into().unwrap());
                let b = i64::from_le_bytes(b.try_into().unwrap());
                a.cmp(&b)
            }
            DataType::Char(_) => a.cmp(b),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Integer(v) => write!(f, "{}", v),
            Value::BigInt(v) => write!(f, "{}", v),
            Value::Chars(bytes) => {
                let end = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
                write!(f, "{}", String::from_utf8_lossy(&bytes[..end]))
            }
        }
    }
}
