//! The record contract: typed row targets.
//!
//! A record declares its fields (via `#[derive(Record)]`) and binds
//! values by dotted field path, which is how embedded records are
//! reached: `"base.id"` traverses the `base` field into its own
//! record. The scanner derives and caches the column→path map from
//! these declarations.

use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::value::Value;

/// One declared field of a record type.
#[derive(Debug, Clone)]
pub enum FieldDecl {
    /// A scalar column target.
    ///
    /// Tag semantics: `"-"` skips the field, `""` defaults to the
    /// lower-cased field name, anything else is the column name.
    Column {
        /// Field name in the record.
        field: &'static str,
        /// Declared column tag.
        tag: &'static str,
    },
    /// An embedded record whose columns are spliced in with this
    /// field's name prefixed onto their paths.
    Embedded {
        /// Field name in the record.
        field: &'static str,
        /// The embedded record's own declarations.
        fields: fn() -> Vec<FieldDecl>,
    },
}

/// A type the scanner can populate from result rows.
///
/// Implemented with `#[derive(Record)]`; the derive reads `#[db(...)]`
/// attributes off the fields.
pub trait Record: Default + Send + Sync + 'static {
    /// The declared fields, in declaration order.
    fn fields() -> Vec<FieldDecl>;

    /// Writes `value` into the field addressed by `path`.
    ///
    /// # Errors
    ///
    /// Returns [`ScanError::UnknownField`] when the path does not
    /// resolve to a settable field. A mapped path that fails to
    /// resolve indicates a bug in the record declaration.
    fn bind(&mut self, path: &[&str], value: Value) -> Result<(), ScanError>;
}

/// Errors raised while materializing a row into a record.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ScanError {
    /// A field path from the cached map did not resolve.
    #[error("field path {path:?} does not resolve to a settable field")]
    UnknownField {
        /// The dotted path that failed to resolve.
        path: String,
    },

    /// A value could not be converted into the field's type.
    #[error("cannot convert {actual} value into {expected}")]
    TypeMismatch {
        /// The field's type.
        expected: &'static str,
        /// The value variant that arrived.
        actual: &'static str,
    },
}

impl ScanError {
    fn mismatch(expected: &'static str, value: &Value) -> Self {
        Self::TypeMismatch {
            expected,
            actual: value.kind(),
        }
    }
}

/// Conversion from an opaque cell into a concrete field type.
pub trait FromValue: Sized {
    /// Converts `value` into `Self`.
    ///
    /// # Errors
    ///
    /// Returns [`ScanError::TypeMismatch`] when the value's variant
    /// does not fit.
    fn from_value(value: Value) -> Result<Self, ScanError>;
}

impl FromValue for i64 {
    fn from_value(value: Value) -> Result<Self, ScanError> {
        match value {
            Value::Int(v) => Ok(v),
            other => Err(ScanError::mismatch("i64", &other)),
        }
    }
}

impl FromValue for i32 {
    fn from_value(value: Value) -> Result<Self, ScanError> {
        match value {
            Value::Int(v) => {
                v.try_into().map_err(|_| ScanError::TypeMismatch {
                    expected: "i32",
                    actual: "int",
                })
            }
            other => Err(ScanError::mismatch("i32", &other)),
        }
    }
}

impl FromValue for u64 {
    fn from_value(value: Value) -> Result<Self, ScanError> {
        match value {
            Value::Int(v) => {
                v.try_into().map_err(|_| ScanError::TypeMismatch {
                    expected: "u64",
                    actual: "int",
                })
            }
            other => Err(ScanError::mismatch("u64", &other)),
        }
    }
}

impl FromValue for u32 {
    fn from_value(value: Value) -> Result<Self, ScanError> {
        match value {
            Value::Int(v) => {
                v.try_into().map_err(|_| ScanError::TypeMismatch {
                    expected: "u32",
                    actual: "int",
                })
            }
            other => Err(ScanError::mismatch("u32", &other)),
        }
    }
}

impl FromValue for f64 {
    fn from_value(value: Value) -> Result<Self, ScanError> {
        match value {
            Value::Float(v) => Ok(v),
            Value::Int(v) => Ok(v as f64),
            other => Err(ScanError::mismatch("f64", &other)),
        }
    }
}

impl FromValue for bool {
    fn from_value(value: Value) -> Result<Self, ScanError> {
        match value {
            Value::Bool(v) => Ok(v),
            // MySQL BOOLEAN columns arrive as TINYINT.
            Value::Int(v) => Ok(v != 0),
            other => Err(ScanError::mismatch("bool", &other)),
        }
    }
}

impl FromValue for String {
    fn from_value(value: Value) -> Result<Self, ScanError> {
        match value {
            Value::Text(v) => Ok(v),
            Value::Bytes(v) => String::from_utf8(v).map_err(|_| ScanError::TypeMismatch {
                expected: "utf-8 string",
                actual: "bytes",
            }),
            other => Err(ScanError::mismatch("string", &other)),
        }
    }
}

impl FromValue for Vec<u8> {
    fn from_value(value: Value) -> Result<Self, ScanError> {
        match value {
            Value::Bytes(v) => Ok(v),
            Value::Text(v) => Ok(v.into_bytes()),
            other => Err(ScanError::mismatch("bytes", &other)),
        }
    }
}

impl FromValue for DateTime<Utc> {
    fn from_value(value: Value) -> Result<Self, ScanError> {
        match value {
            Value::DateTime(v) => Ok(v),
            other => Err(ScanError::mismatch("datetime", &other)),
        }
    }
}

impl<T: FromValue> FromValue for Option<T> {
    fn from_value(value: Value) -> Result<Self, ScanError> {
        match value {
            Value::Null => Ok(None),
            other => T::from_value(other).map(Some),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_int_conversions() {
        assert_eq!(i64::from_value(Value::Int(5)).unwrap(), 5);
        assert_eq!(i32::from_value(Value::Int(5)).unwrap(), 5);
        assert!(i32::from_value(Value::Int(i64::MAX)).is_err());
        assert!(u64::from_value(Value::Int(-1)).is_err());
        assert!(i64::from_value(Value::Text("5".to_string())).is_err());
    }

    #[test]
    fn test_bool_accepts_tinyint() {
        assert!(bool::from_value(Value::Int(1)).unwrap());
        assert!(!bool::from_value(Value::Int(0)).unwrap());
        assert!(bool::from_value(Value::Bool(true)).unwrap());
    }

    #[test]
    fn test_float_widens_int() {
        assert_eq!(f64::from_value(Value::Int(2)).unwrap(), 2.0);
        assert_eq!(f64::from_value(Value::Float(2.5)).unwrap(), 2.5);
    }

    #[test]
    fn test_string_from_bytes() {
        assert_eq!(
            String::from_value(Value::Bytes(b"hi".to_vec())).unwrap(),
            "hi"
        );
        assert!(String::from_value(Value::Bytes(vec![0xff, 0xfe])).is_err());
    }

    #[test]
    fn test_option_maps_null() {
        assert_eq!(Option::<i64>::from_value(Value::Null).unwrap(), None);
        assert_eq!(
            Option::<i64>::from_value(Value::Int(3)).unwrap(),
            Some(3)
        );
        assert!(Option::<i64>::from_value(Value::Text("x".to_string())).is_err());
    }
}
