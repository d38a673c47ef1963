//! Scalar grid cells.

use serde::{Deserialize, Serialize};
use serde_json::{Number, Value};

/// Placeholder rendered for a cell the backing rows do not have.
pub const MISSING_CELL: &str = "undefined";

/// A single grid cell. Serialized untagged, so a row is a plain JSON array
/// like `[1, "a", 2.5]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CellValue {
    Number(Number),
    Text(String),
}

impl CellValue {
    /// The placeholder used for absent cells.
    pub fn missing() -> Self {
        CellValue::Text(MISSING_CELL.to_string())
    }

    /// Convert an arbitrary JSON value into a cell.
    ///
    /// Numbers and strings pass through. `null` becomes the missing
    /// placeholder and anything else is stringified as compact JSON.
    pub fn from_json(value: Value) -> Self {
        match value {
            Value::Number(n) => CellValue::Number(n),
            Value::String(s) => CellValue::Text(s),
            Value::Null => CellValue::missing(),
            Value::Bool(b) => CellValue::Text(b.to_string()),
            other => CellValue::Text(other.to_string()),
        }
    }
}

impl std::fmt::Display for CellValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CellValue::Number(n) => write!(f, "{}", n),
            CellValue::Text(s) => write!(f, "{}", s),
        }
    }
}

impl From<i32> for CellValue {
    fn from(v: i32) -> Self {
        CellValue::Number(v.into())
    }
}

impl From<i64> for CellValue {
    fn from(v: i64) -> Self {
        CellValue::Number(v.into())
    }
}

impl From<&str> for CellValue {
    fn from(v: &str) -> Self {
        CellValue::Text(v.to_string())
    }
}

impl From<String> for CellValue {
    fn from(v: String) -> Self {
        CellValue::Text(v)
    }
}
