//! Parsing of helper output into a dataset.
//!
//! The helper prints a single JSON document. Output printed before it, such
//! as warnings, is skipped by taking the last line that looks like a JSON
//! object.

use grid_protocol::{CellValue, GridPayload};
use log::warn;
use serde::Deserialize;
use serde_json::Value;

use crate::error::SchemaError;

/// Column list and row count reported by the `info` call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataFrameInfo {
    pub columns: Vec<String>,
    pub row_count: usize,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum ColumnEntry {
    Name(String),
    Described {
        #[serde(alias = "key")]
        name: String,
    },
}

impl ColumnEntry {
    fn into_name(self) -> String {
        match self {
            ColumnEntry::Name(name) | ColumnEntry::Described { name } => name,
        }
    }
}

#[derive(Deserialize)]
struct InfoDocument {
    columns: Vec<ColumnEntry>,
    #[serde(rename = "rowCount", alias = "row_count")]
    row_count: usize,
}

#[derive(Deserialize)]
struct RowsDocument {
    data: Vec<Vec<Value>>,
}

fn json_document(text: &str) -> Result<&str, SchemaError> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Err(SchemaError::Empty);
    }
    Ok(trimmed
        .lines()
        .rev()
        .map(str::trim)
        .find(|line| line.starts_with('{'))
        .unwrap_or(trimmed))
}

pub fn parse_info(text: &str) -> Result<DataFrameInfo, SchemaError> {
    let doc: InfoDocument = serde_json::from_str(json_document(text)?)?;
    Ok(DataFrameInfo {
        columns: doc.columns.into_iter().map(ColumnEntry::into_name).collect(),
        row_count: doc.row_count,
    })
}

/// Parse the `rows` output, padding or truncating every row to `column_count`.
pub fn parse_rows(text: &str, column_count: usize) -> Result<Vec<Vec<CellValue>>, SchemaError> {
    let doc: RowsDocument = serde_json::from_str(json_document(text)?)?;
    Ok(doc
        .data
        .into_iter()
        .map(|row| {
            let mut cells: Vec<CellValue> = row
                .into_iter()
                .take(column_count)
                .map(CellValue::from_json)
                .collect();
            cells.resize_with(column_count, CellValue::missing);
            cells
        })
        .collect())
}

/// A fetched variable, ready to be pushed to the webview.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Dataset {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<CellValue>>,
}

impl Dataset {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Combine an `info` result with the parsed rows.
    pub fn assemble(info: DataFrameInfo, rows: Vec<Vec<CellValue>>) -> Self {
        if rows.len() != info.row_count {
            warn!(
                "Kernel reported {} rows but returned {}",
                info.row_count,
                rows.len()
            );
        }
        Dataset {
            columns: info.columns,
            rows,
        }
    }

    pub fn column_count(&self) -> usize {
        self.columns.len()
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    pub fn to_payload(&self) -> GridPayload {
        GridPayload {
            columns: self.columns.clone(),
            data: self.rows.clone(),
            error: None,
        }
    }
}
