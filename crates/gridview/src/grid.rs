//! The grid the webview displays.
//!
//! [`GridModel`] holds exactly what the renderer shows: column descriptors,
//! the backing rows, and an invalidation counter standing in for the grid
//! widget's "redraw every visible cell" call. It is rebuilt wholesale on
//! every `update`; there is no diffing.

use grid_protocol::{CellValue, GridPayload, HostMessage};
use tabled::builder::Builder;
use tabled::settings::Style;

/// A displayed column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnDescriptor {
    pub title: String,
    pub width: u32,
}

#[derive(Debug, Clone)]
pub struct GridModel {
    column_width: u32,
    columns: Vec<ColumnDescriptor>,
    rows: Vec<Vec<CellValue>>,
    error: Option<String>,
    invalidations: u64,
}

impl GridModel {
    pub fn new(column_width: u32) -> Self {
        GridModel {
            column_width,
            columns: Vec::new(),
            rows: Vec::new(),
            error: None,
            invalidations: 0,
        }
    }

    /// Handle a host message.
    pub fn apply(&mut self, message: HostMessage) {
        match message {
            HostMessage::Update { data } => self.replace(data),
        }
    }

    /// Replace the columns and rows, then invalidate every cell.
    pub fn replace(&mut self, payload: GridPayload) {
        self.columns = payload
            .columns
            .into_iter()
            .map(|title| ColumnDescriptor {
                title,
                width: self.column_width,
            })
            .collect();
        self.rows = payload.data;
        self.error = payload.error;
        self.invalidate_all();
    }

    fn invalidate_all(&mut self) {
        self.invalidations += 1;
    }

    pub fn columns(&self) -> &[ColumnDescriptor] {
        &self.columns
    }

    pub fn column_count(&self) -> usize {
        self.columns.len()
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    /// How many full redraws have been requested so far.
    pub fn invalidations(&self) -> u64 {
        self.invalidations
    }

    /// The cell at (`column`, `row`). Cells the backing rows lack read as `"undefined"`.
    pub fn cell(&self, column: usize, row: usize) -> CellValue {
        self.rows
            .get(row)
            .and_then(|r| r.get(column))
            .cloned()
            .unwrap_or_else(CellValue::missing)
    }

    /// Draw the grid as a text table.
    pub fn render_table(&self) -> String {
        if let Some(error) = &self.error {
            return format!("(empty grid: {})", error);
        }
        if self.columns.is_empty() {
            return "(empty grid)".to_string();
        }
        let mut builder = Builder::default();
        builder.push_record(self.columns.iter().map(|c| c.title.clone()));
        for row in 0..self.row_count() {
            builder.push_record(
                (0..self.column_count()).map(|col| self.cell(col, row).to_string()),
            );
        }
        builder.build().with(Style::rounded()).to_string()
    }
}

impl Default for GridModel {
    fn default() -> Self {
        GridModel::new(crate::settings::GridSettings::default().column_width)
    }
}
