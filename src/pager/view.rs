//! Page view: turns one display page of the resident buffer into a text table.
//!
//! Records are converted to JSON rows by a [`RecordSerializer`] and laid out by
//! a [`TableRenderer`]. Columns pick values out of each row with a dotted path
//! (`"metadata.name"`), so nested records render without a bespoke row type.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::config::PaginationConfig;
use crate::pager::window::BatchWindow;

#[derive(Error, Debug)]
pub enum RenderError {
    #[error("Failed to serialize record {index} of page {page}: {source}")]
    Serialization {
        page: usize,
        index: usize,
        #[source]
        source: serde_json::Error,
    },

    #[error("Table renderer rejected page {page}: {source}")]
    Table {
        page: usize,
        #[source]
        source: TableError,
    },

    #[error("Page {0} is not resident in the batch window")]
    PageNotResident(usize),
}

#[derive(Error, Debug, PartialEq, Eq)]
pub enum TableError {
    #[error("No columns configured")]
    NoColumns,

    #[error("Row {0} is not a JSON object")]
    NotAnObject(usize),
}

/// One table column: a header and the dotted path of the value it shows.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Column {
    pub header: String,
    pub path: String,
}

impl Column {
    pub fn new(header: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            header: header.into(),
            path: path.into(),
        }
    }
}

/// Converts one record into a JSON row.
pub trait RecordSerializer<R>: Send + Sync {
    fn to_row(&self, record: &R) -> Result<Value, serde_json::Error>;
}

/// Serializer for any `serde::Serialize` record.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonRecordSerializer;

impl<R: Serialize> RecordSerializer<R> for JsonRecordSerializer {
    fn to_row(&self, record: &R) -> Result<Value, serde_json::Error> {
        serde_json::to_value(record)
    }
}

/// Lays out JSON rows under column headers.
pub trait TableRenderer: Send + Sync {
    fn render(&self, rows: &[Value], columns: &[Column]) -> Result<String, TableError>;
}

/// Plain-text table with padded columns and a header rule.
#[derive(Debug, Clone, Copy, Default)]
pub struct TextTableRenderer;

impl TextTableRenderer {
    fn cell(row: &Value, path: &str) -> String {
        let value = path
            .split('.')
            .try_fold(row, |value, key| value.get(key));
        match value {
            None | Some(Value::Null) => String::new(),
            Some(Value::String(s)) => s.clone(),
            Some(other) => other.to_string(),
        }
    }
}

impl TableRenderer for TextTableRenderer {
    fn render(&self, rows: &[Value], columns: &[Column]) -> Result<String, TableError> {
        if columns.is_empty() {
            return Err(TableError::NoColumns);
        }

        let mut cells = Vec::with_capacity(rows.len());
        for (i, row) in rows.iter().enumerate() {
            if !row.is_object() {
                return Err(TableError::NotAnObject(i));
            }
            let line: Vec<String> = columns.iter().map(|c| Self::cell(row, &c.path)).collect();
            cells.push(line);
        }

        let widths: Vec<usize> = columns
            .iter()
            .enumerate()
            .map(|(i, c)| {
                cells
                    .iter()
                    .map(|line| line[i].chars().count())
                    .chain(std::iter::once(c.header.chars().count()))
                    .max()
                    .unwrap_or(0)
            })
            .collect();

        let format_line = |values: Vec<&str>| -> String {
            let padded: Vec<String> = values
                .iter()
                .zip(&widths)
                .map(|(v, w)| format!(" {:<width$} ", v, width = *w))
                .collect();
            format!("|{}|", padded.join("|"))
        };
        let rule = format!(
            "+{}+",
            widths
                .iter()
                .map(|w| "-".repeat(w + 2))
                .collect::<Vec<_>>()
                .join("+")
        );

        let mut out = String::new();
        out.push_str(&rule);
        out.push('\n');
        out.push_str(&format_line(columns.iter().map(|c| c.header.as_str()).collect()));
        out.push('\n');
        out.push_str(&rule);
        out.push('\n');
        for line in &cells {
            out.push_str(&format_line(line.iter().map(String::as_str).collect()));
            out.push('\n');
        }
        out.push_str(&rule);
        out.push('\n');
        Ok(out)
    }
}

/// Maps display pages onto the resident buffer and renders them.
pub struct PageView<R> {
    page_size: usize,
    pages_per_batch: usize,
    columns: Vec<Column>,
    serializer: Box<dyn RecordSerializer<R>>,
    renderer: Box<dyn TableRenderer>,
}

impl<R> PageView<R> {
    pub fn new(
        config: &PaginationConfig,
        columns: Vec<Column>,
        serializer: Box<dyn RecordSerializer<R>>,
        renderer: Box<dyn TableRenderer>,
    ) -> Self {
        Self {
            page_size: config.page_size,
            pages_per_batch: config.pages_per_batch(),
            columns,
            serializer,
            renderer,
        }
    }

    /// Buffer range `[start, end)` holding `page`.
    ///
    /// `end` is clamped to the buffer length, so the last page of a short
    /// batch yields only the records that exist.
    pub fn compute_slice_bounds(&self, page: usize, window: &BatchWindow<R>) -> Result<(usize, usize), RenderError> {
        let first = window.first_batch().ok_or(RenderError::PageNotResident(page))?;
        let position = page
            .checked_sub(first * self.pages_per_batch)
            .ok_or(RenderError::PageNotResident(page))?;

        let len = window.items().len();
        let start = position
            .checked_mul(self.page_size)
            .ok_or(RenderError::PageNotResident(page))?;
        if start >= len && !(start == 0 && len == 0) {
            return Err(RenderError::PageNotResident(page));
        }
        let end = start.saturating_add(self.page_size).min(len);
        Ok((start, end))
    }

    /// The serializer rows are produced with.
    pub fn serializer(&self) -> &dyn RecordSerializer<R> {
        self.serializer.as_ref()
    }

    /// Render `page` as a table. Fails as a whole if any record cannot be
    /// serialized.
    pub fn render_page(&self, page: usize, window: &BatchWindow<R>) -> Result<String, RenderError> {
        let (start, end) = self.compute_slice_bounds(page, window)?;

        let rows = window.items()[start..end]
            .iter()
            .enumerate()
            .map(|(index, record)| {
                self.serializer
                    .to_row(record)
                    .map_err(|source| RenderError::Serialization { page, index, source })
            })
            .collect::<Result<Vec<_>, _>>()?;

        self.renderer
            .render(&rows, &self.columns)
            .map_err(|source| RenderError::Table { page, source })
    }
}
