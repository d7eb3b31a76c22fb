//! Result Set - Standardized result format returned by the warehouse
//!
//! An ordered set of named columns with row data kept as JSON values, matching
//! the wire shape of statement-style query APIs.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultSet {
    /// Column names, in result order
    pub columns: Vec<String>,

    /// Row data; each row holds one value per column
    pub rows: Vec<Vec<serde_json::Value>>,
}

impl ResultSet {
    pub fn new(columns: Vec<String>, rows: Vec<Vec<serde_json::Value>>) -> Self {
        Self { columns, rows }
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.columns.iter().any(|c| c == name)
    }

    /// Literal textual rendering of the full result: header, separator, one
    /// line per row. Every cell appears in full; nothing is sampled or
    /// truncated.
    pub fn render_text(&self) -> String {
        let mut widths: Vec<usize> = self.columns.iter().map(|c| c.len()).collect();
        let mut cells: Vec<Vec<String>> = Vec::with_capacity(self.rows.len());

        for row in &self.rows {
            let mut rendered = Vec::with_capacity(row.len());
            for (i, value) in row.iter().enumerate() {
                let text = display_value(value);
                if i < widths.len() && text.len() > widths[i] {
                    widths[i] = text.len();
                }
                rendered.push(text);
            }
            cells.push(rendered);
        }

        let mut out = String::new();
        push_line(&mut out, &self.columns, &widths);
        let separator: Vec<String> = widths.iter().map(|w| "-".repeat(*w)).collect();
        out.push_str(&separator.join("-+-"));
        out.push('\n');
        for row in &cells {
            push_line(&mut out, row, &widths);
        }
        out
    }
}

fn push_line<S: AsRef<str>>(out: &mut String, cells: &[S], widths: &[usize]) {
    let last = cells.len().saturating_sub(1);
    for (i, cell) in cells.iter().enumerate() {
        let cell = cell.as_ref();
        if i < last {
            let width = widths.get(i).copied().unwrap_or(cell.len());
            out.push_str(&format!("{:<width$} | ", cell, width = width));
        } else {
            out.push_str(cell);
        }
    }
    out.push('\n');
}

/// Cell display form: strings appear bare (no surrounding quotes), everything
/// else uses its JSON rendering.
pub fn display_value(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
