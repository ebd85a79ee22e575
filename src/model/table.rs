use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

/// A column descriptor: stable key plus display name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Column {
    pub key: String,
    pub name: String,
}

/// A finalized table had a row whose width differs from the column count.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("row {row} has {found} cells, expected {expected}")]
pub struct ShapeError {
    pub row: usize,
    pub expected: usize,
    pub found: usize,
}

/// Format-agnostic representation of one table found in a file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CanonicalTable {
    /// Raw header lines, before any parsing.
    pub header: Vec<String>,
    pub metadata: BTreeMap<String, String>,
    pub columns: Vec<Column>,
    /// Raw cell values, aligned to `columns` once finalized.
    pub rows: Vec<Vec<String>>,
}

impl CanonicalTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a column keyed by its position.
    pub fn push_column(&mut self, name: impl Into<String>) {
        let key = self.columns.len().to_string();
        self.columns.push(Column {
            key,
            name: name.into(),
        });
    }

    /// Append `n` columns named `Column #i`.
    pub fn push_numbered_columns(&mut self, n: usize) {
        for _ in 0..n {
            let idx = self.columns.len();
            self.push_column(format!("Column #{}", idx));
        }
    }

    pub fn has_content(&self) -> bool {
        !self.header.is_empty() || !self.columns.is_empty() || !self.rows.is_empty()
    }

    /// Check every row against the column count and record the
    /// `rows`/`columns` counts in the metadata.
    pub fn finalize(&mut self) -> Result<(), ShapeError> {
        let expected = self.columns.len();
        if let Some((row, cells)) = self
            .rows
            .iter()
            .enumerate()
            .find(|(_, cells)| cells.len() != expected)
        {
            return Err(ShapeError {
                row,
                expected,
                found: cells.len(),
            });
        }
        self.metadata
            .insert("rows".to_string(), self.rows.len().to_string());
        self.metadata
            .insert("columns".to_string(), expected.to_string());
        Ok(())
    }

    /// The header block joined with line separators.
    pub fn header_text(&self) -> String {
        self.header.join("\n")
    }
}

/// Everything a reader extracted from one file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileData {
    pub metadata: BTreeMap<String, String>,
    pub tables: Vec<CanonicalTable>,
}

impl FileData {
    pub fn table(&self, index: usize) -> Option<&CanonicalTable> {
        self.tables.get(index)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn finalize_records_counts() {
        let mut table = CanonicalTable::new();
        table.push_column("Column #0 (T)");
        table.push_column("Column #1 (V)");
        table.rows.push(vec!["1".into(), "2".into()]);
        table.rows.push(vec!["3".into(), "4".into()]);

        table.finalize().unwrap();
        assert_eq!(table.metadata["rows"], "2");
        assert_eq!(table.metadata["columns"], "2");
        assert_eq!(table.columns[1].key, "1");
    }

    #[test]
    fn finalize_rejects_ragged_rows() {
        let mut table = CanonicalTable::new();
        table.push_numbered_columns(2);
        table.rows.push(vec!["1".into(), "2".into()]);
        table.rows.push(vec!["3".into()]);

        let err = table.finalize().unwrap_err();
        assert_eq!(
            err,
            ShapeError {
                row: 1,
                expected: 2,
                found: 1
            }
        );
        assert!(!table.metadata.contains_key("rows"));
    }
}
