//! Module for reading tab-separated sample tables.
//!
//! Every file the pipeline consumes (sample files, status files, phenotype
//! files, variable definitions) is a headed TSV. `SampleTable` keeps the raw
//! string cells so each stage decides how to interpret its own columns.

use std::path::Path;

use csv::{ReaderBuilder, Trim};

use crate::error::util::safe_open_file;
use crate::error::{MatchError, Result};

/// Column holding the sample identifier
pub const ID_COLUMN: usize = 0;
/// Column holding the case/control status
pub const STATUS_COLUMN: usize = 1;

/// A headed table of string cells in file order
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SampleTable {
    header: Vec<String>,
    rows: Vec<Vec<String>>,
}

impl SampleTable {
    /// Create a table, checking that every row is as wide as the header
    pub fn new(header: Vec<String>, rows: Vec<Vec<String>>) -> Result<Self> {
        if let Some((index, row)) = rows
            .iter()
            .enumerate()
            .find(|(_, row)| row.len() != header.len())
        {
            return Err(MatchError::data_integrity(format!(
                "Row {} has {} fields, expected {} to match the header",
                index + 1,
                row.len(),
                header.len()
            )));
        }
        Ok(Self { header, rows })
    }

    /// Read a TSV file with a header row
    pub fn read_tsv(path: &Path, purpose: &str) -> Result<Self> {
        let file = safe_open_file(path, purpose)?;
        let mut reader = ReaderBuilder::new()
            .delimiter(b'\t')
            .has_headers(true)
            .trim(Trim::All)
            .from_reader(file);

        let header: Vec<String> = reader.headers()?.iter().map(str::to_string).collect();
        let mut rows = Vec::new();
        for record in reader.records() {
            let record = record?;
            rows.push(record.iter().map(str::to_string).collect());
        }

        log::debug!(
            "Read {} rows x {} columns from {}",
            rows.len(),
            header.len(),
            path.display()
        );
        Self::new(header, rows)
    }

    /// Column names in file order
    #[must_use]
    pub fn header(&self) -> &[String] {
        &self.header
    }

    /// Data rows in file order
    #[must_use]
    pub fn rows(&self) -> &[Vec<String>] {
        &self.rows
    }

    /// Number of data rows
    #[must_use]
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Whether the table has no data rows
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Position of a column, `None` when absent
    #[must_use]
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.header.iter().position(|h| h == name)
    }

    /// Position of a column that must be present exactly once
    pub fn require_column(&self, name: &str) -> Result<usize> {
        let mut matches = self
            .header
            .iter()
            .enumerate()
            .filter(|(_, h)| h.as_str() == name)
            .map(|(i, _)| i);
        match (matches.next(), matches.next()) {
            (Some(index), None) => Ok(index),
            (None, _) => Err(MatchError::data_integrity(format!(
                "Expected column '{name}' in header, found: [{}]",
                self.header.join(", ")
            ))),
            (Some(_), Some(_)) => Err(MatchError::data_integrity(format!(
                "Column '{name}' appears more than once in header: [{}]",
                self.header.join(", ")
            ))),
        }
    }

    /// Values of one column, in row order
    pub fn column(&self, index: usize) -> impl Iterator<Item = &str> {
        self.rows.iter().map(move |row| row[index].as_str())
    }

    /// Split into header and rows
    #[must_use]
    pub fn into_parts(self) -> (Vec<String>, Vec<Vec<String>>) {
        (self.header, self.rows)
    }
}
