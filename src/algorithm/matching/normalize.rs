//! Normalization of numeric matching factors
//!
//! Numeric factors are z-scored independently per column before weighting so
//! that loadings express relative importance rather than unit scale.

use crate::algorithm::matching::loadings::FactorLoadings;
use crate::error::{MatchError, Result};
use crate::reader::{ID_COLUMN, SampleTable};
use crate::utils::log_warning;

/// Rescales selected numeric columns of a sample table
#[derive(Debug, Clone)]
pub struct Normalizer {
    columns: Vec<usize>,
}

impl Normalizer {
    /// Normalize the given column positions
    #[must_use]
    pub const fn new(columns: Vec<usize>) -> Self {
        Self { columns }
    }

    /// Select the numeric (non-forced, non-nominal) factor columns of `table`
    pub fn for_loadings(table: &SampleTable, loadings: &FactorLoadings) -> Result<Self> {
        let columns = loadings
            .numeric_factor_names()
            .into_iter()
            .map(|name| table.require_column(name))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self::new(columns))
    }

    /// Column positions this normalizer rewrites
    #[must_use]
    pub fn columns(&self) -> &[usize] {
        &self.columns
    }

    /// Replace every selected column with its z-scores
    ///
    /// Row order, the header and all other columns are preserved.
    pub fn apply(&self, table: SampleTable) -> Result<SampleTable> {
        let (header, mut rows) = table.into_parts();

        for &column in &self.columns {
            let values = rows
                .iter()
                .map(|row| parse_numeric(&row[column], &row[ID_COLUMN], &header[column]))
                .collect::<Result<Vec<f64>>>()?;

            let Some(normalized) = z_scores(&values) else {
                log_warning(
                    "Column has zero variance; normalized values set to 0",
                    Some(header[column].as_str()),
                );
                for row in &mut rows {
                    row[column] = "0".to_string();
                }
                continue;
            };

            for (row, value) in rows.iter_mut().zip(normalized) {
                row[column] = value.to_string();
            }
        }

        SampleTable::new(header, rows)
    }
}

/// Parse one numeric cell, naming the sample and column on failure
pub fn parse_numeric(raw: &str, sample_id: &str, column: &str) -> Result<f64> {
    raw.parse::<f64>()
        .ok()
        .filter(|v| v.is_finite())
        .ok_or_else(|| {
            MatchError::data_integrity(format!(
                "Expected a numeric value in column '{column}' for sample '{sample_id}', found '{raw}'"
            ))
        })
}

/// Z-scores using the sample standard deviation
///
/// Returns `None` when the values have no spread (or fewer than two values).
#[must_use]
pub fn z_scores(values: &[f64]) -> Option<Vec<f64>> {
    if values.len() < 2 {
        return None;
    }
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (n - 1.0);
    let sd = variance.sqrt();
    if sd == 0.0 || !sd.is_finite() {
        return None;
    }
    Some(values.iter().map(|v| (v - mean) / sd).collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table(rows: &[[&str; 4]]) -> SampleTable {
        SampleTable::new(
            ["id", "status", "age", "sex"].map(String::from).to_vec(),
            rows.iter()
                .map(|r| r.iter().map(|c| (*c).to_string()).collect())
                .collect(),
        )
        .unwrap()
    }

    #[test]
    fn test_z_scores() {
        let z = z_scores(&[1.0, 2.0, 3.0]).unwrap();
        assert!((z[0] + 1.0).abs() < 1e-12);
        assert!(z[1].abs() < 1e-12);
        assert!((z[2] - 1.0).abs() < 1e-12);
        assert!(z_scores(&[5.0, 5.0]).is_none());
        assert!(z_scores(&[5.0]).is_none());
    }

    #[test]
    fn test_apply_rewrites_only_selected_columns() {
        let input = table(&[["a", "1", "10", "M"], ["b", "0", "20", "F"], ["c", "0", "30", "M"]]);
        let output = Normalizer::new(vec![2]).apply(input.clone()).unwrap();

        assert_eq!(output.header(), input.header());
        let ids: Vec<&str> = output.column(0).collect();
        assert_eq!(ids, vec!["a", "b", "c"]);
        let sexes: Vec<&str> = output.column(3).collect();
        assert_eq!(sexes, vec!["M", "F", "M"]);
        let ages: Vec<f64> = output.column(2).map(|v| v.parse().unwrap()).collect();
        assert!((ages[0] + 1.0).abs() < 1e-12);
        assert!((ages[2] - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_order_is_preserved() {
        let input = table(&[["a", "1", "3", "M"], ["b", "0", "-7", "F"], ["c", "0", "12", "M"]]);
        let output = Normalizer::new(vec![2]).apply(input).unwrap();
        let ages: Vec<f64> = output.column(2).map(|v| v.parse().unwrap()).collect();
        assert!(ages[1] < ages[0] && ages[0] < ages[2]);
    }

    #[test]
    fn test_non_numeric_value_is_fatal() {
        let input = table(&[["a", "1", "10", "M"], ["b", "0", "old", "F"]]);
        let err = Normalizer::new(vec![2]).apply(input).unwrap_err();
        let message = err.to_string();
        assert!(message.contains("'b'"));
        assert!(message.contains("'old'"));
    }

    #[test]
    fn test_constant_column_becomes_zero() {
        let input = table(&[["a", "1", "4", "M"], ["b", "0", "4", "F"]]);
        let output = Normalizer::new(vec![2]).apply(input).unwrap();
        assert!(output.column(2).all(|v| v == "0"));
    }
}
