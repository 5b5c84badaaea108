//! One-hot encoding of nominal matching factors
//!
//! A nominal column with k distinct values becomes k-1 indicator columns
//! named `<column>_<value>`. Levels are ordered by first appearance and the
//! last level is the reference, encoded as all zeros.

use itertools::Itertools;
use rustc_hash::FxHashMap;

use crate::algorithm::matching::loadings::FactorLoadings;
use crate::error::Result;
use crate::reader::SampleTable;
use crate::utils::log_warning;

/// Indicator columns produced for one nominal factor
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndicatorColumns {
    /// Configured factor name
    pub factor: String,
    /// Generated column names, in level order
    pub columns: Vec<String>,
    /// Level encoded as all zeros
    pub reference_level: Option<String>,
}

/// Result of nominal expansion
#[derive(Debug, Clone)]
pub struct NominalExpansion {
    /// Table with nominal columns replaced by indicators
    pub table: SampleTable,
    /// Indicator columns per nominal factor, in configuration order
    pub indicators: Vec<IndicatorColumns>,
}

impl NominalExpansion {
    /// Whether any column was rewritten
    #[must_use]
    pub fn expanded(&self) -> bool {
        !self.indicators.is_empty()
    }

    /// Indicator column names for a factor
    #[must_use]
    pub fn indicators_for(&self, factor: &str) -> Option<&[String]> {
        self.indicators
            .iter()
            .find(|i| i.factor == factor)
            .map(|i| i.columns.as_slice())
    }
}

/// Rewrites nominal columns into 0/1 indicator columns
#[derive(Debug, Clone)]
pub struct NominalExpander {
    /// (factor name, column position) in configuration order
    columns: Vec<(String, usize)>,
}

impl NominalExpander {
    /// Select the nominal factor columns of `table`
    pub fn for_loadings(table: &SampleTable, loadings: &FactorLoadings) -> Result<Self> {
        let columns = loadings
            .nominal_factor_names()
            .into_iter()
            .map(|name| Ok((name.to_string(), table.require_column(name)?)))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { columns })
    }

    /// Expand every configured nominal column
    ///
    /// With no nominal columns the table is returned untouched.
    pub fn expand(&self, table: SampleTable) -> Result<NominalExpansion> {
        if self.columns.is_empty() {
            return Ok(NominalExpansion {
                table,
                indicators: Vec::new(),
            });
        }

        // Pass 1: levels per nominal column in first-appearance order
        let levels: FxHashMap<usize, Vec<String>> = self
            .columns
            .iter()
            .map(|(_, column)| {
                let distinct = table.column(*column).unique().map(str::to_string).collect();
                (*column, distinct)
            })
            .collect();

        let mut indicators = Vec::with_capacity(self.columns.len());
        for (factor, column) in &self.columns {
            let factor_levels = &levels[column];
            if factor_levels.len() < 2 {
                log_warning(
                    "Nominal factor has a single level and contributes no indicator columns",
                    Some(factor.as_str()),
                );
            }
            let (encoded, reference) = split_reference(factor_levels);
            if let Some(reference) = reference {
                log::debug!("Nominal factor '{factor}' uses '{reference}' as reference level");
            }
            indicators.push(IndicatorColumns {
                factor: factor.clone(),
                columns: encoded.iter().map(|level| format!("{factor}_{level}")).collect(),
                reference_level: reference.cloned(),
            });
        }

        // Pass 2: rewrite header and rows
        let (header, rows) = table.into_parts();
        let new_header = expand_row(&header, &levels, |name, level| format!("{name}_{level}"));
        let new_rows = rows
            .iter()
            .map(|row| {
                expand_row(row, &levels, |value, level| {
                    (if value == level { "1" } else { "0" }).to_string()
                })
            })
            .collect();

        Ok(NominalExpansion {
            table: SampleTable::new(new_header, new_rows)?,
            indicators,
        })
    }
}

fn split_reference(levels: &[String]) -> (&[String], Option<&String>) {
    match levels.split_last() {
        Some((reference, encoded)) => (encoded, Some(reference)),
        None => (levels, None),
    }
}

/// Replace every nominal cell with one cell per encoded level
fn expand_row(
    cells: &[String],
    levels: &FxHashMap<usize, Vec<String>>,
    render: impl Fn(&str, &str) -> String,
) -> Vec<String> {
    let mut out = Vec::with_capacity(cells.len());
    for (index, cell) in cells.iter().enumerate() {
        match levels.get(&index) {
            Some(column_levels) => {
                let (encoded, _) = split_reference(column_levels);
                out.extend(encoded.iter().map(|level| render(cell, level)));
            }
            None => out.push(cell.clone()),
        }
    }
    out
}
