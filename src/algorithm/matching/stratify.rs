//! Stratification of samples into independent matching pools
//!
//! Samples are grouped by the exact values of their forced factors; matching
//! never crosses a stratum boundary. Within a stratum every sample carries a
//! weighted distance vector built from the numeric factors followed by the
//! indicator columns of the nominal factors.

use std::collections::BTreeMap;

use rustc_hash::FxHashSet;

use crate::algorithm::matching::loadings::{FactorLoading, FactorLoadings};
use crate::algorithm::matching::nominal::NominalExpansion;
use crate::algorithm::matching::normalize::parse_numeric;
use crate::error::{MatchError, Result};
use crate::reader::{ID_COLUMN, STATUS_COLUMN, SampleTable};

/// Status value marking a case
pub const CASE_STATUS: &str = "1";
/// Status value marking a control
pub const CONTROL_STATUS: &str = "0";

/// A sample ready for distance computation
#[derive(Debug, Clone, PartialEq)]
pub struct Sample {
    /// Sample identifier
    pub id: String,
    /// Weighted coordinates
    pub vector: Vec<f64>,
}

/// Cases and controls sharing the same forced-factor values
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Stratum {
    /// Forced values joined with `_`; empty when nothing is forced
    pub key: String,
    /// Cases in file order
    pub cases: Vec<Sample>,
    /// Controls in file order
    pub controls: Vec<Sample>,
}

impl Stratum {
    /// Control vectors in stratum order
    #[must_use]
    pub fn control_points(&self) -> Vec<Vec<f64>> {
        self.controls.iter().map(|c| c.vector.clone()).collect()
    }
}

/// Splits a sample table into strata of weighted samples
#[derive(Debug, Clone)]
pub struct Stratifier {
    /// (column, weight) in distance-vector order
    coordinates: Vec<(usize, f64)>,
    /// Forced columns in header order
    forced: Vec<usize>,
}

impl Stratifier {
    /// Resolve factor columns against a (possibly expanded) table
    pub fn new(expansion: &NominalExpansion, loadings: &FactorLoadings) -> Result<Self> {
        let table = &expansion.table;
        if table.header().len() <= STATUS_COLUMN {
            return Err(MatchError::data_integrity(
                "Sample table needs an id column followed by a status column",
            ));
        }

        let mut coordinates = Vec::new();
        for (name, loading) in loadings.iter() {
            if let FactorLoading::Numeric(weight) = loading {
                coordinates.push((table.require_column(name)?, weight));
            }
        }
        for (name, loading) in loadings.iter() {
            if let FactorLoading::Nominal(weight) = loading {
                let indicators = expansion.indicators_for(name).ok_or_else(|| {
                    MatchError::data_integrity(format!(
                        "Nominal factor '{name}' was not expanded into indicator columns"
                    ))
                })?;
                for indicator in indicators {
                    coordinates.push((table.require_column(indicator)?, weight));
                }
            }
        }

        let mut forced = loadings
            .forced_factor_names()
            .into_iter()
            .map(|name| table.require_column(name))
            .collect::<Result<Vec<_>>>()?;
        forced.sort_unstable();

        Ok(Self {
            coordinates,
            forced,
        })
    }

    /// Number of coordinates in every distance vector
    #[must_use]
    pub fn dimensions(&self) -> usize {
        self.coordinates.len()
    }

    /// Group samples by stratum key, ordered by key
    ///
    /// Rows whose status is neither case nor control are left out.
    pub fn stratify(&self, table: &SampleTable) -> Result<Vec<Stratum>> {
        let header = table.header();
        let mut seen = FxHashSet::default();
        let mut strata: BTreeMap<String, Stratum> = BTreeMap::new();
        let mut dropped = 0usize;

        for row in table.rows() {
            let id = &row[ID_COLUMN];
            if !seen.insert(id.as_str()) {
                return Err(MatchError::data_integrity(format!(
                    "Sample id '{id}' appears more than once in the sample file"
                )));
            }

            let is_case = match row[STATUS_COLUMN].as_str() {
                CASE_STATUS => true,
                CONTROL_STATUS => false,
                other => {
                    log::debug!("Skipping sample '{id}' with status '{other}'");
                    dropped += 1;
                    continue;
                }
            };

            let vector = self
                .coordinates
                .iter()
                .map(|&(column, weight)| {
                    parse_numeric(&row[column], id, &header[column]).map(|value| value * weight)
                })
                .collect::<Result<Vec<f64>>>()?;
            let key = self
                .forced
                .iter()
                .map(|&column| row[column].as_str())
                .collect::<Vec<_>>()
                .join("_");

            let stratum = strata.entry(key).or_insert_with_key(|key| Stratum {
                key: key.clone(),
                ..Stratum::default()
            });
            let sample = Sample {
                id: id.clone(),
                vector,
            };
            if is_case {
                stratum.cases.push(sample);
            } else {
                stratum.controls.push(sample);
            }
        }

        if dropped > 0 {
            log::info!("Ignored {dropped} samples that are neither case nor control");
        }
        log::info!(
            "Split {} samples into {} strata",
            seen.len() - dropped,
            strata.len()
        );
        Ok(strata.into_values().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::algorithm::matching::nominal::NominalExpander;

    fn expand(rows: &[&[&str]], header: &[&str], loadings: &FactorLoadings) -> NominalExpansion {
        let table = SampleTable::new(
            header.iter().map(|h| (*h).to_string()).collect(),
            rows.iter()
                .map(|r| r.iter().map(|c| (*c).to_string()).collect())
                .collect(),
        )
        .unwrap();
        NominalExpander::for_loadings(&table, loadings)
            .unwrap()
            .expand(table)
            .unwrap()
    }

    #[test]
    fn test_weighted_vectors_and_strata() {
        let loadings = FactorLoadings::parse("PC1:2,sex:force,site:nominal:3,PC2:0.5").unwrap();
        let expansion = expand(
            &[
                &["a", "1", "1.0", "M", "x", "4"],
                &["b", "0", "2.0", "F", "y", "6"],
                &["c", "0", "3.0", "M", "y", "8"],
                &["d", "9", "3.0", "M", "y", "8"],
            ],
            &["id", "status", "PC1", "sex", "site", "PC2"],
            &loadings,
        );
        let stratifier = Stratifier::new(&expansion, &loadings).unwrap();
        assert_eq!(stratifier.dimensions(), 3);

        let strata = stratifier.stratify(&expansion.table).unwrap();
        let keys: Vec<&str> = strata.iter().map(|s| s.key.as_str()).collect();
        assert_eq!(keys, vec!["F", "M"]);

        let male = &strata[1];
        assert_eq!(male.cases.len(), 1);
        assert_eq!(male.controls.len(), 1);
        assert_eq!(male.cases[0].vector, vec![2.0, 2.0, 3.0]);
        assert_eq!(male.controls[0].id, "c");
        assert_eq!(male.controls[0].vector, vec![6.0, 4.0, 0.0]);
        assert!(strata[0].cases.is_empty());
    }

    #[test]
    fn test_no_forced_factors_gives_one_stratum() {
        let loadings = FactorLoadings::parse("PC1:1").unwrap();
        let expansion = expand(
            &[&["a", "1", "1"], &["b", "0", "2"]],
            &["id", "status", "PC1"],
            &loadings,
        );
        let strata = Stratifier::new(&expansion, &loadings)
            .unwrap()
            .stratify(&expansion.table)
            .unwrap();
        assert_eq!(strata.len(), 1);
        assert_eq!(strata[0].key, "");
    }

    #[test]
    fn test_forced_key_follows_header_order() {
        let loadings = FactorLoadings::parse("site:force,sex:force,PC1:1").unwrap();
        let expansion = expand(
            &[&["a", "1", "F", "north", "1"]],
            &["id", "status", "sex", "site", "PC1"],
            &loadings,
        );
        let strata = Stratifier::new(&expansion, &loadings)
            .unwrap()
            .stratify(&expansion.table)
            .unwrap();
        assert_eq!(strata[0].key, "F_north");
    }

    #[test]
    fn test_duplicate_sample_id_is_rejected() {
        let loadings = FactorLoadings::parse("PC1:1").unwrap();
        let expansion = expand(
            &[&["a", "1", "1"], &["a", "0", "2"]],
            &["id", "status", "PC1"],
            &loadings,
        );
        let err = Stratifier::new(&expansion, &loadings)
            .unwrap()
            .stratify(&expansion.table)
            .unwrap_err();
        assert!(err.is_data_integrity());
    }

    #[test]
    fn test_non_numeric_factor_is_rejected() {
        let loadings = FactorLoadings::parse("PC1:1").unwrap();
        let expansion = expand(
            &[&["a", "1", "high"]],
            &["id", "status", "PC1"],
            &loadings,
        );
        let err = Stratifier::new(&expansion, &loadings)
            .unwrap()
            .stratify(&expansion.table)
            .unwrap_err();
        assert!(err.to_string().contains("'high'"));
    }
}
