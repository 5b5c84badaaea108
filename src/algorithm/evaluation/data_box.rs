//! Sample-by-variable store for match-quality statistics
//!
//! A `DataBox` holds one tagged value per (sample, variable) for every
//! sample taking part in a control-case pairing. Four statistic families are
//! derived from it on demand and cached: concordance, case and control
//! averages, univariate significance and multivariate significance.
//! Once any family has been computed the box is sealed and further rows
//! are rejected.

use once_cell::sync::OnceCell;
use rustc_hash::FxHashMap;

use crate::algorithm::evaluation::pairing::ControlCasePairing;
use crate::algorithm::evaluation::regression::{IrlsLogistic, LogisticFitter};
use crate::algorithm::evaluation::variable::{MatchingVariable, VariableId, VariableKind};
use crate::error::{MatchError, Result};
use crate::reader::ID_COLUMN;
use crate::utils::log_warning;

/// A recorded value
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Value {
    /// Integer-coded binary value
    Binary(i64),
    /// Real value
    Continuous(f64),
}

impl Value {
    /// Numeric value for regression
    #[must_use]
    pub fn as_f64(self) -> f64 {
        match self {
            Self::Binary(v) => v as f64,
            Self::Continuous(v) => v,
        }
    }
}

#[derive(Debug, Clone)]
struct Record {
    id: String,
    is_case: bool,
    values: Vec<Value>,
}

/// Case and control means for one continuous variable
#[derive(Debug, Clone, Copy, PartialEq)]
struct Averages {
    case: f64,
    control: f64,
}

/// Values of every paired sample plus cached statistics
#[derive(Debug)]
pub struct DataBox<F = IrlsLogistic> {
    variables: Vec<MatchingVariable>,
    pairing: ControlCasePairing,
    records: Vec<Record>,
    record_by_id: FxHashMap<String, usize>,
    fitter: F,
    concordances: OnceCell<Vec<f64>>,
    averages: OnceCell<Vec<Averages>>,
    univariate: OnceCell<Vec<f64>>,
    multivariate: OnceCell<Vec<f64>>,
}

impl DataBox {
    /// Create a box using the built-in logistic fitter
    pub fn new(variables: Vec<MatchingVariable>, pairing: ControlCasePairing) -> Result<Self> {
        Self::with_fitter(variables, pairing, IrlsLogistic::default())
    }
}

impl<F: LogisticFitter> DataBox<F> {
    /// Create a box with a custom logistic fitter
    ///
    /// Every variable must already be bound to a phenotype column.
    pub fn with_fitter(
        variables: Vec<MatchingVariable>,
        pairing: ControlCasePairing,
        fitter: F,
    ) -> Result<Self> {
        if let Some(unbound) = variables.iter().find(|v| v.header_index().is_none()) {
            return Err(MatchError::data_integrity(format!(
                "Matching variable '{}' is not bound to a phenotype column",
                unbound.name()
            )));
        }
        Ok(Self {
            variables,
            pairing,
            records: Vec::new(),
            record_by_id: FxHashMap::default(),
            fitter,
            concordances: OnceCell::new(),
            averages: OnceCell::new(),
            univariate: OnceCell::new(),
            multivariate: OnceCell::new(),
        })
    }

    /// Handles of all variables in order
    #[must_use]
    pub fn variable_ids(&self) -> Vec<VariableId> {
        (0..self.variables.len()).map(VariableId).collect()
    }

    /// Variable behind a handle
    #[must_use]
    pub fn variable(&self, id: VariableId) -> &MatchingVariable {
        &self.variables[id.0]
    }

    /// Number of recorded samples
    #[must_use]
    pub fn recorded(&self) -> usize {
        self.records.len()
    }

    /// Record one phenotype row; rows of unpaired samples are ignored
    pub fn record_data(&mut self, row: &[String]) -> Result<()> {
        let Some(id) = row.get(ID_COLUMN) else {
            return Err(MatchError::data_integrity("Phenotype row has no sample id"));
        };
        if !self.pairing.contains(id) {
            return Ok(());
        }
        if self.statistics_computed() {
            return Err(MatchError::data_integrity(format!(
                "Cannot record sample '{id}' after statistics have been computed"
            )));
        }
        if self.record_by_id.contains_key(id) {
            return Err(MatchError::data_integrity(format!(
                "Found the same sample id twice: '{id}'"
            )));
        }

        let values = self
            .variables
            .iter()
            .map(|variable| parse_value(variable, row, id))
            .collect::<Result<Vec<_>>>()?;

        self.record_by_id.insert(id.clone(), self.records.len());
        self.records.push(Record {
            id: id.clone(),
            is_case: self.pairing.is_case(id),
            values,
        });
        Ok(())
    }

    fn statistics_computed(&self) -> bool {
        self.concordances.get().is_some()
            || self.averages.get().is_some()
            || self.univariate.get().is_some()
            || self.multivariate.get().is_some()
    }

    /// Fraction of controls whose value equals their case's value
    pub fn concordance(&self, id: VariableId) -> Result<f64> {
        self.variable(id).must_be_binary()?;
        Ok(self.concordances.get_or_try_init(|| self.compute_concordances())?[id.0])
    }

    /// Mean over recorded cases
    pub fn case_avg(&self, id: VariableId) -> Result<f64> {
        self.variable(id).cant_be_binary()?;
        Ok(self.averages.get_or_try_init(|| self.compute_averages())?[id.0].case)
    }

    /// Mean over recorded controls
    pub fn control_avg(&self, id: VariableId) -> Result<f64> {
        self.variable(id).cant_be_binary()?;
        Ok(self.averages.get_or_try_init(|| self.compute_averages())?[id.0].control)
    }

    /// Overall significance of status regressed on this variable alone
    pub fn univariate_p(&self, id: VariableId) -> Result<f64> {
        Ok(self.univariate.get_or_try_init(|| self.compute_univariate())?[id.0])
    }

    /// Significance of this variable in the joint regression
    pub fn multivariate_p(&self, id: VariableId) -> Result<f64> {
        Ok(self.multivariate.get_or_try_init(|| self.compute_multivariate())?[id.0])
    }

    fn compute_concordances(&self) -> Result<Vec<f64>> {
        let mut matches = vec![0usize; self.variables.len()];
        for control in self.records.iter().filter(|r| !r.is_case) {
            let case = self.case_record_for(&control.id)?;
            for (index, variable) in self.variables.iter().enumerate() {
                if variable.is_binary() && control.values[index] == case.values[index] {
                    matches[index] += 1;
                }
            }
        }

        let total = self.pairing.len() as f64;
        Ok(self
            .variables
            .iter()
            .zip(matches)
            .map(|(variable, count)| {
                if variable.is_binary() {
                    count as f64 / total
                } else {
                    f64::NAN
                }
            })
            .collect())
    }

    fn case_record_for(&self, control: &str) -> Result<&Record> {
        self.pairing
            .case_for(control)
            .and_then(|case| self.record_by_id.get(case))
            .map(|&index| &self.records[index])
            .ok_or_else(|| {
                MatchError::data_integrity(format!(
                    "Control '{control}' is paired with case '{}', which has no phenotype row",
                    self.pairing.case_for(control).unwrap_or("")
                ))
            })
    }

    fn ensure_case_coverage(&self) -> Result<()> {
        let missing: Vec<&str> = self
            .pairing
            .case_ids()
            .filter(|case| !self.record_by_id.contains_key(*case))
            .collect();
        if missing.is_empty() {
            return Ok(());
        }
        Err(MatchError::data_integrity(format!(
            "{} paired cases have no phenotype row (e.g. '{}')",
            missing.len(),
            missing[0]
        )))
    }

    fn compute_averages(&self) -> Result<Vec<Averages>> {
        self.ensure_case_coverage()?;
        Ok((0..self.variables.len())
            .map(|index| {
                if self.variables[index].is_binary() {
                    return Averages {
                        case: f64::NAN,
                        control: f64::NAN,
                    };
                }
                let mean = |is_case: bool| {
                    let values: Vec<f64> = self
                        .records
                        .iter()
                        .filter(|r| r.is_case == is_case)
                        .map(|r| r.values[index].as_f64())
                        .collect();
                    if values.is_empty() {
                        f64::NAN
                    } else {
                        values.iter().sum::<f64>() / values.len() as f64
                    }
                };
                Averages {
                    case: mean(true),
                    control: mean(false),
                }
            })
            .collect())
    }

    fn outcome(&self) -> Vec<f64> {
        self.records
            .iter()
            .map(|r| if r.is_case { 1.0 } else { 0.0 })
            .collect()
    }

    fn column(&self, index: usize) -> Vec<f64> {
        self.records.iter().map(|r| r.values[index].as_f64()).collect()
    }

    fn compute_univariate(&self) -> Result<Vec<f64>> {
        self.ensure_case_coverage()?;
        let outcome = self.outcome();
        self.variables
            .iter()
            .enumerate()
            .map(|(index, variable)| {
                let fit = self
                    .fitter
                    .fit(&outcome, &[self.column(index)], &[variable.name()])
                    .map_err(|e| regression_error("univariate fit", variable.name(), e))?;
                Ok(fit.overall_p)
            })
            .collect()
    }

    fn compute_multivariate(&self) -> Result<Vec<f64>> {
        self.ensure_case_coverage()?;
        let outcome = self.outcome();
        let columns: Vec<Vec<f64>> = (0..self.variables.len()).map(|i| self.column(i)).collect();
        let names: Vec<&str> = self.variables.iter().map(MatchingVariable::name).collect();

        let fit = self
            .fitter
            .fit(&outcome, &columns, &names)
            .map_err(|e| regression_error("multivariate fit", "all variables", e))?;

        Ok(names
            .iter()
            .map(|name| match fit.predictor(name).and_then(|p| p.p_value) {
                Some(p) => p,
                None => {
                    log_warning(
                        "Predictor dropped from the multivariate model; reporting NaN",
                        Some(*name),
                    );
                    f64::NAN
                }
            })
            .collect())
    }
}

fn regression_error(phase: &str, subject: &str, error: MatchError) -> MatchError {
    match error {
        MatchError::Collaborator {
            collaborator,
            message,
            ..
        } => MatchError::collaborator(collaborator, format!("{phase} for {subject}"), message),
        other => other,
    }
}

fn parse_value(variable: &MatchingVariable, row: &[String], id: &str) -> Result<Value> {
    let column = variable.header_index().unwrap_or(usize::MAX);
    let raw = row.get(column).ok_or_else(|| {
        MatchError::data_integrity(format!(
            "Phenotype row for '{id}' has no value for '{}'",
            variable.name()
        ))
    })?;
    let invalid = || {
        MatchError::data_integrity(format!(
            "Invalid {} value '{raw}' for '{}' in sample '{id}'",
            variable.kind(),
            variable.name()
        ))
    };

    match variable.kind() {
        VariableKind::Binary => {
            let value = raw.parse::<f64>().map_err(|_| invalid())?;
            if value.fract() != 0.0 || !(i64::MIN as f64..i64::MAX as f64).contains(&value) {
                return Err(invalid());
            }
            Ok(Value::Binary(value as i64))
        }
        VariableKind::Continuous => raw
            .parse::<f64>()
            .ok()
            .filter(|v| v.is_finite())
            .map(Value::Continuous)
            .ok_or_else(invalid),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(values: &[&str]) -> Vec<String> {
        values.iter().map(|v| (*v).to_string()).collect()
    }

    fn bound(name: &str, kind: VariableKind, header: &[String]) -> MatchingVariable {
        let mut variable = MatchingVariable::new(name, kind);
        variable.find_index_in_header(header);
        variable
    }

    fn binary_box() -> DataBox {
        let header = row(&["id", "flag"]);
        let pairing = ControlCasePairing::from_pairs([("c1", "A"), ("c2", "A")]).unwrap();
        let mut data = DataBox::new(vec![bound("flag", VariableKind::Binary, &header)], pairing).unwrap();
        data.record_data(&row(&["A", "0"])).unwrap();
        data.record_data(&row(&["c1", "1"])).unwrap();
        data.record_data(&row(&["c2", "0"])).unwrap();
        data
    }

    #[test]
    fn test_concordance_half() {
        let data = binary_box();
        assert!((data.concordance(VariableId(0)).unwrap() - 0.5).abs() < 1e-12);
    }

    #[test]
    fn test_concordance_is_binary_only() {
        let data = binary_box();
        assert!(matches!(data.case_avg(VariableId(0)), Err(MatchError::TypeMisuse(_))));
        assert!(matches!(data.control_avg(VariableId(0)), Err(MatchError::TypeMisuse(_))));
    }

    #[test]
    fn test_averages() {
        let header = row(&["id", "score"]);
        let pairing = ControlCasePairing::from_pairs([("c1", "A"), ("c2", "A")]).unwrap();
        let mut data =
            DataBox::new(vec![bound("score", VariableKind::Continuous, &header)], pairing).unwrap();
        data.record_data(&row(&["c1", "2.5"])).unwrap();
        data.record_data(&row(&["A", "-3.4"])).unwrap();
        data.record_data(&row(&["c2", "1.3"])).unwrap();
        data.record_data(&row(&["unrelated", "100"])).unwrap();

        let id = VariableId(0);
        assert!((data.control_avg(id).unwrap() - 1.9).abs() < 1e-12);
        assert!((data.case_avg(id).unwrap() + 3.4).abs() < 1e-12);
        assert!(matches!(data.concordance(id), Err(MatchError::TypeMisuse(_))));
        assert_eq!(data.recorded(), 3);
    }

    #[test]
    fn test_duplicate_id_keeps_first_value() {
        let header = row(&["id", "score"]);
        let pairing = ControlCasePairing::from_pairs([("c1", "A")]).unwrap();
        let mut data =
            DataBox::new(vec![bound("score", VariableKind::Continuous, &header)], pairing).unwrap();
        data.record_data(&row(&["A", "1"])).unwrap();
        data.record_data(&row(&["c1", "5"])).unwrap();
        let err = data.record_data(&row(&["c1", "9"])).unwrap_err();
        assert!(err.is_data_integrity());
        assert!((data.control_avg(VariableId(0)).unwrap() - 5.0).abs() < 1e-12);
    }

    #[test]
    fn test_orphan_control() {
        let header = row(&["id", "flag"]);
        let pairing = ControlCasePairing::from_pairs([("c1", "A")]).unwrap();
        let mut data = DataBox::new(vec![bound("flag", VariableKind::Binary, &header)], pairing).unwrap();
        data.record_data(&row(&["c1", "1"])).unwrap();
        let err = data.concordance(VariableId(0)).unwrap_err();
        assert!(err.to_string().contains("'A'"));
        // Failed computations are retried, not cached
        assert!(data.concordance(VariableId(0)).is_err());
    }

    #[test]
    fn test_incomplete_case_coverage() {
        let header = row(&["id", "score"]);
        let pairing = ControlCasePairing::from_pairs([("c1", "A"), ("c2", "B")]).unwrap();
        let mut data =
            DataBox::new(vec![bound("score", VariableKind::Continuous, &header)], pairing).unwrap();
        data.record_data(&row(&["A", "1"])).unwrap();
        data.record_data(&row(&["c1", "2"])).unwrap();
        assert!(data.case_avg(VariableId(0)).unwrap_err().is_data_integrity());
        assert!(data.univariate_p(VariableId(0)).unwrap_err().is_data_integrity());
    }

    #[test]
    fn test_invalid_values() {
        let header = row(&["id", "flag"]);
        let pairing = ControlCasePairing::from_pairs([("c1", "A")]).unwrap();
        let mut data = DataBox::new(vec![bound("flag", VariableKind::Binary, &header)], pairing).unwrap();
        assert!(data.record_data(&row(&["c1", "0.5"])).is_err());
        assert!(data.record_data(&row(&["A", "yes"])).is_err());
        assert!(data.record_data(&row(&["A"])).is_err());
        assert_eq!(data.recorded(), 0);
    }

    #[test]
    fn test_unbound_variable_is_rejected() {
        let pairing = ControlCasePairing::from_pairs([("c1", "A")]).unwrap();
        let unbound = MatchingVariable::new("flag", VariableKind::Binary);
        assert!(DataBox::new(vec![unbound], pairing).is_err());
    }

    #[test]
    fn test_regression_p_values() {
        let header = row(&["id", "score", "flag"]);
        let mut pairs = Vec::new();
        for case in 0..10 {
            pairs.push((format!("k{case}a"), format!("case{case}")));
            pairs.push((format!("k{case}b"), format!("case{case}")));
        }
        let pairing = ControlCasePairing::from_pairs(pairs).unwrap();
        let mut data = DataBox::new(
            vec![
                bound("score", VariableKind::Continuous, &header),
                bound("flag", VariableKind::Binary, &header),
            ],
            pairing,
        )
        .unwrap();
        for i in 0..10 {
            let flag = (i % 2).to_string();
            let (case, near, far) = ((i % 4).to_string(), (i % 4).to_string(), ((i + 2) % 4).to_string());
            data.record_data(&row(&[format!("case{i}").as_str(), &case, &flag])).unwrap();
            data.record_data(&row(&[format!("k{i}a").as_str(), &near, &flag])).unwrap();
            data.record_data(&row(&[format!("k{i}b").as_str(), &far, &flag])).unwrap();
        }

        for id in data.variable_ids() {
            let univariate = data.univariate_p(id).unwrap();
            let multivariate = data.multivariate_p(id).unwrap();
            assert!((0.0..=1.0).contains(&univariate), "univariate {univariate}");
            assert!((0.0..=1.0).contains(&multivariate), "multivariate {multivariate}");
        }
        assert!((data.concordance(VariableId(1)).unwrap() - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_recording_after_statistics_is_rejected() {
        let mut data = binary_box();
        data.concordance(VariableId(0)).unwrap();
        let pairing_row = row(&["c1", "0"]);
        assert!(data.record_data(&pairing_row).unwrap_err().is_data_integrity());
        assert!((data.concordance(VariableId(0)).unwrap() - 0.5).abs() < 1e-12);
    }

    #[test]
    fn test_out_of_range_binary_code() {
        let header = row(&["id", "flag"]);
        let pairing = ControlCasePairing::from_pairs([("c1", "A")]).unwrap();
        let mut data = DataBox::new(vec![bound("flag", VariableKind::Binary, &header)], pairing).unwrap();
        assert!(data.record_data(&row(&["A", "1e19"])).unwrap_err().is_data_integrity());
        assert!(data.record_data(&row(&["A", "-1e300"])).is_err());
        assert!(data.record_data(&row(&["A", "inf"])).is_err());
        data.record_data(&row(&["A", "-3"])).unwrap();
        assert_eq!(data.recorded(), 1);
    }

    #[test]
    fn test_collinear_variable_is_nan_in_joint_model() {
        let header = row(&["id", "score", "doubled"]);
        let mut pairs = Vec::new();
        for case in 0..6 {
            pairs.push((format!("k{case}"), format!("case{case}")));
        }
        let pairing = ControlCasePairing::from_pairs(pairs).unwrap();
        let mut data = DataBox::new(
            vec![
                bound("score", VariableKind::Continuous, &header),
                bound("doubled", VariableKind::Continuous, &header),
            ],
            pairing,
        )
        .unwrap();
        for i in 0..6 {
            let case = f64::from(i % 3);
            let control = f64::from((i + 1) % 3);
            for (id, value) in [(format!("case{i}"), case), (format!("k{i}"), control)] {
                let (single, double) = (value.to_string(), (value * 2.0).to_string());
                data.record_data(&row(&[id.as_str(), &single, &double])).unwrap();
            }
        }

        let score = data.multivariate_p(VariableId(0)).unwrap();
        assert!((0.0..=1.0).contains(&score), "score {score}");
        assert!(data.multivariate_p(VariableId(1)).unwrap().is_nan());
        assert!(!data.univariate_p(VariableId(1)).unwrap().is_nan());
    }
}
