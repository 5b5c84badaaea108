//! Logistic regression for match-quality significance
//!
//! Fits case/control status against matching variables with Newton-Raphson
//! (iteratively reweighted least squares). Constant and collinear predictors
//! are dropped before fitting and reported without a p-value.

use nalgebra::{DMatrix, DVector};
use statrs::distribution::{ChiSquared, ContinuousCDF, Normal};

use crate::error::{MatchError, Result};

const COLLABORATOR: &str = "logistic regression";

/// Bounds keeping fitted probabilities away from 0 and 1
const PROBABILITY_FLOOR: f64 = 1e-10;

/// Relative residual norm below which a predictor counts as collinear
const COLLINEARITY_TOLERANCE: f64 = 1e-8;

/// Fit result for one predictor
#[derive(Debug, Clone, PartialEq)]
pub struct PredictorFit {
    /// Predictor name
    pub name: String,
    /// Coefficient, `None` when the predictor was dropped
    pub estimate: Option<f64>,
    /// Wald significance, `None` when the predictor was dropped
    pub p_value: Option<f64>,
}

/// Result of one logistic fit
#[derive(Debug, Clone, PartialEq)]
pub struct LogisticFit {
    /// Likelihood-ratio significance of the whole model
    pub overall_p: f64,
    /// Per-predictor results in input order
    pub predictors: Vec<PredictorFit>,
    /// Newton iterations performed
    pub iterations: usize,
    /// Whether the deviance converged
    pub converged: bool,
}

impl LogisticFit {
    /// Result for a named predictor
    #[must_use]
    pub fn predictor(&self, name: &str) -> Option<&PredictorFit> {
        self.predictors.iter().find(|p| p.name == name)
    }
}

/// Fits a binary outcome against predictor columns
pub trait LogisticFitter: Send + Sync {
    /// Fit `outcome` (0/1) against `predictors` (one column per name)
    fn fit(&self, outcome: &[f64], predictors: &[Vec<f64>], names: &[&str]) -> Result<LogisticFit>;
}

/// Newton-Raphson logistic regression with an intercept
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct IrlsLogistic {
    max_iterations: usize,
    tolerance: f64,
}

impl Default for IrlsLogistic {
    fn default() -> Self {
        Self::new(25, 1e-8)
    }
}

impl IrlsLogistic {
    /// Create a fitter with an iteration cap and relative deviance tolerance
    #[must_use]
    pub const fn new(max_iterations: usize, tolerance: f64) -> Self {
        Self {
            max_iterations,
            tolerance,
        }
    }
}

impl LogisticFitter for IrlsLogistic {
    fn fit(&self, outcome: &[f64], predictors: &[Vec<f64>], names: &[&str]) -> Result<LogisticFit> {
        let n = outcome.len();
        validate_inputs(outcome, predictors, names)?;

        let kept = independent_columns(predictors, n);
        for (index, name) in names.iter().enumerate() {
            if !kept.contains(&index) {
                log::debug!("Dropping constant or collinear predictor '{name}'");
            }
        }

        let p = kept.len() + 1;
        let x = DMatrix::from_fn(n, p, |i, j| if j == 0 { 1.0 } else { predictors[kept[j - 1]][i] });
        let y = DVector::from_column_slice(outcome);

        let cases = outcome.iter().sum::<f64>();
        let rate = cases / n as f64;
        let null_log_likelihood = cases * rate.ln() + (n as f64 - cases) * (1.0 - rate).ln();

        let mut beta: DVector<f64> = DVector::zeros(p);
        beta[0] = (rate / (1.0 - rate)).ln();
        let mut deviance = -2.0 * log_likelihood(&x, &y, &beta);
        let mut iterations = 0;
        let mut converged = false;

        while iterations < self.max_iterations {
            iterations += 1;
            let (information, score) = newton_terms(&x, &y, &beta);
            let Some(step) = solve(&information, &score) else {
                log::debug!("Information matrix became singular after {iterations} iterations");
                break;
            };
            beta += step;

            let next = -2.0 * log_likelihood(&x, &y, &beta);
            let change = (next - deviance).abs() / (next.abs() + 0.1);
            deviance = next;
            if change < self.tolerance {
                converged = true;
                break;
            }
        }
        if !converged {
            log::debug!("Logistic fit stopped after {iterations} iterations without converging");
        }

        let (information, _) = newton_terms(&x, &y, &beta);
        let covariance = information
            .clone()
            .cholesky()
            .map(|c| c.inverse())
            .or_else(|| information.try_inverse());

        let statistic = (2.0 * (-deviance / 2.0 - null_log_likelihood)).max(0.0);
        let overall_p = if kept.is_empty() {
            f64::NAN
        } else {
            let chi = ChiSquared::new(kept.len() as f64)
                .map_err(|e| MatchError::collaborator(COLLABORATOR, "overall significance", e.to_string()))?;
            (1.0 - chi.cdf(statistic)).clamp(0.0, 1.0)
        };

        let normal = Normal::new(0.0, 1.0)
            .map_err(|e| MatchError::collaborator(COLLABORATOR, "wald significance", e.to_string()))?;
        let predictors = names
            .iter()
            .enumerate()
            .map(|(index, name)| {
                let position = kept.iter().position(|&k| k == index).map(|k| k + 1);
                let estimate = position.map(|j| beta[j]);
                let p_value = position.map(|j| {
                    let se = covariance.as_ref().map_or(f64::NAN, |c| c[(j, j)].sqrt());
                    if se.is_finite() && se > 0.0 {
                        2.0 * normal.cdf(-(beta[j] / se).abs())
                    } else {
                        f64::NAN
                    }
                });
                PredictorFit {
                    name: (*name).to_string(),
                    estimate,
                    p_value,
                }
            })
            .collect();

        Ok(LogisticFit {
            overall_p,
            predictors,
            iterations,
            converged,
        })
    }
}

fn validate_inputs(outcome: &[f64], predictors: &[Vec<f64>], names: &[&str]) -> Result<()> {
    let fail = |message: String| Err(MatchError::collaborator(COLLABORATOR, "input validation", message));

    if outcome.is_empty() {
        return fail("no observations".to_string());
    }
    if predictors.len() != names.len() {
        return fail(format!("{} predictor columns for {} names", predictors.len(), names.len()));
    }
    if outcome.iter().any(|&v| v != 0.0 && v != 1.0) {
        return fail("outcome must be coded 0/1".to_string());
    }
    let cases = outcome.iter().filter(|&&v| v == 1.0).count();
    if cases == 0 || cases == outcome.len() {
        return fail("outcome has a single class".to_string());
    }
    for (column, name) in predictors.iter().zip(names) {
        if column.len() != outcome.len() {
            return fail(format!(
                "predictor '{name}' has {} values for {} observations",
                column.len(),
                outcome.len()
            ));
        }
        if column.iter().any(|v| !v.is_finite()) {
            return fail(format!("predictor '{name}' has non-finite values"));
        }
    }
    Ok(())
}

/// Indices of predictors linearly independent of the intercept and each other
fn independent_columns(predictors: &[Vec<f64>], n: usize) -> Vec<usize> {
    let mut basis: Vec<DVector<f64>> = vec![DVector::from_element(n, 1.0 / (n as f64).sqrt())];
    let mut kept = Vec::new();

    for (index, column) in predictors.iter().enumerate() {
        let original = DVector::from_column_slice(column);
        let mut residual = original.clone();
        for q in &basis {
            let projection = q.dot(&residual);
            residual -= q * projection;
        }
        let norm = residual.norm();
        if norm > COLLINEARITY_TOLERANCE * original.norm().max(1.0) {
            basis.push(residual / norm);
            kept.push(index);
        }
    }
    kept
}

fn probabilities(x: &DMatrix<f64>, beta: &DVector<f64>) -> DVector<f64> {
    (x * beta).map(|eta| (1.0 / (1.0 + (-eta).exp())).clamp(PROBABILITY_FLOOR, 1.0 - PROBABILITY_FLOOR))
}

fn log_likelihood(x: &DMatrix<f64>, y: &DVector<f64>, beta: &DVector<f64>) -> f64 {
    probabilities(x, beta)
        .iter()
        .zip(y.iter())
        .map(|(mu, yi)| yi * mu.ln() + (1.0 - yi) * (1.0 - mu).ln())
        .sum()
}

/// Fisher information `X'WX` and score `X'(y - mu)`
fn newton_terms(x: &DMatrix<f64>, y: &DVector<f64>, beta: &DVector<f64>) -> (DMatrix<f64>, DVector<f64>) {
    let mu = probabilities(x, beta);
    let weighted = DMatrix::from_fn(x.nrows(), x.ncols(), |i, j| x[(i, j)] * mu[i] * (1.0 - mu[i]));
    let information = x.transpose() * weighted;
    let score = x.transpose() * (y - &mu);
    (information, score)
}

fn solve(information: &DMatrix<f64>, score: &DVector<f64>) -> Option<DVector<f64>> {
    information
        .clone()
        .cholesky()
        .map(|c| c.solve(score))
        .or_else(|| information.clone().lu().solve(score))
        .filter(|step| step.iter().all(|v| v.is_finite()))
}
