//! Match-quality evaluation
//!
//! Given a status file produced by matching and the phenotype file the
//! samples came from, this module reports for each matching variable:
//!
//! - case and control means (continuous variables)
//! - concordance between each control and its case (binary variables)
//! - univariate and multivariate logistic-regression p-values for status
//!
//! Large p-values indicate the matching removed the variable's association
//! with case status.

pub mod data_box;
pub mod pairing;
pub mod regression;
pub mod reval;
pub mod variable;

// Re-export key types
pub use data_box::{DataBox, Value};
pub use pairing::ControlCasePairing;
pub use regression::{IrlsLogistic, LogisticFit, LogisticFitter, PredictorFit};
pub use reval::{REPORT_HEADER, REval, ReportRow};
pub use variable::{MatchingVariable, VariableId, VariableKind, VariableSpec, classify_variables};
