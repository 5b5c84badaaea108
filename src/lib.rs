//! Covariate-matched case-control selection
//!
//! Matches each case to its nearest controls in a weighted covariate space,
//! stratified on forced factors, and evaluates the resulting pairings with
//! concordance, group means and logistic-regression significance.

pub mod algorithm;
pub mod config;
pub mod error;
pub mod reader;
pub mod utils;

// Re-export the most common types for easier use
pub use config::{EvaluationConfig, MatchingConfig, MatchingConfigBuilder};
pub use error::{MatchError, Result};
pub use reader::SampleTable;

// Matching
pub use algorithm::matching::{
    FactorLoading, FactorLoadings, MatchOrchestrator, MatchingSummary, StratumReport, StratumState,
};

// Evaluation
pub use algorithm::evaluation::{DataBox, MatchingVariable, REval, ReportRow, VariableKind, VariableSpec};
