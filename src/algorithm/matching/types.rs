//! Type definitions for the matching algorithm
//!
//! This module contains common types used throughout the matching algorithm.

use chrono::{DateTime, Utc};
use serde::Serialize;

/// A candidate control found for a case
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Neighbor {
    /// Position of the control within its stratum
    pub id: usize,
    /// Weighted Euclidean distance to the case
    pub distance: f64,
}

/// Controls selected for one case
#[derive(Debug, Clone, PartialEq)]
pub struct CaseMatch {
    /// Position of the case within its stratum
    pub case: usize,
    /// Selected controls, nearest first
    pub controls: Vec<Neighbor>,
}

impl CaseMatch {
    /// Create a match with no controls yet
    #[must_use]
    pub const fn new(case: usize) -> Self {
        Self {
            case,
            controls: Vec::new(),
        }
    }
}

/// Selection stage a set of output files belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchStage {
    /// Unconstrained nearest-neighbour candidates
    Naive,
    /// Candidates after duplicate resolution
    Optimized,
}

impl MatchStage {
    /// Name used in output file names
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Naive => "naive",
            Self::Optimized => "optimized",
        }
    }
}

/// How processing of a stratum ended
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum StratumState {
    /// Match and status files were written
    Completed,
    /// Controls but no cases; nothing to do
    SkippedNoCases,
    /// A stage failed; other strata were unaffected
    Failed {
        /// Error description
        error: String,
    },
}

/// Per-stratum record in the run summary
#[derive(Debug, Clone, Serialize)]
pub struct StratumReport {
    /// Label used in per-stratum file names
    pub label: String,
    /// Joined forced-factor values
    pub key: String,
    /// Number of cases in the stratum
    pub cases: usize,
    /// Number of controls in the stratum
    pub controls: usize,
    /// Candidate controls found by the naive search
    pub naive_candidates: usize,
    /// Controls retained after duplicate resolution
    pub matched_controls: usize,
    /// Outcome
    #[serde(flatten)]
    pub state: StratumState,
}

impl StratumReport {
    /// Whether the stratum contributed to the combined status file
    #[must_use]
    pub fn is_completed(&self) -> bool {
        self.state == StratumState::Completed
    }

    /// Whether the stratum failed
    #[must_use]
    pub const fn is_failed(&self) -> bool {
        matches!(self.state, StratumState::Failed { .. })
    }
}

/// Summary of a complete matching run, written as JSON
#[derive(Debug, Clone, Serialize)]
pub struct MatchingSummary {
    /// Run start time
    pub started_at: DateTime<Utc>,
    /// Run end time
    pub finished_at: DateTime<Utc>,
    /// Controls requested per case
    pub final_count: usize,
    /// Naive candidates requested per case
    pub initial_count: usize,
    /// Whether duplicate resolution ran
    pub optimized: bool,
    /// Combined status file, if any stratum completed
    pub combined_status_file: Option<String>,
    /// Per-stratum outcomes in stratum order
    pub strata: Vec<StratumReport>,
}

impl MatchingSummary {
    /// Number of failed strata
    #[must_use]
    pub fn failed_strata(&self) -> usize {
        self.strata.iter().filter(|s| s.is_failed()).count()
    }

    /// Total controls retained across all strata
    #[must_use]
    pub fn matched_controls(&self) -> usize {
        self.strata.iter().map(|s| s.matched_controls).sum()
    }
}
