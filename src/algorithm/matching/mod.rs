//! Covariate-based case-control matching
//!
//! This module implements stratified nearest-neighbour matching of cases to
//! controls. It includes:
//!
//! 1. Factor loading parsing (forced, nominal and weighted numeric factors)
//! 2. Normalization and one-hot expansion of the sample table
//! 3. Stratification on forced factors
//! 4. Naive k-nearest-neighbour selection per case
//! 5. Duplicate resolution so no control serves more cases than allowed
//!
//! Every stratum writes its own match and status files; a combined status
//! file and a JSON summary describe the whole run.

pub mod loadings;
pub mod matcher;
pub mod neighbors;
pub mod nominal;
pub mod normalize;
pub mod optimize;
pub mod output;
pub mod stratify;
pub mod types;

// Re-export key types
pub use loadings::{FactorLoading, FactorLoadings};
pub use matcher::MatchOrchestrator;
pub use neighbors::{LinearScan, NeighborSearch};
pub use nominal::{NominalExpander, NominalExpansion};
pub use normalize::Normalizer;
pub use optimize::{DuplicateResolver, GreedyResolver, ResolverConfig};
pub use stratify::{Sample, Stratifier, Stratum};
pub use types::{CaseMatch, MatchStage, MatchingSummary, Neighbor, StratumReport, StratumState};
