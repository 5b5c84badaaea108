//! Algorithm implementations for case-control studies
//!
//! `matching` selects covariate-matched controls for each case, and
//! `evaluation` measures how well a finished matching balanced the cases
//! and controls.

pub mod evaluation;
pub mod matching;
