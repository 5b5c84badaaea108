//! Utility functions shared by the matching and evaluation pipelines

pub mod io;
pub mod logging;

pub use io::{format_decimal, write_tsv_atomically};
pub use logging::{log_operation_complete, log_operation_start, log_warning};
