//! Logging utilities
//!
//! Consistent phrasing for pipeline phase boundaries, so per-stratum and
//! per-file progress reads the same across the matching and evaluation runs.

use std::fmt::Display;
use std::time::Duration;

/// Log the start of a pipeline phase
///
/// # Arguments
/// * `operation` - Description of the phase (e.g. "Normalizing factors")
/// * `subject` - What the phase operates on: a path, a stratum, a variable set
pub fn log_operation_start(operation: &str, subject: impl Display) {
    log::info!("{operation}: {subject}");
}

/// Log the completion of a pipeline phase
///
/// # Arguments
/// * `operation` - Past-tense description (e.g. "matched")
/// * `subject` - What was operated on
/// * `items` - Number of items the phase produced or consumed
/// * `elapsed` - Optional elapsed time
pub fn log_operation_complete(
    operation: &str,
    subject: impl Display,
    items: usize,
    elapsed: Option<Duration>,
) {
    match elapsed {
        Some(duration) => log::info!("Successfully {operation} {items} items for {subject} in {duration:.2?}"),
        None => log::info!("Successfully {operation} {items} items for {subject}"),
    }
}

/// Log a warning about a degenerate but non-fatal condition
///
/// # Arguments
/// * `message` - Warning message
/// * `context` - Optional context (stratum key, column name)
pub fn log_warning(message: &str, context: Option<&str>) {
    match context {
        Some(context) => log::warn!("{message}: {context}"),
        None => log::warn!("{message}"),
    }
}
