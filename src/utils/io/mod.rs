//! IO utilities for writing pipeline outputs
//!
//! Outputs are written to a temporary file in the destination directory and
//! renamed into place, so a failed write never leaves a partial file behind.

use std::io::Write;
use std::path::Path;

use csv::WriterBuilder;
use tempfile::NamedTempFile;

use crate::error::{MatchError, Result};

/// Write a headed TSV file atomically
///
/// # Arguments
/// * `path` - Final destination
/// * `header` - Column names
/// * `rows` - Data rows; each must be as wide as the header
pub fn write_tsv_atomically<H, I, R, S>(path: &Path, header: &[H], rows: I) -> Result<()>
where
    H: AsRef<[u8]>,
    I: IntoIterator<Item = R>,
    R: IntoIterator<Item = S>,
    S: AsRef<[u8]>,
{
    write_atomically(path, |file| {
        let mut writer = WriterBuilder::new()
            .delimiter(b'\t')
            .quote_style(csv::QuoteStyle::Never)
            .from_writer(file);
        writer.write_record(header)?;
        for row in rows {
            writer.write_record(row)?;
        }
        writer.flush()?;
        Ok(())
    })
}

/// Run `fill` against a temporary file and move it to `path` on success
pub fn write_atomically<F>(path: &Path, fill: F) -> Result<()>
where
    F: FnOnce(&mut NamedTempFile) -> Result<()>,
{
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    let mut temp = NamedTempFile::new_in(dir)
        .map_err(|e| MatchError::io_at(dir, "Failed to create temporary output file", e))?;

    fill(&mut temp)?;
    temp.flush()
        .map_err(|e| MatchError::io_at(path, "Failed to flush temporary output file", e))?;

    temp.persist(path)
        .map_err(|e| MatchError::io_at(path, "Failed to move output file into place", e.error))?;
    log::debug!("Wrote {}", path.display());
    Ok(())
}

/// Render a statistic with five decimals, trimming trailing zeros
#[must_use]
pub fn format_decimal(value: f64) -> String {
    if value.is_nan() {
        return "NaN".to_string();
    }
    if value.is_infinite() {
        return if value > 0.0 { "Infinity" } else { "-Infinity" }.to_string();
    }
    let formatted = format!("{value:.5}");
    let trimmed = formatted.trim_end_matches('0').trim_end_matches('.');
    match trimmed {
        "-0" => "0".to_string(),
        other => other.to_string(),
    }
}
