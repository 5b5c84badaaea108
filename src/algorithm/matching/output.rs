//! Match and status file writers
//!
//! Match files hold one row per case: `case_id` followed by alternating
//! `control_<i>_id` / `control_<i>_distance` columns, padded with `NA` when a
//! case received fewer controls than the widest row. Status files list every
//! case and selected control as `id`, `status`, `matched_case_id`.

use std::path::{Path, PathBuf};

use crate::algorithm::matching::stratify::{CASE_STATUS, CONTROL_STATUS, Stratum};
use crate::algorithm::matching::types::{CaseMatch, MatchStage};
use crate::error::Result;
use crate::utils::write_tsv_atomically;

/// Placeholder for absent controls in match files
pub const NA: &str = "NA";

/// Header of every status file
pub const STATUS_HEADER: [&str; 3] = ["id", "status", "matched_case_id"];

/// One row of a status file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusRow {
    /// Sample identifier
    pub id: String,
    /// `1` for cases, `0` for controls
    pub status: &'static str,
    /// Case the sample is matched to (the case itself for cases)
    pub matched_case_id: String,
}

impl StatusRow {
    fn into_record(self) -> [String; 3] {
        [self.id, self.status.to_string(), self.matched_case_id]
    }
}

/// File-name label for a stratum: `s<index>_<key>`
///
/// Characters outside `[A-Za-z0-9.-]` are replaced so that arbitrary forced
/// values cannot escape the output directory.
#[must_use]
pub fn stratum_label(index: usize, key: &str) -> String {
    let key = if key.is_empty() { "all" } else { key };
    let sanitized: String = key
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '.' || c == '-' {
                c
            } else {
                '-'
            }
        })
        .collect();
    format!("s{index}_{sanitized}")
}

/// Path of a per-stratum match file
#[must_use]
pub fn match_file_path(dir: &Path, stage: MatchStage, label: &str) -> PathBuf {
    dir.join(format!("match.{}.{label}.tsv", stage.as_str()))
}

/// Path of a per-stratum status file
#[must_use]
pub fn status_file_path(dir: &Path, stage: MatchStage, label: &str) -> PathBuf {
    dir.join(format!("status.{}.{label}.tsv", stage.as_str()))
}

/// Path of the combined status file for a stage
#[must_use]
pub fn combined_status_path(dir: &Path, stage: MatchStage) -> PathBuf {
    dir.join(format!("status.{}.tsv", stage.as_str()))
}

/// Write the match file for one stratum
pub fn write_match_file(path: &Path, stratum: &Stratum, matches: &[CaseMatch]) -> Result<()> {
    let width = matches.iter().map(|m| m.controls.len()).max().unwrap_or(0);

    let mut header = vec!["case_id".to_string()];
    for i in 1..=width {
        header.push(format!("control_{i}_id"));
        header.push(format!("control_{i}_distance"));
    }

    let rows = matches.iter().map(|m| {
        let mut row = Vec::with_capacity(1 + 2 * width);
        row.push(stratum.cases[m.case].id.clone());
        for neighbor in &m.controls {
            row.push(stratum.controls[neighbor.id].id.clone());
            row.push(neighbor.distance.to_string());
        }
        row.resize(1 + 2 * width, NA.to_string());
        row
    });

    write_tsv_atomically(path, header.as_slice(), rows)
}

/// Status rows for one stratum: each case, then its controls
///
/// A control listed for several cases appears once per case.
#[must_use]
pub fn status_rows(stratum: &Stratum, matches: &[CaseMatch]) -> Vec<StatusRow> {
    let mut rows = Vec::new();
    for m in matches {
        let case_id = &stratum.cases[m.case].id;
        rows.push(StatusRow {
            id: case_id.clone(),
            status: CASE_STATUS,
            matched_case_id: case_id.clone(),
        });
        rows.extend(m.controls.iter().map(|neighbor| StatusRow {
            id: stratum.controls[neighbor.id].id.clone(),
            status: CONTROL_STATUS,
            matched_case_id: case_id.clone(),
        }));
    }
    rows
}

/// Write a status file from prepared rows
pub fn write_status_file(path: &Path, rows: Vec<StatusRow>) -> Result<()> {
    write_tsv_atomically(path, &STATUS_HEADER, rows.into_iter().map(StatusRow::into_record))
}
