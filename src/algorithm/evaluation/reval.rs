//! Match-quality report
//!
//! Reads the pairings of a status file and the phenotype file they were
//! produced from, then reports per matching variable how similar cases and
//! their controls are and how well each variable still predicts status.

use std::io::Write;
use std::path::Path;
use std::time::Instant;

use serde::Serialize;

use crate::algorithm::evaluation::data_box::DataBox;
use crate::algorithm::evaluation::pairing::ControlCasePairing;
use crate::algorithm::evaluation::regression::{IrlsLogistic, LogisticFitter};
use crate::algorithm::evaluation::variable::{VariableKind, VariableSpec, classify_variables};
use crate::config::EvaluationConfig;
use crate::error::util::ensure_absent;
use crate::error::{MatchError, Result};
use crate::reader::SampleTable;
use crate::utils::io::write_atomically;
use crate::utils::{log_operation_complete, log_operation_start, write_tsv_atomically};

/// Header of the evaluation report
pub const REPORT_HEADER: [&str; 6] = [
    "variable_name",
    "case_avg",
    "control_avg",
    "concordance",
    "univariate_p",
    "multivariate_p",
];

/// One report row in JSON form
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReportRow {
    /// Phenotype column
    pub variable_name: String,
    /// Classification used
    pub kind: VariableKind,
    /// Case mean (continuous only)
    pub case_avg: Option<f64>,
    /// Control mean (continuous only)
    pub control_avg: Option<f64>,
    /// Concordance (binary only)
    pub concordance: Option<f64>,
    /// Univariate significance
    pub univariate_p: f64,
    /// Multivariate significance
    pub multivariate_p: f64,
}

/// Loaded evaluation inputs
#[derive(Debug)]
pub struct REval<F = IrlsLogistic> {
    data: DataBox<F>,
}

impl REval {
    /// Load the status and phenotype files with the built-in fitter
    pub fn load(specs: &[VariableSpec], status_file: &Path, phenotype_file: &Path) -> Result<Self> {
        Self::load_with_fitter(specs, status_file, phenotype_file, IrlsLogistic::default())
    }

    /// Evaluate with the given configuration and write all requested outputs
    pub fn run(config: &EvaluationConfig, specs: &[VariableSpec]) -> Result<Vec<ReportRow>> {
        let start = Instant::now();
        ensure_absent(&config.output_file, "Evaluation report")?;
        if let Some(json) = &config.json_file {
            ensure_absent(json, "JSON evaluation report")?;
        }

        let reval = Self::load(specs, &config.status_file, &config.phenotype_file)?;
        reval.write_table(&config.output_file)?;
        let report = reval.report()?;
        if let Some(json) = &config.json_file {
            write_json(json, &report)?;
        }

        log_operation_complete(
            "evaluated",
            config.output_file.display(),
            report.len(),
            Some(start.elapsed()),
        );
        Ok(report)
    }
}

impl<F: LogisticFitter> REval<F> {
    /// Load the status and phenotype files
    ///
    /// Variables without an explicit classification are classified from
    /// the paired samples before any value is recorded.
    pub fn load_with_fitter(
        specs: &[VariableSpec],
        status_file: &Path,
        phenotype_file: &Path,
        fitter: F,
    ) -> Result<Self> {
        log_operation_start("Reading status file", status_file.display());
        let pairing = ControlCasePairing::read_status_file(status_file)?;

        log_operation_start("Reading phenotype file", phenotype_file.display());
        let table = SampleTable::read_tsv(phenotype_file, "phenotype file")?;
        let variables = classify_variables(specs, &table, |id| pairing.contains(id))?;

        let mut data = DataBox::with_fitter(variables, pairing, fitter)?;
        for row in table.rows() {
            data.record_data(row)?;
        }
        log::info!("Recorded {} paired samples", data.recorded());
        Ok(Self { data })
    }

    /// The populated data box
    #[must_use]
    pub const fn data(&self) -> &DataBox<F> {
        &self.data
    }

    /// Report lines in variable order
    pub fn table_rows(&self) -> Result<Vec<[String; 6]>> {
        self.data
            .variable_ids()
            .into_iter()
            .map(|id| self.data.variable(id).table_row(id, &self.data))
            .collect()
    }

    /// Report rows for JSON output
    pub fn report(&self) -> Result<Vec<ReportRow>> {
        self.data
            .variable_ids()
            .into_iter()
            .map(|id| {
                let variable = self.data.variable(id);
                let binary = variable.is_binary();
                Ok(ReportRow {
                    variable_name: variable.name().to_string(),
                    kind: variable.kind(),
                    case_avg: if binary { None } else { Some(self.data.case_avg(id)?) },
                    control_avg: if binary { None } else { Some(self.data.control_avg(id)?) },
                    concordance: if binary { Some(self.data.concordance(id)?) } else { None },
                    univariate_p: self.data.univariate_p(id)?,
                    multivariate_p: self.data.multivariate_p(id)?,
                })
            })
            .collect()
    }

    /// Write the TSV report; an existing file is never overwritten
    pub fn write_table(&self, path: &Path) -> Result<()> {
        ensure_absent(path, "Evaluation report")?;
        let rows = self.table_rows()?;
        write_tsv_atomically(path, &REPORT_HEADER, rows)
    }
}

fn write_json(path: &Path, report: &[ReportRow]) -> Result<()> {
    write_atomically(path, |file| {
        serde_json::to_writer_pretty(&mut *file, report)?;
        file.write_all(b"\n")
            .map_err(|e| MatchError::io_at(path, "Failed to write JSON report", e))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn fixture(dir: &Path) -> (std::path::PathBuf, std::path::PathBuf) {
        let status = dir.join("status.tsv");
        fs::write(
            &status,
            "id\tstatus\tmatched_case_id\nA\t1\tA\nc1\t0\tA\nc2\t0\tA\n",
        )
        .unwrap();
        let phenotype = dir.join("pheno.tsv");
        fs::write(
            &phenotype,
            "id\tflag\tscore\nA\t0\t-3.4\nc1\t1\t2.5\nc2\t0\t1.3\nother\t5\t9\n",
        )
        .unwrap();
        (status, phenotype)
    }

    #[test]
    fn test_table_rows() {
        let dir = tempfile::tempdir().unwrap();
        let (status, phenotype) = fixture(dir.path());
        let specs = VariableSpec::parse_list("flag;score:continuous").unwrap();
        let reval = REval::load(&specs, &status, &phenotype).unwrap();

        let rows = reval.table_rows().unwrap();
        assert_eq!(rows[0][0], "flag");
        assert_eq!(rows[0][1], "NA");
        assert_eq!(rows[0][2], "NA");
        assert_eq!(rows[0][3], "0.5");
        assert_eq!(rows[1][1], "-3.4");
        assert_eq!(rows[1][2], "1.9");
        assert_eq!(rows[1][3], "NA");
    }

    #[test]
    fn test_write_table_refuses_overwrite() {
        let dir = tempfile::tempdir().unwrap();
        let (status, phenotype) = fixture(dir.path());
        let specs = VariableSpec::parse_list("score:continuous").unwrap();
        let reval = REval::load(&specs, &status, &phenotype).unwrap();

        let output = dir.path().join("report.tsv");
        reval.write_table(&output).unwrap();
        let content = fs::read_to_string(&output).unwrap();
        assert!(content.starts_with(
            "variable_name\tcase_avg\tcontrol_avg\tconcordance\tunivariate_p\tmultivariate_p\n"
        ));
        assert!(content.contains("score\t-3.4\t1.9\tNA\t"));

        let err = reval.write_table(&output).unwrap_err();
        assert!(matches!(err, MatchError::Configuration(_)));
    }

    #[test]
    fn test_missing_variable_column() {
        let dir = tempfile::tempdir().unwrap();
        let (status, phenotype) = fixture(dir.path());
        let specs = VariableSpec::parse_list("bmi").unwrap();
        let err = REval::load(&specs, &status, &phenotype).unwrap_err();
        assert!(err.to_string().contains("bmi"));
    }
}
