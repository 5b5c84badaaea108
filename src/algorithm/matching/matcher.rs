//! Core matching pipeline
//!
//! `MatchOrchestrator` runs the full pipeline: normalize numeric factors,
//! expand nominal factors, split samples into strata, then for each stratum
//! find naive nearest-neighbour candidates and resolve shared controls.
//! Each stratum is processed in isolation; a failure is recorded in the run
//! summary and the remaining strata still complete.

use std::io::Write;
use std::path::Path;
use std::time::Instant;

use chrono::Utc;
use log::{error, info};

use crate::algorithm::matching::loadings::FactorLoadings;
use crate::algorithm::matching::neighbors::{LinearScan, NeighborSearch, naive_matches};
use crate::algorithm::matching::nominal::NominalExpander;
use crate::algorithm::matching::normalize::Normalizer;
use crate::algorithm::matching::optimize::{DuplicateResolver, GreedyResolver, ResolverConfig};
use crate::algorithm::matching::output::{
    StatusRow, combined_status_path, match_file_path, status_file_path, status_rows,
    stratum_label, write_match_file, write_status_file,
};
use crate::algorithm::matching::stratify::{Stratifier, Stratum};
use crate::algorithm::matching::types::{
    CaseMatch, MatchStage, MatchingSummary, StratumReport, StratumState,
};
use crate::config::MatchingConfig;
use crate::error::util::{ensure_absent, validate_directory};
use crate::error::{MatchError, Result};
use crate::reader::SampleTable;
use crate::utils::io::write_atomically;
use crate::utils::logging::{create_main_progress_bar, finish_progress_bar};
use crate::utils::{log_operation_complete, log_operation_start, log_warning, write_tsv_atomically};

/// Normalized copy of the sample file
pub const NORMALIZED_FILE: &str = "normalized.tsv";
/// Sample file with nominal factors expanded
pub const NOMINALIZED_FILE: &str = "nominalized_samples.tsv";
/// JSON run summary
pub const SUMMARY_FILE: &str = "matching_summary.json";

/// Runs normalization, stratification, naive selection and duplicate resolution
#[derive(Debug, Clone)]
pub struct MatchOrchestrator<S = LinearScan, R = GreedyResolver> {
    config: MatchingConfig,
    search: S,
    resolver: R,
}

impl MatchOrchestrator {
    /// Create an orchestrator using the built-in search and resolver
    #[must_use]
    pub const fn new(config: MatchingConfig) -> Self {
        Self {
            config,
            search: LinearScan,
            resolver: GreedyResolver,
        }
    }
}

struct StratumResult {
    report: StratumReport,
    status: Vec<StatusRow>,
}

impl<S: NeighborSearch, R: DuplicateResolver> MatchOrchestrator<S, R> {
    /// Create an orchestrator with custom collaborators
    #[must_use]
    pub const fn with_collaborators(config: MatchingConfig, search: S, resolver: R) -> Self {
        Self {
            config,
            search,
            resolver,
        }
    }

    /// Matching configuration
    #[must_use]
    pub const fn config(&self) -> &MatchingConfig {
        &self.config
    }

    /// Run the pipeline on a sample file
    ///
    /// # Arguments
    ///
    /// * `samples` - TSV with id, status and factor columns
    /// * `loadings` - Role and weight of each factor column
    ///
    /// # Returns
    ///
    /// The run summary; strata that failed are listed with their error.
    pub fn run(&self, samples: &Path, loadings: &FactorLoadings) -> Result<MatchingSummary> {
        let started_at = Utc::now();
        let start_time = Instant::now();
        let config = &self.config;

        config.validate()?;
        let dir = config.output_dir.as_path();
        validate_directory(dir, "output directory")?;
        let stage = if config.skip_optimization {
            MatchStage::Naive
        } else {
            MatchStage::Optimized
        };
        let combined_path = combined_status_path(dir, stage);
        ensure_absent(&combined_path, "Combined status file")?;

        log_operation_start("Reading sample file", samples.display());
        let mut table = SampleTable::read_tsv(samples, "sample file")?;
        loadings.validate_against_header(table.header())?;

        if config.normalize {
            table = Normalizer::for_loadings(&table, loadings)?.apply(table)?;
            write_table(&dir.join(NORMALIZED_FILE), &table)?;
        }

        let expansion = NominalExpander::for_loadings(&table, loadings)?.expand(table)?;
        if expansion.expanded() {
            write_table(&dir.join(NOMINALIZED_FILE), &expansion.table)?;
        }

        let stratifier = Stratifier::new(&expansion, loadings)?;
        let strata = stratifier.stratify(&expansion.table)?;
        info!(
            "Matching {} strata over {} dimensions, {} candidates and {} final controls per case",
            strata.len(),
            stratifier.dimensions(),
            config.initial_count(),
            config.final_count
        );

        let pb = create_main_progress_bar(strata.len() as u64, Some("Matching strata"));
        let mut reports = Vec::with_capacity(strata.len());
        let mut combined = Vec::new();
        for (index, stratum) in strata.iter().enumerate() {
            let label = stratum_label(index, &stratum.key);
            pb.set_message(label.clone());
            match self.process_stratum(dir, &label, stratum) {
                Ok(result) => {
                    combined.extend(result.status);
                    reports.push(result.report);
                }
                Err(e) => {
                    error!("Stratum '{label}' failed: {e}");
                    reports.push(StratumReport {
                        label,
                        key: stratum.key.clone(),
                        cases: stratum.cases.len(),
                        controls: stratum.controls.len(),
                        naive_candidates: 0,
                        matched_controls: 0,
                        state: StratumState::Failed {
                            error: e.to_string(),
                        },
                    });
                }
            }
            pb.inc(1);
        }
        finish_progress_bar(&pb, Some("Matching complete"));

        let combined_status_file = if reports.iter().any(StratumReport::is_completed) {
            write_status_file(&combined_path, combined)?;
            Some(combined_path.display().to_string())
        } else {
            log_warning("No stratum completed; combined status file not written", None);
            None
        };

        let summary = MatchingSummary {
            started_at,
            finished_at: Utc::now(),
            final_count: config.final_count,
            initial_count: config.initial_count(),
            optimized: !config.skip_optimization,
            combined_status_file,
            strata: reports,
        };
        write_summary(&dir.join(SUMMARY_FILE), &summary)?;

        log_operation_complete(
            "matched",
            format!("{} strata", summary.strata.len()),
            summary.matched_controls(),
            Some(start_time.elapsed()),
        );
        if summary.failed_strata() > 0 {
            log_warning(
                &format!("{} strata failed", summary.failed_strata()),
                Some(dir.join(SUMMARY_FILE).display().to_string().as_str()),
            );
        }
        Ok(summary)
    }

    fn process_stratum(&self, dir: &Path, label: &str, stratum: &Stratum) -> Result<StratumResult> {
        let config = &self.config;
        let mut report = StratumReport {
            label: label.to_string(),
            key: stratum.key.clone(),
            cases: stratum.cases.len(),
            controls: stratum.controls.len(),
            naive_candidates: 0,
            matched_controls: 0,
            state: StratumState::Completed,
        };

        if stratum.cases.is_empty() {
            info!("Stratum '{label}' has no cases; skipping");
            report.state = StratumState::SkippedNoCases;
            return Ok(StratumResult {
                report,
                status: Vec::new(),
            });
        }
        if stratum.controls.is_empty() {
            log_warning("Stratum has no controls; its cases receive no matches", Some(label));
        }

        let naive = naive_matches(
            &self.search,
            &stratum.cases,
            &stratum.controls,
            config.initial_count(),
        )?;
        report.naive_candidates = naive.iter().map(|m| m.controls.len()).sum();

        let resolved = if config.skip_optimization {
            None
        } else {
            let resolver_config = ResolverConfig {
                final_count: config.final_count,
                threads: config.threads,
                stack_size: config.stack_size_bytes(),
                max_control_reuse: config.max_control_reuse,
            };
            let resolved = self.resolver.resolve(label, &naive, &resolver_config)?;
            check_resolution(label, &naive, &resolved, &resolver_config)?;

            let short = resolved
                .iter()
                .filter(|m| m.controls.len() < config.final_count)
                .count();
            if short > 0 {
                log_warning(
                    &format!("{short} cases received fewer than {} controls", config.final_count),
                    Some(label),
                );
            }
            Some(resolved)
        };

        // Files are only written once every stage of the stratum has succeeded
        let written = write_stage(dir, MatchStage::Naive, label, stratum, &naive).and_then(|()| {
            match &resolved {
                Some(resolved) => write_stage(dir, MatchStage::Optimized, label, stratum, resolved),
                None => Ok(()),
            }
        });
        if let Err(e) = written {
            remove_stratum_files(dir, label);
            return Err(e);
        }

        let selected = resolved.unwrap_or(naive);
        report.matched_controls = selected.iter().map(|m| m.controls.len()).sum();
        log_operation_complete("matched", label, report.matched_controls, None);
        Ok(StratumResult {
            status: status_rows(stratum, &selected),
            report,
        })
    }
}

/// Remove whatever per-stratum files a failed stratum managed to write
fn remove_stratum_files(dir: &Path, label: &str) {
    for stage in [MatchStage::Naive, MatchStage::Optimized] {
        for path in [match_file_path(dir, stage, label), status_file_path(dir, stage, label)] {
            if let Err(e) = std::fs::remove_file(&path) {
                if e.kind() != std::io::ErrorKind::NotFound {
                    log_warning(
                        &format!("Failed to remove {}: {e}", path.display()),
                        Some(label),
                    );
                }
            }
        }
    }
}

fn write_stage(
    dir: &Path,
    stage: MatchStage,
    label: &str,
    stratum: &Stratum,
    matches: &[CaseMatch],
) -> Result<()> {
    write_match_file(&match_file_path(dir, stage, label), stratum, matches)?;
    write_status_file(&status_file_path(dir, stage, label), status_rows(stratum, matches))
}

/// Reject resolver output that breaks the selection contract
fn check_resolution(
    label: &str,
    naive: &[CaseMatch],
    resolved: &[CaseMatch],
    config: &ResolverConfig,
) -> Result<()> {
    let fail = |message: String| {
        Err(MatchError::collaborator(
            "duplicate resolver",
            format!("stratum '{label}'"),
            message,
        ))
    };

    if resolved.len() != naive.len() {
        return fail(format!(
            "returned {} cases, expected {}",
            resolved.len(),
            naive.len()
        ));
    }
    let mut uses = rustc_hash::FxHashMap::<usize, usize>::default();
    for (input, output) in naive.iter().zip(resolved) {
        if output.case != input.case || output.controls.len() > config.final_count {
            return fail(format!("invalid selection for case {}", input.case));
        }
        for neighbor in &output.controls {
            if !input.controls.iter().any(|n| n.id == neighbor.id) {
                return fail(format!(
                    "control {} is not a candidate of case {}",
                    neighbor.id, input.case
                ));
            }
            let count = uses.entry(neighbor.id).or_default();
            *count += 1;
            if *count > config.max_control_reuse {
                return fail(format!(
                    "control {} assigned {} times, limit {}",
                    neighbor.id, count, config.max_control_reuse
                ));
            }
        }
    }
    Ok(())
}

fn write_table(path: &Path, table: &SampleTable) -> Result<()> {
    write_tsv_atomically(path, table.header(), table.rows())
}

fn write_summary(path: &Path, summary: &MatchingSummary) -> Result<()> {
    write_atomically(path, |file| {
        serde_json::to_writer_pretty(&mut *file, summary)?;
        file.write_all(b"\n")
            .map_err(|e| MatchError::io_at(path, "Failed to write run summary", e))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::algorithm::matching::types::Neighbor;

    fn naive() -> Vec<CaseMatch> {
        vec![
            CaseMatch {
                case: 0,
                controls: vec![Neighbor { id: 0, distance: 0.1 }, Neighbor { id: 1, distance: 0.2 }],
            },
            CaseMatch {
                case: 1,
                controls: vec![Neighbor { id: 0, distance: 0.3 }],
            },
        ]
    }

    fn resolver_config() -> ResolverConfig {
        ResolverConfig {
            final_count: 1,
            threads: 1,
            stack_size: 1 << 20,
            max_control_reuse: 1,
        }
    }

    #[test]
    fn test_check_resolution_accepts_valid_selection() {
        let resolved = vec![
            CaseMatch {
                case: 0,
                controls: vec![Neighbor { id: 1, distance: 0.2 }],
            },
            CaseMatch {
                case: 1,
                controls: vec![Neighbor { id: 0, distance: 0.3 }],
            },
        ];
        assert!(check_resolution("s0", &naive(), &resolved, &resolver_config()).is_ok());
    }

    #[test]
    fn test_check_resolution_rejects_shared_control() {
        let resolved = vec![
            CaseMatch {
                case: 0,
                controls: vec![Neighbor { id: 0, distance: 0.1 }],
            },
            CaseMatch {
                case: 1,
                controls: vec![Neighbor { id: 0, distance: 0.3 }],
            },
        ];
        let err = check_resolution("s0", &naive(), &resolved, &resolver_config()).unwrap_err();
        assert!(matches!(err, MatchError::Collaborator { .. }));
    }

    #[test]
    fn test_check_resolution_rejects_foreign_control() {
        let resolved = vec![
            CaseMatch::new(0),
            CaseMatch {
                case: 1,
                controls: vec![Neighbor { id: 1, distance: 0.2 }],
            },
        ];
        assert!(check_resolution("s0", &naive(), &resolved, &resolver_config()).is_err());
    }
}
