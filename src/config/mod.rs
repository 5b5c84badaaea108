//! Configuration for matching and evaluation runs.

use std::path::PathBuf;

use crate::error::{MatchError, Result};

/// Configuration for the matching pipeline
#[derive(Debug, Clone)]
pub struct MatchingConfig {
    /// Number of controls retained per case after duplicate resolution
    pub final_count: usize,
    /// Oversampling factor for the naive nearest-neighbour selection
    pub multiplier: usize,
    /// Worker threads available to the duplicate resolver
    pub threads: usize,
    /// Whether to z-score numeric factors before matching
    pub normalize: bool,
    /// Stop after the naive selection
    pub skip_optimization: bool,
    /// Stack size in MiB for resolver worker threads
    pub stack_size_mb: usize,
    /// How many cases a single control may serve (1 = no reuse)
    pub max_control_reuse: usize,
    /// Directory receiving all intermediate and final files
    pub output_dir: PathBuf,
}

impl Default for MatchingConfig {
    fn default() -> Self {
        Self {
            final_count: 4,
            multiplier: 5,
            threads: num_cpus::get(),
            normalize: true,
            skip_optimization: false,
            stack_size_mb: 8,
            max_control_reuse: 1,
            output_dir: PathBuf::from("."),
        }
    }
}

impl MatchingConfig {
    /// Create a new configuration with default values
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a new builder for constructing matching configuration
    #[must_use]
    pub fn builder() -> MatchingConfigBuilder {
        MatchingConfigBuilder::new()
    }

    /// Number of naive candidates requested per case
    #[must_use]
    pub const fn initial_count(&self) -> usize {
        self.final_count * self.multiplier
    }

    /// Resolver thread stack size in bytes
    #[must_use]
    pub const fn stack_size_bytes(&self) -> usize {
        self.stack_size_mb * 1024 * 1024
    }

    /// Reject values the pipeline cannot run with
    pub fn validate(&self) -> Result<()> {
        let checks = [
            ("final count", self.final_count),
            ("multiplier", self.multiplier),
            ("threads", self.threads),
            ("stack size (MiB)", self.stack_size_mb),
            ("max control reuse", self.max_control_reuse),
        ];
        for (name, value) in checks {
            if value == 0 {
                return Err(MatchError::configuration(format!(
                    "{name} must be at least 1, got 0"
                )));
            }
        }
        Ok(())
    }
}

/// Builder for constructing matching configuration
#[derive(Debug, Clone, Default)]
pub struct MatchingConfigBuilder {
    config: MatchingConfig,
}

impl MatchingConfigBuilder {
    /// Create a new builder with default configuration
    #[must_use]
    pub fn new() -> Self {
        Self {
            config: MatchingConfig::default(),
        }
    }

    /// Set the number of controls kept per case
    #[must_use]
    pub const fn final_count(mut self, count: usize) -> Self {
        self.config.final_count = count;
        self
    }

    /// Set the naive oversampling multiplier
    #[must_use]
    pub const fn multiplier(mut self, multiplier: usize) -> Self {
        self.config.multiplier = multiplier;
        self
    }

    /// Set the resolver thread budget
    #[must_use]
    pub const fn threads(mut self, threads: usize) -> Self {
        self.config.threads = threads;
        self
    }

    /// Set whether numeric factors are normalized
    #[must_use]
    pub const fn normalize(mut self, normalize: bool) -> Self {
        self.config.normalize = normalize;
        self
    }

    /// Set whether duplicate resolution is skipped
    #[must_use]
    pub const fn skip_optimization(mut self, skip: bool) -> Self {
        self.config.skip_optimization = skip;
        self
    }

    /// Set the resolver stack size in MiB
    #[must_use]
    pub const fn stack_size_mb(mut self, mb: usize) -> Self {
        self.config.stack_size_mb = mb;
        self
    }

    /// Set how many cases one control may serve
    #[must_use]
    pub const fn max_control_reuse(mut self, reuse: usize) -> Self {
        self.config.max_control_reuse = reuse;
        self
    }

    /// Set the output directory
    #[must_use]
    pub fn output_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.output_dir = dir.into();
        self
    }

    /// Build the matching configuration
    #[must_use]
    pub fn build(self) -> MatchingConfig {
        self.config
    }
}

/// Configuration for a match-quality evaluation run
#[derive(Debug, Clone)]
pub struct EvaluationConfig {
    /// Status file produced by the matching pipeline
    pub status_file: PathBuf,
    /// Phenotype file the status file was produced from
    pub phenotype_file: PathBuf,
    /// Report destination
    pub output_file: PathBuf,
    /// Optional JSON rendering of the report
    pub json_file: Option<PathBuf>,
}

impl EvaluationConfig {
    /// Resolve all paths relative to a working directory
    #[must_use]
    pub fn in_dir(
        dir: impl Into<PathBuf>,
        status_file: impl Into<PathBuf>,
        phenotype_file: impl Into<PathBuf>,
        output_file: impl Into<PathBuf>,
    ) -> Self {
        let dir = dir.into();
        Self {
            status_file: dir.join(status_file.into()),
            phenotype_file: dir.join(phenotype_file.into()),
            output_file: dir.join(output_file.into()),
            json_file: None,
        }
    }

    /// Also write the report as JSON
    #[must_use]
    pub fn with_json(mut self, path: impl Into<PathBuf>) -> Self {
        self.json_file = Some(path.into());
        self
    }
}
