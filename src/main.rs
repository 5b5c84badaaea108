use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Instant;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use log::{error, info};

use matchmaker::algorithm::evaluation::{REval, VariableSpec};
use matchmaker::{EvaluationConfig, FactorLoadings, MatchOrchestrator, MatchingConfig};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Select covariate-matched controls for every case
    Match(MatchArgs),
    /// Evaluate the quality of a finished matching
    Eval(EvalArgs),
}

#[derive(Args, Debug)]
struct MatchArgs {
    /// Sample file (id, status, covariate columns)
    #[arg(short, long)]
    samples: PathBuf,

    /// Factor loadings, e.g. "age:2,sex:force,site:nominal"
    #[arg(short, long)]
    loadings: String,

    /// Controls kept per case
    #[arg(long, default_value_t = 4)]
    final_count: usize,

    /// Oversampling factor for naive candidates
    #[arg(long, default_value_t = 5)]
    multiplier: usize,

    /// Worker threads (defaults to the number of CPUs)
    #[arg(long, env = "MATCHMAKER_THREADS")]
    threads: Option<usize>,

    /// Use raw numeric values instead of z-scores
    #[arg(long)]
    no_normalize: bool,

    /// Stop after the naive candidates
    #[arg(long)]
    skip_optimization: bool,

    /// Stack budget for duplicate resolution, in MiB
    #[arg(long, default_value_t = 8)]
    stack_size_mb: usize,

    /// Cases a single control may serve
    #[arg(long, default_value_t = 1)]
    max_control_reuse: usize,

    /// Directory receiving all outputs
    #[arg(short, long, default_value = ".")]
    output_dir: PathBuf,
}

#[derive(Args, Debug)]
struct EvalArgs {
    /// Working directory for the status, phenotype and report files
    #[arg(short, long, default_value = ".")]
    dir: PathBuf,

    /// Status file produced by `match`
    #[arg(long, default_value = "status.optimized.tsv")]
    status: PathBuf,

    /// Phenotype file the matching was run on
    #[arg(short, long)]
    phenotype: PathBuf,

    /// Semicolon-separated variables, each optionally suffixed ":binary" or ":continuous"
    #[arg(short, long, conflicts_with = "vars_file", required_unless_present = "vars_file")]
    matching_vars: Option<String>,

    /// File with `header_name<TAB>is_binary` lines
    #[arg(long)]
    vars_file: Option<PathBuf>,

    /// Report file name
    #[arg(long, default_value = "reval_results.tsv")]
    output: PathBuf,

    /// Also write the report as JSON to this path
    #[arg(long)]
    json: Option<PathBuf>,
}

fn run_match(args: MatchArgs) -> Result<bool> {
    let mut builder = MatchingConfig::builder()
        .final_count(args.final_count)
        .multiplier(args.multiplier)
        .normalize(!args.no_normalize)
        .skip_optimization(args.skip_optimization)
        .stack_size_mb(args.stack_size_mb)
        .max_control_reuse(args.max_control_reuse)
        .output_dir(args.output_dir);
    if let Some(threads) = args.threads {
        builder = builder.threads(threads);
    }
    let config = builder.build();

    let loadings = FactorLoadings::parse(&args.loadings).context("Invalid factor loadings")?;
    let summary = MatchOrchestrator::new(config)
        .run(&args.samples, &loadings)
        .with_context(|| format!("Matching failed for {}", args.samples.display()))?;

    let failed = summary.failed_strata();
    if failed > 0 {
        error!("{failed} of {} strata failed", summary.strata.len());
    }
    Ok(failed == 0)
}

fn run_eval(args: EvalArgs) -> Result<bool> {
    let specs = match (&args.matching_vars, &args.vars_file) {
        (Some(list), _) => VariableSpec::parse_list(list)?,
        (None, Some(path)) => VariableSpec::read_file(&args.dir.join(path))?,
        (None, None) => anyhow::bail!("Either --matching-vars or --vars-file is required"),
    };

    let mut config = EvaluationConfig::in_dir(&args.dir, args.status, args.phenotype, args.output);
    if let Some(json) = args.json {
        config = config.with_json(json);
    }

    let report = REval::run(&config, &specs)
        .with_context(|| format!("Evaluation failed for {}", config.status_file.display()))?;
    info!("Wrote {} report rows to {}", report.len(), config.output_file.display());
    Ok(true)
}

fn main() -> ExitCode {
    // Setup logging
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    let start = Instant::now();
    let outcome = match cli.command {
        Command::Match(args) => run_match(args),
        Command::Eval(args) => run_eval(args),
    };

    match outcome {
        Ok(true) => {
            info!("Finished in {:?}", start.elapsed());
            ExitCode::SUCCESS
        }
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            error!("{e:#}");
            ExitCode::FAILURE
        }
    }
}
