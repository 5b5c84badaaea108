//! Evaluation of status files produced by the matching pipeline

mod utils;

use matchmaker::algorithm::evaluation::REPORT_HEADER;
use matchmaker::{
    EvaluationConfig, FactorLoadings, MatchError, MatchOrchestrator, MatchingConfig, REval,
    VariableKind, VariableSpec,
};
use utils::{LOADINGS, SAMPLES, read_lines, test_config, write_file};

fn matched_dir(skip_optimization: bool) -> tempfile::TempDir {
    let dir = tempfile::tempdir().unwrap();
    let samples = write_file(dir.path(), "samples.tsv", SAMPLES);
    let loadings = FactorLoadings::parse(LOADINGS).unwrap();
    let config = MatchingConfig {
        skip_optimization,
        ..test_config(dir.path())
    };
    MatchOrchestrator::new(config).run(&samples, &loadings).unwrap();
    dir
}

fn parse_p(raw: &str) -> f64 {
    let p: f64 = raw.parse().unwrap();
    assert!((0.0..=1.0).contains(&p), "p-value {p} out of range");
    p
}

#[test]
fn test_evaluate_optimized_matching() {
    let dir = matched_dir(false);
    let specs = VariableSpec::parse_list("age:continuous;smoker").unwrap();
    let config = EvaluationConfig::in_dir(
        dir.path(),
        "status.optimized.tsv",
        "samples.tsv",
        "reval_results.tsv",
    )
    .with_json(dir.path().join("reval_results.json"));

    let report = REval::run(&config, &specs).unwrap();
    assert_eq!(report.len(), 2);
    assert_eq!(report[1].kind, VariableKind::Binary);

    let lines = read_lines(&config.output_file);
    assert_eq!(lines.len(), 3);
    assert_eq!(lines[0], REPORT_HEADER.join("\t"));

    let age: Vec<&str> = lines[1].split('\t').collect();
    assert_eq!(&age[..4], &["age", "23.66667", "23.4", "NA"]);
    parse_p(age[4]);
    parse_p(age[5]);

    let smoker: Vec<&str> = lines[2].split('\t').collect();
    assert_eq!(&smoker[..4], &["smoker", "NA", "NA", "0.66667"]);
    parse_p(smoker[4]);
    parse_p(smoker[5]);

    let json = std::fs::read_to_string(dir.path().join("reval_results.json")).unwrap();
    let parsed: serde_json::Value = serde_json::from_str(&json).unwrap();
    assert_eq!(parsed[0]["variable_name"], "age");
    assert!(parsed[0]["concordance"].is_null());
    assert_eq!(parsed[1]["kind"], "binary");
}

#[test]
fn test_variable_file_and_existing_report() {
    let dir = matched_dir(false);
    let vars = write_file(
        dir.path(),
        "vars.tsv",
        "header_name\tis_binary\nsmoker\tTRUE\nage\tfalse\n",
    );
    let specs = VariableSpec::read_file(&vars).unwrap();
    assert_eq!(specs[0].kind, Some(VariableKind::Binary));

    let config = EvaluationConfig::in_dir(dir.path(), "status.optimized.tsv", "samples.tsv", "out.tsv");
    REval::run(&config, &specs).unwrap();
    let err = REval::run(&config, &specs).unwrap_err();
    assert!(matches!(err, MatchError::Configuration(_)));
}

#[test]
fn test_naive_status_file_reuses_controls() {
    let dir = matched_dir(true);
    let specs = VariableSpec::parse_list("age").unwrap();
    let config = EvaluationConfig::in_dir(dir.path(), "status.naive.tsv", "samples.tsv", "out.tsv");

    let err = REval::run(&config, &specs).unwrap_err();
    assert!(err.is_data_integrity());
    assert!(!config.output_file.exists());
}

#[test]
fn test_binary_request_on_continuous_column() {
    let dir = matched_dir(false);
    let specs = VariableSpec::parse_list("age:binary").unwrap();
    let config = EvaluationConfig::in_dir(dir.path(), "status.optimized.tsv", "samples.tsv", "out.tsv");

    assert!(REval::run(&config, &specs).is_err());
}
