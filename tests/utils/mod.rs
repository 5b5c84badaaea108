//! Shared fixtures for the integration tests
#![allow(dead_code)]

use std::fs;
use std::path::{Path, PathBuf};

use matchmaker::MatchingConfig;

/// Two populated strata (F, M) and one stratum (X) holding only a control
pub const SAMPLES: &str = "\
id\tstatus\tsex\tage\tsmoker
A\t1\tF\t10\t1
c1\t0\tF\t10\t1
B\t1\tF\t11\t0
c2\t0\tF\t11.2\t1
c3\t0\tF\t30\t0
D\t1\tM\t50\t0
c4\t0\tM\t49\t0
c5\t0\tM\t70\t1
c6\t0\tX\t20\t0
";

/// Loadings for `SAMPLES`
pub const LOADINGS: &str = "sex:force,age:1";

/// Write `content` to `dir/name`
pub fn write_file(dir: &Path, name: &str, content: &str) -> PathBuf {
    let path = dir.join(name);
    fs::write(&path, content).unwrap();
    path
}

/// Raw-distance configuration keeping one control per case
#[must_use]
pub fn test_config(dir: &Path) -> MatchingConfig {
    MatchingConfig::builder()
        .final_count(1)
        .multiplier(2)
        .threads(2)
        .normalize(false)
        .output_dir(dir)
        .build()
}

/// Read a file into lines
#[must_use]
pub fn read_lines(path: &Path) -> Vec<String> {
    fs::read_to_string(path)
        .unwrap()
        .lines()
        .map(str::to_string)
        .collect()
}
