//! Control-to-case pairings read from a status file

use std::path::Path;

use rustc_hash::{FxHashMap, FxHashSet};

use crate::algorithm::matching::output::STATUS_HEADER;
use crate::algorithm::matching::stratify::{CASE_STATUS, CONTROL_STATUS};
use crate::error::{MatchError, Result};
use crate::reader::SampleTable;

/// Each control mapped to the single case it was matched to
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ControlCasePairing {
    /// (control, case) in file order
    pairs: Vec<(String, String)>,
    control_index: FxHashMap<String, usize>,
    case_ids: FxHashSet<String>,
}

impl ControlCasePairing {
    /// Build a pairing from (control, case) pairs
    ///
    /// A control listed twice is rejected.
    pub fn from_pairs<I, C, K>(pairs: I) -> Result<Self>
    where
        I: IntoIterator<Item = (C, K)>,
        C: Into<String>,
        K: Into<String>,
    {
        let mut pairing = Self::default();
        for (control, case) in pairs {
            pairing.insert(control.into(), case.into())?;
        }
        Ok(pairing)
    }

    /// Read the pairings of a status file; case rows are skipped
    pub fn read_status_file(path: &Path) -> Result<Self> {
        let table = SampleTable::read_tsv(path, "status file")?;
        if table.header() != STATUS_HEADER {
            return Err(MatchError::data_integrity(format!(
                "Status file {} has header [{}], expected [{}]",
                path.display(),
                table.header().join(", "),
                STATUS_HEADER.join(", ")
            )));
        }

        let mut pairing = Self::default();
        for row in table.rows() {
            match row[1].as_str() {
                CASE_STATUS => {}
                CONTROL_STATUS => pairing.insert(row[0].clone(), row[2].clone())?,
                other => {
                    return Err(MatchError::data_integrity(format!(
                        "Status file row for '{}' has status '{other}', expected {CASE_STATUS} or {CONTROL_STATUS}",
                        row[0]
                    )));
                }
            }
        }
        log::info!(
            "Read {} control-case pairings covering {} cases from {}",
            pairing.len(),
            pairing.case_count(),
            path.display()
        );
        Ok(pairing)
    }

    fn insert(&mut self, control: String, case: String) -> Result<()> {
        if self.control_index.contains_key(&control) {
            return Err(MatchError::data_integrity(format!(
                "Control '{control}' is paired with more than one case"
            )));
        }
        self.control_index.insert(control.clone(), self.pairs.len());
        self.case_ids.insert(case.clone());
        self.pairs.push((control, case));
        Ok(())
    }

    /// Number of pairings (one per control)
    #[must_use]
    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    /// Whether there are no pairings
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    /// Number of distinct cases
    #[must_use]
    pub fn case_count(&self) -> usize {
        self.case_ids.len()
    }

    /// Case matched to `control`
    #[must_use]
    pub fn case_for(&self, control: &str) -> Option<&str> {
        self.control_index
            .get(control)
            .map(|&i| self.pairs[i].1.as_str())
    }

    /// Whether `id` is a paired case
    #[must_use]
    pub fn is_case(&self, id: &str) -> bool {
        self.case_ids.contains(id)
    }

    /// Whether `id` is a paired control
    #[must_use]
    pub fn is_control(&self, id: &str) -> bool {
        self.control_index.contains_key(id)
    }

    /// Whether `id` takes part in any pairing
    #[must_use]
    pub fn contains(&self, id: &str) -> bool {
        self.is_case(id) || self.is_control(id)
    }

    /// Distinct case ids
    pub fn case_ids(&self) -> impl Iterator<Item = &str> {
        self.case_ids.iter().map(String::as_str)
    }

    /// (control, case) pairs in file order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.pairs.iter().map(|(c, k)| (c.as_str(), k.as_str()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn test_read_status_file_skips_cases() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("status.tsv");
        fs::write(
            &path,
            "id\tstatus\tmatched_case_id\nA\t1\tA\nc1\t0\tA\nc2\t0\tA\nB\t1\tB\nc3\t0\tB\n",
        )
        .unwrap();

        let pairing = ControlCasePairing::read_status_file(&path).unwrap();
        assert_eq!(pairing.len(), 3);
        assert_eq!(pairing.case_count(), 2);
        assert_eq!(pairing.case_for("c3"), Some("B"));
        assert!(pairing.is_case("A"));
        assert!(pairing.is_control("c1"));
        assert!(!pairing.contains("zz"));
    }

    #[test]
    fn test_control_listed_twice_is_rejected() {
        let err = ControlCasePairing::from_pairs([("c1", "A"), ("c1", "B")]).unwrap_err();
        assert!(err.is_data_integrity());
    }

    #[test]
    fn test_bad_header_or_status() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("status.tsv");
        fs::write(&path, "id\tcase\tmatch\nc1\t0\tA\n").unwrap();
        assert!(ControlCasePairing::read_status_file(&path).is_err());

        fs::write(&path, "id\tstatus\tmatched_case_id\nc1\tx\tA\n").unwrap();
        assert!(ControlCasePairing::read_status_file(&path).is_err());
    }
}
