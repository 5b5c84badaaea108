//! Factor loading definitions for case-control matching
//!
//! A loading string such as `PC1:4,PC2:4,sex:force,site:nominal:2` assigns
//! each sample-file column a role: stratify on it (`force`), one-hot encode
//! it and weight the indicators (`nominal`), or weight its numeric value.

use std::fmt;

use crate::error::{MatchError, Result};

/// Default weight for nominal factors given without an explicit weight
pub const DEFAULT_NOMINAL_WEIGHT: f64 = 1.0;

/// Role and weight assigned to one sample-file column
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FactorLoading {
    /// Stratify on the column's exact value
    Force,
    /// One-hot encode the column and weight every indicator
    Nominal(f64),
    /// Weight the column's numeric value
    Numeric(f64),
}

impl FactorLoading {
    /// Distance weight, `None` for forced factors
    #[must_use]
    pub const fn weight(&self) -> Option<f64> {
        match self {
            Self::Force => None,
            Self::Nominal(w) | Self::Numeric(w) => Some(*w),
        }
    }
}

impl fmt::Display for FactorLoading {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Force => write!(f, "force"),
            Self::Nominal(w) => write!(f, "nominal:{w}"),
            Self::Numeric(w) => write!(f, "{w}"),
        }
    }
}

/// Parsed factor loadings in configuration order
#[derive(Debug, Clone, PartialEq)]
pub struct FactorLoadings {
    factors: Vec<(String, FactorLoading)>,
}

impl FactorLoadings {
    /// Parse a comma-separated `name:spec` list
    ///
    /// Any malformed entry rejects the whole configuration.
    pub fn parse(spec: &str) -> Result<Self> {
        let mut factors: Vec<(String, FactorLoading)> = Vec::new();

        for item in spec.split(',').map(str::trim).filter(|item| !item.is_empty()) {
            let (name, loading) = parse_item(item)?;
            if factors.iter().any(|(existing, _)| *existing == name) {
                return Err(MatchError::configuration(format!(
                    "Factor '{name}' is configured more than once"
                )));
            }
            factors.push((name, loading));
        }

        if factors.is_empty() {
            return Err(MatchError::configuration(format!(
                "No factor loadings found in '{spec}'; expected name:spec pairs such as PC1:4,sex:force"
            )));
        }
        Ok(Self { factors })
    }

    /// All factors with their loadings, in configuration order
    pub fn iter(&self) -> impl Iterator<Item = (&str, FactorLoading)> {
        self.factors.iter().map(|(name, loading)| (name.as_str(), *loading))
    }

    /// Loading configured for `name`
    #[must_use]
    pub fn loading(&self, name: &str) -> Option<FactorLoading> {
        self.factors
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, loading)| *loading)
    }

    /// Names of numeric (non-forced, non-nominal) factors
    #[must_use]
    pub fn numeric_factor_names(&self) -> Vec<&str> {
        self.names_where(|l| matches!(l, FactorLoading::Numeric(_)))
    }

    /// Names of nominal factors
    #[must_use]
    pub fn nominal_factor_names(&self) -> Vec<&str> {
        self.names_where(|l| matches!(l, FactorLoading::Nominal(_)))
    }

    /// Names of forced (stratification) factors
    #[must_use]
    pub fn forced_factor_names(&self) -> Vec<&str> {
        self.names_where(|l| matches!(l, FactorLoading::Force))
    }

    /// Check that every configured name matches exactly one header column
    pub fn validate_against_header(&self, header: &[String]) -> Result<()> {
        for (name, _) in &self.factors {
            let hits = header.iter().filter(|h| *h == name).count();
            if hits != 1 {
                return Err(MatchError::data_integrity(format!(
                    "Factor '{name}' must match exactly one sample file column, found {hits} in header [{}]",
                    header.join(", ")
                )));
            }
        }
        Ok(())
    }

    fn names_where(&self, predicate: impl Fn(&FactorLoading) -> bool) -> Vec<&str> {
        self.factors
            .iter()
            .filter(|(_, loading)| predicate(loading))
            .map(|(name, _)| name.as_str())
            .collect()
    }
}

fn parse_item(item: &str) -> Result<(String, FactorLoading)> {
    let fields: Vec<&str> = item.split(':').map(str::trim).collect();
    let name = fields[0];
    if fields.len() < 2 {
        return Err(MatchError::configuration(format!(
            "Loading '{item}' is missing ':spec'; expected name:force, name:nominal[:weight] or name:<weight>"
        )));
    }
    if name.is_empty() {
        return Err(MatchError::configuration(format!(
            "Loading '{item}' has an empty factor name"
        )));
    }

    let keyword = fields[1].to_ascii_lowercase();
    let loading = match (keyword.as_str(), &fields[2..]) {
        ("force", []) => FactorLoading::Force,
        ("nominal", []) => FactorLoading::Nominal(DEFAULT_NOMINAL_WEIGHT),
        ("nominal", [weight]) => FactorLoading::Nominal(parse_weight(weight, item)?),
        (_, []) => FactorLoading::Numeric(parse_weight(fields[1], item)?),
        _ => {
            return Err(MatchError::configuration(format!(
                "Loading '{item}' has too many ':' fields"
            )));
        }
    };
    Ok((name.to_string(), loading))
}

fn parse_weight(raw: &str, item: &str) -> Result<f64> {
    match raw.parse::<f64>() {
        Ok(weight) if weight.is_finite() => Ok(weight),
        _ => Err(MatchError::configuration(format!(
            "Loading '{raw}' in '{item}' not recognized; expected force, nominal or a finite number"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_roles_in_order() {
        let loadings =
            FactorLoadings::parse("PC1:4, PC2:0.5,sex:force,site:NOMINAL,batch:nominal:2.5")
                .unwrap();

        assert_eq!(loadings.numeric_factor_names(), vec!["PC1", "PC2"]);
        assert_eq!(loadings.nominal_factor_names(), vec!["site", "batch"]);
        assert_eq!(loadings.forced_factor_names(), vec!["sex"]);
        assert_eq!(loadings.loading("PC1"), Some(FactorLoading::Numeric(4.0)));
        assert_eq!(loadings.loading("site"), Some(FactorLoading::Nominal(1.0)));
        assert_eq!(loadings.loading("batch"), Some(FactorLoading::Nominal(2.5)));
        assert_eq!(loadings.loading("sex"), Some(FactorLoading::Force));
        assert_eq!(loadings.loading("age"), None);
    }

    #[test]
    fn test_keywords_are_case_insensitive() {
        let loadings = FactorLoadings::parse("sex:FORCE,site:Nominal:3").unwrap();
        assert_eq!(loadings.loading("sex"), Some(FactorLoading::Force));
        assert_eq!(loadings.loading("site"), Some(FactorLoading::Nominal(3.0)));
    }

    #[test]
    fn test_invalid_configurations_are_rejected() {
        for bad in [
            "",
            "PC1",
            "PC1:abc",
            "PC1:NaN",
            "site:nominal:x",
            "sex:force:1",
            "PC1:1:2",
            ":3",
            "PC1:1,PC1:2",
        ] {
            let result = FactorLoadings::parse(bad);
            assert!(
                matches!(result, Err(MatchError::Configuration(_))),
                "expected configuration error for {bad:?}"
            );
        }
    }

    #[test]
    fn test_validate_against_header() {
        let loadings = FactorLoadings::parse("PC1:1,sex:force").unwrap();
        let header: Vec<String> = ["id", "status", "PC1", "sex"].map(String::from).to_vec();
        assert!(loadings.validate_against_header(&header).is_ok());

        let missing: Vec<String> = ["id", "status", "PC1"].map(String::from).to_vec();
        let err = loadings.validate_against_header(&missing).unwrap_err();
        assert!(err.to_string().contains("'sex'"));

        let duplicated: Vec<String> = ["id", "status", "PC1", "PC1", "sex"].map(String::from).to_vec();
        assert!(loadings.validate_against_header(&duplicated).is_err());
    }

    #[test]
    fn test_weights() {
        assert_eq!(FactorLoading::Force.weight(), None);
        assert_eq!(FactorLoading::Nominal(2.0).weight(), Some(2.0));
        assert_eq!(FactorLoading::Numeric(0.5).to_string(), "0.5");
    }
}
