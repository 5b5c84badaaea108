//! Matching variables evaluated after matching
//!
//! A matching variable names one phenotype column and carries its
//! classification. Binary variables are summarized by concordance,
//! continuous ones by case and control averages. The classification is
//! either given or inferred from the data in a scan pass before ingestion.

use std::fmt;
use std::path::Path;

use rustc_hash::FxHashSet;
use serde::Serialize;
use smallvec::SmallVec;

use crate::algorithm::evaluation::data_box::DataBox;
use crate::algorithm::evaluation::regression::LogisticFitter;
use crate::error::{MatchError, Result};
use crate::reader::{ID_COLUMN, SampleTable};
use crate::utils::format_decimal;

/// Placeholder for statistics that do not apply to a variable's kind
pub const NA: &str = "NA";

/// Expected header of a matching-variable file
pub const VARIABLE_FILE_HEADER: [&str; 2] = ["header_name", "is_binary"];

/// Classification of a matching variable
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum VariableKind {
    /// Two integer-coded values
    Binary,
    /// Any real value
    Continuous,
}

impl fmt::Display for VariableKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Binary => write!(f, "binary"),
            Self::Continuous => write!(f, "continuous"),
        }
    }
}

/// Handle of a variable inside a `DataBox`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct VariableId(pub(crate) usize);

impl VariableId {
    /// Position among the box's variables
    #[must_use]
    pub const fn index(self) -> usize {
        self.0
    }
}

/// Classification inferred from observed values
///
/// Starts binary and becomes continuous once more than two distinct values,
/// a range above one, or a non-integral value is seen. Continuous is final.
#[derive(Debug, Clone, PartialEq)]
pub struct KindInference {
    kind: VariableKind,
    distinct: SmallVec<[f64; 2]>,
    min: f64,
    max: f64,
}

impl Default for KindInference {
    fn default() -> Self {
        Self {
            kind: VariableKind::Binary,
            distinct: SmallVec::new(),
            min: f64::INFINITY,
            max: f64::NEG_INFINITY,
        }
    }
}

impl KindInference {
    /// Start a new inference
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Current classification
    #[must_use]
    pub const fn kind(&self) -> VariableKind {
        self.kind
    }

    /// Account for one observed value
    pub fn observe(&mut self, value: f64) {
        if self.kind == VariableKind::Continuous {
            return;
        }
        if !value.is_finite() || value.fract() != 0.0 {
            self.kind = VariableKind::Continuous;
            return;
        }
        self.min = self.min.min(value);
        self.max = self.max.max(value);
        if !self.distinct.contains(&value) {
            self.distinct.push(value);
        }
        if self.distinct.len() > 2 || self.max - self.min > 1.0 {
            self.kind = VariableKind::Continuous;
        }
    }
}

/// A requested variable before classification
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VariableSpec {
    /// Phenotype column name
    pub name: String,
    /// Given classification, `None` to infer
    pub kind: Option<VariableKind>,
}

impl VariableSpec {
    /// Parse a semicolon list of `name[:binary|:continuous]`
    pub fn parse_list(list: &str) -> Result<Vec<Self>> {
        let specs = list
            .split(';')
            .map(str::trim)
            .filter(|item| !item.is_empty())
            .map(|item| -> Result<Self> {
                let (name, kind) = match item.split_once(':') {
                    None => (item, None),
                    Some((name, kind)) => (name.trim(), Some(parse_kind(kind.trim(), item)?)),
                };
                if name.is_empty() {
                    return Err(MatchError::configuration(format!(
                        "Matching variable '{item}' has an empty name"
                    )));
                }
                Ok(Self {
                    name: name.to_string(),
                    kind,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        if specs.is_empty() {
            return Err(MatchError::configuration(format!(
                "No matching variables found in '{list}'"
            )));
        }
        check_unique(&specs)?;
        Ok(specs)
    }

    /// Read a `header_name\tis_binary` file
    pub fn read_file(path: &Path) -> Result<Vec<Self>> {
        let table = SampleTable::read_tsv(path, "matching variable file")?;
        if table.header() != VARIABLE_FILE_HEADER {
            return Err(MatchError::configuration(format!(
                "Matching variable file {} has header [{}], expected [{}]",
                path.display(),
                table.header().join(", "),
                VARIABLE_FILE_HEADER.join(", ")
            )));
        }

        let specs = table
            .rows()
            .iter()
            .map(|row| -> Result<Self> {
                let binary = match row[1].to_ascii_lowercase().as_str() {
                    "true" => true,
                    "false" => false,
                    other => {
                        return Err(MatchError::configuration(format!(
                            "Matching variable '{}' has is_binary '{other}', expected true or false",
                            row[0]
                        )));
                    }
                };
                Ok(Self {
                    name: row[0].clone(),
                    kind: Some(if binary {
                        VariableKind::Binary
                    } else {
                        VariableKind::Continuous
                    }),
                })
            })
            .collect::<Result<Vec<_>>>()?;
        check_unique(&specs)?;
        Ok(specs)
    }
}

fn parse_kind(raw: &str, item: &str) -> Result<VariableKind> {
    match raw.to_ascii_lowercase().as_str() {
        "binary" => Ok(VariableKind::Binary),
        "continuous" => Ok(VariableKind::Continuous),
        _ => Err(MatchError::configuration(format!(
            "Matching variable '{item}' has kind '{raw}', expected binary or continuous"
        ))),
    }
}

fn check_unique(specs: &[VariableSpec]) -> Result<()> {
    let mut seen = FxHashSet::default();
    for spec in specs {
        if !seen.insert(spec.name.as_str()) {
            return Err(MatchError::configuration(format!(
                "Multiple matching variables provided for header name '{}'",
                spec.name
            )));
        }
    }
    Ok(())
}

/// A classified matching variable
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatchingVariable {
    name: String,
    kind: VariableKind,
    header_index: Option<usize>,
}

impl MatchingVariable {
    /// Create an unbound variable
    pub fn new(name: impl Into<String>, kind: VariableKind) -> Self {
        Self {
            name: name.into(),
            kind,
            header_index: None,
        }
    }

    /// Column name
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Classification
    #[must_use]
    pub const fn kind(&self) -> VariableKind {
        self.kind
    }

    /// Whether the variable is binary
    #[must_use]
    pub fn is_binary(&self) -> bool {
        self.kind == VariableKind::Binary
    }

    /// Bound column position, if any
    #[must_use]
    pub const fn header_index(&self) -> Option<usize> {
        self.header_index
    }

    /// Bind the variable to its column in `header`
    pub fn find_index_in_header(&mut self, header: &[String]) -> Option<usize> {
        self.header_index = header.iter().position(|h| *h == self.name);
        self.header_index
    }

    /// Fail unless the variable is binary
    pub fn must_be_binary(&self) -> Result<()> {
        match self.kind {
            VariableKind::Binary => Ok(()),
            VariableKind::Continuous => Err(MatchError::type_misuse(format!(
                "'{}' is continuous; this statistic is only defined for binary variables",
                self.name
            ))),
        }
    }

    /// Fail if the variable is binary
    pub fn cant_be_binary(&self) -> Result<()> {
        match self.kind {
            VariableKind::Continuous => Ok(()),
            VariableKind::Binary => Err(MatchError::type_misuse(format!(
                "'{}' is binary; this statistic is only defined for continuous variables",
                self.name
            ))),
        }
    }

    /// Report row for this variable
    pub fn table_row<F: LogisticFitter>(&self, id: VariableId, data: &DataBox<F>) -> Result<[String; 6]> {
        let (case_avg, control_avg, concordance) = match self.kind {
            VariableKind::Binary => (
                NA.to_string(),
                NA.to_string(),
                format_decimal(data.concordance(id)?),
            ),
            VariableKind::Continuous => (
                format_decimal(data.case_avg(id)?),
                format_decimal(data.control_avg(id)?),
                NA.to_string(),
            ),
        };
        Ok([
            self.name.clone(),
            case_avg,
            control_avg,
            concordance,
            format_decimal(data.univariate_p(id)?),
            format_decimal(data.multivariate_p(id)?),
        ])
    }

    /// Tab-joined report line
    pub fn table_line<F: LogisticFitter>(&self, id: VariableId, data: &DataBox<F>) -> Result<String> {
        Ok(self.table_row(id, data)?.join("\t"))
    }
}

/// Fix the classification of every variable and bind it to the header
///
/// Inferred variables are classified from the rows accepted by `include`.
/// A column that is missing or holds a non-numeric value is a data error.
pub fn classify_variables(
    specs: &[VariableSpec],
    table: &SampleTable,
    include: impl Fn(&str) -> bool,
) -> Result<Vec<MatchingVariable>> {
    let header = table.header();
    let mut variables = Vec::with_capacity(specs.len());

    for spec in specs {
        let mut variable = MatchingVariable::new(&spec.name, spec.kind.unwrap_or(VariableKind::Binary));
        let column = variable.find_index_in_header(header).ok_or_else(|| {
            MatchError::data_integrity(format!(
                "Unable to find column for matching variable '{}' in header [{}]",
                spec.name,
                header.join(", ")
            ))
        })?;

        if spec.kind.is_none() {
            let mut inference = KindInference::new();
            for row in table.rows().iter().filter(|row| include(&row[ID_COLUMN])) {
                let value = row[column].parse::<f64>().map_err(|_| {
                    MatchError::data_integrity(format!(
                        "Matching variable '{}' has non-numeric value '{}' for sample '{}'",
                        spec.name, row[column], row[ID_COLUMN]
                    ))
                })?;
                inference.observe(value);
            }
            variable.kind = inference.kind();
            log::debug!("Classified matching variable '{}' as {}", spec.name, variable.kind);
        }
        variables.push(variable);
    }
    Ok(variables)
}
