//! Core data types for offline analysis of run-result files.

use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::literal::LiteralError;

/// File-level analysis failures
#[derive(Debug, thiserror::Error)]
pub enum AnalysisError {
    /// No valid data rows. Callers skip the file and carry on.
    #[error("{0} contains no results")]
    EmptyFile(PathBuf),

    #[error("Failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{0} has metadata after the header line")]
    MetadataAfterHeader(PathBuf),

    #[error("Invalid skip-header pattern '{pattern}': {source}")]
    InvalidSkipPattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },

    #[error("All rows in {path} were removed ({reason})")]
    AllRowsRemoved { path: PathBuf, reason: &'static str },

    #[error("Rows with seed {seed} have differing values in {column}")]
    DifferingSeeds { seed: String, column: String },

    #[error("Missing option '{0}'")]
    MissingOption(String),

    #[error("Cannot resolve value '{0}' from a column, constant or option")]
    UnknownValue(String),

    #[error("There are no values for {0} to aggregate")]
    NoValues(String),

    #[error("Cannot aggregate non-numeric column {0}")]
    NotNumeric(String),

    #[error("Variance of dict column {0} is not supported")]
    DictVariance(String),

    #[error("Median of dict column {0} is not supported")]
    DictMedian(String),

    #[error("Missing result '{0}'")]
    MissingResult(String),
}

/// Why a single data row was rejected
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum RowError {
    #[error("expected {expected} values, found {found}")]
    FieldCount { expected: usize, found: usize },

    #[error("cannot parse {heading}: {source}")]
    Value {
        heading: String,
        #[source]
        source: LiteralError,
    },

    #[error("{heading} should be a dict")]
    HeatMapNotDict { heading: String },

    #[error("{heading} has {size} entries but the network has {num_nodes} nodes")]
    HeatMapTooLarge { heading: String, size: usize, num_nodes: usize },

    #[error("Captured is {captured} but attacker distances are {distances}")]
    CapturedMismatch { captured: bool, distances: String },

    #[error("NormalLatency is nan")]
    LatencyNan,

    #[error("NormalLatency {0} is not positive")]
    LatencyNotPositive(f64),
}

/// One side of a normalisation pair: a value name or a nested pair
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum NormValue {
    Name(String),
    Pair(Box<NormValue>, Box<NormValue>),
}

impl NormValue {
    pub fn pair(num: impl Into<NormValue>, den: impl Into<NormValue>) -> Self {
        NormValue::Pair(Box::new(num.into()), Box::new(den.into()))
    }

    /// Column name this value is looked up under
    pub fn name(&self) -> String {
        self.name_with("norm")
    }

    pub fn filtered_name(&self) -> String {
        self.name_with("filtered")
    }

    fn name_with(&self, prefix: &str) -> String {
        match self {
            NormValue::Name(name) => name.clone(),
            NormValue::Pair(num, den) => format!("{}({},{})", prefix, num.name(), den.name()),
        }
    }

    /// Pairs in evaluation order: inner pairs before the pairs containing them
    pub fn pairs(&self) -> Vec<(&NormValue, &NormValue)> {
        let mut out = Vec::new();
        self.collect_pairs(&mut out);
        out
    }

    fn collect_pairs<'a>(&'a self, out: &mut Vec<(&'a NormValue, &'a NormValue)>) {
        if let NormValue::Pair(num, den) = self {
            num.collect_pairs(out);
            den.collect_pairs(out);
            out.push((num, den));
        }
    }
}

impl From<&str> for NormValue {
    fn from(name: &str) -> Self {
        NormValue::Name(name.to_string())
    }
}

impl fmt::Display for NormValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name())
    }
}

/// Options controlling how one result file is analysed.
///
/// Stored next to cached results; a cache entry is only reused when the
/// options match exactly.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AnalyseOptions {
    /// `(numerator, denominator)` pairs producing `norm(A,B)` columns
    pub normalised: Vec<NormValue>,
    /// `(values, condition)` pairs producing `filtered(A,B)` columns
    pub filtered: Vec<NormValue>,
    /// Regular expressions matched against whole heading names
    pub headers_to_skip: Vec<String>,
    pub keep_if_hit_upper_time_bound: bool,
    pub verify_seeds: bool,
}
