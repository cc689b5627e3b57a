//! Offline analysis of run-result files.
//!
//! This module parses result files written by the replay driver, validates
//! each row, computes per-column statistics across repeats, and merges many
//! files into one summary table.

pub mod types;
pub mod parse;
pub mod stats;
pub mod results;
pub mod summary;
pub mod cache;
pub mod progress;
pub mod batch;

pub use types::*;
pub use parse::Analyse;
pub use stats::Aggregate;
pub use results::AnalysisResults;
pub use summary::{format_result, SummaryProfile};
pub use batch::{result_files, BatchAnalyzer, BatchReport};
