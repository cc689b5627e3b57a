//! Per-file aggregates.

use std::collections::{BTreeMap, BTreeSet};

use log::warn;
use serde::{Deserialize, Serialize};

use super::stats::{self, Aggregate};
use super::{Analyse, AnalysisError};

/// Columns that are not expected to have an average
const EXPECTED_FAIL: [&str; 4] = [
    "Collisions",
    "NodeWasSource",
    "AttackerMovesInResponseTo",
    "SourceChangeDetected",
];

/// Statistics of every column of one result file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisResults {
    pub opts: BTreeMap<String, String>,
    pub headers_to_skip: BTreeSet<String>,
    pub average_of: BTreeMap<String, Aggregate>,
    pub variance_of: BTreeMap<String, Aggregate>,
    pub median_of: BTreeMap<String, f64>,
    pub number_of_repeats: usize,
    pub num_nodes: usize,
    pub rejected_rows: usize,
    pub dropped_no_sink_delivery: usize,
    pub dropped_hit_upper_bound: usize,
    pub dropped_duplicates: usize,
}

impl AnalysisResults {
    pub fn new(analysis: &Analyse) -> Self {
        let mut average_of = BTreeMap::new();
        let mut variance_of = BTreeMap::new();
        let mut median_of = BTreeMap::new();

        for (heading, values) in analysis.columns() {
            if heading == "Seed" {
                continue;
            }

            // No run satisfied the condition
            if values.is_empty() && analysis.is_filtered_column(&heading) {
                average_of.insert(heading.clone(), Aggregate::Scalar(0.0));
                variance_of.insert(heading, Aggregate::Scalar(0.0));
                continue;
            }

            match stats::average(&heading, &values) {
                Ok(average) => {
                    average_of.insert(heading.clone(), average);
                }
                Err(e) => {
                    if !EXPECTED_FAIL.contains(&heading.as_str()) {
                        warn!("Failed to find average of {} in {}: {}", heading, analysis.path.display(), e);
                    }
                    continue;
                }
            }

            match stats::variance(&heading, &values) {
                Ok(variance) => {
                    variance_of.insert(heading.clone(), variance);
                }
                Err(AnalysisError::DictVariance(_)) => {}
                Err(e) => warn!("Failed to find variance of {} in {}: {}", heading, analysis.path.display(), e),
            }

            if let Ok(median) = stats::median(&heading, &values) {
                median_of.insert(heading, median);
            }
        }

        Self {
            opts: analysis.opts.clone(),
            headers_to_skip: analysis.headers_to_skip.clone(),
            average_of,
            variance_of,
            median_of,
            number_of_repeats: analysis.number_of_repeats(),
            num_nodes: analysis.num_nodes,
            rejected_rows: analysis.rejected_rows,
            dropped_no_sink_delivery: analysis.dropped_no_sink_delivery,
            dropped_hit_upper_bound: analysis.dropped_hit_upper_bound,
            dropped_duplicates: analysis.dropped_duplicates,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::AnalyseOptions;
    use std::io::Cursor;
    use std::path::Path;

    const FILE: &str = "configuration=grid
network_size=3
distance=4.5
#Seed|Sent|Collisions|Captured|NormalLatency|NodeWasSource|SentHeatMap|AttackerMoves
1|10|None|True|2.0|{4: [(0.0, inf)]}|{0: 2, 1: 4}|{0: 3}
2|20|None|False|inf|{4: [(0.0, inf)]}|{0: 4, 1: 2}|{0: 5}
3|30|None|False|4.0|{4: [(0.0, inf)]}|{0: 6}|{0: 7}
";

    #[test]
    fn test_results() {
        let analysis = Analyse::from_reader(
            Path::new("result.txt"),
            Cursor::new(FILE),
            &AnalyseOptions::default(),
        )
        .unwrap();
        let results = AnalysisResults::new(&analysis);

        assert_eq!(results.number_of_repeats, 2);
        assert_eq!(results.dropped_no_sink_delivery, 1);
        assert_eq!(results.num_nodes, 9);

        assert!(!results.average_of.contains_key("Seed"));
        assert!(!results.average_of.contains_key("Collisions"));
        assert!(!results.average_of.contains_key("NodeWasSource"));

        assert_eq!(results.average_of["Sent"], Aggregate::Scalar(20.0));
        assert_eq!(results.variance_of["Sent"], Aggregate::Scalar(200.0));
        assert_eq!(results.median_of["Sent"], 20.0);
        assert_eq!(results.average_of["Captured"], Aggregate::Scalar(0.5));
        assert_eq!(results.average_of["NormalLatency"], Aggregate::Scalar(3.0));

        assert_eq!(results.average_of["SentHeatMap"].to_string(), "{0: 4.0, 1: 4.0}");
        assert!(!results.variance_of.contains_key("SentHeatMap"));
        assert_eq!(results.average_of["AttackerMoves"].to_string(), "{0: 5.0}");
    }
}
