//! Summary table layout.
//!
//! A profile lists the summary columns for one algorithm and the
//! normalised and filtered columns the analysis must produce for them.
//! Each analysed result file becomes one `|` separated summary row.

use super::{AnalyseOptions, AnalysisError, AnalysisResults, NormValue};
use crate::metrics::Algorithm;

/// Option echoes, as `(column title, option name)`
const PARAMETERS: [(&str, &str); 6] = [
    ("configuration", "configuration"),
    ("network size", "network_size"),
    ("source period", "source_period"),
    ("attacker model", "attacker_model"),
    ("safety period", "safety_period"),
    ("safety factor", "safety_factor"),
];

#[derive(Debug, Clone)]
enum Source {
    Repeats,
    NumNodes,
    Opt(&'static str),
    /// `average(variance)`, or the average alone when there is no variance
    Result { field: String, allow_missing: bool },
    /// Average only
    Average(&'static str),
    DroppedNoSinkDelivery,
    DroppedHitUpperBound,
    DroppedDuplicates,
    RejectedRows,
}

#[derive(Debug, Clone)]
pub struct SummaryColumn {
    title: String,
    source: Source,
}

impl SummaryColumn {
    fn new(title: &str, source: Source) -> Self {
        Self { title: title.to_string(), source }
    }

    fn result(title: &str, field: &str) -> Self {
        Self::new(title, Source::Result { field: field.to_string(), allow_missing: false })
    }

    fn optional(title: &str, field: &str) -> Self {
        Self::new(title, Source::Result { field: field.to_string(), allow_missing: true })
    }

    pub fn title(&self) -> &str {
        &self.title
    }
}

/// Summary columns for one algorithm
#[derive(Debug, Clone)]
pub struct SummaryProfile {
    algorithm: Algorithm,
    columns: Vec<SummaryColumn>,
    normalised: Vec<NormValue>,
    filtered: Vec<NormValue>,
}

impl SummaryProfile {
    pub fn for_algorithm(algorithm: Algorithm) -> Self {
        let mut columns = vec![
            SummaryColumn::new("repeats", Source::Repeats),
            SummaryColumn::new("num nodes", Source::NumNodes),
        ];
        columns.extend(PARAMETERS.iter().map(|&(title, opt)| SummaryColumn::new(title, Source::Opt(opt))));

        columns.extend([
            SummaryColumn::result("sent", "Sent"),
            SummaryColumn::result("received", "Received"),
            SummaryColumn::result("time taken", "TimeTaken"),
            SummaryColumn::result("first normal sent time", "FirstNormalSentTime"),
            SummaryColumn::optional("time after first normal", "norm(time_after_first_normal,1)"),
            SummaryColumn::result("wall time", "WallTime"),
            SummaryColumn::result("event count", "EventCount"),
            SummaryColumn::new("captured", Source::Average("Captured")),
            SummaryColumn::new("reached upper bound", Source::Average("ReachedSimUpperBound")),
            SummaryColumn::result("received ratio", "ReceiveRatio"),
            SummaryColumn::result("normal latency", "NormalLatency"),
            SummaryColumn::result("ssd", "NormalSinkSourceHops"),
            SummaryColumn::optional("unique normal generated", "UniqueNormalGenerated"),
            SummaryColumn::result("attacker moves", "AttackerMoves"),
            SummaryColumn::result("attacker distance", "AttackerDistance"),
            SummaryColumn::result("normal", "NormalSent"),
            SummaryColumn::optional("sent heatmap", "SentHeatMap"),
            SummaryColumn::optional("received heatmap", "ReceivedHeatMap"),
        ]);

        let mut normalised = vec![
            NormValue::pair("Sent", "TimeTaken"),
            NormValue::pair(NormValue::pair("Sent", "TimeTaken"), "num_nodes"),
            NormValue::pair("NormalSent", "TimeTaken"),
            NormValue::pair("energy_impact", "num_nodes"),
            NormValue::pair(NormValue::pair("energy_impact", "num_nodes"), "TimeTaken"),
            NormValue::pair("daily_allowance_used", "1"),
            NormValue::pair("time_after_first_normal", "1"),
        ];
        let filtered = vec![NormValue::pair("TimeTaken", "Captured")];

        let fake_columns = [
            SummaryColumn::result("away", "AwaySent"),
            SummaryColumn::result("choose", "ChooseSent"),
            SummaryColumn::result("fake", "FakeSent"),
            SummaryColumn::result("tfs", "TFS"),
            SummaryColumn::result("pfs", "PFS"),
        ];
        let fake_normalised = [
            NormValue::pair("FakeSent", "TimeTaken"),
            NormValue::pair(NormValue::pair("FakeSent", "TimeTaken"), "source_rate"),
        ];

        match algorithm {
            Algorithm::Protectionless => {}
            Algorithm::Adaptive => {
                columns.extend(fake_columns);
                columns.push(SummaryColumn::result("notify", "NotifySent"));
                normalised.extend(fake_normalised);
            }
            Algorithm::AdaptiveSpr | Algorithm::MotionAdaptive => {
                columns.extend(fake_columns);
                columns.push(SummaryColumn::result("tailfs", "TailFS"));
                normalised.extend(fake_normalised);
            }
            Algorithm::Periodic => {
                columns.push(SummaryColumn::result("dummy normal", "DummyNormalSent"));
                normalised.push(NormValue::pair("DummyNormalSent", "TimeTaken"));
            }
        }

        if !matches!(algorithm, Algorithm::Protectionless | Algorithm::Periodic) {
            columns.extend([
                SummaryColumn::result("fake to normal", "FakeToNormal"),
                SummaryColumn::result("fake to fake", "FakeToFake"),
            ]);
        }
        if algorithm == Algorithm::MotionAdaptive {
            columns.push(SummaryColumn::optional("nodes detected change", "NodesDetectedSrcChange"));
        }

        columns.extend([
            SummaryColumn::optional("norm(sent,time taken)", "norm(Sent,TimeTaken)"),
            SummaryColumn::optional(
                "norm(norm(sent,time taken),num nodes)",
                "norm(norm(Sent,TimeTaken),num_nodes)",
            ),
            SummaryColumn::optional("norm(normal,time taken)", "norm(NormalSent,TimeTaken)"),
            SummaryColumn::optional("energy impact per node", "norm(energy_impact,num_nodes)"),
            SummaryColumn::optional(
                "energy impact per node per second",
                "norm(norm(energy_impact,num_nodes),TimeTaken)",
            ),
            SummaryColumn::optional("energy allowance used", "norm(daily_allowance_used,1)"),
        ]);
        match algorithm {
            Algorithm::Protectionless => {}
            Algorithm::Periodic => columns.push(SummaryColumn::optional(
                "norm(dummy normal,time taken)",
                "norm(DummyNormalSent,TimeTaken)",
            )),
            _ => columns.extend([
                SummaryColumn::optional("norm(fake,time taken)", "norm(FakeSent,TimeTaken)"),
                SummaryColumn::optional(
                    "norm(norm(fake,time taken),source rate)",
                    "norm(norm(FakeSent,TimeTaken),source_rate)",
                ),
            ]),
        }
        columns.push(SummaryColumn::optional("captured time taken", "filtered(TimeTaken,Captured)"));

        columns.extend([
            SummaryColumn::new("dropped no sink delivery", Source::DroppedNoSinkDelivery),
            SummaryColumn::new("dropped hit upper bound", Source::DroppedHitUpperBound),
            SummaryColumn::new("dropped duplicates", Source::DroppedDuplicates),
            SummaryColumn::new("rejected rows", Source::RejectedRows),
        ]);

        Self { algorithm, columns, normalised, filtered }
    }

    pub fn algorithm(&self) -> Algorithm {
        self.algorithm
    }

    /// Options for analysing result files summarised by this profile
    pub fn analyse_options(&self, headers_to_skip: Vec<String>, keep_if_hit_upper_time_bound: bool) -> AnalyseOptions {
        AnalyseOptions {
            normalised: self.normalised.clone(),
            filtered: self.filtered.clone(),
            headers_to_skip,
            keep_if_hit_upper_time_bound,
            verify_seeds: true,
        }
    }

    pub fn titles(&self) -> Vec<&str> {
        self.columns.iter().map(SummaryColumn::title).collect()
    }

    pub fn header_line(&self) -> String {
        self.titles().join("|")
    }

    /// Summary cells for one file, in column order
    pub fn row(&self, results: &AnalysisResults) -> Result<Vec<String>, AnalysisError> {
        self.columns
            .iter()
            .map(|column| match &column.source {
                Source::Repeats => Ok(results.number_of_repeats.to_string()),
                Source::NumNodes => Ok(results.num_nodes.to_string()),
                Source::Opt(name) => Ok(results
                    .opts
                    .get(*name)
                    .cloned()
                    .unwrap_or_else(|| "None".to_string())),
                Source::Result { field, allow_missing } => format_result(results, field, *allow_missing),
                Source::Average(field) => results
                    .average_of
                    .get(*field)
                    .map(ToString::to_string)
                    .ok_or_else(|| AnalysisError::MissingResult(field.to_string())),
                Source::DroppedNoSinkDelivery => Ok(results.dropped_no_sink_delivery.to_string()),
                Source::DroppedHitUpperBound => Ok(results.dropped_hit_upper_bound.to_string()),
                Source::DroppedDuplicates => Ok(results.dropped_duplicates.to_string()),
                Source::RejectedRows => Ok(results.rejected_rows.to_string()),
            })
            .collect()
    }
}

/// `average(variance)` for a result column
///
/// Skipped headings and allowed absences render as `None`.
pub fn format_result(
    results: &AnalysisResults,
    field: &str,
    allow_missing: bool,
) -> Result<String, AnalysisError> {
    match (results.average_of.get(field), results.variance_of.get(field)) {
        (Some(average), Some(variance)) => Ok(format!("{}({})", average, variance)),
        (Some(average), None) => Ok(average.to_string()),
        (None, _) if allow_missing || results.headers_to_skip.contains(field) => Ok("None".to_string()),
        (None, _) => Err(AnalysisError::MissingResult(field.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::stats::Aggregate;
    use std::collections::{BTreeMap, BTreeSet};

    fn results() -> AnalysisResults {
        AnalysisResults {
            opts: BTreeMap::from([("configuration".to_string(), "grid".to_string())]),
            headers_to_skip: BTreeSet::from(["WallTime".to_string()]),
            average_of: BTreeMap::from([
                ("Sent".to_string(), Aggregate::Scalar(20.0)),
                ("SentHeatMap".to_string(), Aggregate::Dict(vec![(crate::literal::Key::Int(0), 4.0)])),
            ]),
            variance_of: BTreeMap::from([("Sent".to_string(), Aggregate::Scalar(200.0))]),
            median_of: BTreeMap::new(),
            number_of_repeats: 2,
            num_nodes: 9,
            rejected_rows: 0,
            dropped_no_sink_delivery: 1,
            dropped_hit_upper_bound: 0,
            dropped_duplicates: 0,
        }
    }

    #[test]
    fn test_format_result() {
        let results = results();
        assert_eq!(format_result(&results, "Sent", false).unwrap(), "20.0(200.0)");
        assert_eq!(format_result(&results, "SentHeatMap", false).unwrap(), "{0: 4.0}");
        assert_eq!(format_result(&results, "WallTime", false).unwrap(), "None");
        assert_eq!(format_result(&results, "Collisions", true).unwrap(), "None");
        assert!(matches!(
            format_result(&results, "Received", false),
            Err(AnalysisError::MissingResult(_))
        ));
    }

    #[test]
    fn test_profiles() {
        let protectionless = SummaryProfile::for_algorithm(Algorithm::Protectionless);
        let titles = protectionless.titles();
        assert_eq!(&titles[..3], &["repeats", "num nodes", "configuration"]);
        assert_eq!(titles.last(), Some(&"rejected rows"));
        assert!(!titles.contains(&"fake"));

        let adaptive = SummaryProfile::for_algorithm(Algorithm::Adaptive);
        assert!(adaptive.titles().contains(&"notify"));
        assert!(adaptive.titles().contains(&"fake to fake"));
        assert!(!adaptive.titles().contains(&"tailfs"));

        let spr = SummaryProfile::for_algorithm(Algorithm::AdaptiveSpr);
        assert!(spr.titles().contains(&"tailfs"));

        let options = spr.analyse_options(vec!["NodeWasSource".to_string()], false);
        assert!(options.verify_seeds);
        assert!(options
            .normalised
            .iter()
            .any(|v| v.name() == "norm(norm(FakeSent,TimeTaken),source_rate)"));
    }

    #[test]
    fn test_row_reports_missing_required_result() {
        let profile = SummaryProfile::for_algorithm(Algorithm::Protectionless);
        assert!(matches!(profile.row(&results()), Err(AnalysisError::MissingResult(_))));
    }
}
