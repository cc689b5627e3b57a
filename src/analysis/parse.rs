//! Result-file parser.
//!
//! Reads the option lines, the `#` header and every data row, rejecting
//! individual rows that fail to parse or fail the per-row consistency
//! checks. Surviving rows are filtered and extended with the requested
//! normalised and filtered columns.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

use log::{debug, warn};
use regex::Regex;

use super::{AnalyseOptions, AnalysisError, NormValue, RowError};
use crate::literal::{Literal, LiteralError};
use crate::topology::Topology;

/// Heat maps are bounded by the network size
const HEAT_MAP_HEADINGS: [&str; 2] = ["SentHeatMap", "ReceivedHeatMap"];

/// Columns that must agree between rows sharing a seed
const SEED_CHECK_HEADINGS: [&str; 7] = [
    "Seed",
    "Sent",
    "Received",
    "Delivered",
    "Captured",
    "FirstNormalSentTime",
    "EventCount",
];

/// Energy model, nAh per message
const TX_COST: f64 = 20.0;
const RX_COST: f64 = 8.0;

/// Battery budget per node per day, mAh
const DAILY_ALLOWANCE: f64 = 6.9 - 5.0 * 24.0 * 0.042;

#[derive(Debug, Clone, Copy)]
enum Converter {
    Int,
    Float,
    Bool,
    Literal,
}

impl Converter {
    fn for_heading(heading: &str) -> Self {
        match heading {
            "Seed" | "Sent" | "Received" | "Delivered" | "EventCount" | "UniqueNormalGenerated"
            | "TFS" | "PFS" | "TailFS" | "FakeToNormal" | "FakeToFake" => Converter::Int,
            "ReceiveRatio" | "TimeTaken" | "WallTime" | "NormalLatency"
            | "NormalSinkSourceHops" | "FirstNormalSentTime" => Converter::Float,
            "Captured" | "ReachedSimUpperBound" => Converter::Bool,
            h if h.ends_with("Sent") && h.len() > "Sent".len() => Converter::Int,
            _ => Converter::Literal,
        }
    }

    fn convert(self, cell: &str) -> Result<Literal, LiteralError> {
        let invalid = || LiteralError::InvalidNumber(cell.to_string());
        match self {
            Converter::Int => cell.parse().map(Literal::Int).map_err(|_| invalid()),
            Converter::Float => cell.parse().map(Literal::Float).map_err(|_| invalid()),
            Converter::Bool => match cell {
                "True" => Ok(Literal::Bool(true)),
                "False" => Ok(Literal::Bool(false)),
                _ => Err(invalid()),
            },
            Converter::Literal => cell.parse(),
        }
    }
}

/// One parsed result file
#[derive(Debug, Clone)]
pub struct Analyse {
    pub path: PathBuf,
    pub opts: BTreeMap<String, String>,
    pub attributes: BTreeMap<String, String>,
    /// Headings that were parsed, in file order
    pub headings: Vec<String>,
    pub headers_to_skip: BTreeSet<String>,
    pub num_nodes: usize,
    rows: Vec<Vec<Literal>>,
    normalised: Vec<(String, Vec<Literal>)>,
    filtered: Vec<(String, Vec<Literal>)>,
    pub rejected_rows: usize,
    pub dropped_no_sink_delivery: usize,
    pub dropped_hit_upper_bound: usize,
    pub dropped_duplicates: usize,
}

impl Analyse {
    pub fn from_path(path: &Path, options: &AnalyseOptions) -> Result<Self, AnalysisError> {
        let file = File::open(path).map_err(|source| AnalysisError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let reader = BufReader::with_capacity(64 * 1024, file);

        Self::from_reader(path, reader, options)
    }

    pub fn from_reader<R: BufRead>(
        path: &Path,
        reader: R,
        options: &AnalyseOptions,
    ) -> Result<Self, AnalysisError> {
        let mut opts = BTreeMap::new();
        let mut attributes = BTreeMap::new();
        let mut all_headings: Option<Vec<String>> = None;
        let mut data_lines: Vec<(usize, String)> = Vec::new();

        for (index, line) in reader.lines().enumerate() {
            let line = line.map_err(|source| AnalysisError::Io {
                path: path.to_path_buf(),
                source,
            })?;
            let line = line.trim_end();
            let line_no = index + 1;

            if line.is_empty() {
                continue;
            }

            if all_headings.is_some() {
                if line.starts_with('@') {
                    return Err(AnalysisError::MetadataAfterHeader(path.to_path_buf()));
                }
                if line.starts_with('#') {
                    warn!("{}:{}: ignoring repeated header line", path.display(), line_no);
                    continue;
                }
                data_lines.push((line_no, line.to_string()));
            } else if let Some(header) = line.strip_prefix('#') {
                all_headings = Some(header.split('|').map(str::to_string).collect());
            } else if let Some(attribute) = line.strip_prefix('@') {
                match attribute.split_once(':') {
                    Some((k, v)) => {
                        attributes.insert(k.to_string(), v.to_string());
                    }
                    None => warn!("{}:{}: malformed attribute line", path.display(), line_no),
                }
            } else if let Some((k, v)) = line.split_once('=') {
                opts.insert(k.to_string(), v.to_string());
            } else {
                warn!("{}:{}: skipping unrecognised line '{}'", path.display(), line_no, line);
            }
        }

        let all_headings = all_headings.ok_or_else(|| AnalysisError::EmptyFile(path.to_path_buf()))?;
        if data_lines.is_empty() {
            return Err(AnalysisError::EmptyFile(path.to_path_buf()));
        }

        let skip_patterns = compile_skip_patterns(&options.headers_to_skip)?;
        let headers_to_skip: BTreeSet<String> = all_headings
            .iter()
            .filter(|h| skip_patterns.iter().any(|p| p.is_match(h)))
            .cloned()
            .collect();
        let kept: Vec<usize> = (0..all_headings.len())
            .filter(|&i| !headers_to_skip.contains(&all_headings[i]))
            .collect();
        let headings: Vec<String> = kept.iter().map(|&i| all_headings[i].clone()).collect();
        let converters: Vec<Converter> = headings.iter().map(|h| Converter::for_heading(h)).collect();

        let num_nodes = network_size(&opts)?;

        let mut analyse = Self {
            path: path.to_path_buf(),
            opts,
            attributes,
            headings,
            headers_to_skip,
            num_nodes,
            rows: Vec::with_capacity(data_lines.len()),
            normalised: Vec::new(),
            filtered: Vec::new(),
            rejected_rows: 0,
            dropped_no_sink_delivery: 0,
            dropped_hit_upper_bound: 0,
            dropped_duplicates: 0,
        };

        for (line_no, line) in &data_lines {
            let row = analyse
                .parse_row(line, all_headings.len(), &kept, &converters)
                .and_then(|row| analyse.check_consistent(&row).map(|_| row));

            match row {
                Ok(row) => analyse.rows.push(row),
                Err(e) => {
                    warn!("{}:{}: rejected row: {}", path.display(), line_no, e);
                    analyse.rejected_rows += 1;
                }
            }
        }

        if analyse.rows.is_empty() {
            return Err(AnalysisError::EmptyFile(path.to_path_buf()));
        }

        analyse.filter_rows(options)?;
        analyse.normalise(options)?;
        analyse.filter_columns(options)?;

        debug!(
            "Parsed {}: {} rows, {} rejected",
            path.display(),
            analyse.rows.len(),
            analyse.rejected_rows
        );

        Ok(analyse)
    }

    fn parse_row(
        &self,
        line: &str,
        expected: usize,
        kept: &[usize],
        converters: &[Converter],
    ) -> Result<Vec<Literal>, RowError> {
        let cells: Vec<&str> = line.split('|').collect();
        if cells.len() != expected {
            return Err(RowError::FieldCount { expected, found: cells.len() });
        }

        kept.iter()
            .zip(converters)
            .zip(&self.headings)
            .map(|((&i, converter), heading)| {
                converter.convert(cells[i]).map_err(|source| RowError::Value {
                    heading: heading.clone(),
                    source,
                })
            })
            .collect()
    }

    fn check_consistent(&self, row: &[Literal]) -> Result<(), RowError> {
        for heading in HEAT_MAP_HEADINGS {
            if let Some(value) = self.index(heading).map(|i| &row[i]) {
                let entries = value.as_dict().ok_or_else(|| RowError::HeatMapNotDict {
                    heading: heading.to_string(),
                })?;
                if entries.len() > self.num_nodes {
                    return Err(RowError::HeatMapTooLarge {
                        heading: heading.to_string(),
                        size: entries.len(),
                        num_nodes: self.num_nodes,
                    });
                }
            }
        }

        if let (Some(c), Some(d)) = (self.index("Captured"), self.index("AttackerDistance")) {
            let captured = row[c].as_bool().unwrap_or(false);
            let any_at_source = row[d].numbers().iter().any(|x| x.abs() <= 1e-9);
            if captured != any_at_source {
                return Err(RowError::CapturedMismatch {
                    captured,
                    distances: row[d].to_string(),
                });
            }
        }

        if let Some(latency) = self.index("NormalLatency").and_then(|i| row[i].as_f64()) {
            if latency.is_nan() {
                return Err(RowError::LatencyNan);
            }
            if latency <= 0.0 {
                return Err(RowError::LatencyNotPositive(latency));
            }
        }

        Ok(())
    }

    fn filter_rows(&mut self, options: &AnalyseOptions) -> Result<(), AnalysisError> {
        let delivery: Vec<usize> = ["NormalLatency", "FirstNormalSentTime"]
            .iter()
            .filter_map(|h| self.index(h))
            .collect();
        let before = self.rows.len();
        self.rows.retain(|row| {
            delivery
                .iter()
                .all(|&i| row[i].as_f64().map_or(true, f64::is_finite))
        });
        self.dropped_no_sink_delivery = before - self.rows.len();
        if self.rows.is_empty() {
            return Err(AnalysisError::AllRowsRemoved {
                path: self.path.clone(),
                reason: "no message reached the sink",
            });
        }

        if !options.keep_if_hit_upper_time_bound {
            if let Some(i) = self.index("ReachedSimUpperBound") {
                let before = self.rows.len();
                self.rows.retain(|row| row[i].as_bool() != Some(true));
                self.dropped_hit_upper_bound = before - self.rows.len();
                if self.rows.is_empty() {
                    return Err(AnalysisError::AllRowsRemoved {
                        path: self.path.clone(),
                        reason: "every run hit the upper time bound",
                    });
                }
            }
        }

        if options.verify_seeds {
            self.remove_duplicate_seeds()?;
        }

        Ok(())
    }

    /// Rows repeating a seed must match the first row with that seed
    fn remove_duplicate_seeds(&mut self) -> Result<(), AnalysisError> {
        let Some(seed_index) = self.index("Seed") else {
            return Ok(());
        };
        let checked: Vec<(usize, &str)> = SEED_CHECK_HEADINGS
            .iter()
            .filter_map(|h| self.index(h).map(|i| (i, *h)))
            .collect();

        let mut first_with_seed: HashMap<String, usize> = HashMap::new();
        let mut keep = vec![true; self.rows.len()];

        for (row_index, row) in self.rows.iter().enumerate() {
            let seed = row[seed_index].to_string();
            match first_with_seed.get(&seed) {
                None => {
                    first_with_seed.insert(seed, row_index);
                }
                Some(&first) => {
                    if let Some((_, column)) =
                        checked.iter().find(|(i, _)| self.rows[first][*i] != row[*i])
                    {
                        return Err(AnalysisError::DifferingSeeds {
                            seed,
                            column: column.to_string(),
                        });
                    }
                    keep[row_index] = false;
                }
            }
        }

        self.dropped_duplicates = keep.iter().filter(|k| !**k).count();
        let mut keep = keep.into_iter();
        self.rows.retain(|_| keep.next().unwrap_or(true));
        Ok(())
    }

    fn normalise(&mut self, options: &AnalyseOptions) -> Result<(), AnalysisError> {
        for value in &options.normalised {
            for (num, den) in value.pairs() {
                let name = NormValue::pair(num.clone(), den.clone()).name();
                if self.index(&name).is_some() || self.normalised.iter().any(|(n, _)| *n == name) {
                    continue;
                }

                let column = (0..self.rows.len())
                    .map(|row| -> Result<Literal, AnalysisError> {
                        let a = self.value_at(&num.name(), row)?;
                        if matches!(den, NormValue::Name(n) if n == "1") {
                            return Ok(Literal::Float(a));
                        }
                        let b = self.value_at(&den.name(), row)?;
                        Ok(Literal::Float(a / b))
                    })
                    .collect::<Result<Vec<_>, AnalysisError>>()?;

                self.normalised.push((name, column));
            }
        }
        Ok(())
    }

    fn filter_columns(&mut self, options: &AnalyseOptions) -> Result<(), AnalysisError> {
        for value in &options.filtered {
            let NormValue::Pair(values, condition) = value else {
                return Err(AnalysisError::UnknownValue(value.filtered_name()));
            };

            let mut column = Vec::new();
            for row in 0..self.rows.len() {
                let keep = self.value_at(&condition.name(), row)?;
                if keep != 0.0 && !keep.is_nan() {
                    column.push(Literal::Float(self.value_at(&values.name(), row)?));
                }
            }

            self.filtered.push((value.filtered_name(), column));
        }
        Ok(())
    }

    /// Numeric value of `name` for one row. Missing cells are nan.
    ///
    /// Looked up as a normalised column, a parsed column, a constant, a
    /// value calculated from the row, a numeric literal and finally an
    /// option.
    fn value_at(&self, name: &str, row: usize) -> Result<f64, AnalysisError> {
        if let Some((_, column)) = self.normalised.iter().find(|(n, _)| n == name) {
            return Ok(column[row].as_f64().unwrap_or(f64::NAN));
        }
        if self.index(name).is_some() || self.headers_to_skip.contains(name) {
            return Ok(self.cell(name, row));
        }
        if let Some(constant) = self.constant(name)? {
            return Ok(constant);
        }
        if let Some(calculated) = self.calculated(name, row) {
            return Ok(calculated);
        }
        if let Ok(number) = name.parse::<f64>() {
            return Ok(number);
        }
        self.opts
            .get(name)
            .and_then(|v| v.parse::<f64>().ok())
            .ok_or_else(|| AnalysisError::UnknownValue(name.to_string()))
    }

    fn cell(&self, heading: &str, row: usize) -> f64 {
        self.index(heading)
            .and_then(|i| self.rows[row][i].as_f64())
            .unwrap_or(f64::NAN)
    }

    fn constant(&self, name: &str) -> Result<Option<f64>, AnalysisError> {
        let value = match name {
            "1" => 1.0,
            "num_nodes" => self.num_nodes as f64,
            "num_sources" => self.num_sources()?,
            "source_period" => self.source_period()?,
            "source_rate" => 1.0 / self.source_period()?,
            "source_period_per_num_sources" => self.source_period()? / self.num_sources()?,
            "source_rate_per_num_sources" => 1.0 / self.source_period()? / self.num_sources()?,
            _ => return Ok(None),
        };
        Ok(Some(value))
    }

    fn calculated(&self, name: &str, row: usize) -> Option<f64> {
        match name {
            "energy_impact" => Some(self.energy_impact(row)),
            "daily_allowance_used" => {
                let per_node_per_second =
                    (self.energy_impact(row) / self.num_nodes as f64) / self.cell("TimeTaken", row);
                let per_day = per_node_per_second * 86_400.0 * 0.042;
                Some(per_day / DAILY_ALLOWANCE * 100.0)
            }
            "time_after_first_normal" => {
                Some(self.cell("TimeTaken", row) - self.cell("FirstNormalSentTime", row))
            }
            _ => None,
        }
    }

    /// Radio energy spent by the whole network, mAh
    fn energy_impact(&self, row: usize) -> f64 {
        let delivered = if self.index("Delivered").is_some() {
            self.cell("Delivered", row)
        } else {
            self.cell("Received", row)
        };
        (self.cell("Sent", row) * TX_COST + delivered * RX_COST) / 1_000_000.0
    }

    fn source_period(&self) -> Result<f64, AnalysisError> {
        self.opts
            .get("source_period")
            .and_then(|v| v.parse().ok())
            .ok_or_else(|| AnalysisError::MissingOption("source_period".to_string()))
    }

    fn num_sources(&self) -> Result<f64, AnalysisError> {
        if let Some(n) = self.opts.get("num_sources").and_then(|v| v.parse().ok()) {
            return Ok(n);
        }
        match self.opts.get("source_ids").map(|v| v.parse::<Literal>()) {
            Some(Ok(Literal::List(ids))) | Some(Ok(Literal::Tuple(ids))) => Ok(ids.len() as f64),
            _ => Err(AnalysisError::MissingOption("num_sources".to_string())),
        }
    }

    fn index(&self, heading: &str) -> Option<usize> {
        self.headings.iter().position(|h| h == heading)
    }

    pub fn number_of_repeats(&self) -> usize {
        self.rows.len()
    }

    /// A parsed, normalised or filtered column
    pub fn column(&self, name: &str) -> Option<Vec<Literal>> {
        if let Some(i) = self.index(name) {
            return Some(self.rows.iter().map(|row| row[i].clone()).collect());
        }
        self.normalised
            .iter()
            .chain(&self.filtered)
            .find(|(n, _)| n == name)
            .map(|(_, column)| column.clone())
    }

    /// Every column in order: parsed, then normalised, then filtered
    pub fn columns(&self) -> Vec<(String, Vec<Literal>)> {
        let mut columns: Vec<(String, Vec<Literal>)> = self
            .headings
            .iter()
            .enumerate()
            .map(|(i, h)| (h.clone(), self.rows.iter().map(|row| row[i].clone()).collect()))
            .collect();
        columns.extend(self.normalised.iter().cloned());
        columns.extend(self.filtered.iter().cloned());
        columns
    }

    pub fn is_filtered_column(&self, name: &str) -> bool {
        self.filtered.iter().any(|(n, _)| n == name)
    }

    /// When the file was written, from the `@date:` attribute
    pub fn created(&self) -> Option<chrono::DateTime<chrono::FixedOffset>> {
        self.attributes
            .get("date")
            .and_then(|d| chrono::DateTime::parse_from_rfc3339(d).ok())
    }
}

fn compile_skip_patterns(patterns: &[String]) -> Result<Vec<Regex>, AnalysisError> {
    patterns
        .iter()
        .map(|pattern| {
            Regex::new(&format!("^(?:{})$", pattern)).map_err(|source| {
                AnalysisError::InvalidSkipPattern {
                    pattern: pattern.clone(),
                    source,
                }
            })
        })
        .collect()
}

/// Number of nodes, from `num_nodes` or rebuilt from the topology options
fn network_size(opts: &BTreeMap<String, String>) -> Result<usize, AnalysisError> {
    if let Some(n) = opts.get("num_nodes").and_then(|v| v.parse().ok()) {
        return Ok(n);
    }
    Topology::from_opts(opts)
        .map(|t| t.size())
        .map_err(|_| AnalysisError::MissingOption("num_nodes".to_string()))
}
