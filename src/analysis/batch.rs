//! Batch summarisation of a directory of result files.
//!
//! Files are analysed in parallel on the global rayon pool. Results are
//! collected on the calling thread, which reports progress as each file
//! finishes and writes the summary rows in sorted file order.

use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::mpsc;

use color_eyre::eyre::{Context, Result};
use log::{debug, error, info, warn};
use rayon::prelude::*;

use super::progress::Progress;
use super::{cache, Analyse, AnalyseOptions, AnalysisError, AnalysisResults, SummaryProfile};

/// Outcome counts of one batch
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchReport {
    pub written: usize,
    pub empty: usize,
    pub failed: usize,
}

pub struct BatchAnalyzer {
    profile: SummaryProfile,
    options: AnalyseOptions,
}

impl BatchAnalyzer {
    pub fn new(profile: SummaryProfile, options: AnalyseOptions) -> Self {
        Self { profile, options }
    }

    /// Analyse one file, reusing its cache entry unless `flush` is set
    pub fn analyse_path(&self, path: &Path, flush: bool) -> Result<AnalysisResults, AnalysisError> {
        if !flush {
            if let Some(results) = cache::load(path, &self.options) {
                debug!("Using cached results for {}", path.display());
                return Ok(results);
            }
        }

        let analysis = Analyse::from_path(path, &self.options)?;
        let results = AnalysisResults::new(&analysis);

        if let Err(e) = cache::store(path, &self.options, &results) {
            warn!("Failed to cache results for {}: {:#}", path.display(), e);
        }

        Ok(results)
    }

    /// Summary cells for one file
    pub fn summarise_path(&self, path: &Path, flush: bool) -> Result<Vec<String>, AnalysisError> {
        info!("Analysing {}", path.display());

        let results = self.analyse_path(path, flush)?;
        if results.number_of_repeats == 0 {
            return Err(AnalysisError::EmptyFile(path.to_path_buf()));
        }

        self.profile.row(&results)
    }

    /// Summarise every result file in `results_dir` into `summary_file`
    pub fn run(
        &self,
        results_dir: &Path,
        summary_file: &Path,
        flush: bool,
        json_file: Option<&Path>,
    ) -> Result<BatchReport> {
        let files = result_files(results_dir, summary_file)?;
        info!("Found {} result files in {}", files.len(), results_dir.display());

        let progress = Progress::start("analysing file", files.len());
        let mut report = BatchReport::default();
        let mut rows: BTreeMap<PathBuf, Vec<String>> = BTreeMap::new();

        let (tx, rx) = mpsc::channel();
        std::thread::scope(|scope| {
            let files = &files;
            scope.spawn(move || {
                files.par_iter().for_each_with(tx, |tx, path| {
                    // Receiver outlives the pool
                    let _ = tx.send((path.clone(), self.summarise_path(path, flush)));
                });
            });

            for (done, (path, result)) in rx.iter().enumerate() {
                match result {
                    Ok(row) => {
                        rows.insert(path, row);
                    }
                    Err(AnalysisError::EmptyFile(_)) => {
                        warn!("Skipping empty file {}", path.display());
                        report.empty += 1;
                    }
                    Err(e) => {
                        error!("Error processing {} with {}", path.display(), e);
                        report.failed += 1;
                    }
                }
                progress.report(done + 1);
            }
        });

        self.write_summary(summary_file, &rows)?;
        if let Some(json_file) = json_file {
            self.write_json(json_file, &rows)?;
        }
        report.written = rows.len();

        info!("Finished writing {}", summary_file.display());
        Ok(report)
    }

    fn write_summary(&self, summary_file: &Path, rows: &BTreeMap<PathBuf, Vec<String>>) -> Result<()> {
        let file = File::create(summary_file)
            .with_context(|| format!("Failed to create summary file: {}", summary_file.display()))?;
        let mut out = BufWriter::new(file);

        writeln!(out, "{}", self.profile.header_line())?;
        for row in rows.values() {
            writeln!(out, "{}", row.join("|"))?;
        }
        out.flush()
            .with_context(|| format!("Failed to write summary file: {}", summary_file.display()))?;

        Ok(())
    }

    fn write_json(&self, json_file: &Path, rows: &BTreeMap<PathBuf, Vec<String>>) -> Result<()> {
        let titles = self.profile.titles();
        let records: Vec<serde_json::Value> = rows
            .iter()
            .map(|(path, row)| {
                let values: serde_json::Map<String, serde_json::Value> = titles
                    .iter()
                    .zip(row)
                    .map(|(title, cell)| (title.to_string(), serde_json::Value::String(cell.clone())))
                    .collect();
                serde_json::json!({
                    "file": path.display().to_string(),
                    "algorithm": self.profile.algorithm().name(),
                    "results": values,
                })
            })
            .collect();

        let json = serde_json::to_string_pretty(&records).context("Failed to serialize summary to JSON")?;
        fs::write(json_file, json)
            .with_context(|| format!("Failed to write JSON summary to {}", json_file.display()))?;

        info!("JSON summary written to {}", json_file.display());
        Ok(())
    }
}

/// Result files (`*.txt`) in `dir`, sorted, excluding the summary itself
pub fn result_files(dir: &Path, summary_file: &Path) -> Result<Vec<PathBuf>> {
    let summary = summary_file.canonicalize().ok();

    let mut files = Vec::new();
    for entry in fs::read_dir(dir).with_context(|| format!("Failed to read {}", dir.display()))? {
        let path = entry?.path();
        if !path.is_file() || path.extension().map_or(true, |e| e != "txt") {
            continue;
        }
        if summary.is_some() && path.canonicalize().ok() == summary {
            continue;
        }
        files.push(path);
    }

    files.sort();
    Ok(files)
}
