//! On-disk cache of per-file analysis results.
//!
//! Stored next to the result file as `<name>.cache`: bincode, zstd
//! compressed. An entry is reused only when it is newer than the result
//! file and was produced with the same analysis options.

use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};

use color_eyre::eyre::{Context, Result};
use log::debug;
use serde::{Deserialize, Serialize};

use super::{AnalyseOptions, AnalysisResults};

const COMPRESSION_LEVEL: i32 = 3;

#[derive(Serialize, Deserialize)]
struct CacheEntry {
    options: AnalyseOptions,
    results: AnalysisResults,
}

pub fn cache_path(result_path: &Path) -> PathBuf {
    result_path.with_extension("cache")
}

/// Cached results for `result_path`, if still valid
pub fn load(result_path: &Path, options: &AnalyseOptions) -> Option<AnalysisResults> {
    let cache = cache_path(result_path);

    let result_modified = result_path.metadata().and_then(|m| m.modified()).ok()?;
    let cache_modified = cache.metadata().and_then(|m| m.modified()).ok()?;
    if cache_modified <= result_modified {
        debug!("Cache {} is older than its result file", cache.display());
        return None;
    }

    match read_entry(&cache) {
        Ok(entry) if entry.options == *options => Some(entry.results),
        Ok(_) => {
            debug!("Cache {} was built with different options", cache.display());
            None
        }
        Err(e) => {
            debug!("Ignoring unreadable cache {}: {:#}", cache.display(), e);
            None
        }
    }
}

fn read_entry(cache: &Path) -> Result<CacheEntry> {
    let file = File::open(cache).with_context(|| format!("Failed to open {}", cache.display()))?;
    let decoder = zstd::Decoder::new(file).context("Failed to start zstd decoder")?;
    bincode::deserialize_from(decoder).context("Failed to decode cache entry")
}

pub fn store(result_path: &Path, options: &AnalyseOptions, results: &AnalysisResults) -> Result<()> {
    let cache = cache_path(result_path);
    let file = File::create(&cache)
        .with_context(|| format!("Failed to create cache file: {}", cache.display()))?;

    let mut encoder = zstd::Encoder::new(BufWriter::new(file), COMPRESSION_LEVEL)
        .context("Failed to start zstd encoder")?;
    let entry = CacheEntry {
        options: options.clone(),
        results: results.clone(),
    };
    bincode::serialize_into(&mut encoder, &entry)
        .with_context(|| format!("Failed to write cache file: {}", cache.display()))?;
    encoder
        .finish()
        .with_context(|| format!("Failed to finish cache file: {}", cache.display()))?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::Analyse;
    use std::thread::sleep;
    use std::time::Duration;
    use tempfile::TempDir;

    const FILE: &str = "num_nodes=9\n#Seed|Sent|NormalLatency|SentHeatMap\n1|10|2.0|{0: 2}\n2|30|4.0|{0: 4}\n";

    #[test]
    fn test_store_and_load() {
        let dir = TempDir::new().unwrap();
        let result_path = dir.path().join("run.txt");
        std::fs::write(&result_path, FILE).unwrap();

        let options = AnalyseOptions::default();
        let results = AnalysisResults::new(&Analyse::from_path(&result_path, &options).unwrap());

        assert!(load(&result_path, &options).is_none());

        sleep(Duration::from_millis(20));
        store(&result_path, &options, &results).unwrap();
        assert_eq!(cache_path(&result_path), dir.path().join("run.cache"));
        assert_eq!(load(&result_path, &options), Some(results));

        let other = AnalyseOptions { keep_if_hit_upper_time_bound: true, ..Default::default() };
        assert!(load(&result_path, &other).is_none());
    }
}
