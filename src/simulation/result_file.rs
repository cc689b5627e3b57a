//! Run-result file writer.
//!
//! Layout, one file per configuration:
//!
//! ```text
//! configuration=grid
//! network_size=11
//! ...
//! @date:2024-05-01T10:00:00+00:00
//! #Seed|Sent|Received|...
//! 44|1200|9800|...
//! ```

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use color_eyre::eyre::{Context, Result};
use log::info;

use super::RunOutcome;
use crate::attacker::AttackerSpec;
use crate::config::RunConfig;
use crate::literal::format_float;
use crate::metrics::FieldTable;
use crate::topology::{Layout, Network};

/// Options echoed at the top of a result file
pub fn result_options(
    config: &RunConfig,
    network: &Network,
    specs: &[AttackerSpec],
) -> Vec<(String, String)> {
    let general = &config.general;
    let mut opts: Vec<(String, String)> = Vec::new();
    let mut push = |k: &str, v: String| opts.push((k.to_string(), v));

    push("algorithm", general.algorithm.to_string());
    push("configuration", network.topology.layout().name().to_string());
    match network.topology.layout() {
        Layout::Grid { network_size, distance } | Layout::Line { network_size, distance } => {
            push("network_size", network_size.to_string());
            push("distance", format_float(*distance));
        }
        Layout::Explicit { .. } => {}
    }
    push("num_nodes", network.size().to_string());
    push("sink_ids", id_list(network.sink_ids.iter()));
    push("source_ids", id_list(network.source_ids.iter()));
    push("num_sources", network.source_ids.len().to_string());
    // Closest sink-source pair, usable as a normalisation option
    push("ssd_meters", network.min_ssd_meters().map_or_else(|| "None".to_string(), format_float));
    push("ssd_hops", network.min_ssd_hops().map_or_else(|| "None".to_string(), |h| h.to_string()));
    push("source_period", format_float(general.source_period));
    push(
        "safety_period",
        config
            .effective_safety_period()
            .map_or_else(|| "None".to_string(), format_float),
    );
    push("safety_factor", format_float(general.safety_factor));
    push(
        "attacker_model",
        specs.iter().map(ToString::to_string).collect::<Vec<_>>().join(";"),
    );
    push("seed", general.seed.to_string());

    opts
}

fn id_list<'a>(ids: impl Iterator<Item = &'a u32>) -> String {
    format!("[{}]", ids.map(ToString::to_string).collect::<Vec<_>>().join(", "))
}

/// Write all repeats of a configuration to `path`
pub fn write_result_file(
    path: &Path,
    opts: &[(String, String)],
    fields: &FieldTable,
    outcomes: &[RunOutcome],
) -> Result<()> {
    let file = File::create(path)
        .with_context(|| format!("Failed to create result file: {}", path.display()))?;
    let mut out = BufWriter::new(file);

    write_results(&mut out, opts, fields, outcomes)
        .and_then(|_| out.flush())
        .with_context(|| format!("Failed to write result file: {}", path.display()))?;

    info!("Wrote {} repeats to {}", outcomes.len(), path.display());

    Ok(())
}

fn write_results<W: Write>(
    out: &mut W,
    opts: &[(String, String)],
    fields: &FieldTable,
    outcomes: &[RunOutcome],
) -> std::io::Result<()> {
    for (key, value) in opts {
        writeln!(out, "{}={}", key, value)?;
    }
    writeln!(out, "@date:{}", chrono::Utc::now().to_rfc3339())?;
    writeln!(out, "{}", fields.header_line())?;
    for outcome in outcomes {
        writeln!(out, "{}", fields.row(outcome))?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_result_options() {
        let config: RunConfig = serde_yaml::from_str(
            "general:\n  algorithm: periodic\n  seed: 7\n  source_period: 0.25\ntopology:\n  kind: grid\n  network_size: 3\n  distance: 4.5\nsink_ids: [4]\nsource_ids: [0, 8]\n",
        )
        .unwrap();
        let network = config.network().unwrap();
        let specs = config.attacker_specs().unwrap();

        let opts = result_options(&config, &network, &specs);
        let get = |k: &str| opts.iter().find(|(key, _)| key == k).map(|(_, v)| v.as_str());

        assert_eq!(get("configuration"), Some("grid"));
        assert_eq!(get("network_size"), Some("3"));
        assert_eq!(get("num_nodes"), Some("9"));
        assert_eq!(get("source_ids"), Some("[0, 8]"));
        assert_eq!(get("num_sources"), Some("2"));
        assert_eq!(get("ssd_hops"), Some("2"));
        assert_eq!(get("source_period"), Some("0.25"));
        assert_eq!(get("safety_period"), Some("None"));
        assert_eq!(get("attacker_model"), Some("SeqNosReactiveAttacker()"));
    }
}
