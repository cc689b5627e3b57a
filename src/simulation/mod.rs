//! Event log replay.
//!
//! A `Simulation` owns one repeat: its attackers, its metrics aggregator and
//! the simulated clock. Lines from the simulator are fed in order until the
//! continuation predicate fails, either because an attacker reached a
//! source or because the safety period elapsed.

pub mod result_file;

use std::collections::BTreeMap;
use std::io::BufRead;
use std::path::{Path, PathBuf};
use std::time::Instant;

use color_eyre::eyre::{Context, Result};
use log::{debug, info, warn};
use rayon::prelude::*;

pub use result_file::{result_options, write_result_file};

use crate::attacker::{Attacker, AttackerSpec};
use crate::config::RunConfig;
use crate::event::{log_parser, Channel, Clock, EventError, EventRecord, SimTime};
use crate::metrics::{MetricsAggregator, MetricsError, MetricsSnapshot};
use crate::topology::{Network, NodeId};

/// Errors that abort a repeat
#[derive(Debug, thiserror::Error)]
pub enum SimulationError {
    #[error("Event log line {line}: {source}")]
    Event {
        line: usize,
        #[source]
        source: EventError,
    },

    #[error("Event log line {line}: {source}")]
    Metrics {
        line: usize,
        #[source]
        source: MetricsError,
    },

    #[error("Failed to read event log: {0}")]
    Io(#[from] std::io::Error),
}

/// Everything written to the result file for one repeat
#[derive(Debug, Clone)]
pub struct RunOutcome {
    pub seed: u64,
    pub captured: bool,
    pub reached_upper_bound: bool,
    pub time_taken: SimTime,
    pub wall_time: f64,
    pub event_count: u64,
    /// `(source_id, attacker_id) -> meters`
    pub attacker_distance: BTreeMap<(NodeId, u32), f64>,
    /// `(sink_id, attacker_id) -> meters`
    pub attacker_sink_distance: BTreeMap<(NodeId, u32), f64>,
    pub attacker_moves: BTreeMap<u32, u32>,
    pub attacker_moves_in_response_to: BTreeMap<u32, BTreeMap<String, u32>>,
    pub metrics: MetricsSnapshot,
}

/// Why the replay stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    Captured,
    SafetyPeriod,
    EndOfLog,
}

pub struct Simulation<'a> {
    network: &'a Network,
    clock: Clock,
    seed: u64,
    attackers: Vec<Attacker>,
    metrics: MetricsAggregator,
    sim_time: SimTime,
    event_count: u64,
    safety_period: Option<SimTime>,
    upper_bound: SimTime,
    lines_read: usize,
}

impl<'a> Simulation<'a> {
    pub fn new(config: &RunConfig, network: &'a Network, specs: &[AttackerSpec], seed: u64) -> Self {
        let metrics = MetricsAggregator::new(
            network.sink_ids.clone(),
            network.source_ids.clone(),
            &config.general.algorithm.extensions(),
        );

        let default_start = network.first_sink().unwrap_or(0);
        let attackers = specs
            .iter()
            .enumerate()
            .map(|(ident, spec)| {
                let mut attacker = Attacker::new(ident, spec.clone());
                attacker.setup(spec.start.unwrap_or(default_start), metrics.source_ids());
                attacker
            })
            .collect();

        Self {
            network,
            clock: config.clock(),
            seed,
            attackers,
            metrics,
            sim_time: 0.0,
            event_count: 0,
            safety_period: config.effective_safety_period(),
            upper_bound: config.upper_time_bound(network.size()),
            lines_read: 0,
        }
    }

    pub fn any_attacker_found_source(&self) -> bool {
        self.attackers.iter().any(Attacker::found_source)
    }

    /// Whether the run should carry on
    pub fn continue_predicate(&self) -> bool {
        !self.any_attacker_found_source() && !self.safety_period_elapsed(self.sim_time)
    }

    fn safety_period_elapsed(&self, time: SimTime) -> bool {
        self.safety_period.is_some_and(|period| time >= period)
    }

    pub fn sim_time(&self) -> SimTime {
        self.sim_time
    }

    pub fn attackers(&self) -> &[Attacker] {
        &self.attackers
    }

    pub fn metrics(&self) -> &MetricsAggregator {
        &self.metrics
    }

    /// Feed one raw log line
    ///
    /// Blank lines, comments and lines without a channel tag are skipped,
    /// as are unknown channels. A malformed payload on a known channel is
    /// an error. Returns `false` when the line was past the safety period
    /// and so never happened.
    pub fn process_line(&mut self, line: &str) -> Result<bool, SimulationError> {
        self.lines_read += 1;
        let line_no = self.lines_read;

        let Some(raw) = log_parser::split_channel(line) else {
            return Ok(true);
        };

        let channel: Channel = match raw.channel.parse() {
            Ok(channel) => channel,
            Err(e) => {
                warn!("Skipping line {}: {}", line_no, e);
                return Ok(true);
            }
        };

        // Free text that is not a node notification carries no event
        if matches!(channel, Channel::Debug | Channel::FakeNotification)
            && log_parser::parse_notification(raw.payload).is_none()
        {
            return Ok(true);
        }

        let record = EventRecord::parse(channel, raw.payload, &self.clock)
            .map_err(|source| SimulationError::Event { line: line_no, source })?;

        if let Some(time) = record.time() {
            if self.safety_period_elapsed(time) {
                return Ok(false);
            }
            self.sim_time = self.sim_time.max(time);
        }

        self.dispatch(&record)
            .map_err(|source| SimulationError::Metrics { line: line_no, source })?;
        self.event_count += 1;

        Ok(true)
    }

    fn dispatch(&mut self, record: &EventRecord) -> Result<(), MetricsError> {
        match record {
            EventRecord::AttackerReceive(hint) => {
                // A node can only overhear a sender within radio range
                if !self.network.topology.are_neighbours(hint.node_id, hint.proximate_id) {
                    warn!(
                        "Ignoring attacker hint at {}: {} is not a neighbour",
                        hint.node_id, hint.proximate_id
                    );
                    return Ok(());
                }
                let sources = self.metrics.source_ids();
                for attacker in &mut self.attackers {
                    attacker.process(hint, sources);
                }
            }
            EventRecord::SourceChange(_) => {
                self.metrics.process(record, self.sim_time)?;
                let sources = self.metrics.source_ids();
                for attacker in &mut self.attackers {
                    attacker.refresh_found_source(sources);
                }
            }
            _ => self.metrics.process(record, self.sim_time)?,
        }
        Ok(())
    }

    /// Replay lines until the continuation predicate fails or the log ends
    pub fn run<R: BufRead>(&mut self, reader: R) -> Result<StopReason, SimulationError> {
        let mut lines = reader.lines();

        while self.continue_predicate() {
            let Some(line) = lines.next() else {
                return Ok(StopReason::EndOfLog);
            };

            if !self.process_line(&line?)? {
                if let Some(period) = self.safety_period {
                    self.sim_time = period;
                }
                return Ok(StopReason::SafetyPeriod);
            }
        }

        if self.any_attacker_found_source() {
            Ok(StopReason::Captured)
        } else {
            Ok(StopReason::SafetyPeriod)
        }
    }

    /// Collect the row for this repeat
    ///
    /// Attacker distances are measured against the live sources only, so a
    /// zero distance always means a capture. With no live source the map
    /// is empty.
    pub fn outcome(&self, wall_time: f64) -> RunOutcome {
        let topology = &self.network.topology;
        let sources = self.metrics.source_ids();

        let mut attacker_distance = BTreeMap::new();
        let mut attacker_sink_distance = BTreeMap::new();
        let mut attacker_moves = BTreeMap::new();
        let mut attacker_moves_in_response_to = BTreeMap::new();

        for attacker in &self.attackers {
            let ident = attacker.ident() as u32;
            let position = attacker.position();

            for &source in sources {
                if let Ok(d) = topology.distance_meters(source, position) {
                    attacker_distance.insert((source, ident), d);
                }
            }
            for &sink in &self.network.sink_ids {
                if let Ok(d) = topology.distance_meters(sink, position) {
                    attacker_sink_distance.insert((sink, ident), d);
                }
            }
            attacker_moves.insert(ident, attacker.moves());
            attacker_moves_in_response_to.insert(ident, attacker.moves_in_response_to().clone());
        }

        RunOutcome {
            seed: self.seed,
            captured: self.any_attacker_found_source(),
            reached_upper_bound: self.sim_time >= self.upper_bound,
            time_taken: self.sim_time,
            wall_time,
            event_count: self.event_count,
            attacker_distance,
            attacker_sink_distance,
            attacker_moves,
            attacker_moves_in_response_to,
            metrics: self.metrics.finalize(),
        }
    }
}

/// Replay one event log as the repeat with the given seed
pub fn replay_file(
    config: &RunConfig,
    network: &Network,
    specs: &[AttackerSpec],
    seed: u64,
    path: &Path,
) -> Result<RunOutcome> {
    let reader = log_parser::open_event_log(path)?;
    let start = Instant::now();

    let mut simulation = Simulation::new(config, network, specs, seed);
    let reason = simulation
        .run(reader)
        .with_context(|| format!("Replay of {} failed", path.display()))?;

    let outcome = simulation.outcome(start.elapsed().as_secs_f64());
    debug!(
        "Replayed {} (seed {}): {:?} at {:.3}s after {} events",
        path.display(),
        seed,
        reason,
        outcome.time_taken,
        outcome.event_count
    );

    Ok(outcome)
}

/// Replay every log in parallel; repeat `i` uses seed `config.general.seed + i`
pub fn replay_all(config: &RunConfig, logs: &[PathBuf]) -> Result<Vec<RunOutcome>> {
    let network = config.network()?;
    let specs = config.attacker_specs()?;

    info!("Replaying {} event logs on {} nodes", logs.len(), network.size());

    logs.par_iter()
        .enumerate()
        .map(|(i, path)| replay_file(config, &network, &specs, config.general.seed + i as u64, path))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn config(attackers: &[&str], safety_period: Option<&str>) -> RunConfig {
        let mut yaml = String::from(
            "general:\n  algorithm: protectionless\n  seed: 3\n  ticks_per_second: 1\n  safety_factor: 1.0\n",
        );
        if let Some(period) = safety_period {
            yaml.push_str(&format!("  safety_period: \"{}\"\n", period));
        }
        yaml.push_str("topology:\n  kind: line\n  network_size: 5\n  distance: 10.0\nsink_ids: [0]\nsource_ids: [4]\nattackers:\n");
        for a in attackers {
            yaml.push_str(&format!("  - \"{}\"\n", a));
        }
        serde_yaml::from_str(&yaml).unwrap()
    }

    fn run(config: &RunConfig, log: &str) -> (StopReason, RunOutcome) {
        let network = config.network().unwrap();
        let specs = config.attacker_specs().unwrap();
        let mut simulation = Simulation::new(config, &network, &specs, config.general.seed);
        let reason = simulation.run(Cursor::new(log.to_string())).unwrap();
        (reason, simulation.outcome(0.0))
    }

    const WALK: &str = "\
Metric-BCAST|Normal,1,4,success,1
Metric-RCV|Normal,2,3,4,4,1,1
Attacker-RCV|2,Normal,0,1,4,1
Attacker-RCV|3,Normal,1,2,4,1
DEBUG (3): unrelated chatter
Metric-RCV|Normal,4,0,1,4,1,4
Attacker-RCV|5,Normal,2,3,4,2
Attacker-RCV|6,Normal,3,4,4,3
Metric-BCAST|Normal,7,4,success,2
";

    #[test]
    fn test_replay_until_capture() {
        let config = config(&["BasicReactiveAttacker()"], None);
        let (reason, outcome) = run(&config, WALK);

        assert_eq!(reason, StopReason::Captured);
        assert!(outcome.captured);
        assert_eq!(outcome.time_taken, 6.0);
        assert_eq!(outcome.attacker_moves[&0], 4);
        assert_eq!(outcome.attacker_distance[&(4, 0)], 0.0);
        assert_eq!(outcome.attacker_sink_distance[&(0, 0)], 40.0);
        assert_eq!(outcome.metrics.average_normal_latency, 3.0);
        assert_eq!(outcome.metrics.receive_ratio, 1.0);
        // The final broadcast is never replayed
        assert_eq!(outcome.metrics.total_sent, 1);
        assert_eq!(outcome.event_count, 7);
        assert!(!outcome.reached_upper_bound);
    }

    #[test]
    fn test_safety_period_stops_run() {
        let config = config(&["BasicReactiveAttacker()"], Some("4s"));
        let (reason, outcome) = run(&config, WALK);

        assert_eq!(reason, StopReason::SafetyPeriod);
        assert!(!outcome.captured);
        assert_eq!(outcome.time_taken, 4.0);
        assert_eq!(outcome.attacker_moves[&0], 2);
        assert_eq!(outcome.attacker_distance[&(4, 0)], 20.0);
    }

    #[test]
    fn test_malformed_attacker_line_aborts() {
        let config = config(&["BasicReactiveAttacker()"], None);
        let network = config.network().unwrap();
        let specs = config.attacker_specs().unwrap();
        let mut simulation = Simulation::new(&config, &network, &specs, 0);

        let err = simulation
            .run(Cursor::new("Attacker-RCV|2,Normal,0,1\n".to_string()))
            .unwrap_err();
        assert!(matches!(err, SimulationError::Event { line: 1, .. }));
    }

    #[test]
    fn test_receive_without_send_aborts() {
        let config = config(&["BasicReactiveAttacker()"], None);
        let network = config.network().unwrap();
        let specs = config.attacker_specs().unwrap();
        let mut simulation = Simulation::new(&config, &network, &specs, 0);

        let err = simulation
            .run(Cursor::new("\nMetric-RCV|Normal,4,0,1,4,9,4\n".to_string()))
            .unwrap_err();
        assert!(matches!(err, SimulationError::Metrics { line: 2, .. }));
    }

    #[test]
    fn test_unknown_channels_are_skipped() {
        let config = config(&["BasicReactiveAttacker()"], None);
        let (reason, outcome) = run(&config, "Metric-NOPE|1,2,3\nno tag here\n");
        assert_eq!(reason, StopReason::EndOfLog);
        assert_eq!(outcome.event_count, 0);
        assert_eq!(outcome.metrics.average_normal_latency, f64::INFINITY);
    }

    #[test]
    fn test_source_change_captures_waiting_attacker() {
        let config = config(&["BasicReactiveAttacker(start=2)"], None);
        let log = "Metric-BCAST|Normal,1,4,success,1\nMetric-SOURCE_CHANGE|set,2\nMetric-BCAST|Normal,2,4,success,2\n";
        let (reason, outcome) = run(&config, log);

        assert_eq!(reason, StopReason::Captured);
        assert_eq!(outcome.attacker_moves[&0], 0);
        assert_eq!(outcome.attacker_distance[&(2, 0)], 0.0);
        assert_eq!(outcome.metrics.node_was_source[&2], vec![(1.0, f64::INFINITY)]);
    }

    #[test]
    fn test_former_source_is_not_a_capture() {
        let config = config(&["BasicReactiveAttacker()"], None);
        let log = "\
Metric-SOURCE_CHANGE|set,1
Metric-SOURCE_CHANGE|unset,1
Metric-SOURCE_CHANGE|unset,4
Attacker-RCV|1,Normal,0,1,4,1
";
        let (reason, outcome) = run(&config, log);

        assert_eq!(reason, StopReason::EndOfLog);
        assert!(!outcome.captured);
        assert_eq!(outcome.attacker_moves[&0], 1);
        assert!(outcome.attacker_distance.is_empty());
        assert_eq!(outcome.attacker_sink_distance[&(0, 0)], 10.0);
    }

    #[test]
    fn test_hint_from_out_of_range_sender_is_ignored() {
        let config = config(&["BasicReactiveAttacker()"], None);
        let log = "Attacker-RCV|1,Normal,0,3,4,1\nAttacker-RCV|2,Normal,0,1,4,2\n";
        let (_, outcome) = run(&config, log);

        assert_eq!(outcome.attacker_moves[&0], 1);
        assert_eq!(outcome.attacker_sink_distance[&(0, 0)], 10.0);
        assert_eq!(outcome.event_count, 2);
    }

    #[test]
    fn test_multiple_attackers() {
        let config = config(&["BasicReactiveAttacker()", "SeqNosReactiveAttacker(start=1)"], None);
        let (_, outcome) = run(&config, "Attacker-RCV|1,Normal,1,2,4,1\n");

        assert_eq!(outcome.attacker_moves, BTreeMap::from([(0, 0), (1, 1)]));
        assert_eq!(outcome.attacker_distance[&(4, 1)], 20.0);
    }
}
