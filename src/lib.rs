//! # SLPSim - Attacker replay and metrics analysis for source location privacy
//!
//! This library replays the event logs of wireless sensor network
//! simulations through reactive attacker models, folds the same events into
//! per-run metrics, and summarises many runs into one table.
//!
//! ## Overview
//!
//! A simulated network has one or more sinks and a set of sources which may
//! change over time. Sources periodically send Normal messages toward the
//! sinks and protocols may add fake, dummy or control traffic. An attacker
//! starts at a sink, eavesdrops on messages arriving at its current node and
//! moves one hop toward the sender of any message its policy accepts. A run
//! ends when an attacker reaches a current source or when the safety period
//! expires.
//!
//! ## Architecture
//!
//! - `config`: YAML run configuration and validation
//! - `config_loader`: Configuration file loading and CLI overrides
//! - `topology`: Node coordinates, neighbours and distances
//! - `literal`: Value grammar used by result-file cells
//! - `event`: Event-log records and line parsers
//! - `attacker`: Attacker models and the attacker state machine
//! - `metrics`: Per-run metrics aggregator and result columns
//! - `simulation`: Replay driver and result-file writer
//! - `analysis`: Result-file parsing, statistics and batch summaries
//!
//! ## Example Usage
//!
//! ```rust,no_run
//! use std::path::{Path, PathBuf};
//! use slpsim::{config_loader, metrics::FieldTable, simulation};
//!
//! let config = config_loader::load_config(Path::new("run.yaml"))?;
//! let logs = vec![PathBuf::from("seed-44.log"), PathBuf::from("seed-45.log")];
//! let outcomes = simulation::replay_all(&config, &logs)?;
//!
//! let network = config.network()?;
//! let specs = config.attacker_specs()?;
//! let fields = FieldTable::with_extensions(&config.general.algorithm.extensions());
//! let opts = simulation::result_options(&config, &network, &specs);
//! simulation::write_result_file(Path::new("results/run.txt"), &opts, &fields, &outcomes)?;
//! # Ok::<(), color_eyre::eyre::Error>(())
//! ```
//!
//! ## Error Handling
//!
//! Each module defines its own `thiserror` error type. Loader and driver
//! functions return `color_eyre::Result` with file and line context.

pub mod config;
pub mod config_loader;
pub mod topology;
pub mod literal;
pub mod event;
pub mod attacker;
pub mod metrics;
pub mod simulation;
pub mod analysis;
