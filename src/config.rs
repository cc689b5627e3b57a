use std::collections::BTreeSet;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::attacker::{AttackerModelError, AttackerSpec};
use crate::event::{Clock, DEFAULT_TICKS_PER_SECOND};
use crate::metrics::Algorithm;
use crate::topology::{Network, NodeId, Topology, TopologyConfig, TopologyError};

/// Top-level configuration structure that mirrors the YAML run configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunConfig {
    pub general: GeneralConfig,
    pub topology: TopologyConfig,
    pub sink_ids: Vec<NodeId>,
    /// Sources active when each repeat starts
    pub source_ids: Vec<NodeId>,
    /// Attacker model descriptions, e.g. `SeqNosReactiveAttacker()`
    #[serde(default = "default_attackers")]
    pub attackers: Vec<String>,
}

/// Settings shared by every repeat of a configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneralConfig {
    pub algorithm: Algorithm,
    /// Seed of the first repeat; repeat `i` uses `seed + i`
    #[serde(default)]
    pub seed: u64,
    #[serde(default = "default_ticks_per_second")]
    pub ticks_per_second: f64,
    /// Time the unprotected protocol needs to be captured (e.g. "90s")
    #[serde(default, with = "humantime_serde", skip_serializing_if = "Option::is_none")]
    pub safety_period: Option<Duration>,
    #[serde(default = "default_safety_factor")]
    pub safety_factor: f64,
    /// Seconds between Normal messages from a source
    #[serde(default = "default_source_period")]
    pub source_period: f64,
}

fn default_attackers() -> Vec<String> {
    vec![AttackerSpec::default().to_string()]
}

fn default_ticks_per_second() -> f64 {
    DEFAULT_TICKS_PER_SECOND
}

fn default_safety_factor() -> f64 {
    1.3
}

fn default_source_period() -> f64 {
    1.0
}

/// Errors found while validating a run configuration
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ValidationError {
    #[error("Invalid general configuration: {0}")]
    InvalidGeneral(String),
    #[error("Invalid topology configuration: {0}")]
    InvalidTopology(#[from] TopologyError),
    #[error("Invalid node roles: {0}")]
    InvalidRoles(String),
    #[error("Invalid attacker configuration: {0}")]
    InvalidAttacker(#[from] AttackerModelError),
}

impl RunConfig {
    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ValidationError> {
        let general = &self.general;
        if !(general.ticks_per_second > 0.0) {
            return Err(ValidationError::InvalidGeneral(
                "ticks_per_second must be positive".to_string(),
            ));
        }
        if !(general.source_period > 0.0) {
            return Err(ValidationError::InvalidGeneral(
                "source_period must be positive".to_string(),
            ));
        }
        if !(general.safety_factor > 0.0) {
            return Err(ValidationError::InvalidGeneral(
                "safety_factor must be positive".to_string(),
            ));
        }

        if self.sink_ids.is_empty() {
            return Err(ValidationError::InvalidRoles("at least one sink is required".to_string()));
        }
        if self.source_ids.is_empty() {
            return Err(ValidationError::InvalidRoles("at least one source is required".to_string()));
        }
        if let Some(id) = self.sink_ids.iter().find(|id| self.source_ids.contains(id)) {
            return Err(ValidationError::InvalidRoles(format!(
                "node {} cannot be both a sink and a source",
                id
            )));
        }

        let network = self.network()?;

        let specs = self.attacker_specs()?;
        if specs.is_empty() {
            return Err(ValidationError::InvalidRoles("at least one attacker is required".to_string()));
        }
        for spec in &specs {
            if let Some(start) = spec.start {
                if !network.topology.contains(start) {
                    return Err(TopologyError::UnknownNode { id: start, size: network.size() }.into());
                }
            }
        }

        Ok(())
    }

    /// Parse every attacker description
    pub fn attacker_specs(&self) -> Result<Vec<AttackerSpec>, AttackerModelError> {
        self.attackers.iter().map(|a| a.parse()).collect()
    }

    /// Build the topology and check sink/source ids against it
    pub fn network(&self) -> Result<Network, TopologyError> {
        let topology = Topology::from_config(&self.topology)?;
        Network::new(
            topology,
            self.sink_ids.iter().copied().collect::<BTreeSet<_>>(),
            self.source_ids.iter().copied().collect::<BTreeSet<_>>(),
        )
    }

    pub fn clock(&self) -> Clock {
        Clock::new(self.general.ticks_per_second)
    }

    /// Simulated time after which a run stops regardless of capture
    pub fn effective_safety_period(&self) -> Option<f64> {
        self.general
            .safety_period
            .map(|p| p.as_secs_f64() * self.general.safety_factor)
    }

    /// Simulated time a run is never expected to reach
    pub fn upper_time_bound(&self, num_nodes: usize) -> f64 {
        num_nodes as f64 * 4.0 * self.general.source_period
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const YAML: &str = r#"
general:
  algorithm: adaptive
  seed: 44
  safety_period: "90s"
  source_period: 0.5
topology:
  kind: grid
  network_size: 5
  distance: 4.5
sink_ids: [12]
source_ids: [0]
attackers:
  - "SeqNosReactiveAttacker()"
  - "IgnorePastNLocationsReactiveAttacker(memory_size=2, start=24)"
"#;

    fn config() -> RunConfig {
        serde_yaml::from_str(YAML).unwrap()
    }

    #[test]
    fn test_parse_and_validate() {
        let config = config();
        config.validate().unwrap();

        assert_eq!(config.general.algorithm, Algorithm::Adaptive);
        assert_eq!(config.general.ticks_per_second, DEFAULT_TICKS_PER_SECOND);
        assert_eq!(config.general.safety_period, Some(Duration::from_secs(90)));
        assert!((config.effective_safety_period().unwrap() - 117.0).abs() < 1e-9);
        assert_eq!(config.attacker_specs().unwrap()[1].start, Some(24));
        assert_eq!(config.upper_time_bound(25), 50.0);
    }

    #[test]
    fn test_default_attacker() {
        let mut config = config();
        config.attackers = default_attackers();
        assert_eq!(config.attackers, vec!["SeqNosReactiveAttacker()".to_string()]);
        config.validate().unwrap();
    }

    #[test]
    fn test_validation_failures() {
        let mut config = config();
        config.source_ids = vec![25];
        assert!(matches!(config.validate(), Err(ValidationError::InvalidTopology(_))));

        let mut config = self::config();
        config.source_ids = vec![12];
        assert!(matches!(config.validate(), Err(ValidationError::InvalidRoles(_))));

        let mut config = self::config();
        config.attackers = vec!["SeqNosReactiveAttacker".to_string()];
        assert!(matches!(config.validate(), Err(ValidationError::InvalidAttacker(_))));

        let mut config = self::config();
        config.attackers = vec!["BasicReactiveAttacker(start=99)".to_string()];
        assert!(matches!(config.validate(), Err(ValidationError::InvalidTopology(_))));

        let mut config = self::config();
        config.general.source_period = 0.0;
        assert!(matches!(config.validate(), Err(ValidationError::InvalidGeneral(_))));
    }
}
