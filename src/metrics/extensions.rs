//! Protocol-specific metric extensions.
//!
//! Protocols differ only in a few extra counters and message kinds. Each
//! algorithm is described by an explicit list of extensions which is merged
//! into the aggregator and the field table when a run starts.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::MetricsError;
use crate::event::{log_parser::parse_node_became, Notification, SimTime, SourceChangeDetectRecord};
use crate::topology::NodeId;

/// Optional behaviour bolted onto the common aggregator
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Extension {
    /// Count fake-source transitions announced on `Fake-Notification`
    Fake,
    /// Record which nodes noticed a source moving
    SourceChangeDetect,
    /// Emit a `<Kind>Sent` column for each listed message kind
    MessageKinds(&'static [&'static str]),
}

/// Protocols with known metric layouts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Algorithm {
    Protectionless,
    Adaptive,
    AdaptiveSpr,
    MotionAdaptive,
    Periodic,
}

impl Algorithm {
    pub fn name(&self) -> &'static str {
        match self {
            Algorithm::Protectionless => "protectionless",
            Algorithm::Adaptive => "adaptive",
            Algorithm::AdaptiveSpr => "adaptive_spr",
            Algorithm::MotionAdaptive => "motion_adaptive",
            Algorithm::Periodic => "periodic",
        }
    }

    pub fn extensions(&self) -> Vec<Extension> {
        match self {
            Algorithm::Protectionless => vec![],
            Algorithm::Adaptive => vec![
                Extension::MessageKinds(&["Fake", "Choose", "Away", "Notify"]),
                Extension::Fake,
            ],
            Algorithm::AdaptiveSpr => vec![
                Extension::MessageKinds(&["Fake", "Choose", "Away"]),
                Extension::Fake,
            ],
            Algorithm::MotionAdaptive => vec![
                Extension::MessageKinds(&["Fake", "Choose", "Away"]),
                Extension::Fake,
                Extension::SourceChangeDetect,
            ],
            Algorithm::Periodic => vec![Extension::MessageKinds(&["DummyNormal"])],
        }
    }
}

impl fmt::Display for Algorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Algorithm {
    type Err = MetricsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "protectionless" => Ok(Algorithm::Protectionless),
            "adaptive" => Ok(Algorithm::Adaptive),
            "adaptive_spr" => Ok(Algorithm::AdaptiveSpr),
            "motion_adaptive" => Ok(Algorithm::MotionAdaptive),
            "periodic" => Ok(Algorithm::Periodic),
            other => Err(MetricsError::UnknownAlgorithm(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FakeRole {
    Temporary,
    Permanent,
    Tail,
    Normal,
}

impl FakeRole {
    fn classify(kind: &str) -> Option<Self> {
        match kind {
            "TFS" | "TempFakeNode" => Some(FakeRole::Temporary),
            "PFS" | "PermFakeNode" => Some(FakeRole::Permanent),
            "TailFS" | "TailFakeNode" => Some(FakeRole::Tail),
            "Normal" | "NormalNode" => Some(FakeRole::Normal),
            _ => None,
        }
    }

    fn is_fake(&self) -> bool {
        !matches!(self, FakeRole::Normal)
    }
}

/// Fake source transitions
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FakeCounters {
    pub tfs_created: u64,
    pub pfs_created: u64,
    pub tailfs_created: u64,
    pub fake_to_normal: u64,
    pub fake_to_fake: u64,
}

impl FakeCounters {
    /// Apply a "The node has become a ..." notification
    ///
    /// Other notifications are ignored. An unrecognised node kind is fatal.
    pub fn process(&mut self, notification: &Notification) -> Result<(), MetricsError> {
        let Some((new_kind, old_kind)) = parse_node_became(&notification.detail) else {
            return Ok(());
        };

        let unknown = |kind: &str| MetricsError::UnknownKind {
            node_id: notification.node_id,
            kind: kind.to_string(),
        };

        let new_role = FakeRole::classify(new_kind).ok_or_else(|| unknown(new_kind))?;
        let old_role = old_kind
            .map(|kind| FakeRole::classify(kind).ok_or_else(|| unknown(kind)))
            .transpose()?;

        if new_role.is_fake() && old_role.is_some_and(|r| r.is_fake()) {
            self.fake_to_fake += 1;
        }

        match new_role {
            FakeRole::Temporary => self.tfs_created += 1,
            FakeRole::Permanent => self.pfs_created += 1,
            FakeRole::Tail => self.tailfs_created += 1,
            FakeRole::Normal => self.fake_to_normal += 1,
        }

        Ok(())
    }

    pub fn fake_nodes(&self) -> u64 {
        self.tfs_created + self.pfs_created + self.tailfs_created
    }
}

/// `(previous_source, current_source) -> {node -> time detected}`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SourceChangeDetection {
    pub detected: BTreeMap<(NodeId, NodeId), BTreeMap<NodeId, SimTime>>,
}

impl SourceChangeDetection {
    pub fn process(&mut self, record: &SourceChangeDetectRecord) {
        self.detected
            .entry((record.previous_source_id, record.current_source_id))
            .or_default()
            .insert(record.node_id, record.time);
    }

    /// How many nodes noticed each change
    pub fn nodes_detected(&self) -> BTreeMap<(NodeId, NodeId), u64> {
        self.detected
            .iter()
            .map(|(change, nodes)| (*change, nodes.len() as u64))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn note(node_id: NodeId, detail: &str) -> Notification {
        Notification { node_id, detail: detail.to_string() }
    }

    #[test]
    fn test_fake_counters() {
        let mut counters = FakeCounters::default();
        counters.process(&note(1, "The node has become a TFS")).unwrap();
        counters.process(&note(2, "The node has become a PermFakeNode was TempFakeNode")).unwrap();
        counters.process(&note(3, "The node has become a NormalNode was TempFakeNode")).unwrap();
        counters.process(&note(4, "Sending away message")).unwrap();

        assert_eq!(
            counters,
            FakeCounters {
                tfs_created: 1,
                pfs_created: 1,
                tailfs_created: 0,
                fake_to_normal: 1,
                fake_to_fake: 1,
            }
        );
        assert_eq!(counters.fake_nodes(), 2);
    }

    #[test]
    fn test_unknown_fake_kind_is_fatal() {
        let mut counters = FakeCounters::default();
        let err = counters.process(&note(9, "The node has become a GhostNode")).unwrap_err();
        assert_eq!(err, MetricsError::UnknownKind { node_id: 9, kind: "GhostNode".to_string() });
    }

    #[test]
    fn test_source_change_detection_counts() {
        let mut detection = SourceChangeDetection::default();
        for (node_id, time) in [(3, 1.0), (4, 1.5), (3, 2.0)] {
            detection.process(&SourceChangeDetectRecord {
                time,
                node_id,
                previous_source_id: 0,
                current_source_id: 8,
            });
        }
        assert_eq!(detection.nodes_detected(), BTreeMap::from([((0, 8), 2)]));
        assert_eq!(detection.detected[&(0, 8)][&3], 2.0);
    }

    #[test]
    fn test_algorithm_names() {
        for algorithm in [Algorithm::Protectionless, Algorithm::AdaptiveSpr, Algorithm::Periodic] {
            assert_eq!(algorithm.name().parse::<Algorithm>().unwrap(), algorithm);
        }
        assert!("phantom".parse::<Algorithm>().is_err());
    }
}
