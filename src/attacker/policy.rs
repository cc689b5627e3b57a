//! Movement policies.
//!
//! Each policy answers one question for the record observed at the
//! attacker's current position: move, and if so where. Memory is only
//! updated once a move has been accepted.

use std::collections::{HashMap, VecDeque};

use super::model::AttackerModel;
use crate::event::{AttackerReceiveRecord, SimTime};
use crate::topology::NodeId;

/// Message kinds that never reveal provenance
pub const IGNORED_KINDS: &[&str] = &["Beacon", "CTPBeacon", "Poll"];

/// Periodic, unsequenced kinds that the location-memory policies always follow
pub const UNSEQUENCED_KINDS: &[&str] = &["DummyNormal"];

/// Policy state for one attacker
#[derive(Debug, Clone)]
pub enum Policy {
    Basic,
    IgnorePreviousLocation {
        previous: Option<NodeId>,
    },
    IgnorePastNLocations {
        memory_size: usize,
        previous: VecDeque<NodeId>,
    },
    TimeSensitive {
        wait_time_secs: f64,
        last_move: Option<SimTime>,
        seqnos: HashMap<(NodeId, String), u64>,
    },
    SeqNo {
        seqnos: HashMap<String, u64>,
    },
    SeqNos {
        seqnos: HashMap<(NodeId, String), u64>,
    },
}

impl Policy {
    pub fn new(model: &AttackerModel) -> Self {
        match model {
            AttackerModel::Basic => Policy::Basic,
            AttackerModel::IgnorePreviousLocation => Policy::IgnorePreviousLocation { previous: None },
            AttackerModel::IgnorePastNLocations { memory_size } => Policy::IgnorePastNLocations {
                memory_size: *memory_size,
                previous: VecDeque::with_capacity(*memory_size),
            },
            AttackerModel::TimeSensitive { wait_time_secs } => Policy::TimeSensitive {
                wait_time_secs: *wait_time_secs,
                last_move: None,
                seqnos: HashMap::new(),
            },
            AttackerModel::SeqNo => Policy::SeqNo { seqnos: HashMap::new() },
            AttackerModel::SeqNos => Policy::SeqNos { seqnos: HashMap::new() },
        }
    }

    /// Whether the policy accepts moving to `record.proximate_id`
    ///
    /// The caller has already checked the record was observed at `position`.
    pub fn accepts(&self, position: NodeId, record: &AttackerReceiveRecord) -> bool {
        let target = record.proximate_id;
        let unsequenced = UNSEQUENCED_KINDS.contains(&record.kind.as_str());

        match self {
            Policy::Basic => true,
            Policy::IgnorePreviousLocation { previous } => unsequenced || *previous != Some(target),
            Policy::IgnorePastNLocations { previous, .. } => {
                unsequenced || (target != position && !previous.contains(&target))
            }
            Policy::TimeSensitive { wait_time_secs, last_move, seqnos } => {
                let waited = last_move.map_or(true, |t| record.time - t >= *wait_time_secs);
                waited && is_fresh(seqnos.get(&(record.ultimate_id, record.kind.clone())), record.seqno)
            }
            Policy::SeqNo { seqnos } => is_fresh(seqnos.get(&record.kind), record.seqno),
            Policy::SeqNos { seqnos } => {
                is_fresh(seqnos.get(&(record.ultimate_id, record.kind.clone())), record.seqno)
            }
        }
    }

    /// Record an accepted move away from `from`
    pub fn moved(&mut self, from: NodeId, record: &AttackerReceiveRecord) {
        match self {
            Policy::Basic => {}
            Policy::IgnorePreviousLocation { previous } => *previous = Some(from),
            Policy::IgnorePastNLocations { memory_size, previous } => {
                if *memory_size == 0 {
                    return;
                }
                if previous.len() == *memory_size {
                    previous.pop_front();
                }
                previous.push_back(from);
            }
            Policy::TimeSensitive { last_move, seqnos, .. } => {
                *last_move = Some(record.time);
                seqnos.insert((record.ultimate_id, record.kind.clone()), record.seqno);
            }
            Policy::SeqNo { seqnos } => {
                seqnos.insert(record.kind.clone(), record.seqno);
            }
            Policy::SeqNos { seqnos } => {
                seqnos.insert((record.ultimate_id, record.kind.clone()), record.seqno);
            }
        }
    }
}

fn is_fresh(last_seen: Option<&u64>, seqno: u64) -> bool {
    last_seen.map_or(true, |&last| last < seqno)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hint(node_id: NodeId, from: NodeId, source: NodeId, kind: &str, seqno: u64, time: f64) -> AttackerReceiveRecord {
        AttackerReceiveRecord {
            time,
            kind: kind.to_string(),
            node_id,
            proximate_id: from,
            ultimate_id: source,
            seqno,
        }
    }

    #[test]
    fn test_seqno_is_per_kind_not_per_source() {
        let mut policy = Policy::new(&AttackerModel::SeqNo);
        let first = hint(0, 1, 10, "Normal", 5, 0.0);
        assert!(policy.accepts(0, &first));
        policy.moved(0, &first);

        // A second source with a lower sequence number looks stale
        assert!(!policy.accepts(1, &hint(1, 2, 20, "Normal", 3, 0.1)));
        assert!(policy.accepts(1, &hint(1, 2, 20, "Fake", 3, 0.1)));
    }

    #[test]
    fn test_seqnos_distinguishes_sources() {
        let mut policy = Policy::new(&AttackerModel::SeqNos);
        let first = hint(0, 1, 10, "Normal", 5, 0.0);
        policy.moved(0, &first);

        assert!(policy.accepts(1, &hint(1, 2, 20, "Normal", 3, 0.1)));
        assert!(!policy.accepts(1, &hint(1, 2, 10, "Normal", 5, 0.1)));
    }

    #[test]
    fn test_ignore_previous_location_bypass_for_unsequenced() {
        let mut policy = Policy::new(&AttackerModel::IgnorePreviousLocation);
        policy.moved(0, &hint(0, 1, 9, "Normal", 1, 0.0));

        assert!(!policy.accepts(1, &hint(1, 0, 9, "Normal", 2, 0.1)));
        assert!(policy.accepts(1, &hint(1, 0, 9, "DummyNormal", 2, 0.1)));
        assert!(policy.accepts(1, &hint(1, 2, 9, "Normal", 2, 0.1)));
    }

    #[test]
    fn test_time_sensitive_waits() {
        let mut policy = Policy::new(&AttackerModel::TimeSensitive { wait_time_secs: 1.0 });
        let first = hint(0, 1, 9, "Normal", 1, 10.0);
        assert!(policy.accepts(0, &first));
        policy.moved(0, &first);

        assert!(!policy.accepts(1, &hint(1, 2, 9, "Normal", 2, 10.5)));
        assert!(policy.accepts(1, &hint(1, 2, 9, "Normal", 2, 11.0)));
        assert!(!policy.accepts(1, &hint(1, 2, 9, "Normal", 1, 12.0)));
    }
}
