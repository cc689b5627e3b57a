//! Finalised per-run metrics.

use std::collections::BTreeMap;

use super::extensions::{FakeCounters, SourceChangeDetection};
use crate::event::SimTime;
use crate::topology::NodeId;

/// `[start, end)` interval during which a node was a source; `end` is
/// infinite when the node was still a source at the end of the run
pub type SourceInterval = (SimTime, SimTime);

/// Derived values computed once a run has stopped
#[derive(Debug, Clone, PartialEq)]
pub struct MetricsSnapshot {
    pub total_sent: u64,
    pub total_received: u64,
    pub sent_by_kind: BTreeMap<String, u64>,
    pub received_by_kind: BTreeMap<String, u64>,
    pub receive_ratio: f64,
    pub average_normal_latency: f64,
    pub average_sink_source_hops: f64,
    pub sent_heat_map: BTreeMap<NodeId, u64>,
    pub received_heat_map: BTreeMap<NodeId, u64>,
    pub node_was_source: BTreeMap<NodeId, Vec<SourceInterval>>,
    pub first_normal_sent_time: f64,
    pub unique_normal_generated: u64,
    pub fake: Option<FakeCounters>,
    pub source_change_detection: Option<SourceChangeDetection>,
}

impl MetricsSnapshot {
    /// Successful broadcasts of `kind`
    pub fn number_sent(&self, kind: &str) -> u64 {
        self.sent_by_kind.get(kind).copied().unwrap_or(0)
    }

    pub fn number_received(&self, kind: &str) -> u64 {
        self.received_by_kind.get(kind).copied().unwrap_or(0)
    }
}

/// Pair each `set` time with the next `unset` time, left open when missing
pub fn source_intervals(set_times: &[SimTime], unset_times: &[SimTime]) -> Vec<SourceInterval> {
    set_times
        .iter()
        .enumerate()
        .map(|(i, &start)| (start, unset_times.get(i).copied().unwrap_or(f64::INFINITY)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_source_intervals() {
        assert_eq!(
            source_intervals(&[0.0, 20.0], &[10.0]),
            vec![(0.0, 10.0), (20.0, f64::INFINITY)]
        );
        assert!(source_intervals(&[], &[]).is_empty());
    }
}
