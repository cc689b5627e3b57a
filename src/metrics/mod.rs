//! Per-run metrics aggregation.
//!
//! The aggregator folds the simulator's event stream into counters, send
//! and delivery times, hop counts and source history. It supports several
//! concurrently active sources whose membership changes during the run.
//! Latency is keyed by `(ultimate_source_id, seqno)` throughout.

pub mod extensions;
pub mod fields;
pub mod snapshot;

use std::collections::{BTreeMap, BTreeSet, HashMap};

pub use extensions::{Algorithm, Extension, FakeCounters, SourceChangeDetection};
pub use fields::{Field, FieldTable};
pub use snapshot::{MetricsSnapshot, SourceInterval};

use crate::event::{
    BroadcastRecord, EventError, EventRecord, Notification, ReceiveRecord, SimTime,
    SourceChangeDetectRecord, SourceState,
};
use crate::topology::NodeId;

/// Errors that abort the current run
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum MetricsError {
    #[error("Node {node_id} announced an unknown kind '{kind}'")]
    UnknownKind { node_id: NodeId, kind: String },

    #[error("Sink {sink} received Normal #{seqno} from {ultimate_id} which was never sent")]
    ReceiveWithoutSend { sink: NodeId, ultimate_id: NodeId, seqno: u64 },

    #[error("Unknown algorithm '{0}'")]
    UnknownAlgorithm(String),

    #[error("Malformed metrics record: {0}")]
    Malformed(#[from] EventError),
}

type Counter = BTreeMap<NodeId, u64>;

/// Running state for one run
#[derive(Debug, Clone)]
pub struct MetricsAggregator {
    sink_ids: BTreeSet<NodeId>,
    source_ids: BTreeSet<NodeId>,

    sent: BTreeMap<String, Counter>,
    received: BTreeMap<String, Counter>,

    normal_sent_time: HashMap<(NodeId, u64), SimTime>,
    normal_latency: HashMap<(NodeId, u64), SimTime>,
    normal_hop_count: Vec<u32>,

    became_source_times: BTreeMap<NodeId, Vec<SimTime>>,
    became_normal_after_source_times: BTreeMap<NodeId, Vec<SimTime>>,

    fake: Option<FakeCounters>,
    source_change_detection: Option<SourceChangeDetection>,
}

impl MetricsAggregator {
    /// `source_ids` are the sources active when the run starts
    pub fn new(
        sink_ids: BTreeSet<NodeId>,
        source_ids: BTreeSet<NodeId>,
        extensions: &[Extension],
    ) -> Self {
        let became_source_times = source_ids.iter().map(|&id| (id, vec![0.0])).collect();

        Self {
            sink_ids,
            source_ids,
            sent: BTreeMap::new(),
            received: BTreeMap::new(),
            normal_sent_time: HashMap::new(),
            normal_latency: HashMap::new(),
            normal_hop_count: Vec::new(),
            became_source_times,
            became_normal_after_source_times: BTreeMap::new(),
            fake: extensions.contains(&Extension::Fake).then(FakeCounters::default),
            source_change_detection: extensions
                .contains(&Extension::SourceChangeDetect)
                .then(SourceChangeDetection::default),
        }
    }

    /// Dispatch one decoded record; `now` is the latest simulated time seen
    pub fn process(&mut self, record: &EventRecord, now: SimTime) -> Result<(), MetricsError> {
        match record {
            EventRecord::Broadcast(r) => self.process_broadcast(r),
            EventRecord::Receive(r) => self.process_receive(r)?,
            EventRecord::SourceChange(r) => self.process_source_change(r.state, r.node_id, now),
            EventRecord::SourceChangeDetect(r) => self.process_source_change_detect(r),
            EventRecord::Notification(_, n) => self.process_notification(n)?,
            EventRecord::AttackerReceive(_) => {}
        }
        Ok(())
    }

    pub fn process_broadcast(&mut self, record: &BroadcastRecord) {
        if record.status != "success" {
            return;
        }

        *self
            .sent
            .entry(record.kind.clone())
            .or_default()
            .entry(record.node_id)
            .or_insert(0) += 1;

        if record.kind == "Normal" && self.is_source(record.node_id) {
            self.normal_sent_time.insert((record.node_id, record.seqno), record.time);
        }
    }

    /// Count a reception; a Normal delivery at a sink must match a recorded send
    pub fn process_receive(&mut self, record: &ReceiveRecord) -> Result<(), MetricsError> {
        *self
            .received
            .entry(record.kind.clone())
            .or_default()
            .entry(record.node_id)
            .or_insert(0) += 1;

        if record.kind == "Normal" && self.is_sink(record.node_id) {
            let key = (record.ultimate_id, record.seqno);
            let sent_at = self.normal_sent_time.get(&key).copied().ok_or(
                MetricsError::ReceiveWithoutSend {
                    sink: record.node_id,
                    ultimate_id: record.ultimate_id,
                    seqno: record.seqno,
                },
            )?;

            self.normal_latency.insert(key, record.time - sent_at);
            self.normal_hop_count.push(record.hop_count);
        }

        Ok(())
    }

    pub fn process_source_change(&mut self, state: SourceState, node_id: NodeId, time: SimTime) {
        match state {
            SourceState::Set => {
                self.source_ids.insert(node_id);
                self.became_source_times.entry(node_id).or_default().push(time);
            }
            SourceState::Unset => {
                self.source_ids.remove(&node_id);
                self.became_normal_after_source_times
                    .entry(node_id)
                    .or_default()
                    .push(time);
            }
        }
    }

    pub fn process_source_change_detect(&mut self, record: &SourceChangeDetectRecord) {
        if let Some(detection) = self.source_change_detection.as_mut() {
            detection.process(record);
        }
    }

    pub fn process_notification(&mut self, notification: &Notification) -> Result<(), MetricsError> {
        match self.fake.as_mut() {
            Some(fake) => fake.process(notification),
            None => Ok(()),
        }
    }

    /// Current source set
    pub fn source_ids(&self) -> &BTreeSet<NodeId> {
        &self.source_ids
    }

    pub fn sink_ids(&self) -> &BTreeSet<NodeId> {
        &self.sink_ids
    }

    pub fn is_source(&self, id: NodeId) -> bool {
        self.source_ids.contains(&id)
    }

    pub fn is_sink(&self, id: NodeId) -> bool {
        self.sink_ids.contains(&id)
    }

    pub fn normal_latency(&self, source: NodeId, seqno: u64) -> Option<SimTime> {
        self.normal_latency.get(&(source, seqno)).copied()
    }

    pub fn number_sent(&self, kind: &str) -> u64 {
        self.sent.get(kind).map_or(0, |c| c.values().sum())
    }

    pub fn number_received(&self, kind: &str) -> u64 {
        self.received.get(kind).map_or(0, |c| c.values().sum())
    }

    pub fn total_sent(&self) -> u64 {
        self.sent.values().flat_map(|c| c.values()).sum()
    }

    pub fn total_received(&self) -> u64 {
        self.received.values().flat_map(|c| c.values()).sum()
    }

    /// Distinct deliveries over distinct generated messages
    ///
    /// Zero when no Normal message was generated.
    pub fn receive_ratio(&self) -> f64 {
        if self.normal_sent_time.is_empty() {
            return 0.0;
        }
        self.normal_latency.len() as f64 / self.normal_sent_time.len() as f64
    }

    /// Infinite when nothing reached a sink
    pub fn average_normal_latency(&self) -> f64 {
        mean_or_inf(self.normal_latency.values().copied())
    }

    pub fn average_sink_source_hops(&self) -> f64 {
        mean_or_inf(self.normal_hop_count.iter().map(|&h| h as f64))
    }

    pub fn first_normal_sent_time(&self) -> f64 {
        self.normal_sent_time
            .values()
            .copied()
            .fold(f64::INFINITY, f64::min)
    }

    pub fn finalize(&self) -> MetricsSnapshot {
        let node_was_source = self
            .became_source_times
            .iter()
            .map(|(&id, set_times)| {
                let unset_times = self
                    .became_normal_after_source_times
                    .get(&id)
                    .map(Vec::as_slice)
                    .unwrap_or(&[]);
                (id, snapshot::source_intervals(set_times, unset_times))
            })
            .collect();

        MetricsSnapshot {
            total_sent: self.total_sent(),
            total_received: self.total_received(),
            sent_by_kind: by_kind(&self.sent),
            received_by_kind: by_kind(&self.received),
            receive_ratio: self.receive_ratio(),
            average_normal_latency: self.average_normal_latency(),
            average_sink_source_hops: self.average_sink_source_hops(),
            sent_heat_map: heat_map(&self.sent),
            received_heat_map: heat_map(&self.received),
            node_was_source,
            first_normal_sent_time: self.first_normal_sent_time(),
            unique_normal_generated: self.normal_sent_time.len() as u64,
            fake: self.fake.clone(),
            source_change_detection: self.source_change_detection.clone(),
        }
    }
}

fn mean_or_inf(values: impl Iterator<Item = f64>) -> f64 {
    let (sum, count) = values.fold((0.0, 0usize), |(s, n), v| (s + v, n + 1));
    if count == 0 {
        f64::INFINITY
    } else {
        sum / count as f64
    }
}

fn by_kind(counters: &BTreeMap<String, Counter>) -> BTreeMap<String, u64> {
    counters
        .iter()
        .map(|(kind, counter)| (kind.clone(), counter.values().sum()))
        .collect()
}

/// Kind-summed per-node counts
fn heat_map(counters: &BTreeMap<String, Counter>) -> Counter {
    let mut total = Counter::new();
    for counter in counters.values() {
        for (&node, &count) in counter {
            *total.entry(node).or_insert(0) += count;
        }
    }
    total
}

#[cfg(test)]
mod tests {
    use super::*;

    fn aggregator(sinks: &[NodeId], sources: &[NodeId]) -> MetricsAggregator {
        MetricsAggregator::new(
            sinks.iter().copied().collect(),
            sources.iter().copied().collect(),
            &[],
        )
    }

    fn bcast(kind: &str, time: f64, node_id: NodeId, status: &str, seqno: u64) -> BroadcastRecord {
        BroadcastRecord {
            kind: kind.to_string(),
            time,
            node_id,
            status: status.to_string(),
            seqno,
        }
    }

    fn rcv(kind: &str, time: f64, node_id: NodeId, proximate_id: NodeId, ultimate_id: NodeId, seqno: u64, hop_count: u32) -> ReceiveRecord {
        ReceiveRecord {
            kind: kind.to_string(),
            time,
            node_id,
            proximate_id,
            ultimate_id,
            seqno,
            hop_count,
        }
    }

    #[test]
    fn test_single_delivery() {
        let mut metrics = aggregator(&[0], &[5]);
        metrics.process_broadcast(&bcast("Normal", 0.0, 5, "success", 1));
        metrics.process_receive(&rcv("Normal", 12.5, 0, 5, 5, 1, 3)).unwrap();

        assert_eq!(metrics.normal_latency(5, 1), Some(12.5));
        assert_eq!(metrics.receive_ratio(), 1.0);
        assert_eq!(metrics.average_sink_source_hops(), 3.0);
    }

    #[test]
    fn test_receive_ratio_is_exact() {
        let mut metrics = aggregator(&[0], &[5]);
        for seqno in 0..7 {
            metrics.process_broadcast(&bcast("Normal", seqno as f64, 5, "success", seqno));
        }
        for seqno in [0, 2, 4] {
            metrics.process_receive(&rcv("Normal", seqno as f64 + 0.5, 0, 1, 5, seqno, 4)).unwrap();
        }
        // Duplicate delivery overwrites, it is not counted twice
        metrics.process_receive(&rcv("Normal", 4.7, 0, 2, 5, 4, 5)).unwrap();

        assert_eq!(metrics.receive_ratio(), 3.0 / 7.0);
        assert!((metrics.normal_latency(5, 4).unwrap() - 0.7).abs() < 1e-9);
    }

    #[test]
    fn test_failed_broadcasts_are_not_counted() {
        let mut metrics = aggregator(&[0], &[5]);
        metrics.process_broadcast(&bcast("Normal", 0.0, 5, "busy", 1));
        metrics.process_broadcast(&bcast("Fake", 0.0, 3, "success", 1));

        assert_eq!(metrics.total_sent(), 1);
        assert_eq!(metrics.number_sent("Normal"), 0);
        assert_eq!(metrics.receive_ratio(), 0.0);
    }

    #[test]
    fn test_receive_without_send_is_fatal() {
        let mut metrics = aggregator(&[0], &[5]);
        let err = metrics.process_receive(&rcv("Normal", 1.0, 0, 5, 5, 9, 1)).unwrap_err();
        assert_eq!(err, MetricsError::ReceiveWithoutSend { sink: 0, ultimate_id: 5, seqno: 9 });

        // Non-sink receptions never need a matching send
        metrics.process_receive(&rcv("Normal", 1.0, 3, 5, 5, 9, 1)).unwrap();
    }

    #[test]
    fn test_empty_run_has_infinite_averages() {
        let snapshot = aggregator(&[0], &[5]).finalize();
        assert_eq!(snapshot.average_normal_latency, f64::INFINITY);
        assert_eq!(snapshot.average_sink_source_hops, f64::INFINITY);
        assert_eq!(snapshot.first_normal_sent_time, f64::INFINITY);
        assert_eq!(snapshot.total_sent, 0);
    }

    #[test]
    fn test_source_mobility() {
        let mut metrics = aggregator(&[0], &[5]);
        metrics.process_source_change(SourceState::Unset, 5, 10.0);
        metrics.process_source_change(SourceState::Set, 8, 10.0);

        // Old source no longer stamps send times
        metrics.process_broadcast(&bcast("Normal", 11.0, 5, "success", 1));
        metrics.process_broadcast(&bcast("Normal", 11.0, 8, "success", 1));
        metrics.process_receive(&rcv("Normal", 12.0, 0, 4, 8, 1, 2)).unwrap();

        let snapshot = metrics.finalize();
        assert_eq!(metrics.source_ids(), &BTreeSet::from([8]));
        assert_eq!(snapshot.unique_normal_generated, 1);
        assert_eq!(snapshot.node_was_source[&5], vec![(0.0, 10.0)]);
        assert_eq!(snapshot.node_was_source[&8], vec![(10.0, f64::INFINITY)]);
    }

    #[test]
    fn test_heat_maps_sum_kinds() {
        let mut metrics = aggregator(&[0], &[5]);
        metrics.process_broadcast(&bcast("Normal", 0.0, 5, "success", 1));
        metrics.process_broadcast(&bcast("Fake", 0.1, 5, "success", 1));
        metrics.process_broadcast(&bcast("Fake", 0.2, 2, "success", 2));

        let snapshot = metrics.finalize();
        assert_eq!(snapshot.sent_heat_map, BTreeMap::from([(2, 1), (5, 2)]));
        assert_eq!(snapshot.number_sent("Fake"), 2);
    }

    #[test]
    fn test_fake_extension_via_process() {
        let mut metrics = MetricsAggregator::new(BTreeSet::from([0]), BTreeSet::from([5]), &[Extension::Fake]);
        let note = Notification { node_id: 3, detail: "The node has become a PFS".to_string() };
        metrics
            .process(&EventRecord::Notification(crate::event::Channel::FakeNotification, note), 1.0)
            .unwrap();

        assert_eq!(metrics.finalize().fake.map(|f| f.pfs_created), Some(1));

        let bad = Notification { node_id: 3, detail: "The node has become a Wizard".to_string() };
        assert!(metrics.process_notification(&bad).is_err());
    }
}
