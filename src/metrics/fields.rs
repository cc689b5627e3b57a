//! Result-file columns.
//!
//! A field table is the ordered list of columns written for each repeat:
//! the common fields followed by whatever the algorithm's extensions add.

use std::collections::BTreeMap;

use super::Extension;
use crate::literal::{Key, Literal};
use crate::simulation::RunOutcome;

#[derive(Debug, Clone)]
enum FieldValue {
    Computed(fn(&RunOutcome) -> Literal),
    /// Successful broadcasts of one message kind
    Sent(&'static str),
}

/// One named result column
#[derive(Debug, Clone)]
pub struct Field {
    name: String,
    value: FieldValue,
}

impl Field {
    fn computed(name: &str, f: fn(&RunOutcome) -> Literal) -> Self {
        Self { name: name.to_string(), value: FieldValue::Computed(f) }
    }

    fn sent(kind: &'static str) -> Self {
        Self { name: format!("{}Sent", kind), value: FieldValue::Sent(kind) }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn value(&self, outcome: &RunOutcome) -> Literal {
        match &self.value {
            FieldValue::Computed(f) => f(outcome),
            FieldValue::Sent(kind) => outcome.metrics.number_sent(kind).into(),
        }
    }
}

/// Ordered result columns
#[derive(Debug, Clone)]
pub struct FieldTable {
    fields: Vec<Field>,
}

impl FieldTable {
    /// Columns every run writes
    pub fn base() -> Self {
        let fields = vec![
            Field::computed("Seed", |x| x.seed.into()),
            Field::computed("Sent", |x| x.metrics.total_sent.into()),
            Field::computed("Received", |x| x.metrics.total_received.into()),
            Field::computed("Collisions", |_| Literal::None),
            Field::computed("Captured", |x| x.captured.into()),
            Field::computed("ReachedSimUpperBound", |x| x.reached_upper_bound.into()),
            Field::computed("ReceiveRatio", |x| x.metrics.receive_ratio.into()),
            Field::computed("TimeTaken", |x| x.time_taken.into()),
            Field::computed("WallTime", |x| x.wall_time.into()),
            Field::computed("EventCount", |x| x.event_count.into()),
            Field::computed("AttackerDistance", |x| pair_dict(&x.attacker_distance)),
            Field::computed("AttackerSinkDistance", |x| pair_dict(&x.attacker_sink_distance)),
            Field::computed("AttackerMoves", |x| {
                Literal::int_dict(x.attacker_moves.iter().map(|(&a, &m)| (a, m as u64)))
            }),
            Field::computed("AttackerMovesInResponseTo", |x| {
                Literal::Dict(
                    x.attacker_moves_in_response_to
                        .iter()
                        .map(|(&a, kinds)| {
                            let per_kind = kinds
                                .iter()
                                .map(|(k, &m)| (Key::Str(k.clone()), Literal::Int(m as i64)))
                                .collect();
                            (Key::from(a), Literal::Dict(per_kind))
                        })
                        .collect(),
                )
            }),
            Field::computed("NormalLatency", |x| x.metrics.average_normal_latency.into()),
            Field::computed("NormalSinkSourceHops", |x| x.metrics.average_sink_source_hops.into()),
            Field::computed("NormalSent", |x| x.metrics.number_sent("Normal").into()),
            Field::computed("UniqueNormalGenerated", |x| x.metrics.unique_normal_generated.into()),
            Field::computed("FirstNormalSentTime", |x| x.metrics.first_normal_sent_time.into()),
            Field::computed("NodeWasSource", |x| {
                Literal::Dict(
                    x.metrics
                        .node_was_source
                        .iter()
                        .map(|(&id, intervals)| {
                            let intervals = intervals
                                .iter()
                                .map(|&(s, e)| Literal::Tuple(vec![s.into(), e.into()]))
                                .collect();
                            (Key::from(id), Literal::List(intervals))
                        })
                        .collect(),
                )
            }),
            Field::computed("SentHeatMap", |x| {
                Literal::int_dict(x.metrics.sent_heat_map.iter().map(|(&k, &v)| (k, v)))
            }),
            Field::computed("ReceivedHeatMap", |x| {
                Literal::int_dict(x.metrics.received_heat_map.iter().map(|(&k, &v)| (k, v)))
            }),
        ];

        Self { fields }
    }

    /// Base columns plus the columns each extension contributes
    pub fn with_extensions(extensions: &[Extension]) -> Self {
        let mut table = Self::base();

        for extension in extensions {
            match extension {
                Extension::MessageKinds(kinds) => {
                    for kind in kinds.iter() {
                        table.push(Field::sent(kind));
                    }
                }
                Extension::Fake => {
                    table.push(Field::computed("TFS", |x| fake(x, |f| f.tfs_created)));
                    table.push(Field::computed("PFS", |x| fake(x, |f| f.pfs_created)));
                    table.push(Field::computed("TailFS", |x| fake(x, |f| f.tailfs_created)));
                    table.push(Field::computed("FakeToNormal", |x| fake(x, |f| f.fake_to_normal)));
                    table.push(Field::computed("FakeToFake", |x| fake(x, |f| f.fake_to_fake)));
                }
                Extension::SourceChangeDetect => {
                    table.push(Field::computed("SourceChangeDetected", |x| {
                        match &x.metrics.source_change_detection {
                            Some(d) => Literal::Dict(
                                d.detected
                                    .iter()
                                    .map(|(&change, nodes)| {
                                        let nodes = nodes.iter().map(|(&n, &t)| (n, t));
                                        (Key::from(change), Literal::float_dict(nodes))
                                    })
                                    .collect(),
                            ),
                            None => Literal::None,
                        }
                    }));
                    table.push(Field::computed("NodesDetectedSrcChange", |x| {
                        match &x.metrics.source_change_detection {
                            Some(d) => Literal::int_dict(d.nodes_detected()),
                            None => Literal::None,
                        }
                    }));
                }
            }
        }

        table
    }

    /// Later duplicates of a column name are dropped
    fn push(&mut self, field: Field) {
        if !self.fields.iter().any(|f| f.name == field.name) {
            self.fields.push(field);
        }
    }

    pub fn headings(&self) -> Vec<&str> {
        self.fields.iter().map(Field::name).collect()
    }

    /// `#Seed|Sent|...`
    pub fn header_line(&self) -> String {
        format!("#{}", self.headings().join("|"))
    }

    /// One `|` separated data line
    pub fn row(&self, outcome: &RunOutcome) -> String {
        self.fields
            .iter()
            .map(|f| f.value(outcome).to_string())
            .collect::<Vec<_>>()
            .join("|")
    }
}

fn fake(outcome: &RunOutcome, get: fn(&super::FakeCounters) -> u64) -> Literal {
    outcome.metrics.fake.as_ref().map_or(Literal::None, |f| get(f).into())
}

fn pair_dict(values: &BTreeMap<(u32, u32), f64>) -> Literal {
    Literal::float_dict(values.iter().map(|(&k, &v)| (k, v)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::MetricsAggregator;
    use std::collections::BTreeSet;

    fn outcome() -> RunOutcome {
        let metrics = MetricsAggregator::new(BTreeSet::from([0]), BTreeSet::from([5]), &[Extension::Fake]);
        RunOutcome {
            seed: 44,
            captured: false,
            reached_upper_bound: false,
            time_taken: 10.0,
            wall_time: 0.25,
            event_count: 12,
            attacker_distance: BTreeMap::from([((5, 0), 9.0)]),
            attacker_sink_distance: BTreeMap::from([((0, 0), 0.0)]),
            attacker_moves: BTreeMap::from([(0, 0)]),
            attacker_moves_in_response_to: BTreeMap::from([(0, BTreeMap::new())]),
            metrics: metrics.finalize(),
        }
    }

    #[test]
    fn test_extension_columns_follow_base() {
        let table = FieldTable::with_extensions(&[
            Extension::MessageKinds(&["Fake", "Normal"]),
            Extension::Fake,
        ]);
        let headings = table.headings();

        assert_eq!(headings[0], "Seed");
        assert_eq!(headings.iter().filter(|h| **h == "NormalSent").count(), 1);
        let fake_sent = headings.iter().position(|h| *h == "FakeSent").unwrap();
        let tfs = headings.iter().position(|h| *h == "TFS").unwrap();
        assert!(fake_sent < tfs);
        assert!(table.header_line().starts_with("#Seed|Sent|Received|Collisions|Captured"));
    }

    #[test]
    fn test_row_rendering() {
        let table = FieldTable::with_extensions(&[Extension::Fake, Extension::SourceChangeDetect]);
        let row = table.row(&outcome());
        let cells: Vec<&str> = row.split('|').collect();
        let headings = table.headings();
        let cell = |name: &str| cells[headings.iter().position(|h| *h == name).unwrap()];

        assert_eq!(cells.len(), headings.len());
        assert_eq!(cell("Seed"), "44");
        assert_eq!(cell("Collisions"), "None");
        assert_eq!(cell("Captured"), "False");
        assert_eq!(cell("AttackerDistance"), "{(5, 0): 9.0}");
        assert_eq!(cell("NormalLatency"), "inf");
        assert_eq!(cell("NodeWasSource"), "{5: [(0.0, inf)]}");
        assert_eq!(cell("TFS"), "0");
        // Extension not enabled on the aggregator
        assert_eq!(cell("NodesDetectedSrcChange"), "None");
    }
}
