//! Simulator event records.
//!
//! The simulator emits one line per event, tagged with the channel it was
//! written to. This module turns a channel payload into a typed record.
//! Field counts are checked strictly: a malformed payload means the firmware
//! and this harness disagree about the protocol, and the run must stop.

pub mod log_parser;

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::topology::NodeId;

pub use log_parser::{parse_notification, split_channel, RawLine, PATTERNS};

/// Simulated time in seconds
pub type SimTime = f64;

/// Default TOSSIM tick rate
pub const DEFAULT_TICKS_PER_SECOND: f64 = 10_000_000_000.0;

/// Errors raised while decoding an event payload
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum EventError {
    #[error("{channel}: expected {expected} fields but found {found} in '{payload}'")]
    FieldCount {
        channel: Channel,
        expected: usize,
        found: usize,
        payload: String,
    },

    #[error("{channel}: invalid {field} '{value}' in '{payload}'")]
    InvalidField {
        channel: Channel,
        field: &'static str,
        value: String,
        payload: String,
    },

    #[error("Metric-COMMUNICATE: unknown sub-tag '{0}'")]
    UnknownSubTag(String),

    #[error("Unknown channel '{0}'")]
    UnknownChannel(String),
}

/// Channels the harness subscribes to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Channel {
    MetricBcast,
    MetricRcv,
    MetricCommunicate,
    MetricSourceChange,
    MetricSourceChangeDetect,
    AttackerRcv,
    FakeNotification,
    /// Free-text `DEBUG (<id>): ...` output
    Debug,
}

impl Channel {
    pub fn tag(&self) -> &'static str {
        match self {
            Channel::MetricBcast => "Metric-BCAST",
            Channel::MetricRcv => "Metric-RCV",
            Channel::MetricCommunicate => "Metric-COMMUNICATE",
            Channel::MetricSourceChange => "Metric-SOURCE_CHANGE",
            Channel::MetricSourceChangeDetect => "Metric-SOURCE_CHANGE_DETECT",
            Channel::AttackerRcv => "Attacker-RCV",
            Channel::FakeNotification => "Fake-Notification",
            Channel::Debug => "stdout",
        }
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

impl FromStr for Channel {
    type Err = EventError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Metric-BCAST" => Ok(Channel::MetricBcast),
            "Metric-RCV" => Ok(Channel::MetricRcv),
            "Metric-COMMUNICATE" => Ok(Channel::MetricCommunicate),
            "Metric-SOURCE_CHANGE" => Ok(Channel::MetricSourceChange),
            "Metric-SOURCE_CHANGE_DETECT" => Ok(Channel::MetricSourceChangeDetect),
            "Attacker-RCV" => Ok(Channel::AttackerRcv),
            "Fake-Notification" => Ok(Channel::FakeNotification),
            "stdout" | "DEBUG" => Ok(Channel::Debug),
            other => Err(EventError::UnknownChannel(other.to_string())),
        }
    }
}

/// Converts simulator ticks into seconds
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Clock {
    pub ticks_per_second: f64,
}

impl Default for Clock {
    fn default() -> Self {
        Self { ticks_per_second: DEFAULT_TICKS_PER_SECOND }
    }
}

impl Clock {
    pub fn new(ticks_per_second: f64) -> Self {
        Self { ticks_per_second }
    }

    pub fn ticks_to_seconds(&self, ticks: f64) -> SimTime {
        ticks / self.ticks_per_second
    }
}

/// A message was handed to the radio
#[derive(Debug, Clone, PartialEq)]
pub struct BroadcastRecord {
    pub kind: String,
    pub time: SimTime,
    pub node_id: NodeId,
    pub status: String,
    pub seqno: u64,
}

/// A message arrived at a node
#[derive(Debug, Clone, PartialEq)]
pub struct ReceiveRecord {
    pub kind: String,
    pub time: SimTime,
    pub node_id: NodeId,
    pub proximate_id: NodeId,
    pub ultimate_id: NodeId,
    pub seqno: u64,
    pub hop_count: u32,
}

/// Whether a node started or stopped being a source
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceState {
    Set,
    Unset,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SourceChangeRecord {
    pub state: SourceState,
    pub node_id: NodeId,
}

/// A node noticed the source moved
#[derive(Debug, Clone, PartialEq)]
pub struct SourceChangeDetectRecord {
    pub time: SimTime,
    pub node_id: NodeId,
    pub previous_source_id: NodeId,
    pub current_source_id: NodeId,
}

/// A message overheard by the attacker at `node_id`
#[derive(Debug, Clone, PartialEq)]
pub struct AttackerReceiveRecord {
    pub time: SimTime,
    pub kind: String,
    pub node_id: NodeId,
    pub proximate_id: NodeId,
    pub ultimate_id: NodeId,
    pub seqno: u64,
}

/// A free-text `DEBUG (<node_id>): <detail>` line
#[derive(Debug, Clone, PartialEq)]
pub struct Notification {
    pub node_id: NodeId,
    pub detail: String,
}

/// A decoded simulator event
#[derive(Debug, Clone, PartialEq)]
pub enum EventRecord {
    Broadcast(BroadcastRecord),
    Receive(ReceiveRecord),
    SourceChange(SourceChangeRecord),
    SourceChangeDetect(SourceChangeDetectRecord),
    AttackerReceive(AttackerReceiveRecord),
    Notification(Channel, Notification),
}

impl EventRecord {
    /// Simulated time carried by the record, if the channel has one
    pub fn time(&self) -> Option<SimTime> {
        match self {
            EventRecord::Broadcast(r) => Some(r.time),
            EventRecord::Receive(r) => Some(r.time),
            EventRecord::SourceChangeDetect(r) => Some(r.time),
            EventRecord::AttackerReceive(r) => Some(r.time),
            EventRecord::SourceChange(_) | EventRecord::Notification(..) => None,
        }
    }

    /// Decode the payload of a line written to `channel`
    pub fn parse(channel: Channel, payload: &str, clock: &Clock) -> Result<Self, EventError> {
        match channel {
            Channel::MetricBcast => parse_broadcast(channel, payload, clock).map(EventRecord::Broadcast),
            Channel::MetricRcv => parse_receive(channel, payload, clock).map(EventRecord::Receive),
            Channel::MetricCommunicate => {
                let (sub_tag, rest) = payload.split_once(',').unwrap_or((payload, ""));
                match sub_tag {
                    "BCAST" => parse_broadcast(channel, rest, clock).map(EventRecord::Broadcast),
                    "RCV" => parse_receive(channel, rest, clock).map(EventRecord::Receive),
                    other => Err(EventError::UnknownSubTag(other.to_string())),
                }
            }
            Channel::MetricSourceChange => {
                let [state, node_id] = fields(channel, payload)?;
                let state = match state {
                    "set" => SourceState::Set,
                    "unset" => SourceState::Unset,
                    other => return Err(invalid(channel, "state", other, payload)),
                };
                Ok(EventRecord::SourceChange(SourceChangeRecord {
                    state,
                    node_id: number(channel, "node_id", node_id, payload)?,
                }))
            }
            Channel::MetricSourceChangeDetect => {
                let [time, node_id, previous, current] = fields(channel, payload)?;
                Ok(EventRecord::SourceChangeDetect(SourceChangeDetectRecord {
                    time: ticks(channel, time, payload, clock)?,
                    node_id: number(channel, "node_id", node_id, payload)?,
                    previous_source_id: number(channel, "previous_source_id", previous, payload)?,
                    current_source_id: number(channel, "current_source_id", current, payload)?,
                }))
            }
            Channel::AttackerRcv => {
                AttackerReceiveRecord::parse(payload, clock).map(EventRecord::AttackerReceive)
            }
            Channel::FakeNotification | Channel::Debug => match parse_notification(payload) {
                Some(notification) => Ok(EventRecord::Notification(channel, notification)),
                None => Err(invalid(channel, "notification", payload, payload)),
            },
        }
    }
}

impl AttackerReceiveRecord {
    /// Decode `time,msg_type,node_id,proximate_from_id,ultimate_from_id,sequence_number`
    pub fn parse(payload: &str, clock: &Clock) -> Result<Self, EventError> {
        let channel = Channel::AttackerRcv;
        let [time, kind, node_id, proximate, ultimate, seqno] = fields(channel, payload)?;

        Ok(Self {
            time: ticks(channel, time, payload, clock)?,
            kind: kind.to_string(),
            node_id: number(channel, "node_id", node_id, payload)?,
            proximate_id: number(channel, "proximate_from_id", proximate, payload)?,
            ultimate_id: number(channel, "ultimate_from_id", ultimate, payload)?,
            seqno: number(channel, "sequence_number", seqno, payload)?,
        })
    }
}

fn parse_broadcast(channel: Channel, payload: &str, clock: &Clock) -> Result<BroadcastRecord, EventError> {
    let [kind, time, node_id, status, seqno] = fields(channel, payload)?;

    Ok(BroadcastRecord {
        kind: kind.to_string(),
        time: ticks(channel, time, payload, clock)?,
        node_id: number(channel, "node_id", node_id, payload)?,
        status: status.to_string(),
        seqno: number(channel, "seqno", seqno, payload)?,
    })
}

fn parse_receive(channel: Channel, payload: &str, clock: &Clock) -> Result<ReceiveRecord, EventError> {
    let [kind, time, node_id, proximate, ultimate, seqno, hop_count] = fields(channel, payload)?;

    Ok(ReceiveRecord {
        kind: kind.to_string(),
        time: ticks(channel, time, payload, clock)?,
        node_id: number(channel, "node_id", node_id, payload)?,
        proximate_id: number(channel, "proximate_id", proximate, payload)?,
        ultimate_id: number(channel, "ultimate_id", ultimate, payload)?,
        seqno: number(channel, "seqno", seqno, payload)?,
        hop_count: number(channel, "hop_count", hop_count, payload)?,
    })
}

/// Split a payload into exactly `N` trimmed comma separated fields
fn fields<const N: usize>(channel: Channel, payload: &str) -> Result<[&str; N], EventError> {
    let parts: Vec<&str> = payload.split(',').map(str::trim).collect();
    let found = parts.len();

    parts.try_into().map_err(|_| EventError::FieldCount {
        channel,
        expected: N,
        found,
        payload: payload.to_string(),
    })
}

fn invalid(channel: Channel, field: &'static str, value: &str, payload: &str) -> EventError {
    EventError::InvalidField {
        channel,
        field,
        value: value.to_string(),
        payload: payload.to_string(),
    }
}

fn number<T: FromStr>(channel: Channel, field: &'static str, value: &str, payload: &str) -> Result<T, EventError> {
    value.parse().map_err(|_| invalid(channel, field, value, payload))
}

fn ticks(channel: Channel, value: &str, payload: &str, clock: &Clock) -> Result<SimTime, EventError> {
    let raw: f64 = number(channel, "time", value, payload)?;
    Ok(clock.ticks_to_seconds(raw))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_broadcast_converts_ticks() {
        let clock = Clock::new(1000.0);
        let record = EventRecord::parse(Channel::MetricBcast, "Normal,2500,5,success,1", &clock).unwrap();
        assert_eq!(
            record,
            EventRecord::Broadcast(BroadcastRecord {
                kind: "Normal".to_string(),
                time: 2.5,
                node_id: 5,
                status: "success".to_string(),
                seqno: 1,
            })
        );
    }

    #[test]
    fn test_parse_communicate_sub_tags() {
        let clock = Clock::new(1.0);
        let record = EventRecord::parse(Channel::MetricCommunicate, "RCV,Normal,12.5,0,5,5,1,3", &clock).unwrap();
        match record {
            EventRecord::Receive(r) => {
                assert_eq!(r.node_id, 0);
                assert_eq!(r.ultimate_id, 5);
                assert_eq!(r.hop_count, 3);
            }
            other => panic!("unexpected record {:?}", other),
        }

        assert_eq!(
            EventRecord::parse(Channel::MetricCommunicate, "FWD,Normal", &clock),
            Err(EventError::UnknownSubTag("FWD".to_string()))
        );
    }

    #[test]
    fn test_attacker_receive_field_count_is_strict() {
        let clock = Clock::default();
        let err = AttackerReceiveRecord::parse("0.0,Normal,0,7,1", &clock).unwrap_err();
        assert!(matches!(err, EventError::FieldCount { expected: 6, found: 5, .. }));

        let err = AttackerReceiveRecord::parse("0.0,Normal,zero,7,7,1", &clock).unwrap_err();
        assert!(matches!(err, EventError::InvalidField { field: "node_id", .. }));
    }

    #[test]
    fn test_source_change_states() {
        let clock = Clock::default();
        assert_eq!(
            EventRecord::parse(Channel::MetricSourceChange, "unset,4", &clock).unwrap(),
            EventRecord::SourceChange(SourceChangeRecord { state: SourceState::Unset, node_id: 4 })
        );
        assert!(EventRecord::parse(Channel::MetricSourceChange, "toggle,4", &clock).is_err());
    }

    #[test]
    fn test_channel_round_trip_names() {
        for channel in [Channel::MetricBcast, Channel::AttackerRcv, Channel::FakeNotification] {
            assert_eq!(channel.tag().parse::<Channel>().unwrap(), channel);
        }
        assert!("Metric-UNKNOWN".parse::<Channel>().is_err());
    }
}
