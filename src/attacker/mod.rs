//! Mobile attacker state machine.
//!
//! An attacker sits at one node, listens to the messages that node hears and
//! steps to whichever neighbour its policy says the traffic came from. Once
//! it stands on a current source it has captured it and never moves again.

pub mod model;
pub mod policy;

use std::collections::{BTreeMap, BTreeSet};

use log::trace;

pub use model::{AttackerModel, AttackerModelError, AttackerSpec};
pub use policy::{Policy, IGNORED_KINDS, UNSEQUENCED_KINDS};

use crate::event::{AttackerReceiveRecord, Clock, EventError};
use crate::topology::NodeId;

/// Errors raised while feeding an attacker
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum AttackerError {
    #[error("Attacker received a malformed record: {0}")]
    Malformed(#[from] EventError),
}

#[derive(Debug, Clone)]
pub struct Attacker {
    ident: usize,
    spec: AttackerSpec,
    policy: Policy,
    position: NodeId,
    moves: u32,
    has_found_source: bool,
    moves_in_response_to: BTreeMap<String, u32>,
}

impl Attacker {
    pub fn new(ident: usize, spec: AttackerSpec) -> Self {
        let policy = Policy::new(&spec.model);
        Self {
            ident,
            spec,
            policy,
            position: 0,
            moves: 0,
            has_found_source: false,
            moves_in_response_to: BTreeMap::new(),
        }
    }

    /// Place the attacker at `start` and reset all history
    ///
    /// The initial placement is not a move.
    pub fn setup(&mut self, start: NodeId, sources: &BTreeSet<NodeId>) {
        self.policy = Policy::new(&self.spec.model);
        self.position = start;
        self.moves = 0;
        self.moves_in_response_to.clear();
        self.has_found_source = self.found_source_slow(sources);
    }

    /// Feed one record heard somewhere in the network
    ///
    /// Returns whether the attacker moved. Records not heard at the current
    /// position, beacon traffic and anything after capture are ignored.
    pub fn process(&mut self, record: &AttackerReceiveRecord, sources: &BTreeSet<NodeId>) -> bool {
        if self.has_found_source || record.node_id != self.position {
            return false;
        }
        if IGNORED_KINDS.contains(&record.kind.as_str()) {
            return false;
        }

        let target = record.proximate_id;
        if target == self.position || !self.policy.accepts(self.position, record) {
            return false;
        }

        let from = self.position;
        self.policy.moved(from, record);
        self.position = target;
        self.moves += 1;
        *self.moves_in_response_to.entry(record.kind.clone()).or_insert(0) += 1;
        self.has_found_source = self.found_source_slow(sources);

        trace!(
            "Attacker {} moved {} -> {} after {} #{} from {} at {:.3}s{}",
            self.ident,
            from,
            target,
            record.kind,
            record.seqno,
            record.ultimate_id,
            record.time,
            if self.has_found_source { " (captured)" } else { "" }
        );

        true
    }

    /// Decode an `Attacker-RCV` payload and feed it
    pub fn process_line(
        &mut self,
        payload: &str,
        clock: &Clock,
        sources: &BTreeSet<NodeId>,
    ) -> Result<bool, AttackerError> {
        let record = AttackerReceiveRecord::parse(payload, clock)?;
        Ok(self.process(&record, sources))
    }

    pub fn found_source(&self) -> bool {
        self.has_found_source
    }

    /// Recompute capture against the authoritative source set
    pub fn found_source_slow(&self, sources: &BTreeSet<NodeId>) -> bool {
        sources.contains(&self.position)
    }

    /// Re-check capture after the source set changed
    ///
    /// Capture is terminal, so this can only ever set the flag.
    pub fn refresh_found_source(&mut self, sources: &BTreeSet<NodeId>) {
        if !self.has_found_source && self.found_source_slow(sources) {
            trace!("Attacker {} captured a new source at {}", self.ident, self.position);
            self.has_found_source = true;
        }
    }

    pub fn ident(&self) -> usize {
        self.ident
    }

    pub fn spec(&self) -> &AttackerSpec {
        &self.spec
    }

    pub fn position(&self) -> NodeId {
        self.position
    }

    pub fn moves(&self) -> u32 {
        self.moves
    }

    /// Accepted moves per message kind
    pub fn moves_in_response_to(&self) -> &BTreeMap<String, u32> {
        &self.moves_in_response_to
    }
}
