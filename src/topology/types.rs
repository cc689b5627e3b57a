//! Topology type definitions.
//!
//! Node layouts supported by the oracle (grid, line, explicit coordinates)
//! and the identifiers shared by every other module.

use serde::{Deserialize, Serialize};

/// Identifier of a simulated node, `0 <= id < size`
pub type NodeId = u32;

/// Position of a node in meters
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinate {
    pub x: f64,
    pub y: f64,
}

impl Coordinate {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    /// Euclidean distance in meters
    pub fn distance(&self, other: &Coordinate) -> f64 {
        ((self.x - other.x).powi(2) + (self.y - other.y).powi(2)).sqrt()
    }
}

/// How node coordinates are generated
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Layout {
    /// `network_size` x `network_size` nodes, row-major ids, `distance` meters apart
    Grid { network_size: u32, distance: f64 },
    /// `network_size` nodes on the x axis, `distance` meters apart
    Line { network_size: u32, distance: f64 },
    /// Coordinates listed by node id
    Explicit { locations: Vec<[f64; 2]> },
}

impl Layout {
    /// Name echoed into result files as the `configuration` option
    pub fn name(&self) -> &'static str {
        match self {
            Layout::Grid { .. } => "grid",
            Layout::Line { .. } => "line",
            Layout::Explicit { .. } => "explicit",
        }
    }

    /// Spacing between adjacent nodes, used as the default radio range
    pub fn spacing(&self) -> Option<f64> {
        match self {
            Layout::Grid { distance, .. } | Layout::Line { distance, .. } => Some(*distance),
            Layout::Explicit { .. } => None,
        }
    }

    pub(crate) fn locations(&self) -> Vec<Coordinate> {
        match self {
            Layout::Grid { network_size, distance } => (0..network_size * network_size)
                .map(|id| {
                    let x = (id % network_size) as f64 * distance;
                    let y = (id / network_size) as f64 * distance;
                    Coordinate::new(x, y)
                })
                .collect(),
            Layout::Line { network_size, distance } => (0..*network_size)
                .map(|id| Coordinate::new(id as f64 * distance, 0.0))
                .collect(),
            Layout::Explicit { locations } => {
                locations.iter().map(|[x, y]| Coordinate::new(*x, *y)).collect()
            }
        }
    }
}

/// Topology section of the run configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TopologyConfig {
    #[serde(flatten)]
    pub layout: Layout,
    /// Maximum distance at which two nodes are neighbours
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub radio_range: Option<f64>,
}

/// Errors raised by the topology oracle
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum TopologyError {
    #[error("Node {id} is outside the network of {size} nodes")]
    UnknownNode { id: NodeId, size: usize },

    #[error("Topology has no nodes")]
    Empty,

    #[error("Explicit layouts need a radio_range")]
    MissingRadioRange,

    #[error("Cannot rebuild a topology from options: {0}")]
    Options(String),
}
