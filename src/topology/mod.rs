//! Network topology oracle.
//!
//! Read-only view of the simulated network: node coordinates, neighbours,
//! meter and hop distances, and which nodes are sinks and sources. Built
//! once per configuration and shared by every run.

pub mod types;
pub mod connections;

use std::collections::{BTreeMap, BTreeSet};

pub use types::{Coordinate, Layout, NodeId, TopologyConfig, TopologyError};

use connections::{generate_neighbours, hop_distance};

/// Node coordinates plus the neighbour relation derived from them
#[derive(Debug, Clone)]
pub struct Topology {
    layout: Layout,
    locations: Vec<Coordinate>,
    neighbours: Vec<Vec<NodeId>>,
}

impl Topology {
    pub fn from_config(config: &TopologyConfig) -> Result<Self, TopologyError> {
        let locations = config.layout.locations();
        if locations.is_empty() {
            return Err(TopologyError::Empty);
        }

        let radio_range = config
            .radio_range
            .or_else(|| config.layout.spacing())
            .ok_or(TopologyError::MissingRadioRange)?;

        let neighbours = generate_neighbours(&locations, radio_range);

        Ok(Self {
            layout: config.layout.clone(),
            locations,
            neighbours,
        })
    }

    /// Rebuild a topology from the options echoed at the top of a result file
    ///
    /// Needs `configuration` (`grid` or `line`), `network_size` and `distance`.
    pub fn from_opts(opts: &BTreeMap<String, String>) -> Result<Self, TopologyError> {
        let get = |name: &str| {
            opts.get(name)
                .ok_or_else(|| TopologyError::Options(format!("missing option '{}'", name)))
        };

        let network_size: u32 = get("network_size")?
            .parse()
            .map_err(|_| TopologyError::Options("network_size is not an integer".to_string()))?;
        let distance: f64 = get("distance")?
            .parse()
            .map_err(|_| TopologyError::Options("distance is not a number".to_string()))?;

        let layout = match get("configuration")?.as_str() {
            "grid" => Layout::Grid { network_size, distance },
            "line" => Layout::Line { network_size, distance },
            other => {
                return Err(TopologyError::Options(format!(
                    "configuration '{}' cannot be rebuilt from options",
                    other
                )))
            }
        };

        Self::from_config(&TopologyConfig { layout, radio_range: None })
    }

    pub fn layout(&self) -> &Layout {
        &self.layout
    }

    /// Number of nodes
    pub fn size(&self) -> usize {
        self.locations.len()
    }

    pub fn contains(&self, id: NodeId) -> bool {
        (id as usize) < self.locations.len()
    }

    pub fn location(&self, id: NodeId) -> Result<Coordinate, TopologyError> {
        self.locations
            .get(id as usize)
            .copied()
            .ok_or(TopologyError::UnknownNode { id, size: self.size() })
    }

    pub fn neighbours(&self, id: NodeId) -> &[NodeId] {
        self.neighbours
            .get(id as usize)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Whether `a` and `b` are within radio range of each other
    pub fn are_neighbours(&self, a: NodeId, b: NodeId) -> bool {
        self.neighbours(a).contains(&b)
    }

    pub fn distance_meters(&self, a: NodeId, b: NodeId) -> Result<f64, TopologyError> {
        Ok(self.location(a)?.distance(&self.location(b)?))
    }

    pub fn hop_distance(&self, a: NodeId, b: NodeId) -> Option<u32> {
        hop_distance(&self.neighbours, a, b)
    }
}

/// Topology plus the roles assigned to nodes
#[derive(Debug, Clone)]
pub struct Network {
    pub topology: Topology,
    pub sink_ids: BTreeSet<NodeId>,
    /// Sources at the start of a run; the live set is tracked by the metrics
    pub source_ids: BTreeSet<NodeId>,
}

impl Network {
    pub fn new(
        topology: Topology,
        sink_ids: BTreeSet<NodeId>,
        source_ids: BTreeSet<NodeId>,
    ) -> Result<Self, TopologyError> {
        for &id in sink_ids.iter().chain(source_ids.iter()) {
            if !topology.contains(id) {
                return Err(TopologyError::UnknownNode { id, size: topology.size() });
            }
        }

        Ok(Self { topology, sink_ids, source_ids })
    }

    pub fn size(&self) -> usize {
        self.topology.size()
    }

    pub fn is_sink(&self, id: NodeId) -> bool {
        self.sink_ids.contains(&id)
    }

    /// Sink-source distance in meters
    pub fn ssd_meters(&self, sink: NodeId, source: NodeId) -> Result<f64, TopologyError> {
        self.topology.distance_meters(sink, source)
    }

    /// Sink-source distance in hops
    pub fn ssd_hops(&self, sink: NodeId, source: NodeId) -> Option<u32> {
        self.topology.hop_distance(sink, source)
    }

    fn role_pairs(&self) -> impl Iterator<Item = (NodeId, NodeId)> + '_ {
        self.sink_ids
            .iter()
            .flat_map(move |&sink| self.source_ids.iter().map(move |&source| (sink, source)))
    }

    /// Shortest sink-source distance in meters over every sink and initial source
    pub fn min_ssd_meters(&self) -> Option<f64> {
        self.role_pairs()
            .filter_map(|(sink, source)| self.ssd_meters(sink, source).ok())
            .reduce(f64::min)
    }

    /// Shortest sink-source distance in hops, `None` when no source is reachable
    pub fn min_ssd_hops(&self) -> Option<u32> {
        self.role_pairs()
            .filter_map(|(sink, source)| self.ssd_hops(sink, source))
            .min()
    }

    /// The sink used as the default attacker start position
    pub fn first_sink(&self) -> Option<NodeId> {
        self.sink_ids.iter().next().copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn grid(size: u32) -> Topology {
        Topology::from_config(&TopologyConfig {
            layout: Layout::Grid { network_size: size, distance: 4.5 },
            radio_range: None,
        })
        .unwrap()
    }

    #[test]
    fn test_grid_oracle_distances() {
        let topology = grid(11);
        assert_eq!(topology.size(), 121);
        assert!((topology.distance_meters(0, 1).unwrap() - 4.5).abs() < 1e-9);
        assert_eq!(topology.hop_distance(0, 120), Some(20));
        assert!(topology.location(121).is_err());
    }

    #[test]
    fn test_from_opts_rebuilds_grid() {
        let opts: BTreeMap<String, String> = [
            ("configuration", "grid"),
            ("network_size", "5"),
            ("distance", "4.5"),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();

        assert_eq!(Topology::from_opts(&opts).unwrap().size(), 25);
    }

    #[test]
    fn test_network_rejects_out_of_range_roles() {
        let result = Network::new(grid(3), BTreeSet::from([4]), BTreeSet::from([9]));
        assert_eq!(result.unwrap_err(), TopologyError::UnknownNode { id: 9, size: 9 });
    }

    #[test]
    fn test_ssd() {
        let network = Network::new(grid(3), BTreeSet::from([4]), BTreeSet::from([0])).unwrap();
        assert_eq!(network.ssd_hops(4, 0), Some(2));
        assert!((network.ssd_meters(4, 0).unwrap() - (2.0f64 * 4.5 * 4.5).sqrt()).abs() < 1e-9);
        assert_eq!(network.first_sink(), Some(4));
    }

    #[test]
    fn test_min_ssd_over_roles() {
        let network = Network::new(grid(3), BTreeSet::from([0, 8]), BTreeSet::from([2, 7])).unwrap();
        assert_eq!(network.min_ssd_hops(), Some(1));
        assert!((network.min_ssd_meters().unwrap() - 4.5).abs() < 1e-9);

        let network = Network::new(grid(3), BTreeSet::from([0]), BTreeSet::new()).unwrap();
        assert_eq!(network.min_ssd_hops(), None);
        assert_eq!(network.min_ssd_meters(), None);
    }

    #[test]
    fn test_neighbours_follow_radio_range() {
        let topology = grid(3);
        assert!(topology.are_neighbours(4, 1));
        assert!(!topology.are_neighbours(0, 4));
        assert!(!topology.are_neighbours(0, 0));
        assert!(topology.neighbours(42).is_empty());
    }
}
